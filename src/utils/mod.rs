mod changed;
mod mid_trend;
mod persistence;

pub use changed::*;
pub use mid_trend::*;
pub use persistence::*;

use crate::common::Advice;

pub fn combine(advice1: Advice, advice2: Advice) -> Advice {
    if advice1 == Advice::None || advice2 == Advice::None {
        Advice::None
    } else if advice1 == advice2 {
        advice1
    } else {
        Advice::Liquidate
    }
}

pub fn merge_adjacent_spans(spans: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut merged = Vec::with_capacity(spans.len());
    let mut current: Option<(u64, u64)> = None;

    for &(start, end) in spans {
        match current {
            None => current = Some((start, end)),
            Some((merged_start, merged_end)) if merged_end == start => {
                current = Some((merged_start, end))
            }
            Some(span) => {
                merged.push(span);
                current = Some((start, end));
            }
        }
    }

    if let Some(span) = current {
        merged.push(span);
    }
    merged
}

// Existing spans are assumed to be ordered by start and non-overlapping.
pub fn generate_missing_spans(start: u64, end: u64, existing_spans: &[(u64, u64)]) -> Vec<(u64, u64)> {
    let mut missing = Vec::new();
    let mut missing_start = start;

    for &(existing_start, existing_end) in existing_spans {
        if existing_start > missing_start {
            missing.push((missing_start, existing_start));
        }
        missing_start = existing_end;
    }

    if missing_start < end {
        missing.push((missing_start, end));
    }
    missing
}

pub fn page(start: u64, end: u64, interval: u64, limit: u64) -> Vec<(u64, u64)> {
    let max_count = limit * interval;
    let page_count = ceil_div(end - start, max_count);
    (0..page_count)
        .map(|i| {
            let page_start = start + i * max_count;
            let page_end = u64::min(page_start + max_count, end);
            (page_start, page_end)
        })
        .collect()
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

// Attempt counter with a reset window. Consecutive failures inside the window
// count toward the limit; once the window has passed without a failure, the
// count starts over.
pub struct RetriesWithReset {
    max_attempts: u32,
    time_to_reset: u64,
    attempts: u32,
    last_attempt_at: Option<u64>,
}

impl RetriesWithReset {
    pub fn new(max_attempts: u32, time_to_reset: u64) -> Self {
        Self {
            max_attempts,
            time_to_reset,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    // Registers a failed attempt at `now`. Returns whether another attempt is
    // allowed.
    pub fn again(&mut self, now: u64) -> bool {
        if let Some(last_attempt_at) = self.last_attempt_at {
            if now - last_attempt_at >= self.time_to_reset {
                self.attempts = 0;
            }
        }
        self.last_attempt_at = Some(now);
        self.attempts += 1;
        self.attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_adjacent_spans() {
        let input = vec![(0, 1), (1, 2), (3, 4), (4, 5), (6, 7)];
        let expected_output = vec![(0, 2), (3, 5), (6, 7)];
        assert_eq!(merge_adjacent_spans(&input), expected_output);
    }

    #[test]
    fn test_generate_missing_spans_with_existing_spans() {
        let expected_output = vec![(0, 2), (4, 6), (8, 10)];
        assert_eq!(
            generate_missing_spans(0, 10, &[(2, 4), (6, 8)]),
            expected_output
        );
    }

    #[test]
    fn test_generate_missing_spans_without_existing_spans() {
        assert_eq!(generate_missing_spans(0, 10, &[]), vec![(0, 10)]);
    }

    #[test]
    fn test_generate_missing_spans_fully_covered() {
        assert_eq!(generate_missing_spans(2, 4, &[(0, 10)]), vec![]);
    }

    #[test]
    fn test_page() {
        assert_eq!(page(0, 10, 1, 4), vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(page(0, 4, 2, 2), vec![(0, 4)]);
    }

    #[test]
    fn test_retries_with_reset() {
        let mut retries = RetriesWithReset::new(3, 100);
        assert!(retries.again(0));
        assert!(retries.again(10));
        assert!(!retries.again(20));
    }

    #[test]
    fn test_retries_with_reset_resets_after_window() {
        let mut retries = RetriesWithReset::new(2, 100);
        assert!(retries.again(0));
        assert!(retries.again(150));
        assert!(!retries.again(160));
    }
}
