use super::{Chromosome, Individual};

pub trait Selection: Send + Sync {
    fn select<T: Chromosome>(
        &self,
        population: &[Individual<T>],
        count: usize,
    ) -> Vec<Individual<T>>;
}

// Non-dominated sorting with crowding-distance tie-breaking over the weighted
// objective vector.
pub struct NsgaII;

impl Selection for NsgaII {
    fn select<T: Chromosome>(
        &self,
        population: &[Individual<T>],
        count: usize,
    ) -> Vec<Individual<T>> {
        assert!(count <= population.len());

        let objectives: Vec<[f64; 10]> = population
            .iter()
            .map(|individual| individual.fitness().weighted())
            .collect();

        let mut selected = Vec::with_capacity(count);
        for front in fast_non_dominated_sort(&objectives) {
            if selected.len() + front.len() <= count {
                selected.extend(front.iter().map(|&i| population[i].clone()));
                if selected.len() == count {
                    break;
                }
            } else {
                let mut by_distance: Vec<(usize, f64)> = crowding_distances(&objectives, &front);
                by_distance.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                let remaining = count - selected.len();
                selected.extend(
                    by_distance
                        .into_iter()
                        .take(remaining)
                        .map(|(i, _)| population[i].clone()),
                );
                break;
            }
        }
        selected
    }
}

fn dominates(a: &[f64; 10], b: &[f64; 10]) -> bool {
    let mut any_better = false;
    for (x, y) in a.iter().zip(b.iter()) {
        if x < y {
            return false;
        }
        if x > y {
            any_better = true;
        }
    }
    any_better
}

fn fast_non_dominated_sort(objectives: &[[f64; 10]]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0_usize; n];
    let mut fronts: Vec<Vec<usize>> = vec![Vec::new()];

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&objectives[i], &objectives[j]) {
                dominated[i].push(j);
            } else if dominates(&objectives[j], &objectives[i]) {
                domination_count[i] += 1;
            }
        }
        if domination_count[i] == 0 {
            fronts[0].push(i);
        }
    }

    let mut current = 0;
    while !fronts[current].is_empty() {
        let mut next_front = Vec::new();
        for &i in &fronts[current] {
            for &j in &dominated[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next_front.push(j);
                }
            }
        }
        fronts.push(next_front);
        current += 1;
    }
    fronts.pop();
    fronts
}

fn crowding_distances(objectives: &[[f64; 10]], front: &[usize]) -> Vec<(usize, f64)> {
    let mut distances: Vec<(usize, f64)> = front.iter().map(|&i| (i, 0.0)).collect();
    if front.len() <= 2 {
        for distance in distances.iter_mut() {
            distance.1 = f64::INFINITY;
        }
        return distances;
    }

    for m in 0..objectives[0].len() {
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| {
            objectives[front[a]][m]
                .partial_cmp(&objectives[front[b]][m])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let min = objectives[front[order[0]]][m];
        let max = objectives[front[order[front.len() - 1]]][m];
        let range = max - min;

        distances[order[0]].1 = f64::INFINITY;
        distances[order[front.len() - 1]].1 = f64::INFINITY;
        if range == 0.0 {
            continue;
        }
        for w in order.windows(3) {
            let (previous, current, next) = (w[0], w[1], w[2]);
            distances[current].1 +=
                (objectives[front[next]][m] - objectives[front[previous]][m]) / range;
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominates() {
        let a = [2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let b = [1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert!(dominates(&a, &b));
        assert!(!dominates(&b, &a));
        assert!(!dominates(&a, &a));
    }

    #[test]
    fn test_fast_non_dominated_sort() {
        let mut objectives = vec![[0.0; 10]; 3];
        objectives[0][0] = 2.0;
        objectives[0][1] = 1.0; // Dominates both.
        objectives[1][0] = 1.0;
        objectives[2][0] = 1.0;
        objectives[2][1] = 1.0; // Dominates [1].

        let fronts = fast_non_dominated_sort(&objectives);

        assert_eq!(fronts.len(), 3);
        assert_eq!(fronts[0], vec![0]);
        assert_eq!(fronts[1], vec![2]);
        assert_eq!(fronts[2], vec![1]);
    }

    #[test]
    fn test_crowding_distance_boundaries_are_infinite() {
        let mut objectives = vec![[0.0; 10]; 4];
        for (i, objective) in objectives.iter_mut().enumerate() {
            objective[0] = i as f64;
        }
        let front: Vec<usize> = (0..4).collect();

        let distances = crowding_distances(&objectives, &front);

        assert_eq!(distances[0].1, f64::INFINITY);
        assert_eq!(distances[3].1, f64::INFINITY);
        assert!(distances[1].1.is_finite());
        assert!(distances[2].1.is_finite());
    }
}
