use std::cmp::min;

use serde::{Deserialize, Serialize};

use crate::common::Advice;

// Requires a number of consecutive ticks with the same advice before the
// advice is confirmed.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Persistence {
    age: u32,
    level: u32,
    return_previous: bool,
    potential: Advice,
    previous: Advice,
}

impl Persistence {
    pub fn new(level: u32, return_previous: bool) -> Self {
        Self {
            age: 0,
            level,
            return_previous,
            potential: Advice::None,
            previous: Advice::None,
        }
    }

    pub fn maturity(&self) -> u32 {
        self.level + 1
    }

    pub fn update(&mut self, value: Advice) -> Advice {
        if self.level == 0 {
            return value;
        }

        if value != self.potential {
            self.age = 0;
            self.potential = value;
        }

        let result = if self.age >= self.level {
            self.previous = self.potential;
            self.potential
        } else if self.return_previous {
            self.previous
        } else {
            Advice::None
        };

        self.age = min(self.age + 1, self.level);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_confirms_advice() {
        let mut target = Persistence::new(1, false);
        assert_eq!(target.update(Advice::Long), Advice::None);
        assert_eq!(target.update(Advice::Long), Advice::Long);
        assert_eq!(target.update(Advice::Short), Advice::None);
        assert_eq!(target.update(Advice::Short), Advice::Short);
    }

    #[test]
    fn test_return_previous_holds_confirmed() {
        let mut target = Persistence::new(1, true);
        assert_eq!(target.update(Advice::Long), Advice::None);
        assert_eq!(target.update(Advice::Long), Advice::Long);
        assert_eq!(target.update(Advice::Short), Advice::Long);
        assert_eq!(target.update(Advice::Short), Advice::Short);
    }
}
