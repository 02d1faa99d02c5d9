use serde::{Deserialize, Serialize};

use crate::common::Advice;

// Passes an advice through only when it differs from the previous one.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Changed {
    enabled: bool,
    previous: Advice,
    age: u32,
}

impl Changed {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            previous: Advice::None,
            age: 0,
        }
    }

    pub fn prevailing_advice(&self) -> Advice {
        self.previous
    }

    pub fn prevailing_advice_age(&self) -> u32 {
        self.age
    }

    pub fn maturity(&self) -> u32 {
        1
    }

    pub fn update(&mut self, value: Advice) -> Advice {
        if !self.enabled {
            return value;
        }

        let result = if value == self.previous {
            Advice::None
        } else {
            self.age = 0;
            value
        };
        self.previous = value;
        self.age += 1;
        result
    }
}
