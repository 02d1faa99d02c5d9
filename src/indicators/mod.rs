mod ema;
mod kama;
mod sma;
mod smma;

pub use ema::Ema;
pub use kama::Kama;
pub use sma::Sma;
pub use smma::Smma;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub trait MA: Send + Sync {
    fn maturity(&self) -> u32;
    fn mature(&self) -> bool;
    fn update(&mut self, price: Decimal);
    fn value(&self) -> Decimal;
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MaKind {
    Ema,
    Kama,
    Sma,
    Smma,
}

pub const MA_CHOICES: [MaKind; 4] = [MaKind::Ema, MaKind::Kama, MaKind::Sma, MaKind::Smma];

// Closed over the known moving averages so that indicator state stays
// serializable for trader persistence.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Ma {
    Ema(Ema),
    Kama(Kama),
    Sma(Sma),
    Smma(Smma),
}

impl Ma {
    pub fn new(kind: MaKind, period: u32) -> Self {
        match kind {
            MaKind::Ema => Ma::Ema(Ema::new(period)),
            MaKind::Kama => Ma::Kama(Kama::new(period)),
            MaKind::Sma => Ma::Sma(Sma::new(period)),
            MaKind::Smma => Ma::Smma(Smma::new(period)),
        }
    }
}

impl MA for Ma {
    fn maturity(&self) -> u32 {
        match self {
            Ma::Ema(ma) => ma.maturity(),
            Ma::Kama(ma) => ma.maturity(),
            Ma::Sma(ma) => ma.maturity(),
            Ma::Smma(ma) => ma.maturity(),
        }
    }

    fn mature(&self) -> bool {
        match self {
            Ma::Ema(ma) => ma.mature(),
            Ma::Kama(ma) => ma.mature(),
            Ma::Sma(ma) => ma.mature(),
            Ma::Smma(ma) => ma.mature(),
        }
    }

    fn update(&mut self, price: Decimal) {
        match self {
            Ma::Ema(ma) => ma.update(price),
            Ma::Kama(ma) => ma.update(price),
            Ma::Sma(ma) => ma.update(price),
            Ma::Smma(ma) => ma.update(price),
        }
    }

    fn value(&self) -> Decimal {
        match self {
            Ma::Ema(ma) => ma.value(),
            Ma::Kama(ma) => ma.value(),
            Ma::Sma(ma) => ma.value(),
            Ma::Smma(ma) => ma.value(),
        }
    }
}
