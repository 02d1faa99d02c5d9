use serde::{Deserialize, Serialize};

use super::StopLoss;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Noop {}

impl StopLoss for Noop {}
