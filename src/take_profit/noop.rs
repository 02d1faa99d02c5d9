use serde::{Deserialize, Serialize};

use super::TakeProfit;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Noop {}

impl TakeProfit for Noop {}
