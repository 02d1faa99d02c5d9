use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use super::PositionStatistics;
use crate::{
    math::annualized,
    time::{serialize_interval, serialize_timestamp},
    trading::{CloseReason, TradingSummary},
};

#[derive(Debug, Serialize)]
pub struct CoreStatistics {
    #[serde(serialize_with = "serialize_timestamp")]
    pub start: u64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub end: u64,
    #[serde(serialize_with = "serialize_interval")]
    pub duration: u64,
    pub cost: f64,
    pub gain: f64,
    pub profit: f64,
    pub roi: f64,
    pub annualized_roi: f64,
    pub mean_position_profit: f64,
    #[serde(serialize_with = "serialize_interval")]
    pub mean_position_duration: u64,
    pub max_drawdown: f64,
    pub mean_drawdown: f64,
    pub return_over_max_drawdown: f64,
    pub num_positions: u32,
    pub num_positions_in_profit: u32,
    pub num_positions_in_loss: u32,
    pub num_stop_losses: u32,
    pub num_take_profits: u32,

    pub positions: Vec<PositionStatistics>,
}

impl CoreStatistics {
    pub fn compose(summary: &TradingSummary) -> Self {
        let positions = summary.positions();

        let mut quote = summary.quote.to_f64().unwrap_or(0.0);
        let mut max_quote = quote;
        let mut profit = 0.0;

        let mut num_positions_in_profit = 0;
        let mut num_positions_in_loss = 0;
        let mut num_stop_losses = 0;
        let mut num_take_profits = 0;

        let mut max_drawdown = 0.0_f64;
        let mut total_drawdown = 0.0;

        let mut total_position_duration = 0;

        for position in positions.iter() {
            let position_profit = position.profit().to_f64().unwrap_or(0.0);

            profit += position_profit;
            total_position_duration += position.duration();

            if position_profit >= 0.0 {
                num_positions_in_profit += 1;
            } else {
                num_positions_in_loss += 1;
            }

            match position.close_reason() {
                CloseReason::StopLoss => num_stop_losses += 1,
                CloseReason::TakeProfit => num_take_profits += 1,
                _ => {}
            }

            quote += position_profit;
            max_quote = f64::max(max_quote, quote);
            let drawdown = 1.0 - quote / max_quote;
            total_drawdown += drawdown;
            max_drawdown = f64::max(max_drawdown, drawdown);
        }

        let (mean_position_profit, mean_position_duration, mean_drawdown) = if !positions.is_empty()
        {
            (
                profit / positions.len() as f64,
                total_position_duration / positions.len() as u64,
                total_drawdown / positions.len() as f64,
            )
        } else {
            (0.0, 0, 0.0)
        };

        let duration = summary.duration();
        let cost = summary.quote.to_f64().unwrap_or(0.0);
        let gain = cost + profit;
        let roi = profit / cost;
        let annualized_roi = annualized(duration, roi);
        let return_over_max_drawdown = if max_drawdown == 0.0 {
            0.0
        } else {
            roi / max_drawdown
        };

        Self {
            start: summary.start,
            end: summary.end(),
            duration,
            cost,
            gain,
            profit,
            roi,
            annualized_roi,
            mean_position_profit,
            mean_position_duration,
            max_drawdown,
            mean_drawdown,
            return_over_max_drawdown,
            num_positions: positions.len() as u32,
            num_positions_in_profit,
            num_positions_in_loss,
            num_stop_losses,
            num_take_profits,

            positions: positions.iter().map(PositionStatistics::from_position).collect(),
        }
    }
}
