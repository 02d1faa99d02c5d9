use std::collections::HashMap;

use ndarray::prelude::*;
use ndarray_stats::CorrelationExt;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use super::SQRT_365;
use crate::{
    itertools::IteratorExt,
    math::{floor_multiple, mean, std_deviation},
    trading::{Position, TradingSummary},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Asset {
    Base,
    Quote,
}

#[derive(Debug, Serialize)]
pub struct AnalysisSummary {
    pub g_returns: Vec<f64>,
}

// Geometric returns of a benchmark price series (the BTC fiat series).
pub fn analyse_benchmark(prices: &[f64]) -> AnalysisSummary {
    AnalysisSummary {
        g_returns: prices
            .iter()
            .pairwise()
            .map(|(a, b)| (b / a).ln())
            .collect(),
    }
}

#[derive(Debug, Serialize)]
pub struct ExtendedStatistics {
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl ExtendedStatistics {
    pub fn compose(
        summary: &TradingSummary,
        base_prices: &[f64],
        quote_prices: Option<&[f64]>,
        benchmark_g_returns: &[f64],
        interval: u64,
    ) -> Self {
        let portfolio_performance =
            get_portfolio_performance(summary, base_prices, quote_prices, interval);
        let mut stats = calculate_statistics(&portfolio_performance);
        let (alpha, beta) =
            calculate_alpha_beta(benchmark_g_returns, &portfolio_performance, stats.annualized_return);
        stats.alpha = alpha;
        stats.beta = beta;
        stats
    }
}

fn map_period_deltas_from_summary(
    summary: &TradingSummary,
    interval: u64,
) -> HashMap<u64, Vec<(Asset, f64)>> {
    let mut period_deltas: HashMap<u64, Vec<(Asset, f64)>> = HashMap::new();
    for position in summary.positions() {
        let (time, cost, base_gain, close_time, base_cost, gain) = match &position {
            Position::Long(position) => (
                position.open_time,
                position.cost(),
                position.base_gain(),
                position.close_time,
                position.base_cost(),
                position.gain(),
            ),
            Position::Short(position) => (
                position.open_time,
                position.cost(),
                position.base_gain(),
                position.close_time,
                position.base_cost(),
                position.gain(),
            ),
        };
        // Open.
        let time = floor_multiple(time, interval);
        let deltas = period_deltas.entry(time).or_default();
        deltas.push((Asset::Quote, -cost.to_f64().unwrap_or(0.0)));
        deltas.push((Asset::Base, base_gain.to_f64().unwrap_or(0.0)));
        // Close.
        let time = floor_multiple(close_time, interval);
        let deltas = period_deltas.entry(time).or_default();
        deltas.push((Asset::Base, -base_cost.to_f64().unwrap_or(0.0)));
        deltas.push((Asset::Quote, gain.to_f64().unwrap_or(0.0)));
    }
    period_deltas
}

// Mark-to-market portfolio value over the statistics grid. Prices carry one
// extra element at the front, the opening price of the first period.
fn get_portfolio_performance(
    summary: &TradingSummary,
    base_prices: &[f64],
    quote_prices: Option<&[f64]>,
    interval: u64,
) -> Vec<f64> {
    let period_deltas = map_period_deltas_from_summary(summary, interval);

    let start = floor_multiple(summary.start, interval);
    let end = floor_multiple(summary.end(), interval);
    let length = usize::min(
        ((end - start) / interval) as usize,
        base_prices.len().saturating_sub(1),
    );

    let mut base_holding = 0.0;
    let mut quote_holding = summary.quote.to_f64().unwrap_or(0.0);

    let mut performance = Vec::with_capacity(length + 1);
    performance.push(
        base_holding * base_prices[0]
            + quote_holding * quote_prices.map_or(1.0, |prices| prices[0]),
    );

    for i in 0..length {
        let time = start + i as u64 * interval;
        if let Some(deltas) = period_deltas.get(&time) {
            for (asset, size) in deltas {
                match asset {
                    Asset::Base => base_holding += size,
                    Asset::Quote => quote_holding += size,
                }
            }
        }
        let price_i = i + 1; // Offset the open price.
        performance.push(
            base_holding * base_prices[price_i]
                + quote_holding * quote_prices.map_or(1.0, |prices| prices[price_i]),
        );
    }
    performance
}

fn calculate_statistics(performance: &[f64]) -> ExtendedStatistics {
    let g_returns: Vec<f64> = performance
        .iter()
        .pairwise()
        .map(|(a, b)| (b / a).ln())
        .collect();
    if g_returns.is_empty() {
        return ExtendedStatistics {
            annualized_return: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            alpha: 0.0,
            beta: 0.0,
        };
    }

    let annualized_return = 365.0 * mean(&g_returns);

    // Sharpe ratio.
    let sharpe_ratio = if annualized_return.is_nan() || annualized_return == 0.0 {
        0.0
    } else {
        let annualized_volatility = SQRT_365 * std_deviation(&g_returns);
        if annualized_volatility == 0.0 || annualized_volatility.is_nan() {
            0.0
        } else {
            annualized_return / annualized_volatility
        }
    };

    // Sortino ratio.
    let sortino_ratio = if annualized_return.is_nan() || annualized_return == 0.0 {
        0.0
    } else {
        let neg_g_returns: Vec<f64> = g_returns.iter().cloned().filter(|&v| v < 0.0).collect();
        let annualized_downside_risk = SQRT_365 * std_deviation(&neg_g_returns);
        // Without negative returns the ratio would be infinite. Those runs are
        // usually bad anyway, so zero is reported instead.
        if annualized_downside_risk == 0.0 || annualized_downside_risk.is_nan() {
            0.0
        } else {
            annualized_return / annualized_downside_risk
        }
    };

    debug_assert!(sharpe_ratio.is_finite());
    debug_assert!(sortino_ratio.is_finite());

    ExtendedStatistics {
        annualized_return,
        sharpe_ratio,
        sortino_ratio,
        alpha: 0.0,
        beta: 0.0,
    }
}

fn calculate_alpha_beta(
    benchmark_g_returns: &[f64],
    performance: &[f64],
    annualized_return: f64,
) -> (f64, f64) {
    let portfolio_g_returns: Vec<f64> = performance
        .iter()
        .pairwise()
        .map(|(a, b)| (b / a).ln())
        .collect();
    let length = usize::min(benchmark_g_returns.len(), portfolio_g_returns.len());
    if length < 2 {
        return (0.0, 0.0);
    }

    let mut combined: Vec<f64> = Vec::with_capacity(length * 2);
    combined.extend(&portfolio_g_returns[..length]);
    combined.extend(&benchmark_g_returns[..length]);

    let matrix = Array::from_shape_vec((2, length), combined)
        .expect("benchmark and portfolio geometric returns matrix");

    let covariance_matrix = matrix.cov(0.0).expect("covariance matrix");

    let beta = if covariance_matrix[[1, 1]] == 0.0 {
        0.0
    } else {
        covariance_matrix[[0, 1]] / covariance_matrix[[1, 1]]
    };
    let alpha = annualized_return - (beta * 365.0 * mean(&benchmark_g_returns[..length]));

    (alpha, beta)
}
