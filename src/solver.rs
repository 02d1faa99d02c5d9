use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    common::{Advice, BorrowInfo, Candle, Fees},
    filters::Filters,
    statistics::ExtendedStatistics,
    stop_loss::{AnyStopLoss, StopLoss},
    strategies::{AnySignal, Signal, Strategy, StrategyParams},
    take_profit::{AnyTakeProfit, TakeProfit},
    trading::{
        close_simulated_long_position, close_simulated_short_position,
        open_simulated_long_position, open_simulated_short_position, CloseReason,
        MissedCandlePolicy, OpenPosition, Position, TradingSummary,
    },
    utils::Changed,
    SymbolExt,
};

// Objective weights, in field order: maximize profit, minimize mean drawdown,
// minimize max drawdown, maximize mean position profit, minimize mean
// position duration, maximize positions in profit, minimize positions in
// loss, maximize sharpe, sortino and alpha.
pub const FITNESS_WEIGHTS: [f64; 10] = [
    1.0, -1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, 1.0, 1.0,
];

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct FitnessValues {
    pub profit: f64,
    pub mean_drawdown: f64,
    pub max_drawdown: f64,
    pub mean_position_profit: f64,
    pub mean_position_duration: f64,
    pub num_positions_in_profit: f64,
    pub num_positions_in_loss: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub alpha: f64,
}

impl FitnessValues {
    pub fn from_summary(summary: &TradingSummary, extended: &ExtendedStatistics) -> Self {
        Self {
            profit: summary.profit().to_f64().unwrap_or(0.0),
            mean_drawdown: summary.mean_drawdown().to_f64().unwrap_or(0.0),
            max_drawdown: summary.max_drawdown().to_f64().unwrap_or(0.0),
            mean_position_profit: summary.mean_position_profit().to_f64().unwrap_or(0.0),
            mean_position_duration: summary.mean_position_duration() as f64,
            num_positions_in_profit: summary.num_positions_in_profit() as f64,
            num_positions_in_loss: summary.num_positions_in_loss() as f64,
            sharpe_ratio: extended.sharpe_ratio,
            sortino_ratio: extended.sortino_ratio,
            alpha: extended.alpha,
        }
    }

    pub fn values(&self) -> [f64; 10] {
        [
            self.profit,
            self.mean_drawdown,
            self.max_drawdown,
            self.mean_position_profit,
            self.mean_position_duration,
            self.num_positions_in_profit,
            self.num_positions_in_loss,
            self.sharpe_ratio,
            self.sortino_ratio,
            self.alpha,
        ]
    }

    pub fn weighted(&self) -> [f64; 10] {
        let mut values = self.values();
        for (value, weight) in values.iter_mut().zip(FITNESS_WEIGHTS.iter()) {
            *value *= weight;
        }
        values
    }

    pub fn isclose(&self, other: &FitnessValues, tolerance: f64) -> bool {
        self.values()
            .iter()
            .zip(other.values().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

// A fully-materialized back-test input. Candles are expected to be cached
// already; solving never touches the network or storage.
pub struct Config<'a> {
    pub candles: &'a [Candle],
    pub fees: &'a Fees,
    pub filters: &'a Filters,
    pub borrow_info: &'a BorrowInfo,
    pub margin_multiplier: u32,
    pub symbol: &'a str,
    pub interval: u64,
    pub start: u64,
    pub end: u64,
    pub quote: Decimal,
    pub strategy_params: &'a StrategyParams,
    pub missed_candle_policy: MissedCandlePolicy,
    pub stop_loss: Decimal,
    pub trail_stop_loss: bool,
    pub take_profit: Decimal,
    pub long: bool,
    pub short: bool,
    pub base_fiat_prices: &'a [f64],
    pub quote_fiat_prices: Option<&'a [f64]>,
    pub benchmark_g_returns: &'a [f64],
    pub stats_interval: u64,
}

// Fast, stateless back-test scoring for one parameter tuple. Must agree with
// the trader-built summary to within 1e-6 per fitness component; the
// optimizer cross-checks the winner against the actual trader.
pub trait Solver: Send + Sync {
    fn solve(&self, config: &Config) -> FitnessValues;
}

pub struct BasicSolver;

impl Solver for BasicSolver {
    fn solve(&self, config: &Config) -> FitnessValues {
        let summary = simulate(config);
        let extended = ExtendedStatistics::compose(
            &summary,
            config.base_fiat_prices,
            config.quote_fiat_prices,
            config.benchmark_g_returns,
            config.stats_interval,
        );
        FitnessValues::from_summary(&summary, &extended)
    }
}

struct SimState {
    strategy: AnySignal,
    stop_loss: AnyStopLoss,
    take_profit: AnyTakeProfit,
    changed: Changed,
    quote: Decimal,
    open_position: Option<OpenPosition>,
    last_candle: Option<Candle>,
}

pub fn simulate(config: &Config) -> TradingSummary {
    let interval = config.interval;
    let two_interval = interval * 2;

    let mut summary = TradingSummary::new(config.start, config.quote, config.symbol.quote_asset());
    let mut state = SimState {
        strategy: config.strategy_params.construct(),
        stop_loss: AnyStopLoss::from_threshold(config.stop_loss, config.trail_stop_loss),
        take_profit: AnyTakeProfit::from_threshold(config.take_profit),
        changed: Changed::new(true),
        quote: config.quote,
        open_position: None,
        last_candle: None,
    };

    let mut i = 0;
    let mut exit = false;
    loop {
        let mut restart = false;

        for candle in config.candles[i..].iter() {
            i += 1;

            if let Some(last_candle) = state.last_candle {
                let time_diff = candle.time - last_candle.time;
                if time_diff >= two_interval {
                    match config.missed_candle_policy {
                        MissedCandlePolicy::Ignore => {}
                        MissedCandlePolicy::Restart => {
                            restart = true;
                            state.strategy = config.strategy_params.construct();
                        }
                        MissedCandlePolicy::Last => {
                            let num_missed = time_diff / interval - 1;
                            for i in 1..=num_missed {
                                let missed_candle = Candle {
                                    time: last_candle.time + i * interval,
                                    open: last_candle.close,
                                    high: last_candle.close,
                                    low: last_candle.close,
                                    close: last_candle.close,
                                    volume: Decimal::ZERO,
                                    closed: true,
                                };
                                if tick(&mut state, &mut summary, config, &missed_candle).is_err() {
                                    exit = true;
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            if exit {
                break;
            }

            if tick(&mut state, &mut summary, config, candle).is_err() {
                exit = true;
                break;
            }

            if restart {
                break;
            }
        }

        if exit || !restart {
            break;
        }
    }

    if let Some(last_candle) = state.last_candle {
        match state.open_position.take() {
            Some(OpenPosition::Long(position)) => {
                let position = close_simulated_long_position(
                    position,
                    last_candle.time + interval,
                    last_candle.close,
                    config.fees,
                    config.filters,
                    CloseReason::Cancelled,
                );
                state.quote += position.quote_delta();
                summary.append_position(Position::Long(position));
            }
            Some(OpenPosition::Short(position)) => {
                let position = close_simulated_short_position(
                    position,
                    last_candle.time + interval,
                    last_candle.close,
                    config.fees,
                    config.filters,
                    config.borrow_info,
                    CloseReason::Cancelled,
                );
                state.quote += position.quote_delta();
                summary.append_position(Position::Short(position));
            }
            None => {}
        }
    }

    summary.finish(match state.last_candle {
        Some(last_candle) => last_candle.time + interval,
        None => config.start + interval,
    });
    summary
}

fn tick(
    state: &mut SimState,
    summary: &mut TradingSummary,
    config: &Config,
    candle: &Candle,
) -> Result<(), ()> {
    state.stop_loss.update(candle);
    state.take_profit.update(candle);
    state.strategy.update(candle);
    let advice = state.changed.update(state.strategy.advice());

    if let Some(OpenPosition::Long(_)) = state.open_position {
        if advice == Advice::Short || advice == Advice::Liquidate {
            close_long(state, summary, config, candle, CloseReason::Strategy);
        } else if state.stop_loss.upside_hit() {
            close_long(state, summary, config, candle, CloseReason::StopLoss);
        } else if state.take_profit.upside_hit() {
            close_long(state, summary, config, candle, CloseReason::TakeProfit);
        }
    } else if let Some(OpenPosition::Short(_)) = state.open_position {
        if advice == Advice::Long || advice == Advice::Liquidate {
            close_short(state, summary, config, candle, CloseReason::Strategy);
        } else if state.stop_loss.downside_hit() {
            close_short(state, summary, config, candle, CloseReason::StopLoss);
        } else if state.take_profit.downside_hit() {
            close_short(state, summary, config, candle, CloseReason::TakeProfit);
        }
    }

    if state.open_position.is_none() {
        if config.long && advice == Advice::Long {
            let position = open_simulated_long_position(
                config.symbol,
                candle.time + config.interval,
                candle.close,
                state.quote,
                config.fees,
                config.filters,
            )
            .map_err(|_| ())?;
            state.quote += position.quote_delta();
            state.open_position = Some(OpenPosition::Long(position));
        } else if config.short && advice == Advice::Short {
            let position = open_simulated_short_position(
                config.symbol,
                candle.time + config.interval,
                candle.close,
                state.quote,
                config.margin_multiplier,
                config.fees,
                config.filters,
                config.borrow_info,
            )
            .map_err(|_| ())?;
            state.quote += position.quote_delta();
            state.open_position = Some(OpenPosition::Short(position));
        }
        state.stop_loss.clear(candle);
        state.take_profit.clear(candle);
    }

    state.last_candle = Some(*candle);
    Ok(())
}

fn close_long(
    state: &mut SimState,
    summary: &mut TradingSummary,
    config: &Config,
    candle: &Candle,
    reason: CloseReason,
) {
    if let Some(OpenPosition::Long(position)) = state.open_position.take() {
        let position = close_simulated_long_position(
            position,
            candle.time + config.interval,
            candle.close,
            config.fees,
            config.filters,
            reason,
        );
        state.quote += position.quote_delta();
        summary.append_position(Position::Long(position));
    }
}

fn close_short(
    state: &mut SimState,
    summary: &mut TradingSummary,
    config: &Config,
    candle: &Candle,
    reason: CloseReason,
) {
    if let Some(OpenPosition::Short(position)) = state.open_position.take() {
        let position = close_simulated_short_position(
            position,
            candle.time + config.interval,
            candle.close,
            config.fees,
            config.filters,
            config.borrow_info,
            reason,
        );
        state.quote += position.quote_delta();
        summary.append_position(Position::Short(position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{FourWeekRuleParams, StrategyParams};
    use rust_decimal_macros::dec;

    fn candle(time: u64, close: Decimal) -> Candle {
        Candle {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1.0),
            closed: true,
        }
    }

    #[test]
    fn test_simulate_flat_market_yields_no_positions() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, dec!(1.0))).collect();
        let fees = Fees::default();
        let filters = Filters::default();
        let borrow_info = BorrowInfo {
            daily_interest_rate: dec!(0.0),
            limit: dec!(1.0),
        };
        let strategy_params = StrategyParams::FourWeekRule(FourWeekRuleParams {
            period: 4,
            ma: crate::indicators::MaKind::Sma,
            ma_period: 2,
        });
        let base_fiat_prices = vec![1.0; 11];

        let config = Config {
            candles: &candles,
            fees: &fees,
            filters: &filters,
            borrow_info: &borrow_info,
            margin_multiplier: 2,
            symbol: "eth-btc",
            interval: 1,
            start: 0,
            end: 10,
            quote: dec!(1.0),
            strategy_params: &strategy_params,
            missed_candle_policy: MissedCandlePolicy::Ignore,
            stop_loss: dec!(0.0),
            trail_stop_loss: false,
            take_profit: dec!(0.0),
            long: true,
            short: true,
            base_fiat_prices: &base_fiat_prices,
            quote_fiat_prices: None,
            benchmark_g_returns: &[0.0; 10],
            stats_interval: 1,
        };

        let fitness = BasicSolver.solve(&config);

        assert_eq!(fitness.profit, 0.0);
        assert_eq!(fitness.num_positions_in_profit, 0.0);
        assert_eq!(fitness.num_positions_in_loss, 0.0);
    }
}
