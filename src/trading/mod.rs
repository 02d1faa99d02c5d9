mod traders;

pub use traders::*;

use once_cell::sync::Lazy;
use rand::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    common::{BorrowInfo, Fees, Fill},
    filters::Filters,
    genetics::Chromosome,
    math::{annualized, ceil_multiple, Constraint, Uniform},
    strategies::{StrategyParams, StrategyParamsContext},
    time::{
        deserialize_interval, deserialize_timestamp, serialize_interval, serialize_timestamp,
        HOUR_MS,
    },
    SymbolExt,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Chandler(#[from] crate::chandler::Error),
    #[error("{0}")]
    Exchange(#[from] crate::exchange::Error),
    #[error("{0}")]
    Informant(#[from] crate::informant::Error),
    #[error("insufficient balance: {0}")]
    InsufficientFunds(String),
    #[error("invalid trader configuration: {0}")]
    InvalidConfig(String),
    #[error("no position open to close")]
    NoOpenPosition,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TradingMode {
    Backtest,
    Paper,
    Live,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MissedCandlePolicy {
    Ignore,
    Restart,
    Last,
}

pub const MISSED_CANDLE_POLICY_CHOICES: [MissedCandlePolicy; 3] = [
    MissedCandlePolicy::Ignore,
    MissedCandlePolicy::Restart,
    MissedCandlePolicy::Last,
];

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CloseReason {
    Strategy,
    StopLoss,
    TakeProfit,
    Cancelled,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OpenLongPosition {
    pub symbol: String,
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub time: u64,
    pub fills: Vec<Fill>,
}

impl OpenLongPosition {
    pub fn close(self, time: u64, fills: Vec<Fill>, reason: CloseReason) -> LongPosition {
        LongPosition {
            symbol: self.symbol,
            open_time: self.time,
            open_fills: self.fills,
            close_time: time,
            close_fills: fills,
            close_reason: reason,
        }
    }

    pub fn cost(&self) -> Decimal {
        Fill::total_quote(&self.fills)
    }

    pub fn base_gain(&self) -> Decimal {
        Fill::total_size(&self.fills) - Fill::total_fee(&self.fills)
    }

    pub fn quote_delta(&self) -> Decimal {
        -self.cost()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LongPosition {
    pub symbol: String,
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub open_time: u64,
    pub open_fills: Vec<Fill>,
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub close_time: u64,
    pub close_fills: Vec<Fill>,
    pub close_reason: CloseReason,
}

impl LongPosition {
    pub fn cost(&self) -> Decimal {
        Fill::total_quote(&self.open_fills)
    }

    pub fn base_gain(&self) -> Decimal {
        Fill::total_size(&self.open_fills) - Fill::total_fee(&self.open_fills)
    }

    pub fn base_cost(&self) -> Decimal {
        Fill::total_size(&self.close_fills)
    }

    pub fn gain(&self) -> Decimal {
        Fill::total_quote(&self.close_fills) - Fill::total_fee(&self.close_fills)
    }

    pub fn profit(&self) -> Decimal {
        self.gain() - self.cost()
    }

    pub fn roi(&self) -> Decimal {
        self.profit() / self.cost()
    }

    pub fn annualized_roi(&self) -> f64 {
        annualized(self.duration(), self.roi().to_f64().unwrap_or(0.0))
    }

    pub fn dust(&self) -> Decimal {
        Fill::total_size(&self.open_fills)
            - Fill::total_fee(&self.open_fills)
            - Fill::total_size(&self.close_fills)
    }

    pub fn duration(&self) -> u64 {
        self.close_time - self.open_time
    }

    pub fn quote_delta(&self) -> Decimal {
        self.gain()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct OpenShortPosition {
    pub symbol: String,
    pub collateral: Decimal, // Quote.
    pub borrowed: Decimal,   // Base.
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub time: u64,
    pub fills: Vec<Fill>,
}

impl OpenShortPosition {
    pub fn close(
        self,
        interest: Decimal,
        time: u64,
        fills: Vec<Fill>,
        reason: CloseReason,
    ) -> ShortPosition {
        ShortPosition {
            symbol: self.symbol,
            collateral: self.collateral,
            borrowed: self.borrowed,
            open_time: self.time,
            open_fills: self.fills,
            close_time: time,
            close_fills: fills,
            interest,
            close_reason: reason,
        }
    }

    pub fn cost(&self) -> Decimal {
        self.collateral
    }

    pub fn base_gain(&self) -> Decimal {
        self.borrowed
    }

    pub fn quote_delta(&self) -> Decimal {
        Fill::total_quote(&self.fills) - Fill::total_fee(&self.fills)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ShortPosition {
    pub symbol: String,
    pub collateral: Decimal,
    pub borrowed: Decimal,
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub open_time: u64,
    pub open_fills: Vec<Fill>,
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub close_time: u64,
    pub close_fills: Vec<Fill>,
    pub interest: Decimal, // Base.
    pub close_reason: CloseReason,
}

impl ShortPosition {
    pub fn cost(&self) -> Decimal {
        self.collateral
    }

    pub fn base_gain(&self) -> Decimal {
        self.borrowed
    }

    pub fn base_cost(&self) -> Decimal {
        self.borrowed
    }

    pub fn gain(&self) -> Decimal {
        Fill::total_quote(&self.open_fills) - Fill::total_fee(&self.open_fills) + self.collateral
            - Fill::total_quote(&self.close_fills)
    }

    pub fn profit(&self) -> Decimal {
        self.gain() - self.cost()
    }

    pub fn roi(&self) -> Decimal {
        self.profit() / self.cost()
    }

    pub fn annualized_roi(&self) -> f64 {
        annualized(self.duration(), self.roi().to_f64().unwrap_or(0.0))
    }

    pub fn duration(&self) -> u64 {
        self.close_time - self.open_time
    }

    pub fn quote_delta(&self) -> Decimal {
        -Fill::total_quote(&self.close_fills)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum OpenPosition {
    Long(OpenLongPosition),
    Short(OpenShortPosition),
}

impl OpenPosition {
    pub fn symbol(&self) -> &str {
        match self {
            OpenPosition::Long(position) => &position.symbol,
            OpenPosition::Short(position) => &position.symbol,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Position {
    Long(LongPosition),
    Short(ShortPosition),
}

impl Position {
    pub fn open_time(&self) -> u64 {
        match self {
            Position::Long(position) => position.open_time,
            Position::Short(position) => position.open_time,
        }
    }

    pub fn close_time(&self) -> u64 {
        match self {
            Position::Long(position) => position.close_time,
            Position::Short(position) => position.close_time,
        }
    }

    pub fn profit(&self) -> Decimal {
        match self {
            Position::Long(position) => position.profit(),
            Position::Short(position) => position.profit(),
        }
    }

    pub fn duration(&self) -> u64 {
        match self {
            Position::Long(position) => position.duration(),
            Position::Short(position) => position.duration(),
        }
    }

    pub fn close_reason(&self) -> CloseReason {
        match self {
            Position::Long(position) => position.close_reason,
            Position::Short(position) => position.close_reason,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TradingSummary {
    #[serde(serialize_with = "serialize_timestamp")]
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start: u64,
    #[serde(
        serialize_with = "crate::time::serialize_timestamp_option",
        deserialize_with = "crate::time::deserialize_timestamp_option"
    )]
    #[serde(default)]
    pub end: Option<u64>,
    pub quote: Decimal,
    pub quote_asset: String,

    long_positions: Vec<LongPosition>,
    short_positions: Vec<ShortPosition>,
}

impl TradingSummary {
    pub fn new(start: u64, quote: Decimal, quote_asset: &str) -> Self {
        Self {
            start,
            end: None,
            quote,
            quote_asset: quote_asset.to_owned(),
            long_positions: Vec::new(),
            short_positions: Vec::new(),
        }
    }

    pub fn append_position(&mut self, position: Position) {
        match position {
            Position::Long(position) => self.long_positions.push(position),
            Position::Short(position) => self.short_positions.push(position),
        }
    }

    // Interleaved by open time.
    pub fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .long_positions
            .iter()
            .cloned()
            .map(Position::Long)
            .chain(self.short_positions.iter().cloned().map(Position::Short))
            .collect();
        positions.sort_by_key(|position| position.open_time());
        positions
    }

    pub fn long_positions(&self) -> &[LongPosition] {
        &self.long_positions
    }

    pub fn short_positions(&self) -> &[ShortPosition] {
        &self.short_positions
    }

    // Monotone non-decreasing across repeated calls.
    pub fn finish(&mut self, end: u64) {
        self.end = Some(match self.end {
            None => end,
            Some(existing) => u64::max(existing, end),
        });
    }

    pub fn end(&self) -> u64 {
        self.end.unwrap_or(self.start)
    }

    pub fn duration(&self) -> u64 {
        self.end() - self.start
    }

    pub fn cost(&self) -> Decimal {
        self.quote
    }

    pub fn profit(&self) -> Decimal {
        self.long_positions
            .iter()
            .map(LongPosition::profit)
            .sum::<Decimal>()
            + self
                .short_positions
                .iter()
                .map(ShortPosition::profit)
                .sum::<Decimal>()
    }

    pub fn gain(&self) -> Decimal {
        self.quote + self.profit()
    }

    pub fn roi(&self) -> Decimal {
        self.profit() / self.cost()
    }

    pub fn annualized_roi(&self) -> f64 {
        annualized(self.duration(), self.roi().to_f64().unwrap_or(0.0))
    }

    pub fn num_positions(&self) -> u32 {
        (self.long_positions.len() + self.short_positions.len()) as u32
    }

    pub fn num_long_positions(&self) -> u32 {
        self.long_positions.len() as u32
    }

    pub fn num_short_positions(&self) -> u32 {
        self.short_positions.len() as u32
    }

    pub fn num_positions_in_profit(&self) -> u32 {
        self.positions()
            .iter()
            .filter(|position| position.profit() >= Decimal::ZERO)
            .count() as u32
    }

    pub fn num_positions_in_loss(&self) -> u32 {
        self.positions()
            .iter()
            .filter(|position| position.profit() < Decimal::ZERO)
            .count() as u32
    }

    pub fn mean_position_profit(&self) -> Decimal {
        let positions = self.positions();
        if positions.is_empty() {
            return Decimal::ZERO;
        }
        positions.iter().map(Position::profit).sum::<Decimal>()
            / Decimal::from(positions.len() as u64)
    }

    pub fn mean_position_duration(&self) -> u64 {
        let positions = self.positions();
        if positions.is_empty() {
            return 0;
        }
        positions.iter().map(Position::duration).sum::<u64>() / positions.len() as u64
    }

    pub fn drawdowns(&self) -> Vec<Decimal> {
        let mut quote = self.quote;
        let mut max_quote = quote;
        let mut drawdowns = Vec::with_capacity(self.positions().len() + 1);
        drawdowns.push(Decimal::ZERO);
        for position in self.positions() {
            quote += position.profit();
            max_quote = Decimal::max(max_quote, quote);
            drawdowns.push(Decimal::ONE - quote / max_quote);
        }
        drawdowns
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.drawdowns()
            .into_iter()
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn mean_drawdown(&self) -> Decimal {
        let drawdowns = self.drawdowns();
        drawdowns.iter().sum::<Decimal>() / Decimal::from(drawdowns.len() as u64)
    }

    pub fn calculate_hodl_profit(
        &self,
        first_candle: &crate::common::Candle,
        last_candle: &crate::common::Candle,
        fees: &Fees,
        filters: &Filters,
    ) -> Decimal {
        let mut base_hodl = filters.size.round_down(self.quote / first_candle.close);
        base_hodl -= crate::math::round_half_up(base_hodl * fees.taker, filters.base_precision);
        let mut quote_hodl = filters.size.round_down(base_hodl) * last_candle.close;
        quote_hodl -= crate::math::round_half_up(quote_hodl * fees.taker, filters.quote_precision);
        quote_hodl - self.quote
    }
}

// Interest accrues hourly (rounded up) on the borrowed size.
pub fn borrow_interest(
    borrowed: Decimal,
    borrow_info: &BorrowInfo,
    open_time: u64,
    close_time: u64,
) -> Decimal {
    let hours = ceil_multiple(close_time - open_time, HOUR_MS) / HOUR_MS;
    let hourly_interest_rate = borrow_info.daily_interest_rate / dec!(24);
    borrowed * Decimal::from(hours) * hourly_interest_rate
}

pub fn open_simulated_long_position(
    symbol: &str,
    time: u64,
    price: Decimal,
    quote: Decimal,
    fees: &Fees,
    filters: &Filters,
) -> Result<OpenLongPosition> {
    let size = filters.size.round_down(quote / price);
    if size.is_zero() {
        return Err(Error::InsufficientFunds(format!(
            "unable to open long: size 0 for {} at price {}",
            symbol, price
        )));
    }

    let fee = crate::math::round_half_up(size * fees.taker, filters.base_precision);
    let fill = Fill::with_computed_quote(price, size, fee, symbol.base_asset(), filters.quote_precision);

    Ok(OpenLongPosition {
        symbol: symbol.to_owned(),
        time,
        fills: vec![fill],
    })
}

pub fn close_simulated_long_position(
    position: OpenLongPosition,
    time: u64,
    price: Decimal,
    fees: &Fees,
    filters: &Filters,
    reason: CloseReason,
) -> LongPosition {
    let size = filters.size.round_down(position.base_gain());
    let quote = crate::math::round_down(price * size, filters.quote_precision);
    let fee = crate::math::round_half_up(quote * fees.taker, filters.quote_precision);
    let quote_asset = position.symbol.quote_asset().to_owned();

    position.close(
        time,
        vec![Fill {
            price,
            size,
            quote,
            fee,
            fee_asset: quote_asset,
        }],
        reason,
    )
}

pub fn open_simulated_short_position(
    symbol: &str,
    time: u64,
    price: Decimal,
    collateral: Decimal,
    margin_multiplier: u32,
    fees: &Fees,
    filters: &Filters,
    borrow_info: &BorrowInfo,
) -> Result<OpenShortPosition> {
    let collateral_size = filters.size.round_down(collateral / price);
    let borrowed = Decimal::min(
        collateral_size * Decimal::from(margin_multiplier - 1),
        borrow_info.limit,
    );
    if borrowed.is_zero() {
        return Err(Error::InsufficientFunds(format!(
            "unable to open short: nothing to borrow for {} at price {}",
            symbol, price
        )));
    }

    let quote = crate::math::round_down(price * borrowed, filters.quote_precision);
    let fee = crate::math::round_half_up(quote * fees.taker, filters.quote_precision);

    Ok(OpenShortPosition {
        symbol: symbol.to_owned(),
        collateral,
        borrowed,
        time,
        fills: vec![Fill {
            price,
            size: borrowed,
            quote,
            fee,
            fee_asset: symbol.quote_asset().to_owned(),
        }],
    })
}

pub fn close_simulated_short_position(
    position: OpenShortPosition,
    time: u64,
    price: Decimal,
    fees: &Fees,
    filters: &Filters,
    borrow_info: &BorrowInfo,
    reason: CloseReason,
) -> ShortPosition {
    let interest = borrow_interest(position.borrowed, borrow_info, position.time, time);
    let mut size = position.borrowed + interest;
    let fee = crate::math::round_half_up(size * fees.taker, filters.base_precision);
    size += fee;
    let quote = crate::math::round_down(price * size, filters.quote_precision);
    let base_asset = position.symbol.base_asset().to_owned();

    position.close(
        interest,
        time,
        vec![Fill {
            price,
            size,
            quote,
            fee,
            fee_asset: base_asset,
        }],
        reason,
    )
}

// Optimizer genes over the trading configuration.

static STOP_LOSS: Lazy<Uniform> = Lazy::new(|| Uniform::new(dec!(0.0001), dec!(0.9999)));
static TAKE_PROFIT: Lazy<Uniform> = Lazy::new(|| Uniform::new(dec!(0.0001), dec!(9.9999)));

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TraderParams {
    pub symbol: String,
    #[serde(
        serialize_with = "serialize_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub interval: u64,
    pub missed_candle_policy: MissedCandlePolicy,
    pub stop_loss: Decimal,
    pub trail_stop_loss: bool,
    pub take_profit: Decimal,
    pub long: bool,
    pub short: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TraderParamsContext {
    pub symbols: Vec<String>,
    pub intervals: Vec<u64>,
    pub missed_candle_policy: Option<MissedCandlePolicy>,
    pub stop_loss: Option<Decimal>,
    pub trail_stop_loss: Option<bool>,
    pub take_profit: Option<Decimal>,
    pub long: Option<bool>,
    pub short: Option<bool>,
}

fn symbol(rng: &mut StdRng, symbols: &[String]) -> String {
    match symbols.len() {
        0 => panic!("no symbols to choose from"),
        1 => symbols[0].clone(),
        _ => symbols.choose(rng).unwrap().clone(),
    }
}
fn interval(rng: &mut StdRng, intervals: &[u64]) -> u64 {
    match intervals.len() {
        0 => panic!("no intervals to choose from"),
        1 => intervals[0],
        _ => *intervals.choose(rng).unwrap(),
    }
}
fn missed_candle_policy(rng: &mut StdRng) -> MissedCandlePolicy {
    *MISSED_CANDLE_POLICY_CHOICES.choose(rng).unwrap()
}
fn stop_loss(rng: &mut StdRng) -> Decimal {
    if rng.gen_bool(0.5) {
        Decimal::ZERO
    } else {
        STOP_LOSS.random(rng)
    }
}
fn trail_stop_loss(rng: &mut StdRng) -> bool {
    rng.gen_bool(0.5)
}
fn take_profit(rng: &mut StdRng) -> Decimal {
    if rng.gen_bool(0.5) {
        Decimal::ZERO
    } else {
        TAKE_PROFIT.random(rng)
    }
}
fn long(rng: &mut StdRng) -> bool {
    rng.gen_bool(0.5)
}
fn short(rng: &mut StdRng) -> bool {
    rng.gen_bool(0.5)
}

impl Chromosome for TraderParams {
    type Context = TraderParamsContext;

    fn len() -> usize {
        8
    }

    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self {
        Self {
            symbol: symbol(rng, &ctx.symbols),
            interval: interval(rng, &ctx.intervals),
            missed_candle_policy: ctx
                .missed_candle_policy
                .unwrap_or_else(|| missed_candle_policy(rng)),
            stop_loss: ctx.stop_loss.unwrap_or_else(|| stop_loss(rng)),
            trail_stop_loss: ctx.trail_stop_loss.unwrap_or_else(|| trail_stop_loss(rng)),
            take_profit: ctx.take_profit.unwrap_or_else(|| take_profit(rng)),
            long: ctx.long.unwrap_or_else(|| long(rng)),
            short: ctx.short.unwrap_or_else(|| short(rng)),
        }
    }

    fn cross(&mut self, other: &mut Self, i: usize) {
        match i {
            0 => std::mem::swap(&mut self.symbol, &mut other.symbol),
            1 => std::mem::swap(&mut self.interval, &mut other.interval),
            2 => std::mem::swap(
                &mut self.missed_candle_policy,
                &mut other.missed_candle_policy,
            ),
            3 => std::mem::swap(&mut self.stop_loss, &mut other.stop_loss),
            4 => std::mem::swap(&mut self.trail_stop_loss, &mut other.trail_stop_loss),
            5 => std::mem::swap(&mut self.take_profit, &mut other.take_profit),
            6 => std::mem::swap(&mut self.long, &mut other.long),
            7 => std::mem::swap(&mut self.short, &mut other.short),
            _ => panic!("index out of bounds"),
        }
    }

    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context) {
        match i {
            0 => self.symbol = symbol(rng, &ctx.symbols),
            1 => self.interval = interval(rng, &ctx.intervals),
            2 => {
                self.missed_candle_policy = ctx
                    .missed_candle_policy
                    .unwrap_or_else(|| missed_candle_policy(rng))
            }
            3 => self.stop_loss = ctx.stop_loss.unwrap_or_else(|| stop_loss(rng)),
            4 => {
                self.trail_stop_loss = ctx.trail_stop_loss.unwrap_or_else(|| trail_stop_loss(rng))
            }
            5 => self.take_profit = ctx.take_profit.unwrap_or_else(|| take_profit(rng)),
            6 => self.long = ctx.long.unwrap_or_else(|| long(rng)),
            7 => self.short = ctx.short.unwrap_or_else(|| short(rng)),
            _ => panic!("index out of bounds"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TradingParams {
    pub trader: TraderParams,
    pub strategy: StrategyParams,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TradingParamsContext {
    pub trader: TraderParamsContext,
    pub strategy: StrategyParamsContext,
}

impl Chromosome for TradingParams {
    type Context = TradingParamsContext;

    fn len() -> usize {
        TraderParams::len() + StrategyParams::len()
    }

    fn generate(rng: &mut StdRng, ctx: &Self::Context) -> Self {
        Self {
            trader: TraderParams::generate(rng, &ctx.trader),
            strategy: StrategyParams::generate(rng, &ctx.strategy),
        }
    }

    fn cross(&mut self, other: &mut Self, i: usize) {
        if i < TraderParams::len() {
            self.trader.cross(&mut other.trader, i);
        } else {
            self.strategy.cross(&mut other.strategy, i - TraderParams::len());
        }
    }

    fn mutate(&mut self, rng: &mut StdRng, i: usize, ctx: &Self::Context) {
        if i < TraderParams::len() {
            self.trader.mutate(rng, i, &ctx.trader);
        } else {
            self.strategy
                .mutate(rng, i - TraderParams::len(), &ctx.strategy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(price: Decimal, size: Decimal, fee: Decimal) -> Fill {
        Fill {
            price,
            size,
            quote: price * size,
            fee,
            fee_asset: "btc".into(),
        }
    }

    #[test]
    fn test_long_position_profit() {
        let open = OpenLongPosition {
            symbol: "eth-btc".into(),
            time: 0,
            fills: vec![fill(dec!(2.0), dec!(6.0), dec!(2.0))],
        };
        assert_eq!(open.cost(), dec!(12.0));
        assert_eq!(open.base_gain(), dec!(4.0));

        let position = open.close(
            1,
            vec![fill(dec!(2.0), dec!(2.0), dec!(1.0))],
            CloseReason::Strategy,
        );
        assert_eq!(position.gain(), dec!(3.0));
        assert_eq!(position.profit(), dec!(-9.0));
        assert_eq!(position.dust(), dec!(2.0));
        assert_eq!(position.duration(), 1);
    }

    #[test]
    fn test_short_position_profit() {
        let open = OpenShortPosition {
            symbol: "eth-btc".into(),
            collateral: dec!(10.0),
            borrowed: dec!(1.0),
            time: 0,
            fills: vec![fill(dec!(10.0), dec!(1.0), dec!(0.0))],
        };
        let position = open.close(
            Decimal::ZERO,
            2,
            vec![fill(dec!(6.0), dec!(1.0), dec!(0.0))],
            CloseReason::StopLoss,
        );
        assert_eq!(position.gain(), dec!(14.0));
        assert_eq!(position.profit(), dec!(4.0));
    }

    #[test]
    fn test_summary_drawdowns() {
        let mut summary = TradingSummary::new(0, dec!(10.0), "btc");
        summary.append_position(Position::Long(
            OpenLongPosition {
                symbol: "eth-btc".into(),
                time: 0,
                fills: vec![fill(dec!(1.0), dec!(10.0), dec!(0.0))],
            }
            .close(
                1,
                vec![fill(dec!(0.5), dec!(10.0), dec!(0.0))],
                CloseReason::Strategy,
            ),
        ));
        summary.append_position(Position::Long(
            OpenLongPosition {
                symbol: "eth-btc".into(),
                time: 2,
                fills: vec![fill(dec!(0.5), dec!(10.0), dec!(0.0))],
            }
            .close(
                3,
                vec![fill(dec!(1.0), dec!(10.0), dec!(0.0))],
                CloseReason::Strategy,
            ),
        ));
        summary.finish(4);

        assert_eq!(summary.profit(), dec!(0.0));
        assert_eq!(summary.max_drawdown(), dec!(0.5));
        assert_eq!(summary.num_positions(), 2);
        assert_eq!(summary.num_positions_in_profit(), 1);
        assert_eq!(summary.num_positions_in_loss(), 1);
        assert_eq!(summary.end(), 4);
    }

    #[test]
    fn test_borrow_interest_rounds_hours_up() {
        let borrow_info = BorrowInfo {
            daily_interest_rate: dec!(0.24),
            limit: dec!(100.0),
        };
        // 90 minutes accrue two hours of interest.
        let interest = borrow_interest(dec!(1.0), &borrow_info, 0, 90 * 60_000);
        assert_eq!(interest, dec!(0.02));
    }

    #[test]
    fn test_trading_params_generate_within_context() {
        let mut rng = StdRng::seed_from_u64(1);
        let ctx = TradingParamsContext {
            trader: TraderParamsContext {
                symbols: vec!["eth-btc".into()],
                intervals: vec![HOUR_MS],
                missed_candle_policy: Some(MissedCandlePolicy::Ignore),
                stop_loss: None,
                trail_stop_loss: None,
                take_profit: None,
                long: Some(true),
                short: Some(false),
            },
            strategy: StrategyParamsContext::default(),
        };
        for _ in 0..10 {
            let params = TradingParams::generate(&mut rng, &ctx);
            assert_eq!(params.trader.symbol, "eth-btc");
            assert_eq!(params.trader.interval, HOUR_MS);
            assert_eq!(params.trader.missed_candle_policy, MissedCandlePolicy::Ignore);
            assert!(params.trader.long);
            assert!(!params.trader.short);
            assert!(
                params.trader.stop_loss.is_zero()
                    || (params.trader.stop_loss >= dec!(0.0001)
                        && params.trader.stop_loss <= dec!(0.9999))
            );
        }
    }
}
