use std::{collections::HashMap, sync::Arc};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{
    borrow_interest, close_simulated_long_position, close_simulated_short_position,
    open_simulated_long_position, open_simulated_short_position, CloseReason, Error,
    MissedCandlePolicy, OpenLongPosition, OpenPosition, OpenShortPosition, Position, Result,
    TradingMode, TradingSummary,
};
use crate::{
    broker::{Broker, BrokerOrder},
    chandler::Chandler,
    common::{Advice, Candle},
    events::{Events, TradingEvent},
    exchange::Exchange,
    informant::Informant,
    math::floor_multiple,
    stop_loss::{AnyStopLoss, StopLoss},
    strategies::{AnySignal, Signal, Strategy, StrategyParams},
    take_profit::{AnyTakeProfit, TakeProfit},
    time::{
        deserialize_interval, deserialize_timestamp, deserialize_timestamp_option,
        serialize_interval, serialize_timestamp, serialize_timestamp_option, timestamp,
    },
    utils::Changed,
    SymbolExt,
};

fn default_channel() -> String {
    "default".to_owned()
}
fn default_mode() -> TradingMode {
    TradingMode::Backtest
}
fn default_missed_candle_policy() -> MissedCandlePolicy {
    MissedCandlePolicy::Ignore
}
fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BasicConfig {
    pub exchange: String,
    pub symbol: String,
    #[serde(
        serialize_with = "serialize_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub interval: u64,
    // None means the earliest available candle is found.
    #[serde(
        serialize_with = "serialize_timestamp_option",
        deserialize_with = "deserialize_timestamp_option"
    )]
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub end: u64,
    pub quote: Decimal,
    pub strategy: StrategyParams,
    #[serde(default)]
    pub stop_loss: Decimal,
    #[serde(default)]
    pub trail_stop_loss: bool,
    #[serde(default)]
    pub take_profit: Decimal,
    #[serde(default = "default_mode")]
    pub mode: TradingMode,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_missed_candle_policy")]
    pub missed_candle_policy: MissedCandlePolicy,
    #[serde(default = "default_true")]
    pub adjust_start: bool,
    #[serde(default = "default_true")]
    pub long: bool,
    #[serde(default)]
    pub short: bool,
    #[serde(default = "default_true")]
    pub close_on_exit: bool,
    // Timeout in case no candle (including open) arrives from the exchange.
    #[serde(default)]
    pub exchange_candle_timeout: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BasicState {
    pub config: BasicConfig,
    pub close_on_exit: bool,

    pub strategy: AnySignal,
    pub changed: Changed,
    pub quote: Decimal,
    pub summary: TradingSummary,
    // Next candle time to process; streaming resumes from here.
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub next: u64,
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub real_start: u64,
    pub stop_loss: AnyStopLoss,
    pub take_profit: AnyTakeProfit,

    pub open_new_positions: bool,
    pub open_position: Option<OpenPosition>,
    pub first_candle: Option<Candle>,
    pub last_candle: Option<Candle>,
}

// Drives a strategy over a candle stream, opening at most one position at a
// time. The full state is serializable; resuming with the same config
// continues from `state.next`.
#[derive(Clone)]
pub struct Basic {
    chandler: Chandler,
    informant: Informant,
    broker: Option<Arc<dyn Broker>>,
    exchanges: HashMap<String, Arc<dyn Exchange>>,
    events: Arc<Events>,
    get_time_ms: fn() -> u64,
}

impl Basic {
    pub fn new(chandler: Chandler, informant: Informant) -> Self {
        Self {
            chandler,
            informant,
            broker: None,
            exchanges: HashMap::new(),
            events: Arc::new(Events::new()),
            get_time_ms: timestamp,
        }
    }

    // Only required outside of backtesting.
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    // Only required for margin operations in live mode.
    pub fn with_exchanges(mut self, exchanges: Vec<Arc<dyn Exchange>>) -> Self {
        self.exchanges = exchanges
            .into_iter()
            .map(|exchange| (exchange.name().to_owned(), exchange))
            .collect();
        self
    }

    pub fn with_events(mut self, events: Arc<Events>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, get_time_ms: fn() -> u64) -> Self {
        self.get_time_ms = get_time_ms;
        self
    }

    pub fn events(&self) -> &Events {
        &self.events
    }

    pub async fn initialize(&self, config: BasicConfig) -> Result<BasicState> {
        if config.quote <= Decimal::ZERO {
            return Err(Error::InvalidConfig("quote must be positive".to_owned()));
        }
        if let Some(start) = config.start {
            if config.end <= start {
                return Err(Error::InvalidConfig("end must be after start".to_owned()));
            }
        }
        if !config.strategy.validate() {
            return Err(Error::InvalidConfig(
                "strategy parameters out of range".to_owned(),
            ));
        }
        if config.mode != TradingMode::Backtest && self.broker.is_none() {
            return Err(Error::InvalidConfig(format!(
                "{:?} mode requires a broker",
                config.mode
            )));
        }

        let (_, filters) = self
            .informant
            .get_fees_filters(&config.exchange, &config.symbol)?;
        if !filters.spot {
            return Err(Error::InvalidConfig(format!(
                "{} is not a spot market",
                config.symbol
            )));
        }
        if config.short && !filters.isolated_margin {
            return Err(Error::InvalidConfig(format!(
                "shorting requires isolated margin on {}",
                config.symbol
            )));
        }
        if config.quote <= filters.price.min {
            return Err(Error::InvalidConfig(format!(
                "quote {} below the minimum price filter",
                config.quote
            )));
        }

        let start = self
            .request_start(config.start, &config.exchange, &config.symbol, config.interval)
            .await?;

        let strategy = config.strategy.construct();

        let mut next = start;
        if config.adjust_start {
            // Accommodate the required history before the strategy becomes
            // effective. Only done on a fresh start; resumed runs mean missed
            // candles and we do not want to fetch past one.
            let warm_up = strategy.maturity().saturating_sub(1);
            info!("fetching {} candle(s) before start time to warm-up strategy", warm_up);
            next = start.saturating_sub(u64::from(warm_up) * config.interval);
        }

        let quote_asset = config.symbol.quote_asset().to_owned();
        Ok(BasicState {
            close_on_exit: config.close_on_exit,
            strategy,
            changed: Changed::new(true),
            quote: config.quote,
            summary: TradingSummary::new(start, config.quote, &quote_asset),
            next,
            real_start: (self.get_time_ms)(),
            stop_loss: AnyStopLoss::from_threshold(config.stop_loss, config.trail_stop_loss),
            take_profit: AnyTakeProfit::from_threshold(config.take_profit),
            open_new_positions: true,
            open_position: None,
            first_candle: None,
            last_candle: None,
            config,
        })
    }

    async fn request_start(
        &self,
        start: Option<u64>,
        exchange: &str,
        symbol: &str,
        interval: u64,
    ) -> Result<u64> {
        match start {
            Some(start) => Ok(floor_multiple(start, interval)),
            None => {
                let first_candle = self.chandler.get_first_candle(exchange, symbol, interval).await?;
                info!(
                    "no start given; starting from the earliest available candle at {}",
                    first_candle.time
                );
                Ok(first_candle.time)
            }
        }
    }

    pub async fn run(&self, state: &mut BasicState) -> Result<TradingSummary> {
        let result = self.run_inner(state).await;

        if state.close_on_exit && state.open_position.is_some() {
            if let Err(err) = self.close_open_position(state, CloseReason::Cancelled).await {
                error!("failed to close the open position on exit: {}", err);
            }
        }

        let end = if state.config.end <= state.real_start {
            // Backtest.
            match state.last_candle {
                Some(last_candle) => last_candle.time + state.config.interval,
                None => state.summary.start + state.config.interval,
            }
        } else {
            // Paper or live.
            u64::min((self.get_time_ms)(), state.config.end)
        };
        state.summary.finish(end);

        if let Some(last_candle) = state.last_candle {
            info!("last candle: {:?}", last_candle);
        }

        match &result {
            Ok(()) => self.events.emit(&state.config.channel, TradingEvent::Finished),
            Err(err) => self
                .events
                .emit(&state.config.channel, TradingEvent::Errored(err.to_string())),
        }

        result?;
        info!("finished");
        Ok(state.summary.clone())
    }

    async fn run_inner(&self, state: &mut BasicState) -> Result<()> {
        let config = state.config.clone();
        let chandler = self
            .chandler
            .clone()
            .with_exchange_candle_timeout(config.exchange_candle_timeout);
        let mut stream = chandler
            .stream_candles(
                &config.exchange,
                &config.symbol,
                config.interval,
                state.next,
                config.end,
                true,
                false,
            )
            .await?;

        while let Some(candle) = stream.recv().await {
            let candle = candle?;

            // Check if we have missed any candles.
            if let Some(last_candle) = state.last_candle {
                let time_diff = candle.time - last_candle.time;
                if time_diff >= config.interval * 2 {
                    match config.missed_candle_policy {
                        MissedCandlePolicy::Ignore => {}
                        MissedCandlePolicy::Restart => {
                            info!("restarting strategy due to missed candle(s)");
                            state.strategy = config.strategy.construct();
                        }
                        MissedCandlePolicy::Last => {
                            let num_missed = time_diff / config.interval - 1;
                            info!("filling {} missed candles with last values", num_missed);
                            for i in 1..=num_missed {
                                let missed_candle = Candle {
                                    time: last_candle.time + i * config.interval,
                                    open: last_candle.close,
                                    high: last_candle.close,
                                    low: last_candle.close,
                                    close: last_candle.close,
                                    volume: Decimal::ZERO,
                                    closed: true,
                                };
                                self.tick(state, &missed_candle).await?;
                            }
                        }
                    }
                }
            }

            self.tick(state, &candle).await?;
        }
        Ok(())
    }

    async fn tick(&self, state: &mut BasicState, candle: &Candle) -> Result<()> {
        let config = state.config.clone();

        self.events
            .emit(&config.channel, TradingEvent::Candle(*candle));

        state.stop_loss.update(candle);
        state.take_profit.update(candle);
        state.strategy.update(candle);
        let advice = state.changed.update(state.strategy.advice());
        debug!("received advice: {:?}", advice);
        // The strategy must not advise during the adjusted-start warm-up.
        if candle.time < state.summary.start {
            debug_assert_eq!(advice, Advice::None);
        }

        if let Some(OpenPosition::Long(_)) = state.open_position {
            if advice == Advice::Short || advice == Advice::Liquidate {
                self.close_long_position(state, candle, CloseReason::Strategy).await?;
            } else if state.stop_loss.upside_hit() {
                info!("upside stop loss hit at {}; selling", config.stop_loss);
                self.close_long_position(state, candle, CloseReason::StopLoss).await?;
            } else if state.take_profit.upside_hit() {
                info!("upside take profit hit at {}; selling", config.take_profit);
                self.close_long_position(state, candle, CloseReason::TakeProfit).await?;
            }
        } else if let Some(OpenPosition::Short(_)) = state.open_position {
            if advice == Advice::Long || advice == Advice::Liquidate {
                self.close_short_position(state, candle, CloseReason::Strategy).await?;
            } else if state.stop_loss.downside_hit() {
                info!("downside stop loss hit at {}; buying", config.stop_loss);
                self.close_short_position(state, candle, CloseReason::StopLoss).await?;
            } else if state.take_profit.downside_hit() {
                info!("downside take profit hit at {}; buying", config.take_profit);
                self.close_short_position(state, candle, CloseReason::TakeProfit).await?;
            }
        }

        if state.open_position.is_none() && state.open_new_positions {
            if config.long && advice == Advice::Long {
                self.open_long_position(state, candle).await?;
            } else if config.short && advice == Advice::Short {
                self.open_short_position(state, candle).await?;
            }
            state.stop_loss.clear(candle);
            state.take_profit.clear(candle);
        }

        if state.first_candle.is_none() {
            info!("first candle: {:?}", candle);
            state.first_candle = Some(*candle);
        }
        state.last_candle = Some(*candle);
        state.next = candle.time + config.interval;
        Ok(())
    }

    pub async fn close_open_position(
        &self,
        state: &mut BasicState,
        reason: CloseReason,
    ) -> Result<Position> {
        let Some(last_candle) = state.last_candle else {
            return Err(Error::NoOpenPosition);
        };
        match state.open_position {
            Some(OpenPosition::Long(_)) => {
                info!("long position open; closing");
                self.close_long_position(state, &last_candle, reason).await
            }
            Some(OpenPosition::Short(_)) => {
                info!("short position open; closing");
                self.close_short_position(state, &last_candle, reason).await
            }
            None => Err(Error::NoOpenPosition),
        }
    }

    async fn open_long_position(&self, state: &mut BasicState, candle: &Candle) -> Result<()> {
        let config = state.config.clone();
        let (fees, filters) = self
            .informant
            .get_fees_filters(&config.exchange, &config.symbol)?;

        let position = if config.mode == TradingMode::Backtest {
            open_simulated_long_position(
                &config.symbol,
                candle.time + config.interval,
                candle.close,
                state.quote,
                &fees,
                &filters,
            )?
        } else {
            let broker = self.broker.as_ref().expect("broker");
            let result = broker
                .buy(BrokerOrder {
                    exchange: config.exchange.clone(),
                    symbol: config.symbol.clone(),
                    size: None,
                    quote: Some(state.quote),
                    account: "spot".to_owned(),
                    test: config.mode == TradingMode::Paper,
                })
                .await?;
            OpenLongPosition {
                symbol: config.symbol.clone(),
                time: result.time,
                fills: result.fills,
            }
        };

        state.quote += position.quote_delta();
        let open_position = OpenPosition::Long(position);
        state.open_position = Some(open_position.clone());

        self.events.emit(
            &config.channel,
            TradingEvent::PositionsOpened(vec![open_position]),
        );
        Ok(())
    }

    async fn close_long_position(
        &self,
        state: &mut BasicState,
        candle: &Candle,
        reason: CloseReason,
    ) -> Result<Position> {
        let config = state.config.clone();
        let (fees, filters) = self
            .informant
            .get_fees_filters(&config.exchange, &config.symbol)?;

        let Some(OpenPosition::Long(open_position)) = state.open_position.take() else {
            return Err(Error::NoOpenPosition);
        };

        let position = if config.mode == TradingMode::Backtest {
            close_simulated_long_position(
                open_position,
                candle.time + config.interval,
                candle.close,
                &fees,
                &filters,
                reason,
            )
        } else {
            let broker = self.broker.as_ref().expect("broker");
            let result = broker
                .sell(BrokerOrder {
                    exchange: config.exchange.clone(),
                    symbol: config.symbol.clone(),
                    size: Some(open_position.base_gain()),
                    quote: None,
                    account: "spot".to_owned(),
                    test: config.mode == TradingMode::Paper,
                })
                .await?;
            open_position.close(result.time, result.fills, reason)
        };

        state.quote += position.quote_delta();
        let position = Position::Long(position);
        state.summary.append_position(position.clone());

        self.events.emit(
            &config.channel,
            TradingEvent::PositionsClosed(vec![position.clone()]),
        );
        Ok(position)
    }

    async fn open_short_position(&self, state: &mut BasicState, candle: &Candle) -> Result<()> {
        let config = state.config.clone();
        let (fees, filters) = self
            .informant
            .get_fees_filters(&config.exchange, &config.symbol)?;
        let base_asset = config.symbol.base_asset().to_owned();
        let quote_asset = config.symbol.quote_asset().to_owned();
        let margin_multiplier = self.informant.get_margin_multiplier(&config.exchange)?;
        let borrow_info =
            self.informant
                .get_borrow_info(&config.exchange, &config.symbol, &base_asset)?;

        let position = if config.mode == TradingMode::Backtest {
            open_simulated_short_position(
                &config.symbol,
                candle.time + config.interval,
                candle.close,
                state.quote,
                margin_multiplier,
                &fees,
                &filters,
                &borrow_info,
            )?
        } else {
            let broker = self.broker.as_ref().expect("broker");
            let exchange = self
                .exchanges
                .get(&config.exchange)
                .ok_or_else(|| Error::InvalidConfig("exchange required for margin trade".into()))?;

            let collateral = state.quote;
            let collateral_size = filters.size.round_down(collateral / candle.close);
            let borrowed = Decimal::min(
                collateral_size * Decimal::from(margin_multiplier - 1),
                borrow_info.limit,
            );
            if borrowed.is_zero() {
                return Err(Error::InsufficientFunds(format!(
                    "unable to open short: nothing to borrow for {}",
                    config.symbol
                )));
            }

            exchange
                .transfer(&quote_asset, collateral, "spot", &config.symbol)
                .await?;
            exchange.borrow(&base_asset, borrowed, &config.symbol).await?;
            let result = broker
                .sell(BrokerOrder {
                    exchange: config.exchange.clone(),
                    symbol: config.symbol.clone(),
                    size: Some(borrowed),
                    quote: None,
                    account: config.symbol.clone(),
                    test: config.mode == TradingMode::Paper,
                })
                .await?;
            OpenShortPosition {
                symbol: config.symbol.clone(),
                collateral,
                borrowed,
                time: result.time,
                fills: result.fills,
            }
        };

        state.quote += position.quote_delta();
        let open_position = OpenPosition::Short(position);
        state.open_position = Some(open_position.clone());

        self.events.emit(
            &config.channel,
            TradingEvent::PositionsOpened(vec![open_position]),
        );
        Ok(())
    }

    async fn close_short_position(
        &self,
        state: &mut BasicState,
        candle: &Candle,
        reason: CloseReason,
    ) -> Result<Position> {
        let config = state.config.clone();
        let (fees, filters) = self
            .informant
            .get_fees_filters(&config.exchange, &config.symbol)?;
        let base_asset = config.symbol.base_asset().to_owned();
        let quote_asset = config.symbol.quote_asset().to_owned();
        let borrow_info =
            self.informant
                .get_borrow_info(&config.exchange, &config.symbol, &base_asset)?;

        let Some(OpenPosition::Short(open_position)) = state.open_position.take() else {
            return Err(Error::NoOpenPosition);
        };

        let position = if config.mode == TradingMode::Backtest {
            close_simulated_short_position(
                open_position,
                candle.time + config.interval,
                candle.close,
                &fees,
                &filters,
                &borrow_info,
                reason,
            )
        } else {
            let broker = self.broker.as_ref().expect("broker");
            let exchange = self
                .exchanges
                .get(&config.exchange)
                .ok_or_else(|| Error::InvalidConfig("exchange required for margin trade".into()))?;

            let interest = borrow_interest(
                open_position.borrowed,
                &borrow_info,
                open_position.time,
                (self.get_time_ms)(),
            );
            let size = filters.size.round_up(open_position.borrowed + interest);
            let result = broker
                .buy(BrokerOrder {
                    exchange: config.exchange.clone(),
                    symbol: config.symbol.clone(),
                    size: Some(size),
                    quote: None,
                    account: config.symbol.clone(),
                    test: config.mode == TradingMode::Paper,
                })
                .await?;
            exchange
                .repay(&base_asset, open_position.borrowed + interest, &config.symbol)
                .await?;
            let collateral = open_position.collateral;
            let position = open_position.close(interest, result.time, result.fills, reason);
            exchange
                .transfer(&quote_asset, collateral, &config.symbol, "spot")
                .await?;
            position
        };

        state.quote += position.quote_delta();
        let position = Position::Short(position);
        state.summary.append_position(position.clone());

        self.events.emit(
            &config.channel,
            TradingEvent::PositionsClosed(vec![position.clone()]),
        );
        Ok(position)
    }
}
