use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, Arc},
};

use rayon::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    chandler::{self, Chandler},
    common::{BorrowInfo, Candle, Fees},
    filters::Filters,
    genetics::{
        Chromosome, Evaluation, GeneticAlgorithm, Individual, NsgaII, UniformCrossover,
        UniformMutation,
    },
    informant::{self, Informant},
    math::floor_multiple,
    prices::Prices,
    solver::{self, FitnessValues, Solver},
    statistics::{analyse_benchmark, ExtendedStatistics, Statistics},
    strategies::StrategyParamsContext,
    time::{strfspan, timestamp, DAY_MS},
    trading::{
        self, Basic, BasicConfig, MissedCandlePolicy, TraderParamsContext, TradingMode,
        TradingParams, TradingParamsContext, TradingSummary,
    },
    SymbolExt,
};

pub type Result<T> = std::result::Result<T, Error>;

const FITNESS_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Chandler(#[from] chandler::Error),
    #[error("{0}")]
    Informant(#[from] informant::Error),
    #[error("{0}")]
    Trading(#[from] trading::Error),
    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),
    // The fast path drifted from the actual trader; a correctness bug.
    #[error(
        "optimization results differ between the trader and the solver\ntrader: {trader:?}\n\
         solver: {solver:?}"
    )]
    FitnessMismatch {
        trader: Box<FitnessValues>,
        solver: Box<FitnessValues>,
    },
}

pub struct Config {
    pub exchange: String,
    pub quote: Decimal,
    // Pinned or open strategy genes.
    pub strategy: StrategyParamsContext,
    pub symbols: Option<Vec<String>>,
    pub intervals: Option<Vec<u64>>,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub missed_candle_policy: Option<MissedCandlePolicy>,
    pub stop_loss: Option<Decimal>,
    pub trail_stop_loss: Option<bool>,
    pub take_profit: Option<Decimal>,
    pub long: Option<bool>,
    pub short: Option<bool>,
    pub population_size: usize,
    pub max_generations: usize,
    pub mutation_probability: f64,
    pub seed: Option<u64>,
    pub fiat_exchange: Option<String>,
    pub fiat_asset: String,
}

impl Config {
    pub fn new(exchange: &str, quote: Decimal) -> Self {
        Self {
            exchange: exchange.to_owned(),
            quote,
            strategy: StrategyParamsContext::None,
            symbols: None,
            intervals: None,
            start: None,
            end: None,
            missed_candle_policy: Some(MissedCandlePolicy::Ignore),
            stop_loss: Some(Decimal::ZERO),
            trail_stop_loss: Some(true),
            take_profit: Some(Decimal::ZERO),
            long: Some(true),
            short: Some(false),
            population_size: 50,
            max_generations: 1000,
            mutation_probability: 0.2,
            seed: None,
            fiat_exchange: None,
            fiat_asset: "usdt".to_owned(),
        }
    }
}

pub struct OptimizationSummary {
    pub individual: Individual<TradingParams>,
    pub trading_config: BasicConfig,
    pub trading_summary: TradingSummary,
    pub portfolio_stats: Statistics,
    pub seed: u64,
    pub generations: usize,
}

#[derive(Clone)]
struct SymbolCtx {
    fees: Fees,
    filters: Filters,
    borrow_info: BorrowInfo,
    base_prices: Vec<f64>,
    quote_prices: Option<Vec<f64>>,
}

// NSGA-II search over (symbol, interval, risk and strategy parameters),
// scored by the solver over cached candles. The winning individual is
// replayed through the actual trader and the fitness tuples are cross-checked
// to keep the fast path honest.
pub struct Optimizer {
    solver: Arc<dyn Solver>,
    chandler: Chandler,
    informant: Informant,
    prices: Prices,
    trader: Basic,
}

impl Optimizer {
    pub fn new(
        solver: Arc<dyn Solver>,
        chandler: Chandler,
        informant: Informant,
        prices: Prices,
        trader: Basic,
    ) -> Self {
        Self {
            solver,
            chandler,
            informant,
            prices,
            trader,
        }
    }

    pub async fn run(
        &self,
        config: Config,
        cancellation: Option<Arc<AtomicBool>>,
    ) -> Result<OptimizationSummary> {
        let now = timestamp();

        if config.quote <= Decimal::ZERO {
            return Err(Error::InvalidConfig("quote must be positive".to_owned()));
        }
        if config.population_size < 2 {
            return Err(Error::InvalidConfig(
                "population size must be at least 2".to_owned(),
            ));
        }
        if let (Some(start), Some(end)) = (config.start, config.end) {
            if end <= start {
                return Err(Error::InvalidConfig("end must be after start".to_owned()));
            }
        }

        let symbols = self
            .informant
            .list_symbols(&config.exchange, config.symbols.as_deref())?;
        if symbols.is_empty() {
            return Err(Error::InvalidConfig("no symbols to optimize".to_owned()));
        }
        let intervals = self
            .informant
            .list_candle_intervals(&config.exchange, config.intervals.as_deref())?;
        if intervals.is_empty() {
            return Err(Error::InvalidConfig("no intervals to optimize".to_owned()));
        }

        let start = match config.start {
            Some(start) => start,
            None => self.request_start(&config.exchange, &symbols, &intervals).await?,
        };
        let end = config.end.unwrap_or(now);
        if start >= end {
            return Err(Error::InvalidConfig(
                "no history between start and end".to_owned(),
            ));
        }

        info!(
            "optimizing {} {:?} {:?} between {}",
            config.exchange,
            symbols,
            intervals,
            strfspan(start, end)
        );

        let fiat_exchange = config
            .fiat_exchange
            .clone()
            .unwrap_or_else(|| config.exchange.clone());
        let fiat_prices = self
            .prices
            .map_asset_prices(&fiat_exchange, &symbols, start, end, &config.fiat_asset)
            .await?;
        // BTC prices drive the benchmark statistics.
        let benchmark = analyse_benchmark(
            fiat_prices
                .get("btc")
                .ok_or_else(|| Error::InvalidConfig("missing btc fiat prices".to_owned()))?,
        );

        let candles = self
            .chandler
            .map_symbol_interval_candles(&config.exchange, &symbols, &intervals, start, end)
            .await?;
        for ((symbol, interval), symbol_candles) in &candles {
            if symbol_candles.is_empty() {
                warn!(
                    "no {} {} candles found between {}",
                    symbol,
                    interval,
                    strfspan(start, end)
                );
            }
        }

        let margin_multiplier = self.informant.get_margin_multiplier(&config.exchange)?;
        let mut symbol_ctxs = HashMap::with_capacity(symbols.len());
        for symbol in &symbols {
            let (fees, filters) = self.informant.get_fees_filters(&config.exchange, symbol)?;
            let borrow_info = self
                .informant
                .get_borrow_info(&config.exchange, symbol, symbol.base_asset())
                .unwrap_or_default();
            let base_prices = fiat_prices
                .get(symbol.base_asset())
                .ok_or_else(|| {
                    Error::InvalidConfig(format!("missing {} fiat prices", symbol.base_asset()))
                })?
                .clone();
            let quote_prices = fiat_prices.get(symbol.quote_asset()).cloned();
            symbol_ctxs.insert(
                symbol.clone(),
                SymbolCtx {
                    fees,
                    filters,
                    borrow_info,
                    base_prices,
                    quote_prices,
                },
            );
        }

        let ctx = TradingParamsContext {
            trader: TraderParamsContext {
                symbols: symbols.clone(),
                intervals: intervals.clone(),
                missed_candle_policy: config.missed_candle_policy,
                stop_loss: config.stop_loss,
                trail_stop_loss: config.trail_stop_loss,
                take_profit: config.take_profit,
                long: config.long,
                short: config.short,
            },
            strategy: config.strategy.clone(),
        };

        let evaluation = BasicEvaluation {
            solver: self.solver.clone(),
            candles,
            symbol_ctxs: symbol_ctxs.clone(),
            benchmark_g_returns: benchmark.g_returns.clone(),
            margin_multiplier,
            quote: config.quote,
            start,
            end,
            stats_interval: DAY_MS,
        };
        let indpb = 1.0 / TradingParams::len() as f64;
        let algorithm = GeneticAlgorithm::new(
            evaluation,
            NsgaII,
            UniformCrossover::new(indpb),
            UniformMutation::new(indpb),
        );

        let cancellation = cancellation.unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        let population_size = config.population_size;
        let max_generations = config.max_generations;
        let mutation_probability = config.mutation_probability;
        let seed = config.seed;

        info!("evolving");
        let evolve_start = timestamp();
        let evolution = {
            let cancellation = cancellation.clone();
            tokio::task::spawn_blocking(move || {
                algorithm.evolve(
                    &ctx,
                    population_size,
                    max_generations,
                    mutation_probability,
                    seed,
                    &cancellation,
                    |generation, _population| debug!("generation {} complete", generation),
                )
            })
            .await
            .expect("evolution task")
        };
        info!(
            "evolution finished in {}ms over {} generation(s)",
            timestamp() - evolve_start,
            evolution.generations
        );

        let best = evolution.hall_of_fame.into_iter().next().expect("hall of fame");

        info!("building trading summary from the best result");
        let (trading_config, trading_summary) =
            self.build_summary(&config, start, end, &best).await?;

        let symbol_ctx = &symbol_ctxs[&best.chromosome.trader.symbol];
        let portfolio_stats = Statistics::compose(
            &trading_summary,
            &symbol_ctx.base_prices,
            symbol_ctx.quote_prices.as_deref(),
            &benchmark.g_returns,
            DAY_MS,
        );

        self.validate(&best, &trading_summary, &portfolio_stats.extended)?;

        Ok(OptimizationSummary {
            individual: best,
            trading_config,
            trading_summary,
            portfolio_stats,
            seed: evolution.seed,
            generations: evolution.generations,
        })
    }

    // The earliest time at which every symbol and interval combination has
    // data.
    async fn request_start(
        &self,
        exchange: &str,
        symbols: &[String],
        intervals: &[u64],
    ) -> Result<u64> {
        let mut latest_first = 0;
        for symbol in symbols {
            for &interval in intervals {
                let first = self
                    .chandler
                    .get_first_candle(exchange, symbol, interval)
                    .await?;
                latest_first = u64::max(latest_first, first.time);
            }
        }
        Ok(latest_first)
    }

    async fn build_summary(
        &self,
        config: &Config,
        start: u64,
        end: u64,
        best: &Individual<TradingParams>,
    ) -> Result<(BasicConfig, TradingSummary)> {
        let trader_params = &best.chromosome.trader;
        let interval = trader_params.interval;
        let trading_config = BasicConfig {
            exchange: config.exchange.clone(),
            symbol: trader_params.symbol.clone(),
            interval,
            start: Some(floor_multiple(start, interval)),
            end: floor_multiple(end, interval),
            quote: config.quote,
            strategy: best.chromosome.strategy.clone(),
            stop_loss: trader_params.stop_loss,
            trail_stop_loss: trader_params.trail_stop_loss,
            take_profit: trader_params.take_profit,
            mode: TradingMode::Backtest,
            channel: "default".to_owned(),
            missed_candle_policy: trader_params.missed_candle_policy,
            adjust_start: false,
            long: trader_params.long,
            short: trader_params.short,
            close_on_exit: true,
            exchange_candle_timeout: None,
        };

        let mut trader_state = self.trader.initialize(trading_config.clone()).await?;
        match self.trader.run(&mut trader_state).await {
            Ok(_) => {}
            // The solver scores such runs by their partial summary; mirror it.
            Err(trading::Error::InsufficientFunds(message)) => {
                warn!("trader stopped early: {}", message)
            }
            Err(err) => return Err(err.into()),
        }
        Ok((trading_config, trader_state.summary.clone()))
    }

    fn validate(
        &self,
        best: &Individual<TradingParams>,
        trading_summary: &TradingSummary,
        extended: &ExtendedStatistics,
    ) -> Result<()> {
        info!("validating the solver fitness values against the actual trader");
        let trader_fitness = FitnessValues::from_summary(trading_summary, extended);
        let solver_fitness = best.fitness();
        if !trader_fitness.isclose(solver_fitness, FITNESS_TOLERANCE) {
            return Err(Error::FitnessMismatch {
                trader: Box::new(trader_fitness),
                solver: Box::new(*solver_fitness),
            });
        }
        Ok(())
    }
}

struct BasicEvaluation {
    solver: Arc<dyn Solver>,
    candles: HashMap<(String, u64), Vec<Candle>>,
    symbol_ctxs: HashMap<String, SymbolCtx>,
    benchmark_g_returns: Vec<f64>,
    margin_multiplier: u32,
    quote: Decimal,
    start: u64,
    end: u64,
    stats_interval: u64,
}

impl BasicEvaluation {
    fn evaluate_individual(&self, chromosome: &TradingParams) -> FitnessValues {
        let trader_params = &chromosome.trader;
        let symbol_ctx = &self.symbol_ctxs[&trader_params.symbol];
        let candles = &self.candles[&(trader_params.symbol.clone(), trader_params.interval)];

        self.solver.solve(&solver::Config {
            candles,
            fees: &symbol_ctx.fees,
            filters: &symbol_ctx.filters,
            borrow_info: &symbol_ctx.borrow_info,
            margin_multiplier: self.margin_multiplier,
            symbol: &trader_params.symbol,
            interval: trader_params.interval,
            start: floor_multiple(self.start, trader_params.interval),
            end: floor_multiple(self.end, trader_params.interval),
            quote: self.quote,
            strategy_params: &chromosome.strategy,
            missed_candle_policy: trader_params.missed_candle_policy,
            stop_loss: trader_params.stop_loss,
            trail_stop_loss: trader_params.trail_stop_loss,
            take_profit: trader_params.take_profit,
            long: trader_params.long,
            short: trader_params.short,
            base_fiat_prices: &symbol_ctx.base_prices,
            quote_fiat_prices: symbol_ctx.quote_prices.as_deref(),
            benchmark_g_returns: &self.benchmark_g_returns,
            stats_interval: self.stats_interval,
        })
    }
}

impl Evaluation for BasicEvaluation {
    type Chromosome = TradingParams;

    fn evaluate(&self, population: &mut [Individual<TradingParams>]) {
        population
            .par_iter_mut()
            .for_each(|individual| {
                individual.fitness = Some(self.evaluate_individual(&individual.chromosome))
            });
    }
}
