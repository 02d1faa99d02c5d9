use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{
    exchange::{self, Exchange, OrderRequest, OrderResult, OrderType, Side},
    informant::Informant,
};

pub type Result<T> = exchange::Result<T>;

#[derive(Clone, Debug)]
pub struct BrokerOrder {
    pub exchange: String,
    pub symbol: String,
    // Either a base size or a quote amount to spend.
    pub size: Option<Decimal>,
    pub quote: Option<Decimal>,
    pub account: String,
    pub test: bool,
}

// Uniform order execution for the trader. Implementations may be smarter
// than a plain market order (e.g. limit chasing); the trader only relies on
// the returned fills.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn buy(&self, order: BrokerOrder) -> Result<OrderResult>;
    async fn sell(&self, order: BrokerOrder) -> Result<OrderResult>;
}

// Sizes the order by the exchange filters and places a plain market order.
pub struct Market {
    informant: Informant,
    exchanges: HashMap<String, Arc<dyn Exchange>>,
}

impl Market {
    pub fn new(informant: Informant, exchanges: Vec<Arc<dyn Exchange>>) -> Self {
        Self {
            informant,
            exchanges: exchanges
                .into_iter()
                .map(|exchange| (exchange.name().to_owned(), exchange))
                .collect(),
        }
    }

    fn get_exchange(&self, exchange: &str) -> Result<Arc<dyn Exchange>> {
        self.exchanges
            .get(exchange)
            .cloned()
            .ok_or_else(|| exchange::Error::Exchange(format!("exchange {} not configured", exchange)))
    }

    async fn place_market_order(&self, order: BrokerOrder, side: Side) -> Result<OrderResult> {
        let exchange = self.get_exchange(&order.exchange)?;
        let (_, filters) = self
            .informant
            .get_fees_filters(&order.exchange, &order.symbol)
            .map_err(|err| exchange::Error::Order(err.to_string()))?;

        let size = match order.size {
            Some(size) => {
                let size = filters.size.round_down(size);
                if !filters.size.valid(size) {
                    return Err(exchange::Error::Order(format!(
                        "size {} does not pass the filters of {}",
                        size, order.symbol
                    )));
                }
                Some(size)
            }
            None => None,
        };
        if size.is_none() && order.quote.is_none() {
            return Err(exchange::Error::Order(
                "either size or quote must be specified".to_owned(),
            ));
        }

        exchange
            .place_order(OrderRequest {
                symbol: order.symbol,
                side,
                type_: OrderType::Market,
                size,
                quote: order.quote,
                price: None,
                time_in_force: None,
                client_id: None,
                account: order.account,
            })
            .await
    }
}

#[async_trait]
impl Broker for Market {
    async fn buy(&self, order: BrokerOrder) -> Result<OrderResult> {
        self.place_market_order(order, Side::Buy).await
    }

    async fn sell(&self, order: BrokerOrder) -> Result<OrderResult> {
        self.place_market_order(order, Side::Sell).await
    }
}
