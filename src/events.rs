use std::{collections::HashMap, sync::Mutex};

use tokio::sync::broadcast;

use crate::{
    common::Candle,
    trading::{OpenPosition, Position},
};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub enum TradingEvent {
    Candle(Candle),
    PositionsOpened(Vec<OpenPosition>),
    PositionsClosed(Vec<Position>),
    Finished,
    Errored(String),
}

// Typed publish/subscribe. Each trader instance emits into its own named
// channel; plugins subscribe by name. Emitting without subscribers is a no-op.
#[derive(Default)]
pub struct Events {
    channels: Mutex<HashMap<String, broadcast::Sender<TradingEvent>>>,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, channel: &str, event: TradingEvent) {
        let mut channels = self.channels.lock().expect("events lock");
        let sender = channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let _ = sender.send(event);
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<TradingEvent> {
        let mut channels = self.channels.lock().expect("events lock");
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let events = Events::new();
        let mut receiver = events.subscribe("default");

        events.emit("default", TradingEvent::Finished);

        assert!(matches!(
            receiver.recv().await.unwrap(),
            TradingEvent::Finished
        ));
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let events = Events::new();
        events.emit("default", TradingEvent::Finished);
    }
}
