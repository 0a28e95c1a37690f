//! OutcomeSink implementations.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::domain::RunEvent;
use crate::ports::OutcomeSink;

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutcomeSink for ChannelSink {
    fn emit(&self, event: RunEvent) {
        // ignore send error: the receiver may already be dropped
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutcomeSink for CollectingSink {
    fn emit(&self, event: RunEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunId;

    fn started(target: &str) -> RunEvent {
        RunEvent::Started {
            run: RunId::generate(),
            target: target.to_string(),
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(started("a"));
        sink.emit(started("b"));
        drop(sink);

        let mut targets = Vec::new();
        while let Some(RunEvent::Started { target, .. }) = rx.recv().await {
            targets.push(target);
        }
        assert_eq!(targets, vec!["a", "b"]);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(started("a"));
    }

    #[test]
    fn collecting_sink_keeps_everything() {
        let sink = CollectingSink::new();
        sink.emit(started("a"));
        assert_eq!(sink.events().len(), 1);
    }
}
