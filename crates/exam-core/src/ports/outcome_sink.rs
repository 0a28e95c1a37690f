//! OutcomeSink port - 結果ストリームの抽象化
//!
//! 実装は `impls::sink`（channel, collecting）。

use crate::domain::RunEvent;

pub trait OutcomeSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl OutcomeSink for NoopSink {
    fn emit(&self, _event: RunEvent) {}
}
