//! GreeterListener - 受信メッセージを 1 つの MessageHandler に同期的に渡す
//!
//! retry も ack もしない。channel が閉じたら終了。

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &str);
}

pub struct GreeterListener<H> {
    handler: H,
}

impl<H: MessageHandler> GreeterListener<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Drain `inbox` until every sender is gone. Returns how many messages
    /// were handled.
    pub async fn listen(&self, mut inbox: mpsc::Receiver<String>) -> usize {
        let mut handled = 0;
        while let Some(message) = inbox.recv().await {
            debug!(%message, "greeter received");
            self.handler.handle(&message);
            handled += 1;
        }
        handled
    }
}

/// Records one greeting per message.
pub struct Greeter {
    salutation: String,
    greetings: Mutex<Vec<String>>,
}

impl Greeter {
    pub fn new(salutation: impl Into<String>) -> Self {
        Self {
            salutation: salutation.into(),
            greetings: Mutex::new(Vec::new()),
        }
    }

    pub fn greetings(&self) -> Vec<String> {
        self.greetings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MessageHandler for Greeter {
    fn handle(&self, message: &str) {
        let greeting = format!("{}, {message}!", self.salutation);
        self.greetings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(greeting);
    }
}
