//! Outbound reply boundary
//!
//! Replies are plain text addressed to the original sender. Delivery
//! mechanics (WhatsApp Business API, retries, receipts) belong to the
//! messaging collaborator; the core fires and forgets.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// Messaging collaborator the pipeline replies through
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<()>;
}

/// Sender that records every reply in memory.
///
/// Used by the test suite to assert on conversation flow, and by the local
/// chat driver to echo replies to the terminal.
#[derive(Debug, Default)]
pub struct MemorySender {
    sent: Mutex<Vec<(String, String)>>,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(to, body)` pairs sent so far, in order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sender lock").clone()
    }

    /// Bodies of every reply sent to one recipient, in order
    pub fn sent_to(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .expect("sender lock")
            .iter()
            .filter(|(recipient, _)| recipient == to)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Drain and return recorded replies
    pub fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.sent.lock().expect("sender lock"))
    }
}

#[async_trait]
impl MessageSender for MemorySender {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .expect("sender lock")
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}
