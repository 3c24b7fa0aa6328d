//! Prumo Core Library
//!
//! Shared functionality for the Prumo WhatsApp financial assistant:
//! - Lexical extractors for amounts, categories, dates and notes
//! - Rule-based message classification with confidence scores
//! - Pluggable LLM fallback providers (Ollama, disabled)
//! - Query intent resolution with deterministic heuristics
//! - Per-user conversation state machine for category negotiation
//! - Idempotent admission of external channel messages
//! - Collaborator boundaries for storage and outbound replies

pub mod classify;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod llm;
pub mod models;
pub mod outbound;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod tracker;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classify::Classifier;
pub use dedup::{Admission, IdempotencyGuard};
pub use error::{Error, Result};
pub use llm::{
    DisabledProvider, LlmClient, LlmConfig, LlmProvider, OllamaProvider, ParseContext,
    ProviderKind, MAX_LLM_CONFIDENCE,
};
pub use models::{
    local_now, local_offset, Category, CategoryKind, CategoryTotal, ExpenseRecord,
    InboundMessage, MessageKind, NewEvent, NewPending, NewTransaction, ParsedData, ParsedMessage,
    PendingTransaction, PeriodSummary, BUDGET_CATEGORIES, DEFAULT_CATEGORY,
};
pub use outbound::{MemorySender, MessageSender};
pub use pipeline::MessageProcessor;
pub use query::{
    heuristic_intent, resolve_intent, DateWindow, QueryIntent, QueryKind, QueryPeriod,
};
pub use storage::{MemoryStorage, Storage};
pub use tracker::{ConversationTracker, PENDING_EXPIRY_SECS};
