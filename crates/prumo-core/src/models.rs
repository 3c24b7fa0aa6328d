//! Domain models for Prumo

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Name of the fallback category every unresolved transaction lands in.
pub const DEFAULT_CATEGORY: &str = "Outros";

/// The fixed budget categories every new user starts with.
///
/// "Outros" is not seeded; it is created on demand when a pending
/// transaction expires or a category hint defaults to it.
pub const BUDGET_CATEGORIES: &[&str] = &[
    "Custos Fixos",
    "Conforto",
    "Liberdade Financeira",
    "Aumentar Renda/Empreender",
    "Prazeres",
    "Metas",
    "Prazeres Futuros",
    "Reserva de Oportunidade",
];

/// Timezone all message dates resolve against: America/Sao_Paulo.
/// Fixed UTC-3 offset (Brazil abolished DST in 2019).
pub fn local_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("valid offset")
}

/// Current wall-clock time in the assistant's timezone
pub fn local_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&local_offset())
}

/// Coarse classification of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Transaction,
    Event,
    Query,
    Unknown,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Event => "event",
            Self::Query => "query",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "transaction" => Ok(Self::Transaction),
            "event" => Ok(Self::Event),
            "query" => Ok(Self::Query),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown message kind: {}", s)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Side of the ledger a category belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Expense,
    Income,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user budget category
///
/// Owned by the storage collaborator; the core only looks categories up and
/// creates the "Outros" fallback on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub kind: CategoryKind,
    pub is_system: bool,
}

/// Payload extracted from a recognized message.
///
/// Present iff the message classified as a transaction or an event.
#[derive(Debug, Clone)]
pub enum ParsedData {
    Transaction {
        amount: f64,
        /// Category hint from the keyword table, or the default "Outros"
        category: Option<String>,
        date: Option<DateTime<Utc>>,
        note: String,
        is_income: bool,
    },
    Event {
        /// Original message text, casing preserved
        title: String,
        starts_at: DateTime<Utc>,
    },
}

/// Outcome of classifying one inbound message
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub kind: MessageKind,
    /// Confidence in [0, 1]; always 0 for `Unknown`
    pub confidence: f64,
    /// Natural-language description of which rule fired
    pub reasoning: String,
    pub data: Option<ParsedData>,
}

impl ParsedMessage {
    pub fn unknown(reasoning: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Unknown,
            confidence: 0.0,
            reasoning: reasoning.into(),
            data: None,
        }
    }
}

/// A recognized transaction waiting for the user's category choice.
///
/// At most one pending record is active (the most recently created) per user;
/// older ones are only ever resolved by the expiry sweep.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub id: i64,
    pub user_id: String,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub raw_message: String,
    pub is_income: bool,
    pub created_at: DateTime<Utc>,
}

impl PendingTransaction {
    pub fn kind(&self) -> CategoryKind {
        if self.is_income {
            CategoryKind::Income
        } else {
            CategoryKind::Expense
        }
    }
}

/// One normalized message from the external channel
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Idempotency key assigned by the channel
    pub message_id: String,
    /// Sender identifier (WhatsApp number)
    pub from: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A recognized transaction about to enter category negotiation
#[derive(Debug, Clone)]
pub struct NewPending {
    pub user_id: String,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub raw_message: String,
    pub is_income: bool,
}

/// A finalized transaction handed to the storage collaborator
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub amount: f64,
    pub category_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
}

/// A scheduled event handed to the storage collaborator
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: String,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub raw_message: String,
}

/// Single expense row returned by the largest/smallest/recent aggregations
#[derive(Debug, Clone)]
pub struct ExpenseRecord {
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
    pub category_name: String,
}

/// Aggregated spend for one category
#[derive(Debug, Clone)]
pub struct CategoryTotal {
    pub category_name: String,
    pub total: f64,
}

/// Income/expense totals for a period
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodSummary {
    pub income: f64,
    pub expense: f64,
}

impl PeriodSummary {
    pub fn balance(&self) -> f64 {
        self.income - self.expense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_round_trip() {
        for kind in [
            MessageKind::Transaction,
            MessageKind::Event,
            MessageKind::Query,
            MessageKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_has_zero_confidence() {
        let parsed = ParsedMessage::unknown("nada");
        assert_eq!(parsed.kind, MessageKind::Unknown);
        assert_eq!(parsed.confidence, 0.0);
        assert!(parsed.data.is_none());
    }

    #[test]
    fn test_pending_kind_follows_income_flag() {
        let pending = PendingTransaction {
            id: 1,
            user_id: "u1".into(),
            amount: 10.0,
            occurred_at: Utc::now(),
            note: String::new(),
            raw_message: String::new(),
            is_income: true,
            created_at: Utc::now(),
        };
        assert_eq!(pending.kind(), CategoryKind::Income);
    }
}
