//! Rule-based message classifier
//!
//! Combines the lexical extractors and keyword sets into a coarse intent
//! before any network call. Rule order is a total order: query keywords win
//! over amounts, amounts over event times, and the LLM fallback only sees
//! messages the rules could not place.

use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::extract::{
    clean_description, extract_amount, extract_category_hint, extract_date, extract_datetime,
};
use crate::llm::{LlmClient, LlmProvider, ParseContext};
use crate::models::{local_now, MessageKind, ParsedData, ParsedMessage, DEFAULT_CATEGORY};

/// Words that mark a message as an analytical query.
///
/// Substring matching, so "gastos" also catches "gastos?" and similar. Plain
/// conversational words ("como", "vai") stay out of the set; a greeting must
/// fall through to the fallback, not read as a report request.
const QUERY_KEYWORDS: &[&str] = &[
    "saldo", "resumo", "total", "gastos", "quanto", "relatório", "maior", "menor", "mais",
    "menos", "extrato", "balanço", "onde", "quando", "qual", "quais", "mostrar", "listar",
    "consultar", "verificar", "conferir",
];

/// Words that mark a transaction as income rather than expense
const INCOME_KEYWORDS: &[&str] = &[
    "receb", "salário", "pagamento", "deposito", "entrada", "freelance",
];

/// Message classifier with an injected LLM fallback.
///
/// Constructed once at startup and shared; the fallback client is passed in
/// explicitly so the classifier stays testable without network access.
#[derive(Clone)]
pub struct Classifier {
    llm: LlmClient,
}

impl Classifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Classify one inbound message against wall-clock now
    pub async fn classify(&self, text: &str) -> ParsedMessage {
        self.classify_at(text, local_now()).await
    }

    /// Classify against an explicit `now` (deterministic under test)
    pub async fn classify_at(&self, text: &str, now: DateTime<FixedOffset>) -> ParsedMessage {
        let normalized = text.to_lowercase().trim().to_string();

        // 1. Query keywords take precedence over everything else
        if QUERY_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
            return ParsedMessage {
                kind: MessageKind::Query,
                confidence: 0.9,
                reasoning: "Palavra-chave de consulta identificada".into(),
                data: None,
            };
        }

        // 2. An extractable amount means a transaction
        if let Some(amount) = extract_amount(&normalized) {
            let category = extract_category_hint(&normalized);
            let date = extract_date(&normalized, now).unwrap_or(now);
            let is_income = INCOME_KEYWORDS.iter().any(|kw| normalized.contains(kw));
            let note = clean_description(text);

            let (confidence, reasoning) = match category {
                Some(category) => (0.85, format!("Valor e categoria ({}) identificados", category)),
                None => (0.6, "Valor identificado, categoria inferida".to_string()),
            };

            return ParsedMessage {
                kind: MessageKind::Transaction,
                confidence,
                reasoning,
                data: Some(ParsedData::Transaction {
                    amount,
                    category: Some(category.unwrap_or(DEFAULT_CATEGORY).to_string()),
                    date: Some(date.with_timezone(&Utc)),
                    note,
                    is_income,
                }),
            };
        }

        // 3. A date/time means an event; the title keeps the original casing
        if let Some(starts_at) = extract_datetime(&normalized, now) {
            return ParsedMessage {
                kind: MessageKind::Event,
                confidence: 0.75,
                reasoning: "Data/hora e título de evento identificados".into(),
                data: Some(ParsedData::Event {
                    title: text.to_string(),
                    starts_at: starts_at.with_timezone(&Utc),
                }),
            };
        }

        // 4. LLM fallback, only when enabled
        if self.llm.is_enabled() {
            debug!(text = %text.chars().take(50).collect::<String>(), "Using LLM fallback");
            let context = ParseContext::standard(now.date_naive());
            let result = self.llm.parse_message(text, &context).await;
            if result.kind != MessageKind::Unknown {
                debug!(kind = %result.kind, confidence = result.confidence, "LLM fallback matched");
                return ParsedMessage {
                    reasoning: format!("LLM: {}", result.reasoning),
                    ..result
                };
            }
        }

        // 5. Nothing matched
        ParsedMessage::unknown("Nenhum padrão identificado pelo parser tradicional ou LLM")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::local_offset;
    use chrono::TimeZone;

    fn classifier() -> Classifier {
        Classifier::new(LlmClient::disabled())
    }

    fn noon() -> DateTime<FixedOffset> {
        local_offset().with_ymd_and_hms(2024, 10, 15, 12, 0, 0).unwrap()
    }

    async fn classify(text: &str) -> ParsedMessage {
        classifier().classify_at(text, noon()).await
    }

    #[tokio::test]
    async fn test_transaction_with_amount_and_relative_date() {
        let parsed = classify("mercado 52,30 hoje").await;
        assert_eq!(parsed.kind, MessageKind::Transaction);
        assert!(parsed.confidence > 0.5);
        match parsed.data {
            Some(ParsedData::Transaction { amount, date, .. }) => {
                assert_eq!(amount, 52.30);
                assert_eq!(date.unwrap(), noon().with_timezone(&Utc));
            }
            other => panic!("expected transaction data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transaction_with_currency_marker() {
        let parsed = classify("uber R$ 25,50").await;
        assert_eq!(parsed.kind, MessageKind::Transaction);
        assert!(parsed.confidence > 0.5);
        match parsed.data {
            Some(ParsedData::Transaction { amount, category, .. }) => {
                assert_eq!(amount, 25.50);
                assert_eq!(category.as_deref(), Some(DEFAULT_CATEGORY));
            }
            other => panic!("expected transaction data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transaction_confidence_raised_by_category_hint() {
        let with_hint = classify("cerveja no bar 30").await;
        assert_eq!(with_hint.confidence, 0.85);
        match with_hint.data {
            Some(ParsedData::Transaction { category, .. }) => {
                assert_eq!(category.as_deref(), Some("Prazeres"));
            }
            other => panic!("expected transaction data, got {:?}", other),
        }

        let without_hint = classify("uber 25").await;
        assert_eq!(without_hint.confidence, 0.6);
    }

    #[tokio::test]
    async fn test_income_keywords_flip_the_split() {
        let parsed = classify("recebido 3000 salário").await;
        match parsed.data {
            Some(ParsedData::Transaction { is_income, .. }) => assert!(is_income),
            other => panic!("expected transaction data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_keyword_beats_amount() {
        let parsed = classify("quanto gastei? uns 50 acho").await;
        assert_eq!(parsed.kind, MessageKind::Query);
        assert_eq!(parsed.confidence, 0.9);
        assert!(parsed.data.is_none());
    }

    #[tokio::test]
    async fn test_query_messages() {
        assert_eq!(classify("saldo do mês").await.kind, MessageKind::Query);
        assert_eq!(classify("quanto gastei esse mês?").await.kind, MessageKind::Query);
    }

    #[tokio::test]
    async fn test_event_with_weekday_and_hour() {
        let parsed = classify("Dentista sex 10h").await;
        assert_eq!(parsed.kind, MessageKind::Event);
        assert!(parsed.confidence > 0.5);
        match parsed.data {
            Some(ParsedData::Event { title, .. }) => assert!(title.contains("Dentista")),
            other => panic!("expected event data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_with_explicit_datetime() {
        let parsed = classify("reunião 18/10 14:30").await;
        assert_eq!(parsed.kind, MessageKind::Event);
    }

    #[tokio::test]
    async fn test_unknown_with_disabled_llm() {
        let parsed = classify("olá como vai?").await;
        assert_eq!(parsed.kind, MessageKind::Unknown);
        assert_eq!(parsed.confidence, 0.0);
        assert!(parsed.data.is_none());
    }
}
