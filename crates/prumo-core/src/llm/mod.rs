//! Pluggable LLM fallback providers
//!
//! The rule classifier only reaches for a model when its deterministic rules
//! come up empty, and the pipeline must keep working when no model is
//! reachable. This module provides a backend-agnostic interface for that
//! fallback step.
//!
//! # Architecture
//!
//! - `LlmProvider` trait: defines the interface for all providers
//! - `LlmClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Provider implementations: `OllamaProvider`, `DisabledProvider`
//!
//! The factory (`LlmClient::create_and_probe`) probes the configured backend
//! and substitutes `DisabledProvider` whenever the probe fails, so a missing
//! or broken inference server can never hard-fail the pipeline.
//!
//! # Configuration
//!
//! Environment variables:
//! - `LLM_ENABLED`: "true" to enable the fallback. Default: disabled
//! - `LLM_PROVIDER`: Provider to use (ollama, disabled). Default: disabled
//! - `LLM_BASE_URL`: Ollama server URL (default: http://localhost:11434)
//! - `LLM_MODEL`: Model name (default: gemma2:2b)
//! - `LLM_MAX_TOKENS`: Generation budget (default: 500)
//! - `LLM_TEMPERATURE`: Sampling temperature (default: 0.1)

mod disabled;
mod ollama;
pub mod parsing;

pub use disabled::DisabledProvider;
pub use ollama::OllamaProvider;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{ParsedMessage, BUDGET_CATEGORIES, DEFAULT_CATEGORY};
use crate::query::{QueryKind, QueryPeriod};

/// Confidence ceiling for any LLM result.
///
/// Kept below the score of a rule-based transaction/event match so the
/// fallback can never out-vote a deterministic rule result.
pub const MAX_LLM_CONFIDENCE: f64 = 0.7;

/// Scope description embedded in every fallback prompt
pub const PROJECT_SCOPE: &str = "\
Assessor Financeiro via WhatsApp que:
- Registra transações financeiras (gastos e receitas)
- Categoriza automaticamente por: Custos Fixos, Conforto, Liberdade Financeira,
  Aumentar Renda/Empreender, Prazeres, Metas, Prazeres Futuros, Reserva de Oportunidade
- Agenda eventos e lembretes
- Responde consultas sobre saldo e relatórios
- Funciona através de mensagens de texto simples";

/// Context handed to the fallback provider alongside the message.
///
/// Bounds what the model may claim: the closed category list, the current
/// date, the project scope and the confidence ceiling.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub available_categories: Vec<String>,
    pub current_date: NaiveDate,
    pub project_scope: String,
    pub max_confidence: f64,
}

impl ParseContext {
    /// Standard context: the fixed budget categories plus the fallback
    /// category, today's date, the project scope and the global ceiling.
    pub fn standard(current_date: NaiveDate) -> Self {
        let mut categories: Vec<String> =
            BUDGET_CATEGORIES.iter().map(|c| c.to_string()).collect();
        categories.push(DEFAULT_CATEGORY.to_string());
        Self {
            available_categories: categories,
            current_date,
            project_scope: PROJECT_SCOPE.to_string(),
            max_confidence: MAX_LLM_CONFIDENCE,
        }
    }
}

/// Which provider the configuration selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    Disabled,
}

/// LLM provider configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn disabled() -> Self {
        Self {
            provider: ProviderKind::Disabled,
            base_url: String::new(),
            model: String::new(),
            max_tokens: 500,
            temperature: 0.1,
        }
    }

    pub fn ollama(base_url: &str, model: &str) -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: base_url.to_string(),
            model: model.to_string(),
            max_tokens: 500,
            temperature: 0.1,
        }
    }

    /// Read configuration from environment variables
    pub fn from_env() -> Self {
        let enabled = std::env::var("LLM_ENABLED")
            .map(|v| v == "true")
            .unwrap_or(false);
        let provider = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "disabled".to_string());

        if !enabled || provider.to_lowercase() != "ollama" {
            return Self::disabled();
        }

        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gemma2:2b".to_string());
        let max_tokens = std::env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        let temperature = std::env::var("LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.1);

        Self {
            provider: ProviderKind::Ollama,
            base_url,
            model,
            max_tokens,
            temperature,
        }
    }
}

/// Trait defining the interface for all LLM fallback providers
///
/// `parse_message` is infallible by contract: any backend failure degrades to
/// an `unknown` result whose reasoning names the failure.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (for logging)
    fn name(&self) -> &'static str;

    /// Lightweight reachability and model-presence probe
    async fn is_available(&self) -> bool;

    /// Parse a message the rule classifier could not place
    async fn parse_message(&self, text: &str, context: &ParseContext) -> ParsedMessage;

    /// Tier-1 query analysis: a strict `kind|period` token pair.
    /// Providers without inference return `None` and the caller falls back
    /// to heuristics.
    async fn resolve_query_intent(&self, _text: &str) -> Option<(QueryKind, QueryPeriod)> {
        None
    }
}

/// Concrete LLM client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum LlmClient {
    Ollama(OllamaProvider),
    Disabled(DisabledProvider),
}

impl LlmClient {
    /// Create the provider the configuration names, without probing
    pub fn create(config: &LlmConfig) -> Self {
        match config.provider {
            ProviderKind::Ollama => LlmClient::Ollama(OllamaProvider::from_config(config)),
            ProviderKind::Disabled => LlmClient::Disabled(DisabledProvider),
        }
    }

    /// Create the configured provider and probe its availability,
    /// substituting the disabled provider when the probe fails.
    pub async fn create_and_probe(config: &LlmConfig) -> Self {
        let provider = Self::create(config);
        if provider.is_enabled() && !provider.is_available().await {
            tracing::warn!(
                provider = provider.name(),
                "LLM provider unavailable, substituting disabled provider"
            );
            return LlmClient::Disabled(DisabledProvider);
        }
        provider
    }

    pub fn disabled() -> Self {
        LlmClient::Disabled(DisabledProvider)
    }

    /// Whether this client performs real inference
    pub fn is_enabled(&self) -> bool {
        !matches!(self, LlmClient::Disabled(_))
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    fn name(&self) -> &'static str {
        match self {
            LlmClient::Ollama(p) => p.name(),
            LlmClient::Disabled(p) => p.name(),
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            LlmClient::Ollama(p) => p.is_available().await,
            LlmClient::Disabled(p) => p.is_available().await,
        }
    }

    async fn parse_message(&self, text: &str, context: &ParseContext) -> ParsedMessage {
        match self {
            LlmClient::Ollama(p) => p.parse_message(text, context).await,
            LlmClient::Disabled(p) => p.parse_message(text, context).await,
        }
    }

    async fn resolve_query_intent(&self, text: &str) -> Option<(QueryKind, QueryPeriod)> {
        match self {
            LlmClient::Ollama(p) => p.resolve_query_intent(text).await,
            LlmClient::Disabled(p) => p.resolve_query_intent(text).await,
        }
    }
}
