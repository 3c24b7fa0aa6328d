//! Ollama provider implementation
//!
//! HTTP client for a local Ollama server. The inference call is one-shot per
//! inbound message, bounded by a client-level timeout, and every failure
//! degrades to an `unknown` classification instead of an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::ParsedMessage;
use crate::query::{QueryKind, QueryPeriod};

use super::parsing::{parse_reply, reply_to_message};
use super::{LlmConfig, LlmProvider, ParseContext};

/// Upper bound on one inference round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama provider
///
/// Talks to `/api/generate` with deterministic-ish sampling options (low
/// temperature) and validates that the configured model is actually present
/// on the server before the factory accepts it.
#[derive(Clone)]
pub struct OllamaProvider {
    http_client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("valid http client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: 500,
            temperature: 0.1,
        }
    }

    /// Create from a full configuration
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut provider = Self::new(&config.base_url, &config.model);
        provider.max_tokens = config.max_tokens;
        provider.temperature = config.temperature;
        provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    /// One generate round trip, returning the raw response text
    async fn generate(&self, prompt: String, num_predict: u32) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                top_p: 0.9,
                top_k: 40,
                num_predict,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Http(response.error_for_status().unwrap_err()));
        }

        let body: GenerateResponse = response.json().await?;
        if body.response.trim().is_empty() {
            return Err(Error::MalformedResponse("Empty response from Ollama".into()));
        }
        Ok(body.response)
    }

    /// Scope-constrained prompt for the fallback classification
    fn build_parse_prompt(&self, text: &str, context: &ParseContext) -> String {
        format!(
            r#"Você é um parser especializado para um Assessor Financeiro via WhatsApp.
IMPORTANTE: Você deve APENAS analisar mensagens relacionadas ao escopo deste projeto.

ESCOPO DO PROJETO: {scope}

INSTRUÇÕES RIGOROSAS:
1. NUNCA invente informações que não estão na mensagem
2. APENAS identifique se a mensagem se encaixa em uma das categorias abaixo
3. Se não souber categorizar, responda type: "unknown"
4. Use apenas as categorias fornecidas
5. Confiança máxima permitida: {max_confidence}

CATEGORIAS DISPONÍVEIS:
{categories}

TIPOS DE MENSAGEM:
- transaction: Gasto ou receita com valor (ex: "gastei 30 reais no almoço")
- query: Pergunta sobre saldos/relatórios (ex: "quanto gastei hoje?")
- event: Agendamento com data/hora (ex: "reunião sexta 10h")
- unknown: Não se encaixa no escopo do projeto

DATA ATUAL: {date}

MENSAGEM PARA ANALISAR: "{text}"

Responda APENAS com JSON válido no formato:
{{
  "type": "transaction|query|event|unknown",
  "confidence": 0.0-{max_confidence},
  "reasoning": "explicação concisa",
  "data": {{ }}
}}"#,
            scope = context.project_scope,
            max_confidence = context.max_confidence,
            categories = context.available_categories.join(", "),
            date = context.current_date.format("%Y-%m-%d"),
            text = text,
        )
    }
}

/// Request to the Ollama generate API
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

/// Response from the Ollama generate API
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Response from the Ollama tags API (model listing)
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    /// Reachability check plus a model-presence check against `/api/tags`.
    ///
    /// The model match is prefix-tolerant on the model family, so a
    /// configured `gemma2:2b` accepts an installed `gemma2:latest`.
    async fn is_available(&self) -> bool {
        let version = self
            .http_client
            .get(format!("{}/api/version", self.base_url))
            .send()
            .await;
        match version {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama version probe failed");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Ollama unreachable");
                return false;
            }
        }

        let tags: TagsResponse = match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(resp) => match resp.json().await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(error = %e, "Ollama tags response unreadable");
                    return false;
                }
            },
            Err(e) => {
                warn!(error = %e, "Ollama tags probe failed");
                return false;
            }
        };

        let family = self.model.split(':').next().unwrap_or(&self.model);
        let found = tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(family));
        if !found {
            warn!(
                model = %self.model,
                available = ?tags.models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                "Configured model not present on Ollama server"
            );
        }
        found
    }

    async fn parse_message(&self, text: &str, context: &ParseContext) -> ParsedMessage {
        let prompt = self.build_parse_prompt(text, context);

        let outcome = match self.generate(prompt, self.max_tokens).await {
            Ok(raw) => {
                debug!(response = %raw.chars().take(200).collect::<String>(), "Ollama raw response");
                parse_reply(&raw).and_then(|reply| reply_to_message(reply, text, context.max_confidence))
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "LLM fallback degraded to unknown");
                let reasoning = match e {
                    Error::MalformedResponse(_) => "Resposta da LLM sem JSON válido",
                    Error::InvalidResponse(_) => "Resposta da LLM fora do esquema esperado",
                    _ => "Erro na comunicação com a LLM",
                };
                ParsedMessage::unknown(reasoning)
            }
        }
    }

    /// Strict `kind|period` probe for query analysis.
    ///
    /// Accepted only when both tokens are members of the closed vocabularies;
    /// anything else (including transport errors) is a miss and the caller
    /// falls back to heuristics.
    async fn resolve_query_intent(&self, text: &str) -> Option<(QueryKind, QueryPeriod)> {
        let prompt = format!(
            r#"Analise esta pergunta financeira e identifique o tipo e período temporal.

TIPOS DISPONÍVEIS:
- maior_gasto (maior gasto individual)
- menor_gasto (menor gasto individual)
- gastos_categoria (gastos por categoria)
- gastos_periodo (gastos de um período específico)
- resumo_geral (resumo geral)

PERÍODOS TEMPORAIS:
- todos_tempos (padrão, se não especificado)
- mes_atual (este mês)
- mes_passado (mês passado)
- semana_atual (esta semana)
- semana_passada (semana passada)

Responda no formato: TIPO|PERIODO

Exemplos:
"qual meu maior gasto?" → maior_gasto|todos_tempos
"maior gasto do mês passado?" → maior_gasto|mes_passado
"gastos desta semana" → gastos_periodo|semana_atual

Pergunta: "{text}"

Resposta:"#,
        );

        let raw = match self.generate(prompt, 20).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Query intent probe failed");
                return None;
            }
        };

        let mut answer = raw.trim().to_lowercase();
        for prefix in ["resposta:", "response:"] {
            if let Some(rest) = answer.strip_prefix(prefix) {
                answer = rest.trim().to_string();
            }
        }
        debug!(answer = %answer, "Query intent probe answered");

        let (kind, period) = answer.split_once('|')?;
        let kind = kind.trim().parse::<QueryKind>().ok()?;
        let period = period.trim().parse::<QueryPeriod>().ok()?;
        Some((kind, period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_provider_model_and_host() {
        let provider = OllamaProvider::new("http://localhost:11434/", "gemma2:2b");
        assert_eq!(provider.model(), "gemma2:2b");
        assert_eq!(provider.host(), "http://localhost:11434");
    }

    #[test]
    fn test_parse_prompt_embeds_context() {
        let provider = OllamaProvider::new("http://localhost:11434", "gemma2:2b");
        let context = ParseContext::standard(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap());
        let prompt = provider.build_parse_prompt("pizza ontem à noite", &context);

        assert!(prompt.contains("2024-10-15"));
        assert!(prompt.contains("Custos Fixos"));
        assert!(prompt.contains("pizza ontem à noite"));
        assert!(prompt.contains("0.7"));
    }
}
