//! Test utilities for prumo-core
//!
//! This module provides testing infrastructure including a mock Ollama server
//! that can be used for development and integration tests.

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Mock Ollama server for testing and development
pub struct MockOllamaServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/version", get(handle_version))
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama version endpoint (reachability probe)
async fn handle_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: "0.5.0".to_string(),
    })
}

/// Ollama tags endpoint (model listing probe)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "gemma2:latest".to_string(),
            modified_at: "2024-01-01T00:00:00Z".to_string(),
            size: 1_600_000_000,
        }],
    })
}

/// Ollama generate endpoint
///
/// Detects which prompt arrived (classification fallback or query-intent
/// probe) and answers from canned keyword rules, so tests exercise the real
/// HTTP + parsing path without a model.
async fn handle_generate(Json(request): Json<GenerateRequest>) -> Json<GenerateResponse> {
    let response = if request.prompt.contains("Responda no formato: TIPO|PERIODO") {
        handle_query_intent_mock(&request.prompt)
    } else {
        handle_parse_mock(&request.prompt)
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
}

/// Answer the query-intent probe with a `kind|period` token pair
fn handle_query_intent_mock(prompt: &str) -> String {
    let question = extract_quoted(prompt, "Pergunta: \"").to_lowercase();

    let period = if question.contains("mês passado") {
        "mes_passado"
    } else if question.contains("este mês") {
        "mes_atual"
    } else if question.contains("semana passada") {
        "semana_passada"
    } else if question.contains("esta semana") {
        "semana_atual"
    } else {
        "todos_tempos"
    };

    let kind = if question.contains("maior") {
        "maior_gasto"
    } else if question.contains("menor") {
        "menor_gasto"
    } else if question.contains("categoria") || question.contains("onde") {
        "gastos_categoria"
    } else {
        "resumo_geral"
    };

    format!("Resposta: {}|{}", kind, period)
}

/// Answer the classification fallback prompt
fn handle_parse_mock(prompt: &str) -> String {
    let message = extract_quoted(prompt, "MENSAGEM PARA ANALISAR: \"").to_lowercase();

    if message.contains("quebrado") {
        // Prose without any JSON block, to exercise MalformedResponse
        return "Desculpe, não consegui entender essa mensagem.".to_string();
    }

    if message.contains("fortuna") {
        // Over-confident transaction, to exercise the confidence clamp
        return r#"Claro! Segue a análise:
{"type": "transaction", "confidence": 0.95, "reasoning": "gasto implícito",
 "data": {"amount": 100.0, "category": "Prazeres", "note": "jantar caro"}}"#
            .to_string();
    }

    if message.contains("consulta médica") {
        return r#"{"type": "event", "confidence": 0.6, "reasoning": "compromisso",
 "data": {"eventTitle": "consulta médica", "eventTime": "2024-10-16T10:00:00-03:00"}}"#
            .to_string();
    }

    r#"{"type": "unknown", "confidence": 0, "reasoning": "fora do escopo"}"#.to_string()
}

/// Extract the text between `marker` and the next double quote
fn extract_quoted<'a>(prompt: &'a str, marker: &str) -> &'a str {
    if let Some(start) = prompt.find(marker) {
        let after = &prompt[start + marker.len()..];
        if let Some(end) = after.find('"') {
            return &after[..end];
        }
    }
    ""
}

// Request/Response types for the mock server

#[derive(Debug, Serialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[allow(dead_code)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmClient, LlmConfig, LlmProvider, ParseContext};
    use crate::models::MessageKind;
    use crate::query::{QueryKind, QueryPeriod};
    use chrono::NaiveDate;

    fn context() -> ParseContext {
        ParseContext::standard(NaiveDate::from_ymd_opt(2024, 10, 15).unwrap())
    }

    #[tokio::test]
    async fn test_mock_server_probe_succeeds_with_family_match() {
        let server = MockOllamaServer::start().await;
        let config = LlmConfig::ollama(&server.url(), "gemma2:2b");
        let client = LlmClient::create_and_probe(&config).await;
        assert!(client.is_enabled());
    }

    #[tokio::test]
    async fn test_mock_server_probe_fails_for_missing_model() {
        let server = MockOllamaServer::start().await;
        let config = LlmConfig::ollama(&server.url(), "llama3:8b");
        let client = LlmClient::create_and_probe(&config).await;
        assert!(!client.is_enabled());
    }

    #[tokio::test]
    async fn test_mock_server_parse_clamps_confidence() {
        let server = MockOllamaServer::start().await;
        let config = LlmConfig::ollama(&server.url(), "gemma2:2b");
        let client = LlmClient::create(&config);

        let parsed = client
            .parse_message("gastei uma fortuna no jantar", &context())
            .await;
        assert_eq!(parsed.kind, MessageKind::Transaction);
        assert!(parsed.confidence <= context().max_confidence);
    }

    #[tokio::test]
    async fn test_mock_server_parse_degrades_on_prose_response() {
        let server = MockOllamaServer::start().await;
        let config = LlmConfig::ollama(&server.url(), "gemma2:2b");
        let client = LlmClient::create(&config);

        let parsed = client.parse_message("tudo quebrado por aqui", &context()).await;
        assert_eq!(parsed.kind, MessageKind::Unknown);
        assert_eq!(parsed.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_mock_server_query_intent_tokens() {
        let server = MockOllamaServer::start().await;
        let config = LlmConfig::ollama(&server.url(), "gemma2:2b");
        let client = LlmClient::create(&config);

        let intent = client
            .resolve_query_intent("qual meu maior gasto do mês passado?")
            .await;
        assert_eq!(
            intent,
            Some((QueryKind::LargestExpense, QueryPeriod::LastMonth))
        );
    }
}
