//! Prumo CLI - local chat driver for the intent pipeline
//!
//! Usage:
//!   prumo                     Chat with the pipeline (LLM disabled)
//!   LLM_ENABLED=true LLM_PROVIDER=ollama prumo
//!                             Chat with the Ollama fallback enabled

mod cli;

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prumo_core::{
    InboundMessage, LlmClient, LlmConfig, LlmProvider, MemoryStorage, MessageProcessor,
    MessageSender,
};

use cli::Cli;

/// Sender that prints replies to the terminal instead of delivering them
struct TerminalSender;

#[async_trait]
impl MessageSender for TerminalSender {
    async fn send(&self, _to: &str, body: &str) -> prumo_core::Result<()> {
        println!("🤖 {}\n", body);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (warn)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = LlmConfig::from_env();
    let llm = LlmClient::create_and_probe(&config).await;
    println!("LLM fallback: {}", llm.name());

    let storage = Arc::new(MemoryStorage::new());
    let sender = Arc::new(TerminalSender);
    let processor = MessageProcessor::new(storage, sender, llm);

    println!("Digite mensagens como no WhatsApp (\"uber 25\", \"saldo\"). Ctrl-D ou /sair encerra.\n");

    let stdin = std::io::stdin();
    let mut sequence = 0u64;
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/sair" || text == "/quit" {
            break;
        }

        sequence += 1;
        let message = InboundMessage {
            message_id: format!("local-{}", sequence),
            from: cli.from.clone(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        };

        if let Err(e) = processor.handle(message).await {
            eprintln!("erro: {}", e);
        }
    }

    Ok(())
}
