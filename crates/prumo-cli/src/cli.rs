//! CLI argument definitions using clap

use clap::Parser;

/// Prumo - WhatsApp financial assistant, local chat driver
///
/// Runs the message pipeline against in-memory collaborators so the
/// classification, negotiation and query flows can be exercised from a
/// terminal. Replies that would go out through the channel are printed
/// instead.
#[derive(Parser)]
#[command(name = "prumo")]
#[command(about = "Chat locally with the Prumo intent pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Sender id to simulate (one conversation state per sender)
    #[arg(long, default_value = "5511999990000")]
    pub from: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
