//! Disabled provider: the no-op end of the fallback chain

use async_trait::async_trait;
use tracing::debug;

use crate::models::ParsedMessage;

use super::{LlmProvider, ParseContext};

/// Provider used when inference is turned off or unreachable.
///
/// Always reports itself available and classifies everything as `unknown`,
/// which keeps the pipeline's degradation path a plain code path instead of
/// an error case.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledProvider;

#[async_trait]
impl LlmProvider for DisabledProvider {
    fn name(&self) -> &'static str {
        "Disabled"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn parse_message(&self, text: &str, _context: &ParseContext) -> ParsedMessage {
        debug!(text = %text.chars().take(50).collect::<String>(), "LLM disabled, returning unknown");
        ParsedMessage::unknown("LLM desabilitada")
    }
}
