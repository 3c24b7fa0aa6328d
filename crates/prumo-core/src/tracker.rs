//! Per-user conversation state machine
//!
//! A user is either idle or awaiting a category choice for one pending
//! transaction. The tracker sweeps expired pendings before interpreting any
//! inbound text, resolves category replies against the same ordered listing
//! the user was shown, and finalizes transactions through the storage
//! collaborator.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{
    Category, CategoryKind, NewPending, NewTransaction, PendingTransaction, DEFAULT_CATEGORY,
};
use crate::outbound::MessageSender;
use crate::storage::Storage;

/// How long a pending transaction waits for a category reply before the
/// sweep forces it into the default category.
pub const PENDING_EXPIRY_SECS: i64 = 120;

/// Conversation state tracker over the storage and messaging collaborators
pub struct ConversationTracker<S, M> {
    storage: Arc<S>,
    sender: Arc<M>,
    expiry: Duration,
}

impl<S: Storage, M: MessageSender> ConversationTracker<S, M> {
    pub fn new(storage: Arc<S>, sender: Arc<M>) -> Self {
        Self {
            storage,
            sender,
            expiry: Duration::seconds(PENDING_EXPIRY_SECS),
        }
    }

    /// Override the expiry window (tests)
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Force-resolve every pending record older than the expiry window into
    /// the default category, creating it on demand. Runs before any other
    /// interpretation of an inbound message; older unresolved pendings are
    /// only ever resolved here, never dropped.
    pub async fn sweep_expired(&self, user_id: &str, reply_to: &str, now: DateTime<Utc>) -> Result<()> {
        let cutoff = now - self.expiry;
        for pending in self.storage.expired_pending(user_id, cutoff).await? {
            let kind = pending.kind();
            let category = match self
                .storage
                .find_category(user_id, DEFAULT_CATEGORY, kind)
                .await?
            {
                Some(category) => category,
                None => {
                    self.storage
                        .create_category(user_id, DEFAULT_CATEGORY, kind)
                        .await?
                }
            };

            info!(
                user = user_id,
                pending = pending.id,
                amount = pending.amount,
                "Pending transaction expired, assigning default category"
            );
            self.finalize(&pending, category.id).await?;
            self.sender
                .send(
                    reply_to,
                    &format!(
                        "⏰ Tempo esgotado! Categorizei como \"{}\": R$ {:.2}",
                        DEFAULT_CATEGORY, pending.amount
                    ),
                )
                .await?;
        }
        Ok(())
    }

    /// If a pending record remains after the sweep, interpret `text` as a
    /// category reply. Returns true when the message was consumed by the
    /// negotiation (whether or not the reply matched).
    pub async fn try_resolve_reply(&self, user_id: &str, reply_to: &str, text: &str) -> Result<bool> {
        let Some(pending) = self.storage.latest_pending(user_id).await? else {
            return Ok(false);
        };

        let kind = pending.kind();
        let categories = self.storage.list_categories(user_id, kind).await?;

        match resolve_category_reply(&categories, text) {
            Some(category) => {
                let (name, id) = (category.name.clone(), category.id);
                debug!(user = user_id, category = %name, "Category reply matched");
                self.finalize(&pending, id).await?;
                self.sender
                    .send(reply_to, &format!("✅ Anotado! {}: R$ {:.2}", name, pending.amount))
                    .await?;
            }
            None => {
                // Pending stays untouched; the user may retry until expiry
                debug!(user = user_id, reply = %text, "Category reply did not match");
                let mut message = format!(
                    "❌ Categoria \"{}\" não encontrada.\n\n📂 Escolha uma das opções:\n{}",
                    text,
                    format_category_list(&categories)
                );
                message.push_str("\n\n💡 Você pode digitar o número ou o nome da categoria.");
                self.sender.send(reply_to, &message).await?;
            }
        }
        Ok(true)
    }

    /// Handle a freshly classified transaction: finalize immediately when the
    /// hinted category exists for this user, otherwise open a negotiation.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_transaction(
        &self,
        user_id: &str,
        reply_to: &str,
        raw_message: &str,
        amount: f64,
        category_hint: Option<&str>,
        occurred_at: DateTime<Utc>,
        note: &str,
        is_income: bool,
    ) -> Result<()> {
        let kind = if is_income {
            CategoryKind::Income
        } else {
            CategoryKind::Expense
        };

        if let Some(hint) = category_hint {
            if let Some(category) = self.storage.find_category(user_id, hint, kind).await? {
                self.storage
                    .insert_transaction(NewTransaction {
                        user_id: user_id.to_string(),
                        amount,
                        category_id: category.id,
                        occurred_at,
                        note: raw_message.to_string(),
                    })
                    .await?;
                self.sender
                    .send(
                        reply_to,
                        &format!("✅ Anotado! {}: R$ {:.2}", category.name, amount),
                    )
                    .await?;
                return Ok(());
            }
        }

        // No stored category matches; record a pending and ask
        self.storage
            .insert_pending(NewPending {
                user_id: user_id.to_string(),
                amount,
                occurred_at,
                note: note.to_string(),
                raw_message: raw_message.to_string(),
                is_income,
            })
            .await?;

        let categories = self.storage.list_categories(user_id, kind).await?;
        self.sender
            .send(
                reply_to,
                &format!(
                    "💰 Registrei: R$ {:.2}\n\n📂 Em qual categoria?\n{}",
                    amount,
                    format_category_list(&categories)
                ),
            )
            .await?;
        Ok(())
    }

    async fn finalize(&self, pending: &PendingTransaction, category_id: i64) -> Result<()> {
        self.storage
            .insert_transaction(NewTransaction {
                user_id: pending.user_id.clone(),
                amount: pending.amount,
                category_id,
                occurred_at: pending.occurred_at,
                note: pending.note.clone(),
            })
            .await?;
        self.storage.delete_pending(pending.id).await
    }
}

/// Render the numbered category list shown to the user.
///
/// Numbering follows the storage ordering (name ascending); numeric replies
/// index into exactly this listing.
pub fn format_category_list(categories: &[Category]) -> String {
    categories
        .iter()
        .enumerate()
        .map(|(index, category)| format!("{}. {}", index + 1, category.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a free-text or numeric category reply.
///
/// Tried in order: 1-based index into the listing, exact name, substring,
/// then per-token substring for tokens of length >= 3. First match wins.
pub fn resolve_category_reply<'a>(categories: &'a [Category], reply: &str) -> Option<&'a Category> {
    let normalized = reply.to_lowercase().trim().to_string();
    if normalized.is_empty() || categories.is_empty() {
        return None;
    }

    // Leading digits, like parseInt: "2" and "2." both select index 2
    let digits: String = normalized.chars().take_while(|c| c.is_ascii_digit()).collect();
    if let Ok(index) = digits.parse::<usize>() {
        if index >= 1 && index <= categories.len() {
            return Some(&categories[index - 1]);
        }
    }

    if let Some(exact) = categories.iter().find(|c| c.name.to_lowercase() == normalized) {
        return Some(exact);
    }

    if let Some(partial) = categories
        .iter()
        .find(|c| c.name.to_lowercase().contains(&normalized))
    {
        return Some(partial);
    }

    for token in normalized.split_whitespace() {
        if token.chars().count() < 3 {
            continue;
        }
        if let Some(by_token) = categories
            .iter()
            .find(|c| c.name.to_lowercase().contains(token))
        {
            return Some(by_token);
        }
    }

    None
}
