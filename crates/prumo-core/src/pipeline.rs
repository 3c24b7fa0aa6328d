//! Inbound message pipeline
//!
//! One entry point per channel message: idempotency guard, user resolution,
//! pending sweep, negotiation short-circuit, classification, and the
//! side-effecting action for whatever came out. Messages from the same user
//! are serialized through a keyed lock so concurrent deliveries cannot race
//! the single pending-transaction slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use tracing::{debug, info};

use crate::classify::Classifier;
use crate::dedup::{Admission, IdempotencyGuard};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::models::{local_now, InboundMessage, MessageKind, NewEvent, ParsedData};
use crate::outbound::MessageSender;
use crate::query::{resolve_intent, QueryIntent, QueryKind, QueryPeriod};
use crate::storage::Storage;
use crate::tracker::ConversationTracker;

const WELCOME_REPLY: &str = "👋 Olá! Sou seu assistente financeiro. Envie seus gastos e compromissos que vou organizar tudo para você!";
const FALLBACK_REPLY: &str = "🤔 Não entendi. Tente: \"uber 25\" ou \"recebido 3000\"";
const NO_EXPENSES_REPLY: &str = "📊 Você ainda não tem gastos registrados.";

/// Message processor wiring the core against its collaborators
pub struct MessageProcessor<S, M> {
    storage: Arc<S>,
    sender: Arc<M>,
    classifier: Classifier,
    llm: LlmClient,
    guard: IdempotencyGuard,
    tracker: ConversationTracker<S, M>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: Storage, M: MessageSender> MessageProcessor<S, M> {
    pub fn new(storage: Arc<S>, sender: Arc<M>, llm: LlmClient) -> Self {
        Self {
            classifier: Classifier::new(llm.clone()),
            tracker: ConversationTracker::new(storage.clone(), sender.clone()),
            storage,
            sender,
            llm,
            guard: IdempotencyGuard::new(),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the pending expiry window (tests)
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.tracker = self.tracker.with_expiry(expiry);
        self
    }

    /// Process one inbound channel message end to end
    pub async fn handle(&self, message: InboundMessage) -> Result<()> {
        if self.guard.admit(&message.message_id) == Admission::Duplicate {
            info!(message_id = %message.message_id, "Duplicate delivery, acknowledging without processing");
            return Ok(());
        }

        // Serialize per sender: two racing messages from one user must not
        // both interpret the same pending record.
        let lock = self.user_lock(&message.from);
        let _guard = lock.lock().await;

        let (user_id, created) = self.storage.ensure_user(&message.from).await?;
        if created {
            self.sender.send(&message.from, WELCOME_REPLY).await?;
        }

        let now = local_now();
        self.tracker
            .sweep_expired(&user_id, &message.from, now.with_timezone(&chrono::Utc))
            .await?;

        // An open negotiation consumes the message before any classification
        if self
            .tracker
            .try_resolve_reply(&user_id, &message.from, &message.text)
            .await?
        {
            return Ok(());
        }

        let parsed = self.classifier.classify_at(&message.text, now).await;
        debug!(
            kind = %parsed.kind,
            confidence = parsed.confidence,
            reasoning = %parsed.reasoning,
            "Message classified"
        );

        match (parsed.kind, parsed.data) {
            (MessageKind::Transaction, Some(ParsedData::Transaction {
                amount,
                category,
                date,
                note,
                is_income,
            })) => {
                self.tracker
                    .handle_transaction(
                        &user_id,
                        &message.from,
                        &message.text,
                        amount,
                        category.as_deref(),
                        date.unwrap_or_else(|| now.with_timezone(&chrono::Utc)),
                        &note,
                        is_income,
                    )
                    .await
            }
            (MessageKind::Event, Some(ParsedData::Event { title, starts_at })) => {
                self.storage
                    .insert_event(NewEvent {
                        user_id: user_id.clone(),
                        title: title.clone(),
                        starts_at,
                        raw_message: message.text.clone(),
                    })
                    .await?;
                self.sender
                    .send(&message.from, &format!("📅 Compromisso agendado: {}", title))
                    .await
            }
            (MessageKind::Query, _) => {
                let intent = resolve_intent(&self.llm, &message.text).await;
                let reply = self.answer_query(&user_id, intent).await?;
                self.sender.send(&message.from, &reply).await
            }
            _ => self.sender.send(&message.from, FALLBACK_REPLY).await,
        }
    }

    fn user_lock(&self, from: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().expect("lock table poisoned");
        locks
            .entry(from.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run the aggregation a query intent maps to and compose the reply
    async fn answer_query(&self, user_id: &str, intent: QueryIntent) -> Result<String> {
        let now = local_now();
        let window = intent.period.window(now);

        match intent.kind {
            QueryKind::LargestExpense => {
                match self.storage.largest_expense(user_id, window).await? {
                    Some(expense) => Ok(format_expense_detail("Seu maior gasto", &expense)),
                    None => Ok(NO_EXPENSES_REPLY.to_string()),
                }
            }
            QueryKind::SmallestExpense => {
                match self.storage.smallest_expense(user_id, window).await? {
                    Some(expense) => Ok(format_expense_detail("Seu menor gasto", &expense)),
                    None => Ok(NO_EXPENSES_REPLY.to_string()),
                }
            }
            QueryKind::ByCategory => {
                let totals = self.storage.totals_by_category(user_id, window, 5).await?;
                if totals.is_empty() {
                    return Ok(NO_EXPENSES_REPLY.to_string());
                }
                let mut reply = String::from("📊 **Gastos por categoria:**\n\n");
                for (index, total) in totals.iter().enumerate() {
                    reply.push_str(&format!(
                        "{}. {}: R$ {:.2}\n",
                        index + 1,
                        total.category_name,
                        total.total
                    ));
                }
                Ok(reply)
            }
            QueryKind::ByPeriod => {
                let expenses = self.storage.expenses_in_window(user_id, window, 10).await?;
                if expenses.is_empty() {
                    return Ok("📊 Você não tem gastos registrados neste período.".to_string());
                }
                let mut reply = String::from("📊 **Gastos do período:**\n\n");
                for expense in &expenses {
                    reply.push_str(&format!(
                        "💰 R$ {:.2} - {} ({})\n",
                        expense.amount,
                        expense.category_name,
                        expense
                            .occurred_at
                            .with_timezone(&now.timezone())
                            .format("%d/%m/%Y")
                    ));
                }
                Ok(reply)
            }
            QueryKind::Summary => {
                // An unspecified period means "this month", like the
                // original monthly summary
                let window = if intent.period == QueryPeriod::AllTime {
                    QueryPeriod::ThisMonth.window(now)
                } else {
                    window
                };
                let summary = self.storage.summary(user_id, window).await?;
                Ok(format!(
                    "📊 Resumo do mês:\n💰 Receitas: R$ {:.2}\n💸 Despesas: R$ {:.2}\n📈 Saldo: R$ {:.2}",
                    summary.income,
                    summary.expense,
                    summary.balance()
                ))
            }
        }
    }
}

fn format_expense_detail(title: &str, expense: &crate::models::ExpenseRecord) -> String {
    let date = expense
        .occurred_at
        .with_timezone(&crate::models::local_offset())
        .format("%d/%m/%Y");
    let note = if expense.note.is_empty() {
        "Sem descrição"
    } else {
        expense.note.as_str()
    };
    format!(
        "💸 **{}:**\n💰 R$ {:.2}\n📂 Categoria: {}\n📅 Data: {}\n📝 Descrição: {}",
        title, expense.amount, expense.category_name, date, note
    )
}
