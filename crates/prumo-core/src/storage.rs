//! Storage collaborator boundary
//!
//! The core does not own persistence; it talks to whatever stores users,
//! categories, transactions, events and pending records through this trait.
//! `MemoryStorage` is the reference implementation used by the test suite and
//! the local chat driver.
//!
//! Ordering contract: `list_categories` returns categories sorted by name
//! ascending. Numeric category replies index into exactly this ordering, so
//! implementations must not reorder.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Category, CategoryKind, CategoryTotal, ExpenseRecord, NewEvent, NewPending, NewTransaction,
    PendingTransaction, PeriodSummary, BUDGET_CATEGORIES,
};
use crate::query::DateWindow;

/// Persistence boundary the pipeline drives
#[async_trait]
pub trait Storage: Send + Sync {
    /// Find or create the user behind a channel sender id.
    /// Returns the user id and whether the user was just created.
    async fn ensure_user(&self, wa_number: &str) -> Result<(String, bool)>;

    /// Case-insensitive category lookup by name and kind
    async fn find_category(
        &self,
        user_id: &str,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Option<Category>>;

    /// Categories of one kind, ordered by name ascending
    async fn list_categories(&self, user_id: &str, kind: CategoryKind) -> Result<Vec<Category>>;

    async fn create_category(
        &self,
        user_id: &str,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Category>;

    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<()>;

    async fn insert_event(&self, event: NewEvent) -> Result<()>;

    async fn insert_pending(&self, pending: NewPending) -> Result<PendingTransaction>;

    /// The single active pending record: the most recently created one
    async fn latest_pending(&self, user_id: &str) -> Result<Option<PendingTransaction>>;

    /// Pending records created at or before `before`, oldest first
    async fn expired_pending(
        &self,
        user_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Vec<PendingTransaction>>;

    async fn delete_pending(&self, pending_id: i64) -> Result<()>;

    // Read-only aggregations backing query replies. All are scoped by user
    // and the resolved date window.

    async fn largest_expense(
        &self,
        user_id: &str,
        window: DateWindow,
    ) -> Result<Option<ExpenseRecord>>;

    async fn smallest_expense(
        &self,
        user_id: &str,
        window: DateWindow,
    ) -> Result<Option<ExpenseRecord>>;

    /// Expense totals grouped by category, largest first, at most `limit`
    async fn totals_by_category(
        &self,
        user_id: &str,
        window: DateWindow,
        limit: usize,
    ) -> Result<Vec<CategoryTotal>>;

    /// Individual expenses in the window, newest first, at most `limit`
    async fn expenses_in_window(
        &self,
        user_id: &str,
        window: DateWindow,
        limit: usize,
    ) -> Result<Vec<ExpenseRecord>>;

    /// Income and expense totals over the window
    async fn summary(&self, user_id: &str, window: DateWindow) -> Result<PeriodSummary>;
}

/// Stored transaction row (category resolved at insert time)
#[derive(Debug, Clone)]
struct TransactionRow {
    user_id: String,
    amount: f64,
    category_id: i64,
    occurred_at: DateTime<Utc>,
    note: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, String>,
    categories: Vec<Category>,
    transactions: Vec<TransactionRow>,
    events: Vec<NewEvent>,
    pending: Vec<PendingTransaction>,
    next_user: u64,
    next_category_id: i64,
    next_pending_id: i64,
}

/// In-memory storage for tests and the local chat driver.
///
/// New users are seeded with the fixed budget categories (expense kind);
/// "Outros" is created on demand by the expiry sweep, like in production.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions (test observability)
    pub fn transaction_count(&self) -> usize {
        self.inner.lock().expect("storage lock").transactions.len()
    }

    /// Number of stored events (test observability)
    pub fn event_count(&self) -> usize {
        self.inner.lock().expect("storage lock").events.len()
    }

    /// Number of pending records for a user (test observability)
    pub fn pending_count(&self, user_id: &str) -> usize {
        self.inner
            .lock()
            .expect("storage lock")
            .pending
            .iter()
            .filter(|p| p.user_id == user_id)
            .count()
    }
}

impl Inner {
    fn category_by_id(&self, id: i64) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn expense_rows(&self, user_id: &str, window: DateWindow) -> Vec<ExpenseRecord> {
        self.transactions
            .iter()
            .filter(|t| t.user_id == user_id && window.contains(t.occurred_at))
            .filter_map(|t| {
                let category = self.category_by_id(t.category_id)?;
                if category.kind != CategoryKind::Expense {
                    return None;
                }
                Some(ExpenseRecord {
                    amount: t.amount,
                    occurred_at: t.occurred_at,
                    note: t.note.clone(),
                    category_name: category.name.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ensure_user(&self, wa_number: &str) -> Result<(String, bool)> {
        let mut inner = self.inner.lock().expect("storage lock");
        if let Some(user_id) = inner.users.get(wa_number) {
            return Ok((user_id.clone(), false));
        }

        inner.next_user += 1;
        let user_id = format!("user-{}", inner.next_user);
        inner.users.insert(wa_number.to_string(), user_id.clone());

        for name in BUDGET_CATEGORIES {
            inner.next_category_id += 1;
            let id = inner.next_category_id;
            inner.categories.push(Category {
                id,
                user_id: user_id.clone(),
                name: name.to_string(),
                kind: CategoryKind::Expense,
                is_system: true,
            });
        }

        Ok((user_id, true))
    }

    async fn find_category(
        &self,
        user_id: &str,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Option<Category>> {
        let inner = self.inner.lock().expect("storage lock");
        let wanted = name.to_lowercase();
        Ok(inner
            .categories
            .iter()
            .find(|c| c.user_id == user_id && c.kind == kind && c.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn list_categories(&self, user_id: &str, kind: CategoryKind) -> Result<Vec<Category>> {
        let inner = self.inner.lock().expect("storage lock");
        let mut categories: Vec<Category> = inner
            .categories
            .iter()
            .filter(|c| c.user_id == user_id && c.kind == kind)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn create_category(
        &self,
        user_id: &str,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Category> {
        let mut inner = self.inner.lock().expect("storage lock");
        inner.next_category_id += 1;
        let category = Category {
            id: inner.next_category_id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            kind,
            is_system: false,
        };
        inner.categories.push(category.clone());
        Ok(category)
    }

    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<()> {
        let mut inner = self.inner.lock().expect("storage lock");
        inner.transactions.push(TransactionRow {
            user_id: transaction.user_id,
            amount: transaction.amount,
            category_id: transaction.category_id,
            occurred_at: transaction.occurred_at,
            note: transaction.note,
        });
        Ok(())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<()> {
        let mut inner = self.inner.lock().expect("storage lock");
        inner.events.push(event);
        Ok(())
    }

    async fn insert_pending(&self, pending: NewPending) -> Result<PendingTransaction> {
        let mut inner = self.inner.lock().expect("storage lock");
        inner.next_pending_id += 1;
        let record = PendingTransaction {
            id: inner.next_pending_id,
            user_id: pending.user_id,
            amount: pending.amount,
            occurred_at: pending.occurred_at,
            note: pending.note,
            raw_message: pending.raw_message,
            is_income: pending.is_income,
            created_at: Utc::now(),
        };
        inner.pending.push(record.clone());
        Ok(record)
    }

    async fn latest_pending(&self, user_id: &str) -> Result<Option<PendingTransaction>> {
        let inner = self.inner.lock().expect("storage lock");
        Ok(inner
            .pending
            .iter()
            .filter(|p| p.user_id == user_id)
            .max_by_key(|p| (p.created_at, p.id))
            .cloned())
    }

    async fn expired_pending(
        &self,
        user_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Vec<PendingTransaction>> {
        let inner = self.inner.lock().expect("storage lock");
        let mut expired: Vec<PendingTransaction> = inner
            .pending
            .iter()
            .filter(|p| p.user_id == user_id && p.created_at <= before)
            .cloned()
            .collect();
        expired.sort_by_key(|p| (p.created_at, p.id));
        Ok(expired)
    }

    async fn delete_pending(&self, pending_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().expect("storage lock");
        inner.pending.retain(|p| p.id != pending_id);
        Ok(())
    }

    async fn largest_expense(
        &self,
        user_id: &str,
        window: DateWindow,
    ) -> Result<Option<ExpenseRecord>> {
        let inner = self.inner.lock().expect("storage lock");
        Ok(inner
            .expense_rows(user_id, window)
            .into_iter()
            .max_by(|a, b| a.amount.total_cmp(&b.amount)))
    }

    async fn smallest_expense(
        &self,
        user_id: &str,
        window: DateWindow,
    ) -> Result<Option<ExpenseRecord>> {
        let inner = self.inner.lock().expect("storage lock");
        Ok(inner
            .expense_rows(user_id, window)
            .into_iter()
            .min_by(|a, b| a.amount.total_cmp(&b.amount)))
    }

    async fn totals_by_category(
        &self,
        user_id: &str,
        window: DateWindow,
        limit: usize,
    ) -> Result<Vec<CategoryTotal>> {
        let inner = self.inner.lock().expect("storage lock");
        let mut totals: HashMap<String, f64> = HashMap::new();
        for row in inner.expense_rows(user_id, window) {
            *totals.entry(row.category_name).or_insert(0.0) += row.amount;
        }
        let mut totals: Vec<CategoryTotal> = totals
            .into_iter()
            .map(|(category_name, total)| CategoryTotal { category_name, total })
            .collect();
        totals.sort_by(|a, b| b.total.total_cmp(&a.total));
        totals.truncate(limit);
        Ok(totals)
    }

    async fn expenses_in_window(
        &self,
        user_id: &str,
        window: DateWindow,
        limit: usize,
    ) -> Result<Vec<ExpenseRecord>> {
        let inner = self.inner.lock().expect("storage lock");
        let mut rows = inner.expense_rows(user_id, window);
        rows.sort_by_key(|r| std::cmp::Reverse(r.occurred_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn summary(&self, user_id: &str, window: DateWindow) -> Result<PeriodSummary> {
        let inner = self.inner.lock().expect("storage lock");
        let mut summary = PeriodSummary::default();
        for t in inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && window.contains(t.occurred_at))
        {
            match inner.category_by_id(t.category_id).map(|c| c.kind) {
                Some(CategoryKind::Income) => summary.income += t.amount,
                Some(CategoryKind::Expense) => summary.expense += t.amount,
                None => {}
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_user_seeds_budget_categories() {
        let storage = MemoryStorage::new();
        let (user_id, created) = storage.ensure_user("5511999990000").await.unwrap();
        assert!(created);

        let categories = storage
            .list_categories(&user_id, CategoryKind::Expense)
            .await
            .unwrap();
        assert_eq!(categories.len(), BUDGET_CATEGORIES.len());

        let (again, created) = storage.ensure_user("5511999990000").await.unwrap();
        assert_eq!(again, user_id);
        assert!(!created);
    }

    #[tokio::test]
    async fn test_list_categories_sorted_by_name() {
        let storage = MemoryStorage::new();
        let (user_id, _) = storage.ensure_user("551100").await.unwrap();
        let categories = storage
            .list_categories(&user_id, CategoryKind::Expense)
            .await
            .unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_find_category_is_case_insensitive() {
        let storage = MemoryStorage::new();
        let (user_id, _) = storage.ensure_user("551100").await.unwrap();
        storage
            .create_category(&user_id, "Outros", CategoryKind::Expense)
            .await
            .unwrap();

        let found = storage
            .find_category(&user_id, "outros", CategoryKind::Expense)
            .await
            .unwrap();
        assert_eq!(found.unwrap().name, "Outros");

        let wrong_kind = storage
            .find_category(&user_id, "outros", CategoryKind::Income)
            .await
            .unwrap();
        assert!(wrong_kind.is_none());
    }

    #[tokio::test]
    async fn test_latest_pending_is_most_recent() {
        let storage = MemoryStorage::new();
        let (user_id, _) = storage.ensure_user("551100").await.unwrap();

        for amount in [10.0, 20.0] {
            storage
                .insert_pending(NewPending {
                    user_id: user_id.clone(),
                    amount,
                    occurred_at: Utc::now(),
                    note: String::new(),
                    raw_message: String::new(),
                    is_income: false,
                })
                .await
                .unwrap();
        }

        let latest = storage.latest_pending(&user_id).await.unwrap().unwrap();
        assert_eq!(latest.amount, 20.0);
        assert_eq!(storage.pending_count(&user_id), 2);
    }

    #[tokio::test]
    async fn test_aggregations_respect_window_and_kind() {
        let storage = MemoryStorage::new();
        let (user_id, _) = storage.ensure_user("551100").await.unwrap();
        let expense = storage
            .find_category(&user_id, "Prazeres", CategoryKind::Expense)
            .await
            .unwrap()
            .unwrap();
        let income = storage
            .create_category(&user_id, "Salário", CategoryKind::Income)
            .await
            .unwrap();

        let now = Utc::now();
        for (amount, category_id, days_ago) in
            [(50.0, expense.id, 0), (10.0, expense.id, 1), (3000.0, income.id, 0)]
        {
            storage
                .insert_transaction(NewTransaction {
                    user_id: user_id.clone(),
                    amount,
                    category_id,
                    occurred_at: now - chrono::Duration::days(days_ago),
                    note: String::new(),
                })
                .await
                .unwrap();
        }

        let all = DateWindow::default();
        let largest = storage.largest_expense(&user_id, all).await.unwrap().unwrap();
        assert_eq!(largest.amount, 50.0);
        let smallest = storage.smallest_expense(&user_id, all).await.unwrap().unwrap();
        assert_eq!(smallest.amount, 10.0);

        let summary = storage.summary(&user_id, all).await.unwrap();
        assert_eq!(summary.income, 3000.0);
        assert_eq!(summary.expense, 60.0);
        assert_eq!(summary.balance(), 2940.0);

        // windowed: only today's rows
        let today = DateWindow {
            start: Some(now - chrono::Duration::hours(1)),
            end: None,
        };
        let smallest_today = storage.smallest_expense(&user_id, today).await.unwrap().unwrap();
        assert_eq!(smallest_today.amount, 50.0);

        let totals = storage.totals_by_category(&user_id, all, 5).await.unwrap();
        assert_eq!(totals[0].category_name, "Prazeres");
        assert_eq!(totals[0].total, 60.0);
    }
}
