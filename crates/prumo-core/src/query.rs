//! Query intent resolution
//!
//! A message classified as `query` still needs a finer-grained analytical
//! intent (what to aggregate) and a time window (over which period). Tier 1
//! asks the LLM provider for a strict `kind|period` token pair; tier 2 is a
//! deterministic keyword fallback that always produces an answer, so the
//! resolver as a whole is total.

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Utc};
use tracing::debug;

use crate::llm::LlmProvider;

/// Analytical sub-intent of a query message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    LargestExpense,
    SmallestExpense,
    ByCategory,
    ByPeriod,
    Summary,
}

impl QueryKind {
    /// Wire token used in the LLM `kind|period` protocol
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::LargestExpense => "maior_gasto",
            Self::SmallestExpense => "menor_gasto",
            Self::ByCategory => "gastos_categoria",
            Self::ByPeriod => "gastos_periodo",
            Self::Summary => "resumo_geral",
        }
    }
}

impl std::str::FromStr for QueryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "maior_gasto" => Ok(Self::LargestExpense),
            "menor_gasto" => Ok(Self::SmallestExpense),
            "gastos_categoria" => Ok(Self::ByCategory),
            "gastos_periodo" => Ok(Self::ByPeriod),
            "resumo_geral" => Ok(Self::Summary),
            _ => Err(format!("Unknown query kind token: {}", s)),
        }
    }
}

/// Time window of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPeriod {
    AllTime,
    ThisMonth,
    LastMonth,
    ThisWeek,
    LastWeek,
}

impl QueryPeriod {
    /// Wire token used in the LLM `kind|period` protocol
    pub fn as_token(&self) -> &'static str {
        match self {
            Self::AllTime => "todos_tempos",
            Self::ThisMonth => "mes_atual",
            Self::LastMonth => "mes_passado",
            Self::ThisWeek => "semana_atual",
            Self::LastWeek => "semana_passada",
        }
    }

    /// Resolve the period against `now`.
    ///
    /// Current periods start at the period's truncation (month start, ISO
    /// week Monday) with an open end; "last" periods are inclusive at the
    /// start and exclusive at the current truncation boundary.
    pub fn window(&self, now: DateTime<FixedOffset>) -> DateWindow {
        let tz = now.timezone();
        let month_start = tz
            .from_local_datetime(
                &now.date_naive()
                    .with_day(1)
                    .expect("day one")
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight"),
            )
            .single()
            .expect("unambiguous in fixed offset");
        let week_start = tz
            .from_local_datetime(
                &(now.date_naive()
                    - Duration::days(now.weekday().num_days_from_monday() as i64))
                .and_hms_opt(0, 0, 0)
                .expect("midnight"),
            )
            .single()
            .expect("unambiguous in fixed offset");

        let (start, end) = match self {
            Self::AllTime => (None, None),
            Self::ThisMonth => (Some(month_start), None),
            Self::LastMonth => {
                let previous = if month_start.month() == 1 {
                    month_start
                        .with_year(month_start.year() - 1)
                        .and_then(|d| d.with_month(12))
                } else {
                    month_start.with_month(month_start.month() - 1)
                };
                (previous, Some(month_start))
            }
            Self::ThisWeek => (Some(week_start), None),
            Self::LastWeek => (Some(week_start - Duration::weeks(1)), Some(week_start)),
        };

        DateWindow {
            start: start.map(|dt| dt.with_timezone(&Utc)),
            end: end.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl std::str::FromStr for QueryPeriod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "todos_tempos" => Ok(Self::AllTime),
            "mes_atual" => Ok(Self::ThisMonth),
            "mes_passado" => Ok(Self::LastMonth),
            "semana_atual" => Ok(Self::ThisWeek),
            "semana_passada" => Ok(Self::LastWeek),
            _ => Err(format!("Unknown query period token: {}", s)),
        }
    }
}

/// Half-open time window; `None` bounds are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if at >= end {
                return false;
            }
        }
        true
    }
}

/// Resolved analytical intent of a query message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryIntent {
    pub kind: QueryKind,
    pub period: QueryPeriod,
}

/// Resolve the intent of a query message. Never fails: a provider miss
/// (disabled, unreachable, off-vocabulary answer) falls back to heuristics.
pub async fn resolve_intent<P: LlmProvider>(provider: &P, text: &str) -> QueryIntent {
    if let Some((kind, period)) = provider.resolve_query_intent(text).await {
        debug!(kind = kind.as_token(), period = period.as_token(), "Query intent from LLM");
        return QueryIntent { kind, period };
    }

    let intent = heuristic_intent(text);
    debug!(
        kind = intent.kind.as_token(),
        period = intent.period.as_token(),
        "Query intent from heuristics"
    );
    intent
}

/// Deterministic keyword fallback for query analysis
pub fn heuristic_intent(text: &str) -> QueryIntent {
    let normalized = text.to_lowercase();

    let period = if normalized.contains("mês passado") || normalized.contains("mes passado") {
        QueryPeriod::LastMonth
    } else if normalized.contains("este mês") || normalized.contains("mês atual") {
        QueryPeriod::ThisMonth
    } else if normalized.contains("semana passada") {
        QueryPeriod::LastWeek
    } else if normalized.contains("esta semana") || normalized.contains("semana atual") {
        QueryPeriod::ThisWeek
    } else {
        QueryPeriod::AllTime
    };

    let kind = if normalized.contains("maior") && normalized.contains("gasto") {
        QueryKind::LargestExpense
    } else if normalized.contains("menor") && normalized.contains("gasto") {
        QueryKind::SmallestExpense
    } else if normalized.contains("categoria") || normalized.contains("onde") {
        QueryKind::ByCategory
    } else {
        QueryKind::Summary
    };

    QueryIntent { kind, period }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;
    use crate::models::local_offset;
    use chrono::TimeZone;

    fn mid_month() -> DateTime<FixedOffset> {
        // Tuesday 2024-10-15
        local_offset().with_ymd_and_hms(2024, 10, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_tokens_round_trip() {
        for kind in [
            QueryKind::LargestExpense,
            QueryKind::SmallestExpense,
            QueryKind::ByCategory,
            QueryKind::ByPeriod,
            QueryKind::Summary,
        ] {
            assert_eq!(kind.as_token().parse::<QueryKind>().unwrap(), kind);
        }
        for period in [
            QueryPeriod::AllTime,
            QueryPeriod::ThisMonth,
            QueryPeriod::LastMonth,
            QueryPeriod::ThisWeek,
            QueryPeriod::LastWeek,
        ] {
            assert_eq!(period.as_token().parse::<QueryPeriod>().unwrap(), period);
        }
    }

    #[test]
    fn test_heuristic_largest_expense_last_month() {
        let intent = heuristic_intent("qual foi meu maior gasto do mês passado?");
        assert_eq!(intent.kind, QueryKind::LargestExpense);
        assert_eq!(intent.period, QueryPeriod::LastMonth);
    }

    #[test]
    fn test_heuristic_by_category() {
        let intent = heuristic_intent("onde estou gastando mais?");
        assert_eq!(intent.kind, QueryKind::ByCategory);
        assert_eq!(intent.period, QueryPeriod::AllTime);
    }

    #[test]
    fn test_heuristic_defaults_to_summary_all_time() {
        let intent = heuristic_intent("saldo");
        assert_eq!(intent.kind, QueryKind::Summary);
        assert_eq!(intent.period, QueryPeriod::AllTime);
    }

    #[test]
    fn test_this_month_window_truncates_to_month_start() {
        let window = QueryPeriod::ThisMonth.window(mid_month());
        let start = window.start.unwrap().with_timezone(&local_offset());
        assert_eq!((start.year(), start.month(), start.day()), (2024, 10, 1));
        assert!(window.end.is_none());
    }

    #[test]
    fn test_last_month_window_is_half_open() {
        let window = QueryPeriod::LastMonth.window(mid_month());
        let start = window.start.unwrap().with_timezone(&local_offset());
        let end = window.end.unwrap().with_timezone(&local_offset());
        assert_eq!((start.year(), start.month(), start.day()), (2024, 9, 1));
        assert_eq!((end.year(), end.month(), end.day()), (2024, 10, 1));

        // end boundary itself is excluded
        assert!(!window.contains(window.end.unwrap()));
        assert!(window.contains(window.start.unwrap()));
    }

    #[test]
    fn test_last_month_window_across_year_boundary() {
        let january = local_offset().with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let window = QueryPeriod::LastMonth.window(january);
        let start = window.start.unwrap().with_timezone(&local_offset());
        assert_eq!((start.year(), start.month()), (2024, 12));
    }

    #[test]
    fn test_week_windows_start_on_monday() {
        let window = QueryPeriod::ThisWeek.window(mid_month());
        let start = window.start.unwrap().with_timezone(&local_offset());
        // 2024-10-15 is a Tuesday; the week starts Monday the 14th
        assert_eq!((start.month(), start.day()), (10, 14));

        let last = QueryPeriod::LastWeek.window(mid_month());
        let last_start = last.start.unwrap().with_timezone(&local_offset());
        assert_eq!((last_start.month(), last_start.day()), (10, 7));
        assert_eq!(last.end, window.start);
    }

    #[test]
    fn test_all_time_window_is_unbounded() {
        let window = QueryPeriod::AllTime.window(mid_month());
        assert_eq!(window, DateWindow::default());
        assert!(window.contains(Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_resolve_intent_falls_back_to_heuristics_when_disabled() {
        let client = LlmClient::disabled();
        let intent = resolve_intent(&client, "menor gasto desta semana").await;
        assert_eq!(intent.kind, QueryKind::SmallestExpense);
        assert_eq!(intent.period, QueryPeriod::ThisWeek);
    }
}
