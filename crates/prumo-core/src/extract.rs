//! Lexical extractors for inbound messages
//!
//! Pure functions that pull a monetary amount, a category hint, a date and a
//! cleaned note out of a normalized (lower-cased, trimmed) message string.
//! Time-dependent extractors take `now` explicitly so they stay deterministic
//! under test.

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone};
use regex::Regex;

/// Keyword table mapping message words to the fixed budget categories.
///
/// Declaration order is load-bearing: when a message contains several
/// keywords, the first entry of this table that occurs anywhere in the text
/// wins, regardless of position in the message.
pub const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    // Custos Fixos
    ("aluguel", "Custos Fixos"),
    ("condomínio", "Custos Fixos"),
    ("luz", "Custos Fixos"),
    ("água", "Custos Fixos"),
    ("internet", "Custos Fixos"),
    ("gás", "Custos Fixos"),
    ("conta", "Custos Fixos"),
    ("custos fixos", "Custos Fixos"),
    ("custo fixo", "Custos Fixos"),
    // Conforto
    ("conforto", "Conforto"),
    ("casa", "Conforto"),
    ("móveis", "Conforto"),
    ("decoração", "Conforto"),
    // Liberdade Financeira
    ("investimento", "Liberdade Financeira"),
    ("poupança", "Liberdade Financeira"),
    ("liberdade financeira", "Liberdade Financeira"),
    ("aplicação", "Liberdade Financeira"),
    // Aumentar Renda/Empreender
    ("curso", "Aumentar Renda/Empreender"),
    ("capacitação", "Aumentar Renda/Empreender"),
    ("negócio", "Aumentar Renda/Empreender"),
    ("empreender", "Aumentar Renda/Empreender"),
    ("aumentar renda", "Aumentar Renda/Empreender"),
    // Prazeres
    ("prazeres", "Prazeres"),
    ("prazer", "Prazeres"),
    ("diversão", "Prazeres"),
    ("lazer", "Prazeres"),
    ("cinema", "Prazeres"),
    ("show", "Prazeres"),
    ("festa", "Prazeres"),
    ("balada", "Prazeres"),
    ("bar", "Prazeres"),
    ("cerveja", "Prazeres"),
    ("vodka", "Prazeres"),
    ("bebida", "Prazeres"),
    ("restaurante", "Prazeres"),
    // Metas
    ("metas", "Metas"),
    ("meta", "Metas"),
    ("objetivo", "Metas"),
    ("sonho", "Metas"),
    // Prazeres Futuros
    ("prazeres futuros", "Prazeres Futuros"),
    ("prazer futuro", "Prazeres Futuros"),
    ("viagem", "Prazeres Futuros"),
    // Reserva de Oportunidade
    ("reserva", "Reserva de Oportunidade"),
    ("reserva de oportunidade", "Reserva de Oportunidade"),
    ("emergência", "Reserva de Oportunidade"),
];

/// Words removed from notes alongside amounts and date tokens
const DATE_WORDS: &[&str] = &["hoje", "ontem", "amanhã", "em", "para", "de"];

/// Byte spans of monetary amounts in `text`.
///
/// A numeric token adjacent to `h`, `:` or `/` is a time or date fragment
/// ("sex 10h", "14:30", "18/10"), not an amount, and is skipped.
fn amount_spans(text: &str) -> Vec<(std::ops::Range<usize>, f64)> {
    let re = Regex::new(r"(?i)(?:r\$?\s*)?(\d{1,4}(?:[.,]\d{1,2})?)").expect("valid regex");

    let mut spans = Vec::new();
    for caps in re.captures_iter(text) {
        let full = caps.get(0).expect("match");
        let number = caps.get(1).expect("group");

        let next = text[number.end()..].chars().next();
        if matches!(next, Some('h') | Some('H') | Some(':') | Some('/')) {
            continue;
        }
        let prev = text[..number.start()].chars().next_back();
        if matches!(prev, Some(':') | Some('/')) {
            continue;
        }

        let value: f64 = match number.as_str().replace(',', ".").parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if !f64::is_finite(value) {
            continue;
        }
        spans.push((full.range(), value));
    }
    spans
}

/// Extract a monetary amount (BRL). First match only.
pub fn extract_amount(text: &str) -> Option<f64> {
    amount_spans(text).into_iter().next().map(|(_, value)| value)
}

/// Extract a category hint from the keyword table.
///
/// Traversal follows table declaration order, not keyword position in the
/// message.
pub fn extract_category_hint(text: &str) -> Option<&'static str> {
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|&(_, category)| category)
}

/// Extract a relative ("hoje", "ontem", "amanhã") or explicit (`dd/mm`,
/// `dd/mm/yyyy`) date. Two-digit years are expanded by adding 2000.
pub fn extract_date(text: &str, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    if text.contains("hoje") {
        return Some(now);
    }
    if text.contains("ontem") {
        return Some(now - Duration::days(1));
    }
    if text.contains("amanhã") {
        return Some(now + Duration::days(1));
    }

    let re = Regex::new(r"(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?").expect("valid regex");
    let caps = re.captures(text)?;

    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            if y < 100 {
                2000 + y
            } else {
                y
            }
        }
        None => now.year(),
    };

    now.timezone()
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
}

/// Extract a date and time for events ("sex 10h", "18/10 14:30").
///
/// Weekday names currently resolve to a fixed "tomorrow" placeholder rather
/// than the true next occurrence of the named weekday.
pub fn extract_datetime(text: &str, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let weekday_re = Regex::new(
        r"(?i)(seg|ter|qua|qui|sex|sáb|dom|segunda|terça|quarta|quinta|sexta|sábado|domingo)\s+(\d{1,2})(?:h|:(\d{2}))?",
    )
    .expect("valid regex");

    if let Some(caps) = weekday_re.captures(text) {
        let hour: u32 = caps[2].parse().ok()?;
        let minute: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;

        let tomorrow = now.date_naive() + Duration::days(1);
        return now
            .timezone()
            .with_ymd_and_hms(tomorrow.year(), tomorrow.month(), tomorrow.day(), hour, minute, 0)
            .single();
    }

    let explicit_re =
        Regex::new(r"(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\s+(\d{1,2}):(\d{2})").expect("valid regex");
    let caps = explicit_re.captures(text)?;

    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            if y < 100 {
                2000 + y
            } else {
                y
            }
        }
        None => now.year(),
    };
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;

    now.timezone()
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
}

/// Strip the amount, category keywords, date words and explicit date tokens
/// from the raw message, leaving a clean note. Falls back to the raw text
/// when cleaning empties the string.
pub fn clean_description(raw: &str) -> String {
    let mut clean = raw.to_string();

    // Currency-marked amounts ("R$ 30") and "30 reais" forms first, so the
    // marker words go with the number.
    let currency_re = Regex::new(r"(?i)r\$\s*\d{1,4}(?:[.,]\d{1,2})?").expect("valid regex");
    clean = currency_re.replace_all(&clean, "").into_owned();
    let reais_re = Regex::new(r"(?i)\d{1,4}(?:[.,]\d{1,2})?\s*reais?").expect("valid regex");
    clean = reais_re.replace_all(&clean, "").into_owned();

    // Remaining bare amounts, skipping time and date fragments
    let mut stripped = String::with_capacity(clean.len());
    let mut last = 0;
    for (range, _) in amount_spans(&clean) {
        stripped.push_str(&clean[last..range.start]);
        last = range.end;
    }
    stripped.push_str(&clean[last..]);
    clean = stripped;

    // Category keywords and date-relative words, whole word, case-insensitive
    let words: Vec<String> = CATEGORY_KEYWORDS
        .iter()
        .map(|(keyword, _)| regex::escape(keyword))
        .chain(DATE_WORDS.iter().map(|word| regex::escape(word)))
        .collect();
    let words_re =
        Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|"))).expect("valid regex");
    clean = words_re.replace_all(&clean, "").into_owned();

    // Explicit date tokens (dd/mm, dd/mm/yyyy)
    let date_re = Regex::new(r"\d{1,2}/\d{1,2}(?:/\d{2,4})?").expect("valid regex");
    clean = date_re.replace_all(&clean, "").into_owned();

    let collapsed = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        raw.to_string()
    } else {
        collapsed
    }
}
