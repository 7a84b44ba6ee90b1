//! SQL text rewriting: comment/whitespace normalization and extraction of
//! the non-standard `FOR <temporal>` relation extension the parser does not
//! understand.

use chrono::{Datelike, NaiveDate};
use opteryx_error::{OpteryxError, Result};
use tracing::trace;

/// A `(relation_alias, start_date, end_date)` triple extracted from a `FOR`
/// clause, in the document order the relations appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalRange {
    pub relation_alias: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

const RELATION_STARTERS: &[&str] = &["FROM", "JOIN"];
const TERMINATORS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "UNION", "INTERSECT", "EXCEPT", "ON", ";",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Relation,
    Temporal,
    Alias,
}

/// Remove comments and collapse interior whitespace outside quoted regions,
/// then extract `FOR` temporal-range extensions. `today` is the reference
/// date used to resolve relative ranges (`TODAY`, `THIS_MONTH`, ...).
pub fn rewrite(sql: &str, today: NaiveDate) -> Result<(String, Vec<TemporalRange>)> {
    trace!("rewriting sql text");
    let cleaned = strip_comments_and_collapse_whitespace(sql);
    let tokens = tokenize_respecting_quotes(&cleaned);
    extract_temporal_ranges(&tokens, today)
}

/// Remove `--` line comments and `/* ... */` block comments, and collapse
/// runs of whitespace to a single space, without touching the contents of
/// single-, double-, or backtick-quoted regions.
fn strip_comments_and_collapse_whitespace(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    let mut quote: Option<char> = None;
    let mut last_was_space = false;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                // Doubled quote is an escaped literal quote; stay in the
                // quoted region.
                if chars.get(i + 1) == Some(&q) {
                    out.push(q);
                    i += 2;
                    continue;
                }
                quote = None;
            }
            last_was_space = false;
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
                last_was_space = false;
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
            }
            c if c.is_whitespace() => {
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
                i += 1;
            }
            c => {
                out.push(c);
                last_was_space = false;
                i += 1;
            }
        }
    }

    out.trim().to_string()
}

/// Split on whitespace, treating quoted regions as opaque single tokens.
fn tokenize_respecting_quotes(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in s.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            // Split a handful of punctuation tokens that may abut an
            // identifier (e.g. "foo;") even without intervening whitespace.
            ';' | ',' | '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_quoted(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(
        (chars.next(), chars.next_back()),
        (Some('\''), Some('\'')) | (Some('"'), Some('"')) | (Some('`'), Some('`'))
    )
}

fn is_terminator(upper: &str) -> bool {
    TERMINATORS.contains(&upper)
}

fn is_relation_starter(upper: &str) -> bool {
    RELATION_STARTERS.contains(&upper)
}

fn extract_temporal_ranges(
    tokens: &[String],
    today: NaiveDate,
) -> Result<(String, Vec<TemporalRange>)> {
    let mut state = State::Waiting;
    let mut out_tokens: Vec<String> = Vec::new();
    let mut ranges = Vec::new();

    let mut current_relation: Option<String> = None;
    let mut current_alias: Option<String> = None;
    let mut temporal_buf: Vec<String> = Vec::new();

    let mut idx = 0;
    while idx < tokens.len() {
        let token = &tokens[idx];
        let upper = token.to_ascii_uppercase();

        match state {
            State::Waiting => {
                out_tokens.push(token.clone());
                if is_relation_starter(&upper) {
                    state = State::Relation;
                    current_relation = None;
                    current_alias = None;
                }
            }
            State::Relation => {
                if upper == "FOR" {
                    if current_relation.is_none() {
                        return Err(OpteryxError::invalid_temporal_range(
                            "FOR must immediately follow a relation reference",
                        ));
                    }
                    state = State::Temporal;
                    temporal_buf.clear();
                } else if upper == "AS" {
                    out_tokens.push(token.clone());
                    state = State::Alias;
                } else if is_relation_starter(&upper) {
                    out_tokens.push(token.clone());
                    current_relation = None;
                    current_alias = None;
                } else if is_terminator(&upper) || token == ")" || token == "," {
                    out_tokens.push(token.clone());
                    state = State::Waiting;
                } else if !is_quoted(token) && upper.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$') {
                    out_tokens.push(token.clone());
                    if current_relation.is_none() {
                        current_relation = Some(token.clone());
                    } else if current_alias.is_none() {
                        current_alias = Some(token.clone());
                    }
                } else {
                    out_tokens.push(token.clone());
                    state = State::Waiting;
                }
            }
            State::Alias => {
                out_tokens.push(token.clone());
                current_alias = Some(token.clone());
                state = State::Relation;
            }
            State::Temporal => {
                if is_terminator(&upper) || is_relation_starter(&upper) || token == ")" || token == "," {
                    let alias = current_alias.clone().or_else(|| current_relation.clone()).ok_or_else(|| {
                        OpteryxError::invalid_temporal_range("FOR clause has no associated relation")
                    })?;
                    let (start, end) = parse_temporal_spec(&temporal_buf, today)?;
                    ranges.push(TemporalRange {
                        relation_alias: alias,
                        start_date: start,
                        end_date: end,
                    });
                    state = State::Relation;
                    // Re-process this token under the Relation state.
                    continue;
                } else {
                    temporal_buf.push(token.clone());
                }
            }
        }
        idx += 1;
    }

    if state == State::Temporal {
        let alias = current_alias.or(current_relation).ok_or_else(|| {
            OpteryxError::invalid_temporal_range("FOR clause has no associated relation")
        })?;
        let (start, end) = parse_temporal_spec(&temporal_buf, today)?;
        ranges.push(TemporalRange {
            relation_alias: alias,
            start_date: start,
            end_date: end,
        });
    }

    Ok((out_tokens.join(" "), ranges))
}

fn unquote(token: &str) -> String {
    if is_quoted(token) {
        token[1..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

fn parse_temporal_spec(tokens: &[String], today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    if tokens.is_empty() {
        return Err(OpteryxError::invalid_temporal_range("empty FOR clause"));
    }
    let first = tokens[0].to_ascii_uppercase();

    match first.as_str() {
        "TODAY" => Ok((today, today)),
        "YESTERDAY" => {
            let y = today.pred_opt().ok_or_else(|| {
                OpteryxError::invalid_temporal_range("date underflow computing YESTERDAY")
            })?;
            Ok((y, y))
        }
        "DATES" => {
            if tokens.len() < 2 {
                return Err(OpteryxError::invalid_temporal_range("malformed DATES clause"));
            }
            match tokens[1].to_ascii_uppercase().as_str() {
                "BETWEEN" => {
                    if tokens.len() != 4 || !tokens[3].eq_ignore_ascii_case("AND") && tokens.len() < 5 {
                        // fallthrough to generic parse below
                    }
                    // Expected shape: DATES BETWEEN <d1> AND <d2>
                    if tokens.len() != 5 || !tokens[3].eq_ignore_ascii_case("AND") {
                        return Err(OpteryxError::invalid_temporal_range(
                            "expected DATES BETWEEN <date> AND <date>",
                        ));
                    }
                    let start = parse_iso_date(&unquote(&tokens[2]))?;
                    let end = parse_iso_date(&unquote(&tokens[4]))?;
                    if start > end {
                        return Err(OpteryxError::invalid_temporal_range(
                            "start date is after end date in DATES BETWEEN",
                        ));
                    }
                    Ok((start, end))
                }
                "IN" => {
                    if tokens.len() != 3 {
                        return Err(OpteryxError::invalid_temporal_range("expected DATES IN <range>"));
                    }
                    named_range(&tokens[2].to_ascii_uppercase(), today)
                }
                other => Err(OpteryxError::invalid_temporal_range(format!(
                    "unknown DATES clause: {other}"
                ))),
            }
        }
        _ if tokens.len() == 1 => {
            let d = parse_iso_date(&unquote(&tokens[0]))?;
            Ok((d, d))
        }
        _ => Err(OpteryxError::invalid_temporal_range(format!(
            "malformed temporal range: {}",
            tokens.join(" ")
        ))),
    }
}

fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| OpteryxError::invalid_temporal_range(format!("invalid ISO date literal: {s}")))
}

fn named_range(name: &str, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    match name {
        "THIS_MONTH" => {
            let start = today.with_day(1).unwrap();
            let end = last_day_of_month(today);
            Ok((start, end))
        }
        "LAST_MONTH" | "PREVIOUS_MONTH" => {
            let first_this_month = today.with_day(1).unwrap();
            let last_month_end = first_this_month.pred_opt().unwrap();
            let start = last_month_end.with_day(1).unwrap();
            Ok((start, last_month_end))
        }
        "THIS_CYCLE" => Ok(billing_cycle(today, 0)),
        "PREVIOUS_CYCLE" => Ok(billing_cycle(today, -1)),
        other => Err(OpteryxError::invalid_temporal_range(format!(
            "unknown date range: {other}"
        ))),
    }
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = (date.year(), date.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
}

/// A billing cycle runs from the 22nd of one month to the 21st of the next.
/// `offset` shifts the cycle backwards by whole cycles (0 = the cycle
/// containing `today`, -1 = the one before that).
fn billing_cycle(today: NaiveDate, offset: i32) -> (NaiveDate, NaiveDate) {
    let anchor_month_start = if today.day() >= 22 {
        NaiveDate::from_ymd_opt(today.year(), today.month(), 22).unwrap()
    } else {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        NaiveDate::from_ymd_opt(year, month, 22).unwrap()
    };

    let mut start = anchor_month_start;
    for _ in 0..(-offset) {
        let (year, month) = if start.month() == 1 {
            (start.year() - 1, 12)
        } else {
            (start.year(), start.month() - 1)
        };
        start = NaiveDate::from_ymd_opt(year, month, 22).unwrap();
    }

    let (end_year, end_month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let end = NaiveDate::from_ymd_opt(end_year, end_month, 21).unwrap();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 26).unwrap()
    }

    #[test]
    fn strips_line_and_block_comments() {
        let sql = "SELECT 1 -- trailing comment\nFROM /* block */ $planets";
        let (cleaned, _) = rewrite(sql, today()).unwrap();
        assert_eq!(cleaned, "SELECT 1 FROM $planets");
    }

    #[test]
    fn preserves_sql_like_content_inside_quoted_strings() {
        let sql = "SELECT '-- not a comment' FROM $planets WHERE name = 'a  b'";
        let (cleaned, _) = rewrite(sql, today()).unwrap();
        assert!(cleaned.contains("'-- not a comment'"));
        assert!(cleaned.contains("'a  b'"));
    }

    #[test]
    fn extracts_for_today() {
        let sql = "SELECT * FROM $planets FOR TODAY";
        let (cleaned, ranges) = rewrite(sql, today()).unwrap();
        assert_eq!(cleaned, "SELECT * FROM $planets");
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].relation_alias, "$planets");
        assert_eq!(ranges[0].start_date, today());
        assert_eq!(ranges[0].end_date, today());
    }

    #[test]
    fn extracts_iso_date_literal() {
        let sql = "SELECT * FROM $planets FOR '1900-01-01'";
        let (_, ranges) = rewrite(sql, today()).unwrap();
        let expected = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
        assert_eq!(ranges[0].start_date, expected);
        assert_eq!(ranges[0].end_date, expected);
    }

    #[test]
    fn extracts_dates_between() {
        let sql = "SELECT * FROM $planets FOR DATES BETWEEN '2022-01-01' AND '2022-01-31' WHERE 1=1";
        let (cleaned, ranges) = rewrite(sql, today()).unwrap();
        assert_eq!(cleaned, "SELECT * FROM $planets WHERE 1=1");
        assert_eq!(ranges[0].start_date, NaiveDate::from_ymd_opt(2022, 1, 1).unwrap());
        assert_eq!(ranges[0].end_date, NaiveDate::from_ymd_opt(2022, 1, 31).unwrap());
    }

    #[test]
    fn respects_document_order_across_two_relations() {
        let sql = "SELECT * FROM $planets FOR TODAY JOIN $satellites FOR YESTERDAY ON 1=1";
        let (_, ranges) = rewrite(sql, today()).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].relation_alias, "$planets");
        assert_eq!(ranges[1].relation_alias, "$satellites");
        assert_eq!(ranges[1].start_date, today().pred_opt().unwrap());
    }

    #[test]
    fn for_outside_relation_context_is_an_error() {
        let sql = "SELECT FOR something";
        assert!(rewrite(sql, today()).is_err());
    }

    #[test]
    fn rewrite_is_idempotent() {
        // The first pass both normalizes whitespace/comments *and* strips the
        // `FOR` clause's text out, so a second pass over its own output can
        // never re-extract the same ranges -- only the rewritten text is
        // idempotent, not the (one-shot) range extraction.
        let sql = "SELECT  *   FROM $planets  -- trailing\n FOR TODAY WHERE x = 1";
        let (once, ranges_once) = rewrite(sql, today()).unwrap();
        let (twice, ranges_twice) = rewrite(&once, today()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(ranges_once.len(), 1);
        assert!(ranges_twice.is_empty());
    }

    #[test]
    fn this_cycle_spans_22nd_to_21st() {
        let (start, end) = named_range("THIS_CYCLE", today()).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 6, 22).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 7, 21).unwrap());
    }
}
