//! Monotonic 64-bit key encoding (§4.9).
//!
//! `to_int` maps domain values into an integer space where ordinary `i64`
//! comparison matches semantic ordering, so [`super::pruning`] can compare a
//! predicate's literal against a blob's stored `(lower, upper)` bounds with
//! plain integer arithmetic instead of type-specific comparators.

use chrono::Timelike;
use opteryx_types::Value;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Sentinel for `Null`, `NaN`, and any value with no meaningful integer
/// encoding. Every real bound compares greater than it, so a stored
/// `NULL_FLAG` never drives a pruning decision.
pub const NULL_FLAG: i64 = i64::MIN;

/// Encode `value` into the monotonic key space.
pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Null => NULL_FLAG,
        Value::Boolean(b) => *b as i64,
        Value::Integer(i) => *i,
        Value::Double(d) => encode_double(*d),
        Value::Decimal(d) => encode_decimal(*d),
        Value::Varchar(s) => encode_bytes(s.as_bytes()),
        Value::Blob(b) => encode_bytes(b),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(NULL_FLAG),
        Value::Time(t) => {
            (t.num_seconds_from_midnight() as i64) * 1000 + (t.nanosecond() as i64) / 1_000_000
        }
        Value::Timestamp(ts) => ts.and_utc().timestamp_millis(),
        Value::Interval(months, seconds) => (*months as i64) * 2_592_000_000 + (*seconds as i64) * 1000,
        Value::Array(..) | Value::Struct(..) => NULL_FLAG,
    }
}

fn encode_double(d: f64) -> i64 {
    if d.is_nan() {
        NULL_FLAG
    } else if d.is_infinite() {
        if d > 0.0 {
            i64::MAX
        } else {
            i64::MIN + 1
        }
    } else if d >= i64::MAX as f64 {
        i64::MAX
    } else if d <= i64::MIN as f64 {
        i64::MIN + 1
    } else {
        d.round() as i64
    }
}

fn encode_decimal(d: Decimal) -> i64 {
    d.round()
        .to_i64()
        .unwrap_or(if d.is_sign_negative() { i64::MIN + 1 } else { i64::MAX })
}

/// Truncate/pad `bytes` to 7 bytes and big-endian-interpret them as an
/// integer, using an 8-byte buffer with a zero leading byte so the result
/// is always non-negative and the encoding never overflows `i64`.
fn encode_bytes(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(7);
    buf[1..1 + n].copy_from_slice(&bytes[..n]);
    i64::from_be_bytes(buf)
}

/// Whether the first 7 bytes of `bytes` contain a non-ASCII byte. Used to
/// keep the 7-byte truncation in [`encode_bytes`] from producing a false
/// prune for multi-byte UTF-8 content -- see the truncation-safety note in
/// §4.9.
pub fn has_unsafe_multibyte_prefix(bytes: &[u8]) -> bool {
    bytes.iter().take(7).any(|&b| b >= 0x80)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_pass_through() {
        assert_eq!(to_int(&Value::Integer(42)), 42);
    }

    #[test]
    fn nan_maps_to_null_flag() {
        assert_eq!(to_int(&Value::Double(f64::NAN)), NULL_FLAG);
    }

    #[test]
    fn infinities_saturate() {
        assert_eq!(to_int(&Value::Double(f64::INFINITY)), i64::MAX);
        assert_eq!(to_int(&Value::Double(f64::NEG_INFINITY)), i64::MIN + 1);
    }

    #[test]
    fn short_strings_order_lexicographically() {
        assert!(to_int(&Value::Varchar("aardvark".to_string())) < to_int(&Value::Varchar("alpha".to_string())));
        assert!(to_int(&Value::Varchar("alpha".to_string())) < to_int(&Value::Varchar("omega".to_string())));
    }

    #[test]
    fn monotonic_across_a_sample_domain() {
        let samples = [-100i64, -1, 0, 1, 100, 1_000_000];
        let encoded: Vec<i64> = samples.iter().map(|i| to_int(&Value::Integer(*i))).collect();
        assert!(encoded.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn multibyte_prefix_is_flagged_unsafe() {
        assert!(has_unsafe_multibyte_prefix("β".as_bytes()));
        assert!(!has_unsafe_multibyte_prefix("aardvark".as_bytes()));
    }
}
