//! Decimal money strings ↔ integer cents.
//!
//! Order feeds send prices as decimal strings (`"60.00"`). Everything inside
//! the engine works in `i64` minor units; conversion is integer-only.

use serde::{Deserialize, Deserializer, Serializer};

/// Parse a decimal money string into cents.
///
/// Accepts an optional sign, an integer part, and at most two fractional
/// digits. Returns `None` for anything else.
pub fn parse_money_string(input: &str) -> Option<i64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let whole_cents: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse::<i64>().ok()?.checked_mul(100)?
    };
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse::<i64>().ok()?,
    };
    let cents = whole_cents.checked_add(frac_cents)?;
    Some(if negative { -cents } else { cents })
}

/// Format cents as a two-decimal string (`5400` → `"54.00"`).
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Serde adapter: decimal string or JSON number → cents.
pub fn deserialize_cents<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawAmount::deserialize(deserializer)?;
    let text = match raw {
        RawAmount::Text(s) => s,
        RawAmount::Int(i) => return i.checked_mul(100).ok_or_else(|| {
            serde::de::Error::custom(format!("amount out of range: {i}"))
        }),
        RawAmount::Float(f) => format!("{f:.2}"),
    };
    parse_money_string(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid money amount: {text:?}")))
}

/// Serde adapter: cents → decimal string.
pub fn serialize_cents<S>(cents: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_cents(*cents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_shapes() {
        assert_eq!(parse_money_string("60.00"), Some(6000));
        assert_eq!(parse_money_string("60"), Some(6000));
        assert_eq!(parse_money_string("60.5"), Some(6050));
        assert_eq!(parse_money_string(".99"), Some(99));
        assert_eq!(parse_money_string("-10.25"), Some(-1025));
        assert_eq!(parse_money_string(" 7.10 "), Some(710));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_money_string(""), None);
        assert_eq!(parse_money_string("."), None);
        assert_eq!(parse_money_string("1.234"), None);
        assert_eq!(parse_money_string("12a"), None);
        assert_eq!(parse_money_string("$5"), None);
    }

    #[test]
    fn formats_cents() {
        assert_eq!(format_cents(5400), "54.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(-1025), "-10.25");
    }

    #[test]
    fn deserializes_strings_and_numbers() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "deserialize_cents")]
            amount: i64,
        }
        let a: Probe = serde_json::from_str(r#"{"amount":"60.00"}"#).unwrap();
        let b: Probe = serde_json::from_str(r#"{"amount":40}"#).unwrap();
        let c: Probe = serde_json::from_str(r#"{"amount":12.5}"#).unwrap();
        assert_eq!(a.amount, 6000);
        assert_eq!(b.amount, 4000);
        assert_eq!(c.amount, 1250);
        assert!(serde_json::from_str::<Probe>(r#"{"amount":"abc"}"#).is_err());
    }
}
