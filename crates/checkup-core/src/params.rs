//! Building blocks for turning an untyped string map into typed values.
//!
//! Each validator composes these in a fixed order: [`non_empty`], then every
//! [`mandatory`] key, then integer and duration keys, then [`linked_pair`]s.
//! A given malformed input therefore always reports the same single error.

use std::collections::BTreeMap;
use std::num::IntErrorKind;
use std::time::Duration;

use crate::error::ParamError;

pub type Params = BTreeMap<String, String>;

/// Reject an absent or empty parameter map.
pub fn non_empty(params: Option<&Params>) -> Result<&Params, ParamError> {
    match params {
        Some(p) if !p.is_empty() => Ok(p),
        _ => Err(ParamError::InvalidParams),
    }
}

/// Value of a key that must be present and non-empty.
pub fn mandatory<'a>(params: &'a Params, key: &'static str) -> Result<&'a str, ParamError> {
    match params.get(key) {
        Some(v) if !v.is_empty() => Ok(v.as_str()),
        _ => Err(ParamError::InvalidMandatoryField(key)),
    }
}

/// Non-negative integer value of `key`, or `default` when the key is absent.
pub fn integer_or(params: &Params, key: &'static str, default: u64) -> Result<u64, ParamError> {
    let Some(raw) = params.get(key) else {
        return Ok(default);
    };

    raw.parse::<u64>().map_err(|source| match source.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ParamError::Range { key, source },
        _ => ParamError::Syntax { key, source },
    })
}

/// Two keys that are only meaningful together.
///
/// Both absent yields `None`; both present and non-empty yields the pair.
/// Anything else is an [`ParamError::IllegalPairedParamsCombination`].
pub fn linked_pair(
    params: &Params,
    first: &'static str,
    second: &'static str,
) -> Result<Option<(String, String)>, ParamError> {
    match (params.get(first), params.get(second)) {
        (None, None) => Ok(None),
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Ok(Some((a.clone(), b.clone()))),
        _ => Err(ParamError::IllegalPairedParamsCombination { first, second }),
    }
}

/// Strictly positive duration value of a mandatory key.
pub fn duration(params: &Params, key: &'static str) -> Result<Duration, ParamError> {
    let raw = mandatory(params, key)?;
    match parse_duration(raw) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ParamError::InvalidDuration {
            key,
            value: raw.to_string(),
        }),
    }
}

/// Parse "90s", "5m", "1h", "1h30m" or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let multiplier = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return None,
        };
        let n: u64 = digits.parse().ok()?;
        total = total.checked_add(n.checked_mul(multiplier)?)?;
        digits.clear();
    }

    // Trailing digits without a unit ("1m30") are ambiguous.
    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
