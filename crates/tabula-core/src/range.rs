//! Key ranges and the bound descriptor translator
//!
//! A [`BoundDescriptor`] is the declarative form a host passes to
//! `get_by_index`; [`translate`] turns it into a concrete [`KeyRange`] (or
//! `None` for an unrestricted scan).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::key::Key;

/// A contiguous range of keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    pub lower: Option<Key>,
    pub upper: Option<Key>,
    /// Excludes `lower` itself
    pub lower_open: bool,
    /// Excludes `upper` itself
    pub upper_open: bool,
}

impl KeyRange {
    /// Range matching exactly one key.
    pub fn only(key: Key) -> Self {
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Range from `key` upward.
    pub fn lower_bound(key: Key, open: bool) -> Self {
        Self {
            lower: Some(key),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// Range up to `key`.
    pub fn upper_bound(key: Key, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(key),
            lower_open: false,
            upper_open: open,
        }
    }

    /// Range between two keys. Fails if the range would be empty by
    /// construction (`lower > upper`, or equal keys with either end open).
    pub fn bound(lower: Key, upper: Key, lower_open: bool, upper_open: bool) -> Result<Self> {
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(Error::Argument(format!(
                "invalid key range: lower {} is not below upper {}",
                lower, upper
            )));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Check if `key` falls inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        if let Some(lower) = &self.lower {
            if key < lower || (self.lower_open && key == lower) {
                return false;
            }
        }
        if let Some(upper) = &self.upper {
            if key > upper || (self.upper_open && key == upper) {
                return false;
            }
        }
        true
    }
}

/// One end of a bound descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_include: Option<bool>,
}

/// Declarative scan range for a single index.
///
/// JSON form: `{"only": v}`, `{"lowerBound": {"value": v, "notInclude": true}}`
/// or `{"upperBound": {...}}`. An empty descriptor scans the whole index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<Bound>,
}

impl BoundDescriptor {
    /// Unrestricted scan.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(value: impl Into<Value>) -> Self {
        Self {
            only: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn lower(value: impl Into<Value>, not_include: bool) -> Self {
        Self {
            lower_bound: Some(Bound {
                value: Some(value.into()),
                not_include: Some(not_include),
            }),
            ..Self::default()
        }
    }

    pub fn upper(value: impl Into<Value>, not_include: bool) -> Self {
        Self {
            upper_bound: Some(Bound {
                value: Some(value.into()),
                not_include: Some(not_include),
            }),
            ..Self::default()
        }
    }
}

/// How the upper bound's exclusivity flag is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundMode {
    /// Each bound honours its own `notInclude`.
    #[default]
    Independent,
    /// Upper bounds take the lower-bound flag, which is never set on that
    /// path, so every upper bound is inclusive. Kept for hosts that depend
    /// on the historical behaviour.
    Legacy,
}

/// Translate a bound descriptor into a key range.
pub fn translate(bounds: &BoundDescriptor) -> Result<Option<KeyRange>> {
    translate_with(bounds, BoundMode::default())
}

/// Translate a bound descriptor using the given upper-bound mode.
///
/// `only` wins over everything else, then `lowerBound`, then `upperBound`.
pub fn translate_with(bounds: &BoundDescriptor, mode: BoundMode) -> Result<Option<KeyRange>> {
    if let Some(value) = &bounds.only {
        return Ok(Some(KeyRange::only(bound_key(value, "only")?)));
    }

    if let Some(lower) = &bounds.lower_bound {
        let value = lower
            .value
            .as_ref()
            .ok_or_else(|| Error::Argument("Lower bound value not provided".into()))?;
        let open = lower.not_include.unwrap_or(false);
        return Ok(Some(KeyRange::lower_bound(bound_key(value, "lower bound")?, open)));
    }

    if let Some(upper) = &bounds.upper_bound {
        let value = upper
            .value
            .as_ref()
            .ok_or_else(|| Error::Argument("Upper bound value not provided".into()))?;
        let open = match mode {
            BoundMode::Independent => upper.not_include.unwrap_or(false),
            BoundMode::Legacy => false,
        };
        return Ok(Some(KeyRange::upper_bound(bound_key(value, "upper bound")?, open)));
    }

    Ok(None)
}

fn bound_key(value: &Value, which: &str) -> Result<Key> {
    Key::from_value(value)
        .ok_or_else(|| Error::Argument(format!("{} value {} is not a valid key", which, value)))
}
