//! Typed key vocabulary.
//!
//! # Responsibility
//! - Parse facade key strings into typed keys exactly once, at the boundary.
//! - Tag every data key with its kind so downstream code never re-derives
//!   the kind from string shape.
//!
//! # Invariants
//! - Parameter keys have the form `group:name`; both parts are non-empty and
//!   the split happens at the first `:`.
//! - Derived-data response keys may carry a `@<report_step>` suffix that is
//!   not part of the stored response name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static PARAMETER_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):(.+)$").expect("valid parameter key regex"));

const REPORT_STEP_SEPARATOR: char = '@';

/// Kind of a data key as exposed to read consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Parameter,
    Response,
}

impl KeyKind {
    /// Data-origin tag reported to plotting consumers.
    pub fn data_origin(self) -> &'static str {
        match self {
            Self::Parameter => "Parameters",
            Self::Response => "Response",
        }
    }

    /// Scalar parameters are one-dimensional, response series two.
    pub fn dimensionality(self) -> u8 {
        match self {
            Self::Parameter => 1,
            Self::Response => 2,
        }
    }
}

/// Key string did not match the expected `group:name` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidKeyError(pub String);

impl Display for InvalidKeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid parameter key `{}`; expected group:name", self.0)
    }
}

impl Error for InvalidKeyError {}

/// Natural key of a parameter column within an ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterKey {
    pub group: String,
    pub name: String,
}

impl ParameterKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Parses `group:name`.
    pub fn parse(raw: &str) -> Result<Self, InvalidKeyError> {
        let caps = PARAMETER_KEY_RE
            .captures(raw.trim())
            .ok_or_else(|| InvalidKeyError(raw.to_string()))?;
        Ok(Self::new(&caps[1], &caps[2]))
    }
}

impl Display for ParameterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Response key as enumerated by the facade plus its stored name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseKey {
    /// Key used to gather data from the facade.
    pub source_key: String,
    /// Name under which the series is stored.
    pub name: String,
}

impl ResponseKey {
    pub fn from_source(source_key: impl Into<String>) -> Self {
        let source_key = source_key.into();
        let name = match source_key.split_once(REPORT_STEP_SEPARATOR) {
            Some((name, _step)) => name.to_string(),
            None => source_key.clone(),
        };
        Self { source_key, name }
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyKind, ParameterKey, ResponseKey};

    #[test]
    fn parameter_key_splits_at_first_colon() {
        let key = ParameterKey::parse("SNAKE_OIL_PARAM:OP1_PERSISTENCE").unwrap();
        assert_eq!(key.group, "SNAKE_OIL_PARAM");
        assert_eq!(key.name, "OP1_PERSISTENCE");

        let nested = ParameterKey::parse("G:a:b").unwrap();
        assert_eq!(nested.group, "G");
        assert_eq!(nested.name, "a:b");
        assert_eq!(nested.to_string(), "G:a:b");
    }

    #[test]
    fn parameter_key_rejects_missing_parts() {
        for raw in ["", "NOGROUP", ":name", "group:"] {
            assert!(ParameterKey::parse(raw).is_err(), "`{raw}` should be rejected");
        }
    }

    #[test]
    fn response_key_strips_report_step() {
        let gen_data = ResponseKey::from_source("SNAKE_OIL_WPR_DIFF@199");
        assert_eq!(gen_data.name, "SNAKE_OIL_WPR_DIFF");
        assert_eq!(gen_data.source_key, "SNAKE_OIL_WPR_DIFF@199");

        let summary = ResponseKey::from_source("WOPR:OP1");
        assert_eq!(summary.name, "WOPR:OP1");
    }

    #[test]
    fn key_kind_reports_origin_and_dimensionality() {
        assert_eq!(KeyKind::Parameter.data_origin(), "Parameters");
        assert_eq!(KeyKind::Response.dimensionality(), 2);
    }
}
