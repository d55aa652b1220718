//! Axis labels for series data (report steps, depths, dates).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One position on a response or observation axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisLabel {
    /// Integer axis point, e.g. a report step or data index.
    Integer(i64),
    /// Textual axis point, e.g. an ISO date.
    Text(String),
}

impl Display for AxisLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for AxisLabel {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for AxisLabel {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AxisLabel {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Builds an integer axis `0..len`.
pub fn positional_axis(len: usize) -> Vec<AxisLabel> {
    (0..len as i64).map(AxisLabel::Integer).collect()
}
