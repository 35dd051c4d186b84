//! Threshold crossing decisions
//!
//! Pure functions with no side effects. A device is told about the
//! threshold exactly once per crossing: the increment that moves its current
//! count from below the threshold to at-or-above it. Startup contacts have no
//! transition, so they report the post-contact state instead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response code sent back to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum ResponseCode {
    /// Nothing to report; no datagram is sent back
    Normal,
    /// The device needs maintenance
    ThresholdReached,
}

impl ResponseCode {
    /// Numeric wire value
    pub fn code(self) -> i64 {
        match self {
            ResponseCode::Normal => 0,
            ResponseCode::ThresholdReached => 1,
        }
    }

    /// Whether this is the implicit "ok" that produces no reply
    pub fn is_normal(self) -> bool {
        self == ResponseCode::Normal
    }
}

impl From<ResponseCode> for i64 {
    fn from(code: ResponseCode) -> Self {
        code.code()
    }
}

impl TryFrom<i64> for ResponseCode {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::Normal),
            1 => Ok(ResponseCode::ThresholdReached),
            other => Err(format!("unknown response code {}", other)),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Classify an increment: `ThresholdReached` iff `old < threshold <= new`
pub fn classify(old_count: i64, new_count: i64, threshold: i64) -> ResponseCode {
    if old_count < threshold && new_count >= threshold {
        ResponseCode::ThresholdReached
    } else {
        ResponseCode::Normal
    }
}

/// Classify a startup contact from the post-contact count alone
pub fn classify_startup(current_count: i64, threshold: i64) -> ResponseCode {
    if current_count >= threshold {
        ResponseCode::ThresholdReached
    } else {
        ResponseCode::Normal
    }
}

/// Threshold policy bound to the process-wide threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdEngine {
    threshold: i64,
}

impl ThresholdEngine {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Response for a startup contact
    pub fn on_startup(&self, current_count: i64) -> ResponseCode {
        classify_startup(current_count, self.threshold)
    }

    /// Response for an increment that moved the count from `old` to `new`
    pub fn on_increment(&self, old_count: i64, new_count: i64) -> ResponseCode {
        classify(old_count, new_count, self.threshold)
    }
}
