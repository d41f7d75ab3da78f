//! Common types used throughout Backhaul.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheduling class for a queued action.
///
/// Purely a scheduling hint: it decides replay order and the retry budget
/// assigned at enqueue time, never correctness. The derived `Ord` ranks
/// `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Maximum execution attempts for an action of this class.
    ///
    /// Fixed at enqueue time; changing the policy later never affects
    /// actions already in the queue.
    pub fn attempt_limit(self) -> u32 {
        match self {
            Priority::Critical => 10,
            Priority::High => 5,
            Priority::Medium | Priority::Low => 3,
        }
    }

    /// Stable integer rank for index-ordered storage.
    pub fn rank(self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }

    /// Inverse of [`Priority::rank`]; out-of-range values clamp to `Low`.
    pub fn from_rank(rank: i64) -> Self {
        match rank {
            3 => Priority::Critical,
            2 => Priority::High,
            1 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// HTTP-shaped request method.
///
/// The engine never interprets methods beyond the read/write split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether this method is a pure read (served from cache while offline,
    /// never queued).
    pub fn is_read(self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }

    /// Canonical wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown method: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
