//! Result of a governed call.

use serde::Serialize;

/// Why a governed call did not run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A newer call for the same key superseded this one.
    Debounced,
    /// No token was available.
    RateLimited,
    /// The operation ran and failed; the failure was absorbed.
    Degraded,
}

/// A governed call either ran, was answered from cache, or was skipped.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The operation ran.
    Executed(T),
    /// The answer came from the cache.
    Cached(T),
    /// Nothing ran.
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    /// The produced value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Executed(value) | Self::Cached(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }

    /// Borrow the produced value, if any.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Executed(value) | Self::Cached(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }

    /// The skip reason, if the call was skipped.
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// True if nothing ran.
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// Transform the value, keeping how it was produced.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Executed(value) => Outcome::Executed(f(value)),
            Self::Cached(value) => Outcome::Cached(f(value)),
            Self::Skipped(reason) => Outcome::Skipped(reason),
        }
    }
}
