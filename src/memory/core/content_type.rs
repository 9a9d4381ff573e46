//! Content type of a memory record.
//!
//! The set is closed and parsing is strict: an unknown value is a validation error at ingest
//! time. Stable `snake_case` identifiers are used for storage, the keyword index's
//! auxiliary column, and the vector index's partition key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of a stored development artifact.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Source code or a code fragment.
    Code,
    /// Documentation snippet.
    Documentation,
    /// Ambient working context (open files, task description).
    Context,
    /// Tool or command output.
    Output,
    /// An error message or failure trace.
    Error,
    /// A decision and its rationale.
    Decision,
    /// Something learned that should inform later work.
    Learning,
}

/// Parse error for [`ContentType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeParseError {
    value: String,
}

impl ContentTypeParseError {
    /// The raw value that failed parsing.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ContentTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid content type {:?} (expected one of: {})",
            self.value,
            ContentType::ALL
                .iter()
                .map(|kind| kind.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for ContentTypeParseError {}

impl ContentType {
    /// Every content type, in declaration order.
    pub const ALL: &'static [Self] = &[
        Self::Code,
        Self::Documentation,
        Self::Context,
        Self::Output,
        Self::Error,
        Self::Decision,
        Self::Learning,
    ];

    /// Stable storage identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Documentation => "documentation",
            Self::Context => "context",
            Self::Output => "output",
            Self::Error => "error",
            Self::Decision => "decision",
            Self::Learning => "learning",
        }
    }

    /// Tag used when rendering a record into assembled context, e.g. `(decision)`.
    #[must_use]
    pub const fn context_tag(self) -> &'static str {
        match self {
            Self::Code => "(code)",
            Self::Documentation => "(documentation)",
            Self::Context => "(context)",
            Self::Output => "(output)",
            Self::Error => "(error)",
            Self::Decision => "(decision)",
            Self::Learning => "(learning)",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ContentTypeParseError;

    /// Strict parsing: surrounding whitespace and ASCII case are ignored, nothing else is.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| raw.eq_ignore_ascii_case(kind.as_str()))
            .ok_or_else(|| ContentTypeParseError {
                value: raw.to_string(),
            })
    }
}
