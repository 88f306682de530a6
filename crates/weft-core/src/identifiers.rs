//! Identifier types shared by every Weft crate
//!
//! Two families live here:
//!
//! - [`ToolId`] is a validated, human-readable name. Tool names arrive from
//!   the model layer, so they go through the same parse-don't-validate rules
//!   everywhere: non-empty, at most 128 characters, no surrounding whitespace,
//!   only alphanumerics plus `-`, `_`, `.`, `:` and never a `../` sequence.
//! - [`RequestId`], [`ThreadId`] and [`MessageId`] are UUID-backed and
//!   generated by the core. They are distinct newtypes so a thread id can
//!   never be passed where a request id is expected.
//!
//! ```rust
//! use weft_core::identifiers::{ToolId, ThreadId};
//!
//! let tool = ToolId::parse("file_read").unwrap();
//! assert_eq!(tool.as_str(), "file_read");
//! assert!(ToolId::parse("../etc").is_err());
//!
//! let a = ThreadId::generate();
//! let b = ThreadId::generate();
//! assert_ne!(a, b);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length for validated identifiers
pub const MAX_ID_LENGTH: usize = 128;

/// Error type for identifier validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdValidationError {
    #[error("Identifier cannot be empty")]
    Empty,
    #[error("Identifier cannot have leading or trailing whitespace")]
    LeadingTrailingWhitespace,
    #[error("Identifier too long ({length} chars, max {max})")]
    TooLong { length: usize, max: usize },
    #[error("Identifier cannot contain path traversal sequences (../)")]
    PathTraversal,
    #[error(
        "Identifier can only contain alphanumeric characters, hyphens, underscores, dots and colons"
    )]
    InvalidCharacters,
    #[error("Identifier is not a valid UUID: {0}")]
    NotUuid(String),
}

/// Validator for textual identifiers
pub struct IdValidator;

impl IdValidator {
    pub fn validate(id: &str) -> Result<&str, IdValidationError> {
        if id.is_empty() {
            return Err(IdValidationError::Empty);
        }

        if id != id.trim() {
            return Err(IdValidationError::LeadingTrailingWhitespace);
        }

        if id.len() > MAX_ID_LENGTH {
            return Err(IdValidationError::TooLong {
                length: id.len(),
                max: MAX_ID_LENGTH,
            });
        }

        if id.contains("../") || id.contains("./") {
            return Err(IdValidationError::PathTraversal);
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(IdValidationError::InvalidCharacters);
        }

        Ok(id)
    }
}

/// Unique name of a registered tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolId(String);

impl ToolId {
    /// Parse and validate a tool name
    pub fn parse(id: impl AsRef<str>) -> Result<Self, IdValidationError> {
        IdValidator::validate(id.as_ref()).map(|s| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create a tool ID without validation (for testing only)
    #[doc(hidden)]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ToolId {
    type Err = IdValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<ToolId> for String {
    fn from(id: ToolId) -> Self {
        id.0
    }
}

impl TryFrom<String> for ToolId {
    type Error = IdValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn parse(id: impl AsRef<str>) -> Result<Self, IdValidationError> {
                Uuid::parse_str(id.as_ref())
                    .map(Self)
                    .map_err(|e| IdValidationError::NotUuid(e.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id!(
    /// Identifier of one ActionRequest; doubles as the operation id of the
    /// file changes that request produces.
    RequestId
);

uuid_id!(
    /// Identifier of a conversation thread
    ThreadId
);

uuid_id!(
    /// Identifier of a single thread message
    MessageId
);

/// File changes are tagged with the request that produced them.
pub type OperationId = RequestId;
