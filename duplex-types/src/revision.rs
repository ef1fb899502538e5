//! Opaque revision stamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque version stamp of one document state, assigned by a store.
///
/// A revision uniquely identifies one historical state of one document on
/// one side; revisions are never reused. The empty revision marks a version
/// that has not been persisted yet — see [`Revision::is_empty`] and
/// [`crate::Version::is_new`].
///
/// The engine never interprets revision contents; ordering and winner
/// selection among revisions are the store's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    /// Creates a revision from a store-assigned stamp.
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    /// The empty revision: "not yet persisted".
    #[must_use]
    pub const fn none() -> Self {
        Self(String::new())
    }

    /// Returns true for the not-yet-persisted sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the stamp as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Revision {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}
