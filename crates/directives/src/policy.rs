//! Mediums and blocking policies.

use std::{borrow::Cow, collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// A coarse output resource a directive may occupy (audio output, display).
///
/// The set is open: any name is a valid medium, and names are compared
/// case-insensitively by normalizing to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Medium(Cow<'static, str>);

impl Medium {
    pub const AUDIO: Medium = Medium(Cow::Borrowed("AUDIO"));
    pub const VISUAL: Medium = Medium(Cow::Borrowed("VISUAL"));

    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Cow::Owned(name.as_ref().to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Medium {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for Medium {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<Medium> for String {
    fn from(medium: Medium) -> Self {
        medium.0.into_owned()
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which mediums a directive kind occupies, and for how long.
///
/// A blocking policy holds its mediums until the directive completes or
/// fails. A non-blocking policy holds them only for the duration of the
/// router's `handle` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingPolicy {
    mediums: BTreeSet<Medium>,
    blocking: bool,
}

impl BlockingPolicy {
    /// Occupies nothing; never waits and never makes anything wait.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn blocking(mediums: impl IntoIterator<Item = Medium>) -> Self {
        Self {
            mediums: mediums.into_iter().collect(),
            blocking: true,
        }
    }

    pub fn non_blocking(mediums: impl IntoIterator<Item = Medium>) -> Self {
        Self {
            mediums: mediums.into_iter().collect(),
            blocking: false,
        }
    }

    pub fn mediums(&self) -> impl Iterator<Item = &Medium> {
        self.mediums.iter()
    }

    pub fn uses(&self, medium: &Medium) -> bool {
        self.mediums.contains(medium)
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }
}

impl fmt::Display for BlockingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mediums: Vec<&str> = self.mediums.iter().map(Medium::as_str).collect();
        let mode = if self.blocking { "blocking" } else { "non-blocking" };
        write!(f, "{mode}[{}]", mediums.join(","))
    }
}
