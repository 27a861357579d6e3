use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Terminal intent carried by the last request of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStoreResult {
    /// Verify the reconstructed file and publish it.
    Store,
    /// Discard the partial file.
    Cancel,
}

impl FileStoreResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for FileStoreResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a `result` value is neither `store` nor `cancel`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected 'result' value: '{0}'")]
pub struct UnknownResult(pub String);

impl FromStr for FileStoreResult {
    type Err = UnknownResult;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" => Ok(Self::Store),
            "cancel" => Ok(Self::Cancel),
            other => Err(UnknownResult(other.to_string())),
        }
    }
}

/// Hash algorithms reported in a send result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Sha256,
}

impl HashType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}
