// crates/types/src/file_id.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Numeric identifier of a downloadable file.
///
/// Only values in `[FileId::MIN, FileId::MAX]` can be constructed, so every
/// `FileId` that reaches the engine has already passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "i64", into = "u64")]
pub struct FileId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileIdError {
    #[error("file_id must be between {min} and {max}, got {0}", min = FileId::MIN, max = FileId::MAX)]
    OutOfRange(i64),

    #[error("file_id must be an integer, got {0:?}")]
    NotAnInteger(String),
}

impl FileId {
    pub const MIN: u64 = 10_000;
    pub const MAX: u64 = 100_000_000;

    pub fn get(self) -> u64 {
        self.0
    }

    /// Object key for this file in the content store.
    pub fn object_key(self) -> String {
        format!("{}.zip", self.0)
    }
}

impl TryFrom<i64> for FileId {
    type Error = FileIdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < Self::MIN as i64 || value > Self::MAX as i64 {
            return Err(FileIdError::OutOfRange(value));
        }
        Ok(Self(value as u64))
    }
}

impl TryFrom<u64> for FileId {
    type Error = FileIdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let signed = i64::try_from(value).map_err(|_| FileIdError::OutOfRange(i64::MAX))?;
        Self::try_from(signed)
    }
}

impl From<FileId> for u64 {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl FromStr for FileId {
    type Err = FileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| FileIdError::NotAnInteger(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
