use std::time::Duration;

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("requested window {requested:?} exceeds retained history {history:?}")]
    InvalidArgument {
        requested: Duration,
        history: Duration,
    },
    /// The backward scan would have wrapped around to the cursor over buckets
    /// that are not strictly ordered in time.
    #[error("bucket ring is inconsistent (cursor {cursor}, {bucket_count} buckets)")]
    InternalInvariant { cursor: usize, bucket_count: usize },
}

impl Error {
    #[inline]
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
