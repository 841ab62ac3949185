//! Errors - エラー型と分類
//!
//! - `StoreError`: store の操作エラー（存在しない id はプログラミングエラー）
//! - `PersistenceError`: REST adapter の失敗
//! - `SaveError`: scheduled callback 1 件分の失敗（ログに出すだけ、リトライしない）

use std::time::Duration;

use thiserror::Error;

use super::completable::EntityRef;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Operating on an id absent from its map. Contract violation by the caller.
    #[error("no {0} in the store")]
    NotFound(EntityRef),

    #[error("user is not loaded")]
    UserNotLoaded,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error("persistence service unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Error)]
pub enum SaveError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The server answered but did not accept the write.
    #[error("save of {target} was not accepted")]
    Rejected { target: String },

    #[error("save timed out after {0:?}")]
    TimedOut(Duration),
}
