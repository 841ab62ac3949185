//! Domain identifiers (strongly-typed IDs).
//!
//! # Opaque string ID + ジェネリック実装
//! Ids are opaque strings: the server issues them on bulk load, and the store
//! mints fresh ones (ULID text) for optimistic creation. 中身の形式には依存しない。
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を提供しつつ、`T` はマーカー型として
//! コンパイル時の型安全性だけを提供します（`CompletableId` と `TagId` は混同できない）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// ログやエラーメッセージで使うラベル（例: "completable", "tag"）
    fn label() -> &'static str;
}

/// ジェネリック ID 型
///
/// Serialized as the bare string (`"_id": "..."`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// ULID から Id を作成（IdGenerator 用）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(ulid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Project / Task 共通のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompletableKey {}

impl IdMarker for CompletableKey {
    fn label() -> &'static str {
        "completable"
    }
}

/// Tag のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKey {}

impl IdMarker for TagKey {
    fn label() -> &'static str {
        "tag"
    }
}

/// User のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserKey {}

impl IdMarker for UserKey {
    fn label() -> &'static str {
        "user"
    }
}

// ========================================
// Type Alias（使いやすさのため）
// ========================================

/// Identifier of a Project or Task. Both share one id space.
pub type CompletableId = Id<CompletableKey>;

/// Identifier of a tag in the user's `currentTags`.
pub type TagId = Id<TagKey>;

/// Identifier of the session user.
pub type UserId = Id<UserKey>;
