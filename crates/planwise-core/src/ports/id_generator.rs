//! IdGenerator port - ID 生成の抽象化
//!
//! Optimistic creation needs an id before the server has seen the entity.
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{CompletableId, TagId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は衝突しない ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（Store の Arc 内で共有される）
pub trait IdGenerator: Send + Sync {
    /// Project / Task 用の ID を生成
    fn generate_completable_id(&self) -> CompletableId;

    /// Tag 用の ID を生成
    fn generate_tag_id(&self) -> TagId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を使えば timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_completable_id(&self) -> CompletableId {
        CompletableId::from_ulid(self.next_ulid())
    }

    fn generate_tag_id(&self) -> TagId {
        TagId::from_ulid(self.next_ulid())
    }
}
