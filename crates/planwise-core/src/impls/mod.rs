//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryPersistence**: サーバ側の状態をメモリに持つ persistence
//!
//! # 本番用実装
//! REST adapter はアプリケーション側で `Persistence` を実装して渡します。

pub mod inmem_persistence;

pub use self::inmem_persistence::{InMemoryPersistence, PersistenceCall};
