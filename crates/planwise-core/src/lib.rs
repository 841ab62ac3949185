//! planwise-core
//!
//! Client-side entity store for a hierarchical task planner.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, completable, user, filters, errors）
//! - **ports**: 抽象化レイヤー（Persistence, Clock, IdGenerator）
//! - **listeners**: whole-entity / per-property listener tables と Subscription
//! - **save**: debounce + key coalescing の SaveScheduler と保存ステータス
//! - **store**: Store 本体（読み取り、mutator、load / shutdown）
//! - **app**: StoreBuilder
//! - **impls**: 実装（InMemoryPersistence など開発用）
//! - **config**: StoreConfig（debounce window, coalescing policy, timeout）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod listeners;
pub mod ports;
pub mod save;
pub mod store;

pub use app::{BuildError, StoreBuilder};
pub use config::StoreConfig;
pub use domain::{
    Completable, CompletableField, CompletableId, CompletableUpdate, EntityKind, EntityRef, Filters,
    PersistenceError, SaveError, StoreError, TagId, TagInfo, User, UserField, UserId, UserUpdate,
};
pub use listeners::{ListenerId, ListenerRegistry, Subscription};
pub use ports::{Clock, IdGenerator, ParentRef, Persistence, Snapshot};
pub use save::{BatchReport, CoalescePolicy, SaveKey, SaveScheduler, SaveStatus};
pub use store::Store;
