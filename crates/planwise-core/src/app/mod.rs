//! App - アプリケーション層
//!
//! ports を組み合わせて store を組み立てます。
//!
//! # 主要コンポーネント
//! - **StoreBuilder**: persistence / clock / id generator / runtime のワイヤリング

pub mod builder;

pub use self::builder::{BuildError, StoreBuilder};
