//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! Store はここにある trait にだけ依存し、REST や時刻、ID 生成の実装を知りません。

pub mod clock;
pub mod id_generator;
pub mod persistence;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::persistence::{ParentRef, Persistence, Snapshot};
