//! StoreBuilder - store の構築とワイヤリング
//!
//! - persistence は必須、clock / id generator は省略可能（デフォルトあり）
//! - 起動時検証（Fail-fast 設計）: runtime が無ければ build() で失敗

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::StoreConfig;
use crate::ports::{Clock, IdGenerator, Persistence, SystemClock, UlidGenerator};
use crate::save::{SaveScheduler, SchedulerConfig};
use crate::store::Store;

/// StoreBuilder は 1 つの独立した store を組み立てる
///
/// # 使用例
/// ```ignore
/// let store = StoreBuilder::new()
///     .config(StoreConfig::from_env())
///     .persistence(Arc::new(MyRestAdapter::new(url)))
///     .build()?;
/// store.load().await?;
/// ```
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    persistence: Option<Arc<dyn Persistence>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    runtime: Option<Handle>,
}

/// BuildError は store 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no persistence adapter was configured")]
    MissingPersistence,

    #[error("no tokio runtime: build inside a runtime or pass a handle with .runtime()")]
    NoRuntime,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Runtime the idle timer is spawned on. Defaults to the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// # 検証
    /// - persistence 未設定なら `BuildError::MissingPersistence`
    /// - runtime 未設定かつ runtime 外なら `BuildError::NoRuntime`
    pub fn build(self) -> Result<Store, BuildError> {
        let persistence = self.persistence.ok_or(BuildError::MissingPersistence)?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let scheduler = SaveScheduler::new(SchedulerConfig::from(&self.config), runtime);
        tracing::debug!(
            debounce_ms = self.config.debounce_ms,
            coalesce = ?self.config.coalesce,
            "store built"
        );
        Ok(Store::from_parts(persistence, scheduler, ids, clock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryPersistence;
    use crate::domain::{EntityKind, User};
    use crate::ports::Snapshot;

    fn backend() -> Arc<InMemoryPersistence> {
        Arc::new(InMemoryPersistence::new(Snapshot::new(User::new("u".into()))))
    }

    #[test]
    fn test_build_missing_persistence() {
        let result = StoreBuilder::new().build();
        assert!(matches!(result, Err(BuildError::MissingPersistence)));
    }

    #[test]
    fn test_build_outside_runtime() {
        let result = StoreBuilder::new().persistence(backend()).build();
        assert!(matches!(result, Err(BuildError::NoRuntime)));
    }

    #[test]
    fn test_build_with_explicit_handle() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let store = StoreBuilder::new()
            .persistence(backend())
            .runtime(rt.handle().clone())
            .build();
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_stores_are_independent() {
        let a = StoreBuilder::new().persistence(backend()).build().unwrap();
        let b = StoreBuilder::new().persistence(backend()).build().unwrap();
        a.load().await.unwrap();
        b.load().await.unwrap();

        let project = a.add_project("only in a").unwrap();

        assert!(a.contains(EntityKind::Project, &project.id));
        assert!(!b.contains(EntityKind::Project, &project.id));
        assert!(b.pending_saves().is_empty());
    }
}
