use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use planwise_core::domain::{
    Completable, CompletableField, CompletableId, CompletableUpdate, EntityKind, EntityRef, PersistenceError, User,
};
use planwise_core::impls::InMemoryPersistence;
use planwise_core::ports::{ParentRef, Persistence, Snapshot};
use planwise_core::{SaveStatus, StoreBuilder, StoreConfig};

/// 送信内容を JSON で表示してから InMemoryPersistence に渡す adapter
struct EchoPersistence {
    inner: InMemoryPersistence,
}

fn echo<T: Serialize>(call: &str, body: &T) {
    match serde_json::to_string(body) {
        Ok(json) => tracing::info!(body = %json, "-> {call}"),
        Err(e) => tracing::warn!(error = %e, "-> {call} <unprintable>"),
    }
}

#[async_trait]
impl Persistence for EchoPersistence {
    async fn load(&self) -> Result<Snapshot, PersistenceError> {
        tracing::info!("-> load");
        self.inner.load().await
    }

    async fn patch_entity(&self, kind: EntityKind, entity: &Completable) -> Result<bool, PersistenceError> {
        echo(&format!("PATCH /{kind}"), entity);
        self.inner.patch_entity(kind, entity).await
    }

    async fn create_subtask(&self, parent: &ParentRef, entity: &Completable) -> Result<(), PersistenceError> {
        echo(&format!("POST under {}", serde_json::to_string(parent).unwrap_or_default()), entity);
        self.inner.create_subtask(parent, entity).await
    }

    async fn delete_entity(
        &self,
        kind: EntityKind,
        id: &CompletableId,
    ) -> Result<Option<Completable>, PersistenceError> {
        tracing::info!("-> DELETE /{kind}/{id}");
        self.inner.delete_entity(kind, id).await
    }

    async fn patch_user(&self, user: &User) -> Result<bool, PersistenceError> {
        echo("PATCH /user", user);
        self.inner.patch_user(user).await
    }
}

/// サンプル用の初期データ：1 プロジェクト、2 タスク
fn seed() -> Snapshot {
    let mut user = User::new("demo-user".into());
    user.projects = vec!["inbox".into()];
    let mut inbox = Completable::new("inbox".into(), "Inbox");
    inbox.subtasks = vec!["groceries".into(), "taxes".into()];
    Snapshot {
        user,
        projects: vec![inbox],
        tasks: vec![
            Completable::new("groceries".into(), "Buy groceries"),
            Completable::new("taxes".into(), "File taxes"),
        ],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) 設定：環境変数が無ければデモ用に短い debounce
    let mut config = StoreConfig::from_env();
    if std::env::var_os("PLANWISE_DEBOUNCE_MS").is_none() {
        config.debounce_ms = 300;
    }
    let debounce = config.debounce();

    // (B) store を組み立ててロード
    let backend = Arc::new(EchoPersistence {
        inner: InMemoryPersistence::new(seed()),
    });
    let store = StoreBuilder::new().config(config).persistence(backend).build()?;
    store.status_board().listen("status-bar", |status: SaveStatus| {
        tracing::info!(?status, "status bar");
    });
    store.load().await?;

    // (C) UI 側の購読：タイトル表示
    let groceries = CompletableId::new("groceries");
    store.listeners().listen_property(
        EntityRef::task(groceries.clone()),
        CompletableField::Title,
        "title-label",
        |update| tracing::info!(?update, "title label"),
    );

    // (D) タイピングのバースト：4 回の編集が 1 回の PATCH にまとまる
    let mut title = String::from("Buy");
    for word in [" oat", " milk", " and", " bread"] {
        title.push_str(word);
        store.set_property(EntityKind::Task, &groceries, CompletableUpdate::Title(title.clone()))?;
        store.reset_timer();
        sleep(debounce / 4).await;
    }
    let task = store.add_task(EntityKind::Project, &"inbox".into(), "Call plumber")?;
    tracing::info!(task = %task.id, pending = ?store.pending_saves(), "created optimistically");

    // (E) idle window が過ぎるのを待つ
    sleep(debounce * 2).await;
    tracing::info!(dirty = store.is_dirty(), "after idle save");

    // (F) 完了 → 手動保存 → 削除
    store.toggle_completed(EntityKind::Task, &"taxes".into())?;
    let report = store.manual_save().await;
    tracing::info!(executed = ?report.executed, "manual save");

    store.delete(EntityKind::Task, &task.id)?;
    let report = store.shutdown().await;
    tracing::info!(executed = ?report.executed, "shutdown flushed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn echo_goes_through_the_log() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            echo("PATCH /user", &User::new("demo-user".into()));
        });

        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("INFO"));
        assert!(logged.contains("-> PATCH /user"));
        assert!(logged.contains("demo-user"));
    }
}
