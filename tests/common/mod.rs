use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use tempfile::TempDir;

use filegate::catalog;
use filegate::config::AppConfig;
use filegate::db;
use filegate::dispatch;
use filegate::events::{
    Actor, ByteSource, InboundEvent, InboundFileKind, InboundFileRef, InMemorySource, Reply,
};
use filegate::state::AppState;
use filegate::storage::FileStore;

pub const ADMIN_ID: i64 = 42;
#[allow(dead_code)]
pub const USER_ID: i64 = 1001;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
});

/// Each test gets its own scratch directory holding the catalog database
/// and the content store, so tests never share state.
pub struct TestApp {
    pub state: AppState,
    pub storage_dir: PathBuf,
    _tmp: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_store(None).await
    }

    pub async fn with_store(store: Option<Arc<dyn FileStore>>) -> Result<Self> {
        Lazy::force(&TRACING);

        let tmp = tempfile::tempdir()?;
        let storage_dir = tmp.path().join("content");
        let database_url = tmp.path().join("catalog.db").to_string_lossy().into_owned();
        let config = AppConfig {
            admin_id: ADMIN_ID,
            database_url,
            database_max_pool_size: 1,
            storage_dir: storage_dir.clone(),
        };

        let state = match store {
            None => filegate::state::init(config).await?,
            Some(store) => {
                let pool = db::init_pool_with_size(&config.database_url, 1)?;
                let mut conn = pool.get()?;
                db::run_migrations(&mut conn)?;
                catalog::seed_admin(&mut conn, config.admin_id)?;
                drop(conn);
                AppState::new(pool, config, store)
            }
        };

        Ok(Self {
            state,
            storage_dir,
            _tmp: tmp,
        })
    }

    pub async fn dispatch(&self, event: InboundEvent) -> Option<Reply> {
        dispatch::handle_event(&self.state, event).await
    }

    /// Registers an actor the way first contact does.
    #[allow(dead_code)]
    pub async fn start_as(&self, actor_id: i64) -> Option<Reply> {
        self.dispatch(command("start", &[], actor_id)).await
    }

    /// Admin-side shortcut: attach a document and keep the original name,
    /// returning the generated file id.
    #[allow(dead_code)]
    pub async fn upload(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let add = InboundEvent::TextCommand {
            name: "add".to_string(),
            args: Vec::new(),
            actor: actor(ADMIN_ID),
            attachment: Some(attachment(InboundFileKind::Document, Some(name), bytes)),
        };
        let reply = self.dispatch(add).await;
        let text = reply_text(&reply);
        anyhow::ensure!(text.contains(name), "unexpected add reply: {text}");

        let reply = self.dispatch(button("keep_original", ADMIN_ID)).await;
        extract_file_id(reply_text(&reply))
    }

    #[allow(dead_code)]
    pub async fn approve(&self, user_id: i64) -> Option<Reply> {
        self.dispatch(command("approve", &[&user_id.to_string()], ADMIN_ID))
            .await
    }

    /// Number of entries in the content directory.
    #[allow(dead_code)]
    pub fn stored_entries(&self) -> usize {
        std::fs::read_dir(&self.storage_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn actor(id: i64) -> Actor {
    Actor {
        id,
        display_name: Some(format!("user-{id}")),
        handle: Some(format!("handle{id}")),
    }
}

pub fn command(name: &str, args: &[&str], actor_id: i64) -> InboundEvent {
    InboundEvent::TextCommand {
        name: name.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
        actor: actor(actor_id),
        attachment: None,
    }
}

#[allow(dead_code)]
pub fn button(action: &str, actor_id: i64) -> InboundEvent {
    InboundEvent::ButtonClick {
        action: action.to_string(),
        actor: actor(actor_id),
    }
}

#[allow(dead_code)]
pub fn free_text(text: &str, actor_id: i64) -> InboundEvent {
    InboundEvent::FreeText {
        text: text.to_string(),
        actor: actor(actor_id),
    }
}

pub fn attachment(kind: InboundFileKind, name: Option<&str>, bytes: &[u8]) -> InboundFileRef {
    InboundFileRef {
        kind,
        suggested_name: name.map(str::to_string),
        source: Arc::new(InMemorySource(bytes.to_vec())),
    }
}

pub fn reply_text(reply: &Option<Reply>) -> &str {
    match reply {
        Some(Reply::Text(text)) => text,
        other => panic!("expected text reply, got {other:?}"),
    }
}

/// Pulls the generated `file_<suffix>` token out of an upload confirmation.
pub fn extract_file_id(text: &str) -> Result<String> {
    text.split_whitespace()
        .find(|token| token.starts_with("file_"))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no file id in reply: {text}"))
}

/// Store whose writes always fail, for exercising the rollback path.
#[allow(dead_code)]
pub struct FailingStore;

#[async_trait]
impl FileStore for FailingStore {
    async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<u64> {
        Err(anyhow!("simulated disk failure"))
    }

    async fn get(&self, _key: &str) -> Result<Vec<u8>> {
        Err(anyhow!("simulated disk failure"))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(anyhow!("simulated disk failure"))
    }

    async fn exists(&self, _key: &str) -> bool {
        false
    }
}

/// Byte source that fails on fetch, as a transport download would.
#[allow(dead_code)]
pub struct FailingSource;

#[async_trait]
impl ByteSource for FailingSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        Err(anyhow!("transport download failed"))
    }
}
