// tests/unit_server_tracker_test.rs

//! Filesystem↔database reconcile and the tombstone invariant.

use async_trait::async_trait;
use mc_admin::core::db;
use mc_admin::core::errors::McAdminError;
use mc_admin::core::events::{EventDispatcher, EventHandler, ServerCreated, ServerRemoved};
use mc_admin::core::instance::DockerMcManager;
use mc_admin::core::server_tracker::{self, ServerTracker};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const YAML: &str = r#"
services:
  mc:
    image: itzg/minecraft-server
    container_name: mc-survival
    environment:
      MEMORY: 2G
    ports:
      - "25565:25565"
      - "25575:25575"
"#;

struct Recorder {
    created: Arc<Mutex<Vec<String>>>,
    removed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventHandler<ServerCreated> for Recorder {
    fn name(&self) -> &'static str {
        "test.created"
    }
    async fn handle(&self, event: ServerCreated) -> Result<(), McAdminError> {
        self.created.lock().unwrap().push(event.server_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler<ServerRemoved> for Recorder {
    fn name(&self) -> &'static str {
        "test.removed"
    }
    async fn handle(&self, event: ServerRemoved) -> Result<(), McAdminError> {
        self.removed.lock().unwrap().push(event.server_id);
        Ok(())
    }
}

struct Fixture {
    root: TempDir,
    pool: SqlitePool,
    docker: Arc<DockerMcManager>,
    tracker: ServerTracker,
    created: Arc<Mutex<Vec<String>>>,
    removed: Arc<Mutex<Vec<String>>>,
}

async fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let dispatcher = Arc::new(EventDispatcher::new());
    let docker = Arc::new(DockerMcManager::new(root.path()));

    let created = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::new(Recorder {
        created: created.clone(),
        removed: removed.clone(),
    });
    dispatcher.on_server_created(recorder.clone());
    dispatcher.on_server_removed(recorder);

    let tracker = ServerTracker::new(pool.clone(), docker.clone(), dispatcher);
    Fixture {
        root,
        pool,
        docker,
        tracker,
        created,
        removed,
    }
}

#[tokio::test]
async fn new_instance_gets_active_row_and_event() {
    let f = fixture().await;
    f.docker.get_instance("survival").create(YAML).await.unwrap();

    f.tracker.sync_once().await.unwrap();

    let active = server_tracker::get_active_servers_map(&f.pool).await.unwrap();
    assert!(active.contains_key("survival"));
    assert_eq!(*f.created.lock().unwrap(), vec!["survival".to_string()]);

    // A second sync changes nothing.
    f.tracker.sync_once().await.unwrap();
    assert_eq!(f.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn vanished_instance_is_tombstoned_not_deleted() {
    let f = fixture().await;
    f.docker.get_instance("survival").create(YAML).await.unwrap();
    f.tracker.sync_once().await.unwrap();
    let db_id = server_tracker::get_server_db_id(&f.pool, "survival")
        .await
        .unwrap()
        .unwrap();

    tokio::fs::remove_dir_all(f.root.path().join("survival"))
        .await
        .unwrap();
    f.tracker.sync_once().await.unwrap();

    assert!(
        server_tracker::get_active_servers_map(&f.pool)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(*f.removed.lock().unwrap(), vec!["survival".to_string()]);

    // The row survives as a tombstone so history keeps resolving.
    let (status,): (String,) = sqlx::query_as("SELECT status FROM servers WHERE id = ?")
        .bind(db_id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(status, "REMOVED");
    assert_eq!(
        server_tracker::get_server_db_id(&f.pool, "survival")
            .await
            .unwrap(),
        Some(db_id)
    );
}

#[tokio::test]
async fn recreation_yields_one_active_row_per_server_id() {
    let f = fixture().await;
    let instance = f.docker.get_instance("survival");
    instance.create(YAML).await.unwrap();
    f.tracker.sync_once().await.unwrap();

    tokio::fs::remove_dir_all(f.root.path().join("survival"))
        .await
        .unwrap();
    f.tracker.sync_once().await.unwrap();

    f.docker.get_instance("survival").create(YAML).await.unwrap();
    f.tracker.sync_once().await.unwrap();

    let (active_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM servers WHERE server_id = 'survival' AND status = 'ACTIVE'",
    )
    .fetch_one(&f.pool)
    .await
    .unwrap();
    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM servers WHERE server_id = 'survival'")
            .fetch_one(&f.pool)
            .await
            .unwrap();
    assert_eq!(active_count, 1);
    assert_eq!(total, 2);

    // Lookups resolve to the ACTIVE row, not the tombstone.
    let resolved = server_tracker::get_server_db_id(&f.pool, "survival")
        .await
        .unwrap()
        .unwrap();
    let active = server_tracker::get_active_servers_map(&f.pool).await.unwrap();
    assert_eq!(active.get("survival"), Some(&resolved));
}

#[tokio::test]
async fn directories_without_compose_are_ignored() {
    let f = fixture().await;
    tokio::fs::create_dir(f.root.path().join("not-a-server"))
        .await
        .unwrap();

    f.tracker.sync_once().await.unwrap();
    assert!(
        server_tracker::get_active_servers_map(&f.pool)
            .await
            .unwrap()
            .is_empty()
    );
}
