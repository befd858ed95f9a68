//! PostgreSQL fixtures for burrow's integration tests.
//!
//! Each [`TestDb`] is a freshly created database with the burrow schema
//! applied, living on a server shared by the whole test binary. The server
//! is the one named by `BURROW_TEST_PG_URL` (a root URL, no database name)
//! or, when that is unset, a container started on first use.
//!
//! Databases are created and migrated through `burrow_db::pool`, the same
//! path `burrow db-init` takes.

use std::time::Duration;

use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use burrow_db::config::DbConfig;
use burrow_db::models::{Conversation, Project};
use burrow_db::pool;
use burrow_db::queries::{conversations, projects};

/// Owner of projects created by [`TestDb::seed_project`].
pub const TEST_OWNER: &str = "test@burrow.dev";

const PG_URL_ENV: &str = "BURROW_TEST_PG_URL";
const PG_IMAGE_TAG: &str = "18";

/// Containers can take a while to accept connections on a loaded host.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

struct PgServer {
    root_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<PgServer> = OnceCell::const_new();

impl PgServer {
    async fn start() -> Self {
        if let Ok(url) = std::env::var(PG_URL_ENV) {
            return Self {
                root_url: url.trim_end_matches('/').to_string(),
                _container: None,
            };
        }

        let container = Postgres::default()
            .with_tag(PG_IMAGE_TAG)
            .start()
            .await
            .expect("failed to start PostgreSQL container");
        let host = container.get_host().await.expect("container host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("container port");

        Self {
            root_url: format!("postgresql://postgres:postgres@{host}:{port}"),
            _container: Some(container),
        }
    }
}

fn config_for(url: String, max_connections: u32) -> DbConfig {
    DbConfig {
        max_connections,
        acquire_timeout: ACQUIRE_TIMEOUT,
        ..DbConfig::new(url)
    }
}

/// A migrated, uniquely named database. Call [`TestDb::destroy`] at the end
/// of the test; a panicking test leaks its database until the server goes.
pub struct TestDb {
    pub pool: PgPool,
    config: DbConfig,
}

impl TestDb {
    pub async fn create() -> Self {
        let server = SERVER.get_or_init(PgServer::start).await;
        let name = format!("burrow_test_{}", Uuid::new_v4().simple());
        let config = config_for(format!("{}/{name}", server.root_url), 5);

        pool::ensure_database_exists(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e:#}"));
        let pool = pool::create_pool(&config)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {name}: {e:#}"));
        pool::run_migrations(&pool)
            .await
            .expect("migrations should succeed");

        Self { pool, config }
    }

    pub fn name(&self) -> &str {
        self.config.database_name().unwrap_or_default()
    }

    /// Insert a project owned by [`TEST_OWNER`].
    pub async fn seed_project(&self, name: &str) -> Project {
        self.seed_project_for(name, TEST_OWNER).await
    }

    pub async fn seed_project_for(&self, name: &str, owner: &str) -> Project {
        projects::insert_project(&self.pool, name, owner)
            .await
            .expect("seed project insert should succeed")
    }

    /// Insert a fresh project with one conversation in it.
    pub async fn seed_conversation(&self, title: &str) -> (Project, Conversation) {
        let project = self.seed_project("seeded").await;
        let conversation = conversations::insert_conversation(&self.pool, project.id, title)
            .await
            .expect("seed conversation insert should succeed");
        (project, conversation)
    }

    /// Close every pool connection and drop the database.
    pub async fn destroy(self) {
        self.pool.close().await;

        let maintenance = config_for(self.config.maintenance_url(), 1);
        let admin = pool::create_pool(&maintenance)
            .await
            .expect("failed to connect to maintenance database");
        let stmt = format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", self.name());
        if let Err(e) = admin.execute(stmt.as_str()).await {
            eprintln!("failed to drop {}: {e}", self.name());
        }
        admin.close().await;
    }
}
