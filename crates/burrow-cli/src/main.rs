mod app;
mod ask_cmd;
mod config;
mod project_cmds;
mod serve_cmd;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use burrow_core::session::InvokeRequest;
use burrow_core::workspace::ProjectWorkspaces;
use burrow_db::pool;

use app::{App, Stores};
use config::{BurrowConfig, CliOverrides};

#[derive(Parser)]
#[command(name = "burrow", about = "Streaming orchestrator for per-project agent sessions")]
struct Cli {
    /// Database URL (overrides BURROW_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Root directory for project sandboxes (overrides BURROW_PROJECTS_DIR)
    #[arg(long, global = true)]
    projects_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a burrow config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/burrow")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the burrow database
    DbInit,
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Keep projects and conversations in memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,
    },
    /// Run one agent turn and print the response
    Ask {
        /// Project to run in
        #[arg(long)]
        project: Uuid,
        /// Continue an existing conversation instead of starting one
        #[arg(long)]
        conversation: Option<Uuid>,
        /// Compute cluster to mention in the system prompt
        #[arg(long)]
        cluster: Option<String>,
        /// Print raw server-sent-event frames instead of rendered text
        #[arg(long)]
        raw: bool,
        /// The user message
        message: String,
    },
    /// Print the tool allow-list the agent is started with
    Tools,
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a project and its sandbox directory
    Create {
        name: String,
        /// Owner email (defaults to the configured local user)
        #[arg(long)]
        owner: Option<String>,
    },
    /// List projects owned by a user
    List {
        /// Owner email (defaults to the configured local user)
        #[arg(long)]
        owner: Option<String>,
    },
}

/// Execute `burrow init`: write a config file.
fn cmd_init(db_url: &str, projects_dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let projects_dir = projects_dir.unwrap_or_else(config::default_projects_dir);
    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: Some(db_url.to_string()),
        },
        agent: config::AgentSection {
            projects_dir: Some(projects_dir.clone()),
            ..config::AgentSection::default()
        },
        ..config::ConfigFile::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url       = {db_url}");
    println!("  agent.projects_dir = {}", projects_dir.display());
    println!();
    println!("Next: run `burrow db-init` to create and migrate the database.");

    Ok(())
}

/// Execute `burrow db-init`: create the database and run migrations.
async fn cmd_db_init(resolved: &BurrowConfig) -> anyhow::Result<()> {
    println!("Initializing burrow database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("burrow db-init complete.");
    Ok(())
}

async fn cmd_serve(resolved: &BurrowConfig, in_memory: bool) -> anyhow::Result<()> {
    let stores = if in_memory {
        tracing::warn!("using in-memory storage; conversations are lost on exit");
        Stores::memory()
    } else {
        Stores::postgres(resolved).await?
    };
    let app = App::build(resolved, stores).await?;
    serve_cmd::run_serve(app, &resolved.local_user, &resolved.bind, resolved.port).await
}

async fn cmd_ask(resolved: &BurrowConfig, request: InvokeRequest, raw: bool) -> anyhow::Result<()> {
    let stores = Stores::postgres(resolved).await?;
    let app = App::build(resolved, stores).await?;
    let result = ask_cmd::run_ask(&app.orchestrator, request, raw).await;
    app.backup.shutdown().await?;
    result
}

async fn cmd_tools(resolved: &BurrowConfig) -> anyhow::Result<()> {
    let tools = app::tool_catalog(resolved);
    for tool in tools.allowed_tools().await {
        println!("{tool}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let resolve = |bind: Option<String>, port: Option<u16>| {
        BurrowConfig::resolve(&CliOverrides {
            database_url: cli.database_url.clone(),
            projects_dir: cli.projects_dir.clone(),
            bind,
            port,
        })
        .context("failed to resolve configuration")
    };

    match cli.command {
        Commands::Init { db_url, force } => cmd_init(&db_url, cli.projects_dir.clone(), force)?,
        Commands::DbInit => cmd_db_init(&resolve(None, None)?).await?,
        Commands::Serve {
            bind,
            port,
            in_memory,
        } => cmd_serve(&resolve(bind, port)?, in_memory).await?,
        Commands::Ask {
            project,
            conversation,
            cluster,
            raw,
            message,
        } => {
            let request = InvokeRequest {
                conversation_id: conversation,
                cluster_id: cluster,
                ..InvokeRequest::new(project, message)
            };
            cmd_ask(&resolve(None, None)?, request, raw).await?
        }
        Commands::Tools => cmd_tools(&resolve(None, None)?).await?,
        Commands::Project { command } => {
            let resolved = resolve(None, None)?;
            let stores = Stores::postgres(&resolved).await?;
            let workspaces = ProjectWorkspaces::new(&resolved.projects_dir);
            match command {
                ProjectCommands::Create { name, owner } => {
                    let owner = owner.unwrap_or_else(|| resolved.local_user.clone());
                    project_cmds::cmd_project_create(&stores, &workspaces, &name, &owner).await?
                }
                ProjectCommands::List { owner } => {
                    let owner = owner.unwrap_or_else(|| resolved.local_user.clone());
                    project_cmds::cmd_project_list(&stores, &owner).await?
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
