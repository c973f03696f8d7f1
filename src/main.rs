//! Typeidea - admin back office of the typeidea blog

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use typeidea::{
    api::{self, AppState},
    config::Config,
    db,
};

/// How often expired sessions are purged
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path of the YAML configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the HTTP server (default)
    Serve,
    /// Applies pending database migrations
    Migrate,
    /// Creates a superuser account
    Createsuperuser {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "typeidea=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_with_env(&cli.config)?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            let applied = db::migrations::run_migrations(&pool).await?;
            tracing::info!("Applied {} migrations", applied);
            Ok(())
        }
        Commands::Createsuperuser {
            username,
            email,
            password,
        } => {
            db::migrations::run_migrations(&pool).await?;
            let state = AppState::new(pool, config)?;
            let user = state
                .user_service
                .create_superuser(&username, &email, &password)
                .await?;
            println!("Superuser {} created", user.username);
            Ok(())
        }
        Commands::Serve => serve(pool, config).await,
    }
}

async fn serve(pool: db::DynDatabasePool, config: Config) -> Result<()> {
    let pending = db::migrations::pending_count(&pool).await?;
    if pending > 0 {
        db::migrations::run_migrations(&pool).await?;
        tracing::info!("Applied {} pending migrations", pending);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(pool, config)?;

    // Purge expired sessions hourly
    {
        let user_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Removed {} expired sessions", count),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    for site in state.sites.iter() {
        tracing::info!("Admin site {} ({}) at {}/", site.name, site.site_header, site.prefix);
    }

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
