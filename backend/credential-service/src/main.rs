/// Credential Service Main Entry Point
///
/// Starts the HTTP API with:
/// - PostgreSQL connection pool
/// - Schema migrations (fatal on failure)
/// - Email service (SMTP, or disabled)
use anyhow::{anyhow, Context, Result};
use credential_service::{
    config::Settings,
    db::{self, PgSessionRepository, PgUserAccountStore},
    http::{self, AppState},
    migration::{MigrationRunner, PgMigrationTarget},
    security::PasswordGuard,
    services::{AuthService, EmailService, SessionStore, SmtpEmailTransport},
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23 requires selecting a CryptoProvider at runtime
    if let Err(err) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("Failed to install rustls crypto provider: {:?}", err);
        return Err(anyhow!("Unable to install TLS crypto provider: {:?}", err));
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "credential_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Credential Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db_pool = db::create_pool(&settings.database).await?;
    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    // Run database migrations before anything touches the schema
    let runner = MigrationRunner::new(
        Arc::new(PgMigrationTarget::new(db_pool.clone())),
        settings.migrations.path.clone(),
    );
    let report = runner
        .run()
        .await
        .context("Failed to run database migrations")?;
    info!(applied = report.applied.len(), "Database migrations completed");

    // Initialize email service
    let transport =
        SmtpEmailTransport::new(&settings.email).context("Failed to initialize email service")?;
    if transport.is_enabled() {
        info!("Email service initialized with SMTP");
    } else {
        info!("Email service disabled (SMTP not configured)");
    }
    let email_service = EmailService::new(Arc::new(transport), settings.email.app_url.clone());

    let passwords =
        PasswordGuard::new(&settings.password).context("Invalid password hashing settings")?;

    let sessions = SessionStore::new(
        Arc::new(PgSessionRepository::new(db_pool.clone())),
        settings.tokens.access_ttl_secs,
    );

    let auth = AuthService::new(
        Arc::new(PgUserAccountStore::new(db_pool.clone())),
        sessions,
        passwords,
        email_service,
        settings.tokens.clone(),
    );

    let router = http::build_router(AppState {
        auth: Arc::new(auth),
    });

    http::serve(
        router,
        &settings.server.host,
        settings.server.port,
        shutdown_signal(),
    )
    .await?;

    db_pool.close().await;
    info!("Credential service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
