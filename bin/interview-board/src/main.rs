//! # Interview-Board Binary
//!
//! The entry point that assembles the application from the compiled-in plugins.

use std::path::PathBuf;
use std::sync::Arc;

use ib_api::{router, AppState};
use ib_config::{LogSettings, Settings};
use ib_services::{PostService, WordListFilter};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// Feature-gated imports: each port is served by whichever plugin was compiled in
#[cfg(feature = "db-sqlite")]
use ib_db_sqlite::SqlitePostRepo;

#[cfg(feature = "storage-local")]
use ib_storage_local::LocalMediaStore;

#[cfg(feature = "auth-simple")]
use ib_auth_simple::{Argon2PinHasher, JwtTokenVerifier};

#[cfg(feature = "mail-smtp")]
use ib_mail_smtp::{SmtpNotifier, SmtpOptions};

#[cfg(not(all(
    feature = "db-sqlite",
    feature = "storage-local",
    feature = "auth-simple",
    feature = "mail-smtp"
)))]
compile_error!("interview-board needs a plugin for every port: enable db-sqlite, storage-local, auth-simple and mail-smtp");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Settings { server, database, storage, auth, mail, log } = Settings::load()?;
    init_tracing(&log);

    // 1. Persistence
    let repo = Arc::new(
        SqlitePostRepo::connect(&database.url, database.max_connections).await?,
    );

    // 2. File storage
    let media = Arc::new(LocalMediaStore::new(
        PathBuf::from(&storage.root),
        storage.url_prefix.clone(),
    ));

    // 3. PINs and bearer tokens
    let hasher = Arc::new(Argon2PinHasher::new()?);
    let tokens = Arc::new(JwtTokenVerifier::new(&auth.jwt_secret));

    // 4. Owner notifications
    let notifier = Arc::new(SmtpNotifier::new(SmtpOptions {
        host: mail.host,
        port: mail.port,
        username: mail.username,
        password: mail.password,
        from: mail.from,
    })?);

    let posts = PostService::new(
        repo.clone(),
        repo,
        media,
        hasher,
        Arc::new(WordListFilter::default()),
        notifier,
    );

    let state = AppState {
        posts: Arc::new(posts),
        tokens,
        max_upload_bytes: storage.max_upload_bytes,
    };

    let app = router(state).nest_service(
        &storage.url_prefix,
        ServeDir::new(&storage.root),
    );

    let address = server.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!(%address, version = env!("CARGO_PKG_VERSION"), "interview-board listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("interview-board stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
