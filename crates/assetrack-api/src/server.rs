//! Main server implementation for the Assetrack API

use crate::{
    api,
    auth::{
        firebase, AuditSink, AuthError, Authenticator, FirebaseVerifier, IdentityProvider,
        LocalJwtVerifier, LocalTokenIssuer,
    },
    config::Config,
    error::{ApiError, Result},
    storage::{
        AuditStore, InMemoryAuditStore, InMemoryPrincipalStore, PgAuditStore, PgPrincipalStore,
        PrincipalStore,
    },
};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Main server structure
pub struct Server {
    config: Arc<Config>,
    app: Router,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Principal persistence
    pub principals: Arc<dyn PrincipalStore>,

    /// Authentication pipeline
    pub authenticator: Arc<Authenticator>,

    /// Token minting for password sign-in; absent without a local secret
    pub issuer: Option<LocalTokenIssuer>,
}

impl AppState {
    /// Wire the auth pipeline from configuration and the given collaborators
    pub fn new(
        config: Arc<Config>,
        principals: Arc<dyn PrincipalStore>,
        audit: Arc<dyn AuditStore>,
        identity_provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let auth = &config.auth;
        let local = LocalJwtVerifier::new(
            auth.local_jwt_secret.as_deref(),
            auth.clock_skew(),
            principals.clone(),
        );
        let remote = match identity_provider {
            Some(provider) => FirebaseVerifier::new(provider, auth.firebase.verify_timeout()),
            None => FirebaseVerifier::unavailable(auth.firebase.verify_timeout()),
        };

        if !local.is_configured() {
            warn!("No local JWT secret configured; local tokens and password sign-in are disabled");
        }
        if !remote.is_configured() {
            warn!("No identity provider available; remote identity tokens will be refused");
        }

        let authenticator = Authenticator::new(
            auth.classifier_settings(),
            remote,
            Arc::new(local),
            principals.clone(),
            AuditSink::new(audit),
        );

        Self::from_parts(config, principals, Arc::new(authenticator))
    }

    /// Assemble state around an already built authenticator
    pub fn from_parts(
        config: Arc<Config>,
        principals: Arc<dyn PrincipalStore>,
        authenticator: Arc<Authenticator>,
    ) -> Self {
        let issuer = LocalTokenIssuer::new(
            config.auth.local_jwt_secret.as_deref(),
            config.auth.local_token_ttl(),
        );
        Self {
            config,
            principals,
            authenticator,
            issuer,
        }
    }

    pub fn development_mode(&self) -> bool {
        self.config.auth.development_mode
    }

    /// Turn an auth failure raised inside a handler into an [`ApiError`],
    /// rendered exactly like a rejection from the auth middleware
    pub fn reject(&self, error: AuthError) -> ApiError {
        ApiError::Auth(error.with_details(self.development_mode()))
    }
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing Assetrack API server");

        let config = Arc::new(config);

        let (principals, audit): (Arc<dyn PrincipalStore>, Arc<dyn AuditStore>) =
            match &config.database.url {
                Some(url) => {
                    info!("Connecting to PostgreSQL");
                    let pool = PgPoolOptions::new()
                        .max_connections(config.database.max_connections)
                        .connect(url)
                        .await?;

                    if config.database.run_migrations {
                        info!("Running database migrations");
                        sqlx::migrate!("./migrations").run(&pool).await?;
                    }

                    (
                        Arc::new(PgPrincipalStore::new(pool.clone())),
                        Arc::new(PgAuditStore::new(pool)),
                    )
                }
                None => {
                    warn!("No database URL configured; using in-memory stores");
                    (
                        Arc::new(InMemoryPrincipalStore::new()),
                        Arc::new(InMemoryAuditStore::new()),
                    )
                }
            };

        let auth = &config.auth;
        let identity_provider: Option<Arc<dyn IdentityProvider>> =
            match auth.firebase.settings(auth.clock_skew()) {
                Some(settings) => match firebase::init(settings) {
                    Ok(client) => Some(client as Arc<dyn IdentityProvider>),
                    Err(e) => {
                        error!("Firebase client unavailable: {}", e);
                        None
                    }
                },
                None => {
                    info!("No Firebase project configured");
                    None
                }
            };

        if auth.development_mode {
            warn!("Development mode is enabled; demo tokens and error details are exposed");
        }

        let state = AppState::new(config.clone(), principals, audit, identity_provider);
        let app = api::router(state);

        Ok(Self { config, app })
    }

    /// Run the server until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::Internal {
                message: format!("Failed to bind to address {addr}: {e}"),
            })?;

        info!("Assetrack API listening on {}", addr);

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("Server error: {e}"),
        })?;

        Ok(())
    }
}

/// Shutdown signal handler
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
            Ok(mut stream) => {
                stream.recv().await;
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
            warn!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down");
        },
    }
}
