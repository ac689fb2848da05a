//! Sketchrelay collaboration backend.
//!
//! A single long-lived process that keeps per-room drawing documents live
//! in memory, fans changes out to connected WebSocket clients, persists
//! debounced snapshots to flat-file storage, hosts uploaded assets, and
//! resolves link previews.
//!
//! # Architecture
//!
//! - [`RoomEngine`]: the core. Owns every live [`Room`], serializes
//!   per-room state, and drives the flush/idle/maintenance timers.
//! - [`store`]: durable key→blob storage with two keyspaces (room
//!   snapshots, assets); filesystem-backed in production, in-memory for
//!   tests.
//! - [`gateway`]: WebSocket termination on `/connect/{roomId}`.
//! - [`api`]: REST surface for uploads, unfurling, and telemetry.
//! - [`sweeper`]: retention-based garbage collection.
//!
//! The collaboration wire protocol is the Yjs sync protocol via the yrs
//! crate; the engine relays and snapshots it without interpreting
//! document content.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod store;
pub mod sweeper;
pub mod unfurl;

use std::{net::SocketAddr, sync::Arc, time::Instant};

pub use api::AppState;
pub use config::ServerConfig;
pub use engine::{Room, RoomEngine, RoomStats};
pub use error::{EngineError, ServerError};
pub use store::{FsStore, MemoryStore, SnapshotStore, StoreError};
pub use unfurl::{UnfurlResolver, UnfurlResult};

/// Production server: engine + router bound to a TCP listener.
pub struct Server {
    config: Arc<ServerConfig>,
    engine: Arc<RoomEngine<FsStore>>,
    listener: tokio::net::TcpListener,
    router: axum::Router,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let store = FsStore::new(&config.rooms_dir, &config.assets_dir);
        let engine = Arc::new(RoomEngine::new(store.clone(), Arc::clone(&config)));

        let state = AppState {
            engine: Arc::clone(&engine),
            store,
            config: Arc::clone(&config),
            unfurler: Arc::new(UnfurlResolver::new()),
            started_at: Instant::now(),
        };
        let router = api::router(state);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

        Ok(Self { config, engine, listener, router })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until SIGINT/SIGTERM, then close every room with a terminal
    /// flush attempt before returning.
    pub async fn run(self) -> Result<(), ServerError> {
        if self.config.sweep_enabled {
            sweeper::spawn(Arc::clone(&self.engine), Arc::clone(&self.config));
        } else {
            tracing::info!("retention sweeper disabled by configuration");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("listener drained, closing rooms");
        self.engine.shutdown().await;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
