//! Shared runtime state for fxd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself. The notification hub and file store are injected
//! here at boot — no module-global registries, no post-construction wiring.

use sqlx::PgPool;

use fxd_artifacts::FileStore;
use fxd_notify::NotificationHub;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub hub: NotificationHub,
    pub files: FileStore,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(pool: PgPool, hub: NotificationHub, files: FileStore) -> Self {
        Self {
            pool,
            hub,
            files,
            build: BuildInfo {
                service: "fxd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
