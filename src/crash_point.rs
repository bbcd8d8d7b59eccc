//! Crash point injection for durability testing
//!
//! When `CIVICDB_CRASH_POINT` names a point, the process terminates there via
//! `std::process::abort()`: no cleanup, no unwinding, no catching. Used to
//! exercise roll-forward recovery of interrupted writes and migration runs.
//!
//! ```bash
//! CIVICDB_CRASH_POINT=publish_after_snapshot civicdb migrate run
//! ```

use std::sync::OnceLock;

/// Environment variable naming the active crash point.
pub const CRASH_POINT_ENV: &str = "CIVICDB_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// True if `CIVICDB_CRASH_POINT` equals `name`.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Aborts the process if the named crash point is enabled; otherwise a no-op.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Publication write sequence
    pub const PUBLISH_AFTER_INTENT: &str = "publish_after_intent";
    pub const PUBLISH_AFTER_SNAPSHOT: &str = "publish_after_snapshot";
    pub const PUBLISH_AFTER_RECORD: &str = "publish_after_record";

    // Migration runs
    pub const MIGRATION_AFTER_PROCEDURE: &str = "migration_after_procedure";
    pub const MIGRATION_AFTER_LOG: &str = "migration_after_log";
    pub const MIGRATION_BETWEEN_BATCHES: &str = "migration_between_batches";

    pub fn all() -> &'static [&'static str] {
        &[
            PUBLISH_AFTER_INTENT,
            PUBLISH_AFTER_SNAPSHOT,
            PUBLISH_AFTER_RECORD,
            MIGRATION_AFTER_PROCEDURE,
            MIGRATION_AFTER_LOG,
            MIGRATION_BETWEEN_BATCHES,
        ]
    }
}
