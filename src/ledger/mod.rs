//! Version Ledger
//!
//! Gapless per-subject version sequencing, immutable snapshots, and the
//! write-intent journal behind crash recovery.

mod journal;
#[allow(clippy::module_inception)]
mod ledger;

pub use journal::{Journal, WriteIntent};
pub use ledger::{RecoveryReport, VersionLedger};
