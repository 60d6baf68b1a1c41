//! Progress notifications emitted by the engines.
//!
//! Every method has a no-op default so callers only implement what they
//! display. [`NoopWatcher`] implements both traits.

mod noop;

pub use noop::NoopWatcher;

use crate::error::MigrateError;

/// Notifications emitted while migrating.
pub trait MigrationWatcher: Send + Sync {
    fn will_disable_constraints(&self) {}

    fn did_disable_constraints(&self) {}

    fn will_enable_constraints(&self) {}

    fn enable_constraints_did_finish(&self) {}

    fn enable_constraints_did_fail_with_error(&self, _err: &MigrateError) {}

    fn will_truncate_table(&self, _table: &str) {}

    fn truncate_table_did_finish(&self, _table: &str) {}

    fn table_migration_did_start(&self, _table: &str) {}

    /// Called every `progress_interval` inserted rows.
    fn table_migration_in_progress(&self, _table: &str, _rows_inserted: u64) {}

    fn table_migration_did_finish(&self, _table: &str, _rows_inserted: u64) {}
}

/// Notifications emitted while verifying.
pub trait VerificationWatcher: Send + Sync {
    fn table_verification_did_start(&self, _table: &str) {}

    /// `missing_ids` is empty when the table has no identity column.
    fn table_verification_did_finish(&self, _table: &str, _missing_rows: u64, _missing_ids: &[String]) {
    }

    fn table_verification_did_finish_with_error(&self, _table: &str, _err: &MigrateError) {}
}
