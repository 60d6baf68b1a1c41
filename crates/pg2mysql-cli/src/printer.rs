//! Human-readable progress output for migrate and verify.

use std::io::{self, Write};

use pg2mysql::{MigrateError, MigrationWatcher, VerificationWatcher};

/// Writes one line per notification to stdout.
#[derive(Debug, Default)]
pub struct StdoutPrinter;

impl StdoutPrinter {
    fn print(&self, line: impl AsRef<str>) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", line.as_ref());
    }

    fn print_inline(&self, text: impl AsRef<str>) {
        let mut out = io::stdout().lock();
        let _ = write!(out, "{}", text.as_ref());
        let _ = out.flush();
    }
}

impl MigrationWatcher for StdoutPrinter {
    fn will_disable_constraints(&self) {
        self.print_inline("Disabling constraints...");
    }

    fn did_disable_constraints(&self) {
        self.print("OK");
    }

    fn will_enable_constraints(&self) {
        self.print_inline("Enabling constraints...");
    }

    fn enable_constraints_did_finish(&self) {
        self.print("OK");
    }

    fn enable_constraints_did_fail_with_error(&self, err: &MigrateError) {
        self.print(format!("FAILED: {}", err));
    }

    fn will_truncate_table(&self, table: &str) {
        self.print_inline(format!("Truncating {}...", table));
    }

    fn truncate_table_did_finish(&self, _table: &str) {
        self.print("OK");
    }

    fn table_migration_did_start(&self, table: &str) {
        self.print(format!("Migrating {}...", table));
    }

    fn table_migration_in_progress(&self, table: &str, rows_inserted: u64) {
        self.print(format!("  {}: {} rows inserted so far", table, rows_inserted));
    }

    fn table_migration_did_finish(&self, table: &str, rows_inserted: u64) {
        self.print(format!("  {}: done, {} rows inserted", table, rows_inserted));
    }
}

impl VerificationWatcher for StdoutPrinter {
    fn table_verification_did_start(&self, table: &str) {
        self.print_inline(format!("Verifying table {}...", table));
    }

    fn table_verification_did_finish(&self, _table: &str, missing_rows: u64, missing_ids: &[String]) {
        if missing_rows == 0 {
            self.print("OK");
            return;
        }
        self.print(format!("\n\tFAILED: {} rows missing", missing_rows));
        if !missing_ids.is_empty() {
            self.print(format!("\tMissing IDs: {}", missing_ids.join(",")));
        }
    }

    fn table_verification_did_finish_with_error(&self, _table: &str, err: &MigrateError) {
        self.print(format!("\n\tFAILED: {}", err));
    }
}
