//! Watcher that ignores every notification.

use super::{MigrationWatcher, VerificationWatcher};

/// Silent watcher for library callers that only need the returned results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWatcher;

impl MigrationWatcher for NoopWatcher {}

impl VerificationWatcher for NoopWatcher {}
