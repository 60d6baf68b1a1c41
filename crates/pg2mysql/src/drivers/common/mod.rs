//! Utilities shared by the dialect adapters.

pub mod tls;

pub use tls::{mysql_ssl_opts, SslMode};
