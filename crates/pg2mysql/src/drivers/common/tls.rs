//! TLS settings for both dialects, driven by the `ssl_mode` config string.

use std::sync::Arc;

use mysql_async::SslOpts;
use rustls::ClientConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};

/// PostgreSQL `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    #[default]
    Disable,
    /// TLS without certificate verification.
    Require,
    /// Verify the server certificate against the webpki roots.
    VerifyCa,
    /// Verify certificate and hostname.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" | "" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(MigrateError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Build the rustls connector for tokio-postgres, or None for plain TCP.
    pub fn postgres_connector(&self) -> Result<Option<MakeRustlsConnect>> {
        if !self.requires_tls() {
            return Ok(None);
        }
        Ok(Some(MakeRustlsConnect::new(self.client_config()?)))
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let builder = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| MigrateError::Config(format!("TLS setup failed: {}", e)))?;

        let config = match self {
            SslMode::Disable => {
                return Err(MigrateError::Config(
                    "Cannot build TLS config for ssl_mode=disable".into(),
                ));
            }
            SslMode::Require => {
                warn!(
                    "ssl_mode=require enables TLS but does NOT verify the server certificate. \
                     Use ssl_mode=verify-full to protect against man-in-the-middle attacks."
                );
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth()
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                // rustls always checks the hostname, so verify-ca behaves like verify-full
                info!("ssl_mode={:?}: certificate verification enabled", self);
                builder
                    .with_root_certificates(root_store)
                    .with_no_client_auth()
            }
        };

        Ok(config)
    }
}

/// Map a MySQL `ssl_mode` string to mysql_async TLS options.
pub fn mysql_ssl_opts(ssl_mode: &str) -> Option<SslOpts> {
    match ssl_mode.to_lowercase().as_str() {
        "disable" | "" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            None
        }
        "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
        "verify-ca" | "verify_ca" => {
            Some(SslOpts::default().with_danger_skip_domain_validation(true))
        }
        "verify-full" | "verify_identity" => Some(SslOpts::default()),
        other => {
            warn!("Unknown ssl_mode '{}', defaulting to prefer", other);
            Some(SslOpts::default().with_danger_accept_invalid_certs(true))
        }
    }
}

/// Accepts any server certificate; only used for `ssl_mode=require`.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parsing() {
        assert_eq!(SslMode::parse("disable").unwrap(), SslMode::Disable);
        assert_eq!(SslMode::parse("REQUIRE").unwrap(), SslMode::Require);
        assert_eq!(SslMode::parse("verify-ca").unwrap(), SslMode::VerifyCa);
        assert_eq!(SslMode::parse("verify-full").unwrap(), SslMode::VerifyFull);
        assert_eq!(SslMode::parse("").unwrap(), SslMode::Disable);
        assert!(SslMode::parse("prefer").is_err());
    }

    #[test]
    fn test_disable_has_no_connector() {
        assert!(SslMode::Disable.postgres_connector().unwrap().is_none());
    }

    #[test]
    fn test_require_builds_connector() {
        assert!(SslMode::Require.postgres_connector().unwrap().is_some());
    }

    #[test]
    fn test_mysql_ssl_opts() {
        assert!(mysql_ssl_opts("disable").is_none());
        assert!(mysql_ssl_opts("prefer").is_some());
        assert!(mysql_ssl_opts("verify-full").is_some());
    }
}
