#[cfg(feature = "tls")]
use std::path::Path;
#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use std::io::BufReader;
#[cfg(feature = "tls")]
use std::fs::File;

#[cfg(feature = "tls")]
use rustls::{ClientConfig, RootCertStore};
#[cfg(feature = "tls")]
use tokio_postgres_rustls::MakeRustlsConnect;

use std::str::FromStr;

use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

use crate::error::{ReconcileError, Result};

/// TLS mode for PostgreSQL connections, matching libpq's `sslmode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// No TLS encryption
    #[default]
    Disable,
    /// Try TLS first, fall back to unencrypted if it fails
    #[cfg(feature = "tls")]
    Prefer,
    /// Require TLS encryption without verifying the server certificate
    #[cfg(feature = "tls")]
    Require,
    /// Require TLS and verify server certificate against CA
    #[cfg(feature = "tls")]
    VerifyCa,
    /// Require TLS, verify CA, and verify server hostname matches certificate
    #[cfg(feature = "tls")]
    VerifyFull,
}

impl TlsMode {
    /// Whether every connection made in this mode is encrypted
    pub fn guarantees_encryption(&self) -> bool {
        !matches!(self, TlsMode::Disable) && !self.allows_plaintext_fallback()
    }

    fn allows_plaintext_fallback(&self) -> bool {
        #[cfg(feature = "tls")]
        if matches!(self, TlsMode::Prefer) {
            return true;
        }
        false
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsMode::Disable => "disable",
            #[cfg(feature = "tls")]
            TlsMode::Prefer => "prefer",
            #[cfg(feature = "tls")]
            TlsMode::Require => "require",
            #[cfg(feature = "tls")]
            TlsMode::VerifyCa => "verify-ca",
            #[cfg(feature = "tls")]
            TlsMode::VerifyFull => "verify-full",
        }
    }

    /// Weakest mode acceptable in production: encrypted, like libpq's `require`
    pub fn production_minimum() -> Result<Self> {
        #[cfg(feature = "tls")]
        return Ok(TlsMode::Require);
        #[cfg(not(feature = "tls"))]
        return Err(ReconcileError::Configuration(
            "production mode requires an encrypted connection, but pgreconcile was built \
             without TLS support. Rebuild with: cargo install pgreconcile --features tls"
                .to_string(),
        ));
    }
}

impl FromStr for TlsMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(TlsMode::Disable),
            #[cfg(feature = "tls")]
            "prefer" => Ok(TlsMode::Prefer),
            #[cfg(feature = "tls")]
            "require" => Ok(TlsMode::Require),
            #[cfg(feature = "tls")]
            "verify-ca" => Ok(TlsMode::VerifyCa),
            #[cfg(feature = "tls")]
            "verify-full" => Ok(TlsMode::VerifyFull),
            #[cfg(not(feature = "tls"))]
            mode @ ("prefer" | "require" | "verify-ca" | "verify-full") => {
                Err(ReconcileError::Configuration(format!(
                    "TLS mode '{}' requires pgreconcile to be built with TLS support. \
                    Rebuild with: cargo install pgreconcile --features tls",
                    mode
                )))
            }
            _ => Err(ReconcileError::Configuration(format!("Invalid sslmode: {}", s))),
        }
    }
}

/// TLS configuration for PostgreSQL connections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsConfig {
    pub mode: TlsMode,
    pub root_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

#[cfg(feature = "tls")]
fn load_certs(path: &Path) -> std::result::Result<Vec<rustls::pki_types::CertificateDer<'static>>, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader).collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(certs)
}

#[cfg(feature = "tls")]
fn load_private_key(path: &Path) -> std::result::Result<rustls::pki_types::PrivateKeyDer<'static>, Box<dyn std::error::Error>> {
    // Try PKCS8 first
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    if let Some(key) = rustls_pemfile::pkcs8_private_keys(&mut reader).next() {
        return key.map(Into::into).map_err(Into::into);
    }

    // Try RSA key
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    if let Some(key) = rustls_pemfile::rsa_private_keys(&mut reader).next() {
        return key.map(Into::into).map_err(Into::into);
    }

    Err("No private key found in file".into())
}

#[cfg(feature = "tls")]
fn build_rustls_config(tls_config: &TlsConfig) -> std::result::Result<ClientConfig, Box<dyn std::error::Error>> {
    let config = match tls_config.mode {
        TlsMode::Prefer | TlsMode::Require => {
            // Encryption only; the server certificate is not verified
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(DangerousAcceptAnyServerCert::new()))
                .with_no_client_auth()
        }
        TlsMode::VerifyCa | TlsMode::VerifyFull => {
            let mut root_store = RootCertStore::empty();

            if let Some(root_cert_path) = &tls_config.root_cert {
                for cert in load_certs(Path::new(root_cert_path))? {
                    root_store.add(cert)?;
                }
            } else {
                root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            }

            let config_builder = ClientConfig::builder().with_root_certificates(root_store);

            if let (Some(cert_path), Some(key_path)) = (&tls_config.client_cert, &tls_config.client_key) {
                let cert_chain = load_certs(Path::new(cert_path))?;
                let key = load_private_key(Path::new(key_path))?;
                config_builder.with_client_auth_cert(cert_chain, key)?
            } else {
                config_builder.with_no_client_auth()
            }
        }
        TlsMode::Disable => return Err("TLS disabled; no rustls config needed".into()),
    };

    Ok(config)
}

/// Drive the connection on its own task; it finishes when the client is dropped
fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>) -> JoinHandle<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Database connection error: {}", e);
        }
        debug!("Database connection task finished");
    })
}

/// Connector chosen once per run from the TLS configuration
#[derive(Clone)]
pub enum TlsConnector {
    NoTls,
    #[cfg(feature = "tls")]
    Rustls {
        connector: MakeRustlsConnect,
        /// "prefer" falls back to plaintext; every other mode insists on TLS
        plaintext_fallback: bool,
    },
}

/// Build the connector; certificate problems are configuration errors, not retried
pub fn create_tls_connector(tls_config: &TlsConfig) -> Result<TlsConnector> {
    match tls_config.mode {
        TlsMode::Disable => Ok(TlsConnector::NoTls),
        #[cfg(feature = "tls")]
        mode => {
            let config = build_rustls_config(tls_config).map_err(|e| {
                ReconcileError::Configuration(format!("Failed to build TLS configuration: {}", e))
            })?;
            Ok(TlsConnector::Rustls {
                connector: MakeRustlsConnect::new(config),
                plaintext_fallback: mode == TlsMode::Prefer,
            })
        }
    }
}

impl TlsConnector {
    /// Open one session and spawn its connection task
    pub async fn connect(
        &self,
        connection_string: &str,
    ) -> std::result::Result<(Client, JoinHandle<()>), tokio_postgres::Error> {
        match self {
            TlsConnector::NoTls => {
                let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;
                Ok((client, spawn_connection(connection)))
            }
            #[cfg(feature = "tls")]
            TlsConnector::Rustls { connector, plaintext_fallback } => {
                match tokio_postgres::connect(connection_string, connector.clone()).await {
                    Ok((client, connection)) => Ok((client, spawn_connection(connection))),
                    Err(e) if *plaintext_fallback => {
                        debug!("TLS connection failed ({}), falling back to plaintext", e);
                        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;
                        Ok((client, spawn_connection(connection)))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}

#[cfg(feature = "tls")]
#[derive(Debug)]
struct DangerousAcceptAnyServerCert {
    crypto_provider: Arc<rustls::crypto::CryptoProvider>,
}

#[cfg(feature = "tls")]
impl DangerousAcceptAnyServerCert {
    fn new() -> Self {
        Self {
            crypto_provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }
}

#[cfg(feature = "tls")]
impl rustls::client::danger::ServerCertVerifier for DangerousAcceptAnyServerCert {
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
        self.crypto_provider.signature_verification_algorithms.supported_schemes()
    }
}
