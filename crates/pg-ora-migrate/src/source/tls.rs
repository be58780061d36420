//! TLS for the PostgreSQL source connection, following libpq `sslmode`.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use serde::{Deserialize, Serialize};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};

/// Accepted `source.ssl_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP.
    #[default]
    Disable,
    /// Encrypted, any certificate accepted.
    Require,
    /// Encrypted, chain checked against the bundled roots, host name ignored.
    VerifyCa,
    /// Encrypted, chain and host name checked.
    VerifyFull,
}

/// Connector for `mode`, or `None` when TLS is off.
pub(crate) fn connector(mode: SslMode) -> Result<Option<MakeRustlsConnect>> {
    if mode == SslMode::Disable {
        return Ok(None);
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let webpki = WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| MigrateError::Config(format!("TLS setup for ssl_mode {:?}: {}", mode, e)))?;

    let config = match mode {
        SslMode::VerifyFull => {
            info!("Source TLS verifies certificate chain and host name");
            ClientConfig::builder()
                .with_webpki_verifier(webpki)
                .with_no_client_auth()
        }
        _ => {
            if mode == SslMode::Require {
                warn!("ssl_mode=require does not verify the server certificate");
            } else {
                info!("Source TLS verifies the certificate chain only");
            }
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(LibpqVerifier { mode, webpki }))
                .with_no_client_auth()
        }
    };

    Ok(Some(MakeRustlsConnect::new(config)))
}

/// Certificate check for the modes webpki does not cover on its own.
/// Handshake signatures are always checked by webpki.
#[derive(Debug)]
struct LibpqVerifier {
    mode: SslMode,
    webpki: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for LibpqVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.mode == SslMode::Require {
            return Ok(ServerCertVerified::assertion());
        }
        let outcome = self.webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        );
        relax_for_mode(self.mode, outcome)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}

/// `verify-ca` forgives a host name mismatch and nothing else.
fn relax_for_mode(
    mode: SslMode,
    outcome: std::result::Result<ServerCertVerified, rustls::Error>,
) -> std::result::Result<ServerCertVerified, rustls::Error> {
    match outcome {
        Err(rustls::Error::InvalidCertificate(
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. },
        )) if mode == SslMode::VerifyCa => Ok(ServerCertVerified::assertion()),
        other => other,
    }
}
