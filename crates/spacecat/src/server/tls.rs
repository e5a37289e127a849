//! TLS setup for the Gemini listener.
//!
//! Gemini clients identify themselves with self-signed certificates, so the
//! server asks for a client certificate on every handshake, never requires
//! one, and accepts whatever is presented without chain validation. Handshake
//! signatures are still verified. Whether a certificate is *authorized* is a
//! decision for handlers (see `require_cert_fingerprint`).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, ServerConfig, ServerConnection, SignatureScheme};

use super::request::ClientCertificate;

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate chain and private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificate found in PEM data");
    }

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .context("failed to read TLS private key")?
        .context("no private key found in PEM data")?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(AcceptAnyClientCert {
        algorithms: provider.signature_verification_algorithms,
    });

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("failed to select TLS protocol versions")?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .context("failed to build rustls ServerConfig")?;

    Ok(Arc::new(config))
}

/// Read the PEM files at `cert_path` and `key_path` and build the server config.
///
/// # Errors
///
/// Returns an error if either file cannot be read or parsed.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("failed to read TLS certificate {}", cert_path.display()))?;
    let key_pem = std::fs::read(key_path)
        .with_context(|| format!("failed to read TLS private key {}", key_path.display()))?;
    build_server_config(&cert_pem, &key_pem)
}

/// The end-entity certificate the client presented, if any.
pub fn peer_certificate(conn: &ServerConnection) -> Option<ClientCertificate> {
    conn.peer_certificates()
        .and_then(|chain| chain.first())
        .map(|der| ClientCertificate::from_der(der.clone().into_owned()))
}

/// Offers client auth, never requires it, trusts any certificate.
#[derive(Debug)]
struct AcceptAnyClientCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tokio_rustls::{TlsAcceptor, TlsConnector};

    #[test]
    fn rejects_empty_cert_pem() {
        let result = build_server_config(b"", b"");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_garbage_pem() {
        let result = build_server_config(b"not a pem", b"also not a pem");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_key() {
        assert!(build_server_config(SERVER_CERT, b"").is_err());
    }

    #[test]
    fn builds_from_fixture_identity() {
        assert!(build_server_config(SERVER_CERT, SERVER_KEY).is_ok());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_server_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/cert.pem"));
    }

    #[test]
    fn client_auth_is_offered_but_optional() {
        let provider = rustls::crypto::ring::default_provider();
        let verifier = AcceptAnyClientCert {
            algorithms: provider.signature_verification_algorithms,
        };
        assert!(verifier.offer_client_auth());
        assert!(!verifier.client_auth_mandatory());
        assert!(verifier.root_hint_subjects().is_empty());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    async fn handshake(with_cert: bool) -> Option<ClientCertificate> {
        let acceptor = TlsAcceptor::from(build_server_config(SERVER_CERT, SERVER_KEY).unwrap());
        let connector = TlsConnector::from(client_config(with_cert));
        let (client, server) = tokio::io::duplex(16 * 1024);

        let client = tokio::spawn(async move { connector.connect(server_name(), client).await });
        let tls = acceptor.accept(server).await.unwrap();
        let _client = client.await.unwrap().unwrap();
        peer_certificate(tls.get_ref().1)
    }

    #[tokio::test]
    async fn self_signed_client_cert_is_accepted() {
        let cert = handshake(true).await.unwrap();
        assert!(cert.matches_fingerprint(CLIENT_FINGERPRINT));
    }

    #[tokio::test]
    async fn anonymous_client_is_accepted() {
        assert!(handshake(false).await.is_none());
    }
}
