//! Certificate capture over a raw TLS handshake.
//!
//! The verifier accepts any chain; expired and untrusted leaf certificates
//! are still captured and their expiry reported.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::DateTime;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::CertificateInfo;
use crate::error::{ErrorKind, ProbeError};

/// Accepts any certificate but still checks handshake signatures
#[derive(Debug)]
struct CaptureVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for CaptureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

pub struct TlsProbe {
    connector: TlsConnector,
}

impl TlsProbe {
    pub fn new() -> Result<Self, rustls::Error> {
        let provider = Arc::new(ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CaptureVerifier { provider }))
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)) })
    }

    /// Handshake with `host:port` and read the leaf certificate's expiry
    pub async fn certificate(&self, host: &str, port: u16, timeout: Duration) -> Result<CertificateInfo, ProbeError> {
        let start = Instant::now();
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ProbeError::new(ErrorKind::Other, format!("invalid server name {host}: {e}")))?;

        let handshake = async {
            let tcp = TcpStream::connect((host, port)).await.map_err(|e| ProbeError::classify(&e))?;
            let stream = self
                .connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| ProbeError::new(ErrorKind::TlsFailure, e.to_string()))?;

            let (_, session) = stream.get_ref();
            let leaf = session
                .peer_certificates()
                .and_then(|chain| chain.first())
                .ok_or_else(|| ProbeError::new(ErrorKind::TlsFailure, "server presented no certificate"))?;

            let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
                .map_err(|e| ProbeError::new(ErrorKind::TlsFailure, format!("unparseable certificate: {e}")))?;

            let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
                .ok_or_else(|| ProbeError::new(ErrorKind::TlsFailure, "certificate expiry out of range"))?;

            Ok::<_, ProbeError>(CertificateInfo {
                not_after,
                subject: cert.subject().to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            })
        };

        tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| ProbeError::timeout(format!("TLS handshake with {host}:{port} exceeded {}ms", timeout.as_millis())))?
    }
}
