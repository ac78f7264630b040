//! TLS client configuration for broker sessions
//!
//! Built once per run from [`TlsMaterial`] and shared by every session.

use std::sync::Arc;

use connbench_core::{TlsMaterial, TransportError};
use rumqttc::tokio_rustls::rustls;
use rumqttc::TlsConfiguration;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

/// Build the rumqttc TLS configuration for a set of TLS material
pub fn build_tls_configuration(material: &TlsMaterial) -> Result<TlsConfiguration, TransportError> {
    Ok(TlsConfiguration::Rustls(Arc::new(build_client_config(
        material,
    )?)))
}

/// Build a rustls client configuration
///
/// With `skip_verification` any broker certificate is accepted; otherwise the
/// CA bundle must contain at least one certificate.
pub fn build_client_config(material: &TlsMaterial) -> Result<ClientConfig, TransportError> {
    let builder = ClientConfig::builder();

    let builder = if material.skip_verification {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
    } else {
        let ca = material
            .ca
            .as_deref()
            .ok_or_else(|| TransportError::Tls("no CA certificate configured".into()))?;
        builder.with_root_certificates(root_store(ca)?)
    };

    match &material.client_auth {
        Some((cert, key)) => {
            let chain = parse_certificates(cert, "client certificate")?;
            let key = PrivateKeyDer::from_pem_slice(key)
                .map_err(|e| TransportError::Tls(format!("client key is invalid: {e}")))?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| TransportError::Tls(format!("client certificate rejected: {e}")))
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

fn root_store(ca: &[u8]) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(ca, "CA")? {
        roots
            .add(cert)
            .map_err(|e| TransportError::Tls(format!("CA is invalid: {e}")))?;
    }
    Ok(roots)
}

fn parse_certificates(
    pem: &[u8],
    what: &str,
) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Tls(format!("{what} is invalid: {e}")))?;
    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "{what} is invalid: no certificate found"
        )));
    }
    Ok(certs)
}

// Accepts any broker certificate; only reachable with skip_verification
#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer,
        _intermediates: &[CertificateDer],
        _server_name: &rustls::pki_types::ServerName,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
