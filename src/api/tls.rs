use std::{fs, io::BufReader, path::PathBuf, sync::Arc};

use better_default::Default;
use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::CertificateDer,
    ClientConfig, RootCertStore, ALL_VERSIONS,
};
use webpki_roots::TLS_SERVER_ROOTS;

use crate::errors::AuError;

#[derive(Clone)]
pub struct TLSConfig {
    pub(crate) client_config: ClientConfig,
}

#[derive(Default)]
pub struct TLSConfigBuilder {
    pub server_ca_pem: Option<Vec<u8>>,
    pub insecure: bool,
}

impl TLSConfigBuilder {
    pub fn new() -> Self {
        TLSConfigBuilder::default()
    }

    pub fn with_server_ca_path(mut self, server_ca_path: &PathBuf) -> Result<Self, AuError> {
        let cert_data = fs::read(server_ca_path)?;
        self.server_ca_pem = Some(cert_data);
        Ok(self)
    }

    pub fn with_server_ca_pem(mut self, server_ca_pem: Option<Vec<u8>>) -> Self {
        self.server_ca_pem = server_ca_pem;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn build(self) -> Result<TLSConfig, AuError> {
        let provider = default_provider();

        let builder = ClientConfig::builder_with_provider(provider).with_protocol_versions(ALL_VERSIONS)?;

        let builder = if self.insecure {
            log::warn!("TLS certificate verification disabled");
            builder.dangerous().with_custom_certificate_verifier(Arc::new(DisabledVerifier))
        } else if let Some(server_ca) = &self.server_ca_pem {
            let mut cert_reader = BufReader::new(&server_ca[..]);
            let root_certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

            let mut root_store = RootCertStore::empty();
            let (added, ignored) = root_store.add_parsable_certificates(root_certs);
            log::debug!("Added {} and ignored {} root certs", added, ignored);
            builder.with_root_certificates(root_store)
        } else {
            let root_store = RootCertStore { roots: TLS_SERVER_ROOTS.to_vec() };
            builder.with_root_certificates(root_store)
        };

        Ok(TLSConfig { client_config: builder.with_no_client_auth() })
    }
}

fn default_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or(Arc::new(rustls::crypto::ring::default_provider()))
}

/// Accepts any server certificate. Only installed when TLS verification is explicitly skipped.
#[derive(Debug)]
pub struct DisabledVerifier;

impl ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        default_provider().signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_tls_config() {
        assert!(TLSConfigBuilder::new().build().is_ok());
        assert!(TLSConfigBuilder::new().with_insecure(true).build().is_ok());

        // a PEM bundle without certificates yields an empty root store, not an error
        let tls = TLSConfigBuilder::new().with_server_ca_pem(Some(b"not a pem".to_vec())).build();
        assert!(tls.is_ok());
    }

    #[test]
    fn test_missing_ca_file() {
        let ret = TLSConfigBuilder::new().with_server_ca_path(&PathBuf::from("/nonexistent/ca.pem"));
        assert!(matches!(ret, Err(AuError::IO { .. })));
    }
}
