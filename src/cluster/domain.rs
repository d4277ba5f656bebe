//! Ingress domain and TLS material for a cluster

use std::fmt;

use super::certs::{validate_certificate_pem, validate_private_key_pem, CertError};

/// Public domain and wildcard TLS pair used for a cluster's ingresses
#[derive(Clone, PartialEq, Eq)]
pub struct DomainConfig {
    pub domain: String,
    /// PEM-encoded certificate chain
    pub certificate: Vec<u8>,
    /// PEM-encoded private key
    pub private_key: Vec<u8>,
}

impl fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainConfig")
            .field("domain", &self.domain)
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Errors building a domain configuration from onboarding input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("domain, certificate and privateKey must be provided together")]
    Partial,

    #[error(transparent)]
    Cert(#[from] CertError),
}

impl DomainConfig {
    /// Process-wide fallback: `services.<platform>.com` with the server's own TLS pair
    pub fn platform_default(platform: &str, certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            domain: format!("services.{}.com", platform),
            certificate,
            private_key,
        }
    }

    /// Build from the optional onboarding fields.
    ///
    /// All three absent yields `None`; a partial set is an error.
    pub fn from_parts(
        domain: Option<&str>,
        certificate: Option<&[u8]>,
        private_key: Option<&[u8]>,
    ) -> Result<Option<Self>, DomainError> {
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());
        let certificate = certificate.filter(|c| !c.is_empty());
        let private_key = private_key.filter(|k| !k.is_empty());

        match (domain, certificate, private_key) {
            (None, None, None) => Ok(None),
            (Some(domain), Some(certificate), Some(private_key)) => {
                validate_certificate_pem("certificate", certificate)?;
                validate_private_key_pem("privateKey", private_key)?;
                Ok(Some(Self {
                    domain: domain.to_string(),
                    certificate: certificate.to_vec(),
                    private_key: private_key.to_vec(),
                }))
            }
            _ => Err(DomainError::Partial),
        }
    }
}
