//! PEM checks for onboarding material

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use x509_parser::prelude::{FromDer, X509Certificate};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertError {
    #[error("{0} is empty")]
    Empty(&'static str),

    #[error("{0} contains no PEM blocks: {1}")]
    NotPem(&'static str, String),

    #[error("{0} contains no CERTIFICATE block")]
    NoCertificate(&'static str),

    #[error("{0} contains an unparseable certificate: {1}")]
    InvalidCertificate(&'static str, String),
}

/// Normalise a CA bundle supplied either as PEM text or as base64 of PEM text.
///
/// Returns the PEM bytes once at least one certificate block parses as X.509.
pub fn normalize_ca_pem(input: &str) -> Result<Vec<u8>, CertError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CertError::Empty("caPEM"));
    }

    let pem_bytes = if trimmed.starts_with("-----BEGIN") {
        trimmed.as_bytes().to_vec()
    } else {
        let compact: String = trimmed.split_ascii_whitespace().collect();
        match STANDARD.decode(&compact) {
            Ok(decoded) => trim_bytes(&decoded).to_vec(),
            Err(_) => trimmed.as_bytes().to_vec(),
        }
    };

    validate_certificate_pem("caPEM", &pem_bytes)?;
    Ok(pem_bytes)
}

/// Check that `bytes` hold at least one parseable X.509 certificate
pub fn validate_certificate_pem(field: &'static str, bytes: &[u8]) -> Result<(), CertError> {
    let blocks =
        pem::parse_many(bytes).map_err(|e| CertError::NotPem(field, e.to_string()))?;
    if blocks.is_empty() {
        return Err(CertError::NotPem(field, "no blocks found".to_string()));
    }

    // One parseable certificate is enough; bundles may carry unrelated blocks
    let mut last_error = None;
    for block in blocks.iter().filter(|b| b.tag() == "CERTIFICATE") {
        match X509Certificate::from_der(block.contents()) {
            Ok(_) => return Ok(()),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    match last_error {
        Some(e) => Err(CertError::InvalidCertificate(field, e)),
        None => Err(CertError::NoCertificate(field)),
    }
}

/// Check that `bytes` hold a PEM block; the key type is left to the ingress controller
pub fn validate_private_key_pem(field: &'static str, bytes: &[u8]) -> Result<(), CertError> {
    let block = pem::parse(bytes).map_err(|e| CertError::NotPem(field, e.to_string()))?;
    if block.contents().is_empty() {
        return Err(CertError::Empty(field));
    }
    Ok(())
}

fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
