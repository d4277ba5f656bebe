//! Server configuration
//!
//! [`ServeArgs`](crate::cli::ServeArgs) are parsed by clap (flags or
//! `CLUSTERDECK_*` environment variables); this module checks them and loads
//! the files they point at.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::ServeArgs;
use crate::cluster::certs::{validate_certificate_pem, validate_private_key_pem, CertError};
use crate::cluster::DomainConfig;
use crate::server::{AuthToken, RouterOptions};

/// Errors for invalid or unreadable server configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("an auth token is required (--auth-token or CLUSTERDECK_AUTH_TOKEN)")]
    MissingAuthToken,

    #[error("invalid listen address {0:?}: {1}")]
    InvalidListenAddress(String, String),

    #[error("--request-timeout-secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("--tls-cert-file and --tls-key-file must be given together")]
    PartialTlsPair,

    #[error("failed to expand path {0:?}: {1}")]
    PathExpansion(String, String),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS material: {0}")]
    InvalidTls(#[from] CertError),
}

/// Fully checked settings for `clusterdeck serve`
#[derive(Debug)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    pub auth_token: AuthToken,
    pub default_cluster: String,
    /// Used for clusters onboarded without a domain of their own
    pub default_domain: DomainConfig,
    pub router: RouterOptions,
    pub termination_grace_period: Duration,
    pub simulate: bool,
}

/// Paths of the default TLS pair, after `~` and `$VAR` expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

// ============================================================================
// SBIO: pure validation, no I/O
// ============================================================================

pub fn parse_listen_address(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidListenAddress(value.to_string(), e.to_string())
        })
}

fn expand(path: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| ConfigError::PathExpansion(path.to_string(), e.to_string()))
}

/// Resolve the TLS file flags; neither given yields `None`
pub fn tls_paths(cert: Option<&str>, key: Option<&str>) -> Result<Option<TlsPaths>, ConfigError> {
    let cert = cert.map(str::trim).filter(|c| !c.is_empty());
    let key = key.map(str::trim).filter(|k| !k.is_empty());
    match (cert, key) {
        (None, None) => Ok(None),
        (Some(cert), Some(key)) => Ok(Some(TlsPaths {
            certificate: expand(cert)?,
            private_key: expand(key)?,
        })),
        _ => Err(ConfigError::PartialTlsPair),
    }
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

fn read(path: &PathBuf) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::ReadFile {
        path: path.clone(),
        source,
    })
}

/// Read and check the default TLS pair
pub fn load_tls_pair(paths: &TlsPaths) -> Result<(Vec<u8>, Vec<u8>), ConfigError> {
    let certificate = read(&paths.certificate)?;
    let private_key = read(&paths.private_key)?;
    validate_certificate_pem("tls certificate", &certificate)?;
    validate_private_key_pem("tls private key", &private_key)?;
    Ok((certificate, private_key))
}

/// Check `args` and load the files they reference
pub fn load_server_config(args: &ServeArgs) -> Result<ServerConfig, ConfigError> {
    let auth_token = args
        .auth_token
        .as_deref()
        .and_then(AuthToken::new)
        .ok_or(ConfigError::MissingAuthToken)?;
    let listen_address = parse_listen_address(&args.listen_address)?;
    if args.request_timeout_secs == 0 {
        return Err(ConfigError::ZeroRequestTimeout);
    }

    let (certificate, private_key) =
        match tls_paths(args.tls_cert_file.as_deref(), args.tls_key_file.as_deref())? {
            Some(paths) => load_tls_pair(&paths)?,
            None => (Vec::new(), Vec::new()),
        };

    Ok(ServerConfig {
        listen_address,
        auth_token,
        default_cluster: args.default_cluster.clone(),
        default_domain: DomainConfig::platform_default(&args.platform, certificate, private_key),
        router: RouterOptions {
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            cors_allowed_origins: args.cors_allowed_origins.clone(),
        },
        termination_grace_period: Duration::from_secs(args.termination_grace_period_secs),
        simulate: args.simulate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::cli::{Cli, Commands};

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let mut argv = vec!["clusterdeck", "serve"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Serve(args) => args,
            _ => panic!("Expected Serve command"),
        }
    }

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = load_server_config(&serve_args(&["--auth-token", "s3cret"])).unwrap();
        assert_eq!(config.listen_address.port(), 8080);
        assert_eq!(config.default_cluster, "default");
        assert_eq!(config.default_domain.domain, "services.clappform.com");
        assert_eq!(config.router.request_timeout, Duration::from_secs(120));
        assert_eq!(config.termination_grace_period, Duration::from_secs(5));
        assert!(config.auth_token.verify("s3cret"));
        assert!(!config.simulate);
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let result = load_server_config(&serve_args(&[]));
        assert!(matches!(result, Err(ConfigError::MissingAuthToken)));

        let result = load_server_config(&serve_args(&["--auth-token", ""]));
        assert!(matches!(result, Err(ConfigError::MissingAuthToken)));
    }

    #[test]
    fn test_bad_listen_address() {
        let result = load_server_config(&serve_args(&[
            "--auth-token",
            "t",
            "--listen-address",
            "nowhere",
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidListenAddress(_, _))));
    }

    #[test]
    fn test_partial_tls_pair() {
        assert!(matches!(
            tls_paths(Some("/etc/tls.crt"), None),
            Err(ConfigError::PartialTlsPair)
        ));
        assert_eq!(tls_paths(None, Some("  ")).unwrap(), None);
    }

    #[test]
    fn test_loads_tls_pair() {
        let certified =
            rcgen::generate_simple_self_signed(vec!["*.services.acme.com".to_string()]).unwrap();
        let cert = create_temp_file(&certified.cert.pem());
        let key = create_temp_file(&certified.key_pair.serialize_pem());

        let config = load_server_config(&serve_args(&[
            "--auth-token",
            "t",
            "--platform",
            "acme",
            "--tls-cert-file",
            cert.path().to_str().unwrap(),
            "--tls-key-file",
            key.path().to_str().unwrap(),
        ]))
        .unwrap();
        assert_eq!(config.default_domain.domain, "services.acme.com");
        assert!(!config.default_domain.certificate.is_empty());
    }

    #[test]
    fn test_unreadable_tls_file() {
        let paths = TlsPaths {
            certificate: PathBuf::from("/nonexistent/tls.crt"),
            private_key: PathBuf::from("/nonexistent/tls.key"),
        };
        assert!(matches!(
            load_tls_pair(&paths),
            Err(ConfigError::ReadFile { .. })
        ));
    }

    #[test]
    fn test_garbage_certificate_rejected() {
        let cert = create_temp_file("not a certificate");
        let key = create_temp_file("not a key");
        let paths = TlsPaths {
            certificate: cert.path().to_path_buf(),
            private_key: key.path().to_path_buf(),
        };
        assert!(matches!(load_tls_pair(&paths), Err(ConfigError::InvalidTls(_))));
    }
}
