//! Server configuration.

use crate::error::{Error, Result};
use crate::signatures::{Fetcher, HttpFetcher, NoFetch, PdfVerifier, RevocationMode, TrustStore};
use crate::web::AppContext;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default upload size limit (32 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Everything needed to start the verification server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// Directory holding `robots.txt`, `sitemap.xml` and `/static/` files.
    pub static_dir: PathBuf,

    /// Trust anchor files or directories.
    pub trust_roots: Vec<PathBuf>,

    /// Fetch missing issuers and CRLs over HTTP.
    pub allow_fetching: bool,

    /// Revocation policy.
    pub revocation_mode: RevocationMode,

    /// Timeout for each network fetch.
    pub fetch_timeout: Duration,

    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            trust_roots: Vec::new(),
            allow_fetching: true,
            revocation_mode: RevocationMode::SoftFail,
            fetch_timeout: Duration::from_secs(10),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Set the bind address.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the static asset directory.
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Add a trust anchor file or directory.
    pub fn with_trust_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_roots.push(path.into());
        self
    }

    /// Enable or disable network fetching.
    pub fn with_allow_fetching(mut self, allow: bool) -> Self {
        self.allow_fetching = allow;
        self
    }

    /// Set the revocation policy.
    pub fn with_revocation_mode(mut self, mode: RevocationMode) -> Self {
        self.revocation_mode = mode;
        self
    }

    /// Set the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the upload size limit.
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// The socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| Error::Config(format!("invalid listen address: {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Load every configured trust root.
    pub fn load_trust_store(&self) -> Result<TrustStore> {
        let mut store = TrustStore::new();
        for path in &self.trust_roots {
            let count = store.load_path(path).map_err(|e| match e {
                Error::Config(_) => e,
                other => Error::Config(format!("trust root {}: {}", path.display(), other)),
            })?;
            if count == 0 {
                log::warn!("no certificates found in trust root {}", path.display());
            }
        }
        Ok(store)
    }

    /// Verifier wired to this configuration. Network fetches run on `handle`.
    pub fn build_verifier(&self, handle: Handle) -> Result<PdfVerifier> {
        let trust = Arc::new(self.load_trust_store()?);
        if trust.is_empty() {
            log::warn!("no trust roots configured; trust will be reported as unknown");
        } else {
            log::info!("loaded {} trust anchor(s)", trust.len());
        }
        let fetcher: Arc<dyn Fetcher> = if self.allow_fetching {
            Arc::new(HttpFetcher::new(handle, self.fetch_timeout))
        } else {
            Arc::new(NoFetch)
        };
        Ok(PdfVerifier::new(trust, fetcher)
            .with_allow_fetching(self.allow_fetching)
            .with_revocation_mode(self.revocation_mode))
    }

    /// Application context for the HTTP layer.
    pub fn app_context(&self, handle: Handle) -> Result<AppContext> {
        let verifier = self.build_verifier(handle)?;
        Ok(AppContext::new(Arc::new(verifier))
            .with_static_dir(self.static_dir.clone())
            .with_max_upload_bytes(self.max_upload_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.allow_fetching);
        assert_eq!(config.revocation_mode, RevocationMode::SoftFail);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .with_host("127.0.0.1")
            .with_port(9000)
            .with_allow_fetching(false)
            .with_trust_root("roots.pem");
        assert_eq!(config.socket_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.trust_roots, vec![PathBuf::from("roots.pem")]);
    }

    #[test]
    fn test_bad_host() {
        let config = ServerConfig::new().with_host("not an address");
        assert!(matches!(config.socket_addr(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unreadable_trust_root() {
        let config = ServerConfig::new().with_trust_root("/nonexistent/root.pem");
        let err = config.load_trust_store().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("/nonexistent/root.pem"));
    }

    #[test]
    fn test_trust_root_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new().with_trust_root(dir.path());
        assert!(config.load_trust_store().unwrap().is_empty());
    }
}
