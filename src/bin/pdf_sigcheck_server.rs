//! PDF signature verification server
//!
//! Serves an upload form and validates the signatures of uploaded PDFs.
//!
//! Usage:
//!   cargo run --release --bin pdf_sigcheck_server
//!   cargo run --release --bin pdf_sigcheck_server -- --port 9000 --trust-root roots/ --no-fetch

use clap::{ArgAction, Parser};
use pdf_sigcheck::config::{ServerConfig, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PORT};
use pdf_sigcheck::signatures::RevocationMode;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "pdf-sigcheck-server", version, about = "Validate PDF signatures over HTTP")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Trust anchor file or directory (PEM or DER); repeatable
    #[arg(
        long = "trust-root",
        value_name = "PATH",
        env = "SIGCHECK_TRUST_ROOTS",
        value_delimiter = ',',
        action = ArgAction::Append
    )]
    trust_roots: Vec<PathBuf>,

    /// Fetch missing issuer certificates and CRLs over HTTP
    #[arg(long, env = "SIGCHECK_ALLOW_FETCHING", default_value_t = true, action = ArgAction::Set)]
    allow_fetching: bool,

    /// Shorthand for --allow-fetching false
    #[arg(long, action = ArgAction::SetTrue)]
    no_fetch: bool,

    /// Fail trust when revocation status cannot be obtained
    #[arg(long, action = ArgAction::SetTrue)]
    hard_fail: bool,

    /// Directory holding robots.txt, sitemap.xml and /static/ assets
    #[arg(long, env = "SIGCHECK_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Timeout for each certificate or CRL fetch, in seconds
    #[arg(long, env = "SIGCHECK_FETCH_TIMEOUT", default_value_t = 10)]
    fetch_timeout: u64,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "SIGCHECK_MAX_UPLOAD", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload: usize,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let revocation_mode = if self.hard_fail {
            RevocationMode::HardFail
        } else {
            RevocationMode::SoftFail
        };
        let mut config = ServerConfig::new()
            .with_host(self.host)
            .with_port(self.port)
            .with_static_dir(self.static_dir)
            .with_allow_fetching(self.allow_fetching && !self.no_fetch)
            .with_revocation_mode(revocation_mode)
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout))
            .with_max_upload_bytes(self.max_upload);
        for root in self.trust_roots {
            config = config.with_trust_root(root);
        }
        config
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config();
    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        },
    };
    let ctx = match config.app_context(tokio::runtime::Handle::current()) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        },
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("cannot bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        },
    };
    log::info!(
        "listening on http://{} (fetching {})",
        addr,
        if config.allow_fetching { "enabled" } else { "disabled" }
    );

    pdf_sigcheck::web::serve(listener, ctx, shutdown_signal()).await;
    ExitCode::SUCCESS
}
