//! HTTP front door: upload form, verification endpoint and static assets.
//!
//! [`handle`] is generic over the request body, so routes can be exercised
//! with an in-memory body and no running server. [`serve`] runs the hyper
//! accept loop around it.

mod render;
mod routes;
mod server;
mod upload;

pub use render::{escape_html, ResultView};
pub use routes::handle;
pub use server::serve;
pub use upload::{RequestError, Upload};

use crate::signatures::DocumentVerifier;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared, immutable state for request handlers.
#[derive(Clone)]
pub struct AppContext {
    /// Verifier invoked once per uploaded document
    pub verifier: Arc<dyn DocumentVerifier>,
    /// Directory holding static assets
    pub static_dir: PathBuf,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl AppContext {
    /// Context with the default static directory and upload limit.
    pub fn new(verifier: Arc<dyn DocumentVerifier>) -> Self {
        Self {
            verifier,
            static_dir: PathBuf::from("static"),
            max_upload_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Serve static files from `dir`.
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    /// Limit request bodies to `limit` bytes.
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("static_dir", &self.static_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}
