//! Multipart upload intake.

use bytes::Bytes;
use http::{header, Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use std::convert::Infallible;

/// Name of the file field in the upload form.
pub const FILE_FIELD: &str = "pdf";

/// A submitted file.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name (never empty)
    pub filename: String,
    /// File content
    pub data: Bytes,
}

/// Why a request carried no usable upload.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No file field, or a file field without a name
    #[error("No PDF uploaded.")]
    NoFile,

    /// Body larger than the configured limit
    #[error("Upload exceeds the {limit} byte limit.")]
    TooLarge {
        /// Limit in bytes
        limit: usize,
    },

    /// Body could not be read or is not valid multipart data
    #[error("Malformed upload: {0}")]
    Malformed(String),
}

impl RequestError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::NoFile | RequestError::Malformed(_) => StatusCode::BAD_REQUEST,
            RequestError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

/// Read the `pdf` file field from a multipart request.
pub async fn read_upload<B>(req: Request<B>, limit: usize) -> Result<Upload, RequestError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let boundary = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| multer::parse_boundary(value).ok())
        .ok_or(RequestError::NoFile)?;

    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(RequestError::TooLarge { limit });
    }

    let body = Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                RequestError::TooLarge { limit }
            } else {
                RequestError::Malformed(e.to_string())
            }
        })?
        .to_bytes();

    let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| RequestError::Malformed(e.to_string()))?;
        let Some(field) = field else {
            return Err(RequestError::NoFile);
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(RequestError::NoFile),
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| RequestError::Malformed(e.to_string()))?;
        return Ok(Upload { filename, data });
    }
}
