//! Request routing.

use super::render::{self, ResultView};
use super::upload::read_upload;
use super::AppContext;
use crate::error::ErrorKind;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Body;
use std::path::Path;
use std::sync::Arc;

const HTML: &str = "text/html; charset=utf-8";

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn html(status: StatusCode, page: String) -> Response<Full<Bytes>> {
    response(status, HTML, page)
}

fn not_found() -> Response<Full<Bytes>> {
    html(StatusCode::NOT_FOUND, render::not_found_page())
}

fn method_not_allowed(allow: &'static str) -> Response<Full<Bytes>> {
    let mut response = html(StatusCode::METHOD_NOT_ALLOWED, render::method_not_allowed_page());
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|ext| ext.to_str()) {
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "application/javascript; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("html") => HTML,
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// A single path segment of plain characters; no traversal, no hidden files.
fn is_safe_asset_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
}

async fn static_file(ctx: &AppContext, name: &str) -> Response<Full<Bytes>> {
    if !is_safe_asset_name(name) {
        return not_found();
    }
    match tokio::fs::read(ctx.static_dir.join(name)).await {
        Ok(data) => response(StatusCode::OK, content_type_for(name), data),
        Err(e) => {
            log::debug!("static file {} unavailable: {}", name, e);
            not_found()
        },
    }
}

async fn verify<B>(ctx: &AppContext, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let upload = match read_upload(req, ctx.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e) => {
            log::info!("rejected upload: {}", e);
            return html(e.status(), render::result_page(&ResultView::error(e.to_string())));
        },
    };

    let filename = upload.filename.clone();
    let size = upload.data.len();
    let verifier = Arc::clone(&ctx.verifier);
    let joined = tokio::task::spawn_blocking(move || verifier.verify(&upload.data)).await;

    let view = match joined {
        Ok(Ok(results)) if results.is_empty() => {
            log::info!("{} ({} bytes): no signatures", filename, size);
            ResultView::message("No signatures found in the document.")
        },
        Ok(Ok(results)) => {
            log::info!("{} ({} bytes): {} signature(s) checked", filename, size, results.len());
            ResultView::results(filename, results)
        },
        Ok(Err(e)) => {
            let kind = e.kind();
            match kind {
                ErrorKind::Parse | ErrorKind::Signature => {
                    log::info!("{}: verification failed ({}): {}", filename, kind.label(), e)
                },
                ErrorKind::Network => log::warn!("{}: verification failed: {}", filename, e),
                ErrorKind::Internal => log::error!("{}: verification failed: {}", filename, e),
            }
            ResultView::failure(format!("Verification failed: {}", e), kind.label())
        },
        Err(e) => {
            log::error!("{}: verification task failed: {}", filename, e);
            ResultView::failure(
                "Verification failed: the verifier stopped unexpectedly",
                ErrorKind::Internal.label(),
            )
        },
    };
    html(StatusCode::OK, render::result_page(&view))
}

/// Route one request.
pub async fn handle<B>(ctx: Arc<AppContext>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    log::debug!("{} {}", method, path);
    let readable = method == Method::GET || method == Method::HEAD;

    match path.as_str() {
        "/" if readable => html(StatusCode::OK, render::index_page()),
        "/" => method_not_allowed("GET, HEAD"),
        "/verify" if method == Method::POST => verify(&ctx, req).await,
        "/verify" => method_not_allowed("POST"),
        "/robots.txt" | "/sitemap.xml" if readable => static_file(&ctx, &path[1..]).await,
        "/robots.txt" | "/sitemap.xml" => method_not_allowed("GET, HEAD"),
        _ => match path.strip_prefix("/static/") {
            Some(name) if readable => static_file(&ctx, name).await,
            Some(_) => method_not_allowed("GET, HEAD"),
            None => not_found(),
        },
    }
}
