//! Route behaviour of the web front door, driven through `handle` with
//! in-memory request bodies.

mod common;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use pdf_sigcheck::signatures::{
    DocumentVerifier, NoFetch, PdfVerifier, Tristate, TrustStore, ValidationOutcome,
};
use pdf_sigcheck::web::handle;
use pdf_sigcheck::{AppContext, Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Canned verifier that counts its calls.
struct StubVerifier {
    reply: fn() -> Result<Vec<ValidationOutcome>>,
    calls: AtomicUsize,
}

impl StubVerifier {
    fn new(reply: fn() -> Result<Vec<ValidationOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

impl DocumentVerifier for StubVerifier {
    fn verify(&self, _document: &[u8]) -> Result<Vec<ValidationOutcome>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)()
    }
}

fn two_outcomes() -> Result<Vec<ValidationOutcome>> {
    Ok(vec![
        ValidationOutcome {
            field_name: "Signature1".to_string(),
            intact: Tristate::True,
            trusted: Tristate::True,
            summary: "INTACT:TRUSTED,UNTOUCHED".to_string(),
            details: "Signer: <Alice>".to_string(),
        },
        ValidationOutcome::default(),
    ])
}

fn no_outcomes() -> Result<Vec<ValidationOutcome>> {
    Ok(Vec::new())
}

fn broken_document() -> Result<Vec<ValidationOutcome>> {
    Err(Error::InvalidPdf("ByteRange ends at 900 but the file is 800 bytes".to_string()))
}

fn context(verifier: Arc<dyn DocumentVerifier>) -> Arc<AppContext> {
    Arc::new(AppContext::new(verifier))
}

fn multipart(field: &str, filename: &str, content: &[u8]) -> Request<Full<Bytes>> {
    let mut body = Vec::new();
    body.extend_from_slice(b"--TESTBOUNDARY\r\n");
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n--TESTBOUNDARY--\r\n");
    Request::builder()
        .method(Method::POST)
        .uri("/verify")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=TESTBOUNDARY")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn get(path: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_text(response: Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_index_serves_upload_form() {
    let response = handle(context(StubVerifier::new(no_outcomes)), get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let page = body_text(response).await;
    assert!(page.contains("action=\"/verify\""));
    assert!(page.contains("name=\"pdf\""));
}

#[tokio::test]
async fn test_verify_lists_every_outcome() {
    let stub = StubVerifier::new(two_outcomes);
    let response = handle(context(stub.clone()), multipart("pdf", "contract.pdf", b"%PDF-1.7")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

    let page = body_text(response).await;
    assert!(page.contains("contract.pdf"));
    assert!(page.contains("Signature 1: Signature1"));
    assert!(page.contains("Signature 2</h2>"));
    assert!(page.contains("INTACT:TRUSTED,UNTOUCHED"));
    assert!(page.contains("Integrity: <span class=\"ok\">True</span>"));
    assert!(page.contains("Trust: <span class=\"unknown\">Unknown</span>"));
    assert!(page.contains("Signer: &lt;Alice&gt;"));
    assert!(!page.contains("<Alice>"));
}

#[tokio::test]
async fn test_verify_without_signatures() {
    let response = handle(context(StubVerifier::new(no_outcomes)), multipart("pdf", "plain.pdf", b"%PDF")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("No signatures found in the document."));
}

#[tokio::test]
async fn test_verify_reports_failures_in_page() {
    let response = handle(
        context(StubVerifier::new(broken_document)),
        multipart("pdf", "broken.pdf", b"%PDF"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Verification failed: "));
    assert!(page.contains("ByteRange ends at 900"));
    assert!(page.contains("malformed document"));
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let stub = StubVerifier::new(two_outcomes);
    let response = handle(context(stub.clone()), multipart("attachment", "x.pdf", b"%PDF")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    assert!(body_text(response).await.contains("No PDF uploaded."));

    let response = handle(context(stub.clone()), multipart("pdf", "", b"")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let ctx = Arc::new(AppContext::new(StubVerifier::new(no_outcomes)).with_max_upload_bytes(64));
    let response = handle(ctx, multipart("pdf", "big.pdf", &[b'x'; 1024])).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_wrong_methods() {
    let ctx = context(StubVerifier::new(no_outcomes));
    let response = handle(Arc::clone(&ctx), get("/verify")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "POST");

    let post_index = Request::builder()
        .method(Method::POST)
        .uri("/")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = handle(ctx, post_index).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let response = handle(context(StubVerifier::new(no_outcomes)), get("/admin")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_assets() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("robots.txt"), "User-agent: *\nDisallow:\n").unwrap();
    std::fs::write(dir.path().join("style.css"), "body { margin: 0 }\n").unwrap();
    let ctx = Arc::new(AppContext::new(StubVerifier::new(no_outcomes)).with_static_dir(dir.path()));

    let response = handle(Arc::clone(&ctx), get("/robots.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert!(body_text(response).await.starts_with("User-agent"));

    let response = handle(Arc::clone(&ctx), get("/static/style.css")).await;
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css; charset=utf-8");

    // Absent files and traversal attempts are both plain 404s.
    let response = handle(Arc::clone(&ctx), get("/sitemap.xml")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = handle(ctx, get("/static/..%2Frobots.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_signed_upload_end_to_end() {
    let root = common::root_ca("Test Root", 1);
    let alice = common::signer("Alice", 2, &root);
    let pdf = common::signed_pdf(&alice, &[]);

    let verifier = PdfVerifier::new(
        Arc::new(TrustStore::from_certificates(vec![root.cert.clone()])),
        Arc::new(NoFetch),
    )
    .with_allow_fetching(false);
    let response = handle(context(Arc::new(verifier)), multipart("pdf", "signed.pdf", &pdf)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("INTACT:TRUSTED,UNTOUCHED"));
    assert!(page.contains("Integrity: <span class=\"ok\">True</span>"));
    assert!(page.contains("Trust: <span class=\"ok\">True</span>"));
}

#[tokio::test]
async fn test_non_pdf_upload_end_to_end() {
    let verifier = PdfVerifier::new(Arc::new(TrustStore::new()), Arc::new(NoFetch)).with_allow_fetching(false);
    let response = handle(
        context(Arc::new(verifier)),
        multipart("pdf", "holiday.png", b"\x89PNG\r\n\x1a\n not a document"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("Verification failed: "));
    assert!(page.contains("malformed document"));
    assert!(!page.contains("Signature 1"));
}
