//! HTML pages.

use crate::signatures::ValidationOutcome;
use std::fmt::Write as _;

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// What the result page shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultView {
    /// Uploaded file name
    pub filename: Option<String>,
    /// One record per signature
    pub results: Vec<ValidationOutcome>,
    /// Informational message (e.g. no signatures)
    pub message: Option<String>,
    /// Error message
    pub error: Option<String>,
    /// Failure category shown next to the error
    pub error_kind: Option<&'static str>,
}

impl ResultView {
    /// Page listing `results` for `filename`.
    pub fn results(filename: impl Into<String>, results: Vec<ValidationOutcome>) -> Self {
        Self {
            filename: Some(filename.into()),
            results,
            ..Default::default()
        }
    }

    /// Page with an informational message and no results.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Page with an error.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Page with an error and its category.
    pub fn failure(error: impl Into<String>, kind: &'static str) -> Self {
        Self {
            error_kind: Some(kind),
            ..Self::error(error)
        }
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<link rel=\"stylesheet\" href=\"/static/style.css\">\n</head>\n\
         <body>\n<main>\n{}</main>\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

/// Upload form.
pub fn index_page() -> String {
    layout(
        "PDF Signature Checker",
        "<h1>PDF Signature Checker</h1>\n\
         <p>Upload a signed PDF to check the integrity and trust of its digital signatures.</p>\n\
         <form action=\"/verify\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"pdf\" accept=\"application/pdf,.pdf\" required>\n\
         <button type=\"submit\">Verify</button>\n\
         </form>\n",
    )
}

fn status_class(value: crate::signatures::Tristate) -> &'static str {
    match value {
        crate::signatures::Tristate::True => "ok",
        crate::signatures::Tristate::False => "bad",
        crate::signatures::Tristate::Unknown => "unknown",
    }
}

/// Verification result page.
pub fn result_page(view: &ResultView) -> String {
    let mut body = String::from("<h1>Verification Result</h1>\n");

    if let Some(error) = &view.error {
        let _ = write!(body, "<p class=\"error\">{}", escape_html(error));
        if let Some(kind) = view.error_kind {
            let _ = write!(body, " <span class=\"kind\">({})</span>", escape_html(kind));
        }
        body.push_str("</p>\n");
    }
    if let Some(message) = &view.message {
        let _ = writeln!(body, "<p class=\"message\">{}</p>", escape_html(message));
    }
    if let Some(filename) = &view.filename {
        let _ = writeln!(body, "<p>File: <strong>{}</strong></p>", escape_html(filename));
    }

    for (index, outcome) in view.results.iter().enumerate() {
        let _ = writeln!(body, "<section class=\"signature\">");
        let heading = if outcome.field_name.is_empty() {
            format!("Signature {}", index + 1)
        } else {
            format!("Signature {}: {}", index + 1, outcome.field_name)
        };
        let _ = writeln!(body, "<h2>{}</h2>", escape_html(&heading));
        let _ = writeln!(
            body,
            "<p>Integrity: <span class=\"{}\">{}</span></p>",
            status_class(outcome.intact),
            outcome.intact
        );
        let _ = writeln!(
            body,
            "<p>Trust: <span class=\"{}\">{}</span></p>",
            status_class(outcome.trusted),
            outcome.trusted
        );
        let _ = writeln!(body, "<p>Summary: <code>{}</code></p>", escape_html(&outcome.summary));
        let _ = writeln!(body, "<pre>{}</pre>", escape_html(&outcome.details));
        body.push_str("</section>\n");
    }

    body.push_str("<p><a href=\"/\">Verify another document</a></p>\n");
    layout("Verification Result", &body)
}

/// 404 page.
pub fn not_found_page() -> String {
    layout(
        "Page Not Found",
        "<h1>Page Not Found</h1>\n<p>The requested page does not exist.</p>\n\
         <p><a href=\"/\">Back to the upload form</a></p>\n",
    )
}

/// 405 page.
pub fn method_not_allowed_page() -> String {
    layout(
        "Method Not Allowed",
        "<h1>Method Not Allowed</h1>\n<p>The method is not allowed for the requested URL.</p>\n",
    )
}
