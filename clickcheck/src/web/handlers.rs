//! Click capture handler.
//!
//! The handler never fails once the host is accepted: form decoding problems
//! are logged and whatever could be decoded is recorded.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use tracing::{error, info, warn};

use crate::error::ParseError;
use crate::params::TrackingParameters;
use crate::sink::RecordSink;
use crate::web::gate::HostGate;

/// Largest form body that will be read.
const MAX_FORM_BYTES: usize = 10 << 20;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<dyn HostGate>,
    pub sink: RecordSink,
}

impl AppState {
    pub fn new(gate: impl HostGate + 'static, sink: RecordSink) -> Self {
        Self {
            gate: Arc::new(gate),
            sink,
        }
    }
}

/// One accepted request.
#[derive(Debug)]
pub struct InboundEvent {
    pub host: String,
    pub url: String,
    pub remote_addr: String,
    pub params: TrackingParameters,
}

impl InboundEvent {
    /// Log the request and write its parameters to `sink`.
    ///
    /// The sink write blocks, so it runs on the blocking pool; the record is
    /// fully written before this returns.
    pub async fn record(self, sink: &RecordSink) {
        info!(
            host = %self.host,
            url = %self.url,
            remote_addr = %self.remote_addr,
            param_count = self.params.len(),
            "click_request"
        );

        let sink = sink.clone();
        let params = self.params;
        let written = tokio::task::spawn_blocking(move || sink.emit_params(&params)).await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(url = %self.url, error = %e, "click_record_write_failed"),
            Err(e) => error!(url = %self.url, error = %e, "click_record_task_failed"),
        }
    }
}

/// Handler for every method and path.
pub async fn capture(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let host = request_host(&parts);

    if !state.gate.accepts(&host) {
        info!(host = %host, path = %parts.uri.path(), "click_request_rejected");
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let (params, errors) = parse_form(&parts, body).await;
    for e in &errors {
        warn!(url = %url, error = %e, "click_form_parse_failed");
    }

    let event = InboundEvent {
        host,
        url,
        remote_addr: remote_addr(&parts),
        params,
    };
    event.record(&state.sink).await;

    let path = percent_decode_str(parts.uri.path()).decode_utf8_lossy();
    let ack = format!("Hello from {}", quote(&escape_html(&path)));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ack,
    )
        .into_response()
}

/// Host as the client sent it, port included.
fn request_host(parts: &Parts) -> String {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

fn remote_addr(parts: &Parts) -> String {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Decode form values from a form-encoded POST, PUT or PATCH body and the
/// query string, body values first.
///
/// Decoding is best effort: a malformed pair is skipped and reported in the
/// error list (at most one error per source), every other pair is kept.
pub async fn parse_form(parts: &Parts, body: Body) -> (TrackingParameters, Vec<ParseError>) {
    let mut params = TrackingParameters::new();
    let mut errors = Vec::new();

    if has_form_body(parts) {
        match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => {
                let (form, error) = TrackingParameters::decode_form(&bytes);
                params.extend(form);
                errors.extend(error);
            }
            Err(e) => errors.push(ParseError::Body(e.to_string())),
        }
    }

    if let Some(query) = parts.uri.query() {
        let (q, error) = TrackingParameters::decode_form(query.as_bytes());
        params.extend(q);
        errors.extend(error);
    }

    (params, errors)
}

fn has_form_body(parts: &Parts) -> bool {
    let method_has_body =
        parts.method == Method::POST || parts.method == Method::PUT || parts.method == Method::PATCH;

    method_has_body
        && parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
            .unwrap_or(false)
}

/// Escape the characters significant in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap `input` in double quotes, backslash-escaping quotes, backslashes
/// and control characters.
pub fn quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts_and_body(request: HttpRequest<Body>) -> (Parts, Body) {
        request.into_parts()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("/plain/path"), "/plain/path");
        assert_eq!(
            escape_html(r#"/<script>"x"&'y'"#),
            "/&lt;script&gt;&#34;x&#34;&amp;&#39;y&#39;"
        );
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("/t"), r#""/t""#);
        assert_eq!(quote(r"/a\b"), r#""/a\\b""#);
        assert_eq!(quote("/a\"b"), r#""/a\"b""#);
        assert_eq!(quote("/x\ny\tz\u{1}\u{7f}\u{85}"), r#""/x\ny\tz\x01\x7f\u0085""#);
        assert_eq!(quote("/héllo"), "\"/héllo\"");
    }

    #[tokio::test]
    async fn test_parse_form_query_only() {
        let (parts, body) = parts_and_body(
            HttpRequest::get("/t?x=1&y=2").body(Body::empty()).unwrap(),
        );
        let (params, errors) = parse_form(&parts, body).await;
        assert!(errors.is_empty());
        assert_eq!(params.first("x"), Some("1"));
        assert_eq!(params.first("y"), Some("2"));
    }

    #[tokio::test]
    async fn test_parse_form_body_then_query() {
        let (parts, body) = parts_and_body(
            HttpRequest::post("/t?a=query")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
                .body(Body::from("a=body&b=2"))
                .unwrap(),
        );
        let (params, errors) = parse_form(&parts, body).await;
        assert!(errors.is_empty());
        assert_eq!(
            params.get("a"),
            Some(&["body".to_string(), "query".to_string()][..])
        );
        assert_eq!(params.first("b"), Some("2"));
    }

    #[tokio::test]
    async fn test_parse_form_ignores_other_bodies() {
        let (parts, body) = parts_and_body(
            HttpRequest::post("/t")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"a":1}"#))
                .unwrap(),
        );
        let (params, errors) = parse_form(&parts, body).await;
        assert!(errors.is_empty());
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_parse_form_keeps_good_source() {
        let (parts, body) = parts_and_body(
            HttpRequest::post("/t?bad=%zz")
                .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(Body::from("good=1"))
                .unwrap(),
        );
        let (params, errors) = parse_form(&parts, body).await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ParseError::Escape(_)));
        assert_eq!(params.first("good"), Some("1"));
        assert!(params.get("bad").is_none());
    }

    #[tokio::test]
    async fn test_parse_form_invalid_utf8_body() {
        let (parts, body) = parts_and_body(
            HttpRequest::put("/t")
                .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(Body::from(vec![b'a', b'=', 0xff, b'&', b'b', b'=', b'2']))
                .unwrap(),
        );
        let (params, errors) = parse_form(&parts, body).await;
        assert!(errors.is_empty());
        assert_eq!(params.first("a"), Some("\u{fffd}"));
        assert_eq!(params.first("b"), Some("2"));
    }

    #[tokio::test]
    async fn test_parse_form_skips_only_bad_pair() {
        let (parts, body) = parts_and_body(
            HttpRequest::get("/t?x=1&bad=%zz&y=2").body(Body::empty()).unwrap(),
        );
        let (params, errors) = parse_form(&parts, body).await;
        assert!(matches!(errors.as_slice(), [ParseError::Escape(8)]));
        assert_eq!(params.first("x"), Some("1"));
        assert_eq!(params.first("y"), Some("2"));
        assert!(params.get("bad").is_none());
    }

    #[test]
    fn test_request_host_prefers_header() {
        let (parts, _) = parts_and_body(
            HttpRequest::get("http://ignored.example.com/t")
                .header(header::HOST, "click.example.com:8080")
                .body(Body::empty())
                .unwrap(),
        );
        assert_eq!(request_host(&parts), "click.example.com:8080");
    }

    #[test]
    fn test_remote_addr_from_connect_info() {
        let (mut parts, _) = parts_and_body(HttpRequest::get("/").body(Body::empty()).unwrap());
        assert_eq!(remote_addr(&parts), "unknown");

        let addr: SocketAddr = "192.0.2.7:51000".parse().unwrap();
        parts.extensions.insert(ConnectInfo(addr));
        assert_eq!(remote_addr(&parts), "192.0.2.7:51000");
    }
}
