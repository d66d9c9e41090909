//! Get command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use courier::http::{Bytes, Method};
use courier::{
    ClientConfig, EventDispatcher, HttpRequest, HttpResponse, HttpToken, ReqwestTransport,
    TargetId, TextEncoding, TransportError, CHANNEL_HTTP_ERROR, CHANNEL_HTTP_RESULT, KEY_ERROR,
    KEY_RESPONSE, KEY_RESPONSE_DATA,
};
use serde::Serialize;
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::cache::FileCacheWorker;
use crate::outcome::Outcome;
use crate::OutputFormat;

pub struct GetOptions {
    pub url: String,
    pub method: String,
    pub headers: Vec<String>,
    pub data: Option<String>,
    pub cache: Option<PathBuf>,
    pub refresh: bool,
    pub encoding: TextEncoding,
}

#[derive(Serialize)]
struct FetchOutput {
    token_id: String,
    source: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    body_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn run(config: &ClientConfig, options: GetOptions, format: OutputFormat) -> Result<()> {
    let request = build_request(&options)?;
    let url = request.url.to_string();
    let transport =
        Arc::new(ReqwestTransport::new(config).context("failed to build HTTP client")?);
    let dispatcher = EventDispatcher::global().clone();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut builder = HttpToken::for_request(request)
        .transport(transport)
        .dispatcher(dispatcher.clone());

    // Either a cache worker owns the outcome or the bus does, never both.
    let worker = options
        .cache
        .map(|path| Arc::new(FileCacheWorker::new(path, options.refresh, tx.clone())));
    let target = match &worker {
        Some(worker) => {
            builder = builder.worker(worker);
            None
        }
        None => Some(subscribe(&dispatcher, &tx)),
    };
    drop(tx);

    let token = builder.build().context("failed to create request token")?;
    tracing::debug!(token_id = %token.id(), %url, "Starting request");
    token.start();

    let outcome = tokio::select! {
        _ = signal::ctrl_c() => {
            if token.cancel_request() && format == OutputFormat::Text {
                eprintln!("\nRequest cancelled");
            }
            None
        }
        outcome = rx.recv() => outcome,
    };

    if let Some(target) = target {
        dispatcher.unsubscribe_all(target);
    }
    // Keep the worker alive until an outcome arrived.
    drop(worker);

    let Some(outcome) = outcome else {
        if token.phase().is_terminal() {
            return Ok(());
        }
        return Err(anyhow!("request ended without an outcome"));
    };

    let output = render(&token, &url, &outcome, options.encoding);
    match format {
        OutputFormat::Text => print_text(&output),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }

    match outcome {
        Outcome::Failed(error) => Err(anyhow!(error).context("request failed")),
        _ => Ok(()),
    }
}

fn build_request(options: &GetOptions) -> Result<HttpRequest> {
    let method = Method::from_bytes(options.method.to_uppercase().as_bytes())
        .map_err(|_| anyhow!("invalid HTTP method: {}", options.method))?;

    let mut request = HttpRequest::parse(&options.url)?.with_method(method);
    for header in &options.headers {
        let (name, value) = parse_header(header)?;
        request = request.try_header(name, value)?;
    }
    if let Some(data) = &options.data {
        request = request.with_body(data.clone());
    }
    Ok(request)
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header must be 'Name: value', got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("header name is empty in '{}'", raw));
    }
    Ok((name, value.trim()))
}

/// Route bus notifications for this process's token into `outcomes`.
///
/// courierctl starts a single token per process, so no filtering by sender.
fn subscribe(dispatcher: &EventDispatcher, outcomes: &UnboundedSender<Outcome>) -> TargetId {
    let target = TargetId::new();

    let tx = outcomes.clone();
    dispatcher.subscribe(CHANNEL_HTTP_RESULT, target, move |n| {
        if let Some(response) = n.get::<HttpResponse>(KEY_RESPONSE) {
            let body = n.get::<Bytes>(KEY_RESPONSE_DATA).cloned().unwrap_or_default();
            let _ = tx.send(Outcome::Network {
                response: response.clone(),
                body,
            });
        }
    });

    let tx = outcomes.clone();
    dispatcher.subscribe(CHANNEL_HTTP_ERROR, target, move |n| {
        if let Some(error) = n.get::<TransportError>(KEY_ERROR) {
            let _ = tx.send(Outcome::Failed(error.clone()));
        }
    });

    target
}

fn render(token: &HttpToken, url: &str, outcome: &Outcome, encoding: TextEncoding) -> FetchOutput {
    let mut output = FetchOutput {
        token_id: token.id().to_string(),
        source: "network",
        url: url.to_string(),
        status: None,
        body: None,
        body_bytes: 0,
        error: None,
    };

    match outcome {
        Outcome::Network { response, body } => {
            output.url = response.url.to_string();
            output.status = Some(response.status.as_u16());
            output.body = encoding.decode(body);
            output.body_bytes = body.len();
        }
        Outcome::Cache(data) => {
            output.source = "cache";
            output.body_bytes = data.len();
            output.body = Some(data.clone());
        }
        Outcome::Failed(error) => {
            output.error = Some(error.to_string());
        }
    }
    output
}

fn print_text(output: &FetchOutput) {
    match (&output.error, output.status) {
        (Some(error), _) => eprintln!("{} failed: {}", output.url, error),
        (None, Some(status)) => {
            eprintln!("{} {} ({} bytes)", status, output.url, output.body_bytes);
        }
        (None, None) => {
            eprintln!(
                "{} from {} ({} bytes)",
                output.url, output.source, output.body_bytes
            );
        }
    }

    match &output.body {
        Some(body) => print!("{}", body),
        None if output.error.is_none() && output.body_bytes > 0 => {
            eprintln!("(body is not valid text; try --encoding)");
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(url: &str) -> GetOptions {
        GetOptions {
            url: url.to_string(),
            method: "get".to_string(),
            headers: Vec::new(),
            data: None,
            cache: None,
            refresh: false,
            encoding: TextEncoding::Utf8,
        }
    }

    #[test]
    fn test_parse_header_trims() {
        assert_eq!(
            parse_header("Accept:  text/plain ").unwrap(),
            ("Accept", "text/plain")
        );
        assert_eq!(parse_header("X-Empty:").unwrap(), ("X-Empty", ""));
        assert!(parse_header("no colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_build_request_from_options() {
        let mut opts = options("https://example.com/submit");
        opts.method = "post".to_string();
        opts.headers = vec!["Content-Type: application/json".to_string()];
        opts.data = Some("{}".to_string());

        let request = build_request(&opts).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers.get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(request.body, Some(Bytes::from_static(b"{}")));
    }

    #[test]
    fn test_build_request_rejects_bad_input() {
        assert!(build_request(&options("not a url")).is_err());

        let mut opts = options("https://example.com/");
        opts.method = "GE T".to_string();
        assert!(build_request(&opts).is_err());

        let mut opts = options("https://example.com/");
        opts.headers = vec!["Bad Name: x".to_string()];
        assert!(build_request(&opts).is_err());
    }

    #[test]
    fn test_render_cache_outcome() {
        let token = HttpToken::for_url_str("https://example.com/a")
            .unwrap()
            .dispatcher(EventDispatcher::new())
            .build()
            .unwrap();
        let output = render(
            &token,
            "https://example.com/a",
            &Outcome::Cache("cached".to_string()),
            TextEncoding::Utf8,
        );

        assert_eq!(output.source, "cache");
        assert_eq!(output.body.as_deref(), Some("cached"));
        assert_eq!(output.body_bytes, 6);
        assert!(output.status.is_none());
        assert!(output.error.is_none());
    }
}
