//! HTTP backend: POST the input map, read a bounded JSON response.

use std::sync::Arc;
use std::time::Duration;

use hyper::body::HttpBody as _;
use hyper::client::HttpConnector;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde_json::Value;

use crate::backend::{HttpSpec, parse_response};
use crate::error::DispatchError;

const BODY_SNIPPET: usize = 256;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const IDLE_PER_HOST: usize = 8;

/// Client shared by every HTTP tool backend; reaches `http://` and
/// `https://` endpoints.
pub(crate) type BackendClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Builds the backend client, trusting the bundled web PKI roots.
///
/// The connect timeout is shorter than any sensible tool deadline, so an
/// unreachable endpoint surfaces as a transport failure rather than a
/// timeout of the whole call.
pub(crate) fn backend_client() -> BackendClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));
    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut connector = HttpConnector::new();
    connector.enforce_http(false);
    connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    connector.set_nodelay(true);

    Client::builder()
        .pool_idle_timeout(IDLE_TIMEOUT)
        .pool_max_idle_per_host(IDLE_PER_HOST)
        .build(HttpsConnector::from((connector, Arc::new(tls))))
}

/// Maps a client failure onto a transport error naming the endpoint.
fn transport(url: &str, err: &hyper::Error) -> DispatchError {
    let cause = if err.is_connect() {
        "connection failed"
    } else if err.is_incomplete_message() {
        "connection closed before the response completed"
    } else if err.is_timeout() {
        "timed out"
    } else {
        "request failed"
    };
    DispatchError::Transport(format!("{url}: {cause}: {err}"))
}

/// Reads at most `limit` bytes, refusing a declared length over the limit
/// before reading anything.
async fn read_body(url: &str, mut body: Body, limit: usize) -> Result<Vec<u8>, DispatchError> {
    let declared = body.size_hint().exact().and_then(|len| usize::try_from(len).ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(DispatchError::OutputTooLarge { limit });
    }
    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|err| transport(url, &err))?;
        if buffer.len() + chunk.len() > limit {
            return Err(DispatchError::OutputTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

pub(crate) async fn post(
    client: &BackendClient,
    spec: &HttpSpec,
    capability: &str,
    input: &Value,
    max_output: usize,
) -> Result<Value, DispatchError> {
    let url = spec.url_for(capability);
    let uri = url
        .parse::<Uri>()
        .map_err(|err| DispatchError::Misconfigured(format!("invalid url `{url}`: {err}")))?;

    let mut builder = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json");
    for (name, value) in &spec.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let payload =
        serde_json::to_vec(input).map_err(|err| DispatchError::Protocol(err.to_string()))?;
    let request = builder
        .body(Body::from(payload))
        .map_err(|err| DispatchError::Misconfigured(err.to_string()))?;

    let response = client
        .request(request)
        .await
        .map_err(|err| transport(&url, &err))?;
    let status = response.status();
    let bytes = read_body(&url, response.into_body(), max_output).await?;
    let text = String::from_utf8_lossy(&bytes);

    if !status.is_success() {
        return Err(DispatchError::Status {
            status: status.as_u16(),
            body: text.chars().take(BODY_SNIPPET).collect(),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    parse_response(&text)
}
