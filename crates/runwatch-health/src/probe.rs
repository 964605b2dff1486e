//! Minimal HTTP/1 GET used by the launchers.
//!
//! One TCP connection per request, driven by hyper's low-level client,
//! bounded by a single timeout covering connect, handshake, and body.

use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use tracing::debug;

use crate::error::{BackendError, BackendResult};

/// Issue `GET http://{authority}{path}` and return the status and body.
pub async fn http_get(
    authority: &str,
    path: &str,
    timeout: Duration,
) -> BackendResult<(StatusCode, Bytes)> {
    let uri = format!("http://{authority}{path}");

    let request = async {
        let stream = tokio::net::TcpStream::connect(authority)
            .await
            .map_err(|source| BackendError::Connect {
                address: authority.to_string(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", authority)
            .header("user-agent", "runwatch/0.1")
            .header("accept", "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?
            .to_bytes();

        debug!(%uri, %status, bytes = body.len(), "http get complete");
        Ok::<_, BackendError>((status, body))
    };

    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%uri, "http get timed out");
            Err(BackendError::Timeout(uri))
        }
    }
}

/// Split `http://host:port/base` into (`host:port`, `/base`).
///
/// The port defaults to 80 and the trailing slash of the base is dropped.
pub fn split_base_url(url: &str) -> BackendResult<(String, String)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| BackendError::InvalidConfig(format!("{url} is not an http:// URL")))?;
    let (authority, base) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(BackendError::InvalidConfig(format!("{url} has no host")));
    }
    let authority = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{authority}:80")
    };
    Ok((authority, base.trim_end_matches('/').to_string()))
}
