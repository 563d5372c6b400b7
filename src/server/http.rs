//! HTTP Front-End
//!
//! Maps the two store operations onto a minimal query-parameter API and
//! streams response bodies straight out of the engine:
//!
//! - `GET /get?key=K` streams the value bytes; 404 when the key is absent
//!   or expired, 400 when `key` is missing, 500 on an engine error.
//! - `POST /set?key=K&expire=E` takes the value as the request body;
//!   `expire` is milliseconds since the Unix epoch and defaults to "never"
//!   when absent; 400 on a missing key or non-integer expire, 500 on an
//!   engine error.
//!
//! The engine is blocking and holds a shard lock across its file I/O, so
//! every store call runs under `spawn_blocking`. On the read path the value
//! flows through a bounded channel ([`ChannelSink`]) into the response body
//! without ever being buffered whole.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use super::sink::ChannelSink;
use crate::storage::LogStore;

/// Chunks in flight between the blocking read and the response body. Small
/// on purpose: the channel exists for handoff, not buffering.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// Builds the application router over a shared store.
pub fn router(store: Arc<LogStore>) -> Router {
    Router::new()
        .route("/get", get(get_value))
        .route("/set", post(set_value))
        .with_state(store)
}

#[derive(Debug, Deserialize)]
struct GetParams {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetParams {
    key: Option<String>,
    expire: Option<String>,
}

async fn get_value(
    State(store): State<Arc<LogStore>>,
    Query(params): Query<GetParams>,
) -> Response {
    let Some(key) = params.key.filter(|key| !key.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing ?key").into_response();
    };

    let (tx, mut rx) = mpsc::channel::<Bytes>(BODY_CHANNEL_CAPACITY);
    let handle = tokio::task::spawn_blocking({
        let store = Arc::clone(&store);
        let key = key.clone();
        move || {
            let mut sink = ChannelSink::new(tx);
            store.stream_get(&key, &mut sink)
        }
    });

    // The status line can only be decided before the first body byte goes
    // out, so wait for either the first chunk or the read's outcome.
    match rx.recv().await {
        Some(first) => {
            // Committed to a 200. The read may still fail mid-value; all
            // that can be done then is to cut the body short and log it.
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => error!(key = %key, %err, "stream aborted mid-value"),
                    Err(err) => error!(key = %key, %err, "stream task panicked"),
                }
            });

            let body = tokio_stream::once(Ok::<_, Infallible>(first))
                .chain(ReceiverStream::new(rx).map(Ok));
            Body::from_stream(body).into_response()
        }
        // Channel closed without a chunk: empty value, miss, or early error.
        None => match handle.await {
            Ok(Ok(true)) => StatusCode::OK.into_response(),
            Ok(Ok(false)) => StatusCode::NOT_FOUND.into_response(),
            Ok(Err(err)) => {
                error!(key = %key, %err, "couldn't get key");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Err(err) => {
                error!(key = %key, %err, "get task panicked");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

async fn set_value(
    State(store): State<Arc<LogStore>>,
    Query(params): Query<SetParams>,
    body: Bytes,
) -> Response {
    let Some(key) = params.key.filter(|key| !key.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing ?key").into_response();
    };

    let expire_at = match params.expire.as_deref() {
        // No expiration requested: keep the key effectively forever.
        None | Some("") => i64::MAX,
        Some(raw) => match raw.parse::<i64>() {
            Ok(millis) => millis,
            Err(_) => {
                return (StatusCode::BAD_REQUEST, "?expire must be an integer").into_response();
            }
        },
    };

    let result = tokio::task::spawn_blocking({
        let store = Arc::clone(&store);
        let key = key.clone();
        move || store.set(&key, expire_at, &body)
    })
    .await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(err)) => {
            error!(key = %key, %err, "couldn't set key");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            error!(key = %key, %err, "set task panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LogStoreOptions;
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router(dir: &std::path::Path) -> Router {
        let store = Arc::new(LogStore::open(dir, LogStoreOptions::default()).unwrap());
        router(store)
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: impl Into<Body>,
    ) -> (StatusCode, Bytes) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(body.into())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes)
    }

    #[tokio::test]
    async fn test_missing_key_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let (status, body) = send(&router, "GET", "/get", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&body[..], b"missing ?key");

        let (status, _) = send(&router, "GET", "/get?key=", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, "POST", "/set", Body::from("v")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_integer_expire_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let (status, body) = send(&router, "POST", "/set?key=a&expire=soon", Body::from("v")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(&body[..], b"?expire must be an integer");
    }

    #[tokio::test]
    async fn test_get_unknown_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let (status, body) = send(&router, "GET", "/get?key=nope", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let (status, _) = send(&router, "POST", "/set?key=a", Body::from("hello")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, "GET", "/get?key=a", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_binary_body_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let value: &[u8] = b"a,b\n\0c,";
        let (status, _) = send(&router, "POST", "/set?key=bin", Body::from(value)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, "GET", "/get?key=bin", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], value);
    }

    #[tokio::test]
    async fn test_empty_value_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let (status, _) = send(&router, "POST", "/set?key=empty", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, "GET", "/get?key=empty", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_past_expire_tombstones_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        let (status, _) = send(&router, "POST", "/set?key=a", Body::from("live")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&router, "POST", "/set?key=a&expire=1", Body::from("dead")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, "GET", "/get?key=a", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_large_value_streams_through() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_router(dir.path());

        // Much larger than one 8 KiB copy chunk, so the body is delivered
        // across many channel sends.
        let value = vec![b'v'; 256 * 1024];
        let (status, _) = send(&router, "POST", "/set?key=big", Body::from(value.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&router, "GET", "/get?key=big", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), value.len());
        assert_eq!(&body[..], &value[..]);
    }
}
