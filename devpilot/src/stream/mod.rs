//! Chunked streaming transport
//!
//! Every write is forwarded to the HTTP body as its own chunk; nothing is
//! batched. The body ends when the [`StreamWriter`] is dropped.

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use tokio::sync::mpsc;

/// Chunks in flight between the producer and the HTTP connection
const STREAM_BUFFER: usize = 32;

/// Producer side of a streamed response
#[derive(Debug)]
pub struct StreamWriter {
    tx: mpsc::Sender<Bytes>,
}

impl StreamWriter {
    /// Write raw bytes. Returns false once the caller disconnected.
    pub async fn write(&self, bytes: impl Into<Bytes>) -> bool {
        self.tx.send(bytes.into()).await.is_ok()
    }

    /// Write `text` followed by a newline
    pub async fn line(&self, text: impl AsRef<str>) -> bool {
        let mut line = String::with_capacity(text.as_ref().len() + 1);
        line.push_str(text.as_ref());
        line.push('\n');
        self.write(line).await
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver side, turned into a response body
#[derive(Debug)]
pub struct StreamBody {
    rx: mpsc::Receiver<Bytes>,
}

impl StreamBody {
    pub fn into_body(self) -> Body {
        let stream = futures::stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
        });
        Body::from_stream(stream)
    }

    /// Drain everything written until the writer is dropped
    pub async fn collect(mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

impl IntoResponse for StreamBody {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.into_body());
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }
}

/// Create a writer and the body it feeds
pub fn channel() -> (StreamWriter, StreamBody) {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    (StreamWriter { tx }, StreamBody { rx })
}
