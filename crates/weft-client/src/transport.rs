use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use serde_json::Value as Json;

use weft_core::errors::TransportError;
use weft_core::session::{PushStream, PushTransport};

use crate::sse;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server-sent-events push transport. Opens a long-lived GET and decodes
/// `message` records into JSON documents. Push channels carry no idle
/// timeout; a quiet collection stays connected.
pub struct SseTransport {
    client: Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

impl Default for SseTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn open(&self, url: &str) -> Result<PushStream, TransportError> {
        let resp = self
            .client
            .get(url)
            .header("accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::from_status(resp.status().as_u16(), url));
        }

        Ok(Box::pin(DocumentStream::new(url, resp.bytes_stream())))
    }
}

/// Wraps a byte stream and yields one decoded JSON document per complete
/// `message` record. Malformed payloads surface as `Payload` errors without
/// ending the stream.
struct DocumentStream {
    url: String,
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    buffer: bytes::BytesMut,
    pending: Vec<Result<Json, TransportError>>,
}

impl DocumentStream {
    fn new(
        url: &str,
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            url: url.to_owned(),
            inner: Box::pin(byte_stream),
            buffer: bytes::BytesMut::new(),
            pending: Vec::new(),
        }
    }

    fn decode(&mut self, chunk: &str) {
        for record in sse::parse_records(chunk) {
            if !record.is_message() || record.data.is_empty() {
                continue;
            }
            let item = serde_json::from_str(&record.data).map_err(|e| TransportError::Payload {
                url: self.url.clone(),
                detail: e.to_string(),
            });
            self.pending.push(item);
        }
    }
}

impl Stream for DocumentStream {
    type Item = Result<Json, TransportError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        // Return pending documents first
        if !self.pending.is_empty() {
            return Poll::Ready(Some(self.pending.remove(0)));
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);

                    // Text is decoded per complete record, never per network
                    // chunk; a multi-byte character split across chunks must
                    // stay intact.
                    while let Some(pos) =
                        self.buffer.windows(2).position(|sep| sep == b"\n\n")
                    {
                        let record = self.buffer.split_to(pos + 2);
                        let text = String::from_utf8_lossy(&record[..pos]).into_owned();
                        self.decode(&text);
                    }

                    if !self.pending.is_empty() {
                        return Poll::Ready(Some(self.pending.remove(0)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(TransportError::Network(e.to_string()))));
                }
                Poll::Ready(None) => {
                    // Stream ended; flush whatever is left in the buffer
                    if !self.buffer.is_empty() {
                        let remaining = std::mem::take(&mut self.buffer);
                        let text = String::from_utf8_lossy(&remaining).into_owned();
                        self.decode(&text);
                        if !self.pending.is_empty() {
                            return Poll::Ready(Some(self.pending.remove(0)));
                        }
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
