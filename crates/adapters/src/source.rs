// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Where bundle archives come from.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("{status} {reason}")]
    Status { status: u16, reason: String },
    #[error("{0}")]
    Transport(String),
}

impl SourceError {
    pub fn not_found() -> Self {
        SourceError::Status { status: 404, reason: "Not Found".into() }
    }
}

/// Body of an archive, delivered in chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, SourceError>>;

#[async_trait]
pub trait ArchiveSource: Clone + Send + Sync + 'static {
    /// Start fetching `url`. Fails early on an error status.
    async fn open(&self, url: &str) -> Result<ByteStream, SourceError>;
}

/// Fetches archives over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveSource for HttpSource {
    async fn open(&self, url: &str) -> Result<ByteStream, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        let body = response.bytes_stream().map(|chunk| {
            chunk.map(|b| b.to_vec()).map_err(|e| SourceError::Transport(e.to_string()))
        });
        Ok(body.boxed())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ArchiveSource, ByteStream, SourceError};
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone)]
    enum Reply {
        Bytes(Vec<u8>),
        Error(SourceError),
        /// Send the first chunk, then hang
        Stall(Vec<u8>),
    }

    #[derive(Default)]
    struct FakeSourceState {
        replies: HashMap<String, Reply>,
        opens: Vec<String>,
        delay: Option<Duration>,
    }

    /// Archive source serving canned replies per URL.
    ///
    /// Unknown URLs answer 404.
    #[derive(Clone, Default)]
    pub struct FakeArchiveSource {
        inner: Arc<Mutex<FakeSourceState>>,
    }

    impl FakeArchiveSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
            self.inner.lock().replies.insert(url.to_string(), Reply::Bytes(body.into()));
        }

        pub fn fail(&self, url: &str, err: SourceError) {
            self.inner.lock().replies.insert(url.to_string(), Reply::Error(err));
        }

        /// Serve `first` and then never finish
        pub fn stall(&self, url: &str, first: impl Into<Vec<u8>>) {
            self.inner.lock().replies.insert(url.to_string(), Reply::Stall(first.into()));
        }

        /// Wait this long before answering each request
        pub fn set_delay(&self, delay: Duration) {
            self.inner.lock().delay = Some(delay);
        }

        /// Every URL opened, in order
        pub fn opens(&self) -> Vec<String> {
            self.inner.lock().opens.clone()
        }

        pub fn open_count(&self) -> usize {
            self.inner.lock().opens.len()
        }
    }

    #[async_trait]
    impl ArchiveSource for FakeArchiveSource {
        async fn open(&self, url: &str) -> Result<ByteStream, SourceError> {
            let (reply, delay) = {
                let mut s = self.inner.lock();
                s.opens.push(url.to_string());
                (s.replies.get(url).cloned(), s.delay)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                None => Err(SourceError::not_found()),
                Some(Reply::Error(e)) => Err(e),
                Some(Reply::Bytes(body)) => {
                    let chunks: Vec<Result<Vec<u8>, SourceError>> =
                        body.chunks(7).map(|c| Ok(c.to_vec())).collect();
                    Ok(stream::iter(chunks).boxed())
                }
                Some(Reply::Stall(first)) => {
                    Ok(stream::once(async move { Ok(first) }).chain(stream::pending()).boxed())
                }
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeArchiveSource;
