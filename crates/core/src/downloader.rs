use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::DownloadConfig;
use crate::retry::{retry, Sleeper, TokioSleeper};

/// Errors from a single download attempt.
///
/// None of these carry the request URL, which may include credentials.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("server responded with {0}")]
    Status(StatusCode),
    #[error("incomplete transfer: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        DownloadError::Http(err.without_url())
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, DownloadError>> + Send>>;

/// A response body ready to be streamed to disk.
pub struct Body {
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

/// Fetches a remote resource as a byte stream.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Body, DownloadError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Body, DownloadError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(DownloadError::from));

        Ok(Body {
            content_length,
            stream: Box::pin(stream),
        })
    }
}

/// One file to fetch. Built per download and dropped afterwards.
#[derive(Clone)]
pub struct DownloadSpec {
    pub remote_url: String,
    pub destination: PathBuf,
    pub expected_checksum: Option<String>,
}

/// Last path segment of `url`, ignoring query and fragment. `None` when the
/// path ends in a slash.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .last()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Streams remote files to disk, retrying failed attempts with backoff.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    config: DownloadConfig,
}

impl Downloader {
    pub fn new(config: DownloadConfig, transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            sleeper,
            config,
        }
    }

    /// Downloader backed by reqwest and real sleeps.
    pub fn http(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(
            config.clone(),
            Arc::new(transport),
            Arc::new(TokioSleeper),
        ))
    }

    /// Fetch `url` into `destination`, returning the number of bytes written.
    ///
    /// Every attempt rewrites the file from the first byte. After the last
    /// failed attempt its error is returned as is.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let policy = self.config.retry_policy();
        retry(&policy, self.sleeper.as_ref(), |attempt| {
            self.download_once(url, destination, attempt)
        })
        .await
    }

    async fn download_once(&self, url: &str, destination: &Path, attempt: u32) -> Result<u64, DownloadError> {
        let body = self.transport.get(url).await?;

        let file = File::create(destination).await?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size, file);
        let pb = self.progress_bar(body.content_length, destination);

        let mut received: u64 = 0;
        let mut stream = body.stream;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            received += chunk.len() as u64;
            pb.set_position(received);
        }
        writer.flush().await?;
        pb.finish_and_clear();

        if let Some(expected) = body.content_length {
            if received != expected {
                return Err(DownloadError::Incomplete { expected, received });
            }
        }

        tracing::debug!(
            "Downloaded {} bytes to {:?} on attempt {}",
            received,
            destination,
            attempt
        );
        Ok(received)
    }

    fn progress_bar(&self, total: Option<u64>, destination: &Path) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total.unwrap_or(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        if let Some(name) = destination.file_name() {
            pb.set_message(name.to_string_lossy().into_owned());
        }
        pb
    }
}
