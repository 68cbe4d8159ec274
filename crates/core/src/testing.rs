//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::downloader::{Body, DownloadError, Transport};
use crate::retry::Sleeper;

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.recorded().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// What a single request to [`ScriptedTransport`] does.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Connection fails before any byte arrives
    Refused(&'static str),
    /// Some bytes arrive, then the stream breaks
    Broken(Vec<u8>),
    /// Announces more bytes than it sends
    Short { announced: u64, payload: Vec<u8> },
    Ok(Vec<u8>),
}

/// Transport that replays one [`Reply`] per request and remembers the URLs
/// it was asked for. Once the script runs out the last reply repeats.
#[derive(Debug)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    urls: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            *last = Some(reply);
        }
        last.clone().unwrap_or(Reply::Refused("no scripted reply"))
    }
}

fn broken_pipe(message: &str) -> DownloadError {
    DownloadError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        message.to_string(),
    ))
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<Body, DownloadError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.urls.lock().unwrap().push(url.to_string());

        let items: Vec<Result<Vec<u8>, DownloadError>> = match self.next_reply() {
            Reply::Refused(message) => {
                return Err(broken_pipe(&format!("{} (request {})", message, attempt)))
            }
            Reply::Broken(partial) => vec![Ok(partial), Err(broken_pipe("stream broke"))],
            Reply::Short { announced, payload } => {
                return Ok(Body {
                    content_length: Some(announced),
                    stream: Box::pin(futures_util::stream::iter(vec![Ok(payload)])),
                })
            }
            Reply::Ok(payload) => {
                let len = payload.len() as u64;
                let chunks: Vec<_> = payload.chunks(3).map(|c| Ok(c.to_vec())).collect();
                return Ok(Body {
                    content_length: Some(len),
                    stream: Box::pin(futures_util::stream::iter(chunks)),
                });
            }
        };

        Ok(Body {
            content_length: None,
            stream: Box::pin(futures_util::stream::iter(items)),
        })
    }
}

/// In-memory zip archive with the given `(name, contents)` files.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
