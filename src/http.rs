use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, error, warn};

use crate::config::RunConfig;
use crate::error::HarvestError;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;
const STREAM_QUEUE_DEPTH: usize = 16;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Body is read completely before the attempt counts as a success.
    Buffered,
    /// Body is handed back unread so it can be consumed in chunks.
    Streaming,
}

pub struct FetchResponse {
    url: String,
    content_length: Option<u64>,
    body: Box<dyn Read + Send>,
}

impl FetchResponse {
    pub fn from_bytes(url: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            content_length: Some(bytes.len() as u64),
            body: Box::new(Cursor::new(bytes)),
        }
    }

    pub fn from_reader(
        url: impl Into<String>,
        content_length: Option<u64>,
        body: Box<dyn Read + Send>,
    ) -> Self {
        Self {
            url: url.into(),
            content_length,
            body,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Length declared by the server, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn text(mut self) -> Result<String, HarvestError> {
        let mut bytes = Vec::new();
        self.body
            .read_to_end(&mut bytes)
            .map_err(|err| HarvestError::Http {
                url: self.url.clone(),
                message: err.to_string(),
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.body
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchResponse, HarvestError>;

    fn fetch_text(&self, url: &str) -> Result<String, HarvestError> {
        self.fetch(url, FetchMode::Buffered)?.text()
    }
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchResponse, HarvestError> {
        (**self).fetch(url, mode)
    }
}

type Chunk = io::Result<Vec<u8>>;

/// Body reader that fails with `TimedOut` once no bytes arrive for `idle`.
///
/// The wrapped reader is drained on a background thread; a stalled peer
/// leaves that thread parked on its socket but never blocks the caller.
pub struct IdleTimeoutReader {
    chunks: Receiver<Chunk>,
    pending: Cursor<Vec<u8>>,
    idle: Duration,
    finished: bool,
}

impl IdleTimeoutReader {
    pub fn spawn<R: Read + Send + 'static>(inner: R, idle: Duration) -> Self {
        let (sender, chunks) = mpsc::sync_channel(STREAM_QUEUE_DEPTH);
        thread::spawn(move || pump(inner, &sender));
        Self::from_channel(chunks, idle)
    }

    fn from_channel(chunks: Receiver<Chunk>, idle: Duration) -> Self {
        Self {
            chunks,
            pending: Cursor::new(Vec::new()),
            idle,
            finished: false,
        }
    }
}

impl Read for IdleTimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let read = self.pending.read(buf)?;
            if read > 0 || buf.is_empty() || self.finished {
                return Ok(read);
            }
            match self.chunks.recv_timeout(self.idle) {
                Ok(Ok(chunk)) => self.pending = Cursor::new(chunk),
                Ok(Err(err)) => return Err(err),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data received for {:.1}s", self.idle.as_secs_f64()),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => self.finished = true,
            }
        }
    }
}

fn pump<R: Read>(mut inner: R, sender: &SyncSender<Chunk>) {
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    loop {
        match inner.read(&mut buf) {
            Ok(0) => return,
            Ok(read) => {
                if sender.send(Ok(buf[..read].to_vec())).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                let _ = sender.send(Err(err));
                return;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Slept before every attempt, retries included.
    pub rate_limit_delay: Duration,
    /// Extra fixed wait after a failed attempt.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            rate_limit_delay: config.rate_limit_delay,
            retry_delay: config.retry_delay,
        }
    }

    pub fn without_delays(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Runs `attempt` until it succeeds or the policy's attempt budget is spent.
///
/// Every failure is retried; the backoff is fixed, not exponential. The closure
/// receives the 1-based attempt number.
pub fn retry_fetch<T, F>(policy: &RetryPolicy, url: &str, mut attempt: F) -> Result<T, HarvestError>
where
    F: FnMut(u32) -> Result<T, HarvestError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut current = 1u32;
    loop {
        thread::sleep(policy.rate_limit_delay);
        match attempt(current) {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(
                    url,
                    attempt = current,
                    max_attempts,
                    error = %err,
                    "request failed"
                );
                if current >= max_attempts {
                    error!(url, attempts = max_attempts, "giving up on request");
                    return Err(HarvestError::FetchExhausted {
                        url: url.to_string(),
                        attempts: max_attempts,
                        last_error: err.to_string(),
                    });
                }
                thread::sleep(policy.retry_delay);
                current += 1;
            }
        }
    }
}

/// Blocking HTTP client with a fixed pre-request delay and bounded retries.
#[derive(Clone)]
pub struct HttpFetcher {
    pages: Client,
    downloads: Client,
    idle_timeout: Duration,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &RunConfig) -> Result<Self, HarvestError> {
        let headers = default_headers(&config.user_agent)?;
        let pages = Client::builder()
            .default_headers(headers.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| HarvestError::InvalidConfig(format!("http client: {err}")))?;
        // Large files must not hit a whole-request deadline. Waiting for the
        // response and for each body chunk is bounded by `idle_timeout` instead.
        let downloads = Client::builder()
            .default_headers(headers)
            .timeout(None)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|err| HarvestError::InvalidConfig(format!("http client: {err}")))?;
        Ok(Self {
            pages,
            downloads,
            idle_timeout: config.request_timeout,
            policy: RetryPolicy::from_config(config),
        })
    }

    fn send(client: &Client, url: &str) -> Result<Response, HarvestError> {
        let response = client.get(url).send().map_err(|err| HarvestError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(HarvestError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }

    /// Sends on a worker thread so a silent server cannot block the caller
    /// before headers arrive or between body chunks.
    fn stream(&self, url: &str) -> Result<FetchResponse, HarvestError> {
        let (head_tx, head_rx) = mpsc::channel();
        let (body_tx, body_rx) = mpsc::sync_channel(STREAM_QUEUE_DEPTH);
        let client = self.downloads.clone();
        let target = url.to_string();
        thread::spawn(move || {
            let response = match Self::send(&client, &target) {
                Ok(response) => response,
                Err(err) => {
                    let _ = head_tx.send(Err(err));
                    return;
                }
            };
            if head_tx.send(Ok(response.content_length())).is_ok() {
                pump(response, &body_tx);
            }
        });

        let content_length = match head_rx.recv_timeout(self.idle_timeout) {
            Ok(head) => head?,
            Err(_) => {
                return Err(HarvestError::Http {
                    url: url.to_string(),
                    message: format!(
                        "no response within {:.1}s",
                        self.idle_timeout.as_secs_f64()
                    ),
                });
            }
        };
        Ok(FetchResponse::from_reader(
            url,
            content_length,
            Box::new(IdleTimeoutReader::from_channel(body_rx, self.idle_timeout)),
        ))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchResponse, HarvestError> {
        match mode {
            FetchMode::Buffered => retry_fetch(&self.policy, url, |_| {
                let response = Self::send(&self.pages, url)?;
                let bytes = response.bytes().map_err(|err| HarvestError::Http {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;
                debug!(url, bytes = bytes.len(), "fetched page");
                Ok(FetchResponse::from_bytes(url, bytes.to_vec()))
            }),
            FetchMode::Streaming => retry_fetch(&self.policy, url, |_| self.stream(url)),
        }
    }
}

fn default_headers(user_agent: &str) -> Result<HeaderMap, HarvestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|err| HarvestError::InvalidConfig(format!("user_agent: {err}")))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    Ok(headers)
}
