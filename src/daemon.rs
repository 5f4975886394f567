//! The suggestion daemon.
//!
//! A loopback TCP server that answers one suggestion request per connection.
//! The shell plugin discovers the port through a per-user port file, sends one
//! line of JSON, and reads back one line of text. Completion results are
//! cached so retyping the same prefix in the same directory never hits the
//! network twice within the TTL.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, SuggestionCache};
use crate::history_cache::HistoryCache;
use crate::suggest::CompletionProvider;

pub const CACHE_MAX_ENTRIES: usize = 128;
pub const CACHE_TTL: Duration = Duration::from_secs(60);
pub const HISTORY_REFRESH: Duration = Duration::from_secs(30);
/// Ceiling on one completion round trip, HTTP timeout included.
pub const COMPLETION_DEADLINE: Duration = Duration::from_secs(3);
/// Ceiling on a whole connection, read to write.
pub const CONNECTION_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SuggestRequest {
    #[serde(default)]
    pub buffer: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub shell: String,
}

/// Default port-file location: `$TMPDIR/komplete-<uid>.port`. Per-user so two
/// users on the same host never race on one file.
pub fn default_port_file() -> PathBuf {
    #[cfg(unix)]
    let uid = unsafe { libc::getuid() };
    #[cfg(not(unix))]
    let uid = 0u32;
    std::env::temp_dir().join(format!("komplete-{uid}.port"))
}

pub struct ServerConfig {
    pub port_file: PathBuf,
    pub shell: String,
}

impl ServerConfig {
    pub fn new(port_file: Option<PathBuf>, shell: Option<String>) -> Self {
        Self {
            port_file: port_file.unwrap_or_else(default_port_file),
            shell: shell
                .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
                .unwrap_or_else(|| "zsh".to_string()),
        }
    }
}

struct Shared {
    completer: Arc<dyn CompletionProvider>,
    cache: SuggestionCache,
    history: HistoryCache,
}

pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
    port_file: PathBuf,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

/// Remote control for a running [`Server`], usable from other tasks.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shared.history.stop();
            self.shutdown.notify_one();
        }
    }
}

impl Server {
    /// Bind the listener, write the port file, and start the history cache.
    /// The server is discoverable by clients as soon as this returns.
    pub async fn bind(config: ServerConfig, completer: Arc<dyn CompletionProvider>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind loopback listener")?;
        let addr = listener.local_addr().context("listener address")?;

        std::fs::write(&config.port_file, addr.port().to_string()).with_context(|| {
            format!("write port file {}", config.port_file.display())
        })?;
        info!(port = addr.port(), port_file = %config.port_file.display(), "daemon listening");

        let shared = Arc::new(Shared {
            completer,
            cache: SuggestionCache::new(CACHE_MAX_ENTRIES, CACHE_TTL),
            history: HistoryCache::start(&config.shell, HISTORY_REFRESH),
        });

        Ok(Self {
            listener,
            shared,
            port_file: config.port_file,
            shutdown: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("listener address")
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
            shutdown: Arc::clone(&self.shutdown),
            stopped: Arc::clone(&self.stopped),
        }
    }

    /// Accept connections until shutdown. Connections still in flight when
    /// shutdown arrives are left to finish on their own tasks.
    pub async fn run(self) -> Result<()> {
        let handle = self.handle();

        #[cfg(unix)]
        {
            let sig_handle = handle.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(%err, "failed to install SIGTERM handler");
                        return;
                    }
                };
                let mut sigint = match signal(SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(%err, "failed to install SIGINT handler");
                        return;
                    }
                };
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
                info!("signal received, shutting down");
                sig_handle.shutdown();
            });
        }

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = self.shutdown.notified() => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            debug!(%err, "accept failed");
                            break;
                        }
                    };
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let result = tokio::time::timeout(
                            CONNECTION_DEADLINE,
                            serve_one(stream, shared),
                        )
                        .await;
                        match result {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => debug!(%peer, %err, "connection failed"),
                            Err(_) => debug!(%peer, "connection deadline exceeded"),
                        }
                    });
                }
            }
        }

        handle.shutdown();
        drop(self.listener);
        if let Err(err) = std::fs::remove_file(&self.port_file) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(%err, port_file = %self.port_file.display(), "failed to remove port file");
            }
        }
        info!("daemon stopped");
        Ok(())
    }
}

/// One request/response exchange. Undecodable or empty requests get an empty
/// line rather than an error so the shell side stays simple.
async fn serve_one(stream: TcpStream, shared: Arc<Shared>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read_half)
        .read_line(&mut line)
        .await
        .context("read request line")?;

    let suggestion = match serde_json::from_str::<SuggestRequest>(&line) {
        Ok(req) if !req.buffer.trim().is_empty() => lookup(&req, &shared).await,
        Ok(_) => String::new(),
        Err(err) => {
            debug!(%err, "undecodable request");
            String::new()
        }
    };

    write_half
        .write_all(format!("{suggestion}\n").as_bytes())
        .await
        .context("write response")?;
    write_half.flush().await.context("flush response")?;
    Ok(())
}

async fn lookup(req: &SuggestRequest, shared: &Shared) -> String {
    let key = cache_key(&req.cwd, &req.buffer);
    if let Some(hit) = shared.cache.get(&key) {
        debug!(buffer = %req.buffer, "cache hit");
        return hit;
    }

    let history = shared.history.get();
    let completion = tokio::time::timeout(
        COMPLETION_DEADLINE,
        shared
            .completer
            .complete(&req.buffer, &req.cwd, &req.shell, &history),
    )
    .await;

    match completion {
        Ok(Ok(suggestion)) if !suggestion.is_empty() => {
            shared.cache.put(&key, &suggestion);
            suggestion
        }
        Ok(Ok(_)) => String::new(),
        Ok(Err(err)) => {
            debug!(%err, "completion failed");
            String::new()
        }
        Err(_) => {
            debug!("completion deadline exceeded");
            String::new()
        }
    }
}

/// Make sure the port file's parent directory exists before binding.
pub fn ensure_port_file_dir(port_file: &Path) -> Result<()> {
    if let Some(parent) = port_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create port file directory {}", parent.display()))?;
    }
    Ok(())
}
