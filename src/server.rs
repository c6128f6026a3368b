//! RFC 1413 identification server.
//!
//! Owns a TCP listening socket and a background accept loop, and answers
//! every query with the same statically configured identity. Runtime
//! failures (bind, accept, per-connection I/O) never surface from the
//! lifecycle calls; they are reported to subscribed error observers and
//! the server keeps running.

use crate::error::ServerError;
use crate::event::ErrorEvent;
use crate::protocol;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, error, info, trace};

/// The well-known ident port (RFC 1413).
pub const IDENT_PORT: u16 = 113;

/// Default read/write timeout applied to each accepted connection.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval at which the idle accept loop re-checks the running flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

type ErrorObserver = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

/// Handle returned by [`IdentServer::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// A minimal ident server answering every query with a fixed identity.
///
/// Lifecycle: construct, [`start`](IdentServer::start) (spawns the accept
/// loop and returns immediately), [`stop`](IdentServer::stop) (cooperative,
/// eventual), optionally start again, and finally
/// [`shutdown`](IdentServer::shutdown) (terminal). Dropping the server
/// shuts it down.
pub struct IdentServer {
    shared: Arc<Shared>,
}

/// State shared between the server handle, the accept loop, and the
/// per-connection handler tasks.
struct Shared {
    identity: Box<str>,
    port: u16,
    timeout_ms: AtomicU64,
    running: AtomicBool,
    shut_down: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
    observers: Mutex<Vec<(u64, ErrorObserver)>>,
    next_observer_id: AtomicU64,
}

impl IdentServer {
    /// Create a server answering with `identity` on the standard ident port.
    ///
    /// Fails with [`ServerError::BlankIdentity`] if `identity` is empty or
    /// whitespace-only. The identity is validated once here and never
    /// revalidated.
    pub fn new(identity: &str) -> Result<Self, ServerError> {
        Self::with_port(identity, IDENT_PORT)
    }

    /// Create a server answering with `identity` on an explicit port.
    ///
    /// Port 0 binds an ephemeral port; the chosen address is observable
    /// via [`local_addr`](IdentServer::local_addr) once the loop is up.
    pub fn with_port(identity: &str, port: u16) -> Result<Self, ServerError> {
        if identity.trim().is_empty() {
            return Err(ServerError::BlankIdentity);
        }

        Ok(IdentServer {
            shared: Arc::new(Shared {
                identity: identity.into(),
                port,
                timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT.as_millis() as u64),
                running: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                local_addr: Mutex::new(None),
                observers: Mutex::new(Vec::new()),
                next_observer_id: AtomicU64::new(0),
            }),
        })
    }

    /// The identity returned to every caller.
    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    /// The port the accept loop binds.
    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// The read/write timeout applied to accepted connections.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.shared.timeout_ms.load(Ordering::Relaxed))
    }

    /// Set the read/write timeout for subsequently accepted connections.
    ///
    /// Connections already in flight keep the timeout they started with.
    pub fn set_timeout(&self, timeout: Duration) {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.shared.timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Whether the accept loop is (or is about to be) running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The bound listening address, or `None` while not listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock().unwrap()
    }

    /// Start the server, spawning the accept loop on the tokio runtime.
    ///
    /// Must be called from within a tokio runtime context; like
    /// `tokio::spawn`, it panics otherwise.
    ///
    /// Returns as soon as the loop task is spawned; the bind happens inside
    /// the loop, so a bind failure (port in use, missing privilege for port
    /// 113) is reported through the error-notification path rather than
    /// returned here.
    ///
    /// # Errors
    ///
    /// [`ServerError::ShutDown`] after [`shutdown`](IdentServer::shutdown);
    /// [`ServerError::AlreadyRunning`] if already running.
    pub fn start(&self) -> Result<(), ServerError> {
        if self.shared.shut_down.load(Ordering::SeqCst) {
            return Err(ServerError::ShutDown);
        }
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ServerError::AlreadyRunning);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(accept_loop(shared));
        Ok(())
    }

    /// Request the accept loop to stop. Idempotent.
    ///
    /// Cessation is eventual: the loop notices the cleared flag within one
    /// poll interval. In-flight connection handlers run to completion or to
    /// their own I/O timeout.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    /// Shut the server down: detach all observers, stop the loop, and mark
    /// the instance terminal. Idempotent; never fails. Subsequent
    /// [`start`](IdentServer::start) calls are rejected.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.observers.lock().unwrap().clear();
        self.stop();
    }

    /// Subscribe an observer for error notifications.
    ///
    /// Observers are invoked synchronously on the task where the failure
    /// occurred. A panicking observer is caught and logged; the remaining
    /// observers are still notified.
    pub fn subscribe(
        &self,
        observer: impl Fn(&ErrorEvent) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .observers
            .lock()
            .unwrap()
            .push((id, Arc::new(observer)));
        ObserverId(id)
    }

    /// Remove a previously subscribed observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.shared
            .observers
            .lock()
            .unwrap()
            .retain(|(oid, _)| *oid != id.0);
    }
}

impl Drop for IdentServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    /// Deliver an event to every subscribed observer, in subscription
    /// order, isolating each invocation from the others.
    fn notify(&self, event: ErrorEvent) {
        debug!(message = ?event.message(), "reporting failure to observers");

        let observers: Vec<ErrorObserver> = self
            .observers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                error!("error observer panicked");
            }
        }
    }
}

/// Background worker spawned once per `start()` call.
///
/// Binds the listener, then alternates between accepting pending
/// connections and idle laps that re-check the running flag. Accept
/// failures are reported and the loop continues; a bind failure is
/// unrecoverable and ends the loop. On any exit the published address is
/// cleared, the running flag is cleared, and the listener closes by drop.
async fn accept_loop(shared: Arc<Shared>) {
    let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, shared.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            shared.notify(ErrorEvent::with_context(
                format!("failed to bind port {}", shared.port),
                e,
            ));
            shared.running.store(false, Ordering::SeqCst);
            return;
        }
    };

    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "ident server listening");
        *shared.local_addr.lock().unwrap() = Some(addr);
    }

    while shared.running.load(Ordering::SeqCst) {
        match time::timeout(POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!(peer = %peer, "new connection");

                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &shared).await {
                        shared.notify(ErrorEvent::from_cause(e));
                    }
                });
            }
            Ok(Err(e)) => {
                // Transient; keep listening, but back off so a persistent
                // failure (e.g. fd exhaustion) cannot spin the loop.
                shared.notify(ErrorEvent::from_cause(e));
                time::sleep(POLL_INTERVAL).await;
            }
            Err(_) => {
                // Idle lap; loop around to re-check the running flag.
            }
        }
    }

    // Clear the running flag before the published address: once callers
    // observe `local_addr()` as `None`, a restart must not race this
    // teardown for the flag.
    shared.running.store(false, Ordering::SeqCst);
    *shared.local_addr.lock().unwrap() = None;
    debug!("accept loop exited");
}

/// Handle a single accepted connection: read one query line, answer it,
/// close. The socket halves are released by drop on every exit path.
async fn handle_connection(stream: TcpStream, shared: &Shared) -> io::Result<()> {
    let io_timeout = Duration::from_millis(shared.timeout_ms.load(Ordering::Relaxed));

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader.take(protocol::MAX_QUERY_LENGTH));
    let mut line = String::new();

    let n = bounded(io_timeout, reader.read_line(&mut line), "timed out reading query").await?;
    if n == 0 {
        trace!("connection closed before sending a query");
        return Ok(());
    }

    let Some(response) = protocol::format_response(&line, &shared.identity) else {
        trace!("empty query, closing without a response");
        return Ok(());
    };

    bounded(io_timeout, writer.write_all(&response), "timed out writing response").await?;
    bounded(io_timeout, writer.flush(), "timed out flushing response").await?;

    trace!("query answered");
    Ok(())
}

/// Run an I/O future, converting expiry into a `TimedOut` error.
async fn bounded<T>(
    limit: Duration,
    future: impl Future<Output = io::Result<T>>,
    context: &'static str,
) -> io::Result<T> {
    match time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, context)),
    }
}
