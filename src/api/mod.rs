//! Agent API: newline-delimited JSON over a local TCP listener.
//!
//! One request object per line, one response per request. A connection that
//! sends `subscribe` is kept open and receives pushed alert events as they
//! arrive. The serve loop owns the calling thread; it unblocks on a `stop`
//! request, an explicit [`ApiServer::stop`] call, or a termination signal.

use std::io::{self, BufRead as _, BufReader, Write as _};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertsService};
use crate::core::errors::{CsmError, Result};
use crate::logger::Logger;

/// How long the accept loop sleeps when no client is waiting.
const ACCEPT_IDLE: Duration = Duration::from_millis(50);

/// Read timeout bounding a stalled client connection.
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Write timeout bounding responses and pushed events. Keeps a subscriber
/// that stopped draining its socket from stalling the push path.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single request line.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ApiRequest {
    /// Agent liveness and alert count.
    Status,
    /// All stored alerts, oldest first.
    Alerts,
    /// Mark one alert acknowledged.
    Acknowledge {
        /// Alert identifier.
        id: String,
    },
    /// Keep this connection open and stream pushed alert events.
    Subscribe,
    /// Unblock the serve loop.
    Stop,
}

/// A single response line.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Failure detail when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Request-specific payload, flattened into the response object.
    #[serde(flatten)]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            error: None,
            data: Some(data),
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            ok: false,
            error: Some(message.to_string()),
            data: None,
        }
    }
}

/// The agent's API layer.
///
/// Constructed once during init with the alerting service it queries;
/// served once by the orchestrator's `run`.
#[derive(Debug)]
pub struct ApiServer {
    alerts: AlertsService,
    logger: Logger,
    stop: Arc<AtomicBool>,
    subscribers: Mutex<Vec<TcpStream>>,
    bound: Mutex<Option<u16>>,
}

impl ApiServer {
    /// API layer over the alerting service.
    #[must_use]
    pub fn new(alerts: AlertsService, logger: Logger) -> Self {
        Self {
            alerts,
            logger,
            stop: Arc::new(AtomicBool::new(false)),
            subscribers: Mutex::new(Vec::new()),
            bound: Mutex::new(None),
        }
    }

    /// Serve until stopped. Blocks the calling thread.
    ///
    /// Binding `port` 0 picks an ephemeral port, observable through
    /// [`bound_port`] while the loop runs.
    ///
    /// [`bound_port`]: ApiServer::bound_port
    pub fn run(&self, bind: &str, port: u16) -> Result<()> {
        self.stop.store(false, Ordering::SeqCst);
        let listener = TcpListener::bind((bind, port)).map_err(|e| CsmError::Runtime {
            details: format!("cannot bind API listener on {bind}:{port}: {e}"),
        })?;
        let local = listener.local_addr().map_err(|e| CsmError::Runtime {
            details: format!("cannot resolve API listener address: {e}"),
        })?;
        listener.set_nonblocking(true).map_err(|e| CsmError::Runtime {
            details: format!("cannot configure API listener: {e}"),
        })?;
        *self.bound.lock() = Some(local.port());

        #[cfg(feature = "daemon")]
        self.register_stop_signals();

        self.logger.info(&format!("API serving on {local}"));
        while !self.stop.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.handle_client(stream) {
                        self.logger.warn(&format!("API client failed: {e}"));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_IDLE),
                Err(e) => self.logger.warn(&format!("API accept failed: {e}")),
            }
        }

        *self.bound.lock() = None;
        self.subscribers.lock().clear();
        self.logger.info("API serve loop stopped");
        Ok(())
    }

    /// Unblock the serve loop from another thread.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Port the listener is bound to while the serve loop runs.
    #[must_use]
    pub fn bound_port(&self) -> Option<u16> {
        *self.bound.lock()
    }

    /// Deliver an alert event to every subscribed connection.
    ///
    /// Connections that no longer accept writes are dropped. Pushing with no
    /// subscribers is a no-op, not an error.
    pub fn push(&self, alert: &Alert) -> Result<()> {
        let line = serde_json::to_string(&serde_json::json!({
            "event": "alert",
            "alert": alert,
        }))?;
        let mut subscribers = self.subscribers.lock();
        subscribers
            .retain_mut(|stream| writeln!(stream, "{line}").and_then(|()| stream.flush()).is_ok());
        Ok(())
    }

    #[cfg(feature = "daemon")]
    fn register_stop_signals(&self) {
        use signal_hook::consts::{SIGINT, SIGTERM};
        for signal in [SIGTERM, SIGINT] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&self.stop)) {
                self.logger
                    .warn(&format!("cannot register stop signal {signal}: {e}"));
            }
        }
    }

    fn handle_client(&self, stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
        stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT))?;
        let mut writer = stream.try_clone()?;
        let reader = BufReader::new(stream);

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                // A stalled or closed client ends the connection, nothing more.
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    break;
                }
                Err(e) => return Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }

            let request: ApiRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    write_response(&mut writer, &ApiResponse::failure(&format!("invalid request: {e}")))?;
                    continue;
                }
            };

            match request {
                ApiRequest::Status => {
                    let response = match self.alerts.count() {
                        Ok(count) => ApiResponse::success(serde_json::json!({
                            "status": "running",
                            "alerts": count,
                        })),
                        Err(e) => ApiResponse::failure(&e.to_string()),
                    };
                    write_response(&mut writer, &response)?;
                }
                ApiRequest::Alerts => {
                    let response = match self.alerts.list() {
                        Ok(alerts) => ApiResponse::success(serde_json::json!({ "alerts": alerts })),
                        Err(e) => ApiResponse::failure(&e.to_string()),
                    };
                    write_response(&mut writer, &response)?;
                }
                ApiRequest::Acknowledge { id } => {
                    let response = match self.alerts.acknowledge(&id) {
                        Ok(Some(alert)) => {
                            ApiResponse::success(serde_json::json!({ "alert": alert }))
                        }
                        Ok(None) => ApiResponse::failure(&format!("no alert with id {id}")),
                        Err(e) => ApiResponse::failure(&e.to_string()),
                    };
                    write_response(&mut writer, &response)?;
                }
                ApiRequest::Subscribe => {
                    // Register before acknowledging so an alert pushed right
                    // after the ack cannot slip past this connection.
                    let subscriber = writer.try_clone()?;
                    self.subscribers.lock().push(subscriber);
                    write_response(&mut writer, &ApiResponse::success(serde_json::json!({
                        "subscribed": true,
                    })))?;
                    return Ok(());
                }
                ApiRequest::Stop => {
                    write_response(&mut writer, &ApiResponse::success(serde_json::json!({
                        "stopping": true,
                    })))?;
                    self.stop();
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

fn write_response(stream: &mut TcpStream, response: &ApiResponse) -> io::Result<()> {
    let line = serde_json::to_string(response)
        .unwrap_or_else(|_| String::from(r#"{"ok":false,"error":"unserializable response"}"#));
    writeln!(stream, "{line}")?;
    stream.flush()
}
