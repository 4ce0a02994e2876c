//! Caller role: issues relay requests and matches responses by correlation id.
//!
//! A background listener task drains the inbound side of the port and
//! resolves entries in the pending table. Every pending entry ends exactly
//! once: resolved by its response, or removed on timeout. A response that
//! arrives after its entry was removed is logged and dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::ErrorKind;
use crate::models::{Company, DealerRecord, LedgerAccount, OutstandingBill};
use crate::protocol::{CALLER_LOG_CAPACITY, DETECT_TIMEOUT, RELAY_REQUEST_TIMEOUT};
use crate::relay::diagnostics::{DiagnosticEntry, DiagnosticLog};
use crate::relay::messages::{
    new_correlation_id, BridgeConfig, RelayError, RelayMessage, RelayOp, RelayOutcome,
    RelayRequest, RelayResult,
};
use crate::relay::RelayPort;

type PendingTable = HashMap<String, oneshot::Sender<RelayMessage>>;

/// Caller tuning.
#[derive(Debug, Clone)]
pub struct CallerOptions {
    /// The host page already carries the executor's marker, so detection
    /// succeeds without a handshake.
    pub injected_marker: bool,
    pub detect_timeout: Duration,
    pub request_timeout: Duration,
    /// Optional cap on simultaneously pending requests.
    pub max_in_flight: Option<usize>,
}

impl Default for CallerOptions {
    fn default() -> Self {
        Self {
            injected_marker: false,
            detect_timeout: DETECT_TIMEOUT,
            request_timeout: RELAY_REQUEST_TIMEOUT,
            max_in_flight: None,
        }
    }
}

/// How (or whether) the executor was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// An earlier detection already succeeded.
    Cached,
    /// Found via the injected marker.
    Marker,
    /// Found via a `TALLY_DETECT` / `TALLY_DETECTED` handshake.
    Handshake { version: String },
    NotDetected,
}

impl Detection {
    pub fn is_detected(&self) -> bool {
        !matches!(self, Detection::NotDetected)
    }
}

/// Terminal state of one pending exchange.
enum Exchange {
    Resolved(RelayMessage),
    TimedOut,
    Undeliverable,
    Saturated,
}

struct CallerState {
    detected: AtomicBool,
    pending: Mutex<PendingTable>,
    log: Mutex<DiagnosticLog>,
}

impl CallerState {
    fn pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self) -> MutexGuard<'_, DiagnosticLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, msg: RelayMessage) {
        if !msg.is_reply() {
            debug!("Caller ignoring non-reply message {}", msg.correlation_id());
            return;
        }
        let waiter = self.pending().remove(msg.correlation_id());
        match waiter {
            Some(tx) => {
                // The waiter may have given up between removal and send.
                let _ = tx.send(msg);
            }
            None => {
                debug!("Dropping late or unknown reply {}", msg.correlation_id());
            }
        }
    }
}

/// Caller side of the relay.
pub struct RelayCaller {
    outbound: tokio::sync::mpsc::UnboundedSender<RelayMessage>,
    state: Arc<CallerState>,
    options: CallerOptions,
    listener: JoinHandle<()>,
}

impl RelayCaller {
    /// Attach to a relay port and start the response listener.
    pub fn connect(port: RelayPort, options: CallerOptions) -> Self {
        let RelayPort { tx, mut rx } = port;
        let state = Arc::new(CallerState {
            detected: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            log: Mutex::new(DiagnosticLog::new(CALLER_LOG_CAPACITY)),
        });

        let listener_state = Arc::clone(&state);
        let listener = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                listener_state.resolve(msg);
            }
            // Channel closed: fail every waiter now instead of at its deadline.
            let dropped = {
                let mut pending = listener_state.pending();
                let n = pending.len();
                pending.clear();
                n
            };
            debug!("Caller listener stopped, released {} pending request(s)", dropped);
        });

        Self {
            outbound: tx,
            state,
            options,
            listener,
        }
    }

    /// Find the executor. Never fails; absence is reported as
    /// [`Detection::NotDetected`].
    pub async fn detect(&self) -> Detection {
        if self.state.detected.load(Ordering::SeqCst) {
            return Detection::Cached;
        }
        if self.options.injected_marker {
            self.state.detected.store(true, Ordering::SeqCst);
            info!("Executor detected via injected marker");
            return Detection::Marker;
        }

        let id = new_correlation_id();
        let msg = RelayMessage::TallyDetect {
            correlation_id: id.clone(),
        };
        match self.exchange(id, msg, self.options.detect_timeout).await {
            Exchange::Resolved(RelayMessage::TallyDetected { version, .. }) => {
                self.state.detected.store(true, Ordering::SeqCst);
                info!("Executor detected, version {}", version);
                Detection::Handshake { version }
            }
            Exchange::Resolved(other) => {
                warn!("Unexpected reply to detection: {:?}", other);
                self.record("Detection received an unexpected reply");
                Detection::NotDetected
            }
            Exchange::TimedOut | Exchange::Undeliverable | Exchange::Saturated => {
                self.record(format!(
                    "Executor not detected within {} ms",
                    self.options.detect_timeout.as_millis()
                ));
                Detection::NotDetected
            }
        }
    }

    /// Like [`detect`](Self::detect) but maps absence to `DETECTION_TIMED_OUT`.
    pub async fn ensure_detected(&self) -> Result<Detection, RelayError> {
        match self.detect().await {
            Detection::NotDetected => Err(RelayError::new(
                ErrorKind::DetectionTimedOut,
                format!(
                    "executor not detected within {} ms",
                    self.options.detect_timeout.as_millis()
                ),
            )),
            found => Ok(found),
        }
    }

    pub fn is_detected(&self) -> bool {
        self.state.detected.load(Ordering::SeqCst)
    }

    /// Issue one operation with the default request timeout.
    pub async fn request(&self, op: RelayOp) -> Result<RelayResult, RelayError> {
        self.request_with_timeout(op, self.options.request_timeout)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        op: RelayOp,
        timeout: Duration,
    ) -> Result<RelayResult, RelayError> {
        let kind = op.kind_name();
        let id = new_correlation_id();
        let msg = RelayMessage::TallyApiRequest(RelayRequest {
            correlation_id: id.clone(),
            op,
            timestamp_issued: Utc::now(),
        });

        let err = match self.exchange(id, msg, timeout).await {
            Exchange::Resolved(RelayMessage::TallyApiResponse(resp)) => match resp.outcome {
                RelayOutcome::Result(result) => return Ok(result),
                RelayOutcome::Error(e) => e,
            },
            Exchange::Resolved(other) => RelayError::new(
                ErrorKind::MalformedPayload,
                format!("{kind}: unexpected reply {other:?}"),
            ),
            Exchange::TimedOut => RelayError::new(
                ErrorKind::RequestTimeout,
                format!("{kind} timed out after {} ms", timeout.as_millis()),
            ),
            Exchange::Undeliverable => RelayError::new(
                ErrorKind::RequestTimeout,
                format!("{kind} could not be delivered, relay closed"),
            ),
            Exchange::Saturated => RelayError::new(
                ErrorKind::RequestTimeout,
                format!("{kind} rejected, too many requests in flight"),
            ),
        };
        warn!("Relay request failed: {}", err);
        self.record(err.to_string());
        Err(err)
    }

    async fn exchange(&self, id: String, msg: RelayMessage, timeout: Duration) -> Exchange {
        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.state.pending();
            if let Some(cap) = self.options.max_in_flight {
                if pending.len() >= cap {
                    return Exchange::Saturated;
                }
            }
            pending.insert(id.clone(), tx);
        }

        if self.outbound.send(msg).is_err() {
            self.state.pending().remove(&id);
            return Exchange::Undeliverable;
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(reply)) => Exchange::Resolved(reply),
            Ok(Err(_)) => Exchange::Undeliverable,
            Err(_) => {
                let removed = self.state.pending().remove(&id).is_some();
                if removed {
                    Exchange::TimedOut
                } else {
                    // The listener claimed the entry first; its reply wins.
                    match rx.try_recv() {
                        Ok(reply) => Exchange::Resolved(reply),
                        Err(_) => Exchange::TimedOut,
                    }
                }
            }
        }
    }

    /// Number of requests awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.state.pending().len()
    }

    /// Copy of this caller's diagnostic log.
    pub fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.state.log().snapshot()
    }

    fn record(&self, message: impl Into<String>) {
        self.state.log().push(message);
    }

    // ------------------------------------------------------------------------
    // Typed operations
    // ------------------------------------------------------------------------

    pub async fn probe(&self) -> Result<bool, RelayError> {
        match self.request(RelayOp::Probe).await? {
            RelayResult::Alive(alive) => Ok(alive),
            other => Err(unexpected("PROBE", other)),
        }
    }

    pub async fn list_companies(&self) -> Result<Vec<Company>, RelayError> {
        match self.request(RelayOp::ListCompanies).await? {
            RelayResult::Companies(companies) => Ok(companies),
            other => Err(unexpected("LIST_COMPANIES", other)),
        }
    }

    pub async fn list_ledgers(&self, company: &str) -> Result<Vec<LedgerAccount>, RelayError> {
        let op = RelayOp::ListLedgers {
            company: company.to_string(),
        };
        match self.request(op).await? {
            RelayResult::Ledgers(ledgers) => Ok(ledgers),
            other => Err(unexpected("LIST_LEDGERS", other)),
        }
    }

    pub async fn list_outstanding_bills(
        &self,
        company: &str,
    ) -> Result<Vec<OutstandingBill>, RelayError> {
        let op = RelayOp::ListOutstandingBills {
            company: company.to_string(),
        };
        match self.request(op).await? {
            RelayResult::Bills(bills) => Ok(bills),
            other => Err(unexpected("LIST_OUTSTANDING_BILLS", other)),
        }
    }

    pub async fn sync_dealers(&self, company: &str) -> Result<Vec<DealerRecord>, RelayError> {
        let op = RelayOp::SyncDealers {
            company: company.to_string(),
        };
        match self.request(op).await? {
            RelayResult::Dealers(dealers) => Ok(dealers),
            other => Err(unexpected("SYNC_DEALERS", other)),
        }
    }

    pub async fn get_config(&self) -> Result<BridgeConfig, RelayError> {
        match self.request(RelayOp::GetConfig).await? {
            RelayResult::Config(config) => Ok(config),
            other => Err(unexpected("GET_CONFIG", other)),
        }
    }

    pub async fn set_config(&self, config: BridgeConfig) -> Result<BridgeConfig, RelayError> {
        match self.request(RelayOp::SetConfig(config)).await? {
            RelayResult::Config(config) => Ok(config),
            other => Err(unexpected("SET_CONFIG", other)),
        }
    }

    /// The executor's diagnostic log (not this caller's).
    pub async fn get_diagnostics(&self) -> Result<Vec<DiagnosticEntry>, RelayError> {
        match self.request(RelayOp::GetDiagnostics).await? {
            RelayResult::Diagnostics(entries) => Ok(entries),
            other => Err(unexpected("GET_DIAGNOSTICS", other)),
        }
    }

    pub async fn clear_diagnostics(&self) -> Result<(), RelayError> {
        match self.request(RelayOp::ClearDiagnostics).await? {
            RelayResult::Ack => Ok(()),
            other => Err(unexpected("CLEAR_DIAGNOSTICS", other)),
        }
    }
}

impl Drop for RelayCaller {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn unexpected(kind: &str, result: RelayResult) -> RelayError {
    RelayError::new(
        ErrorKind::MalformedPayload,
        format!("{kind}: unexpected result {result:?}"),
    )
}

// ============================================================================
// Tests
// ============================================================================
