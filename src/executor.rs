//! Executor: performs relay operations against Tally.
//!
//! Owns the protocol client, the persisted configuration and the executor
//! diagnostic log. Relay sessions and the HTTP surface both go through
//! [`Executor::dispatch`], so gating, logging and error mapping happen in
//! one place.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tally_link::protocol::{DEFAULT_ENDPOINT, EXECUTOR_LOG_CAPACITY};
use tally_link::{
    BridgeConfig, ClientTimeouts, DiagnosticEntry, DiagnosticLog, RelayError, RelayMessage,
    RelayOp, RelayPort, RelayResult, TallyClient, TallyError,
};
use tracing::{debug, info, warn};

use crate::config::{ensure_defaults, ConfigError, ConfigStore};

/// Version reported in detection handshakes.
pub const EXECUTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

struct Active {
    config: BridgeConfig,
    client: TallyClient,
}

pub struct Executor {
    active: RwLock<Active>,
    store: Box<dyn ConfigStore>,
    log: Mutex<DiagnosticLog>,
    timeouts: ClientTimeouts,
}

impl Executor {
    /// Load (or seed) the configuration and build the client for it.
    pub fn activate(store: Box<dyn ConfigStore>, seed: BridgeConfig) -> Result<Self, ConfigError> {
        Self::activate_with_timeouts(store, seed, ClientTimeouts::default())
    }

    pub fn activate_with_timeouts(
        store: Box<dyn ConfigStore>,
        seed: BridgeConfig,
        timeouts: ClientTimeouts,
    ) -> Result<Self, ConfigError> {
        let config = ensure_defaults(store.as_ref(), seed)?;
        info!(
            "Executor active: enabled={}, endpoint={}",
            config.enabled, config.endpoint
        );
        let client = TallyClient::new(config.endpoint.clone()).with_timeouts(timeouts);
        Ok(Self {
            active: RwLock::new(Active { config, client }),
            store,
            log: Mutex::new(DiagnosticLog::new(EXECUTOR_LOG_CAPACITY)),
            timeouts,
        })
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn config(&self) -> BridgeConfig {
        self.read_active().config.clone()
    }

    fn snapshot(&self) -> (BridgeConfig, TallyClient) {
        let active = self.read_active();
        (active.config.clone(), active.client.clone())
    }

    fn read_active(&self) -> std::sync::RwLockReadGuard<'_, Active> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self) -> MutexGuard<'_, DiagnosticLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        self.log().snapshot()
    }

    pub fn clear_diagnostics(&self) {
        self.log().clear();
    }

    /// Persist `config`, then switch the client to its endpoint.
    fn apply_config(&self, config: BridgeConfig) -> Result<BridgeConfig, TallyError> {
        let endpoint = config.endpoint.trim();
        let config = BridgeConfig {
            enabled: config.enabled,
            endpoint: if endpoint.is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                endpoint.to_string()
            },
        };
        self.store.save(&config)?;

        let client = TallyClient::new(config.endpoint.clone()).with_timeouts(self.timeouts);
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *active = Active {
            config: config.clone(),
            client,
        };
        info!(
            "Configuration updated: enabled={}, endpoint={}",
            config.enabled, config.endpoint
        );
        Ok(config)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Perform one operation. Network operations fail with `DISABLED`
    /// before any I/O when the integration is switched off.
    pub async fn dispatch(&self, op: RelayOp) -> Result<RelayResult, RelayError> {
        let (config, client) = self.snapshot();
        let kind = op.kind_name();

        if op.needs_network() && !config.enabled {
            debug!("{} refused: integration disabled", kind);
            return Err(TallyError::Disabled.into());
        }

        let outcome: Result<RelayResult, TallyError> = match op {
            RelayOp::Probe => {
                let alive = client.probe_liveness(client.timeouts().probe).await;
                if !alive {
                    let e = TallyError::Unreachable(format!(
                        "no Tally server answering at {}",
                        client.endpoint()
                    ));
                    warn!("{} failed: {}", kind, e);
                    self.log().push(format!("{kind} failed ({}): {e}", e.kind()));
                }
                Ok(RelayResult::Alive(alive))
            }
            RelayOp::ListCompanies => client.list_companies().await.map(RelayResult::Companies),
            RelayOp::ListLedgers { company } => {
                client.list_ledgers(&company).await.map(RelayResult::Ledgers)
            }
            RelayOp::ListOutstandingBills { company } => client
                .list_outstanding_bills(&company)
                .await
                .map(RelayResult::Bills),
            RelayOp::SyncDealers { company } => {
                client.fetch_dealers(&company).await.map(RelayResult::Dealers)
            }
            RelayOp::GetConfig => Ok(RelayResult::Config(config)),
            RelayOp::SetConfig(new) => self.apply_config(new).map(RelayResult::Config),
            RelayOp::GetDiagnostics => Ok(RelayResult::Diagnostics(self.diagnostics())),
            RelayOp::ClearDiagnostics => {
                self.clear_diagnostics();
                Ok(RelayResult::Ack)
            }
        };

        outcome.map_err(|e| {
            warn!("{} failed: {}", kind, e);
            self.log().push(format!("{kind} failed ({}): {e}", e.kind()));
            RelayError::from(e)
        })
    }

    // ========================================================================
    // Relay sessions
    // ========================================================================

    /// Open a relay session. The returned port is the far end: send
    /// requests on its `tx`, read replies from its `rx`.
    pub fn connect(self: &Arc<Self>) -> RelayPort {
        let (outside, inside) = RelayPort::pair();
        tokio::spawn(Arc::clone(self).serve_session(inside));
        outside
    }

    async fn serve_session(self: Arc<Self>, port: RelayPort) {
        let RelayPort { tx, mut rx } = port;
        debug!("Executor session opened");

        while let Some(msg) = rx.recv().await {
            match msg {
                RelayMessage::TallyDetect { correlation_id } => {
                    let _ = tx.send(RelayMessage::TallyDetected {
                        correlation_id,
                        version: EXECUTOR_VERSION.to_string(),
                    });
                }
                RelayMessage::TallyApiRequest(req) => {
                    let executor = Arc::clone(&self);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let outcome = executor.dispatch(req.op).await;
                        if tx
                            .send(RelayMessage::response(req.correlation_id, outcome))
                            .is_err()
                        {
                            debug!("Session closed before reply could be sent");
                        }
                    });
                }
                other => {
                    debug!("Executor ignoring reply {}", other.correlation_id());
                }
            }
        }
        debug!("Executor session closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
