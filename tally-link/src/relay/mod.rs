//! Correlated request/response relay.
//!
//! Three roles share one message schema:
//!
//! - **Caller** issues operations and waits for matching replies.
//! - **Forwarder** copies messages between two channels unchanged.
//! - **Executor** (in the bridge binary) performs operations against Tally.
//!
//! Roles talk over [`RelayPort`]s, each a sending half plus a receiving half.

pub mod caller;
pub mod diagnostics;
pub mod forwarder;
pub mod messages;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub use caller::{CallerOptions, Detection, RelayCaller};
pub use diagnostics::{DiagnosticEntry, DiagnosticLog};
pub use forwarder::Forwarder;
pub use messages::{
    new_correlation_id, BridgeConfig, RelayError, RelayMessage, RelayOp, RelayOutcome,
    RelayRequest, RelayResponse, RelayResult,
};

/// One end of a relay channel.
#[derive(Debug)]
pub struct RelayPort {
    pub tx: UnboundedSender<RelayMessage>,
    pub rx: UnboundedReceiver<RelayMessage>,
}

impl RelayPort {
    /// Two connected ends: what one sends, the other receives.
    pub fn pair() -> (RelayPort, RelayPort) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            RelayPort { tx: a_tx, rx: b_rx },
            RelayPort { tx: b_tx, rx: a_rx },
        )
    }
}
