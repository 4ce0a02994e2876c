//! Forwarder role: a verbatim bridge between two relay ports.
//!
//! The forwarder holds no correlation state. It moves each message
//! unchanged from one side to the other, in arrival order per direction,
//! and stops a direction once either of its ends closes.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::relay::messages::RelayMessage;
use crate::relay::RelayPort;

pub struct Forwarder {
    to_executor: JoinHandle<()>,
    to_caller: JoinHandle<()>,
}

impl Forwarder {
    /// Bridge `caller_side` (facing the caller) with `executor_side`
    /// (facing the executor).
    pub fn spawn(caller_side: RelayPort, executor_side: RelayPort) -> Self {
        let to_executor = tokio::spawn(pump(caller_side.rx, executor_side.tx, "caller->executor"));
        let to_caller = tokio::spawn(pump(executor_side.rx, caller_side.tx, "executor->caller"));
        Self {
            to_executor,
            to_caller,
        }
    }

    /// Wait until both directions have stopped.
    pub async fn join(self) {
        let _ = self.to_executor.await;
        let _ = self.to_caller.await;
    }

    pub fn abort(&self) {
        self.to_executor.abort();
        self.to_caller.abort();
    }
}

async fn pump(
    mut rx: UnboundedReceiver<RelayMessage>,
    tx: UnboundedSender<RelayMessage>,
    direction: &'static str,
) {
    while let Some(msg) = rx.recv().await {
        trace!("Forwarding {} {}", direction, msg.correlation_id());
        if tx.send(msg).is_err() {
            break;
        }
    }
    debug!("Forwarder {} stopped", direction);
}
