//! tally-link -- Rust client and relay for the Tally ERP XML-over-HTTP gateway.
//!
//! Builds Tally collection envelopes, posts them to a Tally instance,
//! normalizes the XML replies into typed records, and reconciles ledgers
//! with outstanding bills into dealer summaries. The [`relay`] module lets a
//! sandboxed caller reach Tally through a forwarder and an executor.
//!
//! ## Modules
//!
//! - [`models`] -- Company, ledger, bill and dealer records
//! - [`protocol`] -- Endpoint defaults, timeouts, collection ids and tag names
//! - [`errors`] -- Error kinds and the library error type
//! - [`encoder`] -- Request envelope construction
//! - [`decoder`] -- XML response normalization
//! - [`client`] -- TallyClient (main API entry point)
//! - [`reconcile`] -- Ledger/bill join and phone extraction
//! - [`relay`] -- Correlated Caller / Forwarder message relay

pub mod client;
pub mod decoder;
pub mod encoder;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod reconcile;
pub mod relay;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use errors::{ErrorKind, TallyError};

pub use models::{BillLine, Company, DealerRecord, LedgerAccount, OutstandingBill};

pub use client::{ClientTimeouts, TallyClient};
pub use decoder::{decode_envelope, XmlNode, XmlValue};
pub use encoder::EnvelopeOptions;
pub use reconcile::{extract_phone_number, reconcile};

pub use relay::{
    BridgeConfig, CallerOptions, Detection, DiagnosticEntry, DiagnosticLog, Forwarder,
    RelayCaller, RelayError, RelayMessage, RelayOp, RelayPort, RelayResult,
};
