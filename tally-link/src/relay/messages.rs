//! Relay message schema.
//!
//! Discriminated-union messages exchanged between the Caller, Forwarder and
//! Executor roles. On the wire every message is a JSON object tagged by
//! `"type"`:
//!
//! | type                 | fields                                                   |
//! |----------------------|----------------------------------------------------------|
//! | `TALLY_DETECT`       | `correlationId`                                          |
//! | `TALLY_DETECTED`     | `correlationId`, `version`                               |
//! | `TALLY_API_REQUEST`  | `correlationId`, `kind`, `payload`, `timestampIssued`    |
//! | `TALLY_API_RESPONSE` | `correlationId`, `result` or `error`                     |
//!
//! Requests carry a semantic operation (`kind` + `payload`), never a
//! pre-built XML envelope; the executor owns envelope construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{ErrorKind, TallyError};
use crate::models::{Company, DealerRecord, LedgerAccount, OutstandingBill};
use crate::protocol::DEFAULT_ENDPOINT;
use crate::relay::diagnostics::DiagnosticEntry;

// ============================================================================
// Configuration
// ============================================================================

/// Executor configuration persisted across executor restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Operation requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayOp {
    Probe,
    ListCompanies,
    ListLedgers { company: String },
    ListOutstandingBills { company: String },
    SyncDealers { company: String },
    GetConfig,
    SetConfig(BridgeConfig),
    GetDiagnostics,
    ClearDiagnostics,
}

impl RelayOp {
    /// Wire name of the operation kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RelayOp::Probe => "PROBE",
            RelayOp::ListCompanies => "LIST_COMPANIES",
            RelayOp::ListLedgers { .. } => "LIST_LEDGERS",
            RelayOp::ListOutstandingBills { .. } => "LIST_OUTSTANDING_BILLS",
            RelayOp::SyncDealers { .. } => "SYNC_DEALERS",
            RelayOp::GetConfig => "GET_CONFIG",
            RelayOp::SetConfig(_) => "SET_CONFIG",
            RelayOp::GetDiagnostics => "GET_DIAGNOSTICS",
            RelayOp::ClearDiagnostics => "CLEAR_DIAGNOSTICS",
        }
    }

    /// Whether the operation talks to Tally (and is therefore gated on the
    /// `enabled` flag).
    pub fn needs_network(&self) -> bool {
        matches!(
            self,
            RelayOp::Probe
                | RelayOp::ListCompanies
                | RelayOp::ListLedgers { .. }
                | RelayOp::ListOutstandingBills { .. }
                | RelayOp::SyncDealers { .. }
        )
    }
}

/// Successful operation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayResult {
    Alive(bool),
    Companies(Vec<Company>),
    Ledgers(Vec<LedgerAccount>),
    Bills(Vec<OutstandingBill>),
    Dealers(Vec<DealerRecord>),
    Config(BridgeConfig),
    Diagnostics(Vec<DiagnosticEntry>),
    Ack,
}

/// Structured failure carried back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RelayError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RelayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<TallyError> for RelayError {
    fn from(e: TallyError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayOutcome {
    Result(RelayResult),
    Error(RelayError),
}

impl From<Result<RelayResult, RelayError>> for RelayOutcome {
    fn from(r: Result<RelayResult, RelayError>) -> Self {
        match r {
            Ok(v) => RelayOutcome::Result(v),
            Err(e) => RelayOutcome::Error(e),
        }
    }
}

// ============================================================================
// Envelopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub correlation_id: String,
    #[serde(flatten)]
    pub op: RelayOp,
    pub timestamp_issued: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub correlation_id: String,
    #[serde(flatten)]
    pub outcome: RelayOutcome,
}

/// A message on the relay channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayMessage {
    TallyDetect {
        #[serde(rename = "correlationId")]
        correlation_id: String,
    },
    TallyDetected {
        #[serde(rename = "correlationId")]
        correlation_id: String,
        version: String,
    },
    TallyApiRequest(RelayRequest),
    TallyApiResponse(RelayResponse),
}

impl RelayMessage {
    pub fn correlation_id(&self) -> &str {
        match self {
            RelayMessage::TallyDetect { correlation_id }
            | RelayMessage::TallyDetected { correlation_id, .. } => correlation_id,
            RelayMessage::TallyApiRequest(r) => &r.correlation_id,
            RelayMessage::TallyApiResponse(r) => &r.correlation_id,
        }
    }

    /// Detected/response messages travel executor -> caller.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            RelayMessage::TallyDetected { .. } | RelayMessage::TallyApiResponse(_)
        )
    }

    pub fn response(correlation_id: impl Into<String>, outcome: impl Into<RelayOutcome>) -> Self {
        RelayMessage::TallyApiResponse(RelayResponse {
            correlation_id: correlation_id.into(),
            outcome: outcome.into(),
        })
    }
}

/// Fresh correlation id, unique for the lifetime of any pending table.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Tests
// ============================================================================
