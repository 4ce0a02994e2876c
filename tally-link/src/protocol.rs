//! Tally XML-over-HTTP protocol constants.
//!
//! Endpoint defaults, timeouts, collection names and the tag/field names of
//! the Tally export dialect that the codec and client rely on.

use std::time::Duration;

// ============================================================================
// Transport
// ============================================================================

/// Default Tally HTTP server address (Tally's built-in ODBC/XML port).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:9000";

/// Content type sent with every envelope.
pub const CONTENT_TYPE_XML: &str = "text/xml";

/// Timeout for the liveness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(4);

/// Timeout for a data fetch (company/ledger/bill collections).
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Relay
// ============================================================================

/// Bounded wait for a `TALLY_DETECTED` reply.
pub const DETECT_TIMEOUT: Duration = Duration::from_millis(1200);

/// Default wait for a relayed API response.
///
/// Must exceed two probe+fetch round trips, since a dealer sync fetches
/// ledgers and bills back to back.
pub const RELAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the executor-side diagnostic ring.
pub const EXECUTOR_LOG_CAPACITY: usize = 25;

/// Capacity of the caller-side diagnostic ring.
pub const CALLER_LOG_CAPACITY: usize = 20;

// ============================================================================
// Reconciliation
// ============================================================================

/// Parent group identifying trade-receivable counterparties.
pub const SUNDRY_DEBTORS: &str = "Sundry Debtors";

// ============================================================================
// Collections
// ============================================================================

/// Collection names used in the export requests.
pub mod collections {
    pub const COMPANIES: &str = "List of Companies";
    pub const LEDGERS: &str = "Ledgers";
    pub const BILLS_RECEIVABLE: &str = "Bills Receivable";
}

// ============================================================================
// Tags
// ============================================================================

/// Element and attribute names of the Tally export dialect.
pub mod tags {
    pub const COMPANY: &str = "COMPANY";
    pub const LEDGER: &str = "LEDGER";
    pub const BILL: &str = "BILL";

    pub const NAME: &str = "NAME";
    pub const STARTINGFROM: &str = "STARTINGFROM";
    pub const BOOKSFROM: &str = "BOOKSFROM";

    pub const PARENT: &str = "PARENT";
    pub const LEDSTATENAME: &str = "LEDSTATENAME";
    pub const STATENAME: &str = "STATENAME";
    pub const CLOSINGBALANCE: &str = "CLOSINGBALANCE";

    pub const PARTYLEDGERNAME: &str = "PARTYLEDGERNAME";
    pub const BILLDATE: &str = "BILLDATE";
    pub const AMOUNT: &str = "AMOUNT";

    pub const LINEERROR: &str = "LINEERROR";
}

/// Tags that always decode as an ordered sequence, even with one instance.
///
/// Tally collapses a single-entry collection to a bare element.
pub const COLLECTION_TAGS: &[&str] = &[tags::COMPANY, tags::LEDGER, tags::BILL];
