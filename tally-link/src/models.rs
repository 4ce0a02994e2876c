//! Tally data models.
//!
//! Typed records produced by the protocol client and the reconciliation
//! engine. All serialize with camelCase field names for the dashboard.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Upstream entities
// ============================================================================

/// A company loaded in Tally. Identity is the (case-sensitive) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub name: String,
    pub books_start_date: Option<NaiveDate>,
}

/// A ledger account within a company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    pub name: String,
    pub parent_group: String,
    /// Free text; dealers often keep a phone number in here.
    pub state_name: String,
    /// Server-reported balance, zero when Tally omits it.
    #[serde(default)]
    pub closing_balance: Decimal,
}

/// An outstanding receivable bill. Identity is
/// `(party_ledger_name, bill_reference)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutstandingBill {
    pub party_ledger_name: String,
    pub bill_reference: String,
    pub bill_date: String,
    pub amount: Decimal,
}

// ============================================================================
// Reconciliation output
// ============================================================================

/// One bill line inside a dealer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillLine {
    pub bill_number: String,
    pub bill_date: String,
    pub bill_amount: Decimal,
}

/// Denormalized dealer record built fresh on every sync.
///
/// When `bills` is non-empty, `total_amount` is exactly their sum. With no
/// bills it carries the ledger's server-reported balance instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerRecord {
    pub company_name: String,
    /// Extracted digits, empty if none were found.
    pub phone_number: String,
    pub total_amount: Decimal,
    pub bills: Vec<BillLine>,
}
