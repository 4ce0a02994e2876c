//! Reconciliation engine: joins ledgers and outstanding bills into dealer
//! records.
//!
//! Pure and deterministic. The join is exact and case-sensitive on the
//! ledger name; no trimming or case folding is applied.

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::models::{BillLine, DealerRecord, LedgerAccount, OutstandingBill};
use crate::protocol::SUNDRY_DEBTORS;

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{10,14}").expect("phone regex"))
}

/// First run of 10-14 consecutive digits in `text`, or an empty string.
pub fn extract_phone_number(text: &str) -> String {
    phone_regex()
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Build one dealer record per Sundry Debtors ledger, in ledger order.
///
/// Ledgers without matching bills are kept with an empty bill list. Bills
/// keep their input order within each record.
pub fn reconcile(ledgers: &[LedgerAccount], bills: &[OutstandingBill]) -> Vec<DealerRecord> {
    ledgers
        .iter()
        .filter(|l| l.parent_group == SUNDRY_DEBTORS)
        .map(|ledger| {
            let lines: Vec<BillLine> = bills
                .iter()
                .filter(|b| b.party_ledger_name == ledger.name)
                .map(|b| BillLine {
                    bill_number: b.bill_reference.clone(),
                    bill_date: b.bill_date.clone(),
                    bill_amount: b.amount,
                })
                .collect();

            let total_amount = if lines.is_empty() {
                ledger.closing_balance
            } else {
                lines.iter().map(|l| l.bill_amount).sum::<Decimal>()
            };

            DealerRecord {
                company_name: ledger.name.clone(),
                phone_number: extract_phone_number(&ledger.state_name),
                total_amount,
                bills: lines,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
