//! Tally request envelope encoder.
//!
//! Builds the three `ENVELOPE` export requests the bridge sends: the company
//! list, a company's ledger list, and a company's outstanding receivable
//! bills. Every envelope is a fixed template; only the company name varies.

use std::borrow::Cow;

use crate::protocol::collections;

// ============================================================================
// Options
// ============================================================================

/// Controls how interpolated values are written into envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeOptions {
    /// Escape `& < > " '` in company names. When `false`, names are written
    /// verbatim, which is byte-compatible with older bridge builds but lets a
    /// company name inject markup into the request.
    pub escape_company_names: bool,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            escape_company_names: true,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Escape the five XML special characters.
pub fn escape_xml(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 16);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn company_var(company: &str, opts: EnvelopeOptions) -> Cow<'_, str> {
    if opts.escape_company_names {
        escape_xml(company)
    } else {
        Cow::Borrowed(company)
    }
}

/// Wrap a collection definition in the standard export envelope.
fn collection_envelope(collection_id: &str, static_vars: &str, tdl_collection: &str) -> String {
    format!(
        "<ENVELOPE>\
<HEADER>\
<VERSION>1</VERSION>\
<TALLYREQUEST>Export</TALLYREQUEST>\
<TYPE>Collection</TYPE>\
<ID>{collection_id}</ID>\
</HEADER>\
<BODY>\
<DESC>\
<STATICVARIABLES>\
<SVEXPORTFORMAT>$$SysName:XML</SVEXPORTFORMAT>\
{static_vars}\
</STATICVARIABLES>\
<TDL>\
<TDLMESSAGE>\
{tdl_collection}\
</TDLMESSAGE>\
</TDL>\
</DESC>\
</BODY>\
</ENVELOPE>"
    )
}

// ============================================================================
// Envelopes
// ============================================================================

/// Envelope requesting every company loaded in Tally.
///
/// Also used as the liveness probe: it is the cheapest request Tally answers.
pub fn company_list_envelope() -> String {
    collection_envelope(
        collections::COMPANIES,
        "",
        "<COLLECTION NAME=\"List of Companies\" ISMODIFY=\"No\">\
<TYPE>Company</TYPE>\
<FETCH>NAME, STARTINGFROM, BOOKSFROM</FETCH>\
</COLLECTION>",
    )
}

/// Envelope requesting all ledgers of `company`.
pub fn ledger_list_envelope(company: &str) -> String {
    ledger_list_envelope_with(company, EnvelopeOptions::default())
}

pub fn ledger_list_envelope_with(company: &str, opts: EnvelopeOptions) -> String {
    let company = company_var(company, opts);
    collection_envelope(
        collections::LEDGERS,
        &format!("<SVCURRENTCOMPANY>{company}</SVCURRENTCOMPANY>"),
        "<COLLECTION NAME=\"Ledgers\" ISMODIFY=\"No\">\
<TYPE>Ledger</TYPE>\
<FETCH>NAME, PARENT, LEDSTATENAME, CLOSINGBALANCE</FETCH>\
</COLLECTION>",
    )
}

/// Envelope requesting the outstanding receivable bills of `company`.
pub fn outstanding_bills_envelope(company: &str) -> String {
    outstanding_bills_envelope_with(company, EnvelopeOptions::default())
}

pub fn outstanding_bills_envelope_with(company: &str, opts: EnvelopeOptions) -> String {
    let company = company_var(company, opts);
    collection_envelope(
        collections::BILLS_RECEIVABLE,
        &format!("<SVCURRENTCOMPANY>{company}</SVCURRENTCOMPANY>"),
        "<COLLECTION NAME=\"Bills Receivable\" ISMODIFY=\"No\">\
<TYPE>Bill</TYPE>\
<CHILDOF>$$GroupSundryDebtors</CHILDOF>\
<FETCH>NAME, PARENT, PARTYLEDGERNAME, BILLDATE, CLOSINGBALANCE</FETCH>\
<FILTERS>IsOutstanding</FILTERS>\
</COLLECTION>\
<SYSTEM TYPE=\"Formulae\" NAME=\"IsOutstanding\">$$IsDr:$ClosingBalance</SYSTEM>",
    )
}

// ============================================================================
// Tests
// ============================================================================
