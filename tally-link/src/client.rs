//! Tally protocol client.
//!
//! `TallyClient` owns a single upstream address and exposes liveness probing
//! plus the typed collection fetches the bridge needs. Every data operation
//! probes first and fails fast with `Unreachable` when Tally is not
//! answering, so a dead server costs at most one probe timeout.
//!
//! Decoded entries are coerced field by field: strings fall back to empty,
//! numbers to zero, and a field arriving as a nested structure degrades to
//! its stringified form rather than failing the whole collection.

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::decoder::{decode_envelope, XmlNode, XmlValue};
use crate::encoder::{
    company_list_envelope, ledger_list_envelope_with, outstanding_bills_envelope_with,
    EnvelopeOptions,
};
use crate::errors::{Result, TallyError};
use crate::models::{Company, DealerRecord, LedgerAccount, OutstandingBill};
use crate::protocol::{tags, CONTENT_TYPE_XML, DEFAULT_ENDPOINT, FETCH_TIMEOUT, PROBE_TIMEOUT};
use crate::reconcile::reconcile;

// ============================================================================
// Timeouts
// ============================================================================

/// Independent per-request timeouts for probe and data fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    pub probe: Duration,
    pub fetch: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            probe: PROBE_TIMEOUT,
            fetch: FETCH_TIMEOUT,
        }
    }
}

// ============================================================================
// TallyClient
// ============================================================================

/// Async client for Tally's XML-over-HTTP interface.
///
/// ## Usage
///
/// ```rust,ignore
/// let client = TallyClient::new("http://localhost:9000");
/// if client.probe_liveness(Duration::from_secs(4)).await {
///     for company in client.list_companies().await? {
///         println!("{}", company.name);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TallyClient {
    endpoint: String,
    http: reqwest::Client,
    timeouts: ClientTimeouts,
    envelope: EnvelopeOptions,
}

impl TallyClient {
    /// Create a client for `endpoint`; an empty endpoint means the default
    /// local Tally address.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_http_client(endpoint, reqwest::Client::new())
    }

    pub fn with_http_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.trim().is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            endpoint.trim().to_string()
        };
        Self {
            endpoint,
            http,
            timeouts: ClientTimeouts::default(),
            envelope: EnvelopeOptions::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_envelope_options(mut self, envelope: EnvelopeOptions) -> Self {
        self.envelope = envelope;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeouts(&self) -> ClientTimeouts {
        self.timeouts
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    /// Check whether Tally answers a minimal company-list request within
    /// `timeout`. Never fails: every error collapses to `false`.
    ///
    /// A well-formed `LINEERROR` reply still counts as alive; the server
    /// answered, it just refused the request.
    pub async fn probe_liveness(&self, timeout: Duration) -> bool {
        match self.post_envelope(company_list_envelope(), timeout).await {
            Ok(text) => match decode_envelope(&text) {
                Ok(_) | Err(TallyError::UpstreamRejected { .. }) => true,
                Err(e) => {
                    tracing::debug!(endpoint = %self.endpoint, "probe got unusable payload: {e}");
                    false
                }
            },
            Err(e) => {
                tracing::debug!(endpoint = %self.endpoint, "probe failed: {e}");
                false
            }
        }
    }

    async fn ensure_live(&self) -> Result<()> {
        if self.probe_liveness(self.timeouts.probe).await {
            Ok(())
        } else {
            Err(TallyError::Unreachable(format!(
                "no Tally server answering at {}",
                self.endpoint
            )))
        }
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// List every company loaded in Tally.
    ///
    /// Companies without a discoverable name are kept under a positional
    /// placeholder (`Company <n>`), never dropped.
    pub async fn list_companies(&self) -> Result<Vec<Company>> {
        let doc = self.fetch(company_list_envelope()).await?;
        let companies: Vec<Company> = doc
            .find_all(tags::COMPANY)
            .iter()
            .enumerate()
            .map(|(i, v)| company_from(i, &entry_node(v)))
            .collect();
        tracing::info!(count = companies.len(), "Fetched Tally companies");
        Ok(companies)
    }

    /// List all ledgers of `company`.
    pub async fn list_ledgers(&self, company: &str) -> Result<Vec<LedgerAccount>> {
        let doc = self
            .fetch(ledger_list_envelope_with(company, self.envelope))
            .await?;
        let ledgers: Vec<LedgerAccount> = doc
            .find_all(tags::LEDGER)
            .iter()
            .map(|v| ledger_from(&entry_node(v)))
            .collect();
        tracing::info!(company, count = ledgers.len(), "Fetched Tally ledgers");
        Ok(ledgers)
    }

    /// List the outstanding receivable bills of `company`.
    pub async fn list_outstanding_bills(&self, company: &str) -> Result<Vec<OutstandingBill>> {
        let doc = self
            .fetch(outstanding_bills_envelope_with(company, self.envelope))
            .await?;
        let bills: Vec<OutstandingBill> = doc
            .find_all(tags::BILL)
            .iter()
            .map(|v| bill_from(&entry_node(v)))
            .collect();
        tracing::info!(company, count = bills.len(), "Fetched Tally outstanding bills");
        Ok(bills)
    }

    /// Fetch ledgers and bills for `company` and reconcile them into dealer
    /// records.
    pub async fn fetch_dealers(&self, company: &str) -> Result<Vec<DealerRecord>> {
        let ledgers = self.list_ledgers(company).await?;
        let bills = self.list_outstanding_bills(company).await?;
        let dealers = reconcile(&ledgers, &bills);
        tracing::info!(company, dealers = dealers.len(), "Reconciled dealer records");
        Ok(dealers)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn fetch(&self, envelope: String) -> Result<XmlNode> {
        self.ensure_live().await?;
        let text = self.post_envelope(envelope, self.timeouts.fetch).await?;
        decode_envelope(&text)
    }

    /// POST an envelope and return the response body.
    async fn post_envelope(&self, envelope: String, timeout: Duration) -> Result<String> {
        tracing::debug!(endpoint = %self.endpoint, bytes = envelope.len(), "POST envelope");
        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_XML)
            .timeout(timeout)
            .body(envelope)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TallyError::UpstreamRejected {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(resp.text().await?)
    }
}

// ============================================================================
// Entry coercion
// ============================================================================

/// View a collection entry as a node; a bare text entry is its own `NAME`.
fn entry_node(value: &XmlValue) -> Cow<'_, XmlNode> {
    match value {
        XmlValue::Node(n) => Cow::Borrowed(n),
        XmlValue::Text(t) => {
            let mut node = XmlNode::default();
            node.elements
                .insert(tags::NAME.to_string(), XmlValue::Text(t.clone()));
            Cow::Owned(node)
        }
        XmlValue::List(_) => Cow::Owned(XmlNode::default()),
    }
}

/// `NAME` element, `NAME` attribute, then the first `NAME.LIST/NAME`.
fn resolve_name(node: &XmlNode) -> Option<String> {
    node.field(tags::NAME).or_else(|| {
        node.get("NAME.LIST")
            .and_then(XmlValue::as_node)
            .and_then(|list| list.get(tags::NAME))
            .and_then(|v| v.as_slice().first())
            .map(XmlValue::to_display_string)
            .filter(|s| !s.trim().is_empty())
    })
}

fn company_from(index: usize, node: &XmlNode) -> Company {
    let name = resolve_name(node).unwrap_or_else(|| format!("Company {}", index + 1));
    let books_start_date = node
        .field(tags::STARTINGFROM)
        .or_else(|| node.field(tags::BOOKSFROM))
        .and_then(|s| parse_tally_date(&s));
    Company {
        name,
        books_start_date,
    }
}

fn ledger_from(node: &XmlNode) -> LedgerAccount {
    LedgerAccount {
        name: resolve_name(node).unwrap_or_default(),
        parent_group: node.field(tags::PARENT).unwrap_or_default(),
        state_name: node
            .field(tags::LEDSTATENAME)
            .or_else(|| node.field(tags::STATENAME))
            .unwrap_or_default(),
        closing_balance: coerce_decimal(node.field(tags::CLOSINGBALANCE)),
    }
}

fn bill_from(node: &XmlNode) -> OutstandingBill {
    OutstandingBill {
        party_ledger_name: node
            .field(tags::PARTYLEDGERNAME)
            .or_else(|| node.field(tags::PARENT))
            .unwrap_or_default(),
        bill_reference: resolve_name(node).unwrap_or_default(),
        bill_date: node.field(tags::BILLDATE).unwrap_or_default(),
        amount: coerce_decimal(
            node.field(tags::CLOSINGBALANCE)
                .or_else(|| node.field(tags::AMOUNT)),
        ),
    }
}

/// Numeric coercion with a zero fallback. Thousands separators are ignored.
pub fn coerce_decimal(raw: Option<String>) -> Decimal {
    raw.map(|s| s.replace(',', ""))
        .and_then(|s| Decimal::from_str(s.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Parse the date encodings Tally uses (`20250401`, `2025-04-01`, `1-Apr-2025`).
pub fn parse_tally_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y%m%d", "%Y-%m-%d", "%d-%b-%Y", "%d-%b-%y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const ZYVER_COMPANIES: &str = r#"<ENVELOPE><HEADER><VERSION>1</VERSION><STATUS>1</STATUS></HEADER><BODY><DATA><COLLECTION><COMPANY NAME="Zyver"><STARTINGFROM TYPE="Date">20250401</STARTINGFROM></COMPANY></COLLECTION></DATA></BODY></ENVELOPE>"#;

    const LEDGERS: &str = r#"<ENVELOPE><BODY><DATA><COLLECTION>
<LEDGER NAME="Acme Traders"><PARENT TYPE="String">Sundry Debtors</PARENT><LEDSTATENAME>Maharashtra 9876543210</LEDSTATENAME><CLOSINGBALANCE>-1,250.50</CLOSINGBALANCE></LEDGER>
<LEDGER NAME="Cash"><PARENT>Cash-in-Hand</PARENT><CLOSINGBALANCE>abc</CLOSINGBALANCE></LEDGER>
<LEDGER><NAME.LIST><NAME>Birla Stores</NAME></NAME.LIST><PARENT><GROUP>Odd</GROUP></PARENT></LEDGER>
</COLLECTION></DATA></BODY></ENVELOPE>"#;

    const BILLS: &str = r#"<ENVELOPE><BODY><DATA><COLLECTION>
<BILL NAME="INV-1"><PARENT>Acme Traders</PARENT><BILLDATE>20250410</BILLDATE><CLOSINGBALANCE>500.25</CLOSINGBALANCE></BILL>
<BILL NAME="INV-2"><PARTYLEDGERNAME>Acme Traders</PARTYLEDGERNAME><BILLDATE>20250412</BILLDATE><AMOUNT>750.25</AMOUNT></BILL>
</COLLECTION></DATA></BODY></ENVELOPE>"#;

    struct MockReply {
        status: u16,
        body: String,
        delay: Duration,
    }

    impl MockReply {
        fn ok(body: &str) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                delay: Duration::ZERO,
            }
        }
    }

    async fn read_request_body(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    return String::from_utf8_lossy(&buf[pos + 4..pos + 4 + len]).into_owned();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Mock Tally HTTP server answering every request via `respond`.
    /// Returns the endpoint URL and a request counter.
    async fn mock_tally<F>(respond: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(AtomicUsize::new(0));
        let respond = Arc::new(respond);
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let respond = Arc::clone(&respond);
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    let body = read_request_body(&mut stream).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    let reply = respond(&body);
                    if !reply.delay.is_zero() {
                        tokio::time::sleep(reply.delay).await;
                    }
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        reply.status,
                        if reply.status == 200 { "OK" } else { "Error" },
                        reply.body.len(),
                        reply.body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        tokio::task::yield_now().await;
        (format!("http://127.0.0.1:{port}"), hits)
    }

    /// Answers company-list requests (the probe) with Zyver, everything else
    /// via `data`.
    async fn mock_with_data<F>(data: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        mock_tally(move |body| {
            if body.contains("<ID>List of Companies</ID>") {
                MockReply::ok(ZYVER_COMPANIES)
            } else {
                data(body)
            }
        })
        .await
    }

    async fn closed_port_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    fn fast() -> ClientTimeouts {
        ClientTimeouts {
            probe: Duration::from_millis(500),
            fetch: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn list_companies_happy_path() {
        let (endpoint, hits) = mock_tally(|_| MockReply::ok(ZYVER_COMPANIES)).await;
        let client = TallyClient::new(endpoint);

        let companies = client.list_companies().await.unwrap();
        assert_eq!(
            companies,
            vec![Company {
                name: "Zyver".into(),
                books_start_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            }]
        );
        // probe + fetch
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unnamed_company_gets_positional_placeholder() {
        let xml = r#"<ENVELOPE><COMPANY><STARTINGFROM>bogus</STARTINGFROM></COMPANY><COMPANY><NAME>Second</NAME><BOOKSFROM>1-Apr-2024</BOOKSFROM></COMPANY></ENVELOPE>"#;
        let (endpoint, _) = mock_tally(move |_| MockReply::ok(xml)).await;
        let companies = TallyClient::new(endpoint).list_companies().await.unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].name, "Company 1");
        assert_eq!(companies[0].books_start_date, None);
        assert_eq!(companies[1].name, "Second");
        assert_eq!(companies[1].books_start_date, NaiveDate::from_ymd_opt(2024, 4, 1));
    }

    #[tokio::test]
    async fn list_ledgers_coerces_fields() {
        let (endpoint, _) = mock_with_data(|body| {
            assert!(body.contains("<SVCURRENTCOMPANY>Zyver</SVCURRENTCOMPANY>"));
            MockReply::ok(LEDGERS)
        })
        .await;
        let ledgers = TallyClient::new(endpoint).list_ledgers("Zyver").await.unwrap();

        assert_eq!(ledgers.len(), 3);
        assert_eq!(ledgers[0].name, "Acme Traders");
        assert_eq!(ledgers[0].parent_group, "Sundry Debtors");
        assert_eq!(ledgers[0].state_name, "Maharashtra 9876543210");
        assert_eq!(ledgers[0].closing_balance, Decimal::from_str("-1250.50").unwrap());

        assert_eq!(ledgers[1].closing_balance, Decimal::ZERO);
        assert_eq!(ledgers[1].state_name, "");

        assert_eq!(ledgers[2].name, "Birla Stores");
        assert_eq!(ledgers[2].parent_group, "GROUP=Odd");
    }

    #[tokio::test]
    async fn list_bills_resolves_party_fallbacks() {
        let (endpoint, _) = mock_with_data(|_| MockReply::ok(BILLS)).await;
        let bills = TallyClient::new(endpoint)
            .list_outstanding_bills("Zyver")
            .await
            .unwrap();
        assert_eq!(bills.len(), 2);
        assert_eq!(bills[0].party_ledger_name, "Acme Traders");
        assert_eq!(bills[0].bill_reference, "INV-1");
        assert_eq!(bills[0].amount, Decimal::from_str("500.25").unwrap());
        assert_eq!(bills[1].party_ledger_name, "Acme Traders");
        assert_eq!(bills[1].bill_date, "20250412");
        assert_eq!(bills[1].amount, Decimal::from_str("750.25").unwrap());
    }

    #[tokio::test]
    async fn empty_typed_fields_stay_blank() {
        const SPARSE: &str = r#"<ENVELOPE><BODY><DATA><COLLECTION>
<LEDGER NAME="Acme Traders"><PARENT TYPE="String">Sundry Debtors</PARENT><LEDSTATENAME TYPE="String"></LEDSTATENAME><CLOSINGBALANCE TYPE="Amount"/></LEDGER>
<BILL NAME="INV-7"><PARENT TYPE="String">Acme Traders</PARENT><BILLDATE TYPE="Date"></BILLDATE><AMOUNT TYPE="Amount">10.00</AMOUNT></BILL>
</COLLECTION></DATA></BODY></ENVELOPE>"#;
        let (endpoint, _) = mock_with_data(|_| MockReply::ok(SPARSE)).await;
        let client = TallyClient::new(endpoint);

        let ledgers = client.list_ledgers("Zyver").await.unwrap();
        assert_eq!(ledgers[0].state_name, "");
        assert_eq!(ledgers[0].closing_balance, Decimal::ZERO);

        let bills = client.list_outstanding_bills("Zyver").await.unwrap();
        assert_eq!(bills[0].party_ledger_name, "Acme Traders");
        assert_eq!(bills[0].bill_date, "");
        assert_eq!(bills[0].amount, Decimal::from_str("10.00").unwrap());
    }

    #[tokio::test]
    async fn line_error_reply_counts_as_alive() {
        let (endpoint, _) = mock_tally(|_| {
            MockReply::ok("<ENVELOPE><LINEERROR>Could not find Report 'List of Companies'!</LINEERROR></ENVELOPE>")
        })
        .await;
        let client = TallyClient::new(endpoint).with_timeouts(fast());
        assert!(client.probe_liveness(Duration::from_secs(1)).await);

        match client.list_companies().await {
            Err(TallyError::UpstreamRejected { status, message }) => {
                assert_eq!(status, 200);
                assert!(message.contains("Could not find Report"), "{message}");
            }
            other => panic!("expected UpstreamRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_dealers_reconciles() {
        let (endpoint, hits) = mock_with_data(|body| {
            if body.contains("<TYPE>Ledger</TYPE>") {
                MockReply::ok(LEDGERS)
            } else {
                MockReply::ok(BILLS)
            }
        })
        .await;
        let dealers = TallyClient::new(endpoint).fetch_dealers("Zyver").await.unwrap();
        assert_eq!(dealers.len(), 1);
        assert_eq!(dealers[0].company_name, "Acme Traders");
        assert_eq!(dealers[0].phone_number, "9876543210");
        assert_eq!(dealers[0].total_amount, Decimal::from_str("1250.50").unwrap());
        assert_eq!(dealers[0].bills.len(), 2);
        // two probes + two fetches
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn probe_false_when_nothing_listening() {
        let client = TallyClient::new(closed_port_endpoint().await).with_timeouts(fast());
        assert!(!client.probe_liveness(Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn data_ops_unreachable_when_probe_fails() {
        let client = TallyClient::new(closed_port_endpoint().await).with_timeouts(fast());
        let err = client.list_companies().await.unwrap_err();
        assert!(matches!(err, TallyError::Unreachable(_)), "{err:?}");
        let err = client.list_ledgers("Zyver").await.unwrap_err();
        assert!(matches!(err, TallyError::Unreachable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn probe_false_on_html_page() {
        let (endpoint, _) =
            mock_tally(|_| MockReply::ok("<!DOCTYPE html><html><body>proxy error</body></html>")).await;
        let client = TallyClient::new(endpoint);
        assert!(!client.probe_liveness(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn html_data_response_is_malformed() {
        let (endpoint, _) =
            mock_with_data(|_| MockReply::ok("<!DOCTYPE html><html><body>oops</body></html>")).await;
        let err = TallyClient::new(endpoint).list_ledgers("Zyver").await.unwrap_err();
        assert!(matches!(err, TallyError::MalformedPayload(_)), "{err:?}");
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_rejected() {
        let (endpoint, _) = mock_with_data(|_| MockReply {
            status: 500,
            body: "internal".into(),
            delay: Duration::ZERO,
        })
        .await;
        match TallyClient::new(endpoint).list_outstanding_bills("Zyver").await {
            Err(TallyError::UpstreamRejected { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected UpstreamRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_fetch_is_request_timeout() {
        let (endpoint, _) = mock_with_data(|_| MockReply {
            status: 200,
            body: LEDGERS.into(),
            delay: Duration::from_secs(2),
        })
        .await;
        let client = TallyClient::new(endpoint).with_timeouts(fast());
        let err = client.list_ledgers("Zyver").await.unwrap_err();
        assert!(matches!(err, TallyError::RequestTimeout(_)), "{err:?}");
    }

    #[test]
    fn empty_endpoint_uses_default() {
        assert_eq!(TallyClient::new("").endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(TallyClient::new(" http://10.0.0.5:9000 ").endpoint(), "http://10.0.0.5:9000");
    }

    #[test]
    fn decimal_coercion_falls_back_to_zero() {
        assert_eq!(coerce_decimal(None), Decimal::ZERO);
        assert_eq!(coerce_decimal(Some("n/a".into())), Decimal::ZERO);
        assert_eq!(coerce_decimal(Some(" 12,000.75 ".into())), Decimal::from_str("12000.75").unwrap());
    }

    #[test]
    fn tally_date_formats() {
        let d = NaiveDate::from_ymd_opt(2025, 4, 1);
        assert_eq!(parse_tally_date("20250401"), d);
        assert_eq!(parse_tally_date("2025-04-01"), d);
        assert_eq!(parse_tally_date("1-Apr-2025"), d);
        assert_eq!(parse_tally_date("April"), None);
    }
}
