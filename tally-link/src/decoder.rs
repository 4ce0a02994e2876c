//! Tally response envelope decoder.
//!
//! Parses the loosely structured XML Tally returns into a normalized tree.
//! Callers see element and attribute values as plain strings under their tag
//! names; text-only leaves collapse to `Text`, repeated siblings become
//! `List`, and the collection tags in [`COLLECTION_TAGS`] are always `List`
//! even when Tally emits a single bare element.

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{Result, TallyError};
use crate::protocol::{tags, COLLECTION_TAGS};

// ============================================================================
// Normalized tree
// ============================================================================

/// A decoded value: a scalar string, a nested node, or an ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Text(String),
    Node(XmlNode),
    List(Vec<XmlValue>),
}

/// A decoded element with its child elements and attributes.
///
/// Both maps are keyed by the raw tag/attribute name. Namespace declarations
/// and type annotations on leaves never appear here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub elements: BTreeMap<String, XmlValue>,
    pub attributes: BTreeMap<String, String>,
}

impl XmlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&XmlNode> {
        match self {
            XmlValue::Node(n) => Some(n),
            _ => None,
        }
    }

    /// View this value as a sequence; a non-list is a one-element sequence.
    pub fn as_slice(&self) -> &[XmlValue] {
        match self {
            XmlValue::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Flatten to a string. Nested structures degrade to a readable
    /// `KEY=value` rendering instead of failing.
    pub fn to_display_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for XmlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlValue::Text(s) => f.write_str(s),
            XmlValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            XmlValue::Node(node) => write!(f, "{node}"),
        }
    }
}

impl fmt::Display for XmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let attrs = self.attributes.iter().map(|(k, v)| (k, v.clone()));
        let elems = self.elements.iter().map(|(k, v)| (k, v.to_string()));
        for (key, value) in attrs.chain(elems) {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl XmlNode {
    /// Child element by tag name.
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.elements.get(key)
    }

    /// Attribute value by name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Non-empty text of a child element, stringifying nested values.
    pub fn element_text(&self, key: &str) -> Option<String> {
        self.elements
            .get(key)
            .map(XmlValue::to_display_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Resolve a field from element text first, then the same-named attribute.
    pub fn field(&self, key: &str) -> Option<String> {
        self.element_text(key).or_else(|| {
            self.attribute(key)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    }

    /// Depth-first search for the first element named `tag`.
    ///
    /// Returns its entries as a slice; a missing collection is empty.
    pub fn find_all(&self, tag: &str) -> &[XmlValue] {
        self.find(tag).map(XmlValue::as_slice).unwrap_or(&[])
    }

    /// Depth-first search for the first element named `tag`.
    pub fn find(&self, tag: &str) -> Option<&XmlValue> {
        if let Some(v) = self.elements.get(tag) {
            return Some(v);
        }
        self.elements.values().find_map(|v| find_in_value(v, tag))
    }
}

fn find_in_value<'a>(value: &'a XmlValue, tag: &str) -> Option<&'a XmlValue> {
    match value {
        XmlValue::Text(_) => None,
        XmlValue::Node(n) => n.find(tag),
        XmlValue::List(items) => items.iter().find_map(|v| find_in_value(v, tag)),
    }
}

// ============================================================================
// Payload checks
// ============================================================================

/// True when the payload is an HTML page rather than a Tally envelope.
///
/// Happens when something between us and Tally substitutes an error page.
pub fn looks_like_html(text: &str) -> bool {
    let head: String = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

// ============================================================================
// Decoding
// ============================================================================

/// An element being built while its end tag has not been seen yet.
#[derive(Default)]
struct Frame {
    name: String,
    attributes: BTreeMap<String, String>,
    elements: BTreeMap<String, XmlValue>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = BTreeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if is_namespace_decl(&key) {
                continue;
            }
            let value = strip_control(&attr.unescape_value()?);
            attributes.insert(key, value);
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn insert_child(&mut self, name: String, value: XmlValue) {
        let always_list = COLLECTION_TAGS.contains(&name.as_str());
        match self.elements.remove(&name) {
            None if always_list => {
                self.elements.insert(name, XmlValue::List(vec![value]));
            }
            None => {
                self.elements.insert(name, value);
            }
            Some(XmlValue::List(mut items)) => {
                items.push(value);
                self.elements.insert(name, XmlValue::List(items));
            }
            Some(existing) => {
                self.elements.insert(name, XmlValue::List(vec![existing, value]));
            }
        }
    }

    fn close(self) -> (String, XmlValue) {
        let text = self.text.trim().to_string();
        // Only NAME carries data as an attribute; TYPE="String" and friends
        // are annotations and never turn a leaf into a node.
        let annotations_only = !self.attributes.contains_key(tags::NAME);
        let value = if self.elements.is_empty() && (annotations_only || !text.is_empty()) {
            XmlValue::Text(text)
        } else {
            XmlValue::Node(XmlNode {
                elements: self.elements,
                attributes: self.attributes,
            })
        };
        (self.name, value)
    }
}

fn is_namespace_decl(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

/// Drop control characters Tally uses as "not applicable" markers (`&#4;`).
fn strip_control(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect()
}

/// Decode a raw Tally response into a normalized document node.
///
/// The returned node's elements hold the root element (usually `ENVELOPE`).
/// Fails with `MalformedPayload` for HTML pages, empty bodies and broken XML,
/// and with `UpstreamRejected` when Tally embeds a `LINEERROR`.
pub fn decode_envelope(text: &str) -> Result<XmlNode> {
    if text.trim().is_empty() {
        return Err(TallyError::MalformedPayload("empty response body".into()));
    }
    if looks_like_html(text) {
        return Err(TallyError::MalformedPayload(
            "received an HTML page instead of a Tally XML envelope".into(),
        ));
    }

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = vec![Frame::default()];
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(Frame::open(&e)?);
                saw_root = true;
            }
            Event::Empty(e) => {
                let (name, value) = Frame::open(&e)?.close();
                if let Some(parent) = stack.last_mut() {
                    parent.insert_child(name, value);
                }
                saw_root = true;
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(TallyError::MalformedPayload("unbalanced end tag".into()));
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.close();
                    if let Some(parent) = stack.last_mut() {
                        parent.insert_child(name, value);
                    }
                }
            }
            Event::Text(t) => {
                let unescaped = t.unescape()?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&strip_control(&unescaped));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::DocType(d) => {
                if String::from_utf8_lossy(&d).to_ascii_lowercase().contains("html") {
                    return Err(TallyError::MalformedPayload("HTML doctype in response".into()));
                }
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
        }
    }

    if stack.len() != 1 {
        return Err(TallyError::MalformedPayload(format!(
            "unexpected end of document ({} unclosed element(s))",
            stack.len() - 1
        )));
    }
    if !saw_root {
        return Err(TallyError::MalformedPayload("no root element".into()));
    }

    let doc = stack
        .pop()
        .map(|root| XmlNode {
            elements: root.elements,
            attributes: BTreeMap::new(),
        })
        .unwrap_or_default();

    if let Some(err) = doc.find(tags::LINEERROR) {
        let message = err.to_display_string();
        tracing::warn!(%message, "Tally reported a line error");
        return Err(TallyError::UpstreamRejected {
            status: 200,
            message,
        });
    }

    Ok(doc)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ZYVER_ENVELOPE: &str = r#"<ENVELOPE>
 <HEADER>
  <VERSION>1</VERSION>
  <STATUS>1</STATUS>
 </HEADER>
 <BODY>
  <DESC></DESC>
  <DATA>
   <COLLECTION>
    <COMPANY NAME="Zyver" RESERVEDNAME="">
     <STARTINGFROM TYPE="Date">20250401</STARTINGFROM>
    </COMPANY>
   </COLLECTION>
  </DATA>
 </BODY>
</ENVELOPE>"#;

    #[test]
    fn single_company_decodes_as_list() {
        let doc = decode_envelope(ZYVER_ENVELOPE).unwrap();
        let companies = doc.find("COMPANY").unwrap();
        match companies {
            XmlValue::List(items) => assert_eq!(items.len(), 1),
            other => panic!("expected List, got {other:?}"),
        }
        let company = companies.as_slice()[0].as_node().unwrap();
        assert_eq!(company.attribute("NAME"), Some("Zyver"));
        assert_eq!(company.element_text("STARTINGFROM").as_deref(), Some("20250401"));
    }

    #[test]
    fn collection_tags_always_list_any_cardinality() {
        for n in 0..4 {
            let ledgers: String = (0..n)
                .map(|i| format!("<LEDGER NAME=\"L{i}\"><PARENT>Sundry Debtors</PARENT></LEDGER>"))
                .collect();
            let xml = format!("<ENVELOPE><BODY><DATA><COLLECTION>{ledgers}</COLLECTION></DATA></BODY></ENVELOPE>");
            let doc = decode_envelope(&xml).unwrap();
            assert_eq!(doc.find_all("LEDGER").len(), n);
            if n > 0 {
                assert!(matches!(doc.find("LEDGER"), Some(XmlValue::List(_))));
            }
        }
    }

    #[test]
    fn repeated_plain_tags_become_list() {
        let xml = "<ROOT><ITEM>a</ITEM><ITEM>b</ITEM><ONE>x</ONE></ROOT>";
        let doc = decode_envelope(xml).unwrap();
        let root = doc.get("ROOT").and_then(XmlValue::as_node).unwrap();
        assert_eq!(
            root.get("ITEM"),
            Some(&XmlValue::List(vec![
                XmlValue::Text("a".into()),
                XmlValue::Text("b".into())
            ]))
        );
        assert_eq!(root.get("ONE"), Some(&XmlValue::Text("x".into())));
    }

    #[test]
    fn decode_is_deterministic() {
        let a = decode_envelope(ZYVER_ENVELOPE).unwrap();
        let b = decode_envelope(ZYVER_ENVELOPE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn html_page_rejected_before_parse() {
        let err = decode_envelope("<!DOCTYPE html><html><body>502</body></html>").unwrap_err();
        assert!(matches!(err, TallyError::MalformedPayload(_)), "{err:?}");

        let err = decode_envelope("  \n<HTML><body>oops</body></HTML>").unwrap_err();
        assert!(matches!(err, TallyError::MalformedPayload(_)));
    }

    #[test]
    fn empty_and_broken_payloads_rejected() {
        assert!(matches!(decode_envelope(""), Err(TallyError::MalformedPayload(_))));
        assert!(matches!(decode_envelope("   "), Err(TallyError::MalformedPayload(_))));
        assert!(matches!(
            decode_envelope("<ENVELOPE><BODY></ENVELOPE>"),
            Err(TallyError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_envelope("<ENVELOPE><BODY>"),
            Err(TallyError::MalformedPayload(_))
        ));
        assert!(matches!(decode_envelope("just text"), Err(TallyError::MalformedPayload(_))));
    }

    #[test]
    fn namespace_declarations_and_type_annotations_stripped() {
        let xml = r#"<ENVELOPE xmlns:UDF="TallyUDF"><LEDGER NAME="Acme" xmlns:UDF="TallyUDF"><PARENT TYPE="String">Sundry Debtors</PARENT></LEDGER></ENVELOPE>"#;
        let doc = decode_envelope(xml).unwrap();
        let env = doc.get("ENVELOPE").unwrap();
        assert!(matches!(env, XmlValue::Node(n) if n.attributes.is_empty()));
        let ledger = doc.find_all("LEDGER")[0].as_node().unwrap();
        assert_eq!(ledger.attributes.len(), 1);
        assert_eq!(ledger.attribute("NAME"), Some("Acme"));
        assert_eq!(ledger.get("PARENT"), Some(&XmlValue::Text("Sundry Debtors".into())));
    }

    #[test]
    fn empty_annotated_leaf_is_empty_text() {
        let xml = r#"<ROOT><LEDGER NAME="Acme"><LEDSTATENAME TYPE="String"></LEDSTATENAME><BILLDATE TYPE="Date"/></LEDGER><BILL NAME="INV-9"/></ROOT>"#;
        let doc = decode_envelope(xml).unwrap();
        let ledger = doc.find_all("LEDGER")[0].as_node().unwrap();
        assert_eq!(ledger.get("LEDSTATENAME"), Some(&XmlValue::Text(String::new())));
        assert_eq!(ledger.get("BILLDATE"), Some(&XmlValue::Text(String::new())));
        assert_eq!(ledger.field("LEDSTATENAME"), None);

        // An empty entry named by attribute is still a node.
        let bill = doc.find_all("BILL")[0].as_node().unwrap();
        assert_eq!(bill.attribute("NAME"), Some("INV-9"));
    }

    #[test]
    fn entities_unescaped_and_control_markers_dropped() {
        let xml = "<ROOT><NAME>A &amp; B</NAME><STATE>&#4; Not Applicable</STATE></ROOT>";
        let doc = decode_envelope(xml).unwrap();
        let root = doc.get("ROOT").and_then(XmlValue::as_node).unwrap();
        assert_eq!(root.element_text("NAME").as_deref(), Some("A & B"));
        assert_eq!(root.element_text("STATE").as_deref(), Some("Not Applicable"));
    }

    #[test]
    fn field_prefers_element_over_attribute() {
        let xml = r#"<ROOT><COMPANY NAME="attr"><NAME>elem</NAME></COMPANY><COMPANY NAME="only-attr"><NAME></NAME></COMPANY></ROOT>"#;
        let doc = decode_envelope(xml).unwrap();
        let companies = doc.find_all("COMPANY");
        assert_eq!(companies[0].as_node().unwrap().field("NAME").as_deref(), Some("elem"));
        assert_eq!(companies[1].as_node().unwrap().field("NAME").as_deref(), Some("only-attr"));
    }

    #[test]
    fn nested_values_stringify() {
        let xml = "<ROOT><PARENT><GROUP>Debtors</GROUP><CODE>7</CODE></PARENT></ROOT>";
        let doc = decode_envelope(xml).unwrap();
        let root = doc.get("ROOT").and_then(XmlValue::as_node).unwrap();
        assert_eq!(root.element_text("PARENT").as_deref(), Some("CODE=7 GROUP=Debtors"));
    }

    #[test]
    fn line_error_surfaces_as_upstream_rejected() {
        let xml = "<RESPONSE><LINEERROR>Could not find Company 'Nope'</LINEERROR></RESPONSE>";
        match decode_envelope(xml) {
            Err(TallyError::UpstreamRejected { message, .. }) => {
                assert!(message.contains("Could not find Company"))
            }
            other => panic!("expected UpstreamRejected, got {other:?}"),
        }
    }

    #[test]
    fn missing_collection_is_empty_slice() {
        let doc = decode_envelope("<ENVELOPE><BODY><DATA/></BODY></ENVELOPE>").unwrap();
        assert!(doc.find_all("BILL").is_empty());
    }
}
