//! NF-e / NFC-e XML extraction.
//!
//! Handles authorized documents (`nfeProc`, bare `NFe`) and cancellation
//! events (`procEventoNFe`). Namespaces are ignored; elements are matched by
//! local name under their parent.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::IoError;

/// Event type code for cancellation by the issuer.
pub const CANCELLATION_EVENT: &str = "110111";

/// Protocol status codes meaning the document was cancelled.
pub const CANCELLED_STATUSES: &[&str] = &["101", "151"];

/// Fields of one authorized document, as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invoice {
    pub date: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub value: Option<String>,
    pub tax_base: Option<String>,
    pub tax_amount: Option<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Invoice(Invoice),
    /// Cancellation event for the document with this access key.
    Cancellation { access_key: String },
    /// Well-formed XML that is neither.
    Other,
}

/// `(parent, element)` local-name pairs and the slot each one feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    IssuedAt,
    IssuedOn,
    Series,
    Number,
    Value,
    TaxBase,
    TaxAmount,
    ProtocolStatus,
    EventType,
    EventKey,
}

const SLOTS: &[(&[u8], &[u8], Slot)] = &[
    (b"ide", b"dhEmi", Slot::IssuedAt),
    (b"ide", b"dEmi", Slot::IssuedOn),
    (b"ide", b"serie", Slot::Series),
    (b"ide", b"nNF", Slot::Number),
    (b"ICMSTot", b"vNF", Slot::Value),
    (b"ICMSTot", b"vBC", Slot::TaxBase),
    (b"ICMSTot", b"vICMS", Slot::TaxAmount),
    (b"infProt", b"cStat", Slot::ProtocolStatus),
    (b"infEvento", b"tpEvento", Slot::EventType),
    (b"infEvento", b"chNFe", Slot::EventKey),
];

#[derive(Default)]
struct Captured {
    issued_at: Option<String>,
    issued_on: Option<String>,
    series: Option<String>,
    number: Option<String>,
    value: Option<String>,
    tax_base: Option<String>,
    tax_amount: Option<String>,
    protocol_status: Option<String>,
    event_type: Option<String>,
    event_key: Option<String>,
}

impl Captured {
    /// First occurrence wins; later repeats (e.g. `retEvento`) are ignored.
    fn store(&mut self, slot: Slot, text: String) {
        let target = match slot {
            Slot::IssuedAt => &mut self.issued_at,
            Slot::IssuedOn => &mut self.issued_on,
            Slot::Series => &mut self.series,
            Slot::Number => &mut self.number,
            Slot::Value => &mut self.value,
            Slot::TaxBase => &mut self.tax_base,
            Slot::TaxAmount => &mut self.tax_amount,
            Slot::ProtocolStatus => &mut self.protocol_status,
            Slot::EventType => &mut self.event_type,
            Slot::EventKey => &mut self.event_key,
        };
        if target.is_none() {
            *target = Some(text);
        }
    }
}

/// Parse one XML document.
pub fn parse(xml: &str) -> Result<Document, IoError> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut captured = Captured::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => path.push(e.local_name().as_ref().to_vec()),
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                if let Some(slot) = slot_for(&path) {
                    let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                    if !text.is_empty() {
                        captured.store(slot, text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IoError::Xml(format!(
                    "{e} at byte {}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(classify(captured))
}

fn slot_for(path: &[Vec<u8>]) -> Option<Slot> {
    let [.., parent, element] = path else {
        return None;
    };
    SLOTS
        .iter()
        .find(|(p, el, _)| *p == parent.as_slice() && *el == element.as_slice())
        .map(|(_, _, slot)| *slot)
}

fn classify(c: Captured) -> Document {
    if c.event_type.as_deref() == Some(CANCELLATION_EVENT) {
        if let Some(access_key) = c.event_key {
            return Document::Cancellation { access_key };
        }
    }

    if c.number.is_none() {
        return Document::Other;
    }

    let cancelled = c
        .protocol_status
        .as_deref()
        .is_some_and(|s| CANCELLED_STATUSES.contains(&s));

    Document::Invoice(Invoice {
        date: c.issued_at.or(c.issued_on),
        series: c.series,
        number: c.number,
        value: c.value,
        tax_base: c.tax_base,
        tax_amount: c.tax_amount,
        cancelled,
    })
}

/// Series and number embedded in a 44-digit access key.
///
/// Layout: cUF(2) AAMM(4) CNPJ(14) mod(2) serie(3) nNF(9) tpEmis(1) cNF(8) cDV(1).
pub fn key_parts(access_key: &str) -> Option<(&str, &str)> {
    let key = access_key.trim();
    if key.len() != 44 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((&key[22..25], &key[25..34]))
}
