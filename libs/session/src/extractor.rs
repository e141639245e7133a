//! Best-effort header extraction from raw payloads
//!
//! Used to describe messages that could not be processed. Extraction never
//! fails: whatever is missing or malformed is simply left out.

use bytes::Bytes;
use feed_types::MessageKind;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Root element with the attribute section of its opening tag
static ROOT_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:<\?xml[^>]*\?>\s*)?<([A-Za-z_][A-Za-z0-9_]*)([^>]*)")
        .expect("valid root element pattern")
});

static PRODUCT_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bproduct\s*=\s*["'](\d+)["']"#)
        .expect("valid product pattern")
});

static EVENT_ID_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bevent_id\s*=\s*["']([^"']+)["']"#)
        .expect("valid event id pattern")
});

/// Header fields as far as they could be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicMessageData {
    pub kind: MessageKind,
    pub producer_id: Option<String>,
    pub event_id: Option<String>,
}

impl BasicMessageData {
    pub fn unknown() -> Self {
        Self {
            kind: MessageKind::Unknown,
            producer_id: None,
            event_id: None,
        }
    }
}

pub trait MessageDataExtractor: Send + Sync {
    fn basic_data(&self, raw: &Bytes) -> BasicMessageData;
}

/// Reads the root element name and its `product` / `event_id` attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBasicDataExtractor;

impl MessageDataExtractor for XmlBasicDataExtractor {
    fn basic_data(&self, raw: &Bytes) -> BasicMessageData {
        let Some(root) = ROOT_ELEMENT.captures(raw) else {
            return BasicMessageData::unknown();
        };

        let kind = root
            .get(1)
            .and_then(|name| std::str::from_utf8(name.as_bytes()).ok())
            .map(MessageKind::from_root_element)
            .unwrap_or(MessageKind::Unknown);
        let attributes = root.get(2).map(|m| m.as_bytes()).unwrap_or_default();

        BasicMessageData {
            kind,
            producer_id: attribute(&PRODUCT_ATTRIBUTE, attributes),
            event_id: attribute(&EVENT_ID_ATTRIBUTE, attributes),
        }
    }
}

fn attribute(pattern: &Regex, attributes: &[u8]) -> Option<String> {
    pattern
        .captures(attributes)
        .and_then(|captures| captures.get(1))
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}
