//! Printing frames received from the bridge

use bassist_core::protocol::{CommandSubtype, EventSubtype, TlvEntry, TlvTag};
use bassist_core::{Message, MessageType};
use serde::Serialize;

/// One frame in a printable shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameView {
    pub kind: &'static str,
    pub name: String,
    pub subtype: u8,
    pub seq: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    pub records: Vec<RecordView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub tag: String,
    pub value: String,
}

impl FrameView {
    pub fn new(message: &Message) -> Self {
        let (kind, name) = match message.kind {
            MessageType::Command => ("command", command_name(message.subtype)),
            MessageType::Response => ("response", command_name(message.subtype)),
            MessageType::Event => ("event", event_name(message.subtype)),
        };

        // Payloads that fail to parse are shown as one raw record
        let records = match message.records() {
            Ok(codec) => codec.entries().iter().map(RecordView::new).collect(),
            Err(_) => vec![RecordView { tag: "raw".to_string(), value: hex::encode(&message.payload) }],
        };

        Self {
            kind,
            name,
            subtype: message.subtype,
            seq: message.seq,
            rc: message.return_code(),
            records,
        }
    }

    pub fn to_text(&self) -> String {
        let mut line = format!("{:<8} {} seq={}", self.kind, self.name, self.seq);
        if let Some(rc) = self.rc {
            line.push_str(&format!(" rc={}", rc));
        }
        for record in self.records.iter().filter(|r| r.tag != "ErrorCode") {
            line.push_str(&format!(" {}={}", record.tag, record.value));
        }
        line
    }
}

impl RecordView {
    fn new(entry: &TlvEntry) -> Self {
        let tag = match entry.tag() {
            Some(tag) => format!("{:?}", tag),
            None => format!("{:#04x}", entry.tag),
        };
        let value = match entry.tag() {
            Some(TlvTag::Identity) | Some(TlvTag::Rpa) => match entry.as_address() {
                Ok(address) => address.to_string(),
                Err(_) => hex::encode(&entry.value),
            },
            Some(TlvTag::CompleteName) | Some(TlvTag::ShortenedName) => {
                String::from_utf8_lossy(&entry.value).into_owned()
            }
            Some(TlvTag::ErrorCode) => match entry.as_i32() {
                Ok(rc) => rc.to_string(),
                Err(_) => hex::encode(&entry.value),
            },
            Some(TlvTag::Rssi) => (entry.value.first().copied().unwrap_or(0) as i8).to_string(),
            _ => hex::encode(&entry.value),
        };
        Self { tag, value }
    }
}

fn command_name(subtype: u8) -> String {
    match CommandSubtype::from_u8(subtype) {
        Some(subtype) => format!("{:?}", subtype),
        None => format!("{:#04x}", subtype),
    }
}

fn event_name(subtype: u8) -> String {
    match EventSubtype::from_u8(subtype) {
        Some(subtype) => format!("{:?}", subtype),
        None => format!("{:#04x}", subtype),
    }
}
