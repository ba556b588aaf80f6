//! Advertising data parsing
//!
//! Advertising payloads are a sequence of `len ‖ type ‖ data` structures. The
//! scan controller only needs a handful of them, summarised by
//! [`AdvertisementSummary`].

use serde::{Deserialize, Serialize};

use crate::types::BroadcastId;

/// AD types inspected by the assistant
pub mod ad_type {
    pub const UUID16_SOME: u8 = 0x02;
    pub const UUID16_ALL: u8 = 0x03;
    pub const NAME_SHORTENED: u8 = 0x08;
    pub const NAME_COMPLETE: u8 = 0x09;
    pub const SVC_DATA16: u8 = 0x16;
    pub const CSIS_RSI: u8 = 0x2E;
    pub const BROADCAST_NAME: u8 = 0x30;
}

/// 16-bit service UUIDs inspected by the assistant
pub mod uuid16 {
    /// Broadcast Audio Scan Service
    pub const BASS: u16 = 0x184F;
    /// Published Audio Capabilities Service
    pub const PACS: u16 = 0x1850;
    /// Basic Audio Announcement (carries the BASE)
    pub const BASIC_AUDIO: u16 = 0x1851;
    /// Broadcast Audio Announcement (carries the Broadcast_ID)
    pub const BROADCAST_AUDIO: u16 = 0x1852;
}

/// Names are truncated to this many bytes when reported
pub const MAX_NAME_LEN: usize = 29;

/// Size of a Resolvable Set Identifier
pub const RSI_SIZE: usize = 6;

/// Iterator over the AD structures of an advertising payload.
///
/// Iteration stops at a zero length octet (padding) or at a structure that runs
/// past the end of the buffer.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    data: &'a [u8],
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.data.split_first()?;
        let len = len as usize;
        if len == 0 || rest.len() < len {
            self.data = &[];
            return None;
        }
        let (structure, remaining) = rest.split_at(len);
        self.data = remaining;
        Some((structure[0], &structure[1..]))
    }
}

/// Local name advertised by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceName {
    pub complete: bool,
    pub name: Vec<u8>,
}

impl DeviceName {
    pub fn as_lossy_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Fields of an advertisement the scan controller classifies on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementSummary {
    pub name: Option<DeviceName>,
    pub broadcast_name: Option<Vec<u8>>,
    pub broadcast_id: Option<BroadcastId>,
    pub has_bass: bool,
    pub has_pacs: bool,
    pub rsi: Option<[u8; RSI_SIZE]>,
}

impl AdvertisementSummary {
    pub fn parse(data: &[u8]) -> Self {
        let mut summary = Self::default();

        for (kind, value) in AdStructures::new(data) {
            match kind {
                ad_type::NAME_SHORTENED | ad_type::NAME_COMPLETE => {
                    summary.name = Some(DeviceName {
                        complete: kind == ad_type::NAME_COMPLETE,
                        name: truncate_name(value),
                    });
                }
                ad_type::BROADCAST_NAME => summary.broadcast_name = Some(truncate_name(value)),
                ad_type::SVC_DATA16 => summary.service_data16(value),
                ad_type::UUID16_SOME | ad_type::UUID16_ALL => summary.uuid16_list(value),
                ad_type::CSIS_RSI => {
                    if let Ok(rsi) = <[u8; RSI_SIZE]>::try_from(value) {
                        summary.rsi = Some(rsi);
                    }
                }
                _ => {}
            }
        }

        summary
    }

    fn service_data16(&mut self, value: &[u8]) {
        let Some((uuid, rest)) = split_uuid16(value) else {
            return;
        };
        match uuid {
            uuid16::BASS => self.has_bass = true,
            uuid16::BROADCAST_AUDIO => {
                if let Ok(id) = BroadcastId::from_le24(rest) {
                    self.broadcast_id = Some(id);
                }
            }
            _ => {}
        }
    }

    fn uuid16_list(&mut self, value: &[u8]) {
        // Some sinks only list BASS here instead of advertising its service data
        if value.len() % 2 != 0 {
            tracing::debug!("Malformed UUID16 list of {} bytes", value.len());
            return;
        }
        for chunk in value.chunks_exact(2) {
            match u16::from_le_bytes([chunk[0], chunk[1]]) {
                uuid16::BASS => self.has_bass = true,
                uuid16::PACS => self.has_pacs = true,
                _ => {}
            }
        }
    }
}

/// Split service data into its UUID and the data that follows
pub fn split_uuid16(value: &[u8]) -> Option<(u16, &[u8])> {
    if value.len() < 2 {
        return None;
    }
    Some((u16::from_le_bytes([value[0], value[1]]), &value[2..]))
}

fn truncate_name(value: &[u8]) -> Vec<u8> {
    value[..value.len().min(MAX_NAME_LEN)].to_vec()
}
