//! Broadcast Audio Source Endpoint (BASE) parsing
//!
//! A BASE travels in the periodic advertising train as service data for the
//! Basic Audio Announcement UUID:
//!
//! ```text
//! presentation_delay(3) num_subgroups(1)
//!   { num_bis(1) codec_id(5) codec_cfg_len(1) codec_cfg metadata_len(1) metadata
//!     { bis_index(1) codec_cfg_len(1) codec_cfg } * num_bis
//!   } * num_subgroups
//! ```

use serde::{Deserialize, Serialize};

use crate::advertising::{ad_type, split_uuid16, uuid16, AdStructures};
use crate::errors::{ProtocolError, Result};

/// Size of a codec id (format, company id, vendor codec id)
pub const CODEC_ID_SIZE: usize = 5;

/// Highest valid BIS index
pub const MAX_BIS_INDEX: u8 = 0x1F;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseBis {
    pub index: u8,
    pub codec_config: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseSubgroup {
    pub codec_id: [u8; CODEC_ID_SIZE],
    pub codec_config: Vec<u8>,
    pub metadata: Vec<u8>,
    pub bis: Vec<BaseBis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    /// Presentation delay in microseconds
    pub presentation_delay: u32,
    pub subgroups: Vec<BaseSubgroup>,
}

impl Base {
    /// Find and parse the first valid BASE in periodic advertising data
    pub fn from_ad(data: &[u8]) -> Option<Self> {
        AdStructures::new(data)
            .filter(|(kind, _)| *kind == ad_type::SVC_DATA16)
            .filter_map(|(_, value)| split_uuid16(value))
            .filter(|(uuid, _)| *uuid == uuid16::BASIC_AUDIO)
            .find_map(|(_, body)| Self::parse(body).ok())
    }

    /// Parse the body of a Basic Audio Announcement (after the UUID)
    pub fn parse(body: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(body);

        let delay = reader.take(3, "presentation delay")?;
        let presentation_delay = u32::from_le_bytes([delay[0], delay[1], delay[2], 0]);

        let num_subgroups = reader.u8("subgroup count")?;
        if num_subgroups == 0 {
            return Err(ProtocolError::InvalidBase("no subgroups".to_string()));
        }

        let mut subgroups = Vec::with_capacity(num_subgroups as usize);
        for _ in 0..num_subgroups {
            let num_bis = reader.u8("bis count")?;
            if num_bis == 0 {
                return Err(ProtocolError::InvalidBase("subgroup without BIS".to_string()));
            }

            let mut codec_id = [0u8; CODEC_ID_SIZE];
            codec_id.copy_from_slice(reader.take(CODEC_ID_SIZE, "codec id")?);
            let codec_config = reader.prefixed("codec configuration")?.to_vec();
            let metadata = reader.prefixed("metadata")?.to_vec();

            let mut bis = Vec::with_capacity(num_bis as usize);
            for _ in 0..num_bis {
                let index = reader.u8("bis index")?;
                if index == 0 || index > MAX_BIS_INDEX {
                    return Err(ProtocolError::InvalidBase(format!("bis index {index} out of range")));
                }
                let codec_config = reader.prefixed("bis codec configuration")?.to_vec();
                bis.push(BaseBis { index, codec_config });
            }

            subgroups.push(BaseSubgroup { codec_id, codec_config, metadata, bis });
        }

        Ok(Self { presentation_delay, subgroups })
    }

    /// Bitmap of every BIS index in the BASE (bit `index - 1`)
    pub fn bis_indexes(&self) -> u32 {
        self.subgroups
            .iter()
            .flat_map(|s| s.bis.iter())
            .fold(0, |acc, bis| acc | 1 << (bis.index - 1))
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.offset + n;
        let slice = self.data.get(self.offset..end).ok_or_else(|| {
            ProtocolError::InvalidBase(format!("truncated {what} at offset {}", self.offset))
        })?;
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn prefixed(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.u8(what)? as usize;
        self.take(len, what)
    }
}
