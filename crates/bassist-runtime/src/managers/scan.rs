//! Scan targets and advertisement classification

use std::fmt;

use bassist_core::{AdvertisementSummary, BroadcastId};

use crate::link::ScanReport;

/// Set of scan targets; any combination may be active at once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScanMask(u8);

impl ScanMask {
    pub const IDLE: ScanMask = ScanMask(0);
    pub const SOURCE: ScanMask = ScanMask(0x01);
    pub const SINK: ScanMask = ScanMask(0x02);
    pub const SET_MEMBER: ScanMask = ScanMask(0x04);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_idle(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ScanMask) -> bool {
        !other.is_idle() && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ScanMask) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ScanMask) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for ScanMask {
    type Output = ScanMask;

    fn bitor(self, rhs: ScanMask) -> ScanMask {
        ScanMask(self.0 | rhs.0)
    }
}

impl fmt::Display for ScanMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_idle() {
            return f.write_str("idle");
        }
        let names = [(Self::SOURCE, "source"), (Self::SINK, "sink"), (Self::SET_MEMBER, "set-member")];
        let mut first = true;
        for (bit, name) in names {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A broadcast source is a non-connectable periodic advertiser carrying a
/// broadcast id
pub fn classify_source(report: &ScanReport, summary: &AdvertisementSummary) -> Option<BroadcastId> {
    if report.connectable || !report.is_periodic() {
        return None;
    }
    summary.broadcast_id
}

/// A sink is a connectable advertiser exposing the scan delegator service
pub fn classify_sink(report: &ScanReport, summary: &AdvertisementSummary) -> bool {
    report.connectable && summary.has_bass
}

#[cfg(test)]
mod tests {
    use super::*;
    use bassist_core::{Address, PaInterval};

    fn report(connectable: bool, interval: u16, data: Vec<u8>) -> ScanReport {
        ScanReport {
            address: Address::random([1, 2, 3, 4, 5, 0xC6]),
            rssi: -50,
            sid: 2,
            connectable,
            interval: PaInterval(interval),
            data,
        }
    }

    #[test]
    fn test_mask_operations() {
        let mut mask = ScanMask::IDLE;
        assert!(mask.is_idle());
        assert!(!mask.contains(ScanMask::IDLE));

        mask.insert(ScanMask::SOURCE);
        mask.insert(ScanMask::SET_MEMBER);
        assert!(mask.contains(ScanMask::SOURCE));
        assert!(!mask.contains(ScanMask::SINK));
        assert_eq!(mask.to_string(), "source|set-member");

        mask.remove(ScanMask::SOURCE);
        assert_eq!(mask, ScanMask::SET_MEMBER);
        assert_eq!((ScanMask::SOURCE | ScanMask::SINK).bits(), 0x03);
    }

    #[test]
    fn test_classification() {
        // broadcast audio announcement, id 0x1A2B3C
        let source_ad = vec![6, 0x16, 0x52, 0x18, 0x3C, 0x2B, 0x1A];
        let summary = AdvertisementSummary::parse(&source_ad);

        let periodic = report(false, 160, source_ad.clone());
        assert_eq!(classify_source(&periodic, &summary), Some(BroadcastId::new(0x1A2B3C)));
        assert_eq!(classify_source(&report(false, 0, source_ad.clone()), &summary), None);
        assert_eq!(classify_source(&report(true, 160, source_ad), &summary), None);

        // complete list of 16-bit uuids with BASS
        let sink_ad = vec![3, 0x03, 0x4F, 0x18];
        let summary = AdvertisementSummary::parse(&sink_ad);
        assert!(classify_sink(&report(true, 0, sink_ad.clone()), &summary));
        assert!(!classify_sink(&report(false, 0, sink_ad), &summary));
    }
}
