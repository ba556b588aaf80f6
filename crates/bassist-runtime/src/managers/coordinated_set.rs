//! Coordinated set context for set-member scans

use bassist_core::{csis, Address, Sirk};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct CoordinatedSetContext {
    sirk: Sirk,
    expected_size: u8,
    members: Vec<Address>,
}

impl CoordinatedSetContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, sirk: Sirk, expected_size: u8) {
        self.sirk = sirk;
        self.expected_size = expected_size;
        self.members.clear();
        debug!("Set context reset (size {})", expected_size);
    }

    /// Record `address` if its advertisement resolves against the set key and
    /// it is not a member already
    pub fn consider(&mut self, address: &Address, advertising_data: &[u8]) -> bool {
        if !csis::is_set_member(&self.sirk, advertising_data) {
            return false;
        }
        if self.contains(address) {
            debug!("Set member {} already found", address);
            return false;
        }
        self.members.push(*address);
        info!("Set member found ({} / {}), {}", self.members.len(), self.expected_size, address);
        true
    }

    /// Count every connected peer as a member
    pub fn seed_from_connections<'a>(&mut self, connected: impl IntoIterator<Item = &'a Address>) {
        for address in connected {
            if !self.contains(address) {
                info!("Adding connected {} to set", address);
                self.members.push(*address);
            }
        }
    }

    /// A set of unknown size (0) is never complete
    pub fn is_complete(&self) -> bool {
        self.expected_size != 0 && self.members.len() >= usize::from(self.expected_size)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    pub fn members(&self) -> &[Address] {
        &self.members
    }

    pub fn expected_size(&self) -> u8 {
        self.expected_size
    }

    pub fn sirk(&self) -> &Sirk {
        &self.sirk
    }
}
