//! Coordinated set identification
//!
//! Set members advertise a Resolvable Set Identifier (`hash ‖ prand`, 24 bits
//! each, little-endian). A device belongs to the set when the hash matches
//! `sih(SIRK, prand)`.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::advertising::{ad_type, AdStructures, RSI_SIZE};
use crate::types::Sirk;

const BLOCK_SIZE: usize = 16;

/// AES-128 `e()` with key, plaintext and result in little-endian byte order
fn encrypt_le(key: &Sirk, plaintext: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut key_be = *key;
    key_be.reverse();
    let mut block = *plaintext;
    block.reverse();

    let cipher = Aes128::new(GenericArray::from_slice(&key_be));
    let mut block = GenericArray::clone_from_slice(&block);
    cipher.encrypt_block(&mut block);

    let mut out = [0u8; BLOCK_SIZE];
    out.copy_from_slice(&block);
    out.reverse();
    out
}

fn get_le24(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], 0])
}

/// Set identity hash function
pub fn sih(sirk: &Sirk, prand: u32) -> u32 {
    let mut res = [0u8; BLOCK_SIZE];
    res[..3].copy_from_slice(&prand.to_le_bytes()[..3]);
    let out = encrypt_le(sirk, &res);
    get_le24(&out)
}

/// Whether a resolvable set identifier was generated from `sirk`
pub fn rsi_matches(sirk: &Sirk, rsi: &[u8; RSI_SIZE]) -> bool {
    let hash = get_le24(&rsi[..3]);
    let prand = get_le24(&rsi[3..]);
    sih(sirk, prand) == hash
}

/// Whether advertising data carries an RSI resolving against `sirk`
pub fn is_set_member(sirk: &Sirk, data: &[u8]) -> bool {
    AdStructures::new(data)
        .filter(|(kind, _)| *kind == ad_type::CSIS_RSI)
        .filter_map(|(_, value)| <&[u8; RSI_SIZE]>::try_from(value).ok())
        .any(|rsi| rsi_matches(sirk, rsi))
}

/// Build an RSI for `sirk` from 22 random bits
pub fn generate_rsi(sirk: &Sirk, random: u32) -> [u8; RSI_SIZE] {
    // the two most significant prand bits are fixed to 0b01
    let prand = (random & 0x003F_FFFF) | 0x0040_0000;
    let hash = sih(sirk, prand);

    let mut rsi = [0u8; RSI_SIZE];
    rsi[..3].copy_from_slice(&hash.to_le_bytes()[..3]);
    rsi[3..].copy_from_slice(&prand.to_le_bytes()[..3]);
    rsi
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIRK: Sirk = [
        0x45, 0x7d, 0x7d, 0x09, 0x21, 0xa1, 0xfd, 0x22, 0xce, 0xcd, 0x8c, 0x86, 0xdd, 0x72, 0xcc,
        0xcd,
    ];

    #[test]
    fn test_generated_rsi_resolves() {
        for random in [0, 1, 0x1234, 0x3F_FFFF, 0xFFFF_FFFF] {
            let rsi = generate_rsi(&SIRK, random);
            assert!(rsi_matches(&SIRK, &rsi));
            assert_eq!(rsi[5] & 0xC0, 0x40);
        }
    }

    #[test]
    fn test_foreign_sirk_does_not_resolve() {
        let rsi = generate_rsi(&SIRK, 0xABCDE);
        let mut other = SIRK;
        other[0] ^= 0xFF;
        assert!(!rsi_matches(&other, &rsi));

        let mut tampered = rsi;
        tampered[0] ^= 0x01;
        assert!(!rsi_matches(&SIRK, &tampered));
    }

    #[test]
    fn test_set_member_in_advertising_data() {
        let rsi = generate_rsi(&SIRK, 7);
        let mut data = vec![0x02, 0x01, 0x06, 0x07, ad_type::CSIS_RSI];
        data.extend_from_slice(&rsi);
        assert!(is_set_member(&SIRK, &data));

        assert!(!is_set_member(&SIRK, &[0x02, 0x01, 0x06]));
        // wrong RSI length
        assert!(!is_set_member(&SIRK, &[0x04, ad_type::CSIS_RSI, 1, 2, 3]));
    }

    #[test]
    fn test_sih_is_24_bits() {
        assert!(sih(&SIRK, 0x40_0001) <= 0x00FF_FFFF);
    }
}
