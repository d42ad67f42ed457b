//! Background bitcoin lottery miner.
//!
//! One double-SHA-256 of the 80-byte block header per idle-loop pass, with
//! the nonce advancing each pass. Field values arrive over the console as
//! raw little-endian bytes; the miner never talks to the network, it only
//! reports a digest that clears the difficulty prefix so the owner can
//! submit it by hand.

use sha2::{Digest, Sha256};

/// Leading zero bytes required of a candidate digest.
pub const DIFFICULTY_PREFIX_BYTES: usize = 4;

pub const FIELD_VERSION_LEN: usize = 4;
pub const FIELD_PRV_HASH_LEN: usize = 32;
pub const FIELD_MERKLE_ROOT_LEN: usize = 32;
pub const FIELD_TIMESTAMP_LEN: usize = 4;
pub const FIELD_NBITS_LEN: usize = 4;
pub const FIELD_NONCE_LEN: usize = 4;

/// Serialized header length.
pub const HEADER_LEN: usize = 80;

/// Block header fields, each stored little-endian as it hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: [u8; FIELD_VERSION_LEN],
    pub prv_block_header_hash: [u8; FIELD_PRV_HASH_LEN],
    pub merkle_root_hash: [u8; FIELD_MERKLE_ROOT_LEN],
    pub timestamp: [u8; FIELD_TIMESTAMP_LEN],
    pub nbits: [u8; FIELD_NBITS_LEN],
    pub nonce: [u8; FIELD_NONCE_LEN],
}

impl BlockHeader {
    pub const fn new() -> Self {
        Self {
            version: [0; FIELD_VERSION_LEN],
            prv_block_header_hash: [0; FIELD_PRV_HASH_LEN],
            merkle_root_hash: [0; FIELD_MERKLE_ROOT_LEN],
            timestamp: [0; FIELD_TIMESTAMP_LEN],
            nbits: [0; FIELD_NBITS_LEN],
            nonce: [0; FIELD_NONCE_LEN],
        }
    }

    pub fn serialize(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.version);
        out[4..36].copy_from_slice(&self.prv_block_header_hash);
        out[36..68].copy_from_slice(&self.merkle_root_hash);
        out[68..72].copy_from_slice(&self.timestamp);
        out[72..76].copy_from_slice(&self.nbits);
        out[76..80].copy_from_slice(&self.nonce);
        out
    }
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NyanBitcoin {
    /// Owner opt-in; flipped over the console.
    pub enabled: bool,
    /// True while iterating; field writes are only legal when clear.
    pub active: bool,
    pub current_nonce: u32,
    pub header: BlockHeader,
}

impl NyanBitcoin {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            active: false,
            current_nonce: 0,
            header: BlockHeader::new(),
        }
    }

    /// One mining pass: stamp the current nonce into the header, double
    /// hash it, advance the nonce. Returns the digest when it clears the
    /// difficulty prefix.
    pub fn hash_iteration(&mut self) -> Option<[u8; 32]> {
        if !self.enabled {
            return None;
        }
        self.active = true;
        self.header.nonce = self.current_nonce.to_le_bytes();

        let first = Sha256::digest(self.header.serialize());
        let digest: [u8; 32] = Sha256::digest(first).into();

        self.current_nonce = self.current_nonce.wrapping_add(1);
        self.active = false;

        if digest[..DIFFICULTY_PREFIX_BYTES].iter().all(|&b| b == 0) {
            Some(digest)
        } else {
            None
        }
    }
}

impl Default for NyanBitcoin {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_layout() {
        let mut header = BlockHeader::new();
        header.version = [1, 0, 0, 0];
        header.prv_block_header_hash = [0xAA; 32];
        header.merkle_root_hash = [0xBB; 32];
        header.timestamp = [0x29, 0xAB, 0x5F, 0x49];
        header.nbits = [0xFF, 0xFF, 0x00, 0x1D];
        header.nonce = [0x1D, 0xAC, 0x2B, 0x7C];

        let bytes = header.serialize();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..36], &[0xAA; 32]);
        assert_eq!(&bytes[36..68], &[0xBB; 32]);
        assert_eq!(&bytes[68..72], &[0x29, 0xAB, 0x5F, 0x49]);
        assert_eq!(&bytes[72..76], &[0xFF, 0xFF, 0x00, 0x1D]);
        assert_eq!(&bytes[76..80], &[0x1D, 0xAC, 0x2B, 0x7C]);
    }

    #[test]
    fn test_disabled_miner_does_nothing() {
        let mut miner = NyanBitcoin::new();
        assert_eq!(miner.hash_iteration(), None);
        assert_eq!(miner.current_nonce, 0);
        assert_eq!(miner.header.nonce, [0; 4]);
    }

    #[test]
    fn test_iteration_stamps_nonce_and_advances() {
        let mut miner = NyanBitcoin::new();
        miner.enabled = true;
        miner.current_nonce = 0x0403_0201;
        miner.hash_iteration();
        // The hashed header carried the pre-increment nonce.
        assert_eq!(miner.header.nonce, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(miner.current_nonce, 0x0403_0202);
        assert!(!miner.active);
    }

    #[test]
    fn test_iterations_hash_distinct_headers() {
        // Two consecutive passes must not produce the same digest, since
        // the nonce differs.
        let mut miner = NyanBitcoin::new();
        miner.enabled = true;

        let digest_a = {
            miner.header.nonce = miner.current_nonce.to_le_bytes();
            let first = Sha256::digest(miner.header.serialize());
            let d: [u8; 32] = Sha256::digest(first).into();
            miner.hash_iteration();
            d
        };
        let digest_b = {
            miner.header.nonce = miner.current_nonce.to_le_bytes();
            let first = Sha256::digest(miner.header.serialize());
            let d: [u8; 32] = Sha256::digest(first).into();
            d
        };
        assert_ne!(digest_a, digest_b);
    }

    #[test]
    fn test_nonce_wraps_at_u32_max() {
        let mut miner = NyanBitcoin::new();
        miner.enabled = true;
        miner.current_nonce = u32::MAX;
        miner.hash_iteration();
        assert_eq!(miner.current_nonce, 0);
    }
}
