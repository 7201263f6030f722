//! Well-known non-Internet IPv4 ranges
//!
//! The RFC 1918 private networks plus loopback. Callers usually insert these
//! before their own ranges; the set treats them like any other block.

use crate::{BlockSet, Result};
use ipinv_cidr::CidrBlock;

/// Private and loopback ranges as (base, prefix length)
pub const PRIVATE_RANGES: [(u32, u8); 4] = [
    (0x0A000000, 8),  // 10.0.0.0/8
    (0xC0A80000, 16), // 192.168.0.0/16
    (0xAC100000, 12), // 172.16.0.0/12
    (0x7F000000, 8),  // 127.0.0.0/8
];

/// The private and loopback ranges as blocks
pub fn private_blocks() -> impl Iterator<Item = CidrBlock> {
    PRIVATE_RANGES
        .into_iter()
        .filter_map(|(base, prefix_len)| CidrBlock::new(base, prefix_len).ok())
}

/// A new set holding only the private and loopback ranges
pub fn private_ranges() -> Result<BlockSet> {
    BlockSet::try_from_blocks(private_blocks())
}
