//! Aligned IPv4 CIDR blocks
//!
//! Provides [`CidrBlock`], a value type for one power-of-two-aligned range of
//! IPv4 addresses:
//! - Range bounds (`first`/`last`) computed without overflow, even for `/0`
//! - Alignment check kept separate from construction
//! - Closed-interval overlap and containment tests
//! - Dotted-quad notation parsing and formatting (e.g., "192.168.0.0/16")
//!
//! # Examples
//!
//! ```
//! use ipinv_cidr::CidrBlock;
//!
//! let block = CidrBlock::parse("192.168.0.0/16").unwrap();
//! assert!(block.is_valid());
//! assert_eq!(block.first(), 0xC0A80000); // 192.168.0.0
//! assert_eq!(block.last(), 0xC0A8FFFF); // 192.168.255.255
//! assert!(block.contains_addr(0xC0A80101)); // 192.168.1.1
//!
//! // Misaligned blocks can be built and inspected, but are not valid
//! let misaligned = CidrBlock::parse("10.1.0.0/8").unwrap();
//! assert!(!misaligned.is_valid());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Number of bits in an IPv4 address
pub const ADDRESS_BITS: u8 = 32;

/// CIDR errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// Invalid CIDR notation
    #[error("Invalid CIDR notation: {0}")]
    InvalidNotation(String),

    /// Invalid IP address
    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    /// Invalid prefix length
    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),
}

pub type Result<T> = std::result::Result<T, CidrError>;

/// CIDR block representation
///
/// Ordering is by base address, then by prefix length, so a block sorts
/// before every smaller block that shares its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CidrBlock {
    /// Base address
    base: u32,
    /// Prefix length (0-32)
    prefix_len: u8,
}

impl CidrBlock {
    /// Create a block from a base address and prefix length
    ///
    /// The base is taken as-is; use [`CidrBlock::is_valid`] to check that it
    /// is aligned to the prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipinv_cidr::CidrBlock;
    ///
    /// let block = CidrBlock::new(0x0A000000, 8).unwrap();
    /// assert_eq!(block.to_string(), "10.0.0.0/8");
    /// assert!(CidrBlock::new(0, 33).is_err());
    /// ```
    pub fn new(base: u32, prefix_len: u8) -> Result<Self> {
        if prefix_len > ADDRESS_BITS {
            return Err(CidrError::InvalidPrefixLength(prefix_len));
        }

        Ok(Self { base, prefix_len })
    }

    /// The single-address `/32` block for `addr`
    pub fn host(addr: u32) -> Self {
        Self {
            base: addr,
            prefix_len: ADDRESS_BITS,
        }
    }

    /// Create a block from network-order octets
    pub fn from_octets(octets: [u8; 4], prefix_len: u8) -> Result<Self> {
        Self::new(u32::from_be_bytes(octets), prefix_len)
    }

    /// Parse CIDR notation string
    ///
    /// Accepts `a.b.c.d/prefix`, or a bare `a.b.c.d` meaning `/32`. The
    /// address is not masked, so misaligned input yields an invalid block
    /// rather than an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use ipinv_cidr::CidrBlock;
    ///
    /// let block = CidrBlock::parse("10.0.0.0/8").unwrap();
    /// assert_eq!(block.prefix_len(), 8);
    ///
    /// let host = CidrBlock::parse("8.8.8.8").unwrap();
    /// assert_eq!(host.prefix_len(), 32);
    /// ```
    pub fn parse(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (ip_str, prefix_len) = match cidr.split_once('/') {
            Some((ip_str, prefix_str)) => {
                let prefix_len: u8 = prefix_str.parse().map_err(|_| {
                    CidrError::InvalidNotation(format!("Invalid prefix: {}", prefix_str))
                })?;
                (ip_str, prefix_len)
            }
            None => (cidr, ADDRESS_BITS),
        };

        if ip_str.is_empty() {
            return Err(CidrError::InvalidNotation(
                "Expected format: x.x.x.x/prefix".to_string(),
            ));
        }

        let base = Self::parse_ipv4(ip_str)?;
        Self::new(base, prefix_len)
    }

    /// Parse IPv4 address string to u32
    fn parse_ipv4(ip: &str) -> Result<u32> {
        let octets: Vec<&str> = ip.split('.').collect();
        if octets.len() != 4 {
            return Err(CidrError::InvalidIpAddress(format!(
                "Expected 4 octets: {}",
                ip
            )));
        }

        let mut bytes = [0u8; 4];
        for (byte, octet_str) in bytes.iter_mut().zip(octets) {
            *byte = octet_str.parse().map_err(|_| {
                CidrError::InvalidIpAddress(format!("Invalid octet: {}", octet_str))
            })?;
        }

        Ok(u32::from_be_bytes(bytes))
    }

    /// Get base address
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Get prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Get network mask
    pub fn mask(&self) -> u32 {
        // Widened so that a /0 shifts every bit out instead of overflowing
        (u64::from(u32::MAX) << (ADDRESS_BITS - self.prefix_len)) as u32
    }

    /// Base address octets, most significant first
    pub fn octets(&self) -> [u8; 4] {
        self.base.to_be_bytes()
    }

    /// Base address as a standard library address
    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    /// Check that no base bit below the prefix boundary is set
    pub fn is_valid(&self) -> bool {
        self.base & !self.mask() == 0
    }

    /// Get total number of addresses in this block
    pub fn size(&self) -> u64 {
        1u64 << (ADDRESS_BITS - self.prefix_len)
    }

    /// First address of the range
    pub fn first(&self) -> u32 {
        self.base
    }

    /// Last address of the range (inclusive)
    pub fn last(&self) -> u32 {
        (u64::from(self.base) + self.size() - 1) as u32
    }

    /// Check whether the two closed ranges share any address
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.first() <= other.last() && self.last() >= other.first()
    }

    /// Check whether `other` lies entirely inside this block
    pub fn contains(&self, other: &CidrBlock) -> bool {
        self.first() <= other.first() && other.last() <= self.last()
    }

    /// Check if IP address is in this block
    pub fn contains_addr(&self, ip: u32) -> bool {
        self.first() <= ip && ip <= self.last()
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{}.{}.{}.{}/{}", a, b, c, d, self.prefix_len)
    }
}

impl FromStr for CidrBlock {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}
