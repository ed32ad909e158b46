//! IP address and prefix helpers.
//!
//! Addresses are handled as big-endian byte slices so the same arithmetic works
//! for 4-byte and 16-byte families. [`IpPrefix`] is the network/length pair used
//! by the address pool and the segment allocator.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Check if a string is a valid IP address (IPv4 or IPv6)
pub fn is_valid_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// Address length in bits (32 or 128)
pub fn addr_bits(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

pub fn addr_to_bytes(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

pub fn bytes_to_addr(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(bytes);
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Add `offset` to a big-endian byte string, propagating the carry from the
/// least significant byte upwards.
///
/// Returns `false` when the sum does not fit into the slice.
pub fn add_offset(bytes: &mut [u8], offset: u128) -> bool {
    let mut remaining = offset;
    let mut carry: u16 = 0;
    for byte in bytes.iter_mut().rev() {
        let sum = *byte as u16 + (remaining & 0xff) as u16 + carry;
        *byte = (sum & 0xff) as u8;
        carry = sum >> 8;
        remaining >>= 8;
    }
    carry == 0 && remaining == 0
}

/// Difference `a - b` of two equal-length big-endian byte strings.
///
/// Returns `None` if `b > a` or the lengths differ.
pub fn byte_difference(a: &[u8], b: &[u8]) -> Option<u128> {
    if a.len() != b.len() || a.len() > 16 {
        return None;
    }
    let mut result = Vec::with_capacity(a.len());
    let mut borrow: i16 = 0;
    for (x, y) in a.iter().zip(b.iter()).rev() {
        let mut diff = *x as i16 - *y as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        result.push(diff as u8);
    }
    if borrow != 0 {
        return None;
    }
    Some(
        result
            .iter()
            .rev()
            .fold(0u128, |acc, byte| (acc << 8) | *byte as u128),
    )
}

/// The address following `addr`, or `None` at the end of the address space.
pub fn next_addr(addr: &IpAddr) -> Option<IpAddr> {
    let mut bytes = addr_to_bytes(addr);
    if !add_offset(&mut bytes, 1) {
        return None;
    }
    bytes_to_addr(&bytes)
}

/// Parse a host address, accepting an optional `/len` suffix.
pub fn parse_host(value: &str) -> Result<IpAddr, String> {
    let host = value.split('/').next().unwrap_or(value).trim();
    host.parse::<IpAddr>()
        .map_err(|e| format!("'{}' is not an IP address: {}", value, e))
}

/// A network prefix: a network address and a prefix length.
///
/// The stored address is always masked to the prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, String> {
        let max = addr_bits(&addr);
        if len > max {
            return Err(format!("prefix length {} exceeds {} bits", len, max));
        }
        let mut bytes = addr_to_bytes(&addr);
        mask_bytes(&mut bytes, len);
        let addr = bytes_to_addr(&bytes).ok_or_else(|| "invalid address bytes".to_string())?;
        Ok(IpPrefix { addr, len })
    }

    /// Network address
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    /// Address length of the family (32 or 128)
    pub fn max_len(&self) -> u8 {
        addr_bits(&self.addr)
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn contains_addr(&self, addr: &IpAddr) -> bool {
        if addr.is_ipv4() != self.addr.is_ipv4() {
            return false;
        }
        let mut bytes = addr_to_bytes(addr);
        mask_bytes(&mut bytes, self.len);
        bytes == addr_to_bytes(&self.addr)
    }

    /// True if `other` lies completely inside this prefix.
    pub fn contains(&self, other: &IpPrefix) -> bool {
        other.len >= self.len && self.contains_addr(&other.addr)
    }

    /// Last address of the prefix (the IPv4 broadcast address).
    pub fn broadcast(&self) -> IpAddr {
        let mut bytes = addr_to_bytes(&self.addr);
        for bit in self.len as usize..bytes.len() * 8 {
            bytes[bit / 8] |= 0x80 >> (bit % 8);
        }
        bytes_to_addr(&bytes).unwrap_or(self.addr)
    }

    /// Number of host bits
    pub fn host_bits(&self) -> u8 {
        self.max_len() - self.len
    }
}

fn mask_bytes(bytes: &mut [u8], len: u8) {
    for bit in len as usize..bytes.len() * 8 {
        bytes[bit / 8] &= !(0x80 >> (bit % 8));
    }
}

impl FromStr for IpPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{}' has no prefix length", s))?;
        let addr = addr
            .parse::<IpAddr>()
            .map_err(|e| format!("'{}' is not an IP address: {}", addr, e))?;
        let len = len
            .parse::<u8>()
            .map_err(|e| format!("'{}' is not a prefix length: {}", len, e))?;
        IpPrefix::new(addr, len)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}
