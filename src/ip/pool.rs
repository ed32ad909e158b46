//! Bit-indexed IP prefix pool.
//!
//! A pool splits an address range into `2^(bits - range_len)` equal blocks of
//! prefix length `bits`. Blocks are addressed by integer index; conversion
//! between index and prefix uses big-endian byte arithmetic, so IPv4 and IPv6
//! ranges are handled the same way.

use std::collections::BTreeSet;
use std::net::IpAddr;

use log::debug;

use crate::error::CompileError;
use crate::utils::ip_utils::{
    add_offset, addr_to_bytes, byte_difference, bytes_to_addr, IpPrefix,
};

#[derive(Debug, Clone)]
pub struct IpPool {
    name: String,
    range: IpPrefix,
    bits: u8,
    bound: BTreeSet<u128>,
}

impl IpPool {
    /// Create a pool of `/bits` blocks over `range`.
    pub fn new(name: impl Into<String>, range: IpPrefix, bits: u8) -> Result<Self, CompileError> {
        let name = name.into();
        if range.len() > bits || bits > range.max_len() {
            return Err(CompileError::InvalidAddress {
                value: range.to_string(),
                reason: format!(
                    "prefix range of pool {} is too small for prefixes of length {}",
                    name, bits
                ),
            });
        }
        Ok(IpPool {
            name,
            range,
            bits,
            bound: BTreeSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> &IpPrefix {
        &self.range
    }

    /// Prefix length of the blocks
    pub fn bits(&self) -> u8 {
        self.bits
    }

    fn available_bits(&self) -> u8 {
        self.bits - self.range.len()
    }

    /// Number of blocks, saturated at `u128::MAX`
    pub fn length(&self) -> u128 {
        let available = self.available_bits();
        if available >= 128 {
            u128::MAX
        } else {
            1u128 << available
        }
    }

    /// Whether the pool has `count` blocks at all
    pub fn is_enough(&self, count: u128) -> bool {
        self.available_bits() >= 128 || count <= self.length()
    }

    pub fn bound_count(&self) -> u128 {
        self.bound.len() as u128
    }

    pub fn is_bound(&self, index: u128) -> bool {
        self.bound.contains(&index)
    }

    /// Index of the last block
    pub fn last_index(&self) -> u128 {
        let available = self.available_bits();
        if available >= 128 {
            u128::MAX
        } else {
            (1u128 << available) - 1
        }
    }

    /// Prefix of the block at `index`.
    pub fn get(&self, index: u128) -> Result<IpPrefix, CompileError> {
        if index > self.last_index() {
            return Err(CompileError::InvalidAddress {
                value: index.to_string(),
                reason: format!("index out of range of pool {}", self.name),
            });
        }
        let shift = self.range.max_len() - self.bits;
        let offset = if shift >= 128 { 0 } else { index << shift };
        let mut bytes = addr_to_bytes(&self.range.addr());
        if !add_offset(&mut bytes, offset) {
            return Err(CompileError::InvalidAddress {
                value: index.to_string(),
                reason: format!("index overflows address space of pool {}", self.name),
            });
        }
        let addr = bytes_to_addr(&bytes).ok_or_else(|| CompileError::InvalidAddress {
            value: index.to_string(),
            reason: "invalid address length".to_string(),
        })?;
        IpPrefix::new(addr, self.bits).map_err(|reason| CompileError::InvalidAddress {
            value: addr.to_string(),
            reason,
        })
    }

    /// Prefix of the last block
    pub fn last(&self) -> Result<IpPrefix, CompileError> {
        self.get(self.last_index())
    }

    /// Index of a block-sized prefix inside the range.
    pub fn index_of(&self, prefix: &IpPrefix) -> Result<u128, CompileError> {
        if prefix.len() != self.bits {
            return Err(CompileError::InvalidAddress {
                value: prefix.to_string(),
                reason: format!("expected a prefix of length {} for pool {}", self.bits, self.name),
            });
        }
        if !self.range.contains(prefix) {
            return Err(CompileError::InvalidAddress {
                value: prefix.to_string(),
                reason: format!("outside of pool range {}", self.range),
            });
        }
        let diff = byte_difference(
            &addr_to_bytes(&prefix.addr()),
            &addr_to_bytes(&self.range.addr()),
        )
        .ok_or_else(|| CompileError::InvalidAddress {
            value: prefix.to_string(),
            reason: format!("outside of pool range {}", self.range),
        })?;
        let shift = self.range.max_len() - self.bits;
        Ok(if shift >= 128 { 0 } else { diff >> shift })
    }

    /// Mark the block containing `addr` as bound. Addresses outside the range
    /// are ignored.
    pub fn reserve_addr(&mut self, addr: &IpAddr) -> Result<(), CompileError> {
        if !self.range.contains_addr(addr) {
            debug!("Address {} is outside of pool {}, not reserved", addr, self.name);
            return Ok(());
        }
        let block = IpPrefix::new(*addr, self.bits).map_err(|reason| {
            CompileError::InvalidAddress {
                value: addr.to_string(),
                reason,
            }
        })?;
        let index = self.index_of(&block)?;
        self.bound.insert(index);
        Ok(())
    }

    /// Mark every block overlapping `prefix` as bound. Prefixes outside the
    /// range are ignored.
    pub fn reserve_prefix(&mut self, prefix: &IpPrefix) -> Result<(), CompileError> {
        if prefix.is_ipv4() != self.range.is_ipv4() {
            return Ok(());
        }
        if prefix.len() < self.bits {
            if !self.range.contains(prefix) && !prefix.contains(&self.range) {
                return Ok(());
            }
            // Larger than a block: bind every contained block
            let start = if prefix.contains(&self.range) {
                IpPrefix::new(self.range.addr(), self.bits)
            } else {
                IpPrefix::new(prefix.addr(), self.bits)
            }
            .map_err(|reason| CompileError::InvalidAddress {
                value: prefix.to_string(),
                reason,
            })?;
            let first = self.index_of(&start)?;
            let span_bits = self.bits - prefix.len().max(self.range.len());
            let count = if span_bits >= 128 { u128::MAX } else { 1u128 << span_bits };
            let mut index = first;
            let mut remaining = count;
            while remaining > 0 && index <= self.last_index() {
                self.bound.insert(index);
                remaining -= 1;
                match index.checked_add(1) {
                    Some(next) => index = next,
                    None => break,
                }
            }
            Ok(())
        } else {
            if !self.range.contains(prefix) {
                return Ok(());
            }
            let block = IpPrefix::new(prefix.addr(), self.bits).map_err(|reason| {
                CompileError::InvalidAddress {
                    value: prefix.to_string(),
                    reason,
                }
            })?;
            let index = self.index_of(&block)?;
            self.bound.insert(index);
            Ok(())
        }
    }

    /// Return the first `count` unbound blocks in index order and mark them
    /// bound.
    pub fn available_prefixes(&mut self, count: usize) -> Result<Vec<IpPrefix>, CompileError> {
        let required = (count as u128).saturating_add(self.bound_count());
        if !self.is_enough(required) {
            return Err(CompileError::PoolExhausted {
                pool: self.name.clone(),
                required,
            });
        }
        let mut indices = Vec::with_capacity(count);
        let mut index: u128 = 0;
        while indices.len() < count && index <= self.last_index() {
            if !self.bound.contains(&index) {
                indices.push(index);
            }
            match index.checked_add(1) {
                Some(next) => index = next,
                None => break,
            }
        }
        if indices.len() < count {
            return Err(CompileError::PoolExhausted {
                pool: self.name.clone(),
                required,
            });
        }
        let mut prefixes = Vec::with_capacity(count);
        for index in indices {
            self.bound.insert(index);
            prefixes.push(self.get(index)?);
        }
        Ok(prefixes)
    }
}
