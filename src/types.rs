//! Core domain types shared by providers and the pipeline

use std::fmt;

use alloy_primitives::U256;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;

use crate::amount::{u256_decimal, Share};
use crate::chain::Chain;
use crate::error::{Error, Result};

lazy_static::lazy_static! {
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0x[0-9a-f]{40}$").unwrap();
}

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Lowercased account or contract address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Normalize without validation (provider payloads, user lists)
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    /// Normalize and require a well-formed 20-byte hex address
    pub fn parse(raw: &str) -> Result<Self> {
        let address = Self::new(raw);
        if address.is_well_formed() {
            Ok(address)
        } else {
            Err(Error::InvalidAddress(raw.to_string()))
        }
    }

    pub fn is_well_formed(&self) -> bool {
        EVM_ADDRESS.is_match(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == ZERO_ADDRESS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters, used in output file names
    pub fn short(&self) -> &str {
        let end = self.0.len().min(6);
        &self.0[..end]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token metadata as reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenMeta {
    pub address: Address,
    pub chain: Chain,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(serialize_with = "u256_decimal::serialize")]
    pub total_supply: U256,
}

/// One row of a holder snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderRecord {
    pub address: Address,
    #[serde(serialize_with = "u256_decimal::serialize")]
    pub balance: U256,
}

impl HolderRecord {
    pub fn new(address: Address, balance: U256) -> Self {
        Self { address, balance }
    }

    pub fn share(&self, total_supply: U256) -> Share {
        Share::of(self.balance, total_supply)
    }
}

/// Ranked holders plus how the provider ended the listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolderSnapshot {
    pub holders: Vec<HolderRecord>,
    /// Requested count could not be reached because of a provider page cap
    pub truncated: bool,
}

impl HolderSnapshot {
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn total_balance(&self) -> U256 {
        self.holders
            .iter()
            .fold(U256::ZERO, |acc, h| acc.saturating_add(h.balance))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.holders.iter().any(|h| &h.address == address)
    }
}

/// Deployment facts for the token contract
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractCreationInfo {
    pub creator: Address,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

/// Single token transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    #[serde(serialize_with = "u256_decimal::serialize")]
    pub value: U256,
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
}

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window of `hours` starting at `start`; the end saturates at the latest representable time
    pub fn after(start: DateTime<Utc>, hours: u32) -> Self {
        let end = start
            .checked_add_signed(Duration::hours(i64::from(hours)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
