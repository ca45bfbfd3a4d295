//! Blockchain data providers
//!
//! Every backend implements [`TokenDataProvider`]. The [`ProviderRouter`]
//! only talks to the trait, so backends can be swapped for fakes in tests.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::chain::Chain;
use crate::error::{Error, ProviderError};
use crate::types::{Address, ContractCreationInfo, HolderRecord, TimeWindow, TokenMeta, TransferEvent};

pub mod covalent;
pub mod ethplorer;
pub mod explorer;
pub mod fallback;
pub mod http;
pub mod normalize;
pub mod retry;
pub mod router;

#[cfg(test)]
pub mod fake;

pub use covalent::CovalentClient;
pub use ethplorer::EthplorerClient;
pub use explorer::ExplorerClient;
pub use fallback::{Emptiness, FallbackPolicy, FallbackState, Selected};
pub use retry::RetryPolicy;
pub use router::{ProviderMode, ProviderRouter, RouterLimits};

/// Backend identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Covalent,
    Ethplorer,
    /// Etherscan-compatible block explorer API
    Explorer,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Covalent => "covalent",
            ProviderKind::Ethplorer => "ethplorer",
            ProviderKind::Explorer => "explorer",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "covalent" => Ok(ProviderKind::Covalent),
            "ethplorer" => Ok(ProviderKind::Ethplorer),
            "explorer" | "etherscan" => Ok(ProviderKind::Explorer),
            _ => Err(Error::UnknownProvider(s.to_string())),
        }
    }
}

/// Independently routed provider capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TokenMeta,
    Holders,
    ContractCreation,
    Transfers,
}

impl Capability {
    /// Fixed auto-mode priority order
    pub fn priority(&self) -> &'static [ProviderKind] {
        match self {
            Capability::TokenMeta | Capability::Holders => {
                &[ProviderKind::Covalent, ProviderKind::Ethplorer]
            }
            Capability::ContractCreation => &[ProviderKind::Explorer, ProviderKind::Ethplorer],
            Capability::Transfers => &[ProviderKind::Explorer, ProviderKind::Covalent],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::TokenMeta => "token metadata",
            Capability::Holders => "holders",
            Capability::ContractCreation => "contract creation",
            Capability::Transfers => "transfers",
        };
        f.write_str(s)
    }
}

/// How a paged listing ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Another page can be requested
    More,
    /// The provider has nothing further
    Exhausted,
    /// The provider cannot page further although more data may exist
    Capped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HolderPage {
    pub holders: Vec<HolderRecord>,
    pub cursor: PageCursor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferPage {
    pub transfers: Vec<TransferEvent>,
    pub cursor: PageCursor,
}

/// Transfers gathered across the pages of one provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferLog {
    pub transfers: Vec<TransferEvent>,
    /// Paging stopped at a cap while more events may exist
    pub truncated: bool,
}

/// Uniform access to one backend
///
/// Each method performs a single request (or a short fixed chain of
/// requests); retries and pagination belong to the router.
#[async_trait]
pub trait TokenDataProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Whether this backend can serve `capability` on `chain`
    fn supports(&self, chain: Chain, capability: Capability) -> bool;

    async fn token_meta(&self, chain: Chain, token: &Address) -> Result<TokenMeta, ProviderError>;

    /// Holder page `page` (1-based), at most `page_size` rows
    async fn holders_page(
        &self,
        chain: Chain,
        token: &Address,
        page: u32,
        page_size: u32,
    ) -> Result<HolderPage, ProviderError>;

    async fn contract_creation(
        &self,
        chain: Chain,
        token: &Address,
    ) -> Result<Option<ContractCreationInfo>, ProviderError>;

    /// Transfer page `page` (1-based) covering `window`
    async fn transfers_page(
        &self,
        chain: Chain,
        token: &Address,
        window: &TimeWindow,
        page: u32,
    ) -> Result<TransferPage, ProviderError>;

    /// Largest page the backend accepts for holder listings
    fn holder_page_limit(&self) -> u32;

    fn unsupported(&self, chain: Chain, capability: Capability) -> ProviderError {
        ProviderError::Unsupported {
            provider: self.kind(),
            capability,
            chain: chain.to_string(),
        }
    }
}
