//! Supported networks and their provider presets

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;

/// EVM networks the exporter knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Bsc,
    Arbitrum,
    Optimism,
}

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::Ethereum,
        Chain::Polygon,
        Chain::Bsc,
        Chain::Arbitrum,
        Chain::Optimism,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Bsc => "bsc",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Polygon => 137,
            Chain::Bsc => 56,
            Chain::Arbitrum => 42161,
            Chain::Optimism => 10,
        }
    }

    /// Chain slug used in Covalent URLs
    pub fn covalent_slug(&self) -> &'static str {
        match self {
            Chain::Ethereum => "eth-mainnet",
            Chain::Polygon => "matic-mainnet",
            Chain::Bsc => "bsc-mainnet",
            Chain::Arbitrum => "arbitrum-mainnet",
            Chain::Optimism => "optimism-mainnet",
        }
    }

    /// Etherscan-compatible explorer API base
    pub fn explorer_api(&self) -> &'static str {
        match self {
            Chain::Ethereum => "https://api.etherscan.io/api",
            Chain::Polygon => "https://api.polygonscan.com/api",
            Chain::Bsc => "https://api.bscscan.com/api",
            Chain::Arbitrum => "https://api.arbiscan.io/api",
            Chain::Optimism => "https://api-optimistic.etherscan.io/api",
        }
    }

    /// Environment variable holding the explorer API key
    pub fn explorer_key_env(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETHERSCAN_API_KEY",
            Chain::Polygon => "POLYGONSCAN_API_KEY",
            Chain::Bsc => "BSCSCAN_API_KEY",
            Chain::Arbitrum => "ARBISCAN_API_KEY",
            Chain::Optimism => "OPTIMISTIC_ETHERSCAN_API_KEY",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Chain::ALL
            .iter()
            .copied()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| Error::UnknownChain(s.to_string()))
    }
}
