//! Ethplorer API client (Ethereum mainnet only)

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::chain::Chain;
use crate::error::{ProviderError, Result};
use crate::provider::http::HttpFetcher;
use crate::provider::normalize::{parse_amount, parse_amount_str, parse_decimals, parse_timestamp};
use crate::provider::{Capability, HolderPage, PageCursor, ProviderKind, TokenDataProvider, TransferPage};
use crate::types::{Address, ContractCreationInfo, HolderRecord, TimeWindow, TokenMeta};

const ETHPLORER_BASE: &str = "https://api.ethplorer.io";
/// Hard cap of getTopTokenHolders
const MAX_HOLDERS: u32 = 1000;

/// Ethplorer client
pub struct EthplorerClient {
    http: HttpFetcher,
    api_key: String,
    base_url: String,
    max_holders: u32,
}

impl EthplorerClient {
    pub fn new(api_key: String, timeout: Duration, max_holders: u32) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(ProviderKind::Ethplorer, timeout)?,
            api_key,
            base_url: ETHPLORER_BASE.to_string(),
            max_holders: max_holders.clamp(1, MAX_HOLDERS),
        })
    }

    async fn get(&self, path: &str, extra: &[(&str, String)]) -> std::result::Result<Value, ProviderError> {
        let mut params = vec![("apiKey", self.api_key.clone())];
        params.extend(extra.iter().cloned());
        let url = self.http.url(&format!("{}/{}", self.base_url, path), &params)?;
        let body: Value = self.http.get_json(url).await?;
        check_error(&body)?;
        Ok(body)
    }
}

#[async_trait]
impl TokenDataProvider for EthplorerClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ethplorer
    }

    fn supports(&self, chain: Chain, capability: Capability) -> bool {
        chain == Chain::Ethereum && !matches!(capability, Capability::Transfers)
    }

    async fn token_meta(&self, chain: Chain, token: &Address) -> std::result::Result<TokenMeta, ProviderError> {
        if !self.supports(chain, Capability::TokenMeta) {
            return Err(self.unsupported(chain, Capability::TokenMeta));
        }
        let body = self.get(&format!("getTokenInfo/{}", token), &[]).await?;
        let info: TokenInfo = serde_json::from_value(body)
            .map_err(|e| ProviderError::malformed(ProviderKind::Ethplorer, e.to_string()))?;
        parse_meta(chain, token, info)
    }

    async fn holders_page(
        &self,
        chain: Chain,
        token: &Address,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<HolderPage, ProviderError> {
        if !self.supports(chain, Capability::Holders) {
            return Err(self.unsupported(chain, Capability::Holders));
        }
        // Single-shot endpoint: only page 1 exists
        if page > 1 {
            return Ok(HolderPage {
                holders: Vec::new(),
                cursor: PageCursor::Capped,
            });
        }
        let limit = page_size.clamp(1, self.max_holders);
        debug!("Fetching Ethplorer top {} holders for {}", limit, token);
        let body = self
            .get(&format!("getTopTokenHolders/{}", token), &[("limit", limit.to_string())])
            .await?;
        let top: TopHolders = serde_json::from_value(body)
            .map_err(|e| ProviderError::malformed(ProviderKind::Ethplorer, e.to_string()))?;
        parse_holders(top, limit)
    }

    async fn contract_creation(
        &self,
        chain: Chain,
        token: &Address,
    ) -> std::result::Result<Option<ContractCreationInfo>, ProviderError> {
        if !self.supports(chain, Capability::ContractCreation) {
            return Err(self.unsupported(chain, Capability::ContractCreation));
        }
        let body = self.get(&format!("getAddressInfo/{}", token), &[]).await?;
        let info: AddressInfo = serde_json::from_value(body)
            .map_err(|e| ProviderError::malformed(ProviderKind::Ethplorer, e.to_string()))?;
        parse_creation(info)
    }

    async fn transfers_page(
        &self,
        chain: Chain,
        _token: &Address,
        _window: &TimeWindow,
        _page: u32,
    ) -> std::result::Result<TransferPage, ProviderError> {
        Err(self.unsupported(chain, Capability::Transfers))
    }

    fn holder_page_limit(&self) -> u32 {
        self.max_holders
    }
}

/// Ethplorer reports failures as `{"error": {"code": .., "message": ..}}`
fn check_error(body: &Value) -> std::result::Result<(), ProviderError> {
    const P: ProviderKind = ProviderKind::Ethplorer;
    let error = match body.get("error") {
        Some(e) if !e.is_null() => e,
        _ => return Ok(()),
    };
    let code = error.get("code").and_then(Value::as_u64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    if message.to_ascii_lowercase().contains("limit") {
        return Err(ProviderError::RateLimited {
            provider: P,
            retry_after: None,
        });
    }
    Err(ProviderError::Client {
        provider: P,
        status: code.min(u16::MAX as u64) as u16,
        body: message,
    })
}

fn parse_meta(chain: Chain, token: &Address, info: TokenInfo) -> std::result::Result<TokenMeta, ProviderError> {
    const P: ProviderKind = ProviderKind::Ethplorer;
    let supply = info
        .total_supply
        .ok_or_else(|| ProviderError::malformed(P, "missing totalSupply"))?;
    let decimals = match info.decimals {
        Some(d) => parse_decimals(P, &d)?,
        None => 18,
    };
    Ok(TokenMeta {
        address: token.clone(),
        chain,
        name: info.name.unwrap_or_default(),
        symbol: info.symbol.unwrap_or_default(),
        decimals,
        total_supply: parse_amount(P, "totalSupply", &supply)?,
    })
}

fn parse_holders(top: TopHolders, limit: u32) -> std::result::Result<HolderPage, ProviderError> {
    const P: ProviderKind = ProviderKind::Ethplorer;
    let returned = top.holders.len();

    let mut holders = Vec::with_capacity(returned);
    for h in top.holders {
        // rawBalance is exact; balance is a float in the same unit
        let balance = match (&h.raw_balance, &h.balance) {
            (Some(raw), _) => parse_amount_str(P, "rawBalance", raw)?,
            (None, Some(b)) => parse_amount(P, "balance", b)?,
            (None, None) => return Err(ProviderError::malformed(P, "holder without balance")),
        };
        holders.push(HolderRecord::new(Address::new(&h.address), balance));
    }

    // A full page may hide more holders; the follow-up request reports the cap
    let cursor = if returned >= limit as usize {
        PageCursor::More
    } else {
        PageCursor::Exhausted
    };
    Ok(HolderPage { holders, cursor })
}

fn parse_creation(info: AddressInfo) -> std::result::Result<Option<ContractCreationInfo>, ProviderError> {
    const P: ProviderKind = ProviderKind::Ethplorer;
    let contract = match info.contract_info {
        Some(c) => c,
        None => return Ok(None),
    };
    let (creator, timestamp) = match (contract.creator_address, contract.timestamp) {
        (Some(c), Some(t)) => (c, t),
        _ => return Ok(None),
    };
    Ok(Some(ContractCreationInfo {
        creator: Address::new(&creator),
        timestamp: parse_timestamp(P, "contractInfo.timestamp", &timestamp)?,
        tx_hash: contract.transaction_hash.unwrap_or_default().to_ascii_lowercase(),
    }))
}

// ============ Ethplorer API Response Types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<Value>,
    total_supply: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TopHolders {
    #[serde(default)]
    holders: Vec<TopHolder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopHolder {
    address: String,
    balance: Option<Value>,
    raw_balance: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressInfo {
    contract_info: Option<ContractInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractInfo {
    creator_address: Option<String>,
    transaction_hash: Option<String>,
    timestamp: Option<Value>,
}
