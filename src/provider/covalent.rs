//! Covalent API client
//!
//! Provides:
//! - Token metadata (from the first holder row)
//! - Paged holder listings
//! - Decoded `Transfer` logs for the early window

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::chain::Chain;
use crate::error::{ProviderError, Result};
use crate::provider::http::HttpFetcher;
use crate::provider::normalize::{parse_amount, parse_decimals, parse_timestamp};
use crate::provider::{Capability, HolderPage, PageCursor, ProviderKind, TokenDataProvider, TransferPage};
use crate::types::{Address, ContractCreationInfo, HolderRecord, TimeWindow, TokenMeta, TransferEvent};

const COVALENT_BASE: &str = "https://api.covalenthq.com/v1";
/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
const MAX_PAGE_SIZE: u32 = 1000;

/// Covalent client
pub struct CovalentClient {
    http: HttpFetcher,
    base_url: String,
    page_size: u32,
}

impl CovalentClient {
    pub fn new(api_key: String, timeout: Duration, page_size: u32) -> Result<Self> {
        let http = HttpFetcher::new(ProviderKind::Covalent, timeout)?.with_bearer(api_key);
        Ok(Self {
            http,
            base_url: COVALENT_BASE.to_string(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    fn holders_url(&self, chain: Chain, token: &Address) -> String {
        format!(
            "{}/{}/tokens/{}/token_holders_v2/",
            self.base_url,
            chain.covalent_slug(),
            token
        )
    }
}

#[async_trait]
impl TokenDataProvider for CovalentClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Covalent
    }

    fn supports(&self, _chain: Chain, capability: Capability) -> bool {
        !matches!(capability, Capability::ContractCreation)
    }

    async fn token_meta(&self, chain: Chain, token: &Address) -> std::result::Result<TokenMeta, ProviderError> {
        let url = self.http.url(
            &self.holders_url(chain, token),
            &[("page-size", "1".to_string()), ("page-number", "0".to_string())],
        )?;
        let envelope: Envelope<HolderItem> = self.http.get_json(url).await?;
        parse_meta(chain, token, envelope)
    }

    async fn holders_page(
        &self,
        chain: Chain,
        token: &Address,
        page: u32,
        page_size: u32,
    ) -> std::result::Result<HolderPage, ProviderError> {
        let page_size = page_size.clamp(1, self.page_size);
        // Covalent pages are zero-based
        let url = self.http.url(
            &self.holders_url(chain, token),
            &[
                ("page-size", page_size.to_string()),
                ("page-number", (page.saturating_sub(1)).to_string()),
            ],
        )?;
        debug!("Fetching Covalent holders page {} for {}", page, token);
        let envelope: Envelope<HolderItem> = self.http.get_json(url).await?;
        parse_holders_page(envelope)
    }

    async fn contract_creation(
        &self,
        chain: Chain,
        _token: &Address,
    ) -> std::result::Result<Option<ContractCreationInfo>, ProviderError> {
        Err(self.unsupported(chain, Capability::ContractCreation))
    }

    async fn transfers_page(
        &self,
        chain: Chain,
        token: &Address,
        window: &TimeWindow,
        page: u32,
    ) -> std::result::Result<TransferPage, ProviderError> {
        let base = format!(
            "{}/{}/events/topics/{}/",
            self.base_url,
            chain.covalent_slug(),
            TRANSFER_TOPIC
        );
        let url = self.http.url(
            &base,
            &[
                ("sender-address", token.to_string()),
                ("from-date", window.start.format("%Y-%m-%d").to_string()),
                // to-date is inclusive of the whole day; the collector trims to the hour
                ("to-date", window.end.format("%Y-%m-%d").to_string()),
                ("page-size", self.page_size.to_string()),
                ("page-number", (page.saturating_sub(1)).to_string()),
            ],
        )?;
        debug!("Fetching Covalent transfer logs page {} for {}", page, token);
        let envelope: Envelope<LogItem> = self.http.get_json(url).await?;
        parse_transfers_page(envelope, self.page_size)
    }

    fn holder_page_limit(&self) -> u32 {
        self.page_size
    }
}

fn parse_meta(
    chain: Chain,
    token: &Address,
    envelope: Envelope<HolderItem>,
) -> std::result::Result<TokenMeta, ProviderError> {
    const P: ProviderKind = ProviderKind::Covalent;
    let data = envelope.into_data()?;
    let item = match data.items.into_iter().next() {
        Some(item) => item,
        None => {
            return Ok(TokenMeta {
                address: token.clone(),
                chain,
                name: String::new(),
                symbol: String::new(),
                decimals: 0,
                total_supply: Default::default(),
            })
        }
    };

    // Older responses nest the token fields under contract_metadata
    let nested = item.contract_metadata.unwrap_or_default();
    let decimals = item.contract_decimals.as_ref().or(nested.contract_decimals.as_ref());
    let supply = item.total_supply.as_ref().or(nested.total_supply.as_ref());

    let decimals = decimals.ok_or_else(|| ProviderError::malformed(P, "missing contract_decimals"))?;
    let supply = supply.ok_or_else(|| ProviderError::malformed(P, "missing total_supply"))?;

    Ok(TokenMeta {
        address: token.clone(),
        chain,
        name: item.contract_name.or(nested.contract_name).unwrap_or_default(),
        symbol: item
            .contract_ticker_symbol
            .or(nested.contract_ticker_symbol)
            .unwrap_or_default(),
        decimals: parse_decimals(P, decimals)?,
        total_supply: parse_amount(P, "total_supply", supply)?,
    })
}

fn parse_holders_page(envelope: Envelope<HolderItem>) -> std::result::Result<HolderPage, ProviderError> {
    const P: ProviderKind = ProviderKind::Covalent;
    let data = envelope.into_data()?;

    let mut holders = Vec::with_capacity(data.items.len());
    for item in data.items {
        let address = item
            .address
            .as_deref()
            .ok_or_else(|| ProviderError::malformed(P, "holder without address"))?;
        let balance = item
            .balance
            .as_ref()
            .ok_or_else(|| ProviderError::malformed(P, "holder without balance"))?;
        holders.push(HolderRecord::new(Address::new(address), parse_amount(P, "balance", balance)?));
    }

    let cursor = match data.pagination {
        Some(p) if p.has_more => PageCursor::More,
        _ => PageCursor::Exhausted,
    };
    Ok(HolderPage { holders, cursor })
}

fn parse_transfers_page(
    envelope: Envelope<LogItem>,
    page_size: u32,
) -> std::result::Result<TransferPage, ProviderError> {
    const P: ProviderKind = ProviderKind::Covalent;
    let data = envelope.into_data()?;
    let returned = data.items.len();

    let mut transfers = Vec::with_capacity(returned);
    for item in data.items {
        let decoded = match item.decoded {
            Some(d) => d,
            None => continue,
        };
        let param = |name: &str| decoded.params.iter().find(|p| p.name == name).map(|p| &p.value);
        let (from, to, value) = match (param("from"), param("to"), param("value")) {
            (Some(Value::String(f)), Some(Value::String(t)), Some(v)) => (f, t, v),
            _ => continue,
        };
        let signed_at = item
            .block_signed_at
            .as_ref()
            .ok_or_else(|| ProviderError::malformed(P, "log without block_signed_at"))?;

        transfers.push(TransferEvent {
            from: Address::new(from),
            to: Address::new(to),
            value: parse_amount(P, "value", value)?,
            timestamp: parse_timestamp(P, "block_signed_at", signed_at)?,
            tx_hash: item.tx_hash.unwrap_or_default().to_ascii_lowercase(),
        });
    }

    let cursor = match data.pagination {
        Some(p) if p.has_more => PageCursor::More,
        Some(_) => PageCursor::Exhausted,
        None if returned >= page_size as usize => PageCursor::More,
        None => PageCursor::Exhausted,
    };
    Ok(TransferPage { transfers, cursor })
}

// ============ Covalent API Response Types ============

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<EnvelopeData<T>>,
    #[serde(default)]
    error: bool,
    error_message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> std::result::Result<EnvelopeData<T>, ProviderError> {
        if self.error {
            return Err(ProviderError::malformed(
                ProviderKind::Covalent,
                self.error_message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| ProviderError::malformed(ProviderKind::Covalent, "response without data"))
    }
}

#[derive(Debug, Deserialize)]
struct EnvelopeData<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct HolderItem {
    address: Option<String>,
    balance: Option<Value>,
    total_supply: Option<Value>,
    contract_decimals: Option<Value>,
    contract_name: Option<String>,
    contract_ticker_symbol: Option<String>,
    contract_metadata: Option<ContractMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ContractMetadata {
    total_supply: Option<Value>,
    contract_decimals: Option<Value>,
    contract_name: Option<String>,
    contract_ticker_symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogItem {
    block_signed_at: Option<Value>,
    tx_hash: Option<String>,
    decoded: Option<DecodedLog>,
}

#[derive(Debug, Deserialize)]
struct DecodedLog {
    #[serde(default)]
    params: Vec<DecodedParam>,
}

#[derive(Debug, Deserialize)]
struct DecodedParam {
    name: String,
    value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use serde_json::json;

    fn token() -> Address {
        Address::new("0x1111111111111111111111111111111111111111")
    }

    #[test]
    fn test_parse_meta_flat() {
        let body = json!({
            "data": {
                "items": [{
                    "contract_decimals": 18,
                    "contract_name": "Example",
                    "contract_ticker_symbol": "EXM",
                    "address": "0xAAA",
                    "balance": "5",
                    "total_supply": "1000000000000000000000000"
                }],
                "pagination": { "has_more": true }
            },
            "error": false
        });
        let envelope: Envelope<HolderItem> = serde_json::from_value(body).unwrap();
        let meta = parse_meta(Chain::Ethereum, &token(), envelope).unwrap();
        assert_eq!(meta.decimals, 18);
        assert_eq!(meta.symbol, "EXM");
        assert_eq!(
            meta.total_supply,
            U256::from_str_radix("1000000000000000000000000", 10).unwrap()
        );
    }

    #[test]
    fn test_parse_meta_nested() {
        let body = json!({
            "data": { "items": [{
                "address": "0xaaa",
                "balance": "5",
                "contract_metadata": {
                    "total_supply": "0x64",
                    "contract_decimals": "2",
                    "contract_name": "Nested",
                    "contract_ticker_symbol": "NST"
                }
            }]}
        });
        let envelope: Envelope<HolderItem> = serde_json::from_value(body).unwrap();
        let meta = parse_meta(Chain::Polygon, &token(), envelope).unwrap();
        assert_eq!(meta.total_supply, U256::from(100u64));
        assert_eq!(meta.decimals, 2);
        assert_eq!(meta.name, "Nested");
    }

    #[test]
    fn test_parse_holders_page() {
        let body = json!({
            "data": {
                "items": [
                    { "address": "0xAAAA", "balance": "700" },
                    { "address": "0xbbbb", "balance": "300" }
                ],
                "pagination": { "has_more": false }
            }
        });
        let envelope: Envelope<HolderItem> = serde_json::from_value(body).unwrap();
        let page = parse_holders_page(envelope).unwrap();
        assert_eq!(page.holders.len(), 2);
        assert_eq!(page.holders[0].address.as_str(), "0xaaaa");
        assert_eq!(page.holders[0].balance, U256::from(700u64));
        assert_eq!(page.cursor, PageCursor::Exhausted);
    }

    #[test]
    fn test_error_envelope() {
        let body = json!({ "data": null, "error": true, "error_message": "Invalid API key" });
        let envelope: Envelope<HolderItem> = serde_json::from_value(body).unwrap();
        assert!(matches!(
            parse_holders_page(envelope),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_transfer_logs() {
        let body = json!({
            "data": {
                "items": [
                    {
                        "block_signed_at": "2024-01-01T01:00:00Z",
                        "tx_hash": "0xABC",
                        "decoded": { "name": "Transfer", "params": [
                            { "name": "from", "value": "0xC0" },
                            { "name": "to", "value": "0xD0" },
                            { "name": "value", "value": "100000" }
                        ]}
                    },
                    { "block_signed_at": "2024-01-01T02:00:00Z", "tx_hash": "0xdef", "decoded": null }
                ],
                "pagination": { "has_more": true }
            }
        });
        let envelope: Envelope<LogItem> = serde_json::from_value(body).unwrap();
        let page = parse_transfers_page(envelope, 1000).unwrap();
        assert_eq!(page.transfers.len(), 1);
        assert_eq!(page.transfers[0].from.as_str(), "0xc0");
        assert_eq!(page.transfers[0].tx_hash, "0xabc");
        assert_eq!(page.transfers[0].value, U256::from(100_000u64));
        assert_eq!(page.cursor, PageCursor::More);
    }
}
