//! Etherscan-compatible explorer client
//!
//! Serves contract-creation lookups and token transfer listings. Holder
//! listings and token info sit behind paid tiers on these explorers, so
//! those capabilities are left to other providers.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::chain::Chain;
use crate::error::{ProviderError, Result};
use crate::provider::http::HttpFetcher;
use crate::provider::normalize::{parse_amount, parse_block_number, parse_timestamp};
use crate::provider::{Capability, HolderPage, PageCursor, ProviderKind, TokenDataProvider, TransferPage};
use crate::types::{Address, ContractCreationInfo, TimeWindow, TokenMeta, TransferEvent};

const P: ProviderKind = ProviderKind::Explorer;
/// Explorers refuse `page * offset` beyond this
const MAX_RESULT_WINDOW: u32 = 10_000;

/// Explorer client holding one API key per chain
pub struct ExplorerClient {
    http: HttpFetcher,
    api_keys: BTreeMap<Chain, String>,
    page_size: u32,
    /// Block range resolved for the last requested window
    block_range: Mutex<Option<(TimeWindow, BlockRange)>>,
}

impl ExplorerClient {
    pub fn new(api_keys: BTreeMap<Chain, String>, timeout: Duration, page_size: u32) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(P, timeout)?,
            api_keys,
            page_size: page_size.clamp(1, MAX_RESULT_WINDOW),
            block_range: Mutex::new(None),
        })
    }

    fn api_key(&self, chain: Chain) -> std::result::Result<&str, ProviderError> {
        self.api_keys
            .get(&chain)
            .map(String::as_str)
            .ok_or_else(|| self.unsupported(chain, Capability::Transfers))
    }

    /// Standard `module`/`action` call, returns the `result` field
    async fn call(&self, chain: Chain, params: &[(&str, String)]) -> std::result::Result<Value, ProviderError> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("apikey", self.api_key(chain)?.to_string()));
        let url = self.http.url(chain.explorer_api(), &query)?;
        let body: ExplorerEnvelope = self.http.get_json(url).await?;
        body.into_result()
    }

    /// `module=proxy` JSON-RPC passthrough, returns the `result` field
    async fn proxy(&self, chain: Chain, params: &[(&str, String)]) -> std::result::Result<Value, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![("module", "proxy".to_string())];
        query.extend(params.iter().cloned());
        query.push(("apikey", self.api_key(chain)?.to_string()));
        let url = self.http.url(chain.explorer_api(), &query)?;
        let body: Value = self.http.get_json(url).await?;
        proxy_result(body)
    }

    async fn block_timestamp(&self, chain: Chain, tx_hash: &str) -> std::result::Result<Option<DateTime<Utc>>, ProviderError> {
        let tx = self
            .proxy(
                chain,
                &[
                    ("action", "eth_getTransactionByHash".to_string()),
                    ("txhash", tx_hash.to_string()),
                ],
            )
            .await?;
        let block = match tx.get("blockNumber").and_then(Value::as_str) {
            Some(b) => b.to_string(),
            None => return Ok(None),
        };

        let block = self
            .proxy(
                chain,
                &[
                    ("action", "eth_getBlockByNumber".to_string()),
                    ("tag", block),
                    ("boolean", "false".to_string()),
                ],
            )
            .await?;
        match block.get("timestamp") {
            Some(ts) if !ts.is_null() => Ok(Some(parse_timestamp(P, "block.timestamp", ts)?)),
            _ => Ok(None),
        }
    }

    async fn block_at(&self, chain: Chain, at: DateTime<Utc>, closest: &str) -> std::result::Result<u64, ProviderError> {
        let result = self
            .call(
                chain,
                &[
                    ("module", "block".to_string()),
                    ("action", "getblocknobytime".to_string()),
                    ("timestamp", at.timestamp().to_string()),
                    ("closest", closest.to_string()),
                ],
            )
            .await?;
        match result {
            Value::String(s) => parse_block_number(P, &s),
            Value::Number(n) => n.as_u64().ok_or_else(|| ProviderError::malformed(P, "invalid block number")),
            other => Err(ProviderError::malformed(P, format!("unexpected block result: {}", other))),
        }
    }

    async fn window_blocks(&self, chain: Chain, window: &TimeWindow) -> std::result::Result<BlockRange, ProviderError> {
        if let Ok(cached) = self.block_range.lock() {
            if let Some((w, range)) = cached.as_ref() {
                if w == window {
                    return Ok(*range);
                }
            }
        }

        let start = self.block_at(chain, window.start, "after").await?;
        // Windows reaching the present stay open-ended; the collector filters by time
        let end = if window.end >= Utc::now() {
            None
        } else {
            Some(self.block_at(chain, window.end, "before").await?)
        };
        let range = BlockRange { start, end };
        debug!("Window {} .. {} maps to blocks {:?}", window.start, window.end, range);

        if let Ok(mut cached) = self.block_range.lock() {
            *cached = Some((*window, range));
        }
        Ok(range)
    }
}

#[async_trait]
impl TokenDataProvider for ExplorerClient {
    fn kind(&self) -> ProviderKind {
        P
    }

    fn supports(&self, chain: Chain, capability: Capability) -> bool {
        self.api_keys.contains_key(&chain)
            && matches!(capability, Capability::ContractCreation | Capability::Transfers)
    }

    async fn token_meta(&self, chain: Chain, _token: &Address) -> std::result::Result<TokenMeta, ProviderError> {
        Err(self.unsupported(chain, Capability::TokenMeta))
    }

    async fn holders_page(
        &self,
        chain: Chain,
        _token: &Address,
        _page: u32,
        _page_size: u32,
    ) -> std::result::Result<HolderPage, ProviderError> {
        Err(self.unsupported(chain, Capability::Holders))
    }

    async fn contract_creation(
        &self,
        chain: Chain,
        token: &Address,
    ) -> std::result::Result<Option<ContractCreationInfo>, ProviderError> {
        let result = self
            .call(
                chain,
                &[
                    ("module", "contract".to_string()),
                    ("action", "getcontractcreation".to_string()),
                    ("contractaddresses", token.to_string()),
                ],
            )
            .await?;
        let entry = match parse_creation_entry(result)? {
            Some(e) => e,
            None => return Ok(None),
        };

        // Newer explorers include the timestamp directly
        let timestamp = match &entry.timestamp {
            Some(ts) => Some(parse_timestamp(P, "timestamp", ts)?),
            None => self.block_timestamp(chain, &entry.tx_hash).await?,
        };

        Ok(timestamp.map(|timestamp| ContractCreationInfo {
            creator: Address::new(&entry.contract_creator),
            timestamp,
            tx_hash: entry.tx_hash.to_ascii_lowercase(),
        }))
    }

    async fn transfers_page(
        &self,
        chain: Chain,
        token: &Address,
        window: &TimeWindow,
        page: u32,
    ) -> std::result::Result<TransferPage, ProviderError> {
        if page.saturating_mul(self.page_size) > MAX_RESULT_WINDOW {
            return Ok(TransferPage {
                transfers: Vec::new(),
                cursor: PageCursor::Capped,
            });
        }
        let range = self.window_blocks(chain, window).await?;
        debug!("Fetching explorer transfers page {} for {}", page, token);

        let result = self
            .call(chain, &tokentx_params(token, range, page, self.page_size))
            .await?;
        parse_transfers(result, self.page_size)
    }

    fn holder_page_limit(&self) -> u32 {
        0
    }
}

/// Block bounds of a time window; `end` is `None` when the window reaches the present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockRange {
    start: u64,
    end: Option<u64>,
}

fn tokentx_params(token: &Address, range: BlockRange, page: u32, offset: u32) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("module", "account".to_string()),
        ("action", "tokentx".to_string()),
        ("contractaddress", token.to_string()),
        ("startblock", range.start.to_string()),
    ];
    if let Some(end) = range.end {
        params.push(("endblock", end.to_string()));
    }
    params.extend([
        ("page", page.to_string()),
        ("offset", offset.to_string()),
        ("sort", "asc".to_string()),
    ]);
    params
}

/// Unwrap an explorer envelope, mapping NOTOK messages to error kinds
fn check_envelope(status: &str, message: &str, result: Value) -> std::result::Result<Value, ProviderError> {
    if status == "1" {
        return Ok(result);
    }

    let detail = match &result {
        Value::String(s) => s.clone(),
        _ => String::new(),
    };
    let text = format!("{} {}", message, detail).to_ascii_lowercase();

    if text.contains("no transactions found") || text.contains("no records found") || text.contains("no data found") {
        return Ok(Value::Array(Vec::new()));
    }
    if text.contains("rate limit") {
        return Err(ProviderError::RateLimited {
            provider: P,
            retry_after: None,
        });
    }
    if text.contains("api key") || text.contains("invalid") {
        return Err(ProviderError::Client {
            provider: P,
            status: 400,
            body: format!("{}: {}", message, detail),
        });
    }
    Err(ProviderError::malformed(P, format!("{}: {}", message, detail)))
}

fn proxy_result(body: Value) -> std::result::Result<Value, ProviderError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let message = error.get("message").and_then(Value::as_str).unwrap_or("rpc error");
        return Err(ProviderError::Client {
            provider: P,
            status: 400,
            body: message.to_string(),
        });
    }
    // Rate-limit and key errors come back in the standard envelope
    if let (Some(status), Some(message)) = (
        body.get("status").and_then(Value::as_str),
        body.get("message").and_then(Value::as_str),
    ) {
        let result = body.get("result").cloned().unwrap_or(Value::Null);
        return check_envelope(status, message, result);
    }
    Ok(body.get("result").cloned().unwrap_or(Value::Null))
}

fn parse_creation_entry(result: Value) -> std::result::Result<Option<CreationEntry>, ProviderError> {
    let entries: Vec<CreationEntry> =
        serde_json::from_value(result).map_err(|e| ProviderError::malformed(P, e.to_string()))?;
    Ok(entries.into_iter().next())
}

fn parse_transfers(result: Value, page_size: u32) -> std::result::Result<TransferPage, ProviderError> {
    let rows: Vec<TokenTx> = serde_json::from_value(result).map_err(|e| ProviderError::malformed(P, e.to_string()))?;
    let returned = rows.len();

    let transfers = rows
        .into_iter()
        .map(|tx| {
            Ok(TransferEvent {
                from: Address::new(&tx.from),
                to: Address::new(&tx.to),
                value: parse_amount(P, "value", &tx.value)?,
                timestamp: parse_timestamp(P, "timeStamp", &tx.time_stamp)?,
                tx_hash: tx.hash.to_ascii_lowercase(),
            })
        })
        .collect::<std::result::Result<Vec<_>, ProviderError>>()?;

    let cursor = if returned >= page_size as usize {
        PageCursor::More
    } else {
        PageCursor::Exhausted
    };
    Ok(TransferPage { transfers, cursor })
}

// ============ Explorer API Response Types ============

#[derive(Debug, Deserialize)]
struct ExplorerEnvelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl ExplorerEnvelope {
    fn into_result(self) -> std::result::Result<Value, ProviderError> {
        check_envelope(&self.status, &self.message, self.result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreationEntry {
    contract_creator: String,
    tx_hash: String,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTx {
    time_stamp: Value,
    hash: String,
    from: String,
    to: String,
    value: Value,
}
