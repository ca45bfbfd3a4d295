//! Scripted in-memory provider for router and pipeline tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use alloy_primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chain::Chain;
use crate::error::ProviderError;
use crate::provider::{Capability, HolderPage, PageCursor, ProviderKind, TokenDataProvider, TransferPage};
use crate::types::{Address, ContractCreationInfo, HolderRecord, TimeWindow, TokenMeta, TransferEvent};

/// Queue of canned responses; the last one repeats forever
struct Script<T> {
    queue: Mutex<VecDeque<Result<T, ProviderError>>>,
    calls: AtomicU32,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    fn push(&self, response: Result<T, ProviderError>) {
        self.queue.lock().unwrap().push_back(response);
    }

    fn is_scripted(&self) -> bool {
        !self.queue.lock().unwrap().is_empty()
    }

    fn next(&self, unscripted: ProviderError) -> Result<T, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(Err(unscripted))
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct FakeProvider {
    kind: ProviderKind,
    page_limit: u32,
    meta: Script<TokenMeta>,
    holders: Script<HolderPage>,
    creation: Script<Option<ContractCreationInfo>>,
    transfers: Script<TransferPage>,
}

impl FakeProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            page_limit: 1000,
            meta: Script::new(),
            holders: Script::new(),
            creation: Script::new(),
            transfers: Script::new(),
        }
    }

    pub fn page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn meta(self, response: Result<TokenMeta, ProviderError>) -> Self {
        self.meta.push(response);
        self
    }

    pub fn holders_page(self, response: Result<HolderPage, ProviderError>) -> Self {
        self.holders.push(response);
        self
    }

    /// Single final page holding `holders`
    pub fn holders(self, holders: Vec<HolderRecord>) -> Self {
        self.holders_page(Ok(HolderPage {
            holders,
            cursor: PageCursor::Exhausted,
        }))
    }

    pub fn creation(self, response: Result<Option<ContractCreationInfo>, ProviderError>) -> Self {
        self.creation.push(response);
        self
    }

    pub fn transfers_page(self, response: Result<TransferPage, ProviderError>) -> Self {
        self.transfers.push(response);
        self
    }

    /// Single final page holding `transfers`
    pub fn transfers(self, transfers: Vec<TransferEvent>) -> Self {
        self.transfers_page(Ok(TransferPage {
            transfers,
            cursor: PageCursor::Exhausted,
        }))
    }

    pub fn calls(&self, capability: Capability) -> u32 {
        match capability {
            Capability::TokenMeta => self.meta.calls(),
            Capability::Holders => self.holders.calls(),
            Capability::ContractCreation => self.creation.calls(),
            Capability::Transfers => self.transfers.calls(),
        }
    }
}

#[async_trait]
impl TokenDataProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn supports(&self, _chain: Chain, capability: Capability) -> bool {
        match capability {
            Capability::TokenMeta => self.meta.is_scripted(),
            Capability::Holders => self.holders.is_scripted(),
            Capability::ContractCreation => self.creation.is_scripted(),
            Capability::Transfers => self.transfers.is_scripted(),
        }
    }

    async fn token_meta(&self, chain: Chain, _token: &Address) -> Result<TokenMeta, ProviderError> {
        self.meta.next(self.unsupported(chain, Capability::TokenMeta))
    }

    async fn holders_page(
        &self,
        chain: Chain,
        _token: &Address,
        _page: u32,
        _page_size: u32,
    ) -> Result<HolderPage, ProviderError> {
        self.holders.next(self.unsupported(chain, Capability::Holders))
    }

    async fn contract_creation(
        &self,
        chain: Chain,
        _token: &Address,
    ) -> Result<Option<ContractCreationInfo>, ProviderError> {
        self.creation.next(self.unsupported(chain, Capability::ContractCreation))
    }

    async fn transfers_page(
        &self,
        chain: Chain,
        _token: &Address,
        _window: &TimeWindow,
        _page: u32,
    ) -> Result<TransferPage, ProviderError> {
        self.transfers.next(self.unsupported(chain, Capability::Transfers))
    }

    fn holder_page_limit(&self) -> u32 {
        self.page_limit
    }
}

// ============ Fixture helpers ============

/// Well-formed address ending in `tag`
pub fn addr(tag: &str) -> Address {
    Address::new(&format!("0x{:0>40}", tag))
}

pub fn token() -> Address {
    addr("70c0")
}

pub fn meta(total_supply: u64, decimals: u8) -> TokenMeta {
    TokenMeta {
        address: token(),
        chain: Chain::Ethereum,
        name: "Fixture".to_string(),
        symbol: "FIX".to_string(),
        decimals,
        total_supply: U256::from(total_supply),
    }
}

pub fn holder(address: &Address, balance: u64) -> HolderRecord {
    HolderRecord::new(address.clone(), U256::from(balance))
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn creation(creator: &Address, at: i64) -> ContractCreationInfo {
    ContractCreationInfo {
        creator: creator.clone(),
        timestamp: ts(at),
        tx_hash: "0xc7ea7e".to_string(),
    }
}

pub fn transfer(from: &Address, to: &Address, value: u64, at: i64, tx_hash: &str) -> TransferEvent {
    TransferEvent {
        from: from.clone(),
        to: to.clone(),
        value: U256::from(value),
        timestamp: ts(at),
        tx_hash: tx_hash.to_string(),
    }
}

pub fn timeout(provider: ProviderKind) -> ProviderError {
    ProviderError::Timeout { provider }
}
