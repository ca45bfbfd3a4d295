//! Capability routing across providers
//!
//! The router owns the registered backends, picks candidates per capability,
//! drives pagination and wraps every single request in the retry policy. The
//! walk over candidates is delegated to [`FallbackPolicy`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::config::credential_env;
use crate::error::{Error, ProviderError};
use crate::provider::fallback::{Emptiness, FallbackPolicy, Selected};
use crate::provider::retry::RetryPolicy;
use crate::provider::{Capability, PageCursor, ProviderKind, TokenDataProvider, TransferLog};
use crate::types::{Address, ContractCreationInfo, HolderSnapshot, TimeWindow, TokenMeta};

/// Provider selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Priority order per capability with fallback
    Auto,
    /// The named provider serves token metadata and holders, failures
    /// propagate; creation and transfers keep the auto order
    Explicit(ProviderKind),
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderMode::Auto => f.write_str("auto"),
            ProviderMode::Explicit(kind) => write!(f, "{}", kind),
        }
    }
}

impl FromStr for ProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(ProviderMode::Auto);
        }
        s.parse::<ProviderKind>().map(ProviderMode::Explicit)
    }
}

/// Page caps applied while walking paged listings
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub max_holder_pages: u32,
    pub max_transfer_pages: u32,
}

impl Default for RouterLimits {
    fn default() -> Self {
        Self {
            max_holder_pages: 20,
            max_transfer_pages: 10,
        }
    }
}

pub struct ProviderRouter {
    mode: ProviderMode,
    providers: Vec<Arc<dyn TokenDataProvider>>,
    retry: RetryPolicy,
    limits: RouterLimits,
}

impl ProviderRouter {
    pub fn new(
        mode: ProviderMode,
        providers: Vec<Arc<dyn TokenDataProvider>>,
        retry: RetryPolicy,
        limits: RouterLimits,
    ) -> Self {
        Self {
            mode,
            providers,
            retry,
            limits,
        }
    }

    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    /// Backends registered with usable credentials
    pub fn registered(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    fn provider(&self, kind: ProviderKind) -> Option<&Arc<dyn TokenDataProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    /// Provider the mode pins `capability` to, if any
    fn pinned(&self, capability: Capability) -> Option<ProviderKind> {
        match (self.mode, capability) {
            (ProviderMode::Explicit(kind), Capability::TokenMeta | Capability::Holders) => Some(kind),
            _ => None,
        }
    }

    /// Providers eligible for `capability` on `chain`, in try order
    pub fn candidates(&self, chain: Chain, capability: Capability) -> Vec<ProviderKind> {
        match self.pinned(capability) {
            None => capability
                .priority()
                .iter()
                .copied()
                .filter(|kind| {
                    self.provider(*kind)
                        .map(|p| p.supports(chain, capability))
                        .unwrap_or(false)
                })
                .collect(),
            Some(kind) => self.provider(kind).map(|_| vec![kind]).unwrap_or_default(),
        }
    }

    /// Fail fast when the capabilities the run cannot do without have no provider
    pub fn ensure_capable(&self, chain: Chain) -> crate::error::Result<()> {
        for capability in [Capability::TokenMeta, Capability::Holders] {
            if let Some(kind) = self.pinned(capability) {
                let provider = self.provider(kind).ok_or_else(|| Error::MissingCredential {
                    provider: kind,
                    env_var: credential_env(kind, chain).to_string(),
                })?;
                if !provider.supports(chain, capability) {
                    return Err(Error::Config(format!(
                        "--provider {} cannot serve {} on {}; use auto, covalent or ethplorer",
                        kind, capability, chain
                    )));
                }
                continue;
            }

            if self.candidates(chain, capability).is_empty() {
                // A backend that could serve this chain is only missing its key
                let unregistered = capability
                    .priority()
                    .iter()
                    .copied()
                    .find(|kind| self.provider(*kind).is_none());
                return Err(match unregistered {
                    Some(kind) => Error::MissingCredential {
                        provider: kind,
                        env_var: credential_env(kind, chain).to_string(),
                    },
                    None => ProviderError::NoEligibleProvider {
                        capability,
                        chain: chain.to_string(),
                    }
                    .into(),
                });
            }
        }
        Ok(())
    }

    async fn select<'a, T, F>(
        &'a self,
        chain: Chain,
        capability: Capability,
        fetch: F,
    ) -> Result<Selected<T>, ProviderError>
    where
        T: Emptiness,
        F: Fn(&'a Arc<dyn TokenDataProvider>) -> LocalBoxFuture<'a, Result<T, ProviderError>>,
    {
        let mut policy = match self.pinned(capability) {
            Some(kind) if self.provider(kind).is_some() => {
                FallbackPolicy::strict(capability, chain, kind)
            }
            _ => FallbackPolicy::auto(capability, chain, self.candidates(chain, capability)),
        };

        while let Some(kind) = policy.next_candidate() {
            let result = match self.provider(kind) {
                Some(provider) => fetch(provider).await,
                None => Err(ProviderError::Unsupported {
                    provider: kind,
                    capability,
                    chain: chain.to_string(),
                }),
            };
            policy.record(kind, result);
        }

        let selected = policy.finish()?;
        info!("{} from {}", capability, selected.provider);
        Ok(selected)
    }

    pub async fn token_meta(&self, chain: Chain, token: &Address) -> Result<Selected<TokenMeta>, ProviderError> {
        let retry = &self.retry;
        self.select(chain, Capability::TokenMeta, |provider| {
            async move {
                let label = format!("{} token metadata", provider.kind());
                retry.run(&label, || provider.token_meta(chain, token)).await
            }
            .boxed_local()
        })
        .await
    }

    /// Top `limit` holders by balance
    pub async fn top_holders(
        &self,
        chain: Chain,
        token: &Address,
        limit: u32,
    ) -> Result<Selected<HolderSnapshot>, ProviderError> {
        self.select(chain, Capability::Holders, |provider| {
            self.collect_holders(provider, chain, token, limit).boxed_local()
        })
        .await
    }

    async fn collect_holders(
        &self,
        provider: &Arc<dyn TokenDataProvider>,
        chain: Chain,
        token: &Address,
        limit: u32,
    ) -> Result<HolderSnapshot, ProviderError> {
        let target = limit as usize;
        let page_size = limit.min(provider.holder_page_limit()).max(1);
        let label = format!("{} holders", provider.kind());

        let mut seen = HashSet::new();
        let mut holders = Vec::new();
        let mut truncated = false;
        let mut page = 1u32;

        while holders.len() < target {
            if page > self.limits.max_holder_pages {
                truncated = true;
                break;
            }
            debug!("{} page {} (size {})", label, page, page_size);
            let result = self
                .retry
                .run(&label, || provider.holders_page(chain, token, page, page_size))
                .await?;

            for holder in result.holders {
                if seen.insert(holder.address.clone()) {
                    holders.push(holder);
                }
            }

            match result.cursor {
                PageCursor::More => page += 1,
                PageCursor::Exhausted => break,
                PageCursor::Capped => {
                    truncated = holders.len() < target;
                    break;
                }
            }
        }

        holders.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.address.cmp(&b.address)));
        holders.truncate(target);

        if truncated {
            warn!(
                "{} stopped at {} of {} requested holders (page cap)",
                provider.kind(),
                holders.len(),
                limit
            );
        }
        Ok(HolderSnapshot { holders, truncated })
    }

    pub async fn contract_creation(
        &self,
        chain: Chain,
        token: &Address,
    ) -> Result<Selected<Option<ContractCreationInfo>>, ProviderError> {
        let retry = &self.retry;
        self.select(chain, Capability::ContractCreation, |provider| {
            async move {
                let label = format!("{} contract creation", provider.kind());
                retry.run(&label, || provider.contract_creation(chain, token)).await
            }
            .boxed_local()
        })
        .await
    }

    /// Transfers of `token` inside `window`, in provider order
    pub async fn transfers(
        &self,
        chain: Chain,
        token: &Address,
        window: &TimeWindow,
    ) -> Result<Selected<TransferLog>, ProviderError> {
        self.select(chain, Capability::Transfers, |provider| {
            self.collect_transfers(provider, chain, token, window).boxed_local()
        })
        .await
    }

    async fn collect_transfers(
        &self,
        provider: &Arc<dyn TokenDataProvider>,
        chain: Chain,
        token: &Address,
        window: &TimeWindow,
    ) -> Result<TransferLog, ProviderError> {
        let label = format!("{} transfers", provider.kind());
        let mut transfers = Vec::new();
        let mut truncated = false;

        for page in 1..=self.limits.max_transfer_pages {
            debug!("{} page {}", label, page);
            let result = self
                .retry
                .run(&label, || provider.transfers_page(chain, token, window, page))
                .await?;
            transfers.extend(result.transfers);

            match result.cursor {
                PageCursor::More if page == self.limits.max_transfer_pages => {
                    warn!("{} stopped at page cap with {} events", label, transfers.len());
                    truncated = true;
                }
                PageCursor::More => {}
                PageCursor::Exhausted => break,
                PageCursor::Capped => {
                    warn!("{} capped by provider with {} events", label, transfers.len());
                    truncated = true;
                    break;
                }
            }
        }
        Ok(TransferLog { transfers, truncated })
    }
}
