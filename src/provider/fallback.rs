//! Per-capability provider fallback
//!
//! The walk over candidate providers is an explicit state machine:
//!
//! ```text
//! Pending -> TriedPrimary -> { Succeeded | TriedFallback -> { Succeeded | Failed } }
//! ```
//!
//! A provider "wins" only with a non-empty, well-formed result. Empty results
//! are remembered and handed back if nothing better turns up.

use tracing::{debug, warn};

use crate::chain::Chain;
use crate::error::ProviderError;
use crate::provider::{Capability, ProviderKind, TransferLog};
use crate::types::{ContractCreationInfo, HolderSnapshot, TokenMeta};

/// Value produced by a specific provider
#[derive(Debug, Clone, PartialEq)]
pub struct Selected<T> {
    pub value: T,
    pub provider: ProviderKind,
}

/// Results that can be well-formed yet carry nothing useful
pub trait Emptiness {
    fn is_empty_result(&self) -> bool;
}

impl Emptiness for TokenMeta {
    fn is_empty_result(&self) -> bool {
        self.total_supply.is_zero()
    }
}

impl Emptiness for HolderSnapshot {
    fn is_empty_result(&self) -> bool {
        self.is_empty()
    }
}

impl Emptiness for Option<ContractCreationInfo> {
    fn is_empty_result(&self) -> bool {
        self.is_none()
    }
}

impl Emptiness for TransferLog {
    fn is_empty_result(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackState {
    /// Nothing tried yet
    Pending,
    /// Primary failed or came back empty; a fallback is next
    TriedPrimary,
    /// `tried` fallbacks failed or came back empty; another one is next
    TriedFallback { tried: usize },
    Succeeded { provider: ProviderKind },
    /// Every candidate was tried without a usable result
    Failed,
}

impl FallbackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FallbackState::Succeeded { .. } | FallbackState::Failed)
    }
}

pub struct FallbackPolicy<T> {
    capability: Capability,
    chain: Chain,
    candidates: Vec<ProviderKind>,
    position: usize,
    /// Explicit mode: surface the provider's own error instead of a summary
    strict: bool,
    state: FallbackState,
    failures: Vec<(ProviderKind, ProviderError)>,
    empty: Option<Selected<T>>,
    success: Option<Selected<T>>,
}

impl<T: Emptiness> FallbackPolicy<T> {
    /// Try `candidates` in order
    pub fn auto(capability: Capability, chain: Chain, candidates: Vec<ProviderKind>) -> Self {
        Self::build(capability, chain, candidates, false)
    }

    /// Only `provider`, failures propagate unchanged
    pub fn strict(capability: Capability, chain: Chain, provider: ProviderKind) -> Self {
        Self::build(capability, chain, vec![provider], true)
    }

    fn build(capability: Capability, chain: Chain, candidates: Vec<ProviderKind>, strict: bool) -> Self {
        let state = if candidates.is_empty() {
            FallbackState::Failed
        } else {
            FallbackState::Pending
        };
        Self {
            capability,
            chain,
            candidates,
            position: 0,
            strict,
            state,
            failures: Vec::new(),
            empty: None,
            success: None,
        }
    }

    pub fn state(&self) -> &FallbackState {
        &self.state
    }

    /// Provider to try next, if the walk is still open
    pub fn next_candidate(&self) -> Option<ProviderKind> {
        if self.state.is_terminal() {
            return None;
        }
        self.candidates.get(self.position).copied()
    }

    /// Record the outcome of trying `provider` and advance the state
    pub fn record(&mut self, provider: ProviderKind, result: Result<T, ProviderError>) {
        self.position += 1;

        match result {
            Ok(value) if !value.is_empty_result() => {
                debug!("{} served by {}", self.capability, provider);
                self.state = FallbackState::Succeeded { provider };
                self.success = Some(Selected { value, provider });
                return;
            }
            Ok(value) => {
                debug!("{} returned no {} data", provider, self.capability);
                if self.empty.is_none() {
                    self.empty = Some(Selected { value, provider });
                }
            }
            Err(e) => {
                warn!("{} failed for {}: {}", provider, self.capability, e);
                self.failures.push((provider, e));
            }
        }

        self.state = if self.position >= self.candidates.len() {
            FallbackState::Failed
        } else {
            match self.state {
                FallbackState::Pending => FallbackState::TriedPrimary,
                FallbackState::TriedPrimary => FallbackState::TriedFallback { tried: 1 },
                FallbackState::TriedFallback { tried } => FallbackState::TriedFallback { tried: tried + 1 },
                ref terminal => terminal.clone(),
            }
        };
    }

    /// Final answer for this capability
    pub fn finish(mut self) -> Result<Selected<T>, ProviderError> {
        if let Some(selected) = self.success.take() {
            return Ok(selected);
        }
        if let Some(empty) = self.empty.take() {
            return Ok(empty);
        }
        if self.candidates.is_empty() {
            return Err(ProviderError::NoEligibleProvider {
                capability: self.capability,
                chain: self.chain.to_string(),
            });
        }
        if self.strict && self.failures.len() == 1 {
            if let Some((_, e)) = self.failures.pop() {
                return Err(e);
            }
        }
        Err(ProviderError::AllProvidersFailed {
            capability: self.capability,
            failures: self
                .failures
                .iter()
                .map(|(p, e)| format!("{}: {}", p, e))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout(provider: ProviderKind) -> ProviderError {
        ProviderError::Timeout { provider }
    }

    fn transfers(n: usize) -> TransferLog {
        use crate::types::{Address, TransferEvent};
        use alloy_primitives::U256;
        let transfers = (0..n)
            .map(|i| TransferEvent {
                from: Address::new("0xa"),
                to: Address::new("0xb"),
                value: U256::from(1u64),
                timestamp: chrono::DateTime::from_timestamp(i as i64, 0).unwrap(),
                tx_hash: format!("0x{}", i),
            })
            .collect();
        TransferLog {
            transfers,
            truncated: false,
        }
    }

    #[test]
    fn test_primary_success() {
        let mut policy = FallbackPolicy::auto(
            Capability::Transfers,
            Chain::Ethereum,
            vec![ProviderKind::Explorer, ProviderKind::Covalent],
        );
        assert_eq!(policy.state(), &FallbackState::Pending);
        assert_eq!(policy.next_candidate(), Some(ProviderKind::Explorer));

        policy.record(ProviderKind::Explorer, Ok(transfers(2)));
        assert_eq!(
            policy.state(),
            &FallbackState::Succeeded { provider: ProviderKind::Explorer }
        );
        assert_eq!(policy.next_candidate(), None);

        let selected = policy.finish().unwrap();
        assert_eq!(selected.provider, ProviderKind::Explorer);
        assert_eq!(selected.value.transfers.len(), 2);
    }

    #[test]
    fn test_fallback_after_primary_failure() {
        let mut policy = FallbackPolicy::auto(
            Capability::Transfers,
            Chain::Ethereum,
            vec![ProviderKind::Explorer, ProviderKind::Covalent],
        );
        policy.record(ProviderKind::Explorer, Err(timeout(ProviderKind::Explorer)));
        assert_eq!(policy.state(), &FallbackState::TriedPrimary);
        assert_eq!(policy.next_candidate(), Some(ProviderKind::Covalent));

        policy.record(ProviderKind::Covalent, Ok(transfers(1)));
        assert_eq!(policy.finish().unwrap().provider, ProviderKind::Covalent);
    }

    #[test]
    fn test_all_failed() {
        let mut policy: FallbackPolicy<TransferLog> = FallbackPolicy::auto(
            Capability::Transfers,
            Chain::Ethereum,
            vec![ProviderKind::Explorer, ProviderKind::Covalent],
        );
        policy.record(ProviderKind::Explorer, Err(timeout(ProviderKind::Explorer)));
        policy.record(ProviderKind::Covalent, Err(timeout(ProviderKind::Covalent)));
        assert_eq!(policy.state(), &FallbackState::Failed);

        match policy.finish() {
            Err(ProviderError::AllProvidersFailed { failures, .. }) => assert_eq!(failures.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_three_candidates_walk() {
        let mut policy: FallbackPolicy<TransferLog> = FallbackPolicy::auto(
            Capability::Transfers,
            Chain::Ethereum,
            vec![ProviderKind::Explorer, ProviderKind::Covalent, ProviderKind::Ethplorer],
        );
        policy.record(ProviderKind::Explorer, Err(timeout(ProviderKind::Explorer)));
        policy.record(ProviderKind::Covalent, Err(timeout(ProviderKind::Covalent)));
        assert_eq!(policy.state(), &FallbackState::TriedFallback { tried: 1 });
        policy.record(ProviderKind::Ethplorer, Err(timeout(ProviderKind::Ethplorer)));
        assert_eq!(policy.state(), &FallbackState::Failed);
    }

    #[test]
    fn test_empty_result_moves_on_but_is_kept() {
        let mut policy = FallbackPolicy::auto(
            Capability::Transfers,
            Chain::Ethereum,
            vec![ProviderKind::Explorer, ProviderKind::Covalent],
        );
        policy.record(ProviderKind::Explorer, Ok(TransferLog::default()));
        assert_eq!(policy.next_candidate(), Some(ProviderKind::Covalent));
        policy.record(ProviderKind::Covalent, Err(timeout(ProviderKind::Covalent)));

        let selected = policy.finish().unwrap();
        assert_eq!(selected.provider, ProviderKind::Explorer);
        assert!(selected.value.transfers.is_empty());
    }

    #[test]
    fn test_strict_propagates_provider_error() {
        let mut policy: FallbackPolicy<TransferLog> =
            FallbackPolicy::strict(Capability::Transfers, Chain::Polygon, ProviderKind::Covalent);
        policy.record(ProviderKind::Covalent, Err(timeout(ProviderKind::Covalent)));
        assert!(matches!(policy.finish(), Err(ProviderError::Timeout { .. })));
    }

    #[test]
    fn test_no_candidates() {
        let policy: FallbackPolicy<TransferLog> =
            FallbackPolicy::auto(Capability::Holders, Chain::Bsc, Vec::new());
        assert_eq!(policy.state(), &FallbackState::Failed);
        assert!(matches!(
            policy.finish(),
            Err(ProviderError::NoEligibleProvider { .. })
        ));
    }
}
