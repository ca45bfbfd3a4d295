//! Early transfer collection
//!
//! Pulls the token's transfers for the window that opens at contract
//! creation and reduces them to distinct sender to receiver edges.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::chain::Chain;
use crate::provider::{ProviderKind, ProviderRouter};
use crate::report::PartialDataWarning;
use crate::types::{Address, ContractCreationInfo, TimeWindow, TransferEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    Collected { provider: ProviderKind, truncated: bool },
    /// No creation timestamp to anchor the window
    CreationUnavailable,
    /// Zero-length window, nothing was requested
    WindowEmpty,
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EarlyTransfers {
    pub window: Option<TimeWindow>,
    /// In-window events, unique by (from, to, tx hash), oldest first
    pub events: Vec<TransferEvent>,
    /// Distinct (sender, receiver) pairs
    pub edges: BTreeSet<(Address, Address)>,
    pub status: TransferStatus,
    /// Events returned by the provider before window filtering
    pub fetched: usize,
}

impl EarlyTransfers {
    pub fn empty(window: Option<TimeWindow>, status: TransferStatus) -> Self {
        Self {
            window,
            events: Vec::new(),
            edges: BTreeSet::new(),
            status,
            fetched: 0,
        }
    }

    /// Receivers of transfers sent by `sender`
    pub fn receivers_from<'a>(&'a self, sender: &'a Address) -> impl Iterator<Item = &'a Address> + 'a {
        self.edges
            .iter()
            .filter(move |(from, _)| from == sender)
            .map(|(_, to)| to)
    }

    /// Warning to surface for this collection, if any
    pub fn warning(&self, window_hours: u32) -> Option<PartialDataWarning> {
        match &self.status {
            TransferStatus::WindowEmpty => Some(PartialDataWarning::TransferWindowEmpty { hours: window_hours }),
            TransferStatus::Unavailable { reason } => Some(PartialDataWarning::TransfersUnavailable {
                reason: reason.clone(),
            }),
            // Reported once as CreationInfoUnavailable
            TransferStatus::CreationUnavailable => None,
            TransferStatus::Collected {
                provider,
                truncated: true,
            } => Some(PartialDataWarning::TransfersTruncated {
                provider: *provider,
                fetched: self.fetched,
            }),
            TransferStatus::Collected { .. } if self.events.is_empty() => {
                Some(PartialDataWarning::TransferWindowEmpty { hours: window_hours })
            }
            TransferStatus::Collected { .. } => None,
        }
    }
}

/// Keep in-window events, drop repeated (from, to, tx hash) triples and
/// order by time
pub fn normalize_events(events: Vec<TransferEvent>, window: &TimeWindow) -> (Vec<TransferEvent>, BTreeSet<(Address, Address)>) {
    let mut seen = HashSet::new();
    let mut kept: Vec<TransferEvent> = events
        .into_iter()
        .filter(|e| window.contains(e.timestamp))
        .filter(|e| seen.insert((e.from.clone(), e.to.clone(), e.tx_hash.clone())))
        .collect();

    kept.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });

    let edges = kept.iter().map(|e| (e.from.clone(), e.to.clone())).collect();
    (kept, edges)
}

pub struct EarlyTransferCollector<'a> {
    router: &'a ProviderRouter,
}

impl<'a> EarlyTransferCollector<'a> {
    pub fn new(router: &'a ProviderRouter) -> Self {
        Self { router }
    }

    pub async fn collect(
        &self,
        chain: Chain,
        token: &Address,
        creation: Option<&ContractCreationInfo>,
        window_hours: u32,
    ) -> EarlyTransfers {
        let creation = match creation {
            Some(c) => c,
            None => return EarlyTransfers::empty(None, TransferStatus::CreationUnavailable),
        };

        let window = TimeWindow::after(creation.timestamp, window_hours);
        if window.is_empty() {
            return EarlyTransfers::empty(Some(window), TransferStatus::WindowEmpty);
        }

        match self.router.transfers(chain, token, &window).await {
            Ok(selected) => {
                let fetched = selected.value.transfers.len();
                let (events, edges) = normalize_events(selected.value.transfers, &window);
                info!(
                    "Collected {} early transfers ({} fetched, {} distinct edges) from {}",
                    events.len(),
                    fetched,
                    edges.len(),
                    selected.provider
                );
                EarlyTransfers {
                    window: Some(window),
                    events,
                    edges,
                    status: TransferStatus::Collected {
                        provider: selected.provider,
                        truncated: selected.value.truncated,
                    },
                    fetched,
                }
            }
            Err(e) => {
                warn!("Early transfers unavailable: {}", e);
                EarlyTransfers::empty(Some(window), TransferStatus::Unavailable { reason: e.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::{self, FakeProvider};
    use crate::provider::{
        Capability, PageCursor, ProviderMode, RetryPolicy, RouterLimits, TokenDataProvider, TransferPage,
    };
    use std::sync::Arc;

    #[test]
    fn test_normalize_filters_dedupes_and_orders() {
        let c = fake::addr("c");
        let x = fake::addr("1");
        let y = fake::addr("2");
        let window = TimeWindow::after(fake::ts(1_000), 1);

        let events = vec![
            fake::transfer(&c, &y, 5, 2_000, "0xb"),
            fake::transfer(&c, &x, 5, 1_500, "0xa"),
            fake::transfer(&c, &x, 5, 1_500, "0xa"),
            // outside the window on both ends
            fake::transfer(&c, &y, 5, 999, "0xc"),
            fake::transfer(&c, &y, 5, 4_600, "0xd"),
        ];
        let (kept, edges) = normalize_events(events, &window);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].tx_hash, "0xa");
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&(c.clone(), x.clone())));
    }

    #[test]
    fn test_receivers_from() {
        let c = fake::addr("c");
        let window = TimeWindow::after(fake::ts(0), 1);
        let (events, edges) = normalize_events(
            vec![
                fake::transfer(&c, &fake::addr("1"), 1, 10, "0x1"),
                fake::transfer(&fake::addr("1"), &fake::addr("2"), 1, 20, "0x2"),
            ],
            &window,
        );
        let transfers = EarlyTransfers {
            window: Some(window),
            events,
            edges,
            status: TransferStatus::WindowEmpty,
            fetched: 2,
        };
        let receivers: Vec<_> = transfers.receivers_from(&c).collect();
        assert_eq!(receivers, vec![&fake::addr("1")]);
    }

    fn router_with(explorer: Arc<FakeProvider>) -> ProviderRouter {
        let providers: Vec<Arc<dyn TokenDataProvider>> = vec![explorer];
        ProviderRouter::new(ProviderMode::Auto, providers, RetryPolicy::none(), RouterLimits::default())
    }

    #[tokio::test]
    async fn test_zero_hours_makes_no_calls() {
        let explorer = Arc::new(FakeProvider::new(ProviderKind::Explorer).transfers(Vec::new()));
        let router = router_with(explorer.clone());
        let creation = fake::creation(&fake::addr("c"), 1_000);

        let result = EarlyTransferCollector::new(&router)
            .collect(Chain::Ethereum, &fake::token(), Some(&creation), 0)
            .await;

        assert_eq!(result.status, TransferStatus::WindowEmpty);
        assert_eq!(explorer.calls(Capability::Transfers), 0);
        assert!(matches!(
            result.warning(0),
            Some(PartialDataWarning::TransferWindowEmpty { hours: 0 })
        ));
    }

    #[tokio::test]
    async fn test_missing_creation_is_empty() {
        let explorer = Arc::new(FakeProvider::new(ProviderKind::Explorer).transfers(Vec::new()));
        let router = router_with(explorer.clone());

        let result = EarlyTransferCollector::new(&router)
            .collect(Chain::Ethereum, &fake::token(), None, 48)
            .await;

        assert_eq!(result.status, TransferStatus::CreationUnavailable);
        assert!(result.edges.is_empty());
        assert!(result.warning(48).is_none());
        assert_eq!(explorer.calls(Capability::Transfers), 0);
    }

    #[tokio::test]
    async fn test_page_cap_reports_truncation() {
        let c = fake::addr("c");
        let explorer = Arc::new(FakeProvider::new(ProviderKind::Explorer).transfers_page(Ok(TransferPage {
            transfers: vec![fake::transfer(&c, &fake::addr("1"), 5, 1_100, "0x1")],
            cursor: PageCursor::More,
        })));
        let providers: Vec<Arc<dyn TokenDataProvider>> = vec![explorer.clone()];
        let limits = RouterLimits {
            max_holder_pages: 1,
            max_transfer_pages: 2,
        };
        let router = ProviderRouter::new(ProviderMode::Auto, providers, RetryPolicy::none(), limits);
        let creation = fake::creation(&c, 1_000);

        let result = EarlyTransferCollector::new(&router)
            .collect(Chain::Ethereum, &fake::token(), Some(&creation), 48)
            .await;

        assert_eq!(
            result.status,
            TransferStatus::Collected {
                provider: ProviderKind::Explorer,
                truncated: true,
            }
        );
        // the repeated page collapses to one event
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.fetched, 2);
        assert_eq!(
            result.warning(48),
            Some(PartialDataWarning::TransfersTruncated {
                provider: ProviderKind::Explorer,
                fetched: 2,
            })
        );
        assert_eq!(explorer.calls(Capability::Transfers), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_downgrades() {
        let explorer = Arc::new(
            FakeProvider::new(ProviderKind::Explorer).transfers_page(Err(fake::timeout(ProviderKind::Explorer))),
        );
        let router = router_with(explorer);
        let creation = fake::creation(&fake::addr("c"), 1_000);

        let result = EarlyTransferCollector::new(&router)
            .collect(Chain::Ethereum, &fake::token(), Some(&creation), 48)
            .await;

        assert!(matches!(result.status, TransferStatus::Unavailable { .. }));
        assert!(matches!(
            result.warning(48),
            Some(PartialDataWarning::TransfersUnavailable { .. })
        ));
    }
}
