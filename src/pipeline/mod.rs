//! Attribution pipeline
//!
//! One pass per run: token metadata, holders and creation info are fetched
//! concurrently, early transfers follow once the creation time is known,
//! then classification and aggregation produce the [`ReportBundle`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{info, warn};

use crate::amount::format_units;
use crate::chain::Chain;
use crate::error::{ProviderError, Result};
use crate::provider::{Capability, ProviderRouter};
use crate::report::{Methodology, PartialDataWarning, ReportBundle, CAVEATS, HEURISTIC_RULE};
use crate::types::Address;

pub mod aggregator;
pub mod classifier;
pub mod collector;

pub use aggregator::{AttributionAggregator, CategoryTotal, CategoryTotals, WalletRow};
pub use classifier::{Classification, HeuristicClassifier, Reason};
pub use collector::{EarlyTransferCollector, EarlyTransfers, TransferStatus};

/// Inputs of a single attribution run
#[derive(Debug, Clone)]
pub struct AttributionRequest {
    pub chain: Chain,
    pub token: Address,
    /// Holder count to request
    pub top: u32,
    pub window_hours: u32,
    /// Attach the early transfer table to the report
    pub include_transfers: bool,
    pub known_team: BTreeSet<Address>,
    pub labels: BTreeMap<Address, String>,
    pub known_team_source: Option<String>,
    pub label_map_source: Option<String>,
}

impl AttributionRequest {
    pub fn new(chain: Chain, token: Address, top: u32, window_hours: u32) -> Self {
        Self {
            chain,
            token,
            top,
            window_hours,
            include_transfers: false,
            known_team: BTreeSet::new(),
            labels: BTreeMap::new(),
            known_team_source: None,
            label_map_source: None,
        }
    }
}

pub struct AttributionPipeline<'a> {
    router: &'a ProviderRouter,
}

impl<'a> AttributionPipeline<'a> {
    pub fn new(router: &'a ProviderRouter) -> Self {
        Self { router }
    }

    pub async fn run(&self, request: &AttributionRequest) -> Result<ReportBundle> {
        let chain = request.chain;
        let token = &request.token;
        self.router.ensure_capable(chain)?;

        info!(
            "Analyzing {} on {} (top {}, {}h window, provider {})",
            token,
            chain,
            request.top,
            request.window_hours,
            self.router.mode()
        );

        let (meta, holders, creation) = tokio::join!(
            self.router.token_meta(chain, token),
            self.router.top_holders(chain, token, request.top),
            self.router.contract_creation(chain, token),
        );

        let meta = meta?;
        if meta.value.total_supply.is_zero() {
            return Err(ProviderError::malformed(meta.provider, "token reports zero total supply").into());
        }
        let holders = holders?;
        if holders.value.is_empty() {
            return Err(ProviderError::malformed(holders.provider, "no holders returned").into());
        }

        let mut providers = BTreeMap::new();
        providers.insert(Capability::TokenMeta, meta.provider);
        providers.insert(Capability::Holders, holders.provider);

        let mut warnings = Vec::new();
        if holders.value.truncated {
            warnings.push(PartialDataWarning::HolderSnapshotTruncated {
                provider: holders.provider,
                returned: holders.value.len(),
                requested: request.top,
            });
        }

        let creation = match creation {
            Ok(selected) => {
                providers.insert(Capability::ContractCreation, selected.provider);
                if selected.value.is_none() {
                    warnings.push(PartialDataWarning::CreationInfoUnavailable {
                        reason: format!("{} reported no creation record", selected.provider),
                    });
                }
                selected.value
            }
            Err(e) => {
                warn!("Contract creation lookup failed: {}", e);
                warnings.push(PartialDataWarning::CreationInfoUnavailable { reason: e.to_string() });
                None
            }
        };

        let early = EarlyTransferCollector::new(self.router)
            .collect(chain, token, creation.as_ref(), request.window_hours)
            .await;
        if let TransferStatus::Collected { provider, .. } = &early.status {
            providers.insert(Capability::Transfers, *provider);
        }
        warnings.extend(early.warning(request.window_hours));

        let classifications =
            HeuristicClassifier::new(token, creation.as_ref(), &request.known_team, &early).classify(&holders.value);
        let aggregation = AttributionAggregator::new(&meta.value, &request.labels).aggregate(&holders.value, &classifications);
        warnings.extend(aggregation.warnings);

        for warning in &warnings {
            warn!("{}", warning);
        }

        let meta = meta.value;
        let methodology = Methodology {
            chain,
            token: token.clone(),
            token_name: meta.name.clone(),
            token_symbol: meta.symbol.clone(),
            decimals: meta.decimals,
            total_supply: meta.total_supply,
            total_supply_tokens: format_units(meta.total_supply, meta.decimals),
            provider_mode: self.router.mode().to_string(),
            providers,
            holder_target: request.top,
            holders_returned: holders.value.len(),
            snapshot_truncated: holders.value.truncated,
            window_hours: request.window_hours,
            window: early.window,
            creator: creation.as_ref().map(|c| c.creator.clone()),
            creation_time: creation.as_ref().map(|c| c.timestamp),
            known_team_source: request.known_team_source.clone(),
            label_map_source: request.label_map_source.clone(),
            heuristic_rule: HEURISTIC_RULE.to_string(),
            caveats: CAVEATS.to_string(),
            warnings,
            generated_at: Utc::now(),
        };

        info!(
            "All team: {} wallets, {}% of supply",
            aggregation.totals.all_team.wallets,
            aggregation.totals.all_team.share.to_percent_string(4)
        );

        Ok(ReportBundle {
            methodology,
            totals: aggregation.totals,
            wallets: aggregation.rows,
            early_transfers: request.include_transfers.then_some(early.events),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::provider::fake::{self, FakeProvider};
    use crate::provider::{ProviderKind, ProviderMode, RetryPolicy, RouterLimits, TokenDataProvider};
    use alloy_primitives::U256;
    use std::sync::Arc;
    use std::time::Duration;

    const CREATED_AT: i64 = 1_700_000_000;

    fn router(providers: Vec<Arc<FakeProvider>>) -> ProviderRouter {
        router_in(ProviderMode::Auto, providers)
    }

    fn router_in(mode: ProviderMode, providers: Vec<Arc<FakeProvider>>) -> ProviderRouter {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn TokenDataProvider>)
            .collect();
        ProviderRouter::new(
            mode,
            providers,
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            RouterLimits::default(),
        )
    }

    struct Scenario {
        creator: Address,
        x: Address,
        y: Address,
    }

    impl Scenario {
        fn new() -> Self {
            Self {
                creator: fake::addr("c0"),
                x: fake::addr("a1"),
                y: fake::addr("b2"),
            }
        }

        fn data_provider(&self) -> FakeProvider {
            FakeProvider::new(ProviderKind::Covalent)
                .meta(Ok(fake::meta(1_000_000, 0)))
                .holders(vec![
                    fake::holder(&self.creator, 500_000),
                    fake::holder(&self.x, 300_000),
                    fake::holder(&self.y, 200_000),
                ])
        }

        fn row<'b>(&self, bundle: &'b ReportBundle, address: &Address) -> &'b WalletRow {
            bundle.wallets.iter().find(|r| &r.address == address).unwrap()
        }
    }

    #[tokio::test]
    async fn test_scenario_creator_funded_wallet() {
        let s = Scenario::new();
        let explorer = FakeProvider::new(ProviderKind::Explorer)
            .creation(Ok(Some(fake::creation(&s.creator, CREATED_AT))))
            .transfers(vec![fake::transfer(&s.creator, &s.x, 100_000, CREATED_AT + 60, "0x01")]);
        let r = router(vec![Arc::new(s.data_provider()), Arc::new(explorer)]);

        let request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);
        let bundle = AttributionPipeline::new(&r).run(&request).await.unwrap();

        let x = s.row(&bundle, &s.x);
        assert!(x.is_inferred_team);
        assert_eq!(x.reasons, vec![Reason::ReceivedFromCreator]);

        let creator = s.row(&bundle, &s.creator);
        assert!(creator.is_known_team);
        assert_eq!(creator.reasons, vec![Reason::ContractOrCreator]);

        let y = s.row(&bundle, &s.y);
        assert!(!y.is_team);

        assert_eq!(bundle.totals.all_team.balance, U256::from(800_000u64));
        assert_eq!(bundle.totals.all_team.share.to_decimal_string(1), "0.8");
        assert_eq!(bundle.totals.other.balance, U256::from(200_000u64));
        assert!(bundle.warnings().is_empty());
        assert_eq!(bundle.methodology.providers[&Capability::Transfers], ProviderKind::Explorer);
        assert!(bundle.early_transfers.is_none());
    }

    #[tokio::test]
    async fn test_named_holder_source_keeps_transfer_heuristics() {
        let s = Scenario::new();
        let explorer = FakeProvider::new(ProviderKind::Explorer)
            .creation(Ok(Some(fake::creation(&s.creator, CREATED_AT))))
            .transfers(vec![fake::transfer(&s.creator, &s.x, 100_000, CREATED_AT + 60, "0x01")]);
        let r = router_in(
            ProviderMode::Explicit(ProviderKind::Covalent),
            vec![Arc::new(s.data_provider()), Arc::new(explorer)],
        );

        let request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);
        let bundle = AttributionPipeline::new(&r).run(&request).await.unwrap();

        assert!(s.row(&bundle, &s.x).is_inferred_team);
        assert!(bundle.warnings().is_empty());
        assert_eq!(bundle.methodology.providers[&Capability::Holders], ProviderKind::Covalent);
        assert_eq!(bundle.methodology.providers[&Capability::ContractCreation], ProviderKind::Explorer);
    }

    #[tokio::test]
    async fn test_scenario_creation_unavailable() {
        let s = Scenario::new();
        let explorer = FakeProvider::new(ProviderKind::Explorer)
            .creation(Err(fake::timeout(ProviderKind::Explorer)))
            .transfers(vec![fake::transfer(&s.creator, &s.x, 100_000, CREATED_AT + 60, "0x01")]);
        let explorer = Arc::new(explorer);
        let r = router(vec![Arc::new(s.data_provider()), explorer.clone()]);

        let mut request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);
        request.known_team.insert(s.y.clone());
        let bundle = AttributionPipeline::new(&r).run(&request).await.unwrap();

        assert!(matches!(
            bundle.warnings(),
            [PartialDataWarning::CreationInfoUnavailable { .. }]
        ));
        assert!(bundle.wallets.iter().all(|w| !w.is_inferred_team));
        assert!(s.row(&bundle, &s.y).is_known_team);
        assert!(!s.row(&bundle, &s.creator).is_team);
        assert_eq!(explorer.calls(Capability::Transfers), 0);
    }

    #[tokio::test]
    async fn test_scenario_known_and_contract_funded() {
        let s = Scenario::new();
        let explorer = FakeProvider::new(ProviderKind::Explorer)
            .creation(Ok(Some(fake::creation(&s.creator, CREATED_AT))))
            .transfers(vec![fake::transfer(&fake::token(), &s.y, 200_000, CREATED_AT + 30, "0x02")]);
        let r = router(vec![Arc::new(s.data_provider()), Arc::new(explorer)]);

        let mut request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);
        request.known_team.insert(s.y.clone());
        request.include_transfers = true;
        let bundle = AttributionPipeline::new(&r).run(&request).await.unwrap();

        let y = s.row(&bundle, &s.y);
        assert!(y.is_known_team && y.is_inferred_team);
        assert_eq!(y.reasons, vec![Reason::KnownList, Reason::ReceivedFromContract]);
        assert_eq!(bundle.early_transfers.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let s = Scenario::new();
        let explorer = FakeProvider::new(ProviderKind::Explorer)
            .creation(Ok(Some(fake::creation(&s.creator, CREATED_AT))))
            .transfers(vec![
                fake::transfer(&s.creator, &s.x, 1, CREATED_AT + 60, "0x01"),
                fake::transfer(&fake::token(), &s.y, 1, CREATED_AT + 90, "0x02"),
            ]);
        let r = router(vec![Arc::new(s.data_provider()), Arc::new(explorer)]);
        let request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);

        let first = AttributionPipeline::new(&r).run(&request).await.unwrap();
        let second = AttributionPipeline::new(&r).run(&request).await.unwrap();
        assert_eq!(first.wallets, second.wallets);
        assert_eq!(first.totals, second.totals);
    }

    #[tokio::test]
    async fn test_shares_within_unit_and_partition_holds() {
        let s = Scenario::new();
        let explorer = FakeProvider::new(ProviderKind::Explorer)
            .creation(Ok(Some(fake::creation(&s.creator, CREATED_AT))))
            .transfers(Vec::new());
        let r = router(vec![Arc::new(s.data_provider()), Arc::new(explorer)]);
        let request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);

        let bundle = AttributionPipeline::new(&r).run(&request).await.unwrap();
        assert!(bundle.wallets.iter().all(|w| w.share.is_within_unit()));

        let team: U256 = bundle
            .wallets
            .iter()
            .filter(|w| w.is_known_team || w.is_inferred_team)
            .fold(U256::ZERO, |acc, w| acc + w.balance);
        let t = &bundle.totals;
        assert_eq!(t.all_team.balance, team);
        assert_eq!(t.other.balance, t.snapshot.balance - team);
        assert!(matches!(
            bundle.warnings(),
            [PartialDataWarning::TransferWindowEmpty { hours: 48 }]
        ));
    }

    #[tokio::test]
    async fn test_holder_failure_is_fatal() {
        let covalent = FakeProvider::new(ProviderKind::Covalent)
            .meta(Ok(fake::meta(1_000, 0)))
            .holders_page(Err(fake::timeout(ProviderKind::Covalent)));
        let r = router(vec![Arc::new(covalent)]);
        let request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);

        let result = AttributionPipeline::new(&r).run(&request).await;
        assert!(matches!(result, Err(Error::Provider(_))));
    }

    #[tokio::test]
    async fn test_zero_supply_is_fatal() {
        let covalent = FakeProvider::new(ProviderKind::Covalent)
            .meta(Ok(fake::meta(0, 0)))
            .holders(vec![fake::holder(&fake::addr("1"), 1)]);
        let r = router(vec![Arc::new(covalent)]);
        let request = AttributionRequest::new(Chain::Ethereum, fake::token(), 500, 48);

        assert!(AttributionPipeline::new(&r).run(&request).await.is_err());
    }
}
