//! Per-wallet rows and category totals

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::U256;
use serde::Serialize;
use tracing::warn;

use crate::amount::{format_units, u256_decimal, Share};
use crate::pipeline::classifier::{Classification, Reason};
use crate::report::PartialDataWarning;
use crate::types::{Address, HolderSnapshot, TokenMeta};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletRow {
    pub address: Address,
    pub label: Option<String>,
    #[serde(serialize_with = "u256_decimal::serialize")]
    pub balance: U256,
    /// Balance in whole-token units
    pub balance_tokens: String,
    pub share: Share,
    pub is_known_team: bool,
    pub is_inferred_team: bool,
    pub is_team: bool,
    pub reasons: Vec<Reason>,
    /// False for known-team addresses the provider did not list
    pub in_holder_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub wallets: usize,
    #[serde(serialize_with = "u256_decimal::serialize")]
    pub balance: U256,
    pub balance_tokens: String,
    pub share: Share,
}

impl CategoryTotal {
    fn from_rows<'a>(rows: impl Iterator<Item = &'a WalletRow>, meta: &TokenMeta) -> Self {
        let (wallets, balance) = rows.fold((0usize, U256::ZERO), |(n, sum), row| {
            (n + 1, sum.saturating_add(row.balance))
        });
        Self {
            wallets,
            balance,
            balance_tokens: format_units(balance, meta.decimals),
            share: Share::of(balance, meta.total_supply),
        }
    }
}

/// Category sums over the holder snapshot
///
/// `all_team` and `other` partition `snapshot`. `known` and `inferred`
/// overlap when a wallet carries both flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub known: CategoryTotal,
    pub inferred: CategoryTotal,
    pub all_team: CategoryTotal,
    pub other: CategoryTotal,
    pub snapshot: CategoryTotal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub rows: Vec<WalletRow>,
    pub totals: CategoryTotals,
    pub warnings: Vec<PartialDataWarning>,
}

pub struct AttributionAggregator<'a> {
    meta: &'a TokenMeta,
    labels: &'a BTreeMap<Address, String>,
}

impl<'a> AttributionAggregator<'a> {
    pub fn new(meta: &'a TokenMeta, labels: &'a BTreeMap<Address, String>) -> Self {
        Self { meta, labels }
    }

    pub fn aggregate(&self, holders: &HolderSnapshot, classifications: &BTreeMap<Address, Classification>) -> Aggregation {
        let mut warnings = Vec::new();
        let mut rows = Vec::with_capacity(classifications.len());
        let mut listed = BTreeSet::new();

        for holder in &holders.holders {
            if !listed.insert(&holder.address) {
                continue;
            }
            if holder.balance > self.meta.total_supply {
                warn!(
                    "{} reports a balance of {} above total supply {}",
                    holder.address, holder.balance, self.meta.total_supply
                );
                warnings.push(PartialDataWarning::BalanceExceedsSupply {
                    address: holder.address.clone(),
                    balance: holder.balance.to_string(),
                });
            }
            let class = classifications.get(&holder.address).cloned().unwrap_or_default();
            rows.push(self.row(&holder.address, holder.balance, class, true));
        }

        // Known-team addresses the provider did not list
        for (address, class) in classifications {
            if !listed.contains(address) {
                rows.push(self.row(address, U256::ZERO, class.clone(), false));
            }
        }

        rows.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.address.cmp(&b.address)));

        let held = || rows.iter().filter(|r| r.in_holder_snapshot);
        let totals = CategoryTotals {
            known: CategoryTotal::from_rows(held().filter(|r| r.is_known_team), self.meta),
            inferred: CategoryTotal::from_rows(held().filter(|r| r.is_inferred_team), self.meta),
            all_team: CategoryTotal::from_rows(held().filter(|r| r.is_team), self.meta),
            other: CategoryTotal::from_rows(held().filter(|r| !r.is_team), self.meta),
            snapshot: CategoryTotal::from_rows(held(), self.meta),
        };

        Aggregation { rows, totals, warnings }
    }

    fn row(&self, address: &Address, balance: U256, class: Classification, in_holder_snapshot: bool) -> WalletRow {
        WalletRow {
            address: address.clone(),
            label: self.labels.get(address).filter(|l| !l.is_empty()).cloned(),
            balance,
            balance_tokens: format_units(balance, self.meta.decimals),
            share: Share::of(balance, self.meta.total_supply),
            is_known_team: class.is_known_team,
            is_inferred_team: class.is_inferred_team,
            is_team: class.is_team(),
            reasons: class.reasons,
            in_holder_snapshot,
        }
    }
}
