//! Team classification rules
//!
//! Rules run in a fixed order and only ever add flags and reasons:
//!
//! 1. address is on the user's known-team list
//! 2. address is the token contract or its creator and holds tokens
//! 3. address received tokens from the creator in the early window
//! 4. address received tokens from the token contract in the early window
//!
//! Rules 1 and 2 set the known flag, rules 3 and 4 the inferred flag. The
//! zero address is never inferred.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::pipeline::collector::EarlyTransfers;
use crate::types::{Address, ContractCreationInfo, HolderSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reason {
    KnownList,
    ContractOrCreator,
    ReceivedFromCreator,
    ReceivedFromContract,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::KnownList => "known address list",
            Reason::ContractOrCreator => "is contract/creator",
            Reason::ReceivedFromCreator => "received from creator",
            Reason::ReceivedFromContract => "received from contract",
        };
        f.write_str(s)
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_known_team: bool,
    pub is_inferred_team: bool,
    /// In rule order
    pub reasons: Vec<Reason>,
}

impl Classification {
    pub fn is_team(&self) -> bool {
        self.is_known_team || self.is_inferred_team
    }

    fn mark_known(&mut self, reason: Reason) {
        self.is_known_team = true;
        self.reasons.push(reason);
    }

    fn mark_inferred(&mut self, reason: Reason) {
        self.is_inferred_team = true;
        self.reasons.push(reason);
    }
}

pub struct HeuristicClassifier {
    token: Address,
    creator: Option<Address>,
    known: BTreeSet<Address>,
    creator_funded: BTreeSet<Address>,
    contract_funded: BTreeSet<Address>,
}

impl HeuristicClassifier {
    pub fn new(
        token: &Address,
        creation: Option<&ContractCreationInfo>,
        known: &BTreeSet<Address>,
        transfers: &EarlyTransfers,
    ) -> Self {
        let creator = creation.map(|c| c.creator.clone());
        let creator_funded = creator
            .as_ref()
            .map(|c| transfers.receivers_from(c).cloned().collect())
            .unwrap_or_default();
        let contract_funded = transfers.receivers_from(token).cloned().collect();

        Self {
            token: token.clone(),
            creator,
            known: known.clone(),
            creator_funded,
            contract_funded,
        }
    }

    /// Classify every snapshot holder and every known-team address
    pub fn classify(&self, holders: &HolderSnapshot) -> BTreeMap<Address, Classification> {
        let in_snapshot: BTreeSet<&Address> = holders.holders.iter().map(|h| &h.address).collect();
        let candidates: BTreeSet<&Address> = in_snapshot.iter().copied().chain(self.known.iter()).collect();

        candidates
            .into_iter()
            .map(|address| {
                let held = in_snapshot.contains(address);
                (address.clone(), self.classify_one(address, held))
            })
            .collect()
    }

    fn classify_one(&self, address: &Address, in_snapshot: bool) -> Classification {
        let mut class = Classification::default();

        if self.known.contains(address) {
            class.mark_known(Reason::KnownList);
        }

        let is_creator = self.creator.as_ref() == Some(address);
        if in_snapshot && (is_creator || address == &self.token) {
            class.mark_known(Reason::ContractOrCreator);
        }

        if !address.is_zero() {
            if self.creator_funded.contains(address) {
                class.mark_inferred(Reason::ReceivedFromCreator);
            }
            if self.contract_funded.contains(address) {
                class.mark_inferred(Reason::ReceivedFromContract);
            }
        }

        class
    }
}
