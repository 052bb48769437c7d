use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::errors::{GameError, Result};
use crate::common::types::{CompanyId, PriceTable};

/// Signed share-count deltas keyed by company
pub type ShareChanges = BTreeMap<CompanyId, i64>;

/// Reverse every delta, for undoing a previously applied change set
pub fn negated(changes: &ShareChanges) -> ShareChanges {
    changes.iter().map(|(&company, &delta)| (company, -delta)).collect()
}

/// Holdings of one team
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamShares(BTreeMap<CompanyId, i64>);

impl TeamShares {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count held for a company, zero when absent
    pub fn get(&self, company_id: CompanyId) -> i64 {
        self.0.get(&company_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CompanyId, i64)> + '_ {
        self.0.iter().map(|(&company, &count)| (company, count))
    }

    /// Apply signed deltas.
    ///
    /// A company missing from the holdings only accepts a non-negative delta;
    /// a present one accepts any delta keeping the sum non-negative. The merge
    /// is all-or-nothing: on `NegativeShareCount` the holdings are untouched.
    pub fn merge_changes(&mut self, changes: &ShareChanges) -> Result<()> {
        let mut merged = Vec::with_capacity(changes.len());

        for (&company_id, &delta) in changes {
            let next = match self.0.get(&company_id) {
                None if delta < 0 => return Err(GameError::NegativeShareCount { company_id }),
                None => delta,
                Some(&current) => current
                    .checked_add(delta)
                    .filter(|sum| *sum >= 0)
                    .ok_or(GameError::NegativeShareCount { company_id })?,
            };
            merged.push((company_id, next));
        }

        self.0.extend(merged);
        Ok(())
    }

    /// Undo a change set previously applied with [`merge_changes`](Self::merge_changes)
    pub fn revert_changes(&mut self, changes: &ShareChanges) -> Result<()> {
        self.merge_changes(&negated(changes))
    }

    /// Give every listed company an explicit count, dropping the others.
    ///
    /// Used to present holdings over the non-archived companies.
    pub fn densify(&mut self, company_ids: impl IntoIterator<Item = CompanyId>) {
        self.0 = company_ids
            .into_iter()
            .map(|company| (company, self.get(company)))
            .collect();
    }

    /// Holdings valued at the given prices; unpriced companies are worth zero
    pub fn value_at(&self, prices: &PriceTable) -> Result<i64> {
        self.iter().try_fold(0i64, |total, (company, count)| {
            prices
                .get(&company)
                .copied()
                .unwrap_or(0)
                .checked_mul(count)
                .and_then(|value| total.checked_add(value))
                .ok_or(GameError::AmountOverflow)
        })
    }
}

impl From<BTreeMap<CompanyId, i64>> for TeamShares {
    fn from(map: BTreeMap<CompanyId, i64>) -> Self {
        Self(map)
    }
}

impl<const N: usize> From<[(CompanyId, i64); N]> for TeamShares {
    fn from(pairs: [(CompanyId, i64); N]) -> Self {
        Self(BTreeMap::from(pairs))
    }
}
