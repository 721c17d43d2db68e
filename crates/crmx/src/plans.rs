//! 📋 Plan matching: turning "FIBER 50mbps (promo)" into a period id the destination accepts.
//!
//! 🧠 Knowledge graph:
//! - [`PlanCatalog::build`] indexes every plan that has an enabled period, under its
//!   name as given and under its lowercased/trimmed name. Keys keep first-insertion
//!   order; a later plan with the same key replaces the period id in place.
//! - [`PlanCatalog::resolve`] tries, in order:
//!   1. the raw name as a key,
//!   2. the lowercased/trimmed name as a key,
//!   3. case-insensitive substring either way round over every key.
//! - Tier 3 is where ambiguity lives. `"Fiber 10"` is a substring of both `"Fiber 100"`
//!   and `"Fiber 1000 Promo"`. [`MatchStrategy::MostSpecific`] picks the candidate whose
//!   length is closest to the query; [`MatchStrategy::FirstMatch`] takes the first hit
//!   in key order, which is how the legacy scripts behaved.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::info;

use crate::client::ApiClient;
use crate::common::ServicePlan;
use crate::error::ApiError;

/// 🎯 How tier-3 substring matches are tie-broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Closest length to the query wins; ties go to key order.
    #[default]
    MostSpecific,
    /// First key in order wins.
    FirstMatch,
}

/// 📇 Name → first-enabled-period-id, immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanCatalog {
    entries: Vec<(String, u64)>,
    positions: HashMap<String, usize>,
    strategy: MatchStrategy,
}

impl PlanCatalog {
    pub fn build<'a>(
        plans: impl IntoIterator<Item = &'a ServicePlan>,
        strategy: MatchStrategy,
    ) -> Self {
        let mut catalog = Self {
            strategy,
            ..Self::default()
        };
        for plan in plans {
            let Some(period_id) = plan.first_enabled_period() else {
                continue;
            };
            catalog.insert(plan.name.clone(), period_id);
            catalog.insert(normalize(&plan.name), period_id);
        }
        catalog
    }

    /// 📡 One GET of `/service-plans`, then [`PlanCatalog::build`].
    pub async fn discover(
        destination: &ApiClient,
        strategy: MatchStrategy,
    ) -> Result<Self, ApiError> {
        info!("📋 Fetching service plans from {}", destination.label());
        let plans: Vec<ServicePlan> = destination.get_as("/service-plans").await?;
        let catalog = Self::build(&plans, strategy);
        info!(
            "✅ Found {} service plans ({} lookup keys, {:?} matching)",
            plans.len(),
            catalog.len(),
            strategy
        );
        Ok(catalog)
    }

    fn insert(&mut self, key: String, period_id: u64) {
        match self.positions.get(&key) {
            Some(&position) => self.entries[position].1 = period_id,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, period_id));
            }
        }
    }

    /// 🔎 Period id for a free-text plan name, or `None` if nothing resembles it.
    pub fn resolve(&self, name: &str) -> Option<u64> {
        if let Some(&position) = self.positions.get(name) {
            return Some(self.entries[position].1);
        }
        let normalized = normalize(name);
        if let Some(&position) = self.positions.get(&normalized) {
            return Some(self.entries[position].1);
        }
        if normalized.is_empty() {
            return None;
        }

        let query_len = normalized.chars().count();
        let mut candidates = self.entries.iter().filter_map(|(key, period_id)| {
            let candidate = key.to_lowercase();
            let related = !candidate.is_empty()
                && (candidate.contains(&normalized) || normalized.contains(&candidate));
            related.then(|| (candidate.chars().count(), *period_id))
        });

        match self.strategy {
            MatchStrategy::FirstMatch => candidates.next().map(|(_, period_id)| period_id),
            MatchStrategy::MostSpecific => candidates
                .min_by_key(|(candidate_len, _)| candidate_len.abs_diff(query_len))
                .map(|(_, period_id)| period_id),
        }
    }

    /// Every lookup key with its period id, in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries
            .iter()
            .map(|(key, period_id)| (key.as_str(), *period_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
