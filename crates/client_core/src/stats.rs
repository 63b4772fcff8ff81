//! Aggregates derived from the rows currently on screen.

use std::collections::{btree_map, BTreeMap};

use serde::Serialize;
use shared::domain::{
    CryptoMessage, CryptoMetrics, Holding, InvestmentReport, ReportStatus, Sentiment,
};

pub const ROW_COUNT: &str = "row_count";
pub const TOTAL_USDT_VALUE: &str = "total_usdt_value";
pub const TOTAL_COST_BASIS: &str = "total_cost_basis";
pub const ALLOCATION_PCT: &str = "allocation_pct";
pub const SENTIMENT: &str = "sentiment";
pub const MESSAGES_BY_COIN: &str = "by_coin";
pub const REPORT_STATUS: &str = "status";
pub const APPROVAL_RATE_PCT: &str = "approval_rate_pct";
pub const ADVANCING: &str = "advancing";
pub const DECLINING: &str = "declining";
pub const TOTAL_MARKET_CAP: &str = "total_market_cap";
pub const AVERAGE_CHANGE_24H: &str = "average_change_24h";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Number(f64),
    Count(u64),
    /// Category to share or amount, e.g. coin to percent of portfolio.
    Breakdown(BTreeMap<String, f64>),
    /// Category to number of rows.
    Tally(BTreeMap<String, u64>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DerivedStats(BTreeMap<String, StatValue>);

impl DerivedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: StatValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&StatValue> {
        self.0.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            StatValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn count(&self, name: &str) -> Option<u64> {
        match self.get(name)? {
            StatValue::Count(value) => Some(*value),
            _ => None,
        }
    }

    pub fn breakdown(&self, name: &str) -> Option<&BTreeMap<String, f64>> {
        match self.get(name)? {
            StatValue::Breakdown(value) => Some(value),
            _ => None,
        }
    }

    pub fn tally(&self, name: &str) -> Option<&BTreeMap<String, u64>> {
        match self.get(name)? {
            StatValue::Tally(value) => Some(value),
            _ => None,
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, StatValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pure function from a page of rows to its aggregates.
pub trait DeriveStats: Sized {
    fn derive_stats(rows: &[Self]) -> DerivedStats;
}

fn tally<'a>(labels: impl Iterator<Item = &'a str>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
}

impl DeriveStats for Holding {
    fn derive_stats(rows: &[Self]) -> DerivedStats {
        let mut stats = DerivedStats::new();
        let total: f64 = rows.iter().map(|row| row.usdt_value.unwrap_or(0.0)).sum();
        let cost_basis: f64 = rows
            .iter()
            .filter_map(|row| Some(row.amount? * row.cost_price?))
            .sum();

        let mut allocation = BTreeMap::new();
        if total > 0.0 {
            for row in rows {
                *allocation.entry(row.coin.clone()).or_insert(0.0) +=
                    row.usdt_value.unwrap_or(0.0) / total * 100.0;
            }
        }

        stats.insert(ROW_COUNT, StatValue::Count(rows.len() as u64));
        stats.insert(TOTAL_USDT_VALUE, StatValue::Number(total));
        stats.insert(TOTAL_COST_BASIS, StatValue::Number(cost_basis));
        stats.insert(ALLOCATION_PCT, StatValue::Breakdown(allocation));
        stats
    }
}

impl DeriveStats for CryptoMessage {
    fn derive_stats(rows: &[Self]) -> DerivedStats {
        let mut stats = DerivedStats::new();
        stats.insert(ROW_COUNT, StatValue::Count(rows.len() as u64));
        stats.insert(
            SENTIMENT,
            StatValue::Tally(tally(rows.iter().map(|row| {
                row.sentiment.map_or("UNSET", Sentiment::as_str)
            }))),
        );
        stats.insert(
            MESSAGES_BY_COIN,
            StatValue::Tally(tally(rows.iter().map(|row| row.coin.as_str()))),
        );
        stats
    }
}

impl DeriveStats for InvestmentReport {
    fn derive_stats(rows: &[Self]) -> DerivedStats {
        let mut stats = DerivedStats::new();
        let statuses = tally(
            rows.iter()
                .map(|row| row.status.unwrap_or(ReportStatus::Unknown).label()),
        );
        let approved = statuses.get(ReportStatus::Approved.label()).copied().unwrap_or(0);
        let rejected = statuses.get(ReportStatus::Rejected.label()).copied().unwrap_or(0);

        stats.insert(ROW_COUNT, StatValue::Count(rows.len() as u64));
        if approved + rejected > 0 {
            stats.insert(
                APPROVAL_RATE_PCT,
                StatValue::Number(approved as f64 / (approved + rejected) as f64 * 100.0),
            );
        }
        stats.insert(REPORT_STATUS, StatValue::Tally(statuses));
        stats
    }
}

impl DeriveStats for CryptoMetrics {
    fn derive_stats(rows: &[Self]) -> DerivedStats {
        let mut stats = DerivedStats::new();
        let changes: Vec<f64> = rows.iter().filter_map(|row| row.change_24h).collect();
        let advancing = changes.iter().filter(|change| **change > 0.0).count();
        let declining = changes.iter().filter(|change| **change < 0.0).count();
        let market_cap: f64 = rows.iter().filter_map(|row| row.market_cap).sum();

        stats.insert(ROW_COUNT, StatValue::Count(rows.len() as u64));
        stats.insert(ADVANCING, StatValue::Count(advancing as u64));
        stats.insert(DECLINING, StatValue::Count(declining as u64));
        stats.insert(TOTAL_MARKET_CAP, StatValue::Number(market_cap));
        if !changes.is_empty() {
            stats.insert(
                AVERAGE_CHANGE_24H,
                StatValue::Number(changes.iter().sum::<f64>() / changes.len() as f64),
            );
        }
        stats
    }
}

#[cfg(test)]
#[path = "tests/stats_tests.rs"]
mod tests;
