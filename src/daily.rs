//! Per-(user, offer, day) aggregation of events and payments.

use std::collections::btree_map;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::events::EventRecord;
use crate::input::EntityId;
use crate::payments::PaymentRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Prints,
    Taps,
    Payments,
    Amount,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Self::Prints, Self::Taps, Self::Payments, Self::Amount];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prints => "prints",
            Self::Taps => "taps",
            Self::Payments => "payments",
            Self::Amount => "amount",
        }
    }

    pub fn feature_column(self) -> &'static str {
        match self {
            Self::Prints => "prints_prev_3w",
            Self::Taps => "taps_prev_3w",
            Self::Payments => "payments_prev_3w",
            Self::Amount => "amount_prev_3w",
        }
    }
}

/// Aggregation grain. Field order makes the derived ordering group by
/// `(user_id, value_prop)` and then walk days ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DailyKey {
    pub user_id: EntityId,
    pub value_prop: EntityId,
    pub day: NaiveDate,
}

impl DailyKey {
    pub fn new(user_id: EntityId, value_prop: EntityId, day: NaiveDate) -> Self {
        Self {
            user_id,
            value_prop,
            day,
        }
    }

    pub fn same_group(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.value_prop == other.value_prop
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyMetric {
    pub metric: Metric,
    values: BTreeMap<DailyKey, f64>,
}

impl DailyMetric {
    pub fn empty(metric: Metric) -> Self {
        Self {
            metric,
            values: BTreeMap::new(),
        }
    }

    pub fn from_values(metric: Metric, values: BTreeMap<DailyKey, f64>) -> Self {
        Self { metric, values }
    }

    pub fn get(&self, key: &DailyKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DailyKey, f64> {
        self.values.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyPayments {
    pub payments: DailyMetric,
    pub amount: DailyMetric,
}

pub fn daily_counts(events: &[EventRecord], metric: Metric) -> DailyMetric {
    let mut values = BTreeMap::new();
    for event in events {
        let key = DailyKey::new(event.user_id.clone(), event.value_prop.clone(), event.day);
        *values.entry(key).or_insert(0.0) += 1.0;
    }
    DailyMetric::from_values(metric, values)
}

/// Payment count and summed amount per key, outer-joined with zero fill.
pub fn daily_payments(payments: &[PaymentRecord]) -> DailyPayments {
    let mut counts: BTreeMap<DailyKey, f64> = BTreeMap::new();
    let mut amounts: BTreeMap<DailyKey, f64> = BTreeMap::new();
    for payment in payments {
        let key = DailyKey::new(
            payment.user_id.clone(),
            payment.value_prop.clone(),
            payment.day,
        );
        *counts.entry(key.clone()).or_insert(0.0) += 1.0;
        *amounts.entry(key).or_insert(0.0) += payment.amount;
    }

    for key in counts.keys() {
        amounts.entry(key.clone()).or_insert(0.0);
    }
    for key in amounts.keys() {
        counts.entry(key.clone()).or_insert(0.0);
    }

    DailyPayments {
        payments: DailyMetric::from_values(Metric::Payments, counts),
        amount: DailyMetric::from_values(Metric::Amount, amounts),
    }
}
