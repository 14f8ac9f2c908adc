//! Trailing 21-day windows over daily aggregates.
//!
//! Each `(user_id, value_prop)` group gets a dense daily timeline spanning its
//! own first and last active day. Days without activity are filled with zero.
//! The value for day `D` is the sum over the `lookback_days` days strictly
//! before `D`, so nothing from `D` itself or later leaks into it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

use crate::daily::{DailyKey, DailyMetric, Metric};
use crate::input::EntityId;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingWindowConfig {
    pub lookback_days: u32,
}

impl Default for TrailingWindowConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("invalid trailing window config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowReport {
    pub groups: u64,
    pub active_days: u64,
    pub dense_days: u64,
}

impl WindowReport {
    pub fn filled_days(&self) -> u64 {
        self.dense_days.saturating_sub(self.active_days)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrailingWindow {
    pub metric: Metric,
    pub report: WindowReport,
    rows: BTreeMap<DailyKey, f64>,
}

impl TrailingWindow {
    pub fn feature_column(&self) -> &'static str {
        self.metric.feature_column()
    }

    pub fn get(&self, key: &DailyKey) -> Option<f64> {
        self.rows.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DailyKey, f64)> + '_ {
        self.rows.iter().map(|(key, value)| (key, *value))
    }
}

struct GroupTimeline {
    user_id: EntityId,
    value_prop: EntityId,
    active: BTreeMap<NaiveDate, f64>,
}

pub fn trailing_window(
    daily: &DailyMetric,
    cfg: &TrailingWindowConfig,
) -> Result<TrailingWindow, WindowError> {
    validate_config(cfg)?;

    let lookback = cfg.lookback_days as usize;
    let mut rows = BTreeMap::new();
    let mut report = WindowReport::default();

    for group in group_timelines(daily) {
        let dense = dense_timeline(&group.active);
        let values: Vec<f64> = dense.values().copied().collect();
        let sums = trailing_sums(&values, lookback);

        report.groups += 1;
        report.active_days += group.active.len() as u64;
        report.dense_days += dense.len() as u64;

        for (day, sum) in dense.keys().zip(sums) {
            let key = DailyKey::new(group.user_id.clone(), group.value_prop.clone(), *day);
            rows.insert(key, sum);
        }
    }

    info!(
        component = "window",
        event = "window.compute.finish",
        metric = daily.metric.as_str(),
        lookback_days = cfg.lookback_days,
        groups = report.groups,
        active_days = report.active_days,
        dense_days = report.dense_days,
        filled_days = report.filled_days()
    );

    Ok(TrailingWindow {
        metric: daily.metric,
        report,
        rows,
    })
}

/// Sum of the up-to-`lookback` entries strictly before each index.
pub fn trailing_sums(values: &[f64], lookback: usize) -> Vec<f64> {
    (0..values.len())
        .map(|idx| {
            let start = idx.saturating_sub(lookback);
            // float `sum` starts at -0.0, which would leak into the output
            values[start..idx].iter().fold(0.0, |acc, value| acc + value)
        })
        .collect()
}

fn validate_config(cfg: &TrailingWindowConfig) -> Result<(), WindowError> {
    if cfg.lookback_days == 0 {
        return Err(WindowError::InvalidConfig(
            "lookback_days must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn group_timelines(daily: &DailyMetric) -> Vec<GroupTimeline> {
    let mut groups: Vec<GroupTimeline> = Vec::new();
    let mut previous: Option<&DailyKey> = None;

    for (key, value) in daily.iter() {
        let continues = previous.map(|prev| prev.same_group(key)).unwrap_or(false);
        if !continues {
            groups.push(GroupTimeline {
                user_id: key.user_id.clone(),
                value_prop: key.value_prop.clone(),
                active: BTreeMap::new(),
            });
        }
        if let Some(group) = groups.last_mut() {
            group.active.insert(key.day, *value);
        }
        previous = Some(key);
    }

    groups
}

/// Expands sparse active days into every calendar day of `[first, last]`.
fn dense_timeline(active: &BTreeMap<NaiveDate, f64>) -> BTreeMap<NaiveDate, f64> {
    let mut dense = BTreeMap::new();
    let (Some((&first, _)), Some((&last, _))) = (active.first_key_value(), active.last_key_value())
    else {
        return dense;
    };

    let mut day = first;
    loop {
        dense.insert(day, active.get(&day).copied().unwrap_or(0.0));
        if day >= last {
            break;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    debug!(
        component = "window",
        event = "window.group.timeline",
        first_day = %first,
        last_day = %last,
        active_days = active.len(),
        dense_days = dense.len()
    );

    dense
}
