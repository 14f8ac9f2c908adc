//! Training table assembly for the most recent impression week.

use std::cmp::Ordering;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::daily::{daily_counts, daily_payments, DailyKey, DailyMetric, Metric};
use crate::events::{load_event_log, normalize_events, EventRecord};
use crate::input::{ensure_dir, EntityId, InputError, InputTable};
use crate::payments::{load_payments, PaymentRecord};
use crate::window::{trailing_window, TrailingWindow, TrailingWindowConfig, WindowError};

pub const DATASET_HEADERS: [&str; 9] = [
    "day",
    "user_id",
    "value_prop",
    "position",
    "clicked",
    "prints_prev_3w",
    "taps_prev_3w",
    "payments_prev_3w",
    "amount_prev_3w",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    pub prints_file: String,
    pub taps_file: String,
    pub pays_file: String,
    pub lookback_days: u32,
    pub target_week_days: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            prints_file: "prints.json".to_string(),
            taps_file: "taps.json".to_string(),
            pays_file: "pays.csv".to_string(),
            lookback_days: crate::window::DEFAULT_LOOKBACK_DAYS,
            target_week_days: 7,
        }
    }
}

impl DatasetConfig {
    pub fn window_config(&self) -> TrailingWindowConfig {
        TrailingWindowConfig {
            lookback_days: self.lookback_days,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid dataset config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("permission denied writing {}: {source}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub day: NaiveDate,
    pub user_id: EntityId,
    pub value_prop: EntityId,
    pub position: Option<i64>,
    pub clicked: u8,
    pub prints_prev_3w: f64,
    pub taps_prev_3w: f64,
    pub payments_prev_3w: f64,
    pub amount_prev_3w: f64,
}

/// Inclusive day range of labeled impressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWeek {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TargetWeek {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetInputs {
    pub prints: Vec<EventRecord>,
    pub taps: Vec<EventRecord>,
    pub payments: Vec<PaymentRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDataset {
    pub target_week: Option<TargetWeek>,
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub impressions: u64,
    pub taps: u64,
    pub payments: u64,
    pub target_week: Option<TargetWeek>,
    pub output_rows: u64,
    pub clicked_rows: u64,
    pub output_sha256: String,
}

/// The `target_week_days` span ending at the latest impression day.
pub fn target_week(prints: &[EventRecord], target_week_days: u32) -> Option<TargetWeek> {
    let end = prints.iter().map(|event| event.day).max()?;
    let span = u64::from(target_week_days.saturating_sub(1));
    let start = end.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN);
    Some(TargetWeek { start, end })
}

/// Loads the three inputs from `input_dir`, builds the table and writes it to `output`.
///
/// Nothing is written unless every stage succeeds.
pub fn build_dataset(
    input_dir: &Path,
    output: &Path,
    cfg: &DatasetConfig,
) -> Result<DatasetReport, DatasetError> {
    validate_config(cfg)?;
    ensure_dir(input_dir)?;

    info!(
        component = "dataset",
        event = "dataset.build.start",
        input_dir = %input_dir.display(),
        output = %output.display(),
        lookback_days = cfg.lookback_days,
        target_week_days = cfg.target_week_days
    );

    let prints_raw = load_event_log(&input_dir.join(&cfg.prints_file), InputTable::Prints)?;
    let taps_raw = load_event_log(&input_dir.join(&cfg.taps_file), InputTable::Taps)?;
    let payments = load_payments(&input_dir.join(&cfg.pays_file))?;

    let inputs = DatasetInputs {
        prints: normalize_events(&prints_raw, InputTable::Prints)?,
        taps: normalize_events(&taps_raw, InputTable::Taps)?,
        payments,
    };

    let assembled = assemble_dataset(&inputs, cfg)?;
    let bytes = render_dataset_csv(&assembled.rows)?;
    write_atomic(output, &bytes)?;

    let report = DatasetReport {
        input_dir: input_dir.to_path_buf(),
        output: output.to_path_buf(),
        impressions: inputs.prints.len() as u64,
        taps: inputs.taps.len() as u64,
        payments: inputs.payments.len() as u64,
        target_week: assembled.target_week,
        output_rows: assembled.rows.len() as u64,
        clicked_rows: assembled.rows.iter().filter(|row| row.clicked == 1).count() as u64,
        output_sha256: sha256_hex(&bytes),
    };

    info!(
        component = "dataset",
        event = "dataset.build.finish",
        output = %output.display(),
        output_rows = report.output_rows,
        clicked_rows = report.clicked_rows,
        output_sha256 = %report.output_sha256
    );

    Ok(report)
}

/// Joins click labels and trailing history onto the target week's impressions.
pub fn assemble_dataset(
    inputs: &DatasetInputs,
    cfg: &DatasetConfig,
) -> Result<AssembledDataset, DatasetError> {
    validate_config(cfg)?;

    let Some(week) = target_week(&inputs.prints, cfg.target_week_days) else {
        warn!(
            component = "dataset",
            event = "dataset.assemble.no_impressions"
        );
        return Ok(AssembledDataset {
            target_week: None,
            rows: Vec::new(),
        });
    };

    let base: Vec<&EventRecord> = inputs
        .prints
        .iter()
        .filter(|event| week.contains(event.day))
        .collect();
    if base.is_empty() {
        warn!(
            component = "dataset",
            event = "dataset.assemble.empty_target_week",
            start = %week.start,
            end = %week.end
        );
        return Ok(AssembledDataset {
            target_week: Some(week),
            rows: Vec::new(),
        });
    }

    if inputs.taps.is_empty() {
        warn!(component = "dataset", event = "dataset.assemble.no_taps");
    }
    if inputs.payments.is_empty() {
        warn!(component = "dataset", event = "dataset.assemble.no_payments");
    }

    let taps_daily = daily_counts(&inputs.taps, Metric::Taps);
    let history = HistoryWindows::compute(inputs, &taps_daily, &cfg.window_config())?;

    let mut rows: Vec<FeatureRow> = base
        .into_iter()
        .map(|event| {
            let key = DailyKey::new(event.user_id.clone(), event.value_prop.clone(), event.day);
            let clicked = taps_daily.get(&key).map(|taps| taps > 0.0).unwrap_or(false);
            FeatureRow {
                day: event.day,
                user_id: event.user_id.clone(),
                value_prop: event.value_prop.clone(),
                position: event.position,
                clicked: u8::from(clicked),
                prints_prev_3w: history.lookup(Metric::Prints, &key),
                taps_prev_3w: history.lookup(Metric::Taps, &key),
                payments_prev_3w: history.lookup(Metric::Payments, &key),
                amount_prev_3w: history.lookup(Metric::Amount, &key),
            }
        })
        .collect();
    rows.sort_by(compare_feature_rows);

    info!(
        component = "dataset",
        event = "dataset.assemble.finish",
        start = %week.start,
        end = %week.end,
        rows = rows.len()
    );

    Ok(AssembledDataset {
        target_week: Some(week),
        rows,
    })
}

/// Header row plus one line per feature row. The header is always present.
pub fn render_dataset_csv(rows: &[FeatureRow]) -> Result<Vec<u8>, DatasetError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(DATASET_HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| DatasetError::Csv(csv::Error::from(err.into_error())))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

struct HistoryWindows {
    windows: Vec<TrailingWindow>,
}

impl HistoryWindows {
    fn compute(
        inputs: &DatasetInputs,
        taps_daily: &DailyMetric,
        cfg: &TrailingWindowConfig,
    ) -> Result<Self, DatasetError> {
        let prints_daily = daily_counts(&inputs.prints, Metric::Prints);
        let payments_daily = daily_payments(&inputs.payments);

        let mut windows = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let daily = match metric {
                Metric::Prints => &prints_daily,
                Metric::Taps => taps_daily,
                Metric::Payments => &payments_daily.payments,
                Metric::Amount => &payments_daily.amount,
            };
            windows.push(trailing_window(daily, cfg)?);
        }
        Ok(Self { windows })
    }

    /// Unmatched keys have no prior history and read as zero.
    fn lookup(&self, metric: Metric, key: &DailyKey) -> f64 {
        self.windows
            .iter()
            .find(|window| window.metric == metric)
            .and_then(|window| window.get(key))
            .unwrap_or(0.0)
    }
}

fn validate_config(cfg: &DatasetConfig) -> Result<(), DatasetError> {
    if cfg.lookback_days == 0 {
        return Err(DatasetError::InvalidConfig(
            "lookback_days must be > 0".to_string(),
        ));
    }
    if cfg.target_week_days == 0 {
        return Err(DatasetError::InvalidConfig(
            "target_week_days must be > 0".to_string(),
        ));
    }
    for (name, file) in [
        ("prints_file", &cfg.prints_file),
        ("taps_file", &cfg.taps_file),
        ("pays_file", &cfg.pays_file),
    ] {
        if file.trim().is_empty() {
            return Err(DatasetError::InvalidConfig(format!(
                "{name} must not be empty"
            )));
        }
    }
    Ok(())
}

fn compare_feature_rows(a: &FeatureRow, b: &FeatureRow) -> Ordering {
    a.day
        .cmp(&b.day)
        .then_with(|| a.user_id.cmp(&b.user_id))
        .then_with(|| a.value_prop.cmp(&b.value_prop))
        .then_with(|| compare_positions(a.position, b.position))
}

/// Missing positions sort last.
fn compare_positions(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DatasetError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            DatasetError::InvalidConfig(format!("invalid output path: {}", path.display()))
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    write_then_rename(&tmp_path, path, bytes).map_err(|source| {
        // the temp file may not exist if creation itself failed
        let _ = fs::remove_file(&tmp_path);
        output_error(path, source)
    })
}

fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = fs::File::create(tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)
}

fn output_error(path: &Path, source: io::Error) -> DatasetError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        DatasetError::PermissionDenied {
            path: path.to_path_buf(),
            source,
        }
    } else {
        DatasetError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
