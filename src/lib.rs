//! Carousel training-dataset builder.
//!
//! Pipeline:
//! - normalize impression/tap JSON Lines and the payments CSV
//! - aggregate to one row per (user, value_prop, day)
//! - trailing 21-day history per (user, value_prop), strictly before each day
//! - label the latest impression week with clicks and join the history

mod daily;
mod dataset;
mod events;
mod input;
mod observability;
mod payments;
mod window;

pub use daily::{daily_counts, daily_payments, DailyKey, DailyMetric, DailyPayments, Metric};
pub use dataset::{
    assemble_dataset, build_dataset, render_dataset_csv, sha256_hex, target_week,
    AssembledDataset, DatasetConfig, DatasetError, DatasetInputs, DatasetReport, FeatureRow,
    TargetWeek, DATASET_HEADERS,
};
pub use events::{load_event_log, normalize_events, parse_event_lines, EventRecord, RawEvent};
pub use input::{ensure_dir, ensure_file, parse_day, EntityId, InputError, InputTable};
pub use observability::{
    init_logging, log_run_failed, log_run_finish, log_run_start, logging_config_from_env,
    logging_config_from_lookup, LogFormat, LoggingConfig, LoggingInitError, LOG_FORMAT_ENV,
    LOG_LEVEL_ENV, LOG_TARGET_ENV,
};
pub use payments::{load_payments, parse_payments, PaymentRecord, PAYMENT_COLUMNS};
pub use window::{
    trailing_sums, trailing_window, TrailingWindow, TrailingWindowConfig, WindowError,
    WindowReport, DEFAULT_LOOKBACK_DAYS,
};
