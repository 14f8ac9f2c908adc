//! Impression and tap event logs: JSON Lines loading and normalization.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

use crate::input::{ensure_file, parse_day, EntityId, InputError, InputTable};

const REQUIRED_EVENT_COLUMNS: [&str; 3] = ["day", "user_id", "event_data"];

/// One line of an event log, before validation. `None` means the key was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub line: u64,
    pub day: Option<Value>,
    pub user_id: Option<Value>,
    pub event_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub day: NaiveDate,
    pub user_id: EntityId,
    pub value_prop: EntityId,
    pub position: Option<i64>,
}

pub fn load_event_log(path: &Path, table: InputTable) -> Result<Vec<RawEvent>, InputError> {
    ensure_file(path)?;
    let body = fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_event_lines(&body, table)?;

    if records.is_empty() {
        warn!(
            component = "events",
            event = "events.load.empty",
            table = table.as_str(),
            path = %path.display()
        );
    }
    info!(
        component = "events",
        event = "events.load.finish",
        table = table.as_str(),
        records = records.len()
    );

    Ok(records)
}

pub fn parse_event_lines(body: &str, table: InputTable) -> Result<Vec<RawEvent>, InputError> {
    let mut records = Vec::new();
    for (idx, line) in body.lines().enumerate() {
        let line_no = idx as u64 + 1;
        if line.trim().is_empty() {
            continue;
        }

        let value: Value =
            serde_json::from_str(line).map_err(|err| InputError::MalformedRecord {
                table,
                line: line_no,
                message: err.to_string(),
            })?;
        let Value::Object(mut object) = value else {
            return Err(InputError::MalformedRecord {
                table,
                line: line_no,
                message: "expected a JSON object".to_string(),
            });
        };

        records.push(RawEvent {
            line: line_no,
            day: object.remove("day"),
            user_id: object.remove("user_id"),
            event_data: object.remove("event_data"),
        });
    }
    Ok(records)
}

/// Flattens raw events into `(day, user_id, value_prop, position)` rows.
///
/// Any structurally invalid row fails the whole table.
pub fn normalize_events(
    raw: &[RawEvent],
    table: InputTable,
) -> Result<Vec<EventRecord>, InputError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let missing: Vec<String> = REQUIRED_EVENT_COLUMNS
        .iter()
        .filter(|column| !raw.iter().any(|event| column_present(event, column)))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(InputError::MissingColumns {
            table,
            columns: missing,
        });
    }

    if let Some(event) = raw
        .iter()
        .find(|event| !matches!(event.event_data, Some(Value::Object(_))))
    {
        return Err(InputError::NotAMapping {
            table,
            line: event.line,
        });
    }

    raw.iter().map(|event| normalize_event(event, table)).collect()
}

fn column_present(event: &RawEvent, column: &str) -> bool {
    match column {
        "day" => event.day.is_some(),
        "user_id" => event.user_id.is_some(),
        "event_data" => event.event_data.is_some(),
        _ => false,
    }
}

fn normalize_event(event: &RawEvent, table: InputTable) -> Result<EventRecord, InputError> {
    let line = event.line;
    let day = match &event.day {
        Some(Value::String(raw)) => parse_day(raw),
        _ => None,
    }
    .ok_or_else(|| InputError::InvalidDate {
        table,
        line,
        field: "day",
        value: event
            .day
            .as_ref()
            .map(render_value)
            .unwrap_or_else(|| "null".to_string()),
    })?;

    let user_id = entity_id_from_json(event.user_id.as_ref(), table, line, "user_id")?
        .ok_or(InputError::MissingUserId { table, line })?;

    let data = match &event.event_data {
        Some(Value::Object(data)) => data,
        _ => return Err(InputError::NotAMapping { table, line }),
    };
    let value_prop = entity_id_from_json(data.get("value_prop"), table, line, "value_prop")?
        .ok_or(InputError::MissingValueProp { table, line })?;
    let position =
        parse_position(data.get("position")).map_err(|value| InputError::InvalidPosition {
            table,
            line,
            value,
        })?;

    Ok(EventRecord {
        day,
        user_id,
        value_prop,
        position,
    })
}

fn entity_id_from_json(
    value: Option<&Value>,
    table: InputTable,
    line: u64,
    field: &'static str,
) -> Result<Option<EntityId>, InputError> {
    let invalid = |found| InputError::InvalidIdentifier {
        table,
        line,
        field,
        found,
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Ok(EntityId::new(raw)),
        Some(Value::Number(number)) => Ok(EntityId::new(number.to_string())),
        Some(Value::Bool(_)) => Err(invalid("bool")),
        Some(Value::Array(_)) => Err(invalid("array")),
        Some(Value::Object(_)) => Err(invalid("object")),
    }
}

fn parse_position(value: Option<&Value>) -> Result<Option<i64>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| integral_f64(number))
            .map(Some)
            .ok_or_else(|| number.to_string()),
        Some(Value::String(raw)) => raw.trim().parse::<i64>().map(Some).map_err(|_| raw.clone()),
        Some(other) => Err(other.to_string()),
    }
}

fn integral_f64(number: &serde_json::Number) -> Option<i64> {
    number
        .as_f64()
        .filter(|value| value.is_finite() && value.fract() == 0.0)
        .filter(|value| *value >= i64::MIN as f64 && *value <= i64::MAX as f64)
        .map(|value| value as i64)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
