//! Payments table: CSV loading and validation.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{info, warn};

use crate::input::{ensure_file, parse_day, EntityId, InputError, InputTable};

pub const PAYMENT_COLUMNS: [&str; 4] = ["pay_date", "user_id", "value_prop", "total"];

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub day: NaiveDate,
    pub user_id: EntityId,
    pub value_prop: EntityId,
    pub amount: f64,
}

pub fn load_payments(path: &Path) -> Result<Vec<PaymentRecord>, InputError> {
    ensure_file(path)?;
    let file = fs::File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let payments = parse_payments(file)?;

    if payments.is_empty() {
        warn!(
            component = "payments",
            event = "payments.load.empty",
            path = %path.display()
        );
    }
    info!(
        component = "payments",
        event = "payments.load.finish",
        records = payments.len()
    );

    Ok(payments)
}

/// Reads a headered payments CSV. A completely empty input is an empty table.
pub fn parse_payments<R: Read>(reader: R) -> Result<Vec<PaymentRecord>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut indices = [0usize; PAYMENT_COLUMNS.len()];
    let mut missing = Vec::new();
    for (slot, column) in indices.iter_mut().zip(PAYMENT_COLUMNS) {
        match headers.iter().position(|header| header == column) {
            Some(idx) => *slot = idx,
            None => missing.push(column.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(InputError::MissingColumns {
            table: InputTable::Pays,
            columns: missing,
        });
    }

    let mut payments = Vec::new();
    for record in reader.records() {
        let record = record?;
        payments.push(parse_payment_record(&record, &indices)?);
    }
    Ok(payments)
}

fn parse_payment_record(
    record: &StringRecord,
    indices: &[usize; PAYMENT_COLUMNS.len()],
) -> Result<PaymentRecord, InputError> {
    let table = InputTable::Pays;
    let line = record.position().map(|pos| pos.line()).unwrap_or_default();
    let field = |idx: usize| record.get(indices[idx]).unwrap_or_default();

    let raw_day = field(0);
    let day = parse_day(raw_day).ok_or_else(|| InputError::InvalidDate {
        table,
        line,
        field: "pay_date",
        value: raw_day.to_string(),
    })?;
    let user_id = EntityId::new(field(1)).ok_or(InputError::MissingUserId { table, line })?;
    let value_prop = EntityId::new(field(2)).ok_or(InputError::MissingValueProp { table, line })?;

    let raw_amount = field(3);
    let amount = raw_amount
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
        .ok_or_else(|| InputError::InvalidAmount {
            table,
            line,
            value: raw_amount.to_string(),
        })?;

    Ok(PaymentRecord {
        day,
        user_id,
        value_prop,
        amount,
    })
}
