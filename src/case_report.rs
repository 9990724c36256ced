use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;

use crate::{error::CoercionError, handler::Columns, host::RawRow};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CaseRow {
    pub date: DateTime<Utc>,
    pub fips: String,
    pub cases: i64,
}

/// The merged output: `date`, `fips` and `cases`, nothing else.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFrame {
    rows: Vec<CaseRow>,
}

impl CaseFrame {
    pub const COLUMNS: [&'static str; 3] = ["date", "fips", "cases"];

    pub fn new(rows: Vec<CaseRow>) -> Self {
        Self { rows }
    }

    /// Keeps only the contract's three columns of each row and coerces them.
    pub fn from_raw(raw_rows: Vec<RawRow>, columns: &Columns) -> Result<Self, CoercionError> {
        let rows = raw_rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                Ok(CaseRow {
                    date: coerce_date(index, column(row, index, &columns.datetime)?)?,
                    fips: coerce_fips(index, column(row, index, &columns.id)?)?,
                    cases: coerce_cases(index, column(row, index, &columns.value)?)?,
                })
            })
            .collect::<Result<Vec<_>, CoercionError>>()?;
        Ok(Self { rows })
    }

    pub fn concat(frames: impl IntoIterator<Item = CaseFrame>) -> Self {
        Self {
            rows: frames.into_iter().flat_map(|frame| frame.rows).collect(),
        }
    }

    pub fn rows(&self) -> &[CaseRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<CaseRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(Self::COLUMNS)?;
        for row in &self.rows {
            csv_writer.write_record([
                row.date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                row.fips.clone(),
                row.cases.to_string(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

fn column<'a>(row: &'a RawRow, index: usize, name: &str) -> Result<&'a Value, CoercionError> {
    row.get(name).ok_or_else(|| CoercionError::MissingColumn {
        row: index,
        column: name.to_string(),
    })
}

fn bad_value(row: usize, column: &'static str, value: &Value) -> CoercionError {
    CoercionError::BadValue {
        row,
        column,
        value: value.to_string(),
    }
}

fn coerce_date(row: usize, value: &Value) -> Result<DateTime<Utc>, CoercionError> {
    let parsed = match value {
        Value::String(text) => parse_date(text),
        Value::Number(number) => number.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };
    parsed
        .map(|date| date.trunc_subsecs(3))
        .ok_or_else(|| bad_value(row, "date", value))
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn coerce_fips(row: usize, value: &Value) -> Result<String, CoercionError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => match number.as_u64() {
            Some(code) => Ok(format!("{code:05}")),
            None => Err(bad_value(row, "fips", value)),
        },
        _ => Err(bad_value(row, "fips", value)),
    }
}

fn coerce_cases(row: usize, value: &Value) -> Result<i64, CoercionError> {
    let cases = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    cases.ok_or_else(|| bad_value(row, "cases", value))
}
