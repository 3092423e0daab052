use crate::constants::{
    LAST_REVIEW, LATITUDE, LONGITUDE, MAX_LATITUDE, MAX_LONGITUDE, MIN_LATITUDE, MIN_LONGITUDE,
    PRICE, REQUIRED_COLUMNS,
};
use crate::dates::parse_date;
use crate::error::InputError;
use crate::table::{Record, Table, Value};
use chrono::NaiveDateTime;
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Inclusive price bounds applied by the outlier filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRange {
    pub min_price: f64,
    pub max_price: f64,
}

impl PriceRange {
    pub fn new(min_price: f64, max_price: f64) -> Self {
        Self {
            min_price,
            max_price,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min_price && price <= self.max_price
    }
}

/// The cleaning stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Deduplicate,
    DropMissing,
    PriceFilter,
    NormalizeDates,
    Geofence,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Deduplicate,
        Stage::DropMissing,
        Stage::PriceFilter,
        Stage::NormalizeDates,
        Stage::Geofence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Deduplicate => "deduplicate",
            Stage::DropMissing => "drop_missing",
            Stage::PriceFilter => "price_filter",
            Stage::NormalizeDates => "normalize_dates",
            Stage::Geofence => "geofence",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Stage::Deduplicate => "Dropping duplicates",
            Stage::DropMissing => "Dropping rows with missing values",
            Stage::PriceFilter => "Dropping outliers",
            Stage::NormalizeDates => "Converting last_review to datetime",
            Stage::Geofence => "Dropping rows with improper geolocation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counts around a single stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: usize,
    pub rows_out: usize,
}

impl StageReport {
    pub fn dropped(&self) -> usize {
        self.rows_in - self.rows_out
    }
}

/// Summary of a cleaning run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleaningReport {
    pub stages: Vec<StageReport>,
    /// `last_review` values that could not be parsed and were nulled
    pub unparsed_dates: usize,
}

impl CleaningReport {
    pub fn rows_in(&self) -> usize {
        self.stages.first().map(|s| s.rows_in).unwrap_or(0)
    }

    pub fn rows_out(&self) -> usize {
        self.stages.last().map(|s| s.rows_out).unwrap_or(0)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Clean a listings table.
///
/// See [`clean_with_report`] for the stages applied.
pub fn clean(table: Table, range: &PriceRange) -> Result<Table, InputError> {
    clean_with_report(table, range).map(|(table, _)| table)
}

/// Clean a listings table and report how many rows each stage removed.
///
/// Stages run strictly in order: deduplicate, drop rows with missing values,
/// price filter, `last_review` normalization, geofence. Fails before touching
/// any row if a required column is missing.
#[instrument(skip(table), fields(rows = table.len()))]
pub fn clean_with_report(
    mut table: Table,
    range: &PriceRange,
) -> Result<(Table, CleaningReport), InputError> {
    for column in REQUIRED_COLUMNS {
        table.require_column(column)?;
    }
    if range.min_price > range.max_price {
        warn!(
            "min_price {} is above max_price {}; every row will be dropped",
            range.min_price, range.max_price
        );
    }

    let mut report = CleaningReport::default();

    for stage in Stage::ALL {
        info!("{}", stage.message());
        let rows_in = table.len();
        let started = Instant::now();

        match stage {
            Stage::Deduplicate => drop_duplicates(&mut table),
            Stage::DropMissing => drop_missing(&mut table),
            Stage::PriceFilter => filter_price(&mut table, range)?,
            Stage::NormalizeDates => report.unparsed_dates = normalize_dates(&mut table)?,
            Stage::Geofence => filter_geofence(&mut table)?,
        }

        let rows_out = table.len();
        debug!(stage = %stage, rows_in, rows_out, "Stage finished");
        counter!("basic_cleaning_rows_dropped_total", "stage" => stage.as_str())
            .increment((rows_in - rows_out) as u64);
        histogram!("basic_cleaning_stage_duration_seconds", "stage" => stage.as_str())
            .record(started.elapsed().as_secs_f64());

        report.stages.push(StageReport {
            stage,
            rows_in,
            rows_out,
        });
    }

    if report.unparsed_dates > 0 {
        warn!(
            "{} last_review values could not be parsed and were set to null",
            report.unparsed_dates
        );
    }

    Ok((table, report))
}

/// How the cells of one column compare when looking for duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

/// Comparable form of a cell. Numeric columns compare by value, so `50` and
/// `50.0` are the same price.
#[derive(Debug, PartialEq, Eq, Hash)]
enum CellKey<'a> {
    Null,
    Integer(i64),
    Float(u64),
    Text(&'a str),
    Date(NaiveDateTime),
}

/// A column is numeric when every non-null cell parses as a number
fn column_kind(rows: &[Record], idx: usize) -> ColumnKind {
    let mut kind = ColumnKind::Integer;
    for value in rows.iter().map(|row| &row[idx]) {
        match value {
            Value::Null => {}
            Value::Text(s) if kind == ColumnKind::Integer && s.trim().parse::<i64>().is_ok() => {}
            Value::Text(s) if s.trim().parse::<f64>().is_ok() => kind = ColumnKind::Float,
            _ => return ColumnKind::Text,
        }
    }
    kind
}

fn cell_key(value: &Value, kind: ColumnKind) -> CellKey<'_> {
    match (value, kind) {
        (Value::Null, _) => CellKey::Null,
        (Value::Date(d), _) => CellKey::Date(*d),
        (Value::Text(s), ColumnKind::Integer) => s
            .trim()
            .parse()
            .map(CellKey::Integer)
            .unwrap_or(CellKey::Text(s)),
        (Value::Text(s), ColumnKind::Float) => s
            .trim()
            .parse::<f64>()
            .map(|f| CellKey::Float(float_bits(f)))
            .unwrap_or(CellKey::Text(s)),
        (Value::Text(s), ColumnKind::Text) => CellKey::Text(s),
    }
}

fn float_bits(value: f64) -> u64 {
    // -0.0 == 0.0
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Remove rows equal in every column to an earlier row, keeping the first.
/// Kept rows are not rewritten.
fn drop_duplicates(table: &mut Table) {
    let keep: Vec<bool> = {
        let rows = table.rows();
        let kinds: Vec<ColumnKind> = (0..table.columns().len())
            .map(|idx| column_kind(rows, idx))
            .collect();
        let mut seen: HashSet<Vec<CellKey<'_>>> = HashSet::with_capacity(rows.len());
        rows.iter()
            .map(|row| {
                let key = row
                    .iter()
                    .zip(&kinds)
                    .map(|(value, kind)| cell_key(value, *kind))
                    .collect();
                seen.insert(key)
            })
            .collect()
    };

    let mut keep = keep.into_iter();
    table.retain(|_| keep.next().unwrap_or(true));
}

fn drop_missing(table: &mut Table) {
    table.retain(|row| !row.iter().any(Value::is_null));
}

fn filter_price(table: &mut Table, range: &PriceRange) -> Result<(), InputError> {
    let price = table.require_column(PRICE)?;
    table.try_retain(|i, row| Ok(range.contains(numeric(row, price, PRICE, i)?)))
}

/// Parse `last_review` in place; returns how many values became null
fn normalize_dates(table: &mut Table) -> Result<usize, InputError> {
    let idx = table.require_column(LAST_REVIEW)?;
    let mut unparsed = 0;

    for row in table.rows_mut().iter_mut() {
        let parsed = match &row[idx] {
            Value::Text(raw) => parse_date(raw),
            Value::Date(d) => Some(*d),
            Value::Null => None,
        };
        row[idx] = match parsed {
            Some(d) => Value::Date(d),
            None => {
                unparsed += 1;
                Value::Null
            }
        };
    }

    Ok(unparsed)
}

fn filter_geofence(table: &mut Table) -> Result<(), InputError> {
    let lat = table.require_column(LATITUDE)?;
    let lon = table.require_column(LONGITUDE)?;

    table.try_retain(|i, row| {
        let latitude = numeric(row, lat, LATITUDE, i)?;
        let longitude = numeric(row, lon, LONGITUDE, i)?;
        Ok(within(latitude, MIN_LATITUDE, MAX_LATITUDE)
            && within(longitude, MIN_LONGITUDE, MAX_LONGITUDE))
    })
}

fn within(value: f64, low: f64, high: f64) -> bool {
    value >= low && value <= high
}

/// Read a numeric cell. Nulls never get here since they are dropped earlier.
fn numeric(row: &Record, idx: usize, column: &str, row_no: usize) -> Result<f64, InputError> {
    let not_numeric = |value: String| InputError::NotNumeric {
        column: column.to_string(),
        row: row_no,
        value,
    };
    match &row[idx] {
        Value::Text(s) => s.trim().parse::<f64>().map_err(|_| not_numeric(s.clone())),
        Value::Null => Err(not_numeric(String::new())),
        Value::Date(d) => Err(not_numeric(d.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(price: &str, last_review: &str, lat: &str, lon: &str) -> Record {
        [price, last_review, lat, lon]
            .iter()
            .map(|s| Value::from_field(s))
            .collect()
    }

    fn listings(rows: Vec<Record>) -> Table {
        Table::from_rows(
            vec![
                "price".into(),
                "last_review".into(),
                "latitude".into(),
                "longitude".into(),
            ],
            rows,
        )
        .unwrap()
    }

    fn range() -> PriceRange {
        PriceRange::new(10.0, 1000.0)
    }

    #[test]
    fn test_retains_valid_row_and_normalizes_date() {
        let table = listings(vec![listing("50", "2019-01-01", "40.7", "-73.9")]);
        let cleaned = clean(table, &range()).unwrap();

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get(0, "price"), Some(&Value::Text("50".into())));
        assert_eq!(
            cleaned.get(0, "last_review"),
            Some(&Value::Date(parse_date("2019-01-01").unwrap()))
        );
    }

    #[test]
    fn test_price_bounds_are_inclusive() {
        let table = listings(vec![
            listing("10", "2019-01-01", "40.7", "-73.9"),
            listing("1000", "2019-01-01", "40.7", "-73.9"),
            listing("9.99", "2019-01-01", "40.7", "-73.9"),
            listing("5000", "2019-01-01", "40.7", "-73.9"),
        ]);
        let (cleaned, report) = clean_with_report(table, &range()).unwrap();

        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.stage(Stage::PriceFilter).unwrap().dropped(), 2);
    }

    #[test]
    fn test_geofence_bounds_are_inclusive() {
        let table = listings(vec![
            listing("50", "2019-01-01", "40.5", "-74.25"),
            listing("50", "2019-01-02", "41.2", "-73.50"),
            listing("50", "2019-01-03", "42.0", "-73.9"),
            listing("50", "2019-01-04", "40.7", "-73.49"),
        ]);
        let (cleaned, report) = clean_with_report(table, &range()).unwrap();

        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.stage(Stage::Geofence).unwrap().dropped(), 2);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let table = listings(vec![
            listing("50", "2019-01-01", "40.7", "-73.9"),
            listing("60", "2019-01-01", "40.7", "-73.9"),
            listing("50", "2019-01-01", "40.7", "-73.9"),
        ]);
        let (cleaned, report) = clean_with_report(table, &range()).unwrap();

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.get(0, "price"), Some(&Value::Text("50".into())));
        assert_eq!(cleaned.get(1, "price"), Some(&Value::Text("60".into())));
        assert_eq!(report.stage(Stage::Deduplicate).unwrap().dropped(), 1);
    }

    #[test]
    fn test_duplicates_compare_numbers_by_value() {
        let table = listings(vec![
            listing("50", "2019-01-01", "40.7", "-73.9"),
            listing("50.0", "2019-01-01", "40.70", "-73.90"),
            listing("50.5", "2019-01-01", "40.7", "-73.9"),
        ]);
        let (cleaned, report) = clean_with_report(table, &range()).unwrap();

        assert_eq!(cleaned.len(), 2);
        assert_eq!(report.stage(Stage::Deduplicate).unwrap().dropped(), 1);
        assert_eq!(cleaned.get(0, "price"), Some(&Value::Text("50".into())));
        assert_eq!(cleaned.get(0, "latitude"), Some(&Value::Text("40.7".into())));
        assert_eq!(cleaned.get(1, "price"), Some(&Value::Text("50.5".into())));
    }

    #[test]
    fn test_duplicates_in_text_columns_compare_verbatim() {
        let table = Table::from_rows(
            vec![
                "host".into(),
                "price".into(),
                "last_review".into(),
                "latitude".into(),
                "longitude".into(),
            ],
            vec![
                ["007", "50", "2019-01-01", "40.7", "-73.9"],
                ["7", "50", "2019-01-01", "40.7", "-73.9"],
                ["jo", "50", "2019-01-01", "40.7", "-73.9"],
            ]
            .iter()
            .map(|row| row.iter().map(|s| Value::from_field(s)).collect())
            .collect(),
        )
        .unwrap();

        let cleaned = clean(table, &range()).unwrap();
        assert_eq!(cleaned.len(), 3);
    }

    #[test]
    fn test_missing_price_dropped_before_price_filter() {
        let table = listings(vec![
            listing("", "2019-01-01", "40.7", "-73.9"),
            listing("50", "", "40.7", "-73.9"),
        ]);
        let (cleaned, report) = clean_with_report(table, &range()).unwrap();

        assert!(cleaned.is_empty());
        assert_eq!(report.stage(Stage::DropMissing).unwrap().dropped(), 2);
        assert_eq!(report.stage(Stage::PriceFilter).unwrap().rows_in, 0);
    }

    #[test]
    fn test_unparsable_date_keeps_row_with_null() {
        let table = listings(vec![listing("50", "sometime last spring", "40.7", "-73.9")]);
        let (cleaned, report) = clean_with_report(table, &range()).unwrap();

        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get(0, "last_review"), Some(&Value::Null));
        assert_eq!(report.unparsed_dates, 1);
    }

    #[test]
    fn test_missing_column_is_reported() {
        let table = Table::from_rows(
            vec!["price".into(), "latitude".into(), "longitude".into()],
            vec![],
        )
        .unwrap();

        match clean(table, &range()) {
            Err(InputError::MissingColumn(column)) => assert_eq!(column, "last_review"),
            other => panic!("expected missing column error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_price_is_an_input_error() {
        let table = listings(vec![listing("$50", "2019-01-01", "40.7", "-73.9")]);
        let err = clean(table, &range()).unwrap_err();
        assert!(matches!(err, InputError::NotNumeric { ref column, row: 0, .. } if column == "price"));
    }

    #[test]
    fn test_extra_columns_preserved() {
        let table = Table::from_rows(
            vec![
                "id".into(),
                "name".into(),
                "price".into(),
                "last_review".into(),
                "latitude".into(),
                "longitude".into(),
            ],
            vec![[
                "2539",
                "Clean & quiet apt home by the park",
                "149",
                "2018-10-19",
                "40.64749",
                "-73.97237",
            ]
            .iter()
            .map(|s| Value::from_field(s))
            .collect()],
        )
        .unwrap();

        let cleaned = clean(table, &range()).unwrap();
        assert_eq!(cleaned.columns().len(), 6);
        assert_eq!(
            cleaned.get(0, "name"),
            Some(&Value::Text("Clean & quiet apt home by the park".into()))
        );
    }

    #[test]
    fn test_stages_shrink_monotonically() {
        let table = listings(vec![
            listing("50", "2019-01-01", "40.7", "-73.9"),
            listing("50", "2019-01-01", "40.7", "-73.9"),
            listing("5000", "2019-01-01", "40.7", "-73.9"),
            listing("50", "2019-01-01", "", "-73.9"),
            listing("50", "2019-01-01", "45.0", "-73.9"),
        ]);
        let (_, report) = clean_with_report(table, &range()).unwrap();

        assert_eq!(report.stages.len(), Stage::ALL.len());
        assert_eq!(report.rows_in(), 5);
        assert_eq!(report.rows_out(), 1);
        for pair in report.stages.windows(2) {
            assert!(pair[0].rows_out >= pair[1].rows_out);
            assert_eq!(pair[0].rows_out, pair[1].rows_in);
        }
    }
}
