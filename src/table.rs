use crate::constants::is_na_token;
use crate::dates;
use crate::error::{InputError, Result};
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// A single cell of a listings table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    /// Raw field text, kept exactly as read
    Text(String),
    /// A normalized review date
    Date(NaiveDateTime),
}

impl Value {
    /// Build a cell from a raw CSV field, mapping missing-value tokens to `Null`
    pub fn from_field(field: &str) -> Self {
        if is_na_token(field) {
            Value::Null
        } else {
            Value::Text(field.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One row of the table, aligned with [`Table::columns`]
pub type Record = Vec<Value>;

/// An in-memory table with a fixed column set.
///
/// Rows have no identity beyond their position; the index is implicitly dense
/// and 0-based.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from columns and rows, rejecting rows of the wrong width
    pub fn from_rows(columns: Vec<String>, rows: Vec<Record>) -> std::result::Result<Self, InputError> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    pub fn push(&mut self, row: Record) -> std::result::Result<(), InputError> {
        if row.len() != self.columns.len() {
            return Err(InputError::Malformed(format!(
                "row {} has {} fields, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`Table::column_index`] but a missing column is an input error
    pub fn require_column(&self, name: &str) -> std::result::Result<usize, InputError> {
        self.column_index(name)
            .ok_or_else(|| InputError::MissingColumn(name.to_string()))
    }

    /// Value of `column` in row `row`, if both exist
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Keep only the rows for which `keep` returns true, preserving order
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Record) -> bool,
    {
        self.rows.retain(keep);
    }

    /// Keep rows based on a fallible predicate; the first error aborts
    pub fn try_retain<F>(&mut self, mut keep: F) -> std::result::Result<(), InputError>
    where
        F: FnMut(usize, &Record) -> std::result::Result<bool, InputError>,
    {
        let rows = std::mem::take(&mut self.rows);
        let mut kept = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if keep(i, &row)? {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Record> {
        &mut self.rows
    }
}

/// Read a comma-delimited file with a header row into a [`Table`]
pub fn read_csv(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let table = read_csv_from(file)?;
    debug!(
        "Read {} rows x {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    Ok(table)
}

pub fn read_csv_from<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut table = Table::new(columns);

    for result in reader.records() {
        let record = result?;
        let row: Record = record.iter().map(Value::from_field).collect();
        table.push(row)?;
    }

    Ok(table)
}

/// Write `table` as CSV with a header row and no index column
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_csv_to(table, file)?;
    debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

pub fn write_csv_to<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_writer(writer);

    // Date columns are formatted uniformly, so pick each column's layout up front
    let formats: Vec<&'static str> = (0..table.columns().len())
        .map(|idx| {
            dates::column_format(table.rows().iter().filter_map(|row| match &row[idx] {
                Value::Date(d) => Some(d),
                _ => None,
            }))
        })
        .collect();

    writer.write_record(table.columns())?;
    for row in table.rows() {
        let fields = row.iter().zip(&formats).map(|(value, fmt)| match value {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format(fmt).to_string(),
        });
        writer.write_record(fields)?;
    }
    writer.flush()?;
    Ok(())
}
