//! In-memory tabular batches
//!
//! Uploads, normalized batches and the historical file all share this shape:
//! named columns over rows of loosely typed cells. Cells are parsed once at
//! read time (empty, `NaN` and `null` become [`Value::Missing`]), so the
//! cleaning rules can reason about missing vs. numeric vs. text directly.

use crate::error::{PricerError, Result};
use calamine::{Data, Reader, Xlsx};
use std::collections::HashSet;
use std::fmt;
use std::io::{Cursor, Read, Write};

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
}

impl Value {
    /// Parse a raw field the way it arrives from a delimited file
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "nan" | "null" | "none" | "na" | "n/a" => return Value::Missing,
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(n) => Value::number(n),
            Err(_) => Value::Text(trimmed.to_string()),
        }
    }

    /// Wrap a float, folding NaN into `Missing`
    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            Value::Missing
        } else {
            Value::Number(n)
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell; text that does not parse is treated as missing
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            Value::Missing => None,
        }
    }

    fn to_field(&self) -> String {
        match self {
            Value::Missing => String::new(),
            other => other.to_string(),
        }
    }

    fn key(&self) -> CellKey {
        match self {
            Value::Missing => CellKey::Missing,
            // -0.0 and 0.0 compare equal, so they must hash equal too
            Value::Number(n) if *n == 0.0 => CellKey::Number(0),
            Value::Number(n) => CellKey::Number(n.to_bits()),
            Value::Text(s) => CellKey::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "nan"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Hash, PartialEq, Eq)]
enum CellKey {
    Missing,
    Number(u64),
    Text(String),
}

/// Named columns over rows of cells. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(PricerError::Format(format!(
                "row has {} cells but the table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// New table holding the given rows, in the given order (repeats allowed)
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Replace every cell of a column through a fallible mapping
    pub fn try_map_column<F>(&mut self, idx: usize, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &Value) -> Result<Value>,
    {
        for (i, row) in self.rows.iter_mut().enumerate() {
            row[idx] = f(i, &row[idx])?;
        }
        Ok(())
    }

    /// Overwrite a column, appending it when absent
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(PricerError::Normalization(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Remove a column by position
    pub fn drop_column_at(&mut self, idx: usize) {
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
    }

    /// Remove a column by name, reporting whether it existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.drop_column_at(idx);
                true
            }
            None => false,
        }
    }

    pub fn rename_column_at(&mut self, idx: usize, name: &str) {
        self.columns[idx] = name.to_string();
    }

    /// Reorder columns by a sort key; ties keep their current order
    pub fn sort_columns_by_key<K, F>(&mut self, key: F)
    where
        K: Ord,
        F: Fn(&str) -> K,
    {
        let mut order: Vec<usize> = (0..self.columns.len()).collect();
        order.sort_by_key(|&i| key(&self.columns[i]));
        self.columns = order.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = order.iter().map(|&i| row[i].clone()).collect();
        }
    }

    /// Keep only the named columns that exist, in the given order
    pub fn select(&self, names: &[&str]) -> Table {
        let picked: Vec<(usize, &str)> = names
            .iter()
            .filter_map(|n| self.column_index(n).map(|i| (i, *n)))
            .collect();
        Table {
            columns: picked.iter().map(|(_, n)| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| picked.iter().map(|(i, _)| row[*i].clone()).collect())
                .collect(),
        }
    }

    /// Drop rows equal in every column to an earlier row; returns how many were removed
    pub fn dedup_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(before);
        self.rows
            .retain(|row| seen.insert(row.iter().map(Value::key).collect()));
        before - self.rows.len()
    }

    /// Row-wise concatenation. Columns are unioned (self's first) and cells
    /// of a column unknown to one side come out missing.
    pub fn concat(&self, other: &Table) -> Table {
        let mut columns = self.columns.clone();
        for c in &other.columns {
            if !columns.contains(c) {
                columns.push(c.clone());
            }
        }

        let project = |table: &Table| -> Vec<Vec<Value>> {
            let mapping: Vec<Option<usize>> =
                columns.iter().map(|c| table.column_index(c)).collect();
            table
                .rows
                .iter()
                .map(|row| {
                    mapping
                        .iter()
                        .map(|m| m.map(|i| row[i].clone()).unwrap_or(Value::Missing))
                        .collect()
                })
                .collect()
        };

        let mut rows = project(self);
        rows.extend(project(other));
        Table { columns, rows }
    }

    /// Read a delimited file with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut table = Table::new(columns);
        for record in rdr.records() {
            let record = record?;
            table.push_row(record.iter().map(Value::parse).collect())?;
        }
        Ok(table)
    }

    /// Read the first worksheet of an `.xlsx` workbook; the first row is the header
    pub fn from_xlsx_bytes(bytes: &[u8]) -> Result<Table> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| PricerError::Format(format!("invalid workbook: {}", e)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PricerError::Format("workbook has no worksheets".to_string()))?
            .map_err(|e| PricerError::Format(format!("unreadable worksheet: {}", e)))?;

        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
            None => return Ok(Table::default()),
        };

        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row.iter().map(spreadsheet_value).collect())?;
        }
        Ok(table)
    }

    /// Decode an upload, choosing the reader from the file extension
    pub fn from_upload(filename: &str, bytes: &[u8]) -> Result<Table> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".csv") {
            Table::from_csv_reader(bytes)
        } else if lower.ends_with(".xlsx") {
            Table::from_xlsx_bytes(bytes)
        } else {
            Err(PricerError::Format(format!(
                "unsupported file '{}', send .csv or .xlsx",
                filename
            )))
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(Value::to_field))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn spreadsheet_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Missing,
        Data::Float(f) => Value::number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
        Data::String(s) => Value::parse(s),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| Value::Text(d.to_string()))
            .unwrap_or(Value::Missing),
        other => Value::parse(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_cells() {
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("NaN"), Value::Missing);
        assert_eq!(Value::parse(" 12.5 "), Value::Number(12.5));
        assert_eq!(Value::parse("abc"), Value::Text("abc".to_string()));
        assert_eq!(Value::Text("7".into()).coerce_f64(), Some(7.0));
        assert_eq!(Value::Text("seven".into()).coerce_f64(), None);
    }

    #[test]
    fn test_dedup_treats_missing_as_equal() {
        let mut t = table("a,b\n1,\n1,\n2,x\n");
        assert_eq!(t.dedup_rows(), 1);
        assert_eq!(t.height(), 2);
    }

    #[test]
    fn test_take_rows_keeps_columns() {
        let t = table("a,b\n1,x\n2,y\n3,z\n");
        let picked = t.take_rows(&[2, 0]);
        assert_eq!(picked.columns(), t.columns());
        assert_eq!(picked.rows()[0][1], Value::Text("z".into()));
        assert_eq!(picked.height(), 2);
    }

    #[test]
    fn test_concat_unions_columns() {
        let left = table("a,b\n1,2\n");
        let right = table("b,c\n3,4\n");
        let merged = left.concat(&right);
        assert_eq!(merged.columns(), &["a", "b", "c"]);
        assert_eq!(merged.rows()[1], vec![Value::Missing, Value::Number(3.0), Value::Number(4.0)]);
    }

    #[test]
    fn test_csv_write_then_read_keeps_missing_cells() {
        let t = table("area,neighborhood\n50,Centro\n,Moema\n");
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        assert_eq!(table(std::str::from_utf8(&buf).unwrap()), t);
    }

    #[test]
    fn test_ragged_rows_are_format_errors() {
        let err = Table::from_csv_reader("a,b\n1\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "format_error");
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = Table::from_upload("listings.json", b"{}").unwrap_err();
        assert_eq!(err.kind(), "format_error");
    }

    #[test]
    fn test_select_skips_absent_columns() {
        let t = table("a,b,c\n1,2,3\n");
        let s = t.select(&["c", "z", "a"]);
        assert_eq!(s.columns(), &["c", "a"]);
        assert_eq!(s.rows()[0], vec![Value::Number(3.0), Value::Number(1.0)]);
    }
}
