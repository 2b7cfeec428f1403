//! Record normalization
//!
//! Cleans one uploaded batch into the canonical schema. The cleaning is an
//! ordered list of [`NormalizationRule`]s; each rule declares the canonical
//! columns it needs and the pipeline skips it (logging the skip) when any of
//! them is absent from the batch. A missing column is never an error.

use crate::constants::{self, ADDRESS, CREATED_DATE, LATITUDE, LONGITUDE, NEIGHBORHOOD, PRICE};
use crate::error::{PricerError, Result};
use crate::pipeline::address::decompose_cell;
use crate::table::{Table, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

static YEAR_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("valid year pattern"));

/// Find the first column whose name maps onto `canonical`, whatever its casing or alias
pub fn resolve_column(table: &Table, canonical: &str) -> Option<usize> {
    table
        .columns()
        .iter()
        .position(|c| constants::canonical_name(c) == Some(canonical))
}

/// One conditional cleaning step
pub trait NormalizationRule: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Canonical columns that must be present for the rule to run
    fn required_columns(&self) -> &'static [&'static str] {
        &[]
    }

    /// Apply the rule. `columns` holds the resolved position of every required column,
    /// in the order of [`NormalizationRule::required_columns`].
    fn apply(&self, table: &mut Table, columns: &[usize]) -> Result<()>;
}

/// Drop rows without coordinates when the batch carries both coordinate columns
pub struct DropMissingCoordinates;

impl NormalizationRule for DropMissingCoordinates {
    fn name(&self) -> &'static str {
        "drop_missing_coordinates"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &[LATITUDE, LONGITUDE]
    }

    fn apply(&self, table: &mut Table, columns: &[usize]) -> Result<()> {
        let (lat, lng) = (columns[0], columns[1]);
        table.retain_rows(|row| !row[lat].is_missing() && !row[lng].is_missing());
        Ok(())
    }
}

/// Coerce prices to numbers and fill zero or missing prices with the fair mean
pub struct ImputePrice;

impl NormalizationRule for ImputePrice {
    fn name(&self) -> &'static str {
        "impute_price"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &[PRICE]
    }

    fn apply(&self, table: &mut Table, columns: &[usize]) -> Result<()> {
        let idx = columns[0];
        table.try_map_column(idx, |_, cell| {
            Ok(cell.coerce_f64().map(Value::number).unwrap_or(Value::Missing))
        })?;

        let prices: Vec<f64> = table.rows().iter().filter_map(|row| row[idx].as_f64()).collect();
        let Some(fill) = fair_mean(&prices) else {
            debug!("No positive prices in batch, leaving invalid prices untouched");
            return Ok(());
        };

        let mut replaced = 0usize;
        table.try_map_column(idx, |_, cell| {
            Ok(match cell {
                Value::Missing => {
                    replaced += 1;
                    Value::Number(fill)
                }
                Value::Number(n) if *n == 0.0 => {
                    replaced += 1;
                    Value::Number(fill)
                }
                other => other.clone(),
            })
        })?;
        debug!(fair_mean = fill, replaced, "Imputed invalid prices");
        Ok(())
    }
}

/// Drop rows identical in every column
pub struct DropDuplicates;

impl NormalizationRule for DropDuplicates {
    fn name(&self) -> &'static str {
        "drop_duplicates"
    }

    fn apply(&self, table: &mut Table, _columns: &[usize]) -> Result<()> {
        let removed = table.dedup_rows();
        if removed > 0 {
            debug!(removed, "Dropped duplicate rows");
        }
        Ok(())
    }
}

/// Derive the neighborhood from the free-text address, then drop the address.
/// The street part is discarded; it is not part of the canonical schema.
pub struct DecomposeAddress;

impl NormalizationRule for DecomposeAddress {
    fn name(&self) -> &'static str {
        "decompose_address"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &[ADDRESS]
    }

    fn apply(&self, table: &mut Table, columns: &[usize]) -> Result<()> {
        let address_idx = columns[0];
        let neighborhoods: Vec<Value> = table
            .rows()
            .iter()
            .map(|row| Value::Text(decompose_cell(&row[address_idx]).neighborhood))
            .collect();

        let target = match resolve_column(table, NEIGHBORHOOD) {
            Some(idx) => table.columns()[idx].clone(),
            None => NEIGHBORHOOD.to_string(),
        };
        table.set_column(&target, neighborhoods)?;
        table.drop_column_at(address_idx);
        Ok(())
    }
}

/// Reduce the creation timestamp to its 4-digit year
pub struct CreatedDateToYear;

impl NormalizationRule for CreatedDateToYear {
    fn name(&self) -> &'static str {
        "created_date_to_year"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &[CREATED_DATE]
    }

    fn apply(&self, table: &mut Table, columns: &[usize]) -> Result<()> {
        table.try_map_column(columns[0], |row, cell| match cell {
            Value::Missing => Ok(Value::Missing),
            other => {
                let text = other.to_string();
                let prefix: String = text.chars().take(4).collect();
                if !YEAR_PREFIX.is_match(&prefix) {
                    return Err(PricerError::Normalization(format!(
                        "row {}: created date '{}' does not start with a 4-digit year",
                        row, text
                    )));
                }
                let year: f64 = prefix.parse().map_err(|_| {
                    PricerError::Normalization(format!("row {}: bad year '{}'", row, prefix))
                })?;
                Ok(Value::Number(year))
            }
        })
    }
}

/// Rename recognized source columns to the canonical lower-case names.
/// When two source columns map onto the same name, the first one wins.
pub struct RenameToCanonical;

impl NormalizationRule for RenameToCanonical {
    fn name(&self) -> &'static str {
        "rename_to_canonical"
    }

    fn apply(&self, table: &mut Table, _columns: &[usize]) -> Result<()> {
        let mut taken: HashSet<&'static str> = HashSet::new();
        let mut idx = 0;
        while idx < table.width() {
            match constants::canonical_name(&table.columns()[idx]) {
                Some(canonical) if !taken.insert(canonical) => {
                    warn!(
                        column = %table.columns()[idx],
                        canonical,
                        "Dropping column that duplicates an earlier canonical column"
                    );
                    table.drop_column_at(idx);
                    continue;
                }
                Some(canonical) => table.rename_column_at(idx, canonical),
                None => {}
            }
            idx += 1;
        }
        Ok(())
    }
}

/// Drop identifiers, timestamps and any other column outside the canonical schema
pub struct DropNonSchemaColumns;

impl NormalizationRule for DropNonSchemaColumns {
    fn name(&self) -> &'static str {
        "drop_non_schema_columns"
    }

    fn apply(&self, table: &mut Table, _columns: &[usize]) -> Result<()> {
        let extra: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !constants::is_schema_column(c))
            .cloned()
            .collect();
        for column in &extra {
            table.drop_column(column);
        }
        if !extra.is_empty() {
            debug!(dropped = ?extra, "Dropped non-schema columns");
        }
        table.sort_columns_by_key(constants::schema_position);
        Ok(())
    }
}

/// Outcome of one rule within a run
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule: &'static str,
    pub applied: bool,
    pub rows_before: usize,
    pub rows_after: usize,
}

/// Summary of a normalization run
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub rules: Vec<RuleReport>,
}

impl NormalizationReport {
    pub fn skipped(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().filter(|r| !r.applied).map(|r| r.rule)
    }
}

/// A batch in canonical schema together with how it got there
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub table: Table,
    pub report: NormalizationReport,
}

/// Ordered rule runner
pub struct NormalizationPipeline {
    rules: Vec<Box<dyn NormalizationRule>>,
}

impl Default for NormalizationPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl NormalizationPipeline {
    /// The listing cleaning rules, in the order they must run
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Box::new(DropMissingCoordinates),
                Box::new(ImputePrice),
                Box::new(DropDuplicates),
                Box::new(DecomposeAddress),
                Box::new(CreatedDateToYear),
                Box::new(RenameToCanonical),
                Box::new(DropNonSchemaColumns),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn NormalizationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Normalize a copy of `raw`; the input is left untouched
    #[instrument(skip(self, raw), fields(rows = raw.height(), columns = raw.width()))]
    pub fn run(&self, raw: &Table) -> Result<NormalizedBatch> {
        let mut table = raw.clone();
        let mut reports = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let rows_before = table.height();
            let resolved: Option<Vec<usize>> = rule
                .required_columns()
                .iter()
                .map(|c| resolve_column(&table, c))
                .collect();

            let applied = match resolved {
                Some(columns) => {
                    rule.apply(&mut table, &columns)?;
                    true
                }
                None => {
                    debug!(
                        rule = rule.name(),
                        required = ?rule.required_columns(),
                        "Skipping rule, columns absent"
                    );
                    false
                }
            };

            reports.push(RuleReport {
                rule: rule.name(),
                applied,
                rows_before,
                rows_after: table.height(),
            });
        }

        let report = NormalizationReport {
            rows_in: raw.height(),
            rows_out: table.height(),
            rules: reports,
        };
        info!(rows_in = report.rows_in, rows_out = report.rows_out, "Normalized batch");
        Ok(NormalizedBatch { table, report })
    }
}

/// Linear-interpolated quantile of sorted data, `q` in `[0, 1]`
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Mean of the strictly positive, finite prices at or below the upper IQR fence
/// `Q3 + 1.5 * (Q3 - Q1)`. `None` when there is no such price.
pub fn fair_mean(prices: &[f64]) -> Option<f64> {
    let mut positive: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    if positive.is_empty() {
        return None;
    }
    positive.sort_by(|a, b| a.total_cmp(b));

    let q1 = quantile(&positive, 0.25);
    let q3 = quantile(&positive, 0.75);
    let fence = q3 + 1.5 * (q3 - q1);

    let kept: Vec<f64> = positive.into_iter().filter(|p| *p <= fence).collect();
    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    fn column(t: &Table, name: &str) -> Vec<Value> {
        t.column_values(name).unwrap().into_iter().cloned().collect()
    }

    #[test]
    fn test_fair_mean_excludes_outliers() {
        let mean = fair_mean(&[100.0, 110.0, 120.0, 0.0, f64::NAN, 100000.0]).unwrap();
        assert!((mean - 110.0).abs() < 1e-9);
        assert_eq!(fair_mean(&[0.0, -5.0]), None);
    }

    #[test]
    fn test_price_imputation_replaces_zero_and_missing() {
        let raw = table("ID,price\n1,100\n2,110\n3,120\n4,0\n5,NaN\n6,100000\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(
            column(&out, PRICE),
            vec![
                Value::Number(100.0),
                Value::Number(110.0),
                Value::Number(120.0),
                Value::Number(110.0),
                Value::Number(110.0),
                Value::Number(100000.0),
            ]
        );
    }

    #[test]
    fn test_infinite_price_does_not_poison_fair_mean() {
        assert_eq!(fair_mean(&[100.0, 200.0, f64::INFINITY, 0.0]), Some(150.0));
        assert_eq!(fair_mean(&[f64::INFINITY]), None);

        let raw = table("price\n100\n200\ninf\n0\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(column(&out, PRICE)[3], Value::Number(150.0));
    }

    #[test]
    fn test_non_numeric_price_is_coerced_then_imputed() {
        let raw = table("Price\n200\nabc\n400\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(column(&out, PRICE)[1], Value::Number(300.0));
    }

    #[test]
    fn test_without_positive_prices_imputation_is_noop() {
        let raw = table("price,area\n0,10\n,20\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(column(&out, PRICE), vec![Value::Number(0.0), Value::Missing]);
    }

    #[test]
    fn test_identical_rows_collapse() {
        let raw = table("area,price\n50,100\n50,100\n60,200\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap();
        assert_eq!(out.table.height(), 2);
    }

    #[test]
    fn test_rows_without_coordinates_are_dropped() {
        let raw = table("Latitude,Longitude,price\n-23.5,-46.6,100\n,-46.6,200\n-23.5,,300\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_single_coordinate_column_skips_rule() {
        let raw = table("latitude,price\n,100\n-23.5,200\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap();
        assert_eq!(out.table.height(), 2);
        assert!(out.report.skipped().any(|r| r == "drop_missing_coordinates"));
    }

    #[test]
    fn test_address_becomes_neighborhood() {
        let raw = table(
            "Adress,price\n\"Rua A, Moema - São Paulo\",100\nSoloToken,200\n,300\n",
        );
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(out.columns(), &[NEIGHBORHOOD, PRICE]);
        assert_eq!(
            column(&out, NEIGHBORHOOD),
            vec![
                Value::Text("Moema".into()),
                Value::Text("SoloToken".into()),
                Value::Text(constants::NOT_INFORMED.into()),
            ]
        );
    }

    #[test]
    fn test_created_date_keeps_year() {
        let raw = table("created_date,price\n2023-05-01 10:00:00,100\n2021-01-02,200\n,300\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(
            column(&out, CREATED_DATE),
            vec![Value::Number(2023.0), Value::Number(2021.0), Value::Missing]
        );
    }

    #[test]
    fn test_unparseable_created_date_fails() {
        let raw = table("created_date,price\nyesterday,100\n");
        let err = NormalizationPipeline::standard().run(&raw).unwrap_err();
        assert_eq!(err.kind(), "normalization_failure");
    }

    #[test]
    fn test_columns_renamed_and_extras_dropped() {
        let raw = table(
            "ID,Price,Area,Bedrooms,Bathrooms,Parking_Spaces,extract_date,below_price,Street\n\
             1,500000,70,2,1,1,2024-01-01,False,Rua X\n",
        );
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(
            out.columns(),
            &[
                constants::AREA,
                constants::BEDROOMS,
                constants::BATHROOMS,
                constants::PARKING_SPACES,
                PRICE,
            ]
        );
    }

    #[test]
    fn test_duplicate_canonical_columns_keep_first() {
        let raw = table("price,Price\n100,999\n");
        let out = NormalizationPipeline::standard().run(&raw).unwrap().table;
        assert_eq!(out.columns(), &[PRICE]);
        assert_eq!(column(&out, PRICE), vec![Value::Number(100.0)]);
    }

    #[test]
    fn test_input_batch_is_not_mutated() {
        let raw = table("price,ID\n0,1\n100,2\n");
        let copy = raw.clone();
        let _ = NormalizationPipeline::standard().run(&raw).unwrap();
        assert_eq!(raw, copy);
    }
}
