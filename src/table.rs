//! Fertilizer reference table: CSV import and the in-memory lookup
//!
//! The reference sheet is a CSV with a crop column and one column per
//! nutrient. Column headers vary between sheet revisions (Korean labels,
//! English labels, chemical symbols), so columns are located by pattern.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use csv::{StringRecord, Trim};
use regex::Regex;
use rusqlite::Connection;

use crate::db;
use crate::models::NutrientAmounts;

/// Immutable crop → standard prescription lookup
#[derive(Debug, Clone, Default)]
pub struct FertilizerTable {
    rows: BTreeMap<String, NutrientAmounts>,
}

impl FertilizerTable {
    pub fn from_rows(rows: impl IntoIterator<Item = (String, NutrientAmounts)>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Snapshot the prescriptions currently stored in the database
    pub fn load(conn: &Connection) -> Result<Self> {
        let table = Self::from_rows(db::list_prescriptions(conn)?);
        tracing::debug!(crops = table.len(), "loaded fertilizer table");
        Ok(table)
    }

    pub fn get(&self, crop: &str) -> Option<&NutrientAmounts> {
        self.rows.get(crop)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Column positions found in the header row
#[derive(Debug, PartialEq)]
struct Columns {
    crop: usize,
    nitrogen: usize,
    phosphate: usize,
    potash: usize,
}

fn locate_columns(header: &[&str]) -> Result<Columns> {
    let crop_re = Regex::new(r"(?i)^(작물|crop|작물명)$")?;
    let nitrogen_re = Regex::new(r"(?i)질소|nitrogen|\(N\)")?;
    let phosphate_re = Regex::new(r"(?i)인산|phosphate|P₂O₅|P2O5")?;
    let potash_re = Regex::new(r"(?i)칼륨|potash|potassium|K₂O|K2O")?;

    let find = |re: &Regex, what: &str| {
        header
            .iter()
            .position(|h| re.is_match(h))
            .ok_or_else(|| anyhow!("No {} column in header {:?}", what, header))
    };

    Ok(Columns {
        crop: find(&crop_re, "crop")?,
        nitrogen: find(&nitrogen_re, "nitrogen")?,
        phosphate: find(&phosphate_re, "phosphate")?,
        potash: find(&potash_re, "potash")?,
    })
}

fn parse_amount(record: &StringRecord, idx: usize, line_no: u64, what: &str) -> Result<f64> {
    let raw = record
        .get(idx)
        .ok_or_else(|| anyhow!("Line {}: missing {} value", line_no, what))?;
    let value: f64 = raw
        .parse()
        .with_context(|| format!("Line {}: invalid {} value '{}'", line_no, what, raw))?;
    if !value.is_finite() || value < 0.0 {
        bail!("Line {}: {} must be non-negative, got {}", line_no, what, value);
    }
    Ok(value)
}

/// Parse fertilizer CSV content into (crop, amounts) rows
pub fn parse_fertilizer_csv(content: &str) -> Result<Vec<(String, NutrientAmounts)>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header = reader.headers().context("Failed to read CSV header")?.clone();
    if header.is_empty() {
        bail!("Fertilizer CSV is empty");
    }
    let columns = locate_columns(&header.iter().collect::<Vec<_>>())?;

    let mut rows: Vec<(String, NutrientAmounts)> = Vec::new();
    for record in reader.records() {
        let record = record.context("Malformed CSV record")?;
        let line_no = record.position().map_or(0, |p| p.line());

        let crop = record
            .get(columns.crop)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("Line {}: missing crop name", line_no))?
            .to_string();

        if rows.iter().any(|(existing, _)| existing == &crop) {
            bail!("Line {}: duplicate crop '{}'", line_no, crop);
        }

        let amounts = NutrientAmounts {
            nitrogen: parse_amount(&record, columns.nitrogen, line_no, "nitrogen")?,
            phosphate: parse_amount(&record, columns.phosphate, line_no, "phosphate")?,
            potash: parse_amount(&record, columns.potash, line_no, "potash")?,
        };
        rows.push((crop, amounts));
    }

    Ok(rows)
}

/// Import a fertilizer CSV file into the database.
///
/// The file is parsed in full before the database is touched, and the
/// optional clear plus every upsert run in one transaction, so a bad sheet
/// leaves the existing table as it was.
pub fn import_csv(conn: &Connection, path: &Path, clear: bool) -> Result<ImportStats> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rows = parse_fertilizer_csv(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let stats = replace_rows(conn, &rows, clear)?;
    tracing::info!(
        path = %path.display(),
        crops = stats.crops,
        cleared = clear,
        "imported fertilizer table"
    );
    Ok(stats)
}

/// Write prescription rows in a single transaction, optionally clearing
/// the table first
pub fn replace_rows(
    conn: &Connection,
    rows: &[(String, NutrientAmounts)],
    clear: bool,
) -> Result<ImportStats> {
    let tx = conn.unchecked_transaction()?;
    if clear {
        db::clear_prescriptions(&tx)?;
    }

    let mut stats = ImportStats::default();
    for (crop, amounts) in rows {
        if db::get_prescription(&tx, crop)?.is_some() {
            stats.replaced += 1;
        }
        db::upsert_prescription(&tx, crop, amounts)?;
        stats.crops += 1;
        tracing::debug!(
            crop = %crop,
            n = amounts.nitrogen,
            p = amounts.phosphate,
            k = amounts.potash,
            "imported prescription"
        );
    }

    tx.commit()?;
    Ok(stats)
}

/// Built-in sample prescriptions (kg/10a) for trying the tool without a sheet
pub fn sample_rows() -> Vec<(String, NutrientAmounts)> {
    [
        ("Chinese cabbage", 32.0, 7.8, 19.8),
        ("Garlic", 25.0, 7.7, 14.8),
        ("Hot pepper", 19.0, 11.2, 14.9),
        ("Maize", 17.4, 3.0, 6.0),
        ("Onion", 24.0, 7.7, 15.8),
        ("Potato", 10.0, 6.3, 12.4),
        ("Rice", 9.0, 4.5, 5.7),
        ("Soybean", 3.0, 3.0, 3.4),
        ("Sweet potato", 5.5, 6.3, 15.6),
    ]
    .into_iter()
    .map(|(crop, nitrogen, phosphate, potash)| {
        (
            crop.to_string(),
            NutrientAmounts {
                nitrogen,
                phosphate,
                potash,
            },
        )
    })
    .collect()
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub crops: usize,
    pub replaced: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} crops ({} replaced existing rows)",
            self.crops, self.replaced
        )
    }
}
