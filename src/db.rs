//! Database schema and operations

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::models::NutrientAmounts;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Standard fertilizer prescriptions, kg per 10a
        CREATE TABLE IF NOT EXISTS fertilizer_prescriptions (
            crop TEXT PRIMARY KEY,
            nitrogen REAL NOT NULL CHECK (nitrogen >= 0),
            phosphate REAL NOT NULL CHECK (phosphate >= 0),
            potash REAL NOT NULL CHECK (potash >= 0)
        );
        "#,
    )?;
    Ok(())
}

/// Insert or replace a crop's prescription
pub fn upsert_prescription(conn: &Connection, crop: &str, amounts: &NutrientAmounts) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO fertilizer_prescriptions (crop, nitrogen, phosphate, potash)
         VALUES (?1, ?2, ?3, ?4)",
        (crop, amounts.nitrogen, amounts.phosphate, amounts.potash),
    )?;
    Ok(())
}

/// Remove every prescription (for re-import)
pub fn clear_prescriptions(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM fertilizer_prescriptions", [])?;
    Ok(())
}

/// Look up a single crop
pub fn get_prescription(conn: &Connection, crop: &str) -> Result<Option<NutrientAmounts>> {
    let amounts = conn
        .query_row(
            "SELECT nitrogen, phosphate, potash FROM fertilizer_prescriptions WHERE crop = ?1",
            [crop],
            |row| {
                Ok(NutrientAmounts {
                    nitrogen: row.get(0)?,
                    phosphate: row.get(1)?,
                    potash: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(amounts)
}

/// List all prescriptions ordered by crop name
pub fn list_prescriptions(conn: &Connection) -> Result<Vec<(String, NutrientAmounts)>> {
    let mut stmt = conn.prepare(
        "SELECT crop, nitrogen, phosphate, potash FROM fertilizer_prescriptions ORDER BY crop",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get(0)?,
            NutrientAmounts {
                nitrogen: row.get(1)?,
                phosphate: row.get(2)?,
                potash: row.get(3)?,
            },
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
