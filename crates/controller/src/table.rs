//! Reading history returned by a monitoring run.

use std::fmt;

use anyhow::{Context, Result};

use crate::sim::SensorReading;

pub const COLUMNS: [&str; 3] = ["ph", "nutrient_conc", "temp"];

/// Decimal places used when rendering values.
const PRECISION: usize = 6;

/// Ordered readings, one row per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingTable {
    rows: Vec<SensorReading>,
}

impl ReadingTable {
    pub fn columns(&self) -> &'static [&'static str] {
        &COLUMNS
    }

    pub fn rows(&self) -> &[SensorReading] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the rows as a JSON array of `{ph, nutrient_conc, temp}`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self.rows()).context("failed to serialise reading table")
    }
}

impl From<Vec<SensorReading>> for ReadingTable {
    fn from(rows: Vec<SensorReading>) -> Self {
        Self { rows }
    }
}

/// Index column followed by right-aligned value columns.
impl fmt::Display for ReadingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<[String; 3]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    format!("{:.PRECISION$}", r.ph),
                    format!("{:.PRECISION$}", r.nutrient_conc),
                    format!("{:.PRECISION$}", r.temp),
                ]
            })
            .collect();

        let index_width = self.rows.len().saturating_sub(1).to_string().len();
        let mut widths = COLUMNS.map(str::len);
        let names = self.columns();
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        write!(f, "{:index_width$}", "")?;
        for (name, w) in names.iter().zip(widths) {
            write!(f, "  {name:>w$}")?;
        }
        writeln!(f)?;

        for (i, row) in cells.iter().enumerate() {
            write!(f, "{i:<index_width$}")?;
            for (cell, w) in row.iter().zip(widths) {
                write!(f, "  {cell:>w$}")?;
            }
            writeln!(f)?;
        }

        if self.is_empty() {
            writeln!(f, "(no readings)")?;
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
