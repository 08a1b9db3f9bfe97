//! Empirical knot corrections
//!
//! Lines meeting at a knot lose some length in the knot itself. The loss
//! depends on the line below the knot, the line type above and the number
//! of lines tied in. The table is a CSV file:
//!
//! ```text
//! lower,upper,lines,first,second,...
//! liros.ntsl250,liros.ntsl160,2,0.014,0.014
//! ```
//!
//! Each row holds one correction (m) per line position in the knot.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{LineSetError, LineSetResult};

const BUILTIN_TABLE: &str = include_str!("../data/knots.csv");

static BUILTIN: Lazy<Arc<KnotCorrections>> = Lazy::new(|| {
    match KnotCorrections::from_reader(BUILTIN_TABLE.as_bytes()) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            log::error!("failed to read built-in knot corrections: {}", e);
            Arc::new(KnotCorrections::default())
        }
    }
});

type KnotKey = (String, String, usize);

/// Knot-correction lookup table
#[derive(Debug, Clone, Default)]
pub struct KnotCorrections {
    table: BTreeMap<KnotKey, Vec<f64>>,
}

impl KnotCorrections {
    /// The table shipped with the crate, parsed once
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTIN)
    }

    /// Read a table from CSV (header row required, rows may differ in length)
    pub fn from_reader<R: Read>(reader: R) -> LineSetResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = BTreeMap::new();
        for result in rdr.records() {
            let record = result?;
            if record.len() < 3 {
                return Err(LineSetError::InvalidInput(format!(
                    "knot correction row too short: {:?}",
                    record
                )));
            }
            let lines: usize = record[2].parse().map_err(|_| {
                LineSetError::InvalidInput(format!("invalid line count '{}'", &record[2]))
            })?;
            let corrections = record
                .iter()
                .skip(3)
                .filter(|field| !field.is_empty())
                .map(|field| {
                    field.parse::<f64>().map_err(|_| {
                        LineSetError::InvalidInput(format!("invalid knot correction '{}'", field))
                    })
                })
                .collect::<LineSetResult<Vec<f64>>>()?;

            table.insert((record[0].to_string(), record[1].to_string(), lines), corrections);
        }

        Ok(Self { table })
    }

    /// Insert or replace one row
    pub fn insert(&mut self, lower: &str, upper: &str, corrections: Vec<f64>) {
        let lines = corrections.len();
        self.table
            .insert((lower.to_string(), upper.to_string(), lines), corrections);
    }

    /// Corrections for each of the `fan_out` lines above a knot.
    ///
    /// Never fails: unknown combinations give zeros (and a warning), short
    /// rows are padded with zeros.
    pub fn get(&self, lower_type: &str, upper_type: &str, fan_out: usize) -> Vec<f64> {
        let key = (lower_type.to_string(), upper_type.to_string(), fan_out);
        match self.table.get(&key) {
            Some(row) => {
                let mut corrections = row.clone();
                corrections.resize(fan_out, 0.0);
                corrections
            }
            None => {
                log::warn!(
                    "no knot correction for {} / {} with {} lines",
                    lower_type,
                    upper_type,
                    fan_out
                );
                vec![0.0; fan_out]
            }
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
