//! Line set solver CLI
//!
//! Reads a JSON line-set description, solves it and prints a JSON report.
//!
//! ```text
//! lineset <scenario.json> [--rename]
//! RUST_LOG=debug lineset demos/y_junction.json
//! ```

use anyhow::{bail, Context, Result};
use serde::Serialize;

use paraglider_lines::prelude::*;

#[derive(Debug, Serialize)]
struct DragOutput {
    center: Vec3,
    total: f64,
}

#[derive(Debug, Serialize)]
struct Output {
    diagnostics: RecalcReport,
    lengths: Vec<LengthRow>,
    checklengths: Vec<ChecklengthRow>,
    forces: Vec<ForceRow>,
    consumption: Consumption,
    /// Total line weight (g)
    weight: f64,
    drag: Option<DragOutput>,
}

fn main() -> Result<()> {
    env_logger::init();

    let mut path = None;
    let mut rename = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--rename" => rename = true,
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => path = Some(arg),
        }
    }
    let path = path.context("usage: lineset <scenario.json> [--rename]")?;

    let description = LineSetDescription::from_file(&path)
        .with_context(|| format!("failed to read line set from {}", path))?;
    let registry = LineTypeRegistry::with_catalog();
    let mut lineset = description
        .build(&registry)
        .with_context(|| format!("invalid line set in {}", path))?;

    log::info!(
        "solving {} lines, {} nodes",
        lineset.lines().len(),
        lineset.nodes().len()
    );
    let diagnostics = lineset.recalc(&description.options, None);
    if rename {
        lineset.rename_lines();
    }

    let output = Output {
        diagnostics,
        lengths: lineset.length_table(),
        checklengths: lineset
            .checklength_table(description.options.calculate_sag)
            .context("checklength")?,
        forces: lineset.force_table(),
        consumption: lineset.consumption(),
        weight: lineset.weight(),
        drag: lineset.drag().map(|(center, total)| DragOutput { center, total }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
