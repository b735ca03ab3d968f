use crate::config::verbose_print;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Recognized dataset file formats, resolved once from the file extension
/// before any rows are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    /// Python collection scripts from the old pipeline (`sms_data = [...]`).
    LegacyScript,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("py") => Ok(SourceFormat::LegacyScript),
            other => anyhow::bail!(
                "unrecognized dataset format '{}' for '{}': expected .csv or .py",
                other.unwrap_or(""),
                path.display()
            ),
        }
    }
}

/// Ids and texts for one class, in dataset row order.
#[derive(Debug, Default)]
pub struct ClassRecords {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
}

impl ClassRecords {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Deserialize)]
struct DatasetRow {
    sms_id: String,
    sms_text: String,
    class: String,
}

/// Load the dataset at `path` and partition its rows by class label.
///
/// Every configured class gets an entry in the returned map, empty when the
/// dataset has no rows for it. Rows with a blank text and rows whose class is
/// not configured are skipped.
pub fn load_dataset(path: &Path, classes: &[String]) -> Result<BTreeMap<String, ClassRecords>> {
    match SourceFormat::detect(path)? {
        SourceFormat::Csv => load_csv(path, classes),
        SourceFormat::LegacyScript => anyhow::bail!(
            "legacy .py collections are no longer loaded directly; convert '{}' to CSV with \
             sms_id, sms_text and class columns first",
            path.display()
        ),
    }
}

fn load_csv(path: &Path, classes: &[String]) -> Result<BTreeMap<String, ClassRecords>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open dataset '{}'", path.display()))?;

    let mut by_class: BTreeMap<String, ClassRecords> = classes
        .iter()
        .map(|c| (c.clone(), ClassRecords::default()))
        .collect();

    let mut total = 0usize;
    let mut skipped = 0usize;
    for row in reader.deserialize() {
        let row: DatasetRow = row.context("malformed dataset row")?;
        total += 1;
        if row.sms_text.trim().is_empty() {
            skipped += 1;
            continue;
        }
        match by_class.get_mut(&row.class) {
            Some(records) => {
                records.ids.push(row.sms_id);
                records.texts.push(row.sms_text);
            }
            None => skipped += 1,
        }
    }

    verbose_print(&format!(
        "Loaded {} dataset rows ({} skipped) from '{}'",
        total,
        skipped,
        path.display()
    ));
    for (label, records) in &by_class {
        verbose_print(&format!("Found {} {} SMS", records.len(), label));
    }

    Ok(by_class)
}
