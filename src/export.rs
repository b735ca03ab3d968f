use crate::ranker::RankResult;
use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use statrs::statistics::{Data, Distribution, Max, Median, Min};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Similarity summary for one class's result list.
#[derive(Debug, Serialize, PartialEq)]
pub struct SimilarityStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub count: usize,
}

pub fn similarity_stats(results: &[RankResult]) -> SimilarityStats {
    if results.is_empty() {
        return SimilarityStats {
            max: 0.0,
            min: 0.0,
            mean: 0.0,
            median: 0.0,
            count: 0,
        };
    }
    let similarities: Vec<f64> = results.iter().map(|r| r.similarity).collect();
    let data = Data::new(similarities);
    SimilarityStats {
        max: data.max(),
        min: data.min(),
        mean: data.mean().unwrap_or(0.0),
        median: data.median(),
        count: results.len(),
    }
}

/// Default output path for an export, e.g. `search_results_20260830_141503.json`.
pub fn default_export_path(extension: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("search_results_{}.{}", timestamp, extension))
}

/// Write ranked results for every class to a JSON document preserving rank
/// order, with per-class similarity statistics.
pub fn export_json(
    path: &Path,
    query: &str,
    by_class: &BTreeMap<String, Vec<RankResult>>,
) -> Result<()> {
    let classes: BTreeMap<&String, serde_json::Value> = by_class
        .iter()
        .map(|(label, results)| {
            let value = serde_json::json!({
                "count": results.len(),
                "stats": similarity_stats(results),
                "results": results,
            });
            (label, value)
        })
        .collect();

    let document = serde_json::json!({
        "query": query,
        "timestamp": Local::now().to_rfc3339(),
        "total_results": by_class.values().map(|r| r.len()).sum::<usize>(),
        "classes": classes,
    });

    let file = File::create(path)
        .with_context(|| format!("failed to create export file '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, &document)
        .with_context(|| format!("failed to write JSON export '{}'", path.display()))?;
    Ok(())
}

/// Write ranked results for every class as CSV rows, one per result, in rank
/// order within each class.
pub fn export_csv(
    path: &Path,
    query: &str,
    by_class: &BTreeMap<String, Vec<RankResult>>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create export file '{}'", path.display()))?;
    writer.write_record(["query", "class", "rank", "sms_id", "similarity", "text"])?;
    for (label, results) in by_class {
        for (rank, result) in results.iter().enumerate() {
            let rank = (rank + 1).to_string();
            let similarity = format!("{:.6}", result.similarity);
            writer.write_record([
                query,
                label.as_str(),
                rank.as_str(),
                result.sms_id.as_str(),
                similarity.as_str(),
                result.text.as_str(),
            ])?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("failed to write CSV export '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, similarity: f64) -> RankResult {
        RankResult {
            sms_id: id.to_string(),
            text: format!("text for {}", id),
            similarity,
        }
    }

    fn sample_by_class() -> BTreeMap<String, Vec<RankResult>> {
        let mut by_class = BTreeMap::new();
        by_class.insert(
            "smishing".to_string(),
            vec![result("s1", 0.9), result("s2", 0.5)],
        );
        by_class.insert("benign".to_string(), vec![]);
        by_class
    }

    #[test]
    fn stats_on_empty_results_are_zeroed() {
        let stats = similarity_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.median, 0.0);
    }

    #[test]
    fn stats_summarize_similarities() {
        let results = vec![result("a", 0.2), result("b", 0.8), result("c", 0.5)];
        let stats = similarity_stats(&results);
        assert_eq!(stats.count, 3);
        assert!((stats.max - 0.8).abs() < 1e-12);
        assert!((stats.min - 0.2).abs() < 1e-12);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert!((stats.median - 0.5).abs() < 1e-12);
    }

    #[test]
    fn json_export_preserves_rank_order_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        export_json(&path, "free prize", &sample_by_class()).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(parsed["query"], "free prize");
        assert_eq!(parsed["total_results"], 2);
        let smishing = &parsed["classes"]["smishing"];
        assert_eq!(smishing["count"], 2);
        assert_eq!(smishing["results"][0]["sms_id"], "s1");
        assert_eq!(smishing["results"][1]["sms_id"], "s2");
        assert_eq!(parsed["classes"]["benign"]["count"], 0);
    }

    #[test]
    fn csv_export_writes_one_row_per_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        export_csv(&path, "free prize", &sample_by_class()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "smishing");
        assert_eq!(&rows[0][2], "1");
        assert_eq!(&rows[0][3], "s1");
        assert_eq!(&rows[1][3], "s2");
    }

    #[test]
    fn default_export_path_carries_extension() {
        let path = default_export_path("json");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("search_results_"));
        assert!(name.ends_with(".json"));
    }
}
