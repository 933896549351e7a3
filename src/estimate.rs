// estimate.rs

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use statrs::statistics::{Data, Median, Statistics};

use crate::clumpp::ClumppFiles;
use crate::error::{Result, StructureMpError};

/// A cluster only counts toward the estimate when some population's summary
/// membership exceeds this.
const MEMBERSHIP_THRESHOLD: f64 = 0.5;

/// The four per-K cluster-count indices (Puechmaille 2016).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterIndices {
    pub med_mea_k: f64,
    pub max_mea_k: f64,
    pub med_med_k: f64,
    pub max_med_k: f64,
}

/// Mean- and median-based threshold counts for one aligned CSV table.
///
/// Rows are `individual,population,v1,v2,...`; values are grouped per
/// cluster per population, summarized per population by mean and by median,
/// and a cluster counts when its maximum across populations exceeds the
/// threshold, once per statistic.
fn threshold_counts(path: &Path) -> Result<(usize, usize)> {
    // cluster -> population -> membership values
    let mut assignments: Vec<HashMap<String, Vec<f64>>> = Vec::new();
    let reader = BufReader::new(File::open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 3 {
            return Err(StructureMpError::MalformedAlignedRow {
                path: path.to_path_buf(),
                line: line_no + 1,
            });
        }
        let pop = cols[1].to_string();
        for (cluster, value) in cols[2..].iter().enumerate() {
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| StructureMpError::MalformedAlignedRow {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                })?;
            if assignments.len() <= cluster {
                assignments.resize_with(cluster + 1, HashMap::new);
            }
            assignments[cluster]
                .entry(pop.clone())
                .or_default()
                .push(value);
        }
    }

    let mut mean_count = 0usize;
    let mut median_count = 0usize;
    for per_pop in &assignments {
        let max_mean = per_pop
            .values()
            .map(|values| values.iter().mean())
            .fold(f64::NEG_INFINITY, f64::max);
        let max_median = per_pop
            .values()
            .map(|values| Data::new(values.clone()).median())
            .fold(f64::NEG_INFINITY, f64::max);
        if max_mean > MEMBERSHIP_THRESHOLD {
            mean_count += 1;
        }
        if max_median > MEMBERSHIP_THRESHOLD {
            median_count += 1;
        }
    }
    Ok((mean_count, median_count))
}

/// Computes the four cluster-count indices for one K from its permuted
/// tables: MedMeaK/MaxMeaK are the median and maximum of the per-replicate
/// mean-threshold counts, MedMedK/MaxMedK likewise over the
/// median-threshold counts.
pub fn estimate(files: &ClumppFiles, num_reps: usize) -> Result<ClusterIndices> {
    let mut mean_counts = Vec::with_capacity(num_reps);
    let mut median_counts = Vec::with_capacity(num_reps);
    for r in 1..=num_reps {
        let csv = ClumppFiles::csv_path(&files.permfile(r));
        let (mean_count, median_count) = threshold_counts(&csv)?;
        mean_counts.push(mean_count as f64);
        median_counts.push(median_count as f64);
    }
    Ok(ClusterIndices {
        med_mea_k: Data::new(mean_counts.clone()).median(),
        max_mea_k: Statistics::max(&mean_counts),
        med_med_k: Data::new(median_counts.clone()).median(),
        max_med_k: Statistics::max(&median_counts),
    })
}
