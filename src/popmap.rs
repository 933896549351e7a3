// popmap.rs

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::error::{Result, StructureMpError};

/// Individual-to-population assignments loaded from a two-column
/// tab-separated file. Built once at run start and immutable thereafter.
///
/// Individuals are held in lexicographic order; that order defines both the
/// 1-based individual indices written to the encoded replicate files and the
/// index lookup used when converting aligned output rows back to names.
/// Population indices are 1-based, assigned first-seen over the sorted
/// individual order.
#[derive(Debug, Clone)]
pub struct PopMap {
    individuals: Vec<String>,
    labels: Vec<String>,
    pop_indices: Vec<usize>,
}

impl PopMap {
    pub fn from_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut assignments: HashMap<String, String> = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut cols = line.trim_end().splitn(2, '\t');
            match (cols.next(), cols.next()) {
                (Some(indiv), Some(pop)) if !indiv.is_empty() && !pop.trim().is_empty() => {
                    assignments.insert(indiv.to_string(), pop.trim().to_string());
                }
                _ => return Err(StructureMpError::MalformedPopLine { line: line_no + 1 }),
            }
        }

        let mut individuals: Vec<String> = assignments.keys().cloned().collect();
        individuals.sort();

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut labels = Vec::with_capacity(individuals.len());
        let mut pop_indices = Vec::with_capacity(individuals.len());
        for indiv in &individuals {
            let label = assignments[indiv].clone();
            let next_index = seen.len() + 1;
            let index = *seen.entry(label.clone()).or_insert(next_index);
            labels.push(label);
            pop_indices.push(index);
        }
        debug!(
            "Loaded {} individuals across {} populations from {}",
            individuals.len(),
            seen.len(),
            path.display()
        );

        Ok(Self {
            individuals,
            labels,
            pop_indices,
        })
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Individuals in lexicographic order.
    pub fn individuals(&self) -> &[String] {
        &self.individuals
    }

    /// 1-based first-seen population index for the individual at `slot`.
    pub fn pop_index_at(&self, slot: usize) -> usize {
        self.pop_indices[slot]
    }

    pub fn label_at(&self, slot: usize) -> &str {
        &self.labels[slot]
    }

    /// Resolves a 1-based individual index from an aligned output row to the
    /// (individual, population label) pair it encodes.
    pub fn by_output_index(&self, index: usize) -> Option<(&str, &str)> {
        let slot = index.checked_sub(1)?;
        let indiv = self.individuals.get(slot)?;
        Some((indiv.as_str(), self.labels[slot].as_str()))
    }

    /// Checks the VCF sample set against the assignments and returns, for
    /// each individual in sorted order, its column in the VCF sample layout.
    ///
    /// Every VCF sample must carry an assignment and every assigned
    /// individual must be present in the VCF.
    pub fn bind_samples(&self, samples: &[String]) -> Result<Vec<usize>> {
        let columns: HashMap<&str, usize> = samples
            .iter()
            .enumerate()
            .map(|(column, name)| (name.as_str(), column))
            .collect();
        for sample in samples {
            if self.individuals.binary_search(sample).is_err() {
                return Err(StructureMpError::UnassignedIndividual {
                    individual: sample.clone(),
                });
            }
        }
        self.individuals
            .iter()
            .map(|indiv| {
                columns.get(indiv.as_str()).copied().ok_or_else(|| {
                    StructureMpError::MissingIndividual {
                        individual: indiv.clone(),
                    }
                })
            })
            .collect()
    }
}
