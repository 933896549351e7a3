// replicate.rs

use std::path::{Path, PathBuf};

/// One pseudo-replicate dataset. Identity comes from an explicit sequence
/// counter so filenames are stable across reruns and in tests; every file a
/// replicate owns is derived from its `prefix`, which keeps the on-disk
/// namespaces disjoint per replicate and per K.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replicate {
    /// 1-based position in the run.
    pub index: usize,
    prefix: String,
}

impl Replicate {
    /// Encoded genotype matrix consumed by the inference program.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.str", self.prefix))
    }

    /// Result path handed to the inference program via `-o`.
    pub fn result_path(&self, k: u32) -> PathBuf {
        PathBuf::from(format!("{}_K{}.out", self.prefix, k))
    }

    /// Result file the inference program actually writes (it appends `_f`).
    pub fn ancestry_path(&self, k: u32) -> PathBuf {
        PathBuf::from(format!("{}_K{}.out_f", self.prefix, k))
    }

    /// Captured stdout of the inference run.
    pub fn log_path(&self, k: u32) -> PathBuf {
        PathBuf::from(format!("{}_K{}.log", self.prefix, k))
    }
}

/// Builds `count` replicate identities under `out_dir`, numbered from 1.
pub fn generate_replicates(out_dir: &Path, stem: &str, count: usize) -> Vec<Replicate> {
    (1..=count)
        .map(|index| Replicate {
            index,
            prefix: out_dir
                .join(format!("{}_rep{:04}", stem, index))
                .display()
                .to_string(),
        })
        .collect()
}
