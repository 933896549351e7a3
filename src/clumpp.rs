// clumpp.rs

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Result, StructureMpError};
use crate::exec::ProgramRunner;
use crate::popmap::PopMap;
use crate::replicate::Replicate;

/// Header line preceding the ancestry table in an inference result file.
pub const ANCESTRY_HEADER: &str = "Inferred ancestry of individuals:";

/// Column-header line inside the ancestry table, skipped while harvesting.
const COLUMN_HEADER_PREFIX: &str = "Label";

/// File layout for one aligner invocation. All paths derive from a single
/// per-K prefix, keeping per-K namespaces disjoint.
#[derive(Debug, Clone)]
pub struct ClumppFiles {
    prefix: String,
    k: u32,
}

impl ClumppFiles {
    pub fn new(out_dir: &Path, k: u32) -> Self {
        Self {
            prefix: out_dir.join(format!("clumpp_K{}", k)).display().to_string(),
            k,
        }
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// Aggregated ancestry tables fed to the aligner.
    pub fn indfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.ind", self.prefix))
    }

    /// The aligner's overall (averaged) output.
    pub fn outfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.out", self.prefix))
    }

    pub fn miscfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.misc", self.prefix))
    }

    pub fn paramfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.paramfile", self.prefix))
    }

    pub fn logfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.log", self.prefix))
    }

    /// Base path the aligner extends with `_{r}` per permuted replicate.
    pub fn permfile_base(&self) -> PathBuf {
        PathBuf::from(format!("{}_perm", self.prefix))
    }

    /// Permuted table for replicate `r` (1-based).
    pub fn permfile(&self, r: usize) -> PathBuf {
        PathBuf::from(format!("{}_perm_{}", self.prefix, r))
    }

    /// Overall output plus the permuted table per replicate, in that order.
    pub fn output_files(&self, num_reps: usize) -> Vec<PathBuf> {
        let mut files = vec![self.outfile()];
        files.extend((1..=num_reps).map(|r| self.permfile(r)));
        files
    }

    /// CSV twin of an aligner output file.
    pub fn csv_path(output: &Path) -> PathBuf {
        let mut path = output.as_os_str().to_owned();
        path.push(".csv");
        PathBuf::from(path)
    }
}

/// Collects every replicate's ancestry table for this K into the shared
/// indfile, one blank-line-separated block per replicate.
///
/// Each result file is scanned for [`ANCESTRY_HEADER`]; data lines are
/// copied until the next blank line, skipping the `Label` column-header
/// line. A result file without the header is a hard error, since the
/// aligner would otherwise run on silently incomplete input.
pub fn harvest_ancestry_tables(
    replicates: &[Replicate],
    files: &ClumppFiles,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(files.indfile())?);
    for replicate in replicates {
        let path = replicate.ancestry_path(files.k);
        let reader = BufReader::new(File::open(&path)?);
        let mut in_table = false;
        let mut copied = 0usize;
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed == ANCESTRY_HEADER {
                in_table = true;
            } else if in_table && trimmed.is_empty() {
                break;
            } else if in_table && !trimmed.starts_with(COLUMN_HEADER_PREFIX) {
                writeln!(writer, "{}", line)?;
                copied += 1;
            }
        }
        if !in_table {
            return Err(StructureMpError::MissingAncestryTable(path));
        }
        debug!(
            "Harvested {} ancestry rows from replicate {} for K={}",
            copied, replicate.index, files.k
        );
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the aligner control file: fixed greedy heuristic with 1000
/// repeats, permuted-data output enabled, ordered by run.
pub fn write_paramfile(files: &ClumppFiles, num_indvs: usize, num_reps: usize) -> Result<PathBuf> {
    let paramfile = files.paramfile();
    let mut writer = BufWriter::new(File::create(&paramfile)?);
    let contents = [
        "DATATYPE 0".to_string(),
        format!("INDFILE {}", files.indfile().display()),
        format!("OUTFILE {}", files.outfile().display()),
        format!("MISCFILE {}", files.miscfile().display()),
        format!("K {}", files.k),
        format!("C {}", num_indvs),
        format!("R {}", num_reps),
        "M 2".to_string(),
        "S 2".to_string(),
        "W 1".to_string(),
        "PRINT_PERMUTED_DATA 2".to_string(),
        "GREEDY_OPTION 2".to_string(),
        "REPEATS 1000".to_string(),
        "PRINT_RANDOM_INPUTORDER 0".to_string(),
        format!("PERMUTED_DATAFILE {}", files.permfile_base().display()),
        "PRINT_EVERY_PERM 0".to_string(),
        "OVERRIDE_WARNINGS 0".to_string(),
        "ORDER_BY_RUN 1".to_string(),
    ];
    for line in &contents {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(paramfile)
}

/// Invokes the external aligner once for this K.
pub fn run_clumpp(runner: &dyn ProgramRunner, program: &str, files: &ClumppFiles) -> Result<()> {
    let args = vec![files.paramfile().display().to_string()];
    let context = format!("alignment K={}", files.k);
    runner.run(program, &args, &files.logfile(), &context)
}

/// Converts every aligner output file (the overall table plus one permuted
/// table per replicate) to CSV rows `individual,population,v1,v2,...`,
/// resolving each row's 1-based individual index through the same sorted
/// lookup used while encoding. Returns the CSV paths written.
pub fn convert_outputs_to_csv(
    files: &ClumppFiles,
    popmap: &PopMap,
    num_reps: usize,
) -> Result<Vec<PathBuf>> {
    let mut csv_paths = Vec::new();
    for path in files.output_files(num_reps) {
        let csv_path = ClumppFiles::csv_path(&path);
        let reader = BufReader::new(File::open(&path)?);
        let mut writer = BufWriter::new(File::create(&csv_path)?);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 {
                return Err(StructureMpError::MalformedAlignedRow {
                    path: path.clone(),
                    line: line_no + 1,
                });
            }
            let index: usize =
                cols[1]
                    .parse()
                    .map_err(|_| StructureMpError::MalformedAlignedRow {
                        path: path.clone(),
                        line: line_no + 1,
                    })?;
            let (individual, label) = popmap.by_output_index(index).ok_or_else(|| {
                StructureMpError::BadIndividualIndex {
                    index,
                    path: path.clone(),
                }
            })?;
            writeln!(writer, "{},{},{}", individual, label, cols[5..].join(","))?;
        }
        writer.flush()?;
        csv_paths.push(csv_path);
    }
    Ok(csv_paths)
}
