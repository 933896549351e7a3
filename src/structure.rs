// structure.rs

use crate::error::Result;
use crate::exec::ProgramRunner;
use crate::replicate::Replicate;

/// Launches the external inference program for one replicate at a given K.
///
/// The program reads the replicate's encoded file, writes its result next to
/// the `-o` path (appending `_f`), and has its stdout captured to the
/// replicate's per-K log file. A non-zero exit aborts the batch.
pub fn run_structure(
    runner: &dyn ProgramRunner,
    program: &str,
    replicate: &Replicate,
    k: u32,
) -> Result<()> {
    let args = vec![
        "-i".to_string(),
        replicate.data_path().display().to_string(),
        "-o".to_string(),
        replicate.result_path(k).display().to_string(),
        "-K".to_string(),
        k.to_string(),
    ];
    let context = format!("replicate {} K={}", replicate.index, k);
    runner.run(program, &args, &replicate.log_path(k), &context)
}
