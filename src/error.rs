// error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructureMpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized allele symbol '{symbol}' at locus {locus}")]
    UnknownAllele { symbol: char, locus: String },

    #[error("individual '{individual}' appears in the VCF but has no population assignment")]
    UnassignedIndividual { individual: String },

    #[error("individual '{individual}' from the population file is absent from the VCF")]
    MissingIndividual { individual: String },

    #[error("malformed population file line {line}: expected two tab-separated columns")]
    MalformedPopLine { line: usize },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status} while processing {context}")]
    ProcessFailed {
        program: String,
        status: String,
        context: String,
    },

    #[error("no ancestry table in {0}: missing 'Inferred ancestry of individuals:' header")]
    MissingAncestryTable(PathBuf),

    #[error("malformed aligned-output row in {path} at line {line}")]
    MalformedAlignedRow { path: PathBuf, line: usize },

    #[error("individual index {index} out of range in {path}")]
    BadIndividualIndex { index: usize, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, StructureMpError>;
