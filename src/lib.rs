// lib.rs

//! Parallel runner for population-structure inference over pseudo-replicate
//! SNP datasets.
//!
//! From a contig-sorted VCF, each replicate subsamples one SNP per contig at
//! random, is encoded in the layout the external inference program expects,
//! and is run through that program in bounded-concurrency batches for every
//! K from 2 to the configured maximum. The per-replicate results are then
//! aligned with the external permutation aligner, converted to CSV, and
//! summarized into the four Puechmaille-style cluster-count indices per K.
//!
//! Both external programs are consumed as black boxes behind the
//! [`exec::ProgramRunner`] capability trait and their documented file
//! contracts.

pub mod batch;
pub mod clumpp;
pub mod encode;
pub mod error;
pub mod estimate;
pub mod exec;
pub mod popmap;
pub mod replicate;
pub mod sampler;
pub mod structure;
pub mod vcf;
