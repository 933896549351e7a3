// sampler.rs

use std::collections::HashSet;

use log::debug;
use rand::Rng;

use crate::error::Result;
use crate::vcf::VariantSite;

/// Whether loci on the final contig of the stream take part in sampling.
///
/// Selection triggers on a contig change, so the trailing contig's buffer is
/// only flushed under `Keep`. `Drop` reproduces the historical behavior of
/// discarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalContigPolicy {
    Drop,
    Keep,
}

/// Per-replicate selected locus keys, in variant-stream order.
#[derive(Debug, Clone)]
pub struct LocusSelections {
    per_replicate: Vec<Vec<String>>,
}

impl LocusSelections {
    /// Selected loci for the replicate at `slot` (0-based).
    pub fn loci(&self, slot: usize) -> &[String] {
        &self.per_replicate[slot]
    }

    pub fn replicate_count(&self) -> usize {
        self.per_replicate.len()
    }

    /// Loci per replicate; identical for every replicate by construction.
    pub fn locus_count(&self) -> usize {
        self.per_replicate.first().map_or(0, Vec::len)
    }

    /// Selection as a set, for membership tests while encoding.
    pub fn selection_set(&self, slot: usize) -> HashSet<String> {
        self.per_replicate[slot].iter().cloned().collect()
    }

    /// Union of all replicates' selections.
    pub fn union(&self) -> HashSet<String> {
        self.per_replicate
            .iter()
            .flat_map(|loci| loci.iter().cloned())
            .collect()
    }
}

/// Draws one locus per contig per replicate, uniformly at random from the
/// loci observed for that contig. Input records must be grouped contiguously
/// by contig; interleaved contigs produce meaningless selections.
pub fn select_random_loci<R, I>(
    sites: I,
    replicate_count: usize,
    policy: FinalContigPolicy,
    rng: &mut R,
) -> Result<LocusSelections>
where
    R: Rng,
    I: IntoIterator<Item = Result<VariantSite>>,
{
    let mut per_replicate = vec![Vec::new(); replicate_count];
    let mut buffer: Vec<String> = Vec::new();
    let mut current_contig: Option<String> = None;

    for site in sites {
        let site = site?;
        if let Some(previous) = &current_contig {
            if *previous != site.contig {
                draw_from_buffer(&mut per_replicate, &buffer, rng);
                debug!(
                    "Contig {} contributed one of {} loci per replicate",
                    previous,
                    buffer.len()
                );
                buffer.clear();
            }
        }
        buffer.push(site.locus_key());
        current_contig = Some(site.contig);
    }

    if policy == FinalContigPolicy::Keep && !buffer.is_empty() {
        draw_from_buffer(&mut per_replicate, &buffer, rng);
    }

    Ok(LocusSelections { per_replicate })
}

fn draw_from_buffer<R: Rng>(per_replicate: &mut [Vec<String>], buffer: &[String], rng: &mut R) {
    // Fresh independent draw per replicate.
    for selection in per_replicate.iter_mut() {
        let pick = buffer[rng.random_range(0..buffer.len())].clone();
        selection.push(pick);
    }
}
