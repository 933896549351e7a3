// encode.rs

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};

use crate::error::{Result, StructureMpError};
use crate::popmap::PopMap;
use crate::replicate::Replicate;
use crate::vcf::{VariantSite, MISSING_ALLELE};

/// Two-digit codes expected by the inference program for the four
/// nucleotides; missing data is the -9 sentinel.
fn allele_code(symbol: char, locus: &str) -> Result<&'static str> {
    match symbol {
        'A' => Ok("10"),
        'T' => Ok("11"),
        'G' => Ok("12"),
        'C' => Ok("13"),
        MISSING_ALLELE => Ok("-9"),
        other => Err(StructureMpError::UnknownAllele {
            symbol: other,
            locus: locus.to_string(),
        }),
    }
}

/// Filters the variant stream down to the sites any replicate selected, in
/// stream order, so encoding never re-reads the VCF per replicate.
pub fn collect_selected_sites<I>(sites: I, union: &HashSet<String>) -> Result<Vec<VariantSite>>
where
    I: IntoIterator<Item = Result<VariantSite>>,
{
    let mut selected = Vec::new();
    for site in sites {
        let site = site?;
        if union.contains(&site.locus_key()) {
            selected.push(site);
        }
    }
    Ok(selected)
}

/// Writes one replicate's genotype matrix in the inference program's layout:
/// individuals in lexicographic order, two lines per individual (one per
/// chromosome copy), each line `index<TAB>pop<TAB>code code ...` covering the
/// replicate's selected loci in variant-stream order.
///
/// `columns` maps each sorted individual to its VCF sample column, as
/// returned by [`PopMap::bind_samples`]. Returns the number of loci written
/// per line.
pub fn write_replicate_file(
    replicate: &Replicate,
    sites: &[VariantSite],
    selection: &HashSet<String>,
    popmap: &PopMap,
    columns: &[usize],
) -> Result<usize> {
    let mut first_rows: Vec<Vec<&'static str>> = vec![Vec::new(); popmap.len()];
    let mut second_rows: Vec<Vec<&'static str>> = vec![Vec::new(); popmap.len()];
    let mut loci_written = 0usize;

    for site in sites {
        let key = site.locus_key();
        if !selection.contains(&key) {
            continue;
        }
        loci_written += 1;
        for (slot, &column) in columns.iter().enumerate() {
            let pair = site
                .alleles
                .get(column)
                .copied()
                .unwrap_or([MISSING_ALLELE; 2]);
            first_rows[slot].push(allele_code(pair[0], &key)?);
            second_rows[slot].push(allele_code(pair[1], &key)?);
        }
    }

    let file = File::create(replicate.data_path())?;
    let mut writer = BufWriter::new(file);
    for slot in 0..popmap.len() {
        let pop = popmap.pop_index_at(slot);
        writeln!(writer, "{}\t{}\t{}", slot + 1, pop, first_rows[slot].join(" "))?;
        writeln!(writer, "{}\t{}\t{}", slot + 1, pop, second_rows[slot].join(" "))?;
    }
    writer.flush()?;
    Ok(loci_written)
}
