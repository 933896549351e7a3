// vcf.rs

use std::io::BufRead;
use std::path::Path;

use log::debug;
use noodles_vcf::{
    self as vcf,
    variant::record::{
        samples::{series::value::Genotype as _, Series as _},
        AlternateBases as _,
    },
    Header as VcfHeader,
};

use crate::error::Result;

/// Symbol used for a missing allele call.
pub const MISSING_ALLELE: char = '.';

/// One variant record reduced to what the pipeline needs: its locus and one
/// allele-symbol pair per VCF sample column. Missing calls appear as
/// [`MISSING_ALLELE`] pairs.
#[derive(Debug, Clone)]
pub struct VariantSite {
    pub contig: String,
    pub position: u64,
    pub alleles: Vec<[char; 2]>,
}

impl VariantSite {
    /// Locus key in `contig_position` form, the identity used by the sampler
    /// and the encoder.
    pub fn locus_key(&self) -> String {
        format!("{}_{}", self.contig, self.position)
    }
}

/// Sequential reader over a VCF exposing per-record contig, position and
/// per-sample genotype symbols. Records are assumed grouped contiguously by
/// contig; the reader does not enforce this.
pub struct VariantStream {
    reader: vcf::io::Reader<Box<dyn BufRead>>,
    header: VcfHeader,
    buffer: vcf::Record,
    samples: Vec<String>,
}

impl VariantStream {
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = vcf::io::reader::Builder::default().build_from_path(path)?;
        let header = reader.read_header()?;
        let samples: Vec<String> = header.sample_names().iter().cloned().collect();
        Ok(Self {
            reader,
            header,
            buffer: vcf::Record::default(),
            samples,
        })
    }

    /// Sample names in VCF column order.
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Reads the next record, or `None` at end of stream.
    pub fn next_site(&mut self) -> Result<Option<VariantSite>> {
        if self.reader.read_record(&mut self.buffer)? == 0 {
            return Ok(None);
        }
        let record = &self.buffer;

        let contig = record.reference_sequence_name().to_string();
        let position = record
            .variant_start()
            .map_or(0u64, |res_p| res_p.map_or(0u64, |p| p.get() as u64));

        let ref_symbol = record
            .reference_bases()
            .chars()
            .next()
            .unwrap_or(MISSING_ALLELE);
        let mut alt_symbols = Vec::new();
        for allele in record.alternate_bases().iter() {
            let allele = allele?;
            alt_symbols.push(allele.chars().next().unwrap_or(MISSING_ALLELE));
        }

        let mut alleles: Vec<[char; 2]> = Vec::with_capacity(self.samples.len());
        let gt_key_str: &str = vcf::variant::record::samples::keys::key::GENOTYPE.as_ref();
        let samples_obj = record.samples();
        if let Some(gt_series) = samples_obj.select(gt_key_str) {
            for (sample_idx, value_option_result) in gt_series.iter(&self.header).enumerate() {
                if sample_idx >= self.samples.len() {
                    debug!(
                        "More GT values than samples at {}:{}; truncating.",
                        contig, position
                    );
                    break;
                }
                let pair = match value_option_result {
                    Ok(Some(vcf::variant::record::samples::series::Value::String(gt))) => {
                        parse_gt_string(gt.as_ref())
                    }
                    Ok(Some(vcf::variant::record::samples::series::Value::Genotype(
                        boxed_gt,
                    ))) => {
                        let mut indices: [Option<usize>; 2] = [None, None];
                        let mut collected = 0;
                        for result_item in boxed_gt.iter() {
                            if collected >= 2 {
                                break;
                            }
                            match result_item {
                                Ok((opt_allele_idx, _phasing)) => {
                                    indices[collected] = opt_allele_idx;
                                    collected += 1;
                                }
                                Err(_) => {
                                    debug!(
                                        "Unreadable GT allele for sample {} at {}:{}; treating as missing.",
                                        sample_idx, contig, position
                                    );
                                    indices = [None, None];
                                    break;
                                }
                            }
                        }
                        indices
                    }
                    Ok(Some(other_type)) => {
                        debug!(
                            "Unexpected GT value type ({:?}) for sample {} at {}:{}; treating as missing.",
                            other_type, sample_idx, contig, position
                        );
                        [None, None]
                    }
                    Ok(None) => [None, None],
                    Err(e) => {
                        debug!(
                            "Error reading GT for sample {} at {}:{}: {}; treating as missing.",
                            sample_idx, contig, position, e
                        );
                        [None, None]
                    }
                };
                alleles.push([
                    symbol_for(pair[0], ref_symbol, &alt_symbols),
                    symbol_for(pair[1], ref_symbol, &alt_symbols),
                ]);
            }
        } else {
            debug!("No GT series at {}:{}; all calls missing.", contig, position);
        }
        // Pad out samples the series did not cover.
        while alleles.len() < self.samples.len() {
            alleles.push([MISSING_ALLELE; 2]);
        }

        Ok(Some(VariantSite {
            contig,
            position,
            alleles,
        }))
    }

    /// Adapter over [`Self::next_site`] for iterator-driven consumers.
    pub fn sites(&mut self) -> impl Iterator<Item = Result<VariantSite>> + '_ {
        std::iter::from_fn(move || self.next_site().transpose())
    }
}

/// Parses a textual GT value such as `0/1`, `0|1` or `./.` into allele
/// indices. Tokens that are `.` or unparsable count as missing.
fn parse_gt_string(gt: &str) -> [Option<usize>; 2] {
    let mut parts = gt.split(['/', '|']);
    let first = parts.next().and_then(parse_allele_token);
    let second = parts.next().and_then(parse_allele_token);
    [first, second]
}

fn parse_allele_token(token: &str) -> Option<usize> {
    if token == "." {
        return None;
    }
    token.parse().ok()
}

fn symbol_for(index: Option<usize>, ref_symbol: char, alt_symbols: &[char]) -> char {
    match index {
        None => MISSING_ALLELE,
        Some(0) => ref_symbol,
        Some(i) => alt_symbols.get(i - 1).copied().unwrap_or(MISSING_ALLELE),
    }
}
