// main.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use structure_mp::{
    batch, clumpp, encode,
    estimate::{self, ClusterIndices},
    exec::SystemRunner,
    popmap::PopMap,
    replicate::{self, Replicate},
    sampler::{self, FinalContigPolicy},
    structure,
    vcf::VariantStream,
};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting structure_mp with args: {:?}", cli_args);

    if cli_args.max_k < 2 {
        return Err(anyhow!("maxK must be at least 2, got {}.", cli_args.max_k));
    }
    if cli_args.replicates == 0 {
        return Err(anyhow!("replicates must be at least 1."));
    }
    if cli_args.threads == 0 {
        return Err(anyhow!("threads must be at least 1."));
    }
    let available = num_cpus::get();
    if cli_args.threads > available {
        warn!(
            "Requested {} threads but only {} CPUs are available; external runs will oversubscribe.",
            cli_args.threads, available
        );
    }

    // --- 1. Output directory and population map ---
    let out_dir = match &cli_args.out_dir {
        Some(dir) => dir.clone(),
        None => default_out_dir(&cli_args.vcf_file)?,
    };
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    info!("Writing all run files under {}", out_dir.display());

    info!("Initialising individuals and populations...");
    let popmap = PopMap::from_file(&cli_args.pop_file).with_context(|| {
        format!(
            "Failed to load population file {}",
            cli_args.pop_file.display()
        )
    })?;
    if popmap.is_empty() {
        return Err(anyhow!(
            "Population file {} assigns no individuals.",
            cli_args.pop_file.display()
        ));
    }
    let num_indvs = popmap.len();
    info!("{} individuals with population assignments.", num_indvs);

    // --- 2. Replicate identifiers and batches ---
    let stem = vcf_stem(&cli_args.vcf_file)?;
    let replicates = replicate::generate_replicates(&out_dir, &stem, cli_args.replicates);
    let batches = batch::generate_batches(&replicates, cli_args.threads);
    let num_reps = replicates.len();
    info!(
        "{} replicates in {} batches of up to {} threads.",
        num_reps,
        batches.len(),
        cli_args.threads
    );

    // --- 3. Subsample one SNP per contig per replicate ---
    let seed = cli_args.seed.unwrap_or_else(rand::random);
    info!("Sampling seed: {} (pass --seed {} to reproduce).", seed, seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let policy = if cli_args.keep_final_contig {
        FinalContigPolicy::Keep
    } else {
        FinalContigPolicy::Drop
    };

    info!("Subsampling SNPs (one random SNP per contig)...");
    let mut stream = VariantStream::open(&cli_args.vcf_file)
        .with_context(|| format!("Failed to open VCF {}", cli_args.vcf_file.display()))?;
    let columns = popmap
        .bind_samples(stream.samples())
        .context("VCF samples and population assignments do not match")?;
    let selections = sampler::select_random_loci(stream.sites(), num_reps, policy, &mut rng)
        .context("SNP subsampling failed")?;
    let num_loci = selections.locus_count();
    info!("[{} SNPs/loci per replicate]", num_loci);
    if num_loci == 0 {
        return Err(anyhow!(
            "No loci were selected; is the VCF empty or limited to a single contig? \
             (--keep-final-contig includes the trailing contig)"
        ));
    }

    // Second pass: materialize only the sites some replicate selected.
    let union = selections.union();
    let mut stream = VariantStream::open(&cli_args.vcf_file)?;
    let selected_sites = encode::collect_selected_sites(stream.sites(), &union)?;
    debug!("Materialized {} selected sites.", selected_sites.len());

    // --- 4. Encode replicate files (batched) ---
    info!("Outputting {} replicate files...", num_reps);
    let selection_sets: Vec<HashSet<String>> = (0..num_reps)
        .map(|slot| selections.selection_set(slot))
        .collect();
    let pb_encode = stage_progress(num_reps, "encoded")?;
    batch::run_batches(&batches, "encode", |rep: &Replicate| {
        encode::write_replicate_file(
            rep,
            &selected_sites,
            &selection_sets[rep.index - 1],
            &popmap,
            &columns,
        )?;
        pb_encode.inc(1);
        Ok(())
    })?;
    pb_encode.finish_with_message("encoding complete");

    // --- 5. Inference runs, batched per K ---
    let runner = SystemRunner;
    for k in 2..=cli_args.max_k {
        info!(
            "Executing {} parallel inference runs for K = {} ...",
            cli_args.threads, k
        );
        let pb_infer = stage_progress(num_reps, "inferred")?;
        batch::run_batches(&batches, &format!("inference K={}", k), |rep: &Replicate| {
            structure::run_structure(&runner, &cli_args.structure_cmd, rep, k)?;
            pb_infer.inc(1);
            Ok(())
        })?;
        pb_infer.finish_with_message(format!("K={} inference complete", k));
    }

    // --- 6. Alignment per K ---
    for k in 2..=cli_args.max_k {
        info!("Running alignment on replicates for K = {} ...", k);
        let files = clumpp::ClumppFiles::new(&out_dir, k);
        clumpp::harvest_ancestry_tables(&replicates, &files)
            .with_context(|| format!("Failed to harvest ancestry tables for K={}", k))?;
        clumpp::write_paramfile(&files, num_indvs, num_reps)?;
        clumpp::run_clumpp(&runner, &cli_args.clumpp_cmd, &files)
            .with_context(|| format!("Alignment failed for K={}", k))?;
        let csvs = clumpp::convert_outputs_to_csv(&files, &popmap, num_reps)?;
        info!("Wrote {} aligned CSV tables for K={}.", csvs.len(), k);
    }

    // --- 7. Cluster-count estimation per K ---
    for k in 2..=cli_args.max_k {
        let files = clumpp::ClumppFiles::new(&out_dir, k);
        let ClusterIndices {
            med_mea_k,
            max_mea_k,
            med_med_k,
            max_med_k,
        } = estimate::estimate(&files, num_reps)
            .with_context(|| format!("Cluster-count estimation failed for K={}", k))?;
        println!(
            "K = {}: MedMeaK {} MaxMeaK {} MedMedK {} MaxMedK {}",
            k, med_mea_k, max_mea_k, med_med_k, max_med_k
        );
    }

    info!(
        "structure_mp finished successfully in {:.2?}.",
        total_time_start.elapsed()
    );
    Ok(())
}

/// Output directory sibling to the VCF: `<stem>_structure`.
fn default_out_dir(vcf_file: &Path) -> Result<PathBuf> {
    let stem = vcf_stem(vcf_file)?;
    Ok(vcf_file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default()
        .join(format!("{}_structure", stem)))
}

fn vcf_stem(vcf_file: &Path) -> Result<String> {
    vcf_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Cannot derive a name from {}", vcf_file.display()))
}

fn stage_progress(total: usize, verb: &str) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} reps {} ({{percent}}%) ETA: {{eta}}",
            verb
        ))
        .map_err(|e| anyhow!("Failed to create progress bar style: {}", e))?
        .progress_chars("=> ");
    Ok(ProgressBar::new(total as u64).with_style(style))
}

// --- Module Implementations ---

mod cli {
    use clap::Parser; // For the derive macro to find Parser
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(
        author,
        version,
        about = "Parallel STRUCTURE replicate runner with CLUMPP alignment and cluster-count estimation.",
        long_about = None,
        propagate_version = true
    )]
    pub(crate) struct CliArgs {
        /// Input SNP data (.vcf), sorted by contig
        pub(crate) vcf_file: PathBuf,

        /// Population file: individual<TAB>population, one row per individual
        pub(crate) pop_file: PathBuf,

        /// Maximum number of K (expected clusters); runs K = 2..=maxK
        pub(crate) max_k: u32,

        /// Number of replicate runs for each K
        pub(crate) replicates: usize,

        /// Number of parallel threads per batch
        pub(crate) threads: usize,

        /// Directory for all run files (default: <vcf_stem>_structure)
        #[arg(long)]
        pub(crate) out_dir: Option<PathBuf>,

        /// Seed for the locus subsampler (default: drawn from entropy, logged)
        #[arg(long)]
        pub(crate) seed: Option<u64>,

        /// Inference program to invoke
        #[arg(long, default_value = "structure")]
        pub(crate) structure_cmd: String,

        /// Alignment program to invoke
        #[arg(long, default_value = "CLUMPP")]
        pub(crate) clumpp_cmd: String,

        /// Also sample from the final contig of the stream (historically its
        /// loci were dropped because selection only triggers on a contig change)
        #[arg(long)]
        pub(crate) keep_final_contig: bool,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }
}
