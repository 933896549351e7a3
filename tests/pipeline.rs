// pipeline.rs
//
// End-to-end run of the replicate pipeline against fake inference and
// alignment programs: 6 individuals across 2 populations, 3 contigs of 2
// loci each, 4 replicates in batches of 2, K = 2..=3.

use std::collections::HashSet;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

use structure_mp::{
    batch, clumpp, encode,
    error::Result,
    estimate,
    exec::ProgramRunner,
    popmap::PopMap,
    replicate::{generate_replicates, Replicate},
    sampler::{self, FinalContigPolicy},
    structure,
    vcf::VariantStream,
};

/// Stands in for both external programs. The inference fake derives its
/// ancestry table from the encoded input file; the alignment fake replays
/// the harvested blocks as its overall and permuted outputs.
struct FakeRunner;

impl ProgramRunner for FakeRunner {
    fn run(&self, program: &str, args: &[String], stdout_log: &Path, _context: &str) -> Result<()> {
        match program {
            "structure" => fake_structure(args)?,
            "CLUMPP" => fake_clumpp(args)?,
            other => panic!("unexpected program invocation: {other}"),
        }
        fs::write(stdout_log, format!("{} finished\n", program))?;
        Ok(())
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> &'a str {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .unwrap_or_else(|| panic!("missing {flag} in {args:?}"))
}

/// Writes `<out>_f` with a plausible ancestry table: individual i's
/// dominant cluster is (i - 1) % K at 0.9 membership, the rest share 0.1.
fn fake_structure(args: &[String]) -> Result<()> {
    let input = flag_value(args, "-i");
    let output = flag_value(args, "-o");
    let k: usize = flag_value(args, "-K").parse().unwrap();
    let num_indvs = fs::read_to_string(input)?.lines().count() / 2;

    let mut table = String::new();
    table.push_str("Run parameters and other preamble\n\n");
    table.push_str("Inferred ancestry of individuals:\n");
    table.push_str("        Label (%Miss) Pop:  Inferred clusters\n");
    for i in 1..=num_indvs {
        let dominant = (i - 1) % k;
        let rest = 0.1 / (k as f64 - 1.0);
        let values: Vec<String> = (0..k)
            .map(|c| format!("{:.3}", if c == dominant { 0.9 } else { rest }))
            .collect();
        table.push_str(&format!("  {0}    {0}   (0)    1 :  {1}\n", i, values.join(" ")));
    }
    table.push_str("\nEstimated Ln Prob of Data   = -123.4\n");
    fs::write(format!("{}_f", output), table)?;
    Ok(())
}

/// Reads the control file, splits the indfile into per-replicate blocks and
/// writes the overall output (first block) plus one permuted file per block.
fn fake_clumpp(args: &[String]) -> Result<()> {
    let paramfile = fs::read_to_string(&args[0])?;
    let param = |key: &str| -> String {
        paramfile
            .lines()
            .find_map(|line| line.strip_prefix(&format!("{key} ")))
            .unwrap_or_else(|| panic!("missing {key} in paramfile"))
            .to_string()
    };
    let indfile = fs::read_to_string(param("INDFILE"))?;
    let num_reps: usize = param("R").parse().unwrap();
    let num_indvs: usize = param("C").parse().unwrap();

    let blocks: Vec<Vec<&str>> = indfile
        .split("\n\n")
        .map(|block| block.lines().filter(|l| !l.trim().is_empty()).collect())
        .filter(|block: &Vec<&str>| !block.is_empty())
        .collect();
    assert_eq!(blocks.len(), num_reps, "one indfile block per replicate");
    for block in &blocks {
        assert_eq!(block.len(), num_indvs, "one row per individual per block");
    }

    fs::write(param("OUTFILE"), format!("{}\n", blocks[0].join("\n")))?;
    let perm_base = param("PERMUTED_DATAFILE");
    for (r, block) in blocks.iter().enumerate() {
        fs::write(
            format!("{}_{}", perm_base, r + 1),
            format!("{}\n", block.join("\n")),
        )?;
    }
    Ok(())
}

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let pop_file = dir.join("pops.txt");
    let mut pops = String::new();
    for i in 1..=6 {
        let label = if i <= 3 { "reef_north" } else { "reef_south" };
        pops.push_str(&format!("ind{}\t{}\n", i, label));
    }
    fs::write(&pop_file, pops).unwrap();

    let vcf_file = dir.join("snps.vcf");
    let mut vcf = fs::File::create(&vcf_file).unwrap();
    writeln!(vcf, "##fileformat=VCFv4.2").unwrap();
    writeln!(
        vcf,
        "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
    )
    .unwrap();
    writeln!(
        vcf,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tind1\tind2\tind3\tind4\tind5\tind6"
    )
    .unwrap();
    for contig in ["ctg1", "ctg2", "ctg3"] {
        for pos in [10, 20] {
            writeln!(
                vcf,
                "{}\t{}\t.\tA\tT\t.\tPASS\t.\tGT\t0/0\t0/1\t1/1\t0/0\t0/1\t./.",
                contig, pos
            )
            .unwrap();
        }
    }
    (vcf_file, pop_file)
}

#[test]
fn pipeline_end_to_end_with_fake_programs() {
    let dir = tempdir().unwrap();
    let out_dir = dir.path().join("run");
    fs::create_dir_all(&out_dir).unwrap();
    let (vcf_file, pop_file) = write_inputs(dir.path());

    let num_reps = 4;
    let threads = 2;
    let max_k = 3u32;

    let popmap = PopMap::from_file(&pop_file).unwrap();
    assert_eq!(popmap.len(), 6);

    let replicates = generate_replicates(&out_dir, "snps", num_reps);
    let batches = batch::generate_batches(&replicates, threads);
    assert_eq!(batches.len(), 2);
    assert!(batches.iter().all(|b| b.len() == 2));

    // Sampling: keep the trailing contig so all 3 contigs contribute.
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut stream = VariantStream::open(&vcf_file).unwrap();
    let columns = popmap.bind_samples(stream.samples()).unwrap();
    let selections =
        sampler::select_random_loci(stream.sites(), num_reps, FinalContigPolicy::Keep, &mut rng)
            .unwrap();
    assert_eq!(selections.locus_count(), 3);

    let union = selections.union();
    let mut stream = VariantStream::open(&vcf_file).unwrap();
    let selected_sites = encode::collect_selected_sites(stream.sites(), &union).unwrap();

    // Encode, batched.
    let selection_sets: Vec<HashSet<String>> = (0..num_reps)
        .map(|slot| selections.selection_set(slot))
        .collect();
    batch::run_batches(&batches, "encode", |rep: &Replicate| {
        encode::write_replicate_file(
            rep,
            &selected_sites,
            &selection_sets[rep.index - 1],
            &popmap,
            &columns,
        )?;
        Ok(())
    })
    .unwrap();

    for rep in &replicates {
        let contents = fs::read_to_string(rep.data_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 12); // 6 individuals, two lines each
        for line in &lines {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields.len(), 3);
            assert_eq!(fields[2].split(' ').count(), 3); // one code per contig
        }
        // Individual indices are stable across both chromosome-copy lines.
        assert!(lines[0].starts_with("1\t1\t") && lines[1].starts_with("1\t1\t"));
        assert!(lines[6].starts_with("4\t2\t") && lines[7].starts_with("4\t2\t"));
        // ind6 is ./. everywhere, so its lines carry only missing codes.
        assert_eq!(lines[10], "6\t2\t-9 -9 -9");
        assert_eq!(lines[11], "6\t2\t-9 -9 -9");
    }

    // Inference then alignment then estimation, per K.
    let runner = FakeRunner;
    for k in 2..=max_k {
        batch::run_batches(&batches, "inference", |rep: &Replicate| {
            structure::run_structure(&runner, "structure", rep, k)
        })
        .unwrap();

        let files = clumpp::ClumppFiles::new(&out_dir, k);
        clumpp::harvest_ancestry_tables(&replicates, &files).unwrap();
        clumpp::write_paramfile(&files, popmap.len(), num_reps).unwrap();
        clumpp::run_clumpp(&runner, "CLUMPP", &files).unwrap();
        let csvs = clumpp::convert_outputs_to_csv(&files, &popmap, num_reps).unwrap();
        assert_eq!(csvs.len(), num_reps + 1); // overall + one per replicate

        for csv in &csvs {
            let contents = fs::read_to_string(csv).unwrap();
            let rows: Vec<&str> = contents.lines().collect();
            assert_eq!(rows.len(), 6);
            assert!(rows[0].starts_with("ind1,reef_north,"));
            assert!(rows[5].starts_with("ind6,reef_south,"));
            for row in &rows {
                assert_eq!(row.split(',').count(), 2 + k as usize);
            }
        }
    }

    // With the fake membership pattern, K=2 has both clusters anchored by a
    // population (alternating individuals put 0.9 on each cluster within
    // both populations), while K=3 spreads every cluster too thin.
    let indices_k2 = estimate::estimate(&clumpp::ClumppFiles::new(&out_dir, 2), num_reps).unwrap();
    assert_eq!(indices_k2.med_mea_k, 2.0);
    assert_eq!(indices_k2.max_mea_k, 2.0);
    assert_eq!(indices_k2.med_med_k, 2.0);
    assert_eq!(indices_k2.max_med_k, 2.0);

    let indices_k3 = estimate::estimate(&clumpp::ClumppFiles::new(&out_dir, 3), num_reps).unwrap();
    assert_eq!(indices_k3.med_mea_k, 0.0);
    assert_eq!(indices_k3.max_mea_k, 0.0);
    assert_eq!(indices_k3.med_med_k, 0.0);
    assert_eq!(indices_k3.max_med_k, 0.0);

    // Idempotence of the terminal stage.
    let again = estimate::estimate(&clumpp::ClumppFiles::new(&out_dir, 2), num_reps).unwrap();
    assert_eq!(again, indices_k2);
}

#[test]
fn inference_failure_aborts_the_batch() {
    struct FailingRunner;
    impl ProgramRunner for FailingRunner {
        fn run(&self, program: &str, _: &[String], _: &Path, context: &str) -> Result<()> {
            Err(structure_mp::error::StructureMpError::ProcessFailed {
                program: program.to_string(),
                status: "exit status: 1".to_string(),
                context: context.to_string(),
            })
        }
    }

    let dir = tempdir().unwrap();
    let replicates = generate_replicates(dir.path(), "x", 3);
    let batches = batch::generate_batches(&replicates, 2);
    let err = batch::run_batches(&batches, "inference K=2", |rep: &Replicate| {
        structure::run_structure(&FailingRunner, "structure", rep, 2)
    })
    .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("inference K=2"));
    assert!(message.contains("structure exited with"));
}
