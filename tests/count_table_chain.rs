use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rayon::ThreadPoolBuilder;
use tempfile::tempdir;

use nadseq_pipelines::cli::Arguments;
use nadseq_pipelines::config::defs::{
    RunConfig, GENE_LIST_COUNTS_FILE, MERGED_COUNTS_FILE,
};
use nadseq_pipelines::pipelines::{gene_filter, merge_counts, normalize, sampling};
use nadseq_pipelines::utils::table::Table;

fn run_config(args: Arguments, out_dir: &Path) -> Arc<RunConfig> {
    let thread_pool = Arc::new(
        ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .expect("thread pool"),
    );
    Arc::new(RunConfig {
        cwd: out_dir.to_path_buf(),
        out_dir: out_dir.to_path_buf(),
        args,
        thread_pool,
    })
}

fn write_feature_counts(path: &Path, rows: &[(&str, u64)]) -> Result<()> {
    let mut text = String::from("# Program:featureCounts v2.0\n");
    text.push_str("Geneid\tChr\tStart\tEnd\tStrand\tLength\tcount\n");
    for (gene, count) in rows {
        text.push_str(&format!("{}\tchr\t1\t100\t+\t100\t{}\n", gene, count));
    }
    fs::write(path, text)?;
    Ok(())
}

/// Walks a directory tree of per-timepoint featureCounts tables through the
/// merge and gene-list filter stages and checks the tables that come out.
#[tokio::test]
async fn test_merge_then_filter_gene_counts() -> Result<()> {
    let dir = tempdir()?;
    let base = dir.path();

    for tp in ["tp1", "tp2"] {
        let tp_dir = base.join(tp);
        fs::create_dir_all(&tp_dir)?;
        write_feature_counts(&tp_dir.join("s_bc01_paired.table"), &[("nadA", 40), ("rrsA", 5)])?;
        write_feature_counts(&tp_dir.join("s_bc01_unpaired.table"), &[("nadA", 10)])?;
        write_feature_counts(&tp_dir.join("s_bc02_paired.table"), &[("nadA", 20), ("thrL", 8)])?;
        write_feature_counts(&tp_dir.join("s_bc02_unpaired.table"), &[("thrL", 2)])?;
    }

    let mut args = Arguments::default();
    args.in_dir = Some(base.to_string_lossy().into_owned());
    args.timepoints = 2;
    merge_counts::run(run_config(args, base)).await?;

    let merged = Table::read(&base.join("tp1").join(MERGED_COUNTS_FILE), b',')?;
    assert_eq!(merged.headers, vec!["Geneid", "bc01", "bc02"]);
    let nad_a = merged.rows.iter().find(|r| r[0] == "nadA").expect("nadA row");
    assert_eq!(nad_a[1], "50");
    assert_eq!(nad_a[2], "20");

    // Filter the merged tables down to the genes of interest
    let gene_list = base.join("genes.csv");
    fs::write(&gene_list, "Geneid,TimePoints\nnadA,[]\nthrL,[]\n")?;

    let mut args = Arguments::default();
    args.in_dir = Some(base.to_string_lossy().into_owned());
    args.gene_list = Some(gene_list.to_string_lossy().into_owned());
    args.timepoints = 2;
    gene_filter::filter_gene_counts_run(run_config(args, base)).await?;

    let filtered = Table::read(&base.join("tp2").join(GENE_LIST_COUNTS_FILE), b',')?;
    let genes: Vec<&str> = filtered.rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(genes, vec!["nadA", "thrL"]);
    Ok(())
}

/// Samples a summary table, then feeds the sampling summary into the
/// replicate normalization stage.
#[tokio::test]
async fn test_sampling_feeds_replicate_normalization() -> Result<()> {
    let dir = tempdir()?;
    let base = dir.path();

    let counts = base.join("common_genes_total_counts_summary.csv");
    let mut text = String::from("Geneid,tp1,tp2\n");
    for i in 0..9 {
        let value = 100 - i * 10;
        text.push_str(&format!("g{},{},{}\n", i, value, value));
    }
    fs::write(&counts, text)?;

    let mut args = Arguments::default();
    args.counts = Some(counts.to_string_lossy().into_owned());
    args.timepoints = 2;
    args.n_samplings = 2;
    args.seed = Some(7);
    sampling::run(run_config(args, base)).await?;

    let summary_path = base.join(sampling::SUMMARY_FILE);
    let summary = Table::read(&summary_path, b',')?;
    assert_eq!(summary.headers, vec!["Sampling", "tp1", "tp2", "SUM"]);
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.rows[0][0], "Sampling_1");
    assert!(base.join("common_genes_total_counts_summary_sampled_1.csv").is_file());

    // Replicate table plus the two per-timepoint depth files
    let main = base.join("common_genes_replicates.tsv");
    fs::write(
        &main,
        "gene_name\ttimepoint\tgene_biotype\t3PAB_rep1\t3PAB_rep2\t3PAB_rep3\t3PAB_rep4\n\
         nadA\t1\tprotein_coding\t10\t12\t14\t16\n\
         nadA\t2\tprotein_coding\t20\t24\t28\t32\n",
    )?;
    let depths = base.join("read_depths.csv");
    fs::write(&depths, "tp1,tp2\n1000,2000\n")?;
    let assigned = base.join("assigned_reads.csv");
    fs::write(&assigned, "tp1,tp2\n500,500\n")?;

    let mut args = Arguments::default();
    args.counts = Some(main.to_string_lossy().into_owned());
    args.norm_file = Some(depths.to_string_lossy().into_owned());
    args.assigned_file = Some(assigned.to_string_lossy().into_owned());
    args.sampling_summary = Some(summary_path.to_string_lossy().into_owned());
    args.timepoints = 2;
    normalize::normalize_replicates_run(run_config(args, base)).await?;

    let normalized = Table::read(&base.join("read_depth_normalized.tsv"), b'\t')?;
    // tp2 rows divided by the depth ratio 2000/1000
    assert_eq!(normalized.rows[0][3], "10");
    assert_eq!(normalized.rows[1][3], "10");

    // assigned depths are flat, so the assigned normalization changes nothing
    let assigned_norm = Table::read(&base.join("assigned_reads_normalized.tsv"), b'\t')?;
    assert_eq!(assigned_norm.rows[1][3], "20");

    for i in 1..=2 {
        assert!(base.join(format!("read_depth_common_genes_normalized_{}.tsv", i)).is_file());
        assert!(base.join(format!("assigned_read_common_genes_normalized_{}.tsv", i)).is_file());
    }
    Ok(())
}
