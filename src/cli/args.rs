use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nadseq-pipelines", version = "0.1.0")]
pub struct Arguments {

    #[arg(short, long, help = "Analysis module to run (e.g. trim, merge_counts, cluster)")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'i', long = "in-dir", help = "Directory holding the module's input files")]
    pub in_dir: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory. Defaults to the input directory where one is given, otherwise the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(long = "out-file", help = "Explicit output file for single-table modules (normalize_counts); overrides the derived name")]
    pub out_file: Option<String>,

    #[arg(long, help = "Genome annotation in 9-column GTF format")]
    pub gtf: Option<String>,

    #[arg(long, help = "Main counts table (CSV/TSV depending on module)")]
    pub counts: Option<String>,

    #[arg(long = "norm-file", help = "Per-timepoint read-depth CSV used to derive normalization factors")]
    pub norm_file: Option<String>,

    #[arg(long = "assigned-file", help = "Per-timepoint assigned-reads CSV (second normalization source)")]
    pub assigned_file: Option<String>,

    #[arg(long = "sampling-summary", help = "Sampling summary CSV (rows Sampling_1..Sampling_10)")]
    pub sampling_summary: Option<String>,

    #[arg(long = "gene-list", help = "CSV listing the genes of interest (Geneid column)")]
    pub gene_list: Option<String>,

    #[arg(long, help = "Substring filter applied to input file names")]
    pub pattern: Option<String>,

    #[arg(long = "deseq-script", default_value = "assets/deseq2_wald.R")]
    pub deseq_script: String,

    #[arg(long, default_value_t = 16, help = "Number of timepoint directories tp1..tpN")]
    pub timepoints: usize,

    #[arg(long, default_value_t = 8, help = "Number of barcodes bc01..bcNN")]
    pub barcodes: usize,

    #[arg(long = "n-clusters", default_value_t = 3)]
    pub n_clusters: usize,

    #[arg(long = "n-samplings", default_value_t = 10)]
    pub n_samplings: usize,

    #[clap(long, help = "Optional fixed seed for reproducibility; defaults to OS entropy")]
    pub seed: Option<u64>,

    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    #[arg(long = "min-insert-len", default_value_t = 18, help = "Reads shorter than this after trimming are counted as short")]
    pub min_insert_len: usize,

    #[arg(long = "first-base", default_value = "A", help = "Required first base of SEQ for filter_sam")]
    pub first_base: char,

    #[clap(
        long,
        value_delimiter = ',',
        default_value = "NC_000913.3,puc19C",
        help = "Comma-separated chromosome names plotted by plot_tss"
    )]
    pub chroms: Vec<String>,

    #[arg(long = "logo-format", default_value = "pdf")]
    pub logo_format: String,

    #[arg(long, default_value_t = 600)]
    pub dpi: u32,
}
