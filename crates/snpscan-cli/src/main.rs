use clap::Parser;
use snpscan_lib::{dispatcher, Database, IndexParams};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "snpscan")]
#[command(version = "0.2.0")]
#[command(about = "Ultra-fast SNP genotyping of sequencing reads against a k-mer database", long_about = None)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Canonical SNP k-mer database
    #[arg(short = 'd', value_name = "PATH")]
    database: PathBuf,

    /// Number of parallel workers
    #[arg(short = 't', value_name = "N", default_value_t = 1)]
    threads: usize,

    /// Output prefix; each input writes <PREFIX>.<channel>.tsv
    #[arg(short = 'o', value_name = "PREFIX", default_value = "./out")]
    out_prefix: String,

    /// L-mer prefix width in bits
    #[arg(short = 'l', value_name = "L", default_value_t = 30)]
    lmer_bits: u32,

    /// Bloom address width in bits
    #[arg(short = 'm', value_name = "M", default_value_t = 36)]
    bloom_bits: u32,

    /// Preload indices into RAM instead of memory-mapping them
    #[arg(short = 'p')]
    preload: bool,

    /// Print usage
    #[arg(short = 'h', short_alias = '?', action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Input FASTQ files
    #[arg(value_name = "FASTQ", required = true)]
    inputs: Vec<PathBuf>,
}

fn main() {
    // Initialize tracing on stderr: use RUST_LOG if set, otherwise info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Usage problems (including -h / -?) exit with code 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(1);
        }
    };

    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    info!("database: {}", cli.database.display());
    info!("workers: {}", cli.threads);
    info!("L-mer width: {}, bloom width: {}", cli.lmer_bits, cli.bloom_bits);

    let params = IndexParams::new(cli.lmer_bits, cli.bloom_bits)?;
    let db = Database::open(&cli.database, params, cli.preload)?;

    dispatcher::run(&db, &cli.inputs, &cli.out_prefix, cli.threads)?;
    info!("all inputs processed");
    Ok(())
}
