use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use kira_sra_blast::chunk::{FragmentSpec, QueryInput, chunk_query};
use kira_sra_blast::config::{ConfigLoader, ResolvedConfig};
use kira_sra_blast::domain::{BlastProgram, parse_accession_list};
use kira_sra_blast::error::KiraError;
use kira_sra_blast::extract::{FastqDumpExtractor, extract_all};
use kira_sra_blast::ncbi::{NcbiBlastClient, user_agent};
use kira_sra_blast::output::{JsonOutput, OutputMode, outcome_path, write_json_atomic};
use kira_sra_blast::pacing::{Clock, SystemClock};
use kira_sra_blast::poll::JobPoller;
use kira_sra_blast::resolver::AccessionResolver;
use kira_sra_blast::search::{SearchOptions, Searcher, UNIT_SPACING};
use kira_sra_blast::submit::WebDriverSubmitter;
use kira_sra_blast::webdriver::{BrowserOptions, WebDriver};

#[derive(Parser)]
#[command(name = "kira-sb")]
#[command(about = "Find SRA reads homologous to a query through NCBI SRA BLAST")]
#[command(version, author)]
struct Cli {
    /// Suppress progress lines on stderr.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Config file (default: ./kira-sb.json, then the user config directory).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search SRA experiments for reads matching a query")]
    Search(SearchArgs),
    #[command(about = "Resolve SRA accessions to experiments grouped by organism")]
    Resolve(ResolveArgs),
    #[command(about = "Show the FASTA batches a query would be submitted as")]
    Chunk(ChunkArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// FASTA file, or the query sequence itself.
    #[arg(long, short)]
    query: String,

    /// Comma-separated SRX/ERX/DRX or SRR/ERR/DRR accessions.
    #[arg(long, short)]
    sra: String,

    #[arg(long, short, value_enum, default_value_t)]
    program: BlastProgram,

    /// FRAGMENT,OVERLAP (default 70,20; 24,7 for tblastn/tblastx).
    #[arg(long)]
    cut: Option<String>,

    #[arg(long, default_value_t = 1000)]
    max_num_seq: u32,

    #[arg(long, default_value_t = 1e-3)]
    evalue: f64,

    #[arg(long)]
    word_size: Option<u32>,

    #[arg(long)]
    short_query: bool,

    /// Extra attempts per search unit.
    #[arg(long)]
    retry: Option<usize>,

    /// W3C WebDriver endpoint, e.g. http://127.0.0.1:9515.
    #[arg(long)]
    webdriver: Option<String>,

    /// Proxy for accession lookups and polling.
    #[arg(long)]
    proxy: Option<String>,

    /// Proxy handed to the browser.
    #[arg(long)]
    browser_proxy: Option<String>,

    /// Show the browser window instead of running headless.
    #[arg(long)]
    headed: bool,

    #[arg(long, short, default_value = ".")]
    outdir: String,

    /// Keep every retrieved report under <outdir>/reports.
    #[arg(long)]
    keep_reports: bool,

    /// Run fastq-dump for every hit range into <outdir>/reads.
    #[arg(long)]
    extract: bool,
}

#[derive(Args)]
struct ResolveArgs {
    #[arg(long, short)]
    sra: String,

    #[arg(long)]
    proxy: Option<String>,
}

#[derive(Args)]
struct ChunkArgs {
    #[arg(long, short)]
    query: String,

    #[arg(long)]
    cut: Option<String>,

    #[arg(long, short, value_enum, default_value_t)]
    program: BlastProgram,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidFragmentSpec(_)
        | KiraError::InvalidQuery(_)
        | KiraError::InvalidAccession(_)
        | KiraError::UnresolvableAccession(_)
        | KiraError::InvalidProgram(_)
        | KiraError::ConfigRead(_)
        | KiraError::ConfigParse(_) => 2,
        KiraError::LookupHttp(_)
        | KiraError::LookupStatus { .. }
        | KiraError::Submission(_)
        | KiraError::WebDriver(_)
        | KiraError::BlastHttp(_)
        | KiraError::BlastStatus { .. }
        | KiraError::SearchJobFailed { .. }
        | KiraError::PollStalled { .. }
        | KiraError::MalformedReport(_)
        | KiraError::SearchExhausted { .. } => 3,
        KiraError::MissingTool(_) | KiraError::Extraction(_) => 4,
        KiraError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(source) = &config.source {
        info!(path = %source.display(), "using config file");
    }

    match cli.command {
        Commands::Search(args) => run_search(args, &config, output_mode),
        Commands::Resolve(args) => run_resolve(args, &config),
        Commands::Chunk(args) => run_chunk(args),
    }
}

fn run_search(
    args: SearchArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let query = load_query(&args.query)?;
    let accessions = parse_accession_list(&args.sra)?;
    let fragment = parse_cut(args.cut.as_deref())?;
    let outdir = Utf8PathBuf::from(args.outdir);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let proxy = args.proxy.or_else(|| config.proxy.clone());
    let http = NcbiBlastClient::new(proxy.as_deref())?;
    let resolver = AccessionResolver::new(http.clone(), config.taxonomy(), clock.clone());

    let driver = WebDriver::new(args.webdriver.as_deref().unwrap_or(&config.webdriver))?;
    let browser = BrowserOptions {
        user_agent: user_agent(),
        proxy: args.browser_proxy.or_else(|| config.browser_proxy.clone()),
        headless: !args.headed,
    };
    let submitter = WebDriverSubmitter::new(driver, browser, clock.clone())
        .with_settle_delay(config.settle_delay);
    let poller = JobPoller::new(http, clock.clone());

    let options = SearchOptions {
        program: args.program,
        fragment,
        max_num_seq: args.max_num_seq,
        evalue: Some(args.evalue),
        word_size: args.word_size,
        short_query: args.short_query.then_some(true),
        retry: args.retry.unwrap_or(config.retry),
        unit_spacing: UNIT_SPACING,
        report_dir: args.keep_reports.then(|| outdir.join("reports")),
    };
    let searcher = Searcher::new(resolver, submitter, poller, clock, options);

    let sink = output_mode.sink();
    let outcome = searcher.run(&query, &accessions, sink.as_ref())?;

    let path = outcome_path(&outdir, &outcome.query_name);
    write_json_atomic(&path, &outcome)?;
    info!(path = %path, spots = outcome.spot_count(), "ranges written");
    JsonOutput::print_outcome(&outcome).into_diagnostic()?;

    if args.extract {
        let extractor = FastqDumpExtractor::new(config.fastq_dump.clone());
        if let Some(version) = extractor.tool_version() {
            info!(version = %version, "using fastq-dump");
        }
        let reads_dir = outdir.join("reads");
        let extracted = extract_all(
            &extractor,
            &outcome.ranges,
            reads_dir.as_std_path(),
            sink.as_ref(),
        )?;
        info!(files = extracted.len(), dir = %reads_dir, "reads extracted");
    }
    Ok(())
}

fn run_resolve(args: ResolveArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let accessions = parse_accession_list(&args.sra)?;
    let proxy = args.proxy.or_else(|| config.proxy.clone());
    let http = NcbiBlastClient::new(proxy.as_deref())?;
    let resolver = AccessionResolver::new(http, config.taxonomy(), Arc::new(SystemClock));
    let resolution = resolver.resolve(&accessions)?;
    JsonOutput::print_resolution(&resolution).into_diagnostic()?;
    Ok(())
}

fn run_chunk(args: ChunkArgs) -> miette::Result<()> {
    let query = load_query(&args.query)?;
    query.validate_alphabet()?;
    let spec = parse_cut(args.cut.as_deref())?
        .unwrap_or_else(|| FragmentSpec::for_program(args.program));
    let chunked = chunk_query(&query, spec, args.program)?;
    JsonOutput::print_batches(&chunked).into_diagnostic()?;
    Ok(())
}

/// A value naming an existing file is read as FASTA; anything else is the query itself.
fn load_query(value: &str) -> Result<QueryInput, KiraError> {
    let path = Path::new(value);
    if path.is_file() {
        let text = fs::read_to_string(path)
            .map_err(|err| KiraError::Filesystem(format!("{}: {err}", path.display())))?;
        return QueryInput::parse(&text);
    }
    QueryInput::parse(value)
}

fn parse_cut(value: Option<&str>) -> Result<Option<FragmentSpec>, KiraError> {
    value.map(str::parse::<FragmentSpec>).transpose()
}
