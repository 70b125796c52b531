use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

use disclosure_harvester::app::{App, ProgressSink, Source};
use disclosure_harvester::config::{ConfigLoader, ConfigOverrides};
use disclosure_harvester::error::HarvestError;
use disclosure_harvester::http::HttpFetcher;
use disclosure_harvester::logging;
use disclosure_harvester::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "disclosure-harvester")]
#[command(about = "Harvest files from a paginated disclosure portal or a CSV of direct links")]
#[command(version, author)]
struct Cli {
    /// JSON config file (defaults to ./harvest.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    logs_dir: Option<Utf8PathBuf>,

    /// Group numbers to process (default: every group available)
    #[arg(long, global = true, num_args = 1..)]
    groups: Option<Vec<u32>>,

    /// Only collect metadata, don't download files
    #[arg(long, global = true)]
    no_download: bool,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Crawl the portal's landing page and group listings")]
    Web,
    #[command(about = "Download files listed in a data_set,url,link_text CSV")]
    Csv { file: PathBuf },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::NoGroupsFound(_)
        | HarvestError::CsvRead { .. }
        | HarvestError::CsvMissingColumns { .. } => 2,
        HarvestError::LandingPageUnavailable { .. }
        | HarvestError::Http { .. }
        | HarvestError::HttpStatus { .. }
        | HarvestError::FetchExhausted { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        output_root: cli.output_dir,
        logs_root: cli.logs_dir,
        groups: cli.groups,
        download_files: cli.no_download.then_some(false),
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), &overrides)?;

    let (source, log_prefix) = match cli.command {
        Command::Web => (Source::Web, "scraper"),
        Command::Csv { file } => (Source::Csv(file), "csv_downloader"),
    };
    let (_guard, _log_path) = logging::init(&config.logs_root, log_prefix)?;

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let fetcher = HttpFetcher::new(&config)?;
    let app = App::new(config, fetcher)?;
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Console => &ConsoleOutput,
    };
    let result = app.run(&source, sink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&result.summary).into_diagnostic()?,
        OutputMode::Console => ConsoleOutput::print_summary(&result.summary),
    }
    Ok(())
}
