use clap::{Parser, Subcommand};
use moss_harvest::checkpoint::{Checkpoint, default_checkpoint_path, load_checkpoint};
use moss_harvest::config::{Config, OutputFormat, load_config};
use moss_harvest::crawl::{
    CrawlOptions, CrawlReport, CrawlState, Crawler, Flusher, ScopeEstimator, join_flusher,
};
use moss_harvest::error::CrawlError;
use moss_harvest::http::RateLimitedClient;
use moss_harvest::logger::{self, LogLevel, StdoutLogger, init_logger};
use moss_harvest::scrapers::ecosystems::project_url;
use moss_harvest::scrapers::{EcosystemsSource, GithubHarvester, MentionsSource};
use moss_harvest::sink::build_sink;
use moss_harvest::utilities::thread_safe_queue::QueueConfig;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "moss-harvest")]
#[command(about = "Harvest paper/project mention graphs from ecosyste.ms", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl seed projects and the papers that mention them
    Crawl {
        /// Project URLs or ecosystem:name pairs (e.g. "pypi:keras")
        #[arg(required = true)]
        seeds: Vec<String>,
        /// Follow each paper's mentions to co-mentioned projects
        #[arg(long)]
        recurse: bool,
        #[arg(long)]
        workers: Option<usize>,
        /// Output formats (e.g. "csv,json,parquet")
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        format: Vec<OutputFormat>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Continue into co-mentioned projects without asking
        #[arg(short, long)]
        yes: bool,
        /// Maximum number of co-mentioned rounds
        #[arg(long, default_value_t = 1)]
        rounds: usize,
        /// Resume from the checkpoint of an earlier run with the same seeds
        #[arg(long)]
        resume: bool,
    },
    /// Print how many papers the given projects would pull in
    Estimate {
        #[arg(required = true)]
        seeds: Vec<String>,
    },
    /// Harvest a GitHub repository and its contributors
    Github {
        /// Repository as owner/name
        #[arg(long)]
        repo: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        config.log_level()?
    };
    init_logger(StdoutLogger::new(level));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logger::warn("Interrupted, finishing in-flight work and writing output...");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Commands::Crawl {
            seeds,
            recurse,
            workers,
            format,
            output_dir,
            yes,
            rounds,
            resume,
        } => {
            config.crawl.recurse_into_mentions |= recurse;
            if let Some(workers) = workers {
                config.crawl.worker_count = workers.max(1);
            }
            if !format.is_empty() {
                config.output.formats = format;
            }
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            run_crawl(config, seeds, yes, rounds, resume, cancel).await
        }
        Commands::Estimate { seeds } => run_estimate(config, seeds, cancel).await,
        Commands::Github { repo } => run_github(config, repo, cancel).await,
    };

    logger::flush();
    result
}

fn resolve_seeds(config: &Config, seeds: &[String]) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut urls = Vec::with_capacity(seeds.len());
    for seed in seeds {
        urls.push(project_url(&config.crawl.api_base_url, seed)?);
    }
    Ok(urls)
}

/// Ask a yes/no question; an interrupt while waiting counts as "no".
///
/// Stdin is read on a plain thread so a pending read neither holds a
/// runtime thread nor keeps the runtime from shutting down.
async fn confirm(question: &str, cancel: &CancellationToken) -> io::Result<bool> {
    print!("{} (y/n): ", question);
    io::stdout().flush()?;
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut answer = String::new();
        let read = io::stdin().lock().read_line(&mut answer).map(|_| answer);
        let _ = tx.send(read);
    });
    tokio::select! {
        _ = cancel.cancelled() => {
            println!();
            Ok(false)
        }
        answer = rx => {
            let answer = answer.map_err(io::Error::other)??;
            Ok(answer.trim().eq_ignore_ascii_case("y"))
        }
    }
}

fn print_report(report: &CrawlReport) {
    println!(
        "Projects: {} ok, {} failed, {} skipped. Papers: {} ok, {} failed, {} skipped.",
        report.projects_ok,
        report.projects_failed,
        report.projects_skipped,
        report.papers_ok,
        report.papers_failed,
        report.papers_skipped
    );
}

async fn run_crawl(
    config: Config,
    seeds: Vec<String>,
    yes: bool,
    rounds: usize,
    resume: bool,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let seeds = resolve_seeds(&config, &seeds)?;
    let client = RateLimitedClient::new(&config.http, None, cancel.clone())?;
    let source: Arc<dyn MentionsSource> = Arc::new(EcosystemsSource::new(
        client,
        config.crawl.mentions_per_page,
    ));
    let state = Arc::new(CrawlState::new(QueueConfig {
        max_queue_size: config.crawl.accumulator_capacity,
    }));

    let checkpoint_path = match (&config.crawl.checkpoint_path, resume) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(default_checkpoint_path(&seeds)),
        (None, false) => None,
    };
    let previous: Option<Checkpoint> = match (&checkpoint_path, resume) {
        (Some(path), true) => load_checkpoint(path)?,
        _ => None,
    };
    if let Some(cp) = &previous {
        logger::info(&format!(
            "Resuming: {} entities written, {} projects completed",
            cp.written_count(),
            cp.completed_projects.len()
        ));
        cp.restore_into(&state);
    }

    let producer = state.producer();
    let mut flusher = Flusher::new(
        Arc::clone(&state),
        build_sink(&config.output, previous.is_some())?,
        Duration::from_millis(config.crawl.polling_interval_ms),
    );
    if let Some(path) = checkpoint_path {
        flusher = flusher.with_checkpoint(path, seeds.clone(), previous.as_ref());
    }
    let flusher = flusher.spawn();

    let options = CrawlOptions::from(&config.crawl);
    let crawler = Crawler::new(Arc::clone(&source), Arc::clone(&state), options, cancel.clone());
    let mut report = crawler.process_all(&seeds).await;

    if options.recurse_into_mentions {
        let rounds_report = crawler
            .crawl_rounds(rounds, |round, estimate| {
                println!(
                    "Round {}: {} co-mentioned projects, about {:.1} mentions each, ~{} papers in total.",
                    round,
                    estimate.co_mentioned_count,
                    estimate.average_mentions_per_project,
                    estimate.total_estimate
                );
                let cancel = cancel.clone();
                async move {
                    if yes {
                        return Ok(true);
                    }
                    confirm("Continue into co-mentioned projects?", &cancel)
                        .await
                        .map_err(CrawlError::from)
                }
            })
            .await;
        match rounds_report {
            Ok(rounds_report) => report.merge(&rounds_report),
            Err(e) => logger::error(&format!("Stopped following co-mentioned projects: {}", e)),
        }
    }

    drop(producer);
    let summary = join_flusher(flusher).await?;
    print_report(&report);
    for file in &summary.files {
        println!("Wrote {}", file.display());
    }
    if report.cancelled {
        logger::warn("Crawl was interrupted; rerun with --resume to continue");
    }
    Ok(())
}

async fn run_estimate(
    config: Config,
    seeds: Vec<String>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let seeds = resolve_seeds(&config, &seeds)?;
    let client = RateLimitedClient::new(&config.http, None, cancel)?;
    let source: Arc<dyn MentionsSource> = Arc::new(EcosystemsSource::new(
        client,
        config.crawl.mentions_per_page,
    ));
    let estimator = ScopeEstimator::new(source, Arc::new(CrawlState::default()));
    let estimate = estimator.estimate(&seeds).await?;
    println!(
        "{} projects ({} counted), {:.1} mentions each on average, ~{} papers in total.",
        estimate.co_mentioned_count,
        estimate.counted,
        estimate.average_mentions_per_project,
        estimate.total_estimate
    );
    Ok(())
}

async fn run_github(
    config: Config,
    repo: String,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = config.github.require_token()?;
    let (owner, name) = GithubHarvester::parse_repo(&repo)?;
    let client = RateLimitedClient::new(&config.http, Some(token), cancel.clone())?;
    let openalex = RateLimitedClient::new(&config.http, None, cancel)?;
    let harvester = GithubHarvester::new(client, openalex, &config.github);

    let state = Arc::new(CrawlState::default());
    let producer = state.producer();
    let flusher = Flusher::new(
        Arc::clone(&state),
        build_sink(&config.output, false)?,
        Duration::from_millis(config.crawl.polling_interval_ms),
    )
    .spawn();

    let harvested = harvester.harvest_repository(owner, name, &state).await;
    drop(producer);
    let summary = join_flusher(flusher).await?;
    let harvested = harvested?;

    println!(
        "{}: {} contributors, {} other participants, {} persons written{}",
        repo,
        harvested.contributors_seen,
        harvested.participants_seen,
        harvested.persons_emitted,
        if harvested.partial { " (partial)" } else { "" }
    );
    match (&harvested.doi, harvested.paper_emitted) {
        (Some(doi), true) => println!("Paper {} cites {}", doi, repo),
        (Some(doi), false) => println!("DOI {} found but no new paper written", doi),
        (None, _) => println!("No DOI found for {}", repo),
    }
    for file in &summary.files {
        println!("Wrote {}", file.display());
    }
    Ok(())
}
