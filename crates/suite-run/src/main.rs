//! run-suite - schedule a dynamic suite and wait for its results

use anyhow::{Context, Result, bail};
use clap::Parser;
use dynamic_suite_core::config::{ConfigOverrides, SuiteConfig, resolve_config};
use dynamic_suite_core::control::{
    CatalogOptions, ComposedPredicate, ControlFileCatalog, ControlFileGetter, FileSystemGetter,
    Predicate, StaticGetter,
};
use dynamic_suite_core::jobqueue::{JsonRpcJobQueue, RetryingJobQueue};
use dynamic_suite_core::reporter::{
    BugTemplate, EmailReporter, LogChannel, NotificationChannel, ReportDirChannel,
};
use dynamic_suite_core::{JobId, JobQueue, StatusEntry, SuiteController, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Suite name used when tests are picked by name or attributes
const ADHOC_SUITE: &str = "adhoc_suite";

/// Schedule a dynamic suite and wait for its results
#[derive(Parser, Debug)]
#[command(name = "run-suite")]
#[command(about = "Schedule a dynamic suite of tests and wait for the results")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Suite to run, e.g. bvt-inline
    #[arg(long, value_name = "NAME")]
    suite: Option<String>,

    /// Board to run on, e.g. eve or board:eve
    #[arg(long, value_name = "BOARD")]
    board: Option<String>,

    /// Pool to run in, e.g. bvt or pool:bvt
    #[arg(long, value_name = "POOL")]
    pool: Option<String>,

    /// CrOS build to test, e.g. eve-release/R70-11000.0.0
    #[arg(long, value_name = "BUILD")]
    build: Option<String>,

    /// Run the tests whose name matches this regex instead of a named suite
    #[arg(long, value_name = "REGEX")]
    test_name: Option<String>,

    /// Run the tests whose ATTRIBUTES satisfy this expression
    #[arg(long, value_name = "EXPR")]
    attributes: Option<String>,

    /// Parent job of every child job
    #[arg(long, value_name = "ID")]
    suite_job_id: Option<u64>,

    /// Retry failed jobs within each test's JOB_RETRIES
    #[arg(long)]
    job_retry: bool,

    /// Suite-wide retry budget
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Schedule only; do not wait for results
    #[arg(long)]
    no_wait: bool,

    /// Print the tests that would be scheduled, in order, and exit
    #[arg(long)]
    list: bool,

    /// Print every suite found in the control files and exit
    #[arg(long)]
    list_suites: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn is_adhoc(&self) -> bool {
        self.test_name.is_some() || self.attributes.is_some()
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            suite: self.suite.clone(),
            board: self.board.clone(),
            pool: self.pool.clone(),
            build: self.build.clone(),
            job_retry: self.job_retry.then_some(true),
            max_retries: self.max_retries,
            wait_for_results: self.no_wait.then_some(false),
            config_path: self.config.clone(),
        }
    }

    /// Explicit name/attribute filters, or membership of `suite`
    fn predicate(&self, suite: Option<&str>) -> Result<ComposedPredicate> {
        let mut predicates = Vec::new();
        if let Some(pattern) = self.test_name.as_deref() {
            predicates.push(Predicate::test_name_matches(pattern).context("Invalid --test-name")?);
        }
        if let Some(expr) = self.attributes.as_deref() {
            predicates
                .push(Predicate::attribute_expression(expr).context("Invalid --attributes")?);
        }
        if predicates.is_empty() {
            if let Some(suite) = suite {
                predicates.push(Predicate::name_in_suite(suite));
            }
        }
        Ok(ComposedPredicate::new(predicates))
    }
}

fn build_catalog(config: &SuiteConfig) -> Result<ControlFileCatalog> {
    let section = &config.control_files;
    let getter: Arc<dyn ControlFileGetter> = match section.manifest.as_deref() {
        Some(manifest) => Arc::new(StaticGetter::from_manifest(manifest).with_context(|| {
            format!("Failed to load control file manifest {}", manifest.display())
        })?),
        None => Arc::new(
            FileSystemGetter::new(&section.base_dir, &section.test_dirs)
                .context("Failed to set up control file discovery")?,
        ),
    };
    let options: CatalogOptions = section.catalog_options();
    Ok(ControlFileCatalog::new(getter, options))
}

fn build_queue(config: &SuiteConfig) -> Result<Arc<dyn JobQueue>> {
    let section = &config.job_queue;
    let Some(server) = section.server.as_deref() else {
        bail!("No job queue server configured (set [job_queue] server or SUITE_JOB_QUEUE_SERVER)");
    };
    let client = JsonRpcJobQueue::new(server, Duration::from_secs(section.timeout_secs))
        .with_context(|| format!("Failed to create job queue client for {server}"))?;
    Ok(Arc::new(RetryingJobQueue::new(
        client,
        section.rpc_retries,
        Duration::from_secs(section.retry_delay_secs),
    )))
}

fn build_reporter(config: &SuiteConfig) -> Result<EmailReporter> {
    let template = BugTemplate::new(config.reporting.bug_template.clone())
        .context("Invalid [reporting] bug_template")?;
    let channel: Box<dyn NotificationChannel> = match config.reporting.report_dir.as_ref() {
        Some(dir) => Box::new(ReportDirChannel::new(dir)),
        None => Box::new(LogChannel),
    };
    Ok(EmailReporter::new(template, channel))
}

/// Cancel `token` on Ctrl+C or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            else {
                tracing::warn!("Failed to create SIGTERM handler");
                let _ = ctrl_c.await;
                token.cancel();
                return;
            };

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C)");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received Ctrl+C");
        }

        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    if args.verbose {
        logging::init_with_level(tracing::Level::DEBUG);
    } else {
        logging::init();
    }

    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;

    let mut config = resolve_config(&args.overrides(), &current_dir, &home_dir)
        .context("Failed to resolve configuration")?;
    if args.is_adhoc() && config.suite.name.is_none() {
        config.suite.name = Some(ADHOC_SUITE.to_string());
    }

    let catalog = build_catalog(&config)?;

    if args.list_suites {
        for suite in catalog.list_all_suites().context("Failed to list suites")? {
            println!("{suite}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let suite_name = config.suite.name.clone();
    let lookup = if args.is_adhoc() { None } else { suite_name.as_deref() };
    let predicate = args.predicate(suite_name.as_deref())?;

    if args.list {
        let tests = catalog
            .find_and_parse_tests(&predicate, lookup)
            .context("Failed to discover tests")?;
        for test in tests {
            println!("{:<8} {:<40} {}", test.time, test.name, test.path);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let options = config
        .suite_options(args.suite_job_id.map(JobId))
        .context("Incomplete suite configuration")?;
    let queue = build_queue(&config)?;
    info!("Scheduling suite {} on {} via {}", options.tag, options.board, queue.queue_name());

    let tests = catalog
        .find_and_parse_tests(&predicate, lookup)
        .context("Failed to discover tests")?;
    debug!("Discovered {} tests", tests.len());

    let cancel_token = CancellationToken::new();
    spawn_signal_handler(cancel_token.clone());

    let mut controller = SuiteController::new(queue, tests, options)
        .context("Failed to create suite")?
        .with_cancellation(cancel_token);
    if config.reporting.file_bugs {
        controller = controller.with_reporter(Box::new(build_reporter(&config)?));
    }

    let summary = tokio::task::spawn_blocking(move || {
        let mut print_entry = |entry: StatusEntry| println!("{entry}");
        controller.run(&mut print_entry)
    })
    .await
    .context("Suite task failed")?
    .context("Suite run failed")?;

    print!("{summary}");
    Ok(summary.return_code().into())
}
