//! # CLI Module
//!
//! Command-line interface for the batch image pipeline.
//!
//! ## Usage
//! ```bash
//! # Sharpen three images and look for faces
//! photolab process a.jpg b.jpg c.jpg --filter sharpen --detect
//!
//! # Chain filters with parameters and save the results
//! photolab process *.png -f "gaussian_blur:kernel_size=7" -f canny --out-dir out/
//!
//! # JSON output
//! photolab process a.jpg --filter sobel --output json
//!
//! # Cache maintenance
//! photolab cache stats
//! photolab cache prune --max-entries 10000
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photolab::core::buffer::{ImageSource, PixelBuffer};
use photolab::core::cache::{CacheStats, CacheStore, EvictionPolicy, SqliteStore};
use photolab::core::pipeline::{BatchResult, Outcome, Pipeline};
use photolab::core::transform::{TransformCatalog, TransformRequest};
use photolab::error::{PhotolabError, Result};
use photolab::events::{BatchEvent, CacheEvent, Event, EventChannel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

/// Photolab - batch image filters with a persistent result cache
#[derive(Parser, Debug)]
#[command(name = "photolab")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a filter sequence over a batch of images
    Process {
        /// Images to process, in output order
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Filter to apply, as `name[:key=value,...]`; repeat to chain
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Run face detection after the last filter
        #[arg(short, long)]
        detect: bool,

        /// Worker threads (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Cache database path
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Do not read or write the cache
        #[arg(long, conflicts_with = "cache")]
        no_cache: bool,

        /// Write each result as PNG into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the available filters and their parameters
    Filters,

    /// Inspect or maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Cache database path
        #[arg(long = "cache", global = true)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Show entry count, size and age range
    Stats,
    /// Delete every entry
    Clear,
    /// Delete entries beyond a size or age limit
    Prune {
        /// Keep at most this many entries, newest first
        #[arg(long, conflicts_with = "max_age_days")]
        max_entries: Option<usize>,

        /// Delete entries older than this many days
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (one status line per image)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            images,
            filters,
            detect,
            workers,
            cache,
            no_cache,
            out_dir,
            output,
            verbose,
        } => {
            photolab::init_tracing(if verbose { "debug" } else { "warn" });
            run_process(ProcessArgs {
                images,
                filters,
                detect,
                workers,
                cache: if no_cache { None } else { Some(cache.unwrap_or_else(default_cache_path)) },
                out_dir,
                output,
                verbose,
            })
        }
        Commands::Filters => {
            print_filters();
            Ok(())
        }
        Commands::Cache { action, db } => {
            photolab::init_tracing("info");
            run_cache(action, &db.unwrap_or_else(default_cache_path))
        }
    }
}

fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photolab")
        .join("cache.db")
}

struct ProcessArgs {
    images: Vec<PathBuf>,
    filters: Vec<String>,
    detect: bool,
    workers: Option<usize>,
    /// `None` disables caching
    cache: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    output: OutputFormat,
    verbose: bool,
}

fn run_process(args: ProcessArgs) -> Result<()> {
    let term = Term::stderr();

    if matches!(args.output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Photolab").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let requests = args
        .filters
        .iter()
        .map(|f| f.parse::<TransformRequest>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut builder = Pipeline::builder().transforms(requests).detect(args.detect);
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    builder = match &args.cache {
        Some(path) => builder.cache(Arc::new(SqliteStore::open(path)?)),
        None => builder.no_cache(),
    };
    let pipeline = builder.build()?;

    let sources: Vec<ImageSource> = args.images.iter().cloned().map(ImageSource::from).collect();

    // Set up event handling
    let (sender, receiver) = EventChannel::new();

    // Progress bar for pretty output
    let progress = if matches!(args.output, OutputFormat::Pretty) {
        let pb = ProgressBar::new(sources.len() as u64);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(bar_style);
        Some(pb)
    } else {
        None
    };

    let progress_clone = progress.clone();
    let verbose = args.verbose;

    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Batch(BatchEvent::Progress(p)) => {
                    if let Some(ref pb) = progress_clone {
                        pb.set_position(p.completed as u64);
                        if verbose {
                            pb.set_message(file_name(&p.current));
                        }
                    }
                }
                Event::Cache(CacheEvent::Degraded { operation, reason }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.println(format!(
                            "{} cache unavailable during {}: {}",
                            style("!").yellow().bold(),
                            operation,
                            reason
                        ));
                    }
                }
                Event::Batch(BatchEvent::Completed { .. }) => {
                    if let Some(ref pb) = progress_clone {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
    });

    let result = pipeline.run_with_events(&sources, &sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let result = result?;

    let written = match &args.out_dir {
        Some(dir) => write_outputs(dir, &result)?,
        None => Vec::new(),
    };

    match args.output {
        OutputFormat::Pretty => print_pretty_results(&term, &result, &written, args.verbose),
        OutputFormat::Json => print_json_results(&result, &written),
        OutputFormat::Minimal => print_minimal_results(&result),
    }

    Ok(())
}

/// Save every successful result as `<index>-<stem>.png`
///
/// The index keeps outputs distinct when two inputs share a file name.
fn write_outputs(dir: &Path, result: &BatchResult) -> Result<Vec<Option<PathBuf>>> {
    std::fs::create_dir_all(dir).map_err(|e| PhotolabError::Output {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    result
        .results
        .iter()
        .map(|r| match &r.outcome {
            Outcome::Success(output) => {
                let stem = Path::new(&r.source)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".to_string());
                let path = dir.join(format!("{:04}-{}.png", r.ordinal, stem));
                save_png(&output.buffer, &path)?;
                Ok(Some(path))
            }
            Outcome::Failure(_) => Ok(None),
        })
        .collect()
}

fn save_png(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    buffer
        .to_dynamic()
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| PhotolabError::Output {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn print_pretty_results(term: &Term, result: &BatchResult, written: &[Option<PathBuf>], verbose: bool) {
    let summary = &result.summary;

    term.write_line("").ok();
    term.write_line(&format!("{} Batch Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} images processed in {:.1}s",
        style(summary.total_images).cyan(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} succeeded, {} failed",
        style(summary.succeeded).green(),
        if summary.failed > 0 {
            style(summary.failed).red()
        } else {
            style(summary.failed).dim()
        }
    ))
    .ok();
    term.write_line(&format!(
        "  {} cache hits, {} cache writes",
        style(summary.cache_hits).cyan(),
        style(summary.cache_writes).dim()
    ))
    .ok();
    if result.cache.degraded > 0 {
        term.write_line(&format!(
            "  {} cache errors ignored",
            style(result.cache.degraded).yellow()
        ))
        .ok();
    }
    term.write_line("").ok();

    for (i, r) in result.results.iter().enumerate() {
        match &r.outcome {
            Outcome::Success(output) => {
                let faces = match &output.findings {
                    Some(findings) if !findings.is_empty() => {
                        format!(" {}", style(format!("{} face(s)", findings.len())).yellow())
                    }
                    Some(_) => format!(" {}", style("no faces").dim()),
                    None => String::new(),
                };
                term.write_line(&format!(
                    "  {} {} {}x{}{}",
                    style("✓").green(),
                    display_path(&r.source),
                    output.buffer.width(),
                    output.buffer.height(),
                    faces
                ))
                .ok();
            }
            Outcome::Failure(failure) => {
                term.write_line(&format!(
                    "  {} {} {}",
                    style("✗").red(),
                    display_path(&r.source),
                    style(failure).red()
                ))
                .ok();
            }
        }

        if verbose {
            for step in &r.steps {
                term.write_line(&format!(
                    "      {} {}",
                    style(&step.operation).dim(),
                    style(step.cache).dim()
                ))
                .ok();
            }
            if let Some(Some(path)) = written.get(i) {
                term.write_line(&format!("      {} {}", style("→").dim(), path.display()))
                    .ok();
            }
        }
    }
}

fn print_json_results(result: &BatchResult, written: &[Option<PathBuf>]) {
    let output = serde_json::json!({
        "summary": result.summary,
        "cache": result.cache,
        "results": result.results.iter().enumerate().map(|(i, r)| {
            let mut entry = serde_json::json!({
                "ordinal": r.ordinal,
                "source": r.source,
                "steps": r.steps,
            });
            match &r.outcome {
                Outcome::Success(output) => {
                    entry["status"] = "success".into();
                    entry["width"] = output.buffer.width().into();
                    entry["height"] = output.buffer.height().into();
                    entry["faces_detected"] = output.faces_detected().into();
                    entry["findings"] = serde_json::json!(output.findings);
                    if let Some(Some(path)) = written.get(i) {
                        entry["output"] = path.display().to_string().into();
                    }
                }
                Outcome::Failure(failure) => {
                    entry["status"] = "failure".into();
                    entry["error"] = serde_json::json!(failure);
                }
            }
            entry
        }).collect::<Vec<_>>()
    });

    println!("{:#}", output);
}

fn print_minimal_results(result: &BatchResult) {
    for r in &result.results {
        match &r.outcome {
            Outcome::Success(_) => println!("ok\t{}", r.source),
            Outcome::Failure(failure) => println!("{}\t{}\t{}", failure.kind, failure.step, r.source),
        }
    }
}

fn print_filters() {
    let catalog = TransformCatalog::with_builtins();
    for name in catalog.names() {
        let Some(transform) = catalog.get(name) else {
            continue;
        };
        let params: Vec<String> = transform
            .schema()
            .iter()
            .map(|p| format!("{}={}", p.name, p.default))
            .collect();
        let note = if transform.is_deterministic() {
            String::new()
        } else {
            format!(" {}", style("(not cached)").dim())
        };
        if params.is_empty() {
            println!("{}{}", style(name).bold(), note);
        } else {
            println!("{} [{}]{}", style(name).bold(), params.join(", "), note);
        }
    }
}

fn run_cache(action: CacheAction, path: &Path) -> Result<()> {
    let term = Term::stdout();
    let store = SqliteStore::open(path)?;

    match action {
        CacheAction::Stats => print_stats(&term, path, &store.stats()?),
        CacheAction::Clear => {
            let before = store.stats()?.total_entries;
            store.clear()?;
            term.write_line(&format!(
                "{} Removed {} entries from {}",
                style("✓").green().bold(),
                before,
                path.display()
            ))
            .ok();
        }
        CacheAction::Prune {
            max_entries,
            max_age_days,
        } => {
            let policy = match (max_entries, max_age_days) {
                (Some(n), _) => EvictionPolicy::MaxEntries(n),
                (None, Some(days)) => EvictionPolicy::MaxAge(Duration::from_secs(days * 24 * 60 * 60)),
                (None, None) => EvictionPolicy::Never,
            };
            let removed = store.prune(&policy)?;
            term.write_line(&format!(
                "{} Pruned {} entries ({:?})",
                style("✓").green().bold(),
                removed,
                policy
            ))
            .ok();
        }
    }

    Ok(())
}

fn print_stats(term: &Term, path: &Path, stats: &CacheStats) {
    term.write_line(&format!("{}", style(path.display()).bold())).ok();
    term.write_line(&format!("  {} entries", style(stats.total_entries).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} stored",
        style(format_bytes(stats.total_size_bytes)).yellow()
    ))
    .ok();
    if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
        term.write_line(&format!(
            "  oldest {} ago, newest {} ago",
            format_age(oldest),
            format_age(newest)
        ))
        .ok();
    }
}

fn display_path(source: &str) -> String {
    let home = dirs::home_dir().unwrap_or_default();
    match Path::new(source).strip_prefix(&home) {
        Ok(rest) if home.as_os_str().len() > 1 => format!("~/{}", rest.display()),
        _ => source.to_string(),
    }
}

fn file_name(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

fn format_age(time: SystemTime) -> String {
    let secs = SystemTime::now()
        .duration_since(time)
        .unwrap_or_default()
        .as_secs();
    match secs {
        s if s >= 86_400 => format!("{}d", s / 86_400),
        s if s >= 3_600 => format!("{}h", s / 3_600),
        s if s >= 60 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
