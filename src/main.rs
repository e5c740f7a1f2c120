use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use quotecast::annotator::{AnnotatedChapter, Annotator, NoCapabilities, RawChapter, Roster};
use quotecast::config::load_config;
use quotecast::incremental::{annotation_path, needs_annotation, write_annotation, write_json_file};
use quotecast::pipeline::{annotate_book_parallel, ChapterStats, ChapterStatus, RunStats};
use quotecast::reader::{ChapterReader, ReaderConfig};

#[derive(Parser, Debug)]
#[command(name = "quotecast")]
#[command(about = "Speaker annotation for dialogue and thought in web-novel chapters")]
#[command(version)]
struct Args {
    /// Book JSON file, or a directory of chapter JSON files
    input: PathBuf,

    /// TOML configuration overriding the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving one annotation file per chapter
    #[arg(long, default_value = "annotations")]
    out_dir: PathBuf,

    /// Book roster output path (default: book_roster.json inside the out dir)
    #[arg(long)]
    roster_out: Option<PathBuf>,

    /// Stats output file path
    #[arg(long, default_value = "run_stats.json")]
    stats_out: PathBuf,

    /// Overwrite even complete annotation files
    #[arg(long)]
    overwrite_all: bool,

    /// Abort on first error
    #[arg(long)]
    fail_fast: bool,

    /// Annotate chapters one after another instead of fanning out segmentation
    #[arg(long)]
    sequential: bool,

    /// Suppress console progress bars
    #[arg(long)]
    no_progress: bool,
}

fn progress_bar(len: usize, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} {msg}")?
            .progress_chars("=> "),
    );
    Ok(bar)
}

/// Write one annotation unless a complete one is already on disk
async fn emit_chapter(args: &Args, chapter: &AnnotatedChapter) -> Result<ChapterStats> {
    let path = annotation_path(&args.out_dir, chapter.index);
    if !needs_annotation(&path, args.overwrite_all).await {
        info!("Skipping complete annotation {}", path.display());
        return Ok(ChapterStats::new(chapter, ChapterStatus::Skipped, None));
    }

    match write_annotation(&args.out_dir, chapter).await {
        Ok(_) => Ok(ChapterStats::new(chapter, ChapterStatus::Written, None)),
        Err(e) if args.fail_fast => Err(e),
        Err(e) => {
            warn!("Failed to write {}: {:#}", path.display(), e);
            Ok(ChapterStats::new(chapter, ChapterStatus::Failed, Some(format!("{e:#}"))))
        }
    }
}

async fn run_sequential(
    args: &Args,
    annotator: &Annotator,
    chapters: &[RawChapter],
    bar: &ProgressBar,
) -> Result<(Roster, Vec<ChapterStats>)> {
    let mut roster = Roster::new();
    let mut stats = Vec::with_capacity(chapters.len());
    for (index, raw) in chapters.iter().enumerate() {
        bar.set_message(raw.title.clone());
        let annotated = annotator.annotate_chapter(index, raw, &mut roster);
        stats.push(emit_chapter(args, &annotated).await?);
        bar.inc(1);
    }
    Ok((roster, stats))
}

async fn run_parallel(
    args: &Args,
    annotator: Arc<Annotator>,
    chapters: Vec<RawChapter>,
    bar: &ProgressBar,
) -> Result<(Roster, Vec<ChapterStats>)> {
    let book = annotate_book_parallel(annotator, chapters, num_cpus::get()).await?;
    let mut stats = Vec::with_capacity(book.chapters.len());
    for annotated in &book.chapters {
        bar.set_message(annotated.display_title.clone());
        stats.push(emit_chapter(args, annotated).await?);
        bar.inc(1);
    }
    Ok((book.roster, stats))
}

fn roster_path(args: &Args) -> PathBuf {
    args.roster_out
        .clone()
        .unwrap_or_else(|| args.out_dir.join("book_roster.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .json()
        .init();

    let args = Args::parse();

    info!("Starting quotecast");
    info!(?args, "Parsed CLI arguments");

    let run_start_utc = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let start_time = Instant::now();

    let config = load_config(args.config.as_deref())?;
    let annotator = Arc::new(Annotator::new(config, Arc::new(NoCapabilities))?);

    let reader = ChapterReader::new(ReaderConfig {
        fail_fast: args.fail_fast,
    });
    let chapters = reader.read_input(&args.input).await?;
    info!("Loaded {} chapters from {}", chapters.len(), args.input.display());

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", args.out_dir.display()))?;

    let bar = progress_bar(chapters.len(), args.no_progress)?;
    let (roster, chapter_stats) = if args.sequential {
        run_sequential(&args, &annotator, &chapters, &bar).await?
    } else {
        run_parallel(&args, Arc::clone(&annotator), chapters, &bar).await?
    };
    bar.finish_with_message("done");

    let roster_out = roster_path(&args);
    write_json_file(&roster_out, &roster).await?;

    let run_stats = RunStats::new(run_start_utc, start_time.elapsed(), roster.len(), chapter_stats);
    write_json_file(&args.stats_out, &run_stats).await?;

    info!(
        chapters = run_stats.chapters,
        written = run_stats.chapters_written,
        skipped = run_stats.chapters_skipped,
        failed = run_stats.chapters_failed,
        spans = run_stats.total_spans,
        unknown = run_stats.unknown_speakers,
        roster_entries = run_stats.roster_entries,
        chars_per_sec = run_stats.chars_per_sec,
        "Annotation run complete"
    );

    println!("quotecast v{} - annotation complete", env!("CARGO_PKG_VERSION"));
    println!(
        "Chapters: {} written, {} skipped, {} failed",
        run_stats.chapters_written, run_stats.chapters_skipped, run_stats.chapters_failed
    );
    println!(
        "Spans: {} ({} with unknown speaker)",
        run_stats.total_spans, run_stats.unknown_speakers
    );
    println!("Roster: {} characters -> {}", run_stats.roster_entries, roster_out.display());
    println!("Stats: {}", args.stats_out.display());

    Ok(())
}
