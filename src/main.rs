use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Confirm, MultiSelect};
use gifbatch::logging::{self, LogDestination};
use gifbatch::view::{self, ProgressBars};
use gifbatch::{
    collect_selection, media_type_for_path, unique_download_names, AppConfig, DirectoryTarget,
    DownloadOutcome, FfmpegEngine, SelectedFile, Session,
};
use indicatif::ProgressBar;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return AppConfig::from_file(path);
    }

    // Look for gifbatch.json/.toml in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("gifbatch");
        tried.push(d.join("gifbatch.json"));
        tried.push(d.join("gifbatch.toml"));
    }
    tried.push(PathBuf::from("gifbatch.json"));
    tried.push(PathBuf::from("gifbatch.toml"));

    for p in &tried {
        if p.exists() {
            return AppConfig::from_file(p);
        }
    }

    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Convert video files into palette-optimized animated GIFs.")]
struct Args {
    /// Input video files or directories of videos
    inputs: Vec<PathBuf>,

    /// Output directory for the generated GIFs
    #[arg(long, short, default_value = ".")]
    out: PathBuf,

    /// Output frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Output width in pixels (height keeps the aspect ratio)
    #[arg(long)]
    width: Option<u32>,

    /// Palette size (4-256)
    #[arg(long)]
    max_colors: Option<u16>,

    /// Bayer dither intensity (0-5)
    #[arg(long)]
    bayer_scale: Option<u8>,

    /// Use default quality preset
    #[arg(long, default_value_t = false, conflicts_with_all = &["small", "large"])]
    default: bool,

    /// Use the small preset (lower frame rate, width and palette)
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "large"])]
    small: bool,

    /// Use the large preset (higher frame rate and width)
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "small"])]
    large: bool,

    /// Config file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// ffmpeg executable to use
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Write a JSON report of the batch to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Print the tail of the engine log after converting
    #[arg(long, default_value_t = false)]
    log_details: bool,

    /// Also write diagnostics to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Verbose diagnostics
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Overwrite existing GIFs without asking
    #[arg(long, short, default_value_t = false)]
    yes: bool,
}

// Preset flags select a non-interactive run; `--yes` only skips the overwrite prompt.
fn is_interactive(args: &Args) -> bool {
    !(args.default || args.small || args.large)
}

fn preset_name<'a>(args: &Args, cfg: &'a AppConfig) -> &'a str {
    if args.default {
        "default"
    } else if args.small {
        "small"
    } else if args.large {
        "large"
    } else {
        cfg.default_preset.as_str()
    }
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    let is_interactive = is_interactive(&args);

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = match &args.log_file {
        Some(path) => LogDestination::Both(path.clone()),
        None => LogDestination::Terminal,
    };
    logging::initialize(destination, level);

    // Load config and decide preset
    let cfg = load_config(args.config.as_deref())?;
    let mut options = cfg.preset(preset_name(&args, &cfg))?.clone();
    if let Some(fps) = args.fps {
        options.fps = fps;
    }
    if let Some(width) = args.width {
        options.width = width;
    }
    if let Some(max_colors) = args.max_colors {
        options.max_colors = max_colors;
    }
    if let Some(bayer_scale) = args.bayer_scale {
        options.bayer_scale = bayer_scale;
    }
    options.validate().context("invalid conversion options")?;

    // --- Interactive Prompts ---
    if args.inputs.is_empty() {
        if !is_interactive {
            return Err(anyhow!("Input files must be provided when using a preset."));
        }
        let files = find_video_files();
        if files.is_empty() {
            return Err(anyhow!("No video files found in current directory."));
        }
        let chosen = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt("Choose videos to convert (space to toggle, enter to confirm)")
            .items(&files)
            .interact()?;
        if chosen.is_empty() {
            println!("Nothing selected.");
            return Ok(());
        }
        args.inputs = chosen.into_iter().map(|i| PathBuf::from(&files[i])).collect();
    }

    let selection = collect_selection(&args.inputs)?;

    // --- Engine ---
    let ffmpeg = args.ffmpeg.clone().unwrap_or_else(|| cfg.ffmpeg.clone());
    let mut session =
        Session::new(FfmpegEngine::new(ffmpeg), options).with_log_retention(cfg.log_retention);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Loading ffmpeg...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let loaded = session.load();
    spinner.finish_and_clear();
    loaded.context("loading the conversion engine")?;

    session.select_files(selection);
    if session.files().is_empty() {
        return Err(anyhow!("None of the selected files is a video."));
    }
    for line in view::render_file_list(session.files(), session.progress()) {
        println!("{}", line);
    }

    let existing = unique_download_names(session.files().iter().map(SelectedFile::name))
        .into_iter()
        .filter(|name| args.out.join(name).exists())
        .count();
    if existing > 0
        && is_interactive
        && !args.yes
        && !Confirm::new()
            .with_prompt(format!(
                "{} GIF(s) already exist in {}. Overwrite?",
                existing,
                args.out.display()
            ))
            .default(false)
            .interact()?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    // --- Execution ---
    let mut bars = ProgressBars::new(session.files());
    let converted = session.convert(&mut bars).map(|results| results.len());
    bars.finish();
    converted.context("converting")?;

    println!();
    for line in view::render_results(session.results().results()) {
        println!("{}", line);
    }

    let mut target = DirectoryTarget::new(&args.out);
    let outcomes = session.download_all(&mut target, cfg.download_delay());
    for (name, outcome) in session.results().download_names().iter().zip(&outcomes) {
        match outcome {
            DownloadOutcome::Saved(path) => println!("Saved {}", path.display()),
            DownloadOutcome::OpenedFallback => println!(
                "Could not save {}; opened it in the image viewer instead",
                name
            ),
            DownloadOutcome::Failed => eprintln!("Could not save {}", name),
        }
    }

    println!("\n{}", view::render_summary(session.progress()));

    if args.log_details || session.failed_count() > 0 {
        let tail = view::render_log_tail(session.logs(), cfg.log_display);
        if !tail.is_empty() {
            println!("\n--- Engine log (last {} lines) ---", tail.len());
            for line in tail {
                println!("{}", line);
            }
        }
    }

    if let Some(path) = &args.report {
        let report = session.report().with_downloads(&outcomes);
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
    }

    if session.failed_count() == session.files().len() {
        return Err(anyhow!(
            "All {} conversion(s) failed",
            session.files().len()
        ));
    }

    Ok(())
}

fn find_video_files() -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && media_type_for_path(e.path()).is_some_and(|t| t.starts_with("video/"))
        })
        .map(|e| e.path().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}
