use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use sora_watermark_removal::{
    content_type_for_path, default_output_name, is_supported_video, manual_fallback_instructions,
    CancelToken, EncodingSettings, Error, FfmpegEngine, Preset, ProgressObserver, RegionConfig,
    RemoteResolver, Session, Stage,
};

#[derive(Parser)]
#[command(
    name = "sora-watermark",
    about = "Remove Sora video watermarks by blanking a configurable region via ffmpeg",
    version,
    after_help = "Simple usage: sora-watermark <video.mp4>  (blank the bottom-right region)\n\n\
                  The input may also be a directory of videos, or a Sora share-page URL\n\
                  (https://sora.chatgpt.com/p/...), in which case the video is fetched first."
)]
struct Cli {
    /// Input video file, directory, or Sora share-page URL
    input: String,

    /// Output file or directory (default: {name}_no_watermark.mp4)
    #[arg(short, long)]
    output: Option<String>,

    /// Region corner preset: bottom-right, bottom-left, top-right, top-left
    #[arg(short, long)]
    corner: Option<String>,

    /// Region x anchor, percent of frame width (0-100)
    #[arg(short = 'x', long)]
    x: Option<u32>,

    /// Region y anchor, percent of frame height (0-100)
    #[arg(short = 'y', long)]
    y: Option<u32>,

    /// Region width in pixels
    #[arg(short = 'W', long)]
    width: Option<u32>,

    /// Region height in pixels
    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Constant rate factor for re-encoding (lower = higher quality)
    #[arg(long, default_value = "23")]
    crf: u8,

    /// Path to the ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: String,

    /// Path to the ffprobe binary
    #[arg(long, default_value = "ffprobe")]
    ffprobe: String,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Renders pipeline progress to stderr.
struct StderrProgress {
    quiet: bool,
}

impl ProgressObserver for StderrProgress {
    fn on_stage(&mut self, _stage: Stage) {}

    fn on_progress(&mut self, percent: u8, status: &str) {
        if !self.quiet {
            eprintln!("[{percent:>3}%] {status}");
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let region = match build_region(&cli) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let encoding = EncodingSettings {
        crf: cli.crf,
        ..EncodingSettings::default()
    };

    let ok = if cli.input.starts_with("https://") || cli.input.starts_with("http://") {
        run_remote(&cli, region, encoding)
    } else {
        let input_path = PathBuf::from(&cli.input);
        if !input_path.exists() {
            eprintln!("Error: Input path does not exist: {}", cli.input);
            process::exit(1);
        }
        if input_path.is_dir() {
            run_directory(&cli, &input_path, &region, &encoding)
        } else {
            run_local_file(&cli, &input_path, region, encoding)
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn build_region(cli: &Cli) -> Result<RegionConfig, Error> {
    let mut region = RegionConfig::default();
    if let Some(corner) = &cli.corner {
        region.apply_preset(corner.parse::<Preset>()?);
    }
    if let Some(x) = cli.x {
        region.set_x(x)?;
    }
    if let Some(y) = cli.y {
        region.set_y(y)?;
    }
    if let Some(width) = cli.width {
        region.set_width(width)?;
    }
    if let Some(height) = cli.height {
        region.set_height(height)?;
    }
    Ok(region)
}

fn make_engine(cli: &Cli, encoding: EncodingSettings) -> Result<FfmpegEngine, Error> {
    FfmpegEngine::new(&cli.ffmpeg, &cli.ffprobe, encoding)
}

/// Process one already-loaded source through a fresh session, writing the
/// result to `output_path`.
fn process_source(
    engine: &FfmpegEngine,
    region: &RegionConfig,
    name: &str,
    content_type: &str,
    data: Vec<u8>,
    output_path: &Path,
    quiet: bool,
) -> Result<(), Error> {
    let mut session = Session::new();
    session.accept_source(name, content_type, data)?;
    *session.region_mut() = region.clone();

    let mut progress = StderrProgress { quiet };
    session.process(engine, &mut progress, &CancelToken::new())?;

    let output = session
        .output()
        .unwrap_or_else(|| unreachable!("process succeeded"));
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, output.data())?;
    Ok(())
}

fn run_local_file(
    cli: &Cli,
    input_path: &Path,
    region: RegionConfig,
    encoding: EncodingSettings,
) -> bool {
    let Some(content_type) = content_type_for_path(input_path) else {
        eprintln!(
            "Error: Unsupported input format: {} (expected .mp4, .webm, or .mov)",
            input_path.display()
        );
        return false;
    };

    let data = match std::fs::read(input_path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: Failed to read {}: {e}", input_path.display());
            return false;
        }
    };

    let engine = match make_engine(cli, encoding) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            return false;
        }
    };
    let name = input_path
        .file_name()
        .map_or_else(|| cli.input.clone(), |f| f.to_string_lossy().into_owned());
    let output_path = cli.output.as_ref().map_or_else(
        || default_output_path_for(input_path, &name),
        PathBuf::from,
    );

    match process_source(
        &engine,
        &region,
        &name,
        content_type,
        data,
        &output_path,
        cli.quiet,
    ) {
        Ok(()) => {
            eprintln!("[OK] {name} -> {}", output_path.display());
            true
        }
        Err(e) => {
            eprintln!("[FAIL] {name}: {e}");
            false
        }
    }
}

fn run_directory(
    cli: &Cli,
    input_dir: &Path,
    region: &RegionConfig,
    encoding: &EncodingSettings,
) -> bool {
    use rayon::prelude::*;

    let Some(output_dir) = cli.output.as_ref().map(PathBuf::from) else {
        eprintln!("Error: Output directory is required for batch processing");
        eprintln!("Usage: sora-watermark <input_dir> -o <output_dir>");
        return false;
    };

    let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
        Ok(rd) => rd
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_supported_video(p))
            .collect(),
        Err(e) => {
            eprintln!("Error: Failed to read directory: {e}");
            return false;
        }
    };

    if entries.is_empty() {
        eprintln!("Error: No supported videos in {}", input_dir.display());
        return false;
    }

    if let Err(e) = std::fs::create_dir_all(&output_dir) {
        eprintln!("Error: Failed to create output directory: {e}");
        return false;
    }

    // Catch a bad --ffmpeg/--ffprobe configuration up front rather than
    // letting every file in the batch fail the same way.
    if let Err(e) = make_engine(cli, encoding.clone()) {
        eprintln!("Fatal: Failed to initialize engine: {e}");
        return false;
    }

    // One engine instance per file; a shared instance must never see two
    // concurrent removal runs.
    let results: Vec<(String, Result<(), Error>)> = entries
        .par_iter()
        .map(|input_path| {
            let name = input_path
                .file_name()
                .map_or_else(|| input_path.display().to_string(), |f| {
                    f.to_string_lossy().into_owned()
                });
            let result = (|| {
                let content_type = content_type_for_path(input_path).ok_or_else(|| {
                    Error::UnsupportedMediaType {
                        mime: "unknown".to_string(),
                    }
                })?;
                let data = std::fs::read(input_path)?;
                let engine = make_engine(cli, encoding.clone())?;
                let output_path = output_dir.join(default_output_name(&name));
                process_source(&engine, region, &name, content_type, data, &output_path, true)
            })();
            (name, result)
        })
        .collect();

    let mut success_count = 0u32;
    let mut fail_count = 0u32;
    for (name, result) in &results {
        match result {
            Ok(()) => {
                success_count += 1;
                if !cli.quiet {
                    eprintln!("[OK] {name}");
                }
            }
            Err(e) => {
                fail_count += 1;
                eprintln!("[FAIL] {name}: {e}");
            }
        }
    }

    if !cli.quiet {
        eprintln!();
        eprintln!(
            "[Summary] Processed: {success_count}, Failed: {fail_count} (Total: {})",
            results.len()
        );
    }

    fail_count == 0
}

fn run_remote(cli: &Cli, region: RegionConfig, encoding: EncodingSettings) -> bool {
    let resolver = match RemoteResolver::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            return false;
        }
    };

    if !cli.quiet {
        eprintln!("Fetching video from {}", cli.input);
    }

    let remote = match resolver.resolve(&cli.input) {
        Ok(r) => r,
        Err(e @ Error::DisallowedUrl { .. }) => {
            eprintln!("Error: {e}");
            return false;
        }
        Err(e @ (Error::Fetch(_) | Error::NoMediaUrl)) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("{}", manual_fallback_instructions(&cli.input));
            return false;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return false;
        }
    };

    let engine = match make_engine(cli, encoding) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            return false;
        }
    };
    let content_type =
        content_type_for_path(Path::new(&remote.name)).unwrap_or("video/mp4");
    let output_path = cli.output.as_ref().map_or_else(
        || PathBuf::from(default_output_name(&remote.name)),
        PathBuf::from,
    );

    match process_source(
        &engine,
        &region,
        &remote.name,
        content_type,
        remote.data,
        &output_path,
        cli.quiet,
    ) {
        Ok(()) => {
            eprintln!("[OK] {} -> {}", remote.name, output_path.display());
            true
        }
        Err(e) => {
            eprintln!("[FAIL] {}: {e}", remote.name);
            false
        }
    }
}

/// Default output path: alongside the input, named
/// `<stem>_no_watermark.mp4`.
fn default_output_path_for(input: &Path, name: &str) -> PathBuf {
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(default_output_name(name))
}
