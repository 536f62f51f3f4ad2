use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use glob::glob;
use log::{error, info, LevelFilter};
use pngframes::{DecodeOptions, DisposalTiming, Limits, Logger, OutputFormat, PngFrames, Writer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Ppm,
    Pam,
    Png,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Ppm => OutputFormat::Ppm,
            Format::Pam => OutputFormat::Pam,
            Format::Png => OutputFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Disposal {
    PreviousFrame,
    OwnFrame,
}

impl From<Disposal> for DisposalTiming {
    fn from(disposal: Disposal) -> Self {
        match disposal {
            Disposal::PreviousFrame => DisposalTiming::PreviousFrame,
            Disposal::OwnFrame => DisposalTiming::OwnFrame,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "pngframes")]
struct Cli {
    #[arg(required = true, help = "File or glob pattern")]
    path: String,

    #[arg(short, long, value_enum, default_value = "png", help = "Output format")]
    format: Format,

    #[arg(short = 'o', long = "output-dir", help = "Output directory for converted files")]
    output_dir: Option<String>,

    #[arg(long, value_enum, default_value = "previous-frame", help = "When dispose ops take effect")]
    disposal: Disposal,

    #[arg(long, help = "Print header and animation info")]
    info: bool,

    #[arg(long, help = "Decode the image without writing to a file")]
    void: bool,

    #[arg(long, help = "Reject images wider or taller than this")]
    max_dimension: Option<u32>,

    #[arg(short, long, action = clap::ArgAction::Count, help = "More output, repeat for debug logs")]
    verbose: u8,
}

fn get_files(path: &str) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let absolute_pattern = if Path::new(path).is_relative() {
        base_dir.join(path).to_string_lossy().into_owned()
    } else {
        path.to_string()
    };

    let mut files = Vec::new();

    for entry in glob(&absolute_pattern)? {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => error!("{}", e),
        }
    }

    Ok(files)
}

fn get_output_path(
    file: &Path,
    output_dir: Option<&str>,
    format: OutputFormat,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let file_stem = file
        .file_stem()
        .ok_or("Invalid file name")?
        .to_str()
        .ok_or("Invalid file stem")?;
    let file_name = format!("{}.{}", file_stem, format.extension());

    let output_path = match output_dir {
        Some(dir) => {
            let output_dir = Path::new(dir);

            if !output_dir.exists() {
                fs::create_dir_all(output_dir)?;
            }

            output_dir.join(file_name)
        }
        None => file.parent().unwrap_or_else(|| Path::new(".")).join(file_name),
    };

    Ok(output_path)
}

fn process_file(file: &Path, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("File: {}", file.display());

    let limits = Limits {
        max_image_width: cli.max_dimension,
        max_image_height: cli.max_dimension,
        ..Limits::default()
    };
    let reader = BufReader::new(File::open(file)?);
    let mut decoder = PngFrames::with_options(reader, DecodeOptions::default().with_limits(limits))?;

    let image = decoder.decode()?;

    if cli.info {
        if let Some(info) = decoder.info() {
            print!("{}", info);
        }
    }

    if cli.void {
        return Ok(());
    }

    let format = OutputFormat::from(cli.format);
    let output_path = get_output_path(file, cli.output_dir.as_deref(), format)?;

    for path in Writer::write_frames(&output_path, &image, format, cli.disposal.into())? {
        info!("Written to {}", path.display());
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = Logger::init(level) {
        eprintln!("Failed to install logger: {}", e);
    }

    let files = match get_files(&cli.path) {
        Ok(files) => files,
        Err(e) => {
            error!("Invalid path pattern: {}", e);
            std::process::exit(2);
        }
    };

    if files.is_empty() {
        error!("No files match {}", cli.path);
        std::process::exit(1);
    }

    let mut failed = 0;

    for file in &files {
        if let Err(e) = process_file(file, &cli) {
            error!("{}: {}", file.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
