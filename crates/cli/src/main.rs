//! Command-line interface for recursive archive extraction.
//!
//! Walks the given paths, groups multipart and cloaked archives, and
//! extracts everything (including archives inside archives) into an output
//! folder.

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use unravel::passwords::{default_password_files, PASSWORD_FILE_NAME};
use unravel::{
    CloakNormalizer, Codec, CodecKind, Engine, EngineConfig, NativeCodec, PasswordBook,
    ProgressCallback, RemovalMode,
};

const EXIT_USAGE: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    Native,
    #[value(name = "7z")]
    SevenZip,
}

#[derive(Parser)]
#[command(name = "unravel")]
#[command(version, about = "Extract nested, multipart and cloaked archives", long_about = None)]
struct Cli {
    /// Files or directories to process
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Only look at the top level of each directory
    #[arg(long)]
    no_recursive: bool,

    /// Output directory (default: `unzipped` under each input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Delete consumed archives instead of moving them to the recycle bin
    #[arg(long)]
    permanent_delete: bool,

    /// Trust file names only: no uncloaking, no signature sniffing
    #[arg(long)]
    strict: bool,

    /// Password to try before the password file (repeatable)
    #[arg(short, long = "password", value_name = "PW")]
    passwords: Vec<String>,

    /// Password file, one password per line
    #[arg(long = "passwords", value_name = "FILE")]
    password_file: Option<PathBuf>,

    /// Cloak rules JSON file (default: built-in rules)
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Engine config JSON file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Codec used to extract
    #[arg(long, value_enum)]
    codec: Option<CodecArg>,

    /// Path of the 7z executable for `--codec 7z`
    #[arg(long, value_name = "PATH")]
    seven_zip: Option<PathBuf>,

    /// Maximum archive nesting depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Show groups and planned renames without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(EXIT_USAGE);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let config = build_config(&cli)?;
    let normalizer = match &cli.rules {
        Some(path) => CloakNormalizer::load(path)?,
        None => CloakNormalizer::builtin()?,
    };
    for rule in normalizer.rules() {
        debug!("Cloak rule {} (priority {})", rule.name, rule.priority);
    }

    let mut inputs = Vec::with_capacity(cli.paths.len());
    for path in &cli.paths {
        let path = path
            .canonicalize()
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        inputs.push(path);
    }
    let mut passwords = load_passwords(&cli, &inputs[0])?;

    let spinner = if cli.json {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    };
    let progress: Arc<ProgressCallback> = {
        let spinner = spinner.clone();
        Arc::new(move |name: &str, _bytes: u64, _total: Option<u64>| {
            spinner.set_message(name.to_string());
            true
        })
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let codec: Box<dyn Codec> = match config.codec {
        CodecKind::Native => Box::new(
            NativeCodec::new(config.extract_options())
                .with_cancel_flag(cancel.clone())
                .with_progress(progress.clone()),
        ),
        CodecKind::SevenZip => config.build_codec(cancel.clone()),
    };

    let mut engine = Engine::new(&config, codec.as_ref(), &normalizer, &mut passwords)
        .with_cancel_flag(cancel.clone())
        .with_progress(progress);
    install_interrupt_handler(cancel, engine.cleanup_handle())?;

    let mut report = engine.run(&inputs);
    drop(engine);
    spinner.finish_and_clear();

    report.learned_passwords = passwords.learned().len();
    if !config.dry_run {
        if let Err(e) = passwords.save() {
            warn!("Could not save passwords: {}", e);
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(report.exit_code())
}

fn build_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(output) = &cli.output {
        config.output_dir = Some(absolute(output)?);
    }
    if cli.permanent_delete {
        config.removal = RemovalMode::Permanent;
    }
    if cli.strict {
        config.strict_detection = true;
    }
    if cli.no_recursive {
        config.recursive = false;
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(depth) = cli.max_depth {
        config.max_depth = depth;
    }
    if let Some(codec) = cli.codec {
        config.codec = match codec {
            CodecArg::Native => CodecKind::Native,
            CodecArg::SevenZip => CodecKind::SevenZip,
        };
    }
    if let Some(program) = &cli.seven_zip {
        config.seven_zip = Some(program.clone());
    }
    debug!("Config: {:?}", config);
    Ok(config)
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

/// Merges passwords in trial order: `--password` values, `--passwords`
/// file, then `passwords.txt` next to the input and in the working
/// directory.
fn load_passwords(cli: &Cli, first_input: &Path) -> std::io::Result<PasswordBook> {
    let mut book = PasswordBook::with_passwords(&cli.passwords);
    let root = if first_input.is_dir() {
        first_input
    } else {
        first_input.parent().unwrap_or(first_input)
    };

    let mut files = Vec::new();
    if let Some(file) = &cli.password_file {
        files.push(file.clone());
    }
    files.extend(default_password_files(root));
    for file in &files {
        book.add_file(file)?;
    }
    book.set_save_path(
        cli.password_file
            .clone()
            .unwrap_or_else(|| root.join(PASSWORD_FILE_NAME)),
    );
    Ok(book)
}

/// First Ctrl-C asks the engine to stop after the current step; a second
/// one removes temp data and exits.
fn install_interrupt_handler(
    cancel: Arc<AtomicBool>,
    cleanup: unravel::CleanupHandle,
) -> Result<(), ctrlc::Error> {
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            eprintln!("Interrupted, finishing the current step (press Ctrl-C again to quit)");
            cancel.store(true, Ordering::SeqCst);
        } else {
            let removed = cleanup.cleanup_all();
            eprintln!("Removed {} temp path(s)", removed);
            process::exit(EXIT_INTERRUPTED);
        }
    })
}
