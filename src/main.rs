// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::io::Write;
use std::path::PathBuf;

use lexicard::app_config::{self, Config};
use lexicard::file_utils::FileManager;
use lexicard::images::FetchMode;
use lexicard::{AppError, Controller, GenerationRequest};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a flashcard deck for a topic (default command)
    Generate(GenerateArgs),

    /// Generate shell completions for lexicard
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct GenerateArgs {
    /// Topic of the vocabulary deck (e.g. 'animals', 'kitchen')
    #[arg(short, long)]
    topic: Option<String>,

    /// Number of flashcards to generate
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Extra guidance for the generated terms (e.g. 'for beginners')
    #[arg(long)]
    context: Option<String>,

    /// Output directory, overrides the config
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// CSV file name, timestamped default when absent
    #[arg(short, long)]
    filename: Option<String>,

    /// Skip image search and download
    #[arg(long)]
    no_images: bool,

    /// Fetch images one at a time
    #[arg(long)]
    sequential: bool,

    /// Remove generated files older than DAYS before running
    #[arg(long, value_name = "DAYS")]
    cleanup: Option<u64>,

    /// Configuration file path
    #[arg(short, long, default_value = "lexicard.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Text-generation API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Image search API key
    #[arg(long, env = "IMAGE_API_KEY", hide_env_values = true)]
    image_api_key: Option<String>,
}

/// lexicard - English-Chinese vocabulary flashcards with AI
///
/// Generates topic-based vocabulary with pinyin and example sentences,
/// illustrates each card with an image and exports the deck as CSV.
#[derive(Parser, Debug)]
#[command(name = "lexicard")]
#[command(version)]
#[command(about = "AI-powered vocabulary flashcard generator")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "lexicard generates English-Chinese vocabulary flashcards for a topic using an AI provider and image search APIs.

EXAMPLES:
    lexicard -t animals                         # 10 cards about animals
    lexicard -t kitchen -n 25 -f kitchen.csv    # 25 cards into kitchen.csv
    lexicard -t travel --context 'for beginners' --no-images
    lexicard -t sports --sequential             # Fetch images one at a time
    lexicard -t food --cleanup 30               # Remove files older than 30 days first
    lexicard completions bash > lexicard.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in lexicard.json by default. You can specify a
    different config file with --config-path. If the config file doesn't exist,
    a default one will be created automatically. API keys can be given through
    GEMINI_API_KEY and IMAGE_API_KEY.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    generate: GenerateArgs,
}

/// Daily log file that log lines are mirrored to, once known
static LOG_FILE: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

// @struct: Custom logger implementation
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @mirrors: Log lines into <dir>/lexicard_<YYYYMMDD>.log
    fn mirror_to(dir: PathBuf) {
        let file = dir.join(format!("lexicard_{}.log", chrono::Local::now().format("%Y%m%d")));
        *LOG_FILE.write() = Some(file);
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now = chrono::Local::now().format("%H:%M:%S.%3f");
        let emoji = Self::get_emoji_for_level(record.level());
        let color = Self::get_color_for_level(record.level());

        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, emoji, record.args());

        if let Some(file) = LOG_FILE.read().as_ref() {
            let line = format!("[{}] {}", record.level(), record.args());
            // A failing mirror must not recurse into the logger
            let _ = FileManager::append_to_log_file(file, &line);
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config is loaded
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    let result = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "lexicard", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Generate(args)) => run_generate(args).await,
        None => run_generate(cli.generate).await,
    };

    if let Err(e) = result {
        let app_error = AppError::from(e);
        error!("{}", app_error);
        eprintln!("💡 {}", app_error.user_hint());
        std::process::exit(1);
    }
    Ok(())
}

async fn run_generate(options: GenerateArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.into());
    }

    let topic = options
        .topic
        .clone()
        .ok_or_else(|| anyhow!("--topic is required when no subcommand is specified"))?;

    let mut config = Config::load_or_create(&options.config_path)?;
    apply_overrides(&mut config, &options);

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.into());
    }

    if FileManager::ensure_dir(config.log_dir()).is_ok() {
        CustomLogger::mirror_to(config.log_dir());
    } else {
        warn!("Could not create log directory {:?}, logging to stderr only", config.log_dir());
    }

    let controller = Controller::with_config(config)?;

    if let Some(days) = options.cleanup {
        let stats = controller.cleanup(days)?;
        info!("Removed {} files older than {} days", stats.total(), days);
    }

    let request = GenerationRequest {
        topic,
        count: options.count,
        context: options.context.clone(),
        filename: options.filename.clone(),
    };
    controller.run(&request).await?;

    Ok(())
}

// Command line and environment take precedence over the config file
fn apply_overrides(config: &mut Config, options: &GenerateArgs) {
    if let Some(output) = &options.output {
        config.output_directory = output.clone();
    }
    if let Some(key) = options.api_key.as_ref().filter(|key| !key.trim().is_empty()) {
        config.provider.api_key = key.clone();
    }
    if let Some(key) = options.image_api_key.as_ref().filter(|key| !key.trim().is_empty()) {
        config.image_api_key = Some(key.clone());
    }
    if options.no_images {
        config.image_enabled = false;
    }
    if options.sequential {
        config.image_fetch_mode = FetchMode::Sequential;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}
