use std::{env, io::IsTerminal, path::PathBuf, time::Duration};

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use miette::IntoDiagnostic;
use scewin_utils::{Fetcher, RetryConfig};
use tracing_subscriber::{
    filter::LevelFilter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter,
};

use crate::pipeline;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "
Downloads the MSI Center package and unpacks the SCEWIN BIOS settings utility into the working directory.

The nested installers are unpacked with innoextract; when it is not on PATH the latest release is fetched automatically.
"
)]
pub struct Args {
    /// Directory the SCEWIN folder (and a downloaded innoextract) is placed
    /// in
    #[clap(long, default_value = ".")]
    output_dir: PathBuf,

    /// Total number of attempts for every download
    #[clap(long, default_value_t = 3)]
    max_retries: usize,

    /// Seconds to wait between download attempts
    #[clap(long, default_value_t = 5)]
    retry_delay: u64,

    /// Per-request timeout in seconds
    #[clap(long, default_value_t = 5)]
    timeout: u64,

    /// The verbosity level
    /// (-v for debug, -vv for trace, -q for quiet)
    #[command(flatten)]
    verbose: Verbosity,

    /// Whether the log needs to be colored.
    #[clap(long, default_value = "auto", env = "SCEWIN_DL_COLOR")]
    color: ColorOutput,
}

pub async fn execute() -> miette::Result<()> {
    let args = Args::parse();
    let use_colors = use_color_output(&args);

    // Set up the default miette handler based on whether we want colors or not.
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::default()
                .color(use_colors)
                .build(),
        )
    }))?;

    // Honor FORCE_COLOR and NO_COLOR environment variables.
    // Those take precedence over the CLI flag and SCEWIN_DL_COLOR
    let use_colors = match env::var("FORCE_COLOR") {
        Ok(_) => true,
        Err(_) => match env::var("NO_COLOR") {
            Ok(_) => false,
            Err(_) => use_colors,
        },
    };

    console::set_colors_enabled(use_colors);
    console::set_colors_enabled_stderr(use_colors);

    let (level_filter, crate_level) = match args.verbose.log_level_filter() {
        clap_verbosity_flag::LevelFilter::Off => (LevelFilter::OFF, LevelFilter::OFF),
        clap_verbosity_flag::LevelFilter::Error => (LevelFilter::ERROR, LevelFilter::INFO),
        clap_verbosity_flag::LevelFilter::Warn => (LevelFilter::WARN, LevelFilter::INFO),
        clap_verbosity_flag::LevelFilter::Info => (LevelFilter::INFO, LevelFilter::INFO),
        clap_verbosity_flag::LevelFilter::Debug => (LevelFilter::DEBUG, LevelFilter::DEBUG),
        clap_verbosity_flag::LevelFilter::Trace => (LevelFilter::TRACE, LevelFilter::TRACE),
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env()
        .into_diagnostic()?
        .add_directive(
            format!("scewin_dl={crate_level}")
                .parse()
                .into_diagnostic()?,
        )
        .add_directive(
            format!("scewin_utils={crate_level}")
                .parse()
                .into_diagnostic()?,
        );

    // Set up the tracing subscriber
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(use_colors)
        .with_writer(std::io::stderr)
        .without_time();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    // An interrupt aborts the whole run immediately; files under the temp
    // dir may be left behind.
    ctrlc::set_handler(|| std::process::exit(1)).into_diagnostic()?;

    let fetcher = Fetcher::new(RetryConfig {
        max_retries: args.max_retries,
        retry_delay: Duration::from_secs(args.retry_delay),
        timeout: Duration::from_secs(args.timeout),
    });

    let utility_dir = pipeline::run(&fetcher, &args.output_dir)
        .await
        .into_diagnostic()?;

    eprintln!(
        "{}SCEWIN is ready at {}",
        console::style(console::Emoji("✔ ", "")).green(),
        utility_dir.display()
    );

    Ok(())
}

/// Whether to use colored log format.
/// Option `Auto` enables color output only if the logging is done to a terminal
/// and  `NO_COLOR` environment variable is not set.
#[derive(clap::ValueEnum, Debug, Clone, Default)]
pub enum ColorOutput {
    Always,
    Never,

    #[default]
    Auto,
}

/// Returns true if the output is considered to be a terminal.
fn is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// Returns true if the log outputs should be colored or not.
fn use_color_output(args: &Args) -> bool {
    match args.color {
        ColorOutput::Always => true,
        ColorOutput::Never => false,
        ColorOutput::Auto => env::var_os("NO_COLOR").is_none() && is_terminal(),
    }
}
