use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use promtune::app::run_play_command;
use promtune::audio::output::list_output_devices;
use promtune::cli::{Cli, Commands, ConfigAction};
use promtune::config::Config;
use promtune::pipeline::PlaybackSummary;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        None => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_cli_overrides(&mut config, &cli);

            let missing = config.missing_settings();
            if !missing.is_empty() {
                print_usage(&missing);
                return Ok(());
            }

            let summary = run_play_command(config, cli.quiet, cli.verbose).await?;
            if !cli.quiet {
                print_summary(&summary, cli.verbose);
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, &cli)?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "promtune",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path)?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    // Apply environment variable overrides
    Ok(config.with_env_overrides())
}

/// Command-line flags win over file and environment settings.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.prom_url {
        config.prometheus.url = Some(url.clone());
    }
    if let Some(track) = &cli.track {
        config.prometheus.query = Some(track.clone());
    }
    if let Some(offset) = cli.offset {
        config.range.offset = offset;
    }
    if let Some(chunk) = cli.chunk {
        config.range.chunk = chunk;
    }
    if let Some(start) = &cli.start_time {
        config.range.start_time = Some(start.clone());
    }
    if let Some(end) = &cli.end_time {
        config.range.end_time = Some(end.clone());
    }
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
}

/// Explain which required setting is missing, then show the flags.
fn print_usage(missing: &[&str]) {
    if missing.contains(&"prometheus.query") {
        eprintln!(
            "{}",
            "please set a query to play with --track (or prometheus.query)".yellow()
        );
    }
    if missing.contains(&"prometheus.url") {
        eprintln!(
            "{}",
            "please assign a Prometheus URL with --prom-url (or prometheus.url)".yellow()
        );
    }
    eprintln!();
    eprintln!("{}", Cli::command().render_help());
}

fn print_summary(summary: &PlaybackSummary, verbosity: u8) {
    eprintln!(
        "{} {} chunks played, {} skipped, {} samples",
        "Done.".green(),
        summary.chunks_queued,
        summary.chunks_skipped,
        summary.samples_read
    );
    if verbosity >= 1 {
        eprintln!(
            "  {} {}  {} {}  {} {}",
            "Queried:".dimmed(),
            summary.chunks_queried,
            "Consumed:".dimmed(),
            summary.sources_consumed,
            "Underruns:".dimmed(),
            summary.underruns
        );
    }
}

/// List available audio output devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Handle config inspection commands.
fn handle_config_command(action: &ConfigAction, cli: &Cli) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_cli_overrides(&mut config, cli);
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
