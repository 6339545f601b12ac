use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use era5split::cli::{BatchArgs, Cli, Commands, SplitArgs};
use era5split::info::{inspect, print_file_info_human, print_file_info_json, print_file_info_yaml};
use era5split::input::FileConfig;
use era5split::log::{
    SummaryFormat, config_echo, init_logging, show_batch_summary, show_farewell_with_timing,
    show_greeting, show_split_summary,
};
use era5split::{process_batch_job, process_split_job};
use log::{error, info, warn};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return match write_completions(*shell, output.as_ref()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(1)
            }
        };
    }

    let file_config = match &cli.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(1);
            }
        },
        None => FileConfig::default(),
    };

    let log_dir = cli.log_dir.clone().or_else(|| file_config.log_dir.clone());
    match init_logging(cli.verbose, cli.quiet, log_dir.as_deref()) {
        Ok(Some(path)) => info!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(1);
        }
    }

    match run(&cli, &file_config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: &Cli, file_config: &FileConfig) -> Result<u8> {
    let format = SummaryFormat::from(cli.output_format);
    let chatty = !cli.quiet && format == SummaryFormat::Human;

    match &cli.command {
        Commands::Split(args) => run_split(args, file_config, format, chatty).await,
        Commands::Batch(args) => run_batch(args, file_config, format, chatty).await,
        Commands::Info {
            file,
            period,
            time_dim,
        } => {
            let period = period.resolve_optional(file_config, file)?;
            let info = inspect(file, time_dim.as_deref(), period)?;
            if let Some(axis) = &info.time_axis
                && !axis.is_consistent()
            {
                warn!("Time axis of {} has {} issue(s)", info.path, axis.issues.len());
            }
            match format {
                SummaryFormat::Human => print_file_info_human(&info),
                SummaryFormat::Json => print_file_info_json(&info)?,
                SummaryFormat::Yaml => print_file_info_yaml(&info)?,
            }
            Ok(0)
        }
        // handled before logging is set up
        Commands::Completions { .. } => Ok(0),
    }
}

async fn run_split(args: &SplitArgs, file_config: &FileConfig, format: SummaryFormat, chatty: bool) -> Result<u8> {
    let start_time = Instant::now();

    let input = args.input_path(file_config)?;
    let period = args.period.resolve(file_config, &input)?;
    let settings = args.extraction.resolve(file_config)?;

    if chatty {
        show_greeting(&format!("split {} ({})", input.display(), period.label()));
        config_echo(&settings);
    }

    let report = process_split_job(&input, period, &settings, chatty)
        .await
        .with_context(|| format!("Failed to split {}", input.display()))?;

    if chatty || format != SummaryFormat::Human {
        show_split_summary(&report, format)?;
    }
    if chatty {
        show_farewell_with_timing(start_time.elapsed(), report.error_count);
    }
    Ok(settings.policy.exit_status(report.error_count))
}

async fn run_batch(args: &BatchArgs, file_config: &FileConfig, format: SummaryFormat, chatty: bool) -> Result<u8> {
    let start_time = Instant::now();

    let range = args.range()?;
    let settings = args.extraction.resolve(file_config)?;

    if chatty {
        show_greeting(&format!(
            "batch {} ({} to {})",
            args.input_dir.display(),
            range.start().label(),
            range.end().label()
        ));
        config_echo(&settings);
    }

    let report = process_batch_job(
        args.input_dir.clone(),
        range,
        args.prefix(file_config),
        &settings,
        chatty,
    )
    .await
    .with_context(|| format!("Failed to split files in {}", args.input_dir.display()))?;

    if chatty || format != SummaryFormat::Human {
        show_batch_summary(&report, format)?;
    }
    if chatty {
        show_farewell_with_timing(start_time.elapsed(), report.failures());
    }
    Ok(settings.policy.exit_status(report.failures()))
}

fn write_completions(shell: clap_complete::Shell, output: Option<&PathBuf>) -> Result<()> {
    let mut command = Cli::command();
    match output {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            clap_complete::generate(shell, &mut command, "era5split", &mut file);
        }
        None => clap_complete::generate(shell, &mut command, "era5split", &mut io::stdout()),
    }
    Ok(())
}
