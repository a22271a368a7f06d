use std::sync::Arc;

use bell_lights::*;
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bell time (HH:MM), repeat for several bells; replaces the default schedule
    #[arg(short, long = "bell", value_name = "HH:MM", global = true)]
    bells: Vec<ScheduleEntry>,

    /// Number of light segments
    #[arg(short, long, default_value_t = 5, global = true)]
    segments: usize,

    /// File path or http(s) URL holding the clock offset in milliseconds
    #[arg(short, long, global = true)]
    offset_source: Option<String>,

    /// Clock offset in milliseconds, overrides --offset-source
    #[arg(long, allow_hyphen_values = true, global = true)]
    offset_ms: Option<i64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bell schedule; press Enter to start a manual run
    Run,
    /// Show the next bell and a sample plan for it
    Next,
    /// List the next occurrence of every bell
    Schedule,
    /// Start one manual run now, unless a bell is imminent
    Manual,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("bell_lights=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let mut config = SequenceConfig {
        segments: cli.segments,
        ..Default::default()
    };
    if !cli.bells.is_empty() {
        config.schedule = cli.bells;
    }

    let offset = match (cli.offset_ms, cli.offset_source) {
        (Some(millis), _) => TimeOffset::from_millis(millis),
        (None, Some(source)) => TimeOffset::load(&OffsetSource::parse(&source)).await,
        (None, None) => TimeOffset::ZERO,
    };

    let scheduler = BellScheduler::builder(config.clone(), offset)
        .renderer(TerminalStrip::new(config.segments))
        .status(LogStatus)
        .build()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&scheduler).await?,
        Commands::Next => show_next(&scheduler),
        Commands::Schedule => show_schedule(&scheduler),
        Commands::Manual => run_manual(&scheduler).await?,
    }

    Ok(())
}

/// Arms the schedule and serves manual starts from stdin until Ctrl-C
#[instrument(skip(scheduler))]
async fn run(scheduler: &Arc<BellScheduler>) -> Result<()> {
    info!(
        "Running {} bells with {} segments",
        scheduler.config().schedule.len(),
        scheduler.config().segments
    );
    scheduler.arm();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(input) if input.trim().is_empty() || input.trim() == "start" => {
                        match scheduler.manual_start() {
                            ManualStart::Started(plan) => debug!(
                                "Manual run, lights out {}ms after the last segment",
                                plan.lights_out_delay.as_millis()
                            ),
                            ManualStart::Busy => warn!("A run is already in progress"),
                            ManualStart::Blocked => {}
                        }
                    }
                    Some(other) => warn!("Unknown input '{}', press Enter to start", other.trim()),
                    // stdin closed, keep following the schedule
                    None => {
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    info!("Shutting down");
    scheduler.disarm();
    Ok(())
}

fn show_next(scheduler: &BellScheduler) {
    let Some(plan) = scheduler.preview() else {
        println!("No bells configured");
        return;
    };
    if let Some(target) = plan.target {
        println!("Next bell: {} ({})", format_time(&target), target.format("%a %Y-%m-%d"));
    }
    println!("Offset: {}ms", scheduler.offset().millis());
    println!(
        "Sample plan: start in {:.1}s, lights out {}ms after the last segment",
        plan.start_delay.as_secs_f64(),
        plan.lights_out_delay.as_millis()
    );
}

fn show_schedule(scheduler: &BellScheduler) {
    for (entry, at) in scheduler.upcoming() {
        println!("{entry}  {}  {}", format_time(&at), at.format("%a %Y-%m-%d"));
    }
}

/// Starts one manual run and waits for it to finish
#[instrument(skip(scheduler))]
async fn run_manual(scheduler: &Arc<BellScheduler>) -> Result<()> {
    let mut trigger = scheduler.subscribe_trigger();
    match scheduler.manual_start() {
        ManualStart::Started(_) => {
            // disabled at start, enabled again once the row is dark
            trigger.wait_for(|enabled| *enabled).await?;
            scheduler.disarm();
        }
        ManualStart::Blocked => println!("{}", Status::ManualBlocked),
        ManualStart::Busy => println!("A run is already in progress"),
    }
    Ok(())
}
