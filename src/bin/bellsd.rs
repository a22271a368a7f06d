use bell_lights::*;
use color_eyre::eyre::Result;
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Get an optional offset source from command line arguments.
    let usage = "Usage: bellsd [offset file or url]";
    let args: Vec<_> = env::args().collect();
    if args.len() > 1 && (args[1] == "-h" || args[1] == "--help") {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    // stdout carries the protocol, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("bell_lights=info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    let offset = match args.get(1) {
        Some(source) => TimeOffset::load(&OffsetSource::parse(source)).await,
        None => TimeOffset::ZERO,
    };

    let config = SequenceConfig::default();
    let scheduler = BellScheduler::builder(config.clone(), offset)
        .renderer(LineRenderer::new(config.segments, std::io::stdout()))
        .status(LineStatus)
        .build()?;

    // Inform about successful initialization
    println!("OK");
    scheduler.arm();

    // Mainloop: wait for commands, line by line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(input) = lines.next_line().await? {
        match input.trim() {
            "start" => match scheduler.manual_start() {
                ManualStart::Started(_) => println!("OK"),
                ManualStart::Blocked => println!("ERR Auto run is imminent"),
                ManualStart::Busy => println!("ERR Run in progress"),
            },
            "next" => match scheduler.next_target() {
                Some(target) => println!("OK {}", target.to_rfc3339()),
                None => println!("ERR No bells configured"),
            },
            "state" => println!("OK {:?}", scheduler.state()),
            "quit" => break,
            "" => eprintln!("ERR No command given"),
            other => eprintln!("ERR Unknown command: {other}"),
        }
    }

    scheduler.disarm();
    println!("OK");
    Ok(())
}
