use clap::Parser;
use log::*;

use buildbot::{Args, Result, command};

fn initialize_logger(debug: bool) -> Result<()> {
    let filter = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    let config = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("buildbot")
        .build();

    simplelog::TermLogger::init(
        filter,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli_args = Args::parse();

    initialize_logger(cli_args.debug)?;

    let summary = command::execute(&cli_args).await?;

    info!(
        "run complete: {} candidates, {} tested, {} skipped, {} publish failures",
        summary.candidates,
        summary.tested,
        summary.skipped,
        summary.publish_failures
    );

    Ok(())
}
