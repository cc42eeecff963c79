use clap::Parser;
use training::util::{run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    cli_support::init_logging();
    let args = TrainArgs::parse();
    let summary = run_train(args)?;
    log::info!(
        "finished after {} epochs (last loss {:.4}{})",
        summary.epochs_run,
        summary.last_loss,
        if summary.stopped_early { ", stopped early" } else { "" }
    );
    Ok(())
}
