//! Watch command - prints updates until Ctrl-C.

use treelike::{adapter::callback, state::LocalState};

use crate::{
    cli::WatchArgs,
    output::{stamp_cell, value_cell},
};

pub async fn run(state: &LocalState, args: &WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let node = super::target(state, &args.path);
    let sub = node.on(
        callback(|update, _| {
            println!(
                "{}\t{}\t{}",
                update.path,
                value_cell(&update),
                stamp_cell(&update)
            );
        }),
        false,
        args.depth.max(1),
    );

    println!("Watching {} (depth {}); press Ctrl+C to stop", node.path(), args.depth.max(1));
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping watch");
    sub.unsubscribe();
    Ok(())
}
