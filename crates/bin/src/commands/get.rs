//! Get command - prints the value at a path.

use treelike::state::LocalState;

use crate::{
    cli::PathArgs,
    output::{stamp_cell, value_cell},
};

pub async fn run(state: &LocalState, args: &PathArgs) -> Result<(), Box<dyn std::error::Error>> {
    let node = super::target(state, &args.path);
    match node.once_update(true).await {
        Some(update) => println!("{}\t{}", value_cell(&update), stamp_cell(&update)),
        None => {
            eprintln!("{}: no value", node.path());
            std::process::exit(1);
        }
    }
    Ok(())
}
