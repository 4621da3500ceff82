//! Ls command - lists the direct children of a path.

use std::sync::{Arc, Mutex};

use treelike::{adapter::callback, state::LocalState};

use crate::{
    cli::PathArgs,
    output::{print_table, update_row},
};

pub async fn run(state: &LocalState, args: &PathArgs) -> Result<(), Box<dyn std::error::Error>> {
    let node = super::target(state, &args.path);

    // Local adapters report what they hold before `for_each` returns.
    let latest = Arc::new(Mutex::new(std::collections::BTreeMap::new()));
    let sink = latest.clone();
    let sub = node.for_each(
        callback(move |update, _| {
            if let Ok(mut latest) = sink.lock() {
                latest.insert(update.path.clone(), update);
            }
        }),
        1,
    );
    sub.unsubscribe();

    let rows: Vec<Vec<String>> = latest
        .lock()
        .map_err(|e| e.to_string())?
        .values()
        .map(update_row)
        .collect();
    if rows.is_empty() {
        eprintln!("{}: no children", node.path());
    }
    print_table(&["PATH", "VALUE", "UPDATED"], &rows);
    Ok(())
}
