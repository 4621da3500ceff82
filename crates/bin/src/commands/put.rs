//! Put command - writes a value.

use serde_json::Value;
use treelike::state::LocalState;

use crate::cli::PutArgs;

/// Parses `text` as JSON, falling back to a plain string.
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub async fn run(state: &LocalState, args: &PutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let node = super::target(state, &args.path);
    node.put(parse_value(&args.value)).await?;
    println!("{}", node.path());
    Ok(())
}
