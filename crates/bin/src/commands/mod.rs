//! Subcommand implementations.

use treelike::{Node, state::LocalState};

pub mod get;
pub mod ls;
pub mod put;
pub mod watch;

/// The node at `path` below the local root; the root itself for `""`.
pub fn target(state: &LocalState, path: &str) -> Node {
    let path = path.trim_matches('/');
    if path.is_empty() {
        state.node().clone()
    } else {
        state.node().get(path)
    }
}
