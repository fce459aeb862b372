//! Text rendering of process trees.

use crate::format::format_memory;
use crate::tree::{NodeId, ProcessTree};

pub const BRANCH: &str = "├── ";
pub const CORNER: &str = "└── ";
pub const CONTINUATION: &str = "│   ";
pub const PADDING: &str = "    ";

const HIGHLIGHT_START: &str = "\x1b[32m";
const HIGHLIGHT_END: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// No tree prefixes.
    pub flat: bool,
    /// Highlight the target line.
    pub color: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            flat: false,
            color: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    options: RenderOptions,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    /// One line per node, pre-order.
    pub fn render(&self, tree: &ProcessTree) -> Vec<String> {
        tree.preorder()
            .into_iter()
            .map(|id| self.render_line(tree, id))
            .collect()
    }

    fn render_line(&self, tree: &ProcessTree, id: NodeId) -> String {
        let node = tree.node(id);
        let record = &node.record;
        let lead = if self.options.flat {
            String::new()
        } else {
            prefix(tree, id)
        };
        let line = format!(
            "{}{} {:.1} {} {}",
            lead,
            record.pid,
            record.cpu_percent,
            format_memory(record.rss_kb()),
            record.command()
        );
        if node.is_target && self.options.color {
            format!("{HIGHLIGHT_START}{line}{HIGHLIGHT_END}")
        } else {
            line
        }
    }
}

/// Tree prefix for one node; empty for the root.
pub fn prefix(tree: &ProcessTree, id: NodeId) -> String {
    let path = tree.ancestry(id);
    let mut out = String::new();
    // path[0] is the root; every later element is the child of the one before.
    // Ancestors strictly between the root and the node decide the columns.
    for &step in path.iter().skip(1).take(path.len().saturating_sub(2)) {
        out.push_str(if tree.has_later_sibling(step) {
            CONTINUATION
        } else {
            PADDING
        });
    }
    if path.len() > 1 {
        out.push_str(if tree.has_later_sibling(id) { BRANCH } else { CORNER });
    }
    out
}
