//! Directory tree built from the corpus key set, for display.
//!
//! Children are listed directories first, then files, each group in
//! lexicographic order.

use serde::Serialize;
use std::collections::BTreeMap;

/// A node of the derived directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    File,
    Dir { children: BTreeMap<String, TreeNode> },
}

impl TreeNode {
    fn empty_dir() -> Self {
        TreeNode::Dir {
            children: BTreeMap::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, TreeNode::File)
    }

    /// Children in display order: directories first, then files.
    pub fn sorted_children(&self) -> Vec<(&str, &TreeNode)> {
        match self {
            TreeNode::File => Vec::new(),
            TreeNode::Dir { children } => {
                let mut entries: Vec<(&str, &TreeNode)> =
                    children.iter().map(|(k, v)| (k.as_str(), v)).collect();
                // BTreeMap order is lexicographic; a stable sort keeps it within each kind.
                entries.sort_by_key(|(_, node)| node.is_file());
                entries
            }
        }
    }
}

/// Build the tree rooted at an unnamed directory.
///
/// A path that names both a file and a directory keeps the directory.
pub fn build_tree<'a, I>(paths: I) -> TreeNode
where
    I: IntoIterator<Item = &'a str>,
{
    let mut root = TreeNode::empty_dir();
    for path in paths {
        let parts: Vec<&str> = path.split('/').collect();
        let Some((file, dirs)) = parts.split_last() else {
            continue;
        };

        let mut node = &mut root;
        for dir in dirs {
            let TreeNode::Dir { children } = node else {
                unreachable!("walk only descends through directories");
            };
            let child = children
                .entry(dir.to_string())
                .or_insert_with(TreeNode::empty_dir);
            if child.is_file() {
                *child = TreeNode::empty_dir();
            }
            node = child;
        }

        if let TreeNode::Dir { children } = node {
            children.entry(file.to_string()).or_insert(TreeNode::File);
        }
    }
    root
}

/// Render the tree as indented text lines (`name/` for directories).
pub fn render_tree(root: &TreeNode) -> Vec<String> {
    let mut out = Vec::new();
    render_into(root, 0, &mut out);
    out
}

fn render_into(node: &TreeNode, depth: usize, out: &mut Vec<String>) {
    for (name, child) in node.sorted_children() {
        let indent = "  ".repeat(depth);
        if child.is_file() {
            out.push(format!("{}{}", indent, name));
        } else {
            out.push(format!("{}{}/", indent, name));
            render_into(child, depth + 1, out);
        }
    }
}
