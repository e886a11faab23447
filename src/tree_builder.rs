//! Builds the organizational tree from normalized hierarchy rows.
//!
//! Every row is one full lineage (entity, branch, department, unit, position).
//! Rows that share a path prefix share the nodes for that prefix, so thousands
//! of rows collapse into a single tree per top-level entity.

use std::collections::HashMap;

use uuid::Uuid;

use crate::schema::NodeRecord;

/// Number of path segments in a hierarchy row.
pub const PATH_WIDTH: usize = 5;

/// A node created during construction. Indices refer into [`OrgTree`].
#[derive(Debug, Clone)]
pub struct BuiltNode {
    pub id: Uuid,
    pub name: String,
    pub parent: Option<usize>,
    children: Vec<usize>,
}

impl BuiltNode {
    /// Child indices in first-seen order.
    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// Arena of built nodes plus the roots in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct OrgTree {
    nodes: Vec<BuiltNode>,
    roots: Vec<usize>,
}

impl OrgTree {
    /// Build a tree from rows of path segments.
    ///
    /// Rows shorter than [`PATH_WIDTH`] are skipped; extra fields are ignored.
    /// Blank segments are skipped without extending the path, so a gap in the
    /// source attaches the next segment to the last non-blank one.
    pub fn build<R: AsRef<[String]>>(rows: impl IntoIterator<Item = R>) -> Self {
        let mut tree = Self::default();
        let mut by_prefix: HashMap<Vec<String>, usize> = HashMap::new();

        for row in rows {
            let row = row.as_ref();
            if row.len() < PATH_WIDTH {
                continue;
            }

            let mut prefix: Vec<String> = Vec::with_capacity(PATH_WIDTH);
            let mut parent: Option<usize> = None;

            for segment in &row[..PATH_WIDTH] {
                let name = segment.as_str();
                if name.trim().is_empty() {
                    continue;
                }
                prefix.push(name.to_string());

                if let Some(&existing) = by_prefix.get(&prefix) {
                    parent = Some(existing);
                    continue;
                }

                let idx = tree.push(name, parent);
                by_prefix.insert(prefix.clone(), idx);
                parent = Some(idx);
            }
        }

        tree
    }

    fn push(&mut self, name: &str, parent: Option<usize>) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(BuiltNode {
            id: Uuid::new_v4(),
            name: name.to_string(),
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(idx),
            None => self.roots.push(idx),
        }
        idx
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &BuiltNode {
        &self.nodes[idx]
    }

    /// Root indices in first-seen order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Find a direct child of `idx` by name.
    #[cfg(test)]
    pub fn child(&self, idx: usize, name: &str) -> Option<usize> {
        self.nodes[idx]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name == name)
    }

    /// Number of nodes in the subtree rooted at `idx`, including itself.
    pub fn subtree_len(&self, idx: usize) -> usize {
        1 + self.nodes[idx]
            .children
            .iter()
            .map(|&c| self.subtree_len(c))
            .sum::<usize>()
    }

    /// Flatten the subtree rooted at `root` into records, parents before
    /// children, so they can be inserted in order under a foreign key.
    pub fn records(&self, root: usize) -> Vec<NodeRecord> {
        let mut out = Vec::with_capacity(self.subtree_len(root));
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            out.push(NodeRecord {
                id: node.id,
                parent_id: node.parent.map(|p| self.nodes[p].id),
                name: node.name.clone(),
            });
            // Reverse so the first child is visited first.
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Indented outline of the whole tree, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.render_into(root, 0, &mut out);
        }
        out
    }

    fn render_into(&self, idx: usize, indent: usize, out: &mut String) {
        let node = &self.nodes[idx];
        out.push_str(&" ".repeat(indent));
        out.push_str("- ");
        out.push_str(&node.name);
        out.push('\n');
        for &child in node.children() {
            self.render_into(child, indent + 2, out);
        }
    }
}
