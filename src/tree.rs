// This file defines the weighted phylogenetic tree used by all of CladeSeek's subcommands: a
// Newick parser, leaf lookup, patristic distances and traversal.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashMap;
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;

use crate::misc::read_text_maybe_gzipped;


// Newick files from tree builders sometimes leave out branch lengths. Like most tree libraries,
// these are treated as unit-length branches.
pub const DEFAULT_BRANCH_LENGTH: f64 = 1.0;


#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree is empty")]
    Empty,

    #[error("unbalanced parentheses at position {0}")]
    UnbalancedParentheses(usize),

    #[error("leaf without a name at position {0}")]
    EmptyLeafName(usize),

    #[error("duplicate leaf name: {0}")]
    DuplicateLeafName(String),

    #[error("invalid branch length '{text}' at position {pos}")]
    InvalidBranchLength { text: String, pos: usize },

    #[error("unterminated quoted label starting at position {0}")]
    UnterminatedQuote(usize),

    #[error("unterminated comment starting at position {0}")]
    UnterminatedComment(usize),

    #[error("unexpected '{ch}' at position {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },

    #[error("unable to read {path}: {source}")]
    Io { path: String, source: std::io::Error },
}


#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub branch_length: f64,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl TreeNode {
    fn new(parent: Option<usize>) -> TreeNode {
        TreeNode {
            name: String::new(),
            branch_length: DEFAULT_BRANCH_LENGTH,
            parent,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    PreOrder,
    PostOrder,
}


// The tree owns all of its nodes in a single vector and nodes refer to each other by index. Once
// built, a tree is never modified, so it can be shared freely between threads.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    root: usize,
    leaves: Vec<usize>,
    leaf_index: FxHashMap<String, usize>,
    depths: Vec<usize>,
    pub clamped_branch_count: usize,
}


// What was found in a tree file, before any analysis. An absent tree or a tree file saying there
// were no hits is not an error: the caller writes a marker line instead of a result table.
#[derive(Debug)]
pub enum TreeInput {
    Absent,
    NoHits,
    Parsed(Tree),
}


pub fn load_tree_input(tree_file: &Path) -> Result<TreeInput, TreeError> {
    if !tree_file.is_file() {
        return Ok(TreeInput::Absent);
    }
    let text = read_text_maybe_gzipped(tree_file)
        .map_err(|e| TreeError::Io { path: tree_file.display().to_string(), source: e })?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(TreeInput::Absent);
    }
    if text.to_lowercase().contains("no hits") {
        return Ok(TreeInput::NoHits);
    }
    Ok(TreeInput::Parsed(Tree::from_newick(text)?))
}


impl Tree {
    pub fn from_newick(newick: &str) -> Result<Tree, TreeError> {
        NewickReader::new(newick).read()
    }

    fn from_nodes(nodes: Vec<TreeNode>, root: usize,
                  clamped_branch_count: usize) -> Result<Tree, TreeError> {
        let mut tree = Tree {
            nodes,
            root,
            leaves: Vec::new(),
            leaf_index: FxHashMap::default(),
            depths: Vec::new(),
            clamped_branch_count,
        };
        let mut depths = vec![0; tree.nodes.len()];
        let mut leaves = Vec::new();
        for id in tree.traverse(Order::PreOrder) {
            if let Some(parent) = tree.nodes[id].parent {
                depths[id] = depths[parent] + 1;
            }
            if tree.nodes[id].is_leaf() {
                leaves.push(id);
            }
        }
        for &id in &leaves {
            let name = &tree.nodes[id].name;
            if tree.leaf_index.insert(name.clone(), id).is_some() {
                return Err(TreeError::DuplicateLeafName(name.clone()));
            }
        }
        tree.depths = depths;
        tree.leaves = leaves;
        Ok(tree)
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, id: usize) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaves(&self) -> &[usize] {
        // Leaves are stored in pre-order, so this order is stable for a given Newick string.
        &self.leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.leaves.iter().map(|&id| self.nodes[id].name.as_str())
    }

    pub fn leaf_by_name(&self, name: &str) -> Option<usize> {
        self.leaf_index.get(name).copied()
    }

    pub fn name(&self, id: usize) -> &str {
        &self.nodes[id].name
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        // Patristic distance: climb from the deeper node until both paths reach the same depth,
        // then climb both together until they meet at their lowest common ancestor. The branch
        // lengths passed on the way are the two divergent segments of the path.
        let (mut a, mut b) = (a, b);
        let mut total = 0.0;
        while self.depths[a] > self.depths[b] {
            total += self.nodes[a].branch_length;
            a = self.parent_of(a);
        }
        while self.depths[b] > self.depths[a] {
            total += self.nodes[b].branch_length;
            b = self.parent_of(b);
        }
        while a != b {
            total += self.nodes[a].branch_length + self.nodes[b].branch_length;
            a = self.parent_of(a);
            b = self.parent_of(b);
        }
        total
    }

    pub fn distances_from(&self, start: usize) -> Vec<f64> {
        // Returns the distance from the start node to every node in the tree, indexed by node id.
        // This walks the tree once as an undirected graph, which is much faster than calling
        // distance for each leaf when every leaf is needed.
        let mut distances = vec![f64::NAN; self.nodes.len()];
        distances[start] = 0.0;
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id];
            if let Some(parent) = node.parent {
                if distances[parent].is_nan() {
                    distances[parent] = distances[id] + node.branch_length;
                    queue.push_back(parent);
                }
            }
            for &child in &node.children {
                if distances[child].is_nan() {
                    distances[child] = distances[id] + self.nodes[child].branch_length;
                    queue.push_back(child);
                }
            }
        }
        distances
    }

    pub fn traverse(&self, order: Order) -> Traversal<'_> {
        Traversal { tree: self, order, stack: vec![(self.root, false)] }
    }

    fn parent_of(&self, id: usize) -> usize {
        // Only called on nodes deeper than some other node, so a parent always exists.
        self.nodes[id].parent.unwrap_or(self.root)
    }
}


pub struct Traversal<'a> {
    tree: &'a Tree,
    order: Order,
    stack: Vec<(usize, bool)>,
}

impl Iterator for Traversal<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        // For post-order, each node is pushed twice: once to expand its children and once (with
        // the flag set) to be yielded after all of them.
        while let Some((id, expanded)) = self.stack.pop() {
            let children = &self.tree.nodes[id].children;
            match self.order {
                Order::PreOrder => {
                    self.stack.extend(children.iter().rev().map(|&c| (c, false)));
                    return Some(id);
                }
                Order::PostOrder => {
                    if expanded || children.is_empty() {
                        return Some(id);
                    }
                    self.stack.push((id, true));
                    self.stack.extend(children.iter().rev().map(|&c| (c, false)));
                }
            }
        }
        None
    }
}


struct NewickReader {
    chars: Vec<char>,
    pos: usize,
    nodes: Vec<TreeNode>,
    clamped_branch_count: usize,
}

impl NewickReader {
    fn new(newick: &str) -> NewickReader {
        NewickReader { chars: newick.chars().collect(), pos: 0, nodes: Vec::new(),
                       clamped_branch_count: 0 }
    }

    fn read(mut self) -> Result<Tree, TreeError> {
        // Iterative rather than recursive, so very deep (ladder-like) trees can't overflow the
        // stack. The open stack holds the internal nodes whose closing parenthesis hasn't been
        // seen yet.
        let mut open: Vec<usize> = Vec::new();
        let mut root: Option<usize> = None;
        let mut expect_node = true;
        loop {
            self.skip_whitespace_and_comments()?;
            let Some(c) = self.peek() else { break; };
            match c {
                '(' => {
                    if !expect_node { return Err(self.unexpected(c)); }
                    let id = self.add_node(open.last().copied(), &mut root)?;
                    open.push(id);
                    self.pos += 1;
                }
                ',' => {
                    if open.is_empty() { return Err(self.unexpected(c)); }
                    if expect_node { return Err(TreeError::EmptyLeafName(self.pos)); }
                    expect_node = true;
                    self.pos += 1;
                }
                ')' => {
                    if expect_node { return Err(TreeError::EmptyLeafName(self.pos)); }
                    let id = open.pop().ok_or(TreeError::UnbalancedParentheses(self.pos))?;
                    self.pos += 1;
                    let (name, length) = self.read_label_and_length()?;
                    self.nodes[id].name = name;
                    if let Some(length) = length { self.nodes[id].branch_length = length; }
                    expect_node = false;
                }
                ';' => {
                    if !open.is_empty() { return Err(TreeError::UnbalancedParentheses(self.pos)); }
                    self.pos += 1;
                    self.skip_whitespace_and_comments()?;
                    if let Some(c) = self.peek() { return Err(self.unexpected(c)); }
                    break;
                }
                _ => {
                    if !expect_node { return Err(self.unexpected(c)); }
                    let start = self.pos;
                    let id = self.add_node(open.last().copied(), &mut root)?;
                    let (name, length) = self.read_label_and_length()?;
                    if name.is_empty() { return Err(TreeError::EmptyLeafName(start)); }
                    self.nodes[id].name = name;
                    if let Some(length) = length { self.nodes[id].branch_length = length; }
                    expect_node = false;
                }
            }
        }
        if !open.is_empty() {
            return Err(TreeError::UnbalancedParentheses(self.pos));
        }
        match root {
            Some(root) => Tree::from_nodes(self.nodes, root, self.clamped_branch_count),
            None       => Err(TreeError::Empty),
        }
    }

    fn add_node(&mut self, parent: Option<usize>,
                root: &mut Option<usize>) -> Result<usize, TreeError> {
        let id = self.nodes.len();
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => {
                // A second parentless node means there is content after the complete tree.
                if root.is_some() {
                    return Err(self.unexpected(self.peek().unwrap_or(' ')));
                }
                *root = Some(id);
            }
        }
        self.nodes.push(TreeNode::new(parent));
        Ok(id)
    }

    fn read_label_and_length(&mut self) -> Result<(String, Option<f64>), TreeError> {
        self.skip_whitespace_and_comments()?;
        let name = if self.peek() == Some('\'') { self.read_quoted_label()? }
                                               else { self.read_unquoted_label() };
        self.skip_whitespace_and_comments()?;
        if self.peek() != Some(':') {
            return Ok((name, None));
        }
        self.pos += 1;
        self.skip_whitespace_and_comments()?;
        let start = self.pos;
        let text = self.read_unquoted_label();
        let length: f64 = text.parse()
            .map_err(|_| TreeError::InvalidBranchLength { text: text.clone(), pos: start })?;
        if !length.is_finite() {
            return Err(TreeError::InvalidBranchLength { text, pos: start });
        }
        if length < 0.0 {
            self.clamped_branch_count += 1;
            return Ok((name, Some(0.0)));
        }
        Ok((name, Some(length)))
    }

    fn read_unquoted_label(&mut self) -> String {
        let mut label = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ',' | ':' | ';' | '[' | '\'') {
                break;
            }
            label.push(c);
            self.pos += 1;
        }
        label
    }

    fn read_quoted_label(&mut self) -> Result<String, TreeError> {
        // Single-quoted labels may contain any character, and a doubled quote stands for one
        // literal quote.
        let start = self.pos;
        self.pos += 1;
        let mut label = String::new();
        loop {
            match self.peek() {
                None => return Err(TreeError::UnterminatedQuote(start)),
                Some('\'') => {
                    self.pos += 1;
                    if self.peek() == Some('\'') {
                        label.push('\'');
                        self.pos += 1;
                    } else {
                        return Ok(label);
                    }
                }
                Some(c) => {
                    label.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), TreeError> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '[' {
                let start = self.pos;
                while self.peek() != Some(']') {
                    if self.peek().is_none() { return Err(TreeError::UnterminatedComment(start)); }
                    self.pos += 1;
                }
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn unexpected(&self, ch: char) -> TreeError {
        if ch == ')' { return TreeError::UnbalancedParentheses(self.pos); }
        TreeError::UnexpectedCharacter { ch, pos: self.pos }
    }
}
