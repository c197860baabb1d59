//! Hierarchical grouping of diff results by model type and category.
//!
//! Nodes live in an arena owned by [`DiffTree`]; [`NodeId`]s index into it.
//! The root and the per-type nodes are category nodes with an empty path.

use crate::models::{DiffResult, ModelType};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Identifies a category node. `model_type` is `None` only for the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryKey {
    pub model_type: Option<ModelType>,
    pub path: String,
}

impl CategoryKey {
    fn root() -> Self {
        Self {
            model_type: None,
            path: String::new(),
        }
    }

    /// Last path segment, or the type name for a type node.
    pub fn name(&self) -> &str {
        match (self.model_type, self.path.rsplit('/').next()) {
            (_, Some(segment)) if !segment.is_empty() => segment,
            (Some(t), _) => t.as_str(),
            (None, _) => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffContent {
    Category(CategoryKey),
    Model(DiffResult),
}

#[derive(Debug, Clone)]
pub struct DiffNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub content: DiffContent,
}

impl DiffNode {
    pub fn is_model_node(&self) -> bool {
        matches!(self.content, DiffContent::Model(_))
    }

    pub fn diff_result(&self) -> Option<&DiffResult> {
        match &self.content {
            DiffContent::Model(result) => Some(result),
            DiffContent::Category(_) => None,
        }
    }

    pub fn has_changed(&self) -> bool {
        self.diff_result().is_some_and(|r| !r.no_action())
    }

    pub fn name(&self) -> Cow<'_, str> {
        match &self.content {
            DiffContent::Category(key) => Cow::Borrowed(key.name()),
            DiffContent::Model(result) => result.change.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffTree {
    nodes: Vec<DiffNode>,
}

/// Result of building a tree. `Empty` means there is nothing to review.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Empty,
    Tree(DiffTree),
}

impl BuildOutcome {
    pub fn into_tree(self) -> Option<DiffTree> {
        match self {
            BuildOutcome::Empty => None,
            BuildOutcome::Tree(tree) => Some(tree),
        }
    }
}

impl DiffTree {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Node ids in depth-first order, the root first.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.get(id).children.iter().rev().copied());
        }
        order
    }

    pub fn model_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| self.get(*id).is_model_node())
            .collect()
    }

    /// The records at the leaves, in tree order.
    pub fn leaves(&self) -> Vec<&DiffResult> {
        self.model_nodes()
            .into_iter()
            .filter_map(|id| self.get(id).diff_result())
            .collect()
    }

    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.get(parent).parent;
        }
        depth
    }
}

#[derive(Debug, Default)]
pub struct DiffTreeBuilder;

impl DiffTreeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Groups records under type and category nodes in one pass over the input.
    ///
    /// Category nodes are only created on the way to a record, so none is
    /// left without a model node below it.
    pub fn build<I, R>(&self, records: I) -> BuildOutcome
    where
        I: IntoIterator<Item = R>,
        R: Into<DiffResult>,
    {
        let mut nodes = vec![DiffNode {
            parent: None,
            children: Vec::new(),
            content: DiffContent::Category(CategoryKey::root()),
        }];
        let mut categories: HashMap<CategoryKey, NodeId> = HashMap::new();
        categories.insert(CategoryKey::root(), NodeId(0));

        for record in records {
            let result: DiffResult = record.into();
            let parent = category_node(
                &mut nodes,
                &mut categories,
                result.model_type(),
                result.category(),
            );
            push_node(&mut nodes, parent, DiffContent::Model(result));
        }

        if nodes.len() == 1 {
            return BuildOutcome::Empty;
        }

        let mut tree = DiffTree { nodes };
        sort_children(&mut tree);
        debug!("Built diff tree with {} nodes", tree.len());
        BuildOutcome::Tree(tree)
    }
}

fn push_node(nodes: &mut Vec<DiffNode>, parent: NodeId, content: DiffContent) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(DiffNode {
        parent: Some(parent),
        children: Vec::new(),
        content,
    });
    nodes[parent.0].children.push(id);
    id
}

/// Finds or creates the node for `category` below the type node, creating
/// missing ancestors along the way.
fn category_node(
    nodes: &mut Vec<DiffNode>,
    categories: &mut HashMap<CategoryKey, NodeId>,
    model_type: ModelType,
    category: &str,
) -> NodeId {
    let full = CategoryKey {
        model_type: Some(model_type),
        path: category.to_string(),
    };
    if let Some(id) = categories.get(&full) {
        return *id;
    }

    let mut parent = NodeId(0);
    let mut prefix = String::new();
    let segments = std::iter::once("").chain(category.split('/').filter(|s| !s.is_empty()));
    for segment in segments {
        if !segment.is_empty() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
        }
        let key = CategoryKey {
            model_type: Some(model_type),
            path: prefix.clone(),
        };
        parent = match categories.get(&key) {
            Some(id) => *id,
            None => {
                let id = push_node(nodes, parent, DiffContent::Category(key.clone()));
                categories.insert(key, id);
                id
            }
        };
    }

    if full.path != prefix {
        categories.insert(full, parent);
    }
    parent
}

/// Type first, then categories before models, then name. `sort_by` is stable,
/// so ties keep insertion order.
fn sort_children(tree: &mut DiffTree) {
    for index in 0..tree.nodes.len() {
        let mut children = std::mem::take(&mut tree.nodes[index].children);
        children.sort_by(|a, b| sort_key(tree.get(*a)).cmp(&sort_key(tree.get(*b))));
        tree.nodes[index].children = children;
    }
}

fn sort_key(node: &DiffNode) -> (Option<ModelType>, u8, String) {
    match &node.content {
        DiffContent::Category(key) => (key.model_type, 0, key.name().to_lowercase()),
        DiffContent::Model(result) => (
            Some(result.model_type()),
            1,
            result.change.name().to_lowercase(),
        ),
    }
}
