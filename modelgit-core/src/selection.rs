use crate::diff_tree::{DiffContent, DiffTree, NodeId};
use crate::models::{Change, DiffType, SelectionSpec, TypeRefIdSet};
use std::collections::HashSet;

/// Checked model nodes of a diff tree.
///
/// Nodes without an action are never selected. With `lock_new_elements`,
/// added entities are always selected and cannot be unchecked.
pub struct SelectionModel<'t> {
    tree: &'t DiffTree,
    lock_new_elements: bool,
    selected: Vec<NodeId>,
    index: HashSet<NodeId>,
}

impl<'t> SelectionModel<'t> {
    pub fn new(tree: &'t DiffTree, lock_new_elements: bool) -> Self {
        let mut model = Self {
            tree,
            lock_new_elements,
            selected: Vec::new(),
            index: HashSet::new(),
        };
        model.initialize(&SelectionSpec::Explicit(TypeRefIdSet::new()));
        model
    }

    pub fn tree(&self) -> &'t DiffTree {
        self.tree
    }

    /// Replaces the selection with the nodes matching `spec` and returns the
    /// category nodes to expand so that every selected node is visible: each
    /// selected node's ancestors below the root, nearest first, each once.
    pub fn initialize(&mut self, spec: &SelectionSpec) -> Vec<NodeId> {
        self.selected.clear();
        self.index.clear();

        let tree = self.tree;
        let root = tree.root();
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();
        for id in tree.model_nodes() {
            let node = tree.get(id);
            let Some(result) = node.diff_result() else {
                continue;
            };
            if result.no_action() {
                continue;
            }
            let wanted = spec.contains(result.model_type(), result.ref_id())
                || self.is_locked(id);
            if !wanted {
                continue;
            }

            self.insert(id);
            let mut ancestor = node.parent;
            while let Some(category) = ancestor.filter(|a| *a != root) {
                if !seen.insert(category) {
                    break;
                }
                expanded.push(category);
                ancestor = tree.get(category).parent;
            }
        }
        expanded
    }

    pub fn select_all(&mut self) -> Vec<NodeId> {
        self.initialize(&SelectionSpec::All)
    }

    /// Applies a checkbox event and returns the resulting checked state.
    pub fn toggle(&mut self, id: NodeId, value: bool) -> bool {
        let actionable = match &self.tree.get(id).content {
            DiffContent::Model(result) => !result.no_action(),
            DiffContent::Category(_) => false,
        };

        if !actionable {
            return false;
        }
        if value {
            self.insert(id);
            return true;
        }
        if self.is_locked(id) {
            return true;
        }
        self.remove(id);
        false
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.index.contains(&id)
    }

    /// Whether unchecking the node would be refused.
    pub fn is_locked(&self, id: NodeId) -> bool {
        self.lock_new_elements
            && self
                .tree
                .get(id)
                .diff_result()
                .is_some_and(|r| r.left_diff_type == Some(DiffType::Added))
    }

    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn has_selection(&self) -> bool {
        !self.selected.is_empty()
    }

    pub fn selected_changes(&self) -> Vec<Change> {
        self.selected
            .iter()
            .filter_map(|id| self.tree.get(*id).diff_result())
            .map(|r| r.change.clone())
            .collect()
    }

    pub fn selection_set(&self) -> TypeRefIdSet {
        self.selected
            .iter()
            .filter_map(|id| self.tree.get(*id).diff_result())
            .map(|r| r.change.key())
            .collect()
    }

    fn insert(&mut self, id: NodeId) {
        if self.index.insert(id) {
            self.selected.push(id);
        }
    }

    fn remove(&mut self, id: NodeId) {
        if self.index.remove(&id) {
            self.selected.retain(|s| *s != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff_tree::DiffTreeBuilder;
    use crate::models::ModelType;

    fn tree() -> DiffTree {
        let changes = vec![
            Change::new(ModelType::Flow, "added", "air/Added", DiffType::Added),
            Change::new(ModelType::Flow, "modified", "air/Modified", DiffType::Modified),
            Change::new(ModelType::Flow, "deleted", "water/Deleted", DiffType::Deleted),
            Change::new(ModelType::Flow, "same", "water/Same", DiffType::NoChange),
        ];
        DiffTreeBuilder::new().build(changes).into_tree().unwrap()
    }

    fn node(tree: &DiffTree, ref_id: &str) -> NodeId {
        tree.model_nodes()
            .into_iter()
            .find(|id| tree.get(*id).diff_result().unwrap().ref_id() == ref_id)
            .unwrap()
    }

    fn selected_ids(model: &SelectionModel) -> Vec<String> {
        let mut ids: Vec<_> = model.selected_changes().into_iter().map(|c| c.ref_id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_select_all_skips_unchanged() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, false);

        let expanded = model.select_all();
        assert_eq!(selected_ids(&model), vec!["added", "deleted", "modified"]);
        // air, water and the shared type node, each expanded once.
        assert_eq!(expanded.len(), 3);
    }

    #[test]
    fn test_initialize_with_explicit_set() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, false);

        let spec: TypeRefIdSet = [
            (ModelType::Flow, "modified".to_string()),
            (ModelType::Flow, "same".to_string()),
            (ModelType::Process, "added".to_string()),
        ]
        .into_iter()
        .collect();
        let expanded = model.initialize(&SelectionSpec::Explicit(spec));

        assert_eq!(selected_ids(&model), vec!["modified"]);
        let air = tree.get(node(&tree, "modified")).parent.unwrap();
        assert_eq!(expanded, vec![air, tree.get(air).parent.unwrap()]);
    }

    #[test]
    fn test_initialize_expands_every_ancestor() {
        let changes = vec![
            Change::new(ModelType::Flow, "deep", "a/b/c/Deep", DiffType::Added),
            Change::new(ModelType::Flow, "near", "a/Near", DiffType::Added),
        ];
        let tree = DiffTreeBuilder::new().build(changes).into_tree().unwrap();
        let mut model = SelectionModel::new(&tree, false);

        let expanded = model.select_all();
        let mut visible: Vec<_> = expanded.iter().map(|id| tree.get(*id).name().to_string()).collect();
        visible.sort();
        assert_eq!(visible, vec!["FLOW", "a", "b", "c"]);

        for id in model.selected() {
            let mut ancestor = tree.get(*id).parent;
            while let Some(a) = ancestor.filter(|a| *a != tree.root()) {
                assert!(expanded.contains(&a));
                ancestor = tree.get(a).parent;
            }
        }
    }

    #[test]
    fn test_toggle_unchanged_is_noop() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, false);
        let same = node(&tree, "same");

        assert!(!model.toggle(same, true));
        assert!(!model.toggle(same, true));
        assert!(!model.is_selected(same));
        assert!(!model.has_selection());
    }

    #[test]
    fn test_toggle_category_is_rejected() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, false);
        let category = tree.get(node(&tree, "added")).parent.unwrap();

        assert!(!model.toggle(category, true));
        assert!(model.selected().is_empty());
    }

    #[test]
    fn test_toggle_adds_and_removes_once() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, false);
        let modified = node(&tree, "modified");

        assert!(model.toggle(modified, true));
        assert!(model.toggle(modified, true));
        assert_eq!(model.selected().len(), 1);

        assert!(!model.toggle(modified, false));
        assert!(model.selected().is_empty());
    }

    #[test]
    fn test_lock_mode_keeps_added_selected() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, true);
        let added = node(&tree, "added");

        // Added entities are selected from the start.
        assert!(model.is_selected(added));

        assert!(model.toggle(added, false));
        assert!(model.is_selected(added));

        let modified = node(&tree, "modified");
        model.toggle(modified, true);
        assert!(!model.toggle(modified, false));
        assert_eq!(selected_ids(&model), vec!["added"]);
    }

    #[test]
    fn test_selection_set_matches_selected() {
        let tree = tree();
        let mut model = SelectionModel::new(&tree, false);
        model.select_all();

        let set = model.selection_set();
        assert_eq!(set.len(), 3);
        assert!(set.contains(ModelType::Flow, "deleted"));
        assert!(!set.contains(ModelType::Flow, "same"));
    }
}
