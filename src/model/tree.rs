//! Single-tree storage and construction API.
//!
//! Trees are stored as parallel per-node arrays (structure-of-arrays) for
//! cache-friendly traversal. [`Tree`] doubles as its own builder: nodes are
//! allocated as placeholders and filled in with splits or leaves, the
//! pattern used by model loaders where child indices are known up front.

use super::{Operator, SplitType};

/// Node index local to one tree (0 = root).
pub type NodeId = u32;

// =============================================================================
// CategoryListStorage
// =============================================================================

/// Packed storage for per-node category lists.
///
/// Each categorical split node owns an ascending list of category values.
/// Lists for all nodes are stored in one flat array with per-node
/// `(start, len)` segments. Nodes without a categorical split have `(0, 0)`.
#[derive(Debug, Clone, Default)]
pub struct CategoryListStorage {
    values: Vec<u32>,
    segments: Vec<(u32, u32)>,
}

impl CategoryListStorage {
    /// Category list for a node. Empty for non-categorical nodes.
    #[inline]
    pub fn list(&self, node: NodeId) -> &[u32] {
        let (start, len) = self.segments[node as usize];
        &self.values[start as usize..(start + len) as usize]
    }

    /// Membership test via binary search (lists are kept ascending).
    #[inline]
    pub fn contains(&self, node: NodeId, category: u32) -> bool {
        self.list(node).binary_search(&category).is_ok()
    }

    fn push_node(&mut self) {
        self.segments.push((0, 0));
    }

    fn set_list(&mut self, node: NodeId, mut categories: Vec<u32>) {
        categories.sort_unstable();
        categories.dedup();
        let start = self.values.len() as u32;
        let len = categories.len() as u32;
        self.segments[node as usize] = (start, len);
        self.values.extend(categories);
    }
}

// =============================================================================
// Tree
// =============================================================================

/// A single decision tree with thresholds and leaf outputs of type `T`.
///
/// Internal nodes test either a numerical threshold (with an explicit
/// comparison operator) or membership in a category list. Leaves carry a
/// scalar output or a leaf vector, depending on the model's leaf-vector
/// shape. Optional per-node statistics (`gain`, `data_count`, `sum_hess`)
/// ride along when the source model provides them.
#[derive(Debug, Clone, Default)]
pub struct Tree<T> {
    is_leaf: Vec<bool>,
    split_index: Vec<u32>,
    default_left: Vec<bool>,
    split_type: Vec<SplitType>,
    op: Vec<Operator>,
    threshold: Vec<T>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    leaf_value: Vec<T>,
    leaf_vector: Vec<Vec<T>>,
    categories: CategoryListStorage,
    category_list_right_child: Vec<bool>,
    gain: Vec<Option<f64>>,
    data_count: Vec<Option<u64>>,
    sum_hess: Vec<Option<f64>>,
}

impl<T: Copy + Default> Tree<T> {
    /// Create a tree with `num_nodes` placeholder nodes. Node 0 is the root.
    pub fn with_num_nodes(num_nodes: usize) -> Self {
        let mut tree = Self::default();
        for _ in 0..num_nodes {
            tree.allocate_node();
        }
        tree
    }

    /// Allocate one placeholder node, returning its id.
    pub fn allocate_node(&mut self) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.is_leaf.push(false);
        self.split_index.push(0);
        self.default_left.push(false);
        self.split_type.push(SplitType::Numerical);
        self.op.push(Operator::Lt);
        self.threshold.push(T::default());
        self.left_children.push(0);
        self.right_children.push(0);
        self.leaf_value.push(T::default());
        self.leaf_vector.push(Vec::new());
        self.categories.push_node();
        self.category_list_right_child.push(false);
        self.gain.push(None);
        self.data_count.push(None);
        self.sum_hess.push(None);
        id
    }

    /// Set a numerical test on `node` with explicit child indices.
    pub fn set_numerical_split(
        &mut self,
        node: NodeId,
        split_index: u32,
        op: Operator,
        threshold: T,
        default_left: bool,
        left_child: NodeId,
        right_child: NodeId,
    ) {
        let idx = node as usize;
        self.is_leaf[idx] = false;
        self.split_index[idx] = split_index;
        self.split_type[idx] = SplitType::Numerical;
        self.op[idx] = op;
        self.threshold[idx] = threshold;
        self.default_left[idx] = default_left;
        self.left_children[idx] = left_child;
        self.right_children[idx] = right_child;
    }

    /// Set a categorical test on `node` with explicit child indices.
    ///
    /// `categories` is sorted and deduplicated on insertion. When
    /// `category_list_right_child` is true, matching categories go right
    /// instead of left.
    pub fn set_categorical_split(
        &mut self,
        node: NodeId,
        split_index: u32,
        categories: Vec<u32>,
        category_list_right_child: bool,
        default_left: bool,
        left_child: NodeId,
        right_child: NodeId,
    ) {
        let idx = node as usize;
        self.is_leaf[idx] = false;
        self.split_index[idx] = split_index;
        self.split_type[idx] = SplitType::Categorical;
        self.default_left[idx] = default_left;
        self.left_children[idx] = left_child;
        self.right_children[idx] = right_child;
        self.categories.set_list(node, categories);
        self.category_list_right_child[idx] = category_list_right_child;
    }

    /// Mark `node` as a leaf with a scalar output.
    pub fn set_leaf(&mut self, node: NodeId, value: T) {
        let idx = node as usize;
        self.is_leaf[idx] = true;
        self.leaf_value[idx] = value;
    }

    /// Mark `node` as a leaf with a leaf vector.
    pub fn set_leaf_vector(&mut self, node: NodeId, vector: Vec<T>) {
        let idx = node as usize;
        self.is_leaf[idx] = true;
        self.leaf_vector[idx] = vector;
    }

    /// Attach a split gain to `node`.
    pub fn set_gain(&mut self, node: NodeId, gain: f64) {
        self.gain[node as usize] = Some(gain);
    }

    /// Attach a training-data visit count to `node`.
    pub fn set_data_count(&mut self, node: NodeId, count: u64) {
        self.data_count[node as usize] = Some(count);
    }

    /// Attach a Hessian sum to `node`.
    pub fn set_sum_hess(&mut self, node: NodeId, sum_hess: f64) {
        self.sum_hess[node as usize] = Some(sum_hess);
    }
}

impl<T: Copy> Tree<T> {
    /// Number of nodes in this tree.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Check if a node is a leaf.
    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    /// Feature index tested at a split node.
    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_index[node as usize]
    }

    /// Default direction for missing values.
    #[inline]
    pub fn default_left(&self, node: NodeId) -> bool {
        self.default_left[node as usize]
    }

    /// Kind of test performed at a split node.
    #[inline]
    pub fn split_type(&self, node: NodeId) -> SplitType {
        self.split_type[node as usize]
    }

    /// Comparison operator of a numerical test.
    #[inline]
    pub fn comparison_op(&self, node: NodeId) -> Operator {
        self.op[node as usize]
    }

    /// Threshold of a numerical test.
    #[inline]
    pub fn threshold(&self, node: NodeId) -> T {
        self.threshold[node as usize]
    }

    /// Ascending category list of a categorical test.
    #[inline]
    pub fn category_list(&self, node: NodeId) -> &[u32] {
        self.categories.list(node)
    }

    /// Whether matching categories are routed to the right child.
    #[inline]
    pub fn category_list_right_child(&self, node: NodeId) -> bool {
        self.category_list_right_child[node as usize]
    }

    /// Left child index.
    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    /// Right child index.
    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    /// Child taken when the tested feature is missing.
    #[inline]
    pub fn default_child(&self, node: NodeId) -> NodeId {
        if self.default_left(node) {
            self.left_child(node)
        } else {
            self.right_child(node)
        }
    }

    /// Scalar leaf output.
    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> T {
        self.leaf_value[node as usize]
    }

    /// Leaf vector. Empty unless the model uses vector leaves.
    #[inline]
    pub fn leaf_vector(&self, node: NodeId) -> &[T] {
        &self.leaf_vector[node as usize]
    }

    /// Split gain, if recorded.
    #[inline]
    pub fn gain(&self, node: NodeId) -> Option<f64> {
        self.gain[node as usize]
    }

    /// Training-data visit count, if recorded.
    #[inline]
    pub fn data_count(&self, node: NodeId) -> Option<u64> {
        self.data_count[node as usize]
    }

    /// Hessian sum, if recorded.
    #[inline]
    pub fn sum_hess(&self, node: NodeId) -> Option<f64> {
        self.sum_hess[node as usize]
    }

    /// Validate structural invariants: every node reachable from the root
    /// exactly once, child indices in bounds, no self-loops.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        use crate::error::Error;

        let n_nodes = self.num_nodes();
        if n_nodes == 0 {
            return Err(Error::InvalidModel("tree has no nodes".to_string()));
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, u8)> = vec![(0, 0)];

        while let Some((node, phase)) = stack.pop() {
            let idx = node as usize;
            match phase {
                0 => {
                    match color[idx] {
                        0 => {}
                        1 => {
                            return Err(Error::InvalidModel(format!(
                                "cycle detected at node {node}"
                            )))
                        }
                        _ => {
                            return Err(Error::InvalidModel(format!(
                                "node {node} is reachable by more than one path"
                            )))
                        }
                    }
                    color[idx] = 1;
                    stack.push((node, 1));

                    if !self.is_leaf(node) {
                        let left = self.left_child(node);
                        let right = self.right_child(node);
                        if left == node || right == node {
                            return Err(Error::InvalidModel(format!(
                                "node {node} references itself as a child"
                            )));
                        }
                        for (side, child) in [("left", left), ("right", right)] {
                            if child as usize >= n_nodes {
                                return Err(Error::InvalidModel(format!(
                                    "{side} child {child} of node {node} is out of bounds \
                                     (tree has {n_nodes} nodes)"
                                )));
                            }
                        }
                        stack.push((right, 0));
                        stack.push((left, 0));
                    }
                }
                _ => {
                    color[idx] = 2;
                }
            }
        }

        if let Some(node) = color.iter().position(|&c| c == 0) {
            return Err(Error::InvalidModel(format!(
                "node {node} exists in storage but is unreachable from the root"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree<f32> {
        // root: feat0 < 0.5 ? leaf(-1.0) : leaf(1.0)
        let mut tree = Tree::with_num_nodes(3);
        tree.set_numerical_split(0, 0, Operator::Lt, 0.5, true, 1, 2);
        tree.set_leaf(1, -1.0);
        tree.set_leaf(2, 1.0);
        tree
    }

    #[test]
    fn build_and_query_numerical() {
        let tree = stump();
        assert_eq!(tree.num_nodes(), 3);
        assert!(!tree.is_leaf(0));
        assert_eq!(tree.split_index(0), 0);
        assert_eq!(tree.comparison_op(0), Operator::Lt);
        assert_eq!(tree.threshold(0), 0.5);
        assert!(tree.default_left(0));
        assert_eq!(tree.default_child(0), 1);
        assert_eq!(tree.leaf_value(1), -1.0);
        assert_eq!(tree.leaf_value(2), 1.0);
    }

    #[test]
    fn categorical_list_is_sorted_and_deduped() {
        let mut tree: Tree<f32> = Tree::with_num_nodes(3);
        tree.set_categorical_split(0, 2, vec![5, 1, 3, 3], false, false, 1, 2);
        tree.set_leaf(1, 0.0);
        tree.set_leaf(2, 1.0);

        assert_eq!(tree.split_type(0), SplitType::Categorical);
        assert_eq!(tree.category_list(0), &[1, 3, 5]);
        assert!(tree.categories.contains(0, 3));
        assert!(!tree.categories.contains(0, 2));
    }

    #[test]
    fn validate_accepts_well_formed_trees() {
        assert!(stump().validate().is_ok());

        let mut single: Tree<f32> = Tree::with_num_nodes(1);
        single.set_leaf(0, 0.5);
        assert!(single.validate().is_ok());
    }

    #[test]
    fn validate_rejects_structural_defects() {
        // empty
        let empty: Tree<f32> = Tree::default();
        assert!(empty.validate().is_err());

        // out-of-bounds child
        let mut tree: Tree<f32> = Tree::with_num_nodes(2);
        tree.set_numerical_split(0, 0, Operator::Lt, 0.5, true, 1, 7);
        tree.set_leaf(1, 0.0);
        assert!(tree.validate().unwrap_err().to_string().contains("out of bounds"));

        // self-loop
        let mut tree: Tree<f32> = Tree::with_num_nodes(2);
        tree.set_numerical_split(0, 0, Operator::Lt, 0.5, true, 0, 1);
        tree.set_leaf(1, 0.0);
        assert!(tree.validate().unwrap_err().to_string().contains("itself"));

        // diamond: node 2 reached twice
        let mut tree: Tree<f32> = Tree::with_num_nodes(3);
        tree.set_numerical_split(0, 0, Operator::Lt, 0.5, true, 2, 2);
        tree.set_leaf(1, 0.0);
        tree.set_leaf(2, 0.0);
        assert!(tree.validate().is_err());

        // unreachable node 3
        let mut tree: Tree<f32> = Tree::with_num_nodes(4);
        tree.set_numerical_split(0, 0, Operator::Lt, 0.5, true, 1, 2);
        tree.set_leaf(1, 0.0);
        tree.set_leaf(2, 0.0);
        tree.set_leaf(3, 0.0);
        assert!(tree.validate().unwrap_err().to_string().contains("unreachable"));
    }

    #[test]
    fn optional_statistics() {
        let mut tree = stump();
        assert_eq!(tree.gain(0), None);
        tree.set_gain(0, 12.5);
        tree.set_data_count(0, 100);
        tree.set_sum_hess(0, 25.0);
        assert_eq!(tree.gain(0), Some(12.5));
        assert_eq!(tree.data_count(0), Some(100));
        assert_eq!(tree.sum_hess(0), Some(25.0));
    }
}
