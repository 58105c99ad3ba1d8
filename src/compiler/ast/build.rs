//! Lower a tree-ensemble model into the initial AST.

use super::{AstBuilder, AstNodeId, LeafOutput, ModelMeta, NodePayload, ThresholdValue};
use crate::model::{Model, NodeId, SplitType, Tree, TreesVariant};

/// Element type bridging `Tree<T>` and the width-tagged AST values.
trait AstElement: Copy + Default {
    fn threshold_value(self) -> ThresholdValue;
    fn leaf_output(values: Vec<Self>) -> LeafOutput;
}

impl AstElement for f32 {
    #[inline]
    fn threshold_value(self) -> ThresholdValue {
        ThresholdValue::F32(self)
    }

    #[inline]
    fn leaf_output(values: Vec<Self>) -> LeafOutput {
        LeafOutput::F32(values)
    }
}

impl AstElement for f64 {
    #[inline]
    fn threshold_value(self) -> ThresholdValue {
        ThresholdValue::F64(self)
    }

    #[inline]
    fn leaf_output(values: Vec<Self>) -> LeafOutput {
        LeafOutput::F64(values)
    }
}

/// Count, per `(target, class)` slot, how many trees contribute output
/// there. Absent when tree averaging is disabled.
fn compute_average_factor(model: &Model) -> Option<Vec<i32>> {
    if !model.average_tree_output {
        return None;
    }

    let max_num_class = model.max_num_class();
    let mut average_factor = vec![0i32; (model.num_target * max_num_class) as usize];
    for tree_id in 0..model.num_trees() {
        let target_id = model.target_id[tree_id];
        let class_id = model.class_id[tree_id];
        match (target_id < 0, class_id < 0) {
            (true, true) => {
                for target in 0..model.num_target {
                    for class in 0..model.num_class[target as usize] {
                        average_factor[(target * max_num_class + class) as usize] += 1;
                    }
                }
            }
            (true, false) => {
                for target in 0..model.num_target {
                    average_factor[(target * max_num_class + class_id) as usize] += 1;
                }
            }
            (false, true) => {
                for class in 0..model.num_class[target_id as usize] {
                    average_factor[(target_id * max_num_class + class) as usize] += 1;
                }
            }
            (false, false) => {
                average_factor[(target_id * max_num_class + class_id) as usize] += 1;
            }
        }
    }
    Some(average_factor)
}

impl AstBuilder {
    /// Lower `model` into an AST: Main → Function → one subtree per tree,
    /// transcribed node by node with `tree_id`/`node_id` preserved.
    pub fn build(model: &Model) -> Self {
        let meta = ModelMeta {
            num_target: model.num_target,
            num_class: model.num_class.clone(),
            leaf_vector_shape: model.leaf_vector_shape,
            num_feature: model.num_feature,
            is_categorical: Vec::new(),
            sigmoid_alpha: model.sigmoid_alpha,
            ratio_c: model.ratio_c,
            data_type: model.data_type(),
        };
        let mut builder = Self::new_arena(
            meta,
            NodePayload::Main {
                base_scores: model.base_scores.clone(),
                average_factor: compute_average_factor(model),
                postprocessor: model.postprocessor.clone(),
            },
        );
        let main = builder.root();
        let func = builder.add_node(Some(main), NodePayload::Function);
        builder.node_mut(main).children.push(func);

        match &model.trees {
            TreesVariant::F32(trees) => {
                for (tree_id, tree) in trees.iter().enumerate() {
                    let head = builder.build_tree(
                        func,
                        tree,
                        tree_id as i32,
                        model.target_id[tree_id],
                        model.class_id[tree_id],
                        0,
                    );
                    builder.node_mut(func).children.push(head);
                }
            }
            TreesVariant::F64(trees) => {
                for (tree_id, tree) in trees.iter().enumerate() {
                    let head = builder.build_tree(
                        func,
                        tree,
                        tree_id as i32,
                        model.target_id[tree_id],
                        model.class_id[tree_id],
                        0,
                    );
                    builder.node_mut(func).children.push(head);
                }
            }
        }
        builder
    }

    /// Transcribe the subtree of `tree` rooted at `nid`, returning the AST
    /// node heading it.
    fn build_tree<T: AstElement>(
        &mut self,
        parent: AstNodeId,
        tree: &Tree<T>,
        tree_id: i32,
        target_id: i32,
        class_id: i32,
        nid: NodeId,
    ) -> AstNodeId {
        let id = if tree.is_leaf(nid) {
            let scalar_leaf =
                self.meta().leaf_vector_shape[0] == 1 && self.meta().leaf_vector_shape[1] == 1;
            let leaf_output = if scalar_leaf {
                T::leaf_output(vec![tree.leaf_value(nid)])
            } else {
                T::leaf_output(tree.leaf_vector(nid).to_vec())
            };
            self.add_node(
                Some(parent),
                NodePayload::Output {
                    target_id,
                    class_id,
                    leaf_output,
                },
            )
        } else {
            let payload = match tree.split_type(nid) {
                SplitType::Numerical => NodePayload::NumericalCondition {
                    split_index: tree.split_index(nid),
                    default_left: tree.default_left(nid),
                    gain: tree.gain(nid),
                    op: tree.comparison_op(nid),
                    threshold: tree.threshold(nid).threshold_value(),
                    quantized_threshold: None,
                    zero_quantized: -1,
                },
                SplitType::Categorical => NodePayload::CategoricalCondition {
                    split_index: tree.split_index(nid),
                    default_left: tree.default_left(nid),
                    gain: tree.gain(nid),
                    category_list: tree.category_list(nid).to_vec(),
                    category_list_right_child: tree.category_list_right_child(nid),
                },
            };
            let id = self.add_node(Some(parent), payload);
            let left = self.build_tree(id, tree, tree_id, target_id, class_id, tree.left_child(nid));
            let right =
                self.build_tree(id, tree, tree_id, target_id, class_id, tree.right_child(nid));
            let node = self.node_mut(id);
            node.children.push(left);
            node.children.push(right);
            id
        };

        let node = self.node_mut(id);
        node.tree_id = tree_id;
        node.node_id = nid as i32;
        node.data_count = tree.data_count(nid);
        node.sum_hess = tree.sum_hess(nid);
        id
    }
}
