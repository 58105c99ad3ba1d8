//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;

use treec::model::{Model, Operator, Tree, TreesVariant};

/// Single numerical stump: `feature 0 < threshold ? left : right`.
pub fn stump(threshold: f32, left: f32, right: f32) -> Tree<f32> {
    let mut tree = Tree::with_num_nodes(3);
    tree.set_numerical_split(0, 0, Operator::Lt, threshold, true, 1, 2);
    tree.set_leaf(1, left);
    tree.set_leaf(2, right);
    tree
}

/// Single-target model over f32 trees with scalar leaves.
pub fn scalar_model(
    trees: Vec<Tree<f32>>,
    num_feature: i32,
    postprocessor: &str,
) -> Model {
    let n = trees.len();
    Model {
        num_target: 1,
        num_class: vec![1],
        leaf_vector_shape: [1, 1],
        num_feature,
        base_scores: vec![0.0],
        postprocessor: postprocessor.to_string(),
        sigmoid_alpha: 1.0,
        ratio_c: 1.0,
        average_tree_output: false,
        target_id: vec![0; n],
        class_id: vec![0; n],
        trees: TreesVariant::F32(trees),
    }
}

/// Read a generated file from the output directory.
pub fn read_generated(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name))
        .unwrap_or_else(|e| panic!("failed to read generated file {name}: {e}"))
}

/// Names of all files in the output directory, sorted.
pub fn generated_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("output dir")
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}
