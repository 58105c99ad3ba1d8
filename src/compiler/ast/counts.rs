//! Splice branch-annotation counts into the AST.

use super::{AstBuilder, AstNodeId, NodePayload};
use crate::annotator::AnnotationCounts;
use crate::error::{Error, Result};

impl AstBuilder {
    /// Overwrite `data_count` on every node transcribed from a tree with
    /// the visit count recorded at `counts[tree_id][node_id]`.
    pub fn load_data_counts(&mut self, counts: &AnnotationCounts) -> Result<()> {
        self.load_counts_from(self.root(), counts)
    }

    fn load_counts_from(&mut self, id: AstNodeId, counts: &AnnotationCounts) -> Result<()> {
        let (tree_id, node_id) = (self.node(id).tree_id, self.node(id).node_id);
        if tree_id >= 0 && node_id >= 0 {
            let count = counts
                .get(tree_id as usize)
                .and_then(|tree| tree.get(node_id as usize))
                .copied()
                .ok_or_else(|| {
                    Error::InvalidParam(format!(
                        "annotation does not cover tree {tree_id}, node {node_id}; \
                         was it produced for a different model?"
                    ))
                })?;
            self.node_mut(id).data_count = Some(count);
        }
        for child in self.node(id).children.clone() {
            self.load_counts_from(child, counts)?;
        }
        Ok(())
    }

    /// Mark every feature appearing in a categorical test in
    /// `meta.is_categorical`. Idempotent.
    pub fn generate_is_categorical_array(&mut self) {
        let mut is_categorical = vec![false; self.meta().num_feature as usize];
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if let NodePayload::CategoricalCondition { split_index, .. } = self.node(id).payload {
                is_categorical[split_index as usize] = true;
            }
            stack.extend(self.node(id).children.iter().copied());
        }
        self.meta_mut().is_categorical = is_categorical;
    }
}
