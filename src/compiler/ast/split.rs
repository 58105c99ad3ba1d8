//! Split the prediction function into multiple translation units.

use super::{AstBuilder, NodePayload};
use crate::error::{Error, Result};

impl AstBuilder {
    /// Partition the per-tree subtrees under Main's Function into at most
    /// `num_tu` translation units, each wrapping its group in a fresh
    /// Function node. A non-positive `num_tu` leaves the AST unchanged.
    ///
    /// Calling this twice is rejected: the Function's children would no
    /// longer be tree heads but TranslationUnit nodes.
    pub fn split_into_tus(&mut self, num_tu: i32) -> Result<()> {
        if num_tu <= 0 {
            log::info!(
                "Parallel compilation disabled; all member trees will be dumped to a single \
                 source file. This may increase compilation time and memory usage."
            );
            return Ok(());
        }
        log::info!(
            "Parallel compilation enabled; member trees will be divided into {num_tu} \
             translation units."
        );

        let main = self.root();
        debug_assert_eq!(self.node(main).children.len(), 1);
        let top_func = self.node(main).children[0];
        if !matches!(self.node(top_func).payload, NodePayload::Function) {
            return Err(Error::InvalidState(
                "split_into_tus must run before quantize_thresholds".to_string(),
            ));
        }

        let tree_heads = self.node(top_func).children.clone();
        for &head in &tree_heads {
            match self.node(head).payload {
                NodePayload::NumericalCondition { .. }
                | NodePayload::CategoricalCondition { .. }
                | NodePayload::Output { .. } => {}
                _ => {
                    return Err(Error::InvalidState(
                        "split_into_tus was already applied".to_string(),
                    ));
                }
            }
        }

        let ntree = tree_heads.len();
        let unit_size = ntree.div_ceil(num_tu as usize);
        let existing_units = self.count_tu_nodes();
        let mut tu_list = Vec::new();
        for unit_id in 0..num_tu as usize {
            let tree_begin = unit_id * unit_size;
            let tree_end = ((unit_id + 1) * unit_size).min(ntree);
            if tree_begin >= tree_end {
                continue;
            }
            let tu = self.add_node(
                Some(top_func),
                NodePayload::TranslationUnit {
                    unit_id: (existing_units + unit_id) as i32,
                },
            );
            let func = self.add_node(Some(tu), NodePayload::Function);
            self.node_mut(tu).children.push(func);
            for &head in &tree_heads[tree_begin..tree_end] {
                self.node_mut(head).parent = Some(func);
                self.node_mut(func).children.push(head);
            }
            tu_list.push(tu);
        }
        self.node_mut(top_func).children = tu_list;
        Ok(())
    }

    fn count_tu_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if matches!(self.node(id).payload, NodePayload::TranslationUnit { .. }) {
                count += 1;
            }
            stack.extend(self.node(id).children.iter().copied());
        }
        count
    }
}
