//! Emit `result[...] += leaf;` updates for leaf nodes.

use super::{CLiteral, CodeGenerator};
use crate::compiler::ast::{AstNodeId, LeafOutput, NodePayload};
use crate::error::{Error, Result};

fn leaf_literal(leaf_output: &LeafOutput, i: usize) -> String {
    match leaf_output {
        LeafOutput::F32(v) => v[i].c_literal(),
        LeafOutput::F64(v) => v[i].c_literal(),
    }
}

fn check_shape(
    actual: [i32; 2],
    expected: [i32; 2],
    actual_len: usize,
    expected_len: i32,
    fanout: &str,
) -> Result<()> {
    if actual != expected {
        return Err(Error::InvalidModel(format!(
            "leaf vector shape [{}, {}] is inconsistent with a {fanout} leaf; expected [{}, {}]",
            actual[0], actual[1], expected[0], expected[1]
        )));
    }
    if actual_len != expected_len as usize {
        return Err(Error::InvalidModel(format!(
            "leaf output has {actual_len} entries; expected {expected_len} for a {fanout} leaf"
        )));
    }
    Ok(())
}

impl CodeGenerator<'_> {
    /// The `result` array is the `output(row, :, :)` slice for one row,
    /// indexed by `target_id * MAX_N_CLASS + class_id`. The leaf's
    /// `(target_id, class_id)` fan-out decides the update pattern.
    pub(crate) fn emit_output(&mut self, id: AstNodeId) -> Result<()> {
        let node = self.ast.node(id);
        debug_assert!(node.children.is_empty());
        let (target_id, class_id, leaf_output) = match &node.payload {
            NodePayload::Output {
                target_id,
                class_id,
                leaf_output,
            } => (*target_id, *class_id, leaf_output),
            _ => unreachable!("emit_output on a non-output node"),
        };

        let meta = self.ast.meta();
        let num_target = meta.num_target;
        let num_class = &meta.num_class;
        let max_num_class = meta.max_num_class();
        let shape = meta.leaf_vector_shape;

        let mut lines = Vec::new();
        match (target_id < 0, class_id < 0) {
            (true, true) => {
                // Output for all targets and all classes.
                check_shape(
                    shape,
                    [num_target, max_num_class],
                    leaf_output.len(),
                    num_target * max_num_class,
                    "full-matrix",
                )?;
                for target in 0..num_target {
                    for class in 0..num_class[target as usize] {
                        let offset = target * max_num_class + class;
                        lines.push(format!(
                            "result[{offset}] += {};",
                            leaf_literal(leaf_output, offset as usize)
                        ));
                    }
                }
            }
            (true, false) => {
                // Output for all targets, one class.
                check_shape(shape, [num_target, 1], leaf_output.len(), num_target, "per-target")?;
                for target in 0..num_target {
                    let offset = target * max_num_class + class_id;
                    lines.push(format!(
                        "result[{offset}] += {};",
                        leaf_literal(leaf_output, target as usize)
                    ));
                }
            }
            (false, true) => {
                // Output for one target, all of its classes.
                check_shape(
                    shape,
                    [1, max_num_class],
                    leaf_output.len(),
                    max_num_class,
                    "per-class",
                )?;
                for class in 0..num_class[target_id as usize] {
                    let offset = target_id * max_num_class + class;
                    lines.push(format!(
                        "result[{offset}] += {};",
                        leaf_literal(leaf_output, class as usize)
                    ));
                }
            }
            (false, false) => {
                // Output for a single (target, class) slot.
                check_shape(shape, [1, 1], leaf_output.len(), 1, "scalar")?;
                let offset = target_id * max_num_class + class_id;
                lines.push(format!("result[{offset}] += {};", leaf_literal(leaf_output, 0)));
            }
        }

        for line in lines {
            self.code.push_fragment(line);
        }
        Ok(())
    }
}
