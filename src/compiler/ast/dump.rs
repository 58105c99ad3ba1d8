//! Human-readable AST dump for debugging and inspection.

use std::fmt::Write;

use super::{AstBuilder, AstNode, AstNodeId, LeafOutput, NodePayload, ThresholdList, ThresholdValue};

impl AstBuilder {
    /// Render the AST, one node per line indented by depth, followed by a
    /// metadata line. Deterministic in the input model and parameters.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_node(&mut out, self.root(), 0);
        write!(
            out,
            "Metadata: \nis_categorical = [{}], leaf_vector_shape = [{}, {}], num_feature = {}",
            self.meta()
                .is_categorical
                .iter()
                .map(|&b| format!("{b}, "))
                .collect::<String>(),
            self.meta().leaf_vector_shape[0],
            self.meta().leaf_vector_shape[1],
            self.meta().num_feature
        )
        .unwrap();
        out
    }

    fn dump_node(&self, out: &mut String, id: AstNodeId, indent: usize) {
        let node = self.node(id);
        writeln!(out, "{:indent$}{}", "", node_dump(node)).unwrap();
        for &child in &node.children {
            self.dump_node(out, child, indent + 2);
        }
    }
}

fn join<T: std::fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    values.into_iter().map(|v| format!("{v}, ")).collect()
}

fn threshold_list_dump(list: &ThresholdList) -> String {
    let (type_name, lists): (&str, Vec<String>) = match list {
        ThresholdList::F32(lists) => {
            ("float32", lists.iter().map(|v| format!("[ {}], ", join(v))).collect())
        }
        ThresholdList::F64(lists) => {
            ("float64", lists.iter().map(|v| format!("[ {}], ", join(v))).collect())
        }
    };
    format!("{}[ {}]", type_name, lists.concat())
}

fn condition_dump(split_index: u32, default_left: bool, gain: Option<f64>) -> String {
    match gain {
        Some(gain) => format!(
            "ConditionNode {{ split_index: {split_index}, default_left: {default_left}, gain: {gain} }}"
        ),
        None => format!("ConditionNode {{ split_index: {split_index}, default_left: {default_left} }}"),
    }
}

fn node_dump(node: &AstNode) -> String {
    match &node.payload {
        NodePayload::Main { base_scores, .. } => {
            format!("MainNode {{ base_scores: float64[{}] }}", join(base_scores))
        }
        NodePayload::TranslationUnit { unit_id } => {
            format!("TranslationUnitNode {{ unit_id: {unit_id} }}")
        }
        NodePayload::Quantizer { threshold_list } => {
            format!("QuantizerNode {{ threshold_list: {} }}", threshold_list_dump(threshold_list))
        }
        NodePayload::Function => "FunctionNode {}".to_string(),
        NodePayload::NumericalCondition {
            split_index,
            default_left,
            gain,
            op,
            threshold,
            quantized_threshold,
            zero_quantized,
        } => {
            let threshold_str = match threshold {
                ThresholdValue::F32(v) => format!("float32({v})"),
                ThresholdValue::F64(v) => format!("float64({v})"),
            };
            let quantized_str = match quantized_threshold {
                Some(q) => format!("quantized_threshold: int({q}), "),
                None => String::new(),
            };
            format!(
                "NumericalConditionNode {{ {}, op: {}, threshold: {}, {}zero_quantized: {} }}",
                condition_dump(*split_index, *default_left, *gain),
                op,
                threshold_str,
                quantized_str,
                zero_quantized
            )
        }
        NodePayload::CategoricalCondition {
            split_index,
            default_left,
            gain,
            category_list,
            category_list_right_child,
        } => format!(
            "CategoricalConditionNode {{ {}, category_list: [{}], category_list_right_child: {} }}",
            condition_dump(*split_index, *default_left, *gain),
            join(category_list),
            category_list_right_child
        ),
        NodePayload::Output {
            target_id,
            class_id,
            leaf_output,
        } => {
            let output_str = match leaf_output {
                LeafOutput::F32(v) => format!("float32[{}]", join(v)),
                LeafOutput::F64(v) => format!("float64[{}]", join(v)),
            };
            format!("OutputNode {{ target_id: {target_id}, class_id: {class_id}, output: {output_str} }}")
        }
    }
}
