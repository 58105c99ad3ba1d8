//! Quantize numerical thresholds into bin indices.

use super::{AstBuilder, AstNodeId, NodePayload, ThresholdList};
use crate::error::{Error, Result};
use crate::model::DataType;

impl AstBuilder {
    /// Collect the finite thresholds of every feature, rewrite each
    /// numerical condition to its bin index (`2 * position`), and insert a
    /// Quantizer node owning the threshold lists between Main and the top
    /// Function.
    ///
    /// Splits with infinite thresholds are left untouched. Calling this
    /// twice is rejected: after the first run Main's child is the
    /// Quantizer, not a Function.
    pub fn quantize_thresholds(&mut self) -> Result<()> {
        let main = self.root();
        debug_assert_eq!(self.node(main).children.len(), 1);
        let top_func = self.node(main).children[0];
        if !matches!(self.node(top_func).payload, NodePayload::Function) {
            return Err(Error::InvalidState(
                "quantize_thresholds was already applied".to_string(),
            ));
        }

        let num_feature = self.meta().num_feature as usize;
        let mut cut_pts: Vec<Vec<f64>> = vec![Vec::new(); num_feature];
        self.scan_thresholds(self.root(), &mut cut_pts)?;
        for pts in &mut cut_pts {
            pts.sort_by(|a, b| a.partial_cmp(b).unwrap());
            pts.dedup();
        }

        self.rewrite_thresholds(self.root(), &cut_pts);

        // The lists are exact round-trips: every entry came from a threshold
        // of the model's own element width.
        let threshold_list = match self.meta().data_type {
            DataType::Float32 => ThresholdList::F32(
                cut_pts.iter().map(|pts| pts.iter().map(|&v| v as f32).collect()).collect(),
            ),
            DataType::Float64 => ThresholdList::F64(cut_pts),
        };

        let quantizer = self.add_node(Some(main), NodePayload::Quantizer { threshold_list });
        self.node_mut(quantizer).children.push(top_func);
        self.node_mut(top_func).parent = Some(quantizer);
        self.node_mut(main).children[0] = quantizer;
        Ok(())
    }

    fn scan_thresholds(&self, id: AstNodeId, cut_pts: &mut [Vec<f64>]) -> Result<()> {
        if let NodePayload::NumericalCondition {
            split_index,
            threshold,
            quantized_threshold,
            ..
        } = &self.node(id).payload
        {
            if quantized_threshold.is_some() {
                return Err(Error::InvalidState(
                    "numerical condition is already quantized".to_string(),
                ));
            }
            if threshold.is_finite() {
                cut_pts[*split_index as usize].push(threshold.to_f64());
            }
        }
        for &child in &self.node(id).children {
            self.scan_thresholds(child, cut_pts)?;
        }
        Ok(())
    }

    fn rewrite_thresholds(&mut self, id: AstNodeId, cut_pts: &[Vec<f64>]) {
        if let NodePayload::NumericalCondition {
            split_index,
            threshold,
            quantized_threshold,
            zero_quantized,
            ..
        } = &mut self.node_mut(id).payload
        {
            if threshold.is_finite() {
                let pts = &cut_pts[*split_index as usize];
                let value = threshold.to_f64();
                let pos = pts
                    .binary_search_by(|p| p.partial_cmp(&value).unwrap())
                    .expect("threshold must appear in its own cut-point list");
                *quantized_threshold = Some(pos as i32 * 2);

                // Bin index of 0.0, used when missing values are mapped to zero.
                let ip = pts.partition_point(|&p| p < 0.0);
                let mut zq = ip as i32 * 2;
                if ip < pts.len() && pts[ip] != 0.0 {
                    zq -= 1;
                }
                *zero_quantized = zq;
            }
        }
        for child in self.node(id).children.clone() {
            self.rewrite_thresholds(child, cut_pts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::ThresholdValue;
    use crate::model::{Model, Operator, Tree, TreesVariant};

    fn model_with_thresholds(thresholds: &[(u32, f32)]) -> Model {
        // Chain of splits, each with its own pair of leaves.
        let mut trees = Vec::new();
        for &(feature, threshold) in thresholds {
            let mut tree = Tree::with_num_nodes(3);
            tree.set_numerical_split(0, feature, Operator::Lt, threshold, true, 1, 2);
            tree.set_leaf(1, -1.0);
            tree.set_leaf(2, 1.0);
            trees.push(tree);
        }
        let n = trees.len();
        Model {
            num_target: 1,
            num_class: vec![1],
            leaf_vector_shape: [1, 1],
            num_feature: 2,
            base_scores: vec![0.0],
            postprocessor: "identity".to_string(),
            sigmoid_alpha: 1.0,
            ratio_c: 1.0,
            average_tree_output: false,
            target_id: vec![0; n],
            class_id: vec![0; n],
            trees: TreesVariant::F32(trees),
        }
    }

    fn quantized_of(builder: &AstBuilder) -> Vec<(Option<i32>, i32)> {
        let mut out = Vec::new();
        let mut stack = vec![builder.root()];
        while let Some(id) = stack.pop() {
            if let NodePayload::NumericalCondition {
                quantized_threshold,
                zero_quantized,
                ..
            } = builder.node(id).payload
            {
                out.push((quantized_threshold, zero_quantized));
            }
            stack.extend(builder.node(id).children.iter().copied());
        }
        out.sort();
        out
    }

    #[test]
    fn thresholds_become_even_bin_indices() {
        let mut builder =
            AstBuilder::build(&model_with_thresholds(&[(0, 1.5), (0, 0.5), (0, 1.5), (1, -2.0)]));
        builder.quantize_thresholds().unwrap();

        // feature 0 list: [0.5, 1.5]; feature 1 list: [-2.0]
        let main = builder.node(builder.root());
        match &builder.node(main.children[0]).payload {
            NodePayload::Quantizer { threshold_list } => {
                assert_eq!(
                    *threshold_list,
                    ThresholdList::F32(vec![vec![0.5, 1.5], vec![-2.0]])
                );
            }
            other => panic!("expected Quantizer under Main, got {other:?}"),
        }

        // 0.5 -> 0, 1.5 -> 2 (twice), -2.0 -> 0
        // zero insertion points: feature 0 at 0 (0.5 != 0) -> -1; feature 1 at 1 (end) -> 2
        assert_eq!(
            quantized_of(&builder),
            vec![(Some(0), -1), (Some(0), 2), (Some(2), -1), (Some(2), -1)]
        );
    }

    #[test]
    fn zero_threshold_quantizes_to_even_zero_bin() {
        let mut builder = AstBuilder::build(&model_with_thresholds(&[(0, 0.0), (0, 2.0)]));
        builder.quantize_thresholds().unwrap();
        // list: [0.0, 2.0]; zero sits at index 0 -> zero_quantized = 0
        assert_eq!(quantized_of(&builder), vec![(Some(0), 0), (Some(2), 0)]);
    }

    #[test]
    fn infinite_thresholds_are_skipped() {
        let mut builder = AstBuilder::build(&model_with_thresholds(&[(0, f32::INFINITY)]));
        builder.quantize_thresholds().unwrap();
        assert_eq!(quantized_of(&builder), vec![(None, -1)]);
        let main = builder.node(builder.root());
        match &builder.node(main.children[0]).payload {
            NodePayload::Quantizer { threshold_list } => {
                assert_eq!(threshold_list.total(), 0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn quantizing_twice_is_rejected() {
        let mut builder = AstBuilder::build(&model_with_thresholds(&[(0, 0.5)]));
        builder.quantize_thresholds().unwrap();
        let err = builder.quantize_thresholds().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        // the original thresholds must remain intact after the failed call
        let mut found = false;
        for id in 0..builder.num_nodes() {
            if let NodePayload::NumericalCondition { threshold, .. } = builder.node(id).payload {
                assert_eq!(threshold, ThresholdValue::F32(0.5));
                found = true;
            }
        }
        assert!(found);
    }
}
