//! Emit `if`/`else` branches for condition nodes.

use super::{CLiteral, CodeGenerator};
use crate::compiler::ast::{AstNodeId, NodePayload, ThresholdValue};
use crate::model::Operator;

/// Bit `c` set for every `c` in `category_list`; 64 categories per word.
fn categorical_bitmap(category_list: &[u32]) -> Vec<u64> {
    let Some(&max_category) = category_list.last() else {
        return vec![0];
    };
    let mut bitmap = vec![0u64; (max_category as usize + 1).div_ceil(64)];
    for &cat in category_list {
        bitmap[(cat / 64) as usize] |= 1u64 << (cat % 64);
    }
    bitmap
}

impl CodeGenerator<'_> {
    /// Render the comparison of a numerical condition, without the
    /// missing-value guard.
    fn numerical_condition(
        &self,
        split_index: u32,
        op: Operator,
        threshold: ThresholdValue,
        quantized_threshold: Option<i32>,
    ) -> String {
        if let Some(quantized) = quantized_threshold {
            return format!("data[{split_index}].qvalue {op} {quantized}");
        }
        match threshold {
            // The result of comparing any finite value against an infinite
            // threshold is a constant, per IEEE 754.
            ThresholdValue::F32(v) if v.is_infinite() => {
                (if op.compare(0.0f32, v) { "1" } else { "0" }).to_string()
            }
            ThresholdValue::F64(v) if v.is_infinite() => {
                (if op.compare(0.0f64, v) { "1" } else { "0" }).to_string()
            }
            ThresholdValue::F32(v) => format!(
                "data[{split_index}].fvalue {op} ({}){}",
                self.threshold_ctype(),
                v.c_literal()
            ),
            ThresholdValue::F64(v) => format!(
                "data[{split_index}].fvalue {op} ({}){}",
                self.threshold_ctype(),
                v.c_literal()
            ),
        }
    }

    /// Render a categorical condition, including its missing-value guard.
    ///
    /// The feature value is accepted as a category only when it is
    /// non-negative and small enough to be an exact integer; the truncated
    /// value then probes a 64-bit-word bitmap.
    fn categorical_condition(
        &self,
        split_index: u32,
        default_left: bool,
        category_list: &[u32],
        category_list_right_child: bool,
    ) -> String {
        let bitmap = categorical_bitmap(category_list);
        if bitmap.iter().all(|&w| w == 0) {
            return "0".to_string();
        }

        let threshold_ctype = self.threshold_ctype();
        let fabs = if threshold_ctype == "float" { "fabsf" } else { "fabs" };
        let negate = if category_list_right_child { "!" } else { "" };

        let mut out = if default_left {
            format!(
                "data[{split_index}].missing == -1 || {negate}(\
                 (tmp = (unsigned int)(data[{split_index}].fvalue) ), "
            )
        } else {
            format!(
                "data[{split_index}].missing != -1 && {negate}(\
                 (tmp = (unsigned int)(data[{split_index}].fvalue) ), "
            )
        };
        out.push_str(&format!(
            "((data[{split_index}].fvalue >= 0) && \
             ({fabs}(data[{split_index}].fvalue) <= ({threshold_ctype})(1U << FLT_MANT_DIG)) && ("
        ));
        out.push_str(&format!(
            "(tmp >= 0 && tmp < 64 && (( (uint64_t){}U >> tmp) & 1) )",
            bitmap[0]
        ));
        for (i, &word) in bitmap.iter().enumerate().skip(1) {
            out.push_str(&format!(
                " || (tmp >= {} && tmp < {} && (( (uint64_t){}U >> (tmp - {}) ) & 1) )",
                i * 64,
                (i + 1) * 64,
                word,
                i * 64
            ));
        }
        out.push_str(")))");
        out
    }

    pub(crate) fn emit_condition(&mut self, id: AstNodeId) -> crate::error::Result<()> {
        let node = self.ast.node(id);
        let mut condition_with_na_check = match &node.payload {
            NodePayload::NumericalCondition {
                split_index,
                default_left,
                op,
                threshold,
                quantized_threshold,
                ..
            } => {
                let condition =
                    self.numerical_condition(*split_index, *op, *threshold, *quantized_threshold);
                if *default_left {
                    format!("!(data[{split_index}].missing != -1) || ({condition})")
                } else {
                    format!(" (data[{split_index}].missing != -1) && ({condition})")
                }
            }
            NodePayload::CategoricalCondition {
                split_index,
                default_left,
                category_list,
                category_list_right_child,
                ..
            } => self.categorical_condition(
                *split_index,
                *default_left,
                category_list,
                *category_list_right_child,
            ),
            _ => unreachable!("emit_condition on a non-condition node"),
        };

        debug_assert_eq!(node.children.len(), 2);
        let (left, right) = (node.children[0], node.children[1]);
        if let (Some(left_freq), Some(right_freq)) =
            (self.ast.node(left).data_count, self.ast.node(right).data_count)
        {
            let keyword = if left_freq > right_freq { "LIKELY" } else { "UNLIKELY" };
            condition_with_na_check = format!(" {keyword}( {condition_with_na_check} ) ");
        }

        self.code.push_fragment(format!("if ({condition_with_na_check}) {{\n"));
        self.code.change_indent(1);
        self.emit(left)?;
        self.code.change_indent(-1);
        self.code.push_fragment("} else {");
        self.code.change_indent(1);
        self.emit(right)?;
        self.code.change_indent(-1);
        self.code.push_fragment("}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_packs_64_categories_per_word() {
        assert_eq!(categorical_bitmap(&[1, 3, 5]), vec![0b101010]);
        assert_eq!(categorical_bitmap(&[]), vec![0]);

        let bitmap = categorical_bitmap(&[0, 65]);
        assert_eq!(bitmap.len(), 2);
        assert_eq!(bitmap[0], 1);
        assert_eq!(bitmap[1], 2);

        let bitmap = categorical_bitmap(&[63, 64]);
        assert_eq!(bitmap, vec![1u64 << 63, 1]);
    }
}
