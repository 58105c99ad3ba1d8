//! Emit the feature-value quantization arrays and lookup function.

use super::{ArrayFormatter, CodeGenerator};
use crate::compiler::ast::{AstNodeId, NodePayload, ThresholdList};
use crate::error::Result;

/// Render the three arrays backing `quantize()`: the flattened ascending
/// threshold list, per-feature offsets and per-feature counts.
fn render_arrays(threshold_list: &ThresholdList) -> (String, String, String, usize) {
    let mut thresholds = ArrayFormatter::new(80, 2);
    match threshold_list {
        ThresholdList::F32(lists) => {
            for list in lists {
                for &v in list {
                    thresholds.push(v);
                }
            }
        }
        ThresholdList::F64(lists) => {
            for list in lists {
                for &v in list {
                    thresholds.push(v);
                }
            }
        }
    }

    let mut th_begin = ArrayFormatter::new(80, 2);
    let mut accum = 0usize;
    for fid in 0..threshold_list.num_feature() {
        th_begin.push(accum);
        accum += threshold_list.len_for(fid);
    }

    let mut th_len = ArrayFormatter::new(80, 2);
    for fid in 0..threshold_list.num_feature() {
        th_len.push(threshold_list.len_for(fid));
    }

    (thresholds.into_string(), th_begin.into_string(), th_len.into_string(), accum)
}

impl CodeGenerator<'_> {
    /// Emit the per-row quantize loop into the current file, the
    /// `quantize()` prototype into the header and its arrays plus body into
    /// `quantize.c`, then descend into the wrapped Function.
    ///
    /// When no feature carries a finite threshold there is nothing to
    /// quantize and no `quantize.c` is produced.
    pub(crate) fn emit_quantizer(&mut self, id: AstNodeId) -> Result<()> {
        let threshold_list = match &self.ast.node(id).payload {
            NodePayload::Quantizer { threshold_list } => threshold_list,
            _ => unreachable!("emit_quantizer on a non-quantizer node"),
        };
        let threshold_ctype = self.threshold_ctype();
        let num_feature = self.ast.meta().num_feature;
        let (array_threshold, array_th_begin, array_th_len, total_num_threshold) =
            render_arrays(threshold_list);

        if !array_threshold.is_empty() && !array_th_begin.is_empty() && !array_th_len.is_empty() {
            self.code.push_fragment(format!(
                "\n\
// Quantize data
for (int i = 0; i < {num_feature}; ++i) {{
  if (data[i].missing != -1 && !is_categorical[i]) {{
    data[i].qvalue = quantize(data[i].fvalue, i);
  }}
}}\n"
            ));

            let signature = format!("int quantize({threshold_ctype} val, unsigned fid)");
            let caller_file = self.code.current_file();
            self.code.switch_to_file("header.h");
            self.code.push_fragment(format!("{signature};"));

            self.code.switch_to_file("quantize.c");
            self.code.push_fragment(format!(
                "\
#include \"header.h\"

static const {threshold_ctype} threshold[] = {{
{array_threshold}
}};

static const int th_begin[] = {{
{array_th_begin}
}};

static const int th_len[] = {{
{array_th_len}
}};"
            ));
            self.code.push_fragment(format!(
                "\n\
/*
 * \\brief Function to convert a feature value into bin index.
 * \\param val Feature value, in floating-point
 * \\param fid Feature identifier
 * \\return bin Index corresponding to given feature value
 */
{signature} {{
  const size_t offset = th_begin[fid];
  const {threshold_ctype}* array = &threshold[offset];
  int len = th_len[fid];
  int low = 0;
  int high = len;
  int mid;
  {threshold_ctype} mval;
  // It is possible th_begin[i] == [total_num_threshold]. This means that
  // all features i, (i+1), ... are not used for any of the splits in the model.
  // So in this case, just return something
  if (offset == {total_num_threshold} || val < array[0]) {{
    return -10;
  }}
  while (low + 1 < high) {{
    mid = (low + high) / 2;
    mval = array[mid];
    if (val == mval) {{
      return mid * 2;
    }} else if (val < mval) {{
      high = mid;
    }} else {{
      low = mid;
    }}
  }}
  if (array[low] == val) {{
    return low * 2;
  }} else if (high == len) {{
    return len * 2;
  }} else {{
    return low * 2 + 1;
  }}
}}"
            ));
            self.code.switch_to_file(&caller_file);
        }

        debug_assert_eq!(self.ast.node(id).children.len(), 1);
        self.emit(self.ast.node(id).children[0])
    }
}
