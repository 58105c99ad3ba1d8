//! Emit the header, query functions and the body of `predict()`.

use super::{ArrayFormatter, CLiteral, CodeGenerator};
use crate::compiler::ast::{AstNodeId, NodePayload};
use crate::error::{Error, Result};

const DLLEXPORT: &str = if cfg!(windows) { "__declspec(dllexport) " } else { "" };

fn render_is_categorical_array(is_categorical: &[bool]) -> String {
    if is_categorical.is_empty() {
        return String::new();
    }
    let mut formatter = ArrayFormatter::new(80, 2);
    for &e in is_categorical {
        formatter.push(i32::from(e));
    }
    format!("const unsigned char is_categorical[] = {{{}}};", formatter.into_string())
}

fn render_num_class_array(num_class: &[i32]) -> String {
    let mut formatter = ArrayFormatter::new(80, 2);
    for &e in num_class {
        formatter.push(e);
    }
    format!("static const int32_t num_class[] = {{{}}};", formatter.into_string())
}

impl CodeGenerator<'_> {
    pub(crate) fn emit_main(&mut self, id: AstNodeId) -> Result<()> {
        let (base_scores, average_factor, postprocessor) = match &self.ast.node(id).payload {
            NodePayload::Main {
                base_scores,
                average_factor,
                postprocessor,
            } => (base_scores.clone(), average_factor.clone(), postprocessor.clone()),
            _ => unreachable!("emit_main on a non-Main node"),
        };

        let meta = self.ast.meta();
        let num_target = meta.num_target;
        let num_class = meta.num_class.clone();
        let max_num_class = meta.max_num_class();
        let num_feature = meta.num_feature;
        let threshold_ctype = self.threshold_ctype();
        let leaf_output_ctype = self.leaf_output_ctype();
        let type_str = meta.data_type.as_str();

        if base_scores.len() < (num_target * max_num_class) as usize {
            return Err(Error::InvalidModel(format!(
                "base_scores has {} entries; expected num_target * max_num_class = {}",
                base_scores.len(),
                num_target * max_num_class
            )));
        }

        self.code.switch_to_file("header.h");
        self.code.push_fragment(format!(
            "\
#include <stdio.h>
#include <stdlib.h>
#include <string.h>
#include <float.h>
#include <math.h>
#include <stdint.h>

#if defined(__clang__) || defined(__GNUC__)
#define LIKELY(x)   __builtin_expect(!!(x), 1)
#define UNLIKELY(x) __builtin_expect(!!(x), 0)
#else
#define LIKELY(x)   (x)
#define UNLIKELY(x) (x)
#endif

#define N_TARGET {num_target}
#define MAX_N_CLASS {max_num_class}

/* missing == -1 marks an absent feature; fvalue holds the feature value
   otherwise; qvalue replaces fvalue once inputs are quantized. */
union Entry {{
  int missing;
  {threshold_ctype} fvalue;
  int qvalue;
}};

{DLLEXPORT}int32_t get_num_target(void);
{DLLEXPORT}void get_num_class(int32_t* out);
{DLLEXPORT}int32_t get_num_feature(void);
{DLLEXPORT}const char* get_threshold_type(void);
{DLLEXPORT}const char* get_leaf_output_type(void);
{DLLEXPORT}void predict(union Entry* data, int pred_margin, {leaf_output_ctype}* result);
void postprocess({leaf_output_ctype}* result);"
        ));

        self.code.switch_to_file("main.c");
        self.code.push_fragment(format!(
            "\
#include \"header.h\"

{array_is_categorical}
{array_num_class}

int32_t get_num_target(void) {{
  return N_TARGET;
}}
void get_num_class(int32_t* out) {{
  for (int i = 0; i < N_TARGET; ++i) {{
    out[i] = num_class[i];
  }}
}}
int32_t get_num_feature(void) {{
  return {num_feature};
}}
const char* get_threshold_type(void) {{
  return \"{type_str}\";
}}
const char* get_leaf_output_type(void) {{
  return \"{type_str}\";
}}

void predict(union Entry* data, int pred_margin, {leaf_output_ctype}* result) {{",
            array_is_categorical = render_is_categorical_array(&meta.is_categorical),
            array_num_class = render_num_class_array(&num_class),
        ));
        self.code.change_indent(1);

        debug_assert_eq!(self.ast.node(id).children.len(), 1);
        self.emit(self.ast.node(id).children[0])?;

        if let Some(average_factor) = &average_factor {
            self.code.push_fragment("\n// Average tree outputs");
            for target_id in 0..num_target {
                for class_id in 0..num_class[target_id as usize] {
                    let offset = target_id * max_num_class + class_id;
                    self.code.push_fragment(format!(
                        "result[{offset}] /= {};",
                        average_factor[offset as usize]
                    ));
                }
            }
        }

        self.code.push_fragment("\n// Apply base_scores");
        for target_id in 0..num_target {
            for class_id in 0..num_class[target_id as usize] {
                let offset = target_id * max_num_class + class_id;
                self.code.push_fragment(format!(
                    "result[{offset}] += {};",
                    base_scores[offset as usize].c_literal()
                ));
            }
        }

        self.code.push_fragment(
            "\n// Apply postprocessor\nif (!pred_margin) { postprocess(result); }",
        );
        self.code.change_indent(-1);
        self.code.push_fragment("}");

        let postprocessor_func = super::postprocessor::postprocessor_func(
            self.ast.meta(),
            &postprocessor,
            leaf_output_ctype,
        )?;
        self.code.push_fragment(postprocessor_func);
        Ok(())
    }
}
