//! Emit the `postprocess()` function body.

use super::CLiteral;
use crate::compiler::ast::ModelMeta;
use crate::error::{Error, Result};

fn exp_func(ctype: &str) -> &'static str {
    if ctype == "float" { "expf" } else { "exp" }
}

fn identity(ctype: &str) -> String {
    format!(
        "\n\
void postprocess({ctype}* result) {{
  // Do nothing
}}"
    )
}

fn signed_square(ctype: &str) -> String {
    let copysign = if ctype == "float" { "copysignf" } else { "copysign" };
    format!(
        "\n\
void postprocess({ctype}* result) {{
  // signed_square
  {ctype} margin;
  for (size_t i = 0; i < N_TARGET * MAX_N_CLASS; ++i) {{
    margin = result[i];
    result[i] = {copysign}(margin * margin, margin);
  }}
}}"
    )
}

fn hinge(ctype: &str) -> String {
    format!(
        "\n\
void postprocess({ctype}* result) {{
  // hinge
  for (size_t i = 0; i < N_TARGET * MAX_N_CLASS; ++i) {{
    if (result[i] > 0) {{
      result[i] = ({ctype})(1);
    }} else {{
      result[i] = ({ctype})(0);
    }}
  }}
}}"
    )
}

fn sigmoid(meta: &ModelMeta, ctype: &str) -> Result<String> {
    let alpha = meta.sigmoid_alpha;
    if alpha <= 0.0 {
        return Err(Error::InvalidModel("sigmoid: alpha must be strictly positive".to_string()));
    }
    let exp = exp_func(ctype);
    Ok(format!(
        "\n\
void postprocess({ctype}* result) {{
  // sigmoid
  const {ctype} alpha = ({ctype}){alpha};
  for (size_t i = 0; i < N_TARGET * MAX_N_CLASS; ++i) {{
    result[i] = ({ctype})(1) / (({ctype})(1) + {exp}(-alpha * result[i]));
  }}
}}",
        alpha = alpha.c_literal()
    ))
}

fn exponential(ctype: &str) -> String {
    let exp = exp_func(ctype);
    format!(
        "\n\
void postprocess({ctype}* result) {{
  // exponential
  for (size_t i = 0; i < N_TARGET * MAX_N_CLASS; ++i) {{
    result[i] = {exp}(result[i]);
  }}
}}"
    )
}

fn exponential_standard_ratio(meta: &ModelMeta, ctype: &str) -> String {
    let exp2 = if ctype == "float" { "exp2f" } else { "exp2" };
    format!(
        "\n\
void postprocess({ctype}* result) {{
  // exponential_standard_ratio
  const {ctype} ratio_c = ({ctype}){ratio_c};
  for (size_t i = 0; i < N_TARGET * MAX_N_CLASS; ++i) {{
    result[i] = {exp2}(-result[i] / ratio_c);
  }}
}}",
        ratio_c = meta.ratio_c.c_literal()
    )
}

fn logarithm_one_plus_exp(ctype: &str) -> String {
    let exp = exp_func(ctype);
    let log1p = if ctype == "float" { "log1pf" } else { "log1p" };
    format!(
        "\n\
void postprocess({ctype}* result) {{
  // logarithm_one_plus_exp
  for (size_t i = 0; i < N_TARGET * MAX_N_CLASS; ++i) {{
    result[i] = {log1p}({exp}(result[i]));
  }}
}}"
    )
}

/// Per-target slice calls appended to the softmax / ova bodies.
fn per_target_calls(meta: &ModelMeta) -> String {
    let max_num_class = meta.max_num_class();
    (0..meta.num_target)
        .map(|target_id| {
            format!(
                "  postprocess_impl(&result[{}], {});\n",
                target_id * max_num_class,
                meta.num_class[target_id as usize]
            )
        })
        .collect()
}

fn softmax(meta: &ModelMeta, ctype: &str) -> String {
    let exp = exp_func(ctype);
    format!(
        "\n\
// Apply postprocessor for a single target
static void postprocess_impl({ctype}* target_result, int num_class) {{
  {ctype} max_margin = target_result[0];
  double norm_const = 0.0;
  {ctype} t;
  for (int k = 1; k < num_class; ++k) {{
    if (target_result[k] > max_margin) {{
      max_margin = target_result[k];
    }}
  }}
  for (int k = 0; k < num_class; ++k) {{
    t = {exp}(target_result[k] - max_margin);
    norm_const += t;
    target_result[k] = t;
  }}
  for (int k = 0; k < num_class; ++k) {{
    target_result[k] /= ({ctype})norm_const;
  }}
}}

void postprocess({ctype}* result) {{
  // softmax
{calls}}}",
        calls = per_target_calls(meta)
    )
}

fn multiclass_ova(meta: &ModelMeta, ctype: &str) -> Result<String> {
    let alpha = meta.sigmoid_alpha;
    if alpha <= 0.0 {
        return Err(Error::InvalidModel(
            "multiclass_ova: alpha must be strictly positive".to_string(),
        ));
    }
    let exp = exp_func(ctype);
    Ok(format!(
        "\n\
// Apply postprocessor for a single target
static void postprocess_impl({ctype}* target_result, int num_class) {{
  const {ctype} alpha = ({ctype}){alpha};
  for (int k = 0; k < num_class; ++k) {{
    target_result[k] =
      ({ctype})(1) / (({ctype})(1) + {exp}(-alpha * target_result[k]));
  }}
}}

void postprocess({ctype}* result) {{
  // multiclass_ova
{calls}}}",
        alpha = alpha.c_literal(),
        calls = per_target_calls(meta)
    ))
}

/// Body of `postprocess()` for one of the ten recognized postprocessors.
/// Anything else is rejected.
pub(crate) fn postprocessor_func(meta: &ModelMeta, name: &str, ctype: &str) -> Result<String> {
    match name {
        "identity" => Ok(identity(ctype)),
        "signed_square" => Ok(signed_square(ctype)),
        "hinge" => Ok(hinge(ctype)),
        "sigmoid" => sigmoid(meta, ctype),
        "exponential" => Ok(exponential(ctype)),
        "exponential_standard_ratio" => Ok(exponential_standard_ratio(meta, ctype)),
        "logarithm_one_plus_exp" => Ok(logarithm_one_plus_exp(ctype)),
        // Same body as identity; the names stay distinct.
        "identity_multiclass" => Ok(identity(ctype)),
        "softmax" => Ok(softmax(meta, ctype)),
        "multiclass_ova" => multiclass_ova(meta, ctype),
        _ => Err(Error::InvalidModel(format!("unknown postprocessor function: {name}"))),
    }
}
