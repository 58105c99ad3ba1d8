//! Compiler parameters, parsed from a JSON object.

use crate::error::{Error, Result};

/// Knobs controlling the compiler pipeline.
///
/// Parsed from a JSON object; unknown keys, type mismatches and
/// out-of-range values are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerParam {
    /// Path to a branch-annotation JSON file; `"NULL"` disables.
    pub annotate_in: String,
    /// If positive, quantize numerical thresholds into bin indices.
    pub quantize: i32,
    /// If positive, split the prediction function into this many
    /// translation units.
    pub parallel_comp: i32,
    /// If positive, emit progress on the info log.
    pub verbose: i32,
    /// Target name recorded in `recipe.json`.
    pub native_lib_name: String,
}

impl Default for CompilerParam {
    fn default() -> Self {
        Self {
            annotate_in: "NULL".to_string(),
            quantize: 0,
            parallel_comp: 0,
            verbose: 0,
            native_lib_name: "predictor".to_string(),
        }
    }
}

impl CompilerParam {
    /// Parse parameters from a JSON object string.
    pub fn parse_json(json_str: &str) -> Result<Self> {
        let doc: serde_json::Value = serde_json::from_str(json_str)
            .map_err(|e| Error::InvalidParam(format!("got an invalid JSON string: {e}")))?;
        let obj = doc
            .as_object()
            .ok_or_else(|| Error::InvalidParam("expected a JSON object".to_string()))?;

        let mut param = CompilerParam::default();
        for (key, value) in obj {
            match key.as_str() {
                "annotate_in" => {
                    param.annotate_in = expect_string(key, value)?;
                }
                "quantize" => {
                    param.quantize = expect_non_negative_int(key, value)?;
                }
                "parallel_comp" => {
                    param.parallel_comp = expect_non_negative_int(key, value)?;
                }
                "verbose" => {
                    param.verbose = expect_int(key, value)?;
                }
                "native_lib_name" => {
                    param.native_lib_name = expect_string(key, value)?;
                }
                _ => {
                    return Err(Error::InvalidParam(format!("unrecognized key '{key}' in JSON")));
                }
            }
        }
        Ok(param)
    }

    /// Whether an annotation file should be loaded.
    #[inline]
    pub fn has_annotation(&self) -> bool {
        self.annotate_in != "NULL"
    }
}

fn expect_string(key: &str, value: &serde_json::Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidParam(format!("expected a string for '{key}'")))
}

fn expect_int(key: &str, value: &serde_json::Value) -> Result<i32> {
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| Error::InvalidParam(format!("expected an integer for '{key}'")))
}

fn expect_non_negative_int(key: &str, value: &serde_json::Value) -> Result<i32> {
    let v = expect_int(key, value)?;
    if v < 0 {
        return Err(Error::InvalidParam(format!("'{key}' must be 0 or greater")));
    }
    Ok(v)
}
