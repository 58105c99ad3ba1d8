//! treec: compile decision-tree ensembles into portable C source.
//!
//! The compiler lowers a typed tree-ensemble [`Model`] into an abstract
//! syntax tree, applies a fixed sequence of optimization passes
//! (branch-annotation loading, translation-unit splitting, threshold
//! quantization, categorical-feature discovery) and emits multi-file C99
//! source with a build recipe. Compiled with any C compiler, the output
//! forms a shared library exposing a `predict` entry point.
//!
//! Two adjacent subsystems share the compiler's contract:
//!
//! - The [branch annotator](annotator), which runs the ensemble over a
//!   training matrix in parallel to produce per-node visit counts used as
//!   branch-prediction hints.
//! - The [predictor](predictor), which dynamically loads the compiled
//!   shared library and drives batched inference.
//!
//! # Example
//!
//! ```ignore
//! use treec::{compile_model, CompilerParam, Model};
//!
//! let model: Model = /* build or ingest an ensemble */;
//! let param = CompilerParam::parse_json(r#"{"quantize": 1}"#)?;
//! compile_model(&model, &param, "./out".as_ref())?;
//! // ./out now holds header.h, main.c, quantize.c and recipe.json
//! ```

pub mod annotator;
pub mod compiler;
pub mod data;
pub mod error;
pub mod model;
pub mod predictor;
pub mod threading;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use annotator::{annotate_branch, load_annotation, save_annotation, BranchAnnotator};
pub use compiler::{compile_model, dump_ast, CompilerParam};
pub use data::{CsrMatrix, DMatrix, DenseMatrix};
pub use error::{Error, Result};
pub use model::{DataType, Model, Operator, SplitType, Tree, TreesVariant};
pub use predictor::Predictor;
