//! Typed, read-only model input to the compiler pipeline.
//!
//! A [`Model`] bundles a tree ensemble with the metadata the code generator
//! needs: output layout (`num_target`, `num_class`, leaf-vector shape), base
//! scores, the postprocessor name and its parameters, and the per-tree
//! target/class assignments. Threshold and leaf-output element types are
//! bound together and fixed for the whole model via [`TreesVariant`].
//!
//! The pipeline never mutates a model; construction happens up front through
//! [`Tree`]'s builder methods.

mod tree;

pub use tree::{CategoryListStorage, NodeId, Tree};

use crate::error::{Error, Result};

// =============================================================================
// Element types
// =============================================================================

/// Floating-point width used for thresholds and leaf outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Float32,
    Float64,
}

impl DataType {
    /// Canonical name, as reported by the generated library's
    /// `get_threshold_type()` / `get_leaf_output_type()`.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// C type spelled in generated source.
    #[inline]
    pub fn c_type(self) -> &'static str {
        match self {
            DataType::Float32 => "float",
            DataType::Float64 => "double",
        }
    }

    /// Parse a canonical type name.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            _ => Err(Error::Abi(format!("unrecognized data type string: '{s}'"))),
        }
    }
}

// =============================================================================
// Split tests
// =============================================================================

/// Kind of test performed at an internal tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitType {
    /// Compare the feature value against a threshold.
    Numerical,
    /// Test membership of the (truncated) feature value in a category list.
    Categorical,
}

/// Comparison operator of a numerical test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
}

impl Operator {
    /// Spelling used both in generated C and in AST dumps.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }

    /// Evaluate `lhs op rhs`.
    #[inline]
    pub fn compare<T: PartialOrd + PartialEq>(self, lhs: T, rhs: T) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Le => lhs <= rhs,
            Operator::Eq => lhs == rhs,
            Operator::Gt => lhs > rhs,
            Operator::Ge => lhs >= rhs,
        }
    }
}

impl Default for Operator {
    fn default() -> Self {
        Operator::Lt
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for SplitType {
    fn default() -> Self {
        SplitType::Numerical
    }
}

// =============================================================================
// Model
// =============================================================================

/// The tree ensemble, monomorphized over the threshold/leaf element type.
///
/// Only one variant is ever present for a given model; every pipeline stage
/// dispatches on it once and stays monomorphic from there.
#[derive(Debug, Clone)]
pub enum TreesVariant {
    F32(Vec<Tree<f32>>),
    F64(Vec<Tree<f64>>),
}

impl TreesVariant {
    /// Number of trees in the ensemble.
    #[inline]
    pub fn num_trees(&self) -> usize {
        match self {
            TreesVariant::F32(trees) => trees.len(),
            TreesVariant::F64(trees) => trees.len(),
        }
    }

    /// Element type shared by thresholds and leaf outputs.
    #[inline]
    pub fn data_type(&self) -> DataType {
        match self {
            TreesVariant::F32(_) => DataType::Float32,
            TreesVariant::F64(_) => DataType::Float64,
        }
    }
}

/// A decision-tree ensemble model, ready for compilation.
///
/// `target_id[i]` / `class_id[i]` name the output slot tree `i` contributes
/// to; `-1` means "applies to all targets (resp. classes)". `base_scores` is
/// flattened over `[num_target, max_num_class]`.
#[derive(Debug, Clone)]
pub struct Model {
    pub num_target: i32,
    /// `num_class[i]`: number of classes in the i-th target.
    pub num_class: Vec<i32>,
    /// Shape of each leaf output: `[1,1]`, `[num_target,1]`,
    /// `[1,max_num_class]` or `[num_target,max_num_class]`.
    pub leaf_vector_shape: [i32; 2],
    pub num_feature: i32,
    /// Flattened `[num_target, max_num_class]` offsets added to raw sums.
    pub base_scores: Vec<f64>,
    /// One of the ten recognized postprocessor names.
    pub postprocessor: String,
    /// Scale parameter of the `sigmoid` / `multiclass_ova` postprocessors.
    pub sigmoid_alpha: f32,
    /// Scale parameter of the `exponential_standard_ratio` postprocessor.
    pub ratio_c: f32,
    /// Whether raw sums are divided by per-slot tree counts.
    pub average_tree_output: bool,
    /// Per-tree target assignment; -1 = all targets.
    pub target_id: Vec<i32>,
    /// Per-tree class assignment; -1 = all classes.
    pub class_id: Vec<i32>,
    pub trees: TreesVariant,
}

impl Model {
    /// Number of trees in the ensemble.
    #[inline]
    pub fn num_trees(&self) -> usize {
        self.trees.num_trees()
    }

    /// Largest class count across targets.
    #[inline]
    pub fn max_num_class(&self) -> i32 {
        self.num_class.iter().copied().max().unwrap_or(1)
    }

    /// Element type of thresholds and leaf outputs.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.trees.data_type()
    }

    /// Validate per-tree metadata lengths and the structure of every tree.
    pub fn validate(&self) -> Result<()> {
        if self.num_class.len() != self.num_target as usize {
            return Err(Error::InvalidModel(format!(
                "num_class has {} entries; expected num_target = {}",
                self.num_class.len(),
                self.num_target
            )));
        }
        let num_trees = self.num_trees();
        if self.target_id.len() != num_trees || self.class_id.len() != num_trees {
            return Err(Error::InvalidModel(format!(
                "target_id/class_id must have one entry per tree ({num_trees}); \
                 got {} and {}",
                self.target_id.len(),
                self.class_id.len()
            )));
        }
        match &self.trees {
            TreesVariant::F32(trees) => trees.iter().try_for_each(Tree::validate),
            TreesVariant::F64(trees) => trees.iter().try_for_each(Tree::validate),
        }
    }
}
