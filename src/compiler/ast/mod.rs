//! Abstract syntax tree sitting between the model and C emission.
//!
//! Nodes live in an arena owned by [`AstBuilder`]; parent and child links
//! are arena indices, so no reference cycles exist. Payload variants mirror
//! the node kinds the code generator dispatches on. Common fields
//! (`tree_id`, `node_id`, optional statistics) live directly on
//! [`AstNode`].
//!
//! Pass ordering is fixed:
//! `build → load_data_counts? → split_into_tus? → generate_is_categorical_array? → quantize_thresholds?`.
//! Each pass assumes its predecessors; the quantize and split passes verify
//! their own idempotence guards and fail with an invalid-state error when
//! called out of order.

mod build;
mod counts;
mod dump;
mod quantize;
mod split;

use crate::model::{DataType, Operator};

/// Arena index of an AST node.
pub type AstNodeId = usize;

// =============================================================================
// Values typed over the model's element width
// =============================================================================

/// A threshold value, carrying the model's element width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdValue {
    F32(f32),
    F64(f64),
}

impl ThresholdValue {
    #[inline]
    pub fn is_finite(self) -> bool {
        match self {
            ThresholdValue::F32(v) => v.is_finite(),
            ThresholdValue::F64(v) => v.is_finite(),
        }
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        match self {
            ThresholdValue::F32(v) => v as f64,
            ThresholdValue::F64(v) => v,
        }
    }
}

/// Leaf output vector, carrying the model's element width.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafOutput {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl LeafOutput {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            LeafOutput::F32(v) => v.len(),
            LeafOutput::F64(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `i`, widened to f64.
    #[inline]
    pub fn get(&self, i: usize) -> f64 {
        match self {
            LeafOutput::F32(v) => v[i] as f64,
            LeafOutput::F64(v) => v[i],
        }
    }
}

/// Per-feature ascending unique threshold lists collected by the quantize
/// pass, carrying the model's element width.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdList {
    F32(Vec<Vec<f32>>),
    F64(Vec<Vec<f64>>),
}

impl ThresholdList {
    /// Number of thresholds for feature `fid`.
    #[inline]
    pub fn len_for(&self, fid: usize) -> usize {
        match self {
            ThresholdList::F32(lists) => lists[fid].len(),
            ThresholdList::F64(lists) => lists[fid].len(),
        }
    }

    /// Number of features covered.
    #[inline]
    pub fn num_feature(&self) -> usize {
        match self {
            ThresholdList::F32(lists) => lists.len(),
            ThresholdList::F64(lists) => lists.len(),
        }
    }

    /// Total number of thresholds across all features.
    pub fn total(&self) -> usize {
        match self {
            ThresholdList::F32(lists) => lists.iter().map(Vec::len).sum(),
            ThresholdList::F64(lists) => lists.iter().map(Vec::len).sum(),
        }
    }
}

// =============================================================================
// Node payloads
// =============================================================================

/// Payload of an AST node, one variant per node kind.
#[derive(Debug, Clone)]
pub enum NodePayload {
    /// Root of the AST. Exactly one child: a Quantizer or a Function.
    Main {
        /// Flattened `[num_target, max_num_class]` offsets.
        base_scores: Vec<f64>,
        /// Per-slot tree counts; present iff tree averaging is enabled.
        average_factor: Option<Vec<i32>>,
        /// Postprocessor name applied after the raw sum.
        postprocessor: String,
    },
    /// One emitted `.c` file holding a subset of trees. Exactly one child
    /// (a Function).
    TranslationUnit { unit_id: i32 },
    /// Owner of the per-feature threshold lists. Exactly one child
    /// (a Function).
    Quantizer { threshold_list: ThresholdList },
    /// Grouping node for tree subtrees or translation units.
    Function,
    /// Numerical test. Exactly two children (left, right).
    NumericalCondition {
        split_index: u32,
        default_left: bool,
        gain: Option<f64>,
        op: Operator,
        threshold: ThresholdValue,
        /// Bin index substituted by the quantize pass; finite thresholds only.
        quantized_threshold: Option<i32>,
        /// Quantized value of 0.0, set alongside `quantized_threshold`.
        zero_quantized: i32,
    },
    /// Categorical test. Exactly two children (left, right).
    CategoricalCondition {
        split_index: u32,
        default_left: bool,
        gain: Option<f64>,
        /// Ascending category values routed to the left child (or the
        /// right, when `category_list_right_child` is set).
        category_list: Vec<u32>,
        category_list_right_child: bool,
    },
    /// Leaf contribution. No children.
    Output {
        target_id: i32,
        class_id: i32,
        leaf_output: LeafOutput,
    },
}

/// An AST node: common fields plus the kind-specific payload.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub parent: Option<AstNodeId>,
    pub children: Vec<AstNodeId>,
    /// Tree the node was transcribed from; -1 for synthetic nodes.
    pub tree_id: i32,
    /// Node id within the source tree; -1 for synthetic nodes.
    pub node_id: i32,
    /// Training-data visit count, from the model or an annotation file.
    pub data_count: Option<u64>,
    /// Hessian sum, from the model.
    pub sum_hess: Option<f64>,
    pub payload: NodePayload,
}

// =============================================================================
// Model metadata shared by all nodes
// =============================================================================

/// Pipeline-wide metadata describing the compiled model.
#[derive(Debug, Clone)]
pub struct ModelMeta {
    pub num_target: i32,
    /// `num_class[i]`: number of classes in the i-th target.
    pub num_class: Vec<i32>,
    pub leaf_vector_shape: [i32; 2],
    pub num_feature: i32,
    /// `is_categorical[i]`: does feature `i` appear in a categorical test?
    /// Populated by `generate_is_categorical_array`.
    pub is_categorical: Vec<bool>,
    pub sigmoid_alpha: f32,
    pub ratio_c: f32,
    /// Element width shared by thresholds and leaf outputs.
    pub data_type: DataType,
}

impl ModelMeta {
    /// Largest class count across targets.
    #[inline]
    pub fn max_num_class(&self) -> i32 {
        self.num_class.iter().copied().max().unwrap_or(1)
    }
}

// =============================================================================
// AstBuilder
// =============================================================================

/// Arena-owning AST with the optimization passes as methods.
///
/// Created by [`AstBuilder::build`]; the root is always a Main node.
#[derive(Debug, Clone)]
pub struct AstBuilder {
    nodes: Vec<AstNode>,
    root: AstNodeId,
    meta: ModelMeta,
}

impl AstBuilder {
    /// The Main node at the root.
    #[inline]
    pub fn root(&self) -> AstNodeId {
        self.root
    }

    /// Immutable access to a node.
    #[inline]
    pub fn node(&self, id: AstNodeId) -> &AstNode {
        &self.nodes[id]
    }

    /// Mutable access to a node.
    #[inline]
    pub(crate) fn node_mut(&mut self, id: AstNodeId) -> &mut AstNode {
        &mut self.nodes[id]
    }

    /// Pipeline-wide model metadata.
    #[inline]
    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    #[inline]
    pub(crate) fn meta_mut(&mut self) -> &mut ModelMeta {
        &mut self.meta
    }

    /// Number of nodes in the arena.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Allocate a node, linking it to `parent` (but not into the parent's
    /// child list; callers order children explicitly).
    pub(crate) fn add_node(&mut self, parent: Option<AstNodeId>, payload: NodePayload) -> AstNodeId {
        let id = self.nodes.len();
        self.nodes.push(AstNode {
            parent,
            children: Vec::new(),
            tree_id: -1,
            node_id: -1,
            data_count: None,
            sum_hess: None,
            payload,
        });
        id
    }

    pub(crate) fn new_arena(meta: ModelMeta, root_payload: NodePayload) -> Self {
        let mut builder = Self {
            nodes: Vec::new(),
            root: 0,
            meta,
        };
        builder.root = builder.add_node(None, root_payload);
        builder
    }
}
