//! Branch annotation: per-node visit counts over a training matrix.
//!
//! The annotator runs every row of a matrix through every tree, counting
//! node visits. The resulting ragged `counts[tree_id][node_id]` tensor is
//! persisted as JSON and later spliced into the AST, where it seeds the
//! LIKELY/UNLIKELY branch-prediction hints in the generated C.

use std::io::{Read, Write};
use std::sync::Mutex;

use crate::data::{CsrMatrix, DMatrix, DenseMatrix, MatrixElement};
use crate::error::{Error, Result};
use crate::model::{Model, NodeId, SplitType, Tree, TreesVariant};
use crate::threading::{parallel_for, split_ranges, ParallelSchedule, ThreadConfig};

/// Per-node visit counts, indexed by tree then node id.
pub type AnnotationCounts = Vec<Vec<u64>>;

// =============================================================================
// BranchAnnotator
// =============================================================================

/// Holder for branch-annotation counts.
#[derive(Debug, Clone, Default)]
pub struct BranchAnnotator {
    counts: AnnotationCounts,
}

impl BranchAnnotator {
    /// Wrap precomputed counts.
    pub fn from_counts(counts: AnnotationCounts) -> Self {
        Self { counts }
    }

    /// Run the ensemble over `dmat` and collect visit counts.
    ///
    /// Rows are processed in 20 equal bands with a progress message between
    /// bands when `verbose > 0`. Within a band, rows are divided statically
    /// among workers; each worker increments its own slice of a flat
    /// per-thread buffer, and the slices are reduced in worker order after
    /// all rows are done.
    pub fn annotate(model: &Model, dmat: &DMatrix, nthread: i32, verbose: i32) -> Result<Self> {
        let config = ThreadConfig::new(nthread)?;
        let counts = match (&model.trees, dmat) {
            (TreesVariant::F32(trees), DMatrix::DenseF32(m)) => {
                annotate_dense(trees, m, &config, verbose)?
            }
            (TreesVariant::F32(trees), DMatrix::DenseF64(m)) => {
                annotate_dense(trees, m, &config, verbose)?
            }
            (TreesVariant::F32(trees), DMatrix::CsrF32(m)) => {
                annotate_csr(trees, m, &config, verbose)?
            }
            (TreesVariant::F32(trees), DMatrix::CsrF64(m)) => {
                annotate_csr(trees, m, &config, verbose)?
            }
            (TreesVariant::F64(trees), DMatrix::DenseF32(m)) => {
                annotate_dense(trees, m, &config, verbose)?
            }
            (TreesVariant::F64(trees), DMatrix::DenseF64(m)) => {
                annotate_dense(trees, m, &config, verbose)?
            }
            (TreesVariant::F64(trees), DMatrix::CsrF32(m)) => {
                annotate_csr(trees, m, &config, verbose)?
            }
            (TreesVariant::F64(trees), DMatrix::CsrF64(m)) => {
                annotate_csr(trees, m, &config, verbose)?
            }
        };
        Ok(Self { counts })
    }

    /// The counts tensor.
    #[inline]
    pub fn counts(&self) -> &AnnotationCounts {
        &self.counts
    }

    /// Consume the annotator, yielding the counts tensor.
    pub fn into_counts(self) -> AnnotationCounts {
        self.counts
    }

    /// Serialize counts as a JSON array of arrays of unsigned integers.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.counts)?;
        Ok(())
    }

    /// Deserialize counts saved by [`BranchAnnotator::save`].
    ///
    /// Anything other than a list of lists of unsigned integers is rejected.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let counts: AnnotationCounts = serde_json::from_reader(reader)?;
        Ok(Self { counts })
    }
}

// =============================================================================
// File-level convenience API
// =============================================================================

/// Annotate `model` over `dmat`, returning the counts tensor.
pub fn annotate_branch(
    model: &Model,
    dmat: &DMatrix,
    nthread: i32,
    verbose: i32,
) -> Result<AnnotationCounts> {
    Ok(BranchAnnotator::annotate(model, dmat, nthread, verbose)?.into_counts())
}

/// Save a counts tensor to a JSON file.
pub fn save_annotation(counts: &AnnotationCounts, path: &std::path::Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
    BranchAnnotator::from_counts(counts.clone()).save(std::io::BufWriter::new(file))
}

/// Load a counts tensor from a JSON file.
pub fn load_annotation(path: &std::path::Path) -> Result<AnnotationCounts> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(BranchAnnotator::load(std::io::BufReader::new(file))?.into_counts())
}

// =============================================================================
// Traversal
// =============================================================================

/// Walk one tree with a dense working row (`NaN` = missing), incrementing
/// the visit count of every node on the path.
///
/// The branching rules mirror the generated C: numerical tests compare with
/// the node's operator; categorical tests truncate the feature value and
/// probe the category list, inverting when the list names the right child;
/// missing features follow the default direction.
fn traverse<T: Copy + Into<f64>>(tree: &Tree<T>, row: &[f64], counts: &mut [u64]) {
    let mut nid: NodeId = 0;
    loop {
        counts[nid as usize] += 1;
        if tree.is_leaf(nid) {
            return;
        }
        let fvalue = row[tree.split_index(nid) as usize];
        nid = if fvalue.is_nan() {
            tree.default_child(nid)
        } else {
            let goes_left = match tree.split_type(nid) {
                SplitType::Numerical => {
                    tree.comparison_op(nid).compare(fvalue, tree.threshold(nid).into())
                }
                SplitType::Categorical => {
                    let matches = fvalue >= 0.0
                        && tree.category_list(nid).binary_search(&(fvalue as u32)).is_ok();
                    matches != tree.category_list_right_child(nid)
                }
            };
            if goes_left {
                tree.left_child(nid)
            } else {
                tree.right_child(nid)
            }
        };
    }
}

// =============================================================================
// Parallel drivers
// =============================================================================

/// Node-count offsets: `offsets[t]..offsets[t + 1]` is tree `t`'s slice of
/// the flat count buffer.
fn count_offsets<T: Copy>(trees: &[Tree<T>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(trees.len() + 1);
    offsets.push(0);
    for tree in trees {
        offsets.push(offsets.last().unwrap() + tree.num_nodes());
    }
    offsets
}

/// Shared band/worker loop. `fill_row` populates the working row for one
/// matrix row; the buffer is reset to all-missing after each row.
fn annotate_loop<T, F>(
    trees: &[Tree<T>],
    num_row: usize,
    num_col: usize,
    config: &ThreadConfig,
    verbose: i32,
    fill_row: F,
) -> Result<AnnotationCounts>
where
    T: Copy + Into<f64> + Sync,
    F: Fn(usize, &mut [f64]) -> Result<()> + Sync,
{
    let offsets = count_offsets(trees);
    let total = *offsets.last().unwrap();
    if total == 0 {
        return Ok(Vec::new());
    }
    let nthread = config.nthread();

    let mut counts_tloc = vec![0u64; total * nthread];
    {
        let tloc: Vec<Mutex<&mut [u64]>> =
            counts_tloc.chunks_mut(total).map(Mutex::new).collect();

        // Process rows in 20 bands so progress can be reported in between.
        let pstep = num_row.div_ceil(20).max(1);
        let mut band_start = 0;
        while band_start < num_row {
            let band_end = (band_start + pstep).min(num_row);
            let ranges = split_ranges(band_start, band_end, nthread);
            parallel_for(0, nthread, config, ParallelSchedule::Static(None), |worker, _| {
                let mut slice = tloc[worker].lock().unwrap();
                let mut row_buf = vec![f64::NAN; num_col];
                for rid in ranges[worker].clone() {
                    fill_row(rid, &mut row_buf)?;
                    for (tree_id, tree) in trees.iter().enumerate() {
                        traverse(tree, &row_buf, &mut slice[offsets[tree_id]..offsets[tree_id + 1]]);
                    }
                    row_buf.fill(f64::NAN);
                }
                Ok(())
            })?;
            if verbose > 0 {
                log::info!("{band_end} of {num_row} rows processed");
            }
            band_start = band_end;
        }
    }

    // Reduce per-worker buffers in worker order, then split per tree.
    let mut flat = vec![0u64; total];
    for worker in 0..nthread {
        let off = total * worker;
        for i in 0..total {
            flat[i] += counts_tloc[off + i];
        }
    }
    Ok((0..trees.len()).map(|t| flat[offsets[t]..offsets[t + 1]].to_vec()).collect())
}

fn annotate_dense<T, E>(
    trees: &[Tree<T>],
    dmat: &DenseMatrix<E>,
    config: &ThreadConfig,
    verbose: i32,
) -> Result<AnnotationCounts>
where
    T: Copy + Into<f64> + Sync,
    E: MatrixElement,
{
    let nan_missing = dmat.nan_missing();
    let missing_value = dmat.missing_value();
    annotate_loop(trees, dmat.num_row(), dmat.num_col(), config, verbose, |rid, row_buf| {
        for (j, &v) in dmat.row_slice(rid).iter().enumerate() {
            if v.is_nan() {
                if !nan_missing {
                    return Err(Error::InvalidParam(
                        "the missing_value argument must be set to NaN if there is any NaN in the matrix"
                            .to_string(),
                    ));
                }
            } else if nan_missing || v != missing_value {
                row_buf[j] = v.to_f64();
            }
        }
        Ok(())
    })
}

fn annotate_csr<T, E>(
    trees: &[Tree<T>],
    dmat: &CsrMatrix<E>,
    config: &ThreadConfig,
    verbose: i32,
) -> Result<AnnotationCounts>
where
    T: Copy + Into<f64> + Sync,
    E: MatrixElement,
{
    annotate_loop(trees, dmat.num_row(), dmat.num_col(), config, verbose, |rid, row_buf| {
        for (col, v) in dmat.row_entries(rid) {
            row_buf[col as usize] = v.to_f64();
        }
        Ok(())
    })
}
