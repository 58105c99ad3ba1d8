//! Load a compiled model library and drive batched inference.
//!
//! The [`Predictor`] resolves the symbols of the generated C ABI
//! (`get_num_target`, `get_num_class`, `get_num_feature`,
//! `get_threshold_type`, `get_leaf_output_type`, `predict`), validates the
//! reported types and runs `predict` over disjoint row ranges on a worker
//! pool. Output has shape `[num_row, num_target, max_num_class]`.

mod shared_library;

pub use shared_library::SharedLibrary;

use std::ffi::{c_char, CStr};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use ndarray::{Axis, ArrayViewMut3};

use crate::data::{CsrMatrix, DMatrix, DenseMatrix, MatrixElement};
use crate::error::{Error, Result};
use crate::model::DataType;
use crate::threading::{parallel_for, split_ranges, ParallelSchedule, ThreadConfig};

// =============================================================================
// Entry
// =============================================================================

/// One slot of the feature vector handed to the generated `predict()`.
///
/// Layout matches the generated `union Entry`: `missing == -1` marks an
/// absent feature; `fvalue` holds the value otherwise; the generated
/// quantize loop overwrites present entries with `qvalue`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union Entry<T: Copy> {
    pub missing: i32,
    pub fvalue: T,
    pub qvalue: i32,
}

impl<T: Copy> Entry<T> {
    /// An entry marked missing.
    #[inline]
    pub fn missing() -> Self {
        Entry { missing: -1 }
    }

    /// An entry holding a feature value.
    #[inline]
    pub fn value(fvalue: T) -> Self {
        Entry { fvalue }
    }
}

/// Signature of the generated `predict` entry point.
pub type PredictFn<T> = unsafe extern "C" fn(*mut Entry<T>, i32, *mut T);

/// The resolved `predict` symbol, typed by the model's element width.
#[derive(Clone, Copy)]
pub enum PredictFunction {
    F32(PredictFn<f32>),
    F64(PredictFn<f64>),
}

/// Output element type accepted by [`Predictor::predict_batch`].
pub trait OutputElement: MatrixElement + Default {
    const DATA_TYPE: DataType;
    /// The typed `predict` function, if the library was compiled for this
    /// element width.
    fn typed_fn(func: PredictFunction) -> Option<PredictFn<Self>>;
    fn from_f64(v: f64) -> Self;
}

impl OutputElement for f32 {
    const DATA_TYPE: DataType = DataType::Float32;

    #[inline]
    fn typed_fn(func: PredictFunction) -> Option<PredictFn<f32>> {
        match func {
            PredictFunction::F32(f) => Some(f),
            PredictFunction::F64(_) => None,
        }
    }

    #[inline]
    fn from_f64(v: f64) -> f32 {
        v as f32
    }
}

impl OutputElement for f64 {
    const DATA_TYPE: DataType = DataType::Float64;

    #[inline]
    fn typed_fn(func: PredictFunction) -> Option<PredictFn<f64>> {
        match func {
            PredictFunction::F64(f) => Some(f),
            PredictFunction::F32(_) => None,
        }
    }

    #[inline]
    fn from_f64(v: f64) -> f64 {
        v
    }
}

// =============================================================================
// Predictor
// =============================================================================

/// A loaded model library plus its cached metadata and worker pool.
#[derive(Debug)]
pub struct Predictor {
    // `pred_func` points into `lib`; both live and die together.
    lib: SharedLibrary,
    pred_func: PredictFunction,
    thread_config: ThreadConfig,
    num_target: i32,
    num_class: Vec<i32>,
    max_num_class: i32,
    num_feature: i32,
    threshold_type: DataType,
    leaf_output_type: DataType,
}

impl std::fmt::Debug for PredictFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictFunction::F32(_) => f.write_str("PredictFunction::F32"),
            PredictFunction::F64(_) => f.write_str("PredictFunction::F64"),
        }
    }
}

type Int32QueryFn = unsafe extern "C" fn() -> i32;
type Int32VecQueryFn = unsafe extern "C" fn(*mut i32);
type StringQueryFn = unsafe extern "C" fn() -> *const c_char;

unsafe fn query_string(func: StringQueryFn) -> Result<String> {
    let ptr = func();
    if ptr.is_null() {
        return Err(Error::Abi("type query returned a null string".to_string()));
    }
    Ok(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

impl Predictor {
    /// Load a compiled model library and resolve its exported symbols.
    ///
    /// `num_worker_thread <= 0` selects one worker per core.
    pub fn load(libpath: &Path, num_worker_thread: i32) -> Result<Self> {
        let thread_config = ThreadConfig::new(num_worker_thread)?;
        let lib = SharedLibrary::open(libpath)?;

        let (num_target, num_class, num_feature, threshold_type, leaf_output_type, pred_func) = unsafe {
            let num_target = (*lib.get::<Int32QueryFn>("get_num_target")?)();
            let mut num_class = vec![0i32; num_target.max(0) as usize];
            (*lib.get::<Int32VecQueryFn>("get_num_class")?)(num_class.as_mut_ptr());
            let num_feature = (*lib.get::<Int32QueryFn>("get_num_feature")?)();

            let threshold_type_str =
                query_string(*lib.get::<StringQueryFn>("get_threshold_type")?)?;
            let leaf_output_type_str =
                query_string(*lib.get::<StringQueryFn>("get_leaf_output_type")?)?;
            if threshold_type_str != leaf_output_type_str {
                return Err(Error::Abi(format!(
                    "threshold type '{threshold_type_str}' and leaf output type \
                     '{leaf_output_type_str}' must match"
                )));
            }
            let threshold_type = DataType::parse(&threshold_type_str)?;
            let leaf_output_type = DataType::parse(&leaf_output_type_str)?;

            let pred_func = match threshold_type {
                DataType::Float32 => {
                    PredictFunction::F32(*lib.get::<PredictFn<f32>>("predict")?)
                }
                DataType::Float64 => {
                    PredictFunction::F64(*lib.get::<PredictFn<f64>>("predict")?)
                }
            };
            (num_target, num_class, num_feature, threshold_type, leaf_output_type, pred_func)
        };

        let max_num_class = num_class.iter().copied().max().unwrap_or(1);
        Ok(Self {
            lib,
            pred_func,
            thread_config,
            num_target,
            num_class,
            max_num_class,
            num_feature,
            threshold_type,
            leaf_output_type,
        })
    }

    /// Shape of the output tensor for a whole matrix:
    /// `[num_row, num_target, max_num_class]`.
    pub fn output_shape(&self, dmat: &DMatrix) -> [u64; 3] {
        [dmat.num_row() as u64, self.num_target as u64, self.max_num_class as u64]
    }

    /// Shape of the output tensor for the row range `[rbegin, rend)`.
    pub fn output_shape_range(&self, dmat: &DMatrix, rbegin: usize, rend: usize) -> [u64; 3] {
        debug_assert!(rbegin <= rend && rend <= dmat.num_row());
        [(rend - rbegin) as u64, self.num_target as u64, self.max_num_class as u64]
    }

    /// Number of targets reported by the library.
    #[inline]
    pub fn num_target(&self) -> i32 {
        self.num_target
    }

    /// Per-target class counts reported by the library.
    #[inline]
    pub fn num_class(&self) -> &[i32] {
        &self.num_class
    }

    /// Largest class count across targets.
    #[inline]
    pub fn max_num_class(&self) -> i32 {
        self.max_num_class
    }

    /// Number of features reported by the library.
    #[inline]
    pub fn num_feature(&self) -> i32 {
        self.num_feature
    }

    /// Threshold element type reported by the library.
    #[inline]
    pub fn threshold_type(&self) -> DataType {
        self.threshold_type
    }

    /// Leaf-output element type reported by the library.
    #[inline]
    pub fn leaf_output_type(&self) -> DataType {
        self.leaf_output_type
    }

    /// Path of the loaded library.
    pub fn lib_path(&self) -> &Path {
        self.lib.path()
    }

    /// Run batched prediction over all rows of `dmat`, writing into `out`
    /// (zero-initialized by the caller, laid out per [`Self::output_shape`]).
    ///
    /// Rows are divided into contiguous ranges among
    /// `min(num_worker_thread, num_row)` workers; every output cell depends
    /// only on its own row, so the result is deterministic.
    pub fn predict_batch<T: OutputElement>(
        &self,
        dmat: &DMatrix,
        verbose: i32,
        pred_margin: bool,
        out: &mut [T],
    ) -> Result<()> {
        if T::DATA_TYPE != self.leaf_output_type {
            return Err(Error::Abi(format!(
                "type mismatch between the model's leaf output type ({}) and the output \
                 buffer's element type ({})",
                self.leaf_output_type.as_str(),
                T::DATA_TYPE.as_str()
            )));
        }
        let func = T::typed_fn(self.pred_func).expect("leaf output type was validated at load");

        let num_row = dmat.num_row();
        if num_row == 0 {
            return Ok(());
        }
        let expected_len = num_row * self.num_target as usize * self.max_num_class as usize;
        if out.len() != expected_len {
            return Err(Error::Abi(format!(
                "output buffer has {} elements; expected num_row * num_target * max_num_class \
                 = {expected_len}",
                out.len()
            )));
        }

        let tstart = Instant::now();
        let nthread = self.thread_config.nthread().min(num_row);
        let row_ranges = split_ranges(0, num_row, nthread);

        // Split the output view into one contiguous row-chunk per worker.
        let view = ArrayViewMut3::from_shape(
            (num_row, self.num_target as usize, self.max_num_class as usize),
            out,
        )
        .expect("output buffer length was validated");
        let mut chunks: Vec<Mutex<ArrayViewMut3<T>>> = Vec::with_capacity(nthread);
        let mut rest = view;
        for range in &row_ranges {
            let (chunk, tail) = rest.split_at(Axis(0), range.len());
            chunks.push(Mutex::new(chunk));
            rest = tail;
        }
        debug_assert_eq!(rest.shape()[0], 0);

        parallel_for(0, nthread, &self.thread_config, ParallelSchedule::Static(None), |worker, _| {
            let mut chunk = chunks[worker].lock().unwrap();
            let range = row_ranges[worker].clone();
            match dmat {
                DMatrix::DenseF32(m) => {
                    apply_batch_dense(m, self.num_feature, range, pred_margin, &mut chunk, func)
                }
                DMatrix::DenseF64(m) => {
                    apply_batch_dense(m, self.num_feature, range, pred_margin, &mut chunk, func)
                }
                DMatrix::CsrF32(m) => {
                    apply_batch_csr(m, self.num_feature, range, pred_margin, &mut chunk, func)
                }
                DMatrix::CsrF64(m) => {
                    apply_batch_csr(m, self.num_feature, range, pred_margin, &mut chunk, func)
                }
            }
        })?;

        if verbose > 0 {
            log::info!("Finished prediction in {:.6} sec", tstart.elapsed().as_secs_f64());
        }
        Ok(())
    }
}

// =============================================================================
// Per-range drivers
// =============================================================================

/// Call `func` for one row: hand over the entry vector and the row's
/// output slice.
unsafe fn call_predict<T: OutputElement>(
    func: PredictFn<T>,
    inst: &mut [Entry<T>],
    pred_margin: bool,
    out_row: &mut ndarray::ArrayViewMut2<'_, T>,
) {
    let out_ptr = out_row.as_slice_mut().expect("row slice is contiguous").as_mut_ptr();
    func(inst.as_mut_ptr(), i32::from(pred_margin), out_ptr);
}

fn apply_batch_dense<T: OutputElement, E: MatrixElement>(
    dmat: &DenseMatrix<E>,
    num_feature: i32,
    range: std::ops::Range<usize>,
    pred_margin: bool,
    chunk: &mut ArrayViewMut3<'_, T>,
    func: PredictFn<T>,
) -> Result<()> {
    let num_col = dmat.num_col();
    if num_col > num_feature as usize {
        return Err(Error::Abi(format!(
            "matrix has {num_col} columns but the model expects at most {num_feature} features"
        )));
    }
    let nan_missing = dmat.nan_missing();
    let missing_value = dmat.missing_value();
    let mut inst: Vec<Entry<T>> = vec![Entry::missing(); num_col.max(num_feature as usize)];

    for (local, rid) in range.enumerate() {
        for (j, &v) in dmat.row_slice(rid).iter().enumerate() {
            if v.is_nan() {
                if !nan_missing {
                    return Err(Error::InvalidParam(
                        "the missing_value argument must be set to NaN if there is any NaN in \
                         the matrix"
                            .to_string(),
                    ));
                }
            } else if nan_missing || v != missing_value {
                inst[j] = Entry::value(T::from_f64(v.to_f64()));
            }
        }
        let mut out_row = chunk.index_axis_mut(Axis(0), local);
        unsafe { call_predict(func, &mut inst, pred_margin, &mut out_row) };
        for entry in inst.iter_mut().take(num_col) {
            *entry = Entry::missing();
        }
    }
    Ok(())
}

fn apply_batch_csr<T: OutputElement, E: MatrixElement>(
    dmat: &CsrMatrix<E>,
    num_feature: i32,
    range: std::ops::Range<usize>,
    pred_margin: bool,
    chunk: &mut ArrayViewMut3<'_, T>,
    func: PredictFn<T>,
) -> Result<()> {
    let num_col = dmat.num_col();
    if num_col > num_feature as usize {
        return Err(Error::Abi(format!(
            "matrix has {num_col} columns but the model expects at most {num_feature} features"
        )));
    }
    let mut inst: Vec<Entry<T>> = vec![Entry::missing(); num_col.max(num_feature as usize)];

    for (local, rid) in range.enumerate() {
        for (col, v) in dmat.row_entries(rid) {
            inst[col as usize] = Entry::value(T::from_f64(v.to_f64()));
        }
        let mut out_row = chunk.index_axis_mut(Axis(0), local);
        unsafe { call_predict(func, &mut inst, pred_margin, &mut out_row) };
        for (col, _) in dmat.row_entries(rid) {
            inst[col as usize] = Entry::missing();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_layout_matches_the_c_union() {
        assert_eq!(std::mem::size_of::<Entry<f32>>(), 4);
        assert_eq!(std::mem::size_of::<Entry<f64>>(), 8);
        let missing = Entry::<f32>::missing();
        assert_eq!(unsafe { missing.missing }, -1);
        let present = Entry::<f64>::value(1.5);
        assert_eq!(unsafe { present.fvalue }, 1.5);
    }

    #[test]
    fn missing_symbol_reports_library_path() {
        let result = Predictor::load(Path::new("/nonexistent/libmodel.so"), 1);
        match result {
            Err(Error::Abi(msg)) => assert!(msg.contains("/nonexistent/libmodel.so")),
            other => panic!("expected an ABI error, got {other:?}"),
        }
    }
}
