//! Read-only input matrices for annotation and prediction.
//!
//! Two storage layouts are supported, each typed over `f32` or `f64`
//! elements: row-major dense with an explicit missing-value sentinel, and
//! CSR sparse where absent columns are implicitly missing. [`DMatrix`] is
//! the tagged union consumed by the annotator and the predictor.

// =============================================================================
// Element trait
// =============================================================================

/// Matrix element type: `f32` or `f64`.
pub trait MatrixElement: Copy + PartialOrd + Send + Sync + 'static {
    fn is_nan(self) -> bool;
    fn to_f64(self) -> f64;
}

impl MatrixElement for f32 {
    #[inline]
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl MatrixElement for f64 {
    #[inline]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

// =============================================================================
// DenseMatrix
// =============================================================================

/// Row-major dense matrix with a missing-value sentinel.
///
/// Entries equal to `missing_value` are treated as missing. When the
/// sentinel is NaN, every NaN entry is missing; a NaN entry together with a
/// non-NaN sentinel is rejected at traversal time.
#[derive(Debug, Clone)]
pub struct DenseMatrix<T> {
    data: Vec<T>,
    missing_value: T,
    num_row: usize,
    num_col: usize,
}

impl<T: MatrixElement> DenseMatrix<T> {
    /// Create a dense matrix from row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != num_row * num_col`.
    pub fn from_vec(data: Vec<T>, missing_value: T, num_row: usize, num_col: usize) -> Self {
        assert_eq!(
            data.len(),
            num_row * num_col,
            "Data length {} does not match dimensions {}x{}",
            data.len(),
            num_row,
            num_col
        );
        Self {
            data,
            missing_value,
            num_row,
            num_col,
        }
    }

    #[inline]
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    #[inline]
    pub fn num_col(&self) -> usize {
        self.num_col
    }

    /// The missing-value sentinel.
    #[inline]
    pub fn missing_value(&self) -> T {
        self.missing_value
    }

    /// Whether the sentinel is NaN (NaN entries then count as missing).
    #[inline]
    pub fn nan_missing(&self) -> bool {
        self.missing_value.is_nan()
    }

    /// One row as a slice.
    #[inline]
    pub fn row_slice(&self, row: usize) -> &[T] {
        let start = row * self.num_col;
        &self.data[start..start + self.num_col]
    }
}

// =============================================================================
// CsrMatrix
// =============================================================================

/// Compressed sparse row matrix. Absent columns are missing.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    data: Vec<T>,
    col_ind: Vec<u32>,
    row_ptr: Vec<usize>,
    num_row: usize,
    num_col: usize,
}

impl<T: MatrixElement> CsrMatrix<T> {
    /// Create a CSR matrix.
    ///
    /// # Panics
    ///
    /// Panics unless `row_ptr.len() == num_row + 1` and
    /// `row_ptr[num_row] == data.len() == col_ind.len()`.
    pub fn new(
        data: Vec<T>,
        col_ind: Vec<u32>,
        row_ptr: Vec<usize>,
        num_row: usize,
        num_col: usize,
    ) -> Self {
        assert_eq!(row_ptr.len(), num_row + 1, "row_ptr must have num_row + 1 entries");
        assert_eq!(
            row_ptr[num_row],
            data.len(),
            "row_ptr[num_row] must equal the number of stored elements"
        );
        assert_eq!(data.len(), col_ind.len(), "data and col_ind must have equal length");
        Self {
            data,
            col_ind,
            row_ptr,
            num_row,
            num_col,
        }
    }

    #[inline]
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    #[inline]
    pub fn num_col(&self) -> usize {
        self.num_col
    }

    /// Stored `(col, value)` pairs of one row.
    #[inline]
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (u32, T)> + '_ {
        let begin = self.row_ptr[row];
        let end = self.row_ptr[row + 1];
        self.col_ind[begin..end]
            .iter()
            .zip(&self.data[begin..end])
            .map(|(&c, &v)| (c, v))
    }
}

// =============================================================================
// DMatrix
// =============================================================================

/// Tagged union over the four concrete matrix shapes.
#[derive(Debug, Clone)]
pub enum DMatrix {
    DenseF32(DenseMatrix<f32>),
    DenseF64(DenseMatrix<f64>),
    CsrF32(CsrMatrix<f32>),
    CsrF64(CsrMatrix<f64>),
}

impl DMatrix {
    /// Number of rows.
    #[inline]
    pub fn num_row(&self) -> usize {
        match self {
            DMatrix::DenseF32(m) => m.num_row(),
            DMatrix::DenseF64(m) => m.num_row(),
            DMatrix::CsrF32(m) => m.num_row(),
            DMatrix::CsrF64(m) => m.num_row(),
        }
    }

    /// Number of columns.
    #[inline]
    pub fn num_col(&self) -> usize {
        match self {
            DMatrix::DenseF32(m) => m.num_col(),
            DMatrix::DenseF64(m) => m.num_col(),
            DMatrix::CsrF32(m) => m.num_col(),
            DMatrix::CsrF64(m) => m.num_col(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_rows() {
        let m = DenseMatrix::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], f32::NAN, 2, 3);
        assert_eq!(m.num_row(), 2);
        assert_eq!(m.num_col(), 3);
        assert!(m.nan_missing());
        assert_eq!(m.row_slice(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn csr_row_entries() {
        // [[., 1.5, .], [2.5, ., 3.5]]
        let m = CsrMatrix::new(vec![1.5f64, 2.5, 3.5], vec![1, 0, 2], vec![0, 1, 3], 2, 3);
        let row1: Vec<_> = m.row_entries(1).collect();
        assert_eq!(row1, vec![(0, 2.5), (2, 3.5)]);

        let dmat = DMatrix::CsrF64(m);
        assert_eq!(dmat.num_row(), 2);
        assert_eq!(dmat.num_col(), 3);
    }

    #[test]
    #[should_panic(expected = "row_ptr")]
    fn csr_bad_row_ptr() {
        let _ = CsrMatrix::new(vec![1.0f32], vec![0], vec![0, 2], 1, 1);
    }
}
