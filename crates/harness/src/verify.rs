//! Elementwise comparison of device output against the host reference.

use puzzleforge_kernel::{Dtype, HostArray};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Acceptance criterion for one element: `|actual - expected|` must not
/// exceed `atol + rtol * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tolerance {
    pub atol: f64,
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: 1e-3,
            rtol: 1e-3,
        }
    }
}

impl Tolerance {
    pub fn exact() -> Self {
        Self { atol: 0.0, rtol: 0.0 }
    }

    fn admits(&self, expected: f64, actual: f64) -> bool {
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

/// Summary of a passing comparison.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub kernel: String,
    pub elements: usize,
    pub max_abs_error: f64,
    pub max_rel_error: f64,
}

#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("kernel `{kernel}`: expected dtype {expected:?}, device returned {actual:?}")]
    DtypeMismatch {
        kernel: String,
        expected: Dtype,
        actual: Dtype,
    },
    #[error("kernel `{kernel}`: expected shape {expected:?}, device returned {actual:?}")]
    ShapeMismatch {
        kernel: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error(
        "kernel `{kernel}`: {mismatched} of {elements} element(s) outside tolerance, \
         first at flat index {first_index}\n  expected: {}\n  device:   {}",
        .expected.preview(8),
        .actual.preview(8)
    )]
    ValuesDiverge {
        kernel: String,
        mismatched: usize,
        elements: usize,
        first_index: usize,
        expected: HostArray,
        actual: HostArray,
    },
}

/// Compares `actual` (device output) against `expected` (host reference).
///
/// Both arrays are walked in row-major order through a common f64 view, so
/// i32 results are compared exactly whenever `tolerance` is zero.
pub fn compare(
    kernel: &str,
    expected: &HostArray,
    actual: &HostArray,
    tolerance: &Tolerance,
) -> Result<CheckReport, VerificationError> {
    if expected.dtype() != actual.dtype() {
        return Err(VerificationError::DtypeMismatch {
            kernel: kernel.to_string(),
            expected: expected.dtype(),
            actual: actual.dtype(),
        });
    }
    if expected.shape() != actual.shape() {
        return Err(VerificationError::ShapeMismatch {
            kernel: kernel.to_string(),
            expected: expected.shape().to_vec(),
            actual: actual.shape().to_vec(),
        });
    }

    let mut max_abs_error = 0.0f64;
    let mut max_rel_error = 0.0f64;
    let mut mismatched = 0usize;
    let mut first_index = None;
    for (index, (e, a)) in expected.iter_f64().zip(actual.iter_f64()).enumerate() {
        let abs = (a - e).abs();
        max_abs_error = max_abs_error.max(abs);
        if e != 0.0 {
            max_rel_error = max_rel_error.max(abs / e.abs());
        }
        if !tolerance.admits(e, a) {
            mismatched += 1;
            first_index.get_or_insert(index);
        }
    }

    let elements = expected.len();
    if let Some(first_index) = first_index {
        return Err(VerificationError::ValuesDiverge {
            kernel: kernel.to_string(),
            mismatched,
            elements,
            first_index,
            expected: expected.clone(),
            actual: actual.clone(),
        });
    }

    debug!(kernel, elements, max_abs_error, max_rel_error, "outputs match");
    Ok(CheckReport {
        kernel: kernel.to_string(),
        elements,
        max_abs_error,
        max_rel_error,
    })
}
