//! Host-side arrays shared by the assembler, the GPU backend, and the harness.

use bytemuck::{cast_slice, pod_collect_to_vec};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Element types supported by puzzle kernels.
///
/// Matches the two element types the puzzle set actually uses; everything
/// else (shape/stride metadata) travels as `u32` internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    I32,
}

impl Dtype {
    pub fn element_size_bytes(&self) -> usize {
        match self {
            Dtype::F32 | Dtype::I32 => 4,
        }
    }

    /// WGSL scalar type name.
    pub fn wgsl_name(&self) -> &'static str {
        match self {
            Dtype::F32 => "f32",
            Dtype::I32 => "i32",
        }
    }
}

/// Dtype plus logical shape, without the data. Describes an array to be
/// bound (inputs) or allocated (outputs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySpec {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
}

impl ArraySpec {
    pub fn new(dtype: Dtype, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype.element_size_bytes()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArrayError {
    #[error("{actual} bytes do not fit shape {shape:?} of {dtype:?} ({expected} bytes)")]
    ByteLength {
        dtype: Dtype,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("cannot reshape {len} elements into {shape:?}")]
    Reshape { len: usize, shape: Vec<usize> },
}

/// An n-dimensional host array, one variant per supported dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum HostArray {
    F32(ArrayD<f32>),
    I32(ArrayD<i32>),
}

impl HostArray {
    pub fn dtype(&self) -> Dtype {
        match self {
            HostArray::F32(_) => Dtype::F32,
            HostArray::I32(_) => Dtype::I32,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            HostArray::F32(a) => a.shape(),
            HostArray::I32(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spec(&self) -> ArraySpec {
        ArraySpec::new(self.dtype(), self.shape())
    }

    /// `0..n` as f32.
    pub fn arange_f32(n: usize) -> Self {
        HostArray::F32(ArrayD::from_shape_fn(IxDyn(&[n]), |ix| ix[0] as f32))
    }

    /// `0..n` as i32.
    pub fn arange_i32(n: usize) -> Self {
        HostArray::I32(ArrayD::from_shape_fn(IxDyn(&[n]), |ix| ix[0] as i32))
    }

    pub fn zeros(dtype: Dtype, shape: &[usize]) -> Self {
        match dtype {
            Dtype::F32 => HostArray::F32(ArrayD::zeros(IxDyn(shape))),
            Dtype::I32 => HostArray::I32(ArrayD::zeros(IxDyn(shape))),
        }
    }

    pub fn from_vec_f32(shape: &[usize], data: Vec<f32>) -> Result<Self, ArrayError> {
        let len = data.len();
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(HostArray::F32)
            .map_err(|_| ArrayError::Reshape {
                len,
                shape: shape.to_vec(),
            })
    }

    pub fn from_vec_i32(shape: &[usize], data: Vec<i32>) -> Result<Self, ArrayError> {
        let len = data.len();
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(HostArray::I32)
            .map_err(|_| ArrayError::Reshape {
                len,
                shape: shape.to_vec(),
            })
    }

    pub fn into_shape(self, shape: &[usize]) -> Result<Self, ArrayError> {
        let len = self.len();
        let err = || ArrayError::Reshape {
            len,
            shape: shape.to_vec(),
        };
        match self {
            HostArray::F32(a) => a
                .into_shape(IxDyn(shape))
                .map(HostArray::F32)
                .map_err(|_| err()),
            HostArray::I32(a) => a
                .into_shape(IxDyn(shape))
                .map(HostArray::I32)
                .map_err(|_| err()),
        }
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            HostArray::F32(a) => Some(a),
            HostArray::I32(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<&ArrayD<i32>> {
        match self {
            HostArray::I32(a) => Some(a),
            HostArray::F32(_) => None,
        }
    }

    /// Serialize elements to little-endian device bytes in standard
    /// (row-major) layout, regardless of the array's current memory order.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HostArray::F32(a) => {
                let flat: Vec<f32> = a.iter().copied().collect();
                cast_slice(&flat).to_vec()
            }
            HostArray::I32(a) => {
                let flat: Vec<i32> = a.iter().copied().collect();
                cast_slice(&flat).to_vec()
            }
        }
    }

    /// Reconstruct an array from device bytes read back in standard layout.
    pub fn from_bytes(dtype: Dtype, shape: &[usize], bytes: &[u8]) -> Result<Self, ArrayError> {
        let expected = shape.iter().product::<usize>() * dtype.element_size_bytes();
        if bytes.len() != expected {
            return Err(ArrayError::ByteLength {
                dtype,
                shape: shape.to_vec(),
                expected,
                actual: bytes.len(),
            });
        }
        let err = |len| ArrayError::Reshape {
            len,
            shape: shape.to_vec(),
        };
        // pod_collect_to_vec tolerates unaligned input, which a byte slice
        // sectioned out of a larger readback allocation can be.
        match dtype {
            Dtype::F32 => {
                let flat: Vec<f32> = pod_collect_to_vec(bytes);
                let len = flat.len();
                ArrayD::from_shape_vec(IxDyn(shape), flat)
                    .map(HostArray::F32)
                    .map_err(|_| err(len))
            }
            Dtype::I32 => {
                let flat: Vec<i32> = pod_collect_to_vec(bytes);
                let len = flat.len();
                ArrayD::from_shape_vec(IxDyn(shape), flat)
                    .map(HostArray::I32)
                    .map_err(|_| err(len))
            }
        }
    }

    /// Elements in logical order, widened to f64 for comparison.
    pub fn iter_f64(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            HostArray::F32(a) => Box::new(a.iter().map(|&x| f64::from(x))),
            HostArray::I32(a) => Box::new(a.iter().map(|&x| f64::from(x))),
        }
    }

    /// Compact rendering of the first `max` elements, for diagnostics.
    pub fn preview(&self, max: usize) -> String {
        let mut parts: Vec<String> = self
            .iter_f64()
            .take(max)
            .map(|x| format!("{x}"))
            .collect();
        if self.len() > max {
            parts.push("..".into());
        }
        format!("[{}] (shape {:?})", parts.join(", "), self.shape())
    }
}

impl From<ArrayD<f32>> for HostArray {
    fn from(a: ArrayD<f32>) -> Self {
        HostArray::F32(a)
    }
}

impl From<ArrayD<i32>> for HostArray {
    fn from(a: ArrayD<i32>) -> Self {
        HostArray::I32(a)
    }
}

/// Row-major element strides for a shape, matching the layout `to_bytes`
/// uploads in.
pub fn c_strides(shape: &[usize]) -> Vec<u32> {
    let mut strides = vec![1u32; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as u32;
    }
    strides
}
