pub mod element;

use crate::array::element::Element;
use crate::{DType, ModelError, SUPPORTED_DTYPES};

/// Number of logical axes the viewer understands: batch, depth, height, width, channel.
pub const ARRAY_RANK: usize = 5;

/// A dense, row-major array ready to be streamed to the viewer.
///
/// Construction only checks that the byte buffer matches `shape` and `dtype`.
/// Whether the viewer can display it is decided by [`ArrayPayload::validate`],
/// so callers can build any array and get a precise error at enqueue time.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPayload {
    shape: Vec<usize>,
    dtype: DType,
    data: Vec<u8>,
}

impl ArrayPayload {
    /// Build a payload from typed values laid out in row-major order.
    #[track_caller]
    pub fn from_elements<T: Element>(
        shape: impl Into<Vec<usize>>,
        values: &[T],
    ) -> Result<Self, ModelError> {
        let shape = shape.into();
        let expected = element_count(&shape)?;

        if values.len() != expected {
            return Err(ModelError::validation(format!(
                "Shape {shape:?} needs {expected} elements, got {}",
                values.len()
            )));
        }

        let mut data = Vec::new();
        T::extend_ne_bytes(values, &mut data);

        Ok(Self {
            shape,
            dtype: T::DTYPE,
            data,
        })
    }

    /// Build a payload from an already encoded buffer.
    #[track_caller]
    pub fn from_bytes(
        shape: impl Into<Vec<usize>>,
        dtype: DType,
        data: Vec<u8>,
    ) -> Result<Self, ModelError> {
        let shape = shape.into();
        let expected = byte_len(&shape, dtype)?;

        if data.len() != expected {
            return Err(ModelError::validation(format!(
                "Shape {shape:?} of {dtype} needs {expected} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self { shape, dtype, data })
    }

    /// A zero-filled payload.
    #[track_caller]
    pub fn zeros(shape: impl Into<Vec<usize>>, dtype: DType) -> Result<Self, ModelError> {
        let shape = shape.into();
        let len = byte_len(&shape, dtype)?;

        Ok(Self {
            shape,
            dtype,
            data: vec![0; len],
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the viewer's constraints: five axes and a supported element type.
    #[track_caller]
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.shape.len() != ARRAY_RANK {
            return Err(ModelError::validation(format!(
                "Only {ARRAY_RANK}-dimensional arrays are supported [BxZxHxWxC], got shape {:?}",
                self.shape
            )));
        }

        if !self.dtype.is_supported() {
            let supported: Vec<&str> = SUPPORTED_DTYPES.iter().map(|d| d.name()).collect();
            return Err(ModelError::validation(format!(
                "Element type {} is not supported, expected one of: {}",
                self.dtype,
                supported.join(", ")
            )));
        }

        Ok(())
    }
}

#[track_caller]
fn element_count(shape: &[usize]) -> Result<usize, ModelError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &axis| acc.checked_mul(axis))
        .ok_or_else(|| ModelError::validation(format!("Shape {shape:?} overflows usize")))
}

#[track_caller]
fn byte_len(shape: &[usize], dtype: DType) -> Result<usize, ModelError> {
    element_count(shape)?
        .checked_mul(dtype.item_size())
        .ok_or_else(|| ModelError::validation(format!("Shape {shape:?} of {dtype} overflows usize")))
}
