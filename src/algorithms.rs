//! Canonical shape algorithms.
//!
//! These functions compute the output shapes of common classes of tensor
//! operators from their input shapes and scalar parameters. They reproduce
//! the validation performed by the operators, so an algorithm fails for
//! exactly those inputs where the operator would fail because of the shapes
//! or parameters involved.
//!
//! Algorithms take shapes as slices of concrete sizes and always return newly
//! allocated shapes. A shape function output containing an unknown dimension
//! ([`Dim::Unknown`](crate::Dim::Unknown)) must be converted with
//! [`concrete`] before it can be passed to them, which fails.

use std::error::Error;
use std::fmt;

use crate::shape::{Dim, Shape};
use crate::signature::BindError;

mod binary;
mod conv_pool;
mod index;
mod layout;
mod matmul;
mod reduce;

pub use binary::{broadcast, broadcast3, expand};
pub use conv_pool::{
    adaptive_pool2d, conv_output_size, conv_transpose_output_size, pool2d, pool_output_size,
};
pub use index::{
    advanced_index, embedding, gather, index_select, pad, pad_with_mode, select, slice, topk,
    PadMode,
};
pub use layout::{
    cat, flatten, permute, squeeze, squeeze_dim, transpose, transpose_2d, unsqueeze, view,
};
pub use matmul::{addmm, bmm, linear, matmul, mm};
pub use reduce::{reduce_dim, reduce_dims};

/// Errors when computing an output shape.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeError {
    /// The input shapes are incompatible.
    IncompatibleShapes(&'static str),

    /// An input's rank does not match that expected by the operator.
    IncorrectRank(&'static str),

    /// A dimension index is outside the valid range for a tensor of rank
    /// `ndim`.
    DimOutOfRange { dim: i64, ndim: usize },

    /// An index into a dimension of size `size` is out of range.
    IndexOutOfRange { index: i64, size: usize },

    /// An operator parameter has an invalid value.
    InvalidValue(&'static str),

    /// A shape with a data-dependent size was used as an operand.
    UnknownDim,

    /// The arguments could not be bound to the function's parameters.
    Bind(BindError),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ShapeError::IncompatibleShapes(details) => {
                write!(f, "incompatible shapes: {}", details)
            }
            ShapeError::IncorrectRank(details) => write!(f, "incorrect rank: {}", details),
            ShapeError::DimOutOfRange { dim, ndim } => {
                write!(f, "dim {} is out of range for rank {}", dim, ndim)
            }
            ShapeError::IndexOutOfRange { index, size } => {
                write!(f, "index {} is out of range for size {}", index, size)
            }
            ShapeError::InvalidValue(details) => write!(f, "invalid value: {}", details),
            ShapeError::UnknownDim => write!(f, "shape has a data-dependent size"),
            ShapeError::Bind(err) => write!(f, "invalid arguments: {}", err),
        }
    }
}

impl Error for ShapeError {}

impl From<BindError> for ShapeError {
    fn from(err: BindError) -> ShapeError {
        ShapeError::Bind(err)
    }
}

/// Resolve a dimension index which may be negative into a non-negative
/// index for a tensor of rank `ndim`.
///
/// Valid values are in `[-ndim, ndim - 1]`. Scalars are treated as having
/// rank 1, so they accept `0` and `-1`.
pub fn resolve_dim(dim: i64, ndim: usize) -> Result<usize, ShapeError> {
    let len = ndim.max(1) as i64;
    if dim < -len || dim >= len {
        return Err(ShapeError::DimOutOfRange { dim, ndim });
    }
    let dim = if dim < 0 { dim + len } else { dim };
    Ok(dim as usize)
}

/// Resolve a possibly-negative index into a dimension of a given size.
pub fn resolve_index(index: i64, size: usize) -> Result<usize, ShapeError> {
    let len = size as i64;
    if index < -len || index >= len {
        return Err(ShapeError::IndexOutOfRange { index, size });
    }
    let index = if index < 0 { index + len } else { index };
    Ok(index as usize)
}

/// Convert a list of sizes into a shape, failing if any size is negative.
pub fn sizes_to_shape(sizes: &[i64]) -> Result<Vec<usize>, ShapeError> {
    sizes
        .iter()
        .map(|&size| {
            usize::try_from(size).map_err(|_| ShapeError::InvalidValue("negative dimension size"))
        })
        .collect()
}

/// Shape of an elementwise operator with a single tensor operand.
pub fn unary(shape: &[usize]) -> Vec<usize> {
    shape.to_vec()
}

/// Shape of a vector whose length depends on the values of the inputs.
///
/// The result has a single [`Dim::Unknown`](crate::Dim::Unknown) dimension.
/// It describes the output's rank only and no other algorithm produces or
/// accepts unknown dimensions.
pub fn data_dependent_vector() -> Shape {
    Shape::unknown_vector()
}

/// Convert a shape function's output into sizes that can be passed to
/// another algorithm.
pub fn concrete(shape: &Shape) -> Result<Vec<usize>, ShapeError> {
    shape
        .dims()
        .iter()
        .map(|dim| match dim {
            Dim::Fixed(size) => Ok(*size),
            Dim::Unknown(_) => Err(ShapeError::UnknownDim),
        })
        .collect()
}

/// Return the number of elements in a tensor with a given shape.
pub(crate) fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}
