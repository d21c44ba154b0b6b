//! Reference operator implementations, grouped by operator family.
//!
//! Operators compute real outputs from real inputs. They are written for
//! clarity rather than speed, since they only need to run on the small
//! tensors used to verify shape functions.

use rten_shape_lib::signature::BoundArgs;
use rten_shape_lib::{OpError, RealTensor, Returned};
use rten_tensor::prelude::*;
use rten_tensor::Tensor;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

mod binary;
mod conv;
mod creation;
mod index;
mod layout;
mod matmul;
mod norm;
mod pooling;
mod reduce;
mod unary;

pub use conv::{conv, conv_transpose, ConvParams};
pub use matmul::{matmul, mm};
pub use norm::{log_softmax, softmax};
pub use unary::{erf, gelu};

pub(crate) type Args = BoundArgs<RealTensor>;
pub(crate) type OpResult = Result<Returned<RealTensor>, OpError>;

/// Function which evaluates an operator with bound arguments.
pub(crate) type OpFn = fn(&Args) -> OpResult;

/// Operator implementations, keyed by qualified operator name.
#[derive(Default)]
pub(crate) struct OpTable {
    ops: FxHashMap<&'static str, OpFn>,
}

impl OpTable {
    /// Create a table containing all reference operators.
    pub fn with_all_ops() -> OpTable {
        let mut table = OpTable::default();
        unary::register(&mut table);
        binary::register(&mut table);
        reduce::register(&mut table);
        matmul::register(&mut table);
        layout::register(&mut table);
        creation::register(&mut table);
        index::register(&mut table);
        conv::register(&mut table);
        pooling::register(&mut table);
        norm::register(&mut table);
        table
    }

    pub fn add(&mut self, name: &'static str, op: OpFn) {
        self.ops.insert(name, op);
    }

    pub fn get(&self, name: &str) -> Option<OpFn> {
        self.ops.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Return a single output.
pub(crate) fn one(output: impl Into<RealTensor>) -> OpResult {
    Ok(Returned::One(output.into()))
}

/// Return a tuple of outputs.
pub(crate) fn many(outputs: impl IntoIterator<Item = RealTensor>) -> OpResult {
    Ok(Returned::Many(outputs.into_iter().collect()))
}

/// Convert a tensor to floats.
pub(crate) fn to_float(tensor: RealTensor) -> Tensor<f32> {
    match tensor {
        RealTensor::Float(t) => t,
        RealTensor::Int(t) => t.map(|&x| x as f32),
    }
}

/// Convert a tensor to integers, truncating any fractional part.
pub(crate) fn to_int(tensor: RealTensor) -> Tensor<i32> {
    match tensor {
        RealTensor::Float(t) => t.map(|&x| x as i32),
        RealTensor::Int(t) => t,
    }
}

pub(crate) fn float_arg(args: &Args, name: &str) -> Result<Tensor<f32>, OpError> {
    Ok(to_float(args.tensor(name)?))
}

pub(crate) fn opt_float_arg(args: &Args, name: &str) -> Result<Option<Tensor<f32>>, OpError> {
    Ok(args.opt_tensor(name)?.map(to_float))
}

pub(crate) fn int_arg(args: &Args, name: &str) -> Result<Tensor<i32>, OpError> {
    Ok(to_int(args.tensor(name)?))
}

/// Return true if a `ScalarType` code denotes an integer or boolean type.
pub(crate) fn is_int_dtype(dtype: i64) -> bool {
    matches!(dtype, 0..=4 | 11)
}

/// Resolve an axis given as a value in `[-ndim, ndim-1]` to the zero-based
/// dimension of a tensor with `ndim` dimensions.
///
/// Scalars are treated as having one dimension, so that axis 0 or -1 is
/// accepted for them.
pub(crate) fn resolve_axis(ndim: usize, axis: i64) -> Result<usize, OpError> {
    let rank = ndim.max(1) as i64;
    if axis < -rank || axis >= rank {
        return Err(OpError::InvalidValue("Axis is invalid"));
    }
    let axis = if axis < 0 { axis + rank } else { axis };
    Ok(axis as usize)
}

/// Resolve a list of axes. Each axis may only appear once.
pub(crate) fn resolve_axes(ndim: usize, axes: &[i64]) -> Result<SmallVec<[usize; 4]>, OpError> {
    let mut resolved: SmallVec<[usize; 4]> = SmallVec::with_capacity(axes.len());
    for &axis in axes {
        let axis = resolve_axis(ndim, axis)?;
        if resolved.contains(&axis) {
            return Err(OpError::InvalidValue("Axes contain duplicates"));
        }
        resolved.push(axis);
    }
    Ok(resolved)
}

/// Resolve an index in `[-size, size-1]` to a zero-based index.
pub(crate) fn resolve_index(index: i64, size: usize) -> Result<usize, OpError> {
    let len = size as i64;
    if index < -len || index >= len {
        return Err(OpError::InvalidValue("Index is out of bounds"));
    }
    let index = if index < 0 { index + len } else { index };
    Ok(index as usize)
}

/// Convert a list of sizes to a shape.
pub(crate) fn to_shape(sizes: &[i64]) -> Result<Vec<usize>, OpError> {
    sizes
        .iter()
        .map(|&size| usize::try_from(size).map_err(|_| OpError::InvalidValue("Size is negative")))
        .collect()
}

/// Return the row-major strides of a contiguous tensor with a given shape.
pub(crate) fn strides(shape: &[usize]) -> SmallVec<[usize; 4]> {
    let mut strides: SmallVec<[usize; 4]> = SmallVec::from_elem(1, shape.len());
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Convert an offset into a contiguous tensor to an index.
pub(crate) fn unravel(mut offset: usize, shape: &[usize]) -> SmallVec<[usize; 4]> {
    let mut index: SmallVec<[usize; 4]> = SmallVec::from_elem(0, shape.len());
    for (i, &size) in shape.iter().enumerate().rev() {
        if size > 0 {
            index[i] = offset % size;
            offset /= size;
        }
    }
    index
}

/// Convert an index into a contiguous tensor to an offset.
pub(crate) fn ravel(index: &[usize], shape: &[usize]) -> usize {
    index
        .iter()
        .zip(strides(shape))
        .map(|(&i, stride)| i * stride)
        .sum()
}

/// Compute the result shape from broadcasting two shapes together.
///
/// See <https://github.com/onnx/onnx/blob/main/docs/Broadcasting.md>.
pub(crate) fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<SmallVec<[usize; 4]>> {
    let a_pad = b.len().saturating_sub(a.len());
    let b_pad = a.len().saturating_sub(b.len());

    let a_iter = a.iter().copied().rev().chain(std::iter::repeat(1).take(a_pad));
    let b_iter = b.iter().copied().rev().chain(std::iter::repeat(1).take(b_pad));

    let mut result = SmallVec::with_capacity(a.len().max(b.len()));
    for (a, b) in a_iter.zip(b_iter) {
        if a == b {
            result.push(a);
        } else if a == 1 {
            result.push(b);
        } else if b == 1 {
            result.push(a);
        } else {
            return None;
        }
    }
    result.reverse();

    Some(result)
}

/// Return the elements of `tensor` broadcast to `shape`, in row-major order.
pub(crate) fn broadcast_data<T: Copy>(tensor: &Tensor<T>, shape: &[usize]) -> Result<Vec<T>, OpError> {
    let src_shape = tensor.shape();
    let Some(pad) = shape.len().checked_sub(src_shape.len()) else {
        return Err(OpError::IncompatibleInputShapes(
            "Cannot broadcast to a shape with fewer dims",
        ));
    };
    let compatible = src_shape
        .iter()
        .zip(&shape[pad..])
        .all(|(&src, &dst)| src == dst || src == 1);
    if !compatible {
        return Err(OpError::IncompatibleInputShapes("Cannot broadcast input"));
    }

    let src_strides = strides(src_shape);
    let data = tensor.to_vec();
    let len: usize = shape.iter().product();
    let output = (0..len)
        .map(|offset| {
            let index = unravel(offset, shape);
            let src_offset: usize = src_shape
                .iter()
                .enumerate()
                .map(|(i, &size)| if size == 1 { 0 } else { index[pad + i] * src_strides[i] })
                .sum();
            data[src_offset]
        })
        .collect();
    Ok(output)
}

/// Apply `f` to pairs of elements from `a` and `b` after broadcasting them
/// to a common shape.
pub(crate) fn broadcast_binary<T: Copy, U>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    f: impl Fn(T, T) -> U,
) -> Result<Tensor<U>, OpError> {
    let shape = broadcast_shapes(a.shape(), b.shape())
        .ok_or(OpError::IncompatibleInputShapes("Cannot broadcast inputs"))?;
    let a = broadcast_data(a, &shape)?;
    let b = broadcast_data(b, &shape)?;
    let data: Vec<U> = a.into_iter().zip(b).map(|(x, y)| f(x, y)).collect();
    Ok(Tensor::from_data(&shape[..], data))
}

/// Apply `f` to triples of elements from three tensors after broadcasting
/// them to a common shape.
pub(crate) fn broadcast_ternary<T: Copy, U>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    c: &Tensor<T>,
    f: impl Fn(T, T, T) -> U,
) -> Result<Tensor<U>, OpError> {
    let shape = broadcast_shapes(a.shape(), b.shape())
        .and_then(|ab| broadcast_shapes(&ab, c.shape()))
        .ok_or(OpError::IncompatibleInputShapes("Cannot broadcast inputs"))?;
    let a = broadcast_data(a, &shape)?;
    let b = broadcast_data(b, &shape)?;
    let c = broadcast_data(c, &shape)?;
    let data: Vec<U> = a
        .into_iter()
        .zip(b)
        .zip(c)
        .map(|((x, y), z)| f(x, y, z))
        .collect();
    Ok(Tensor::from_data(&shape[..], data))
}

/// Return the elements of a tensor as a permuted copy.
pub(crate) fn permute_data<T: Copy>(tensor: &Tensor<T>, perm: &[usize]) -> Tensor<T> {
    let shape = tensor.shape();
    let out_shape: Vec<usize> = perm.iter().map(|&d| shape[d]).collect();
    let in_strides = strides(shape);
    let data = tensor.to_vec();
    let len = data.len();
    let output: Vec<T> = (0..len)
        .map(|offset| {
            let index = unravel(offset, &out_shape);
            let src: usize = perm
                .iter()
                .zip(&index)
                .map(|(&d, &i)| i * in_strides[d])
                .sum();
            data[src]
        })
        .collect();
    Tensor::from_data(&out_shape, output)
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;
    use rten_testing::TestCases;

    use super::{
        broadcast_binary, broadcast_data, broadcast_shapes, ravel, resolve_axes, resolve_axis,
        strides, unravel,
    };

    #[test]
    fn test_broadcast_shapes() {
        #[derive(Debug)]
        struct Case {
            a: Vec<usize>,
            b: Vec<usize>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                a: [2, 3].into(),
                b: [3].into(),
                expected: Some([2, 3].into()),
            },
            Case {
                a: [1, 3].into(),
                b: [4, 1].into(),
                expected: Some([4, 3].into()),
            },
            Case {
                a: [].into(),
                b: [2].into(),
                expected: Some([2].into()),
            },
            Case {
                a: [2, 3].into(),
                b: [4].into(),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let result = broadcast_shapes(&case.a, &case.b).map(|s| s.to_vec());
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_broadcast_data() {
        let x = Tensor::from_data(&[2, 1], vec![1., 2.]);
        assert_eq!(
            broadcast_data(&x, &[2, 3]).unwrap(),
            vec![1., 1., 1., 2., 2., 2.]
        );
        assert!(broadcast_data(&x, &[3]).is_err());
        assert!(broadcast_data(&x, &[3, 3]).is_err());

        let sum = broadcast_binary(&x, &Tensor::from_data(&[3], vec![1., 2., 3.]), |a, b| a + b)
            .unwrap();
        assert_eq!(sum.shape(), &[2, 3]);
        assert_eq!(sum.to_vec(), vec![2., 3., 4., 3., 4., 5.]);
    }

    #[test]
    fn test_index_conversions() {
        let shape = [2, 3, 4];
        assert_eq!(strides(&shape).as_slice(), &[12, 4, 1]);
        for offset in 0..24 {
            let index = unravel(offset, &shape);
            assert_eq!(ravel(&index, &shape), offset);
        }
        assert_eq!(unravel(0, &[]).len(), 0);
    }

    #[test]
    fn test_resolve_axis() {
        assert_eq!(resolve_axis(3, -1), Ok(2));
        assert_eq!(resolve_axis(0, -1), Ok(0));
        assert!(resolve_axis(2, 2).is_err());
        assert!(resolve_axes(2, &[1, -1]).is_err());
        assert_eq!(resolve_axes(3, &[0, -1]).unwrap().as_slice(), &[0, 2]);
    }
}
