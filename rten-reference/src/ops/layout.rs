use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;
use smallvec::SmallVec;

use super::{
    broadcast_data, float_arg, one, permute_data, ravel, resolve_axes, resolve_axis, to_float,
    to_shape, unravel, Args, OpResult, OpTable,
};

fn permute(args: &Args) -> OpResult {
    let input = args.tensor("self")?;
    let dims = args.ints("dims")?;
    if dims.len() != input.ndim() {
        return Err(OpError::InvalidValue("Permutation has wrong length"));
    }
    let perm = resolve_axes(input.ndim(), &dims)?;
    one(permute_data(&to_float(input), &perm))
}

fn transpose(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let ndim = input.ndim();
    let dim0 = resolve_axis(ndim, args.int("dim0")?)?;
    let dim1 = resolve_axis(ndim, args.int("dim1")?)?;
    if ndim == 0 {
        return one(input);
    }
    let mut perm: SmallVec<[usize; 4]> = (0..ndim).collect();
    perm.swap(dim0, dim1);
    one(permute_data(&input, &perm))
}

fn t(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    match input.ndim() {
        0 | 1 => one(input),
        2 => one(permute_data(&input, &[1, 0])),
        _ => Err(OpError::InvalidValue("t expects a tensor with <= 2 dims")),
    }
}

/// Resolve the target shape of an expand operation, where -1 keeps the size
/// of the corresponding input dim.
fn expand_shape(input_shape: &[usize], sizes: &[i64]) -> Result<Vec<usize>, OpError> {
    let Some(pad) = sizes.len().checked_sub(input_shape.len()) else {
        return Err(OpError::InvalidValue(
            "Expanded shape has fewer dims than input",
        ));
    };
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| match (size, i.checked_sub(pad)) {
            (-1, Some(src)) => Ok(input_shape[src]),
            (-1, None) => Err(OpError::InvalidValue(
                "-1 is not allowed for a new leading dim",
            )),
            (size, _) => usize::try_from(size).map_err(|_| OpError::InvalidValue("Size is negative")),
        })
        .collect()
}

fn expand_to(input: &Tensor<f32>, sizes: &[i64]) -> OpResult {
    let shape = expand_shape(input.shape(), sizes)?;
    let data = broadcast_data(input, &shape)?;
    one(Tensor::from_data(&shape, data))
}

fn expand(args: &Args) -> OpResult {
    expand_to(&float_arg(args, "self")?, &args.ints("size")?)
}

fn expand_as(args: &Args) -> OpResult {
    let sizes: Vec<i64> = args
        .tensor("other")?
        .shape()
        .iter()
        .map(|&size| size as i64)
        .collect();
    expand_to(&float_arg(args, "self")?, &sizes)
}

/// Resolve the target shape of a reshape, where one size may be -1 to infer
/// it from the number of elements.
fn reshape_shape(len: usize, sizes: &[i64]) -> Result<Vec<usize>, OpError> {
    let mut inferred = None;
    let mut known_len: usize = 1;
    for (i, &size) in sizes.iter().enumerate() {
        if size == -1 {
            if inferred.is_some() {
                return Err(OpError::InvalidValue("Only one size can be inferred"));
            }
            inferred = Some(i);
        } else if size < 0 {
            return Err(OpError::InvalidValue("Size is negative"));
        } else {
            known_len = known_len
                .checked_mul(size as usize)
                .ok_or(OpError::InvalidValue("Shape size overflows"))?;
        }
    }

    let mut shape: Vec<usize> = sizes.iter().map(|&size| size.max(0) as usize).collect();
    if let Some(i) = inferred {
        if known_len == 0 || len % known_len != 0 {
            return Err(OpError::InvalidValue("Cannot infer size"));
        }
        shape[i] = len / known_len;
    } else if known_len != len {
        return Err(OpError::InvalidValue(
            "Shape does not match number of elements",
        ));
    }
    Ok(shape)
}

fn reshape(args: &Args, sizes_name: &str) -> OpResult {
    let input = float_arg(args, "self")?;
    let shape = reshape_shape(input.len(), &args.ints(sizes_name)?)?;
    one(Tensor::from_data(&shape, input.to_vec()))
}

fn resize(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let shape = to_shape(&args.ints("size")?)?;
    let len: usize = shape.iter().product();
    let mut data = input.to_vec();
    data.resize(len, 0.);
    one(Tensor::from_data(&shape, data))
}

fn flatten(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let ndim = input.ndim();
    let start = resolve_axis(ndim, args.int("start_dim")?)?;
    let end = resolve_axis(ndim, args.int("end_dim")?)?;
    if start > end {
        return Err(OpError::InvalidValue("start_dim must be <= end_dim"));
    }
    if ndim == 0 {
        return one(Tensor::from_data(&[1], input.to_vec()));
    }
    let shape = input.shape();
    let mut out_shape: Vec<usize> = shape[..start].to_vec();
    out_shape.push(shape[start..=end].iter().product());
    out_shape.extend_from_slice(&shape[end + 1..]);
    one(Tensor::from_data(&out_shape, input.to_vec()))
}

fn unsqueeze(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let dim = resolve_axis(input.ndim() + 1, args.int("dim")?)?;
    let mut shape = input.shape().to_vec();
    shape.insert(dim, 1);
    one(Tensor::from_data(&shape, input.to_vec()))
}

fn squeeze(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let shape: Vec<usize> = input.shape().iter().copied().filter(|&s| s != 1).collect();
    one(Tensor::from_data(&shape, input.to_vec()))
}

fn squeeze_dim(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let dim = resolve_axis(input.ndim(), args.int("dim")?)?;
    let mut shape = input.shape().to_vec();
    if shape.get(dim) == Some(&1) {
        shape.remove(dim);
    }
    one(Tensor::from_data(&shape, input.to_vec()))
}

fn flip(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let dims = args.ints("dims")?;
    let axes: SmallVec<[usize; 4]> = if input.ndim() == 0 {
        for &dim in &dims {
            resolve_axis(0, dim)?;
        }
        if dims.len() > 1 {
            return Err(OpError::InvalidValue("Axes contain duplicates"));
        }
        SmallVec::new()
    } else {
        resolve_axes(input.ndim(), &dims)?
    };

    let shape = input.shape();
    let data = input.to_vec();
    let flipped: Vec<f32> = (0..data.len())
        .map(|offset| {
            let mut index = unravel(offset, shape);
            for &axis in &axes {
                index[axis] = shape[axis] - 1 - index[axis];
            }
            data[ravel(&index, shape)]
        })
        .collect();
    one(Tensor::from_data(shape, flipped))
}

/// Concatenate tensors along `dim`.
///
/// 1D tensors of size zero are skipped, for compatibility with code that
/// used them as placeholders before zero-size dims were supported.
pub fn concat(inputs: &[Tensor<f32>], dim: i64) -> Result<Tensor<f32>, OpError> {
    if inputs.is_empty() {
        return Err(OpError::InvalidValue("Expected a non-empty list of tensors"));
    }
    if inputs.iter().any(|t| t.ndim() == 0) {
        return Err(OpError::InvalidValue("Zero-dim tensors cannot be concatenated"));
    }
    let inputs: Vec<&Tensor<f32>> = inputs
        .iter()
        .filter(|t| !(t.ndim() == 1 && t.shape()[0] == 0))
        .collect();
    let Some(first) = inputs.first() else {
        return Ok(Tensor::zeros(&[0]));
    };

    let ndim = first.ndim();
    let axis = resolve_axis(ndim, dim)?;
    for input in &inputs {
        if input.ndim() != ndim {
            return Err(OpError::IncompatibleInputShapes(
                "Tensors must have the same number of dims",
            ));
        }
        let sizes_match = (0..ndim).all(|d| d == axis || input.shape()[d] == first.shape()[d]);
        if !sizes_match {
            return Err(OpError::IncompatibleInputShapes(
                "Sizes must match except in the concatenated dim",
            ));
        }
    }

    let mut out_shape = first.shape().to_vec();
    out_shape[axis] = inputs.iter().map(|t| t.shape()[axis]).sum();
    let outer: usize = out_shape[..axis].iter().product();
    let inner: usize = out_shape[axis + 1..].iter().product();

    let datas: Vec<Vec<f32>> = inputs.iter().map(|t| t.to_vec()).collect();
    let mut out = Vec::with_capacity(out_shape.iter().product());
    for o in 0..outer {
        for (input, data) in inputs.iter().zip(&datas) {
            let chunk = input.shape()[axis] * inner;
            out.extend_from_slice(&data[o * chunk..(o + 1) * chunk]);
        }
    }
    Ok(Tensor::from_data(&out_shape, out))
}

fn cat(args: &Args) -> OpResult {
    let inputs: Vec<Tensor<f32>> = args.tensors("tensors")?.into_iter().map(to_float).collect();
    one(concat(&inputs, args.int("dim")?)?)
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::permute", permute);
    table.add("aten::transpose.int", transpose);
    table.add("aten::t", t);
    table.add("aten::expand", expand);
    table.add("aten::expand_as", expand_as);
    table.add("aten::broadcast_to", expand);
    table.add("aten::view", |args: &Args| reshape(args, "size"));
    table.add("aten::_unsafe_view", |args: &Args| reshape(args, "size"));
    table.add("aten::_reshape_alias", |args: &Args| reshape(args, "size"));
    table.add("aten::reshape", |args: &Args| reshape(args, "shape"));
    table.add("aten::resize_", resize);
    table.add("aten::flatten.using_ints", flatten);
    table.add("aten::unsqueeze", unsqueeze);
    table.add("aten::squeeze", squeeze);
    table.add("aten::squeeze.dim", squeeze_dim);
    table.add("aten::flip", flip);
    table.add("aten::cat", cat);
}
