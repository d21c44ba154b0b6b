use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;
use smallvec::SmallVec;

use super::{
    float_arg, int_arg, many, one, opt_float_arg, ravel, resolve_axes, resolve_axis, unravel,
    Args, OpResult, OpTable,
};

/// Reduce `input` over `axes`, applying `f` to the elements of each group of
/// reduced elements.
///
/// Groups are visited in the order of the output, and elements within each
/// group are in the order they appear in `input`. Axes which are out of range
/// for a scalar input are ignored.
pub fn reduce<T: Copy, U>(
    input: &Tensor<T>,
    axes: &[usize],
    keep_dims: bool,
    f: impl Fn(&[T]) -> U,
) -> Tensor<U> {
    let shape = input.shape();
    let is_reduced = |dim: usize| axes.contains(&dim);
    let kept_shape: Vec<usize> = shape
        .iter()
        .enumerate()
        .map(|(dim, &size)| if is_reduced(dim) { 1 } else { size })
        .collect();

    let out_len: usize = kept_shape.iter().product();
    let mut groups: Vec<Vec<T>> = (0..out_len).map(|_| Vec::new()).collect();
    for (offset, &x) in input.iter().enumerate() {
        let mut index = unravel(offset, shape);
        for (dim, i) in index.iter_mut().enumerate() {
            if is_reduced(dim) {
                *i = 0;
            }
        }
        groups[ravel(&index, &kept_shape)].push(x);
    }
    let data: Vec<U> = groups.iter().map(|group| f(group)).collect();

    let out_shape: Vec<usize> = if keep_dims {
        kept_shape
    } else {
        shape
            .iter()
            .enumerate()
            .filter(|(dim, _)| !is_reduced(*dim))
            .map(|(_, &size)| size)
            .collect()
    };
    Tensor::from_data(&out_shape, data)
}

/// Resolve the dims of a reduction over a list of dims. An empty list
/// reduces over all dims.
fn reduction_axes(ndim: usize, dims: &[i64]) -> Result<SmallVec<[usize; 4]>, OpError> {
    if dims.is_empty() {
        return Ok((0..ndim).collect());
    }
    if ndim == 0 {
        for &dim in dims {
            resolve_axis(ndim, dim)?;
        }
        return Ok(SmallVec::new());
    }
    resolve_axes(ndim, dims)
}

fn all_axes<T>(input: &Tensor<T>) -> SmallVec<[usize; 4]> {
    (0..input.ndim()).collect()
}

fn sum(xs: &[f32]) -> f32 {
    xs.iter().sum()
}

fn mean(xs: &[f32]) -> f32 {
    sum(xs) / xs.len() as f32
}

fn variance(xs: &[f32], unbiased: bool) -> f32 {
    let mean = mean(xs);
    let sum_sq: f32 = xs.iter().map(|x| (x - mean) * (x - mean)).sum();
    let n = xs.len() as f32 - if unbiased { 1. } else { 0. };
    sum_sq / n
}

/// Return the position of the first maximum in `xs`.
fn argmax_slice(xs: &[f32]) -> i32 {
    let mut max_pos = 0;
    for (pos, &x) in xs.iter().enumerate() {
        if x > xs[max_pos] || x.is_nan() {
            max_pos = pos;
            if x.is_nan() {
                break;
            }
        }
    }
    max_pos as i32
}

fn max_slice(xs: &[f32]) -> f32 {
    xs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

/// Fail if a reduction without an identity value would reduce over an
/// empty dimension.
fn check_nonempty_dim(shape: &[usize], axis: usize) -> Result<(), OpError> {
    if shape.get(axis) == Some(&0) {
        return Err(OpError::InvalidValue(
            "Cannot reduce over empty dimension without an identity",
        ));
    }
    Ok(())
}

fn full_reduce(args: &Args, f: fn(&[f32]) -> f32) -> OpResult {
    let input = float_arg(args, "self")?;
    one(reduce(&input, &all_axes(&input), false, f))
}

fn logical_full_reduce(args: &Args, f: fn(&[f32]) -> bool) -> OpResult {
    let input = float_arg(args, "self")?;
    one(reduce(&input, &all_axes(&input), false, |xs| f(xs) as i32))
}

fn max(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    if input.is_empty() {
        return Err(OpError::InvalidValue(
            "Cannot reduce over empty tensor without an identity",
        ));
    }
    one(reduce(&input, &all_axes(&input), false, max_slice))
}

fn var_op(args: &Args, sqrt: bool) -> OpResult {
    let unbiased = args.bool("unbiased")?;
    let input = float_arg(args, "self")?;
    one(reduce(&input, &all_axes(&input), false, |xs| {
        let var = variance(xs, unbiased);
        if sqrt {
            var.sqrt()
        } else {
            var
        }
    }))
}

fn argmax(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let keep_dims = args.bool("keepdim")?;
    match args.opt_int("dim")? {
        Some(dim) => {
            let axis = resolve_axis(input.ndim(), dim)?;
            check_nonempty_dim(input.shape(), axis)?;
            one(reduce(&input, &[axis], keep_dims, argmax_slice))
        }
        None => {
            if input.is_empty() {
                return Err(OpError::InvalidValue(
                    "Cannot compute argmax of empty tensor",
                ));
            }
            one(reduce(&input, &all_axes(&input), keep_dims, argmax_slice))
        }
    }
}

fn any_dim(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    one(reduce(&input, &[axis], args.bool("keepdim")?, |xs| {
        xs.iter().any(|&x| x != 0.) as i32
    }))
}

fn max_dim(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    check_nonempty_dim(input.shape(), axis)?;
    let keep_dims = args.bool("keepdim")?;
    let values = reduce(&input, &[axis], keep_dims, max_slice);
    let indices = reduce(&input, &[axis], keep_dims, argmax_slice);
    many([values.into(), indices.into()])
}

fn reduce_dims(args: &Args, f: fn(&[f32]) -> f32) -> OpResult {
    let input = float_arg(args, "self")?;
    let axes = reduction_axes(input.ndim(), &args.ints("dim")?)?;
    one(reduce(&input, &axes, args.bool("keepdim")?, f))
}

fn vector_norm(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let ord = args.float("ord")? as f32;
    let dims = args.opt_ints("dim")?.unwrap_or_default();
    let axes = reduction_axes(input.ndim(), &dims)?;
    one(reduce(&input, &axes, args.bool("keepdim")?, |xs| {
        if ord == f32::INFINITY {
            xs.iter().fold(0., |max: f32, x| max.max(x.abs()))
        } else if ord == 0. {
            xs.iter().filter(|&&x| x != 0.).count() as f32
        } else {
            xs.iter().map(|x| x.abs().powf(ord)).sum::<f32>().powf(1. / ord)
        }
    }))
}

fn bincount(args: &Args) -> OpResult {
    let input = int_arg(args, "self")?;
    if input.ndim() != 1 {
        return Err(OpError::InvalidValue("bincount only supports 1D inputs"));
    }
    let minlength = args.int("minlength")?;
    if minlength < 0 {
        return Err(OpError::InvalidValue("minlength must be non-negative"));
    }
    let weights = opt_float_arg(args, "weights")?;
    if let Some(weights) = &weights {
        if weights.shape() != input.shape() {
            return Err(OpError::IncompatibleInputShapes(
                "weights must have the same shape as input",
            ));
        }
    }
    if input.iter().any(|&x| x < 0) {
        return Err(OpError::InvalidValue("bincount input must be non-negative"));
    }

    let max_value = input.iter().copied().max().map(|x| x as usize + 1).unwrap_or(0);
    let len = max_value.max(minlength as usize);
    let mut counts = vec![0f32; len];
    let weights = weights.map(|w| w.to_vec());
    for (i, &x) in input.iter().enumerate() {
        counts[x as usize] += weights.as_ref().map(|w| w[i]).unwrap_or(1.);
    }
    one(Tensor::from_data(&[len], counts))
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::any", |args: &Args| {
        logical_full_reduce(args, |xs| xs.iter().any(|&x| x != 0.))
    });
    table.add("aten::all", |args: &Args| {
        logical_full_reduce(args, |xs| xs.iter().all(|&x| x != 0.))
    });
    table.add("aten::max", max);
    table.add("aten::sum", |args: &Args| full_reduce(args, sum));
    table.add("aten::mean", |args: &Args| full_reduce(args, mean));
    table.add("aten::var", |args: &Args| var_op(args, false));
    table.add("aten::std", |args: &Args| var_op(args, true));
    table.add("aten::argmax", argmax);
    table.add("aten::any.dim", any_dim);
    table.add("aten::max.dim", max_dim);
    table.add("aten::mean.dim", |args: &Args| reduce_dims(args, mean));
    table.add("aten::sum.dim_IntList", |args: &Args| reduce_dims(args, sum));
    table.add("aten::linalg_vector_norm", vector_norm);
    table.add("aten::bincount", bincount);
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;
    use rten_testing::TestCases;

    use super::{argmax_slice, reduce, reduction_axes};

    #[test]
    fn test_reduce() {
        #[derive(Debug)]
        struct Case {
            axes: Vec<usize>,
            keep_dims: bool,
            expected_shape: Vec<usize>,
            expected: Vec<f32>,
        }

        let cases = [
            Case {
                axes: vec![0],
                keep_dims: false,
                expected_shape: vec![3],
                expected: vec![5., 7., 9.],
            },
            Case {
                axes: vec![1],
                keep_dims: true,
                expected_shape: vec![2, 1],
                expected: vec![6., 15.],
            },
            Case {
                axes: vec![0, 1],
                keep_dims: false,
                expected_shape: vec![],
                expected: vec![21.],
            },
        ];

        let input = Tensor::from_data(&[2, 3], vec![1., 2., 3., 4., 5., 6.]);
        cases.test_each(|case| {
            let output = reduce(&input, &case.axes, case.keep_dims, |xs| xs.iter().sum::<f32>());
            assert_eq!(output.shape(), case.expected_shape.as_slice());
            assert_eq!(output.to_vec(), case.expected);
        });
    }

    #[test]
    fn test_reduce_empty() {
        let input = Tensor::<f32>::zeros(&[0, 3]);
        let counts = reduce(&input, &[0], false, |xs| xs.len());
        assert_eq!(counts.to_vec(), vec![0, 0, 0]);

        let scalar = Tensor::from_scalar(2.);
        let output = reduce(&scalar, &[], false, |xs: &[f32]| xs[0]);
        assert_eq!(output.shape(), &[] as &[usize]);
        assert_eq!(output.to_vec(), vec![2.]);
    }

    #[test]
    fn test_reduction_axes() {
        assert_eq!(reduction_axes(3, &[]).unwrap().as_slice(), &[0, 1, 2]);
        assert_eq!(reduction_axes(3, &[-1, 0]).unwrap().as_slice(), &[2, 0]);
        assert!(reduction_axes(2, &[1, -1]).is_err());
        assert!(reduction_axes(0, &[0]).unwrap().is_empty());
    }

    #[test]
    fn test_argmax_slice() {
        assert_eq!(argmax_slice(&[1., 3., 2., 3.]), 1);
        assert_eq!(argmax_slice(&[1., f32::NAN, 5.]), 1);
    }
}
