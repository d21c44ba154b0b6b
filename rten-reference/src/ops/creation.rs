use fastrand::Rng;
use rten_shape_lib::{OpError, RealTensor};
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{is_int_dtype, one, to_shape, Args, OpResult, OpTable};

/// Create a tensor filled with `value`, with an integer element type if
/// `int_type` is true.
fn filled(shape: &[usize], value: f64, int_type: bool) -> RealTensor {
    if int_type {
        Tensor::full(shape, value as i32).into()
    } else {
        Tensor::full(shape, value as f32).into()
    }
}

/// Return true if a creation op should produce an integer tensor, given its
/// optional `dtype` argument and the element type to use if it is absent.
fn is_int_output(args: &Args, default_int: bool) -> Result<bool, OpError> {
    Ok(args
        .opt_int("dtype")?
        .map(is_int_dtype)
        .unwrap_or(default_int))
}

fn from_size(args: &Args, value: f64) -> OpResult {
    let shape = to_shape(&args.ints("size")?)?;
    one(filled(&shape, value, is_int_output(args, false)?))
}

fn full(args: &Args) -> OpResult {
    from_size(args, args.float("fill_value")?)
}

fn like(args: &Args, value: f64) -> OpResult {
    let input = args.tensor("self")?;
    let is_int = matches!(input, RealTensor::Int(_));
    one(filled(input.shape(), value, is_int_output(args, is_int)?))
}

fn full_like(args: &Args) -> OpResult {
    like(args, args.float("fill_value")?)
}

fn rand_like(args: &Args) -> OpResult {
    let input = args.tensor("self")?;
    let mut rng = Rng::with_seed(0);
    let data: Vec<f32> = (0..input.len()).map(|_| rng.f32()).collect();
    one(Tensor::from_data(input.shape(), data))
}

fn new_from_size(args: &Args, value: f64) -> OpResult {
    let is_int = matches!(args.tensor("self")?, RealTensor::Int(_));
    let shape = to_shape(&args.ints("size")?)?;
    one(filled(&shape, value, is_int_output(args, is_int)?))
}

/// Generate the values in `start..end` with a given step.
fn range(start: f64, end: f64, step: f64) -> Result<Vec<f64>, OpError> {
    if step == 0. {
        return Err(OpError::InvalidValue("Step must be non-zero"));
    }
    if !start.is_finite() || !end.is_finite() {
        return Err(OpError::InvalidValue("Range bounds must be finite"));
    }
    if (step > 0. && end < start) || (step < 0. && end > start) {
        return Err(OpError::InvalidValue(
            "Range bounds are inconsistent with step sign",
        ));
    }

    let mut values = Vec::new();
    loop {
        let x = start + values.len() as f64 * step;
        if (step > 0. && x >= end) || (step < 0. && x <= end) {
            break;
        }
        values.push(x);
    }
    Ok(values)
}

fn arange(args: &Args, start: f64, end: f64, step: f64) -> OpResult {
    let values = range(start, end, step)?;
    let len = values.len();
    if is_int_output(args, false)? {
        one(Tensor::from_data(&[len], values.into_iter().map(|x| x as i32).collect::<Vec<_>>()))
    } else {
        one(Tensor::from_data(&[len], values.into_iter().map(|x| x as f32).collect::<Vec<_>>()))
    }
}

fn shape_as_tensor(args: &Args) -> OpResult {
    let input = args.tensor("self")?;
    let shape: Vec<i32> = input.shape().iter().map(|&size| size as i32).collect();
    one(Tensor::from_data(&[shape.len()], shape))
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::zeros", |args: &Args| from_size(args, 0.));
    table.add("aten::ones", |args: &Args| from_size(args, 1.));
    table.add("aten::empty.memory_format", |args: &Args| from_size(args, 0.));
    table.add("aten::full", full);

    table.add("aten::full_like", full_like);
    table.add("aten::zeros_like", |args: &Args| like(args, 0.));
    table.add("aten::ones_like", |args: &Args| like(args, 1.));
    table.add("aten::empty_like", |args: &Args| like(args, 0.));
    table.add("aten::rand_like", rand_like);

    table.add("aten::new_zeros", |args: &Args| new_from_size(args, 0.));
    table.add("aten::new_ones", |args: &Args| new_from_size(args, 1.));
    table.add("aten::new_empty", |args: &Args| new_from_size(args, 0.));

    table.add("aten::arange.start_step", |args: &Args| {
        arange(args, args.float("start")?, args.float("end")?, args.float("step")?)
    });
    table.add("aten::arange.start", |args: &Args| {
        arange(args, args.float("start")?, args.float("end")?, 1.)
    });
    table.add("aten::arange", |args: &Args| {
        arange(args, 0., args.float("end")?, 1.)
    });

    table.add("aten::tensor.float", |args: &Args| {
        one(Tensor::from_scalar(args.float("t")? as f32))
    });
    table.add("aten::tensor.int", |args: &Args| {
        one(Tensor::from_scalar(args.int("t")? as i32))
    });
    table.add("aten::tensor.bool", |args: &Args| {
        one(Tensor::from_scalar(args.bool("t")? as i32))
    });
    table.add("aten::_shape_as_tensor", shape_as_tensor);
    table.add("prim::NumToTensor.Scalar", |args: &Args| {
        one(Tensor::from_scalar(args.float("a")? as f32))
    });
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::range;

    #[test]
    fn test_range() {
        #[derive(Debug)]
        struct Case {
            start: f64,
            end: f64,
            step: f64,
            expected: Option<Vec<f64>>,
        }

        let cases = [
            Case {
                start: 0.,
                end: 10.,
                step: 3.,
                expected: Some([0., 3., 6., 9.].into()),
            },
            Case {
                start: 1.,
                end: 2.5,
                step: 0.5,
                expected: Some([1., 1.5, 2.].into()),
            },
            Case {
                start: 10.,
                end: 0.,
                step: -4.,
                expected: Some([10., 6., 2.].into()),
            },
            Case {
                start: 1.,
                end: 1.,
                step: 1.,
                expected: Some([].into()),
            },
            Case {
                start: 0.,
                end: 10.,
                step: 0.,
                expected: None,
            },
            Case {
                start: 0.,
                end: 10.,
                step: -1.,
                expected: None,
            },
            Case {
                start: 0.,
                end: f64::INFINITY,
                step: 1.,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(range(case.start, case.end, case.step).ok(), case.expected);
        });
    }
}
