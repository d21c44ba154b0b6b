use fastrand::Rng;
use rten_shape_lib::{OpError, RealTensor};
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{float_arg, is_int_dtype, one, to_float, to_int, Args, OpResult, OpTable};

/// Computes the [error function](https://en.wikipedia.org/wiki/Error_function).
///
/// Uses the approximation from Abramowitz and Stegun, which has a maximum
/// absolute error of about 1.5e-7.
#[allow(clippy::excessive_precision)]
pub fn erf(x: f32) -> f32 {
    let sign = x.signum();
    let x = x.abs();
    let t = 1. / (1. + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1. - poly * (-x * x).exp())
}

const SQRT_2_OVER_PI: f32 = 0.7978846;

/// Gaussian error linear unit. If `approximate` is true, the tanh
/// approximation is used.
pub fn gelu(x: f32, approximate: bool) -> f32 {
    if approximate {
        0.5 * x * (1. + (SQRT_2_OVER_PI * (x + 0.044715 * x.powi(3))).tanh())
    } else {
        0.5 * x * (1. + erf(x / std::f32::consts::SQRT_2))
    }
}

/// Parse the `approximate` argument of GELU operators.
pub(crate) fn gelu_approximation(args: &Args) -> Result<bool, OpError> {
    match args.str("approximate")?.as_str() {
        "none" => Ok(false),
        "tanh" => Ok(true),
        _ => Err(OpError::InvalidValue("Unsupported GELU approximation")),
    }
}

fn sigmoid(x: f32) -> f32 {
    1. / (1. + (-x).exp())
}

fn hardsigmoid(x: f32) -> f32 {
    (x / 6. + 0.5).clamp(0., 1.)
}

/// Apply `f` to each element of the `self` operand.
fn map_self(args: &Args, f: fn(f32) -> f32) -> OpResult {
    let input = float_arg(args, "self")?;
    one(input.map(|&x| f(x)))
}

/// Convert a tensor to an integer or float tensor.
fn cast(tensor: RealTensor, to_int_type: bool) -> RealTensor {
    if to_int_type {
        to_int(tensor).into()
    } else {
        to_float(tensor).into()
    }
}

/// Convert `self` to the element type given by an optional `dtype`.
fn cast_dtype(args: &Args) -> OpResult {
    let input = args.tensor("self")?;
    let output = match args.opt_int("dtype")? {
        Some(dtype) => cast(input, is_int_dtype(dtype)),
        None => input,
    };
    one(output)
}

fn cast_like(args: &Args) -> OpResult {
    let to_int_type = matches!(args.tensor("other")?, RealTensor::Int(_));
    one(cast(args.tensor("self")?, to_int_type))
}

fn identity(args: &Args) -> OpResult {
    one(args.tensor("self")?)
}

fn hardtanh(args: &Args) -> OpResult {
    let min = args.float("min_val")? as f32;
    let max = args.float("max_val")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| x.clamp(min, max)))
}

fn gelu_op(args: &Args) -> OpResult {
    let approximate = gelu_approximation(args)?;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| gelu(x, approximate)))
}

fn leaky_relu(args: &Args) -> OpResult {
    let alpha = args.float("negative_slope")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| if x < 0. { alpha * x } else { x }))
}

fn clamp(args: &Args) -> OpResult {
    let min = args.opt_float("min")?;
    let max = args.opt_float("max")?;
    if min.is_none() && max.is_none() {
        return Err(OpError::InvalidValue(
            "At least one of min or max must be specified",
        ));
    }
    let min = min.map(|x| x as f32).unwrap_or(f32::NEG_INFINITY);
    let max = max.map(|x| x as f32).unwrap_or(f32::INFINITY);
    let input = float_arg(args, "self")?;
    one(input.map(|&x| x.max(min).min(max)))
}

fn threshold(args: &Args) -> OpResult {
    let threshold = args.float("threshold")? as f32;
    let value = args.float("value")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| if x > threshold { x } else { value }))
}

fn dropout(args: &Args) -> OpResult {
    let p = args.float("p")?;
    if !(0.0..=1.0).contains(&p) {
        return Err(OpError::InvalidValue("Dropout probability must be in [0, 1]"));
    }
    let input = float_arg(args, "input")?;
    if !args.bool("train")? {
        return one(input);
    }

    let p = p as f32;
    let scale = if p < 1. { 1. / (1. - p) } else { 0. };
    let mut rng = Rng::with_seed(0);
    let data: Vec<f32> = input
        .iter()
        .map(|&x| if rng.f32() < p { 0. } else { x * scale })
        .collect();
    one(Tensor::from_data(input.shape(), data))
}

fn bernoulli(args: &Args) -> OpResult {
    let probs = float_arg(args, "self")?;
    let mut rng = Rng::with_seed(0);
    let data: Vec<f32> = probs
        .iter()
        .map(|&p| if rng.f32() < p { 1. } else { 0. })
        .collect();
    one(Tensor::from_data(probs.shape(), data))
}

fn zero(args: &Args) -> OpResult {
    let input = args.tensor("self")?;
    one(Tensor::<f32>::zeros(input.shape()))
}

fn to_dtype(args: &Args) -> OpResult {
    let dtype = args.int("dtype")?;
    one(cast(args.tensor("self")?, is_int_dtype(dtype)))
}

/// Comparison between a tensor and a scalar. The output is boolean.
fn compare_scalar(args: &Args, f: fn(f32, f32) -> bool) -> OpResult {
    let other = args.float("other")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| f(x, other) as i32))
}

/// Arithmetic between a tensor and a scalar.
fn arith_scalar(args: &Args, f: fn(f32, f32) -> f32) -> OpResult {
    let other = args.float("other")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| f(x, other)))
}

/// Arithmetic between a tensor and a scalar which is scaled by `alpha`.
fn arith_scalar_alpha(args: &Args, f: fn(f32, f32) -> f32) -> OpResult {
    let other = (args.float("other")? * args.float("alpha")?) as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| f(x, other)))
}

fn rsub_scalar(args: &Args) -> OpResult {
    let other = args.float("other")? as f32;
    let alpha = args.float("alpha")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| other - alpha * x))
}

fn pow_scalar(args: &Args) -> OpResult {
    let exponent = args.float("exponent")? as f32;
    let input = float_arg(args, "self")?;
    one(input.map(|&x| x.powf(exponent)))
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::tanh", |args: &Args| map_self(args, f32::tanh));
    table.add("aten::erf", |args: &Args| map_self(args, erf));
    table.add("aten::sigmoid", |args: &Args| map_self(args, sigmoid));
    table.add("aten::hardsigmoid", |args: &Args| map_self(args, hardsigmoid));
    table.add("aten::square", |args: &Args| map_self(args, |x| x * x));
    table.add("aten::hardswish", |args: &Args| {
        map_self(args, |x| x * hardsigmoid(x))
    });
    table.add("aten::silu", |args: &Args| map_self(args, |x| x * sigmoid(x)));
    table.add("aten::exp", |args: &Args| map_self(args, f32::exp));
    table.add("aten::sin", |args: &Args| map_self(args, f32::sin));
    table.add("aten::cos", |args: &Args| map_self(args, f32::cos));
    table.add("aten::sqrt", |args: &Args| map_self(args, f32::sqrt));
    table.add("aten::neg", |args: &Args| map_self(args, |x| -x));
    table.add("aten::floor", |args: &Args| map_self(args, f32::floor));
    table.add("aten::log2", |args: &Args| map_self(args, f32::log2));
    table.add("aten::rsqrt", |args: &Args| map_self(args, |x| 1. / x.sqrt()));
    table.add("aten::abs", |args: &Args| map_self(args, f32::abs));
    table.add("aten::reciprocal", |args: &Args| map_self(args, |x| 1. / x));
    table.add("aten::ceil", |args: &Args| map_self(args, f32::ceil));
    table.add("aten::log", |args: &Args| map_self(args, f32::ln));
    table.add("aten::relu", |args: &Args| map_self(args, |x| x.max(0.)));
    table.add("aten::detach", identity);
    table.add("aten::zero.functional", zero);

    table.add("aten::hardtanh", hardtanh);
    table.add("aten::gelu", gelu_op);
    table.add("aten::leaky_relu", leaky_relu);
    table.add("aten::clamp", clamp);
    table.add("aten::threshold", threshold);
    table.add("aten::dropout", dropout);
    table.add("aten::bernoulli", bernoulli);

    table.add("aten::to.dtype", to_dtype);
    table.add("aten::to.dtype_layout", cast_dtype);
    table.add("aten::to.other", cast_like);
    table.add("aten::_to_copy", cast_dtype);
    table.add("aten::type_as", cast_like);
    table.add("aten::contiguous", identity);
    table.add("aten::clone", identity);

    table.add("aten::eq.Scalar", |args: &Args| compare_scalar(args, |x, y| x == y));
    table.add("aten::ne.Scalar", |args: &Args| compare_scalar(args, |x, y| x != y));
    table.add("aten::gt.Scalar", |args: &Args| compare_scalar(args, |x, y| x > y));
    table.add("aten::ge.Scalar", |args: &Args| compare_scalar(args, |x, y| x >= y));
    table.add("aten::le.Scalar", |args: &Args| compare_scalar(args, |x, y| x <= y));
    table.add("aten::lt.Scalar", |args: &Args| compare_scalar(args, |x, y| x < y));
    table.add("aten::mul.Scalar", |args: &Args| arith_scalar(args, |x, y| x * y));
    table.add("aten::div.Scalar", |args: &Args| arith_scalar(args, |x, y| x / y));
    table.add("aten::floor_divide.Scalar", |args: &Args| {
        arith_scalar(args, |x, y| (x / y).floor())
    });
    table.add("aten::add.Scalar", |args: &Args| {
        arith_scalar_alpha(args, |x, y| x + y)
    });
    table.add("aten::sub.Scalar", |args: &Args| {
        arith_scalar_alpha(args, |x, y| x - y)
    });
    table.add("aten::rsub.Scalar", rsub_scalar);
    table.add("aten::pow.Tensor_Scalar", pow_scalar);
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{erf, gelu};

    #[test]
    fn test_erf() {
        #[derive(Debug)]
        struct Case {
            x: f32,
            expected: f32,
        }

        let cases = [
            Case { x: 0., expected: 0. },
            Case {
                x: 0.5,
                expected: 0.5204999,
            },
            Case {
                x: -1.,
                expected: -0.8427008,
            },
            Case {
                x: 3.,
                expected: 0.9999779,
            },
        ];

        cases.test_each(|case| {
            assert!((erf(case.x) - case.expected).abs() < 1e-5);
        });
    }

    #[test]
    fn test_gelu() {
        assert_eq!(gelu(0., false), 0.);
        assert!((gelu(1., false) - 0.8413447).abs() < 1e-5);
        assert!((gelu(1., true) - 0.8411920).abs() < 1e-5);
        assert!(gelu(-10., false).abs() < 1e-5);
    }
}
