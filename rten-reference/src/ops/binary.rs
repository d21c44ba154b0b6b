use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::unary::gelu_approximation;
use super::{broadcast_binary, broadcast_ternary, erf, float_arg, one, Args, OpResult, OpTable};

/// Elementwise arithmetic between two broadcast tensors.
fn arith(args: &Args, f: fn(f32, f32) -> f32) -> OpResult {
    let a = float_arg(args, "self")?;
    let b = float_arg(args, "other")?;
    one(broadcast_binary(&a, &b, f)?)
}

/// Addition or subtraction where `other` is scaled by `alpha`.
fn arith_alpha(args: &Args, f: fn(f32, f32) -> f32) -> OpResult {
    let alpha = args.float("alpha")? as f32;
    let a = float_arg(args, "self")?;
    let b = float_arg(args, "other")?;
    one(broadcast_binary(&a, &b, |x, y| f(x, alpha * y))?)
}

/// Elementwise comparison or logical operator. The output is boolean.
fn logical(args: &Args, f: fn(f32, f32) -> bool) -> OpResult {
    let a = float_arg(args, "self")?;
    let b = float_arg(args, "other")?;
    one(broadcast_binary(&a, &b, |x, y| f(x, y) as i32)?)
}

fn bitwise_and(args: &Args) -> OpResult {
    let a = float_arg(args, "self")?;
    let b = float_arg(args, "other")?;
    one(broadcast_binary(&a, &b, |x, y| (x as i32) & (y as i32))?)
}

/// Select elements from `x` where `cond` is true and from `y` otherwise.
pub fn where_op(
    cond: &Tensor<f32>,
    x: &Tensor<f32>,
    y: &Tensor<f32>,
) -> Result<Tensor<f32>, OpError> {
    broadcast_ternary(cond, x, y, |c, x, y| if c != 0. { x } else { y })
}

fn where_self(args: &Args) -> OpResult {
    let cond = float_arg(args, "condition")?;
    let x = float_arg(args, "self")?;
    let y = float_arg(args, "other")?;
    one(where_op(&cond, &x, &y)?)
}

fn where_scalar(args: &Args) -> OpResult {
    let cond = float_arg(args, "condition")?;
    let x = Tensor::from_scalar(args.float("self")? as f32);
    let y = Tensor::from_scalar(args.float("other")? as f32);
    one(where_op(&cond, &x, &y)?)
}

fn where_scalar_other(args: &Args) -> OpResult {
    let cond = float_arg(args, "condition")?;
    let x = float_arg(args, "self")?;
    let y = Tensor::from_scalar(args.float("other")? as f32);
    one(where_op(&cond, &x, &y)?)
}

fn where_scalar_self(args: &Args) -> OpResult {
    let cond = float_arg(args, "condition")?;
    let x = Tensor::from_scalar(args.float("self")? as f32);
    let y = float_arg(args, "other")?;
    one(where_op(&cond, &x, &y)?)
}

fn masked_fill(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let mask = float_arg(args, "mask")?;
    let value = args.float("value")? as f32;
    one(broadcast_binary(&input, &mask, |x, m| if m != 0. { value } else { x })?)
}

fn lerp(args: &Args) -> OpResult {
    let start = float_arg(args, "self")?;
    let end = float_arg(args, "end")?;
    let weight = float_arg(args, "weight")?;
    one(broadcast_ternary(&start, &end, &weight, |s, e, w| s + w * (e - s))?)
}

fn addcmul(args: &Args) -> OpResult {
    let value = args.float("value")? as f32;
    let input = float_arg(args, "self")?;
    let t1 = float_arg(args, "tensor1")?;
    let t2 = float_arg(args, "tensor2")?;
    one(broadcast_ternary(&input, &t1, &t2, |x, a, b| x + value * a * b)?)
}

fn addcdiv(args: &Args) -> OpResult {
    let value = args.float("value")? as f32;
    let input = float_arg(args, "self")?;
    let t1 = float_arg(args, "tensor1")?;
    let t2 = float_arg(args, "tensor2")?;
    one(broadcast_ternary(&input, &t1, &t2, |x, a, b| x + value * a / b)?)
}

fn tanh_backward(args: &Args) -> OpResult {
    let grad = float_arg(args, "grad_output")?;
    let output = float_arg(args, "output")?;
    one(broadcast_binary(&grad, &output, |g, y| g * (1. - y * y))?)
}

/// Derivative of GELU.
fn gelu_grad(x: f32, approximate: bool) -> f32 {
    if approximate {
        let k = 0.7978846;
        let inner = k * (x + 0.044715 * x.powi(3));
        let t = inner.tanh();
        0.5 * (1. + t) + 0.5 * x * (1. - t * t) * k * (1. + 3. * 0.044715 * x * x)
    } else {
        let cdf = 0.5 * (1. + erf(x / std::f32::consts::SQRT_2));
        let pdf = (-0.5 * x * x).exp() / (2. * std::f32::consts::PI).sqrt();
        cdf + x * pdf
    }
}

fn gelu_backward(args: &Args) -> OpResult {
    let approximate = gelu_approximation(args)?;
    let grad = float_arg(args, "grad_output")?;
    let input = float_arg(args, "self")?;
    one(broadcast_binary(&grad, &input, |g, x| {
        g * gelu_grad(x, approximate)
    })?)
}

fn threshold_backward(args: &Args) -> OpResult {
    let threshold = args.float("threshold")? as f32;
    let grad = float_arg(args, "grad_output")?;
    let input = float_arg(args, "self")?;
    one(broadcast_binary(&grad, &input, |g, x| {
        if x <= threshold {
            0.
        } else {
            g
        }
    })?)
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::add.Tensor", |args: &Args| arith_alpha(args, |x, y| x + y));
    table.add("aten::sub.Tensor", |args: &Args| arith_alpha(args, |x, y| x - y));
    table.add("aten::mul.Tensor", |args: &Args| arith(args, |x, y| x * y));
    table.add("aten::div.Tensor", |args: &Args| arith(args, |x, y| x / y));
    table.add("aten::minimum", |args: &Args| arith(args, f32::min));
    table.add("aten::maximum", |args: &Args| arith(args, f32::max));
    table.add("aten::__and__.Tensor", bitwise_and);
    table.add("aten::bitwise_and.Tensor", bitwise_and);
    table.add("aten::logical_or", |args: &Args| {
        logical(args, |x, y| x != 0. || y != 0.)
    });
    table.add("aten::eq.Tensor", |args: &Args| logical(args, |x, y| x == y));
    table.add("aten::gt.Tensor", |args: &Args| logical(args, |x, y| x > y));
    table.add("aten::lt.Tensor", |args: &Args| logical(args, |x, y| x < y));

    table.add("aten::where.self", where_self);
    table.add("aten::where.Scalar", where_scalar);
    table.add("aten::where.ScalarOther", where_scalar_other);
    table.add("aten::where.ScalarSelf", where_scalar_self);
    table.add("aten::masked_fill.Scalar", masked_fill);
    table.add("aten::lerp.Tensor", lerp);
    table.add("aten::addcmul", addcmul);
    table.add("aten::addcdiv", addcdiv);

    table.add("aten::tanh_backward", tanh_backward);
    table.add("aten::gelu_backward", gelu_backward);
    table.add("aten::threshold_backward", threshold_backward);
}
