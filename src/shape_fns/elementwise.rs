//! Elementwise operators.

use super::{Args, ShapeResult};
use crate::algorithms::{broadcast, broadcast3, unary, ShapeError};
use crate::invocation::{bool_tensor, tensor, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, NONE};

/// Operators with a single tensor operand and no parameters.
const UNARY_OPS: &[&str] = &[
    "aten::tanh",
    "aten::erf",
    "aten::sigmoid",
    "aten::hardsigmoid",
    "aten::square",
    "aten::hardswish",
    "aten::silu",
    "aten::exp",
    "aten::sin",
    "aten::cos",
    "aten::sqrt",
    "aten::neg",
    "aten::floor",
    "aten::detach",
    "aten::log2",
    "aten::rsqrt",
    "aten::abs",
    "aten::reciprocal",
    "aten::ceil",
    "aten::log",
    "aten::relu",
    "aten::zero.functional",
];

/// Comparisons and arithmetic between a tensor and a scalar.
const SCALAR_OPS: &[&str] = &[
    "aten::eq.Scalar",
    "aten::ne.Scalar",
    "aten::gt.Scalar",
    "aten::ge.Scalar",
    "aten::le.Scalar",
    "aten::lt.Scalar",
    "aten::mul.Scalar",
    "aten::div.Scalar",
    "aten::floor_divide.Scalar",
];

/// Scalar arithmetic with a multiplier for the scalar operand.
const SCALAR_ALPHA_OPS: &[&str] = &["aten::add.Scalar", "aten::sub.Scalar", "aten::rsub.Scalar"];

/// Binary operators which broadcast their operands.
const BROADCAST_OPS: &[&str] = &[
    "aten::mul.Tensor",
    "aten::div.Tensor",
    "aten::__and__.Tensor",
    "aten::minimum",
    "aten::maximum",
    "aten::bitwise_and.Tensor",
    "aten::logical_or",
    "aten::eq.Tensor",
    "aten::gt.Tensor",
    "aten::lt.Tensor",
];

fn unary_op(args: &Args) -> ShapeResult {
    Ok(unary(&args.tensor("self")?).into())
}

fn unary_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[])]),
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[0, 4])]),
    ]
    .into_iter()
}

fn binary_op(args: &Args) -> ShapeResult {
    Ok(broadcast(&args.tensor("self")?, &args.tensor("other")?)?.into())
}

fn binary_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[2, 3]), tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 3]), tensor(&[3])]),
        Invocation::new([tensor(&[1, 3]), tensor(&[4, 1])]),
        Invocation::new([tensor(&[2, 3]), tensor(&[])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[3, 3])]),
    ]
    .into_iter()
}

/// Shape of a backward operator whose gradient and saved input broadcast
/// together.
fn backward_op(args: &Args) -> ShapeResult {
    let grad = args.tensor("grad_output")?;
    let other = args
        .opt_tensor("output")
        .or_else(|_| args.opt_tensor("self"))?
        .unwrap_or_default();
    Ok(broadcast(&grad, &other)?.into())
}

fn backward_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[2, 3]), tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 3]), tensor(&[3])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4])]),
    ]
    .into_iter()
}

fn gelu(args: &Args) -> ShapeResult {
    match args.str("approximate")?.as_str() {
        "none" | "tanh" => Ok(unary(&args.tensor("self")?).into()),
        _ => Err(ShapeError::InvalidValue(
            "approximate must be \"none\" or \"tanh\"",
        )),
    }
}

fn gelu_backward(args: &Args) -> ShapeResult {
    match args.str("approximate")?.as_str() {
        "none" | "tanh" => backward_op(args),
        _ => Err(ShapeError::InvalidValue(
            "approximate must be \"none\" or \"tanh\"",
        )),
    }
}

fn clamp(args: &Args) -> ShapeResult {
    if args.opt_float("min")?.is_none() && args.opt_float("max")?.is_none() {
        return Err(ShapeError::InvalidValue(
            "at least one of min or max must not be None",
        ));
    }
    unary_op(args)
}

fn dropout(args: &Args) -> ShapeResult {
    let p = args.float("p")?;
    if !(0.0..=1.0).contains(&p) {
        return Err(ShapeError::InvalidValue(
            "dropout probability has to be between 0 and 1",
        ));
    }
    Ok(unary(&args.tensor("input")?).into())
}

fn masked_fill(args: &Args) -> ShapeResult {
    Ok(broadcast(&args.tensor("self")?, &args.tensor("mask")?)?.into())
}

fn where_self(args: &Args) -> ShapeResult {
    Ok(broadcast3(
        &args.tensor("condition")?,
        &args.tensor("self")?,
        &args.tensor("other")?,
    )?
    .into())
}

fn where_scalar(args: &Args) -> ShapeResult {
    Ok(unary(&args.tensor("condition")?).into())
}

fn where_scalar_other(args: &Args) -> ShapeResult {
    Ok(broadcast(&args.tensor("condition")?, &args.tensor("self")?)?.into())
}

fn where_scalar_self(args: &Args) -> ShapeResult {
    Ok(broadcast(&args.tensor("condition")?, &args.tensor("other")?)?.into())
}

fn lerp(args: &Args) -> ShapeResult {
    Ok(broadcast3(
        &args.tensor("self")?,
        &args.tensor("end")?,
        &args.tensor("weight")?,
    )?
    .into())
}

fn addc_op(args: &Args) -> ShapeResult {
    Ok(broadcast3(
        &args.tensor("self")?,
        &args.tensor("tensor1")?,
        &args.tensor("tensor2")?,
    )?
    .into())
}

fn ternary_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[2, 3]), tensor(&[2, 3]), tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 1]), tensor(&[3]), tensor(&[])]),
        Invocation::new([tensor(&[4, 1, 1]), tensor(&[1, 2, 1]), tensor(&[3])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[2, 3]), tensor(&[2])]),
    ]
    .into_iter()
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    for &op in UNARY_OPS {
        lib.register(op, signature!["self": Tensor => 1], unary_op)?
            .invocations(unary_invocations());
    }

    lib.register(
        "aten::hardtanh",
        signature!["self": Tensor, "min_val": Float = -1.0, "max_val": Float = 1.0 => 1],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 3]), 0.0.into(), 6.0.into()]),
    ]);

    lib.register(
        "aten::gelu",
        signature!["self": Tensor, "approximate": Str = "none" => 1],
        gelu,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[4])]).kwarg("approximate", "tanh"),
        Invocation::error([tensor(&[4])]).kwarg("approximate", "fast"),
    ]);

    lib.register(
        "aten::leaky_relu",
        signature!["self": Tensor, "negative_slope": Float = 0.01 => 1],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[5]), 0.2.into()]),
    ]);

    lib.register(
        "aten::clamp",
        signature!["self": Tensor, "min": OptFloat = NONE, "max": OptFloat = NONE => 1],
        clamp,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 0.0.into()]),
        Invocation::new([tensor(&[2, 3])]).kwarg("max", 1),
        Invocation::new([tensor(&[]), (-1.0).into(), 1.0.into()]),
        Invocation::error([tensor(&[2, 3])]),
    ]);

    lib.register(
        "aten::threshold",
        signature!["self": Tensor, "threshold": Float, "value": Float => 1],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 0.5.into(), 0.0.into()]),
        Invocation::error([tensor(&[2, 3]), 0.5.into()]),
    ]);

    lib.register(
        "aten::dropout",
        signature!["input": Tensor, "p": Float, "train": Bool => 1],
        dropout,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 0.5.into(), false.into()]),
        Invocation::new([tensor(&[8]), 0.0.into(), true.into()]),
        Invocation::error([tensor(&[2]), 1.5.into(), true.into()]),
    ]);

    lib.register(
        "aten::bernoulli",
        signature!["self": Tensor, "generator": Any = NONE => 1],
        unary_op,
    )?
    .invocations([Invocation::new([tensor(&[2, 3])])]);

    lib.register(
        "aten::tanh_backward",
        signature!["grad_output": Tensor, "output": Tensor => 1],
        backward_op,
    )?
    .invocations(backward_invocations());

    lib.register(
        "aten::gelu_backward",
        signature!["grad_output": Tensor, "self": Tensor, "approximate": Str = "none" => 1],
        gelu_backward,
    )?
    .invocations(backward_invocations().chain([
        Invocation::error([tensor(&[2]), tensor(&[2])]).kwarg("approximate", "fast"),
    ]));

    lib.register(
        "aten::threshold_backward",
        signature!["grad_output": Tensor, "self": Tensor, "threshold": Float => 1],
        backward_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), tensor(&[2, 3]), 0.0.into()]),
        Invocation::new([tensor(&[3]), tensor(&[2, 3]), 0.0.into()]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4]), 0.0.into()]),
    ]);

    // Conversions and copies.
    lib.register(
        "aten::to.dtype",
        signature![
            "self": Tensor,
            "dtype": Int,
            "non_blocking": Bool = false,
            "copy": Bool = false,
            "memory_format": OptInt = NONE
            => 1
        ],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 4.into()]),
        Invocation::new([tensor(&[]), 6.into()]).kwarg("copy", true),
    ]);

    lib.register(
        "aten::to.dtype_layout",
        signature![
            "self": Tensor,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE,
            "non_blocking": Bool = false,
            "copy": Bool = false,
            "memory_format": OptInt = NONE
            => 1
        ],
        unary_op,
    )?
    .invocations([Invocation::new([tensor(&[2, 3])]).kwarg("dtype", 6)]);

    lib.register(
        "aten::to.other",
        signature![
            "self": Tensor,
            "other": Tensor,
            "non_blocking": Bool = false,
            "copy": Bool = false,
            "memory_format": OptInt = NONE
            => 1
        ],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), tensor(&[5])]),
        Invocation::new([tensor(&[2, 3]), bool_tensor(&[])]),
    ]);

    lib.register(
        "aten::_to_copy",
        signature![
            "self": Tensor,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE,
            "non_blocking": Bool = false,
            "memory_format": OptInt = NONE
            => 1
        ],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[4])]).kwarg("dtype", 4),
    ]);

    lib.register(
        "aten::type_as",
        signature!["self": Tensor, "other": Tensor => 1],
        unary_op,
    )?
    .invocations([Invocation::new([tensor(&[2, 3]), tensor(&[1])])]);

    lib.register(
        "aten::contiguous",
        signature!["self": Tensor, "memory_format": Int = 0 => 1],
        unary_op,
    )?
    .invocations([Invocation::new([tensor(&[2, 3])])]);

    lib.register(
        "aten::clone",
        signature!["self": Tensor, "memory_format": OptInt = NONE => 1],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[])]),
    ]);

    // Tensor-scalar operators.
    for &op in SCALAR_OPS {
        lib.register(op, signature!["self": Tensor, "other": Float => 1], unary_op)?
            .invocations([
                Invocation::new([tensor(&[2, 3]), 2.into()]),
                Invocation::new([tensor(&[]), 0.5.into()]),
            ]);
    }
    for &op in SCALAR_ALPHA_OPS {
        lib.register(
            op,
            signature!["self": Tensor, "other": Float, "alpha": Float = 1.0 => 1],
            unary_op,
        )?
        .invocations([
            Invocation::new([tensor(&[2, 3]), 2.into()]),
            Invocation::new([tensor(&[4]), 1.5.into()]).kwarg("alpha", 2),
        ]);
    }
    lib.register(
        "aten::pow.Tensor_Scalar",
        signature!["self": Tensor, "exponent": Float => 1],
        unary_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 2.into()]),
        Invocation::new([tensor(&[]), 0.5.into()]),
    ]);

    lib.register(
        "aten::masked_fill.Scalar",
        signature!["self": Tensor, "mask": Tensor, "value": Float => 1],
        masked_fill,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), bool_tensor(&[2, 3]), 0.into()]),
        Invocation::new([tensor(&[2, 3]), bool_tensor(&[3]), 1.5.into()]),
        Invocation::new([tensor(&[3]), bool_tensor(&[2, 3]), 1.5.into()]),
        Invocation::error([tensor(&[2, 3]), bool_tensor(&[4]), 0.into()]),
    ]);

    // Broadcasting binary operators.
    for op in ["aten::add.Tensor", "aten::sub.Tensor"] {
        lib.register(
            op,
            signature!["self": Tensor, "other": Tensor, "alpha": Float = 1.0 => 1],
            binary_op,
        )?
        .invocations(binary_invocations().chain([
            Invocation::new([tensor(&[2]), tensor(&[2])]).kwarg("alpha", 2),
        ]));
    }
    for &op in BROADCAST_OPS {
        lib.register(op, signature!["self": Tensor, "other": Tensor => 1], binary_op)?
            .invocations(binary_invocations());
    }

    lib.register(
        "aten::where.self",
        signature!["condition": Tensor, "self": Tensor, "other": Tensor => 1],
        where_self,
    )?
    .invocations([
        Invocation::new([bool_tensor(&[2, 3]), tensor(&[2, 3]), tensor(&[2, 3])]),
        Invocation::new([bool_tensor(&[3]), tensor(&[2, 1]), tensor(&[])]),
        Invocation::error([bool_tensor(&[4]), tensor(&[2, 3]), tensor(&[3])]),
    ]);
    lib.register(
        "aten::where.Scalar",
        signature!["condition": Tensor, "self": Float, "other": Float => 1],
        where_scalar,
    )?
    .invocations([Invocation::new([bool_tensor(&[2, 3]), 1.into(), 0.into()])]);
    lib.register(
        "aten::where.ScalarOther",
        signature!["condition": Tensor, "self": Tensor, "other": Float => 1],
        where_scalar_other,
    )?
    .invocations([
        Invocation::new([bool_tensor(&[2, 3]), tensor(&[3]), 0.into()]),
        Invocation::error([bool_tensor(&[2, 3]), tensor(&[2]), 0.into()]),
    ]);
    lib.register(
        "aten::where.ScalarSelf",
        signature!["condition": Tensor, "self": Float, "other": Tensor => 1],
        where_scalar_self,
    )?
    .invocations([
        Invocation::new([bool_tensor(&[3]), 1.into(), tensor(&[2, 3])]),
        Invocation::error([bool_tensor(&[2, 3]), 1.into(), tensor(&[2])]),
    ]);

    lib.register(
        "aten::lerp.Tensor",
        signature!["self": Tensor, "end": Tensor, "weight": Tensor => 1],
        lerp,
    )?
    .invocations(ternary_invocations());

    for op in ["aten::addcmul", "aten::addcdiv"] {
        lib.register(
            op,
            signature![
                "self": Tensor,
                "tensor1": Tensor,
                "tensor2": Tensor,
                "value": Float = 1.0
                => 1
            ],
            addc_op,
        )?
        .invocations(ternary_invocations());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::invocation::{tensor, Invocation};
    use crate::library::ShapeLibrary;
    use crate::shape::{Returned, Shape};

    fn call(op: &str, inv: Invocation) -> Result<Returned<Shape>, crate::ShapeError> {
        let lib = ShapeLibrary::with_all_ops().unwrap();
        let func = lib.get(&op.parse().unwrap()).unwrap();
        func.call(&inv.to_shape_args().unwrap())
    }

    #[test]
    fn test_backward_ops_use_named_operands() {
        let inv = Invocation::new([tensor(&[3]), tensor(&[2, 3])]);
        assert_eq!(
            call("aten::tanh_backward", inv.clone()),
            Ok(Returned::One(Shape::from([2, 3])))
        );
        assert_eq!(
            call("aten::gelu_backward", inv),
            Ok(Returned::One(Shape::from([2, 3])))
        );
    }

    #[test]
    fn test_clamp_requires_a_bound() {
        assert!(call("aten::clamp", Invocation::new([tensor(&[2])])).is_err());
        assert!(call("aten::clamp", Invocation::new([tensor(&[2])]).kwarg("max", 0)).is_ok());
    }
}
