//! Operators which create new tensors.

use super::{Args, ShapeResult};
use crate::algorithms::{sizes_to_shape, unary, ShapeError};
use crate::invocation::{bool_tensor, ints, long_tensor, tensor, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, NONE};

fn from_size(args: &Args) -> ShapeResult {
    Ok(sizes_to_shape(&args.ints("size")?)?.into())
}

fn like(args: &Args) -> ShapeResult {
    Ok(unary(&args.tensor("self")?).into())
}

fn scalar(_args: &Args) -> ShapeResult {
    Ok(Vec::new().into())
}

/// Return the number of elements in `start..end` with a given step.
fn arange_len(start: f64, end: f64, step: f64) -> Result<usize, ShapeError> {
    if step == 0.0 {
        return Err(ShapeError::InvalidValue("step must be nonzero"));
    }
    if !start.is_finite() || !end.is_finite() {
        return Err(ShapeError::InvalidValue("unsupported range"));
    }
    if (step > 0.0 && end < start) || (step < 0.0 && end > start) {
        return Err(ShapeError::InvalidValue(
            "upper bound and larger bound inconsistent with step sign",
        ));
    }
    Ok(((end - start) / step).ceil() as usize)
}

fn arange(args: &Args) -> ShapeResult {
    let len = arange_len(0.0, args.float("end")?, 1.0)?;
    Ok(vec![len].into())
}

fn arange_start(args: &Args) -> ShapeResult {
    let len = arange_len(args.float("start")?, args.float("end")?, 1.0)?;
    Ok(vec![len].into())
}

fn arange_start_step(args: &Args) -> ShapeResult {
    let len = arange_len(
        args.float("start")?,
        args.float("end")?,
        args.float("step")?,
    )?;
    Ok(vec![len].into())
}

fn shape_as_tensor(args: &Args) -> ShapeResult {
    Ok(vec![args.tensor("self")?.len()].into())
}

fn size_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([ints(&[2, 3])]),
        Invocation::new([ints(&[])]),
        Invocation::new([ints(&[0, 4])]),
        Invocation::error([ints(&[2, -1])]),
    ]
    .into_iter()
}

fn like_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([long_tensor(&[])]),
        Invocation::new([tensor(&[4])]).kwarg("dtype", 6),
    ]
    .into_iter()
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    for op in ["aten::zeros", "aten::ones"] {
        lib.register(
            op,
            signature![
                "size": IntList,
                "dtype": OptInt = NONE,
                "layout": OptInt = NONE,
                "device": OptDevice = NONE,
                "pin_memory": OptBool = NONE
                => 1
            ],
            from_size,
        )?
        .invocations(size_invocations());
    }

    lib.register(
        "aten::empty.memory_format",
        signature![
            "size": IntList,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE,
            "memory_format": OptInt = NONE
            => 1
        ],
        from_size,
    )?
    .invocations(size_invocations());

    lib.register(
        "aten::full",
        signature![
            "size": IntList,
            "fill_value": Float,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE
            => 1
        ],
        from_size,
    )?
    .invocations([
        Invocation::new([ints(&[2, 3]), 1.5.into()]),
        Invocation::new([ints(&[]), 2.into()]),
        Invocation::error([ints(&[-1]), 0.into()]),
        Invocation::error([ints(&[2, 3])]),
    ]);

    lib.register(
        "aten::full_like",
        signature![
            "self": Tensor,
            "fill_value": Float,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE,
            "memory_format": OptInt = NONE
            => 1
        ],
        like,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 1.5.into()]),
        Invocation::new([bool_tensor(&[4]), 0.into()]),
    ]);

    for op in [
        "aten::zeros_like",
        "aten::ones_like",
        "aten::empty_like",
        "aten::rand_like",
    ] {
        lib.register(
            op,
            signature![
                "self": Tensor,
                "dtype": OptInt = NONE,
                "layout": OptInt = NONE,
                "device": OptDevice = NONE,
                "pin_memory": OptBool = NONE,
                "memory_format": OptInt = NONE
                => 1
            ],
            like,
        )?
        .invocations(like_invocations());
    }

    for op in ["aten::new_zeros", "aten::new_ones", "aten::new_empty"] {
        lib.register(
            op,
            signature![
                "self": Tensor,
                "size": IntList,
                "dtype": OptInt = NONE,
                "layout": OptInt = NONE,
                "device": OptDevice = NONE,
                "pin_memory": OptBool = NONE
                => 1
            ],
            from_size,
        )?
        .invocations([
            Invocation::new([tensor(&[5]), ints(&[2, 3])]),
            Invocation::new([long_tensor(&[2, 2]), ints(&[])]),
            Invocation::error([tensor(&[5]), ints(&[-3])]),
        ]);
    }

    lib.register(
        "aten::arange.start_step",
        signature![
            "start": Float,
            "end": Float,
            "step": Float,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE
            => 1
        ],
        arange_start_step,
    )?
    .invocations([
        Invocation::new([0.into(), 10.into(), 3.into()]),
        Invocation::new([1.into(), 2.5.into(), 0.5.into()]),
        Invocation::new([10.into(), 0.into(), (-2).into()]),
        Invocation::new([1.into(), 1.into(), 1.into()]),
        Invocation::error([0.into(), 10.into(), 0.into()]),
        Invocation::error([0.into(), 10.into(), (-1).into()]),
    ]);

    lib.register(
        "aten::arange.start",
        signature![
            "start": Float,
            "end": Float,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE
            => 1
        ],
        arange_start,
    )?
    .invocations([
        Invocation::new([2.into(), 5.into()]),
        Invocation::new([(-1.5).into(), 1.into()]),
        Invocation::error([5.into(), 2.into()]),
    ]);

    lib.register(
        "aten::arange",
        signature![
            "end": Float,
            "dtype": OptInt = NONE,
            "layout": OptInt = NONE,
            "device": OptDevice = NONE,
            "pin_memory": OptBool = NONE
            => 1
        ],
        arange,
    )?
    .invocations([
        Invocation::new([5.into()]),
        Invocation::new([0.into()]),
        Invocation::new([2.5.into()]).kwarg("dtype", 6),
        Invocation::error([(-1).into()]),
    ]);

    lib.register(
        "aten::tensor.float",
        signature![
            "t": Float,
            "dtype": OptInt = NONE,
            "device": OptDevice = NONE,
            "requires_grad": Bool = false
            => 1
        ],
        scalar,
    )?
    .invocations([Invocation::new([1.5.into()])]);

    lib.register(
        "aten::tensor.int",
        signature![
            "t": Int,
            "dtype": OptInt = NONE,
            "device": OptDevice = NONE,
            "requires_grad": Bool = false
            => 1
        ],
        scalar,
    )?
    .invocations([Invocation::new([3.into()])]);

    lib.register(
        "aten::tensor.bool",
        signature![
            "t": Bool,
            "dtype": OptInt = NONE,
            "device": OptDevice = NONE,
            "requires_grad": Bool = false
            => 1
        ],
        scalar,
    )?
    .invocations([Invocation::new([true.into()])]);

    lib.register(
        "aten::_shape_as_tensor",
        signature!["self": Tensor => 1],
        shape_as_tensor,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[])]),
        Invocation::new([tensor(&[0, 1, 2, 3])]),
    ]);

    lib.register("prim::NumToTensor.Scalar", signature!["a": Float => 1], scalar)?
        .invocations([
            Invocation::new([2.into()]),
            Invocation::new([0.5.into()]),
        ]);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::arange_len;

    #[test]
    fn test_arange_len() {
        assert_eq!(arange_len(0.0, 10.0, 3.0), Ok(4));
        assert_eq!(arange_len(1.0, 2.5, 0.5), Ok(3));
        assert_eq!(arange_len(10.0, 0.0, -2.0), Ok(5));
        assert_eq!(arange_len(1.0, 1.0, 1.0), Ok(0));
        assert!(arange_len(0.0, 1.0, 0.0).is_err());
        assert!(arange_len(0.0, 1.0, -1.0).is_err());
    }
}
