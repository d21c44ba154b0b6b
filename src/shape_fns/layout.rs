//! Operators which change the layout of a tensor without changing its
//! elements.

use super::{Args, ShapeResult};
use crate::algorithms::{
    cat, expand, flatten, permute, resolve_dim, sizes_to_shape, squeeze, squeeze_dim,
    transpose, transpose_2d, unsqueeze, view, ShapeError,
};
use crate::invocation::{ints, list, tensor, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, NONE};

fn permute_op(args: &Args) -> ShapeResult {
    Ok(permute(&args.tensor("self")?, &args.ints("dims")?)?.into())
}

fn transpose_op(args: &Args) -> ShapeResult {
    Ok(transpose(&args.tensor("self")?, args.int("dim0")?, args.int("dim1")?)?.into())
}

fn t(args: &Args) -> ShapeResult {
    Ok(transpose_2d(&args.tensor("self")?)?.into())
}

fn expand_op(args: &Args) -> ShapeResult {
    Ok(expand(&args.tensor("self")?, &args.ints("size")?)?.into())
}

fn expand_as(args: &Args) -> ShapeResult {
    let sizes: Vec<i64> = args
        .tensor("other")?
        .into_iter()
        .map(|size| size as i64)
        .collect();
    Ok(expand(&args.tensor("self")?, &sizes)?.into())
}

fn view_op(args: &Args) -> ShapeResult {
    Ok(view(&args.tensor("self")?, &args.ints("size")?)?.into())
}

fn reshape(args: &Args) -> ShapeResult {
    Ok(view(&args.tensor("self")?, &args.ints("shape")?)?.into())
}

fn resize(args: &Args) -> ShapeResult {
    Ok(sizes_to_shape(&args.ints("size")?)?.into())
}

fn flatten_op(args: &Args) -> ShapeResult {
    Ok(flatten(
        &args.tensor("self")?,
        args.int("start_dim")?,
        args.int("end_dim")?,
    )?
    .into())
}

fn unsqueeze_op(args: &Args) -> ShapeResult {
    Ok(unsqueeze(&args.tensor("self")?, args.int("dim")?)?.into())
}

fn squeeze_op(args: &Args) -> ShapeResult {
    Ok(squeeze(&args.tensor("self")?).into())
}

fn squeeze_dim_op(args: &Args) -> ShapeResult {
    Ok(squeeze_dim(&args.tensor("self")?, args.int("dim")?)?.into())
}

fn flip(args: &Args) -> ShapeResult {
    let shape = args.tensor("self")?;
    let mut seen = vec![false; shape.len().max(1)];
    for dim in args.ints("dims")? {
        let dim = resolve_dim(dim, shape.len())?;
        if std::mem::replace(&mut seen[dim], true) {
            return Err(ShapeError::InvalidValue("dim appears multiple times in the list of dims"));
        }
    }
    Ok(shape.into())
}

fn cat_op(args: &Args) -> ShapeResult {
    Ok(cat(&args.tensors("tensors")?, args.int("dim")?)?.into())
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    lib.register(
        "aten::permute",
        signature!["self": Tensor, "dims": IntList => 1],
        permute_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3, 4]), ints(&[2, 0, 1])]),
        Invocation::new([tensor(&[2, 3]), ints(&[-1, 0])]),
        Invocation::new([tensor(&[]), ints(&[])]),
        Invocation::error([tensor(&[2, 3]), ints(&[0])]),
        Invocation::error([tensor(&[2, 3]), ints(&[0, 0])]),
        Invocation::error([tensor(&[2, 3]), ints(&[0, 2])]),
    ]);

    lib.register(
        "aten::transpose.int",
        signature!["self": Tensor, "dim0": Int, "dim1": Int => 1],
        transpose_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3, 4]), 0.into(), 2.into()]),
        Invocation::new([tensor(&[2, 3]), (-1).into(), (-2).into()]),
        Invocation::new([tensor(&[]), 0.into(), (-1).into()]),
        Invocation::error([tensor(&[2, 3]), 0.into(), 2.into()]),
    ]);

    lib.register("aten::t", signature!["self": Tensor => 1], t)?
        .invocations([
            Invocation::new([tensor(&[2, 3])]),
            Invocation::new([tensor(&[4])]),
            Invocation::new([tensor(&[])]),
            Invocation::error([tensor(&[2, 3, 4])]),
        ]);

    lib.register(
        "aten::expand",
        signature!["self": Tensor, "size": IntList, "implicit": Bool = false => 1],
        expand_op,
    )?
    .invocations([
        Invocation::new([tensor(&[3, 1]), ints(&[3, 4])]),
        Invocation::new([tensor(&[3, 1]), ints(&[2, -1, 4])]),
        Invocation::new([tensor(&[]), ints(&[2, 2])]),
        Invocation::error([tensor(&[3, 2]), ints(&[3, 4])]),
        Invocation::error([tensor(&[3, 1]), ints(&[4])]),
        Invocation::error([tensor(&[3]), ints(&[-1, 3])]),
    ]);

    lib.register(
        "aten::expand_as",
        signature!["self": Tensor, "other": Tensor => 1],
        expand_as,
    )?
    .invocations([
        Invocation::new([tensor(&[3, 1]), tensor(&[2, 3, 4])]),
        Invocation::error([tensor(&[3, 2]), tensor(&[3, 4])]),
    ]);

    lib.register(
        "aten::broadcast_to",
        signature!["self": Tensor, "size": IntList => 1],
        expand_op,
    )?
    .invocations([
        Invocation::new([tensor(&[3]), ints(&[2, 3])]),
        Invocation::error([tensor(&[3]), ints(&[2, 4])]),
    ]);

    let view_invocations = [
        Invocation::new([tensor(&[2, 3, 4]), ints(&[6, 4])]),
        Invocation::new([tensor(&[2, 3, 4]), ints(&[-1, 2])]),
        Invocation::new([tensor(&[1]), ints(&[])]),
        Invocation::new([tensor(&[0, 3]), ints(&[3, 0])]),
        Invocation::error([tensor(&[2, 3]), ints(&[4, 2])]),
        Invocation::error([tensor(&[2, 3]), ints(&[-1, -1])]),
        Invocation::error([tensor(&[0, 3]), ints(&[-1, 0])]),
    ];
    for op in ["aten::view", "aten::_unsafe_view"] {
        lib.register(op, signature!["self": Tensor, "size": IntList => 1], view_op)?
            .invocations(view_invocations.iter().cloned());
    }

    lib.register(
        "aten::reshape",
        signature!["self": Tensor, "shape": IntList => 1],
        reshape,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3, 4]), ints(&[4, -1])]),
        Invocation::new([tensor(&[6]), ints(&[2, 3])]),
        Invocation::error([tensor(&[2, 3]), ints(&[5])]),
    ]);

    lib.register(
        "aten::_reshape_alias",
        signature!["self": Tensor, "size": IntList, "stride": IntList => 1],
        view_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), ints(&[3, 2]), ints(&[2, 1])]),
        Invocation::error([tensor(&[2, 3]), ints(&[4, 2]), ints(&[2, 1])]),
    ]);

    lib.register(
        "aten::resize_",
        signature!["self": Tensor, "size": IntList, "memory_format": OptInt = NONE => 1],
        resize,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), ints(&[4, 5])]),
        Invocation::new([tensor(&[2, 3]), ints(&[])]),
        Invocation::error([tensor(&[2, 3]), ints(&[-2])]),
    ]);

    lib.register(
        "aten::flatten.using_ints",
        signature!["self": Tensor, "start_dim": Int = 0, "end_dim": Int = -1 => 1],
        flatten_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3, 4])]),
        Invocation::new([tensor(&[2, 3, 4, 5]), 1.into(), 2.into()]),
        Invocation::new([tensor(&[2, 3, 4])]).kwarg("start_dim", -2),
        Invocation::new([tensor(&[])]),
        Invocation::error([tensor(&[2, 3, 4]), 2.into(), 1.into()]),
        Invocation::error([tensor(&[2, 3]), 0.into(), 2.into()]),
    ]);

    lib.register(
        "aten::unsqueeze",
        signature!["self": Tensor, "dim": Int => 1],
        unsqueeze_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 0.into()]),
        Invocation::new([tensor(&[2, 3]), 2.into()]),
        Invocation::new([tensor(&[2, 3]), (-1).into()]),
        Invocation::new([tensor(&[]), 0.into()]),
        Invocation::error([tensor(&[2, 3]), 3.into()]),
        Invocation::error([tensor(&[2, 3]), (-4).into()]),
    ]);

    lib.register("aten::squeeze", signature!["self": Tensor => 1], squeeze_op)?
        .invocations([
            Invocation::new([tensor(&[1, 3, 1, 2])]),
            Invocation::new([tensor(&[1])]),
            Invocation::new([tensor(&[2, 3])]),
        ]);

    lib.register(
        "aten::squeeze.dim",
        signature!["self": Tensor, "dim": Int => 1],
        squeeze_dim_op,
    )?
    .invocations([
        Invocation::new([tensor(&[1, 3, 1]), 0.into()]),
        Invocation::new([tensor(&[1, 3, 1]), 1.into()]),
        Invocation::new([tensor(&[1, 3, 1]), (-1).into()]),
        Invocation::new([tensor(&[]), 0.into()]),
        Invocation::error([tensor(&[1, 3, 1]), 3.into()]),
    ]);

    lib.register(
        "aten::flip",
        signature!["self": Tensor, "dims": IntList => 1],
        flip,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), ints(&[0])]),
        Invocation::new([tensor(&[2, 3, 4]), ints(&[-1, 0])]),
        Invocation::new([tensor(&[2, 3]), ints(&[])]),
        Invocation::error([tensor(&[2, 3]), ints(&[2])]),
        Invocation::error([tensor(&[2, 3]), ints(&[1, -1])]),
    ]);

    lib.register(
        "aten::cat",
        signature!["tensors": TensorList, "dim": Int = 0 => 1],
        cat_op,
    )?
    .invocations([
        Invocation::new([list([tensor(&[2, 3]), tensor(&[4, 3])])]),
        Invocation::new([list([tensor(&[2, 3]), tensor(&[2, 1])]), 1.into()]),
        Invocation::new([list([tensor(&[2, 3]), tensor(&[2, 3]), tensor(&[2, 3])])])
            .kwarg("dim", -1),
        // Legacy empty tensors are skipped.
        Invocation::new([list([tensor(&[0]), tensor(&[2, 3])])]),
        Invocation::new([list([tensor(&[0]), tensor(&[0])])]),
        Invocation::error([list([])]),
        Invocation::error([list([tensor(&[2, 3]), tensor(&[2, 4])])]),
        Invocation::error([list([tensor(&[2, 3]), tensor(&[3])])]),
        Invocation::error([list([tensor(&[]), tensor(&[])])]),
        Invocation::error([list([tensor(&[2, 3])]), 2.into()]),
    ]);

    Ok(())
}
