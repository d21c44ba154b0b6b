//! Matrix multiplication.

use super::{Args, ShapeResult};
use crate::algorithms::{addmm, bmm, linear, matmul, mm};
use crate::invocation::{tensor, Arg, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, NONE};

fn matmul_op(args: &Args) -> ShapeResult {
    Ok(matmul(&args.tensor("self")?, &args.tensor("other")?)?.into())
}

fn mm_op(args: &Args) -> ShapeResult {
    Ok(mm(&args.tensor("self")?, &args.tensor("mat2")?)?.into())
}

fn bmm_op(args: &Args) -> ShapeResult {
    Ok(bmm(&args.tensor("self")?, &args.tensor("mat2")?)?.into())
}

fn addmm_op(args: &Args) -> ShapeResult {
    Ok(addmm(
        &args.tensor("self")?,
        &args.tensor("mat1")?,
        &args.tensor("mat2")?,
    )?
    .into())
}

fn linear_op(args: &Args) -> ShapeResult {
    let bias = args.opt_tensor("bias")?;
    Ok(linear(
        &args.tensor("input")?,
        &args.tensor("weight")?,
        bias.as_deref(),
    )?
    .into())
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    lib.register(
        "aten::matmul",
        signature!["self": Tensor, "other": Tensor => 1],
        matmul_op,
    )?
    .invocations([
        // Vector-vector, matrix-vector, vector-matrix and matrix-matrix.
        Invocation::new([tensor(&[3]), tensor(&[3])]),
        Invocation::new([tensor(&[2, 3]), tensor(&[3])]),
        Invocation::new([tensor(&[3]), tensor(&[3, 4])]),
        Invocation::new([tensor(&[2, 3]), tensor(&[3, 4])]),
        // Batched, with broadcasting of batch dims.
        Invocation::new([tensor(&[5, 2, 3]), tensor(&[3, 4])]),
        Invocation::new([tensor(&[5, 1, 2, 3]), tensor(&[6, 3, 4])]),
        Invocation::new([tensor(&[5, 2, 3]), tensor(&[3])]),
        Invocation::new([tensor(&[3]), tensor(&[5, 3, 4])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4, 5])]),
        Invocation::error([tensor(&[2, 2, 3]), tensor(&[3, 3, 4])]),
        Invocation::error([tensor(&[]), tensor(&[3])]),
    ]);

    lib.register(
        "aten::mm",
        signature!["self": Tensor, "mat2": Tensor => 1],
        mm_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), tensor(&[3, 4])]),
        Invocation::new([tensor(&[0, 3]), tensor(&[3, 4])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4, 5])]),
        Invocation::error([tensor(&[3]), tensor(&[3, 4])]),
    ]);

    lib.register(
        "aten::bmm",
        signature!["self": Tensor, "mat2": Tensor => 1],
        bmm_op,
    )?
    .invocations([
        Invocation::new([tensor(&[5, 2, 3]), tensor(&[5, 3, 4])]),
        Invocation::new([tensor(&[0, 2, 3]), tensor(&[0, 3, 4])]),
        Invocation::error([tensor(&[5, 2, 3]), tensor(&[4, 3, 4])]),
        Invocation::error([tensor(&[5, 2, 3]), tensor(&[5, 4, 4])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[3, 4])]),
        Invocation::error([tensor(&[7, 3]), tensor(&[2, 4, 5])]),
        Invocation::error([tensor(&[2, 3, 4]), tensor(&[2, 4])]),
    ]);

    lib.register(
        "aten::addmm",
        signature![
            "self": Tensor,
            "mat1": Tensor,
            "mat2": Tensor,
            "beta": Float = 1.0,
            "alpha": Float = 1.0
            => 1
        ],
        addmm_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 4]), tensor(&[2, 3]), tensor(&[3, 4])]),
        Invocation::new([tensor(&[4]), tensor(&[2, 3]), tensor(&[3, 4])]).kwarg("beta", 0.5),
        Invocation::new([tensor(&[]), tensor(&[2, 3]), tensor(&[3, 4])]),
        Invocation::error([tensor(&[3, 4]), tensor(&[2, 3]), tensor(&[3, 4])]),
        Invocation::error([tensor(&[2, 4]), tensor(&[2, 3]), tensor(&[2, 4])]),
    ]);

    lib.register(
        "aten::linear",
        signature!["input": Tensor, "weight": Tensor, "bias": OptTensor = NONE => 1],
        linear_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), tensor(&[4, 3])]),
        Invocation::new([tensor(&[2, 3]), tensor(&[4, 3]), tensor(&[4])]),
        Invocation::new([tensor(&[5, 2, 3]), tensor(&[4, 3]), Arg::None]),
        Invocation::new([tensor(&[3]), tensor(&[4, 3])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4, 5])]),
        Invocation::error([tensor(&[2, 3]), tensor(&[4, 3]), tensor(&[5])]),
    ]);

    Ok(())
}
