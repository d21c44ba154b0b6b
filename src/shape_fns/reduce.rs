//! Reductions.

use super::{many, Args, ShapeResult};
use crate::algorithms::{
    data_dependent_vector, numel, reduce_dim, reduce_dims, resolve_dim, ShapeError,
};
use crate::invocation::{ints, long_tensor, tensor, Arg, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, NONE};

/// Reductions over all elements which are defined for empty inputs.
const FULL_REDUCE_OPS: &[&str] = &["aten::any", "aten::all"];

fn full_reduce(_args: &Args) -> ShapeResult {
    Ok(Vec::new().into())
}

/// Full reduction for an operation without an identity, which fails for
/// empty inputs.
fn full_reduce_no_identity(args: &Args) -> ShapeResult {
    if numel(&args.tensor("self")?) == 0 {
        return Err(ShapeError::InvalidValue(
            "expected reduction dim to be specified for input with no elements",
        ));
    }
    Ok(Vec::new().into())
}

/// Check that reducing `dim` of `shape` doesn't require an identity value.
fn check_nonempty_dim(shape: &[usize], dim: i64) -> Result<(), ShapeError> {
    let dim = resolve_dim(dim, shape.len())?;
    if shape.get(dim) == Some(&0) {
        return Err(ShapeError::InvalidValue(
            "cannot reduce over a zero-size dimension without an identity",
        ));
    }
    Ok(())
}

fn argmax(args: &Args) -> ShapeResult {
    let shape = args.tensor("self")?;
    let keepdim = args.bool("keepdim")?;
    match args.opt_int("dim")? {
        Some(dim) => {
            check_nonempty_dim(&shape, dim)?;
            Ok(reduce_dim(&shape, dim, keepdim)?.into())
        }
        None => {
            full_reduce_no_identity(args)?;
            let output = if keepdim {
                vec![1; shape.len()]
            } else {
                Vec::new()
            };
            Ok(output.into())
        }
    }
}

fn reduce_one_dim(args: &Args) -> ShapeResult {
    Ok(reduce_dim(&args.tensor("self")?, args.int("dim")?, args.bool("keepdim")?)?.into())
}

fn max_dim(args: &Args) -> ShapeResult {
    let shape = args.tensor("self")?;
    let dim = args.int("dim")?;
    check_nonempty_dim(&shape, dim)?;
    let output = reduce_dim(&shape, dim, args.bool("keepdim")?)?;
    many([output.clone(), output])
}

fn reduce_dim_list(args: &Args) -> ShapeResult {
    let dims = args.opt_ints("dim")?.unwrap_or_default();
    Ok(reduce_dims(&args.tensor("self")?, &dims, args.bool("keepdim")?)?.into())
}

fn bincount(args: &Args) -> ShapeResult {
    let input = args.tensor("self")?;
    if input.len() != 1 {
        return Err(ShapeError::IncorrectRank("bincount only supports 1-d tensors"));
    }
    if args.int("minlength")? < 0 {
        return Err(ShapeError::InvalidValue("minlength should be >= 0"));
    }
    if let Some(weights) = args.opt_tensor("weights")? {
        if weights != input {
            return Err(ShapeError::IncompatibleShapes(
                "weights should be 1-d and have the same length as input",
            ));
        }
    }
    Ok(data_dependent_vector().into())
}

fn reduce_dims_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[2, 3, 4]), ints(&[1])]),
        Invocation::new([tensor(&[2, 3, 4]), ints(&[0, -1]), true.into()]),
        Invocation::new([tensor(&[2, 3]), ints(&[])]),
        Invocation::new([tensor(&[0, 3]), ints(&[0])]),
        Invocation::error([tensor(&[2, 3]), ints(&[2])]),
        Invocation::error([tensor(&[2, 3]), ints(&[1, -1])]),
    ]
    .into_iter()
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    for &op in FULL_REDUCE_OPS {
        lib.register(op, signature!["self": Tensor => 1], full_reduce)?
            .invocations([
                Invocation::new([tensor(&[2, 3])]),
                Invocation::new([tensor(&[])]),
                Invocation::new([tensor(&[0, 3])]),
            ]);
    }

    lib.register("aten::max", signature!["self": Tensor => 1], full_reduce_no_identity)?
        .invocations([
            Invocation::new([tensor(&[2, 3])]),
            Invocation::new([tensor(&[])]),
            Invocation::error([tensor(&[0, 3])]),
        ]);

    for op in ["aten::sum", "aten::mean"] {
        lib.register(
            op,
            signature!["self": Tensor, "dtype": OptInt = NONE => 1],
            full_reduce,
        )?
        .invocations([
            Invocation::new([tensor(&[2, 3])]),
            Invocation::new([tensor(&[5])]).kwarg("dtype", 6),
        ]);
    }

    for op in ["aten::var", "aten::std"] {
        lib.register(
            op,
            signature!["self": Tensor, "unbiased": Bool = true => 1],
            full_reduce,
        )?
        .invocations([
            Invocation::new([tensor(&[2, 3])]),
            Invocation::new([tensor(&[4]), false.into()]),
        ]);
    }

    lib.register(
        "aten::argmax",
        signature!["self": Tensor, "dim": OptInt = NONE, "keepdim": Bool = false => 1],
        argmax,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 3])]).kwarg("dim", 0),
        Invocation::new([tensor(&[2, 3]), 1.into(), true.into()]),
        Invocation::new([tensor(&[2, 3])]).kwarg("keepdim", true),
        Invocation::new([tensor(&[0, 3]), (-1).into()]),
        Invocation::error([tensor(&[2, 3])]).kwarg("dim", 2),
        Invocation::error([tensor(&[0, 3])]),
        Invocation::error([tensor(&[0, 3]), 0.into()]),
    ]);

    lib.register(
        "aten::any.dim",
        signature!["self": Tensor, "dim": Int, "keepdim": Bool = false => 1],
        reduce_one_dim,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 1.into()]),
        Invocation::new([tensor(&[2, 3]), (-2).into(), true.into()]),
        Invocation::new([tensor(&[0, 3]), 0.into()]),
        Invocation::new([tensor(&[]), 0.into()]),
        Invocation::error([tensor(&[2, 3]), 2.into()]),
    ]);

    lib.register(
        "aten::max.dim",
        signature!["self": Tensor, "dim": Int, "keepdim": Bool = false => 2],
        max_dim,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 1.into()]),
        Invocation::new([tensor(&[2, 3, 4]), 0.into(), true.into()]),
        Invocation::error([tensor(&[0, 3]), 0.into()]),
        Invocation::error([tensor(&[2, 3]), 3.into()]),
    ]);

    for op in ["aten::mean.dim", "aten::sum.dim_IntList"] {
        lib.register(
            op,
            signature![
                "self": Tensor,
                "dim": IntList,
                "keepdim": Bool = false,
                "dtype": OptInt = NONE
                => 1
            ],
            reduce_dim_list,
        )?
        .invocations(reduce_dims_invocations());
    }

    lib.register(
        "aten::linalg_vector_norm",
        signature![
            "self": Tensor,
            "ord": Float = 2.0,
            "dim": OptIntList = NONE,
            "keepdim": Bool = false,
            "dtype": OptInt = NONE
            => 1
        ],
        reduce_dim_list,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 3]), 1.into(), ints(&[1])]),
        Invocation::new([tensor(&[2, 3, 4]), 2.into(), ints(&[0, 2]), true.into()]),
        Invocation::new([tensor(&[2, 3]), 2.into(), Arg::None, true.into()]),
        Invocation::error([tensor(&[2, 3])]).kwarg("dim", ints(&[3])),
    ]);

    // The number of bins depends on the largest value in the input, so only
    // failing invocations can be checked.
    lib.register(
        "aten::bincount",
        signature!["self": Tensor, "weights": OptTensor = NONE, "minlength": Int = 0 => 1],
        bincount,
    )?
    .invocations([
        Invocation::error([long_tensor(&[2, 3])]),
        Invocation::error([long_tensor(&[4])]).kwarg("minlength", -1),
        Invocation::error([long_tensor(&[4]), tensor(&[3])]),
    ]);

    Ok(())
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use crate::invocation::{long_tensor, tensor, Invocation};
    use crate::library::ShapeLibrary;
    use crate::shape::Shape;

    #[test]
    fn test_argmax() {
        #[derive(Debug)]
        struct Case {
            invocation: Invocation,
            expected: Option<Shape>,
        }

        let cases = [
            Case {
                invocation: Invocation::new([tensor(&[2, 3])]),
                expected: Some(Shape::scalar()),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3])]).kwarg("keepdim", true),
                expected: Some(Shape::from([1, 1])),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3])]).kwarg("dim", -1),
                expected: Some(Shape::from([2])),
            },
            Case {
                invocation: Invocation::new([tensor(&[0, 3])]).kwarg("dim", 1),
                expected: Some(Shape::from([0])),
            },
            Case {
                invocation: Invocation::new([tensor(&[0, 3])]),
                expected: None,
            },
        ];

        let lib = ShapeLibrary::with_all_ops().unwrap();
        let func = lib.get(&"aten::argmax".parse().unwrap()).unwrap();

        cases.test_each(|case| {
            let result = func.call(&case.invocation.to_shape_args().unwrap());
            let shape = result.ok().map(|r| r.into_vec().remove(0));
            assert_eq!(shape, case.expected);
        });
    }

    #[test]
    fn test_bincount_is_data_dependent() {
        let lib = ShapeLibrary::with_all_ops().unwrap();
        let func = lib.get(&"aten::bincount".parse().unwrap()).unwrap();
        let args = Invocation::new([long_tensor(&[5])]).to_shape_args().unwrap();
        let output = func.call(&args).unwrap().into_vec();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].ndim(), 1);
        assert!(output[0].dims()[0].is_unknown());
    }
}
