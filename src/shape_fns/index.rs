//! Indexing, slicing and padding.

use super::{many, Args, ShapeResult};
use crate::algorithms::{
    advanced_index, broadcast, embedding, gather, index_select, pad, pad_with_mode, select,
    slice, topk, unary, PadMode, ShapeError,
};
use crate::invocation::{ints, list, long_tensor, tensor, Arg, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, NONE};

fn select_op(args: &Args) -> ShapeResult {
    Ok(select(&args.tensor("self")?, args.int("dim")?, args.int("index")?)?.into())
}

fn slice_op(args: &Args) -> ShapeResult {
    Ok(slice(
        &args.tensor("self")?,
        args.int("dim")?,
        args.opt_int("start")?,
        args.opt_int("end")?,
        args.int("step")?,
    )?
    .into())
}

fn gather_op(args: &Args) -> ShapeResult {
    Ok(gather(&args.tensor("self")?, args.int("dim")?, &args.tensor("index")?)?.into())
}

fn index_select_op(args: &Args) -> ShapeResult {
    Ok(index_select(&args.tensor("self")?, args.int("dim")?, &args.tensor("index")?)?.into())
}

fn index(args: &Args) -> ShapeResult {
    Ok(advanced_index(&args.tensor("self")?, &args.opt_tensors("indices")?)?.into())
}

/// Check that `values` can be written to the elements of `shape` selected
/// by `indices`.
fn check_index_put(
    shape: &[usize],
    indices: &[Option<Vec<usize>>],
    values: &[usize],
) -> Result<(), ShapeError> {
    let indexed = advanced_index(shape, indices)?;
    if broadcast(values, &indexed).ok().as_deref() != Some(indexed.as_slice()) {
        return Err(ShapeError::IncompatibleShapes(
            "values must broadcast to the shape of the indexed elements",
        ));
    }
    Ok(())
}

fn index_put(args: &Args) -> ShapeResult {
    let shape = args.tensor("self")?;
    check_index_put(&shape, &args.opt_tensors("indices")?, &args.tensor("values")?)?;
    Ok(shape.into())
}

fn index_put_all(args: &Args) -> ShapeResult {
    let shape = args.tensor("self")?;
    let indices: Vec<_> = args.tensors("indices")?.into_iter().map(Some).collect();
    check_index_put(&shape, &indices, &args.tensor("values")?)?;
    Ok(shape.into())
}

fn embedding_op(args: &Args) -> ShapeResult {
    Ok(embedding(&args.tensor("weight")?, &args.tensor("indices")?)?.into())
}

fn topk_op(args: &Args) -> ShapeResult {
    let (values, indices) = topk(&args.tensor("self")?, args.int("k")?, args.int("dim")?)?;
    many([values, indices])
}

fn constant_pad(args: &Args) -> ShapeResult {
    Ok(pad(&args.tensor("self")?, &args.ints("pad")?)?.into())
}

fn pad_op(args: &Args) -> ShapeResult {
    let mode = PadMode::from_name(&args.str("mode")?)?;
    Ok(pad_with_mode(&args.tensor("self")?, &args.ints("pad")?, mode)?.into())
}

/// Shape of an in-place update which returns its input.
fn in_place(args: &Args) -> ShapeResult {
    Ok(unary(&args.tensor("self")?).into())
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    lib.register(
        "aten::select.int",
        signature!["self": Tensor, "dim": Int, "index": Int => 1],
        select_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 0.into(), 1.into()]),
        Invocation::new([tensor(&[2, 3]), (-1).into(), (-3).into()]),
        Invocation::new([tensor(&[4]), 0.into(), 3.into()]),
        Invocation::error([tensor(&[2, 3]), 1.into(), 3.into()]),
        Invocation::error([tensor(&[2, 3]), 2.into(), 0.into()]),
        Invocation::error([tensor(&[]), 0.into(), 0.into()]),
    ]);

    lib.register(
        "aten::slice.Tensor",
        signature![
            "self": Tensor,
            "dim": Int = 0,
            "start": OptInt = NONE,
            "end": OptInt = NONE,
            "step": Int = 1
            => 1
        ],
        slice_op,
    )?
    .invocations([
        Invocation::new([tensor(&[5, 3])]),
        Invocation::new([tensor(&[5, 3]), 0.into(), 1.into(), 4.into()]),
        Invocation::new([tensor(&[5, 3]), 1.into(), Arg::None, Arg::None, 2.into()]),
        Invocation::new([tensor(&[5, 3])]).kwarg("start", -2),
        Invocation::new([tensor(&[5, 3]), 0.into(), 10.into(), 20.into()]),
        Invocation::new([tensor(&[5, 3]), 0.into(), 3.into(), 1.into()]),
        Invocation::error([tensor(&[5, 3])]).kwarg("step", 0),
        Invocation::error([tensor(&[5, 3]), 2.into()]),
        Invocation::error([tensor(&[])]),
    ]);

    lib.register(
        "aten::gather",
        signature![
            "self": Tensor,
            "dim": Int,
            "index": Tensor,
            "sparse_grad": Bool = false
            => 1
        ],
        gather_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), 1.into(), long_tensor(&[2, 2])]),
        Invocation::new([tensor(&[2, 3]), 0.into(), long_tensor(&[2, 3])]),
        Invocation::new([tensor(&[2, 3]), (-1).into(), long_tensor(&[1, 5])]),
        Invocation::error([tensor(&[2, 3]), 1.into(), long_tensor(&[2])]),
        Invocation::error([tensor(&[2, 3]), 1.into(), long_tensor(&[3, 2])]),
        Invocation::error([tensor(&[2, 3]), 2.into(), long_tensor(&[2, 2])]),
    ]);

    lib.register(
        "aten::index_select",
        signature!["self": Tensor, "dim": Int, "index": Tensor => 1],
        index_select_op,
    )?
    .invocations([
        Invocation::new([tensor(&[3, 4]), 0.into(), long_tensor(&[2])]),
        Invocation::new([tensor(&[3, 4]), (-1).into(), long_tensor(&[5])]),
        Invocation::new([tensor(&[3, 4]), 1.into(), long_tensor(&[])]),
        Invocation::error([tensor(&[3, 4]), 0.into(), long_tensor(&[2, 2])]),
        Invocation::error([tensor(&[3, 4]), 2.into(), long_tensor(&[2])]),
    ]);

    // Index tensors are filled with ones, so indexed dimensions need at
    // least two entries.
    lib.register(
        "aten::index.Tensor",
        signature!["self": Tensor, "indices": OptTensorList => 1],
        index,
    )?
    .invocations([
        Invocation::new([tensor(&[3, 4]), list([long_tensor(&[2])])]),
        Invocation::new([tensor(&[3, 4]), list([Arg::None, long_tensor(&[5])])]),
        Invocation::new([
            tensor(&[3, 4, 5]),
            list([long_tensor(&[2]), long_tensor(&[2])]),
        ]),
        Invocation::new([
            tensor(&[3, 4, 5]),
            list([long_tensor(&[2]), Arg::None, long_tensor(&[2])]),
        ]),
        Invocation::new([tensor(&[3, 4]), list([long_tensor(&[2, 2])])]),
        Invocation::error([
            tensor(&[3, 4]),
            list([long_tensor(&[2]), long_tensor(&[3])]),
        ]),
        Invocation::error([tensor(&[3]), list([long_tensor(&[1]), long_tensor(&[1])])]),
    ]);

    lib.register(
        "aten::index_put",
        signature![
            "self": Tensor,
            "indices": OptTensorList,
            "values": Tensor,
            "accumulate": Bool = false
            => 1
        ],
        index_put,
    )?
    .invocations([
        Invocation::new([tensor(&[3, 4]), list([long_tensor(&[2])]), tensor(&[2, 4])]),
        Invocation::new([tensor(&[3, 4]), list([long_tensor(&[2])]), tensor(&[])]),
        Invocation::new([
            tensor(&[3, 4]),
            list([Arg::None, long_tensor(&[2])]),
            tensor(&[1]),
            true.into(),
        ]),
        Invocation::error([tensor(&[3, 4]), list([long_tensor(&[2])]), tensor(&[3, 4])]),
    ]);

    lib.register(
        "aten::index_put.hacked_twin",
        signature![
            "self": Tensor,
            "indices": TensorList,
            "values": Tensor,
            "accumulate": Bool = false
            => 1
        ],
        index_put_all,
    )?
    .invocations([
        Invocation::new([
            tensor(&[3, 4]),
            list([long_tensor(&[2]), long_tensor(&[2])]),
            tensor(&[2]),
        ]),
        Invocation::error([
            tensor(&[3, 4]),
            list([long_tensor(&[2]), long_tensor(&[2])]),
            tensor(&[3]),
        ]),
    ]);

    lib.register(
        "aten::embedding",
        signature![
            "weight": Tensor,
            "indices": Tensor,
            "padding_idx": Int = -1,
            "scale_grad_by_freq": Bool = false,
            "sparse": Bool = false
            => 1
        ],
        embedding_op,
    )?
    .invocations([
        Invocation::new([tensor(&[5, 3]), long_tensor(&[2, 4])]),
        Invocation::new([tensor(&[5, 3]), long_tensor(&[])]),
        Invocation::new([tensor(&[5, 3]), long_tensor(&[0])]),
        Invocation::error([tensor(&[5]), long_tensor(&[2])]),
    ]);

    lib.register(
        "aten::topk",
        signature![
            "self": Tensor,
            "k": Int,
            "dim": Int = -1,
            "largest": Bool = true,
            "sorted": Bool = true
            => 2
        ],
        topk_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 5]), 3.into()]),
        Invocation::new([tensor(&[2, 5]), 1.into(), 0.into()]),
        Invocation::new([tensor(&[2, 5]), 0.into()]).kwarg("largest", false),
        Invocation::error([tensor(&[2, 5]), 6.into()]),
        Invocation::error([tensor(&[2, 5]), 1.into(), 2.into()]),
    ]);

    lib.register(
        "aten::constant_pad_nd",
        signature!["self": Tensor, "pad": IntList, "value": Float = 0.0 => 1],
        constant_pad,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), ints(&[1, 1])]),
        Invocation::new([tensor(&[2, 3]), ints(&[1, 2, 0, 1])]),
        Invocation::new([tensor(&[2, 3]), ints(&[-1, 0]), 2.5.into()]),
        Invocation::error([tensor(&[2, 3]), ints(&[1])]),
        Invocation::error([tensor(&[2, 3]), ints(&[1, 1, 1, 1, 1, 1])]),
        Invocation::error([tensor(&[2, 3]), ints(&[-2, -2])]),
    ]);

    lib.register(
        "aten::pad",
        signature![
            "self": Tensor,
            "pad": IntList,
            "mode": Str = "constant",
            "value": OptFloat = NONE
            => 1
        ],
        pad_op,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3]), ints(&[1, 1])]),
        Invocation::new([tensor(&[2, 3]), ints(&[0, 1, 1, 0]), "constant".into(), 0.5.into()]),
        Invocation::new([tensor(&[2, 3]), ints(&[1, 1])]).kwarg("mode", "reflect"),
        Invocation::new([tensor(&[1, 2, 3]), ints(&[2, 2, 1, 1])]).kwarg("mode", "replicate"),
        Invocation::new([tensor(&[1, 2, 3]), ints(&[3, 3])]).kwarg("mode", "circular"),
        Invocation::error([tensor(&[2, 3]), ints(&[3, 0])]).kwarg("mode", "reflect"),
        Invocation::error([tensor(&[3]), ints(&[1, 1])]).kwarg("mode", "reflect"),
        Invocation::error([tensor(&[2, 3]), ints(&[1, 1])]).kwarg("mode", "wrap"),
        Invocation::error([tensor(&[2, 3]), ints(&[1, 1, 1])]),
    ]);

    // In-place operators whose schemas can't be expressed in the registry.
    lib.register("aten::zero", signature!["self": Tensor => 1], in_place)?
        .registry_exempt();
    lib.register(
        "aten::fill.Scalar",
        signature!["self": Tensor, "value": Float => 1],
        in_place,
    )?
    .registry_exempt();
    lib.register(
        "aten::copy",
        signature!["self": Tensor, "src": Tensor, "non_blocking": Bool = false => 1],
        in_place,
    )?
    .registry_exempt();
    lib.register(
        "aten::uniform",
        signature![
            "self": Tensor,
            "from": Float = 0.0,
            "to": Float = 1.0,
            "generator": Any = NONE
            => 1
        ],
        in_place,
    )?
    .registry_exempt();
    lib.register(
        "aten::bernoulli.float",
        signature!["self": Tensor, "p": Float = 0.5, "generator": Any = NONE => 1],
        in_place,
    )?
    .registry_exempt();
    lib.register(
        "aten::bernoulli.Tensor",
        signature!["self": Tensor, "p": Tensor, "generator": Any = NONE => 1],
        in_place,
    )?
    .registry_exempt();
    lib.register(
        "aten::_index_put_impl",
        signature![
            "self": Tensor,
            "indices": OptTensorList,
            "values": Tensor,
            "accumulate": Bool = false,
            "unsafe": Bool = false
            => 1
        ],
        index_put,
    )?
    .registry_exempt();

    Ok(())
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use crate::invocation::{ints, tensor, Invocation};
    use crate::library::ShapeLibrary;
    use crate::shape::Shape;

    #[test]
    fn test_pad() {
        #[derive(Debug)]
        struct Case {
            invocation: Invocation,
            expected: Option<Shape>,
        }

        let cases = [
            Case {
                invocation: Invocation::new([tensor(&[2, 3]), ints(&[1, 1])]),
                expected: Some(Shape::from([2, 5])),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3]), ints(&[1, 1])])
                    .kwarg("mode", "reflect"),
                expected: Some(Shape::from([2, 5])),
            },
            Case {
                invocation: Invocation::new([tensor(&[1, 2, 3]), ints(&[1, 0, 2, 2])])
                    .kwarg("mode", "replicate"),
                expected: Some(Shape::from([1, 6, 4])),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3]), ints(&[3, 0])])
                    .kwarg("mode", "reflect"),
                expected: None,
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3]), ints(&[1, 1])])
                    .kwarg("mode", "wrap"),
                expected: None,
            },
        ];

        let lib = ShapeLibrary::with_all_ops().unwrap();
        let func = lib.get(&"aten::pad".parse().unwrap()).unwrap();

        cases.test_each(|case| {
            let result = func.call(&case.invocation.to_shape_args().unwrap());
            let shape = result.ok().map(|r| r.into_vec().remove(0));
            assert_eq!(shape, case.expected);
        });
    }
}
