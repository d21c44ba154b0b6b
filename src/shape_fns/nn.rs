//! Neural network layers: convolution, pooling, normalization, softmax and
//! losses.

use super::{many, Args, ShapeResult};
use crate::algorithms::{
    adaptive_pool2d, conv_output_size, conv_transpose_output_size, numel, pool2d, resolve_dim,
    unary, ShapeError,
};
use crate::invocation::{ints, long_tensor, tensor, Arg, Invocation};
use crate::library::{LibraryError, ShapeLibrary};
use crate::signature::{signature, Signature, EMPTY, NONE};

fn conv2d(args: &Args) -> ShapeResult {
    let input = args.tensor("input")?;
    let weight = args.tensor("weight")?;
    if weight.len() != 4 {
        return Err(ShapeError::IncorrectRank("conv2d weight must be 4D"));
    }

    // Unbatched inputs are processed as a batch of one.
    let unbatched = input.len() == 3;
    let mut batched_input = input;
    if unbatched {
        batched_input.insert(0, 1);
    }

    let bias = args.opt_tensor("bias")?;
    let mut output = conv_output_size(
        &batched_input,
        &weight,
        bias.as_deref(),
        &args.ints("stride")?,
        &args.ints("padding")?,
        &args.ints("dilation")?,
        args.int("groups")?,
    )?;
    if unbatched {
        output.remove(0);
    }
    Ok(output.into())
}

fn convolution(args: &Args) -> ShapeResult {
    let input = args.tensor("input")?;
    let weight = args.tensor("weight")?;
    let bias = args.opt_tensor("bias")?;
    let stride = args.ints("stride")?;
    let padding = args.ints("padding")?;
    let dilation = args.ints("dilation")?;
    let groups = args.int("groups")?;

    let output = if args.bool("transposed")? {
        conv_transpose_output_size(
            &input,
            &weight,
            bias.as_deref(),
            &stride,
            &padding,
            &dilation,
            &args.ints("output_padding")?,
            groups,
        )?
    } else {
        conv_output_size(
            &input,
            &weight,
            bias.as_deref(),
            &stride,
            &padding,
            &dilation,
            groups,
        )?
    };
    Ok(output.into())
}

fn max_pool2d_output(args: &Args) -> Result<Vec<usize>, ShapeError> {
    pool2d(
        &args.tensor("self")?,
        &args.ints("kernel_size")?,
        &args.ints("stride")?,
        &args.ints("padding")?,
        &args.ints("dilation")?,
        args.bool("ceil_mode")?,
    )
}

fn max_pool2d(args: &Args) -> ShapeResult {
    Ok(max_pool2d_output(args)?.into())
}

fn max_pool2d_with_indices(args: &Args) -> ShapeResult {
    let output = max_pool2d_output(args)?;
    many([output.clone(), output])
}

fn max_pool2d_with_indices_backward(args: &Args) -> ShapeResult {
    let output = max_pool2d_output(args)?;
    let grad_output = args.tensor("grad_output")?;
    let indices = args.tensor("indices")?;
    if grad_output != output || indices != output {
        return Err(ShapeError::IncompatibleShapes(
            "gradient and indices must have the shape of the pooling output",
        ));
    }
    Ok(args.tensor("self")?.into())
}

fn avg_pool2d(args: &Args) -> ShapeResult {
    if args.opt_int("divisor_override")? == Some(0) {
        return Err(ShapeError::InvalidValue("divisor must be not zero"));
    }
    Ok(pool2d(
        &args.tensor("self")?,
        &args.ints("kernel_size")?,
        &args.ints("stride")?,
        &args.ints("padding")?,
        &[1],
        args.bool("ceil_mode")?,
    )?
    .into())
}

fn adaptive_avg_pool2d(args: &Args) -> ShapeResult {
    Ok(adaptive_pool2d(&args.tensor("self")?, &args.ints("output_size")?)?.into())
}

fn softmax(args: &Args) -> ShapeResult {
    let shape = args.tensor("self")?;
    resolve_dim(args.int("dim")?, shape.len())?;
    Ok(shape.into())
}

/// Shape of `_softmax` and `_log_softmax`, whose inputs here are always
/// float32.
fn softmax_half_to_float(args: &Args) -> ShapeResult {
    if args.bool("half_to_float")? {
        return Err(ShapeError::InvalidValue(
            "conversion is supported for half type only",
        ));
    }
    softmax(args)
}

fn softmax_backward(args: &Args) -> ShapeResult {
    let grad_output = args.tensor("grad_output")?;
    if grad_output != args.tensor("output")? {
        return Err(ShapeError::IncompatibleShapes(
            "gradient and output must have the same shape",
        ));
    }
    resolve_dim(args.int("dim")?, grad_output.len())?;
    Ok(grad_output.into())
}

/// Check the inputs of a layer normalization and return the index of the
/// first normalized dimension.
fn check_layer_norm(args: &Args) -> Result<usize, ShapeError> {
    let input = args.tensor("input")?;
    let normalized_shape = args.ints("normalized_shape")?;
    if normalized_shape.is_empty() {
        return Err(ShapeError::InvalidValue(
            "expected normalized_shape to be at least 1-dimensional",
        ));
    }
    for param in ["weight", "bias"] {
        if let Some(shape) = args.opt_tensor(param)? {
            let sizes: Vec<i64> = shape.iter().map(|&size| size as i64).collect();
            if sizes != normalized_shape {
                return Err(ShapeError::IncompatibleShapes(
                    "weight and bias must have the normalized shape",
                ));
            }
        }
    }

    let Some(axis) = input.len().checked_sub(normalized_shape.len()) else {
        return Err(ShapeError::IncompatibleShapes(
            "input has fewer dims than normalized_shape",
        ));
    };
    let trailing_match = input[axis..]
        .iter()
        .zip(&normalized_shape)
        .all(|(&size, &norm_size)| size as i64 == norm_size);
    if !trailing_match {
        return Err(ShapeError::IncompatibleShapes(
            "trailing input dims must match normalized_shape",
        ));
    }
    Ok(axis)
}

fn layer_norm(args: &Args) -> ShapeResult {
    check_layer_norm(args)?;
    Ok(unary(&args.tensor("input")?).into())
}

fn native_layer_norm(args: &Args) -> ShapeResult {
    let axis = check_layer_norm(args)?;
    let input = args.tensor("input")?;
    let mut stats = input[..axis].to_vec();
    stats.resize(input.len(), 1);
    many([input, stats.clone(), stats])
}

/// Check the inputs of a batch normalization and return the number of
/// channels.
fn check_batch_norm(args: &Args) -> Result<usize, ShapeError> {
    let input = args.tensor("input")?;
    if input.len() < 2 {
        return Err(ShapeError::IncorrectRank(
            "batch norm input must have at least 2 dims",
        ));
    }
    let channels = input[1];
    for param in ["weight", "bias", "running_mean", "running_var"] {
        if let Some(shape) = args.opt_tensor(param)? {
            if numel(&shape) != channels {
                return Err(ShapeError::IncompatibleShapes(
                    "batch norm parameters must have one element per channel",
                ));
            }
        }
    }
    let has_stats =
        args.opt_tensor("running_mean")?.is_some() && args.opt_tensor("running_var")?.is_some();
    if !args.bool("training")? && !has_stats {
        return Err(ShapeError::InvalidValue(
            "running_mean and running_var must be defined in evaluation mode",
        ));
    }
    Ok(channels)
}

fn batch_norm(args: &Args) -> ShapeResult {
    check_batch_norm(args)?;
    Ok(unary(&args.tensor("input")?).into())
}

fn native_batch_norm(args: &Args) -> ShapeResult {
    let channels = check_batch_norm(args)?;
    let stats = if args.bool("training")? { channels } else { 0 };
    many([args.tensor("input")?, vec![stats], vec![stats]])
}

/// Check the inputs of a negative log likelihood loss and return the shape
/// of the unreduced loss.
fn check_nll_loss(args: &Args) -> Result<Vec<usize>, ShapeError> {
    let input = args.tensor("self")?;
    let target = args.tensor("target")?;
    if input.is_empty() || input.len() > 2 {
        return Err(ShapeError::IncorrectRank("input tensor should be 1D or 2D"));
    }
    if target.len() > 1 {
        return Err(ShapeError::IncorrectRank(
            "0D or 1D target tensor expected, multi-target not supported",
        ));
    }
    let no_batch_dim = input.len() == 1 && target.is_empty();
    if !no_batch_dim && target.first() != Some(&input[0]) {
        return Err(ShapeError::IncompatibleShapes(
            "input and target batch sizes must match",
        ));
    }
    let n_classes = input[input.len() - 1];
    if let Some(weight) = args.opt_tensor("weight")? {
        if weight.len() > 1 || numel(&weight) != n_classes {
            return Err(ShapeError::IncompatibleShapes(
                "weight tensor should be defined either for all classes or no classes",
            ));
        }
    }
    match args.int("reduction")? {
        0 if input.len() == 2 => Ok(vec![input[0]]),
        0..=2 => Ok(Vec::new()),
        _ => Err(ShapeError::InvalidValue("invalid reduction")),
    }
}

fn nll_loss_forward(args: &Args) -> ShapeResult {
    let output = check_nll_loss(args)?;
    many([output, Vec::new()])
}

fn nll_loss_backward(args: &Args) -> ShapeResult {
    let output = check_nll_loss(args)?;
    let grad_output = args.tensor("grad_output")?;
    let grad_ok = if output.is_empty() {
        numel(&grad_output) == 1
    } else {
        grad_output == output
    };
    if !grad_ok {
        return Err(ShapeError::IncompatibleShapes(
            "grad_output must have the shape of the loss",
        ));
    }
    if numel(&args.tensor("total_weight")?) != 1 {
        return Err(ShapeError::IncompatibleShapes(
            "expected a single element total_weight tensor",
        ));
    }
    Ok(args.tensor("self")?.into())
}

fn max_pool_signature(num_returns: usize) -> Signature {
    let sig = signature![
        "self": Tensor,
        "kernel_size": IntList,
        "stride": IntList = EMPTY,
        "padding": IntList = [0, 0],
        "dilation": IntList = [1, 1],
        "ceil_mode": Bool = false
        => 1
    ];
    Signature::new(sig.params().to_vec(), num_returns)
}

fn max_pool_invocations() -> impl Iterator<Item = Invocation> {
    [
        Invocation::new([tensor(&[1, 3, 8, 8]), ints(&[2, 2])]),
        Invocation::new([
            tensor(&[3, 8, 8]),
            ints(&[3, 3]),
            ints(&[2, 2]),
            ints(&[1, 1]),
        ]),
        Invocation::new([
            tensor(&[1, 1, 5, 5]),
            ints(&[2, 2]),
            ints(&[2, 2]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            true.into(),
        ]),
        Invocation::new([tensor(&[1, 1, 9, 9]), ints(&[3, 3])]).kwarg("dilation", ints(&[2, 2])),
        Invocation::error([
            tensor(&[1, 1, 8, 8]),
            ints(&[2, 2]),
            ints(&[2, 2]),
            ints(&[2, 2]),
        ]),
        Invocation::error([tensor(&[1, 1, 2, 2]), ints(&[3, 3])]),
        Invocation::error([tensor(&[8, 8]), ints(&[2, 2])]),
        Invocation::error([tensor(&[1, 0, 8, 8]), ints(&[2, 2])]),
    ]
    .into_iter()
}

pub(crate) fn register(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    lib.register(
        "aten::conv2d",
        signature![
            "input": Tensor,
            "weight": Tensor,
            "bias": OptTensor = NONE,
            "stride": IntList = [1, 1],
            "padding": IntList = [0, 0],
            "dilation": IntList = [1, 1],
            "groups": Int = 1
            => 1
        ],
        conv2d,
    )?
    .invocations([
        Invocation::new([tensor(&[1, 3, 8, 8]), tensor(&[4, 3, 3, 3])]),
        Invocation::new([
            tensor(&[1, 3, 8, 8]),
            tensor(&[4, 3, 3, 3]),
            tensor(&[4]),
            ints(&[2, 2]),
            ints(&[1, 1]),
        ]),
        Invocation::new([
            tensor(&[2, 4, 5, 5]),
            tensor(&[6, 2, 3, 3]),
            Arg::None,
            ints(&[1, 1]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            2.into(),
        ]),
        Invocation::new([tensor(&[3, 8, 8]), tensor(&[4, 3, 3, 3])]),
        Invocation::new([tensor(&[1, 1, 7, 7]), tensor(&[1, 1, 3, 3])])
            .kwarg("dilation", ints(&[2, 2])),
        Invocation::error([tensor(&[1, 2, 8, 8]), tensor(&[4, 3, 3, 3])]),
        Invocation::error([tensor(&[1, 3, 2, 2]), tensor(&[4, 3, 3, 3])]),
        Invocation::error([tensor(&[1, 3, 8, 8]), tensor(&[4, 3, 3, 3]), tensor(&[5])]),
        Invocation::error([tensor(&[1, 3, 8, 8]), tensor(&[4, 3, 3])]),
    ]);

    lib.register(
        "aten::convolution",
        signature![
            "input": Tensor,
            "weight": Tensor,
            "bias": OptTensor,
            "stride": IntList,
            "padding": IntList,
            "dilation": IntList,
            "transposed": Bool,
            "output_padding": IntList,
            "groups": Int
            => 1
        ],
        convolution,
    )?
    .invocations([
        Invocation::new([
            tensor(&[1, 3, 8, 8]),
            tensor(&[4, 3, 3, 3]),
            Arg::None,
            ints(&[1, 1]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            false.into(),
            ints(&[0, 0]),
            1.into(),
        ]),
        Invocation::new([
            tensor(&[2, 3, 10]),
            tensor(&[4, 3, 3]),
            tensor(&[4]),
            ints(&[1]),
            ints(&[0]),
            ints(&[1]),
            false.into(),
            ints(&[0]),
            1.into(),
        ]),
        Invocation::new([
            tensor(&[1, 4, 5, 5]),
            tensor(&[4, 2, 3, 3]),
            Arg::None,
            ints(&[2, 2]),
            ints(&[1, 1]),
            ints(&[1, 1]),
            true.into(),
            ints(&[1, 1]),
            1.into(),
        ]),
        Invocation::error([
            tensor(&[1, 4, 5, 5]),
            tensor(&[4, 2, 3, 3]),
            Arg::None,
            ints(&[1, 1]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            true.into(),
            ints(&[1, 1]),
            1.into(),
        ]),
        Invocation::error([
            tensor(&[1, 3, 8, 8]),
            tensor(&[4, 3, 3, 3]),
            Arg::None,
            ints(&[0, 0]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            false.into(),
            ints(&[0, 0]),
            1.into(),
        ]),
    ]);

    lib.register("aten::max_pool2d", max_pool_signature(1), max_pool2d)?
        .invocations(max_pool_invocations());
    lib.register(
        "aten::max_pool2d_with_indices",
        max_pool_signature(2),
        max_pool2d_with_indices,
    )?
    .invocations(max_pool_invocations());

    lib.register(
        "aten::max_pool2d_with_indices_backward",
        signature![
            "grad_output": Tensor,
            "self": Tensor,
            "kernel_size": IntList,
            "stride": IntList,
            "padding": IntList,
            "dilation": IntList,
            "ceil_mode": Bool,
            "indices": Tensor
            => 1
        ],
        max_pool2d_with_indices_backward,
    )?
    .invocations([
        Invocation::new([
            tensor(&[1, 3, 4, 4]),
            tensor(&[1, 3, 8, 8]),
            ints(&[2, 2]),
            ints(&[2, 2]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            false.into(),
            long_tensor(&[1, 3, 4, 4]),
        ]),
        Invocation::error([
            tensor(&[1, 3, 3, 3]),
            tensor(&[1, 3, 8, 8]),
            ints(&[2, 2]),
            ints(&[2, 2]),
            ints(&[0, 0]),
            ints(&[1, 1]),
            false.into(),
            long_tensor(&[1, 3, 3, 3]),
        ]),
    ]);

    lib.register(
        "aten::avg_pool2d",
        signature![
            "self": Tensor,
            "kernel_size": IntList,
            "stride": IntList = EMPTY,
            "padding": IntList = [0, 0],
            "ceil_mode": Bool = false,
            "count_include_pad": Bool = true,
            "divisor_override": OptInt = NONE
            => 1
        ],
        avg_pool2d,
    )?
    .invocations([
        Invocation::new([tensor(&[1, 3, 8, 8]), ints(&[2, 2])]),
        Invocation::new([
            tensor(&[3, 7, 7]),
            ints(&[3, 3]),
            ints(&[2, 2]),
            ints(&[1, 1]),
            true.into(),
        ]),
        Invocation::new([tensor(&[1, 1, 6, 6]), ints(&[3, 3])])
            .kwarg("count_include_pad", false)
            .kwarg("divisor_override", 2),
        Invocation::error([tensor(&[1, 1, 6, 6]), ints(&[3, 3])]).kwarg("divisor_override", 0),
        Invocation::error([
            tensor(&[1, 1, 8, 8]),
            ints(&[2, 2]),
            ints(&[2, 2]),
            ints(&[2, 2]),
        ]),
    ]);

    lib.register(
        "aten::adaptive_avg_pool2d",
        signature!["self": Tensor, "output_size": IntList => 1],
        adaptive_avg_pool2d,
    )?
    .invocations([
        Invocation::new([tensor(&[1, 3, 8, 8]), ints(&[2, 2])]),
        Invocation::new([tensor(&[3, 5, 7]), ints(&[3, 2])]),
        Invocation::new([tensor(&[1, 3, 4, 4]), ints(&[6, 6])]),
        Invocation::error([tensor(&[1, 3, 8, 8]), ints(&[2])]),
        Invocation::error([tensor(&[8, 8]), ints(&[2, 2])]),
        Invocation::error([tensor(&[1, 3, 0, 8]), ints(&[2, 2])]),
    ]);

    for op in ["aten::_softmax", "aten::_log_softmax"] {
        lib.register(
            op,
            signature!["self": Tensor, "dim": Int, "half_to_float": Bool => 1],
            softmax_half_to_float,
        )?
        .invocations([
            Invocation::new([tensor(&[2, 3]), 1.into(), false.into()]),
            Invocation::new([tensor(&[]), 0.into(), false.into()]),
            Invocation::error([tensor(&[2, 3]), 1.into(), true.into()]),
            Invocation::error([tensor(&[2, 3]), 2.into(), false.into()]),
        ]);
    }

    for op in ["aten::softmax.int", "aten::log_softmax.int"] {
        lib.register(
            op,
            signature!["self": Tensor, "dim": Int, "dtype": OptInt = NONE => 1],
            softmax,
        )?
        .invocations([
            Invocation::new([tensor(&[2, 3]), 1.into()]),
            Invocation::new([tensor(&[2, 3, 4]), (-2).into()]).kwarg("dtype", 6),
            Invocation::new([tensor(&[0, 3]), 0.into()]),
            Invocation::error([tensor(&[2, 3]), 2.into()]),
        ]);
    }

    for op in [
        "aten::_softmax_backward_data",
        "aten::_log_softmax_backward_data",
    ] {
        lib.register(
            op,
            signature![
                "grad_output": Tensor,
                "output": Tensor,
                "dim": Int,
                "input_dtype": Int
                => 1
            ],
            softmax_backward,
        )?
        .invocations([
            Invocation::new([tensor(&[2, 3]), tensor(&[2, 3]), 1.into(), 6.into()]),
            Invocation::error([tensor(&[2, 3]), tensor(&[3]), 0.into(), 6.into()]),
            Invocation::error([tensor(&[2, 3]), tensor(&[2, 3]), 2.into(), 6.into()]),
        ]);
    }

    lib.register(
        "aten::layer_norm",
        signature![
            "input": Tensor,
            "normalized_shape": IntList,
            "weight": OptTensor = NONE,
            "bias": OptTensor = NONE,
            "eps": Float = 1e-5,
            "cudnn_enable": Bool = true
            => 1
        ],
        layer_norm,
    )?
    .invocations([
        Invocation::new([tensor(&[2, 3, 4]), ints(&[4])]),
        Invocation::new([
            tensor(&[2, 3, 4]),
            ints(&[3, 4]),
            tensor(&[3, 4]),
            tensor(&[3, 4]),
        ]),
        Invocation::error([tensor(&[2, 3, 4]), ints(&[3])]),
        Invocation::error([tensor(&[2, 3, 4]), ints(&[4]), tensor(&[3])]),
        Invocation::error([tensor(&[2, 3, 4]), ints(&[])]),
        Invocation::error([tensor(&[4]), ints(&[2, 4])]),
    ]);

    lib.register(
        "aten::native_layer_norm",
        signature![
            "input": Tensor,
            "normalized_shape": IntList,
            "weight": OptTensor,
            "bias": OptTensor,
            "eps": Float
            => 3
        ],
        native_layer_norm,
    )?
    .invocations([
        Invocation::new([
            tensor(&[2, 3, 4]),
            ints(&[4]),
            Arg::None,
            Arg::None,
            1e-5.into(),
        ]),
        Invocation::new([
            tensor(&[2, 3, 4]),
            ints(&[3, 4]),
            tensor(&[3, 4]),
            tensor(&[3, 4]),
            1e-5.into(),
        ]),
        Invocation::error([
            tensor(&[2, 3, 4]),
            ints(&[2, 4]),
            Arg::None,
            Arg::None,
            1e-5.into(),
        ]),
    ]);

    lib.register(
        "aten::batch_norm",
        signature![
            "input": Tensor,
            "weight": OptTensor,
            "bias": OptTensor,
            "running_mean": OptTensor,
            "running_var": OptTensor,
            "training": Bool,
            "momentum": Float,
            "eps": Float,
            "cudnn_enabled": Bool
            => 1
        ],
        batch_norm,
    )?
    .invocations([
        Invocation::new([
            tensor(&[2, 3, 4, 4]),
            tensor(&[3]),
            tensor(&[3]),
            tensor(&[3]),
            tensor(&[3]),
            false.into(),
            0.1.into(),
            1e-5.into(),
            true.into(),
        ]),
        Invocation::error([
            tensor(&[2, 3, 4, 4]),
            Arg::None,
            Arg::None,
            Arg::None,
            Arg::None,
            false.into(),
            0.1.into(),
            1e-5.into(),
            true.into(),
        ]),
    ]);

    lib.register(
        "aten::native_batch_norm",
        signature![
            "input": Tensor,
            "weight": OptTensor,
            "bias": OptTensor,
            "running_mean": OptTensor,
            "running_var": OptTensor,
            "training": Bool,
            "momentum": Float,
            "eps": Float
            => 3
        ],
        native_batch_norm,
    )?
    .invocations([
        Invocation::new([
            tensor(&[2, 3, 4, 4]),
            tensor(&[3]),
            tensor(&[3]),
            tensor(&[3]),
            tensor(&[3]),
            true.into(),
            0.1.into(),
            1e-5.into(),
        ]),
        Invocation::new([
            tensor(&[2, 3, 4, 4]),
            tensor(&[3]),
            tensor(&[3]),
            tensor(&[3]),
            tensor(&[3]),
            false.into(),
            0.1.into(),
            1e-5.into(),
        ]),
        Invocation::new([
            tensor(&[4, 3]),
            Arg::None,
            Arg::None,
            Arg::None,
            Arg::None,
            true.into(),
            0.1.into(),
            1e-5.into(),
        ]),
        Invocation::error([
            tensor(&[2, 3, 4, 4]),
            Arg::None,
            Arg::None,
            Arg::None,
            Arg::None,
            false.into(),
            0.1.into(),
            1e-5.into(),
        ]),
        Invocation::error([
            tensor(&[2, 3, 4, 4]),
            tensor(&[4]),
            Arg::None,
            Arg::None,
            Arg::None,
            true.into(),
            0.1.into(),
            1e-5.into(),
        ]),
    ]);

    lib.register(
        "aten::nll_loss_forward",
        signature![
            "self": Tensor,
            "target": Tensor,
            "weight": OptTensor,
            "reduction": Int,
            "ignore_index": Int
            => 2
        ],
        nll_loss_forward,
    )?
    .invocations([
        Invocation::new([
            tensor(&[2, 3]),
            long_tensor(&[2]),
            Arg::None,
            1.into(),
            (-100).into(),
        ]),
        Invocation::new([
            tensor(&[3]),
            long_tensor(&[]),
            Arg::None,
            1.into(),
            (-100).into(),
        ]),
        Invocation::new([
            tensor(&[2, 3]),
            long_tensor(&[2]),
            tensor(&[3]),
            0.into(),
            (-100).into(),
        ]),
        Invocation::error([
            tensor(&[2, 3]),
            long_tensor(&[3]),
            Arg::None,
            1.into(),
            (-100).into(),
        ]),
        Invocation::error([
            tensor(&[2, 3]),
            long_tensor(&[2]),
            tensor(&[2]),
            2.into(),
            (-100).into(),
        ]),
    ]);

    lib.register(
        "aten::nll_loss_backward",
        signature![
            "grad_output": Tensor,
            "self": Tensor,
            "target": Tensor,
            "weight": OptTensor,
            "reduction": Int,
            "ignore_index": Int,
            "total_weight": Tensor
            => 1
        ],
        nll_loss_backward,
    )?
    .invocations([
        Invocation::new([
            tensor(&[]),
            tensor(&[2, 3]),
            long_tensor(&[2]),
            Arg::None,
            1.into(),
            (-100).into(),
            tensor(&[]),
        ]),
        Invocation::new([
            tensor(&[2]),
            tensor(&[2, 3]),
            long_tensor(&[2]),
            Arg::None,
            0.into(),
            (-100).into(),
            tensor(&[]),
        ]),
        Invocation::error([
            tensor(&[3]),
            tensor(&[2, 3]),
            long_tensor(&[2]),
            Arg::None,
            0.into(),
            (-100).into(),
            tensor(&[]),
        ]),
    ]);

    Ok(())
}
