use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{float_arg, one, opt_float_arg, ravel, unravel, Args, OpResult, OpTable};

/// Hyperparameters of a convolution, with one entry per spatial dim.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvParams {
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,
    pub dilation: Vec<usize>,
    pub groups: usize,
}

impl ConvParams {
    /// Create parameters from operator arguments, where each list may have
    /// one value for all spatial dims or one per dim.
    pub fn from_lists(
        n_spatial: usize,
        stride: &[i64],
        padding: &[i64],
        dilation: &[i64],
        groups: i64,
    ) -> Result<ConvParams, OpError> {
        let stride = spatial_param(stride, n_spatial)?;
        let padding = spatial_param(padding, n_spatial)?;
        let dilation = spatial_param(dilation, n_spatial)?;
        if padding.iter().any(|&p| p < 0) {
            return Err(OpError::InvalidValue("Padding must be non-negative"));
        }
        if stride.iter().chain(&dilation).any(|&x| x <= 0) {
            return Err(OpError::InvalidValue("Strides and dilations must be positive"));
        }
        if groups <= 0 {
            return Err(OpError::InvalidValue("Groups must be positive"));
        }
        let to_usize = |xs: Vec<i64>| -> Vec<usize> { xs.into_iter().map(|x| x as usize).collect() };
        Ok(ConvParams {
            stride: to_usize(stride),
            padding: to_usize(padding),
            dilation: to_usize(dilation),
            groups: groups as usize,
        })
    }
}

fn spatial_param(values: &[i64], n: usize) -> Result<Vec<i64>, OpError> {
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        _ => Err(OpError::InvalidValue(
            "Parameter must have one value or one per spatial dim",
        )),
    }
}

fn check_ranks(input: &Tensor<f32>, weight: &Tensor<f32>) -> Result<(), OpError> {
    if weight.ndim() < 3 {
        return Err(OpError::InvalidValue("Weight must have at least 3 dims"));
    }
    if input.ndim() != weight.ndim() {
        return Err(OpError::IncompatibleInputShapes(
            "Input and weight must have the same number of dims",
        ));
    }
    Ok(())
}

fn check_bias(bias: Option<&Tensor<f32>>, out_channels: usize) -> Result<(), OpError> {
    if let Some(bias) = bias {
        if bias.shape() != [out_channels] {
            return Err(OpError::IncompatibleInputShapes(
                "Bias must have one element per output channel",
            ));
        }
    }
    Ok(())
}

/// Add a per-channel bias to an `[N, C, ...]` output.
fn add_bias(output: &mut [f32], shape: &[usize], bias: Option<&Tensor<f32>>) {
    let Some(bias) = bias else {
        return;
    };
    let bias = bias.to_vec();
    for (offset, x) in output.iter_mut().enumerate() {
        *x += bias[unravel(offset, shape)[1]];
    }
}

/// N-dimensional convolution.
///
/// `input` has shape `[N, C, ...spatial]` and `weight` has shape
/// `[out_channels, C / groups, ...kernel]`.
pub fn conv(
    input: &Tensor<f32>,
    weight: &Tensor<f32>,
    bias: Option<&Tensor<f32>>,
    params: &ConvParams,
) -> Result<Tensor<f32>, OpError> {
    check_ranks(input, weight)?;
    let in_shape = input.shape();
    let k_shape = weight.shape();
    let n_spatial = in_shape.len() - 2;
    let groups = params.groups;

    let out_channels = k_shape[0];
    let group_in = k_shape[1];
    if out_channels % groups != 0 {
        return Err(OpError::IncompatibleInputShapes(
            "Output channels must be divisible by groups",
        ));
    }
    if in_shape[1] != group_in * groups {
        return Err(OpError::IncompatibleInputShapes(
            "Input channels do not match weight channels and groups",
        ));
    }
    check_bias(bias, out_channels)?;

    let mut out_shape = vec![in_shape[0], out_channels];
    for i in 0..n_spatial {
        let padded = in_shape[2 + i] + 2 * params.padding[i];
        let kernel_extent = params.dilation[i] * k_shape[2 + i].saturating_sub(1) + 1;
        if k_shape[2 + i] == 0 || padded < kernel_extent {
            return Err(OpError::InvalidValue("Kernel is larger than padded input"));
        }
        out_shape.push((padded - kernel_extent) / params.stride[i] + 1);
    }

    let group_out = out_channels / groups;
    let kernel_spatial = &k_shape[2..];
    let kernel_len: usize = kernel_spatial.iter().product();
    let in_data = input.to_vec();
    let k_data = weight.to_vec();

    let mut output = vec![0.; out_shape.iter().product()];
    for (offset, out) in output.iter_mut().enumerate() {
        let out_index = unravel(offset, &out_shape);
        let (n, o) = (out_index[0], out_index[1]);
        let group = o / group_out;

        let mut sum = 0.;
        for c in 0..group_in {
            for k in 0..kernel_len {
                let k_index = unravel(k, kernel_spatial);
                let mut in_index = vec![n, group * group_in + c];
                let mut in_bounds = true;
                for i in 0..n_spatial {
                    let pos = (out_index[2 + i] * params.stride[i] + k_index[i] * params.dilation[i])
                        as i64
                        - params.padding[i] as i64;
                    if pos < 0 || pos >= in_shape[2 + i] as i64 {
                        in_bounds = false;
                        break;
                    }
                    in_index.push(pos as usize);
                }
                if !in_bounds {
                    continue;
                }
                let mut w_index = vec![o, c];
                w_index.extend_from_slice(&k_index);
                sum += in_data[ravel(&in_index, in_shape)] * k_data[ravel(&w_index, k_shape)];
            }
        }
        *out = sum;
    }
    add_bias(&mut output, &out_shape, bias);
    Ok(Tensor::from_data(&out_shape, output))
}

/// N-dimensional transposed convolution.
///
/// `weight` has shape `[C, out_channels / groups, ...kernel]`.
/// `output_padding` adds extra elements to the end of each spatial output
/// dim and must be smaller than either the stride or dilation.
pub fn conv_transpose(
    input: &Tensor<f32>,
    weight: &Tensor<f32>,
    bias: Option<&Tensor<f32>>,
    params: &ConvParams,
    output_padding: &[usize],
) -> Result<Tensor<f32>, OpError> {
    check_ranks(input, weight)?;
    let in_shape = input.shape();
    let k_shape = weight.shape();
    let n_spatial = in_shape.len() - 2;
    let groups = params.groups;

    if in_shape[1] != k_shape[0] {
        return Err(OpError::IncompatibleInputShapes(
            "Input channels do not match weight",
        ));
    }
    if k_shape[0] % groups != 0 {
        return Err(OpError::IncompatibleInputShapes(
            "Input channels must be divisible by groups",
        ));
    }
    let group_in = k_shape[0] / groups;
    let group_out = k_shape[1];
    let out_channels = group_out * groups;
    check_bias(bias, out_channels)?;

    let mut out_shape = vec![in_shape[0], out_channels];
    for i in 0..n_spatial {
        let (stride, dilation) = (params.stride[i], params.dilation[i]);
        if output_padding[i] >= stride && output_padding[i] >= dilation {
            return Err(OpError::InvalidValue(
                "Output padding must be smaller than stride or dilation",
            ));
        }
        let size = (in_shape[2 + i] as i64 - 1) * stride as i64 - 2 * params.padding[i] as i64
            + dilation as i64 * (k_shape[2 + i] as i64 - 1)
            + output_padding[i] as i64
            + 1;
        if size <= 0 {
            return Err(OpError::InvalidValue("Output size is too small"));
        }
        out_shape.push(size as usize);
    }

    let kernel_spatial = &k_shape[2..];
    let kernel_len: usize = kernel_spatial.iter().product();
    let in_data = input.to_vec();
    let k_data = weight.to_vec();
    let mut output = vec![0.; out_shape.iter().product()];

    // Scatter the contribution of each input element to the output.
    for (offset, &x) in in_data.iter().enumerate() {
        let in_index = unravel(offset, in_shape);
        let (n, c) = (in_index[0], in_index[1]);
        let group = c / group_in;
        for co in 0..group_out {
            for k in 0..kernel_len {
                let k_index = unravel(k, kernel_spatial);
                let mut out_index = vec![n, group * group_out + co];
                let mut in_bounds = true;
                for i in 0..n_spatial {
                    let pos = (in_index[2 + i] * params.stride[i] + k_index[i] * params.dilation[i])
                        as i64
                        - params.padding[i] as i64;
                    if pos < 0 || pos >= out_shape[2 + i] as i64 {
                        in_bounds = false;
                        break;
                    }
                    out_index.push(pos as usize);
                }
                if !in_bounds {
                    continue;
                }
                let mut w_index = vec![c, co];
                w_index.extend_from_slice(&k_index);
                output[ravel(&out_index, &out_shape)] += x * k_data[ravel(&w_index, k_shape)];
            }
        }
    }
    add_bias(&mut output, &out_shape, bias);
    Ok(Tensor::from_data(&out_shape, output))
}

fn conv2d(args: &Args) -> OpResult {
    let input = float_arg(args, "input")?;
    let weight = float_arg(args, "weight")?;
    let bias = opt_float_arg(args, "bias")?;
    if weight.ndim() != 4 {
        return Err(OpError::InvalidValue("conv2d weight must be 4D"));
    }

    // Unbatched inputs are processed as a batch of one.
    let unbatched = input.ndim() == 3;
    let input = if unbatched {
        let mut shape = input.shape().to_vec();
        shape.insert(0, 1);
        Tensor::from_data(&shape, input.to_vec())
    } else {
        input
    };

    let params = ConvParams::from_lists(
        2,
        &args.ints("stride")?,
        &args.ints("padding")?,
        &args.ints("dilation")?,
        args.int("groups")?,
    )?;
    let output = conv(&input, &weight, bias.as_ref(), &params)?;
    if unbatched {
        let shape = output.shape()[1..].to_vec();
        return one(Tensor::from_data(&shape, output.to_vec()));
    }
    one(output)
}

fn convolution(args: &Args) -> OpResult {
    let input = float_arg(args, "input")?;
    let weight = float_arg(args, "weight")?;
    let bias = opt_float_arg(args, "bias")?;
    check_ranks(&input, &weight)?;
    let n_spatial = weight.ndim() - 2;
    let params = ConvParams::from_lists(
        n_spatial,
        &args.ints("stride")?,
        &args.ints("padding")?,
        &args.ints("dilation")?,
        args.int("groups")?,
    )?;

    if args.bool("transposed")? {
        let output_padding = spatial_param(&args.ints("output_padding")?, n_spatial)?;
        if output_padding.iter().any(|&p| p < 0) {
            return Err(OpError::InvalidValue("Output padding must be non-negative"));
        }
        let output_padding: Vec<usize> = output_padding.into_iter().map(|p| p as usize).collect();
        one(conv_transpose(&input, &weight, bias.as_ref(), &params, &output_padding)?)
    } else {
        one(conv(&input, &weight, bias.as_ref(), &params)?)
    }
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::conv2d", conv2d);
    table.add("aten::convolution", convolution);
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;
    use rten_testing::TestCases;

    use super::{conv, conv_transpose, ConvParams};

    fn params(stride: usize, padding: usize, groups: usize) -> ConvParams {
        ConvParams {
            stride: vec![stride; 2],
            padding: vec![padding; 2],
            dilation: vec![1; 2],
            groups,
        }
    }

    #[test]
    fn test_conv_values() {
        // 3x3 input, 2x2 kernel of ones, so each output is the sum of a
        // 2x2 window.
        let input = Tensor::from_data(&[1, 1, 3, 3], (1..=9).map(|x| x as f32).collect::<Vec<_>>());
        let weight = Tensor::full(&[1, 1, 2, 2], 1.);
        let bias = Tensor::from_data(&[1], vec![0.5]);
        let output = conv(&input, &weight, Some(&bias), &params(1, 0, 1)).unwrap();
        assert_eq!(output.shape(), &[1, 1, 2, 2]);
        assert_eq!(output.to_vec(), vec![12.5, 16.5, 24.5, 28.5]);
    }

    #[test]
    fn test_conv_shapes() {
        #[derive(Debug)]
        struct Case {
            input: Vec<usize>,
            weight: Vec<usize>,
            params: ConvParams,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                input: [1, 3, 8, 8].into(),
                weight: [4, 3, 3, 3].into(),
                params: params(1, 0, 1),
                expected: Some([1, 4, 6, 6].into()),
            },
            Case {
                input: [1, 3, 8, 8].into(),
                weight: [4, 3, 3, 3].into(),
                params: params(2, 1, 1),
                expected: Some([1, 4, 4, 4].into()),
            },
            Case {
                input: [2, 4, 5, 5].into(),
                weight: [6, 2, 3, 3].into(),
                params: params(1, 0, 2),
                expected: Some([2, 6, 3, 3].into()),
            },
            Case {
                input: [1, 2, 8, 8].into(),
                weight: [4, 3, 3, 3].into(),
                params: params(1, 0, 1),
                expected: None,
            },
            Case {
                input: [1, 3, 2, 2].into(),
                weight: [4, 3, 3, 3].into(),
                params: params(1, 0, 1),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let input = Tensor::<f32>::zeros(&case.input);
            let weight = Tensor::<f32>::zeros(&case.weight);
            let result = conv(&input, &weight, None, &case.params)
                .ok()
                .map(|output| output.shape().to_vec());
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_conv_transpose() {
        let input = Tensor::from_data(&[1, 1, 2, 2], vec![1., 2., 3., 4.]);
        let weight = Tensor::full(&[1, 1, 2, 2], 1.);
        let output = conv_transpose(&input, &weight, None, &params(2, 0, 1), &[0, 0]).unwrap();
        assert_eq!(output.shape(), &[1, 1, 4, 4]);
        assert_eq!(
            output.to_vec(),
            vec![
                1., 1., 2., 2., //
                1., 1., 2., 2., //
                3., 3., 4., 4., //
                3., 3., 4., 4.,
            ]
        );

        let result = conv_transpose(&input, &weight, None, &params(1, 0, 1), &[1, 1]);
        assert!(result.is_err());
    }
}
