use super::ShapeError;

/// Expand a per-spatial-dim parameter which may be given once for all dims.
fn spatial_param(values: &[i64], n: usize, what: &'static str) -> Result<Vec<i64>, ShapeError> {
    match values.len() {
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        _ => Err(ShapeError::InvalidValue(what)),
    }
}

/// Compute the size of one spatial output dimension of a pooling or
/// convolution operator.
///
/// `padding` is applied to both sides of the input. In ceil mode, the last
/// window is dropped if it would start entirely in the right padding.
pub fn pool_output_size(
    input_size: usize,
    kernel_size: i64,
    padding: i64,
    stride: i64,
    dilation: i64,
    ceil_mode: bool,
) -> Result<usize, ShapeError> {
    if kernel_size <= 0 {
        return Err(ShapeError::InvalidValue("kernel size must be positive"));
    }
    if stride <= 0 {
        return Err(ShapeError::InvalidValue("stride must be positive"));
    }
    if dilation <= 0 {
        return Err(ShapeError::InvalidValue("dilation must be positive"));
    }
    if padding < 0 {
        return Err(ShapeError::InvalidValue("padding must be non-negative"));
    }

    let input_size = input_size as i64;
    let mut numerator = input_size + 2 * padding - dilation * (kernel_size - 1) - 1;
    if ceil_mode {
        numerator += stride - 1;
    }
    let mut output_size = numerator.div_euclid(stride) + 1;
    if ceil_mode && (output_size - 1) * stride >= input_size + padding {
        output_size -= 1;
    }

    if output_size <= 0 {
        return Err(ShapeError::InvalidValue("output size is too small"));
    }
    Ok(output_size as usize)
}

/// Shape of a 2D pooling operator such as max or average pooling.
///
/// `input` has shape `[C, H, W]` or `[N, C, H, W]`. Parameter lists have one
/// or two entries. An empty `stride` defaults to the kernel size.
pub fn pool2d(
    input: &[usize],
    kernel_size: &[i64],
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    ceil_mode: bool,
) -> Result<Vec<usize>, ShapeError> {
    let kernel_size = spatial_param(kernel_size, 2, "kernel_size must have 1 or 2 values")?;
    let stride = if stride.is_empty() {
        kernel_size.clone()
    } else {
        spatial_param(stride, 2, "stride must be empty or have 1 or 2 values")?
    };
    let padding = spatial_param(padding, 2, "padding must have 1 or 2 values")?;
    let dilation = spatial_param(dilation, 2, "dilation must have 1 or 2 values")?;

    if !matches!(input.len(), 3 | 4) {
        return Err(ShapeError::IncorrectRank(
            "pooling input must be a 3D or 4D tensor",
        ));
    }
    let batch_dims = input.len() - 3;
    if input[batch_dims..].contains(&0) {
        return Err(ShapeError::IncompatibleShapes(
            "pooling input has an empty non-batch dimension",
        ));
    }

    let mut output = input[..input.len() - 2].to_vec();
    for i in 0..2 {
        if padding[i] > kernel_size[i] / 2 {
            return Err(ShapeError::InvalidValue(
                "pad should be at most half of kernel size",
            ));
        }
        let input_size = input[input.len() - 2 + i];
        output.push(pool_output_size(
            input_size,
            kernel_size[i],
            padding[i],
            stride[i],
            dilation[i],
            ceil_mode,
        )?);
    }
    Ok(output)
}

/// Shape of a 2D adaptive pooling operator.
pub fn adaptive_pool2d(input: &[usize], output_size: &[i64]) -> Result<Vec<usize>, ShapeError> {
    let &[out_h, out_w] = output_size else {
        return Err(ShapeError::InvalidValue("output_size must have 2 values"));
    };
    if out_h < 0 || out_w < 0 {
        return Err(ShapeError::InvalidValue("output_size must be non-negative"));
    }
    if !matches!(input.len(), 3 | 4) {
        return Err(ShapeError::IncorrectRank(
            "adaptive pooling input must be a 3D or 4D tensor",
        ));
    }
    let batch_dims = input.len() - 3;
    if input[batch_dims + 1..].contains(&0) {
        return Err(ShapeError::IncompatibleShapes(
            "adaptive pooling input has an empty spatial dimension",
        ));
    }

    let mut output = input[..input.len() - 2].to_vec();
    output.push(out_h as usize);
    output.push(out_w as usize);
    Ok(output)
}

/// Shape of an N-dimensional convolution.
///
/// `input` has shape `[N, C, ...spatial]` and `weight` has shape
/// `[out_channels, C / groups, ...kernel]`. `stride`, `padding` and
/// `dilation` have either one value or one per spatial dimension.
pub fn conv_output_size(
    input: &[usize],
    weight: &[usize],
    bias: Option<&[usize]>,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    groups: i64,
) -> Result<Vec<usize>, ShapeError> {
    if weight.len() < 3 {
        return Err(ShapeError::IncorrectRank("weight must have at least 3 dims"));
    }
    if input.len() != weight.len() {
        return Err(ShapeError::IncorrectRank(
            "input and weight must have the same number of dims",
        ));
    }
    let n_spatial = input.len() - 2;

    let stride = spatial_param(stride, n_spatial, "stride has the wrong length")?;
    let padding = spatial_param(padding, n_spatial, "padding has the wrong length")?;
    let dilation = spatial_param(dilation, n_spatial, "dilation has the wrong length")?;

    if padding.iter().any(|&p| p < 0) {
        return Err(ShapeError::InvalidValue("negative padding is not supported"));
    }
    if stride.iter().any(|&s| s <= 0) {
        return Err(ShapeError::InvalidValue("non-positive stride is not supported"));
    }
    if dilation.iter().any(|&d| d <= 0) {
        return Err(ShapeError::InvalidValue("dilation must be positive"));
    }
    if groups <= 0 {
        return Err(ShapeError::InvalidValue("groups must be positive"));
    }
    let groups = groups as usize;

    let out_channels = weight[0];
    if out_channels % groups != 0 {
        return Err(ShapeError::IncompatibleShapes(
            "out channels must be divisible by groups",
        ));
    }
    if input[1] != weight[1] * groups {
        return Err(ShapeError::IncompatibleShapes(
            "input channels must match weight channels multiplied by groups",
        ));
    }
    if let Some(bias) = bias {
        if bias != [out_channels] {
            return Err(ShapeError::IncompatibleShapes(
                "bias must be a vector with one element per output channel",
            ));
        }
    }

    let mut output = vec![input[0], out_channels];
    for i in 0..n_spatial {
        output.push(pool_output_size(
            input[2 + i],
            weight[2 + i] as i64,
            padding[i],
            stride[i],
            dilation[i],
            false,
        )?);
    }
    Ok(output)
}

/// Shape of an N-dimensional transposed convolution.
///
/// `weight` has shape `[in_channels, out_channels / groups, ...kernel]`.
/// `output_padding` adds extra size to one side of each spatial output
/// dimension and must be smaller than either the stride or the dilation.
pub fn conv_transpose_output_size(
    input: &[usize],
    weight: &[usize],
    bias: Option<&[usize]>,
    stride: &[i64],
    padding: &[i64],
    dilation: &[i64],
    output_padding: &[i64],
    groups: i64,
) -> Result<Vec<usize>, ShapeError> {
    if weight.len() < 3 {
        return Err(ShapeError::IncorrectRank("weight must have at least 3 dims"));
    }
    if input.len() != weight.len() {
        return Err(ShapeError::IncorrectRank(
            "input and weight must have the same number of dims",
        ));
    }
    let n_spatial = input.len() - 2;

    let stride = spatial_param(stride, n_spatial, "stride has the wrong length")?;
    let padding = spatial_param(padding, n_spatial, "padding has the wrong length")?;
    let dilation = spatial_param(dilation, n_spatial, "dilation has the wrong length")?;
    let output_padding =
        spatial_param(output_padding, n_spatial, "output_padding has the wrong length")?;

    if padding.iter().chain(&output_padding).any(|&p| p < 0) {
        return Err(ShapeError::InvalidValue("negative padding is not supported"));
    }
    if stride.iter().any(|&s| s <= 0) {
        return Err(ShapeError::InvalidValue("non-positive stride is not supported"));
    }
    if dilation.iter().any(|&d| d <= 0) {
        return Err(ShapeError::InvalidValue("dilation must be positive"));
    }
    if groups <= 0 {
        return Err(ShapeError::InvalidValue("groups must be positive"));
    }
    let groups = groups as usize;

    if input[1] != weight[0] {
        return Err(ShapeError::IncompatibleShapes(
            "input channels must match weight input channels",
        ));
    }
    if weight[0] % groups != 0 {
        return Err(ShapeError::IncompatibleShapes(
            "input channels must be divisible by groups",
        ));
    }
    let out_channels = weight[1] * groups;
    if let Some(bias) = bias {
        if bias != [out_channels] {
            return Err(ShapeError::IncompatibleShapes(
                "bias must be a vector with one element per output channel",
            ));
        }
    }

    let mut output = vec![input[0], out_channels];
    for i in 0..n_spatial {
        if output_padding[i] >= stride[i] && output_padding[i] >= dilation[i] {
            return Err(ShapeError::InvalidValue(
                "output padding must be smaller than either stride or dilation",
            ));
        }
        let size = (input[2 + i] as i64 - 1) * stride[i] - 2 * padding[i]
            + dilation[i] * (weight[2 + i] as i64 - 1)
            + output_padding[i]
            + 1;
        if size <= 0 {
            return Err(ShapeError::InvalidValue("output size is too small"));
        }
        output.push(size as usize);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{
        adaptive_pool2d, conv_output_size, conv_transpose_output_size, pool2d, pool_output_size,
    };

    #[test]
    fn test_pool_output_size() {
        #[derive(Debug)]
        struct Case {
            input: usize,
            kernel: i64,
            padding: i64,
            stride: i64,
            dilation: i64,
            ceil_mode: bool,
            expected: Option<usize>,
        }

        let cases = [
            Case {
                input: 8,
                kernel: 3,
                padding: 0,
                stride: 2,
                dilation: 1,
                ceil_mode: false,
                expected: Some(3),
            },
            Case {
                input: 8,
                kernel: 3,
                padding: 0,
                stride: 2,
                dilation: 1,
                ceil_mode: true,
                expected: Some(4),
            },
            // The last window would start in the padding, so it is dropped.
            Case {
                input: 5,
                kernel: 2,
                padding: 1,
                stride: 2,
                dilation: 1,
                ceil_mode: true,
                expected: Some(3),
            },
            Case {
                input: 7,
                kernel: 3,
                padding: 0,
                stride: 1,
                dilation: 2,
                ceil_mode: false,
                expected: Some(3),
            },
            Case {
                input: 2,
                kernel: 3,
                padding: 0,
                stride: 1,
                dilation: 1,
                ceil_mode: false,
                expected: None,
            },
            Case {
                input: 8,
                kernel: 0,
                padding: 0,
                stride: 1,
                dilation: 1,
                ceil_mode: false,
                expected: None,
            },
            Case {
                input: 8,
                kernel: 2,
                padding: 0,
                stride: 0,
                dilation: 1,
                ceil_mode: false,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let size = pool_output_size(
                case.input,
                case.kernel,
                case.padding,
                case.stride,
                case.dilation,
                case.ceil_mode,
            );
            assert_eq!(size.ok(), case.expected);
        });
    }

    #[test]
    fn test_pool2d() {
        assert_eq!(
            pool2d(&[3, 8, 8], &[3], &[2], &[0], &[1], true),
            Ok(vec![3, 4, 4])
        );
        assert_eq!(
            pool2d(&[1, 3, 8, 8], &[2, 2], &[], &[0], &[1], false),
            Ok(vec![1, 3, 4, 4])
        );
        assert_eq!(
            pool2d(&[0, 3, 6, 6], &[3], &[1], &[1], &[1], false),
            Ok(vec![0, 3, 6, 6])
        );

        // Padding larger than half the kernel.
        assert!(pool2d(&[3, 8, 8], &[2], &[1], &[2], &[1], false).is_err());
        // Wrong rank.
        assert!(pool2d(&[8, 8], &[2], &[], &[0], &[1], false).is_err());
        // Empty non-batch dim.
        assert!(pool2d(&[3, 0, 8], &[2], &[], &[0], &[1], false).is_err());
        // Too many kernel values.
        assert!(pool2d(&[3, 8, 8], &[2, 2, 2], &[], &[0], &[1], false).is_err());
        // Kernel larger than input.
        assert!(pool2d(&[3, 2, 2], &[3], &[], &[0], &[1], false).is_err());
    }

    #[test]
    fn test_adaptive_pool2d() {
        assert_eq!(adaptive_pool2d(&[3, 8, 8], &[2, 2]), Ok(vec![3, 2, 2]));
        assert_eq!(adaptive_pool2d(&[1, 3, 8, 8], &[1, 4]), Ok(vec![1, 3, 1, 4]));
        assert!(adaptive_pool2d(&[3, 8, 8], &[2]).is_err());
        assert!(adaptive_pool2d(&[8, 8], &[2, 2]).is_err());
        assert!(adaptive_pool2d(&[3, 0, 8], &[2, 2]).is_err());
    }

    #[test]
    fn test_conv_output_size() {
        assert_eq!(
            conv_output_size(&[1, 3, 8, 8], &[16, 3, 3, 3], None, &[1], &[0], &[1], 1),
            Ok(vec![1, 16, 6, 6])
        );
        assert_eq!(
            conv_output_size(
                &[2, 4, 9, 9],
                &[8, 2, 3, 3],
                Some(&[8]),
                &[2, 2],
                &[1, 1],
                &[1, 1],
                2
            ),
            Ok(vec![2, 8, 5, 5])
        );
        assert_eq!(
            conv_output_size(&[1, 3, 10], &[4, 3, 3], None, &[1], &[0], &[2], 1),
            Ok(vec![1, 4, 6])
        );

        // Channel mismatch.
        assert!(
            conv_output_size(&[1, 4, 8, 8], &[16, 3, 3, 3], None, &[1], &[0], &[1], 1).is_err()
        );
        // Out channels not divisible by groups.
        assert!(
            conv_output_size(&[1, 4, 8, 8], &[3, 2, 3, 3], None, &[1], &[0], &[1], 2).is_err()
        );
        // Wrong bias shape.
        assert!(conv_output_size(
            &[1, 3, 8, 8],
            &[16, 3, 3, 3],
            Some(&[8]),
            &[1],
            &[0],
            &[1],
            1
        )
        .is_err());
        // Kernel larger than input.
        assert!(
            conv_output_size(&[1, 3, 2, 2], &[16, 3, 3, 3], None, &[1], &[0], &[1], 1).is_err()
        );
        // Rank mismatch.
        assert!(conv_output_size(&[3, 8, 8], &[16, 3, 3, 3], None, &[1], &[0], &[1], 1).is_err());
    }

    #[test]
    fn test_conv_transpose_output_size() {
        // 1x1 input upsampled with a 3x3 kernel and stride 2.
        assert_eq!(
            conv_transpose_output_size(&[1, 4, 5, 5], &[4, 2, 3, 3], None, &[2], &[1], &[1], &[1], 1),
            Ok(vec![1, 2, 10, 10])
        );

        // Grouped, with bias.
        assert_eq!(
            conv_transpose_output_size(
                &[2, 4, 3, 3],
                &[4, 3, 2, 2],
                Some(&[6]),
                &[1],
                &[0],
                &[1],
                &[0],
                2
            ),
            Ok(vec![2, 6, 4, 4])
        );

        // Output padding too large.
        assert!(
            conv_transpose_output_size(&[1, 4, 5, 5], &[4, 2, 3, 3], None, &[1], &[0], &[1], &[1], 1)
                .is_err()
        );

        // Channel mismatch.
        assert!(
            conv_transpose_output_size(&[1, 3, 5, 5], &[4, 2, 3, 3], None, &[1], &[0], &[1], &[0], 1)
                .is_err()
        );
    }
}
