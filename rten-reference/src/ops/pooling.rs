use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{float_arg, int_arg, many, one, Args, OpResult, OpTable};

/// Parameters of a 2D pooling window.
#[derive(Clone, Debug, PartialEq)]
struct PoolParams {
    kernel: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
    ceil_mode: bool,
}

fn pair(values: &[i64], what: &'static str) -> Result<[i64; 2], OpError> {
    match *values {
        [x] => Ok([x, x]),
        [x, y] => Ok([x, y]),
        _ => Err(OpError::InvalidValue(what)),
    }
}

impl PoolParams {
    fn from_lists(
        kernel: &[i64],
        stride: &[i64],
        padding: &[i64],
        dilation: &[i64],
        ceil_mode: bool,
    ) -> Result<PoolParams, OpError> {
        let kernel = pair(kernel, "Kernel size must have 1 or 2 values")?;
        let stride = if stride.is_empty() {
            kernel
        } else {
            pair(stride, "Stride must have 0, 1 or 2 values")?
        };
        let padding = pair(padding, "Padding must have 1 or 2 values")?;
        let dilation = pair(dilation, "Dilation must have 1 or 2 values")?;

        if kernel.iter().chain(&stride).chain(&dilation).any(|&x| x <= 0) {
            return Err(OpError::InvalidValue(
                "Kernel size, stride and dilation must be positive",
            ));
        }
        if padding.iter().any(|&p| p < 0) {
            return Err(OpError::InvalidValue("Padding must be non-negative"));
        }
        if padding[0] > kernel[0] / 2 || padding[1] > kernel[1] / 2 {
            return Err(OpError::InvalidValue(
                "Padding must be at most half the kernel size",
            ));
        }

        let to_usize = |xs: [i64; 2]| xs.map(|x| x as usize);
        Ok(PoolParams {
            kernel: to_usize(kernel),
            stride: to_usize(stride),
            padding: to_usize(padding),
            dilation: to_usize(dilation),
            ceil_mode,
        })
    }

    /// Return the output size along spatial dim `i` for an input size.
    fn output_size(&self, i: usize, input_size: usize) -> Result<usize, OpError> {
        let [kernel, stride, padding, dilation] = [
            self.kernel[i] as i64,
            self.stride[i] as i64,
            self.padding[i] as i64,
            self.dilation[i] as i64,
        ];
        let input_size = input_size as i64;
        let span = input_size + 2 * padding - dilation * (kernel - 1) - 1;
        let mut size = if self.ceil_mode {
            (span + stride - 1).div_euclid(stride) + 1
        } else {
            span.div_euclid(stride) + 1
        };
        // The last window must start inside the input or left padding.
        if self.ceil_mode && (size - 1) * stride >= input_size + padding {
            size -= 1;
        }
        if size <= 0 {
            return Err(OpError::InvalidValue("Pooling output size is too small"));
        }
        Ok(size as usize)
    }
}

/// Layout of the input to a 2D pooling op, viewed as a stack of planes.
struct Planes {
    batch_shape: Vec<usize>,
    height: usize,
    width: usize,
}

impl Planes {
    /// Check that `shape` is `[C, H, W]` or `[N, C, H, W]` and split it into
    /// leading dims and the plane size. `nonempty_from` is the first dim
    /// that must be non-empty.
    fn new(shape: &[usize], nonempty_from: usize) -> Result<Planes, OpError> {
        if !matches!(shape.len(), 3 | 4) {
            return Err(OpError::InvalidValue("Pooling input must be 3D or 4D"));
        }
        let batch_dims = shape.len() - 3;
        if shape[batch_dims + nonempty_from..].contains(&0) {
            return Err(OpError::IncompatibleInputShapes(
                "Pooling input has an empty non-batch dim",
            ));
        }
        let n = shape.len();
        Ok(Planes {
            batch_shape: shape[..n - 2].to_vec(),
            height: shape[n - 2],
            width: shape[n - 1],
        })
    }

    fn count(&self) -> usize {
        self.batch_shape.iter().product()
    }

    fn output_shape(&self, out_h: usize, out_w: usize) -> Vec<usize> {
        let mut shape = self.batch_shape.clone();
        shape.extend([out_h, out_w]);
        shape
    }
}

/// Return the max value and flat in-plane index of each pooling window.
fn max_pool(input: &Tensor<f32>, params: &PoolParams) -> Result<(Tensor<f32>, Tensor<i32>), OpError> {
    let planes = Planes::new(input.shape(), 0)?;
    let out_h = params.output_size(0, planes.height)?;
    let out_w = params.output_size(1, planes.width)?;
    let (h, w) = (planes.height, planes.width);

    let data = input.to_vec();
    let mut values = Vec::with_capacity(planes.count() * out_h * out_w);
    let mut indices = Vec::with_capacity(values.capacity());
    for plane in data.chunks(h * w) {
        for oy in 0..out_h {
            for ox in 0..out_w {
                let mut max = f32::NEG_INFINITY;
                let mut max_index = 0;
                for ky in 0..params.kernel[0] {
                    let y = (oy * params.stride[0] + ky * params.dilation[0]) as i64
                        - params.padding[0] as i64;
                    if y < 0 || y >= h as i64 {
                        continue;
                    }
                    for kx in 0..params.kernel[1] {
                        let x = (ox * params.stride[1] + kx * params.dilation[1]) as i64
                            - params.padding[1] as i64;
                        if x < 0 || x >= w as i64 {
                            continue;
                        }
                        let index = y as usize * w + x as usize;
                        if plane[index] > max || plane[index].is_nan() {
                            max = plane[index];
                            max_index = index;
                        }
                    }
                }
                values.push(max);
                indices.push(max_index as i32);
            }
        }
    }

    let out_shape = planes.output_shape(out_h, out_w);
    Ok((
        Tensor::from_data(&out_shape, values),
        Tensor::from_data(&out_shape, indices),
    ))
}

fn max_pool_params(args: &Args) -> Result<PoolParams, OpError> {
    PoolParams::from_lists(
        &args.ints("kernel_size")?,
        &args.ints("stride")?,
        &args.ints("padding")?,
        &args.ints("dilation")?,
        args.bool("ceil_mode")?,
    )
}

fn max_pool2d(args: &Args) -> OpResult {
    let (values, _) = max_pool(&float_arg(args, "self")?, &max_pool_params(args)?)?;
    one(values)
}

fn max_pool2d_with_indices(args: &Args) -> OpResult {
    let (values, indices) = max_pool(&float_arg(args, "self")?, &max_pool_params(args)?)?;
    many([values.into(), indices.into()])
}

fn max_pool2d_with_indices_backward(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let grad = float_arg(args, "grad_output")?;
    let indices = int_arg(args, "indices")?;
    let (output, _) = max_pool(&input, &max_pool_params(args)?)?;
    if grad.shape() != output.shape() || indices.shape() != output.shape() {
        return Err(OpError::IncompatibleInputShapes(
            "Gradient and indices must have the shape of the pooling output",
        ));
    }

    let planes = Planes::new(input.shape(), 0)?;
    let plane_len = planes.height * planes.width;
    let out_plane_len: usize = output.shape()[output.ndim() - 2..].iter().product();
    let mut grad_input = vec![0.; input.len()];
    let indices = indices.to_vec();
    for (i, &g) in grad.iter().enumerate() {
        let plane = i / out_plane_len;
        let index = indices[i];
        if index < 0 || index as usize >= plane_len {
            return Err(OpError::InvalidValue("Pooling index is out of bounds"));
        }
        grad_input[plane * plane_len + index as usize] += g;
    }
    one(Tensor::from_data(input.shape(), grad_input))
}

fn avg_pool2d(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let params = PoolParams::from_lists(
        &args.ints("kernel_size")?,
        &args.ints("stride")?,
        &args.ints("padding")?,
        &[1],
        args.bool("ceil_mode")?,
    )?;
    let count_include_pad = args.bool("count_include_pad")?;
    let divisor_override = args.opt_int("divisor_override")?;
    if divisor_override == Some(0) {
        return Err(OpError::InvalidValue("Divisor must not be zero"));
    }

    let planes = Planes::new(input.shape(), 0)?;
    let out_h = params.output_size(0, planes.height)?;
    let out_w = params.output_size(1, planes.width)?;
    let (h, w) = (planes.height as i64, planes.width as i64);
    let [pad_y, pad_x] = params.padding.map(|p| p as i64);

    let data = input.to_vec();
    let mut output = Vec::with_capacity(planes.count() * out_h * out_w);
    for plane in data.chunks((h * w) as usize) {
        for oy in 0..out_h as i64 {
            for ox in 0..out_w as i64 {
                let y_start = oy * params.stride[0] as i64 - pad_y;
                let x_start = ox * params.stride[1] as i64 - pad_x;
                let y_end = (y_start + params.kernel[0] as i64).min(h + pad_y);
                let x_end = (x_start + params.kernel[1] as i64).min(w + pad_x);
                let padded_count = (y_end - y_start) * (x_end - x_start);

                let (y_start, x_start) = (y_start.max(0), x_start.max(0));
                let (y_end, x_end) = (y_end.min(h), x_end.min(w));
                let mut sum = 0.;
                for y in y_start..y_end {
                    for x in x_start..x_end {
                        sum += plane[(y * w + x) as usize];
                    }
                }

                let divisor = match divisor_override {
                    Some(divisor) => divisor,
                    None if count_include_pad => padded_count,
                    None => (y_end - y_start) * (x_end - x_start),
                };
                output.push(sum / divisor as f32);
            }
        }
    }
    one(Tensor::from_data(&planes.output_shape(out_h, out_w), output))
}

/// Return the `[start, end)` range of input positions pooled into output
/// position `i` of an adaptive pooling op.
fn adaptive_window(i: usize, in_size: usize, out_size: usize) -> (usize, usize) {
    let start = (i * in_size) / out_size;
    let end = ((i + 1) * in_size).div_ceil(out_size);
    (start, end)
}

fn adaptive_avg_pool2d(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let output_size = args.ints("output_size")?;
    let [out_h, out_w] = match *output_size {
        [h, w] if h >= 0 && w >= 0 => [h as usize, w as usize],
        [_, _] => return Err(OpError::InvalidValue("Output size must be non-negative")),
        _ => return Err(OpError::InvalidValue("Output size must have 2 values")),
    };
    let planes = Planes::new(input.shape(), 1)?;
    let (h, w) = (planes.height, planes.width);

    let data = input.to_vec();
    let mut output = Vec::with_capacity(planes.count() * out_h * out_w);
    for plane_index in 0..planes.count() {
        let plane = &data[plane_index * h * w..(plane_index + 1) * h * w];
        for oy in 0..out_h {
            let (y_start, y_end) = adaptive_window(oy, h, out_h);
            for ox in 0..out_w {
                let (x_start, x_end) = adaptive_window(ox, w, out_w);
                let mut sum = 0.;
                for y in y_start..y_end {
                    for x in x_start..x_end {
                        sum += plane[y * w + x];
                    }
                }
                output.push(sum / ((y_end - y_start) * (x_end - x_start)) as f32);
            }
        }
    }
    one(Tensor::from_data(&planes.output_shape(out_h, out_w), output))
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::max_pool2d", max_pool2d);
    table.add("aten::max_pool2d_with_indices", max_pool2d_with_indices);
    table.add(
        "aten::max_pool2d_with_indices_backward",
        max_pool2d_with_indices_backward,
    );
    table.add("aten::avg_pool2d", avg_pool2d);
    table.add("aten::adaptive_avg_pool2d", adaptive_avg_pool2d);
}
