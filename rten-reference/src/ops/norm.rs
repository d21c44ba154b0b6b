use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{
    float_arg, int_arg, many, one, opt_float_arg, ravel, resolve_axis, unravel, Args, OpResult,
    OpTable,
};

/// Return the offsets of elements in each lane of a tensor along `axis`.
///
/// A scalar has a single lane of one element.
fn lanes(shape: &[usize], axis: usize) -> Vec<Vec<usize>> {
    if shape.is_empty() {
        return vec![vec![0]];
    }
    let mut lane_shape = shape.to_vec();
    lane_shape[axis] = 1;
    let n_lanes: usize = lane_shape.iter().product();
    (0..n_lanes)
        .map(|lane| {
            let mut index = unravel(lane, &lane_shape);
            (0..shape[axis])
                .map(|i| {
                    index[axis] = i;
                    ravel(&index, shape)
                })
                .collect()
        })
        .collect()
}

/// Apply `f` to each lane of `input` along `axis`, updating it in place.
fn map_lanes(input: &Tensor<f32>, axis: usize, f: impl Fn(&mut [f32])) -> Tensor<f32> {
    let mut data = input.to_vec();
    let mut lane = Vec::new();
    for offsets in lanes(input.shape(), axis) {
        lane.clear();
        lane.extend(offsets.iter().map(|&i| data[i]));
        f(&mut lane);
        for (&i, &x) in offsets.iter().zip(&lane) {
            data[i] = x;
        }
    }
    Tensor::from_data(input.shape(), data)
}

/// Compute the softmax of `input` along `axis`.
pub fn softmax(input: &Tensor<f32>, axis: usize) -> Tensor<f32> {
    map_lanes(input, axis, |lane| {
        let max = lane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.;
        for x in lane.iter_mut() {
            *x = (*x - max).exp();
            sum += *x;
        }
        for x in lane.iter_mut() {
            *x /= sum;
        }
    })
}

/// Compute the log of the softmax of `input` along `axis`.
pub fn log_softmax(input: &Tensor<f32>, axis: usize) -> Tensor<f32> {
    map_lanes(input, axis, |lane| {
        let max = lane.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = lane.iter().map(|x| (x - max).exp()).sum::<f32>().ln() + max;
        for x in lane.iter_mut() {
            *x -= log_sum;
        }
    })
}

fn softmax_op(args: &Args, log: bool) -> OpResult {
    let input = float_arg(args, "self")?;
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    if log {
        one(log_softmax(&input, axis))
    } else {
        one(softmax(&input, axis))
    }
}

fn softmax_half_to_float(args: &Args, log: bool) -> OpResult {
    if args.bool("half_to_float")? {
        return Err(OpError::UnsupportedValue(
            "Conversion is only supported for half-precision inputs",
        ));
    }
    softmax_op(args, log)
}

/// Gradient of softmax or log-softmax with respect to its input, given the
/// gradient and value of its output.
fn softmax_backward(args: &Args, log: bool) -> OpResult {
    let grad = float_arg(args, "grad_output")?;
    let output = float_arg(args, "output")?;
    if grad.shape() != output.shape() {
        return Err(OpError::IncompatibleInputShapes(
            "Gradient and output must have the same shape",
        ));
    }
    let axis = resolve_axis(grad.ndim(), args.int("dim")?)?;

    let g = grad.to_vec();
    let y = output.to_vec();
    let mut grad_input = vec![0.; g.len()];
    for offsets in lanes(grad.shape(), axis) {
        if log {
            let sum: f32 = offsets.iter().map(|&i| g[i]).sum();
            for &i in &offsets {
                grad_input[i] = g[i] - y[i].exp() * sum;
            }
        } else {
            let dot: f32 = offsets.iter().map(|&i| g[i] * y[i]).sum();
            for &i in &offsets {
                grad_input[i] = y[i] * (g[i] - dot);
            }
        }
    }
    one(Tensor::from_data(grad.shape(), grad_input))
}

/// Validated inputs of a layer normalization.
struct LayerNorm {
    input: Tensor<f32>,
    weight: Option<Vec<f32>>,
    bias: Option<Vec<f32>>,

    /// Index of the first normalized dim.
    axis: usize,
}

impl LayerNorm {
    fn from_args(args: &Args) -> Result<LayerNorm, OpError> {
        let input = float_arg(args, "input")?;
        let normalized_shape = args.ints("normalized_shape")?;
        if normalized_shape.is_empty() {
            return Err(OpError::InvalidValue(
                "Normalized shape must have at least one dim",
            ));
        }
        let matches_normalized = |shape: &[usize]| {
            shape.len() == normalized_shape.len()
                && shape.iter().zip(&normalized_shape).all(|(&a, &b)| a as i64 == b)
        };

        let weight = opt_float_arg(args, "weight")?;
        let bias = opt_float_arg(args, "bias")?;
        for param in weight.iter().chain(&bias) {
            if !matches_normalized(param.shape()) {
                return Err(OpError::IncompatibleInputShapes(
                    "Weight and bias must have the normalized shape",
                ));
            }
        }
        let Some(axis) = input.ndim().checked_sub(normalized_shape.len()) else {
            return Err(OpError::IncompatibleInputShapes(
                "Input has fewer dims than normalized shape",
            ));
        };
        if !matches_normalized(&input.shape()[axis..]) {
            return Err(OpError::IncompatibleInputShapes(
                "Trailing input dims must match normalized shape",
            ));
        }

        Ok(LayerNorm {
            input,
            weight: weight.map(|w| w.to_vec()),
            bias: bias.map(|b| b.to_vec()),
            axis,
        })
    }

    /// Normalize the input, returning the output and the mean and reciprocal
    /// standard deviation of each normalized group.
    fn run(&self, eps: f32) -> (Tensor<f32>, Tensor<f32>, Tensor<f32>) {
        let shape = self.input.shape();
        let group_len: usize = shape[self.axis..].iter().product();
        let data = self.input.to_vec();

        let mut output = Vec::with_capacity(data.len());
        let mut means = Vec::new();
        let mut rstds = Vec::new();
        for group in data.chunks(group_len.max(1)) {
            let mean = group.iter().sum::<f32>() / group.len() as f32;
            let var = group.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / group.len() as f32;
            let rstd = 1. / (var + eps).sqrt();
            for (i, &x) in group.iter().enumerate() {
                let scale = self.weight.as_ref().map(|w| w[i]).unwrap_or(1.);
                let shift = self.bias.as_ref().map(|b| b[i]).unwrap_or(0.);
                output.push((x - mean) * rstd * scale + shift);
            }
            means.push(mean);
            rstds.push(rstd);
        }

        let mut stats_shape = shape[..self.axis].to_vec();
        stats_shape.resize(shape.len(), 1);
        let n_groups: usize = stats_shape.iter().product();
        means.resize(n_groups, 0.);
        rstds.resize(n_groups, 0.);
        (
            Tensor::from_data(shape, output),
            Tensor::from_data(&stats_shape, means),
            Tensor::from_data(&stats_shape, rstds),
        )
    }
}

fn layer_norm(args: &Args) -> OpResult {
    let norm = LayerNorm::from_args(args)?;
    let (output, _, _) = norm.run(args.float("eps")? as f32);
    one(output)
}

fn native_layer_norm(args: &Args) -> OpResult {
    let norm = LayerNorm::from_args(args)?;
    let (output, mean, rstd) = norm.run(args.float("eps")? as f32);
    many([output.into(), mean.into(), rstd.into()])
}

/// Result of a batch normalization. The saved statistics are empty in
/// evaluation mode.
struct BatchNormOutput {
    output: Tensor<f32>,
    save_mean: Vec<f32>,
    save_invstd: Vec<f32>,
}

fn batch_norm_impl(args: &Args) -> Result<BatchNormOutput, OpError> {
    let input = float_arg(args, "input")?;
    if input.ndim() < 2 {
        return Err(OpError::InvalidValue(
            "Batch norm input must have at least 2 dims",
        ));
    }
    let channels = input.shape()[1];
    let mut params = Vec::with_capacity(4);
    for name in ["weight", "bias", "running_mean", "running_var"] {
        let param = opt_float_arg(args, name)?;
        if let Some(param) = &param {
            if param.len() != channels {
                return Err(OpError::IncompatibleInputShapes(
                    "Batch norm parameters must have one element per channel",
                ));
            }
        }
        params.push(param.map(|p| p.to_vec()));
    }
    let [weight, bias, running_mean, running_var]: [Option<Vec<f32>>; 4] = params
        .try_into()
        .map_err(|_| OpError::InvalidValue("Expected four batch norm parameters"))?;

    let training = args.bool("training")?;
    let eps = args.float("eps")? as f32;

    // Group the elements of each channel.
    let shape = input.shape();
    let data = input.to_vec();
    let mut channel_offsets: Vec<Vec<usize>> = vec![Vec::new(); channels];
    for offset in 0..data.len() {
        channel_offsets[unravel(offset, shape)[1]].push(offset);
    }

    let (means, vars): (Vec<f32>, Vec<f32>) = if training {
        channel_offsets
            .iter()
            .map(|offsets| {
                let n = offsets.len() as f32;
                let mean = offsets.iter().map(|&i| data[i]).sum::<f32>() / n;
                let var = offsets.iter().map(|&i| (data[i] - mean).powi(2)).sum::<f32>() / n;
                (mean, var)
            })
            .unzip()
    } else {
        match (running_mean, running_var) {
            (Some(mean), Some(var)) => (mean, var),
            _ => {
                return Err(OpError::InvalidValue(
                    "Running mean and variance are required in evaluation mode",
                ))
            }
        }
    };

    let mut output = vec![0.; data.len()];
    for (c, offsets) in channel_offsets.iter().enumerate() {
        let invstd = 1. / (vars[c] + eps).sqrt();
        let scale = weight.as_ref().map(|w| w[c]).unwrap_or(1.);
        let shift = bias.as_ref().map(|b| b[c]).unwrap_or(0.);
        for &i in offsets {
            output[i] = (data[i] - means[c]) * invstd * scale + shift;
        }
    }

    let (save_mean, save_invstd) = if training {
        let invstd: Vec<f32> = vars.iter().map(|v| 1. / (v + eps).sqrt()).collect();
        (means, invstd)
    } else {
        (Vec::new(), Vec::new())
    };
    Ok(BatchNormOutput {
        output: Tensor::from_data(shape, output),
        save_mean,
        save_invstd,
    })
}

fn batch_norm(args: &Args) -> OpResult {
    one(batch_norm_impl(args)?.output)
}

fn native_batch_norm(args: &Args) -> OpResult {
    let BatchNormOutput {
        output,
        save_mean,
        save_invstd,
    } = batch_norm_impl(args)?;
    many([
        output.into(),
        Tensor::from_data(&[save_mean.len()], save_mean).into(),
        Tensor::from_data(&[save_invstd.len()], save_invstd).into(),
    ])
}

/// Loss reduction modes.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Reduction {
    None,
    Mean,
    Sum,
}

impl Reduction {
    fn from_code(code: i64) -> Result<Reduction, OpError> {
        match code {
            0 => Ok(Reduction::None),
            1 => Ok(Reduction::Mean),
            2 => Ok(Reduction::Sum),
            _ => Err(OpError::InvalidValue("Invalid reduction")),
        }
    }
}

/// Validated inputs of a negative log likelihood loss.
struct NllLoss {
    /// Log-probabilities as `[batch, classes]`.
    input: Vec<f32>,
    batch: usize,
    classes: usize,
    has_batch_dim: bool,

    /// Target class of each batch item, or `None` if it is ignored.
    targets: Vec<Option<usize>>,

    /// Weight of each batch item's target class.
    weights: Vec<f32>,
    reduction: Reduction,
}

impl NllLoss {
    fn from_args(args: &Args) -> Result<NllLoss, OpError> {
        let input = float_arg(args, "self")?;
        let target = int_arg(args, "target")?;
        if input.ndim() == 0 || input.ndim() > 2 {
            return Err(OpError::InvalidValue("Input must be 1D or 2D"));
        }
        if target.ndim() > 1 {
            return Err(OpError::InvalidValue("Target must be 0D or 1D"));
        }
        let no_batch_dim = input.ndim() == 1 && target.ndim() == 0;
        if !no_batch_dim && target.shape().first() != Some(&input.shape()[0]) {
            return Err(OpError::IncompatibleInputShapes(
                "Input and target batch sizes must match",
            ));
        }
        let classes = input.shape()[input.ndim() - 1];
        let class_weights = match opt_float_arg(args, "weight")? {
            Some(weight) if weight.ndim() > 1 || weight.len() != classes => {
                return Err(OpError::IncompatibleInputShapes(
                    "Weight must have one element per class",
                ))
            }
            Some(weight) => weight.to_vec(),
            None => vec![1.; classes],
        };
        let reduction = Reduction::from_code(args.int("reduction")?)?;
        let ignore_index = args.int("ignore_index")?;

        let mut targets = Vec::with_capacity(target.len());
        let mut weights = Vec::with_capacity(target.len());
        for &t in target.iter() {
            if t as i64 == ignore_index {
                targets.push(None);
                weights.push(0.);
                continue;
            }
            if t < 0 || t as usize >= classes {
                return Err(OpError::InvalidValue("Target is out of bounds"));
            }
            targets.push(Some(t as usize));
            weights.push(class_weights[t as usize]);
        }

        Ok(NllLoss {
            input: input.to_vec(),
            batch: targets.len(),
            classes,
            has_batch_dim: input.ndim() == 2,
            targets,
            weights,
            reduction,
        })
    }

    fn total_weight(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Shape of the loss before reduction.
    fn unreduced_shape(&self) -> Vec<usize> {
        if self.has_batch_dim {
            vec![self.batch]
        } else {
            Vec::new()
        }
    }

    fn forward(&self) -> (Tensor<f32>, Tensor<f32>) {
        let losses: Vec<f32> = (0..self.batch)
            .map(|b| match self.targets[b] {
                Some(t) => -self.weights[b] * self.input[b * self.classes + t],
                None => 0.,
            })
            .collect();
        let total_weight = self.total_weight();
        let output = match self.reduction {
            Reduction::None => Tensor::from_data(&self.unreduced_shape(), losses),
            Reduction::Sum => Tensor::from_scalar(losses.iter().sum()),
            Reduction::Mean => Tensor::from_scalar(losses.iter().sum::<f32>() / total_weight),
        };
        (output, Tensor::from_scalar(total_weight))
    }

    fn backward(&self, grad_output: &Tensor<f32>) -> Result<Vec<f32>, OpError> {
        let grads: Vec<f32> = if self.reduction == Reduction::None && self.has_batch_dim {
            if grad_output.shape() != [self.batch] {
                return Err(OpError::IncompatibleInputShapes(
                    "Gradient must have the shape of the loss",
                ));
            }
            grad_output.to_vec()
        } else {
            if grad_output.len() != 1 {
                return Err(OpError::IncompatibleInputShapes(
                    "Gradient must have a single element",
                ));
            }
            let mut g = grad_output.to_vec()[0];
            if self.reduction == Reduction::Mean {
                g /= self.total_weight();
            }
            vec![g; self.batch]
        };

        let mut grad_input = vec![0.; self.input.len()];
        for b in 0..self.batch {
            if let Some(t) = self.targets[b] {
                grad_input[b * self.classes + t] = -self.weights[b] * grads[b];
            }
        }
        Ok(grad_input)
    }
}

fn nll_loss_forward(args: &Args) -> OpResult {
    let (output, total_weight) = NllLoss::from_args(args)?.forward();
    many([output.into(), total_weight.into()])
}

fn nll_loss_backward(args: &Args) -> OpResult {
    let loss = NllLoss::from_args(args)?;
    let total_weight = float_arg(args, "total_weight")?;
    if total_weight.len() != 1 {
        return Err(OpError::IncompatibleInputShapes(
            "Total weight must have a single element",
        ));
    }
    let grad_input = loss.backward(&float_arg(args, "grad_output")?)?;
    let input = args.tensor("self")?;
    one(Tensor::from_data(input.shape(), grad_input))
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::_softmax", |args: &Args| softmax_half_to_float(args, false));
    table.add("aten::_log_softmax", |args: &Args| softmax_half_to_float(args, true));
    table.add("aten::softmax.int", |args: &Args| softmax_op(args, false));
    table.add("aten::log_softmax.int", |args: &Args| softmax_op(args, true));
    table.add("aten::_softmax_backward_data", |args: &Args| {
        softmax_backward(args, false)
    });
    table.add("aten::_log_softmax_backward_data", |args: &Args| {
        softmax_backward(args, true)
    });
    table.add("aten::layer_norm", layer_norm);
    table.add("aten::native_layer_norm", native_layer_norm);
    table.add("aten::batch_norm", batch_norm);
    table.add("aten::native_batch_norm", native_batch_norm);
    table.add("aten::nll_loss_forward", nll_loss_forward);
    table.add("aten::nll_loss_backward", nll_loss_backward);
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;

    use super::{lanes, log_softmax, softmax};

    #[test]
    fn test_lanes() {
        assert_eq!(lanes(&[2, 3], 1), vec![vec![0, 1, 2], vec![3, 4, 5]]);
        assert_eq!(lanes(&[2, 3], 0), vec![vec![0, 3], vec![1, 4], vec![2, 5]]);
        assert_eq!(lanes(&[0, 3], 0), vec![Vec::<usize>::new(); 3]);
        assert_eq!(lanes(&[], 0), vec![vec![0]]);
    }

    #[test]
    fn test_softmax() {
        let input = Tensor::from_data(&[2, 2], vec![0., 0., 1., 3.]);
        let output = softmax(&input, 1);
        let expected = [0.5, 0.5, 0.11920292, 0.880797];
        for (x, y) in output.iter().zip(expected) {
            assert!((x - y).abs() < 1e-5);
        }

        let log_output = log_softmax(&input, 1);
        for (x, y) in log_output.iter().zip(output.iter()) {
            assert!((x.exp() - y).abs() < 1e-5);
        }

        let scalar = softmax(&Tensor::from_scalar(3.), 0);
        assert_eq!(scalar.to_vec(), vec![1.]);
    }
}
