use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{
    broadcast_data, broadcast_shapes, float_arg, int_arg, many, one, ravel, resolve_axis,
    resolve_index, to_int, unravel, Args, OpResult, OpTable,
};

fn select(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    if input.ndim() == 0 {
        return Err(OpError::InvalidValue("select cannot be applied to a 0-dim tensor"));
    }
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    let index = resolve_index(args.int("index")?, input.shape()[axis])?;

    let mut out_shape = input.shape().to_vec();
    out_shape.remove(axis);
    let data = input.to_vec();
    let output: Vec<f32> = (0..out_shape.iter().product())
        .map(|offset| {
            let mut src = unravel(offset, &out_shape);
            src.insert(axis, index);
            data[ravel(&src, input.shape())]
        })
        .collect();
    one(Tensor::from_data(&out_shape, output))
}

/// Resolve slice bounds for a dim of a given size, returning the start
/// position and number of elements.
fn slice_range(
    size: usize,
    start: Option<i64>,
    end: Option<i64>,
    step: i64,
) -> Result<(usize, usize), OpError> {
    if step <= 0 {
        return Err(OpError::InvalidValue("Slice step must be positive"));
    }
    let size = size as i64;
    let clamp = |pos: i64| {
        let pos = if pos < 0 { pos + size } else { pos };
        pos.clamp(0, size)
    };
    let start = clamp(start.unwrap_or(0));
    let end = clamp(end.unwrap_or(size));
    let len = if end > start {
        (end - start + step - 1) / step
    } else {
        0
    };
    Ok((start as usize, len as usize))
}

fn slice(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    if input.ndim() == 0 {
        return Err(OpError::InvalidValue("slice cannot be applied to a 0-dim tensor"));
    }
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    let step = args.int("step")?;
    let (start, len) = slice_range(
        input.shape()[axis],
        args.opt_int("start")?,
        args.opt_int("end")?,
        step,
    )?;

    let mut out_shape = input.shape().to_vec();
    out_shape[axis] = len;
    let data = input.to_vec();
    let output: Vec<f32> = (0..out_shape.iter().product())
        .map(|offset| {
            let mut src = unravel(offset, &out_shape);
            src[axis] = start + src[axis] * step as usize;
            data[ravel(&src, input.shape())]
        })
        .collect();
    one(Tensor::from_data(&out_shape, output))
}

fn gather(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let index = int_arg(args, "index")?;
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    if index.ndim().max(1) != input.ndim().max(1) {
        return Err(OpError::IncompatibleInputShapes(
            "Index must have the same number of dims as input",
        ));
    }
    let in_shape = input.shape();
    let fits = index
        .shape()
        .iter()
        .enumerate()
        .all(|(d, &size)| d == axis || size <= in_shape.get(d).copied().unwrap_or(1));
    if !fits {
        return Err(OpError::IncompatibleInputShapes(
            "Index size must not exceed input size outside of the gathered dim",
        ));
    }

    // Scalars are treated as having a single element along each dim.
    let ndim = input.ndim().max(index.ndim());
    let padded = |shape: &[usize]| -> Vec<usize> {
        if shape.is_empty() {
            vec![1; ndim]
        } else {
            shape.to_vec()
        }
    };
    let src_shape = padded(in_shape);
    let index_shape = padded(index.shape());

    let axis_size = src_shape.get(axis).copied().unwrap_or(1);
    let data = input.to_vec();
    let mut out = Vec::with_capacity(index.len());
    for (offset, &i) in index.iter().enumerate() {
        if i < 0 || i as usize >= axis_size {
            return Err(OpError::InvalidValue("Index is out of bounds"));
        }
        let mut src = unravel(offset, &index_shape);
        if let Some(pos) = src.get_mut(axis) {
            *pos = i as usize;
        }
        out.push(data[ravel(&src, &src_shape)]);
    }
    one(Tensor::from_data(index.shape(), out))
}

fn index_select(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let index = int_arg(args, "index")?;
    if index.ndim() > 1 {
        return Err(OpError::InvalidValue("Index must be a scalar or vector"));
    }
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;
    if input.ndim() == 0 {
        return one(input);
    }

    let axis_size = input.shape()[axis];
    let positions = index
        .iter()
        .map(|&i| resolve_index(i as i64, axis_size))
        .collect::<Result<Vec<_>, _>>()?;
    let mut out_shape = input.shape().to_vec();
    out_shape[axis] = positions.len();
    let data = input.to_vec();
    let output: Vec<f32> = (0..out_shape.iter().product())
        .map(|offset| {
            let mut src = unravel(offset, &out_shape);
            src[axis] = positions[src[axis]];
            data[ravel(&src, input.shape())]
        })
        .collect();
    one(Tensor::from_data(&out_shape, output))
}

/// Result of resolving advanced indices against a tensor.
struct IndexedElements {
    /// Shape of the selected elements.
    shape: Vec<usize>,

    /// Offset in the source tensor of each selected element.
    offsets: Vec<usize>,
}

/// Resolve the elements of a tensor with shape `shape` selected by a list
/// of optional index tensors, one per leading dim.
///
/// The index tensors are broadcast together. If the indexed dims are
/// adjacent, the broadcast shape replaces them in the output. Otherwise it
/// is moved to the front.
fn indexed_elements(
    shape: &[usize],
    indices: &[Option<Tensor<i32>>],
) -> Result<IndexedElements, OpError> {
    if indices.len() > shape.len() {
        return Err(OpError::InvalidValue("Too many indices for tensor"));
    }
    let indexed_dims: Vec<usize> = indices
        .iter()
        .enumerate()
        .filter_map(|(d, index)| index.as_ref().map(|_| d))
        .collect();
    let mut index_shape: Vec<usize> = Vec::new();
    for index in indices.iter().flatten() {
        index_shape = broadcast_shapes(&index_shape, index.shape())
            .ok_or(OpError::IncompatibleInputShapes(
                "Index tensors could not be broadcast together",
            ))?
            .to_vec();
    }
    let index_data: Vec<Option<Vec<i32>>> = indices
        .iter()
        .map(|index| {
            index
                .as_ref()
                .map(|index| broadcast_data(index, &index_shape))
                .transpose()
        })
        .collect::<Result<_, _>>()?;

    let adjacent = indexed_dims.windows(2).all(|w| w[1] == w[0] + 1);
    let front = if adjacent {
        indexed_dims.first().copied().unwrap_or(0)
    } else {
        0
    };
    let kept_dims: Vec<usize> = (0..shape.len())
        .filter(|d| !indexed_dims.contains(d))
        .collect();

    let mut out_shape: Vec<usize> = kept_dims[..front].iter().map(|&d| shape[d]).collect();
    out_shape.extend_from_slice(&index_shape);
    out_shape.extend(kept_dims[front..].iter().map(|&d| shape[d]));

    let index_ndim = index_shape.len();
    let len: usize = out_shape.iter().product();
    let mut offsets = Vec::with_capacity(len);
    for offset in 0..len {
        let out_index = unravel(offset, &out_shape);
        let index_pos = ravel(&out_index[front..front + index_ndim], &index_shape);
        let mut src = vec![0; shape.len()];
        for (i, &d) in kept_dims.iter().enumerate() {
            src[d] = if i < front {
                out_index[i]
            } else {
                out_index[i + index_ndim]
            };
        }
        for &d in &indexed_dims {
            if let Some(data) = &index_data[d] {
                src[d] = resolve_index(data[index_pos] as i64, shape[d])?;
            }
        }
        offsets.push(ravel(&src, shape));
    }

    Ok(IndexedElements {
        shape: out_shape,
        offsets,
    })
}

fn index_tensors(args: &Args, optional: bool) -> Result<Vec<Option<Tensor<i32>>>, OpError> {
    let indices = if optional {
        args.opt_tensors("indices")?
    } else {
        args.tensors("indices")?.into_iter().map(Some).collect()
    };
    Ok(indices.into_iter().map(|index| index.map(to_int)).collect())
}

fn index(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let elements = indexed_elements(input.shape(), &index_tensors(args, true)?)?;
    let data = input.to_vec();
    let output: Vec<f32> = elements.offsets.iter().map(|&offset| data[offset]).collect();
    one(Tensor::from_data(&elements.shape, output))
}

fn index_put(args: &Args, optional_indices: bool) -> OpResult {
    let input = float_arg(args, "self")?;
    let values = float_arg(args, "values")?;
    let accumulate = args.bool("accumulate")?;
    let elements = indexed_elements(input.shape(), &index_tensors(args, optional_indices)?)?;
    let values = broadcast_data(&values, &elements.shape)?;

    let mut data = input.to_vec();
    for (&offset, value) in elements.offsets.iter().zip(values) {
        if accumulate {
            data[offset] += value;
        } else {
            data[offset] = value;
        }
    }
    one(Tensor::from_data(input.shape(), data))
}

fn embedding(args: &Args) -> OpResult {
    let weight = float_arg(args, "weight")?;
    let indices = int_arg(args, "indices")?;
    if weight.ndim() != 2 {
        return Err(OpError::InvalidValue("Embedding weight must be 2D"));
    }
    let [rows, dim] = [weight.shape()[0], weight.shape()[1]];
    let data = weight.to_vec();
    let mut output = Vec::with_capacity(indices.len() * dim);
    for &i in indices.iter() {
        let row = resolve_index(i as i64, rows)?;
        output.extend_from_slice(&data[row * dim..(row + 1) * dim]);
    }
    let mut out_shape = indices.shape().to_vec();
    out_shape.push(dim);
    one(Tensor::from_data(&out_shape, output))
}

fn topk(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let k = args.int("k")?;
    let largest = args.bool("largest")?;
    let axis = resolve_axis(input.ndim(), args.int("dim")?)?;

    let shape: Vec<usize> = if input.ndim() == 0 {
        vec![1]
    } else {
        input.shape().to_vec()
    };
    let axis_size = shape[axis];
    if k < 0 || k as usize > axis_size {
        return Err(OpError::InvalidValue("k is out of range"));
    }
    let k = k as usize;

    let mut out_shape = shape.clone();
    out_shape[axis] = k;
    let data = input.to_vec();
    let n_out: usize = out_shape.iter().product();
    let mut values = vec![0.; n_out];
    let mut indices = vec![0i32; n_out];

    // Iterate over each lane along `axis`.
    let lanes: usize = shape.iter().product::<usize>() / axis_size.max(1);
    let mut lane_shape = shape.clone();
    lane_shape[axis] = 1;
    for lane in 0..lanes {
        let lane_index = unravel(lane, &lane_shape);
        let mut entries: Vec<(usize, f32)> = (0..axis_size)
            .map(|i| {
                let mut src = lane_index.clone();
                src[axis] = i;
                (i, data[ravel(&src, &shape)])
            })
            .collect();
        entries.sort_by(|a, b| {
            let ord = a.1.total_cmp(&b.1);
            if largest {
                ord.reverse()
            } else {
                ord
            }
        });
        for (j, &(i, x)) in entries.iter().take(k).enumerate() {
            let mut dst = lane_index.clone();
            dst[axis] = j;
            let offset = ravel(&dst, &out_shape);
            values[offset] = x;
            indices[offset] = i as i32;
        }
    }

    if input.ndim() == 0 {
        out_shape.clear();
    }
    many([
        Tensor::from_data(&out_shape, values).into(),
        Tensor::from_data(&out_shape, indices).into(),
    ])
}

/// How [`pad_tensor`] fills the elements it adds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PadMode {
    Constant(f32),
    Reflect,
    Replicate,
    Circular,
}

impl PadMode {
    fn from_args(args: &Args) -> Result<PadMode, OpError> {
        match args.str("mode")?.as_str() {
            "constant" => Ok(PadMode::Constant(
                args.opt_float("value")?.unwrap_or(0.) as f32,
            )),
            "reflect" => Ok(PadMode::Reflect),
            "replicate" => Ok(PadMode::Replicate),
            "circular" => Ok(PadMode::Circular),
            _ => Err(OpError::InvalidValue("Unrecognized padding mode")),
        }
    }

    /// Map a position in a padded dim to a source position in `0..size`,
    /// or `None` if the element takes the constant value.
    fn source(self, pos: i64, size: i64) -> Option<i64> {
        if (0..size).contains(&pos) {
            return Some(pos);
        }
        match self {
            PadMode::Constant(_) => None,
            PadMode::Reflect if pos < 0 => Some(-pos),
            PadMode::Reflect => Some(2 * (size - 1) - pos),
            PadMode::Replicate => Some(pos.clamp(0, size - 1)),
            PadMode::Circular => Some(pos.rem_euclid(size)),
        }
    }
}

/// Pad or crop the trailing dims of `input`. `pads` holds a `(before, after)`
/// pair per dim, starting from the last dim.
///
/// Modes other than [`PadMode::Constant`] pad at most 3 dims, and require
/// one or two leading unpadded dims. Reflect pads must be smaller than the
/// dim, and circular pads no larger.
pub fn pad_tensor(
    input: &Tensor<f32>,
    pads: &[i64],
    mode: PadMode,
) -> Result<Tensor<f32>, OpError> {
    if pads.len() % 2 != 0 {
        return Err(OpError::InvalidValue("Padding length must be even"));
    }
    let ndim = input.ndim();
    let n_padded = pads.len() / 2;
    if n_padded > ndim {
        return Err(OpError::InvalidValue("Padding has more pairs than input dims"));
    }
    if !matches!(mode, PadMode::Constant(_))
        && (n_padded > 3 || !(n_padded + 1..=n_padded + 2).contains(&ndim))
    {
        return Err(OpError::UnsupportedValue(
            "Non-constant padding needs 1 or 2 unpadded leading dims",
        ));
    }

    let mut before = vec![0i64; ndim];
    let mut out_shape = Vec::with_capacity(ndim);
    for (d, &size) in input.shape().iter().enumerate() {
        let pair = ndim - 1 - d;
        let (start, end) = if pair < n_padded {
            (pads[pair * 2], pads[pair * 2 + 1])
        } else {
            (0, 0)
        };
        let size = size as i64;
        let new_size = size + start + end;
        if new_size < 0 {
            return Err(OpError::InvalidValue("Padded size is negative"));
        }
        let (start_pad, end_pad) = (start.max(0), end.max(0));
        match mode {
            _ if pair >= n_padded => {}
            PadMode::Reflect if start_pad >= size || end_pad >= size => {
                return Err(OpError::InvalidValue(
                    "Reflect padding must be smaller than the input dim",
                ));
            }
            PadMode::Circular if start_pad > size || end_pad > size => {
                return Err(OpError::InvalidValue(
                    "Circular padding must not exceed the input dim",
                ));
            }
            PadMode::Replicate if size == 0 => {
                return Err(OpError::InvalidValue("Cannot replicate an empty dim"));
            }
            _ => {}
        }
        before[d] = start;
        out_shape.push(new_size as usize);
    }

    let fill = match mode {
        PadMode::Constant(value) => value,
        _ => 0.,
    };
    let data = input.to_vec();
    let output: Vec<f32> = (0..out_shape.iter().product())
        .map(|offset| {
            let out_index = unravel(offset, &out_shape);
            let mut src = Vec::with_capacity(ndim);
            for (d, &i) in out_index.iter().enumerate() {
                let size = input.shape()[d] as i64;
                match mode.source(i as i64 - before[d], size) {
                    Some(pos) => src.push(pos as usize),
                    None => return fill,
                }
            }
            data[ravel(&src, input.shape())]
        })
        .collect();
    Ok(Tensor::from_data(&out_shape, output))
}

fn constant_pad_nd(args: &Args) -> OpResult {
    let input = float_arg(args, "self")?;
    let value = args.float("value")? as f32;
    one(pad_tensor(&input, &args.ints("pad")?, PadMode::Constant(value))?)
}

fn pad(args: &Args) -> OpResult {
    let mode = PadMode::from_args(args)?;
    let input = float_arg(args, "self")?;
    one(pad_tensor(&input, &args.ints("pad")?, mode)?)
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::select.int", select);
    table.add("aten::slice.Tensor", slice);
    table.add("aten::gather", gather);
    table.add("aten::index_select", index_select);
    table.add("aten::index.Tensor", index);
    table.add("aten::index_put", |args: &Args| index_put(args, true));
    table.add("aten::index_put.hacked_twin", |args: &Args| index_put(args, false));
    table.add("aten::embedding", embedding);
    table.add("aten::topk", topk);
    table.add("aten::constant_pad_nd", constant_pad_nd);
    table.add("aten::pad", pad);
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;
    use rten_testing::TestCases;

    use super::{indexed_elements, pad_tensor, slice_range, PadMode};

    #[test]
    fn test_slice_range() {
        #[derive(Debug)]
        struct Case {
            start: Option<i64>,
            end: Option<i64>,
            step: i64,
            expected: Option<(usize, usize)>,
        }

        let cases = [
            Case {
                start: None,
                end: None,
                step: 1,
                expected: Some((0, 5)),
            },
            Case {
                start: Some(-2),
                end: None,
                step: 1,
                expected: Some((3, 2)),
            },
            Case {
                start: Some(1),
                end: Some(5),
                step: 2,
                expected: Some((1, 2)),
            },
            Case {
                start: Some(10),
                end: Some(20),
                step: 1,
                expected: Some((5, 0)),
            },
            Case {
                start: None,
                end: None,
                step: 0,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let result = slice_range(5, case.start, case.end, case.step).ok();
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_indexed_elements() {
        #[derive(Debug)]
        struct Case {
            shape: Vec<usize>,
            indices: Vec<Option<Vec<usize>>>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                shape: [3, 4].into(),
                indices: [Some([2].into())].into(),
                expected: Some([2, 4].into()),
            },
            Case {
                shape: [3, 4].into(),
                indices: [None, Some([5].into())].into(),
                expected: Some([3, 5].into()),
            },
            Case {
                shape: [3, 4, 5].into(),
                indices: [Some([2].into()), Some([2].into())].into(),
                expected: Some([2, 5].into()),
            },
            Case {
                shape: [3, 4, 5].into(),
                indices: [Some([2].into()), None, Some([2].into())].into(),
                expected: Some([2, 4].into()),
            },
            Case {
                shape: [3, 4].into(),
                indices: [Some([2].into()), Some([3].into())].into(),
                expected: None,
            },
            Case {
                shape: [3].into(),
                indices: [Some([1].into()), Some([1].into())].into(),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let indices: Vec<_> = case
                .indices
                .iter()
                .map(|shape| shape.as_ref().map(|shape| Tensor::<i32>::zeros(shape)))
                .collect();
            let result = indexed_elements(&case.shape, &indices).ok().map(|e| e.shape);
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_indexed_elements_offsets() {
        let indices = [Some(Tensor::from_data(&[2], vec![2, -1])), None];
        let elements = indexed_elements(&[3, 2], &indices).unwrap();
        assert_eq!(elements.shape, vec![2, 2]);
        assert_eq!(elements.offsets, vec![4, 5, 4, 5]);
    }

    #[test]
    fn test_constant_pad() {
        let input = Tensor::from_data(&[1, 2], vec![1., 2.]);
        let output = pad_tensor(&input, &[1, 0], PadMode::Constant(0.)).unwrap();
        assert_eq!(output.shape(), &[1, 3]);
        assert_eq!(output.to_vec(), vec![0., 1., 2.]);

        let output = pad_tensor(&input, &[-1, 0], PadMode::Constant(0.)).unwrap();
        assert_eq!(output.to_vec(), vec![2.]);

        assert!(pad_tensor(&input, &[1], PadMode::Constant(0.)).is_err());
        assert!(pad_tensor(&input, &[-2, -1], PadMode::Constant(0.)).is_err());
    }

    #[test]
    fn test_pad_modes() {
        #[derive(Debug)]
        struct Case {
            mode: PadMode,
            pads: [i64; 2],
            expected: Option<Vec<f32>>,
        }

        let cases = [
            Case {
                mode: PadMode::Reflect,
                pads: [2, 1],
                expected: Some(vec![3., 2., 1., 2., 3., 2.]),
            },
            Case {
                mode: PadMode::Replicate,
                pads: [2, 1],
                expected: Some(vec![1., 1., 1., 2., 3., 3.]),
            },
            Case {
                mode: PadMode::Circular,
                pads: [2, 1],
                expected: Some(vec![2., 3., 1., 2., 3., 1.]),
            },
            Case {
                mode: PadMode::Reflect,
                pads: [3, 0],
                expected: None,
            },
            Case {
                mode: PadMode::Circular,
                pads: [0, 4],
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let input = Tensor::from_data(&[1, 3], vec![1., 2., 3.]);
            let result = pad_tensor(&input, &case.pads, case.mode).ok().map(|t| {
                assert_eq!(t.shape(), &[1, 3 + (case.pads[0] + case.pads[1]) as usize]);
                t.to_vec()
            });
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_pad_mode_rank() {
        let input = Tensor::from_data(&[3], vec![1., 2., 3.]);
        assert!(pad_tensor(&input, &[1, 1], PadMode::Reflect).is_err());
        assert!(pad_tensor(&input, &[1, 1], PadMode::Constant(0.)).is_ok());
    }

}
