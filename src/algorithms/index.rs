use super::binary::broadcast;
use super::{numel, resolve_dim, resolve_index, ShapeError};

/// Shape of selecting a single index along a dimension, which removes that
/// dimension.
pub fn select(shape: &[usize], dim: i64, index: i64) -> Result<Vec<usize>, ShapeError> {
    if shape.is_empty() {
        return Err(ShapeError::IncorrectRank(
            "select() cannot be applied to a 0-dim tensor",
        ));
    }
    let dim = resolve_dim(dim, shape.len())?;
    resolve_index(index, shape[dim])?;

    let mut output = shape.to_vec();
    output.remove(dim);
    Ok(output)
}

/// Shape of slicing `start..end` with a step along a dimension.
///
/// Negative `start` and `end` count from the end of the dimension and both
/// are clamped to its bounds, so out-of-range slices produce empty outputs
/// rather than errors.
pub fn slice(
    shape: &[usize],
    dim: i64,
    start: Option<i64>,
    end: Option<i64>,
    step: i64,
) -> Result<Vec<usize>, ShapeError> {
    if shape.is_empty() {
        return Err(ShapeError::IncorrectRank(
            "slice() cannot be applied to a 0-dim tensor",
        ));
    }
    if step <= 0 {
        return Err(ShapeError::InvalidValue("slice step must be positive"));
    }
    let dim = resolve_dim(dim, shape.len())?;
    let size = shape[dim] as i64;

    let clamp_index = |index: i64| {
        let index = if index < 0 { index + size } else { index };
        index.clamp(0, size)
    };
    let start = clamp_index(start.unwrap_or(0));
    let end = clamp_index(end.unwrap_or(size)).max(start);

    let len = if end == start {
        0
    } else {
        (end - start - 1) / step + 1
    };

    let mut output = shape.to_vec();
    output[dim] = len as usize;
    Ok(output)
}

/// Shape of gathering values along a dimension using an index tensor.
///
/// The output has the index's shape. Outside of `dim`, the index may not be
/// larger than the input.
pub fn gather(shape: &[usize], dim: i64, index: &[usize]) -> Result<Vec<usize>, ShapeError> {
    if index.len().max(1) != shape.len().max(1) {
        return Err(ShapeError::IncorrectRank(
            "index tensor must have the same number of dimensions as input tensor",
        ));
    }
    let dim = resolve_dim(dim, shape.len())?;

    let index_fits = shape
        .iter()
        .zip(index)
        .enumerate()
        .all(|(d, (&size, &index_size))| d == dim || index_size <= size);
    if !index_fits {
        return Err(ShapeError::IncompatibleShapes(
            "index size must not exceed input size outside of gather dim",
        ));
    }

    Ok(index.to_vec())
}

/// Shape of selecting entries along a dimension using a vector of indices.
pub fn index_select(shape: &[usize], dim: i64, index: &[usize]) -> Result<Vec<usize>, ShapeError> {
    if index.len() > 1 {
        return Err(ShapeError::IncorrectRank(
            "index_select(): index must be a vector or scalar",
        ));
    }
    let dim = resolve_dim(dim, shape.len())?;
    let n_indices = numel(index);

    if shape.is_empty() {
        if n_indices != 1 {
            return Err(ShapeError::InvalidValue(
                "index_select(): index to scalar can have only 1 value",
            ));
        }
        return Ok(Vec::new());
    }

    let mut output = shape.to_vec();
    output[dim] = n_indices;
    Ok(output)
}

/// Shape of indexing a tensor with a list of optional index tensors.
///
/// Index tensors are broadcast together. If they index adjacent dimensions,
/// the broadcast shape replaces those dimensions in place. Otherwise it is
/// moved to the front of the output. `None` entries keep the corresponding
/// dimension.
pub fn advanced_index(
    shape: &[usize],
    indices: &[Option<Vec<usize>>],
) -> Result<Vec<usize>, ShapeError> {
    if indices.len() > shape.len() {
        return Err(ShapeError::IncorrectRank(
            "too many indices for tensor",
        ));
    }

    let indexed: Vec<usize> = indices
        .iter()
        .enumerate()
        .filter_map(|(i, index)| index.as_ref().map(|_| i))
        .collect();
    let (Some(&first), Some(&last)) = (indexed.first(), indexed.last()) else {
        return Ok(shape.to_vec());
    };

    let mut index_shape = Vec::new();
    for index in indices.iter().flatten() {
        index_shape = broadcast(&index_shape, index).map_err(|_| {
            ShapeError::IncompatibleShapes("index tensors could not be broadcast together")
        })?;
    }

    let adjacent = last - first + 1 == indexed.len();
    let kept_dims = shape
        .iter()
        .enumerate()
        .filter(|(d, _)| indices.get(*d).map(|index| index.is_none()).unwrap_or(true))
        .map(|(_, &size)| size);

    let output = if adjacent {
        let mut output = shape[..first].to_vec();
        output.extend(index_shape);
        output.extend_from_slice(&shape[last + 1..]);
        output
    } else {
        let mut output = index_shape;
        output.extend(kept_dims);
        output
    };
    Ok(output)
}

/// Shape of padding a tensor with `(before, after)` pairs, starting from the
/// last dimension.
///
/// Negative pads remove elements.
pub fn pad(shape: &[usize], pads: &[i64]) -> Result<Vec<usize>, ShapeError> {
    if pads.len() % 2 != 0 {
        return Err(ShapeError::InvalidValue(
            "padding length must be divisible by 2",
        ));
    }
    if pads.len() / 2 > shape.len() {
        return Err(ShapeError::InvalidValue(
            "padding length too large for input rank",
        ));
    }

    let mut output = shape.to_vec();
    for (i, pair) in pads.chunks(2).enumerate() {
        let dim = shape.len() - 1 - i;
        let padded = output[dim] as i64 + pair[0] + pair[1];
        if padded < 0 {
            return Err(ShapeError::InvalidValue(
                "padded dimension would have negative size",
            ));
        }
        output[dim] = padded as usize;
    }
    Ok(output)
}

/// Fill modes for [`pad_with_mode`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PadMode {
    Constant,
    Reflect,
    Replicate,
    Circular,
}

impl PadMode {
    /// Parse a mode name as used by `aten::pad`.
    pub fn from_name(name: &str) -> Result<PadMode, ShapeError> {
        match name {
            "constant" => Ok(PadMode::Constant),
            "reflect" => Ok(PadMode::Reflect),
            "replicate" => Ok(PadMode::Replicate),
            "circular" => Ok(PadMode::Circular),
            _ => Err(ShapeError::InvalidValue("unrecognized padding mode")),
        }
    }
}

/// Shape of padding a tensor using `mode`.
///
/// Non-constant modes pad at most 3 trailing dims and need 1 or 2 unpadded
/// leading dims. Reflect pads must be smaller than the padded dim, circular
/// pads no larger, and replicate needs a non-empty dim.
pub fn pad_with_mode(
    shape: &[usize],
    pads: &[i64],
    mode: PadMode,
) -> Result<Vec<usize>, ShapeError> {
    let output = pad(shape, pads)?;
    if mode == PadMode::Constant {
        return Ok(output);
    }

    let n_padded = pads.len() / 2;
    if n_padded > 3 || !(n_padded + 1..=n_padded + 2).contains(&shape.len()) {
        return Err(ShapeError::IncorrectRank(
            "non-constant padding needs 1 or 2 unpadded leading dims",
        ));
    }
    for (i, pair) in pads.chunks(2).enumerate() {
        let size = shape[shape.len() - 1 - i] as i64;
        let (before, after) = (pair[0].max(0), pair[1].max(0));
        let fits = match mode {
            PadMode::Reflect => before < size && after < size,
            PadMode::Circular => before <= size && after <= size,
            PadMode::Replicate => size > 0,
            PadMode::Constant => true,
        };
        if !fits {
            return Err(ShapeError::InvalidValue(
                "padding is too large for the input dim",
            ));
        }
    }
    Ok(output)
}

/// Shape of looking up rows of a 2D embedding table.
pub fn embedding(weight: &[usize], indices: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let &[_, embedding_dim] = weight else {
        return Err(ShapeError::IncorrectRank("embedding weight must be 2-D"));
    };
    let mut output = indices.to_vec();
    output.push(embedding_dim);
    Ok(output)
}

/// Shapes of the values and indices returned by selecting the top `k`
/// entries along a dimension.
pub fn topk(shape: &[usize], k: i64, dim: i64) -> Result<(Vec<usize>, Vec<usize>), ShapeError> {
    let dim = resolve_dim(dim, shape.len())?;
    let size = shape.get(dim).copied().unwrap_or(1);
    if k < 0 || k as usize > size {
        return Err(ShapeError::InvalidValue(
            "selected index k out of range",
        ));
    }

    let mut output = shape.to_vec();
    if !output.is_empty() {
        output[dim] = k as usize;
    }
    Ok((output.clone(), output))
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{
        advanced_index, embedding, gather, index_select, pad, pad_with_mode, select, slice,
        topk, PadMode,
    };

    #[test]
    fn test_select() {
        assert_eq!(select(&[2, 3, 4], 1, 2), Ok(vec![2, 4]));
        assert_eq!(select(&[2, 3, 4], -1, -4), Ok(vec![2, 3]));
        assert!(select(&[2, 3, 4], 1, 3).is_err());
        assert!(select(&[2, 3, 4], 3, 0).is_err());
        assert!(select(&[], 0, 0).is_err());
    }

    #[test]
    fn test_slice() {
        #[derive(Debug)]
        struct Case {
            start: Option<i64>,
            end: Option<i64>,
            step: i64,
            expected: Option<usize>,
        }

        let cases = [
            Case {
                start: None,
                end: None,
                step: 1,
                expected: Some(10),
            },
            Case {
                start: Some(2),
                end: Some(7),
                step: 2,
                expected: Some(3),
            },
            Case {
                start: Some(-3),
                end: None,
                step: 1,
                expected: Some(3),
            },
            Case {
                start: Some(0),
                end: Some(i64::MAX),
                step: 3,
                expected: Some(4),
            },
            Case {
                start: Some(8),
                end: Some(2),
                step: 1,
                expected: Some(0),
            },
            Case {
                start: Some(20),
                end: Some(30),
                step: 1,
                expected: Some(0),
            },
            Case {
                start: Some(-20),
                end: Some(2),
                step: 1,
                expected: Some(2),
            },
            Case {
                start: None,
                end: None,
                step: 0,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let output = slice(&[4, 10], 1, case.start, case.end, case.step);
            assert_eq!(output.ok(), case.expected.map(|len| vec![4, len]));
        });

        assert!(slice(&[], 0, None, None, 1).is_err());
        assert!(slice(&[4, 10], 2, None, None, 1).is_err());
    }

    #[test]
    fn test_gather() {
        assert_eq!(gather(&[4, 5], 0, &[7, 5]), Ok(vec![7, 5]));
        assert_eq!(gather(&[4, 5], 1, &[2, 3]), Ok(vec![2, 3]));
        assert_eq!(gather(&[], 0, &[]), Ok(vec![]));
        assert!(gather(&[4, 5], 0, &[2, 6]).is_err());
        assert!(gather(&[4, 5], 0, &[2]).is_err());
        assert!(gather(&[4, 5], 2, &[2, 3]).is_err());
    }

    #[test]
    fn test_index_select() {
        assert_eq!(index_select(&[4, 5], 1, &[3]), Ok(vec![4, 3]));
        assert_eq!(index_select(&[4, 5], 0, &[]), Ok(vec![1, 5]));
        assert_eq!(index_select(&[], 0, &[1]), Ok(vec![]));
        assert!(index_select(&[], 0, &[2]).is_err());
        assert!(index_select(&[4, 5], 0, &[2, 2]).is_err());
        assert!(index_select(&[4, 5], -3, &[2]).is_err());
    }

    #[test]
    fn test_advanced_index() {
        #[derive(Debug)]
        struct Case {
            shape: Vec<usize>,
            indices: Vec<Option<Vec<usize>>>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                shape: [2].into(),
                indices: [Some([4].into())].into(),
                expected: Some([4].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4].into()), Some([4].into())].into(),
                expected: Some([4].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4].into()), Some([6, 4].into())].into(),
                expected: Some([6, 4].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4].into()), None].into(),
                expected: Some([4, 3].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4, 5, 6].into()), Some([1, 5, 1].into())].into(),
                expected: Some([4, 5, 6].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4].into())].into(),
                expected: Some([4, 3].into()),
            },
            Case {
                shape: [2, 3, 4].into(),
                indices: [None, Some([5].into())].into(),
                expected: Some([2, 5, 4].into()),
            },
            // Non-adjacent index tensors move the indexed dims to the front.
            Case {
                shape: [2, 3, 4].into(),
                indices: [Some([5].into()), None, Some([5].into())].into(),
                expected: Some([5, 3].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [None, None].into(),
                expected: Some([2, 3].into()),
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4].into()), Some([4].into()), Some([4].into())].into(),
                expected: None,
            },
            Case {
                shape: [2, 3].into(),
                indices: [Some([4].into()), Some([5].into())].into(),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(
                advanced_index(&case.shape, &case.indices).ok(),
                case.expected
            );
        });
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad(&[2, 3], &[1, 2]), Ok(vec![2, 6]));
        assert_eq!(pad(&[2, 3], &[1, 2, 3, 4]), Ok(vec![9, 6]));
        assert_eq!(pad(&[2, 3], &[-1, -1]), Ok(vec![2, 1]));
        assert_eq!(pad(&[2, 3], &[]), Ok(vec![2, 3]));
        assert!(pad(&[2], &[1]).is_err());
        assert!(pad(&[2], &[1, 1, 1, 1]).is_err());
        assert!(pad(&[2, 3], &[-2, -2]).is_err());
    }

    #[test]
    fn test_pad_with_mode() {
        #[derive(Debug)]
        struct Case {
            shape: Vec<usize>,
            pads: Vec<i64>,
            mode: PadMode,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                shape: [2, 3].into(),
                pads: [1, 1].into(),
                mode: PadMode::Reflect,
                expected: Some([2, 5].into()),
            },
            Case {
                shape: [1, 2, 3].into(),
                pads: [3, 3].into(),
                mode: PadMode::Circular,
                expected: Some([1, 2, 9].into()),
            },
            Case {
                shape: [1, 2, 3].into(),
                pads: [2, 2, 1, 1].into(),
                mode: PadMode::Replicate,
                expected: Some([1, 4, 7].into()),
            },
            Case {
                shape: [2, 3].into(),
                pads: [3, 0].into(),
                mode: PadMode::Reflect,
                expected: None,
            },
            Case {
                shape: [2, 3].into(),
                pads: [0, 4].into(),
                mode: PadMode::Circular,
                expected: None,
            },
            Case {
                shape: [3].into(),
                pads: [1, 1].into(),
                mode: PadMode::Reflect,
                expected: None,
            },
            Case {
                shape: [3].into(),
                pads: [1, 1].into(),
                mode: PadMode::Constant,
                expected: Some([5].into()),
            },
        ];

        cases.test_each(|case| {
            assert_eq!(
                pad_with_mode(&case.shape, &case.pads, case.mode).ok(),
                case.expected
            );
        });
        assert!(PadMode::from_name("wrap").is_err());
    }

    #[test]
    fn test_embedding() {
        assert_eq!(embedding(&[10, 4], &[2, 3]), Ok(vec![2, 3, 4]));
        assert_eq!(embedding(&[10, 4], &[]), Ok(vec![4]));
        assert!(embedding(&[10], &[2]).is_err());
    }

    #[test]
    fn test_topk() {
        assert_eq!(topk(&[2, 3], 2, -1), Ok((vec![2, 2], vec![2, 2])));
        assert_eq!(topk(&[2, 3], 0, 0), Ok((vec![0, 3], vec![0, 3])));
        assert_eq!(topk(&[], 1, 0), Ok((vec![], vec![])));
        assert!(topk(&[2, 3], 4, -1).is_err());
        assert!(topk(&[2, 3], -1, -1).is_err());
        assert!(topk(&[2, 3], 1, 2).is_err());
    }
}
