use super::{numel, resolve_dim, ShapeError};

/// Shape of a view or reshape of a tensor to a given list of sizes.
///
/// One size may be -1, in which case it is inferred from the number of
/// elements in the input.
pub fn view(shape: &[usize], sizes: &[i64]) -> Result<Vec<usize>, ShapeError> {
    let len = numel(shape);
    let mut inferred_dim = None;
    let mut known_len: usize = 1;

    for (i, &size) in sizes.iter().enumerate() {
        match size {
            -1 => {
                if inferred_dim.replace(i).is_some() {
                    return Err(ShapeError::InvalidValue("only one dimension can be inferred"));
                }
            }
            size if size >= 0 => {
                known_len = known_len
                    .checked_mul(size as usize)
                    .ok_or(ShapeError::InvalidValue("shape size overflows"))?;
            }
            _ => return Err(ShapeError::InvalidValue("invalid shape dimension")),
        }
    }

    let inferred_size = match inferred_dim {
        None if known_len == len => None,
        Some(_) if known_len > 0 && len % known_len == 0 => Some(len / known_len),
        _ => {
            return Err(ShapeError::IncompatibleShapes(
                "shape is invalid for input size",
            ))
        }
    };

    let output = sizes
        .iter()
        .map(|&size| match size {
            -1 => inferred_size.unwrap_or(0),
            size => size as usize,
        })
        .collect();
    Ok(output)
}

/// Shape of flattening the dimensions `start_dim..=end_dim` into one.
pub fn flatten(shape: &[usize], start_dim: i64, end_dim: i64) -> Result<Vec<usize>, ShapeError> {
    let start = resolve_dim(start_dim, shape.len())?;
    let end = resolve_dim(end_dim, shape.len())?;
    if start > end {
        return Err(ShapeError::InvalidValue(
            "flatten() has invalid args: start_dim cannot come after end_dim",
        ));
    }
    if shape.is_empty() {
        return Ok(vec![1]);
    }

    let mut output = shape[..start].to_vec();
    output.push(numel(&shape[start..=end]));
    output.extend_from_slice(&shape[end + 1..]);
    Ok(output)
}

/// Shape of permuting the dimensions of a tensor.
///
/// `dims` must contain each dimension of the input exactly once.
pub fn permute(shape: &[usize], dims: &[i64]) -> Result<Vec<usize>, ShapeError> {
    if dims.len() != shape.len() {
        return Err(ShapeError::IncorrectRank(
            "number of dims in permutation must match input rank",
        ));
    }

    let mut seen = vec![false; shape.len()];
    let mut output = Vec::with_capacity(shape.len());
    for &dim in dims {
        let dim = resolve_dim(dim, shape.len())?;
        if seen[dim] {
            return Err(ShapeError::InvalidValue("repeated dim in permutation"));
        }
        seen[dim] = true;
        output.push(shape[dim]);
    }
    Ok(output)
}

/// Shape of swapping two dimensions of a tensor.
pub fn transpose(shape: &[usize], dim0: i64, dim1: i64) -> Result<Vec<usize>, ShapeError> {
    let dim0 = resolve_dim(dim0, shape.len())?;
    let dim1 = resolve_dim(dim1, shape.len())?;
    let mut output = shape.to_vec();
    if !output.is_empty() {
        output.swap(dim0, dim1);
    }
    Ok(output)
}

/// Shape of transposing a tensor with at most 2 dimensions.
pub fn transpose_2d(shape: &[usize]) -> Result<Vec<usize>, ShapeError> {
    match *shape {
        [] | [_] => Ok(shape.to_vec()),
        [rows, cols] => Ok(vec![cols, rows]),
        _ => Err(ShapeError::IncorrectRank(
            "t() expects a tensor with <= 2 dimensions",
        )),
    }
}

/// Shape of removing all size-1 dimensions.
pub fn squeeze(shape: &[usize]) -> Vec<usize> {
    shape.iter().copied().filter(|&size| size != 1).collect()
}

/// Shape of removing a dimension if it has size 1.
pub fn squeeze_dim(shape: &[usize], dim: i64) -> Result<Vec<usize>, ShapeError> {
    let dim = resolve_dim(dim, shape.len())?;
    let output = shape
        .iter()
        .enumerate()
        .filter(|&(i, &size)| i != dim || size != 1)
        .map(|(_, &size)| size)
        .collect();
    Ok(output)
}

/// Shape of inserting a size-1 dimension.
///
/// `dim` is resolved against the rank of the output.
pub fn unsqueeze(shape: &[usize], dim: i64) -> Result<Vec<usize>, ShapeError> {
    let dim = resolve_dim(dim, shape.len() + 1)?;
    let mut output = shape.to_vec();
    output.insert(dim, 1);
    Ok(output)
}

/// Returns true for 1D tensors with no elements, which concatenation skips
/// regardless of the other inputs' ranks.
fn is_skipped_in_cat(shape: &[usize]) -> bool {
    shape.len() == 1 && shape[0] == 0
}

/// Shape of concatenating tensors along a dimension.
pub fn cat(shapes: &[Vec<usize>], dim: i64) -> Result<Vec<usize>, ShapeError> {
    if shapes.is_empty() {
        return Err(ShapeError::InvalidValue("expected a non-empty list of tensors"));
    }
    if shapes.iter().any(|shape| shape.is_empty()) {
        return Err(ShapeError::IncorrectRank(
            "zero-dimensional tensor cannot be concatenated",
        ));
    }

    let mut inputs = shapes.iter().filter(|shape| !is_skipped_in_cat(shape));
    let Some(first) = inputs.next() else {
        return Ok(vec![0]);
    };
    let dim = resolve_dim(dim, first.len())?;

    let mut output = first.clone();
    for shape in inputs {
        if shape.len() != first.len() {
            return Err(ShapeError::IncorrectRank(
                "tensors must have the same number of dimensions",
            ));
        }
        let sizes_match = first
            .iter()
            .zip(shape)
            .enumerate()
            .all(|(i, (a, b))| i == dim || a == b);
        if !sizes_match {
            return Err(ShapeError::IncompatibleShapes(
                "sizes of tensors must match except in the concatenation dimension",
            ));
        }
        output[dim] += shape[dim];
    }

    Ok(output)
}
