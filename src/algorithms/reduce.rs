use super::{resolve_dim, ShapeError};

/// Shape of a reduction along a single dimension.
///
/// The reduced dimension is removed, or kept with size 1 if `keepdim` is
/// true.
pub fn reduce_dim(shape: &[usize], dim: i64, keepdim: bool) -> Result<Vec<usize>, ShapeError> {
    reduce_dims(shape, &[dim], keepdim)
}

/// Shape of a reduction along several dimensions.
///
/// An empty list of dims reduces over all dimensions. Each dimension may
/// appear at most once.
pub fn reduce_dims(shape: &[usize], dims: &[i64], keepdim: bool) -> Result<Vec<usize>, ShapeError> {
    let mut reduced = vec![dims.is_empty(); shape.len()];

    for &dim in dims {
        let dim = resolve_dim(dim, shape.len())?;
        if shape.is_empty() {
            continue;
        }
        if reduced[dim] {
            return Err(ShapeError::InvalidValue(
                "dim appears multiple times in the list of dims",
            ));
        }
        reduced[dim] = true;
    }

    let output = shape
        .iter()
        .zip(reduced)
        .filter_map(|(&size, reduced)| match (reduced, keepdim) {
            (false, _) => Some(size),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect();

    Ok(output)
}
