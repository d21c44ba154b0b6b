use super::binary::broadcast;
use super::layout::transpose_2d;
use super::ShapeError;

/// Shape of a matrix multiplication of two 2D tensors.
pub fn mm(a: &[usize], b: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let &[m, k] = a else {
        return Err(ShapeError::IncorrectRank("mm: lhs must be a matrix"));
    };
    let &[k_b, n] = b else {
        return Err(ShapeError::IncorrectRank("mm: rhs must be a matrix"));
    };
    if k != k_b {
        return Err(ShapeError::IncompatibleShapes(
            "mm: lhs columns must match rhs rows",
        ));
    }
    Ok(vec![m, n])
}

/// Shape of a batched matrix multiplication of two 3D tensors.
pub fn bmm(a: &[usize], b: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let &[batch, m, k] = a else {
        return Err(ShapeError::IncorrectRank("bmm: lhs must be a 3D tensor"));
    };
    let &[batch_b, k_b, n] = b else {
        return Err(ShapeError::IncorrectRank("bmm: rhs must be a 3D tensor"));
    };
    if batch != batch_b {
        return Err(ShapeError::IncompatibleShapes(
            "bmm: batch sizes must match",
        ));
    }
    if k != k_b {
        return Err(ShapeError::IncompatibleShapes(
            "bmm: lhs columns must match rhs rows",
        ));
    }
    Ok(vec![batch, m, n])
}

/// Shape of a matrix product with NumPy-style handling of vectors and
/// broadcasting of batch dimensions.
///
/// 1D operands are treated as a row vector (lhs) or column vector (rhs) and
/// the inserted dimension is removed from the output.
pub fn matmul(a: &[usize], b: &[usize]) -> Result<Vec<usize>, ShapeError> {
    match (a, b) {
        (&[k_a], &[k_b]) => {
            if k_a != k_b {
                return Err(ShapeError::IncompatibleShapes(
                    "matmul: vector lengths must match",
                ));
            }
            return Ok(Vec::new());
        }
        (&[m, k_a], &[k_b]) => {
            if k_a != k_b {
                return Err(ShapeError::IncompatibleShapes(
                    "matmul: lhs columns must match vector length",
                ));
            }
            return Ok(vec![m]);
        }
        (&[k_a], &[k_b, n]) => {
            if k_a != k_b {
                return Err(ShapeError::IncompatibleShapes(
                    "matmul: vector length must match rhs rows",
                ));
            }
            return Ok(vec![n]);
        }
        (&[_, _], &[_, _]) => return mm(a, b),
        _ => {}
    }

    // Batched case. Promote vectors to matrices, multiply and then remove
    // the inserted dims.
    let (a_batch, a_rows, a_cols) = match a {
        [k] => (&[][..], None, *k),
        [batch @ .., m, k] => (batch, Some(*m), *k),
        [] => return Err(ShapeError::IncorrectRank("matmul: lhs must be at least 1D")),
    };
    let (b_batch, b_rows, b_cols) = match b {
        [k] => (&[][..], *k, None),
        [batch @ .., k, n] => (batch, *k, Some(*n)),
        [] => return Err(ShapeError::IncorrectRank("matmul: rhs must be at least 1D")),
    };

    if a_cols != b_rows {
        return Err(ShapeError::IncompatibleShapes(
            "matmul: lhs columns must match rhs rows",
        ));
    }

    let mut output = broadcast(a_batch, b_batch)
        .map_err(|_| ShapeError::IncompatibleShapes("matmul: batch dims must broadcast"))?;
    output.extend(a_rows);
    output.extend(b_cols);
    Ok(output)
}

/// Shape of `beta * input + alpha * (m1 @ m2)`.
///
/// `input` must broadcast to the shape of the matrix product without
/// changing it.
pub fn addmm(input: &[usize], m1: &[usize], m2: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let output = mm(m1, m2)?;
    if broadcast(input, &output).ok().as_deref() != Some(output.as_slice()) {
        return Err(ShapeError::IncompatibleShapes(
            "addmm: input must broadcast to the product shape",
        ));
    }
    Ok(output)
}

/// Shape of a fully connected layer, `input @ weight.T + bias`.
pub fn linear(
    input: &[usize],
    weight: &[usize],
    bias: Option<&[usize]>,
) -> Result<Vec<usize>, ShapeError> {
    let output = matmul(input, &transpose_2d(weight)?)?;
    if let Some(bias) = bias {
        if broadcast(bias, &output).ok().as_deref() != Some(output.as_slice()) {
            return Err(ShapeError::IncompatibleShapes(
                "linear: bias must broadcast to the output shape",
            ));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{addmm, bmm, linear, matmul, mm};

    #[test]
    fn test_mm() {
        assert_eq!(mm(&[2, 3], &[3, 4]), Ok(vec![2, 4]));
        assert_eq!(mm(&[0, 3], &[3, 4]), Ok(vec![0, 4]));
        assert!(mm(&[2, 3], &[4, 4]).is_err());
        assert!(mm(&[2, 3, 1], &[3, 4]).is_err());
        assert!(mm(&[3], &[3, 4]).is_err());
    }

    #[test]
    fn test_bmm() {
        #[derive(Debug)]
        struct Case {
            a: Vec<usize>,
            b: Vec<usize>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                a: [5, 2, 3].into(),
                b: [5, 3, 4].into(),
                expected: Some([5, 2, 4].into()),
            },
            Case {
                a: [0, 2, 3].into(),
                b: [0, 3, 4].into(),
                expected: Some([0, 2, 4].into()),
            },
            // Batch mismatch
            Case {
                a: [5, 2, 3].into(),
                b: [4, 3, 4].into(),
                expected: None,
            },
            // Contraction mismatch
            Case {
                a: [5, 2, 3].into(),
                b: [5, 2, 4].into(),
                expected: None,
            },
            Case {
                a: [2, 3].into(),
                b: [3, 4].into(),
                expected: None,
            },
            Case {
                a: [7, 3].into(),
                b: [2, 4, 5].into(),
                expected: None,
            },
            Case {
                a: [2, 3, 4].into(),
                b: [2, 4].into(),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(bmm(&case.a, &case.b).ok(), case.expected);
        });
    }

    #[test]
    fn test_matmul() {
        #[derive(Debug)]
        struct Case {
            a: Vec<usize>,
            b: Vec<usize>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                a: [3].into(),
                b: [3].into(),
                expected: Some([].into()),
            },
            Case {
                a: [2, 3].into(),
                b: [3].into(),
                expected: Some([2].into()),
            },
            Case {
                a: [3].into(),
                b: [3, 4].into(),
                expected: Some([4].into()),
            },
            Case {
                a: [2, 3].into(),
                b: [3, 4].into(),
                expected: Some([2, 4].into()),
            },
            Case {
                a: [5, 2, 3].into(),
                b: [3, 4].into(),
                expected: Some([5, 2, 4].into()),
            },
            Case {
                a: [5, 1, 2, 3].into(),
                b: [6, 3, 4].into(),
                expected: Some([5, 6, 2, 4].into()),
            },
            Case {
                a: [3].into(),
                b: [5, 3, 4].into(),
                expected: Some([5, 4].into()),
            },
            Case {
                a: [5, 2, 3].into(),
                b: [3].into(),
                expected: Some([5, 2].into()),
            },
            Case {
                a: [5, 2, 3].into(),
                b: [4, 3, 4].into(),
                expected: None,
            },
            Case {
                a: [5, 2, 3].into(),
                b: [5, 2, 4].into(),
                expected: None,
            },
            Case {
                a: [].into(),
                b: [3].into(),
                expected: None,
            },
            Case {
                a: [3].into(),
                b: [4].into(),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(matmul(&case.a, &case.b).ok(), case.expected);
        });
    }

    #[test]
    fn test_addmm() {
        assert_eq!(addmm(&[4], &[2, 3], &[3, 4]), Ok(vec![2, 4]));
        assert_eq!(addmm(&[2, 1], &[2, 3], &[3, 4]), Ok(vec![2, 4]));
        assert_eq!(addmm(&[], &[2, 3], &[3, 4]), Ok(vec![2, 4]));
        assert!(addmm(&[3], &[2, 3], &[3, 4]).is_err());
        assert!(addmm(&[1, 2, 4], &[2, 3], &[3, 4]).is_err());
    }

    #[test]
    fn test_linear() {
        assert_eq!(linear(&[8, 3], &[5, 3], None), Ok(vec![8, 5]));
        assert_eq!(linear(&[2, 8, 3], &[5, 3], Some(&[5])), Ok(vec![2, 8, 5]));
        assert_eq!(linear(&[3], &[5, 3], Some(&[5])), Ok(vec![5]));
        assert!(linear(&[8, 3], &[5, 4], None).is_err());
        assert!(linear(&[8, 3], &[5, 3], Some(&[4])).is_err());
        assert!(linear(&[8, 3], &[2, 5, 3], None).is_err());
    }
}
