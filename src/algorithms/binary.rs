use std::iter::repeat_n;

use super::ShapeError;

/// Broadcast two shapes together.
///
/// The shapes are aligned on their trailing dimensions and the shorter shape
/// is padded with leading 1s. Each pair of sizes must either be equal or
/// contain a 1, in which case the output has the other size.
///
/// See <https://pytorch.org/docs/stable/notes/broadcasting.html>.
pub fn broadcast(a: &[usize], b: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let ndim = a.len().max(b.len());
    let a_iter = repeat_n(1, ndim - a.len()).chain(a.iter().copied());
    let b_iter = repeat_n(1, ndim - b.len()).chain(b.iter().copied());

    a_iter
        .zip(b_iter)
        .map(|(a, b)| match (a, b) {
            (a, b) if a == b => Ok(a),
            (1, b) => Ok(b),
            (a, 1) => Ok(a),
            _ => Err(ShapeError::IncompatibleShapes(
                "sizes must be equal or 1 at each non-singleton dimension",
            )),
        })
        .collect()
}

/// Broadcast three shapes together.
pub fn broadcast3(a: &[usize], b: &[usize], c: &[usize]) -> Result<Vec<usize>, ShapeError> {
    broadcast(&broadcast(a, b)?, c)
}

/// Broadcast `shape` to a target shape given as a list of sizes.
///
/// The target may have more dimensions than `shape`. A size of -1 keeps the
/// existing size of the corresponding input dimension.
pub fn expand(shape: &[usize], sizes: &[i64]) -> Result<Vec<usize>, ShapeError> {
    if sizes.len() < shape.len() {
        return Err(ShapeError::IncorrectRank(
            "number of sizes must be at least the input rank",
        ));
    }
    let offset = sizes.len() - shape.len();

    sizes
        .iter()
        .enumerate()
        .map(|(i, &target)| {
            let current = i.checked_sub(offset).map(|i| shape[i]);
            match (current, target) {
                (Some(size), -1) => Ok(size),
                (None, -1) => Err(ShapeError::InvalidValue(
                    "size -1 is not allowed for new leading dimensions",
                )),
                (_, target) if target < 0 => {
                    Err(ShapeError::InvalidValue("expanded size must be non-negative"))
                }
                (Some(size), target) if size as i64 == target => Ok(size),
                (Some(1), target) | (None, target) => Ok(target as usize),
                (Some(_), _) => Err(ShapeError::IncompatibleShapes(
                    "expanded size must match existing size at non-singleton dimension",
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{broadcast, broadcast3, expand};

    #[test]
    fn test_broadcast() {
        #[derive(Debug)]
        struct Case {
            a: Vec<usize>,
            b: Vec<usize>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                a: [2, 3].into(),
                b: [2, 3].into(),
                expected: Some([2, 3].into()),
            },
            Case {
                a: [2, 3].into(),
                b: [3].into(),
                expected: Some([2, 3].into()),
            },
            Case {
                a: [2, 3].into(),
                b: [1, 3].into(),
                expected: Some([2, 3].into()),
            },
            Case {
                a: [2, 3].into(),
                b: [4, 3].into(),
                expected: None,
            },
            Case {
                a: [].into(),
                b: [2, 1, 4].into(),
                expected: Some([2, 1, 4].into()),
            },
            Case {
                a: [5, 1, 3].into(),
                b: [4, 1].into(),
                expected: Some([5, 4, 3].into()),
            },
            Case {
                a: [1].into(),
                b: [0].into(),
                expected: Some([0].into()),
            },
        ];

        cases.test_each(|case| {
            let result = broadcast(&case.a, &case.b).ok();
            assert_eq!(result, case.expected);

            // Broadcasting is symmetric.
            let result = broadcast(&case.b, &case.a).ok();
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_broadcast3() {
        assert_eq!(broadcast3(&[2, 1], &[3], &[1, 1, 3]), Ok(vec![1, 2, 3]));
        assert!(broadcast3(&[2, 1], &[3], &[4, 1]).is_err());
    }

    #[test]
    fn test_expand() {
        #[derive(Debug)]
        struct Case {
            shape: Vec<usize>,
            sizes: Vec<i64>,
            expected: Option<Vec<usize>>,
        }

        let cases = [
            Case {
                shape: [3, 1].into(),
                sizes: [2, 3, 4].into(),
                expected: Some([2, 3, 4].into()),
            },
            Case {
                shape: [3, 1].into(),
                sizes: [-1, 4].into(),
                expected: Some([3, 4].into()),
            },
            Case {
                shape: [3, 1].into(),
                sizes: [4].into(),
                expected: None,
            },
            Case {
                shape: [3, 1].into(),
                sizes: [4, 4].into(),
                expected: None,
            },
            Case {
                shape: [3].into(),
                sizes: [-1, 3].into(),
                expected: None,
            },
            Case {
                shape: [].into(),
                sizes: [].into(),
                expected: Some([].into()),
            },
        ];

        cases.test_each(|case| {
            assert_eq!(expand(&case.shape, &case.sizes).ok(), case.expected);
        });
    }
}
