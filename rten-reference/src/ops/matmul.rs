use rten_shape_lib::OpError;
use rten_tensor::prelude::*;
use rten_tensor::Tensor;

use super::{
    broadcast_binary, broadcast_data, broadcast_shapes, float_arg, one, opt_float_arg, Args,
    OpResult, OpTable,
};

/// Multiply two matrices.
pub fn mm(a: &Tensor<f32>, b: &Tensor<f32>) -> Result<Tensor<f32>, OpError> {
    if a.ndim() != 2 || b.ndim() != 2 {
        return Err(OpError::InvalidValue("mm inputs must be matrices"));
    }
    let [m, k] = [a.shape()[0], a.shape()[1]];
    let [b_k, n] = [b.shape()[0], b.shape()[1]];
    if k != b_k {
        return Err(OpError::IncompatibleInputShapes(
            "Columns of first matrix does not match rows of second matrix",
        ));
    }
    let a = a.to_vec();
    let b = b.to_vec();
    Ok(Tensor::from_data(&[m, n], gemm(&a, &b, m, k, n)))
}

/// Compute the `[m, n]` product of row-major `[m, k]` and `[k, n]` matrices.
fn gemm(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.; m * n];
    for i in 0..m {
        for j in 0..n {
            out[i * n + j] = (0..k).map(|p| a[i * k + p] * b[p * n + j]).sum();
        }
    }
    out
}

/// Matrix product with NumPy semantics.
///
/// 1D inputs are promoted to matrices by inserting a dimension, which is
/// removed from the output. Inputs with more than two dims are treated as
/// stacks of matrices whose batch dims are broadcast together.
pub fn matmul(a: &Tensor<f32>, b: &Tensor<f32>) -> Result<Tensor<f32>, OpError> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return Err(OpError::InvalidValue("matmul inputs must be at least 1D"));
    }

    let a_shape: Vec<usize> = if a.ndim() == 1 {
        vec![1, a.shape()[0]]
    } else {
        a.shape().to_vec()
    };
    let b_shape: Vec<usize> = if b.ndim() == 1 {
        vec![b.shape()[0], 1]
    } else {
        b.shape().to_vec()
    };

    let (a_batch, a_mat) = a_shape.split_at(a_shape.len() - 2);
    let (b_batch, b_mat) = b_shape.split_at(b_shape.len() - 2);
    let [m, k] = [a_mat[0], a_mat[1]];
    let [b_k, n] = [b_mat[0], b_mat[1]];
    if k != b_k {
        return Err(OpError::IncompatibleInputShapes(
            "Columns of first matrix does not match rows of second matrix",
        ));
    }
    let batch = broadcast_shapes(a_batch, b_batch)
        .ok_or(OpError::IncompatibleInputShapes("Cannot broadcast batch dims"))?;

    let a_full: Vec<usize> = batch.iter().copied().chain([m, k]).collect();
    let b_full: Vec<usize> = batch.iter().copied().chain([k, n]).collect();
    let a_data = broadcast_data(&Tensor::from_data(&a_shape, a.to_vec()), &a_full)?;
    let b_data = broadcast_data(&Tensor::from_data(&b_shape, b.to_vec()), &b_full)?;

    let n_batch: usize = batch.iter().product();
    let mut out = Vec::with_capacity(n_batch * m * n);
    for i in 0..n_batch {
        let a_mat = &a_data[i * m * k..(i + 1) * m * k];
        let b_mat = &b_data[i * k * n..(i + 1) * k * n];
        out.extend(gemm(a_mat, b_mat, m, k, n));
    }

    let mut out_shape: Vec<usize> = batch.to_vec();
    if a.ndim() > 1 {
        out_shape.push(m);
    }
    if b.ndim() > 1 {
        out_shape.push(n);
    }
    Ok(Tensor::from_data(&out_shape, out))
}

fn matmul_op(args: &Args) -> OpResult {
    one(matmul(&float_arg(args, "self")?, &float_arg(args, "other")?)?)
}

fn mm_op(args: &Args) -> OpResult {
    one(mm(&float_arg(args, "self")?, &float_arg(args, "mat2")?)?)
}

fn bmm(args: &Args) -> OpResult {
    let a = float_arg(args, "self")?;
    let b = float_arg(args, "mat2")?;
    if a.ndim() != 3 || b.ndim() != 3 {
        return Err(OpError::InvalidValue("bmm inputs must be 3D"));
    }
    if a.shape()[0] != b.shape()[0] {
        return Err(OpError::IncompatibleInputShapes("Batch sizes do not match"));
    }
    one(matmul(&a, &b)?)
}

fn addmm(args: &Args) -> OpResult {
    let beta = args.float("beta")? as f32;
    let alpha = args.float("alpha")? as f32;
    let input = float_arg(args, "self")?;
    let product = mm(&float_arg(args, "mat1")?, &float_arg(args, "mat2")?)?;
    let input = Tensor::from_data(product.shape(), broadcast_data(&input, product.shape())?);
    one(broadcast_binary(&input, &product, |x, y| beta * x + alpha * y)?)
}

fn linear(args: &Args) -> OpResult {
    let input = float_arg(args, "input")?;
    let weight = float_arg(args, "weight")?;
    let weight = match weight.ndim() {
        0 | 1 => weight,
        2 => {
            let [rows, cols] = [weight.shape()[0], weight.shape()[1]];
            let data = weight.to_vec();
            let transposed: Vec<f32> = (0..rows * cols)
                .map(|i| data[(i % rows) * cols + i / rows])
                .collect();
            Tensor::from_data(&[cols, rows], transposed)
        }
        _ => return Err(OpError::InvalidValue("linear weight must be at most 2D")),
    };
    let output = matmul(&input, &weight)?;
    match opt_float_arg(args, "bias")? {
        Some(bias) => {
            let bias = Tensor::from_data(output.shape(), broadcast_data(&bias, output.shape())?);
            one(broadcast_binary(&output, &bias, |x, b| x + b)?)
        }
        None => one(output),
    }
}

pub(crate) fn register(table: &mut OpTable) {
    table.add("aten::matmul", matmul_op);
    table.add("aten::mm", mm_op);
    table.add("aten::bmm", bmm);
    table.add("aten::addmm", addmm);
    table.add("aten::linear", linear);
}

#[cfg(test)]
mod tests {
    use rten_tensor::prelude::*;
    use rten_tensor::Tensor;
    use rten_testing::TestCases;

    use super::{matmul, mm};

    #[test]
    fn test_mm() {
        let a = Tensor::from_data(&[2, 3], vec![1., 2., 3., 4., 5., 6.]);
        let b = Tensor::from_data(&[3, 2], vec![1., 0., 0., 1., 1., 1.]);
        let c = mm(&a, &b).unwrap();
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.to_vec(), vec![4., 5., 10., 11.]);

        assert!(mm(&a, &a).is_err());
    }

    #[test]
    fn test_matmul_shapes() {
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
                b: [5, 3, 4].into(),
                expected: Some([5, 4].into()),
            },
            Case {
                a: [5, 1, 2, 3].into(),
                b: [6, 3, 4].into(),
                expected: Some([5, 6, 2, 4].into()),
            },
            Case {
                a: [2, 2, 3].into(),
                b: [3, 3, 4].into(),
                expected: None,
            },
            Case {
                a: [].into(),
                b: [3].into(),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let a = Tensor::<f32>::zeros(&case.a);
            let b = Tensor::<f32>::zeros(&case.b);
            let result = matmul(&a, &b).ok().map(|c| c.shape().to_vec());
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_matmul_vector() {
        let a = Tensor::from_data(&[3], vec![1., 2., 3.]);
        let b = Tensor::from_data(&[3], vec![4., 5., 6.]);
        assert_eq!(matmul(&a, &b).unwrap().to_vec(), vec![32.]);
    }
}
