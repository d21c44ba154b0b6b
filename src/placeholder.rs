//! Symbolic stand-ins for tensors used when declaring invocations.

use std::fmt;

use rten_tensor::prelude::*;
use rten_tensor::Tensor;

/// Element type of a placeholder tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Float32,
    Int64,
    Bool,
}

/// A real tensor passed to an operator.
///
/// Integer and boolean tensors are stored as `i32`, as in RTen.
#[derive(Clone, Debug)]
pub enum RealTensor {
    Float(Tensor<f32>),
    Int(Tensor<i32>),
}

impl RealTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            RealTensor::Float(t) => t.shape(),
            RealTensor::Int(t) => t.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Return the number of elements in the tensor.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the elements of this tensor in row-major order, converted to
    /// floats.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            RealTensor::Float(t) => t.to_vec(),
            RealTensor::Int(t) => t.iter().map(|x| *x as f32).collect(),
        }
    }
}

impl From<Tensor<f32>> for RealTensor {
    fn from(t: Tensor<f32>) -> RealTensor {
        RealTensor::Float(t)
    }
}

impl From<Tensor<i32>> for RealTensor {
    fn from(t: Tensor<i32>) -> RealTensor {
        RealTensor::Int(t)
    }
}

/// Describes a tensor by its shape and element kind.
///
/// A placeholder is projected into a shape descriptor when passed to a shape
/// function and into a materialized tensor when passed to an operator.
#[derive(Clone, Debug, PartialEq)]
pub struct Placeholder {
    shape: Vec<usize>,
    kind: ElementKind,
}

impl Placeholder {
    pub fn new(shape: &[usize], kind: ElementKind) -> Placeholder {
        Placeholder {
            shape: shape.to_vec(),
            kind,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Return a new shape descriptor for this placeholder.
    ///
    /// Each call returns an independent copy.
    pub fn to_shape(&self) -> Vec<usize> {
        self.shape.clone()
    }

    /// Materialize a tensor with this placeholder's shape, filled with ones.
    pub fn to_tensor(&self) -> RealTensor {
        match self.kind {
            ElementKind::Float32 => Tensor::full(self.shape.as_slice(), 1.0f32).into(),
            ElementKind::Int64 | ElementKind::Bool => {
                Tensor::full(self.shape.as_slice(), 1i32).into()
            }
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.kind {
            ElementKind::Float32 => "tensor",
            ElementKind::Int64 => "long_tensor",
            ElementKind::Bool => "bool_tensor",
        };
        write!(f, "{}[", prefix)?;
        for (i, size) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", size)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::{ElementKind, Placeholder, RealTensor};

    #[test]
    fn test_projections_are_independent() {
        let placeholder = Placeholder::new(&[2, 3], ElementKind::Float32);

        let mut shape = placeholder.to_shape();
        shape[0] = 10;
        shape.push(4);

        assert_eq!(placeholder.shape(), &[2, 3]);
        assert_eq!(placeholder.to_shape(), vec![2, 3]);
        assert_eq!(placeholder.to_tensor().shape(), &[2, 3]);
    }

    #[test]
    fn test_to_tensor() {
        let float = Placeholder::new(&[2], ElementKind::Float32).to_tensor();
        assert!(matches!(float, RealTensor::Float(_)));
        assert_eq!(float.to_f32_vec(), vec![1.0, 1.0]);

        let long = Placeholder::new(&[3], ElementKind::Int64).to_tensor();
        assert!(matches!(long, RealTensor::Int(_)));

        let scalar = Placeholder::new(&[], ElementKind::Bool).to_tensor();
        assert_eq!(scalar.ndim(), 0);
        assert_eq!(scalar.to_f32_vec(), vec![1.0]);
    }

    #[test]
    fn test_display() {
        let p = Placeholder::new(&[2, 3], ElementKind::Float32);
        assert_eq!(p.to_string(), "tensor[2, 3]");
        let p = Placeholder::new(&[], ElementKind::Int64);
        assert_eq!(p.to_string(), "long_tensor[]");
    }
}
