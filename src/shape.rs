//! Output shapes of shape functions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

/// Opaque token carried by an unknown dimension.
///
/// Tokens come from a process-wide counter, so the concrete value differs
/// between runs. Only [`Dim::is_unknown`] should be relied upon.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnknownDim(u64);

impl UnknownDim {
    pub fn new() -> UnknownDim {
        static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);
        UnknownDim(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UnknownDim {
    fn default() -> Self {
        Self::new()
    }
}

/// Size of one dimension of a shape function's output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Fixed(usize),

    /// Size which depends on the values in a tensor and cannot be determined
    /// from shapes alone.
    ///
    /// This conveys rank information only. It never compares equal to a
    /// fixed size and cannot be passed back into a shape algorithm.
    Unknown(UnknownDim),
}

impl Dim {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Dim::Unknown(_))
    }

    /// Return the size of this dimension if it is known.
    pub fn fixed(&self) -> Option<usize> {
        match self {
            Dim::Fixed(size) => Some(*size),
            Dim::Unknown(_) => None,
        }
    }
}

impl PartialEq<usize> for Dim {
    fn eq(&self, other: &usize) -> bool {
        self.fixed() == Some(*other)
    }
}

impl From<usize> for Dim {
    fn from(size: usize) -> Dim {
        Dim::Fixed(size)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dim::Fixed(size) => write!(f, "{}", size),
            Dim::Unknown(_) => write!(f, "?"),
        }
    }
}

/// Shape of a tensor produced by a shape function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape {
    dims: SmallVec<[Dim; 4]>,
}

impl Shape {
    /// Return the shape of a scalar.
    pub fn scalar() -> Shape {
        Shape::default()
    }

    /// Return a vector shape whose length is data-dependent.
    pub fn unknown_vector() -> Shape {
        [Dim::Unknown(UnknownDim::new())].into_iter().collect()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn has_unknown(&self) -> bool {
        self.dims.iter().any(|d| d.is_unknown())
    }

    /// Return the sizes of all dimensions, or `None` if any is unknown.
    pub fn to_fixed(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(|d| d.fixed()).collect()
    }
}

impl FromIterator<Dim> for Shape {
    fn from_iter<I: IntoIterator<Item = Dim>>(iter: I) -> Shape {
        Shape {
            dims: iter.into_iter().collect(),
        }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Shape {
        dims.iter().copied().map(Dim::Fixed).collect()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Shape {
        dims.as_slice().into()
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Shape {
        dims.as_slice().into()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

/// Value returned by a shape function or operator.
///
/// Whether a function returns a single value or a tuple is a property of the
/// function, not of how many values it happens to produce. A function that
/// returns a tuple with one element returns `Many`.
#[derive(Clone, Debug, PartialEq)]
pub enum Returned<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Returned<T> {
    /// Convert the result into a sequence of outputs.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Returned::One(value) => vec![value],
            Returned::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Returned::One(_) => 1,
            Returned::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Returned<U> {
        match self {
            Returned::One(value) => Returned::One(f(value)),
            Returned::Many(values) => Returned::Many(values.into_iter().map(f).collect()),
        }
    }
}

impl From<Vec<usize>> for Returned<Shape> {
    fn from(dims: Vec<usize>) -> Self {
        Returned::One(dims.into())
    }
}

impl From<Shape> for Returned<Shape> {
    fn from(shape: Shape) -> Self {
        Returned::One(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::{Dim, Returned, Shape, UnknownDim};

    #[test]
    fn test_unknown_dim_never_equals_fixed() {
        let dim = Dim::Unknown(UnknownDim::new());
        assert!(dim.is_unknown());
        for size in [0, 1, 2, usize::MAX] {
            assert_ne!(dim, Dim::Fixed(size));
            assert!(dim != size);
        }
        assert!(Dim::Fixed(3) == 3);
    }

    #[test]
    fn test_unknown_tokens_differ() {
        let a = UnknownDim::new();
        let b = UnknownDim::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_shape() {
        let shape = Shape::from([2, 3]);
        assert_eq!(shape.ndim(), 2);
        assert_eq!(shape.to_fixed(), Some(vec![2, 3]));
        assert_eq!(shape.to_string(), "[2, 3]");
        assert!(!shape.has_unknown());

        let unknown = Shape::unknown_vector();
        assert_eq!(unknown.ndim(), 1);
        assert!(unknown.has_unknown());
        assert_eq!(unknown.to_fixed(), None);
        assert_eq!(unknown.to_string(), "[?]");

        assert_eq!(Shape::scalar().to_string(), "[]");
    }

    #[test]
    fn test_returned_into_vec() {
        let one: Returned<Shape> = vec![2, 3].into();
        assert_eq!(one.len(), 1);
        assert_eq!(one.into_vec(), vec![Shape::from([2, 3])]);

        let many = Returned::Many(vec![Shape::from([1]), Shape::scalar()]);
        assert_eq!(many.len(), 2);
        assert_eq!(many.map(|s| s.ndim()).into_vec(), vec![1, 0]);
    }
}
