//! Test cases for shape functions and their projection into shape-space and
//! real-space arguments.

use std::error::Error;
use std::fmt;

use crate::placeholder::{ElementKind, Placeholder, RealTensor};

/// Argument passed to a shape function or operator.
///
/// `T` is the type used for tensor arguments. Invocations are declared with
/// [`Placeholder`] tensors, which are replaced by shape descriptors or real
/// tensors when the invocation is projected.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg<T> {
    Tensor(T),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
    List(Vec<Arg<T>>),
}

impl<T> Arg<T> {
    /// Convert the tensors in this argument using `f`, preserving the
    /// structure of nested lists.
    pub fn try_map<U, E, F: FnMut(&T) -> Result<U, E>>(&self, f: &mut F) -> Result<Arg<U>, E> {
        let arg = match self {
            Arg::Tensor(t) => Arg::Tensor(f(t)?),
            Arg::Int(x) => Arg::Int(*x),
            Arg::Float(x) => Arg::Float(*x),
            Arg::Bool(x) => Arg::Bool(*x),
            Arg::Str(x) => Arg::Str(x.clone()),
            Arg::None => Arg::None,
            Arg::List(items) => Arg::List(
                items
                    .iter()
                    .map(|item| item.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(arg)
    }
}

impl<T> From<i32> for Arg<T> {
    fn from(x: i32) -> Self {
        Arg::Int(x as i64)
    }
}

impl<T> From<i64> for Arg<T> {
    fn from(x: i64) -> Self {
        Arg::Int(x)
    }
}

impl<T> From<f64> for Arg<T> {
    fn from(x: f64) -> Self {
        Arg::Float(x)
    }
}

impl<T> From<bool> for Arg<T> {
    fn from(x: bool) -> Self {
        Arg::Bool(x)
    }
}

impl<T> From<&str> for Arg<T> {
    fn from(x: &str) -> Self {
        Arg::Str(x.to_string())
    }
}

impl From<Placeholder> for Arg<Placeholder> {
    fn from(p: Placeholder) -> Self {
        Arg::Tensor(p)
    }
}

impl<T: fmt::Display> fmt::Display for Arg<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arg::Tensor(t) => write!(f, "{}", t),
            Arg::Int(x) => write!(f, "{}", x),
            Arg::Float(x) => write!(f, "{:?}", x),
            Arg::Bool(x) => write!(f, "{}", x),
            Arg::Str(x) => write!(f, "{:?}", x),
            Arg::None => write!(f, "None"),
            Arg::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Placeholder for a float tensor with a given shape.
pub fn tensor(shape: &[usize]) -> Arg<Placeholder> {
    Arg::Tensor(Placeholder::new(shape, ElementKind::Float32))
}

/// Placeholder for an int64 tensor with a given shape.
pub fn long_tensor(shape: &[usize]) -> Arg<Placeholder> {
    Arg::Tensor(Placeholder::new(shape, ElementKind::Int64))
}

/// Placeholder for a boolean tensor with a given shape.
pub fn bool_tensor(shape: &[usize]) -> Arg<Placeholder> {
    Arg::Tensor(Placeholder::new(shape, ElementKind::Bool))
}

/// List argument.
pub fn list<T>(items: impl IntoIterator<Item = Arg<T>>) -> Arg<T> {
    Arg::List(items.into_iter().collect())
}

/// List of integers.
pub fn ints<T>(values: &[i64]) -> Arg<T> {
    Arg::List(values.iter().map(|&x| Arg::Int(x)).collect())
}

/// Errors when projecting an invocation's arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionError {
    /// A keyword argument contained a tensor. Keyword arguments are passed
    /// unchanged to both sides so they may only contain scalars.
    TensorKeyword(String),
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProjectionError::TensorKeyword(name) => {
                write!(f, "keyword argument \"{}\" contains a tensor", name)
            }
        }
    }
}

impl Error for ProjectionError {}

/// Arguments for a call to a shape function or operator.
#[derive(Clone, Debug, PartialEq)]
pub struct CallArgs<T> {
    pub positional: Vec<Arg<T>>,
    pub keywords: Vec<(String, Arg<T>)>,
}

/// A test case for a shape function.
///
/// An invocation describes the arguments for one call and whether the call
/// is expected to fail. The same arguments are passed to the shape function,
/// with tensors replaced by their shapes, and to the operator, with tensors
/// replaced by real values.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    args: Vec<Arg<Placeholder>>,
    kwargs: Vec<(String, Arg<Placeholder>)>,
    expect_error: bool,
}

impl Invocation {
    /// Create an invocation which is expected to succeed.
    pub fn new(args: impl IntoIterator<Item = Arg<Placeholder>>) -> Invocation {
        Invocation {
            args: args.into_iter().collect(),
            kwargs: Vec::new(),
            expect_error: false,
        }
    }

    /// Create an invocation which is expected to fail for both the shape
    /// function and the operator.
    pub fn error(args: impl IntoIterator<Item = Arg<Placeholder>>) -> Invocation {
        Invocation {
            expect_error: true,
            ..Invocation::new(args)
        }
    }

    /// Add a keyword argument.
    pub fn kwarg(mut self, name: &str, value: impl Into<Arg<Placeholder>>) -> Invocation {
        self.kwargs.push((name.to_string(), value.into()));
        self
    }

    pub fn expect_error(&self) -> bool {
        self.expect_error
    }

    /// Return arguments for the shape function.
    pub fn to_shape_args(&self) -> Result<CallArgs<Vec<usize>>, ProjectionError> {
        self.project(Placeholder::to_shape)
    }

    /// Return arguments for the operator.
    pub fn to_real_args(&self) -> Result<CallArgs<RealTensor>, ProjectionError> {
        self.project(Placeholder::to_tensor)
    }

    fn project<T>(
        &self,
        mut convert: impl FnMut(&Placeholder) -> T,
    ) -> Result<CallArgs<T>, ProjectionError> {
        let positional = self
            .args
            .iter()
            .map(|arg| arg.try_map(&mut |p| Ok::<_, ProjectionError>(convert(p))))
            .collect::<Result<_, _>>()?;

        let keywords = self
            .kwargs
            .iter()
            .map(|(name, arg)| {
                let value =
                    arg.try_map(&mut |_| Err(ProjectionError::TensorKeyword(name.clone())))?;
                Ok::<_, ProjectionError>((name.clone(), value))
            })
            .collect::<Result<_, _>>()?;

        Ok(CallArgs {
            positional,
            keywords,
        })
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = if self.expect_error {
            "ErrorInvocation"
        } else {
            "Invocation"
        };
        write!(f, "{}(", name)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", arg)?;
        }
        for (name, arg) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", name, arg)?;
        }
        write!(f, ")")
    }
}
