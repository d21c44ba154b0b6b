//! Interface to the operators that shape functions are verified against.

use std::error::Error;
use std::fmt;

use crate::invocation::CallArgs;
use crate::op_name::OpName;
use crate::placeholder::RealTensor;
use crate::shape::Returned;
use crate::signature::BindError;

/// Possible reasons why an operator may fail on a given input.
#[derive(Clone, Debug, PartialEq)]
pub enum OpError {
    /// The oracle has no implementation of the operator.
    UnknownOperator(String),

    /// The arguments could not be bound to the operator's parameters.
    InvalidArguments(BindError),

    /// A tensor has an unsupported type.
    UnsupportedType,

    /// Input tensor shapes are not compatible with each other or operator
    /// attributes.
    IncompatibleInputShapes(&'static str),

    /// An input has a value that is incorrect.
    InvalidValue(&'static str),

    /// An input or attribute has a value that is valid, but not currently
    /// supported.
    UnsupportedValue(&'static str),
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::UnknownOperator(name) => write!(f, "unknown operator {}", name),
            OpError::InvalidArguments(err) => write!(f, "invalid arguments: {}", err),
            OpError::UnsupportedType => write!(f, "unsupported input type"),
            OpError::IncompatibleInputShapes(details) => {
                write!(f, "incompatible input shapes: {}", details)
            }
            OpError::InvalidValue(details) => {
                write!(f, "input or attribute has invalid value: {}", details)
            }
            OpError::UnsupportedValue(details) => {
                write!(f, "unsupported input or attribute value: {}", details)
            }
        }
    }
}

impl Error for OpError {}

impl From<BindError> for OpError {
    fn from(err: BindError) -> OpError {
        OpError::InvalidArguments(err)
    }
}

/// Ground-truth implementation of operators.
///
/// Shape functions are checked by comparing their outputs with the shapes of
/// the tensors returned by an oracle for the same arguments.
pub trait Oracle {
    /// Evaluate operator `op` with real tensor arguments.
    fn call(&self, op: &OpName, args: &CallArgs<RealTensor>) -> Result<Returned<RealTensor>, OpError>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn call(&self, op: &OpName, args: &CallArgs<RealTensor>) -> Result<Returned<RealTensor>, OpError> {
        (**self).call(op, args)
    }
}
