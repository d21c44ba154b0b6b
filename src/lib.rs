//! rten-shape-lib is a library of shape functions for tensor operators.
//!
//! A shape function computes the shapes of an operator's outputs from the
//! shapes of its inputs and its scalar arguments, without computing any
//! values. Shape functions are used by compilers which need static shape
//! information before any tensors are materialized.
//!
//! # Verification
//!
//! Every shape function in the library comes with a list of
//! [invocations](Invocation). An invocation describes the arguments for one
//! call, with tensors written as [placeholders](placeholder::Placeholder),
//! and whether the call should fail. The [`Verifier`] runs each invocation
//! through both the shape function and a ground-truth [`Oracle`] and checks
//! that they agree:
//!
//! - If both succeed, they must produce the same number of outputs, and each
//!   output must have the same shape.
//! - If the invocation is expected to fail, both sides must fail.
//! - Any other combination is a [disagreement](verify::Disagreement).
//!
//! The `rten-reference` crate provides an oracle which evaluates operators
//! on real tensors.
//!
//! # Registry
//!
//! Each shape function declares a [`Signature`](signature::Signature). The
//! [`Registry`] checks these against a table of operator schemas, so that
//! changes to an operator's parameters are detected.
//!
//! # Generation
//!
//! [`generate`] verifies a whole library, checks it against the registry and
//! produces a [`Manifest`](emit::Manifest) which can be written to disk. The
//! manifest is only produced if every check passes.
//!
//! # Data-dependent shapes
//!
//! Some operators, such as `bincount`, have output sizes which depend on the
//! values of their inputs. Their shape functions return a [`Dim::Unknown`]
//! size. This describes only the rank of the output, and cannot be compared
//! against a real shape or used as input to another shape algorithm.

pub mod algorithms;
pub mod emit;
pub mod env;
pub mod generate;
pub mod invocation;
pub mod library;
pub mod op_name;
pub mod oracle;
pub mod placeholder;
pub mod registry;
pub mod shape;
pub mod signature;
pub mod verify;

mod shape_fns;

pub use algorithms::ShapeError;
pub use generate::{generate, generate_to_dir, GenerateError};
pub use invocation::{Arg, CallArgs, Invocation};
pub use library::{LibraryError, ShapeFunction, ShapeLibrary};
pub use op_name::OpName;
pub use oracle::{OpError, Oracle};
pub use placeholder::RealTensor;
pub use registry::{Registry, RegistryError};
pub use shape::{Dim, Returned, Shape, UnknownDim};
pub use verify::{Verifier, VerifyError};
