//! Differential verification of shape functions against an oracle.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::invocation::{Invocation, ProjectionError};
use crate::library::ShapeFunction;
use crate::op_name::OpName;
use crate::oracle::Oracle;
use crate::placeholder::RealTensor;
use crate::shape::{Dim, Shape};

/// One of the two implementations compared by the verifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    ShapeFunction,
    Operator,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::ShapeFunction => Side::Operator,
            Side::Operator => Side::ShapeFunction,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::ShapeFunction => write!(f, "shape function"),
            Side::Operator => write!(f, "operator"),
        }
    }
}

/// The success or failure of the two sides disagreed with the invocation's
/// expectation.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpectationFailure {
    /// Exactly one side failed.
    AsymmetricFailure { failed: Side, error: String },

    /// Both sides succeeded for an invocation that is expected to fail.
    MissedExpectedError,

    /// Both sides failed for an invocation that is expected to succeed.
    UnexpectedDoubleFailure {
        shape_fn_error: String,
        op_error: String,
    },
}

impl fmt::Display for ExpectationFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExpectationFailure::AsymmetricFailure { failed, error } => write!(
                f,
                "{} failed but {} succeeded: {}",
                failed,
                failed.other(),
                error
            ),
            ExpectationFailure::MissedExpectedError => {
                write!(f, "expected an error but both sides succeeded")
            }
            ExpectationFailure::UnexpectedDoubleFailure {
                shape_fn_error,
                op_error,
            } => write!(
                f,
                "both sides failed for an invocation expected to succeed \
                 (shape function: {}; operator: {})",
                shape_fn_error, op_error
            ),
        }
    }
}

/// Both sides succeeded but produced different shapes.
///
/// `expected` values come from the operator and `actual` values from the
/// shape function.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeMismatch {
    /// The number of outputs differs.
    Count { expected: usize, actual: usize },

    /// The rank of an output differs.
    Rank {
        output: usize,
        expected: Vec<usize>,
        actual: Shape,
    },

    /// The size of a dimension of an output differs.
    Dimension {
        output: usize,
        dim: usize,
        expected: Vec<usize>,
        actual: Shape,
    },
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ShapeMismatch::Count { expected, actual } => write!(
                f,
                "operator returned {} outputs but shape function returned {}",
                expected, actual
            ),
            ShapeMismatch::Rank {
                output,
                expected,
                actual,
            } => write!(
                f,
                "rank mismatch for output {}: operator shape {:?}, shape function shape {}",
                output, expected, actual
            ),
            ShapeMismatch::Dimension {
                output,
                dim,
                expected,
                actual,
            } => write!(
                f,
                "size mismatch in dim {} of output {}: operator shape {:?}, shape function shape {}",
                dim, output, expected, actual
            ),
        }
    }
}

/// Reason why a shape function and the operator disagree on an invocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Disagreement {
    Expectation(ExpectationFailure),
    Shape(ShapeMismatch),
}

impl fmt::Display for Disagreement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Disagreement::Expectation(err) => write!(f, "{}", err),
            Disagreement::Shape(err) => write!(f, "{}", err),
        }
    }
}

impl From<ExpectationFailure> for Disagreement {
    fn from(err: ExpectationFailure) -> Disagreement {
        Disagreement::Expectation(err)
    }
}

impl From<ShapeMismatch> for Disagreement {
    fn from(err: ShapeMismatch) -> Disagreement {
        Disagreement::Shape(err)
    }
}

/// Specific reason for a [`VerifyError`].
#[derive(Clone, Debug, PartialEq)]
pub enum VerifyFailure {
    Projection(ProjectionError),
    Disagreement(Disagreement),
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VerifyFailure::Projection(err) => write!(f, "invalid invocation: {}", err),
            VerifyFailure::Disagreement(err) => write!(f, "{}", err),
        }
    }
}

/// Error reported for the first invocation of a shape function that fails
/// verification.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifyError {
    pub op: OpName,

    /// The invocation, as written in the library.
    pub invocation: String,

    pub reason: VerifyFailure,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "verification of {} failed for {}: {}",
            self.op, self.invocation, self.reason
        )
    }
}

impl Error for VerifyError {}

/// An invocation which passed verification.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedInvocation {
    pub invocation: Invocation,

    /// Normalized output shapes, or `None` for invocations which are
    /// expected to fail.
    pub outputs: Option<Vec<Shape>>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic".to_string()
    }
}

/// Run one side of a comparison, converting both errors and panics into
/// failure messages.
fn run_side<T, E: fmt::Display>(f: impl FnOnce() -> Result<T, E>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

/// Compare normalized shape function outputs against operator outputs.
fn compare_outputs(actual: &[Shape], expected: &[RealTensor]) -> Result<(), ShapeMismatch> {
    if actual.len() != expected.len() {
        return Err(ShapeMismatch::Count {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    for (output, (actual, expected)) in actual.iter().zip(expected).enumerate() {
        let expected = expected.shape();
        if actual.ndim() != expected.len() {
            return Err(ShapeMismatch::Rank {
                output,
                expected: expected.to_vec(),
                actual: actual.clone(),
            });
        }
        let mismatched_dim = actual
            .dims()
            .iter()
            .zip(expected)
            .position(|(actual, &expected): (&Dim, &usize)| *actual != expected);
        if let Some(dim) = mismatched_dim {
            return Err(ShapeMismatch::Dimension {
                output,
                dim,
                expected: expected.to_vec(),
                actual: actual.clone(),
            });
        }
    }

    Ok(())
}

/// Checks shape functions against a ground-truth [`Oracle`].
pub struct Verifier<O: Oracle> {
    oracle: O,
}

impl<O: Oracle> Verifier<O> {
    pub fn new(oracle: O) -> Verifier<O> {
        Verifier { oracle }
    }

    /// Evaluate a shape function and the operator for one invocation and
    /// check that they agree.
    ///
    /// Both sides are always evaluated, even if the first fails.
    pub fn verify_invocation(
        &self,
        func: &ShapeFunction,
        invocation: &Invocation,
    ) -> Result<VerifiedInvocation, VerifyError> {
        let fail = |reason| VerifyError {
            op: func.op().clone(),
            invocation: invocation.to_string(),
            reason,
        };

        let shape_args = invocation
            .to_shape_args()
            .map_err(|err| fail(VerifyFailure::Projection(err)))?;
        let real_args = invocation
            .to_real_args()
            .map_err(|err| fail(VerifyFailure::Projection(err)))?;

        let shape_result = run_side(|| func.call(&shape_args));
        let op_result = run_side(|| self.oracle.call(func.op(), &real_args));

        let disagreement = |err: Disagreement| fail(VerifyFailure::Disagreement(err));
        let outputs = match (shape_result, op_result) {
            (Err(_), Err(_)) if invocation.expect_error() => None,
            (Err(shape_fn_error), Err(op_error)) => {
                return Err(disagreement(
                    ExpectationFailure::UnexpectedDoubleFailure {
                        shape_fn_error,
                        op_error,
                    }
                    .into(),
                ));
            }
            (Err(error), Ok(_)) => {
                return Err(disagreement(
                    ExpectationFailure::AsymmetricFailure {
                        failed: Side::ShapeFunction,
                        error,
                    }
                    .into(),
                ));
            }
            (Ok(_), Err(error)) => {
                return Err(disagreement(
                    ExpectationFailure::AsymmetricFailure {
                        failed: Side::Operator,
                        error,
                    }
                    .into(),
                ));
            }
            (Ok(_), Ok(_)) if invocation.expect_error() => {
                return Err(disagreement(
                    ExpectationFailure::MissedExpectedError.into(),
                ));
            }
            (Ok(shapes), Ok(tensors)) => {
                let shapes = shapes.into_vec();
                compare_outputs(&shapes, &tensors.into_vec())
                    .map_err(|err| disagreement(err.into()))?;
                Some(shapes)
            }
        };

        tracing::debug!(
            op = %func.op(),
            invocation = %invocation,
            "invocation agrees"
        );

        Ok(VerifiedInvocation {
            invocation: invocation.clone(),
            outputs,
        })
    }

    /// Verify all of a shape function's invocations, stopping at the first
    /// that fails.
    pub fn verify_function(
        &self,
        func: &ShapeFunction,
    ) -> Result<Vec<VerifiedInvocation>, VerifyError> {
        let verified = func
            .test_invocations()
            .iter()
            .map(|invocation| self.verify_invocation(func, invocation))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!(
            op = %func.op(),
            invocations = verified.len(),
            "verified shape function"
        );
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rten_tensor::Tensor;
    use rten_testing::TestCases;

    use super::{
        Disagreement, ExpectationFailure, ShapeMismatch, Side, Verifier, VerifyFailure,
    };
    use crate::algorithms::{broadcast, data_dependent_vector, ShapeError};
    use crate::invocation::{tensor, CallArgs, Invocation};
    use crate::library::ShapeLibrary;
    use crate::op_name::OpName;
    use crate::oracle::{OpError, Oracle};
    use crate::placeholder::RealTensor;
    use crate::shape::{Returned, Shape};
    use crate::signature::signature;

    /// Oracle which returns a fixed list of output shapes, or an error.
    struct FakeOracle {
        outputs: Result<Vec<Vec<usize>>, OpError>,
        tuple: bool,
        calls: Cell<usize>,
    }

    impl FakeOracle {
        fn returning(outputs: &[&[usize]]) -> FakeOracle {
            FakeOracle {
                outputs: Ok(outputs.iter().map(|s| s.to_vec()).collect()),
                tuple: outputs.len() != 1,
                calls: Cell::new(0),
            }
        }

        fn failing() -> FakeOracle {
            FakeOracle {
                outputs: Err(OpError::IncompatibleInputShapes("fake")),
                tuple: false,
                calls: Cell::new(0),
            }
        }
    }

    impl Oracle for FakeOracle {
        fn call(
            &self,
            _op: &OpName,
            _args: &CallArgs<RealTensor>,
        ) -> Result<Returned<RealTensor>, OpError> {
            self.calls.set(self.calls.get() + 1);
            let outputs = self.outputs.clone()?;
            let mut tensors: Vec<RealTensor> = outputs
                .iter()
                .map(|shape| Tensor::<f32>::zeros(shape.as_slice()).into())
                .collect();
            if self.tuple {
                Ok(Returned::Many(tensors))
            } else {
                Ok(Returned::One(tensors.remove(0)))
            }
        }
    }

    /// Library with an `add`-like function which broadcasts two shapes.
    fn test_library() -> ShapeLibrary {
        let mut lib = ShapeLibrary::new();
        lib.register(
            "test::add",
            signature!["self": Tensor, "other": Tensor => 1],
            |args| Ok(broadcast(&args.tensor("self")?, &args.tensor("other")?)?.into()),
        )
        .unwrap();
        lib.register("test::panics", signature!["self": Tensor => 1], |_| {
            panic!("shape function panicked")
        })
        .unwrap();
        lib.register("test::pair", signature!["self": Tensor => 2], |args| {
            let shape = args.tensor("self")?;
            Ok(Returned::Many(vec![
                shape.clone().into(),
                Shape::from(shape),
            ]))
        })
        .unwrap();
        lib.register("test::unknown", signature!["self": Tensor => 1], |_| {
            Ok(data_dependent_vector().into())
        })
        .unwrap();
        lib.register("test::error", signature!["self": Tensor => 1], |_| {
            Err(ShapeError::InvalidValue("always fails"))
        })
        .unwrap();
        lib
    }

    fn op(name: &str) -> OpName {
        name.parse().unwrap()
    }

    #[test]
    fn test_agreement_protocol() {
        #[derive(Debug)]
        struct Case {
            op: &'static str,
            invocation: Invocation,
            // Output shapes returned by the oracle, or `None` if it fails.
            op_outputs: Option<&'static [&'static [usize]]>,
            expected: Option<Disagreement>,
        }

        let add_args = || [tensor(&[2, 3]), tensor(&[3])];
        let bad_add_args = || [tensor(&[2, 3]), tensor(&[4])];
        let broadcast_error = "incompatible shapes: sizes must be equal or 1 at each non-singleton dimension";
        let op_error = "incompatible input shapes: fake";

        let cases = [
            // Both sides succeed with the same shape.
            Case {
                op: "test::add",
                invocation: Invocation::new(add_args()),
                op_outputs: Some(&[&[2, 3]]),
                expected: None,
            },
            // Both sides fail, as expected.
            Case {
                op: "test::add",
                invocation: Invocation::error(bad_add_args()),
                op_outputs: None,
                expected: None,
            },
            // Both sides fail, but success was expected.
            Case {
                op: "test::add",
                invocation: Invocation::new(bad_add_args()),
                op_outputs: None,
                expected: Some(Disagreement::Expectation(
                    ExpectationFailure::UnexpectedDoubleFailure {
                        shape_fn_error: broadcast_error.into(),
                        op_error: op_error.into(),
                    },
                )),
            },
            // Both sides succeed, but failure was expected.
            Case {
                op: "test::add",
                invocation: Invocation::error(add_args()),
                op_outputs: Some(&[&[2, 3]]),
                expected: Some(Disagreement::Expectation(
                    ExpectationFailure::MissedExpectedError,
                )),
            },
            // Only the operator fails.
            Case {
                op: "test::add",
                invocation: Invocation::error(add_args()),
                op_outputs: None,
                expected: Some(Disagreement::Expectation(
                    ExpectationFailure::AsymmetricFailure {
                        failed: Side::Operator,
                        error: op_error.into(),
                    },
                )),
            },
            // Only the shape function fails.
            Case {
                op: "test::add",
                invocation: Invocation::new(bad_add_args()),
                op_outputs: Some(&[&[2, 4]]),
                expected: Some(Disagreement::Expectation(
                    ExpectationFailure::AsymmetricFailure {
                        failed: Side::ShapeFunction,
                        error: broadcast_error.into(),
                    },
                )),
            },
            // A panic counts as an ordinary failure.
            Case {
                op: "test::panics",
                invocation: Invocation::error([tensor(&[2])]),
                op_outputs: None,
                expected: None,
            },
            Case {
                op: "test::panics",
                invocation: Invocation::new([tensor(&[2])]),
                op_outputs: Some(&[&[2]]),
                expected: Some(Disagreement::Expectation(
                    ExpectationFailure::AsymmetricFailure {
                        failed: Side::ShapeFunction,
                        error: "panic: shape function panicked".into(),
                    },
                )),
            },
            Case {
                op: "test::add",
                invocation: Invocation::new(add_args()),
                op_outputs: Some(&[&[2, 3], &[2, 3]]),
                expected: Some(Disagreement::Shape(ShapeMismatch::Count {
                    expected: 2,
                    actual: 1,
                })),
            },
            Case {
                op: "test::add",
                invocation: Invocation::new(add_args()),
                op_outputs: Some(&[&[1, 2, 3]]),
                expected: Some(Disagreement::Shape(ShapeMismatch::Rank {
                    output: 0,
                    expected: vec![1, 2, 3],
                    actual: Shape::from([2, 3]),
                })),
            },
            Case {
                op: "test::add",
                invocation: Invocation::new(add_args()),
                op_outputs: Some(&[&[2, 4]]),
                expected: Some(Disagreement::Shape(ShapeMismatch::Dimension {
                    output: 0,
                    dim: 1,
                    expected: vec![2, 4],
                    actual: Shape::from([2, 3]),
                })),
            },
            Case {
                op: "test::pair",
                invocation: Invocation::new([tensor(&[4])]),
                op_outputs: Some(&[&[4], &[4]]),
                expected: None,
            },
        ];

        let lib = test_library();
        cases.test_each(|case| {
            let func = lib.get(&op(case.op)).unwrap();
            let oracle = match case.op_outputs {
                Some(outputs) => FakeOracle::returning(outputs),
                None => FakeOracle::failing(),
            };
            let result = Verifier::new(&oracle).verify_invocation(func, &case.invocation);

            // The operator is evaluated even when the shape function fails.
            assert_eq!(oracle.calls.get(), 1);

            match (&result, &case.expected) {
                (Ok(_), None) => {}
                (Err(err), Some(expected)) => {
                    assert_eq!(err.op, op(case.op));
                    assert_eq!(err.invocation, case.invocation.to_string());
                    assert_eq!(err.reason, VerifyFailure::Disagreement(expected.clone()));
                }
                _ => panic!("expected {:?}, got {:?}", case.expected, result),
            }
        });
    }

    #[test]
    fn test_unknown_dim_never_matches() {
        let lib = test_library();
        let func = lib.get(&op("test::unknown")).unwrap();
        let oracle = FakeOracle::returning(&[&[0]]);
        let result = Verifier::new(&oracle).verify_invocation(func, &Invocation::new([tensor(&[3])]));
        let err = result.unwrap_err();
        assert!(matches!(
            err.reason,
            VerifyFailure::Disagreement(Disagreement::Shape(ShapeMismatch::Dimension { .. }))
        ));
    }

    #[test]
    fn test_verify_function_is_fail_fast() {
        let mut lib = test_library();
        lib.register("test::error2", signature!["self": Tensor => 1], |_| {
            Err(ShapeError::InvalidValue("always fails"))
        })
        .unwrap()
        .invocations([
            Invocation::error([tensor(&[1])]),
            Invocation::new([tensor(&[2])]),
            Invocation::new([tensor(&[3])]),
        ]);

        let oracle = FakeOracle::failing();
        let func = lib.get(&op("test::error2")).unwrap();
        let err = Verifier::new(&oracle).verify_function(func).unwrap_err();

        assert_eq!(err.invocation, "Invocation(tensor[2])");
        assert_eq!(oracle.calls.get(), 2);
        assert!(err.to_string().starts_with(
            "verification of test::error2 failed for Invocation(tensor[2]): both sides failed"
        ));
    }

    #[test]
    fn test_verified_outputs() {
        let mut lib = test_library();
        lib.register("test::neg", signature!["self": Tensor => 1], |args| {
            Ok(args.tensor("self")?.into())
        })
        .unwrap()
        .invocations([Invocation::new([tensor(&[2, 5])])]);

        let oracle = FakeOracle::returning(&[&[2, 5]]);
        let func = lib.get(&op("test::neg")).unwrap();
        let verified = Verifier::new(&oracle).verify_function(func).unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].outputs, Some(vec![Shape::from([2, 5])]));

        let func = lib.get(&op("test::error")).unwrap();
        let oracle = FakeOracle::failing();
        let verified = Verifier::new(&oracle)
            .verify_invocation(func, &Invocation::error([tensor(&[2])]))
            .unwrap();
        assert_eq!(verified.outputs, None);
    }

    #[test]
    fn test_tensor_keyword_is_fatal() {
        let lib = test_library();
        let func = lib.get(&op("test::add")).unwrap();
        let oracle = FakeOracle::returning(&[&[2, 3]]);
        let invocation = Invocation::new([tensor(&[2, 3])]).kwarg("other", tensor(&[3]));
        let err = Verifier::new(&oracle)
            .verify_invocation(func, &invocation)
            .unwrap_err();
        assert!(matches!(err.reason, VerifyFailure::Projection(_)));
        assert_eq!(oracle.calls.get(), 0);
    }
}
