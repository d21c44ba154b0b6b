//! Reference implementations of tensor operators, used as the oracle when
//! verifying the shape functions in [`rten_shape_lib`].
//!
//! [`ReferenceOracle`] evaluates an operator on real tensors. Arguments are
//! bound to the operator's parameters using the schema in a [`Registry`], so
//! that defaults and keyword arguments are resolved the same way for every
//! operator. An operator which rejects its inputs returns an [`OpError`]
//! instead of panicking.
//!
//! ```
//! use rten_reference::ReferenceOracle;
//! use rten_shape_lib::{generate, Registry, ShapeLibrary};
//!
//! let library = ShapeLibrary::with_all_ops().unwrap();
//! let registry = Registry::embedded().unwrap();
//! let oracle = ReferenceOracle::new().unwrap();
//! let manifest = generate(&library, &oracle, &registry).unwrap();
//! assert_eq!(manifest.functions.len(), library.len());
//! ```

use rten_shape_lib::{
    CallArgs, OpError, OpName, Oracle, RealTensor, Registry, RegistryError, Returned,
};

mod ops;

pub use ops::{conv, conv_transpose, erf, gelu, log_softmax, matmul, mm, softmax, ConvParams};

use ops::OpTable;

/// Oracle which evaluates operators using simple reference implementations.
pub struct ReferenceOracle {
    registry: Registry,
    ops: OpTable,
}

impl ReferenceOracle {
    /// Create an oracle which binds arguments using the embedded operator
    /// registry.
    pub fn new() -> Result<ReferenceOracle, RegistryError> {
        Ok(Self::with_registry(Registry::embedded()?))
    }

    /// Create an oracle which binds arguments using the schemas in
    /// `registry`.
    pub fn with_registry(registry: Registry) -> ReferenceOracle {
        ReferenceOracle {
            registry,
            ops: OpTable::with_all_ops(),
        }
    }

    /// Return true if the oracle has an implementation of `op`.
    pub fn supports(&self, op: &OpName) -> bool {
        self.ops.get(&op.to_string()).is_some()
    }

    /// Return the number of operators the oracle implements.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Oracle for ReferenceOracle {
    fn call(
        &self,
        op: &OpName,
        args: &CallArgs<RealTensor>,
    ) -> Result<Returned<RealTensor>, OpError> {
        let name = op.to_string();
        let (Some(op_fn), Some(signature)) =
            (self.ops.get(&name), self.registry.expected_signature(op))
        else {
            return Err(OpError::UnknownOperator(name));
        };
        let bound = signature.bind(args)?;
        tracing::trace!(op = %name, "evaluating reference operator");
        op_fn(&bound)
    }
}
