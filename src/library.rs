//! Table of shape functions and their test cases.

use std::error::Error;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::algorithms::ShapeError;
use crate::invocation::{CallArgs, Invocation};
use crate::op_name::{OpName, ParseOpNameError};
use crate::shape::{Returned, Shape};
use crate::signature::{BoundArgs, Signature};

/// Function which computes the output shapes of an operator.
///
/// Tensor arguments are passed as shape descriptors.
pub type ShapeFn = fn(&BoundArgs<Vec<usize>>) -> Result<Returned<Shape>, ShapeError>;

/// A shape function together with its declared signature and the
/// invocations used to verify it.
#[derive(Clone)]
pub struct ShapeFunction {
    op: OpName,
    signature: Signature,
    func: ShapeFn,
    invocations: Vec<Invocation>,
    registry_exempt: bool,
}

impl ShapeFunction {
    pub fn new(op: OpName, signature: Signature, func: ShapeFn) -> ShapeFunction {
        ShapeFunction {
            op,
            signature,
            func,
            invocations: Vec::new(),
            registry_exempt: false,
        }
    }

    /// Add invocations which verify this function.
    pub fn invocations(&mut self, invocations: impl IntoIterator<Item = Invocation>) -> &mut Self {
        self.invocations.extend(invocations);
        self
    }

    /// Mark this function as exempt from the registry consistency check.
    ///
    /// This is used for operators whose schema cannot be expressed in the
    /// registry's type system.
    pub fn registry_exempt(&mut self) -> &mut Self {
        self.registry_exempt = true;
        self
    }

    pub fn op(&self) -> &OpName {
        &self.op
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn test_invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn is_registry_exempt(&self) -> bool {
        self.registry_exempt
    }

    /// Bind arguments to this function's signature and evaluate it.
    pub fn call(&self, args: &CallArgs<Vec<usize>>) -> Result<Returned<Shape>, ShapeError> {
        let bound = self.signature.bind(args)?;
        (self.func)(&bound)
    }
}

impl fmt::Debug for ShapeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ShapeFunction")
            .field("op", &self.op.to_string())
            .field("signature", &self.signature.to_string())
            .field("invocations", &self.invocations.len())
            .field("registry_exempt", &self.registry_exempt)
            .finish()
    }
}

/// Errors when building a [`ShapeLibrary`].
#[derive(Clone, Debug, PartialEq)]
pub enum LibraryError {
    /// An operator name could not be parsed.
    InvalidName(ParseOpNameError),

    /// More than one shape function was registered for an operator.
    DuplicateOperator(OpName),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LibraryError::InvalidName(err) => write!(f, "{}", err),
            LibraryError::DuplicateOperator(op) => {
                write!(f, "shape function for {} registered more than once", op)
            }
        }
    }
}

impl Error for LibraryError {}

impl From<ParseOpNameError> for LibraryError {
    fn from(err: ParseOpNameError) -> LibraryError {
        LibraryError::InvalidName(err)
    }
}

/// Set of shape functions, indexed by operator name.
///
/// New libraries are empty. To create a library with all built-in shape
/// functions, use [`ShapeLibrary::with_all_ops`].
#[derive(Debug, Default)]
pub struct ShapeLibrary {
    functions: Vec<ShapeFunction>,
    index: FxHashMap<OpName, usize>,
}

impl ShapeLibrary {
    pub fn new() -> ShapeLibrary {
        ShapeLibrary::default()
    }

    /// Create a library with all built-in shape functions registered.
    pub fn with_all_ops() -> Result<ShapeLibrary, LibraryError> {
        let mut lib = ShapeLibrary::new();
        crate::shape_fns::register_all(&mut lib)?;
        Ok(lib)
    }

    /// Register a shape function for the operator named `op`, written as
    /// `namespace::name.overload`.
    ///
    /// Returns the new entry so that invocations can be attached to it.
    pub fn register(
        &mut self,
        op: &str,
        signature: Signature,
        func: ShapeFn,
    ) -> Result<&mut ShapeFunction, LibraryError> {
        let op: OpName = op.parse()?;
        self.insert(ShapeFunction::new(op, signature, func))
    }

    /// Add a shape function to the library.
    pub fn insert(&mut self, func: ShapeFunction) -> Result<&mut ShapeFunction, LibraryError> {
        if self.index.contains_key(func.op()) {
            return Err(LibraryError::DuplicateOperator(func.op().clone()));
        }
        let pos = self.functions.len();
        self.index.insert(func.op().clone(), pos);
        self.functions.push(func);
        Ok(&mut self.functions[pos])
    }

    pub fn get(&self, op: &OpName) -> Option<&ShapeFunction> {
        self.index.get(op).map(|&pos| &self.functions[pos])
    }

    /// Iterate over functions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ShapeFunction> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{LibraryError, ShapeLibrary};
    use crate::algorithms::unary;
    use crate::invocation::{tensor, Invocation};
    use crate::shape::{Returned, Shape};
    use crate::signature::signature;

    #[test]
    fn test_register_and_call() {
        let mut lib = ShapeLibrary::new();
        lib.register("aten::neg", signature!["self": Tensor => 1], |args| {
            Ok(unary(&args.tensor("self")?).into())
        })
        .unwrap()
        .invocations([Invocation::new([tensor(&[2, 3])])]);

        assert_eq!(lib.len(), 1);
        let func = lib.get(&"aten::neg".parse().unwrap()).unwrap();
        assert_eq!(func.test_invocations().len(), 1);
        assert!(!func.is_registry_exempt());

        let args = func.test_invocations()[0].to_shape_args().unwrap();
        assert_eq!(func.call(&args), Ok(Returned::One(Shape::from([2, 3]))));

        let missing = Invocation::new([]).to_shape_args().unwrap();
        assert!(func.call(&missing).is_err());
    }

    #[test]
    fn test_duplicate_operator() {
        let mut lib = ShapeLibrary::new();
        let sig = signature!["self": Tensor => 1];
        lib.register("aten::neg", sig.clone(), |_| Ok(Shape::scalar().into()))
            .unwrap();
        let err = lib
            .register("aten::neg", sig.clone(), |_| Ok(Shape::scalar().into()))
            .unwrap_err();
        assert_eq!(
            err,
            LibraryError::DuplicateOperator("aten::neg".parse().unwrap())
        );

        // A different overload is a different operator.
        assert!(lib
            .register("aten::neg.out", sig, |_| Ok(Shape::scalar().into()))
            .is_ok());
    }

    #[test]
    fn test_invalid_name() {
        let mut lib = ShapeLibrary::new();
        let result = lib.register("neg", signature!["self": Tensor => 1], |_| {
            Ok(Shape::scalar().into())
        });
        assert!(matches!(result, Err(LibraryError::InvalidName(_))));
    }

    #[test]
    fn test_with_all_ops() {
        let lib = ShapeLibrary::with_all_ops().unwrap();
        assert!(!lib.is_empty());
        for func in lib.iter() {
            assert_eq!(lib.get(func.op()).map(|f| f.op()), Some(func.op()));
        }
    }
}
