//! Signatures of shape functions and binding of call arguments to their
//! parameters.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use crate::invocation::{Arg, CallArgs};

/// Type of a shape function parameter.
///
/// Tensor parameters are passed to shape functions as shape descriptors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgType {
    Tensor,
    OptTensor,
    TensorList,
    OptTensorList,
    Int,
    OptInt,
    IntList,
    OptIntList,
    Float,
    OptFloat,
    Bool,
    OptBool,
    Str,
    OptStr,
    Device,
    OptDevice,
    Any,
}

impl ArgType {
    /// Return the optional version of this type.
    pub fn to_optional(self) -> ArgType {
        match self {
            ArgType::Tensor => ArgType::OptTensor,
            ArgType::Int => ArgType::OptInt,
            ArgType::IntList => ArgType::OptIntList,
            ArgType::Float => ArgType::OptFloat,
            ArgType::Bool => ArgType::OptBool,
            ArgType::Str => ArgType::OptStr,
            ArgType::Device => ArgType::OptDevice,
            other => other,
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ArgType::Tensor => "shape",
            ArgType::OptTensor => "shape?",
            ArgType::TensorList => "shape[]",
            ArgType::OptTensorList => "shape?[]",
            ArgType::Int => "int",
            ArgType::OptInt => "int?",
            ArgType::IntList => "int[]",
            ArgType::OptIntList => "int[]?",
            ArgType::Float => "float",
            ArgType::OptFloat => "float?",
            ArgType::Bool => "bool",
            ArgType::OptBool => "bool?",
            ArgType::Str => "str",
            ArgType::OptStr => "str?",
            ArgType::Device => "device",
            ArgType::OptDevice => "device?",
            ArgType::Any => "any",
        };
        write!(f, "{}", name)
    }
}

/// Default value of a parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Cow<'static, str>),
    IntList(Vec<i64>),
}

impl DefaultValue {
    fn to_arg<T>(&self) -> Arg<T> {
        match self {
            DefaultValue::None => Arg::None,
            DefaultValue::Int(x) => Arg::Int(*x),
            DefaultValue::Float(x) => Arg::Float(*x),
            DefaultValue::Bool(x) => Arg::Bool(*x),
            DefaultValue::Str(x) => Arg::Str(x.to_string()),
            DefaultValue::IntList(xs) => Arg::List(xs.iter().map(|&x| Arg::Int(x)).collect()),
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DefaultValue::None => write!(f, "None"),
            DefaultValue::Int(x) => write!(f, "{}", x),
            DefaultValue::Float(x) => write!(f, "{:?}", x),
            DefaultValue::Bool(x) => write!(f, "{}", x),
            DefaultValue::Str(x) => write!(f, "{:?}", x),
            DefaultValue::IntList(xs) => write!(f, "{:?}", xs),
        }
    }
}

/// Conversion of literals in [`signature!`] declarations into default values.
pub trait IntoDefault {
    fn into_default(self) -> DefaultValue;
}

impl IntoDefault for DefaultValue {
    fn into_default(self) -> DefaultValue {
        self
    }
}

impl IntoDefault for i32 {
    fn into_default(self) -> DefaultValue {
        DefaultValue::Int(self as i64)
    }
}

impl IntoDefault for f64 {
    fn into_default(self) -> DefaultValue {
        DefaultValue::Float(self)
    }
}

impl IntoDefault for bool {
    fn into_default(self) -> DefaultValue {
        DefaultValue::Bool(self)
    }
}

impl IntoDefault for &'static str {
    fn into_default(self) -> DefaultValue {
        DefaultValue::Str(Cow::Borrowed(self))
    }
}

impl<const N: usize> IntoDefault for [i32; N] {
    fn into_default(self) -> DefaultValue {
        DefaultValue::IntList(self.iter().map(|&x| x as i64).collect())
    }
}

/// Default value for optional parameters which are absent.
pub const NONE: DefaultValue = DefaultValue::None;

/// Default value for list parameters which are empty.
pub const EMPTY: [i32; 0] = [];

/// A named parameter of a shape function.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Cow<'static, str>,
    pub ty: ArgType,
    pub default: Option<DefaultValue>,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)?;
        if let Some(default) = &self.default {
            write!(f, " = {}", default)?;
        }
        Ok(())
    }
}

/// Declared signature of a shape function.
///
/// The signature lists the function's parameters in order, together with
/// their types and defaults, and the number of shapes it returns. Its
/// `Display` output is the canonical text compared against the operator
/// registry.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
    num_returns: usize,
}

impl Signature {
    pub fn new(params: Vec<Param>, num_returns: usize) -> Signature {
        Signature {
            params,
            num_returns,
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn num_returns(&self) -> usize {
        self.num_returns
    }

    /// Match positional and keyword arguments to parameters, filling in
    /// defaults for any that are missing.
    pub fn bind<T: Clone>(&self, args: &CallArgs<T>) -> Result<BoundArgs<T>, BindError> {
        if args.positional.len() > self.params.len() {
            return Err(BindError::TooManyArguments {
                max: self.params.len(),
                given: args.positional.len(),
            });
        }

        let mut slots: Vec<Option<Arg<T>>> = args.positional.iter().cloned().map(Some).collect();
        slots.resize(self.params.len(), None);

        for (name, value) in &args.keywords {
            let Some(index) = self.params.iter().position(|p| p.name == name.as_str()) else {
                return Err(BindError::UnexpectedKeyword(name.clone()));
            };
            if slots[index].is_some() {
                return Err(BindError::DuplicateArgument(name.clone()));
            }
            slots[index] = Some(value.clone());
        }

        let values = self
            .params
            .iter()
            .zip(slots)
            .map(|(param, slot)| {
                let value = match (slot, &param.default) {
                    (Some(value), _) => value,
                    (None, Some(default)) => default.to_arg(),
                    (None, None) => return Err(BindError::MissingArgument(param.name.to_string())),
                };
                Ok((param.name.clone(), value))
            })
            .collect::<Result<_, _>>()?;

        Ok(BoundArgs { values })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ") -> ")?;
        match self.num_returns {
            1 => write!(f, "{}", ArgType::Tensor),
            n => {
                write!(f, "(")?;
                for i in 0..n {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ArgType::Tensor)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Declare a [`Signature`].
///
/// ```text
/// signature!["self": Tensor, "k": Int, "dim": Int = -1 => 2]
/// ```
///
/// Each parameter is a name, an [`ArgType`] variant and an optional default
/// (a literal, [`NONE`] or [`EMPTY`]). The number after `=>` is the number of
/// shapes returned. A count other than 1 means the function returns a tuple.
macro_rules! signature {
    ($($name:literal : $ty:ident $(= $default:expr)?),* $(,)? => $returns:literal) => {
        $crate::signature::Signature::new(
            vec![$($crate::signature::Param {
                name: std::borrow::Cow::Borrowed($name),
                ty: $crate::signature::ArgType::$ty,
                default: signature!(@default $($default)?),
            }),*],
            $returns,
        )
    };
    (@default) => { None };
    (@default $default:expr) => {
        Some($crate::signature::IntoDefault::into_default($default))
    };
}

pub(crate) use signature;

/// Errors when binding arguments to parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum BindError {
    /// More positional arguments were given than there are parameters.
    TooManyArguments { max: usize, given: usize },

    /// A keyword argument does not match any parameter.
    UnexpectedKeyword(String),

    /// A parameter was given both positionally and as a keyword argument.
    DuplicateArgument(String),

    /// A parameter without a default was not given a value.
    MissingArgument(String),

    /// A function asked for a parameter that is not in its signature.
    UnknownParameter(String),

    /// An argument does not have the type expected for its parameter.
    WrongType { name: String, expected: &'static str },
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BindError::TooManyArguments { max, given } => write!(
                f,
                "too many positional arguments (expected at most {}, got {})",
                max, given
            ),
            BindError::UnexpectedKeyword(name) => {
                write!(f, "unexpected keyword argument \"{}\"", name)
            }
            BindError::DuplicateArgument(name) => {
                write!(f, "multiple values for argument \"{}\"", name)
            }
            BindError::MissingArgument(name) => write!(f, "missing argument \"{}\"", name),
            BindError::UnknownParameter(name) => write!(f, "unknown parameter \"{}\"", name),
            BindError::WrongType { name, expected } => {
                write!(f, "argument \"{}\" should be {}", name, expected)
            }
        }
    }
}

impl Error for BindError {}

/// Arguments bound to the parameters of a signature.
///
/// Accessors return owned values, so a caller can modify what it receives
/// without affecting other accessors or the original invocation.
#[derive(Clone, Debug)]
pub struct BoundArgs<T> {
    values: Vec<(Cow<'static, str>, Arg<T>)>,
}

impl<T: Clone> BoundArgs<T> {
    fn arg(&self, name: &str) -> Result<&Arg<T>, BindError> {
        self.values
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
            .ok_or_else(|| BindError::UnknownParameter(name.to_string()))
    }

    fn wrong_type(name: &str, expected: &'static str) -> BindError {
        BindError::WrongType {
            name: name.to_string(),
            expected,
        }
    }

    pub fn tensor(&self, name: &str) -> Result<T, BindError> {
        match self.arg(name)? {
            Arg::Tensor(t) => Ok(t.clone()),
            _ => Err(Self::wrong_type(name, "a tensor")),
        }
    }

    pub fn opt_tensor(&self, name: &str) -> Result<Option<T>, BindError> {
        match self.arg(name)? {
            Arg::Tensor(t) => Ok(Some(t.clone())),
            Arg::None => Ok(None),
            _ => Err(Self::wrong_type(name, "a tensor or None")),
        }
    }

    pub fn tensors(&self, name: &str) -> Result<Vec<T>, BindError> {
        self.list(name, "a list of tensors", |item| match item {
            Arg::Tensor(t) => Some(t.clone()),
            _ => None,
        })
    }

    pub fn opt_tensors(&self, name: &str) -> Result<Vec<Option<T>>, BindError> {
        self.list(name, "a list of optional tensors", |item| match item {
            Arg::Tensor(t) => Some(Some(t.clone())),
            Arg::None => Some(None),
            _ => None,
        })
    }

    pub fn int(&self, name: &str) -> Result<i64, BindError> {
        match self.arg(name)? {
            Arg::Int(x) => Ok(*x),
            _ => Err(Self::wrong_type(name, "an int")),
        }
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, BindError> {
        match self.arg(name)? {
            Arg::Int(x) => Ok(Some(*x)),
            Arg::None => Ok(None),
            _ => Err(Self::wrong_type(name, "an int or None")),
        }
    }

    pub fn ints(&self, name: &str) -> Result<Vec<i64>, BindError> {
        self.list(name, "a list of ints", |item| match item {
            Arg::Int(x) => Some(*x),
            _ => None,
        })
    }

    pub fn opt_ints(&self, name: &str) -> Result<Option<Vec<i64>>, BindError> {
        match self.arg(name)? {
            Arg::None => Ok(None),
            _ => self.ints(name).map(Some),
        }
    }

    /// Return a float argument. Ints are accepted and converted.
    pub fn float(&self, name: &str) -> Result<f64, BindError> {
        match self.arg(name)? {
            Arg::Float(x) => Ok(*x),
            Arg::Int(x) => Ok(*x as f64),
            _ => Err(Self::wrong_type(name, "a float")),
        }
    }

    pub fn opt_float(&self, name: &str) -> Result<Option<f64>, BindError> {
        match self.arg(name)? {
            Arg::None => Ok(None),
            _ => self.float(name).map(Some),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, BindError> {
        match self.arg(name)? {
            Arg::Bool(x) => Ok(*x),
            _ => Err(Self::wrong_type(name, "a bool")),
        }
    }

    pub fn str(&self, name: &str) -> Result<String, BindError> {
        match self.arg(name)? {
            Arg::Str(x) => Ok(x.clone()),
            _ => Err(Self::wrong_type(name, "a string")),
        }
    }

    fn list<U>(
        &self,
        name: &str,
        expected: &'static str,
        item: impl Fn(&Arg<T>) -> Option<U>,
    ) -> Result<Vec<U>, BindError> {
        match self.arg(name)? {
            Arg::List(items) => items
                .iter()
                .map(|x| item(x).ok_or_else(|| Self::wrong_type(name, expected)))
                .collect(),
            _ => Err(Self::wrong_type(name, expected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{signature, BindError, DefaultValue, EMPTY, NONE};
    use crate::invocation::{ints, tensor, Arg, Invocation};

    #[test]
    fn test_signature_display() {
        let sig = signature![
            "self": Tensor,
            "k": Int,
            "dim": Int = -1,
            "largest": Bool = true,
            "sorted": Bool = true
            => 2
        ];
        assert_eq!(
            sig.to_string(),
            "(self: shape, k: int, dim: int = -1, largest: bool = true, sorted: bool = true) -> (shape, shape)"
        );

        let sig = signature![
            "self": Tensor,
            "kernel_size": IntList,
            "stride": IntList = EMPTY,
            "padding": IntList = [0, 0],
            "bias": OptTensor = NONE,
            "eps": Float = 1e-5,
            "mode": Str = "constant"
            => 1
        ];
        assert_eq!(
            sig.to_string(),
            "(self: shape, kernel_size: int[], stride: int[] = [], padding: int[] = [0, 0], \
             bias: shape? = None, eps: float = 1e-5, mode: str = \"constant\") -> shape"
        );
        assert_eq!(sig.params()[3].default, Some(DefaultValue::IntList(vec![0, 0])));
    }

    #[test]
    fn test_bind() {
        let sig = signature!["self": Tensor, "dim": Int = -1, "keepdim": Bool = false => 1];

        #[derive(Debug)]
        struct Case {
            invocation: Invocation,
            expected: Result<(i64, bool), BindError>,
        }

        let cases = [
            Case {
                invocation: Invocation::new([tensor(&[2, 3])]),
                expected: Ok((-1, false)),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3]), 0.into()]),
                expected: Ok((0, false)),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3])]).kwarg("keepdim", true),
                expected: Ok((-1, true)),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3]), 0.into()]).kwarg("dim", 1),
                expected: Err(BindError::DuplicateArgument("dim".into())),
            },
            Case {
                invocation: Invocation::new([tensor(&[2, 3])]).kwarg("axis", 1),
                expected: Err(BindError::UnexpectedKeyword("axis".into())),
            },
            Case {
                invocation: Invocation::new([]),
                expected: Err(BindError::MissingArgument("self".into())),
            },
            Case {
                invocation: Invocation::new([tensor(&[2]), 0.into(), true.into(), 1.into()]),
                expected: Err(BindError::TooManyArguments { max: 3, given: 4 }),
            },
        ];

        cases.test_each(|case| {
            let args = case.invocation.to_shape_args().unwrap();
            let result = sig
                .bind(&args)
                .and_then(|bound| Ok((bound.int("dim")?, bound.bool("keepdim")?)));
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_bound_args_accessors() {
        let sig = signature![
            "self": Tensor,
            "weight": OptTensor = NONE,
            "size": IntList,
            "alpha": Float = 1.0
            => 1
        ];
        let inv = Invocation::new([tensor(&[2, 3]), Arg::None, ints(&[4, 5]), 2.into()]);
        let bound = sig.bind(&inv.to_shape_args().unwrap()).unwrap();

        let mut shape = bound.tensor("self").unwrap();
        shape.push(7);
        assert_eq!(bound.tensor("self").unwrap(), vec![2, 3]);

        assert_eq!(bound.opt_tensor("weight").unwrap(), None);
        assert_eq!(bound.ints("size").unwrap(), vec![4, 5]);
        assert_eq!(bound.float("alpha").unwrap(), 2.0);
        assert!(matches!(
            bound.int("size"),
            Err(BindError::WrongType { .. })
        ));
        assert_eq!(
            bound.int("missing"),
            Err(BindError::UnknownParameter("missing".into()))
        );
    }
}
