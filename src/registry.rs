//! Registry of operator schemas, used to check that shape function
//! signatures match the operators they describe.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::library::{ShapeFunction, ShapeLibrary};
use crate::op_name::OpName;
use crate::signature::{ArgType, DefaultValue, Param, Signature};

/// Schema table compiled into the library.
const EMBEDDED_SCHEMAS: &str = include_str!("registry/schemas.txt");

/// Errors when loading a registry or checking shape functions against it.
#[derive(Debug)]
pub enum RegistryError {
    /// The schema table could not be read.
    Io {
        path: String,
        error: std::io::Error,
    },

    /// A line of the schema table could not be parsed.
    Parse { line: usize, message: String },

    /// The schema table has more than one entry for an operator.
    DuplicateSchema { line: usize, op: OpName },

    /// A shape function's operator is missing from the registry.
    NotRegistered(OpName),

    /// A shape function's signature differs from the one derived from its
    /// operator's schema.
    SignatureMismatch {
        op: OpName,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::Io { path, error } => {
                write!(f, "failed to read registry \"{}\": {}", path, error)
            }
            RegistryError::Parse { line, message } => {
                write!(f, "registry line {}: {}", line, message)
            }
            RegistryError::DuplicateSchema { line, op } => {
                write!(f, "registry line {}: duplicate schema for {}", line, op)
            }
            RegistryError::NotRegistered(op) => {
                write!(f, "operator {} is not in the registry", op)
            }
            RegistryError::SignatureMismatch {
                op,
                expected,
                actual,
            } => write!(
                f,
                "signature mismatch for {}: expected {}, got {}",
                op, expected, actual
            ),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Split `s` on `sep` where it is not nested inside brackets or parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Find the index of the parenthesis which closes the one at `open`.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in s[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove alias annotations such as `(a!)` from a schema type.
fn strip_alias(ty: &str) -> String {
    let mut out = String::with_capacity(ty.len());
    let mut depth = 0;
    for c in ty.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn is_int_like(ty: &str) -> bool {
    matches!(
        ty,
        "int" | "SymInt" | "ScalarType" | "Layout" | "MemoryFormat"
    )
}

/// Type of a schema parameter, as seen by a shape function.
struct SchemaType {
    ty: ArgType,

    /// Length of a sized list type such as `int[2]`.
    list_len: Option<usize>,
}

fn parse_type(ty: &str) -> Result<SchemaType, String> {
    let (ty, optional) = match ty.strip_suffix('?') {
        Some(ty) => (ty, true),
        None => (ty, false),
    };

    let (arg_type, list_len) = if let Some(elem) = ty.strip_suffix(']') {
        let (elem, len) = elem
            .split_once('[')
            .ok_or_else(|| format!("malformed list type \"{}\"", ty))?;
        let list_len = if len.is_empty() {
            None
        } else {
            Some(
                len.parse::<usize>()
                    .map_err(|_| format!("invalid list length in \"{}\"", ty))?,
            )
        };
        let arg_type = match elem {
            "Tensor" => ArgType::TensorList,
            "Tensor?" => ArgType::OptTensorList,
            elem if is_int_like(elem) => ArgType::IntList,
            _ => return Err(format!("unsupported list type \"{}\"", ty)),
        };
        (arg_type, list_len)
    } else {
        let arg_type = match ty {
            "Tensor" => ArgType::Tensor,
            "float" | "Scalar" => ArgType::Float,
            "bool" => ArgType::Bool,
            "str" => ArgType::Str,
            "Device" => ArgType::Device,
            "Generator" => ArgType::Any,
            ty if is_int_like(ty) => ArgType::Int,
            _ => return Err(format!("unsupported type \"{}\"", ty)),
        };
        (arg_type, None)
    };

    let ty = if optional {
        arg_type.to_optional()
    } else {
        arg_type
    };
    Ok(SchemaType { ty, list_len })
}

fn parse_int(value: &str) -> Result<i64, String> {
    match value {
        "contiguous_format" => Ok(0),
        _ => value
            .parse()
            .map_err(|_| format!("invalid int default \"{}\"", value)),
    }
}

fn parse_default(value: &str, ty: &SchemaType) -> Result<DefaultValue, String> {
    if value == "None" {
        return Ok(DefaultValue::None);
    }

    let default = match ty.ty {
        ArgType::Int | ArgType::OptInt => DefaultValue::Int(parse_int(value)?),
        ArgType::IntList | ArgType::OptIntList => {
            if let Some(items) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
                let items = items
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(parse_int)
                    .collect::<Result<_, _>>()?;
                DefaultValue::IntList(items)
            } else {
                // A scalar default for a sized list is repeated for each
                // element.
                let len = ty
                    .list_len
                    .ok_or_else(|| format!("scalar default \"{}\" for unsized list", value))?;
                DefaultValue::IntList(vec![parse_int(value)?; len])
            }
        }
        ArgType::Float | ArgType::OptFloat => DefaultValue::Float(
            value
                .parse()
                .map_err(|_| format!("invalid float default \"{}\"", value))?,
        ),
        ArgType::Bool | ArgType::OptBool => match value {
            "True" => DefaultValue::Bool(true),
            "False" => DefaultValue::Bool(false),
            _ => return Err(format!("invalid bool default \"{}\"", value)),
        },
        ArgType::Str | ArgType::OptStr => {
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .ok_or_else(|| format!("invalid str default {}", value))?;
            DefaultValue::Str(Cow::Owned(unquoted.to_string()))
        }
        _ => return Err(format!("unsupported default \"{}\"", value)),
    };
    Ok(default)
}

fn parse_param(param: &str) -> Result<Param, String> {
    let (decl, default) = match param.split_once('=') {
        Some((decl, default)) => (decl.trim(), Some(default.trim())),
        None => (param, None),
    };
    let (ty, name) = decl
        .rsplit_once(' ')
        .ok_or_else(|| format!("parameter \"{}\" has no name", param))?;
    let ty = parse_type(&strip_alias(ty.trim()))?;
    let default = default.map(|value| parse_default(value, &ty)).transpose()?;

    Ok(Param {
        name: Cow::Owned(name.trim().to_string()),
        ty: ty.ty,
        default,
    })
}

/// Count the values returned by a schema, eg. `Tensor` or
/// `(Tensor values, Tensor indices)`.
fn count_returns(returns: &str) -> usize {
    match returns.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) if inner.trim().is_empty() => 0,
        Some(inner) => split_top_level(inner, ',').len(),
        None => 1,
    }
}

/// Parse an operator schema into the operator's name and the signature
/// expected for its shape function.
pub fn parse_schema(schema: &str) -> Result<(OpName, Signature), String> {
    let open = schema
        .find('(')
        .ok_or_else(|| "missing parameter list".to_string())?;
    let op: OpName = schema[..open].trim().parse().map_err(|e| format!("{}", e))?;
    let close = matching_paren(schema, open)
        .ok_or_else(|| "unterminated parameter list".to_string())?;

    let returns = schema[close + 1..]
        .trim()
        .strip_prefix("->")
        .ok_or_else(|| "missing return type".to_string())?
        .trim();

    let params_text = schema[open + 1..close].trim();
    let params = if params_text.is_empty() {
        Vec::new()
    } else {
        split_top_level(params_text, ',')
            .into_iter()
            .map(str::trim)
            .filter(|param| *param != "*")
            .map(parse_param)
            .collect::<Result<_, _>>()?
    };

    Ok((op, Signature::new(params, count_returns(returns))))
}

/// Canonical operator schemas, indexed by operator name.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: FxHashMap<OpName, Signature>,
}

impl Registry {
    /// Parse a schema table with one schema per line. Blank lines and lines
    /// starting with `#` are ignored.
    pub fn parse(text: &str) -> Result<Registry, RegistryError> {
        let mut schemas = FxHashMap::default();
        for (i, line) in text.lines().enumerate() {
            let line_num = i + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (op, signature) = parse_schema(line).map_err(|message| RegistryError::Parse {
                line: line_num,
                message,
            })?;
            if schemas.contains_key(&op) {
                return Err(RegistryError::DuplicateSchema { line: line_num, op });
            }
            schemas.insert(op, signature);
        }
        Ok(Registry { schemas })
    }

    /// Load the schema table that is compiled into the library.
    pub fn embedded() -> Result<Registry, RegistryError> {
        Registry::parse(EMBEDDED_SCHEMAS)
    }

    /// Load a schema table from a file.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Registry, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| RegistryError::Io {
            path: path.display().to_string(),
            error,
        })?;
        Registry::parse(&text)
    }

    pub fn contains(&self, op: &OpName) -> bool {
        self.schemas.contains_key(op)
    }

    /// Return the signature expected for the shape function of `op`.
    pub fn expected_signature(&self, op: &OpName) -> Option<&Signature> {
        self.schemas.get(op)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Check that a shape function's declared signature matches the one
    /// derived from its operator's schema.
    ///
    /// Signatures are compared by their canonical text, so a difference in
    /// parameter names, order, types or defaults is a mismatch.
    pub fn check(&self, func: &ShapeFunction) -> Result<(), RegistryError> {
        let expected = self
            .expected_signature(func.op())
            .ok_or_else(|| RegistryError::NotRegistered(func.op().clone()))?
            .to_string();
        let actual = func.signature().to_string();
        if expected != actual {
            return Err(RegistryError::SignatureMismatch {
                op: func.op().clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check every function in `library` which is not registry-exempt.
    pub fn check_library(&self, library: &ShapeLibrary) -> Result<(), RegistryError> {
        for func in library.iter() {
            if func.is_registry_exempt() {
                tracing::warn!(op = %func.op(), "skipping registry check for exempt function");
                continue;
            }
            self.check(func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{parse_schema, Registry, RegistryError};
    use crate::algorithms::ShapeError;
    use crate::library::ShapeLibrary;
    use crate::shape::{Returned, Shape};
    use crate::signature::{signature, BoundArgs, EMPTY, NONE};

    fn scalar(_: &BoundArgs<Vec<usize>>) -> Result<Returned<Shape>, ShapeError> {
        Ok(Shape::scalar().into())
    }

    #[test]
    fn test_parse_schema() {
        #[derive(Debug)]
        struct Case {
            schema: &'static str,
            expected: &'static str,
        }

        let cases = [
            Case {
                schema: "aten::topk(Tensor self, int k, int dim=-1, bool largest=True, bool sorted=True) -> (Tensor values, Tensor indices)",
                expected: "(self: shape, k: int, dim: int = -1, largest: bool = true, sorted: bool = true) -> (shape, shape)",
            },
            Case {
                schema: "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
                expected: "(self: shape, other: shape, alpha: float = 1.0) -> shape",
            },
            Case {
                schema: "aten::max_pool2d(Tensor self, int[2] kernel_size, int[2] stride=[], int[2] padding=0, int[2] dilation=1, bool ceil_mode=False) -> Tensor",
                expected: "(self: shape, kernel_size: int[], stride: int[] = [], padding: int[] = [0, 0], dilation: int[] = [1, 1], ceil_mode: bool = false) -> shape",
            },
            Case {
                schema: "aten::resize_(Tensor(a!) self, int[] size, *, MemoryFormat? memory_format=None) -> Tensor(a!)",
                expected: "(self: shape, size: int[], memory_format: int? = None) -> shape",
            },
            Case {
                schema: "aten::index.Tensor(Tensor self, Tensor?[] indices) -> Tensor",
                expected: "(self: shape, indices: shape?[]) -> shape",
            },
            Case {
                schema: "aten::linalg_vector_norm(Tensor self, Scalar ord=2, int[1]? dim=None, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor",
                expected: "(self: shape, ord: float = 2.0, dim: int[]? = None, keepdim: bool = false, dtype: int? = None) -> shape",
            },
            Case {
                schema: "aten::contiguous(Tensor(a) self, *, MemoryFormat memory_format=contiguous_format) -> Tensor(a)",
                expected: "(self: shape, memory_format: int = 0) -> shape",
            },
            Case {
                schema: "aten::gelu(Tensor self, *, str approximate=\"none\") -> Tensor",
                expected: "(self: shape, approximate: str = \"none\") -> shape",
            },
            Case {
                schema: "aten::layer_norm(Tensor input, int[] normalized_shape, Tensor? weight=None, Tensor? bias=None, float eps=1e-05, bool cudnn_enable=True) -> Tensor",
                expected: "(input: shape, normalized_shape: int[], weight: shape? = None, bias: shape? = None, eps: float = 1e-5, cudnn_enable: bool = true) -> shape",
            },
            Case {
                schema: "aten::zeros(int[] size, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None) -> Tensor",
                expected: "(size: int[], dtype: int? = None, layout: int? = None, device: device? = None, pin_memory: bool? = None) -> shape",
            },
            Case {
                schema: "aten::bernoulli(Tensor self, *, Generator? generator=None) -> Tensor",
                expected: "(self: shape, generator: any = None) -> shape",
            },
            Case {
                schema: "aten::cat(Tensor[] tensors, int dim=0) -> Tensor",
                expected: "(tensors: shape[], dim: int = 0) -> shape",
            },
        ];

        cases.test_each(|case| {
            let (_, signature) = parse_schema(case.schema).unwrap();
            assert_eq!(signature.to_string(), case.expected);
        });
    }

    #[test]
    fn test_parse_schema_errors() {
        for schema in [
            "aten::foo",
            "aten::foo(Tensor self",
            "aten::foo(Tensor self)",
            "foo(Tensor self) -> Tensor",
            "aten::foo(Quantity self) -> Tensor",
            "aten::foo(bool flag=Maybe) -> Tensor",
            "aten::foo(int[] dims=1) -> Tensor",
        ] {
            assert!(parse_schema(schema).is_err(), "parsed {}", schema);
        }
    }

    #[test]
    fn test_parse_table() {
        let registry = Registry::parse(
            "# Comment

aten::neg(Tensor self) -> Tensor
aten::cat(Tensor[] tensors, int dim=0) -> Tensor
",
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&"aten::neg".parse().unwrap()));
        assert!(!registry.contains(&"aten::neg.out".parse().unwrap()));

        let err = Registry::parse("aten::neg(Tensor self) -> Tensor\naten::neg(Tensor x) -> Tensor")
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSchema { line: 2, .. }));

        let err = Registry::parse("\n\naten::neg(Tensor self -> Tensor").unwrap_err();
        assert!(matches!(err, RegistryError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_embedded_registry() {
        let registry = Registry::embedded().unwrap();
        assert!(!registry.is_empty());
        assert!(registry.contains(&"prim::NumToTensor.Scalar".parse().unwrap()));
    }

    #[test]
    fn test_load_file_error() {
        let err = Registry::load_file("/nonexistent/schemas.txt").unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }

    #[test]
    fn test_check_detects_drift() {
        let registry = Registry::parse(
            "aten::topk(Tensor self, int k, int dim=-1, bool largest=True, bool sorted=True) -> (Tensor values, Tensor indices)
aten::max_pool2d(Tensor self, int[2] kernel_size, int[2] stride=[], int[2] padding=0, int[2] dilation=1, bool ceil_mode=False) -> Tensor",
        )
        .unwrap();

        let mut lib = ShapeLibrary::new();

        // Matching signature.
        lib.register(
            "aten::max_pool2d",
            signature![
                "self": Tensor,
                "kernel_size": IntList,
                "stride": IntList = EMPTY,
                "padding": IntList = [0, 0],
                "dilation": IntList = [1, 1],
                "ceil_mode": Bool = false
                => 1
            ],
            scalar,
        )
        .unwrap();

        // Changed default.
        lib.register(
            "aten::topk",
            signature![
                "self": Tensor,
                "k": Int,
                "dim": Int = 0,
                "largest": Bool = true,
                "sorted": Bool = true
                => 2
            ],
            scalar,
        )
        .unwrap();

        // Not registered, but exempt.
        lib.register("aten::zero", signature!["self": Tensor => 1], scalar)
            .unwrap()
            .registry_exempt();

        let max_pool = lib.get(&"aten::max_pool2d".parse().unwrap()).unwrap();
        assert!(registry.check(max_pool).is_ok());

        let topk = lib.get(&"aten::topk".parse().unwrap()).unwrap();
        let err = registry.check(topk).unwrap_err();
        assert!(matches!(err, RegistryError::SignatureMismatch { .. }));
        assert!(err.to_string().contains("dim: int = 0"));

        let zero = lib.get(&"aten::zero".parse().unwrap()).unwrap();
        assert!(matches!(
            registry.check(zero),
            Err(RegistryError::NotRegistered(_))
        ));

        assert!(matches!(
            registry.check_library(&lib),
            Err(RegistryError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_check_detects_reordering() {
        let registry =
            Registry::parse("aten::gather(Tensor self, int dim, Tensor index, *, bool sparse_grad=False) -> Tensor")
                .unwrap();
        let mut lib = ShapeLibrary::new();
        lib.register(
            "aten::gather",
            signature![
                "self": Tensor,
                "index": Tensor,
                "dim": Int,
                "sparse_grad": Bool = false
                => 1
            ],
            scalar,
        )
        .unwrap();
        let missing = lib
            .register(
                "aten::scatter",
                signature!["self": Tensor, "weight": OptTensor = NONE => 1],
                scalar,
            )
            .unwrap()
            .op()
            .clone();

        let gather = lib.get(&"aten::gather".parse().unwrap()).unwrap();
        assert!(matches!(
            registry.check(gather),
            Err(RegistryError::SignatureMismatch { .. })
        ));
        let scatter = lib.get(&missing).unwrap();
        assert!(matches!(
            registry.check(scatter),
            Err(RegistryError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_all_builtin_functions_match_registry() {
        let registry = Registry::embedded().unwrap();
        let lib = ShapeLibrary::with_all_ops().unwrap();
        for func in lib.iter().filter(|f| !f.is_registry_exempt()) {
            if let Err(err) = registry.check(func) {
                panic!("{}", err);
            }
        }
    }
}
