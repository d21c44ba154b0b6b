//! Canonical operator names.

use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Canonical name of an operator, consisting of a namespace, a name and an
/// optional overload, written as `namespace::name.overload`.
///
/// The name of a shape function is derived from the operator it describes,
/// so two functions for the same operator have the same `OpName`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpName {
    namespace: String,
    name: String,
    overload: Option<String>,
}

impl OpName {
    pub fn new(namespace: &str, name: &str, overload: Option<&str>) -> OpName {
        OpName {
            namespace: namespace.to_string(),
            name: name.to_string(),
            overload: overload.map(|s| s.to_string()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overload(&self) -> Option<&str> {
        self.overload.as_deref()
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.name)?;
        if let Some(overload) = &self.overload {
            write!(f, ".{}", overload)?;
        }
        Ok(())
    }
}

/// Error when parsing an [`OpName`].
#[derive(Clone, Debug, PartialEq)]
pub struct ParseOpNameError(String);

impl fmt::Display for ParseOpNameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid operator name \"{}\"", self.0)
    }
}

impl Error for ParseOpNameError {}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for OpName {
    type Err = ParseOpNameError;

    fn from_str(s: &str) -> Result<OpName, ParseOpNameError> {
        let err = || ParseOpNameError(s.to_string());
        let (namespace, qualified_name) = s.split_once("::").ok_or_else(err)?;
        let (name, overload) = match qualified_name.split_once('.') {
            Some((name, overload)) => (name, Some(overload)),
            None => (qualified_name, None),
        };

        if !is_identifier(namespace)
            || !is_identifier(name)
            || !overload.map(is_identifier).unwrap_or(true)
        {
            return Err(err());
        }

        Ok(OpName::new(namespace, name, overload))
    }
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::OpName;

    #[test]
    fn test_parse() {
        #[derive(Debug)]
        struct Case {
            name: &'static str,
            expected: Option<(&'static str, &'static str, Option<&'static str>)>,
        }

        let cases = [
            Case {
                name: "aten::add.Tensor",
                expected: Some(("aten", "add", Some("Tensor"))),
            },
            Case {
                name: "aten::_shape_as_tensor",
                expected: Some(("aten", "_shape_as_tensor", None)),
            },
            Case {
                name: "prim::NumToTensor.Scalar",
                expected: Some(("prim", "NumToTensor", Some("Scalar"))),
            },
            Case {
                name: "add.Tensor",
                expected: None,
            },
            Case {
                name: "aten::add.",
                expected: None,
            },
            Case {
                name: "aten::add.Tensor.out",
                expected: None,
            },
            Case {
                name: "aten::",
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let parsed = case.name.parse::<OpName>().ok();
            let expected = case
                .expected
                .map(|(namespace, name, overload)| OpName::new(namespace, name, overload));
            assert_eq!(parsed, expected);
        });
    }

    #[test]
    fn test_display() {
        for name in ["aten::add.Tensor", "aten::bincount"] {
            let op: OpName = name.parse().unwrap();
            assert_eq!(op.to_string(), name);
        }
    }

    #[test]
    fn test_ordering() {
        let mut names: Vec<OpName> = ["aten::zeros", "aten::add.Tensor", "aten::add"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        names.sort();
        let names: Vec<_> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["aten::add", "aten::add.Tensor", "aten::zeros"]);
    }
}
