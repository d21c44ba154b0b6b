//! Serialization of a verified shape library.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::library::ShapeFunction;
use crate::shape::Shape;
use crate::verify::VerifiedInvocation;

/// Version of the manifest format.
pub const MANIFEST_VERSION: u32 = 1;

/// Verified invocation in a [`Manifest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationEntry {
    /// The invocation, written as in the library.
    pub call: String,
    pub expect_error: bool,

    /// Output shapes, or `None` for error invocations. Data-dependent sizes
    /// are `None`.
    pub outputs: Option<Vec<Vec<Option<usize>>>>,
}

/// Shape function in a [`Manifest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub op: String,
    pub signature: String,
    pub registry_exempt: bool,
    pub invocations: Vec<InvocationEntry>,
}

/// Serializable description of a verified set of shape functions.
///
/// Functions are ordered by operator name so that the output does not depend
/// on registration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub functions: Vec<FunctionEntry>,
}

fn shape_entry(shape: &Shape) -> Vec<Option<usize>> {
    shape.dims().iter().map(|dim| dim.fixed()).collect()
}

impl Manifest {
    /// Build a manifest from shape functions and the results of verifying
    /// them.
    pub fn new<'a>(
        verified: impl IntoIterator<Item = (&'a ShapeFunction, Vec<VerifiedInvocation>)>,
    ) -> Manifest {
        let mut functions: Vec<FunctionEntry> = verified
            .into_iter()
            .map(|(func, invocations)| FunctionEntry {
                op: func.op().to_string(),
                signature: func.signature().to_string(),
                registry_exempt: func.is_registry_exempt(),
                invocations: invocations
                    .into_iter()
                    .map(|verified| InvocationEntry {
                        call: verified.invocation.to_string(),
                        expect_error: verified.invocation.expect_error(),
                        outputs: verified
                            .outputs
                            .map(|shapes| shapes.iter().map(shape_entry).collect()),
                    })
                    .collect(),
            })
            .collect();
        functions.sort_by(|a, b| a.op.cmp(&b.op));

        Manifest {
            version: MANIFEST_VERSION,
            functions,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Write `contents` to `dir/name`.
///
/// The contents are first written to a temporary file in the same directory
/// which is then renamed into place, so the destination either has the old
/// contents or the complete new contents.
pub fn write_atomic(dir: &Path, name: &str, contents: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    let tmp_path = dir.join(format!(".{}.tmp", name));

    let result = fs::write(&tmp_path, contents).and_then(|_| fs::rename(&tmp_path, &path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result.map(|_| path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{write_atomic, Manifest, MANIFEST_VERSION};
    use crate::invocation::{tensor, Invocation};
    use crate::library::ShapeLibrary;
    use crate::shape::{Dim, Shape, UnknownDim};
    use crate::signature::signature;
    use crate::verify::VerifiedInvocation;

    fn test_library() -> ShapeLibrary {
        let mut lib = ShapeLibrary::new();
        lib.register("aten::zeta", signature!["self": Tensor => 1], |_| {
            Ok(Shape::scalar().into())
        })
        .unwrap();
        lib.register("aten::alpha", signature!["self": Tensor => 1], |_| {
            Ok(Shape::scalar().into())
        })
        .unwrap()
        .registry_exempt();
        lib
    }

    #[test]
    fn test_manifest() {
        let lib = test_library();
        let verified = lib.iter().map(|func| {
            let invocations = vec![
                VerifiedInvocation {
                    invocation: Invocation::new([tensor(&[2])]),
                    outputs: Some(vec![[Dim::Fixed(3), Dim::Unknown(UnknownDim::new())]
                        .into_iter()
                        .collect()]),
                },
                VerifiedInvocation {
                    invocation: Invocation::error([tensor(&[])]),
                    outputs: None,
                },
            ];
            (func, invocations)
        });
        let manifest = Manifest::new(verified);

        assert_eq!(manifest.version, MANIFEST_VERSION);
        let ops: Vec<_> = manifest.functions.iter().map(|f| f.op.as_str()).collect();
        assert_eq!(ops, ["aten::alpha", "aten::zeta"]);
        assert!(manifest.functions[0].registry_exempt);
        assert!(!manifest.functions[1].registry_exempt);
        assert_eq!(manifest.functions[1].signature, "(self: shape) -> shape");

        let invocations = &manifest.functions[0].invocations;
        assert_eq!(invocations[0].call, "Invocation(tensor[2])");
        assert_eq!(invocations[0].outputs, Some(vec![vec![Some(3), None]]));
        assert!(invocations[1].expect_error);
        assert_eq!(invocations[1].outputs, None);

        let json = manifest.to_json().unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
        assert!(json.contains("null"));
    }

    #[test]
    fn test_write_atomic() {
        let dir = std::env::temp_dir().join(format!("rten-shape-lib-emit-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let path = write_atomic(&dir, "out.json", "{}").unwrap();
        assert_eq!(path, dir.join("out.json"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!dir.join(".out.json.tmp").exists());

        // Overwrite an existing artifact.
        write_atomic(&dir, "out.json", "[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");

        // Writing into a missing directory fails without creating anything.
        let missing = dir.join("missing");
        assert!(write_atomic(&missing, "out.json", "{}").is_err());
        assert!(!missing.exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
