//! End-to-end generation of a verified shape library.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::emit::{write_atomic, Manifest};
use crate::library::ShapeLibrary;
use crate::oracle::Oracle;
use crate::registry::{Registry, RegistryError};
use crate::verify::{Verifier, VerifyError};

/// Errors that stop a generation run.
#[derive(Debug)]
pub enum GenerateError {
    /// A shape function disagrees with the operator.
    Verify(VerifyError),

    /// A shape function's signature disagrees with the registry.
    Registry(RegistryError),

    /// The manifest could not be serialized.
    Serialize(serde_json::Error),

    /// The manifest could not be written.
    Write { path: PathBuf, error: io::Error },
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GenerateError::Verify(err) => write!(f, "{}", err),
            GenerateError::Registry(err) => write!(f, "registry check failed: {}", err),
            GenerateError::Serialize(err) => write!(f, "failed to serialize manifest: {}", err),
            GenerateError::Write { path, error } => {
                write!(f, "failed to write {}: {}", path.display(), error)
            }
        }
    }
}

impl Error for GenerateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GenerateError::Verify(err) => Some(err),
            GenerateError::Registry(err) => Some(err),
            GenerateError::Serialize(err) => Some(err),
            GenerateError::Write { error, .. } => Some(error),
        }
    }
}

impl From<VerifyError> for GenerateError {
    fn from(err: VerifyError) -> GenerateError {
        GenerateError::Verify(err)
    }
}

impl From<RegistryError> for GenerateError {
    fn from(err: RegistryError) -> GenerateError {
        GenerateError::Registry(err)
    }
}

impl From<serde_json::Error> for GenerateError {
    fn from(err: serde_json::Error) -> GenerateError {
        GenerateError::Serialize(err)
    }
}

/// Verify every function in `library` against `oracle`, then check their
/// signatures against `registry`.
///
/// Verification stops at the first failing invocation. The registry is only
/// checked once every function has been verified.
pub fn generate<O: Oracle>(
    library: &ShapeLibrary,
    oracle: O,
    registry: &Registry,
) -> Result<Manifest, GenerateError> {
    tracing::info!(functions = library.len(), "verifying shape functions");
    let verifier = Verifier::new(oracle);
    let verified = library
        .iter()
        .map(|func| Ok((func, verifier.verify_function(func)?)))
        .collect::<Result<Vec<_>, VerifyError>>()
        .inspect_err(|err| tracing::error!(op = %err.op, "{}", err))?;

    tracing::info!(schemas = registry.len(), "checking signatures against registry");
    registry
        .check_library(library)
        .inspect_err(|err| tracing::error!("{}", err))?;

    Ok(Manifest::new(verified))
}

/// Run [`generate`] and write the resulting manifest to `output_dir/name`.
///
/// Nothing is written if generation fails.
pub fn generate_to_dir<O: Oracle>(
    library: &ShapeLibrary,
    oracle: O,
    registry: &Registry,
    output_dir: &Path,
    name: &str,
) -> Result<PathBuf, GenerateError> {
    let manifest = generate(library, oracle, registry)?;
    let json = manifest.to_json()?;
    let path = write_atomic(output_dir, name, &json).map_err(|error| GenerateError::Write {
        path: output_dir.join(name),
        error,
    })?;
    tracing::info!(
        path = %path.display(),
        functions = manifest.functions.len(),
        "wrote shape library"
    );
    Ok(path)
}
