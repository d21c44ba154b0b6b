//! Built-in shape functions, grouped by operator family.
//!
//! Each submodule has a `register` function which adds its shape functions,
//! and the invocations that verify them, to a [`ShapeLibrary`].

use crate::algorithms::ShapeError;
use crate::library::{LibraryError, ShapeLibrary};
use crate::shape::{Returned, Shape};
use crate::signature::BoundArgs;

mod creation;
mod elementwise;
mod index;
mod layout;
mod linalg;
mod nn;
mod reduce;

type Args = BoundArgs<Vec<usize>>;
type ShapeResult = Result<Returned<Shape>, ShapeError>;

/// Register all built-in shape functions.
pub(crate) fn register_all(lib: &mut ShapeLibrary) -> Result<(), LibraryError> {
    elementwise::register(lib)?;
    reduce::register(lib)?;
    linalg::register(lib)?;
    layout::register(lib)?;
    creation::register(lib)?;
    index::register(lib)?;
    nn::register(lib)?;
    Ok(())
}

/// Return a tuple of output shapes.
fn many(shapes: impl IntoIterator<Item = Vec<usize>>) -> ShapeResult {
    Ok(Returned::Many(shapes.into_iter().map(Shape::from).collect()))
}
