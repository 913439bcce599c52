//! Base trait for state values owned by a view model.

use std::fmt;

/// A rendered view of one state field, used for purity diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub name: &'static str,
    pub rendered: String,
}

impl FieldValue {
    pub fn new(name: &'static str, value: &dyn fmt::Debug) -> Self {
        Self {
            name,
            rendered: format!("{value:?}"),
        }
    }
}

/// Marker trait for view model state.
///
/// States should be:
/// - Immutable (Clone to create new states)
/// - Self-contained (all data needed to render the view)
/// - Comparable (PartialEq for detecting changes)
///
/// A new state is created only by applying a reducer to the previous state.
/// Reducers must be pure: applying the same reducer twice to the same input
/// must produce equal outputs.
pub trait State: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Structural view of this state's fields.
    ///
    /// Override to let the purity guard name the first field that diverged
    /// between two invocations of the same reducer. The default opts out;
    /// diagnostics then fall back to the whole-state `Debug` rendering.
    fn fields(&self) -> Option<Vec<FieldValue>> {
        None
    }
}
