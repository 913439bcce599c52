//! Tri-state projection of one asynchronous operation.
//!
//! [`Async`] represents the lifecycle of a single async result as a value
//! that can live inside a state struct: `Uninitialized` before anything ran,
//! `Loading` while in flight, then exactly one of `Success` or `Fail`.
//! `Loading` and `Fail` can retain the previous success payload so a refresh
//! keeps showing old data while a new load is in flight.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Optional tooling data attached to a `Success` value (timings, provenance).
/// Never participates in equality.
pub type Metadata = Arc<dyn Any + Send + Sync>;

/// Error payload for [`Async::Fail`].
///
/// Wraps `anyhow::Error` behind an `Arc` so the containing state stays
/// `Clone`. Equality compares the rendered message chain, which is what a
/// consumer can observe anyway.
#[derive(Clone)]
pub struct OperationError(Arc<anyhow::Error>);

impl OperationError {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::anyhow!(message)))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    fn chain(&self) -> String {
        format!("{:#}", self.0)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl PartialEq for OperationError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.chain() == other.chain()
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

/// The lifecycle of one asynchronous result.
///
/// For a single adapter invocation the store commits exactly one `Loading`
/// followed by at most one terminal variant, unless execution is suppressed
/// by mock behavior.
#[derive(Clone, Default)]
pub enum Async<T> {
    #[default]
    Uninitialized,
    Loading {
        /// Previous success payload retained across a refresh.
        value: Option<T>,
    },
    Success {
        value: T,
        /// Tooling-only; excluded from equality.
        metadata: Option<Metadata>,
    },
    Fail {
        error: OperationError,
        /// Previous success payload retained across the failure.
        value: Option<T>,
    },
}

impl<T> Async<T> {
    pub fn loading(value: Option<T>) -> Self {
        Async::Loading { value }
    }

    pub fn success(value: T) -> Self {
        Async::Success {
            value,
            metadata: None,
        }
    }

    pub fn fail(error: impl Into<OperationError>, value: Option<T>) -> Self {
        Async::Fail {
            error: error.into(),
            value,
        }
    }

    /// The success value, or the retained value of a `Loading`/`Fail`.
    pub fn value(&self) -> Option<&T> {
        match self {
            Async::Uninitialized => None,
            Async::Loading { value } => value.as_ref(),
            Async::Success { value, .. } => Some(value),
            Async::Fail { value, .. } => value.as_ref(),
        }
    }

    /// The success value only; retained values are not reported.
    pub fn success_value(&self) -> Option<&T> {
        match self {
            Async::Success { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Async::Fail { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Terminal: `Success` or `Fail`.
    pub fn is_complete(&self) -> bool {
        matches!(self, Async::Success { .. } | Async::Fail { .. })
    }

    /// Worth (re)loading: `Uninitialized` or `Fail`.
    pub fn should_load(&self) -> bool {
        matches!(self, Async::Uninitialized | Async::Fail { .. })
    }

    /// Attach tooling metadata. Only `Success` carries it; other variants
    /// are returned unchanged.
    pub fn with_metadata(self, metadata: Metadata) -> Self {
        match self {
            Async::Success { value, .. } => Async::Success {
                value,
                metadata: Some(metadata),
            },
            other => other,
        }
    }

    /// Downcast the attached metadata, if any.
    pub fn metadata<M: 'static>(&self) -> Option<&M> {
        match self {
            Async::Success {
                metadata: Some(metadata),
                ..
            } => metadata.downcast_ref::<M>(),
            _ => None,
        }
    }

    /// Map the payload type, including retained values.
    pub fn map<V>(self, f: impl FnOnce(T) -> V) -> Async<V> {
        match self {
            Async::Uninitialized => Async::Uninitialized,
            Async::Loading { value } => Async::Loading {
                value: value.map(f),
            },
            Async::Success { value, metadata } => Async::Success {
                value: f(value),
                metadata,
            },
            Async::Fail { error, value } => Async::Fail {
                error,
                value: value.map(f),
            },
        }
    }
}

impl<T: PartialEq> PartialEq for Async<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Async::Uninitialized, Async::Uninitialized) => true,
            (Async::Loading { value: a }, Async::Loading { value: b }) => a == b,
            // Metadata is tooling-only and deliberately ignored.
            (Async::Success { value: a, .. }, Async::Success { value: b, .. }) => a == b,
            (
                Async::Fail {
                    error: ea,
                    value: va,
                },
                Async::Fail {
                    error: eb,
                    value: vb,
                },
            ) => ea == eb && va == vb,
            _ => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Async<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Async::Uninitialized => f.write_str("Uninitialized"),
            Async::Loading { value } => f.debug_struct("Loading").field("value", value).finish(),
            Async::Success { value, metadata } => f
                .debug_struct("Success")
                .field("value", value)
                .field("has_metadata", &metadata.is_some())
                .finish(),
            Async::Fail { error, value } => f
                .debug_struct("Fail")
                .field("error", error)
                .field("value", value)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_equality_ignores_metadata() {
        let plain = Async::success(7);
        let tagged = Async::success(7).with_metadata(Arc::new("timing"));
        assert_eq!(plain, tagged);
        assert_eq!(tagged.metadata::<&str>(), Some(&"timing"));
    }

    #[test]
    fn fail_equality_compares_message_chain() {
        let a: Async<i32> = Async::fail(OperationError::msg("boom"), None);
        let b: Async<i32> = Async::fail(OperationError::msg("boom"), None);
        let c: Async<i32> = Async::fail(OperationError::msg("other"), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn value_reports_retained_payloads() {
        let loading = Async::loading(Some(3));
        assert_eq!(loading.value(), Some(&3));
        assert_eq!(loading.success_value(), None);

        let failed = Async::fail(OperationError::msg("boom"), Some(3));
        assert_eq!(failed.value(), Some(&3));
        assert!(failed.should_load());
        assert!(failed.is_complete());
    }

    #[test]
    fn uninitialized_should_load() {
        let uninit: Async<i32> = Async::Uninitialized;
        assert!(uninit.should_load());
        assert!(!uninit.is_complete());
        assert_eq!(uninit.value(), None);
    }

    #[test]
    fn map_carries_retained_values() {
        let loading = Async::loading(Some(2)).map(|v| v * 10);
        assert_eq!(loading.value(), Some(&20));

        let failed = Async::fail(OperationError::msg("boom"), Some(2)).map(|v| v * 10);
        assert_eq!(failed.value(), Some(&20));
        assert_eq!(failed.error().unwrap().to_string(), "boom");
    }
}
