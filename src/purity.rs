//! Debug-mode reducer purity guard.
//!
//! A reducer must be a pure function of its input state. Accidental impurity
//! (mutating captured data, reading a clock or counter, taking from a shared
//! queue) produces bugs that only surface under reordering, so in debug mode
//! every reducer runs twice against the same input: if the two outputs
//! differ, the guard panics with a [`PurityViolation`] naming the first
//! divergent field.

use std::panic::panic_any;

use crate::state::State;
use crate::store::StateReducer;

/// Panic payload raised when a reducer produces different outputs for the
/// same input. The store treats this as fatal rather than an ordinary
/// reducer panic.
#[derive(Debug)]
pub struct PurityViolation {
    pub message: String,
}

/// Wrap a reducer so it is invoked twice and the outputs compared. The first
/// invocation's output is the one committed.
pub(crate) fn checked_reducer<S: State>(
    reducer: impl Fn(S) -> S + Send + 'static,
) -> StateReducer<S> {
    Box::new(move |state: S| {
        let first = reducer(state.clone());
        let second = reducer(state);
        if first != second {
            panic_any(PurityViolation {
                message: divergence_message(&first, &second),
            });
        }
        first
    })
}

fn divergence_message<S: State>(first: &S, second: &S) -> String {
    match first_divergent_field(first, second) {
        Some((name, a, b)) => format!(
            "impure reducer: running it twice on the same input changed `{name}` \
             ({a} != {b}); reducers must be pure functions of their input state"
        ),
        None => format!(
            "impure reducer: running it twice on the same input produced different \
             states ({first:?} != {second:?}); reducers must be pure functions of \
             their input state"
        ),
    }
}

/// Compare the structural views field by field. Returns `None` when either
/// state does not expose fields or the views do not line up, in which case
/// the message falls back to whole-state `Debug` output.
fn first_divergent_field<S: State>(first: &S, second: &S) -> Option<(String, String, String)> {
    let a = first.fields()?;
    let b = second.fields()?;
    if a.len() != b.len() {
        return None;
    }
    for (fa, fb) in a.into_iter().zip(b) {
        if fa.name != fb.name {
            return None;
        }
        if fa.rendered != fb.rendered {
            return Some((fa.name.to_string(), fa.rendered, fb.rendered));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FieldValue;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, PartialEq, Debug)]
    struct Counter {
        count: i64,
        label: String,
    }

    impl State for Counter {
        fn fields(&self) -> Option<Vec<FieldValue>> {
            Some(vec![
                FieldValue::new("count", &self.count),
                FieldValue::new("label", &self.label),
            ])
        }
    }

    #[test]
    fn pure_reducer_commits_first_output() {
        let checked = checked_reducer(|s: Counter| Counter {
            count: s.count + 1,
            ..s
        });
        let out = checked(Counter {
            count: 1,
            label: "a".into(),
        });
        assert_eq!(out.count, 2);
    }

    #[test]
    fn impure_reducer_raises_violation_naming_the_field() {
        let ticks = Arc::new(AtomicI64::new(0));
        let checked = checked_reducer(move |s: Counter| Counter {
            count: ticks.fetch_add(1, Ordering::SeqCst),
            ..s
        });
        let payload = catch_unwind(AssertUnwindSafe(|| {
            checked(Counter {
                count: 0,
                label: "a".into(),
            })
        }))
        .unwrap_err();
        let violation = payload.downcast_ref::<PurityViolation>().unwrap();
        assert!(violation.message.contains("`count`"), "{}", violation.message);
    }

    #[test]
    fn divergence_without_fields_falls_back_to_debug() {
        #[derive(Clone, PartialEq, Debug)]
        struct Opaque(i64);
        impl State for Opaque {}

        let msg = divergence_message(&Opaque(1), &Opaque(2));
        assert!(msg.contains("Opaque(1)"), "{msg}");
        assert!(msg.contains("Opaque(2)"), "{msg}");
    }
}
