//! Scripted and synchronous store behaviors through the view model API.

use std::sync::Arc;

use statecraft::{
    MockBehavior, MockBehaviorStack, State, StoreConfig, ViewModel,
};

#[derive(Clone, PartialEq, Debug, Default)]
struct ScreenState {
    step: u32,
    message: String,
}

impl State for ScreenState {}

fn scripted(message: &str, step: u32) -> ScreenState {
    ScreenState {
        step,
        message: message.to_string(),
    }
}

#[tokio::test]
async fn scriptable_store_ignores_reducers() {
    let config = Arc::new(StoreConfig::mocked(MockBehavior::scriptable()));
    let vm = ViewModel::with_config(config, ScreenState::default(), None);

    vm.set_state(|s| ScreenState {
        step: s.step + 1,
        ..s
    });
    assert_eq!(vm.await_state().await.unwrap().step, 0);
}

#[tokio::test]
async fn force_next_drives_the_scripted_state() {
    let config = Arc::new(StoreConfig::mocked(MockBehavior::scriptable()));
    let vm = ViewModel::with_config(config, ScreenState::default(), None);
    let mut stream = vm.stream();

    vm.force_next(scripted("loading", 1));
    vm.force_next(scripted("done", 2));

    assert_eq!(vm.state(), scripted("done", 2));
    assert_eq!(stream.next().await.unwrap(), ScreenState::default());
    assert_eq!(stream.next().await.unwrap(), scripted("loading", 1));
    assert_eq!(stream.next().await.unwrap(), scripted("done", 2));
}

#[tokio::test]
#[should_panic(expected = "force_next requires scriptable")]
async fn force_next_under_normal_behavior_panics() {
    let config = Arc::new(StoreConfig::mocked(MockBehavior::default()));
    let vm = ViewModel::with_config(config, ScreenState::default(), None);
    vm.force_next(scripted("nope", 1));
}

#[tokio::test]
async fn synchronous_behavior_applies_before_returning() {
    let config = Arc::new(StoreConfig::mocked(MockBehavior::synchronous()));
    let vm = ViewModel::with_config(config, ScreenState::default(), None);

    vm.set_state(|s| ScreenState {
        step: s.step + 1,
        ..s
    });
    // No flush needed: the commit completed inside set_state.
    assert_eq!(vm.state().step, 1);
}

#[tokio::test]
async fn pushed_behavior_redirects_a_live_view_model() {
    let stack = MockBehaviorStack::new();
    let config = Arc::new(StoreConfig::new(
        true,
        Arc::clone(&stack),
        Some(MockBehavior::default()),
    ));
    let vm = ViewModel::with_config(config, ScreenState::default(), None);

    {
        let _guard = stack.push(MockBehavior::synchronous());
        vm.set_state(|s| ScreenState {
            step: s.step + 5,
            ..s
        });
        assert_eq!(vm.state().step, 5);
    }

    // Back to the serialized store; the synchronous commit carried over.
    vm.set_state(|s| ScreenState {
        step: s.step + 1,
        ..s
    });
    assert_eq!(vm.await_state().await.unwrap().step, 6);
}

#[tokio::test]
async fn scripted_state_carries_into_normal_behavior() {
    let stack = MockBehaviorStack::new();
    let config = Arc::new(StoreConfig::new(
        true,
        Arc::clone(&stack),
        Some(MockBehavior::default()),
    ));
    let vm = ViewModel::with_config(config, ScreenState::default(), None);

    {
        let _guard = stack.push(MockBehavior::scriptable());
        vm.force_next(scripted("pinned", 9));
        assert_eq!(vm.state().step, 9);
    }

    assert_eq!(vm.await_state().await.unwrap(), scripted("pinned", 9));
}
