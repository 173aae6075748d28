//! Property-based tests for the command lifecycle state machine.
//!
//! Mirrors the teacher's style of testing a state machine's invariants
//! across randomized event sequences rather than only hand-picked paths.

use mdm_core::command_state::{CommandEvent, CommandStateMachine, CommandStatus};
use proptest::prelude::*;

fn arb_event() -> impl Strategy<Value = CommandEvent> {
    prop_oneof![
        Just(CommandEvent::Sent),
        Just(CommandEvent::Acknowledged),
        Just(CommandEvent::Error),
        Just(CommandEvent::NotNow),
    ]
}

proptest! {
    /// Once a state machine reaches a terminal state, no further event
    /// ever moves it out of that state, regardless of what comes next.
    #[test]
    fn prop_terminal_states_never_leave(events in prop::collection::vec(arb_event(), 0..32)) {
        let mut sm = CommandStateMachine::new();
        let mut seen_terminal = false;

        for event in events {
            let was_terminal = sm.is_terminal();
            let before = sm.status();
            let result = sm.transition(event);

            if was_terminal {
                prop_assert!(result.is_err(), "transition from terminal state {before:?} must be rejected");
                prop_assert_eq!(sm.status(), before, "rejected transition must not mutate state");
                seen_terminal = true;
            }
        }

        let _ = seen_terminal;
    }

    /// Every transition the machine accepts lands in one of the five known
    /// statuses and round-trips through `as_str`/`parse`.
    #[test]
    fn prop_accepted_transitions_round_trip_through_storage_encoding(
        events in prop::collection::vec(arb_event(), 0..32)
    ) {
        let mut sm = CommandStateMachine::new();
        for event in events {
            if let Ok(next) = sm.transition(event) {
                let encoded = next.as_str();
                let decoded = CommandStatus::parse(encoded).unwrap();
                prop_assert_eq!(decoded, next);
            }
        }
    }

    /// `NotNow` always loops back to a redeliverable state: a machine that
    /// reaches `NotNow` can always accept a subsequent `Sent`.
    #[test]
    fn prop_not_now_is_always_redeliverable(prefix in prop::collection::vec(arb_event(), 0..8)) {
        let mut sm = CommandStateMachine::new();
        for event in prefix {
            let _ = sm.transition(event);
        }

        if sm.status() == CommandStatus::Sent {
            let mut sm = sm;
            prop_assert_eq!(sm.transition(CommandEvent::NotNow).unwrap(), CommandStatus::NotNow);
            prop_assert_eq!(sm.transition(CommandEvent::Sent).unwrap(), CommandStatus::Sent);
        }
    }
}
