//! Property-based tests for the orchestrator state machine

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_conversation_id() -> impl Strategy<Value = i64> {
    1i64..4
}

fn arb_state() -> impl Strategy<Value = ChatState> {
    prop_oneof![
        prop::option::of(arb_conversation_id()).prop_map(|selected| ChatState::Idle { selected }),
        "[a-z]{1,8}".prop_map(|pending_text| ChatState::AwaitingConversation { pending_text }),
        (arb_conversation_id(), "[a-z]{0,8}").prop_map(|(conversation_id, accumulated)| {
            ChatState::Streaming {
                conversation_id,
                accumulated,
            }
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = ChatEvent> {
    prop_oneof![
        "[a-z ]{0,8}".prop_map(|text| ChatEvent::SendMessage { text }),
        prop::option::of(arb_conversation_id())
            .prop_map(|conversation_id| ChatEvent::ConversationSelected { conversation_id }),
        arb_conversation_id().prop_map(|conversation_id| ChatEvent::ConversationCreated {
            conversation_id
        }),
        "[a-z]{1,8}".prop_map(|message| ChatEvent::ConversationCreateFailed { message }),
        (arb_conversation_id(), "[a-z]{1,4}")
            .prop_map(|(conversation_id, text)| ChatEvent::Chunk {
                conversation_id,
                text
            }),
        arb_conversation_id().prop_map(|conversation_id| ChatEvent::StreamCompleted {
            conversation_id
        }),
        (arb_conversation_id(), "[a-z]{1,8}").prop_map(|(conversation_id, message)| {
            ChatEvent::StreamFailed {
                conversation_id,
                message,
            }
        }),
    ]
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    /// Provisional text never outlives the stream that produced it
    #[test]
    fn prop_non_streaming_states_hold_no_text(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            if !matches!(result.new_state, ChatState::Streaming { .. }) {
                prop_assert_eq!(result.new_state.provisional_text(), "");
            }
        }
    }

    /// A send is only accepted while idle, and only one stream is started
    #[test]
    fn prop_busy_rejects_send(state in arb_state(), text in "[a-z]{1,8}") {
        let result = transition(&state, ChatEvent::SendMessage { text });
        if state.is_busy() {
            prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
        } else {
            let result = result.unwrap();
            prop_assert!(result.new_state.is_busy());
            prop_assert_eq!(result.effects.len(), 1);
        }
    }

    /// Every StartStream targets the conversation the new state streams into
    #[test]
    fn prop_start_stream_matches_state(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, event) {
            for effect in &result.effects {
                if let Effect::StartStream { conversation_id, .. } = effect {
                    prop_assert_eq!(
                        &result.new_state,
                        &ChatState::Streaming {
                            conversation_id: *conversation_id,
                            accumulated: String::new(),
                        }
                    );
                }
            }
        }
    }

    /// Chunks only grow the buffer of the conversation they belong to
    #[test]
    fn prop_chunks_append_in_order(
        id in arb_conversation_id(),
        texts in prop::collection::vec("[a-z]{1,4}", 0..10),
    ) {
        let mut state = ChatState::Streaming { conversation_id: id, accumulated: String::new() };
        for text in &texts {
            state = transition(&state, ChatEvent::Chunk { conversation_id: id, text: text.clone() })
                .unwrap()
                .new_state;
        }
        prop_assert_eq!(state.provisional_text(), texts.concat());

        let stray = ChatEvent::Chunk { conversation_id: id + 10, text: "x".to_string() };
        let stray = transition(&state, stray);
        prop_assert!(stray.is_err());
    }

    /// A terminal stream event always re-enables input for the same conversation
    #[test]
    fn prop_terminal_returns_to_idle(
        id in arb_conversation_id(),
        accumulated in "[a-z]{0,8}",
        failed in any::<bool>(),
    ) {
        let state = ChatState::Streaming { conversation_id: id, accumulated };
        let event = if failed {
            ChatEvent::StreamFailed { conversation_id: id, message: "boom".to_string() }
        } else {
            ChatEvent::StreamCompleted { conversation_id: id }
        };
        let result = transition(&state, event).unwrap();
        prop_assert_eq!(result.new_state, ChatState::Idle { selected: Some(id) });
        prop_assert_eq!(result.effects.len(), 1);
    }

    /// Arbitrary event sequences never wedge the machine: selection always recovers
    #[test]
    fn prop_selection_always_recovers(
        events in prop::collection::vec(arb_event(), 0..20),
        target in prop::option::of(arb_conversation_id()),
    ) {
        let mut state = ChatState::default();
        for event in events {
            if let Ok(result) = transition(&state, event) {
                state = result.new_state;
            }
        }
        let select = ChatEvent::ConversationSelected { conversation_id: target };
        let result = transition(&state, select).unwrap();
        prop_assert_eq!(result.new_state, ChatState::Idle { selected: target });
    }
}
