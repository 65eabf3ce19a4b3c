//! Test assertion helpers for decrypted server events
#![allow(dead_code)] // Test utilities may not all be used in every test

use roomcast::events::{MemberState, ServerEvent};

// ============================================================================
// Assertion Helpers
// ============================================================================

pub fn assert_message(event: &ServerEvent, author: &str, content: &str) {
    match event {
        ServerEvent::Message(payload) => {
            assert_eq!(payload.author.username, author, "wrong author");
            assert_eq!(payload.content, content, "wrong content");
        }
        other => panic!("expected message, got {:?}", other),
    }
}

pub fn assert_update_user(event: &ServerEvent, user_id: &str, online: bool) {
    match event {
        ServerEvent::UpdateUser(payload) => {
            assert_eq!(payload.id, user_id, "wrong user in presence update");
            assert_eq!(payload.data.offline, !online, "wrong presence status");
        }
        other => panic!("expected updateUser, got {:?}", other),
    }
}

pub fn assert_update_member(event: &ServerEvent, username: &str, state: MemberState) {
    match event {
        ServerEvent::UpdateMember(payload) => {
            assert_eq!(payload.username, username);
            assert_eq!(payload.state, state);
        }
        other => panic!("expected updateMember, got {:?}", other),
    }
}
