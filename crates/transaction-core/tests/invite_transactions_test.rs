//! INVITE flows across a linked pair of engines: one acting as the
//! caller's TU, one as the callee's. The transports ferry every send
//! into the peer's ingress channel, so these tests exercise parsing,
//! matching, both state machines and the timer wheel end to end.


use transaction_test_utils::*;

use ringline_sip_core::{Method, StatusCode};
use ringline_sip_transport::TransportKind;
use ringline_transaction_core::TransactionEvent;

#[test]
fn test_invite_exchange_with_ack_for_200() {
    init_logging();
    let (mut alice, mut bob) = EngineRig::pair(TransportKind::Udp);

    let invite = invite_request("z9hG4bK-it-1");
    alice
        .handle
        .send_request(invite.clone(), bob.transport.local(), TransportKind::Udp)
        .unwrap();
    settle(&mut alice, &mut bob, 0);

    // Bob's engine created the server transaction, answered 100 Trying
    // on its own, and handed the request to the TU.
    let bob_events = bob.drain_events();
    let invite_key = match &bob_events[0] {
        TransactionEvent::NewRequest { key, request, .. } => {
            assert_eq!(request.method, Method::Invite);
            key.clone()
        }
        other => panic!("expected NewRequest, got {other:?}"),
    };
    let alice_events = alice.drain_events();
    assert!(alice_events
        .iter()
        .any(|e| matches!(e, TransactionEvent::ProvisionalResponse { .. })));

    // Bob's TU rings, then answers.
    let ringing = response_for(&invite, StatusCode::Ringing, Some("tag-bob"));
    bob.handle.send_response(invite_key.clone(), ringing).unwrap();
    settle(&mut alice, &mut bob, 200);

    let ok = response_for(&invite, StatusCode::Ok, Some("tag-bob"));
    bob.handle.send_response(invite_key, ok).unwrap();
    settle(&mut alice, &mut bob, 400);

    let alice_events = alice.drain_events();
    let answer = alice_events
        .iter()
        .find_map(|e| match e {
            TransactionEvent::SuccessResponse { response, .. } => Some(response.clone()),
            _ => None,
        })
        .expect("200 delivered to the TU");
    assert_eq!(answer.status, StatusCode::Ok);

    // The ACK for a 2xx belongs to the TU and travels outside any
    // transaction.
    let ack = ack_for(&invite, &answer);
    alice
        .handle
        .send_stateless(ack.into(), bob.transport.local(), TransportKind::Udp)
        .unwrap();
    settle(&mut alice, &mut bob, 600);

    let bob_events = bob.drain_events();
    assert!(bob_events
        .iter()
        .any(|e| matches!(e, TransactionEvent::AckReceived { .. })));

    // No retransmissions happened: one INVITE and one ACK from Alice,
    // three responses from Bob.
    assert_eq!(alice.transport.sent_count(), 2);
    assert_eq!(bob.transport.sent_count(), 3);

    // Both sides linger for late retransmissions, then drop the state.
    walk_timers(&mut alice, 40_000);
    walk_timers(&mut bob, 40_000);
    assert_eq!(alice.engine.transaction_count(), 0);
    assert_eq!(bob.engine.transaction_count(), 0);
    assert!(alice
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTerminated { .. })));
    assert!(bob
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::TransactionTerminated { .. })));
}

#[test]
fn test_invite_rejection_is_acked_by_the_engine() {
    init_logging();
    let (mut alice, mut bob) = EngineRig::pair(TransportKind::Udp);

    let invite = invite_request("z9hG4bK-it-2");
    alice
        .handle
        .send_request(invite.clone(), bob.transport.local(), TransportKind::Udp)
        .unwrap();
    settle(&mut alice, &mut bob, 0);
    let invite_key = match &bob.drain_events()[0] {
        TransactionEvent::NewRequest { key, .. } => key.clone(),
        other => panic!("expected NewRequest, got {other:?}"),
    };

    let busy = response_for(&invite, StatusCode::BusyHere, Some("tag-busy"));
    bob.handle.send_response(invite_key, busy).unwrap();
    settle(&mut alice, &mut bob, 300);

    // Alice's TU saw the failure; her engine already sent the ACK.
    assert!(alice
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::FailureResponse { .. })));
    assert!(alice.transport.sent_starting_with("ACK ").is_some());

    // The ACK confirmed Bob's transaction before Timer G could fire,
    // so the 486 went out exactly once.
    assert!(bob
        .drain_events()
        .iter()
        .any(|e| matches!(e, TransactionEvent::AckReceived { .. })));
    assert_eq!(bob.transport.sent_count(), 2);

    // Timer I clears Bob, Timer D clears Alice.
    assert_eq!(walk_timers(&mut bob, 10_000), vec![5_300]);
    assert_eq!(bob.engine.transaction_count(), 0);
    assert_eq!(walk_timers(&mut alice, 40_000), vec![32_300]);
    assert_eq!(alice.engine.transaction_count(), 0);
}

#[test]
fn test_retransmitted_200_reaches_the_tu_again() {
    init_logging();
    let (mut alice, mut bob) = EngineRig::pair(TransportKind::Udp);

    let invite = invite_request("z9hG4bK-it-3");
    alice
        .handle
        .send_request(invite.clone(), bob.transport.local(), TransportKind::Udp)
        .unwrap();
    settle(&mut alice, &mut bob, 0);
    let invite_key = match &bob.drain_events()[0] {
        TransactionEvent::NewRequest { key, .. } => key.clone(),
        other => panic!("expected NewRequest, got {other:?}"),
    };

    let ok = response_for(&invite, StatusCode::Ok, Some("tag-bob"));
    bob.handle.send_response(invite_key, ok).unwrap();
    settle(&mut alice, &mut bob, 100);

    let first: usize = alice
        .drain_events()
        .iter()
        .filter(|e| matches!(e, TransactionEvent::SuccessResponse { .. }))
        .count();
    assert_eq!(first, 1);

    // A duplicate INVITE straggles in while Bob lingers. His engine
    // replays the 200, and Alice's lingering client transaction hands
    // it to the TU again so the ACK can be re-sent.
    bob.deliver_from(alice.transport.local(), invite.encode());
    settle(&mut alice, &mut bob, 2_000);

    let again = alice.drain_events();
    assert!(again
        .iter()
        .any(|e| matches!(e, TransactionEvent::SuccessResponse { .. })));
}
