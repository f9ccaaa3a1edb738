//! End-to-end call flow tests: two clients joined to one in-memory relay,
//! each with a deterministic media engine, exercising the full signaling
//! protocol exactly as two browser peers would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;

use telecore::types::call::{ConsultationId, EndCallReason};
use telecore::types::user::{SessionIdentity, UserRole};
use telemed_rust::calls::CallPhase;
use telemed_rust::calls::media::mock::MockMediaEngine;
use telemed_rust::client::Client;
use telemed_rust::config::ClientConfig;
use telemed_rust::handlers::EventHandler;
use telemed_rust::identity::SessionContext;
use telemed_rust::transport::Transport;
use telemed_rust::transport::TransportFactory;
use telemed_rust::transport::memory::{MemoryEndpoint, MemoryRelay};

const WAIT: Duration = Duration::from_secs(5);
const ROOM: &str = "consult-9";

struct Peer {
    client: Arc<Client>,
    engine: Arc<MockMediaEngine>,
    endpoint: Arc<MemoryEndpoint>,
}

fn test_config() -> ClientConfig {
    ClientConfig::default()
}

fn test_context(role: UserRole) -> SessionContext {
    let id = match role {
        UserRole::Patient => "patient-1",
        UserRole::Doctor => "doctor-1",
    };
    SessionContext::new(SessionIdentity::new(id, role), ConsultationId::new(ROOM))
}

async fn join(relay: &MemoryRelay, role: UserRole, config: ClientConfig) -> Peer {
    let endpoint = Arc::new(relay.endpoint());
    let engine = Arc::new(MockMediaEngine::new());
    let client = Client::new(config, test_context(role), endpoint.clone(), engine.clone());

    let mut connected = client.event_bus().connected.subscribe();
    client.connect().await.expect("connect");
    {
        let client = client.clone();
        tokio::spawn(async move {
            let _ = client.run().await;
        });
    }
    timeout(WAIT, connected.recv())
        .await
        .expect("timed out waiting for connect")
        .expect("connected event");

    Peer {
        client,
        engine,
        endpoint,
    }
}

async fn join_pair(relay: &MemoryRelay) -> (Peer, Peer) {
    let patient = join(relay, UserRole::Patient, test_config()).await;
    let doctor = join(relay, UserRole::Doctor, test_config()).await;
    (patient, doctor)
}

/// Run the whole setup handshake: request, accept, offer, answer.
async fn establish_call(patient: &Peer, doctor: &Peer) {
    let mut incoming = doctor.client.event_bus().incoming_call.subscribe();
    let mut patient_connected = patient.client.event_bus().call_connected.subscribe();
    let mut doctor_connected = doctor.client.event_bus().call_connected.subscribe();

    patient.client.calls().start_call().await.expect("start");
    timeout(WAIT, incoming.recv())
        .await
        .expect("timed out waiting for incoming call")
        .expect("incoming event");

    doctor.client.calls().accept_call().await.expect("accept");
    timeout(WAIT, doctor_connected.recv())
        .await
        .expect("timed out waiting for callee connect")
        .expect("connected event");
    timeout(WAIT, patient_connected.recv())
        .await
        .expect("timed out waiting for caller connect")
        .expect("connected event");
}

async fn wait_for_phase(
    peer: &Peer,
    what: &str,
    pred: impl Fn(&CallPhase) -> bool,
) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let phase = peer.client.calls().phase().await;
        if pred(&phase) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}; phase is {phase:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_until(what: &str, pred: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if pred() {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn count_frames(relay: &MemoryRelay, event: &str) -> usize {
    relay
        .sent_frames()
        .await
        .iter()
        .filter(|(_, bytes)| {
            serde_json::from_slice::<serde_json::Value>(bytes)
                .map(|value| value["event"] == event)
                .unwrap_or(false)
        })
        .count()
}

#[tokio::test]
async fn full_call_flow_connects_both_peers() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;
    let mut patient_remote = patient.client.event_bus().remote_stream.subscribe();
    let mut doctor_remote = doctor.client.event_bus().remote_stream.subscribe();

    // Media acquisition is deferred: requesting a call touches nothing.
    patient.client.calls().start_call().await.expect("start");
    assert_eq!(patient.engine.acquire_count(), 0);

    wait_for_phase(&doctor, "incoming ringing", CallPhase::can_accept).await;
    assert_eq!(doctor.engine.acquire_count(), 0);

    let mut patient_connected = patient.client.event_bus().call_connected.subscribe();
    let mut doctor_connected = doctor.client.event_bus().call_connected.subscribe();
    doctor.client.calls().accept_call().await.expect("accept");

    timeout(WAIT, doctor_connected.recv())
        .await
        .expect("callee connect")
        .expect("event");
    timeout(WAIT, patient_connected.recv())
        .await
        .expect("caller connect")
        .expect("event");
    assert!(patient.client.calls().phase().await.is_connected());
    assert!(doctor.client.calls().phase().await.is_connected());

    // Exactly one acquisition per session, no matter how the setup ran.
    assert_eq!(patient.engine.acquire_count(), 1);
    assert_eq!(doctor.engine.acquire_count(), 1);

    // Each side trickled two candidates; the other applied all of them.
    wait_until("patient candidates applied", || {
        patient
            .engine
            .peer_handles()
            .first()
            .is_some_and(|peer| peer.applied_candidates().len() == 2)
    })
    .await;
    wait_until("doctor candidates applied", || {
        doctor
            .engine
            .peer_handles()
            .first()
            .is_some_and(|peer| peer.applied_candidates().len() == 2)
    })
    .await;

    // Both sides bound the remote stream.
    timeout(WAIT, patient_remote.recv())
        .await
        .expect("caller remote stream")
        .expect("event");
    timeout(WAIT, doctor_remote.recv())
        .await
        .expect("callee remote stream")
        .expect("event");

    // Accepting twice is rejected by the state machine.
    assert!(doctor.client.calls().accept_call().await.is_err());
}

#[tokio::test]
async fn declined_call_returns_caller_to_idle_without_media() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;
    let mut declined = patient.client.event_bus().call_declined.subscribe();

    patient.client.calls().start_call().await.expect("start");
    wait_for_phase(&doctor, "incoming ringing", CallPhase::can_accept).await;

    doctor.client.calls().decline_call().await.expect("decline");

    timeout(WAIT, declined.recv())
        .await
        .expect("timed out waiting for decline")
        .expect("declined event");
    wait_for_phase(&patient, "caller back to idle", CallPhase::is_idle).await;
    assert!(doctor.client.calls().phase().await.is_idle());

    // Neither side ever touched a capture device or built a connection.
    assert_eq!(patient.engine.acquire_count(), 0);
    assert_eq!(doctor.engine.acquire_count(), 0);
    assert!(patient.engine.peer_handles().is_empty());
    assert!(doctor.engine.peer_handles().is_empty());
    assert_eq!(count_frames(&relay, "offer").await, 0);
}

#[tokio::test]
async fn end_call_releases_everything_and_is_never_echoed() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;
    let mut patient_ended = patient.client.event_bus().call_ended.subscribe();
    let mut doctor_ended = doctor.client.event_bus().call_ended.subscribe();

    establish_call(&patient, &doctor).await;

    doctor.client.calls().end_call().await.expect("end");

    let doctor_event = timeout(WAIT, doctor_ended.recv())
        .await
        .expect("local end event")
        .expect("event");
    assert_eq!(doctor_event.reason, EndCallReason::UserEnded);

    let patient_event = timeout(WAIT, patient_ended.recv())
        .await
        .expect("remote end event")
        .expect("event");
    assert_eq!(patient_event.reason, EndCallReason::RemoteEnded);

    // Terminal state on both sides, resources verifiably released.
    assert!(patient.client.calls().phase().await.is_ended());
    assert!(doctor.client.calls().phase().await.is_ended());
    wait_until("all resources released", || {
        patient.engine.all_resources_released() && doctor.engine.all_resources_released()
    })
    .await;

    // Exactly one end-call crossed the relay: receiving one must never
    // send one back.
    assert_eq!(count_frames(&relay, "end-call").await, 1);

    // Hanging up again is a harmless no-op.
    patient.client.calls().end_call().await.expect("idempotent end");
    assert_eq!(count_frames(&relay, "end-call").await, 1);
}

#[tokio::test]
async fn candidate_without_connection_is_dropped_not_fatal() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;

    // A stray candidate arrives before any call exists.
    let rogue = Arc::new(relay.endpoint());
    let (rogue_transport, _rogue_events) = rogue.create_transport().await.expect("rogue");
    let frame = serde_json::json!({
        "event": "ice-candidate",
        "data": {
            "consultationId": ROOM,
            "candidate": {"candidate": "candidate:0 1 udp 1 198.51.100.7 9 typ host"},
        },
    });
    rogue_transport
        .send_frame(serde_json::to_vec(&frame).expect("encode").as_slice())
        .await
        .expect("send");

    // Give the frame time to be dispatched and dropped.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(patient.client.calls().phase().await.is_idle());
    assert!(doctor.client.calls().phase().await.is_idle());
    assert!(patient.engine.peer_handles().is_empty());
    assert!(doctor.engine.peer_handles().is_empty());

    // The violation is non-fatal: a normal call still works afterwards.
    establish_call(&patient, &doctor).await;
}

#[tokio::test]
async fn unexpected_offer_is_dropped_in_the_wrong_phase() {
    let relay = MemoryRelay::new();
    let (_patient, doctor) = join_pair(&relay).await;

    let rogue = Arc::new(relay.endpoint());
    let (rogue_transport, _rogue_events) = rogue.create_transport().await.expect("rogue");
    let frame = serde_json::json!({
        "event": "offer",
        "data": {
            "consultationId": ROOM,
            "offer": {"type": "offer", "sdp": "v=0 rogue"},
        },
    });
    rogue_transport
        .send_frame(serde_json::to_vec(&frame).expect("encode").as_slice())
        .await
        .expect("send");

    tokio::time::sleep(Duration::from_millis(50)).await;
    // No implicit auto-accept: the callee stays idle and builds nothing.
    assert!(doctor.client.calls().phase().await.is_idle());
    assert!(doctor.engine.peer_handles().is_empty());
    assert_eq!(doctor.engine.acquire_count(), 0);
}

#[tokio::test]
async fn transport_loss_tears_down_silently() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;
    let mut ended = patient.client.event_bus().call_ended.subscribe();
    let mut disconnected = patient.client.event_bus().disconnected.subscribe();

    establish_call(&patient, &doctor).await;
    let end_calls_before = count_frames(&relay, "end-call").await;

    patient.endpoint.sever().await;

    let event = timeout(WAIT, ended.recv())
        .await
        .expect("timed out waiting for teardown")
        .expect("ended event");
    assert_eq!(event.reason, EndCallReason::TransportLost);

    let event = timeout(WAIT, disconnected.recv())
        .await
        .expect("timed out waiting for disconnect")
        .expect("disconnected event");
    assert!(!event.expected);

    wait_until("patient resources released", || {
        patient.engine.all_resources_released()
    })
    .await;
    // Silent teardown: the lost transport never carries an end-call.
    assert_eq!(count_frames(&relay, "end-call").await, end_calls_before);
}

#[tokio::test]
async fn denied_capture_returns_callee_to_idle() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;
    let mut failed = doctor.client.event_bus().call_failed.subscribe();

    patient.client.calls().start_call().await.expect("start");
    wait_for_phase(&doctor, "incoming ringing", CallPhase::can_accept).await;

    doctor.engine.fail_next_acquire();
    let result = doctor.client.calls().accept_call().await;
    assert!(result.is_err());

    timeout(WAIT, failed.recv())
        .await
        .expect("timed out waiting for failure event")
        .expect("failed event");
    assert!(doctor.client.calls().phase().await.is_idle());

    // The half-built connection was closed, no device is left open.
    wait_until("doctor resources released", || {
        doctor.engine.all_resources_released()
    })
    .await;
    // No acceptance was ever announced.
    assert_eq!(count_frames(&relay, "call-accepted").await, 0);
}

#[tokio::test]
async fn unanswered_request_times_out_with_one_end_call() {
    let relay = MemoryRelay::new();
    let config = ClientConfig {
        ring_timeout_secs: 1,
        ..ClientConfig::default()
    };
    let patient = join(&relay, UserRole::Patient, config).await;
    let mut ended = patient.client.event_bus().call_ended.subscribe();

    patient.client.calls().start_call().await.expect("start");

    let event = timeout(WAIT, ended.recv())
        .await
        .expect("timed out waiting for ring timeout")
        .expect("ended event");
    assert_eq!(event.reason, EndCallReason::Timeout);
    assert!(patient.client.calls().phase().await.is_ended());
    assert_eq!(count_frames(&relay, "end-call").await, 1);
}

struct CountingHandler {
    seen: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl EventHandler for CountingHandler {
    fn events(&self) -> &'static [&'static str] {
        &["receiveMessage"]
    }

    async fn handle(&self, _client: Arc<Client>, _event: &str, _data: serde_json::Value) -> bool {
        self.seen.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[tokio::test]
async fn chat_rides_the_relay_and_all_handlers_fire() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;

    // A second handler on the same event must also fire.
    let seen = Arc::new(AtomicUsize::new(0));
    doctor.client.register_handler(Arc::new(CountingHandler {
        seen: seen.clone(),
    }));

    let mut chat = doctor.client.event_bus().chat_message.subscribe();
    patient
        .client
        .send_chat("hello doctor")
        .await
        .expect("send chat");

    let message = timeout(WAIT, chat.recv())
        .await
        .expect("timed out waiting for chat")
        .expect("chat event");
    assert_eq!(message.message, "hello doctor");
    assert_eq!(message.sender_id, "patient-1");
    assert_eq!(message.sender_role, Some(UserRole::Patient));

    wait_until("extra handler fired", || seen.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn a_new_call_can_start_after_a_finished_one() {
    let relay = MemoryRelay::new();
    let (patient, doctor) = join_pair(&relay).await;

    establish_call(&patient, &doctor).await;
    patient.client.calls().end_call().await.expect("end");
    wait_for_phase(&doctor, "callee ended", CallPhase::is_ended).await;

    // A fresh attempt starts over from idle with a fresh session.
    establish_call(&patient, &doctor).await;
    assert!(patient.client.calls().phase().await.is_connected());
    // The second attempt acquired its own devices.
    assert_eq!(patient.engine.acquire_count(), 2);
}
