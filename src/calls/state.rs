//! Call state machine implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use telecore::types::call::{CallDirection, CallId, ConsultationId, EndCallReason};

/// Current phase of a call attempt.
///
/// One explicit enum instead of a set of booleans, so combinations like
/// "in call but never started" are unrepresentable.
#[derive(Debug, Clone, Serialize, Default)]
pub enum CallPhase {
    /// No call in flight.
    #[default]
    Idle,
    /// Outgoing: `call-request` sent, waiting for the callee. Nothing has
    /// been acquired yet.
    Requesting { requested_at: DateTime<Utc> },
    /// Incoming: an accept/decline prompt is up. Nothing has been
    /// acquired yet.
    IncomingRinging { received_at: DateTime<Utc> },
    /// Acceptance happened on both ends; offer/answer is in flight.
    Negotiating { accepted_at: DateTime<Utc> },
    /// Descriptions applied on both sides; media is flowing.
    Connected { connected_at: DateTime<Utc> },
    /// Terminal for this attempt. A new attempt starts over at `Idle`
    /// with a fresh session.
    Ended {
        reason: EndCallReason,
        ended_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },
}

impl CallPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }

    /// Whether a call attempt is currently occupying the session.
    pub fn is_active(&self) -> bool {
        !self.is_idle() && !self.is_ended()
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, Self::IncomingRinging { .. })
    }

    pub fn can_decline(&self) -> bool {
        matches!(self, Self::IncomingRinging { .. })
    }
}

/// State transitions for calls.
#[derive(Debug, Clone)]
pub enum CallTransition {
    RequestSent,
    RequestReceived,
    RemoteAccepted,
    LocalAccepted,
    RemoteDeclined,
    LocalDeclined,
    NegotiationComplete,
    /// Device acquisition failed mid-setup; back to idle so the user can
    /// retry, never to a half-built connection.
    MediaFailed,
    Terminated {
        reason: EndCallReason,
    },
}

/// Full information about one call attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CallInfo {
    pub call_id: CallId,
    pub consultation_id: ConsultationId,
    pub direction: CallDirection,
    pub phase: CallPhase,
    pub created_at: DateTime<Utc>,
}

impl CallInfo {
    pub fn new_outgoing(consultation_id: ConsultationId) -> Self {
        Self {
            call_id: CallId::generate(),
            consultation_id,
            direction: CallDirection::Outgoing,
            phase: CallPhase::Idle,
            created_at: Utc::now(),
        }
    }

    pub fn new_incoming(consultation_id: ConsultationId) -> Self {
        Self {
            call_id: CallId::generate(),
            consultation_id,
            direction: CallDirection::Incoming,
            phase: CallPhase::Idle,
            created_at: Utc::now(),
        }
    }

    pub fn is_caller(&self) -> bool {
        self.direction.is_caller()
    }

    /// Apply a state transition. Returns an error if the transition is
    /// invalid for the current phase.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<(), InvalidTransition> {
        let new_phase = match (&self.phase, transition) {
            (CallPhase::Idle, CallTransition::RequestSent) => CallPhase::Requesting {
                requested_at: Utc::now(),
            },
            (CallPhase::Idle, CallTransition::RequestReceived) => CallPhase::IncomingRinging {
                received_at: Utc::now(),
            },
            (CallPhase::Requesting { .. }, CallTransition::RemoteAccepted) => {
                CallPhase::Negotiating {
                    accepted_at: Utc::now(),
                }
            }
            (CallPhase::Requesting { .. }, CallTransition::RemoteDeclined) => CallPhase::Idle,
            (CallPhase::IncomingRinging { .. }, CallTransition::LocalAccepted) => {
                CallPhase::Negotiating {
                    accepted_at: Utc::now(),
                }
            }
            (CallPhase::IncomingRinging { .. }, CallTransition::LocalDeclined) => CallPhase::Idle,
            (CallPhase::Negotiating { .. }, CallTransition::NegotiationComplete) => {
                CallPhase::Connected {
                    connected_at: Utc::now(),
                }
            }
            (
                CallPhase::IncomingRinging { .. } | CallPhase::Negotiating { .. },
                CallTransition::MediaFailed,
            ) => CallPhase::Idle,
            (
                CallPhase::Requesting { .. }
                | CallPhase::IncomingRinging { .. }
                | CallPhase::Negotiating { .. },
                CallTransition::Terminated { reason },
            ) => CallPhase::Ended {
                reason,
                ended_at: Utc::now(),
                duration_secs: None,
            },
            (CallPhase::Connected { connected_at }, CallTransition::Terminated { reason }) => {
                let duration = Utc::now()
                    .signed_duration_since(*connected_at)
                    .num_seconds();
                CallPhase::Ended {
                    reason,
                    ended_at: Utc::now(),
                    duration_secs: Some(duration),
                }
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_phase: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        self.phase = new_phase;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_phase: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in phase {}",
            self.attempted, self.current_phase
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> ConsultationId {
        ConsultationId::new("consult-1")
    }

    fn make_outgoing_call() -> CallInfo {
        let mut call = CallInfo::new_outgoing(room());
        call.apply_transition(CallTransition::RequestSent).unwrap();
        call
    }

    fn make_incoming_call() -> CallInfo {
        let mut call = CallInfo::new_incoming(room());
        call.apply_transition(CallTransition::RequestReceived)
            .unwrap();
        call
    }

    /// Flow: Idle → Requesting → Negotiating → Connected → Ended
    #[test]
    fn test_outgoing_call_flow() {
        let mut call = make_outgoing_call();
        assert!(matches!(call.phase, CallPhase::Requesting { .. }));
        assert!(call.is_caller());

        call.apply_transition(CallTransition::RemoteAccepted)
            .unwrap();
        assert!(matches!(call.phase, CallPhase::Negotiating { .. }));

        call.apply_transition(CallTransition::NegotiationComplete)
            .unwrap();
        assert!(call.phase.is_connected());

        call.apply_transition(CallTransition::Terminated {
            reason: EndCallReason::UserEnded,
        })
        .unwrap();
        assert!(call.phase.is_ended());

        // Verify duration was recorded for a connected call
        if let CallPhase::Ended { duration_secs, .. } = call.phase {
            assert!(duration_secs.is_some());
        }
    }

    /// Flow: Idle → IncomingRinging → Negotiating → Connected → Ended
    #[test]
    fn test_incoming_call_flow() {
        let mut call = make_incoming_call();
        assert!(call.phase.can_accept());
        assert!(!call.is_caller());

        call.apply_transition(CallTransition::LocalAccepted)
            .unwrap();
        assert!(matches!(call.phase, CallPhase::Negotiating { .. }));

        call.apply_transition(CallTransition::NegotiationComplete)
            .unwrap();
        assert!(call.phase.is_connected());

        call.apply_transition(CallTransition::Terminated {
            reason: EndCallReason::RemoteEnded,
        })
        .unwrap();
        assert!(call.phase.is_ended());
    }

    /// A declined outgoing request goes back to Idle, not to Ended: the
    /// user may simply try again.
    #[test]
    fn test_outgoing_call_declined_returns_to_idle() {
        let mut call = make_outgoing_call();
        call.apply_transition(CallTransition::RemoteDeclined)
            .unwrap();
        assert!(call.phase.is_idle());
    }

    #[test]
    fn test_incoming_call_declined_returns_to_idle() {
        let mut call = make_incoming_call();
        assert!(call.phase.can_decline());
        call.apply_transition(CallTransition::LocalDeclined)
            .unwrap();
        assert!(call.phase.is_idle());
    }

    /// Device acquisition failure rolls the attempt back to Idle from
    /// either setup phase.
    #[test]
    fn test_media_failure_returns_to_idle() {
        let mut call = make_incoming_call();
        assert!(
            call.apply_transition(CallTransition::MediaFailed)
                .is_ok()
        );
        assert!(call.phase.is_idle());

        let mut call = make_outgoing_call();
        call.apply_transition(CallTransition::RemoteAccepted)
            .unwrap();
        call.apply_transition(CallTransition::MediaFailed).unwrap();
        assert!(call.phase.is_idle());
    }

    /// Test invalid state transitions are rejected.
    #[test]
    fn test_invalid_transitions() {
        let mut call = CallInfo::new_outgoing(room());

        // Can't complete negotiation from Idle
        assert!(
            call.apply_transition(CallTransition::NegotiationComplete)
                .is_err()
        );
        // Can't accept a call nobody requested
        assert!(
            call.apply_transition(CallTransition::LocalAccepted)
                .is_err()
        );

        let mut call = make_outgoing_call();
        // The caller cannot locally accept its own request
        assert!(
            call.apply_transition(CallTransition::LocalAccepted)
                .is_err()
        );
    }

    /// Test that ended calls reject further transitions.
    #[test]
    fn test_ended_call_rejects_transitions() {
        let mut call = make_outgoing_call();
        call.apply_transition(CallTransition::Terminated {
            reason: EndCallReason::Timeout,
        })
        .unwrap();
        assert!(call.phase.is_ended());

        assert!(
            call.apply_transition(CallTransition::RemoteAccepted)
                .is_err()
        );
        assert!(
            call.apply_transition(CallTransition::Terminated {
                reason: EndCallReason::UserEnded,
            })
            .is_err()
        );
    }

    /// Unconnected calls record no duration.
    #[test]
    fn test_unconnected_call_has_no_duration() {
        let mut call = make_incoming_call();
        call.apply_transition(CallTransition::Terminated {
            reason: EndCallReason::RemoteEnded,
        })
        .unwrap();
        if let CallPhase::Ended { duration_secs, .. } = call.phase {
            assert_eq!(duration_secs, None);
        } else {
            panic!("call should be ended");
        }
    }
}
