//! Call signaling wire definitions.
//!
//! Seven named events drive call setup and teardown. Every payload
//! carries the consultation id so the relay (and the receiving client)
//! can scope it to the right room.

use serde::{Deserialize, Serialize};
use std::fmt;

use telecore::types::call::{ConsultationId, IceCandidate, SessionDescription};

use crate::socket::{RelayFrame, consts};

/// Signaling event types for call control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingEvent {
    /// Caller asks the callee to start a call. Nothing is acquired yet on
    /// either side.
    CallRequest,

    /// Callee accepted and has its media ready; the caller may now build
    /// the offer.
    CallAccepted,

    /// Callee declined; the caller returns to idle without having
    /// acquired anything.
    CallDeclined,

    /// Caller's session description.
    Offer,

    /// Callee's session description.
    Answer,

    /// Connectivity candidate, trickled by either side any number of
    /// times, in any order relative to offer/answer.
    IceCandidate,

    /// Either side hangs up. The receiver tears down silently and never
    /// echoes this back.
    EndCall,
}

impl SignalingEvent {
    pub const ALL: [SignalingEvent; 7] = [
        Self::CallRequest,
        Self::CallAccepted,
        Self::CallDeclined,
        Self::Offer,
        Self::Answer,
        Self::IceCandidate,
        Self::EndCall,
    ];

    /// The case-sensitive wire name of this event.
    pub fn name(self) -> &'static str {
        match self {
            Self::CallRequest => consts::CALL_REQUEST,
            Self::CallAccepted => consts::CALL_ACCEPTED,
            Self::CallDeclined => consts::CALL_DECLINED,
            Self::Offer => consts::OFFER,
            Self::Answer => consts::ANSWER,
            Self::IceCandidate => consts::ICE_CANDIDATE,
            Self::EndCall => consts::END_CALL,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }
}

impl fmt::Display for SignalingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of the control events that carry nothing but the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallControlPayload {
    pub consultation_id: ConsultationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    pub consultation_id: ConsultationId,
    pub offer: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub consultation_id: ConsultationId,
    pub answer: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    pub consultation_id: ConsultationId,
    pub candidate: IceCandidate,
}

/// One parsed (or to-be-sent) signaling message.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingMessage {
    CallRequest {
        consultation_id: ConsultationId,
    },
    CallAccepted {
        consultation_id: ConsultationId,
    },
    CallDeclined {
        consultation_id: ConsultationId,
    },
    Offer {
        consultation_id: ConsultationId,
        sdp: SessionDescription,
    },
    Answer {
        consultation_id: ConsultationId,
        sdp: SessionDescription,
    },
    IceCandidate {
        consultation_id: ConsultationId,
        candidate: IceCandidate,
    },
    EndCall {
        consultation_id: ConsultationId,
    },
}

impl SignalingMessage {
    pub fn event(&self) -> SignalingEvent {
        match self {
            Self::CallRequest { .. } => SignalingEvent::CallRequest,
            Self::CallAccepted { .. } => SignalingEvent::CallAccepted,
            Self::CallDeclined { .. } => SignalingEvent::CallDeclined,
            Self::Offer { .. } => SignalingEvent::Offer,
            Self::Answer { .. } => SignalingEvent::Answer,
            Self::IceCandidate { .. } => SignalingEvent::IceCandidate,
            Self::EndCall { .. } => SignalingEvent::EndCall,
        }
    }

    pub fn consultation_id(&self) -> &ConsultationId {
        match self {
            Self::CallRequest { consultation_id }
            | Self::CallAccepted { consultation_id }
            | Self::CallDeclined { consultation_id }
            | Self::Offer {
                consultation_id, ..
            }
            | Self::Answer {
                consultation_id, ..
            }
            | Self::IceCandidate {
                consultation_id, ..
            }
            | Self::EndCall { consultation_id } => consultation_id,
        }
    }

    /// Build the relay frame for this message.
    pub fn to_frame(&self) -> Result<RelayFrame, serde_json::Error> {
        let event = self.event().name();
        let data = match self {
            Self::CallRequest { consultation_id }
            | Self::CallAccepted { consultation_id }
            | Self::CallDeclined { consultation_id }
            | Self::EndCall { consultation_id } => {
                serde_json::to_value(CallControlPayload {
                    consultation_id: consultation_id.clone(),
                })?
            }
            Self::Offer {
                consultation_id,
                sdp,
            } => serde_json::to_value(OfferPayload {
                consultation_id: consultation_id.clone(),
                offer: sdp.clone(),
            })?,
            Self::Answer {
                consultation_id,
                sdp,
            } => serde_json::to_value(AnswerPayload {
                consultation_id: consultation_id.clone(),
                answer: sdp.clone(),
            })?,
            Self::IceCandidate {
                consultation_id,
                candidate,
            } => serde_json::to_value(CandidatePayload {
                consultation_id: consultation_id.clone(),
                candidate: candidate.clone(),
            })?,
        };
        Ok(RelayFrame::new(event, data))
    }

    /// Parse the payload of a received event.
    pub fn from_frame(
        event: SignalingEvent,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match event {
            SignalingEvent::CallRequest => {
                let p: CallControlPayload = serde_json::from_value(data)?;
                Self::CallRequest {
                    consultation_id: p.consultation_id,
                }
            }
            SignalingEvent::CallAccepted => {
                let p: CallControlPayload = serde_json::from_value(data)?;
                Self::CallAccepted {
                    consultation_id: p.consultation_id,
                }
            }
            SignalingEvent::CallDeclined => {
                let p: CallControlPayload = serde_json::from_value(data)?;
                Self::CallDeclined {
                    consultation_id: p.consultation_id,
                }
            }
            SignalingEvent::Offer => {
                let p: OfferPayload = serde_json::from_value(data)?;
                Self::Offer {
                    consultation_id: p.consultation_id,
                    sdp: p.offer,
                }
            }
            SignalingEvent::Answer => {
                let p: AnswerPayload = serde_json::from_value(data)?;
                Self::Answer {
                    consultation_id: p.consultation_id,
                    sdp: p.answer,
                }
            }
            SignalingEvent::IceCandidate => {
                let p: CandidatePayload = serde_json::from_value(data)?;
                Self::IceCandidate {
                    consultation_id: p.consultation_id,
                    candidate: p.candidate,
                }
            }
            SignalingEvent::EndCall => {
                let p: CallControlPayload = serde_json::from_value(data)?;
                Self::EndCall {
                    consultation_id: p.consultation_id,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn room() -> ConsultationId {
        ConsultationId::new("consult-7")
    }

    #[test]
    fn event_names_match_the_wire_contract() {
        assert_eq!(SignalingEvent::CallRequest.name(), "call-request");
        assert_eq!(SignalingEvent::IceCandidate.name(), "ice-candidate");
        assert_eq!(SignalingEvent::EndCall.name(), "end-call");
        assert_eq!(
            SignalingEvent::from_name("call-declined"),
            Some(SignalingEvent::CallDeclined)
        );
        assert_eq!(SignalingEvent::from_name("joinRoom"), None);
    }

    #[test]
    fn offer_frame_carries_room_and_sdp() {
        let msg = SignalingMessage::Offer {
            consultation_id: room(),
            sdp: SessionDescription(json!({"type": "offer", "sdp": "v=0"})),
        };
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.event, "offer");
        assert_eq!(frame.data["consultationId"], json!("consult-7"));
        assert_eq!(frame.data["offer"]["sdp"], json!("v=0"));

        let parsed = SignalingMessage::from_frame(SignalingEvent::Offer, frame.data).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn control_messages_round_trip() {
        let msg = SignalingMessage::EndCall {
            consultation_id: room(),
        };
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.event, "end-call");
        let parsed = SignalingMessage::from_frame(SignalingEvent::EndCall, frame.data).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn candidate_payload_is_opaque() {
        let candidate = IceCandidate(json!({
            "candidate": "candidate:0 1 UDP 2122252543 192.0.2.1 54400 typ host",
            "sdpMLineIndex": 0
        }));
        let msg = SignalingMessage::IceCandidate {
            consultation_id: room(),
            candidate: candidate.clone(),
        };
        let frame = msg.to_frame().unwrap();
        let parsed =
            SignalingMessage::from_frame(SignalingEvent::IceCandidate, frame.data).unwrap();
        match parsed {
            SignalingMessage::IceCandidate { candidate: c, .. } => assert_eq!(c, candidate),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn missing_room_fails_to_parse() {
        let err = SignalingMessage::from_frame(SignalingEvent::CallRequest, json!({}));
        assert!(err.is_err());
    }
}
