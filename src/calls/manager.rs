//! Call manager for orchestrating call lifecycle.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use telecore::types::call::{
    CallId, ConsultationId, EndCallReason, IceCandidate, SessionDescription,
};
use telecore::types::events::{
    CallAccepted, CallConnected, CallDeclined, CallEnded, CallFailed, IncomingCall,
    RemoteStreamAttached,
};

use crate::identity::SessionContext;
use crate::socket::{RelaySocket, SocketError};
use crate::types::events::EventBus;

use super::error::CallError;
use super::media::{
    MediaEngine, MediaError, MediaSession, PeerConnectionConfig, PeerConnectionHandle, PeerEvent,
};
use super::signaling::SignalingMessage;
use super::state::{CallInfo, CallPhase, CallTransition, InvalidTransition};

/// Configuration for the call manager.
#[derive(Debug, Clone)]
pub struct CallManagerConfig {
    /// How long an outgoing request may ring before it is torn down.
    pub ring_timeout_secs: u64,
    /// Handed to the peer-connection layer on creation.
    pub peer_config: PeerConnectionConfig,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 45,
            peer_config: PeerConnectionConfig::default(),
        }
    }
}

/// One call attempt occupying the session: its state machine plus the
/// media session holding its resources. Destroyed and recreated for each
/// new attempt.
struct ActiveCall {
    info: CallInfo,
    media: Arc<MediaSession>,
    ring_timer: Option<JoinHandle<()>>,
}

/// Orchestrates call setup and teardown for one consultation session.
///
/// UI actions (`start_call`, `accept_call`, `decline_call`, `end_call`)
/// and incoming signaling events (`handle_*`) both funnel into the same
/// state machine; all teardown paths go through [`MediaSession::release`].
pub struct CallManager {
    context: SessionContext,
    config: CallManagerConfig,
    socket: Arc<RelaySocket>,
    bus: Arc<EventBus>,
    engine: Arc<dyn MediaEngine>,
    session: RwLock<Option<ActiveCall>>,
}

impl CallManager {
    pub fn new(
        context: SessionContext,
        config: CallManagerConfig,
        socket: Arc<RelaySocket>,
        bus: Arc<EventBus>,
        engine: Arc<dyn MediaEngine>,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            config,
            socket,
            bus,
            engine,
            session: RwLock::new(None),
        })
    }

    fn room(&self) -> &ConsultationId {
        self.context.consultation()
    }

    /// Phase of the current attempt, `Idle` when none is in flight.
    pub async fn phase(&self) -> CallPhase {
        self.session
            .read()
            .await
            .as_ref()
            .map(|active| active.info.phase.clone())
            .unwrap_or_default()
    }

    pub async fn current_call(&self) -> Option<CallInfo> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|active| active.info.clone())
    }

    async fn send_signaling(&self, message: &SignalingMessage) -> Result<(), CallError> {
        let frame = message.to_frame().map_err(SocketError::from)?;
        self.socket.send_frame(frame).await?;
        Ok(())
    }

    /// User action: request a call. Nothing is acquired until the callee
    /// accepts, so an unanswered request never touches the devices.
    pub async fn start_call(self: &Arc<Self>) -> Result<CallId, CallError> {
        let mut session = self.session.write().await;
        if let Some(active) = session.as_ref()
            && active.info.phase.is_active()
        {
            return Err(CallError::CallInProgress);
        }
        let mut info = CallInfo::new_outgoing(self.room().clone());
        info.apply_transition(CallTransition::RequestSent)?;
        let call_id = info.call_id.clone();
        self.send_signaling(&SignalingMessage::CallRequest {
            consultation_id: self.room().clone(),
        })
        .await?;
        let ring_timer = self.spawn_ring_timer(call_id.clone());
        let media = MediaSession::new(self.engine.clone(), self.config.peer_config.clone());
        *session = Some(ActiveCall {
            info,
            media,
            ring_timer: Some(ring_timer),
        });
        info!(
            "call {} requested for consultation {}",
            call_id,
            self.room()
        );
        Ok(call_id)
    }

    /// User action: accept the ringing incoming call. Creates the peer
    /// connection and acquires the devices before announcing readiness.
    pub async fn accept_call(self: &Arc<Self>) -> Result<(), CallError> {
        let (call_id, media) = {
            let session = self.session.read().await;
            let active = session.as_ref().ok_or(CallError::NoActiveCall)?;
            if !active.info.phase.can_accept() {
                return Err(CallError::InvalidTransition(InvalidTransition {
                    current_phase: format!("{:?}", active.info.phase),
                    attempted: "LocalAccepted".to_string(),
                }));
            }
            (active.info.call_id.clone(), active.media.clone())
        };

        // The session lock is not held while the devices come up, so a
        // hang-up arriving meanwhile can still tear down; the released
        // guard then discards this work.
        if let Err(e) = self.setup_local_media(&call_id, &media).await {
            return Err(self.fail_setup(&call_id, e).await);
        }

        let mut session = self.session.write().await;
        let active = session.as_mut().ok_or(CallError::NoActiveCall)?;
        if active.info.call_id != call_id || !active.info.phase.can_accept() {
            debug!("call {} was superseded during accept, discarding", call_id);
            return Err(CallError::NoActiveCall);
        }
        active.info.apply_transition(CallTransition::LocalAccepted)?;
        self.send_signaling(&SignalingMessage::CallAccepted {
            consultation_id: self.room().clone(),
        })
        .await?;
        info!("call {} accepted, awaiting the caller's offer", call_id);
        Ok(())
    }

    /// User action: decline the ringing incoming call. No resources were
    /// acquired, so there is nothing to release; the session still runs
    /// through the release routine so it can never be reused.
    pub async fn decline_call(&self) -> Result<(), CallError> {
        let mut session = self.session.write().await;
        let active = session.as_mut().ok_or(CallError::NoActiveCall)?;
        if !active.info.phase.can_decline() {
            return Err(CallError::InvalidTransition(InvalidTransition {
                current_phase: format!("{:?}", active.info.phase),
                attempted: "LocalDeclined".to_string(),
            }));
        }
        active.info.apply_transition(CallTransition::LocalDeclined)?;
        active.media.release().await;
        self.send_signaling(&SignalingMessage::CallDeclined {
            consultation_id: self.room().clone(),
        })
        .await?;
        info!("incoming call {} declined", active.info.call_id);
        Ok(())
    }

    /// User action: hang up. Local resources are torn down first, then
    /// the peer is notified. Ending with no call in flight is a no-op.
    pub async fn end_call(&self) -> Result<(), CallError> {
        let mut session = self.session.write().await;
        match session.as_mut() {
            Some(active) if active.info.phase.is_active() => {
                self.terminate_active(active, EndCallReason::UserEnded, true)
                    .await;
                Ok(())
            }
            _ => {
                debug!("end_call with nothing active, nothing to do");
                Ok(())
            }
        }
    }

    /// `call-request` received: surface the accept/decline prompt. No
    /// connection is created yet.
    pub async fn handle_call_request(&self) {
        let mut session = self.session.write().await;
        if let Some(active) = session.as_ref()
            && active.info.phase.is_active()
        {
            warn!(
                "call-request received while call {} is in progress, ignoring",
                active.info.call_id
            );
            return;
        }
        let mut info = CallInfo::new_incoming(self.room().clone());
        if let Err(e) = info.apply_transition(CallTransition::RequestReceived) {
            warn!("cannot register incoming call: {e}");
            return;
        }
        let call_id = info.call_id.clone();
        let received_at = info.created_at;
        let media = MediaSession::new(self.engine.clone(), self.config.peer_config.clone());
        *session = Some(ActiveCall {
            info,
            media,
            ring_timer: None,
        });
        let _ = self.bus.incoming_call.send(Arc::new(IncomingCall {
            call_id,
            consultation_id: self.room().clone(),
            received_at,
        }));
        info!("incoming call request for consultation {}", self.room());
    }

    /// `call-accepted` received: the callee is ready. Build the
    /// connection, acquire the devices, and send our offer.
    pub async fn handle_call_accepted(self: &Arc<Self>) {
        let (call_id, media) = {
            let mut session = self.session.write().await;
            let Some(active) = session.as_mut() else {
                warn!("call-accepted received with no active call, ignoring");
                return;
            };
            if !matches!(active.info.phase, CallPhase::Requesting { .. }) {
                warn!(
                    "call-accepted received in phase {:?}, ignoring",
                    active.info.phase
                );
                return;
            }
            if let Some(timer) = active.ring_timer.take() {
                timer.abort();
            }
            if let Err(e) = active.info.apply_transition(CallTransition::RemoteAccepted) {
                warn!("call-accepted: {e}");
                return;
            }
            let _ = self.bus.call_accepted.send(Arc::new(CallAccepted {
                call_id: active.info.call_id.clone(),
                consultation_id: active.info.consultation_id.clone(),
            }));
            (active.info.call_id.clone(), active.media.clone())
        };

        let offer = match self.build_offer(&call_id, &media).await {
            Ok(offer) => offer,
            Err(e) => {
                let _ = self.fail_setup(&call_id, e).await;
                return;
            }
        };

        let session = self.session.read().await;
        match session.as_ref() {
            Some(active)
                if active.info.call_id == call_id
                    && matches!(active.info.phase, CallPhase::Negotiating { .. }) =>
            {
                let message = SignalingMessage::Offer {
                    consultation_id: self.room().clone(),
                    sdp: offer,
                };
                match self.send_signaling(&message).await {
                    Ok(()) => debug!("offer sent for call {}, awaiting answer", call_id),
                    Err(e) => warn!("failed to send offer: {e}"),
                }
            }
            _ => debug!(
                "call {} was superseded before the offer was sent, discarding",
                call_id
            ),
        }
    }

    /// `call-declined` received: back to idle, nothing was ever acquired.
    pub async fn handle_call_declined(&self) {
        let mut session = self.session.write().await;
        let Some(active) = session.as_mut() else {
            warn!("call-declined received with no active call, ignoring");
            return;
        };
        if !matches!(active.info.phase, CallPhase::Requesting { .. }) {
            warn!(
                "call-declined received in phase {:?}, ignoring",
                active.info.phase
            );
            return;
        }
        if let Some(timer) = active.ring_timer.take() {
            timer.abort();
        }
        active.media.release().await;
        if let Err(e) = active.info.apply_transition(CallTransition::RemoteDeclined) {
            warn!("call-declined: {e}");
            return;
        }
        let _ = self.bus.call_declined.send(Arc::new(CallDeclined {
            call_id: active.info.call_id.clone(),
            consultation_id: active.info.consultation_id.clone(),
        }));
        info!("call {} was declined by the remote peer", active.info.call_id);
    }

    /// `offer` received (callee): apply it, answer, and we are connected.
    pub async fn handle_offer(self: &Arc<Self>, sdp: SessionDescription) {
        let (call_id, media) = {
            let session = self.session.read().await;
            let Some(active) = session.as_ref() else {
                warn!("offer received with no active call, dropping");
                return;
            };
            if !matches!(active.info.phase, CallPhase::Negotiating { .. }) {
                warn!("offer received in phase {:?}, dropping", active.info.phase);
                return;
            }
            (active.info.call_id.clone(), active.media.clone())
        };

        let answer = match self.build_answer(&call_id, &media, sdp).await {
            Ok(answer) => answer,
            Err(e) => {
                let _ = self.fail_setup(&call_id, e).await;
                return;
            }
        };

        let mut session = self.session.write().await;
        let Some(active) = session.as_mut() else {
            return;
        };
        if active.info.call_id != call_id
            || !matches!(active.info.phase, CallPhase::Negotiating { .. })
        {
            debug!("call {} was superseded while answering, discarding", call_id);
            return;
        }
        if let Err(e) = active
            .info
            .apply_transition(CallTransition::NegotiationComplete)
        {
            warn!("offer: {e}");
            return;
        }
        let message = SignalingMessage::Answer {
            consultation_id: self.room().clone(),
            sdp: answer,
        };
        if let Err(e) = self.send_signaling(&message).await {
            warn!("failed to send answer: {e}");
        }
        let _ = self.bus.call_connected.send(Arc::new(CallConnected {
            call_id: call_id.clone(),
            consultation_id: self.room().clone(),
        }));
        info!("call {} connected", call_id);
    }

    /// `answer` received (caller): apply it and we are connected.
    pub async fn handle_answer(&self, sdp: SessionDescription) {
        let (call_id, peer) = {
            let session = self.session.read().await;
            let Some(active) = session.as_ref() else {
                warn!("answer received with no active call, dropping");
                return;
            };
            if !matches!(active.info.phase, CallPhase::Negotiating { .. }) {
                warn!("answer received in phase {:?}, dropping", active.info.phase);
                return;
            }
            let Some(peer) = active.media.peer().await else {
                warn!("no peer connection when the answer arrived, dropping");
                return;
            };
            (active.info.call_id.clone(), peer)
        };

        if let Err(e) = peer.set_remote_description(sdp).await {
            let _ = self.fail_setup(&call_id, e).await;
            return;
        }

        let mut session = self.session.write().await;
        let Some(active) = session.as_mut() else {
            return;
        };
        if active.info.call_id != call_id
            || !matches!(active.info.phase, CallPhase::Negotiating { .. })
        {
            return;
        }
        if let Err(e) = active
            .info
            .apply_transition(CallTransition::NegotiationComplete)
        {
            warn!("answer: {e}");
            return;
        }
        let _ = self.bus.call_connected.send(Arc::new(CallConnected {
            call_id: call_id.clone(),
            consultation_id: self.room().clone(),
        }));
        info!("call {} connected", call_id);
    }

    /// `ice-candidate` received: applied as soon as a connection handle
    /// exists; without one the candidate is a protocol-order violation
    /// and is dropped with a warning, never an error.
    pub async fn handle_ice_candidate(&self, candidate: IceCandidate) {
        let peer = {
            let session = self.session.read().await;
            let Some(active) = session.as_ref() else {
                warn!("ice-candidate received with no active call, dropping");
                return;
            };
            active.media.peer().await
        };
        match peer {
            Some(peer) => {
                if let Err(e) = peer.add_ice_candidate(candidate).await {
                    warn!("failed to apply ice candidate: {e}");
                }
            }
            None => warn!("ice-candidate received before a peer connection exists, dropping"),
        }
    }

    /// `end-call` received: silent cleanup. Never re-emit, or the two
    /// peers would bounce the signal back and forth forever.
    pub async fn handle_end_call(&self) {
        let mut session = self.session.write().await;
        match session.as_mut() {
            Some(active) if active.info.phase.is_active() => {
                self.terminate_active(active, EndCallReason::RemoteEnded, false)
                    .await;
            }
            _ => debug!("end-call received with no active call, ignoring"),
        }
    }

    /// The relay transport dropped. Treated exactly like receiving
    /// `end-call`: silent teardown, nothing sent.
    pub async fn handle_transport_lost(&self) {
        let mut session = self.session.write().await;
        if let Some(active) = session.as_mut()
            && active.info.phase.is_active()
        {
            warn!("relay transport lost mid-call, tearing down silently");
            self.terminate_active(active, EndCallReason::TransportLost, false)
                .await;
        }
    }

    fn spawn_ring_timer(self: &Arc<Self>, call_id: CallId) -> JoinHandle<()> {
        let manager = self.clone();
        let timeout = Duration::from_secs(self.config.ring_timeout_secs);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.expire_ring(call_id).await;
        })
    }

    async fn expire_ring(&self, call_id: CallId) {
        let mut session = self.session.write().await;
        let Some(active) = session.as_mut() else {
            return;
        };
        if active.info.call_id != call_id
            || !matches!(active.info.phase, CallPhase::Requesting { .. })
        {
            return;
        }
        warn!("call {} was never answered, giving up", call_id);
        self.terminate_active(active, EndCallReason::Timeout, true)
            .await;
    }

    /// Shared teardown: resources first, then (only for local-initiated
    /// ends) the `end-call` notification, then the bus event.
    async fn terminate_active(
        &self,
        active: &mut ActiveCall,
        reason: EndCallReason,
        notify_peer: bool,
    ) {
        if let Some(timer) = active.ring_timer.take() {
            timer.abort();
        }
        active.media.release().await;
        if let Err(e) = active
            .info
            .apply_transition(CallTransition::Terminated { reason })
        {
            debug!("terminating call {}: {}", active.info.call_id, e);
        }
        if notify_peer {
            let message = SignalingMessage::EndCall {
                consultation_id: self.room().clone(),
            };
            if let Err(e) = self.send_signaling(&message).await {
                warn!("failed to send end-call: {e}");
            }
        }
        let _ = self.bus.call_ended.send(Arc::new(CallEnded {
            call_id: active.info.call_id.clone(),
            consultation_id: active.info.consultation_id.clone(),
            reason,
        }));
        info!("call {} ended ({:?})", active.info.call_id, reason);
    }

    /// Create the peer connection (idempotent), start its event pump,
    /// acquire the devices, and attach the tracks.
    async fn setup_local_media(
        &self,
        call_id: &CallId,
        media: &Arc<MediaSession>,
    ) -> Result<Arc<dyn PeerConnectionHandle>, MediaError> {
        let (peer, events) = media.ensure_peer().await?;
        if let Some(events) = events {
            let pump = self.spawn_peer_pump(call_id.clone(), media.clone(), events);
            media.set_pump(pump).await;
        }
        let local = media.acquire().await?;
        peer.add_local_tracks(local).await?;
        Ok(peer)
    }

    async fn build_offer(
        &self,
        call_id: &CallId,
        media: &Arc<MediaSession>,
    ) -> Result<SessionDescription, MediaError> {
        let peer = self.setup_local_media(call_id, media).await?;
        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn build_answer(
        &self,
        call_id: &CallId,
        media: &Arc<MediaSession>,
        sdp: SessionDescription,
    ) -> Result<SessionDescription, MediaError> {
        let (peer, events) = media.ensure_peer().await?;
        if let Some(events) = events {
            // The connection should have been created when the user
            // accepted; tolerate the reordering and build it now.
            warn!("offer arrived before the peer connection existed, creating it now");
            let pump = self.spawn_peer_pump(call_id.clone(), media.clone(), events);
            media.set_pump(pump).await;
        }
        peer.set_remote_description(sdp).await?;
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    /// Classify a failed setup step. Acquisition failures roll the
    /// session back to idle for a retry; negotiation failures end the
    /// attempt; a released session means a hang-up won the race.
    async fn fail_setup(&self, call_id: &CallId, error: MediaError) -> CallError {
        match &error {
            MediaError::SessionReleased => {
                debug!("call {} setup aborted: session already released", call_id);
            }
            MediaError::Acquisition(_) => {
                warn!("call {} media acquisition failed: {error}", call_id);
                let mut session = self.session.write().await;
                if let Some(active) = session.as_mut()
                    && active.info.call_id == *call_id
                {
                    active.media.release().await;
                    if let Err(e) = active.info.apply_transition(CallTransition::MediaFailed) {
                        debug!("media-failed transition: {e}");
                    }
                    let _ = self.bus.call_failed.send(Arc::new(CallFailed {
                        call_id: call_id.clone(),
                        consultation_id: self.room().clone(),
                        error: error.to_string(),
                    }));
                }
            }
            _ => {
                warn!("call {} negotiation failed: {error}", call_id);
                let mut session = self.session.write().await;
                if let Some(active) = session.as_mut()
                    && active.info.call_id == *call_id
                    && active.info.phase.is_active()
                {
                    self.terminate_active(active, EndCallReason::NegotiationFailed, true)
                        .await;
                }
            }
        }
        CallError::Media(error)
    }

    fn spawn_peer_pump(
        &self,
        call_id: CallId,
        media: Arc<MediaSession>,
        mut events: mpsc::Receiver<PeerEvent>,
    ) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let bus = self.bus.clone();
        let room = self.room().clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PeerEvent::LocalCandidate(candidate) => {
                        let message = SignalingMessage::IceCandidate {
                            consultation_id: room.clone(),
                            candidate,
                        };
                        match message.to_frame() {
                            Ok(frame) => {
                                if let Err(e) = socket.send_frame(frame).await {
                                    warn!("failed to trickle candidate: {e}");
                                }
                            }
                            Err(e) => warn!("failed to encode candidate: {e}"),
                        }
                    }
                    PeerEvent::RemoteTrack(track) => {
                        media.attach_remote(track.clone()).await;
                        let _ = bus.remote_stream.send(Arc::new(RemoteStreamAttached {
                            call_id: call_id.clone(),
                            stream_id: track.stream_id,
                        }));
                    }
                    PeerEvent::ConnectionStateChanged(state) => {
                        debug!("call {} peer connection state: {state:?}", call_id);
                    }
                }
            }
            debug!("peer event stream for call {} closed", call_id);
        })
    }
}
