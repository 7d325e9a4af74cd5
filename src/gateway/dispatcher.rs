use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::AuthContext;
use crate::config::SessionSettings;
use crate::errors::SessionError;
use crate::session::{LeaveOutcome, RevealOutcome, SessionStore};
use crate::shared_types::{ParticipantId, SessionId};
use crate::timer::RevealTimer;
use crate::wire::inbound::{
    JoinRequest, KickRequest, SendMessageRequest, SetThemeRequest, StartVotingRequest,
    SubmitVoteRequest,
};
use crate::wire::outbound::{RoundReset, UserVoted, VotesRevealed, VotingStarted};
use crate::wire::{AckFrame, ClientCommand, Inbound, JoinAck, ServerEvent};

use super::handle::{GatewayHandle, GatewayMessage};
use super::peers::{Outbound, Outbox, PeerTable};

// -----------------------------------------------------------------------------
// ----- Gateway ---------------------------------------------------------------

/// The only component that talks to connections. Owns the session store and
/// the peer table and turns every inbound message into store operations plus
/// outbound frames.
#[derive(Debug)]
pub struct Gateway {
    store: SessionStore,
    peers: PeerTable,
    settings: SessionSettings,
    mailbox: mpsc::WeakUnboundedSender<GatewayMessage>,
}

// -----------------------------------------------------------------------------
// ----- Gateway: Static -------------------------------------------------------

impl Gateway {
    /// `handle` is only kept weakly, for timers to post back into.
    pub fn new(store: SessionStore, settings: SessionSettings, handle: &GatewayHandle) -> Self {
        Self {
            store,
            peers: PeerTable::new(),
            settings,
            mailbox: handle.downgrade(),
        }
    }

    pub fn spawn(store: SessionStore, settings: SessionSettings) -> (GatewayHandle, JoinHandle<()>) {
        let (handle, inbox) = GatewayHandle::channel();
        let gateway = Gateway::new(store, settings, &handle);
        let task = tokio::spawn(gateway.run(inbox));

        (handle, task)
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Public -------------------------------------------------------

impl Gateway {
    /// Runs until every handle is dropped.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<GatewayMessage>) {
        while let Some(message) = inbox.recv().await {
            self.handle(message);
        }

        info!(
            "gateway stopped ({} sessions, {} connections left)",
            self.store.len(),
            self.peers.len()
        );
    }

    /// Applies one message to completion.
    pub fn handle(&mut self, message: GatewayMessage) {
        match message {
            GatewayMessage::Connected {
                participant,
                serial,
                outbox,
                auth,
            } => self.on_connected(participant, serial, outbox, auth),

            GatewayMessage::Command {
                participant,
                serial,
                inbound,
            } => {
                if !self.peers.is_current(&participant, serial) {
                    debug!("ignoring command from superseded connection of {participant}");
                    return;
                }
                self.on_command(participant, inbound);
            }

            GatewayMessage::Disconnected {
                participant,
                serial,
            } => self.on_disconnected(participant, serial),

            GatewayMessage::RevealTimerElapsed { session, round } => {
                self.on_reveal_timer(session, round)
            }
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Connection lifecycle -----------------------------------------

impl Gateway {
    fn on_connected(
        &mut self,
        participant: ParticipantId,
        serial: u64,
        outbox: Outbox,
        auth: Option<AuthContext>,
    ) {
        if let Some(previous) = self.peers.register(participant.clone(), serial, outbox) {
            debug!("{participant} reconnected; closing the older connection");
            previous.send(Outbound::Close);

            // The old connection's room is inherited only by a credential
            // for the same session.
            if let Some(old_session) = previous.session {
                let inherited = auth.as_ref().is_some_and(|a| a.session == old_session);
                if !inherited {
                    self.depart(&participant, &old_session);
                }
            }
        }

        let Some(auth) = auth else {
            return;
        };

        if !self.store.exists(&auth.session) {
            debug!(
                "credential for {participant} names session {} which is not live",
                auth.session
            );
            return;
        }

        if let Err(e) = self.admit(&participant, &auth.session, &auth.display_name, None, false) {
            warn!("could not attach {participant} to {}: {e}", auth.session);
        }
    }

    fn on_disconnected(&mut self, participant: ParticipantId, serial: u64) {
        let Some(peer) = self.peers.unregister(&participant, serial) else {
            return;
        };

        if let Some(session) = peer.session {
            self.depart(&participant, &session);
        }
    }

    fn on_reveal_timer(&mut self, session: SessionId, round: u64) {
        let current = self.store.get(&session).map(|s| s.round().sequence());
        if current != Some(round) {
            debug!("reveal timer for {session} round {round} is stale");
            return;
        }

        self.reveal_and_broadcast(&session);
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Command routing ----------------------------------------------

impl Gateway {
    fn on_command(&mut self, participant: ParticipantId, inbound: Inbound) {
        let Inbound { ack, command } = inbound;
        let name = command.name();

        let result = match command {
            ClientCommand::JoinSession(req) => self.join_session(&participant, req, ack),
            ClientCommand::StartVoting(req) => self.start_voting(&participant, req),
            ClientCommand::SubmitVote(req) => self.submit_vote(&participant, req),
            ClientCommand::RevealVotes => self.reveal_votes(&participant),
            ClientCommand::ResetRound => self.reset_round(&participant),
            ClientCommand::KickUser(req) => self.kick_user(&participant, req),
            ClientCommand::SendMessage(req) => self.send_message(&participant, req),
            ClientCommand::EndSession => self.end_session_by(&participant),
            ClientCommand::SetTheme(req) => self.set_theme(&participant, req),
        };

        if let Err(e) = result {
            debug!("dropped {name} from {participant}: {e}");
        }
    }

    fn join_session(
        &mut self,
        participant: &ParticipantId,
        req: JoinRequest,
        ack: Option<u64>,
    ) -> Result<(), SessionError> {
        let username = req.username.trim();
        if username.is_empty() || username.chars().count() > self.settings.max_name_len {
            return Err(SessionError::InvalidField("username"));
        }

        if req.wants_create() {
            self.leave_current(participant, None);

            let theme = req
                .theme
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(self.settings.default_theme.as_str())
                .to_string();

            let session = self.store.create_session(username, &theme);
            return self.admit(participant, &session, username, ack, true);
        }

        let raw_id = req.session_id.as_deref().unwrap_or_default();
        let Some(session) = SessionId::parse(raw_id).filter(|id| self.store.exists(id)) else {
            self.send_ack(participant, ack, JoinAck::failed("Session not found"));
            return Ok(());
        };

        self.leave_current(participant, Some(&session));
        self.admit(participant, &session, username, ack, false)
    }

    fn start_voting(
        &mut self,
        participant: &ParticipantId,
        req: StartVotingRequest,
    ) -> Result<(), SessionError> {
        let session = self.context(participant)?;

        let duration = req
            .timer_duration
            .unwrap_or(0)
            .min(self.settings.max_timer.as_secs());

        let round = self.store.start_voting(&session, duration)?;
        let started_at = self
            .store
            .get(&session)
            .and_then(|s| s.round().timer())
            .map(|t| t.started_at);

        self.broadcast(
            &session,
            &ServerEvent::VotingStarted(VotingStarted {
                timer_duration: duration,
                timer_started_at: started_at,
                round_number: round,
                revealed: None,
            }),
        );

        if duration > 0 {
            self.schedule_reveal(&session, round, Duration::from_secs(duration));
        }

        Ok(())
    }

    fn submit_vote(
        &mut self,
        participant: &ParticipantId,
        req: SubmitVoteRequest,
    ) -> Result<(), SessionError> {
        let session = self.context(participant)?;

        self.store
            .submit_vote(&session, participant, &req.vote.into_string())?;

        self.broadcast(
            &session,
            &ServerEvent::UserVoted(UserVoted {
                user_id: participant.clone(),
            }),
        );

        Ok(())
    }

    fn reveal_votes(&mut self, participant: &ParticipantId) -> Result<(), SessionError> {
        let session = self.context(participant)?;
        self.reveal_and_broadcast(&session);
        Ok(())
    }

    fn reset_round(&mut self, participant: &ParticipantId) -> Result<(), SessionError> {
        let session = self.context(participant)?;
        self.store.reset_round(&session)?;

        let round_history = self
            .store
            .get(&session)
            .map(|s| s.history().to_vec())
            .unwrap_or_default();

        self.broadcast(&session, &ServerEvent::RoundReset(RoundReset { round_history }));
        Ok(())
    }

    fn kick_user(
        &mut self,
        participant: &ParticipantId,
        req: KickRequest,
    ) -> Result<(), SessionError> {
        let session = self.context(participant)?;
        self.require_creator(&session, participant, "kick")?;

        let target = req.user_id;
        let state = self
            .store
            .get(&session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;

        if state.is_creator(&target) {
            return Err(SessionError::CannotKickCreator);
        }
        if !state.is_member(&target) {
            return Err(SessionError::NotMember);
        }

        if self.peers.session_of(&target) == Some(&session) {
            self.send_event(&target, &ServerEvent::Kicked);
            self.peers.detach(&target);
            self.peers.send_to(&target, Outbound::Close);
        }

        info!("{target} kicked from session {session} by {participant}");

        if self.store.leave(&session, &target) == LeaveOutcome::Left {
            self.broadcast_roster(&session);
        }

        Ok(())
    }

    fn send_message(
        &mut self,
        participant: &ParticipantId,
        req: SendMessageRequest,
    ) -> Result<(), SessionError> {
        let session = self.context(participant)?;

        if req.message.trim().chars().count() > self.settings.max_message_len {
            return Err(SessionError::InvalidField("message"));
        }

        let message = self
            .store
            .add_chat_message(&session, participant, &req.message)?;

        self.broadcast(&session, &ServerEvent::ChatMessage(message));
        Ok(())
    }

    fn end_session_by(&mut self, participant: &ParticipantId) -> Result<(), SessionError> {
        let session = self.context(participant)?;
        self.require_creator(&session, participant, "end the session")?;

        info!("session {session} ended by its creator");
        self.end_session(&session);
        Ok(())
    }

    fn set_theme(
        &mut self,
        participant: &ParticipantId,
        req: SetThemeRequest,
    ) -> Result<(), SessionError> {
        let session = self.context(participant)?;
        self.require_creator(&session, participant, "change the theme")?;

        let theme = req.theme.trim();
        if theme.is_empty() {
            return Err(SessionError::InvalidField("theme"));
        }

        self.store.set_theme(&session, theme)?;
        self.broadcast(&session, &ServerEvent::ThemeChanged(theme.to_string()));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Session transitions ------------------------------------------

impl Gateway {
    /// Joins `participant` to a live session and sends everything a newcomer
    /// needs. `created` marks the creator's own first join.
    fn admit(
        &mut self,
        participant: &ParticipantId,
        session: &SessionId,
        username: &str,
        ack: Option<u64>,
        created: bool,
    ) -> Result<(), SessionError> {
        let outcome = match self.store.join(session, participant.clone(), username) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.send_ack(participant, ack, JoinAck::failed(e.client_message()));
                return Err(e);
            }
        };

        self.peers.attach(participant, session.clone());

        self.send_ack(
            participant,
            ack,
            JoinAck::joined(session.clone(), participant.clone(), outcome.is_creator),
        );

        let Some(state) = self.store.get(session) else {
            return Err(SessionError::NotFound(session.clone()));
        };

        let theme = ServerEvent::ThemeChanged(state.theme().to_string());
        let snapshot = VotingStarted::snapshot(state).map(ServerEvent::VotingStarted);
        let chat = ServerEvent::ChatHistory(state.chat_messages().to_vec());

        if created {
            self.broadcast(session, &theme);
            self.broadcast_roster(session);
            return Ok(());
        }

        self.send_event(participant, &theme);
        self.broadcast_roster(session);

        if let Some(snapshot) = snapshot {
            self.send_event(participant, &snapshot);
        }
        self.send_event(participant, &chat);

        Ok(())
    }

    /// Disconnect semantics: a departing creator ends the session, anyone else
    /// just leaves it.
    fn depart(&mut self, participant: &ParticipantId, session: &SessionId) {
        let Some(state) = self.store.get(session) else {
            return;
        };

        if state.is_creator(participant) {
            info!("creator {participant} left; ending session {session}");
            self.end_session(session);
            return;
        }

        match self.store.leave(session, participant) {
            LeaveOutcome::Left => self.broadcast_roster(session),
            LeaveOutcome::SessionRemoved => {
                self.peers.detach_all(session);
            }
            LeaveOutcome::NotMember | LeaveOutcome::SessionNotFound => {}
        }
    }

    /// Detaches a connection from its current session before it joins another
    /// one. Re-joining the same session is a rename, not a departure.
    fn leave_current(&mut self, participant: &ParticipantId, next: Option<&SessionId>) {
        let Some(current) = self.peers.session_of(participant).cloned() else {
            return;
        };

        if Some(&current) == next {
            return;
        }

        self.peers.detach(participant);
        self.depart(participant, &current);
    }

    fn end_session(&mut self, session: &SessionId) {
        self.broadcast(session, &ServerEvent::SessionEnded);
        self.peers.detach_all(session);
        self.store.delete(session);
    }

    fn reveal_and_broadcast(&mut self, session: &SessionId) {
        match self.store.reveal_votes(session) {
            Ok(RevealOutcome::Revealed(votes)) => {
                self.broadcast(session, &ServerEvent::VotesRevealed(VotesRevealed { votes }));
            }
            Ok(RevealOutcome::AlreadyRevealed) => {
                debug!("votes in {session} already revealed");
            }
            Ok(RevealOutcome::Inactive) => {
                debug!("reveal in {session} without a running round");
            }
            Err(e) => debug!("reveal skipped: {e}"),
        }
    }

    fn schedule_reveal(&mut self, session: &SessionId, round: u64, after: Duration) {
        let mailbox = self.mailbox.clone();
        let target = session.clone();

        let timer = RevealTimer::schedule(after, move || {
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(GatewayMessage::RevealTimerElapsed {
                    session: target,
                    round,
                });
            }
        });

        if let Some(state) = self.store.get_mut(session) {
            state.round_mut().attach_reveal_timer(timer);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Guards -------------------------------------------------------

impl Gateway {
    fn context(&self, participant: &ParticipantId) -> Result<SessionId, SessionError> {
        let session = self
            .peers
            .session_of(participant)
            .cloned()
            .ok_or(SessionError::NoContext)?;

        if !self.store.exists(&session) {
            return Err(SessionError::NotFound(session));
        }

        Ok(session)
    }

    fn require_creator(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        action: &'static str,
    ) -> Result<(), SessionError> {
        let state = self
            .store
            .get(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;

        if !state.is_creator(participant) {
            return Err(SessionError::NotCreator { action });
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway: Fan-out ------------------------------------------------------

impl Gateway {
    fn broadcast(&self, session: &SessionId, event: &ServerEvent) {
        let Some(text) = encode(event) else {
            return;
        };

        for peer in self.peers.in_session(session) {
            peer.send(Outbound::Text(text.clone()));
        }
    }

    fn broadcast_roster(&self, session: &SessionId) {
        let Some(state) = self.store.get(session) else {
            return;
        };

        self.broadcast(session, &ServerEvent::ParticipantsUpdated(state.roster()));
    }

    fn send_event(&self, participant: &ParticipantId, event: &ServerEvent) {
        if let Some(text) = encode(event) {
            self.peers.send_to(participant, Outbound::Text(text));
        }
    }

    fn send_ack(&self, participant: &ParticipantId, ack: Option<u64>, data: JoinAck) {
        let Some(ack) = ack else {
            return;
        };

        match (AckFrame { ack, data }).encode() {
            Ok(text) => {
                self.peers.send_to(participant, Outbound::Text(text));
            }
            Err(e) => error!("failed to encode ack for {participant}: {e}"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn encode(event: &ServerEvent) -> Option<String> {
    match event.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            error!("failed to encode outbound event: {e}");
            None
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RoundPhase;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    struct Harness {
        gateway: Gateway,
        _handle: GatewayHandle,
        inbox: mpsc::UnboundedReceiver<GatewayMessage>,
        serials: HashMap<ParticipantId, u64>,
        next_serial: u64,
    }

    impl Harness {
        fn new() -> Self {
            let (handle, inbox) = GatewayHandle::channel();
            let gateway = Gateway::new(SessionStore::new(), SessionSettings::default(), &handle);

            Self {
                gateway,
                _handle: handle,
                inbox,
                serials: HashMap::new(),
                next_serial: 1,
            }
        }

        fn connect(&mut self, raw: &str) -> (ParticipantId, mpsc::UnboundedReceiver<Outbound>) {
            let participant = ParticipantId::new(raw);
            let (outbox, rx) = mpsc::unbounded_channel();

            let serial = self.next_serial;
            self.next_serial += 1;
            self.serials.insert(participant.clone(), serial);

            self.gateway.handle(GatewayMessage::Connected {
                participant: participant.clone(),
                serial,
                outbox,
                auth: None,
            });

            (participant, rx)
        }

        fn send(&mut self, participant: &ParticipantId, frame: Value) {
            let inbound = crate::wire::decode(&frame.to_string()).unwrap();
            let serial = self.serials[participant];

            self.gateway.handle(GatewayMessage::Command {
                participant: participant.clone(),
                serial,
                inbound,
            });
        }

        fn disconnect(&mut self, participant: &ParticipantId) {
            let serial = self.serials[participant];
            self.gateway.handle(GatewayMessage::Disconnected {
                participant: participant.clone(),
                serial,
            });
        }

        /// Alice creates a session and Bob joins it. Both outboxes are drained.
        fn alice_and_bob(
            &mut self,
        ) -> (
            SessionId,
            (ParticipantId, mpsc::UnboundedReceiver<Outbound>),
            (ParticipantId, mpsc::UnboundedReceiver<Outbound>),
        ) {
            let (alice, mut alice_rx) = self.connect("alice");
            self.send(
                &alice,
                json!({ "event": "join-session", "data": { "username": "Alice", "create": true }, "ack": 1 }),
            );
            let frames = drain(&mut alice_rx);
            let session = SessionId::parse(frames[0]["data"]["sessionId"].as_str().unwrap()).unwrap();

            let (bob, mut bob_rx) = self.connect("bob");
            self.send(
                &bob,
                json!({ "event": "join-session", "data": { "username": "Bob", "sessionId": session.as_str() }, "ack": 1 }),
            );
            drain(&mut alice_rx);
            drain(&mut bob_rx);

            (session, (alice, alice_rx), (bob, bob_rx))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(match frame {
                Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
                Outbound::Close => json!("close"),
            });
        }
        frames
    }

    fn events(frames: &[Value]) -> Vec<&str> {
        frames
            .iter()
            .map(|f| f["event"].as_str().unwrap_or("-"))
            .collect()
    }

    #[test]
    fn create_then_late_join() {
        let mut h = Harness::new();

        let (alice, mut alice_rx) = h.connect("alice");
        h.send(
            &alice,
            json!({ "event": "join-session", "data": { "username": "Alice", "create": true, "theme": "retro" }, "ack": 7 }),
        );

        let frames = drain(&mut alice_rx);
        assert_eq!(frames[0]["ack"], 7);
        assert_eq!(frames[0]["data"]["success"], true);
        assert_eq!(frames[0]["data"]["isCreator"], true);
        assert_eq!(frames[0]["data"]["userId"], "alice");
        assert_eq!(events(&frames[1..]), ["theme-changed", "participants-updated"]);
        assert_eq!(frames[1]["data"], "retro");

        let session = frames[0]["data"]["sessionId"].as_str().unwrap().to_string();
        assert_eq!(session.len(), 8);

        let (bob, mut bob_rx) = h.connect("bob");
        h.send(
            &bob,
            json!({ "event": "join-session", "data": { "username": "Bob", "sessionId": session.to_lowercase() }, "ack": 1 }),
        );

        let frames = drain(&mut bob_rx);
        assert_eq!(frames[0]["data"]["isCreator"], false);
        assert_eq!(
            events(&frames[1..]),
            ["theme-changed", "participants-updated", "chat-history"]
        );
        assert_eq!(frames[2]["data"].as_array().unwrap().len(), 2);
        assert_eq!(frames[3]["data"], json!([]));

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["participants-updated"]);
        assert_eq!(frames[0]["data"][0]["isCreator"], true);
        assert_eq!(frames[0]["data"][1]["username"], "Bob");
    }

    #[test]
    fn unknown_session_gets_failed_ack() {
        let mut h = Harness::new();
        let (carol, mut rx) = h.connect("carol");

        h.send(
            &carol,
            json!({ "event": "join-session", "data": { "username": "Carol", "sessionId": "00000000" }, "ack": 3 }),
        );
        h.send(
            &carol,
            json!({ "event": "join-session", "data": { "username": "Carol", "sessionId": "not-hex" }, "ack": 4 }),
        );

        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![
                json!({ "ack": 3, "data": { "success": false, "error": "Session not found" } }),
                json!({ "ack": 4, "data": { "success": false, "error": "Session not found" } }),
            ]
        );
        assert!(h.gateway.store().is_empty());
    }

    #[test]
    fn blank_username_is_dropped_without_ack() {
        let mut h = Harness::new();
        let (carol, mut rx) = h.connect("carol");

        h.send(
            &carol,
            json!({ "event": "join-session", "data": { "username": "   ", "create": true }, "ack": 1 }),
        );

        assert!(drain(&mut rx).is_empty());
        assert!(h.gateway.store().is_empty());
    }

    #[test]
    fn vote_then_reveal_once() {
        let mut h = Harness::new();
        let (_, (alice, mut alice_rx), (bob, mut bob_rx)) = h.alice_and_bob();

        h.send(&bob, json!({ "event": "start-voting", "data": {} }));
        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["voting-started"]);
        assert_eq!(frames[0]["data"]["roundNumber"], 1);
        assert_eq!(frames[0]["data"]["timerDuration"], 0);
        drain(&mut bob_rx);

        h.send(&bob, json!({ "event": "submit-vote", "data": { "vote": "5" } }));
        h.send(&alice, json!({ "event": "submit-vote", "data": { "vote": 8 } }));
        h.send(&bob, json!({ "event": "submit-vote", "data": { "vote": "3" } }));

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["user-voted", "user-voted", "user-voted"]);
        assert_eq!(frames[0]["data"], json!({ "userId": "bob" }));
        drain(&mut bob_rx);

        h.send(&alice, json!({ "event": "reveal-votes" }));
        h.send(&bob, json!({ "event": "reveal-votes" }));

        let frames = drain(&mut bob_rx);
        assert_eq!(events(&frames), ["votes-revealed"]);
        assert_eq!(
            frames[0]["data"]["votes"],
            json!([
                { "userId": "bob", "username": "Bob", "vote": "3" },
                { "userId": "alice", "username": "Alice", "vote": "8" },
            ])
        );
        assert_eq!(events(&drain(&mut alice_rx)), ["votes-revealed"]);

        h.send(&bob, json!({ "event": "submit-vote", "data": { "vote": "1" } }));
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn reset_archives_revealed_round() {
        let mut h = Harness::new();
        let (_, (alice, mut alice_rx), (bob, _bob_rx)) = h.alice_and_bob();

        h.send(&alice, json!({ "event": "start-voting" }));
        h.send(&bob, json!({ "event": "submit-vote", "data": { "vote": "2" } }));
        h.send(&alice, json!({ "event": "reveal-votes" }));
        drain(&mut alice_rx);

        h.send(&alice, json!({ "event": "reset-round" }));
        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["round-reset"]);

        let history = frames[0]["data"]["roundHistory"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["roundNumber"], 1);
        assert_eq!(history[0]["votes"][0]["vote"], "2");
    }

    #[test]
    fn creator_disconnect_ends_session() {
        let mut h = Harness::new();
        let (session, (alice, _alice_rx), (_bob, mut bob_rx)) = h.alice_and_bob();

        h.disconnect(&alice);

        assert_eq!(events(&drain(&mut bob_rx)), ["session-ended"]);
        assert!(!h.gateway.store().exists(&session));
    }

    #[test]
    fn member_disconnect_updates_roster() {
        let mut h = Harness::new();
        let (session, (_alice, mut alice_rx), (bob, _bob_rx)) = h.alice_and_bob();

        h.disconnect(&bob);

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["participants-updated"]);
        assert_eq!(frames[0]["data"].as_array().unwrap().len(), 1);
        assert_eq!(h.gateway.store().get(&session).unwrap().participants().len(), 1);
    }

    #[test]
    fn kick_rules() {
        let mut h = Harness::new();
        let (session, (alice, mut alice_rx), (bob, mut bob_rx)) = h.alice_and_bob();

        h.send(&bob, json!({ "event": "kick-user", "data": { "userId": "alice" } }));
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        assert!(h.gateway.store().get(&session).unwrap().is_member(&alice));

        h.send(&alice, json!({ "event": "kick-user", "data": { "userId": "alice" } }));
        assert!(drain(&mut alice_rx).is_empty());

        h.send(&alice, json!({ "event": "kick-user", "data": { "userId": "bob" } }));
        let frames = drain(&mut bob_rx);
        assert_eq!(frames, vec![json!({ "event": "kicked" }), json!("close")]);

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["participants-updated"]);
        assert!(!h.gateway.store().get(&session).unwrap().is_member(&bob));

        // The closed connection's disconnect must not touch the session again.
        h.disconnect(&bob);
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn chat_and_theme() {
        let mut h = Harness::new();
        let (_, (alice, mut alice_rx), (bob, mut bob_rx)) = h.alice_and_bob();

        h.send(&bob, json!({ "event": "send-message", "data": { "message": "  hello  " } }));
        h.send(&bob, json!({ "event": "send-message", "data": { "message": "   " } }));

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["chat-message"]);
        assert_eq!(frames[0]["data"]["message"], "hello");
        assert_eq!(frames[0]["data"]["username"], "Bob");
        drain(&mut bob_rx);

        h.send(&bob, json!({ "event": "set-theme", "data": { "theme": "dark" } }));
        assert!(drain(&mut alice_rx).is_empty());

        h.send(&alice, json!({ "event": "set-theme", "data": { "theme": "dark" } }));
        assert_eq!(
            drain(&mut bob_rx),
            vec![json!({ "event": "theme-changed", "data": "dark" })]
        );
    }

    #[test]
    fn end_session_is_creator_only() {
        let mut h = Harness::new();
        let (session, (alice, mut alice_rx), (bob, mut bob_rx)) = h.alice_and_bob();

        h.send(&bob, json!({ "event": "end-session" }));
        assert!(h.gateway.store().exists(&session));

        h.send(&alice, json!({ "event": "end-session" }));
        assert_eq!(events(&drain(&mut alice_rx)), ["session-ended"]);
        assert_eq!(events(&drain(&mut bob_rx)), ["session-ended"]);
        assert!(h.gateway.store().is_empty());

        // Detached: further commands have no context.
        h.send(&bob, json!({ "event": "start-voting" }));
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[test]
    fn commands_without_session_are_ignored() {
        let mut h = Harness::new();
        let (dave, mut rx) = h.connect("dave");

        h.send(&dave, json!({ "event": "start-voting" }));
        h.send(&dave, json!({ "event": "reveal-votes" }));
        h.send(&dave, json!({ "event": "send-message", "data": { "message": "hi" } }));

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_reveals_once() {
        let mut h = Harness::new();
        let (session, (alice, mut alice_rx), (bob, mut bob_rx)) = h.alice_and_bob();

        h.send(&alice, json!({ "event": "start-voting", "data": { "timerDuration": 30 } }));
        let frames = drain(&mut bob_rx);
        assert_eq!(frames[0]["data"]["timerDuration"], 30);
        assert!(frames[0]["data"]["timerStartedAt"].is_string());
        drain(&mut alice_rx);

        h.send(&bob, json!({ "event": "submit-vote", "data": { "vote": "13" } }));
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let elapsed = h.inbox.recv().await.unwrap();
        assert!(matches!(
            &elapsed,
            GatewayMessage::RevealTimerElapsed { round: 1, .. }
        ));
        h.gateway.handle(elapsed);

        let frames = drain(&mut alice_rx);
        assert_eq!(events(&frames), ["votes-revealed"]);
        assert_eq!(frames[0]["data"]["votes"][0]["vote"], "13");
        drain(&mut bob_rx);

        h.send(&alice, json!({ "event": "reveal-votes" }));
        assert!(drain(&mut alice_rx).is_empty());
        assert!(!h.gateway.store().get(&session).unwrap().round().has_pending_reveal());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reveal_cancels_timer() {
        let mut h = Harness::new();
        let (session, (alice, mut alice_rx), _bob) = h.alice_and_bob();

        h.send(&alice, json!({ "event": "start-voting", "data": { "timerDuration": 5 } }));
        assert!(h.gateway.store().get(&session).unwrap().round().has_pending_reveal());

        h.send(&alice, json!({ "event": "reveal-votes" }));
        assert_eq!(events(&drain(&mut alice_rx)), ["voting-started", "votes-revealed"]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.inbox.try_recv().is_err());

        // A late expiry for an older round is stale either way.
        h.gateway.handle(GatewayMessage::RevealTimerElapsed {
            session: session.clone(),
            round: 0,
        });
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_expiry_after_manual_reveal_is_absorbed() {
        let mut h = Harness::new();
        let (session, (alice, mut alice_rx), (_, mut bob_rx)) = h.alice_and_bob();

        h.send(&alice, json!({ "event": "start-voting", "data": { "timerDuration": 5 } }));
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        h.send(&alice, json!({ "event": "reveal-votes" }));
        assert_eq!(events(&drain(&mut alice_rx)), ["votes-revealed"]);
        assert_eq!(events(&drain(&mut bob_rx)), ["votes-revealed"]);

        // Expiry for the same round, already in the mailbox when the reveal ran.
        h.gateway.handle(GatewayMessage::RevealTimerElapsed {
            session: session.clone(),
            round: 1,
        });
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(
            h.gateway.store().get(&session).unwrap().round().phase(),
            RoundPhase::Revealed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_clamped_to_max() {
        let mut h = Harness::new();
        let (_, (alice, mut alice_rx), _bob) = h.alice_and_bob();

        h.send(&alice, json!({ "event": "start-voting", "data": { "timerDuration": 86400 } }));
        let frames = drain(&mut alice_rx);
        assert_eq!(frames[0]["data"]["timerDuration"], 3600);
    }

    #[test]
    fn superseded_connection_cannot_act() {
        let mut h = Harness::new();
        let (_, (alice, mut alice_rx), (bob, _bob_rx)) = h.alice_and_bob();
        let old_serial = h.serials[&bob];

        let (_, mut new_bob_rx) = h.connect("bob");
        assert!(drain(&mut new_bob_rx).is_empty());

        // The old connection is told to close, and the old room sees Bob go.
        assert_eq!(events(&drain(&mut alice_rx)), ["participants-updated"]);

        h.gateway.handle(GatewayMessage::Command {
            participant: bob.clone(),
            serial: old_serial,
            inbound: crate::wire::decode(r#"{"event":"start-voting"}"#).unwrap(),
        });
        h.send(&alice, json!({ "event": "reveal-votes" }));
        assert!(drain(&mut alice_rx).is_empty());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
