//! Viewer connection lifecycle: connect, log in, then follow broadcasts.

use crate::network::{Connector, Transport};
use crate::rendering::RenderAdapter;
use crate::sequencer::PresentationSequencer;
use log::{debug, info, warn};
use shared::{Broadcast, LoginFailed, LoginSuccess, Message, Snapshot};
use std::io;
use uuid::Uuid;

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    WaitingForConnection,
    ConnectionPending,
    Viewing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Done,
}

impl TickOutcome {
    pub fn is_done(self) -> bool {
        self == TickOutcome::Done
    }
}

/// Session state together with the transport owned by the connected states.
enum Phase<T> {
    WaitingForConnection,
    ConnectionPending(T),
    Viewing(T),
    Closed,
}

pub struct Session<C: Connector> {
    phase: Phase<C::Transport>,
    connector: C,
    name: String,
    secret: Option<Uuid>,
    snapshot: Option<Snapshot>,
    active_player: Option<String>,
    broadcasts_received: u64,
    sequencer: PresentationSequencer,
}

impl<C: Connector> Session<C> {
    pub fn new(
        connector: C,
        name: impl Into<String>,
        secret: Option<Uuid>,
        sequencer: PresentationSequencer,
    ) -> Self {
        Self {
            phase: Phase::WaitingForConnection,
            connector,
            name: name.into(),
            secret,
            snapshot: None,
            active_player: None,
            broadcasts_received: 0,
            sequencer,
        }
    }

    pub fn state(&self) -> ViewerState {
        match self.phase {
            Phase::WaitingForConnection => ViewerState::WaitingForConnection,
            Phase::ConnectionPending(_) => ViewerState::ConnectionPending,
            Phase::Viewing(_) => ViewerState::Viewing,
            Phase::Closed => ViewerState::Closed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Secret to log in with; replaced by the one the server hands back.
    pub fn secret(&self) -> Option<Uuid> {
        self.secret
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn active_player(&self) -> Option<&str> {
        self.active_player.as_deref()
    }

    pub fn broadcasts_received(&self) -> u64 {
        self.broadcasts_received
    }

    pub fn sequencer(&self) -> &PresentationSequencer {
        &self.sequencer
    }

    /// Runs one step of the state machine, then fires any presentation
    /// triggers due at `now` (seconds on the presentation clock).
    ///
    /// Returns `Done` once the session is closed. Ticking a closed session
    /// is still allowed and keeps firing triggers that were already
    /// scheduled.
    pub fn tick<R: RenderAdapter + ?Sized>(&mut self, now: f64, render: &mut R) -> TickOutcome {
        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        self.phase = match phase {
            Phase::WaitingForConnection => self.connect(),
            Phase::ConnectionPending(mut transport) => {
                transport.poll();
                match transport.pop_incoming() {
                    Some(message) => self.on_login_reply(transport, message),
                    None => Phase::ConnectionPending(transport),
                }
            }
            Phase::Viewing(mut transport) => {
                transport.poll();
                match transport.pop_incoming() {
                    Some(message) => self.on_viewing_message(transport, message, now, render),
                    None => Phase::Viewing(transport),
                }
            }
            Phase::Closed => Phase::Closed,
        };

        self.drain_due(now, render);
        match self.phase {
            Phase::Closed => TickOutcome::Done,
            _ => TickOutcome::Continue,
        }
    }

    /// Fires the presentation triggers due at `now`. Triggers scheduled
    /// before the connection closed still fire, so the last shot is shown in
    /// full. Returns how many fired.
    pub fn drain_due<R: RenderAdapter + ?Sized>(&mut self, now: f64, render: &mut R) -> usize {
        let due = self.sequencer.due(now);
        for trigger in &due {
            trigger.apply(render);
        }
        due.len()
    }

    fn connect(&mut self) -> Phase<C::Transport> {
        match self.connector.try_connect() {
            Ok(mut transport) => {
                info!("Connected, logging in as {}", self.name);
                transport.push_outgoing(&Message::viewer_login(self.name.clone(), self.secret));
                Phase::ConnectionPending(transport)
            }
            Err(e) => {
                if is_retryable(&e) {
                    debug!("Server not reachable yet: {}", e);
                } else {
                    warn!("Connection attempt failed: {}", e);
                }
                Phase::WaitingForConnection
            }
        }
    }

    fn on_login_reply(
        &mut self,
        transport: C::Transport,
        message: Message,
    ) -> Phase<C::Transport> {
        match message {
            Message::ConnectionClosed => {
                info!("Server disconnected!");
                close(transport)
            }
            Message::LoginSuccess(LoginSuccess { secret }) => {
                info!("Connected! Secret: {}", secret);
                self.secret = Some(secret);
                Phase::Viewing(transport)
            }
            Message::LoginFailed(LoginFailed { reason }) => {
                warn!("Failed to connect! {}", reason);
                close(transport)
            }
            unexpected @ (Message::Login(_) | Message::Broadcast(_)) => {
                warn!("Unexpected {:?} message while logging in", unexpected.code());
                Phase::ConnectionPending(transport)
            }
        }
    }

    fn on_viewing_message<R: RenderAdapter + ?Sized>(
        &mut self,
        transport: C::Transport,
        message: Message,
        now: f64,
        render: &mut R,
    ) -> Phase<C::Transport> {
        match message {
            Message::ConnectionClosed => {
                info!("Server disconnected!");
                close(transport)
            }
            Message::Broadcast(broadcast) => {
                self.adopt(broadcast, now, render);
                Phase::Viewing(transport)
            }
            unexpected @ (Message::Login(_)
            | Message::LoginSuccess(_)
            | Message::LoginFailed(_)) => {
                warn!("Unexpected {:?} message while viewing", unexpected.code());
                Phase::Viewing(transport)
            }
        }
    }

    fn adopt<R: RenderAdapter + ?Sized>(&mut self, broadcast: Broadcast, now: f64, render: &mut R) {
        let Broadcast {
            snapshot,
            shot_info,
            scores,
        } = broadcast;
        let clock = snapshot.time();

        self.snapshot = None;
        render.replace_snapshot(&snapshot);
        self.snapshot = Some(snapshot);

        render.set_active_player(&shot_info.player);
        self.active_player = Some(shot_info.player.clone());
        self.broadcasts_received += 1;

        debug!(
            "Broadcast {} adopted at t = {:.2}, {} to play",
            self.broadcasts_received, clock, shot_info.player
        );
        self.sequencer.schedule(clock, &shot_info, scores, now);
    }
}

fn close<T: Transport>(mut transport: T) -> Phase<T> {
    transport.close();
    Phase::Closed
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
    )
}
