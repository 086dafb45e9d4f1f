//! Domain events published by the manager.
//!
//! A single broadcast bus carries everything; `subscribe()` hands out an
//! independent receiver and dropping it unsubscribes. Payloads are cheap to
//! clone: components travel as `Arc`s and errors as `Arc<Error>`.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::Error;
use crate::node::Node;
use crate::player::Player;
use crate::protocol::{
    TrackEndEvent, TrackExceptionEvent, TrackStartEvent, TrackStuckEvent, WebSocketClosedEvent,
};
use crate::track::QueueItem;

/// Close code and reason of a dropped node socket.
#[derive(Debug, Clone)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// Why a track-error event fired.
#[derive(Debug, Clone)]
pub enum TrackErrorKind {
    /// The node raised a playback exception.
    Exception(TrackExceptionEvent),
    /// An unresolved track could not be matched to a playable one.
    Resolution(Arc<Error>),
}

#[derive(Debug, Clone)]
pub enum LavaEvent {
    NodeCreate(Arc<Node>),
    NodeDestroy(Arc<Node>),
    NodeConnect(Arc<Node>),
    NodeReconnect(Arc<Node>),
    NodeDisconnect {
        node: Arc<Node>,
        reason: CloseReason,
    },
    NodeError {
        node: Arc<Node>,
        error: Arc<Error>,
    },
    /// A node connected but lacks some of the required capabilities.
    NodeMissingPlugins {
        node: Arc<Node>,
        missing: Vec<String>,
    },
    PlayerCreate(Arc<Player>),
    PlayerDestroy(Arc<Player>),
    /// The player is replaying its current track after moving node.
    PlayerReplay(Arc<Player>),
    /// Replaying on another node failed; the player is stranded.
    ReplayError {
        player: Arc<Player>,
        error: Arc<Error>,
    },
    /// The player was moved between voice channels (or out of one).
    PlayerMove {
        player: Arc<Player>,
        old_channel: Option<String>,
        new_channel: Option<String>,
    },
    /// First track of a fresh queue started.
    QueueStart {
        player: Arc<Player>,
        track: QueueItem,
    },
    /// The queue ran dry with no loop mode to refill it.
    QueueEnd {
        player: Arc<Player>,
        track: QueueItem,
    },
    TrackStart {
        player: Arc<Player>,
        track: QueueItem,
        payload: TrackStartEvent,
    },
    TrackEnd {
        player: Arc<Player>,
        track: QueueItem,
        payload: TrackEndEvent,
    },
    TrackStuck {
        player: Arc<Player>,
        track: QueueItem,
        payload: TrackStuckEvent,
    },
    TrackError {
        player: Arc<Player>,
        track: Option<QueueItem>,
        kind: TrackErrorKind,
    },
    /// The node-side voice websocket for a guild closed.
    SocketClosed {
        player: Arc<Player>,
        payload: WebSocketClosedEvent,
    },
}

/// Broadcast bus the manager publishes on.
#[derive(Debug)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<LavaEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LavaEvent> {
        self.sender.subscribe()
    }

    /// Publish, dropping the event when nobody is listening.
    pub(crate) fn emit(&self, event: LavaEvent) {
        let _ = self.sender.send(event);
    }
}
