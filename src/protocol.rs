//! Wire shapes for the node socket and REST surface, plus the gateway-side
//! voice payloads the caller feeds in and sends out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filters::Filters;
use crate::track::TrackData;

/// Diagnostic message some nodes attach to the track exception they raise
/// while a track is being replayed internally. The protocol offers no
/// cleaner signal, so the exact string is the contract.
const INTERNAL_REPLAY_MESSAGE: &str = "The track was unexpectedly terminated.";

/// Everything this client can push down a node socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OutgoingPayload {
    #[serde(rename_all = "camelCase")]
    VoiceUpdate {
        guild_id: String,
        /// Raw voice-server-update body from the gateway, passed through.
        event: Value,
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Play {
        guild_id: String,
        track: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        volume: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        no_replace: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pause: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Stop { guild_id: String },
    #[serde(rename_all = "camelCase")]
    Pause { guild_id: String, pause: bool },
    #[serde(rename_all = "camelCase")]
    Seek { guild_id: String, position: u64 },
    #[serde(rename_all = "camelCase")]
    Volume { guild_id: String, volume: u16 },
    #[serde(rename_all = "camelCase")]
    Filters {
        guild_id: String,
        #[serde(flatten)]
        filters: Filters,
    },
    #[serde(rename_all = "camelCase")]
    Destroy { guild_id: String },
    #[serde(rename = "configureResuming")]
    ConfigureResuming { key: String, timeout: u64 },
}

/// Node server statistics, refreshed from the periodic `stats` message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub players: u32,
    pub playing_players: u32,
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
    /// Unix-millis timestamp of when this snapshot was received.
    #[serde(skip)]
    pub last_updated: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// Per-guild playback state pushed by the node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateState {
    #[serde(default)]
    pub time: u64,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub connected: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdatePayload {
    pub guild_id: String,
    pub state: PlayerUpdateState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStartEvent {
    pub guild_id: String,
    pub track: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEndEvent {
    pub guild_id: String,
    pub track: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExceptionEvent {
    pub guild_id: String,
    #[serde(default)]
    pub track: Option<String>,
    pub exception: TrackException,
}

impl TrackExceptionEvent {
    /// Whether this exception is the node's internal replay signal rather
    /// than a genuine playback error. Swallowed without announcement.
    pub fn is_internal_replay(&self) -> bool {
        self.exception.message.as_deref() == Some(INTERNAL_REPLAY_MESSAGE)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackException {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuckEvent {
    pub guild_id: String,
    pub track: String,
    pub threshold_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosedEvent {
    pub guild_id: String,
    pub code: u16,
    pub reason: String,
    pub by_remote: bool,
}

/// The `event` socket messages, discriminated by their `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart(TrackStartEvent),
    #[serde(rename = "TrackEndEvent")]
    TrackEnd(TrackEndEvent),
    #[serde(rename = "TrackExceptionEvent")]
    TrackException(TrackExceptionEvent),
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck(TrackStuckEvent),
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed(WebSocketClosedEvent),
}

impl NodeEvent {
    pub fn guild_id(&self) -> &str {
        match self {
            Self::TrackStart(event) => &event.guild_id,
            Self::TrackEnd(event) => &event.guild_id,
            Self::TrackException(event) => &event.guild_id,
            Self::TrackStuck(event) => &event.guild_id,
            Self::WebSocketClosed(event) => &event.guild_id,
        }
    }
}

/// Outcome tag of a `loadtracks` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTracksResponse {
    pub load_type: LoadType,
    #[serde(default)]
    pub tracks: Vec<TrackData>,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub exception: Option<LoadException>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    /// Index of the selected track, -1 when nothing was selected.
    #[serde(default = "no_selected_track")]
    pub selected_track: i64,
}

fn no_selected_track() -> i64 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadException {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// One advertised node capability, as listed by `GET /plugins`.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginRaw {
    pub name: String,
    pub version: String,
}

/// Gateway voice-state update body, as forwarded by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceStateUpdate {
    pub guild_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user_id: String,
    pub session_id: String,
}

/// The two gateway events the caller must forward into the client. Only
/// state updates for the client user itself are meaningful.
#[derive(Debug, Clone)]
pub enum VoiceUpdate {
    /// A voice-server update; the raw body is passed through to the node.
    Server { guild_id: String, event: Value },
    /// A voice-state update for some user.
    State(VoiceStateUpdate),
}

impl VoiceUpdate {
    pub fn guild_id(&self) -> &str {
        match self {
            Self::Server { guild_id, .. } => guild_id,
            Self::State(state) => &state.guild_id,
        }
    }
}

/// Voice-state payload the caller must forward to its own gateway to make
/// the platform join or leave a voice channel.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceStatePayload {
    pub op: u8,
    pub d: VoiceStateBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceStateBody {
    pub guild_id: String,
    pub channel_id: Option<String>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

impl VoiceStatePayload {
    pub fn join(guild_id: &str, channel_id: &str, self_mute: bool, self_deaf: bool) -> Self {
        Self {
            op: 4,
            d: VoiceStateBody {
                guild_id: guild_id.to_string(),
                channel_id: Some(channel_id.to_string()),
                self_mute,
                self_deaf,
            },
        }
    }

    pub fn leave(guild_id: &str) -> Self {
        Self {
            op: 4,
            d: VoiceStateBody {
                guild_id: guild_id.to_string(),
                channel_id: None,
                self_mute: false,
                self_deaf: false,
            },
        }
    }
}

/// Accumulator for the four voice handshake fields. The two gateway events
/// feeding it arrive in no guaranteed order, so it tolerates partial state
/// indefinitely; only a complete payload may ever reach a node.
#[derive(Debug, Clone, Default)]
pub struct VoiceHandshake {
    /// Operation marker, set once the first voice-server update lands.
    pub(crate) marker: bool,
    pub(crate) guild_id: Option<String>,
    /// Raw voice-server-update body.
    pub(crate) event: Option<Value>,
    pub(crate) session_id: Option<String>,
}

impl VoiceHandshake {
    /// All four of {op, guildId, event, sessionId} are present.
    pub fn is_complete(&self) -> bool {
        self.marker && self.guild_id.is_some() && self.event.is_some() && self.session_id.is_some()
    }

    pub(crate) fn as_payload(&self) -> Option<OutgoingPayload> {
        if !self.is_complete() {
            return None;
        }
        Some(OutgoingPayload::VoiceUpdate {
            guild_id: self.guild_id.clone()?,
            event: self.event.clone()?,
            session_id: self.session_id.clone()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn outgoing_payloads_carry_their_op() {
        let payload = OutgoingPayload::Play {
            guild_id: "123".into(),
            track: "QAAA...".into(),
            start_time: None,
            end_time: Some(30_000),
            volume: None,
            no_replace: None,
            pause: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["op"], "play");
        assert_eq!(value["guildId"], "123");
        assert_eq!(value["endTime"], 30_000);
        assert!(value.get("startTime").is_none());

        let resume = OutgoingPayload::ConfigureResuming {
            key: "resume-key".into(),
            timeout: 60,
        };
        let value = serde_json::to_value(&resume).unwrap();
        assert_eq!(value["op"], "configureResuming");
    }

    #[test]
    fn node_events_deserialize_by_type() {
        let raw = json!({
            "op": "event",
            "type": "TrackEndEvent",
            "guildId": "42",
            "track": "abc",
            "reason": "FINISHED",
        });
        match serde_json::from_value::<NodeEvent>(raw).unwrap() {
            NodeEvent::TrackEnd(event) => {
                assert_eq!(event.guild_id, "42");
                assert_eq!(event.reason, "FINISHED");
            }
            other => panic!("wrong event: {other:?}"),
        }

        let unknown = json!({ "type": "SomethingNew", "guildId": "42" });
        assert!(serde_json::from_value::<NodeEvent>(unknown).is_err());
    }

    #[test]
    fn handshake_gating_requires_all_four_fields() {
        let mut voice = VoiceHandshake::default();
        assert!(voice.as_payload().is_none());

        voice.marker = true;
        voice.guild_id = Some("7".into());
        voice.event = Some(json!({ "endpoint": "voice.example", "token": "t" }));
        assert!(!voice.is_complete());
        assert!(voice.as_payload().is_none());

        voice.session_id = Some("session".into());
        assert!(voice.is_complete());
        let payload = voice.as_payload().unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["op"], "voiceUpdate");
        assert_eq!(value["sessionId"], "session");
    }
}
