//! Per-guild playback session: queue ownership, playback and voice state
//! machines, and the replay protocol used when the player changes node.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::config::{PlayOptions, PlayerOptions, SearchQuery};
use crate::error::{Error, Result};
use crate::events::{LavaEvent, TrackErrorKind};
use crate::filters::Filters;
use crate::manager::LavaInner;
use crate::node::Node;
use crate::protocol::{
    LoadType, OutgoingPayload, PlayerUpdateState, VoiceHandshake, VoiceStatePayload,
};
use crate::queue::Queue;
use crate::track::{QueueItem, Track};

/// Queue advancement behavior when a track finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play through the queue once.
    #[default]
    None,
    /// Repeat the current track forever.
    Track,
    /// Re-append each finished track to the tail.
    Queue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    Playing,
    #[default]
    Paused,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerVoiceState {
    Connecting,
    Connected,
    Disconnecting,
    #[default]
    Disconnected,
}

pub struct Player {
    guild_id: String,
    lava: Weak<LavaInner>,
    queue: Mutex<Queue>,
    node_name: RwLock<Option<String>>,
    voice_channel: RwLock<Option<String>>,
    self_mute: bool,
    self_deaf: bool,
    required_plugins: Vec<String>,
    volume: AtomicU16,
    position: AtomicU64,
    last_updated: AtomicU64,
    voice_connected: AtomicBool,
    replaying: AtomicBool,
    need_resume: AtomicBool,
    filters: Mutex<Filters>,
    loop_mode: RwLock<LoopMode>,
    state: RwLock<PlayerState>,
    voice_state: RwLock<PlayerVoiceState>,
    voice: Mutex<VoiceHandshake>,
    play_options: Mutex<Option<PlayOptions>>,
    metadata: Mutex<HashMap<String, Value>>,
}

impl Player {
    pub(crate) fn new(lava: Weak<LavaInner>, options: PlayerOptions, queue: Queue) -> Self {
        Self {
            guild_id: options.guild_id,
            lava,
            queue: Mutex::new(queue),
            node_name: RwLock::new(options.node),
            voice_channel: RwLock::new(options.voice_channel),
            self_mute: options.self_mute,
            self_deaf: options.self_deaf,
            required_plugins: options.required_plugins,
            volume: AtomicU16::new(options.volume.clamp(0, 1000) as u16),
            position: AtomicU64::new(0),
            last_updated: AtomicU64::new(0),
            voice_connected: AtomicBool::new(false),
            replaying: AtomicBool::new(false),
            need_resume: AtomicBool::new(false),
            filters: Mutex::new(Filters::default()),
            loop_mode: RwLock::new(LoopMode::default()),
            state: RwLock::new(PlayerState::default()),
            voice_state: RwLock::new(PlayerVoiceState::default()),
            voice: Mutex::new(VoiceHandshake::default()),
            play_options: Mutex::new(None),
            metadata: Mutex::new(options.metadata),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// Lock the queue for direct manipulation. Keep the guard short-lived.
    pub fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock()
    }

    pub fn node_name(&self) -> Option<String> {
        self.node_name.read().clone()
    }

    pub fn voice_channel(&self) -> Option<String> {
        self.voice_channel.read().clone()
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    pub fn voice_state(&self) -> PlayerVoiceState {
        *self.voice_state.read()
    }

    pub fn loop_mode(&self) -> LoopMode {
        *self.loop_mode.read()
    }

    pub fn set_loop(&self, mode: LoopMode) {
        *self.loop_mode.write() = mode;
    }

    pub fn volume(&self) -> u16 {
        self.volume.load(Ordering::SeqCst)
    }

    /// Last position reported by the node, in milliseconds.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::SeqCst)
    }

    /// Unix-millis timestamp of the last player update.
    pub fn last_updated(&self) -> u64 {
        self.last_updated.load(Ordering::SeqCst)
    }

    /// Whether the node reports the voice connection as up.
    pub fn is_voice_connected(&self) -> bool {
        self.voice_connected.load(Ordering::SeqCst)
    }

    pub fn filters(&self) -> Filters {
        self.filters.lock().clone()
    }

    /// Options of the most recent play command.
    pub fn play_options(&self) -> Option<PlayOptions> {
        *self.play_options.lock()
    }

    pub fn required_plugins(&self) -> &[String] {
        &self.required_plugins
    }

    /// Attach a free-form value to the player.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.metadata.lock().insert(key.into(), value);
    }

    /// Fetch a previously attached value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.metadata.lock().get(key).cloned()
    }

    fn lava(&self) -> Result<Arc<LavaInner>> {
        self.lava
            .upgrade()
            .ok_or_else(|| Error::Validation("client was dropped".into()))
    }

    /// The node this player is bound to, if it is connected.
    pub fn node(&self) -> Result<Arc<Node>> {
        let inner = self.lava()?;
        let name = self.node_name.read().clone().ok_or(Error::NoNodeAvailable)?;
        let node = inner
            .nodes
            .get(&name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::NoNodeAvailable)?;
        if !node.is_connected() {
            return Err(Error::NoNodeAvailable);
        }
        Ok(node)
    }

    /// Move the player to another node, replaying voice and the current
    /// track there. No-op when already bound to that node.
    pub async fn set_node(self: &Arc<Self>, name: &str) -> Result<()> {
        if self.node_name.read().as_deref() == Some(name) {
            return Ok(());
        }

        // Best-effort destroy at the old node; it may already be gone.
        if let Ok(old) = self.node() {
            let _ = old.send(&OutgoingPayload::Destroy {
                guild_id: self.guild_id.clone(),
            });
        }

        *self.node_name.write() = Some(name.to_owned());

        let voice_payload = self.voice.lock().as_payload();
        if let Some(payload) = voice_payload {
            self.node()?.send(&payload)?;
        }

        let has_current = self.queue.lock().current.is_some();
        if has_current {
            let encoded = self.resolve_current().await?;
            let options = self.play_options().unwrap_or_default();
            let payload = OutgoingPayload::Play {
                guild_id: self.guild_id.clone(),
                track: encoded,
                start_time: Some(self.position()),
                end_time: options.end_time,
                volume: None,
                no_replace: None,
                pause: None,
            };
            if let Ok(inner) = self.lava() {
                inner.emit(LavaEvent::PlayerReplay(Arc::clone(self)));
            }
            self.node()?.send(&payload)?;
            self.replaying.store(true, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Ask the host platform to join the configured voice channel.
    pub async fn connect(&self) -> Result<()> {
        let channel = self
            .voice_channel()
            .ok_or_else(|| Error::Validation("no voice channel has been set".into()))?;
        let inner = self.lava()?;

        *self.voice_state.write() = PlayerVoiceState::Connecting;
        inner
            .options
            .send
            .send_voice(
                &self.guild_id,
                VoiceStatePayload::join(&self.guild_id, &channel, self.self_mute, self.self_deaf),
            )
            .await;
        *self.voice_state.write() = PlayerVoiceState::Connected;
        self.need_resume.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Leave voice. No-op unless currently connected.
    pub async fn disconnect(&self) -> Result<()> {
        if self.voice_state() != PlayerVoiceState::Connected {
            return Ok(());
        }
        let inner = self.lava()?;

        *self.voice_state.write() = PlayerVoiceState::Disconnecting;
        let _ = self.pause(true);
        inner
            .options
            .send
            .send_voice(&self.guild_id, VoiceStatePayload::leave(&self.guild_id))
            .await;
        *self.voice_state.write() = PlayerVoiceState::Disconnected;
        Ok(())
    }

    /// Advance the queue per the loop mode and play the resulting current
    /// track. A track that fails to resolve is reported as a track error,
    /// the advancement is rolled back and the next entry is tried.
    pub async fn play(self: &Arc<Self>, options: PlayOptions) -> Result<()> {
        *self.play_options.lock() = Some(options);

        loop {
            let loop_mode = self.loop_mode();
            let prev_of_previous;
            let advanced = {
                let mut queue = self.queue.lock();
                prev_of_previous = queue.previous.clone();
                if loop_mode == LoopMode::Track
                    || (loop_mode == LoopMode::Queue && queue.is_empty())
                {
                    queue.previous = queue.current.clone();
                } else {
                    queue.progress();
                    if loop_mode == LoopMode::Queue {
                        if let Some(previous) = queue.previous.clone() {
                            queue.add(previous);
                        }
                    }
                }
                queue.current.is_some()
            };
            if !advanced {
                return Ok(());
            }

            match self.resolve_current().await {
                Ok(encoded) => {
                    let payload = OutgoingPayload::Play {
                        guild_id: self.guild_id.clone(),
                        track: encoded,
                        start_time: options.start_time,
                        end_time: options.end_time,
                        volume: None,
                        no_replace: None,
                        pause: None,
                    };
                    self.node()?.send(&payload)?;
                    return Ok(());
                }
                Err(err) => {
                    debug!(
                        "track resolution failed for guild {}: {err}",
                        self.guild_id
                    );
                    let failed = self.queue.lock().current.clone();
                    if let Ok(inner) = self.lava() {
                        inner.emit(LavaEvent::TrackError {
                            player: Arc::clone(self),
                            track: failed,
                            kind: TrackErrorKind::Resolution(Arc::new(err)),
                        });
                    }
                    let retry = {
                        let mut queue = self.queue.lock();
                        queue.current = queue.previous.clone();
                        queue.previous = prev_of_previous;
                        !queue.is_empty()
                    };
                    if !retry {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Re-send the stored filter settings. Deferred unless a track is
    /// currently loaded.
    pub fn patch_filters(&self) -> Result<bool> {
        if self.queue.lock().current.is_none() {
            return Ok(false);
        }
        let payload = OutgoingPayload::Filters {
            guild_id: self.guild_id.clone(),
            filters: self.filters(),
        };
        self.node()?.send(&payload)
    }

    /// Replace the stored filter settings without sending them.
    pub fn set_filters(&self, filters: Filters) {
        *self.filters.lock() = filters;
    }

    /// Clamp to 0..=1000, persist, then send.
    pub fn set_volume(&self, volume: i32) -> Result<bool> {
        let volume = volume.clamp(0, 1000) as u16;
        self.volume.store(volume, Ordering::SeqCst);
        let payload = OutgoingPayload::Volume {
            guild_id: self.guild_id.clone(),
            volume,
        };
        self.node()?.send(&payload)
    }

    /// Seek within the current track, clamped to its duration. No-op when
    /// nothing is playing.
    pub fn seek(&self, position: u64) -> Result<bool> {
        let duration = {
            let queue = self.queue.lock();
            match queue.current.as_ref() {
                Some(current) => current.duration(),
                None => return Ok(false),
            }
        };
        let position = duration.map_or(position, |duration| position.min(duration));
        self.position.store(position, Ordering::SeqCst);
        let payload = OutgoingPayload::Seek {
            guild_id: self.guild_id.clone(),
            position,
        };
        self.node()?.send(&payload)
    }

    /// Pause or unpause. No-op when already paused or the queue holds
    /// nothing at all.
    pub fn pause(&self, pause: bool) -> Result<bool> {
        {
            let state = self.state.read();
            if pause && *state == PlayerState::Paused {
                return Ok(false);
            }
        }
        if self.queue.lock().total_size() == 0 {
            return Ok(false);
        }
        *self.state.write() = if pause {
            PlayerState::Paused
        } else {
            PlayerState::Playing
        };
        let payload = OutgoingPayload::Pause {
            guild_id: self.guild_id.clone(),
            pause,
        };
        self.node()?.send(&payload)
    }

    /// Stop the current track. `amount` skips ahead: 5 makes the fifth
    /// pending track play next.
    pub fn stop(&self, amount: Option<usize>) -> Result<bool> {
        if let Some(amount) = amount {
            if amount > 1 {
                let mut queue = self.queue.lock();
                if amount > queue.len() {
                    return Err(Error::Validation(
                        "cannot skip more than the queue length".into(),
                    ));
                }
                queue.remove(0, Some(amount - 1))?;
            }
        }
        let payload = OutgoingPayload::Stop {
            guild_id: self.guild_id.clone(),
        };
        self.node()?.send(&payload)
    }

    /// Tear the player down: leave voice, destroy node-side state and
    /// deregister. Idempotent.
    pub async fn destroy(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state == PlayerState::Destroyed {
                return Ok(());
            }
            *state = PlayerState::Destroyed;
        }

        let _ = self.disconnect().await;
        if let Ok(node) = self.node() {
            let _ = node.send(&OutgoingPayload::Destroy {
                guild_id: self.guild_id.clone(),
            });
        }

        if let Ok(inner) = self.lava() {
            inner.players.remove(&self.guild_id);
            inner.emit(LavaEvent::PlayerDestroy(Arc::clone(self)));
        }
        Ok(())
    }

    /// Resolve the current queue entry to a playable track, replacing an
    /// unresolved placeholder in place. Returns the wire identifier.
    async fn resolve_current(&self) -> Result<String> {
        let item = self
            .queue
            .lock()
            .current
            .clone()
            .ok_or_else(|| Error::Resolution("no current track".into()))?;

        let unresolved = match item {
            QueueItem::Track(track) => return Ok(track.encoded),
            QueueItem::Unresolved(unresolved) => unresolved,
        };

        let inner = self.lava()?;
        let text = match unresolved.author.as_deref() {
            Some(author) => format!("{author} - {}", unresolved.title),
            None => unresolved.title.clone(),
        };
        let result = inner
            .search(SearchQuery::new(text)?, unresolved.requester.clone())
            .await?;

        if result.load_type != LoadType::SearchResult {
            let message = result
                .error
                .and_then(|exception| exception.message)
                .unwrap_or_else(|| "No tracks found.".into());
            return Err(Error::Resolution(message));
        }

        let track = pick_resolution(
            result.tracks,
            unresolved.author.as_deref(),
            unresolved.duration,
        )
        .ok_or_else(|| Error::Resolution("No tracks found.".into()))?;

        let encoded = track.encoded.clone();
        self.queue.lock().current = Some(QueueItem::Track(track));
        Ok(encoded)
    }

    pub(crate) fn apply_update(&self, state: PlayerUpdateState) {
        self.last_updated.store(state.time, Ordering::SeqCst);
        self.position.store(state.position, Ordering::SeqCst);
        self.voice_connected.store(state.connected, Ordering::SeqCst);
    }

    pub(crate) fn set_state(&self, state: PlayerState) {
        *self.state.write() = state;
    }

    pub(crate) fn set_voice_state(&self, state: PlayerVoiceState) {
        *self.voice_state.write() = state;
    }

    pub(crate) fn set_voice_channel(&self, channel: Option<String>) {
        *self.voice_channel.write() = channel;
    }

    pub(crate) fn clear_node_name(&self) {
        *self.node_name.write() = None;
    }

    /// Consume the replay flag set by `set_node`; suppresses exactly one
    /// track-start announcement.
    pub(crate) fn take_replaying(&self) -> bool {
        self.replaying.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn set_need_resume(&self, value: bool) {
        self.need_resume.store(value, Ordering::SeqCst);
    }

    pub fn needs_resume(&self) -> bool {
        self.need_resume.load(Ordering::SeqCst)
    }

    pub(crate) fn merge_voice_server(&self, guild_id: &str, event: Value) {
        let mut voice = self.voice.lock();
        voice.marker = true;
        voice.guild_id = Some(guild_id.to_owned());
        voice.event = Some(event);
    }

    pub(crate) fn merge_voice_session(&self, session_id: &str) {
        self.voice.lock().session_id = Some(session_id.to_owned());
    }

    /// Ship the voice handshake to the node, but only once all four fields
    /// have arrived.
    pub(crate) fn try_send_voice(&self) -> Result<bool> {
        let payload = self.voice.lock().as_payload();
        match payload {
            Some(payload) => self.node()?.send(&payload),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("node", &self.node_name())
            .field("state", &self.state())
            .field("voice_state", &self.voice_state())
            .field("loop_mode", &self.loop_mode())
            .finish_non_exhaustive()
    }
}

/// Pick the resolved candidate for an unresolved track: a track by the
/// declared author (or their auto-generated "<author> - Topic" channel)
/// wins, then anything within 1.5 s of the declared duration, then the
/// first result.
pub(crate) fn pick_resolution(
    mut tracks: Vec<Track>,
    author: Option<&str>,
    duration: Option<u64>,
) -> Option<Track> {
    if tracks.is_empty() {
        return None;
    }

    if let Some(author) = author {
        let channels = [author.to_owned(), format!("{author} - Topic")];
        if let Some(index) = tracks.iter().position(|track| {
            channels
                .iter()
                .any(|name| *name == track.info.author || *name == track.info.title)
        }) {
            return Some(tracks.swap_remove(index));
        }
    }

    if let Some(duration) = duration {
        let low = duration.saturating_sub(1500);
        let high = duration + 1500;
        if let Some(index) = tracks
            .iter()
            .position(|track| track.info.length >= low && track.info.length <= high)
        {
            return Some(tracks.swap_remove(index));
        }
    }

    Some(tracks.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::test_lava;
    use crate::track::{TrackInfo, UnresolvedTrack};
    use pretty_assertions::assert_eq;

    fn resolved(title: &str, author: &str, length: u64) -> Track {
        Track {
            encoded: format!("encoded-{title}"),
            info: TrackInfo {
                title: title.into(),
                author: author.into(),
                length,
                identifier: title.into(),
                is_stream: false,
                is_seekable: true,
                uri: None,
                source_name: "youtube".into(),
            },
            requester: None,
        }
    }

    #[tokio::test]
    async fn volume_is_clamped_before_sending() {
        let lava = test_lava();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();

        let _ = player.set_volume(-5);
        assert_eq!(player.volume(), 0);
        let _ = player.set_volume(5000);
        assert_eq!(player.volume(), 1000);
        let _ = player.set_volume(150);
        assert_eq!(player.volume(), 150);
    }

    #[tokio::test]
    async fn queue_loop_cycles_back_to_the_first_track() {
        let lava = test_lava();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        player.set_loop(LoopMode::Queue);
        {
            let mut queue = player.queue();
            queue.add(resolved("x", "a", 1000));
            queue.add(resolved("y", "a", 1000));
        }

        // No node is registered, so the send step fails, but queue
        // advancement has already happened by then.
        for _ in 0..3 {
            let _ = player.play(PlayOptions::default()).await;
        }
        let queue = player.queue();
        assert_eq!(queue.current.as_ref().map(|t| t.title()), Some("x"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(0).map(|t| t.title()), Some("y"));
    }

    #[tokio::test]
    async fn track_loop_keeps_replaying_the_current_track() {
        let lava = test_lava();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        player.queue().add(resolved("x", "a", 1000));
        let _ = player.play(PlayOptions::default()).await;
        player.set_loop(LoopMode::Track);

        for _ in 0..2 {
            let _ = player.play(PlayOptions::default()).await;
        }
        let queue = player.queue();
        assert_eq!(queue.current.as_ref().map(|t| t.title()), Some("x"));
        assert_eq!(queue.previous.as_ref().map(|t| t.title()), Some("x"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pause_is_a_no_op_on_an_empty_queue() {
        let lava = test_lava();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        assert_eq!(player.pause(true).unwrap(), false);
        assert_eq!(player.state(), PlayerState::Paused);
    }

    #[tokio::test]
    async fn stop_rejects_skipping_past_the_queue() {
        let lava = test_lava();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        player.queue().add(resolved("x", "a", 1000));
        assert!(player.stop(Some(5)).is_err());
    }

    #[tokio::test]
    async fn metadata_round_trips() {
        let lava = test_lava();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        player.set("dj", serde_json::json!("mocha"));
        assert_eq!(player.get("dj"), Some(serde_json::json!("mocha")));
        assert_eq!(player.get("nope"), None);
    }

    #[test]
    fn resolution_prefers_the_declared_author() {
        let tracks = vec![
            resolved("cover", "someone else", 2000),
            resolved("song", "artist - Topic", 2000),
        ];
        let picked = pick_resolution(tracks, Some("artist"), None).unwrap();
        assert_eq!(picked.info.title, "song");
    }

    #[test]
    fn resolution_falls_back_to_duration_window() {
        let tracks = vec![
            resolved("too long", "x", 400_000),
            resolved("close", "y", 181_000),
        ];
        let picked = pick_resolution(tracks, Some("artist"), Some(180_000)).unwrap();
        assert_eq!(picked.info.title, "close");
    }

    #[test]
    fn resolution_defaults_to_the_first_candidate() {
        let tracks = vec![resolved("first", "x", 1), resolved("second", "y", 2)];
        let picked = pick_resolution(tracks, None, None).unwrap();
        assert_eq!(picked.info.title, "first");
        assert!(pick_resolution(Vec::new(), None, None).is_none());
    }

    #[test]
    fn unresolved_placeholders_carry_their_hints() {
        let track = UnresolvedTrack::new("song")
            .unwrap()
            .author("artist")
            .duration(180_000);
        assert_eq!(track.author.as_deref(), Some("artist"));
        assert_eq!(track.duration, Some(180_000));
    }
}
