//! The client hub: node and player registries, load-balanced node
//! selection, search/decode REST entry points, voice-gateway merging and
//! inbound event routing.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::{
    LavaOptions, NodeOptions, PlayerOptions, ResumeConfig, SearchQuery,
};
use crate::error::{Error, Result};
use crate::events::{CloseReason, EventBus, LavaEvent, TrackErrorKind};
use crate::node::Node;
use crate::player::{Player, PlayerState, PlayerVoiceState};
use crate::protocol::{
    LoadException, LoadTracksResponse, LoadType, NodeEvent, PlayerUpdateState, VoiceUpdate,
};
use crate::track::{Track, TrackData, TrackInfo};

/// Anything already scheme-qualified is submitted verbatim instead of being
/// rewritten into a platform search.
static URI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:https?://|\w+:)").expect("valid pattern"));

pub(crate) fn rewrite_query(query: &str, prefix: &str, allow_search: bool) -> String {
    if allow_search && !URI_PATTERN.is_match(query) {
        format!("{prefix}search:{query}")
    } else {
        query.to_owned()
    }
}

/// Playlist metadata attached to a playlist-typed search result.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub name: String,
    /// The track the link pointed into, if any.
    pub selected_track: Option<Track>,
    /// Sum of all track durations, in milliseconds.
    pub duration: u64,
}

/// Typed outcome of a track search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub load_type: LoadType,
    pub tracks: Vec<Track>,
    pub playlist: Option<Playlist>,
    /// Load failure details when `load_type` is `LoadFailed`.
    pub error: Option<LoadException>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SelectionMetric {
    Calls,
    Load,
}

/// The main hub. Cheap to clone; all clones share the same registries.
#[derive(Debug, Clone)]
pub struct Lava {
    inner: Arc<LavaInner>,
}

pub(crate) struct LavaInner {
    pub(crate) options: LavaOptions,
    client_id: RwLock<Option<String>>,
    resume: RwLock<Option<ResumeConfig>>,
    pub(crate) nodes: DashMap<String, Arc<Node>>,
    pub(crate) players: DashMap<String, Arc<Player>>,
    events: EventBus,
}

impl std::fmt::Debug for LavaInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LavaInner")
            .field("client_id", &*self.client_id.read())
            .field("nodes", &self.nodes.len())
            .field("players", &self.players.len())
            .finish_non_exhaustive()
    }
}

impl Lava {
    pub fn new(mut options: LavaOptions) -> Self {
        let resume = options.resume.take();
        Self {
            inner: Arc::new(LavaInner {
                options,
                client_id: RwLock::new(None),
                resume: RwLock::new(resume),
                nodes: DashMap::new(),
                players: DashMap::new(),
                events: EventBus::new(256),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<LavaInner>) -> Self {
        Self { inner }
    }

    /// Listen for domain events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<LavaEvent> {
        self.inner.events.subscribe()
    }

    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id()
    }

    /// Set the client identity and connect every registered node. Repeat
    /// calls after the first are ignored.
    pub fn init(&self, client_id: impl Into<String>) -> Result<()> {
        let client_id = client_id.into();
        if client_id.is_empty() {
            return Err(Error::Validation(
                "'client_id' must be a non-empty string".into(),
            ));
        }
        {
            let mut id = self.inner.client_id.write();
            if id.is_some() {
                return Ok(());
            }
            *id = Some(client_id);
        }
        for node in self.nodes() {
            node.connect();
        }
        Ok(())
    }

    /// Register a node, or return the existing one registered under the
    /// same name. Connects immediately once the client is initialized.
    pub fn create_node(&self, options: NodeOptions) -> Result<Arc<Node>> {
        if let Some(existing) = self.inner.nodes.get(&options.name) {
            return Ok(Arc::clone(existing.value()));
        }
        let node = Arc::new(Node::new(Arc::downgrade(&self.inner), options)?);
        self.inner
            .nodes
            .insert(node.name().to_owned(), Arc::clone(&node));
        self.inner.emit(LavaEvent::NodeCreate(Arc::clone(&node)));
        if self.inner.client_id().is_some() {
            node.connect();
        }
        Ok(node)
    }

    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.inner
            .nodes
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.inner
            .nodes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Create a player for a guild, or return the existing one. A new
    /// player is bound to the least-loaded eligible node and its initial
    /// volume is pushed best-effort.
    pub fn create_player(&self, options: PlayerOptions) -> Result<Arc<Player>> {
        if let Some(existing) = self.inner.players.get(&options.guild_id) {
            return Ok(Arc::clone(existing.value()));
        }

        let mut options = options;
        if options.node.is_none() {
            options.node = self
                .inner
                .select_node(&options.required_plugins, SelectionMetric::Load)
                .map(|node| node.name().to_owned());
        }
        let volume = options.volume;
        let queue = self.inner.options.structures.queue();
        let player = Arc::new(Player::new(Arc::downgrade(&self.inner), options, queue));
        self.inner
            .players
            .insert(player.guild_id().to_owned(), Arc::clone(&player));
        self.inner.emit(LavaEvent::PlayerCreate(Arc::clone(&player)));
        let _ = player.set_volume(volume);
        Ok(player)
    }

    pub fn player(&self, guild_id: &str) -> Option<Arc<Player>> {
        self.inner
            .players
            .get(guild_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn players(&self) -> Vec<Arc<Player>> {
        self.inner
            .players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Destroy the player of a guild, if one exists.
    pub async fn destroy_player(&self, guild_id: &str) -> Result<()> {
        if let Some(player) = self.player(guild_id) {
            player.destroy().await?;
        }
        Ok(())
    }

    /// Connected node with the fewest REST calls.
    pub fn least_used_node(&self) -> Option<Arc<Node>> {
        self.inner.select_node(&[], SelectionMetric::Calls)
    }

    /// Connected node with the lowest normalized CPU load.
    pub fn least_load_node(&self) -> Option<Arc<Node>> {
        self.inner.select_node(&[], SelectionMetric::Load)
    }

    pub fn least_used_filtered_node(&self, plugins: &[String]) -> Option<Arc<Node>> {
        self.inner.select_node(plugins, SelectionMetric::Calls)
    }

    pub fn least_load_filtered_node(&self, plugins: &[String]) -> Option<Arc<Node>> {
        self.inner.select_node(plugins, SelectionMetric::Load)
    }

    /// Resolve a query into tracks through the least-used eligible node.
    pub async fn search(
        &self,
        query: SearchQuery,
        requester: Option<Value>,
    ) -> Result<SearchResult> {
        self.inner.search(query, requester).await
    }

    /// Round-trip a wire identifier through a node's decode endpoint.
    pub async fn decode_track(&self, track: &str) -> Result<TrackData> {
        if track.is_empty() {
            return Err(Error::Validation(
                "'track' must be a non-empty string".into(),
            ));
        }
        let node = self.least_used_node().ok_or(Error::NoNodeAvailable)?;
        let info: TrackInfo = node
            .request(&format!(
                "/decodetrack?track={}",
                urlencoding::encode(track)
            ))
            .await?;
        Ok(TrackData {
            track: track.to_owned(),
            info,
        })
    }

    pub async fn decode_tracks(&self, tracks: &[String]) -> Result<Vec<TrackData>> {
        let node = self.least_used_node().ok_or(Error::NoNodeAvailable)?;
        node.post("/decodetracks", tracks).await
    }

    /// Merge a forwarded gateway event into the addressed player's voice
    /// handshake; a handshake that just became complete is shipped to the
    /// player's node.
    pub fn update_voice_data(&self, update: VoiceUpdate) -> Result<()> {
        let Some(player) = self.player(update.guild_id()) else {
            return Ok(());
        };

        match update {
            VoiceUpdate::Server { guild_id, event } => {
                player.merge_voice_server(&guild_id, event);
            }
            VoiceUpdate::State(state) => {
                if self.inner.client_id().as_deref() != Some(state.user_id.as_str()) {
                    return Ok(());
                }
                player.merge_voice_session(&state.session_id);

                if player.voice_channel() != state.channel_id {
                    self.inner.emit(LavaEvent::PlayerMove {
                        player: Arc::clone(&player),
                        old_channel: player.voice_channel(),
                        new_channel: state.channel_id.clone(),
                    });
                    player.set_voice_channel(state.channel_id.clone());

                    if state.channel_id.is_none() {
                        player.set_voice_state(PlayerVoiceState::Disconnected);
                        if player.state() != PlayerState::Paused {
                            let _ = player.pause(true);
                            player.set_need_resume(true);
                        }
                    }
                }
            }
        }

        player.try_send_voice()?;
        Ok(())
    }

    /// Store a resume configuration and push it to every connected node.
    pub fn configure_resume(&self, config: ResumeConfig) {
        *self.inner.resume.write() = Some(config);
        for node in self.nodes() {
            if node.is_connected() {
                node.configure_resume();
            }
        }
    }
}

impl LavaInner {
    pub(crate) fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub(crate) fn resume_config(&self) -> Option<ResumeConfig> {
        self.resume.read().clone()
    }

    pub(crate) fn emit(&self, event: LavaEvent) {
        self.events.emit(event);
    }

    /// Best connected node whose plugin set covers `plugins`; ties broken
    /// by node name so selection is deterministic.
    fn select_node(&self, plugins: &[String], metric: SelectionMetric) -> Option<Arc<Node>> {
        let mut best: Option<(f64, String, Arc<Node>)> = None;
        for entry in self.nodes.iter() {
            let node = entry.value();
            if !node.is_connected() {
                continue;
            }
            if !plugins.iter().all(|plugin| node.has_plugin(plugin)) {
                continue;
            }
            let score = match metric {
                SelectionMetric::Calls => node.calls() as f64,
                SelectionMetric::Load => self.load_of(node),
            };
            let better = match &best {
                Some((best_score, best_name, _)) => {
                    score < *best_score || (score == *best_score && node.name() < best_name.as_str())
                }
                None => true,
            };
            if better {
                best = Some((score, node.name().to_owned(), Arc::clone(node)));
            }
        }
        best.map(|(_, _, node)| node)
    }

    /// Normalized load percentage per the configured balance strategy.
    fn load_of(&self, node: &Node) -> f64 {
        let stats = node.stats();
        if stats.cpu.cores == 0 {
            return 0.0;
        }
        let load = match self.options.balance_load {
            crate::config::BalanceLoad::System => stats.cpu.system_load,
            crate::config::BalanceLoad::Lavalink => stats.cpu.lavalink_load,
        };
        load / f64::from(stats.cpu.cores) * 100.0
    }

    pub(crate) async fn search(
        &self,
        query: SearchQuery,
        requester: Option<Value>,
    ) -> Result<SearchResult> {
        let node = self
            .select_node(&query.required_plugins, SelectionMetric::Calls)
            .ok_or(Error::NoNodeAvailable)?;

        let source = query.source.unwrap_or(self.options.default_search_platform);
        let text = rewrite_query(&query.query, source.prefix(), query.allow_search);

        let response: LoadTracksResponse = node
            .request(&format!(
                "/loadtracks?identifier={}",
                urlencoding::encode(&text)
            ))
            .await?;

        let tracks: Vec<Track> = response
            .tracks
            .into_iter()
            .map(|data| Track::new(data, requester.clone()))
            .collect();

        let mut result = SearchResult {
            load_type: response.load_type,
            playlist: None,
            error: None,
            tracks,
        };

        if response.load_type == LoadType::LoadFailed {
            result.error = response.exception;
        }

        if response.load_type == LoadType::PlaylistLoaded {
            if let Some(info) = response.playlist_info {
                let selected_track = usize::try_from(info.selected_track)
                    .ok()
                    .and_then(|index| result.tracks.get(index).cloned());
                result.playlist = Some(Playlist {
                    name: info.name,
                    selected_track,
                    duration: result.tracks.iter().map(|track| track.info.length).sum(),
                });
            }
        }

        Ok(result)
    }

    pub(crate) async fn handle_node_connect(self: &Arc<Self>, node: &Arc<Node>) {
        self.emit(LavaEvent::NodeConnect(Arc::clone(node)));
        if !self.options.auto_replay {
            return;
        }

        for player in self.players_of(node.name()) {
            // Force the full reassignment path, voice and track included.
            player.clear_node_name();
            if let Err(err) = player.set_node(node.name()).await {
                self.emit(LavaEvent::ReplayError {
                    player,
                    error: Arc::new(err),
                });
            }
        }
    }

    pub(crate) async fn handle_node_disconnect(
        self: &Arc<Self>,
        node: &Arc<Node>,
        reason: CloseReason,
    ) {
        self.emit(LavaEvent::NodeDisconnect {
            node: Arc::clone(node),
            reason,
        });
        if !self.options.auto_replay {
            return;
        }

        for player in self.players_of(node.name()) {
            let target =
                self.select_node(player.required_plugins(), SelectionMetric::Load);
            let outcome = match target {
                Some(target) => player.set_node(target.name()).await,
                None => Err(Error::NoNodeAvailable),
            };
            if let Err(err) = outcome {
                warn!(
                    "failed to migrate player {} off node '{}': {err}",
                    player.guild_id(),
                    node.name()
                );
                self.emit(LavaEvent::ReplayError {
                    player,
                    error: Arc::new(err),
                });
            }
        }
    }

    pub(crate) fn handle_node_destroy(self: &Arc<Self>, node: &Arc<Node>) {
        self.emit(LavaEvent::NodeDestroy(Arc::clone(node)));
        self.nodes.remove(node.name());
    }

    pub(crate) async fn handle_player_update(
        self: &Arc<Self>,
        node: &Arc<Node>,
        guild_id: &str,
        state: PlayerUpdateState,
    ) {
        match self.players.get(guild_id).map(|e| Arc::clone(e.value())) {
            Some(player) => player.apply_update(state),
            None => {
                // A resumed session can report guilds this client has not
                // rebuilt players for yet.
                if node.is_resumed() {
                    if let Some(config) = self.resume_config() {
                        (config.handler)(
                            Lava::from_inner(Arc::clone(self)),
                            guild_id.to_owned(),
                            state,
                        );
                    }
                }
            }
        }
    }

    pub(crate) async fn handle_event(self: &Arc<Self>, node: &Arc<Node>, event: NodeEvent) {
        let Some(player) = self
            .players
            .get(event.guild_id())
            .map(|e| Arc::clone(e.value()))
        else {
            debug!(
                "node '{}' reported an event for unknown guild {}",
                node.name(),
                event.guild_id()
            );
            return;
        };
        let track = player.queue().current.clone();

        match event {
            NodeEvent::TrackStart(payload) => {
                player.set_state(PlayerState::Playing);
                if player.take_replaying() {
                    return;
                }
                let Some(track) = track else { return };
                let fresh_queue = player.queue().previous.is_none();
                self.emit(LavaEvent::TrackStart {
                    player: Arc::clone(&player),
                    track: track.clone(),
                    payload: payload.clone(),
                });
                if fresh_queue {
                    self.emit(LavaEvent::QueueStart {
                        player: Arc::clone(&player),
                        track,
                    });
                }
            }
            NodeEvent::TrackEnd(payload) => {
                // The node cleans orphaned players up by itself; nothing to
                // advance there.
                if payload.reason == "CLEANUP" {
                    return;
                }
                if let Some(track) = track.clone() {
                    self.emit(LavaEvent::TrackEnd {
                        player: Arc::clone(&player),
                        track,
                        payload: payload.clone(),
                    });
                }
                if payload.reason == "REPLACED" {
                    return;
                }
                self.finish_or_advance(&player, track).await;
            }
            NodeEvent::TrackStuck(payload) => {
                if let Some(track) = track.clone() {
                    self.emit(LavaEvent::TrackStuck {
                        player: Arc::clone(&player),
                        track,
                        payload,
                    });
                }
                self.finish_or_advance(&player, track).await;
            }
            NodeEvent::TrackException(payload) => {
                if payload.is_internal_replay() {
                    return;
                }
                self.emit(LavaEvent::TrackError {
                    player: Arc::clone(&player),
                    track: track.clone(),
                    kind: TrackErrorKind::Exception(payload),
                });
                self.finish_or_advance(&player, track).await;
            }
            NodeEvent::WebSocketClosed(payload) => {
                if !player.is_voice_connected()
                    && player.voice_state() == PlayerVoiceState::Connected
                {
                    if self.options.auto_resume && player.voice_channel().is_some() {
                        if let Err(err) = player.connect().await {
                            warn!(
                                "failed to rejoin voice for guild {}: {err}",
                                player.guild_id()
                            );
                        }
                    } else if let Err(err) = player.disconnect().await {
                        warn!(
                            "failed to leave voice for guild {}: {err}",
                            player.guild_id()
                        );
                    }
                }
                self.emit(LavaEvent::SocketClosed { player, payload });
            }
        }
    }

    /// Emit queue-end when nothing is left to play, then let auto-play
    /// advance the queue.
    async fn finish_or_advance(
        self: &Arc<Self>,
        player: &Arc<Player>,
        track: Option<crate::track::QueueItem>,
    ) {
        let drained = {
            let queue = player.queue();
            queue.is_empty() && player.loop_mode() == crate::player::LoopMode::None
        };
        if drained {
            if let Some(track) = track {
                self.emit(LavaEvent::QueueEnd {
                    player: Arc::clone(player),
                    track,
                });
            }
        }

        if self.options.auto_play {
            let options = player.play_options().unwrap_or_default();
            if let Err(err) = player.play(options).await {
                warn!(
                    "auto-play failed for guild {}: {err}",
                    player.guild_id()
                );
            }
        }
    }

    fn players_of(&self, node_name: &str) -> Vec<Arc<Player>> {
        self.players
            .iter()
            .filter(|entry| entry.value().node_name().as_deref() == Some(node_name))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CpuStats, NodeStats, VoiceStateUpdate};
    use crate::test_util::test_lava;
    use pretty_assertions::assert_eq;

    fn node_with_calls(lava: &Lava, name: &str, calls: u64, connected: bool) -> Arc<Node> {
        let node = lava
            .create_node(NodeOptions::new(name, format!("{name}.example:2333")).unwrap())
            .unwrap();
        node.force_calls(calls);
        node.force_connected(connected);
        node
    }

    #[tokio::test]
    async fn least_used_skips_disconnected_nodes() {
        let lava = test_lava();
        node_with_calls(&lava, "a", 5, true);
        node_with_calls(&lava, "b", 2, true);
        node_with_calls(&lava, "c", 1, false);

        let picked = lava.least_used_node().unwrap();
        assert_eq!(picked.name(), "b");
    }

    #[tokio::test]
    async fn plugin_filter_can_rule_everything_out() {
        let lava = test_lava();
        node_with_calls(&lava, "a", 5, true);
        let b = node_with_calls(&lava, "b", 2, true);
        b.force_plugin("sponsorblock", "1.0");

        let required = vec!["sponsorblock".to_owned()];
        assert_eq!(
            lava.least_used_filtered_node(&required).unwrap().name(),
            "b"
        );

        let missing = vec!["lyrics".to_owned()];
        assert!(lava.least_used_filtered_node(&missing).is_none());
    }

    #[tokio::test]
    async fn ties_break_deterministically_by_name() {
        let lava = test_lava();
        node_with_calls(&lava, "zeta", 3, true);
        node_with_calls(&lava, "alpha", 3, true);

        assert_eq!(lava.least_used_node().unwrap().name(), "alpha");
    }

    #[tokio::test]
    async fn least_load_uses_normalized_cpu() {
        let lava = test_lava();
        let a = node_with_calls(&lava, "a", 0, true);
        let b = node_with_calls(&lava, "b", 0, true);
        a.force_stats(NodeStats {
            cpu: CpuStats {
                cores: 4,
                system_load: 2.0,
                lavalink_load: 0.0,
            },
            ..NodeStats::default()
        });
        b.force_stats(NodeStats {
            cpu: CpuStats {
                cores: 16,
                system_load: 2.0,
                lavalink_load: 0.0,
            },
            ..NodeStats::default()
        });

        assert_eq!(lava.least_load_node().unwrap().name(), "b");
    }

    #[tokio::test]
    async fn node_and_player_creation_is_idempotent() {
        let lava = test_lava();
        let first = lava
            .create_node(NodeOptions::new("main", "localhost:2333").unwrap())
            .unwrap();
        let second = lava
            .create_node(NodeOptions::new("main", "other:9999").unwrap())
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let p1 = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        let p2 = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(lava.players().len(), 1);
    }

    #[tokio::test]
    async fn search_without_nodes_is_an_availability_error() {
        let lava = test_lava();
        let result = lava.search(SearchQuery::new("hello").unwrap(), None).await;
        assert!(matches!(result, Err(Error::NoNodeAvailable)));
    }

    #[test]
    fn plain_text_queries_are_rewritten() {
        assert_eq!(
            rewrite_query("never gonna give you up", "yt", true),
            "ytsearch:never gonna give you up"
        );
        assert_eq!(
            rewrite_query("https://youtu.be/dQw4w9WgXcQ", "yt", true),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(
            rewrite_query("scsearch:already prefixed", "yt", true),
            "scsearch:already prefixed"
        );
        assert_eq!(rewrite_query("plain text", "yt", false), "plain text");
    }

    #[tokio::test]
    async fn partial_voice_handshakes_never_reach_a_node() {
        let lava = test_lava();
        lava.init("42").unwrap();
        let player = lava
            .create_player(PlayerOptions::new("guild").unwrap())
            .unwrap();

        // Server half only: incomplete, nothing to send.
        lava.update_voice_data(VoiceUpdate::Server {
            guild_id: "guild".into(),
            event: serde_json::json!({ "token": "tok", "endpoint": "voice.example" }),
        })
        .unwrap();

        // State update for some other user is ignored entirely.
        lava.update_voice_data(VoiceUpdate::State(VoiceStateUpdate {
            guild_id: "guild".into(),
            channel_id: Some("chan".into()),
            user_id: "999".into(),
            session_id: "sess".into(),
        }))
        .unwrap();

        // Completing the handshake attempts the send, which fails here only
        // because no node is registered.
        let result = lava.update_voice_data(VoiceUpdate::State(VoiceStateUpdate {
            guild_id: "guild".into(),
            channel_id: Some("chan".into()),
            user_id: "42".into(),
            session_id: "sess".into(),
        }));
        assert!(matches!(result, Err(Error::NoNodeAvailable)));
        assert_eq!(player.voice_channel().as_deref(), Some("chan"));
    }

    #[tokio::test]
    async fn losing_the_voice_channel_pauses_the_player() {
        let lava = test_lava();
        lava.init("42").unwrap();
        let player = lava
            .create_player(
                PlayerOptions::new("guild").unwrap().voice_channel("chan"),
            )
            .unwrap();
        player.set_state(PlayerState::Playing);
        player.queue().add(crate::track::UnresolvedTrack::new("x").unwrap());

        let mut events = lava.subscribe();
        lava.update_voice_data(VoiceUpdate::State(VoiceStateUpdate {
            guild_id: "guild".into(),
            channel_id: None,
            user_id: "42".into(),
            session_id: "sess".into(),
        }))
        .unwrap();

        assert_eq!(player.voice_channel(), None);
        assert_eq!(player.state(), PlayerState::Paused);
        assert!(player.needs_resume());
        match events.try_recv() {
            Ok(LavaEvent::PlayerMove { new_channel, .. }) => assert_eq!(new_channel, None),
            other => panic!("expected a player move event, got {other:?}"),
        }
    }
}
