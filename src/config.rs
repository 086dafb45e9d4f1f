//! Client, node and player configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::manager::Lava;
use crate::protocol::{PlayerUpdateState, VoiceStatePayload};
use crate::queue::Queue;

/// Caller-supplied hook that ships voice-state payloads to the host
/// platform's gateway, joining or leaving voice channels.
#[async_trait]
pub trait VoiceSender: Send + Sync {
    async fn send_voice(&self, guild_id: &str, payload: VoiceStatePayload);
}

/// Pluggable construction points, defaulting to the built-ins.
pub trait Structures: Send + Sync {
    fn queue(&self) -> Queue {
        Queue::new()
    }
}

/// Built-in structures.
#[derive(Debug, Default)]
pub struct DefaultStructures;

impl Structures for DefaultStructures {}

/// Which load figure drives least-load node selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceLoad {
    /// Whole-machine load reported by the node.
    #[default]
    System,
    /// Load of the audio process itself.
    Lavalink,
}

/// Search platform used when a query is rewritten into a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPlatform {
    #[default]
    Youtube,
    YoutubeMusic,
    Soundcloud,
}

impl SearchPlatform {
    /// Prefix understood by the node's load endpoint.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Youtube => "yt",
            Self::YoutubeMusic => "ytm",
            Self::Soundcloud => "sc",
        }
    }
}

/// Callback invoked when a resumed node reports a player this client does
/// not know about, so the caller can reconstruct it out-of-band.
pub type ResumeHandler = Arc<dyn Fn(Lava, String, PlayerUpdateState) + Send + Sync>;

/// Session resume settings pushed to every connected node.
#[derive(Clone)]
pub struct ResumeConfig {
    pub key: String,
    /// Seconds the node keeps the session alive after a drop.
    pub timeout: u64,
    pub handler: ResumeHandler,
}

impl ResumeConfig {
    pub fn new(key: impl Into<String>, handler: ResumeHandler) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::Validation("'key' must be a non-empty string".into()));
        }
        Ok(Self {
            key,
            timeout: 60,
            handler,
        })
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ResumeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeConfig")
            .field("key", &self.key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Top-level client options.
#[derive(Clone)]
pub struct LavaOptions {
    /// Value for the `Client-Name` handshake header.
    pub client_name: String,
    /// Shard count advertised to the nodes.
    pub shards: u32,
    /// Automatically play the next queued track when one ends.
    pub auto_play: bool,
    /// Platform used when rewriting plain-text queries into searches.
    pub default_search_platform: SearchPlatform,
    /// Replay players automatically when their node drops.
    pub auto_replay: bool,
    /// Re-join voice when the node-side voice socket closes unexpectedly.
    pub auto_resume: bool,
    pub balance_load: BalanceLoad,
    /// Capabilities every node must advertise to be considered usable.
    pub required_plugins: Vec<String>,
    pub(crate) send: Arc<dyn VoiceSender>,
    pub(crate) structures: Arc<dyn Structures>,
    pub(crate) resume: Option<ResumeConfig>,
}

impl LavaOptions {
    pub fn new(send: Arc<dyn VoiceSender>) -> Self {
        Self {
            client_name: "mochalink".into(),
            shards: 1,
            auto_play: true,
            default_search_platform: SearchPlatform::default(),
            auto_replay: true,
            auto_resume: true,
            balance_load: BalanceLoad::default(),
            required_plugins: Vec::new(),
            send,
            structures: Arc::new(DefaultStructures),
            resume: None,
        }
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn shards(mut self, shards: u32) -> Self {
        self.shards = shards.max(1);
        self
    }

    pub fn auto_play(mut self, auto_play: bool) -> Self {
        self.auto_play = auto_play;
        self
    }

    pub fn search_platform(mut self, platform: SearchPlatform) -> Self {
        self.default_search_platform = platform;
        self
    }

    pub fn auto_replay(mut self, auto_replay: bool) -> Self {
        self.auto_replay = auto_replay;
        self
    }

    pub fn auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }

    pub fn balance_load(mut self, balance_load: BalanceLoad) -> Self {
        self.balance_load = balance_load;
        self
    }

    pub fn required_plugins(mut self, plugins: Vec<String>) -> Self {
        self.required_plugins = plugins;
        self
    }

    pub fn structures(mut self, structures: Arc<dyn Structures>) -> Self {
        self.structures = structures;
        self
    }

    pub fn resume(mut self, config: ResumeConfig) -> Self {
        self.resume = Some(config);
        self
    }
}

impl fmt::Debug for LavaOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LavaOptions")
            .field("client_name", &self.client_name)
            .field("shards", &self.shards)
            .field("auto_play", &self.auto_play)
            .field("default_search_platform", &self.default_search_platform)
            .field("auto_replay", &self.auto_replay)
            .field("auto_resume", &self.auto_resume)
            .field("balance_load", &self.balance_load)
            .field("required_plugins", &self.required_plugins)
            .field("resume", &self.resume)
            .finish_non_exhaustive()
    }
}

/// Per-node connection settings.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Unique registry key.
    pub name: String,
    /// Host and port, without scheme.
    pub url: String,
    pub password: String,
    pub secure: bool,
    /// Reconnect budget before the node destroys itself.
    pub retry_amount: u32,
    pub retry_delay: Duration,
    /// Timeout for REST calls against this node.
    pub request_timeout: Option<Duration>,
}

impl NodeOptions {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let url = url.into();
        if name.is_empty() {
            return Err(Error::Validation("'name' must be a non-empty string".into()));
        }
        if url.is_empty() {
            return Err(Error::Validation("'url' must be a non-empty string".into()));
        }
        Ok(Self {
            name,
            url,
            password: "youshallnotpass".into(),
            secure: false,
            retry_amount: 5,
            retry_delay: Duration::from_secs(30),
            request_timeout: None,
        })
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn retry_amount(mut self, retry_amount: u32) -> Self {
        self.retry_amount = retry_amount;
        self
    }

    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Per-player settings.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Guild key; one player per guild.
    pub guild_id: String,
    /// Voice channel to join, if already known.
    pub voice_channel: Option<String>,
    /// Preferred node name; falls back to the least-loaded eligible node.
    pub node: Option<String>,
    /// Initial volume, clamped to 0..=1000.
    pub volume: i32,
    pub self_mute: bool,
    pub self_deaf: bool,
    /// Free-form caller data attached to the player.
    pub metadata: HashMap<String, Value>,
    /// Capabilities the player's node must advertise.
    pub required_plugins: Vec<String>,
}

impl PlayerOptions {
    pub fn new(guild_id: impl Into<String>) -> Result<Self> {
        let guild_id = guild_id.into();
        if guild_id.is_empty() {
            return Err(Error::Validation(
                "'guild_id' must be a non-empty string".into(),
            ));
        }
        Ok(Self {
            guild_id,
            voice_channel: None,
            node: None,
            volume: 100,
            self_mute: false,
            self_deaf: true,
            metadata: HashMap::new(),
            required_plugins: Vec::new(),
        })
    }

    pub fn voice_channel(mut self, channel: impl Into<String>) -> Self {
        self.voice_channel = Some(channel.into());
        self
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn volume(mut self, volume: i32) -> Self {
        self.volume = volume;
        self
    }

    pub fn self_mute(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }

    pub fn self_deaf(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }

    pub fn required_plugins(mut self, plugins: Vec<String>) -> Self {
        self.required_plugins = plugins;
        self
    }
}

/// Options for a single play command.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayOptions {
    /// Millisecond offset to start the track at.
    pub start_time: Option<u64>,
    /// Millisecond position to stop the track at.
    pub end_time: Option<u64>,
}

/// A track search request.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    /// When false, the query is submitted verbatim even if it is plain text.
    pub allow_search: bool,
    /// Platform override; the client default applies otherwise.
    pub source: Option<SearchPlatform>,
    /// Capabilities the node answering this search must advertise.
    pub required_plugins: Vec<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        if query.is_empty() {
            return Err(Error::Validation(
                "'query' must be a non-empty string".into(),
            ));
        }
        Ok(Self {
            query,
            allow_search: true,
            source: None,
            required_plugins: Vec::new(),
        })
    }

    pub fn allow_search(mut self, allow_search: bool) -> Self {
        self.allow_search = allow_search;
        self
    }

    pub fn source(mut self, source: SearchPlatform) -> Self {
        self.source = Some(source);
        self
    }

    pub fn required_plugins(mut self, plugins: Vec<String>) -> Self {
        self.required_plugins = plugins;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_options_have_sane_defaults() {
        let options = NodeOptions::new("main", "localhost:2333").unwrap();
        assert_eq!(options.password, "youshallnotpass");
        assert_eq!(options.retry_amount, 5);
        assert_eq!(options.retry_delay, Duration::from_secs(30));
        assert!(!options.secure);
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(NodeOptions::new("", "localhost:2333").is_err());
        assert!(NodeOptions::new("main", "").is_err());
        assert!(PlayerOptions::new("").is_err());
        assert!(SearchQuery::new("").is_err());
    }

    #[test]
    fn search_platform_prefixes() {
        assert_eq!(SearchPlatform::Youtube.prefix(), "yt");
        assert_eq!(SearchPlatform::YoutubeMusic.prefix(), "ytm");
        assert_eq!(SearchPlatform::Soundcloud.prefix(), "sc");
    }
}
