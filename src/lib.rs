//! Client library for orchestrating audio-processing nodes: a pool of
//! authenticated node connections with load-balanced selection, one player
//! per guild with a loop-aware queue, and the binary codec for the opaque
//! track identifiers the nodes exchange.
//!
//! The crate does no audio work itself and speaks to no voice gateway; the
//! caller supplies a [`VoiceSender`] and forwards the two gateway voice
//! events through [`Lava::update_voice_data`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use mochalink::{Lava, LavaOptions, NodeOptions, PlayerOptions, VoiceSender, VoiceStatePayload};
//!
//! struct GatewaySender;
//!
//! #[async_trait::async_trait]
//! impl VoiceSender for GatewaySender {
//!     async fn send_voice(&self, _guild_id: &str, _payload: VoiceStatePayload) {
//!         // forward to the platform gateway
//!     }
//! }
//!
//! # async fn run() -> mochalink::Result<()> {
//! let lava = Lava::new(LavaOptions::new(Arc::new(GatewaySender)));
//! lava.create_node(NodeOptions::new("main", "localhost:2333")?)?;
//! lava.init("1234567890")?;
//!
//! let player = lava.create_player(
//!     PlayerOptions::new("guild-id")?.voice_channel("channel-id"),
//! )?;
//! player.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod filters;
pub mod manager;
pub mod node;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod routeplanner;
pub mod track;

pub use config::{
    BalanceLoad, LavaOptions, NodeOptions, PlayOptions, PlayerOptions, ResumeConfig,
    ResumeHandler, SearchPlatform, SearchQuery, Structures, VoiceSender,
};
pub use error::{Error, Result};
pub use events::{CloseReason, LavaEvent, TrackErrorKind};
pub use filters::Filters;
pub use manager::{Lava, Playlist, SearchResult};
pub use node::Node;
pub use player::{LoopMode, Player, PlayerState, PlayerVoiceState};
pub use protocol::{LoadType, NodeStats, VoiceStatePayload, VoiceUpdate};
pub use queue::Queue;
pub use routeplanner::{RoutePlanner, RoutePlannerStatus};
pub use track::{QueueItem, Track, TrackInfo, UnresolvedTrack};

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::{LavaOptions, VoiceSender};
    use crate::manager::Lava;
    use crate::protocol::VoiceStatePayload;

    struct NullSender;

    #[async_trait]
    impl VoiceSender for NullSender {
        async fn send_voice(&self, _guild_id: &str, _payload: VoiceStatePayload) {}
    }

    pub(crate) fn test_lava() -> Lava {
        Lava::new(LavaOptions::new(Arc::new(NullSender)))
    }
}
