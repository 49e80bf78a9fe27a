//! Voice session lifecycle.
//!
//! The [`SessionController`] owns everything a session holds and is the only
//! place state changes happen. Producers never touch session state directly;
//! they post [`SessionInput`]s to its inbox:
//!
//! ```text
//! Capture Bridge ──Captured──┐
//! Transport ─────Transport───┤
//! Decode Worker ──Decoded────┼──> inbox ──> SessionController
//! Mixer ──PlaybackFinished───┤
//! SessionControl ─Disconnect─┘
//! ```

mod controller;
mod inbox;
mod resources;
mod state;
mod stats;

pub use controller::{SessionControl, SessionController};
pub(crate) use inbox::{inbox, InboxReceiver, InboxSender, SessionInput};
pub use inbox::{PlaybackNotifier, TransportEvents};
pub use resources::ReleaseReport;
pub(crate) use resources::SessionResources;
pub use state::{Activity, SessionState, SessionStatus};
pub(crate) use state::StatusPublisher;
pub use stats::SessionStats;
pub(crate) use stats::SessionCounters;
