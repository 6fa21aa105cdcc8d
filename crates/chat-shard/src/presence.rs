//! Self-presence snapshot
//!
//! The presence template is configuration: it is injected through the client
//! options and deep-copied into the live snapshot at hard-reset time.

use chat_proto::{Activity, Status, StatusUpdatePayload};
use serde::Deserialize;

/// The self-presence configuration mutated by the public API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Presence {
    /// Configured status; `None` means no presence is sent in Identify
    #[serde(default)]
    pub status: Option<Status>,

    /// Whether the client is away from keyboard
    #[serde(default)]
    pub afk: bool,

    /// Current activity
    #[serde(default)]
    pub game: Option<Activity>,
}

impl Presence {
    /// Build the wire payload, if a status has been configured
    #[must_use]
    pub fn to_payload(&self) -> Option<StatusUpdatePayload> {
        self.status.map(|status| StatusUpdatePayload {
            status,
            afk: self.afk,
            game: self.game.clone(),
        })
    }

    /// Apply a status edit from the public API
    pub fn set_status(&mut self, status: Status, game: Option<Activity>) {
        self.status = Some(status);
        self.game = game;
    }
}
