//! Shared server context
//!
//! Built once at startup and handed to every connection handler.

use std::sync::Arc;

use crate::notifier::Notifier;
use crate::player::Player;
use crate::playlist::Playlist;


/// Everything a connection needs to act on a command.
pub struct ServerContext {
    pub player: Arc<Player>,
    pub notifier: Arc<dyn Notifier>,
}


impl ServerContext {
    pub fn new( player: Arc<Player>, notifier: Arc<dyn Notifier> ) -> Self {
        Self { player, notifier }
    }


    /// Gets the playlist the player was built over.
    pub fn playlist( &self ) -> &Arc<Playlist> {
        self.player.playlist()
    }
}
