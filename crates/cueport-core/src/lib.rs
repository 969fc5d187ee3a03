//! Cueport Core - playback control server
//!
//! This crate provides the playlist loader, the playback state machine,
//! command dispatch and the loopback TCP server that feeds it.

pub mod command;
pub mod context;
pub mod notifier;
pub mod output;
pub mod player;
pub mod playlist;
pub mod server;

pub use command::{ Command, CommandError, Dispatcher, Flow };
pub use context::ServerContext;
pub use notifier::{ LogNotifier, Notifier, QueuedNotifier, RecordingNotifier };
pub use output::{ AudioOutput, OutputError, SilentOutput };
pub use player::{ BoundaryPolicy, PlaybackState, Player, PlayerError };
pub use playlist::{ LoadOrder, Playlist, PlaylistError };
pub use server::{ Server, ServerConfig, ServerError };
