//! Control command parsing and dispatch.
//!
//! Clients send bare words (`play`, `next`, ...). Each word maps to exactly
//! one player operation; nothing is ever written back to the client.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::context::ServerContext;
use crate::player::{ PlaybackState, PlayerError };


/// Notification title used by `title`.
pub const NOW_PLAYING_TITLE: &str = "Now Playing";

/// Message used by `title` when nothing is playing.
pub const NO_TRACK_MESSAGE: &str = "No track is currently playing.";

/// Notification title used for playback problems.
pub const PLAYBACK_TITLE: &str = "Playback";


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Empty command" )]
    Empty,
}


/// Parsed control command.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Command {
    Play,
    Pause,
    Next,
    Prev,
    Stop,
    Title,
    Exit,
}


impl Command {
    /// Parses a command word. Matching is exact and case-sensitive after
    /// trimming surrounding whitespace.
    ///
    /// @param input - The command text to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        match input.trim() {
            "play" => Ok( Command::Play ),
            "pause" => Ok( Command::Pause ),
            "next" => Ok( Command::Next ),
            "prev" => Ok( Command::Prev ),
            "stop" => Ok( Command::Stop ),
            "title" => Ok( Command::Title ),
            "exit" => Ok( Command::Exit ),
            "" => Err( CommandError::Empty ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Play => "Start a random track, or toggle pause",
            Command::Pause => "Toggle pause (same as play)",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Stop => "Stop playback",
            Command::Title => "Show the current track",
            Command::Exit => "Stop playback and close this connection",
        }
    }
}


impl FromStr for Command {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        Self::parse( s )
    }
}


/// What the connection should do after a command.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Flow {
    Continue,
    Close,
}


/// Routes command text to the player and notifier.
#[derive( Clone )]
pub struct Dispatcher {
    context: Arc<ServerContext>,
}


impl Dispatcher {
    pub fn new( context: Arc<ServerContext> ) -> Self {
        Self { context }
    }


    /// Parses and runs one command. Unknown commands are logged and ignored.
    pub fn dispatch( &self, text: &str ) -> Flow {
        let text = text.trim();
        tracing::info!( "Command received: {}", text );

        match Command::parse( text ) {
            Ok( command ) => self.execute( command ),
            Err( e ) => {
                tracing::warn!( "{}", e );
                Flow::Continue
            }
        }
    }


    /// Runs an already parsed command.
    pub fn execute( &self, command: Command ) -> Flow {
        let player = &self.context.player;

        match command {
            Command::Play | Command::Pause => self.report( command, player.play_or_toggle() ),
            Command::Next => self.report( command, player.next() ),
            Command::Prev => self.report( command, player.previous() ),
            Command::Stop => player.stop(),
            Command::Title => {
                let name = player.current_track_name();
                let message = name.as_deref().unwrap_or( NO_TRACK_MESSAGE );
                self.context.notifier.notify( NOW_PLAYING_TITLE, message );
            }
            Command::Exit => {
                player.stop();
                return Flow::Close;
            }
        }

        Flow::Continue
    }


    fn report( &self, command: Command, result: Result<PlaybackState, PlayerError> ) {
        match result {
            Ok( state ) => tracing::debug!( "{:?} -> {:?}", command, state ),
            Err( e @ PlayerError::Boundary { .. } ) => {
                tracing::warn!( "{:?}: {}", command, e );
                self.context.notifier.notify( PLAYBACK_TITLE, &e.to_string() );
            }
            Err( e ) => tracing::error!( "{:?} failed: {}", command, e ),
        }
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> String {
    let commands = [
        ( "play", Command::Play ),
        ( "pause", Command::Pause ),
        ( "next", Command::Next ),
        ( "prev", Command::Prev ),
        ( "stop", Command::Stop ),
        ( "title", Command::Title ),
        ( "exit", Command::Exit ),
    ];

    commands.iter()
        .map( |( word, command )| format!( "  {:<7} {}", word, command.description() ) )
        .collect::<Vec<_>>()
        .join( "\n" )
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::notifier::RecordingNotifier;
    use crate::player::tests::{ playlist, RecordingOutput };
    use crate::player::{ BoundaryPolicy, Player };


    fn dispatcher( n: usize, policy: BoundaryPolicy ) -> ( Dispatcher, Arc<Player>, Arc<RecordingNotifier> ) {
        let player = Arc::new( Player::new( playlist( n ), Box::new( RecordingOutput::default() ), policy ) );
        let notifier = Arc::new( RecordingNotifier::new() );
        let context = Arc::new( ServerContext::new( Arc::clone( &player ), notifier.clone() ) );
        ( Dispatcher::new( context ), player, notifier )
    }


    #[test]
    fn test_parse_all_commands() {
        assert_eq!( Command::parse( "play" ), Ok( Command::Play ) );
        assert_eq!( Command::parse( "pause" ), Ok( Command::Pause ) );
        assert_eq!( Command::parse( "next" ), Ok( Command::Next ) );
        assert_eq!( Command::parse( "prev" ), Ok( Command::Prev ) );
        assert_eq!( Command::parse( "stop" ), Ok( Command::Stop ) );
        assert_eq!( Command::parse( "title" ), Ok( Command::Title ) );
        assert_eq!( Command::parse( "exit" ), Ok( Command::Exit ) );
    }


    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!( Command::parse( "  next\r\n" ), Ok( Command::Next ) );
    }


    #[test]
    fn test_parse_is_exact() {
        assert_eq!( Command::parse( "PLAY" ), Err( CommandError::Unknown( "PLAY".into() ) ) );
        assert_eq!( Command::parse( "previous" ), Err( CommandError::Unknown( "previous".into() ) ) );
        assert_eq!( Command::parse( "p" ), Err( CommandError::Unknown( "p".into() ) ) );
        assert_eq!( Command::parse( "play now" ), Err( CommandError::Unknown( "play now".into() ) ) );
        assert_eq!( Command::parse( "   " ), Err( CommandError::Empty ) );
    }


    #[test]
    fn test_play_and_pause_both_toggle() {
        let ( dispatcher, player, _ ) = dispatcher( 3, BoundaryPolicy::Wrap );

        assert_eq!( dispatcher.dispatch( "play" ), Flow::Continue );
        let index = player.state().index().unwrap();

        dispatcher.dispatch( "play" );
        assert_eq!( player.state(), PlaybackState::Paused( index ) );
        dispatcher.dispatch( "pause" );
        assert_eq!( player.state(), PlaybackState::Playing( index ) );
        dispatcher.dispatch( "pause" );
        assert_eq!( player.state(), PlaybackState::Paused( index ) );
    }


    #[test]
    fn test_title_when_stopped() {
        let ( dispatcher, _, notifier ) = dispatcher( 3, BoundaryPolicy::Wrap );
        dispatcher.dispatch( "title" );
        assert_eq!( notifier.sent(), vec![ ( NOW_PLAYING_TITLE.to_string(), NO_TRACK_MESSAGE.to_string() ) ] );
    }


    #[test]
    fn test_title_names_current_track() {
        let ( dispatcher, player, notifier ) = dispatcher( 3, BoundaryPolicy::Wrap );
        player.jump_to( 1 ).unwrap();
        dispatcher.dispatch( "title" );
        dispatcher.dispatch( "pause" );
        dispatcher.dispatch( "title" );
        assert_eq!( notifier.sent(), vec![
            ( NOW_PLAYING_TITLE.to_string(), "01".to_string() ),
            ( NOW_PLAYING_TITLE.to_string(), "01".to_string() ),
        ]);
    }


    #[test]
    fn test_boundary_is_notified() {
        let ( dispatcher, player, notifier ) = dispatcher( 2, BoundaryPolicy::Stop );
        player.jump_to( 1 ).unwrap();

        assert_eq!( dispatcher.dispatch( "next" ), Flow::Continue );
        assert_eq!( player.state(), PlaybackState::Playing( 1 ) );

        let sent = notifier.sent();
        assert_eq!( sent.len(), 1 );
        assert_eq!( sent[ 0 ].0, PLAYBACK_TITLE );
        assert!( sent[ 0 ].1.contains( "end" ) );
    }


    #[test]
    fn test_next_and_prev() {
        let ( dispatcher, player, _ ) = dispatcher( 3, BoundaryPolicy::Wrap );
        dispatcher.dispatch( "next" );
        assert_eq!( player.state(), PlaybackState::Playing( 0 ) );
        dispatcher.dispatch( "prev" );
        assert_eq!( player.state(), PlaybackState::Playing( 2 ) );
    }


    #[test]
    fn test_stop_and_exit() {
        let ( dispatcher, player, _ ) = dispatcher( 3, BoundaryPolicy::Wrap );
        player.jump_to( 0 ).unwrap();

        assert_eq!( dispatcher.dispatch( "stop" ), Flow::Continue );
        assert_eq!( player.state(), PlaybackState::Stopped );

        player.jump_to( 2 ).unwrap();
        assert_eq!( dispatcher.dispatch( "exit" ), Flow::Close );
        assert_eq!( player.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_unknown_changes_nothing() {
        let ( dispatcher, player, notifier ) = dispatcher( 3, BoundaryPolicy::Wrap );
        player.jump_to( 2 ).unwrap();

        assert_eq!( dispatcher.dispatch( "rewind" ), Flow::Continue );
        assert_eq!( player.state(), PlaybackState::Playing( 2 ) );
        assert!( notifier.sent().is_empty() );
    }


    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        for word in [ "play", "pause", "next", "prev", "stop", "title", "exit" ] {
            assert!( help.contains( word ) );
        }
    }
}
