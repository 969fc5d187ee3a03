//! Core player implementation
//!
//! The Player owns the single process-wide playback state and drives the
//! audio output. Every operation runs under one mutex, so connections that
//! issue commands at the same time are serialized and never observe a torn
//! state.

use std::fmt;
use std::path::PathBuf;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use rand::Rng;
use thiserror::Error;

use crate::output::{ AudioOutput, OutputError };
use crate::playlist::{ track_title, Playlist };


/// Errors that can occur during playback.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "Already at the {edge} of the playlist (track {} of {len})", .index + 1 )]
    Boundary { edge: Edge, index: usize, len: usize },

    #[error( "Track index {index} is out of range (playlist has {len} tracks)" )]
    OutOfRange { index: usize, len: usize },

    #[error( "Audio output error: {0}" )]
    Output( #[from] OutputError ),
}


/// One end of the playlist.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Edge {
    Start,
    End,
}


impl fmt::Display for Edge {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            Edge::Start => f.write_str( "start" ),
            Edge::End => f.write_str( "end" ),
        }
    }
}


/// What `next` and `previous` do at the ends of the playlist.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum BoundaryPolicy {
    /// Step from the last track to the first, and from the first to the last.
    #[default]
    Wrap,
    /// Refuse to step past either end and report `PlayerError::Boundary`.
    Stop,
}


/// Current playback state. The index always points into the playlist.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing( usize ),
    Paused( usize ),
}


impl PlaybackState {
    /// Gets the active track index, or None when stopped.
    pub fn index( &self ) -> Option<usize> {
        match self {
            PlaybackState::Stopped => None,
            PlaybackState::Playing( i ) | PlaybackState::Paused( i ) => Some( *i ),
        }
    }
}


#[derive( Debug, Clone, Copy )]
enum Step {
    Forward,
    Back,
}


struct PlayerInner {
    state: PlaybackState,
    output: Box<dyn AudioOutput>,
}


/// Core audio player.
pub struct Player {
    playlist: Arc<Playlist>,
    policy: BoundaryPolicy,
    inner: Mutex<PlayerInner>,
}


impl Player {
    /// Creates a stopped player over `playlist`.
    pub fn new( playlist: Arc<Playlist>, output: Box<dyn AudioOutput>, policy: BoundaryPolicy ) -> Self {
        Self {
            playlist,
            policy,
            inner: Mutex::new( PlayerInner {
                state: PlaybackState::Stopped,
                output,
            }),
        }
    }


    // A panic inside an output call leaves the state itself valid, so a
    // poisoned lock is still usable.
    fn lock( &self ) -> MutexGuard<'_, PlayerInner> {
        self.inner.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Starts, pauses or resumes playback depending on the current state.
    ///
    /// Stopped starts a random track. Playing pauses. Paused resumes the
    /// same track.
    ///
    /// @returns The state after the transition
    pub fn play_or_toggle( &self ) -> Result<PlaybackState, PlayerError> {
        let mut inner = self.lock();

        match inner.state {
            PlaybackState::Stopped => {
                let index = rand::thread_rng().gen_range( 0..self.playlist.len() );
                self.start( &mut inner, index )
            }
            PlaybackState::Playing( i ) => {
                inner.output.pause();
                inner.state = PlaybackState::Paused( i );
                tracing::info!( "Paused" );
                Ok( inner.state )
            }
            PlaybackState::Paused( i ) => {
                inner.output.resume();
                inner.state = PlaybackState::Playing( i );
                tracing::info!( "Resumed" );
                Ok( inner.state )
            }
        }
    }


    /// Plays the next track in the playlist.
    ///
    /// From Stopped this starts the first track.
    pub fn next( &self ) -> Result<PlaybackState, PlayerError> {
        self.step( Step::Forward )
    }


    /// Plays the previous track in the playlist.
    ///
    /// From Stopped this starts the last track.
    pub fn previous( &self ) -> Result<PlaybackState, PlayerError> {
        self.step( Step::Back )
    }


    /// Plays the track at `index`.
    pub fn jump_to( &self, index: usize ) -> Result<PlaybackState, PlayerError> {
        let len = self.playlist.len();
        if index >= len {
            return Err( PlayerError::OutOfRange { index, len } );
        }
        let mut inner = self.lock();
        self.start( &mut inner, index )
    }


    /// Stops playback. Safe to call in any state.
    pub fn stop( &self ) {
        let mut inner = self.lock();
        inner.output.stop();
        if inner.state != PlaybackState::Stopped {
            inner.state = PlaybackState::Stopped;
            tracing::info!( "Playback stopped" );
        }
    }


    /// Gets the current playback state.
    pub fn state( &self ) -> PlaybackState {
        self.lock().state
    }


    /// Gets the current track path, if any.
    pub fn current_track( &self ) -> Option<PathBuf> {
        let inner = self.lock();
        inner.state.index()
            .and_then( |i| self.playlist.get( i ) )
            .map( |p| p.to_path_buf() )
    }


    /// Gets the display title of the current track, if any.
    pub fn current_track_name( &self ) -> Option<String> {
        let inner = self.lock();
        inner.state.index()
            .and_then( |i| self.playlist.get( i ) )
            .map( track_title )
    }


    /// Gets the playlist being played.
    pub fn playlist( &self ) -> &Arc<Playlist> {
        &self.playlist
    }


    /// Gets the boundary policy.
    pub fn policy( &self ) -> BoundaryPolicy {
        self.policy
    }


    fn step( &self, step: Step ) -> Result<PlaybackState, PlayerError> {
        let mut inner = self.lock();
        let len = self.playlist.len();

        let target = match ( inner.state.index(), step ) {
            ( None, Step::Forward ) => 0,
            ( None, Step::Back ) => len - 1,
            ( Some( i ), Step::Forward ) if i + 1 < len => i + 1,
            ( Some( i ), Step::Back ) if i > 0 => i - 1,
            ( Some( i ), Step::Forward ) => match self.policy {
                BoundaryPolicy::Wrap => 0,
                BoundaryPolicy::Stop => {
                    return Err( PlayerError::Boundary { edge: Edge::End, index: i, len } );
                }
            },
            ( Some( i ), Step::Back ) => match self.policy {
                BoundaryPolicy::Wrap => len - 1,
                BoundaryPolicy::Stop => {
                    return Err( PlayerError::Boundary { edge: Edge::Start, index: i, len } );
                }
            },
        };

        self.start( &mut inner, target )
    }


    /// Loads `index` into the output. On failure the player ends up stopped.
    fn start( &self, inner: &mut PlayerInner, index: usize ) -> Result<PlaybackState, PlayerError> {
        let len = self.playlist.len();
        let path = self.playlist.get( index )
            .ok_or( PlayerError::OutOfRange { index, len } )?;

        if let Err( e ) = inner.output.load_and_play( path ) {
            inner.output.stop();
            inner.state = PlaybackState::Stopped;
            return Err( e.into() );
        }

        inner.state = PlaybackState::Playing( index );
        tracing::info!( "Now playing: {} ({}/{})", track_title( path ), index + 1, len );
        Ok( inner.state )
    }
}


impl Drop for Player {
    fn drop( &mut self ) {
        // Ensure playback is stopped when player is dropped
        self.stop();
    }
}


#[cfg( test )]
pub( crate ) mod tests {
    use super::*;
    use std::path::Path;
    use std::thread;


    /// Output that records calls instead of playing audio.
    #[derive( Clone, Default )]
    pub struct RecordingOutput {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub fail_loads: bool,
    }


    impl AudioOutput for RecordingOutput {
        fn load_and_play( &mut self, path: &Path ) -> Result<(), OutputError> {
            if self.fail_loads {
                return Err( OutputError::Device( "unplugged".into() ) );
            }
            let name = path.file_name().unwrap().to_string_lossy();
            self.calls.lock().unwrap().push( format!( "load {}", name ) );
            Ok(())
        }

        fn pause( &mut self ) {
            self.calls.lock().unwrap().push( "pause".into() );
        }

        fn resume( &mut self ) {
            self.calls.lock().unwrap().push( "resume".into() );
        }

        fn stop( &mut self ) {
            self.calls.lock().unwrap().push( "stop".into() );
        }
    }


    pub fn playlist( n: usize ) -> Arc<Playlist> {
        let tracks = ( 0..n ).map( |i| PathBuf::from( format!( "/music/{:02}.mp3", i ) ) ).collect();
        Arc::new( Playlist::from_tracks( PathBuf::from( "/music" ), tracks ).unwrap() )
    }


    fn player( n: usize, policy: BoundaryPolicy ) -> ( Player, RecordingOutput ) {
        let output = RecordingOutput::default();
        let player = Player::new( playlist( n ), Box::new( output.clone() ), policy );
        ( player, output )
    }


    #[test]
    fn test_play_toggles_on_same_track() {
        let ( player, output ) = player( 5, BoundaryPolicy::Wrap );

        let first = player.play_or_toggle().unwrap();
        let index = match first {
            PlaybackState::Playing( i ) => i,
            other => panic!( "expected Playing, got {:?}", other ),
        };
        assert!( index < 5 );

        assert_eq!( player.play_or_toggle().unwrap(), PlaybackState::Paused( index ) );
        assert_eq!( player.play_or_toggle().unwrap(), PlaybackState::Playing( index ) );

        let calls = output.calls.lock().unwrap();
        assert_eq!( calls.len(), 3 );
        assert_eq!( calls[ 1 ], "pause" );
        assert_eq!( calls[ 2 ], "resume" );
    }


    #[test]
    fn test_play_after_stop_starts_again() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Wrap );
        player.play_or_toggle().unwrap();
        player.stop();
        assert!( matches!( player.play_or_toggle().unwrap(), PlaybackState::Playing( _ ) ) );
    }


    #[test]
    fn test_next_wraps_to_first() {
        let ( player, _ ) = player( 4, BoundaryPolicy::Wrap );
        player.jump_to( 0 ).unwrap();

        for expected in [ 1, 2, 3 ] {
            assert_eq!( player.next().unwrap(), PlaybackState::Playing( expected ) );
        }
        // Fourth step leaves the last valid index
        assert_eq!( player.next().unwrap(), PlaybackState::Playing( 0 ) );
    }


    #[test]
    fn test_previous_wraps_to_last() {
        let ( player, _ ) = player( 4, BoundaryPolicy::Wrap );
        player.jump_to( 0 ).unwrap();
        assert_eq!( player.previous().unwrap(), PlaybackState::Playing( 3 ) );
        assert_eq!( player.previous().unwrap(), PlaybackState::Playing( 2 ) );
    }


    #[test]
    fn test_next_stops_at_end() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Stop );
        player.jump_to( 0 ).unwrap();

        assert_eq!( player.next().unwrap(), PlaybackState::Playing( 1 ) );
        assert_eq!( player.next().unwrap(), PlaybackState::Playing( 2 ) );

        let err = player.next().unwrap_err();
        assert!( matches!( err, PlayerError::Boundary { edge: Edge::End, index: 2, len: 3 } ) );
        assert_eq!( player.state(), PlaybackState::Playing( 2 ) );
    }


    #[test]
    fn test_previous_stops_at_start() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Stop );
        player.jump_to( 0 ).unwrap();
        player.play_or_toggle().unwrap();

        let err = player.previous().unwrap_err();
        assert!( matches!( err, PlayerError::Boundary { edge: Edge::Start, index: 0, .. } ) );
        assert_eq!( player.state(), PlaybackState::Paused( 0 ) );
    }


    #[test]
    fn test_step_from_stopped() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Stop );
        assert_eq!( player.next().unwrap(), PlaybackState::Playing( 0 ) );
        player.stop();
        assert_eq!( player.previous().unwrap(), PlaybackState::Playing( 2 ) );
    }


    #[test]
    fn test_next_from_paused_plays() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Wrap );
        player.jump_to( 1 ).unwrap();
        player.play_or_toggle().unwrap();
        assert_eq!( player.next().unwrap(), PlaybackState::Playing( 2 ) );
    }


    #[test]
    fn test_stop_is_idempotent() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Wrap );

        player.stop();
        assert_eq!( player.state(), PlaybackState::Stopped );

        player.jump_to( 1 ).unwrap();
        player.stop();
        assert_eq!( player.state(), PlaybackState::Stopped );

        player.jump_to( 1 ).unwrap();
        player.play_or_toggle().unwrap();
        player.stop();
        player.stop();
        assert_eq!( player.state(), PlaybackState::Stopped );
        assert!( player.current_track().is_none() );
    }


    #[test]
    fn test_current_track_name() {
        let ( player, _ ) = player( 3, BoundaryPolicy::Wrap );
        assert!( player.current_track_name().is_none() );

        player.jump_to( 2 ).unwrap();
        assert_eq!( player.current_track_name().as_deref(), Some( "02" ) );

        player.play_or_toggle().unwrap();
        assert_eq!( player.current_track_name().as_deref(), Some( "02" ) );
    }


    #[test]
    fn test_jump_out_of_range() {
        let ( player, _ ) = player( 2, BoundaryPolicy::Wrap );
        let err = player.jump_to( 2 ).unwrap_err();
        assert!( matches!( err, PlayerError::OutOfRange { index: 2, len: 2 } ) );
        assert_eq!( player.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_output_failure_leaves_stopped() {
        let output = RecordingOutput { fail_loads: true, ..Default::default() };
        let player = Player::new( playlist( 2 ), Box::new( output ), BoundaryPolicy::Wrap );

        assert!( matches!( player.next(), Err( PlayerError::Output( _ ) ) ) );
        assert_eq!( player.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_concurrent_steps_stay_in_range() {
        for policy in [ BoundaryPolicy::Wrap, BoundaryPolicy::Stop ] {
            let ( player, _ ) = player( 3, policy );
            let player = Arc::new( player );

            let handles: Vec<_> = ( 0..4 ).map( |t| {
                let player = Arc::clone( &player );
                thread::spawn( move || {
                    for i in 0..200 {
                        let _ = match ( t + i ) % 3 {
                            0 => player.next(),
                            1 => player.previous(),
                            _ => { player.stop(); Ok( PlaybackState::Stopped ) }
                        };
                        let state = player.state();
                        if let Some( index ) = state.index() {
                            assert!( index < 3 );
                        }
                    }
                })
            }).collect();

            for handle in handles {
                handle.join().unwrap();
            }

            match player.state() {
                PlaybackState::Stopped => assert!( player.current_track().is_none() ),
                _ => assert!( player.current_track().is_some() ),
            }
        }
    }
}
