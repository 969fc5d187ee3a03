//! Audio output seam
//!
//! The player drives an `AudioOutput` for every state transition. Decoding
//! and device handling live behind this trait; the crate ships only a silent
//! implementation that records what it was asked to do in the log.

use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( String ),

    #[error( "Output device error: {0}" )]
    Device( String ),
}


/// Audio output driven by the player.
///
/// Every call happens while the player lock is held, so implementations
/// should return quickly and do any heavy lifting on their own threads.
pub trait AudioOutput: Send {
    /// Stops whatever is playing, then starts `path` from the beginning.
    fn load_and_play( &mut self, path: &Path ) -> Result<(), OutputError>;

    /// Pauses the current track, keeping its position.
    fn pause( &mut self );

    /// Resumes a paused track.
    fn resume( &mut self );

    /// Stops playback and releases the current track.
    fn stop( &mut self );
}


/// Output that plays nothing and logs each request.
#[derive( Debug, Default )]
pub struct SilentOutput {
    loaded: Option<PathBuf>,
}


impl SilentOutput {
    pub fn new() -> Self {
        Self::default()
    }


    /// Gets the track most recently handed to `load_and_play`, if not stopped.
    pub fn loaded( &self ) -> Option<&Path> {
        self.loaded.as_deref()
    }
}


impl AudioOutput for SilentOutput {
    fn load_and_play( &mut self, path: &Path ) -> Result<(), OutputError> {
        if !path.is_file() {
            return Err( OutputError::FileOpen( path.display().to_string() ) );
        }
        tracing::debug!( "Output: load {:?}", path );
        self.loaded = Some( path.to_path_buf() );
        Ok(())
    }


    fn pause( &mut self ) {
        tracing::debug!( "Output: pause" );
    }


    fn resume( &mut self ) {
        tracing::debug!( "Output: resume" );
    }


    fn stop( &mut self ) {
        if self.loaded.take().is_some() {
            tracing::debug!( "Output: stop" );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs::File;

    use tempfile::TempDir;


    #[test]
    fn test_silent_output_rejects_missing_file() {
        let mut output = SilentOutput::new();
        let result = output.load_and_play( Path::new( "/definitely/not/here.mp3" ) );
        assert!( matches!( result, Err( OutputError::FileOpen( _ ) ) ) );
        assert!( output.loaded().is_none() );
    }


    #[test]
    fn test_silent_output_tracks_loaded_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "a.mp3" );
        File::create( &path ).unwrap();

        let mut output = SilentOutput::new();
        output.load_and_play( &path ).unwrap();
        assert_eq!( output.loaded(), Some( path.as_path() ) );

        output.stop();
        assert!( output.loaded().is_none() );
    }
}
