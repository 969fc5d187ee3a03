//! Playlist loading
//!
//! Builds the fixed track list served by the player from a single folder.

use std::borrow::Cow;
use std::fs;
use std::path::{ Path, PathBuf };

use rand::seq::SliceRandom;
use thiserror::Error;


/// Supported audio file extensions.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "wav", "m4a", "aac", "opus", "wma", "aiff", "alac",
];


/// Errors that can occur while loading a playlist.
#[derive( Debug, Error )]
pub enum PlaylistError {
    #[error( "Folder not found: {0}" )]
    NotFound( PathBuf ),

    #[error( "No audio files found in {0}" )]
    Empty( PathBuf ),

    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),
}


/// Order in which tracks are kept after loading.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum LoadOrder {
    /// Sorted by file name.
    #[default]
    Sorted,
    /// Shuffled once at load time.
    Shuffled,
}


/// An immutable, non-empty list of tracks from one folder.
#[derive( Debug, Clone )]
pub struct Playlist {
    dir: PathBuf,
    tracks: Vec<PathBuf>,
}


impl Playlist {
    /// Loads every supported audio file directly inside `dir`.
    ///
    /// @param dir - Folder to scan (not recursive)
    /// @param order - Whether to keep file name order or shuffle
    ///
    /// @returns The playlist, or an error if the folder is missing or has no audio
    pub fn load( dir: &Path, order: LoadOrder ) -> Result<Self, PlaylistError> {
        if !dir.is_dir() {
            return Err( PlaylistError::NotFound( dir.to_path_buf() ) );
        }

        let dir = match dir.canonicalize() {
            Ok( d ) => d,
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err( PlaylistError::NotFound( dir.to_path_buf() ) );
            }
            Err( e ) => return Err( PlaylistError::Io( e ) ),
        };

        let mut tracks = Vec::new();
        for entry in fs::read_dir( &dir )? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && is_audio_file( &path ) {
                tracks.push( path );
            }
        }

        if tracks.is_empty() {
            return Err( PlaylistError::Empty( dir ) );
        }

        match order {
            LoadOrder::Sorted => tracks.sort_by( |a, b| a.file_name().cmp( &b.file_name() ) ),
            LoadOrder::Shuffled => tracks.shuffle( &mut rand::thread_rng() ),
        }

        tracing::info!( "Loaded {} tracks from {:?}", tracks.len(), dir );
        Ok( Self { dir, tracks } )
    }


    /// Creates a playlist from an explicit list of paths.
    ///
    /// Returns `PlaylistError::Empty` if `tracks` is empty.
    pub fn from_tracks( dir: PathBuf, tracks: Vec<PathBuf> ) -> Result<Self, PlaylistError> {
        if tracks.is_empty() {
            return Err( PlaylistError::Empty( dir ) );
        }
        Ok( Self { dir, tracks } )
    }


    /// Gets the folder the playlist was loaded from.
    pub fn dir( &self ) -> &Path {
        &self.dir
    }


    /// Gets all tracks in playlist order.
    pub fn tracks( &self ) -> &[PathBuf] {
        &self.tracks
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Option<&Path> {
        self.tracks.get( index ).map( PathBuf::as_path )
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Always false for a loaded playlist.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


/// Checks if a file has a supported audio extension (case-insensitive).
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Derives a display title from a track path.
///
/// Drops the directory and extension, then decodes percent-encoding.
/// `/music/Blue%20Train.mp3` becomes `Blue Train`.
pub fn track_title( path: &Path ) -> String {
    let stem = path.file_stem()
        .map( |s| s.to_string_lossy() )
        .unwrap_or( Cow::Borrowed( "" ) );

    let decoded = urlencoding::decode( &stem ).map( Cow::into_owned ).ok();
    decoded.unwrap_or_else( || stem.into_owned() )
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs::File;

    use tempfile::TempDir;


    fn touch( dir: &Path, name: &str ) {
        File::create( dir.join( name ) ).unwrap();
    }


    #[test]
    fn test_load_accepts_all_supported_extensions() {
        let dir = TempDir::new().unwrap();
        for ext in SUPPORTED_EXTENSIONS {
            touch( dir.path(), &format!( "track.{}", ext ) );
        }

        let playlist = Playlist::load( dir.path(), LoadOrder::Sorted ).unwrap();
        assert_eq!( playlist.len(), SUPPORTED_EXTENSIONS.len() );
    }


    #[test]
    fn test_load_excludes_unsupported() {
        let dir = TempDir::new().unwrap();
        touch( dir.path(), "a.mp3" );
        touch( dir.path(), "B.FLAC" );
        touch( dir.path(), "cover.jpg" );
        touch( dir.path(), "notes.txt" );
        touch( dir.path(), "noext" );
        fs::create_dir( dir.path().join( "sub.mp3" ) ).unwrap();

        let playlist = Playlist::load( dir.path(), LoadOrder::Sorted ).unwrap();
        let names: Vec<_> = playlist.tracks().iter()
            .map( |p| p.file_name().unwrap().to_string_lossy().into_owned() )
            .collect();
        assert_eq!( names, vec![ "B.FLAC", "a.mp3" ] );
    }


    #[test]
    fn test_load_paths_are_absolute() {
        let dir = TempDir::new().unwrap();
        touch( dir.path(), "a.mp3" );

        let playlist = Playlist::load( dir.path(), LoadOrder::Sorted ).unwrap();
        assert!( playlist.tracks()[ 0 ].is_absolute() );
    }


    #[test]
    fn test_load_shuffled_keeps_all_tracks() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            touch( dir.path(), &format!( "{:02}.ogg", i ) );
        }

        let playlist = Playlist::load( dir.path(), LoadOrder::Shuffled ).unwrap();
        let mut names: Vec<_> = playlist.tracks().iter()
            .map( |p| p.file_name().unwrap().to_owned() )
            .collect();
        names.sort();
        assert_eq!( names.len(), 20 );
        assert_eq!( names[ 0 ], "00.ogg" );
        assert_eq!( names[ 19 ], "19.ogg" );
    }


    #[test]
    fn test_load_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join( "nope" );
        let result = Playlist::load( &missing, LoadOrder::Sorted );
        assert!( matches!( result, Err( PlaylistError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_load_file_is_not_a_dir() {
        let dir = TempDir::new().unwrap();
        touch( dir.path(), "a.mp3" );
        let result = Playlist::load( &dir.path().join( "a.mp3" ), LoadOrder::Sorted );
        assert!( matches!( result, Err( PlaylistError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_load_empty_dir() {
        let dir = TempDir::new().unwrap();
        touch( dir.path(), "readme.md" );
        let result = Playlist::load( dir.path(), LoadOrder::Sorted );
        assert!( matches!( result, Err( PlaylistError::Empty( _ ) ) ) );
    }


    #[test]
    fn test_from_tracks_rejects_empty() {
        let result = Playlist::from_tracks( PathBuf::from( "/music" ), Vec::new() );
        assert!( matches!( result, Err( PlaylistError::Empty( _ ) ) ) );
    }


    #[test]
    fn test_track_title() {
        assert_eq!( track_title( Path::new( "/music/Blue Train.mp3" ) ), "Blue Train" );
        assert_eq!( track_title( Path::new( "/music/Blue%20Train.mp3" ) ), "Blue Train" );
        assert_eq!( track_title( Path::new( "So.What.flac" ) ), "So.What" );
        assert_eq!( track_title( Path::new( "/music/bad%FF.mp3" ) ), "bad%FF" );
    }
}
