//! Application settings management
//!
//! Persistent defaults for the server, overridden by command-line flags.

use std::fs;
use std::net::{ IpAddr, Ipv4Addr, SocketAddr };
use std::path::{ Path, PathBuf };
use std::time::Duration;

use serde::{ Deserialize, Serialize };

use cueport_core::server::{ ServerConfig, DEFAULT_ADDR, DEFAULT_MAX_CONNECTIONS };
use cueport_core::{ BoundaryPolicy, LoadOrder };

use crate::cli::Args;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Loopback address to listen on
    pub host: IpAddr,

    /// Port to listen on
    pub port: u16,

    /// Shuffle the playlist at startup
    pub shuffle: bool,

    /// Wrap around at the ends of the playlist
    pub wrap: bool,

    /// Maximum number of clients served at once
    pub max_connections: usize,

    /// Close silent clients after this many seconds
    pub idle_timeout_secs: Option<u64>,

    /// Show desktop notifications
    pub notifications: bool,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4( Ipv4Addr::LOCALHOST ),
            port: DEFAULT_ADDR.port(),
            shuffle: false,
            wrap: true,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout_secs: None,
            notifications: true,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "cueport" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    /// Nothing is written back.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_if_present( &path ),
            None => Self::default(),
        }
    }


    /// Loads settings from `path` if the file exists.
    fn load_if_present( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        Self::load_from( path )
    }


    /// Loads settings from `path`, or returns defaults if it cannot be read.
    pub fn load_from( path: &Path ) -> Self {
        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_else( |e| {
                    tracing::warn!( "Ignoring malformed settings in {:?}: {}", path, e );
                    Self::default()
                })
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Applies command-line overrides.
    pub fn with_args( mut self, args: &Args ) -> Self {
        if let Some( host ) = args.host {
            self.host = host;
        }
        if let Some( port ) = args.port {
            self.port = port;
        }
        if let Some( max ) = args.max_connections {
            self.max_connections = max;
        }
        if let Some( secs ) = args.idle_timeout {
            self.idle_timeout_secs = Some( secs );
        }
        self.shuffle |= args.shuffle;
        self.wrap &= !args.no_wrap;
        self.notifications &= !args.no_notify;
        self
    }


    pub fn load_order( &self ) -> LoadOrder {
        if self.shuffle { LoadOrder::Shuffled } else { LoadOrder::Sorted }
    }


    pub fn boundary_policy( &self ) -> BoundaryPolicy {
        if self.wrap { BoundaryPolicy::Wrap } else { BoundaryPolicy::Stop }
    }


    pub fn server_config( &self ) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::new( self.host, self.port ),
            max_connections: self.max_connections,
            idle_timeout: self.idle_timeout_secs.filter( |s| *s > 0 ).map( Duration::from_secs ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;


    #[test]
    fn test_defaults_match_protocol() {
        let config = Settings::default().server_config();
        assert_eq!( config.addr, "127.0.0.1:65432".parse::<SocketAddr>().unwrap() );
        assert!( config.idle_timeout.is_none() );
        assert_eq!( Settings::default().boundary_policy(), BoundaryPolicy::Wrap );
    }


    #[test]
    fn test_load_full_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );

        let settings = Settings { port: 7000, wrap: false, idle_timeout_secs: Some( 5 ), ..Settings::default() };
        fs::write( &path, serde_json::to_string_pretty( &settings ).unwrap() ).unwrap();

        assert_eq!( Settings::load_from( &path ), settings );
    }


    #[test]
    fn test_missing_file_uses_defaults_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );

        assert_eq!( Settings::load_if_present( &path ), Settings::default() );
        assert!( !path.exists() );
        assert_eq!( fs::read_dir( dir.path() ).unwrap().count(), 0 );
    }


    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "port": 9000 }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.port, 9000 );
        assert!( settings.wrap );
        assert!( settings.notifications );
    }


    #[test]
    fn test_malformed_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }


    #[test]
    fn test_args_override() {
        let args = Args::try_parse_from([
            "cueport", "/music", "--port", "7001", "--no-wrap", "--shuffle", "--idle-timeout", "0",
        ]).unwrap();
        let settings = Settings::default().with_args( &args );

        assert_eq!( settings.port, 7001 );
        assert_eq!( settings.boundary_policy(), BoundaryPolicy::Stop );
        assert_eq!( settings.load_order(), LoadOrder::Shuffled );
        assert!( settings.server_config().idle_timeout.is_none() );
    }
}
