//! Command-line argument parsing for Cueport.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ CommandFactory, FromArgMatches, Parser };

use cueport_core::command;


/// Cueport - play a folder of audio, controlled over a local socket.
#[derive( Parser, Debug )]
#[command( name = "cueport" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Folder of audio files to play.
    pub dir: PathBuf,

    /// Write the log to this file instead of stderr.
    #[arg( short, long, value_name = "PATH" )]
    pub log_file: Option<PathBuf>,

    /// Loopback address to listen on.
    #[arg( long )]
    pub host: Option<IpAddr>,

    /// Port to listen on.
    #[arg( short, long )]
    pub port: Option<u16>,

    /// Shuffle the playlist once at startup.
    #[arg( short, long )]
    pub shuffle: bool,

    /// Stop at the ends of the playlist instead of wrapping around.
    #[arg( long )]
    pub no_wrap: bool,

    /// Maximum number of clients served at once.
    #[arg( long, value_name = "N" )]
    pub max_connections: Option<usize>,

    /// Close clients that stay silent for this many seconds.
    #[arg( long, value_name = "SECS" )]
    pub idle_timeout: Option<u64>,

    /// Log notifications instead of showing them on the desktop.
    #[arg( long )]
    pub no_notify: bool,
}


impl Args {
    /// Parses process arguments, listing the control commands under `--help`.
    pub fn parse_with_commands() -> Self {
        let matches = Self::command()
            .after_help( format!( "Control commands:\n{}", command::help_text() ) )
            .get_matches();
        Self::from_arg_matches( &matches ).unwrap_or_else( |e| e.exit() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from([ "cueport", "/music" ]).unwrap();
        assert_eq!( args.dir, PathBuf::from( "/music" ) );
        assert!( args.log_file.is_none() );
        assert!( !args.shuffle );
        assert!( !args.no_wrap );
    }


    #[test]
    fn test_parse_all_flags() {
        let args = Args::try_parse_from([
            "cueport", "/music",
            "--log-file", "/tmp/cueport.log",
            "--host", "127.0.0.1",
            "--port", "7000",
            "--shuffle",
            "--no-wrap",
            "--max-connections", "4",
            "--idle-timeout", "30",
            "--no-notify",
        ]).unwrap();

        assert_eq!( args.log_file, Some( PathBuf::from( "/tmp/cueport.log" ) ) );
        assert_eq!( args.port, Some( 7000 ) );
        assert_eq!( args.max_connections, Some( 4 ) );
        assert_eq!( args.idle_timeout, Some( 30 ) );
        assert!( args.shuffle && args.no_wrap && args.no_notify );
    }


    #[test]
    fn test_dir_is_required() {
        assert!( Args::try_parse_from([ "cueport" ]).is_err() );
    }
}
