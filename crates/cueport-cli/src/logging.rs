//! Log setup
//!
//! Logs go to stderr, or to a file when one is given. `RUST_LOG` overrides
//! the default `info` level.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{ anyhow, Context, Result };
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;


/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the life of the process.
pub fn init( log_file: Option<&Path> ) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else( |_| EnvFilter::new( "info" ) );

    match log_file {
        Some( path ) => {
            let file = OpenOptions::new()
                .create( true )
                .append( true )
                .open( path )
                .with_context( || format!( "Failed to open log file {}", path.display() ) )?;
            let ( writer, guard ) = tracing_appender::non_blocking( file );

            tracing_subscriber::fmt()
                .with_writer( writer )
                .with_ansi( false )
                .with_target( true )
                .with_env_filter( filter )
                .try_init()
                .map_err( |e| anyhow!( e ) )?;

            Ok( Some( guard ) )
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer( std::io::stderr )
                .with_env_filter( filter )
                .try_init()
                .map_err( |e| anyhow!( e ) )?;

            Ok( None )
        }
    }
}
