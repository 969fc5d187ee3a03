//! Cueport - local playback control server

mod cli;
#[cfg( feature = "desktop-notify" )]
mod desktop;
mod logging;
mod settings;

use std::path::Path;
use std::sync::Arc;

use anyhow::{ Context, Result };

use cli::Args;
use settings::Settings;

use cueport_core::{
    LogNotifier, Notifier, Player, Playlist, Server, ServerContext, SilentOutput,
};


/// Notifications allowed to wait while one is being shown.
#[cfg( feature = "desktop-notify" )]
const NOTIFY_QUEUE_CAPACITY: usize = 8;


/// Picks the desktop notifier when enabled and compiled in.
fn build_notifier( settings: &Settings ) -> Arc<dyn Notifier> {
    #[cfg( feature = "desktop-notify" )]
    {
        if settings.notifications {
            let desktop = Arc::new( desktop::DesktopNotifier );
            match cueport_core::QueuedNotifier::spawn( desktop, NOTIFY_QUEUE_CAPACITY ) {
                Ok( queued ) => return Arc::new( queued ),
                Err( e ) => tracing::warn!( "Failed to start notifier, logging instead: {}", e ),
            }
        }
    }

    if settings.notifications {
        tracing::debug!( "Desktop notifications unavailable, logging them instead" );
    }
    Arc::new( LogNotifier )
}


/// Loads the playlist and binds the server.
///
/// The playlist is loaded first, so a bad folder fails before any socket
/// is opened.
async fn prepare( dir: &Path, settings: &Settings ) -> Result<Server> {
    let playlist = Playlist::load( dir, settings.load_order() )
        .with_context( || format!( "Failed to load playlist from {}", dir.display() ) )?;

    let player = Arc::new( Player::new(
        Arc::new( playlist ),
        Box::new( SilentOutput::new() ),
        settings.boundary_policy(),
    ));
    let context = Arc::new( ServerContext::new( player, build_notifier( settings ) ) );

    let server = Server::bind( settings.server_config(), context ).await
        .context( "Failed to start server" )?;
    Ok( server )
}


/// Resolves when the process is interrupted.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!( "Interrupt received" ),
        Err( e ) => {
            tracing::error!( "Failed to listen for interrupt, running until killed: {}", e );
            std::future::pending::<()>().await;
        }
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_with_commands();
    let _log_guard = logging::init( args.log_file.as_deref() )?;

    let settings = Settings::load().with_args( &args );

    let server = prepare( &args.dir, &settings ).await?;
    server.run( shutdown_signal() ).await?;

    tracing::info!( "Server stopped" );
    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs;
    use std::net::TcpListener;
    use cueport_core::PlaylistError;
    use tempfile::TempDir;


    /// Settings aimed at a port that is already taken.
    fn settings_on_taken_port( taken: &TcpListener ) -> Settings {
        Settings {
            port: taken.local_addr().unwrap().port(),
            notifications: false,
            ..Settings::default()
        }
    }


    #[tokio::test]
    async fn test_missing_folder_fails_before_bind() {
        let taken = TcpListener::bind( "127.0.0.1:0" ).unwrap();
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join( "nope" );

        let err = prepare( &missing, &settings_on_taken_port( &taken ) ).await.err().expect( "prepare should fail" );
        assert!( matches!( err.downcast_ref::<PlaylistError>(), Some( PlaylistError::NotFound( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_empty_folder_fails_before_bind() {
        let taken = TcpListener::bind( "127.0.0.1:0" ).unwrap();
        let dir = TempDir::new().unwrap();
        fs::write( dir.path().join( "notes.txt" ), "" ).unwrap();

        let err = prepare( dir.path(), &settings_on_taken_port( &taken ) ).await.err().expect( "prepare should fail" );
        assert!( matches!( err.downcast_ref::<PlaylistError>(), Some( PlaylistError::Empty( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_taken_port_fails_after_load() {
        let taken = TcpListener::bind( "127.0.0.1:0" ).unwrap();
        let dir = TempDir::new().unwrap();
        fs::write( dir.path().join( "a.mp3" ), "" ).unwrap();

        let err = prepare( dir.path(), &settings_on_taken_port( &taken ) ).await.err().expect( "prepare should fail" );
        assert!( err.downcast_ref::<PlaylistError>().is_none() );
    }


    #[tokio::test]
    async fn test_valid_folder_binds() {
        let dir = TempDir::new().unwrap();
        fs::write( dir.path().join( "a.mp3" ), "" ).unwrap();
        let settings = Settings { port: 0, notifications: false, ..Settings::default() };

        let server = prepare( dir.path(), &settings ).await.unwrap();
        assert!( server.local_addr().unwrap().ip().is_loopback() );
    }
}
