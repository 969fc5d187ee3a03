//! Desktop notifications
//!
//! Shows `title` results and playback problems as desktop notifications.

use cueport_core::Notifier;


const APP_NAME: &str = "Cueport";


/// Sends notifications through the desktop notification service.
///
/// `notify` blocks until the notification daemon answers, so this is meant
/// to sit behind a `QueuedNotifier` rather than be called from a connection.
#[derive( Debug, Default, Clone, Copy )]
pub struct DesktopNotifier;


impl Notifier for DesktopNotifier {
    fn notify( &self, title: &str, message: &str ) {
        tracing::info!( "Notify: {}: {}", title, message );

        let shown = notify_rust::Notification::new()
            .appname( APP_NAME )
            .summary( title )
            .body( message )
            .show();

        if let Err( e ) = shown {
            tracing::warn!( "Failed to show notification: {}", e );
        }
    }
}
