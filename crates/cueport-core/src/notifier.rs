//! User-facing notifications
//!
//! Notifications are fire-and-forget: implementations must return promptly
//! and swallow their own delivery failures.

use std::io;
use std::sync::mpsc::{ self, SyncSender, TrySendError };
use std::sync::{ Arc, Mutex };
use std::thread;


/// Displays a short title/message pair to the local user.
pub trait Notifier: Send + Sync {
    fn notify( &self, title: &str, message: &str );
}


/// Writes notifications to the log only.
#[derive( Debug, Default, Clone, Copy )]
pub struct LogNotifier;


impl Notifier for LogNotifier {
    fn notify( &self, title: &str, message: &str ) {
        tracing::info!( "{}: {}", title, message );
    }
}


/// Keeps every notification in memory.
#[derive( Debug, Default )]
pub struct RecordingNotifier {
    sent: Mutex<Vec<( String, String )>>,
}


impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }


    /// Gets a copy of every notification sent so far, oldest first.
    pub fn sent( &self ) -> Vec<( String, String )> {
        self.sent.lock().map( |s| s.clone() ).unwrap_or_default()
    }
}


impl Notifier for RecordingNotifier {
    fn notify( &self, title: &str, message: &str ) {
        if let Ok( mut sent ) = self.sent.lock() {
            sent.push(( title.to_string(), message.to_string() ));
        }
    }
}


/// Hands notifications to a single worker thread through a bounded queue.
///
/// `notify` never blocks: when the queue is full the notification is dropped
/// with a warning. The worker exits once the notifier is dropped.
pub struct QueuedNotifier {
    tx: SyncSender<( String, String )>,
}


impl QueuedNotifier {
    /// Starts the worker that delivers through `inner`.
    ///
    /// @param inner - Notifier that may block while delivering
    /// @param capacity - Notifications waiting beyond the one being delivered
    pub fn spawn( inner: Arc<dyn Notifier>, capacity: usize ) -> io::Result<Self> {
        let ( tx, rx ) = mpsc::sync_channel::<( String, String )>( capacity );

        thread::Builder::new()
            .name( "notifier".into() )
            .spawn( move || {
                for ( title, message ) in rx {
                    inner.notify( &title, &message );
                }
                tracing::debug!( "Notifier worker exiting" );
            })?;

        Ok( Self { tx } )
    }
}


impl Notifier for QueuedNotifier {
    fn notify( &self, title: &str, message: &str ) {
        match self.tx.try_send(( title.to_string(), message.to_string() )) {
            Ok(()) => {}
            Err( TrySendError::Full( _ ) ) => {
                tracing::warn!( "Notification queue full, dropping: {}: {}", title, message );
            }
            Err( TrySendError::Disconnected( _ ) ) => {
                tracing::warn!( "Notification worker gone, dropping: {}: {}", title, message );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::mpsc::{ Receiver, Sender };
    use std::time::Duration;


    /// Records each notification, then blocks until the gate opens.
    struct GatedNotifier {
        record: RecordingNotifier,
        started: Mutex<Sender<()>>,
        gate: Mutex<Receiver<()>>,
    }


    impl Notifier for GatedNotifier {
        fn notify( &self, title: &str, message: &str ) {
            self.record.notify( title, message );
            let _ = self.started.lock().unwrap().send(());
            let _ = self.gate.lock().unwrap().recv();
        }
    }


    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify( "a", "1" );
        notifier.notify( "b", "2" );
        assert_eq!( notifier.sent(), vec![
            ( "a".to_string(), "1".to_string() ),
            ( "b".to_string(), "2".to_string() ),
        ]);
    }


    #[test]
    fn test_queue_drops_when_full() {
        let ( started_tx, started_rx ) = mpsc::channel();
        let ( gate_tx, gate_rx ) = mpsc::channel();
        let inner = Arc::new( GatedNotifier {
            record: RecordingNotifier::new(),
            started: Mutex::new( started_tx ),
            gate: Mutex::new( gate_rx ),
        });

        let queued = QueuedNotifier::spawn( inner.clone(), 2 ).unwrap();

        // Worker picks this one up and blocks on the gate
        queued.notify( "Now Playing", "0" );
        started_rx.recv_timeout( Duration::from_secs( 2 ) ).unwrap();

        // Two fit in the queue, the rest are dropped without blocking
        for i in 1..=5 {
            queued.notify( "Now Playing", &i.to_string() );
        }

        drop( gate_tx );
        for _ in 0..200 {
            if inner.record.sent().len() >= 3 {
                break;
            }
            thread::sleep( Duration::from_millis( 10 ) );
        }
        thread::sleep( Duration::from_millis( 50 ) );

        let messages: Vec<_> = inner.record.sent().into_iter().map( |( _, m )| m ).collect();
        assert_eq!( messages, vec![ "0", "1", "2" ] );
    }


    #[test]
    fn test_queue_delivers_in_order() {
        let record = Arc::new( RecordingNotifier::new() );
        let queued = QueuedNotifier::spawn( record.clone(), 8 ).unwrap();

        queued.notify( "Now Playing", "first" );
        queued.notify( "Playback", "second" );

        for _ in 0..200 {
            if record.sent().len() == 2 {
                break;
            }
            thread::sleep( Duration::from_millis( 10 ) );
        }
        assert_eq!( record.sent(), vec![
            ( "Now Playing".to_string(), "first".to_string() ),
            ( "Playback".to_string(), "second".to_string() ),
        ]);
    }
}
