//! Loopback TCP control server
//!
//! One accept loop hands each client to its own task. A task reads up to
//! `READ_BUFFER_SIZE` bytes at a time and dispatches each read, trimmed, as
//! a single command until the client disconnects or sends `exit`. There is
//! no framing beyond the read boundary. Nothing is written back.

use std::future::Future;
use std::io;
use std::net::{ Ipv4Addr, SocketAddr, SocketAddrV4 };
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{ TcpListener, TcpStream };
use tokio::sync::{ OwnedSemaphorePermit, Semaphore };
use tokio::task::JoinSet;

use crate::command::{ Dispatcher, Flow };
use crate::context::ServerContext;


/// Default control address.
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::V4( SocketAddrV4::new( Ipv4Addr::LOCALHOST, 65432 ) );

/// Largest chunk read from a client at once.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Default cap on simultaneously served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 32;


/// Errors that stop the server.
#[derive( Debug, Error )]
pub enum ServerError {
    #[error( "Refusing to listen on non-loopback address {0}" )]
    NotLoopback( SocketAddr ),

    #[error( "Failed to bind {addr}: {source}" )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error( "Accept failed: {0}" )]
    Accept( #[source] io::Error ),
}


/// Server settings.
#[derive( Debug, Clone )]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Connections beyond this wait in the OS backlog until a slot frees up.
    pub max_connections: usize,
    /// Close a connection that sends nothing for this long. None never times out.
    pub idle_timeout: Option<Duration>,
}


impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: None,
        }
    }
}


/// Bound control server, ready to run.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    context: Arc<ServerContext>,
    slots: Arc<Semaphore>,
}


impl Server {
    /// Binds the listening socket. Only loopback addresses are accepted.
    pub async fn bind( config: ServerConfig, context: Arc<ServerContext> ) -> Result<Self, ServerError> {
        if !config.addr.ip().is_loopback() {
            return Err( ServerError::NotLoopback( config.addr ) );
        }

        let listener = TcpListener::bind( config.addr ).await
            .map_err( |source| ServerError::Bind { addr: config.addr, source } )?;

        let slots = Arc::new( Semaphore::new( config.max_connections.max( 1 ) ) );

        Ok( Self { listener, config, context, slots } )
    }


    /// Gets the address actually bound (useful with port 0).
    pub fn local_addr( &self ) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }


    /// Accepts connections until `shutdown` resolves or accepting fails.
    ///
    /// Open connections are abandoned on return and playback is stopped.
    pub async fn run<F>( self, shutdown: F ) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let dispatcher = Dispatcher::new( Arc::clone( &self.context ) );
        let mut connections = JoinSet::new();
        tokio::pin!( shutdown );

        match self.local_addr() {
            Ok( addr ) => tracing::info!( "Server listening on {}", addr ),
            Err( _ ) => tracing::info!( "Server listening on {}", self.config.addr ),
        }
        let playlist = self.context.playlist();
        tracing::info!(
            "Serving {} tracks from {:?} ({:?} at the ends)",
            playlist.len(),
            playlist.dir(),
            self.context.player.policy(),
        );

        let result = loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                permit = Arc::clone( &self.slots ).acquire_owned() => match permit {
                    Ok( p ) => p,
                    Err( _ ) => break Ok(()),
                },
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok(( stream, peer )) => {
                    tracing::info!( "Connection from {}", peer );
                    let connection = Connection {
                        stream,
                        peer,
                        dispatcher: dispatcher.clone(),
                        idle_timeout: self.config.idle_timeout,
                        _permit: permit,
                    };
                    connections.spawn( connection.run() );
                }
                Err( e ) if is_transient( &e ) => {
                    tracing::warn!( "Accept failed, continuing: {}", e );
                }
                Err( e ) => break Err( ServerError::Accept( e ) ),
            }

            while connections.try_join_next().is_some() {}
        };

        while connections.try_join_next().is_some() {}
        if connections.is_empty() {
            tracing::info!( "Server shutting down" );
        } else {
            tracing::warn!( "Server shutting down, abandoning {} open connection(s)", connections.len() );
        }
        connections.abort_all();

        self.context.player.stop();
        result
    }
}


/// Accept errors that only affect the connection being accepted.
fn is_transient( e: &io::Error ) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}


/// One client connection.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    idle_timeout: Option<Duration>,
    // Held until the connection ends
    _permit: OwnedSemaphorePermit,
}


impl Connection {
    async fn run( mut self ) {
        let mut buf = [ 0u8; READ_BUFFER_SIZE ];

        loop {
            let n = match self.read( &mut buf ).await {
                Some( Ok( 0 ) ) => break,
                Some( Ok( n ) ) => n,
                Some( Err( e ) ) => {
                    tracing::warn!( "Connection {} failed: {}", self.peer, e );
                    break;
                }
                None => {
                    tracing::info!( "Connection {} idle, closing", self.peer );
                    break;
                }
            };

            let text = String::from_utf8_lossy( &buf[ ..n ] );
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if self.dispatcher.dispatch( text ) == Flow::Close {
                break;
            }
        }

        tracing::info!( "Connection {} closed", self.peer );
    }


    /// Reads the next chunk. None means the idle timeout expired.
    async fn read( &mut self, buf: &mut [u8] ) -> Option<io::Result<usize>> {
        match self.idle_timeout {
            Some( limit ) => tokio::time::timeout( limit, self.stream.read( buf ) ).await.ok(),
            None => Some( self.stream.read( buf ).await ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    use crate::command::{ NOW_PLAYING_TITLE, NO_TRACK_MESSAGE };
    use crate::notifier::RecordingNotifier;
    use crate::player::tests::{ playlist, RecordingOutput };
    use crate::player::{ BoundaryPolicy, PlaybackState, Player };


    struct Harness {
        addr: SocketAddr,
        player: Arc<Player>,
        notifier: Arc<RecordingNotifier>,
        shutdown: Option<oneshot::Sender<()>>,
        task: JoinHandle<Result<(), ServerError>>,
    }


    async fn start( tracks: usize, config: ServerConfig ) -> Harness {
        let player = Arc::new( Player::new(
            playlist( tracks ),
            Box::new( RecordingOutput::default() ),
            BoundaryPolicy::Wrap,
        ));
        let notifier = Arc::new( RecordingNotifier::new() );
        let context = Arc::new( ServerContext::new( Arc::clone( &player ), notifier.clone() ) );

        let config = ServerConfig { addr: "127.0.0.1:0".parse().unwrap(), ..config };
        let server = Server::bind( config, context ).await.unwrap();
        let addr = server.local_addr().unwrap();

        let ( tx, rx ) = oneshot::channel::<()>();
        let task = tokio::spawn( server.run( async move { let _ = rx.await; } ) );

        Harness { addr, player, notifier, shutdown: Some( tx ), task }
    }


    async fn wait_until( mut check: impl FnMut() -> bool ) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep( Duration::from_millis( 10 ) ).await;
        }
        panic!( "condition not reached in time" );
    }


    async fn send( stream: &mut TcpStream, text: &str ) {
        stream.write_all( text.as_bytes() ).await.unwrap();
    }


    /// Sends `text` on its own connection and waits until the server has
    /// handled it and closed the connection.
    async fn send_alone( addr: SocketAddr, text: &str ) {
        let mut stream = TcpStream::connect( addr ).await.unwrap();
        send( &mut stream, text ).await;
        stream.shutdown().await.unwrap();
        expect_closed( &mut stream ).await;
    }


    async fn expect_closed( stream: &mut TcpStream ) {
        let mut buf = [ 0u8; 16 ];
        let n = tokio::time::timeout( Duration::from_secs( 2 ), stream.read( &mut buf ) )
            .await
            .expect( "connection was not closed" )
            .unwrap_or( 0 );
        assert_eq!( n, 0 );
    }


    #[tokio::test]
    async fn test_play_toggle_over_socket() {
        let h = start( 4, ServerConfig::default() ).await;
        let mut client = TcpStream::connect( h.addr ).await.unwrap();

        send( &mut client, "play\n" ).await;
        wait_until( || matches!( h.player.state(), PlaybackState::Playing( _ ) ) ).await;
        let index = h.player.state().index().unwrap();

        send( &mut client, "pause\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Paused( index ) ).await;

        send( &mut client, "play\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( index ) ).await;
    }


    #[tokio::test]
    async fn test_argument_is_unrecognized() {
        let h = start( 4, ServerConfig::default() ).await;

        send_alone( h.addr, "next 3\n" ).await;
        assert_eq!( h.player.state(), PlaybackState::Stopped );

        send_alone( h.addr, "play now\n" ).await;
        send_alone( h.addr, "next\nnext\n" ).await;
        assert_eq!( h.player.state(), PlaybackState::Stopped );
    }


    #[tokio::test]
    async fn test_surrounding_whitespace_is_trimmed() {
        let h = start( 4, ServerConfig::default() ).await;

        send_alone( h.addr, "  next \r\n" ).await;
        assert_eq!( h.player.state(), PlaybackState::Playing( 0 ) );
    }


    #[tokio::test]
    async fn test_unknown_is_ignored() {
        let h = start( 4, ServerConfig::default() ).await;

        send_alone( h.addr, "Play\n" ).await;
        send_alone( h.addr, "title\n" ).await;

        assert_eq!( h.player.state(), PlaybackState::Stopped );
        assert_eq!( h.notifier.sent()[ 0 ], ( NOW_PLAYING_TITLE.to_string(), NO_TRACK_MESSAGE.to_string() ) );
    }


    #[tokio::test]
    async fn test_title_names_track() {
        let h = start( 4, ServerConfig::default() ).await;

        send_alone( h.addr, "next\n" ).await;
        send_alone( h.addr, "title\n" ).await;
        assert_eq!( h.notifier.sent()[ 0 ], ( NOW_PLAYING_TITLE.to_string(), "00".to_string() ) );
    }


    #[tokio::test]
    async fn test_exit_closes_only_that_connection() {
        let h = start( 4, ServerConfig::default() ).await;
        let mut first = TcpStream::connect( h.addr ).await.unwrap();
        let mut second = TcpStream::connect( h.addr ).await.unwrap();

        send( &mut first, "next\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( 0 ) ).await;

        send( &mut first, "exit\n" ).await;
        expect_closed( &mut first ).await;
        assert_eq!( h.player.state(), PlaybackState::Stopped );

        send( &mut second, "next\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( 0 ) ).await;

        let mut third = TcpStream::connect( h.addr ).await.unwrap();
        send( &mut third, "next\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( 1 ) ).await;
    }


    #[tokio::test]
    async fn test_exit_with_trailing_text_is_unrecognized() {
        let h = start( 4, ServerConfig::default() ).await;

        send_alone( h.addr, "next\n" ).await;
        send_alone( h.addr, "exit next\n" ).await;
        assert_eq!( h.player.state(), PlaybackState::Playing( 0 ) );
    }


    #[tokio::test( flavor = "multi_thread", worker_threads = 4 )]
    async fn test_concurrent_clients_keep_state_valid() {
        let h = start( 3, ServerConfig::default() ).await;

        let mut clients = Vec::new();
        for words in [ [ "next", "prev", "stop" ], [ "prev", "stop", "next" ] ] {
            let addr = h.addr;
            clients.push( tokio::spawn( async move {
                for i in 0..30 {
                    send_alone( addr, words[ i % 3 ] ).await;
                }
                send_alone( addr, "title" ).await;
            }));
        }

        for client in clients {
            client.await.unwrap();
        }

        assert_eq!( h.notifier.sent().len(), 2 );

        match h.player.state() {
            PlaybackState::Stopped => assert!( h.player.current_track().is_none() ),
            state => {
                assert!( state.index().unwrap() < 3 );
                assert!( h.player.current_track().is_some() );
            }
        }
    }


    #[tokio::test]
    async fn test_connection_cap_queues_clients() {
        let config = ServerConfig { max_connections: 1, ..ServerConfig::default() };
        let h = start( 4, config ).await;

        let mut first = TcpStream::connect( h.addr ).await.unwrap();
        send( &mut first, "next\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( 0 ) ).await;

        let mut second = TcpStream::connect( h.addr ).await.unwrap();
        send( &mut second, "next\n" ).await;
        tokio::time::sleep( Duration::from_millis( 200 ) ).await;
        assert_eq!( h.player.state(), PlaybackState::Playing( 0 ) );

        drop( first );
        wait_until( || h.player.state() == PlaybackState::Playing( 1 ) ).await;
    }


    #[tokio::test]
    async fn test_idle_timeout_closes_connection() {
        let config = ServerConfig {
            idle_timeout: Some( Duration::from_millis( 100 ) ),
            ..ServerConfig::default()
        };
        let h = start( 2, config ).await;

        let mut client = TcpStream::connect( h.addr ).await.unwrap();
        expect_closed( &mut client ).await;

        let mut again = TcpStream::connect( h.addr ).await.unwrap();
        send( &mut again, "next\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( 0 ) ).await;
    }


    #[tokio::test]
    async fn test_shutdown_stops_playback() {
        let mut h = start( 2, ServerConfig::default() ).await;
        let mut client = TcpStream::connect( h.addr ).await.unwrap();

        send( &mut client, "next\n" ).await;
        wait_until( || h.player.state() == PlaybackState::Playing( 0 ) ).await;

        h.shutdown.take().unwrap().send(()).unwrap();
        let result = ( &mut h.task ).await.unwrap();
        assert!( result.is_ok() );
        assert_eq!( h.player.state(), PlaybackState::Stopped );
    }


    #[tokio::test]
    async fn test_rejects_non_loopback() {
        let player = Arc::new( Player::new(
            playlist( 1 ),
            Box::new( RecordingOutput::default() ),
            BoundaryPolicy::Wrap,
        ));
        let context = Arc::new( ServerContext::new( player, Arc::new( RecordingNotifier::new() ) ) );
        let config = ServerConfig { addr: "0.0.0.0:0".parse().unwrap(), ..ServerConfig::default() };

        let result = Server::bind( config, context ).await;
        assert!( matches!( result, Err( ServerError::NotLoopback( _ ) ) ) );
    }
}
