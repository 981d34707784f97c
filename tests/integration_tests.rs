//! Integration tests for the viewer, the replay server and the wire protocol
//!
//! These tests run the real components against each other over loopback TCP.

use assert_approx_eq::assert_approx_eq;
use shared::codec::{self, HEADER_LEN};
use shared::{Broadcast, LoginFailed, LoginSuccess, Message, ShotInfo, Snapshot};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;
use viewer::network::{Connector, FramedTransport, TcpConnector, Transport};
use viewer::rendering::ConsoleRenderer;
use viewer::sequencer::{PresentationSequencer, Trigger};
use viewer::session::{Session, ViewerState};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const DEADLINE: Duration = Duration::from_secs(5);

/// Blocking frame read for the hand-written test servers.
fn read_frame(stream: &mut TcpStream) -> io::Result<Message> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header)?;
    let len = codec::body_len(header).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    codec::decode_body(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_frame(stream: &mut TcpStream, message: &Message) {
    stream.write_all(&codec::encode_frame(message).unwrap()).unwrap();
}

fn game_over_broadcast() -> Message {
    Message::Broadcast(Broadcast {
        snapshot: Snapshot::at(5.0),
        shot_info: ShotInfo {
            player: "bob".to_string(),
            game_over: true,
            winner: Some("bob".to_string()),
        },
        scores: [("alice", 2), ("bob", 5)].into_iter().collect(),
    })
}

fn local_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn viewer_session(addr: SocketAddr, name: &str) -> Session<TcpConnector> {
    Session::new(
        TcpConnector::new(addr, CONNECT_TIMEOUT),
        name,
        None,
        PresentationSequencer::default(),
    )
}

/// Ticks until `done` holds, with the presentation clock pinned at zero.
fn tick_until<C: Connector>(
    session: &mut Session<C>,
    console: &mut ConsoleRenderer,
    done: impl Fn(&Session<C>) -> bool,
) {
    let started = Instant::now();
    while !done(session) {
        assert!(started.elapsed() < DEADLINE, "timed out in {:?}", session.state());
        session.tick(0.0, console);
        thread::sleep(Duration::from_millis(2));
    }
}

/// VIEWER SESSION TESTS
mod session_tests {
    use super::*;

    /// Scenario A: a fresh login is accepted and the session starts viewing
    #[test]
    fn login_success_starts_viewing() {
        let (listener, addr) = local_listener();
        let secret = Uuid::new_v4();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let login = read_frame(&mut stream).unwrap();
            write_frame(&mut stream, &Message::LoginSuccess(LoginSuccess { secret }));
            // Hold the connection until the viewer lets go.
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
            (login, rest)
        });

        let mut session = viewer_session(addr, "alice");
        let mut console = ConsoleRenderer::new();
        tick_until(&mut session, &mut console, |s| s.state() == ViewerState::Viewing);
        assert_eq!(session.secret(), Some(secret));
        drop(session);

        let (login, rest) = server.join().unwrap();
        assert_eq!(login, Message::viewer_login("alice", None));
        assert!(rest.is_empty(), "nothing may follow the login");
    }

    /// Scenario B: a rejected login closes the session and the socket
    #[test]
    fn login_failure_closes_the_socket() {
        let (listener, addr) = local_listener();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream).unwrap();
            write_frame(
                &mut stream,
                &Message::LoginFailed(LoginFailed {
                    reason: "bad secret".to_string(),
                }),
            );
            stream.set_read_timeout(Some(DEADLINE)).unwrap();
            let mut buf = [0u8; 16];
            stream.read(&mut buf)
        });

        let mut session = viewer_session(addr, "alice");
        let mut console = ConsoleRenderer::new();
        tick_until(&mut session, &mut console, |s| s.state() == ViewerState::Closed);

        // The viewer still exists, so EOF here means the socket was closed.
        let read = server.join().unwrap();
        assert_eq!(read.unwrap(), 0);
        assert!(session.tick(0.0, &mut console).is_done());
    }

    /// Scenario C: a game-over broadcast schedules its presentation triggers
    #[test]
    fn broadcast_schedules_triggers() {
        let (listener, addr) = local_listener();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream).unwrap();
            write_frame(
                &mut stream,
                &Message::LoginSuccess(LoginSuccess {
                    secret: Uuid::new_v4(),
                }),
            );
            write_frame(&mut stream, &game_over_broadcast());
            let _ = stream.read_to_end(&mut Vec::new());
        });

        let mut session = viewer_session(addr, "alice");
        let mut console = ConsoleRenderer::new();
        tick_until(&mut session, &mut console, |s| s.broadcasts_received() == 1);

        assert_approx_eq!(session.snapshot().unwrap().time(), 5.0, 1e-9);
        assert_eq!(session.active_player(), Some("bob"));

        let pending = session.sequencer().pending();
        let scores = match &pending[0].trigger {
            Trigger::UpdateScores(scores) => scores,
            other => panic!("expected a score update, got {:?}", other),
        };
        let order: Vec<(&str, i64)> = scores.iter().collect();
        assert_eq!(order, vec![("alice", 2), ("bob", 5)]);
        assert_approx_eq!(pending[0].offset, 5.0, 1e-9);

        assert_eq!(
            pending[1].trigger,
            Trigger::ShowGameOver {
                winner: Some("bob".to_string())
            }
        );
        assert_approx_eq!(pending[1].offset, 5.0, 1e-9);

        let shot = pending
            .iter()
            .find(|entry| entry.trigger == Trigger::PlayShotAnimation)
            .unwrap();
        assert_approx_eq!(shot.offset, 6.5, 1e-9);

        drop(session);
        server.join().unwrap();
    }

    /// Refuses the first `refusals` attempts, then dials for real.
    struct Flaky {
        inner: TcpConnector,
        refusals: usize,
        attempts: usize,
    }

    impl Connector for Flaky {
        type Transport = <TcpConnector as Connector>::Transport;

        fn try_connect(&mut self) -> io::Result<Self::Transport> {
            self.attempts += 1;
            if self.attempts <= self.refusals {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
            self.inner.try_connect()
        }
    }

    /// Scenario D: three refusals, then a connection with exactly one login
    #[test]
    fn connects_after_refusals() {
        let (listener, addr) = local_listener();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = vec![read_frame(&mut stream).unwrap()];
            stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
            while let Ok(message) = read_frame(&mut stream) {
                received.push(message);
            }
            received
        });

        let connector = Flaky {
            inner: TcpConnector::new(addr, CONNECT_TIMEOUT),
            refusals: 3,
            attempts: 0,
        };
        let mut session = Session::new(connector, "alice", None, PresentationSequencer::default());
        let mut console = ConsoleRenderer::new();

        for _ in 0..3 {
            session.tick(0.0, &mut console);
            assert_eq!(session.state(), ViewerState::WaitingForConnection);
        }
        session.tick(0.0, &mut console);
        assert_eq!(session.state(), ViewerState::ConnectionPending);

        for _ in 0..20 {
            session.tick(0.0, &mut console);
            thread::sleep(Duration::from_millis(2));
        }

        let received = server.join().unwrap();
        assert_eq!(received, vec![Message::viewer_login("alice", None)]);
    }

    /// Without a server the session keeps waiting
    #[test]
    fn no_server_keeps_waiting() {
        let (listener, addr) = local_listener();
        drop(listener);

        let mut session = viewer_session(addr, "alice");
        let mut console = ConsoleRenderer::new();
        for _ in 0..10 {
            assert!(!session.tick(0.0, &mut console).is_done());
            assert_eq!(session.state(), ViewerState::WaitingForConnection);
        }
    }

    /// A server hang-up while viewing ends the session, and the last shot
    /// is still presented
    #[test]
    fn server_disconnect_closes_the_session() {
        let (listener, addr) = local_listener();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream).unwrap();
            write_frame(
                &mut stream,
                &Message::LoginSuccess(LoginSuccess {
                    secret: Uuid::new_v4(),
                }),
            );
            write_frame(&mut stream, &game_over_broadcast());
        });

        let mut session = viewer_session(addr, "alice");
        let mut console = ConsoleRenderer::new();
        tick_until(&mut session, &mut console, |s| s.state() == ViewerState::Closed);
        server.join().unwrap();

        assert_eq!(session.broadcasts_received(), 1);
        assert_eq!(session.sequencer().len(), 4);

        assert!(session.tick(5.0, &mut console).is_done());
        assert_eq!(console.overlay().scores, "ALICE: 2 vs. BOB: 5");
        assert_eq!(console.overlay().banner.as_deref(), Some("GAME OVER! BOB WON!"));

        assert!(session.tick(13.0, &mut console).is_done());
        assert_eq!(console.overlay().banner, None);
        assert_eq!(console.shots_played(), 1);
        assert!(session.sequencer().is_empty());
    }
}

/// FRAMED TRANSPORT TESTS
mod transport_tests {
    use super::*;

    fn connected_pair() -> (FramedTransport<TcpStream>, TcpStream) {
        let (listener, addr) = local_listener();
        let transport = TcpConnector::new(addr, CONNECT_TIMEOUT).try_connect().unwrap();
        let (peer, _) = listener.accept().unwrap();
        peer.set_nodelay(true).unwrap();
        (transport, peer)
    }

    fn poll_until(
        transport: &mut FramedTransport<TcpStream>,
        done: impl Fn(&FramedTransport<TcpStream>) -> bool,
    ) {
        let started = Instant::now();
        while !done(transport) {
            assert!(started.elapsed() < DEADLINE, "transport never got there");
            transport.poll();
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// A frame split across two TCP segments decodes once both halves are in
    #[test]
    fn frame_split_across_polls() {
        let (mut transport, mut peer) = connected_pair();
        let frame = codec::encode_frame(&game_over_broadcast()).unwrap();
        let (head, tail) = frame.split_at(frame.len() / 2);

        peer.write_all(head).unwrap();
        poll_until(&mut transport, |t| t.buffered_recv_bytes() == head.len());
        assert_eq!(transport.pop_incoming(), None);

        peer.write_all(tail).unwrap();
        let started = Instant::now();
        let message = loop {
            transport.poll();
            if let Some(message) = transport.pop_incoming() {
                break message;
            }
            assert!(started.elapsed() < DEADLINE);
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(message, game_over_broadcast());
        assert_eq!(transport.buffered_recv_bytes(), 0);
    }

    /// Outgoing frames reach the peer intact
    #[test]
    fn pushed_messages_reach_the_peer() {
        let (mut transport, mut peer) = connected_pair();
        transport.push_outgoing(&Message::viewer_login("alice", None));
        poll_until(&mut transport, |t| t.pending_send_bytes() == 0);

        peer.set_read_timeout(Some(DEADLINE)).unwrap();
        assert_eq!(
            read_frame(&mut peer).unwrap(),
            Message::viewer_login("alice", None)
        );
    }

    /// Closure is reported once and the socket is left alone afterwards
    #[test]
    fn closure_is_reported_once() {
        let (mut transport, mut peer) = connected_pair();
        write_frame(&mut peer, &game_over_broadcast());
        drop(peer);

        poll_until(&mut transport, |t| t.is_closed());
        assert_eq!(transport.pop_incoming(), Some(game_over_broadcast()));
        assert_eq!(transport.pop_incoming(), Some(Message::ConnectionClosed));

        for _ in 0..5 {
            transport.poll();
            assert_eq!(transport.pop_incoming(), None);
        }
        assert!(transport.is_closed());
    }
}

/// REPLAY SERVER TESTS
mod replay_tests {
    use super::*;
    use server::network::{ReplayOptions, ReplayServer};
    use server::script::BroadcastScript;

    fn short_script() -> BroadcastScript {
        let shot = |t: f64, player: &str, winner: Option<&str>, bob: i64| Broadcast {
            snapshot: Snapshot::at(t),
            shot_info: ShotInfo {
                player: player.to_string(),
                game_over: winner.is_some(),
                winner: winner.map(str::to_string),
            },
            scores: [("alice", 0), ("bob", bob)].into_iter().collect(),
        };
        BroadcastScript::new(vec![
            shot(0.05, "bob", None, 0),
            shot(0.05, "bob", Some("bob"), 1),
        ])
        .unwrap()
    }

    fn start(
        script: BroadcastScript,
        interval_ms: u64,
        max_viewers: usize,
    ) -> (tokio::runtime::Runtime, SocketAddr, tokio::task::JoinHandle<()>) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let options = ReplayOptions {
            interval: Duration::from_millis(interval_ms),
            repeat: false,
            max_viewers,
        };
        let server = runtime
            .block_on(ReplayServer::bind("127.0.0.1:0".parse().unwrap(), script, options))
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = runtime.spawn(async move {
            server.run().await.unwrap();
        });
        (runtime, addr, handle)
    }

    /// A viewer follows a whole replay and is hung up on at the end
    #[test]
    fn viewer_follows_a_full_replay() {
        let (runtime, addr, handle) = start(short_script(), 50, 4);

        let mut session = viewer_session(addr, "alice");
        let mut console = ConsoleRenderer::new();
        let started = Instant::now();
        while !session
            .tick(started.elapsed().as_secs_f64(), &mut console)
            .is_done()
        {
            assert!(started.elapsed() < DEADLINE, "replay never finished");
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(session.state(), ViewerState::Closed);
        assert_eq!(session.broadcasts_received(), 2);
        assert_eq!(console.snapshots(), 2);
        assert_eq!(console.overlay().turn, "Active player: BOB");

        runtime.block_on(handle).unwrap();
    }

    /// A second viewer cannot take a name that is already registered
    #[test]
    fn taken_name_is_rejected() {
        let (runtime, addr, handle) = start(short_script(), 300, 4);
        let mut console = ConsoleRenderer::new();

        let mut first = viewer_session(addr, "alice");
        tick_until(&mut first, &mut console, |s| s.state() == ViewerState::Viewing);

        let mut second = viewer_session(addr, "alice");
        tick_until(&mut second, &mut console, |s| s.state() == ViewerState::Closed);
        assert_eq!(second.secret(), None);

        tick_until(&mut first, &mut console, |s| s.state() == ViewerState::Closed);
        runtime.block_on(handle).unwrap();
    }

    /// A registered secret reclaims the name
    #[test]
    fn secret_reclaims_the_name() {
        let (runtime, addr, handle) = start(short_script(), 300, 1);
        let mut console = ConsoleRenderer::new();

        let mut first = viewer_session(addr, "alice");
        tick_until(&mut first, &mut console, |s| s.state() == ViewerState::Viewing);
        let secret = first.secret();
        drop(first);

        let mut again = Session::new(
            TcpConnector::new(addr, CONNECT_TIMEOUT),
            "alice",
            secret,
            PresentationSequencer::default(),
        );
        tick_until(&mut again, &mut console, |s| s.state() == ViewerState::Viewing);
        assert_eq!(again.secret(), secret);

        tick_until(&mut again, &mut console, |s| s.state() == ViewerState::Closed);
        runtime.block_on(handle).unwrap();
    }
}
