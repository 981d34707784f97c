//! Server network layer: TCP accept loop, login handshake and broadcast fan-out

use crate::registry::{LoginError, Registry};
use crate::script::BroadcastScript;
use log::{debug, error, info, warn};
use shared::codec::{self, CodecError, HEADER_LEN};
use shared::{LoginFailed, LoginSuccess, Message};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch, Notify, RwLock};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Encoded Broadcast frames waiting for slow viewers before they start
/// skipping.
const FRAME_BACKLOG: usize = 64;
/// How long a fresh connection gets to send its login.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

type Frame = Arc<Vec<u8>>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("server task failed: {0}")]
    Task(#[from] JoinError),
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub interval: Duration,
    pub repeat: bool,
    pub max_viewers: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            repeat: false,
            max_viewers: 8,
        }
    }
}

/// State shared by the accept loop and every connection task
#[derive(Clone)]
struct Shared {
    registry: Arc<RwLock<Registry>>,
    first_login: Arc<Notify>,
}

/// Replays a script of broadcasts to every viewer that logs in
pub struct ReplayServer {
    listener: TcpListener,
    script: BroadcastScript,
    options: ReplayOptions,
    shared: Shared,
}

impl ReplayServer {
    pub async fn bind(
        addr: SocketAddr,
        script: BroadcastScript,
        options: ReplayOptions,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let shared = Shared {
            registry: Arc::new(RwLock::new(Registry::new(options.max_viewers))),
            first_login: Arc::new(Notify::new()),
        };

        Ok(Self {
            listener,
            script,
            options,
            shared,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts viewers, waits for the first login and then plays the script.
    /// Returns once the script has finished and every connection is closed;
    /// with `repeat` set it only returns on error.
    pub async fn run(self) -> Result<(), ServerError> {
        let ReplayServer {
            listener,
            script,
            options,
            shared,
        } = self;

        let (frames, _) = broadcast::channel::<Frame>(FRAME_BACKLOG);
        let (stop_tx, stop_rx) = watch::channel(false);
        let acceptor = tokio::spawn(accept_loop(
            listener,
            shared.clone(),
            frames.clone(),
            stop_rx,
        ));

        shared.first_login.notified().await;
        info!("First viewer logged in, starting replay of {} shots", script.len());

        let replayed = replay(&script, &options, &frames).await;
        drop(frames);
        // The acceptor may already be gone if it failed; its result is
        // reported below.
        let _ = stop_tx.send(true);
        acceptor.await??;
        replayed
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Shared,
    frames: broadcast::Sender<Frame>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Cannot disable Nagle for {}: {}", peer, e);
                }
                debug!("Connection from {}", peer);

                let shared = shared.clone();
                let frames = frames.clone();
                connections.spawn(async move {
                    if let Err(e) = serve_connection(stream, peer, shared, frames).await {
                        error!("Connection {} failed: {}", peer, e);
                    }
                });
            }
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    error!("Connection task panicked: {}", e);
                }
            }
        }
    }

    drop(frames);
    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            error!("Connection task panicked: {}", e);
        }
    }
    Ok(())
}

async fn replay(
    script: &BroadcastScript,
    options: &ReplayOptions,
    frames: &broadcast::Sender<Frame>,
) -> Result<(), ServerError> {
    let encoded = script
        .broadcasts()
        .iter()
        .map(|broadcast| codec::encode_frame(&Message::Broadcast(broadcast.clone())).map(Arc::new))
        .collect::<Result<Vec<Frame>, CodecError>>()?;

    let mut ticker = interval(options.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        for (index, frame) in encoded.iter().enumerate() {
            ticker.tick().await;
            let viewers = frames.send(Arc::clone(frame)).unwrap_or(0);
            debug!("Shot {} sent to {} viewers", index + 1, viewers);
        }
        if !options.repeat {
            break;
        }
        info!("Replay finished, starting over");
    }

    // Give viewers one interval with the final shot before hanging up.
    ticker.tick().await;
    info!("Replay finished");
    Ok(())
}

/// Handles one connection from the first byte to the close.
///
/// The first frame must be a Login. Anything else ends the connection
/// without a reply. A rejected login is answered with its reason and the
/// connection closed; an accepted one receives every broadcast frame until
/// the peer hangs up or the replay ends.
async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    shared: Shared,
    frames: broadcast::Sender<Frame>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let first = match timeout(LOGIN_TIMEOUT, read_message(&mut reader)).await {
        Ok(first) => first?,
        Err(_) => {
            info!("{} sent no login, closing", peer);
            return Ok(());
        }
    };

    let login = match first {
        Some(Message::Login(login)) => login,
        Some(other) => {
            warn!("{} opened with {:?} instead of a login", peer, other.code());
            return Ok(());
        }
        None => {
            debug!("{} left before logging in", peer);
            return Ok(());
        }
    };

    let verdict = shared.registry.write().await.login(&login);
    let secret = match verdict {
        Ok(secret) => secret,
        Err(reason) => {
            reject(&mut writer, peer, &login.name, reason).await?;
            return Ok(());
        }
    };

    let mut updates = frames.subscribe();
    drop(frames);
    write_message(&mut writer, &Message::LoginSuccess(LoginSuccess { secret })).await?;
    info!("{} is watching from {}", login.name, peer);
    shared.first_login.notify_one();

    let mut scratch = [0u8; 256];
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(frame) => {
                    writer.write_all(&frame).await?;
                    writer.flush().await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{} fell behind, skipped {} shots", login.name, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    write_message(&mut writer, &Message::ConnectionClosed).await?;
                    writer.shutdown().await?;
                    info!("Closed connection to {}", login.name);
                    return Ok(());
                }
            },
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    info!("{} disconnected", login.name);
                    return Ok(());
                }
                Ok(n) => debug!("Ignoring {} bytes from {}", n, login.name),
            },
        }
    }
}

async fn reject<W: AsyncWrite + Unpin>(
    writer: &mut W,
    peer: SocketAddr,
    name: &str,
    reason: LoginError,
) -> Result<(), ServerError> {
    warn!("Rejected login of {} from {}: {}", name, peer, reason);
    let reply = Message::LoginFailed(LoginFailed {
        reason: reason.to_string(),
    });
    write_message(writer, &reply).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Reads one frame. `None` means the peer closed the stream before a frame
/// started.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Message>, ServerError> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = codec::body_len(header)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(codec::decode_body(&body)?))
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), ServerError> {
    let frame = codec::encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
