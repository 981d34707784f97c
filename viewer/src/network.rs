//! Non-blocking framed transport over a byte stream, and the connector that
//! produces one from a TCP address.

use log::{debug, error, warn};
use shared::codec::{decode_frame, encode_frame, Decoded};
use shared::Message;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Bytes attempted per read and per write in a single `poll`.
pub const IO_CHUNK: usize = 4096;

/// Message pipe the session drives once per tick.
pub trait Transport {
    /// Queues a message for sending. Never blocks.
    fn push_outgoing(&mut self, message: &Message);

    /// Performs at most one read and one write on the stream and decodes
    /// whatever complete frames are buffered.
    fn poll(&mut self);

    fn pop_incoming(&mut self) -> Option<Message>;

    fn is_closed(&self) -> bool;

    /// Releases the underlying stream without reporting a `ConnectionClosed`.
    fn close(&mut self);
}

/// Opens transports. Every error is treated as "try again next tick".
pub trait Connector {
    type Transport: Transport;

    fn try_connect(&mut self) -> io::Result<Self::Transport>;
}

pub struct FramedTransport<S> {
    stream: Option<S>,
    recv_buffer: Vec<u8>,
    send_buffer: Vec<u8>,
    incoming: VecDeque<Message>,
}

impl<S: Read + Write> FramedTransport<S> {
    /// The stream must already be in non-blocking mode.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            recv_buffer: Vec::new(),
            send_buffer: Vec::new(),
            incoming: VecDeque::new(),
        }
    }

    pub fn pending_send_bytes(&self) -> usize {
        self.send_buffer.len()
    }

    pub fn buffered_recv_bytes(&self) -> usize {
        self.recv_buffer.len()
    }

    /// Returns false once the stream has hit EOF or a hard error.
    fn read_once(&mut self, stream: &mut S) -> bool {
        let mut chunk = [0u8; IO_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => {
                debug!("Stream reached end of file");
                false
            }
            Ok(len) => {
                self.recv_buffer.extend_from_slice(&chunk[..len]);
                true
            }
            Err(e) if is_transient(&e) => true,
            Err(e) => {
                warn!("Error reading from stream: {}", e);
                false
            }
        }
    }

    fn write_once(&mut self, stream: &mut S) -> bool {
        if self.send_buffer.is_empty() {
            return true;
        }

        let end = self.send_buffer.len().min(IO_CHUNK);
        match stream.write(&self.send_buffer[..end]) {
            Ok(0) => {
                warn!("Stream accepted no bytes, treating it as closed");
                false
            }
            Ok(sent) => {
                self.send_buffer.drain(..sent);
                true
            }
            Err(e) if is_transient(&e) => true,
            Err(e) => {
                warn!("Error writing to stream: {}", e);
                false
            }
        }
    }

    /// Moves every complete frame from the receive buffer into the incoming
    /// queue. Returns false if the stream can no longer be trusted or the
    /// peer sent `ConnectionClosed`; anything after that frame is dropped.
    fn decode_buffered(&mut self) -> bool {
        let mut offset = 0;
        let mut in_sync = true;

        loop {
            match decode_frame(&self.recv_buffer[offset..]) {
                Decoded::Incomplete => break,
                Decoded::Complete {
                    message: Message::ConnectionClosed,
                    ..
                } => {
                    debug!("Peer closed the connection");
                    in_sync = false;
                    offset = self.recv_buffer.len();
                    break;
                }
                Decoded::Complete { message, consumed } => {
                    self.incoming.push_back(message);
                    offset += consumed;
                }
                Decoded::Malformed { consumed, error } => {
                    warn!("Skipping malformed frame of {} bytes: {}", consumed, error);
                    offset += consumed;
                }
                Decoded::Unrecoverable(error) => {
                    error!("Lost frame synchronisation: {}", error);
                    in_sync = false;
                    offset = self.recv_buffer.len();
                    break;
                }
            }
        }

        self.recv_buffer.drain(..offset);
        in_sync
    }

    fn shut_down(&mut self) {
        if self.stream.take().is_some() {
            self.send_buffer.clear();
            self.recv_buffer.clear();
            self.incoming.push_back(Message::ConnectionClosed);
        }
    }
}

impl<S: Read + Write> Transport for FramedTransport<S> {
    fn push_outgoing(&mut self, message: &Message) {
        if self.stream.is_none() {
            debug!("Dropping {:?} queued on a closed transport", message.code());
            return;
        }

        match encode_frame(message) {
            Ok(frame) => self.send_buffer.extend(frame),
            Err(e) => error!("Failed to encode {:?}: {}", message.code(), e),
        }
    }

    fn poll(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        let mut alive = self.read_once(&mut stream);
        if alive {
            alive = self.write_once(&mut stream);
        }
        self.stream = Some(stream);

        let in_sync = self.decode_buffered();
        if !alive || !in_sync {
            self.shut_down();
        }
    }

    fn pop_incoming(&mut self) -> Option<Message> {
        self.incoming.pop_front()
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closing connection");
        }
        self.send_buffer.clear();
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Connects over TCP with a short timeout so a tick never stalls for long.
pub struct TcpConnector {
    address: SocketAddr,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: SocketAddr, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl Connector for TcpConnector {
    type Transport = FramedTransport<TcpStream>;

    fn try_connect(&mut self) -> io::Result<Self::Transport> {
        let stream = TcpStream::connect_timeout(&self.address, self.timeout)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(FramedTransport::new(stream))
    }
}
