use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::IpAddr;
use std::path::Path;

use tungstenite::{protocol::Role, Message, WebSocket};

use super::{http, Disconnection, Response};
use crate::prelude::*;

enum Conn {
    /// Accumulating the HTTP request head.
    Http { stream: TcpStream, head: Vec<u8> },
    /// Sending the reply to that head. Upgrades become `Open` once it is out,
    /// anything else is closed.
    Replying {
        stream: TcpStream,
        reply: Vec<u8>,
        cursor: usize,
        upgrade: bool,
        /// Bytes that arrived after the head.
        rest: Vec<u8>,
    },
    Open(WebSocket<TcpStream>),
    Closed,
}

/// What the network has to do with the world after a client made progress.
#[derive(Debug)]
pub(super) enum Progress {
    Idle,
    /// The upgrade finished; the client is now a session.
    Opened,
    /// Text frames received, in order. `false` if the peer is gone after them.
    Messages(Vec<String>, bool),
}

#[derive(Debug)]
pub(super) struct Inbox<'a>(&'a mut Client);
impl Inbox<'_> {
    pub(super) fn submit(&mut self, response: Response) {
        self.0.queue.push_back(response);
        self.0.waiting_for_write = true;
    }
}

pub struct Client {
    conn: Conn,
    origin: IpAddr,
    queue: VecDeque<Response>,

    pub(super) waiting_for_write: bool,
}
impl Client {
    pub fn accept(stream: TcpStream, origin: IpAddr) -> Self {
        Self {
            conn: Conn::Http { stream, head: vec![] },
            origin,
            queue: VecDeque::new(),
            waiting_for_write: false,
        }
    }
    pub(super) fn origin(&self) -> IpAddr {
        self.origin
    }
    pub(super) fn conn(&self) -> Option<&TcpStream> {
        match &self.conn {
            Conn::Http { stream, .. } | Conn::Replying { stream, .. } => Some(stream),
            Conn::Open(ws) => Some(ws.get_ref()),
            Conn::Closed => None,
        }
    }
    pub(super) fn inbox(&mut self) -> Inbox<'_> {
        Inbox(self)
    }
    /// Readiness this client should be polled for next.
    pub(super) fn interest(&self, key: usize) -> polling::Event {
        match &self.conn {
            Conn::Replying { .. } => polling::Event::writable(key),
            Conn::Open(_) if self.waiting_for_write => polling::Event::all(key),
            _ => polling::Event::readable(key),
        }
    }

    pub(super) fn on_readable(&mut self, page: &Path) -> Result<Progress, Disconnection> {
        match &mut self.conn {
            Conn::Http { stream, head } => {
                let mut buf = [0; 1024];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) => return Err(Disconnection::new()),
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(_) => return Err(Disconnection::new()),
                    }
                    if head.len() > http::MAX_HEAD {
                        log::debug!("request head from {} too long", self.origin);
                        return Err(Disconnection::new());
                    }
                }
                let parsed = http::RequestHead::parse(head).map_err(|e| {
                    log::debug!("bad request head from {}: {e}", self.origin);
                    Disconnection::new()
                })?;
                let Some((request, len)) = parsed else { return Ok(Progress::Idle) };
                let (reply, upgrade) = match request.websocket_key() {
                    Some(key) => (http::upgrade_reply(key), true),
                    None => {
                        log::debug!("{} {} from {}", request.method, request.path, self.origin);
                        (http::page_reply(&request, page), false)
                    }
                };
                let Conn::Http { stream, mut head } = core::mem::replace(&mut self.conn, Conn::Closed) else {
                    unreachable!()
                };
                let rest = head.split_off(len);
                self.conn = Conn::Replying { stream, reply, cursor: 0, upgrade, rest };
                self.send_reply()
            }
            // nothing more is read until the reply is out
            Conn::Replying { .. } => Ok(Progress::Idle),
            Conn::Open(ws) => {
                let mut texts = vec![];
                let open = loop {
                    match ws.read() {
                        Ok(Message::Text(text)) => texts.push(text),
                        Ok(Message::Binary(bytes)) => {
                            log::debug!("ignoring {} byte binary frame from {}", bytes.len(), self.origin)
                        }
                        // pings are answered by tungstenite itself, closes surface as errors
                        Ok(_) => {}
                        Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => break true,
                        Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break false,
                        Err(e) => {
                            log::debug!("websocket error from {}: {e}", self.origin);
                            break false;
                        }
                    }
                };
                // a pong or close reply may be sitting in the buffer
                self.waiting_for_write = true;
                if !open {
                    self.conn = Conn::Closed;
                }
                Ok(Progress::Messages(texts, open))
            }
            Conn::Closed => Err(Disconnection::new()),
        }
    }

    pub(super) fn on_writable(&mut self) -> Result<Progress, Disconnection> {
        match self.conn {
            Conn::Replying { .. } => self.send_reply(),
            Conn::Open(_) => self.flush().map(|()| Progress::Idle),
            Conn::Http { .. } => Ok(Progress::Idle),
            Conn::Closed => Err(Disconnection::new()),
        }
    }

    fn send_reply(&mut self) -> Result<Progress, Disconnection> {
        let Conn::Replying { stream, reply, cursor, upgrade, .. } = &mut self.conn else {
            return Ok(Progress::Idle);
        };
        while *cursor < reply.len() {
            match stream.write(&reply[*cursor..]) {
                Ok(0) => return Err(Disconnection::new()),
                Ok(n) => *cursor += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Progress::Idle),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return Err(Disconnection::new()),
            }
        }
        if !*upgrade {
            // plain HTTP: one request per connection
            return Err(Disconnection::new());
        }
        let Conn::Replying { stream, rest, .. } = core::mem::replace(&mut self.conn, Conn::Closed) else {
            unreachable!()
        };
        self.conn = Conn::Open(WebSocket::from_partially_read(stream, rest, Role::Server, None));
        Ok(Progress::Opened)
    }

    /// Pushes queued responses into the socket. Leaves `waiting_for_write`
    /// set if the socket couldn't take everything.
    pub(super) fn flush(&mut self) -> Result<(), Disconnection> {
        let Conn::Open(ws) = &mut self.conn else {
            self.queue.clear();
            self.waiting_for_write = false;
            return Ok(());
        };
        while let Some(response) = self.queue.pop_front() {
            log::trace!("sending {response:?} to {}", self.origin);
            match ws.write(Message::Text(response.to_json())) {
                Ok(()) => {}
                // the frame is kept in tungstenite's buffer
                Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::debug!("failed to write to {}: {e}", self.origin);
                    return Err(Disconnection::new());
                }
            }
        }
        match ws.flush() {
            Ok(()) => {
                self.waiting_for_write = false;
                Ok(())
            }
            Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                self.waiting_for_write = true;
                Ok(())
            }
            Err(tungstenite::Error::ConnectionClosed) => Err(Disconnection::new()),
            Err(e) => {
                log::debug!("failed to flush to {}: {e}", self.origin);
                Err(Disconnection::new())
            }
        }
    }

    /// Starts the closing handshake and pushes out what it can.
    pub(super) fn close(&mut self) {
        if let Conn::Open(ws) = &mut self.conn {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
    }
}
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.conn {
            Conn::Http { .. } => "http",
            Conn::Replying { .. } => "replying",
            Conn::Open(_) => "open",
            Conn::Closed => "closed",
        };
        f.debug_struct("Client")
            .field("origin", &self.origin)
            .field("state", &state)
            .field("queued", &self.queue.len())
            .finish()
    }
}
