use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::prelude::*;

mod client;
mod http;
mod inboxes;
pub mod request;
pub mod response;

pub use inboxes::Inboxes;
pub use request::{Bounds, Request};
pub use response::{Response, StatsReport};

use client::{Client, Progress};

/// Where the world sends what it has to say to a session.
pub trait Outbox {
    fn submit(&mut self, session: SessionId, response: Response);
}

#[cfg(test)]
impl Outbox for Vec<(SessionId, Response)> {
    fn submit(&mut self, session: SessionId, response: Response) {
        self.push((session, response));
    }
}

/// The client went away, or broke the protocol badly enough that it should.
#[derive(Debug)]
pub struct Disconnection(());
impl Disconnection {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

#[derive(Debug)]
pub struct Network {
    listener: std::net::TcpListener,
    page: PathBuf,

    poller: Arc<polling::Poller>,
    events: Vec<polling::Event>,

    clients: SlotMap<Client>,
}

const LISTENER: usize = usize::MAX - 1;
impl Network {
    pub fn new(config: &Config) -> io::Result<Self> {
        let poller = polling::Poller::new()?;

        let listener = std::net::TcpListener::bind(config.listen)?;
        listener.set_nonblocking(true)?;
        poller.add(&listener, polling::Event::readable(LISTENER))?;
        log::info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            page: config.page.clone(),

            poller: Arc::new(poller),
            events: vec![],

            clients: SlotMap::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Wakes the loop from another thread, cutting the current wait short.
    pub fn notifier(&self) -> Arc<polling::Poller> {
        Arc::clone(&self.poller)
    }

    pub fn process_packets_until(&mut self, deadline: time::Instant, world: &mut crate::World) {
        loop {
            let timeout = deadline.saturating_duration_since(time::Instant::now());
            match self.poller.wait(&mut self.events, Some(timeout)) {
                Ok(0) => return,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::error!("unexpected error while waiting for clients: {e}");
                    return;
                }
            }
            let events = core::mem::take(&mut self.events);
            for event in &events {
                if event.key == LISTENER {
                    if let Err(e) = self.poller.modify(&self.listener, polling::Event::readable(LISTENER)) {
                        log::error!("unable to listen for new clients: {e}");
                    }
                    self.accept_clients();
                } else {
                    self.service(*event, world);
                }
            }
            self.events = events;
            self.events.clear();
            self.flush_pending(world);
            if time::Instant::now() >= deadline {
                return;
            }
        }
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("failed to accept a connection: {e}");
                    break;
                }
                Ok((conn, addr)) => {
                    let key = self.clients.next_idx();
                    if let Err(e) = conn
                        .set_nonblocking(true)
                        .and_then(|()| self.poller.add(&conn, polling::Event::readable(key)))
                    {
                        log::warn!("dropping connection from {addr}: {e}");
                        continue;
                    }
                    let idx = self.clients.insert(Client::accept(conn, addr.ip()));
                    log::debug!("new connection from {addr} as {idx} ({} open)", self.clients.len());
                }
            }
        }
    }

    fn service(&mut self, event: polling::Event, world: &mut crate::World) {
        let key = event.key;
        let Some(client) = self.clients.get(key) else {
            log::debug!("event for released client {key}");
            return;
        };
        let mut progress = Ok(Progress::Idle);
        if event.readable {
            progress = client.on_readable(&self.page);
        }
        if event.writable && matches!(progress, Ok(Progress::Idle)) {
            progress = client.on_writable();
        }
        loop {
            match progress {
                Err(_) => return self.release(key, world),
                Ok(Progress::Idle) => break,
                Ok(Progress::Opened) => {
                    let Some(client) = self.clients.get(key) else { return };
                    let origin = client.origin().to_string();
                    world.login(key, &origin, now_ms(), &mut self.inboxes());
                    // frames may have arrived along with the upgrade request
                    let Some(client) = self.clients.get(key) else { return };
                    progress = client.on_readable(&self.page);
                }
                Ok(Progress::Messages(texts, open)) => {
                    for text in &texts {
                        world.request(key, text, now_ms(), &mut self.inboxes());
                    }
                    if !open {
                        return self.release(key, world);
                    }
                    break;
                }
            }
        }
        self.rearm(key, world);
    }

    /// Puts the client back into the poller with the interest its state calls for.
    fn rearm(&mut self, key: usize, world: &mut crate::World) {
        let Some(client) = self.clients.get(key) else { return };
        let Some(conn) = client.conn() else { return self.release(key, world) };
        if let Err(e) = self.poller.modify(conn, client.interest(key)) {
            log::warn!("failed to re-register client {key}: {e}");
            self.release(key, world);
        }
    }

    fn release(&mut self, key: usize, world: &mut crate::World) {
        let Some(client) = self.clients.release(key) else { return };
        if let Some(conn) = client.conn() {
            let _ = self.poller.delete(conn);
        }
        world.logout(key);
        log::debug!("client disconnected {key} ({})", client.origin());
    }

    /// Writes whatever the world queued for each client since the last pass.
    pub fn flush_pending(&mut self, world: &mut crate::World) {
        for key in self.clients.keys() {
            let Some(client) = self.clients.get(key) else { continue };
            if !client.waiting_for_write {
                continue;
            }
            if client.flush().is_err() {
                self.release(key, world);
                continue;
            }
            self.rearm(key, world);
        }
    }

    /// Sends a close frame to every open session and drops all connections.
    pub fn shutdown(&mut self, world: &mut crate::World) {
        for key in self.clients.keys() {
            if let Some(client) = self.clients.get(key) {
                client.close();
            }
            self.release(key, world);
        }
        log::info!("all connections closed");
    }
}
