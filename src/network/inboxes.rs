use super::*;

/// The world's view of the network: queues responses by session.
pub struct Inboxes<'a>(pub(super) &'a mut Network);

impl Network {
    pub fn inboxes(&mut self) -> Inboxes<'_> {
        Inboxes(self)
    }
}

impl Inboxes<'_> {
    fn get(&mut self, session: SessionId) -> Option<client::Inbox<'_>> {
        self.0.clients.get(session).map(|c| c.inbox())
    }
}

impl Outbox for Inboxes<'_> {
    fn submit(&mut self, session: SessionId, response: Response) {
        match self.get(session) {
            Some(mut inbox) => inbox.submit(response),
            None => log::debug!("dropping {response:?} for closed session {session}"),
        }
    }
}
