use serde::Deserialize;

use super::{Outbox, Response};
use crate::prelude::*;

/// A rectangle as the client sends it, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub start_x: i64,
    pub start_y: i64,
    pub end_x: i64,
    pub end_y: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "getGrid")]
    GetGrid {
        #[serde(rename = "viewPort")]
        view_port: Bounds,
    },
    #[serde(rename = "toggle")]
    Toggle { x: i64, y: i64 },
}
impl Request {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl crate::World {
    /// Handles one text message from a session.
    pub fn request(&mut self, session: SessionId, text: &str, now: u64, outbox: &mut impl Outbox) {
        let Some(origin) = self.origin_of(session) else {
            log::warn!("message from unknown session {session}");
            return;
        };
        if let Err(e) = self.admit(&origin, now) {
            log::debug!("'{origin}' rejected: {}", e.to_string().replace('\n', " "));
            outbox.submit(session, Response::error(&e));
            return;
        }
        let request = match Request::decode(text) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("dropping malformed message from session {session}: {e}");
                return;
            }
        };
        log::trace!("session {session} '{origin}': {request:?}");
        let result = match request {
            Request::GetGrid { view_port } => self.get_grid(session, view_port, outbox),
            Request::Toggle { x, y } => self.toggle(&origin, x, y, outbox),
        };
        if let Err(e) = result {
            if let Error::ChunkIo { key, source } = &e {
                log::warn!("chunk [{key}] unavailable: {source}");
            }
            outbox.submit(session, Response::error(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_both_kinds() {
        assert_eq!(
            Request::decode(r#"{"type":"getGrid","viewPort":{"startX":-1,"startY":0,"endX":10,"endY":20}}"#).unwrap(),
            Request::GetGrid {
                view_port: Bounds { start_x: -1, start_y: 0, end_x: 10, end_y: 20 }
            }
        );
        assert_eq!(
            Request::decode(r#"{"type":"toggle","x":5,"y":-5}"#).unwrap(),
            Request::Toggle { x: 5, y: -5 }
        );
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(Request::decode(r#"{"type":"clear"}"#).is_err());
        assert!(Request::decode(r#"{"type":"toggle","x":1.5,"y":0}"#).is_err());
        assert!(Request::decode(r#"{"type":"toggle","x":"1"}"#).is_err());
        assert!(Request::decode("toggle 1 2").is_err());
    }
}
