//! Just enough HTTP/1.1 to hand out the client page and accept WebSocket upgrades.

use std::path::Path;

/// Longest request head we are willing to buffer.
pub(super) const MAX_HEAD: usize = 8 * 1024;
const MAX_HEADERS: usize = 32;

#[derive(Debug)]
pub(super) struct RequestHead<'a> {
    pub method: &'a str,
    pub path: &'a str,
    headers: Vec<(&'a str, &'a [u8])>,
}
impl<'a> RequestHead<'a> {
    /// Parses the head at the start of `buf`, returning it with its length
    /// (through the blank line), or `None` while it is still arriving.
    pub fn parse(buf: &'a [u8]) -> Result<Option<(Self, usize)>, httparse::Error> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut request = httparse::Request::new(&mut headers);
        let httparse::Status::Complete(len) = request.parse(buf)? else {
            return Ok(None);
        };
        let (Some(method), Some(path)) = (request.method, request.path) else {
            return Ok(None);
        };
        let headers = request.headers.iter().map(|h| (h.name, h.value)).collect();
        Ok(Some((Self { method, path, headers }, len)))
    }
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|&(_, v)| std::str::from_utf8(v).ok())
            .map(str::trim)
    }
    /// The client's `Sec-WebSocket-Key`, if this is an upgrade request.
    pub fn websocket_key(&self) -> Option<&'a str> {
        let upgrade = self.header("Upgrade")?;
        let connection = self.header("Connection")?;
        let wants = upgrade.eq_ignore_ascii_case("websocket")
            && connection.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade"));
        if self.method == "GET" && wants {
            self.header("Sec-WebSocket-Key")
        } else {
            None
        }
    }
}

pub(super) fn upgrade_reply(key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        tungstenite::handshake::derive_accept_key(key.as_bytes())
    )
    .into_bytes()
}

fn reply(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// The response to a plain (non-upgrade) request.
pub(super) fn page_reply(head: &RequestHead, page: &Path) -> Vec<u8> {
    if head.method != "GET" || head.path != "/" {
        return reply("404 Not Found", "text/plain", b"Not Found");
    }
    match std::fs::read(page) {
        Ok(body) => reply("200 OK", "text/html", &body),
        Err(e) => {
            log::warn!("failed to read {}: {e}", page.display());
            reply("500 Internal Server Error", "text/plain", b"Error loading index.html")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scratch_dir;

    const UPGRADE: &[u8] = b"GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: keep-alive, Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";

    fn head(buf: &[u8]) -> RequestHead<'_> {
        RequestHead::parse(buf).unwrap().unwrap().0
    }

    #[test]
    fn waits_for_the_whole_head() {
        assert!(RequestHead::parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap().is_none());
        let (head, len) = RequestHead::parse(b"GET / HTTP/1.1\r\n\r\nrest").unwrap().unwrap();
        assert_eq!(len, 18);
        assert_eq!((head.method, head.path), ("GET", "/"));
    }

    #[test]
    fn recognises_upgrades() {
        let head = head(UPGRADE);
        assert_eq!(head.path, "/ws");
        assert_eq!(head.header("sec-websocket-version"), Some("13"));
        assert_eq!(head.websocket_key(), Some("dGhlIHNhbXBsZSBub25jZQ=="));
        let reply = String::from_utf8(upgrade_reply(head.websocket_key().unwrap())).unwrap();
        assert!(reply.starts_with("HTTP/1.1 101 "));
        // the sample handshake from RFC 6455
        assert!(reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

        let plain = RequestHead::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap().unwrap().0;
        assert_eq!(plain.websocket_key(), None);
    }

    #[test]
    fn rejects_broken_heads() {
        assert!(RequestHead::parse(b"GET / FTP/1.1\r\n\r\n").is_err());
        assert!(RequestHead::parse(b"GET / HTTP/1.1\r\n(bad): x\r\n\r\n").is_err());
        let mut crowded = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..=MAX_HEADERS {
            crowded.extend_from_slice(format!("X-{i}: y\r\n").as_bytes());
        }
        crowded.extend_from_slice(b"\r\n");
        assert!(matches!(RequestHead::parse(&crowded), Err(httparse::Error::TooManyHeaders)));
    }

    #[test]
    fn serves_the_page_and_nothing_else() {
        let dir = scratch_dir("http-page");
        let page = dir.join("index.html");
        std::fs::write(&page, "<p>grid</p>").unwrap();

        let root = head(b"GET / HTTP/1.1\r\n\r\n");
        let ok = String::from_utf8(page_reply(&root, &page)).unwrap();
        assert!(ok.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(ok.ends_with("\r\n\r\n<p>grid</p>"));

        let other = head(b"GET /favicon.ico HTTP/1.1\r\n\r\n");
        assert!(String::from_utf8(page_reply(&other, &page)).unwrap().starts_with("HTTP/1.1 404 Not Found"));
        let post = head(b"POST / HTTP/1.1\r\n\r\n");
        assert!(String::from_utf8(page_reply(&post, &page)).unwrap().ends_with("Not Found"));

        let missing = String::from_utf8(page_reply(&root, &dir.join("nope.html"))).unwrap();
        assert!(missing.starts_with("HTTP/1.1 500 "));
    }
}
