use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

use crate::prelude::*;

/// Totals reported to a client in a `stats` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsReport {
    pub total_chunks: u64,
    pub global_click_count: u64,
    pub active_connections: usize,
    /// The receiving identity's own click count.
    pub clicks: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    GridData { viewport: Viewport, bits: Vec<u8> },
    Stats(StatsReport),
    Error { message: String, retry: Option<u64> },
    Cell { x: i64, y: i64, value: bool },
}
impl Response {
    pub fn error(error: &Error) -> Self {
        Response::Error {
            message: error.to_string(),
            retry: error.retry_ms(),
        }
    }
    pub fn to_json(&self) -> String {
        let value = match self {
            Response::GridData { viewport, bits } => json!({
                "type": "gridData",
                "header": {
                    "startX": viewport.start_x(),
                    "startY": viewport.start_y(),
                    "endX": viewport.end_x(),
                    "endY": viewport.end_y(),
                    "width": viewport.width(),
                    "height": viewport.height(),
                    "totalSize": bits.len(),
                },
                "data": STANDARD.encode(bits),
            }),
            Response::Stats(stats) => {
                let mut value = json!({
                    "type": "stats",
                    "totalCheckboxes": stats.total_chunks.saturating_mul((CHUNK_SIZE * CHUNK_SIZE) as u64),
                    "totalChunks": stats.total_chunks,
                    "globalClickCount": stats.global_click_count,
                    "activeConnections": stats.active_connections,
                });
                if let Some(clicks) = stats.clicks {
                    value["clicks"] = clicks.into();
                }
                value
            }
            Response::Error { message, retry } => {
                let mut value = json!({ "type": "error", "message": message });
                if let Some(retry) = retry {
                    value["retry"] = (*retry).into();
                }
                value
            }
            Response::Cell { x, y, value } => {
                let mut delta = serde_json::Map::new();
                delta.insert(format!("{x},{y}"), (*value as u8).into());
                delta.into()
            }
        };
        value.to_string()
    }
}
