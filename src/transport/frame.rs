//! Outbound framing.
//!
//! Several payloads that are already waiting in a connection's queue are
//! written as one WebSocket frame, joined by `DELIMITER`. Publishers emit
//! compact JSON, which never contains a raw newline, so observers can split
//! a frame back into payloads.

use bytes::Bytes;
use tokio::sync::mpsc::Receiver;
use tungstenite::protocol::Message as WsMessage;

pub const DELIMITER: u8 = b'\n';

/// Builds one frame out of `first` and every payload queued at the moment
/// this is called. Payloads arriving while the frame is being assembled are
/// left for the next frame. Returns the frame and how many payloads it holds.
pub fn coalesce(first: Bytes, queue: &mut Receiver<Bytes>) -> (WsMessage, usize) {
    let pending = queue.len();
    if pending == 0 {
        return (into_frame(first.to_vec()), 1);
    }

    let mut buf = Vec::with_capacity(first.len() * (pending + 1));
    buf.extend_from_slice(&first);
    let mut count = 1;
    for _ in 0..pending {
        match queue.try_recv() {
            Ok(payload) => {
                buf.push(DELIMITER);
                buf.extend_from_slice(&payload);
                count += 1;
            }
            Err(_) => break,
        }
    }
    (into_frame(buf), count)
}

/// Text frame when `buf` is valid UTF-8, binary otherwise.
pub fn into_frame(buf: Vec<u8>) -> WsMessage {
    match String::from_utf8(buf) {
        Ok(text) => WsMessage::text(text),
        Err(err) => WsMessage::binary(err.into_bytes()),
    }
}

/// Splits a received frame back into the payloads it carries.
pub fn split_frame(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|byte| *byte == DELIMITER)
}
