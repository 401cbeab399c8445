//! `0x0B ... 0x1C 0x0D` framing used on the monitor link.

/// Start-of-frame marker.
pub const START: u8 = 0x0B;
/// End-of-frame marker.
pub const END: u8 = 0x1C;
/// Trailer written after [`END`] on outbound frames.
pub const TRAILER: u8 = 0x0D;

/// Scan `buf[..count]` for complete frames and hand each payload to `on_frame`.
///
/// Every `END` emits the span from the most recent `START` seen so far. The
/// start position is kept after a frame, so a second `END` with no new `START`
/// emits the longer span again. A second `START` before an `END` silently
/// discards the earlier partial frame. An `END` with no preceding `START` is
/// dropped. Returns the offset one past the last emitting `END`, or 0 when
/// none was found; bytes from that offset up to `count` are the caller's
/// leftover and must be carried into the next read.
pub fn extract_frames<F>(buf: &[u8], count: usize, mut on_frame: F) -> usize
where
    F: FnMut(&[u8]),
{
    let count = count.min(buf.len());
    let mut start: Option<usize> = None;
    let mut consumed = 0;

    for (i, &byte) in buf[..count].iter().enumerate() {
        match byte {
            START => start = Some(i),
            END => {
                if let Some(s) = start {
                    on_frame(&buf[s + 1..i]);
                    consumed = i + 1;
                }
            }
            _ => {}
        }
    }
    consumed
}

/// Wrap `payload` in the outbound envelope.
pub fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.push(START);
    out.extend_from_slice(payload);
    out.push(END);
    out.push(TRAILER);
    out
}
