use std::time::{Duration, Instant};

use crate::error::{LinkError, Result};

/// Poll `next_line` until it yields a complete line or `timeout` expires.
/// Sleeps `poll_interval` between empty polls to avoid spinning; errors from
/// the poll function abort the wait immediately.
pub fn wait_for_line(
    mut next_line: impl FnMut() -> Result<Option<String>>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(line) = next_line()? {
            return Ok(line);
        }
        if Instant::now() >= deadline {
            return Err(LinkError::Timeout);
        }
        if !poll_interval.is_zero() {
            std::thread::sleep(poll_interval);
        }
    }
}

/// Split the first complete, non-empty line off `buf`.
///
/// Carriage returns are stripped so CRLF devices read the same as LF ones;
/// empty lines are consumed and skipped.
pub fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = buf.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            return Some(line);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::take_line;

    #[test]
    fn take_line_handles_crlf_and_partial_tail() {
        let mut buf = b"OK\r\n\r\nSTATUS 90\nPART".to_vec();
        assert_eq!(take_line(&mut buf).as_deref(), Some("OK"));
        assert_eq!(take_line(&mut buf).as_deref(), Some("STATUS 90"));
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(buf, b"PART".to_vec());
    }
}
