//! The two ways a response is collected.
//!
//! Fixed-length commands write a frame and block on a read of the known
//! response length, bounded by the transport timeout. OTA acknowledgements
//! instead poll the receive queue and accumulate bytes until the expected
//! length arrives or a wall-clock deadline passes.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use num_traits::FromPrimitive;

use super::{frame, Command, ProtocolError};
use crate::transport::Transport;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn log_send(frame: &[u8]) {
    match frame.get(1).and_then(|&c| Command::from_u8(c)) {
        Some(command) => debug!("send {:?} {:02X?}", command, frame),
        None => debug!("send {:02X?}", frame),
    }
}

/// Writes `frame` and reads exactly `expected` bytes back. A short read is
/// a failure; nothing is retried.
pub(crate) fn transact(
    port: &mut dyn Transport,
    frame: &[u8],
    expected: usize,
) -> Result<Vec<u8>, ProtocolError> {
    log_send(frame);
    port.write(frame)?;

    let response = port.read(expected)?;
    debug!("recv {:02X?}", response);

    if response.len() != expected {
        return Err(ProtocolError::LengthMismatch {
            expected,
            actual: response.len(),
        });
    }
    Ok(response)
}

/// Writes `frame`, then accumulates whatever the port has buffered until
/// `expected` bytes are collected or `deadline` passes since the write.
/// The result must be exactly `expected` bytes with a valid CRC.
pub(crate) fn send_and_wait_ack(
    port: &mut dyn Transport,
    frame: &[u8],
    expected: usize,
    deadline: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    log_send(frame);
    port.write(frame)?;

    let start = Instant::now();
    let mut received: Vec<u8> = Vec::with_capacity(expected);

    while received.len() < expected && start.elapsed() <= deadline {
        match port.bytes_available()? {
            0 => thread::sleep(POLL_INTERVAL),
            n => received.extend(port.read(n)?),
        }
    }
    debug!("recv {:02X?}", received);

    if received.len() < expected {
        return Err(ProtocolError::DeadlineExceeded {
            expected,
            received: received.len(),
            deadline,
        });
    }
    if received.len() > expected {
        return Err(ProtocolError::LengthMismatch {
            expected,
            actual: received.len(),
        });
    }

    frame::validate(&received)?;
    Ok(received)
}
