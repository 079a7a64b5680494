use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use super::Transport;

/// Scripted device: every written frame releases the next queued reply.
pub struct MockTransport {
    pub sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    rx: VecDeque<u8>,
    trickle: Option<usize>,
    timeout: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            replies: VecDeque::new(),
            rx: VecDeque::new(),
            trickle: None,
            timeout: Duration::from_millis(20),
        }
    }

    pub fn reply(mut self, bytes: Vec<u8>) -> Self {
        self.replies.push_back(bytes);
        self
    }

    /// Reply with nothing to the next request.
    pub fn silence(self) -> Self {
        self.reply(Vec::new())
    }

    /// Report at most `n` bytes available per poll.
    pub fn trickle(mut self, n: usize) -> Self {
        self.trickle = Some(n);
        self
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent.push(data.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(())
    }

    fn read(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let n = count.min(self.rx.len());
        Ok(self.rx.drain(..n).collect())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(match self.trickle {
            Some(n) => n.min(self.rx.len()),
            None => self.rx.len(),
        })
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
