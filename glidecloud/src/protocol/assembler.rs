//! Packs response records into size-bounded datagrams.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::debug;

use super::codec::{encode_response, ResponseRecord, MAX_RECORD_COUNT};
use super::{HEADER_SIZE, MAX_DATAGRAM_SIZE, SERVER_KEY};

/// Destination for outgoing datagrams.
///
/// Sending is fire-and-forget: an error is reported to the caller but
/// nothing is retried.
pub trait DatagramSink {
    fn send_datagram(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()>;
}

impl DatagramSink for UdpSocket {
    fn send_datagram(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        self.try_send_to(datagram, target).map(|_| ())
    }
}

impl<T: DatagramSink + ?Sized> DatagramSink for Arc<T> {
    fn send_datagram(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        (**self).send_datagram(datagram, target)
    }
}

impl<T: DatagramSink + ?Sized> DatagramSink for &T {
    fn send_datagram(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        (**self).send_datagram(datagram, target)
    }
}

/// Send one datagram, logging failures.
pub fn send_logged<S: DatagramSink + ?Sized>(sink: &S, datagram: &[u8], target: SocketAddr) {
    if let Err(e) = sink.send_datagram(datagram, target) {
        debug!(%target, error = %e, "Failed to send datagram");
    }
}

/// Accumulates records for one destination and flushes them in packets of
/// at most [`ResponseAssembler::capacity`] records.
///
/// Records are sent in insertion order. Dropping the assembler without
/// calling [`finish`](Self::finish) discards the pending records.
pub struct ResponseAssembler<'a, R: ResponseRecord, S: DatagramSink + ?Sized> {
    sink: &'a S,
    target: SocketAddr,
    pending: Vec<R>,
    packets_sent: usize,
}

impl<'a, R: ResponseRecord, S: DatagramSink + ?Sized> ResponseAssembler<'a, R, S> {
    pub fn new(sink: &'a S, target: SocketAddr) -> Self {
        Self {
            sink,
            target,
            pending: Vec::new(),
            packets_sent: 0,
        }
    }

    /// Records per packet: whatever fits in a 1024-byte datagram, capped by
    /// the one-byte count field.
    pub const fn capacity() -> usize {
        let fit = (MAX_DATAGRAM_SIZE - HEADER_SIZE - 8) / R::SIZE;
        if fit < MAX_RECORD_COUNT {
            fit
        } else {
            MAX_RECORD_COUNT
        }
    }

    /// Add a record, sending a packet if this fills it.
    pub fn push(&mut self, record: R) {
        self.pending.push(record);
        if self.pending.len() >= Self::capacity() {
            self.flush();
        }
    }

    /// Send the remaining records, if any. Returns the number of packets sent.
    pub fn finish(mut self) -> usize {
        self.flush();
        self.packets_sent
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let datagram = encode_response(SERVER_KEY, &self.pending);
        send_logged(self.sink, &datagram, self.target);
        self.pending.clear();
        self.packets_sent += 1;
    }
}

impl<R: ResponseRecord, S: DatagramSink + ?Sized> Extend<R> for ResponseAssembler<'_, R, S> {
    fn extend<I: IntoIterator<Item = R>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}
