// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use async_trait::async_trait;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};

/// Size of the receive buffer. Longer messages are cut and flagged as truncated.
pub const MAX_MESSAGE: usize = 64;

/// One received message
#[derive(Debug, Default)]
pub struct Datagram {
    pub payload: Vec<u8>,
    /// Descriptor received along with the message, if any. Extra descriptors are closed.
    pub fd: Option<OwnedFd>,
    /// The message (or its ancillary data) did not fit the receive buffers
    pub truncated: bool,
}

/// A connected, message oriented channel.
#[async_trait]
pub trait FdChannel: Send {
    /// Wait for the next message. A closed peer is reported as [`io::ErrorKind::UnexpectedEof`].
    async fn recv(&mut self) -> io::Result<Datagram>;

    /// Send `payload` as one message, with `fd` as ancillary data if given.
    async fn send(&mut self, payload: &[u8], fd: Option<BorrowedFd<'_>>) -> io::Result<()>;
}

/// Source of incoming [`FdChannel`]s
#[async_trait]
pub trait FdListener: Send {
    async fn accept(&mut self) -> io::Result<Box<dyn FdChannel>>;
}

pub(crate) fn peer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed the channel")
}
