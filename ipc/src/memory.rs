// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory [`FdChannel`]s and [`FdListener`]s, for tests.
//!
//! Descriptors are duplicated on send, like the kernel does for `SCM_RIGHTS`.

use crate::channel::{Datagram, FdChannel, FdListener, MAX_MESSAGE, peer_closed};
use async_trait::async_trait;
use std::io;
use std::os::fd::BorrowedFd;
use tokio::sync::mpsc;

/// One end of an in-memory channel
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Datagram>,
    rx: mpsc::UnboundedReceiver<Datagram>,
}

impl MemoryChannel {
    /// Two channels connected to each other
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self { tx: a_tx, rx: b_rx }, Self { tx: b_tx, rx: a_rx })
    }
}

#[async_trait]
impl FdChannel for MemoryChannel {
    async fn recv(&mut self) -> io::Result<Datagram> {
        self.rx.recv().await.ok_or_else(peer_closed)
    }

    async fn send(&mut self, payload: &[u8], fd: Option<BorrowedFd<'_>>) -> io::Result<()> {
        let fd = fd.map(|fd| fd.try_clone_to_owned()).transpose()?;
        let datagram = Datagram {
            payload: payload[..payload.len().min(MAX_MESSAGE)].to_vec(),
            fd,
            truncated: payload.len() > MAX_MESSAGE,
        };
        self.tx
            .send(datagram)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

/// Accepts the channels opened through its [`MemoryConnector`]
#[derive(Debug)]
pub struct MemoryListener {
    rx: mpsc::UnboundedReceiver<MemoryChannel>,
}

/// Client side of a [`MemoryListener`]
#[derive(Clone, Debug)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<MemoryChannel>,
}

impl MemoryListener {
    #[must_use]
    pub fn new() -> (MemoryListener, MemoryConnector) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryListener { rx }, MemoryConnector { tx })
    }
}

impl MemoryConnector {
    pub fn connect(&self) -> io::Result<MemoryChannel> {
        let (client, server) = MemoryChannel::pair();
        self.tx
            .send(server)
            .map_err(|_| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(client)
    }
}

#[async_trait]
impl FdListener for MemoryListener {
    async fn accept(&mut self) -> io::Result<Box<dyn FdChannel>> {
        match self.rx.recv().await {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::os::fd::{AsFd, AsRawFd};

    #[tokio::test]
    async fn messages_and_descriptors() {
        let (mut listener, connector) = MemoryListener::new();
        let mut client = connector.connect().unwrap();
        let mut server = listener.accept().await.unwrap();

        let file = std::fs::File::open("/dev/null").unwrap();
        client.send(b"hello", Some(file.as_fd())).await.unwrap();
        let got = server.recv().await.unwrap();
        assert_eq!(got.payload, b"hello");
        let fd = got.fd.unwrap();
        assert_ne!(fd.as_raw_fd(), file.as_raw_fd());
        assert!(!got.truncated);

        server.send(&[b'x'; 100], None).await.unwrap();
        let got = client.recv().await.unwrap();
        assert_eq!(got.payload.len(), MAX_MESSAGE);
        assert!(got.truncated);
        assert!(got.fd.is_none());

        drop(server);
        let err = client.recv().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn closed_listener() {
        let (listener, connector) = MemoryListener::new();
        drop(listener);
        assert!(connector.connect().is_err());
    }
}
