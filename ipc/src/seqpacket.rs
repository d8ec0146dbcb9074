// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! [`FdChannel`] over Unix `SOCK_SEQPACKET` sockets, passing descriptors as `SCM_RIGHTS`.

use crate::channel::{Datagram, FdChannel, FdListener, MAX_MESSAGE, peer_closed};
use async_trait::async_trait;
use nix::cmsg_space;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::socket::{
    AddressFamily, Backlog, ControlMessage, ControlMessageOwned, MsgFlags, SockFlag, SockType,
    UnixAddr, accept4, bind, connect, listen, recvmsg, sendmsg, socket, socketpair,
};
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

fn flags() -> SockFlag {
    SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC
}

fn new_socket() -> io::Result<OwnedFd> {
    Ok(socket(AddressFamily::Unix, SockType::SeqPacket, flags(), None)?)
}

#[allow(unsafe_code)]
fn take_ownership(fd: RawFd) -> OwnedFd {
    // SAFETY: `fd` was just returned by the kernel (accept or SCM_RIGHTS) and
    // nothing else owns it.
    unsafe { OwnedFd::from_raw_fd(fd) }
}

/// Whether the peer of `sock` has hung up.
///
/// `recvmsg` returns zero bytes both for an empty record and at end of stream.
/// Kernels that do not flag records with `MSG_EOR` leave only the socket state
/// to tell the two apart.
fn hung_up(sock: BorrowedFd<'_>) -> io::Result<bool> {
    let mut fds = [PollFd::new(sock, PollFlags::POLLIN)];
    poll(&mut fds, PollTimeout::ZERO)?;
    Ok(fds[0]
        .revents()
        .is_some_and(|revents| revents.intersects(PollFlags::POLLHUP | PollFlags::from_bits_retain(nix::libc::POLLRDHUP))))
}

fn receive(sock: BorrowedFd<'_>) -> io::Result<Datagram> {
    let mut buf = [0u8; MAX_MESSAGE];
    let mut iov = [IoSliceMut::new(&mut buf)];
    let mut space = cmsg_space!([RawFd; 1]);
    let msg = recvmsg::<()>(
        sock.as_raw_fd(),
        &mut iov,
        Some(&mut space),
        MsgFlags::MSG_CMSG_CLOEXEC,
    )?;
    let bytes = msg.bytes;
    let record = msg.flags.contains(MsgFlags::MSG_EOR);
    let truncated = msg
        .flags
        .intersects(MsgFlags::MSG_TRUNC | MsgFlags::MSG_CTRUNC);
    let mut fd = None;
    for cmsg in msg.cmsgs()? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            for raw in fds {
                let owned = take_ownership(raw);
                if fd.is_none() {
                    fd = Some(owned);
                } else {
                    warn!("Closing extra descriptor received on fd {}", sock.as_raw_fd());
                }
            }
        }
    }
    // An empty record racing with the hangup is reported as the hangup.
    if bytes == 0 && fd.is_none() && !truncated && !record && hung_up(sock)? {
        return Err(peer_closed());
    }
    Ok(Datagram {
        payload: buf[..bytes.min(MAX_MESSAGE)].to_vec(),
        fd,
        truncated,
    })
}

fn transmit(sock: RawFd, payload: &[u8], fd: Option<BorrowedFd<'_>>) -> io::Result<()> {
    let iov = [IoSlice::new(payload)];
    let fds = fd.map(|fd| [fd.as_raw_fd()]);
    let cmsgs: Vec<ControlMessage> = fds
        .iter()
        .map(|fds| ControlMessage::ScmRights(&fds[..]))
        .collect();
    let sent = sendmsg::<()>(sock, &iov, &cmsgs, MsgFlags::MSG_NOSIGNAL, None)?;
    if sent == payload.len() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("sent {sent} of {} bytes", payload.len()),
        ))
    }
}

/// One connected `SOCK_SEQPACKET` socket
#[derive(Debug)]
pub struct SeqpacketChannel {
    fd: AsyncFd<OwnedFd>,
}

impl SeqpacketChannel {
    fn new(fd: OwnedFd) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::try_with_interest(fd, Interest::READABLE | Interest::WRITABLE)
                .map_err(|e| e.into_parts().1)?,
        })
    }

    /// Connect to the listening socket at `path`
    pub fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = new_socket()?;
        let addr = UnixAddr::new(path.as_ref())?;
        connect(fd.as_raw_fd(), &addr)?;
        Self::new(fd)
    }

    /// Two channels connected to each other
    pub fn pair() -> io::Result<(Self, Self)> {
        let (a, b) = socketpair(AddressFamily::Unix, SockType::SeqPacket, None, flags())?;
        Ok((Self::new(a)?, Self::new(b)?))
    }
}

#[async_trait]
impl FdChannel for SeqpacketChannel {
    async fn recv(&mut self) -> io::Result<Datagram> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|fd| receive(fd.get_ref().as_fd())) {
                Ok(result) => return result,
                Err(_would_block) => {}
            }
        }
    }

    async fn send(&mut self, payload: &[u8], fd: Option<BorrowedFd<'_>>) -> io::Result<()> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|sock| transmit(sock.get_ref().as_raw_fd(), payload, fd)) {
                Ok(result) => return result,
                Err(_would_block) => {}
            }
        }
    }
}

/// A listening `SOCK_SEQPACKET` socket bound to a path.
///
/// The socket file is removed when the listener is dropped.
#[derive(Debug)]
pub struct SeqpacketListener {
    fd: AsyncFd<OwnedFd>,
    path: PathBuf,
}

impl SeqpacketListener {
    /// Bind to `path`, which must not exist yet
    pub fn bind(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let fd = new_socket()?;
        let addr = UnixAddr::new(path.as_path())?;
        bind(fd.as_raw_fd(), &addr)?;
        listen(&fd, Backlog::new(1)?)?;
        debug!("Listening on {}", path.display());
        Ok(Self {
            fd: AsyncFd::try_with_interest(fd, Interest::READABLE)
                .map_err(|e| e.into_parts().1)?,
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SeqpacketListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove socket {}: {e}", self.path.display());
        }
    }
}

#[async_trait]
impl FdListener for SeqpacketListener {
    async fn accept(&mut self) -> io::Result<Box<dyn FdChannel>> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|fd| Ok(accept4(fd.get_ref().as_raw_fd(), flags())?)) {
                Ok(result) => {
                    let channel = SeqpacketChannel::new(take_ownership(result?))?;
                    debug!("Accepted connection on {}", self.path.display());
                    return Ok(Box::new(channel));
                }
                Err(_would_block) => {}
            }
        }
    }
}
