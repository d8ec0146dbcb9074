// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Message channels able to carry a file descriptor next to each message.
//!
//! The control-plane protocol only ever needs "send a short message, maybe with
//! a descriptor" and "receive a short message, maybe with a descriptor". The
//! [`FdChannel`] and [`FdListener`] traits capture exactly that, so protocol code
//! can be exercised against the in-memory implementation while the device
//! plugin uses Unix `SOCK_SEQPACKET` sockets.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod channel;
pub mod path;
pub mod seqpacket;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use channel::{Datagram, FdChannel, FdListener, MAX_MESSAGE};
pub use seqpacket::{SeqpacketChannel, SeqpacketListener};
