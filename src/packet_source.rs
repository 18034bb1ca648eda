// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet source abstraction for the Velodyne driver.
//!
//! This module provides a [`PacketSource`] trait that abstracts the source of
//! UDP datagrams, enabling:
//!
//! - **Live operation**: Reading from a bound UDP socket with a bounded wait
//! - **Testing**: Replaying pre-recorded datagrams
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velopub::packet_source::{PacketSource, Received, UdpSource};
//!
//! let mut source = UdpSource::bind("0.0.0.0:2368".parse()?).await?;
//! let mut buf = [0u8; 2048];
//! loop {
//!     match source.recv_next(&mut buf, Duration::from_secs(1)).await? {
//!         Received::Datagram { len, from } => { /* decode buf[..len] */ }
//!         Received::Timeout => warn!("no data"),
//!     }
//! }
//! ```

use crate::lidar::Error;
use std::{
    future::Future,
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    pin::Pin,
    time::Duration,
};

/// Outcome of one bounded wait on a packet source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Received {
    /// A datagram of `len` bytes was written to the buffer.
    Datagram { len: usize, from: SocketAddr },
    /// Nothing arrived within the timeout.
    Timeout,
}

/// Trait for packet sources.
///
/// Implementations provide datagrams from various sources (UDP, test data).
pub trait PacketSource: Send {
    /// Wait at most `timeout` for the next datagram and copy it into `buf`.
    ///
    /// # Returns
    /// - `Ok(Received::Datagram { .. })` - bytes received and their sender
    /// - `Ok(Received::Timeout)` - no data within `timeout`, not fatal
    /// - `Err` - unrecoverable source error
    fn recv_next<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Received, Error>> + Send + 'a>>;
}

/// UDP socket packet source for live sensor operation.
pub struct UdpSource {
    socket: tokio::net::UdpSocket,
}

impl UdpSource {
    /// Create a new UDP source from an existing socket.
    pub fn new(socket: tokio::net::UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind to an address and create a UDP source.
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let socket = tokio::net::UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for UdpSource {
    fn recv_next<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Received, Error>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                match tokio::time::timeout(timeout, self.socket.readable()).await {
                    Err(_) => return Ok(Received::Timeout),
                    Ok(ready) => ready?,
                }

                // Readiness can be spurious, in which case the read would
                // block and we go back to waiting.
                match self.socket.try_recv_from(buf) {
                    Ok((len, from)) => return Ok(Received::Datagram { len, from }),
                    Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                    Err(err) => return Err(Error::Io(err)),
                }
            }
        })
    }
}

/// Test packet source replaying a fixed sequence of datagrams.
///
/// Once exhausted it behaves like a silent sensor: every call waits out the
/// timeout and reports [`Received::Timeout`].
pub struct TestSource {
    packets: Vec<Vec<u8>>,
    index: usize,
    from: SocketAddr,
}

impl TestSource {
    /// Create a new test source with the given packets.
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self {
            packets,
            index: 0,
            from: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2368),
        }
    }

    /// Create an empty test source.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Report `from` as the sender of every packet.
    pub fn with_sender(mut self, from: SocketAddr) -> Self {
        self.from = from;
        self
    }

    /// Get the number of packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Check if more packets are available.
    pub fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }
}

impl PacketSource for TestSource {
    fn recv_next<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Received, Error>> + Send + 'a>> {
        Box::pin(async move {
            if self.index >= self.packets.len() {
                tokio::time::sleep(timeout).await;
                return Ok(Received::Timeout);
            }

            let packet = &self.packets[self.index];
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.index += 1;
            Ok(Received::Datagram {
                len,
                from: self.from,
            })
        })
    }
}
