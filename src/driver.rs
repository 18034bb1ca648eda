// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Velodyne receive loop and its thread lifecycle.
//!
//! The [`VelodyneDriver`] owns the packet source and the frame assembler. It
//! runs on a dedicated `velodyne-rx` thread with a current-thread tokio
//! runtime and publishes every completed frame into the handoff slot:
//!
//! ```text
//! PacketSource ──► velodyne::decode ──► FrameAssembler ──► FramePublisher
//!   (bounded wait)     (12 blocks)        (180° cut)        (latest wins)
//! ```
//!
//! Timeouts, malformed datagrams, foreign senders and frame overflows are
//! logged and counted; only a source error stops the loop. The returned
//! [`DriverHandle`] must be used to stop and join the thread, and dropping it
//! does both.

use crate::{
    frame::{FrameAssembler, MAX_BLOCKS},
    handoff::{FramePublisher, FrameSubscriber, mailbox},
    lidar::Error,
    packet_source::{PacketSource, Received, UdpSource},
    velodyne::{DATA_PORT, PacketSlice},
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    thread::JoinHandle,
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Receive buffer size, larger than any valid datagram
const RECV_BUFFER_SIZE: usize = 2048;

/// Default bounded wait for socket readability
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Driver configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// UDP port the sensor sends data packets to
    pub port: u16,
    /// Local address to bind
    pub bind_addr: IpAddr,
    /// Expected sensor address, packets from other senders are flagged
    pub device_addr: Option<IpAddr>,
    /// Bounded wait for each receive
    pub poll_timeout: Duration,
    /// Block capacity of one frame
    pub max_blocks: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            port: DATA_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            device_addr: None,
            poll_timeout: POLL_TIMEOUT,
            max_blocks: MAX_BLOCKS,
        }
    }
}

impl DriverConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Reject settings the receive loop cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_blocks == 0 {
            return Err(Error::Config("max_blocks must be at least 1".to_string()));
        }
        if self.poll_timeout.is_zero() {
            return Err(Error::Config("poll timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Counters kept by the receive loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Datagrams received, valid or not
    pub datagrams: u64,
    /// Bounded waits that expired without data
    pub timeouts: u64,
    /// Datagrams dropped for their size or contents
    pub invalid: u64,
    /// Datagrams from an unexpected sender (still processed)
    pub foreign: u64,
    /// Blocks dropped because a frame was full
    pub overflows: u64,
    /// Frames handed to the publisher
    pub frames: u64,
    /// Published frames replaced before a consumer took them
    pub replaced: u64,
}

/// Receive loop state.
pub struct VelodyneDriver<S: PacketSource> {
    source: S,
    assembler: FrameAssembler,
    publisher: FramePublisher,
    device_addr: Option<IpAddr>,
    poll_timeout: Duration,
    stats: DriverStats,
}

impl<S: PacketSource + 'static> VelodyneDriver<S> {
    /// Create a driver reading from `source` and publishing to `publisher`.
    pub fn new(source: S, publisher: FramePublisher, config: &DriverConfig) -> Self {
        Self {
            source,
            assembler: FrameAssembler::new(config.max_blocks),
            publisher,
            device_addr: config.device_addr,
            poll_timeout: config.poll_timeout,
            stats: DriverStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Decode one datagram, feed its blocks to the assembler and publish any
    /// completed frame.
    ///
    /// The sender is checked only after the data has been merged; a mismatch
    /// is reported but the blocks are kept.
    pub fn process_datagram(&mut self, data: &[u8], from: SocketAddr) -> Result<(), Error> {
        self.stats.datagrams += 1;

        let packet = match PacketSlice::from_slice(data) {
            Ok(packet) => packet,
            Err(err) => {
                self.stats.invalid += 1;
                warn!(len = data.len(), %from, "dropping datagram: {}", err);
                return Ok(());
            }
        };

        for block in packet.blocks() {
            match self.assembler.ingest(block) {
                Ok(Some(frame)) => {
                    debug!(
                        frame_id = frame.frame_id,
                        blocks = frame.block_count(),
                        "publishing frame"
                    );
                    self.stats.frames += 1;
                    if self.publisher.publish(frame)?.is_some() {
                        self.stats.replaced += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    self.stats.overflows += 1;
                    warn!(rotation = block.rotation, "{}", err);
                }
            }
        }

        if let Some(device) = self.device_addr {
            if from.ip() != device {
                self.stats.foreign += 1;
                warn!(%from, %device, "datagram sender is not the configured device");
            }
        }

        Ok(())
    }

    /// Run until `shutdown` is signalled or the source fails.
    ///
    /// Returns the final counters on shutdown. The publisher is dropped when
    /// this returns, which releases any consumer waiting for a frame.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<DriverStats, Error> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = self.source.recv_next(&mut buf, self.poll_timeout) => received,
            };

            match received {
                Ok(Received::Datagram { len, from }) => self.process_datagram(&buf[..len], from)?,
                Ok(Received::Timeout) => {
                    self.stats.timeouts += 1;
                    warn!(timeout = ?self.poll_timeout, "no data from sensor");
                }
                Err(err) => {
                    error!("receive failed, stopping: {}", err);
                    return Err(err);
                }
            }
        }

        info!(frames = self.stats.frames, "receiver shut down");
        Ok(self.stats)
    }

    /// Move the driver onto its own thread, driving it with `runtime`.
    pub fn spawn_on(self, runtime: tokio::runtime::Runtime) -> Result<DriverHandle, Error> {
        let (shutdown, signal) = watch::channel(false);
        let thread = std::thread::Builder::new()
            .name("velodyne-rx".to_string())
            .spawn(move || runtime.block_on(self.run(signal)))
            .map_err(|e| Error::Thread(e.to_string()))?;

        Ok(DriverHandle {
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Owner of a running receive thread.
pub struct DriverHandle {
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<Result<DriverStats, Error>>>,
}

impl DriverHandle {
    /// Ask the receive loop to stop at its next wait.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether the receive thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Stop the receive loop and wait for it, returning its final counters or
    /// the error that stopped it.
    pub fn join(mut self) -> Result<DriverStats, Error> {
        self.shutdown();
        Self::wait(self.thread.take())
    }

    fn wait(thread: Option<JoinHandle<Result<DriverStats, Error>>>) -> Result<DriverStats, Error> {
        match thread {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Thread("receive thread panicked".to_string()))?,
            None => Err(Error::ReceiverStopped),
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
            if let Err(err) = Self::wait(self.thread.take()) {
                debug!("receive thread ended with: {}", err);
            }
        }
    }
}

/// Bind the configured UDP port and start receiving on a new thread.
///
/// Socket creation and bind failures are returned here, before any thread is
/// started.
pub fn spawn_udp(config: &DriverConfig) -> Result<(DriverHandle, FrameSubscriber), Error> {
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let source = runtime.block_on(UdpSource::bind(config.socket_addr()))?;
    info!(addr = %source.local_addr()?, "listening for Velodyne data");

    let (publisher, subscriber) = mailbox();
    let handle = VelodyneDriver::new(source, publisher, config).spawn_on(runtime)?;
    Ok((handle, subscriber))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lidar::MeasurementBlock,
        packet_source::TestSource,
        velodyne::{BLOCKS_PER_PACKET, UPPER_BANK, encode},
    };
    use std::{future::Future, pin::Pin};

    fn packet(first_rotation: u16, step: u16) -> Vec<u8> {
        let blocks: Vec<_> = (0..BLOCKS_PER_PACKET as u16)
            .map(|i| MeasurementBlock {
                flag: UPPER_BANK,
                rotation: (first_rotation + i * step) % 36000,
                ..Default::default()
            })
            .collect();
        encode(&blocks)
    }

    fn sender(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 2, last)), 2368)
    }

    fn test_driver(config: &DriverConfig) -> (VelodyneDriver<TestSource>, FrameSubscriber) {
        let (publisher, subscriber) = mailbox();
        (VelodyneDriver::new(TestSource::empty(), publisher, config), subscriber)
    }

    #[test]
    fn test_invalid_datagram_counted() {
        let (mut driver, subscriber) = test_driver(&DriverConfig::default());
        driver.process_datagram(&[0u8; 100], sender(201)).unwrap();

        let stats = driver.stats();
        assert_eq!(stats.datagrams, 1);
        assert_eq!(stats.invalid, 1);
        assert!(subscriber.try_take().unwrap().is_none());
    }

    #[test]
    fn test_foreign_sender_still_processed() {
        let config = DriverConfig {
            device_addr: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 2, 201))),
            ..Default::default()
        };
        let (mut driver, subscriber) = test_driver(&config);

        // 0..17600 from a foreign sender, then the crossing from the device
        driver.process_datagram(&packet(100, 1500), sender(99)).unwrap();
        driver.process_datagram(&packet(18100, 1000), sender(201)).unwrap();

        let stats = driver.stats();
        assert_eq!(stats.foreign, 1);
        assert_eq!(stats.frames, 1);

        let frame = subscriber.try_take().unwrap().unwrap();
        assert_eq!(frame.block_count(), BLOCKS_PER_PACKET);
    }

    #[test]
    fn test_overflow_counted() {
        let config = DriverConfig {
            max_blocks: 10,
            ..Default::default()
        };
        let (mut driver, _subscriber) = test_driver(&config);
        driver.process_datagram(&packet(100, 10), sender(201)).unwrap();
        assert_eq!(driver.stats().overflows, 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(DriverConfig::default().validate().is_ok());
        let zero_blocks = DriverConfig {
            max_blocks: 0,
            ..Default::default()
        };
        assert!(matches!(zero_blocks.validate(), Err(Error::Config(_))));
        let zero_timeout = DriverConfig {
            poll_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
        assert_eq!(DriverConfig::default().socket_addr().port(), 2368);
    }

    struct FailingSource;

    impl PacketSource for FailingSource {
        fn recv_next<'a>(
            &'a mut self,
            _buf: &'a mut [u8],
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<Received, Error>> + Send + 'a>> {
            Box::pin(async {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "socket closed",
                )))
            })
        }
    }

    #[test]
    fn test_fatal_error_releases_consumer() {
        let (publisher, subscriber) = mailbox();
        let driver = VelodyneDriver::new(FailingSource, publisher, &DriverConfig::default());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = driver.spawn_on(runtime).unwrap();

        assert!(matches!(subscriber.take(), Err(Error::ReceiverStopped)));
        assert!(matches!(handle.join(), Err(Error::Io(_))));
    }

    #[test]
    fn test_shutdown_stops_idle_driver() {
        let config = DriverConfig {
            poll_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let (driver, subscriber) = test_driver(&config);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = driver.spawn_on(runtime).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        let stats = handle.join().unwrap();
        assert!(stats.timeouts >= 1);
        assert!(matches!(subscriber.take(), Err(Error::ReceiverStopped)));
    }
}
