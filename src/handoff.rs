// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Single-slot, latest-wins frame handoff between the receive thread and
//! frame consumers.
//!
//! ```text
//! ┌────────────────┐ publish ┌────────┐  take  ┌────────────────┐
//! │ FrameAssembler │ ──────► │  slot  │ ─────► │ FrameSubscriber│
//! │ (receive side) │         │ (cap 1)│        │ (consumer side)│
//! └────────────────┘         └────────┘        └────────────────┘
//! ```
//!
//! The slot is a [`kanal`] channel of capacity one. Publishing drains any
//! frame nobody picked up before sending, so the producer never blocks and a
//! consumer always receives the newest completed frame. Frames are moved,
//! never shared, so the receive side keeps no reference into what the
//! consumer holds.
//!
//! Dropping the [`FramePublisher`] closes the slot: consumers blocked in
//! [`FrameSubscriber::take`] wake up with [`Error::ReceiverStopped`].

use crate::lidar::{Error, RawFrame};
use kanal::{ReceiveErrorTimeout, Receiver, Sender};
use std::time::Duration;
use tracing::debug;

/// Create a connected publisher/subscriber pair.
pub fn mailbox() -> (FramePublisher, FrameSubscriber) {
    let (tx, rx) = kanal::bounded(1);
    (
        FramePublisher {
            tx,
            stale: rx.clone(),
        },
        FrameSubscriber { rx },
    )
}

/// Producer half of the handoff, owned by the receive loop.
pub struct FramePublisher {
    tx: Sender<RawFrame>,
    /// Receiving end used only to evict an uncollected frame
    stale: Receiver<RawFrame>,
}

impl FramePublisher {
    /// Publish `frame`, replacing any frame that was not collected yet.
    ///
    /// Returns the id of the replaced frame, if any. Never blocks: the slot is
    /// emptied before sending and this is the only sender.
    pub fn publish(&self, frame: RawFrame) -> Result<Option<u32>, Error> {
        let mut replaced = None;
        while let Some(old) = self.stale.try_recv().map_err(|_| Error::ReceiverStopped)? {
            debug!(
                frame_id = old.frame_id,
                newer = frame.frame_id,
                "dropping uncollected frame"
            );
            replaced = Some(old.frame_id);
        }

        self.tx.send(frame).map_err(|_| Error::ReceiverStopped)?;
        Ok(replaced)
    }
}

/// Consumer half of the handoff.
///
/// Cloning yields another consumer of the same slot; each published frame is
/// delivered to at most one of them.
#[derive(Clone)]
pub struct FrameSubscriber {
    rx: Receiver<RawFrame>,
}

impl FrameSubscriber {
    /// Block until a frame is published and take ownership of it.
    ///
    /// Returns [`Error::ReceiverStopped`] once the publisher is gone.
    pub fn take(&self) -> Result<RawFrame, Error> {
        self.rx.recv().map_err(|_| Error::ReceiverStopped)
    }

    /// Like [`Self::take`] but gives up after `timeout`, returning `Ok(None)`.
    pub fn take_timeout(&self, timeout: Duration) -> Result<Option<RawFrame>, Error> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(ReceiveErrorTimeout::Timeout) => Ok(None),
            Err(_) => Err(Error::ReceiverStopped),
        }
    }

    /// Take the published frame if there is one, without waiting.
    pub fn try_take(&self) -> Result<Option<RawFrame>, Error> {
        self.rx.try_recv().map_err(|_| Error::ReceiverStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Instant};

    fn frame(id: u32) -> RawFrame {
        RawFrame {
            frame_id: id,
            ..Default::default()
        }
    }

    #[test]
    fn test_latest_wins() {
        let (publisher, subscriber) = mailbox();
        assert_eq!(publisher.publish(frame(1)).unwrap(), None);
        assert_eq!(publisher.publish(frame(2)).unwrap(), Some(1));

        let taken = subscriber.take().unwrap();
        assert_eq!(taken.frame_id, 2);

        // Slot cleared on take, never delivered twice
        assert!(subscriber.try_take().unwrap().is_none());
    }

    #[test]
    fn test_take_timeout() {
        let (publisher, subscriber) = mailbox();
        let start = Instant::now();
        assert!(
            subscriber
                .take_timeout(Duration::from_millis(20))
                .unwrap()
                .is_none()
        );
        assert!(start.elapsed() >= Duration::from_millis(20));

        publisher.publish(frame(7)).unwrap();
        let taken = subscriber.take_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(taken.map(|f| f.frame_id), Some(7));
    }

    #[test]
    fn test_take_blocks_until_publish() {
        let (publisher, subscriber) = mailbox();
        let consumer = thread::spawn(move || subscriber.take().map(|f| f.frame_id));

        thread::sleep(Duration::from_millis(20));
        publisher.publish(frame(3)).unwrap();

        assert_eq!(consumer.join().unwrap().unwrap(), 3);
    }

    #[test]
    fn test_publisher_drop_wakes_consumer() {
        let (publisher, subscriber) = mailbox();
        let waiting = subscriber.clone();
        let consumer = thread::spawn(move || waiting.take());

        thread::sleep(Duration::from_millis(20));
        drop(publisher);

        assert!(matches!(
            consumer.join().unwrap(),
            Err(Error::ReceiverStopped)
        ));
        assert!(matches!(
            subscriber.take_timeout(Duration::from_millis(10)),
            Err(Error::ReceiverStopped)
        ));
    }

    #[test]
    fn test_publish_without_consumers() {
        let (publisher, subscriber) = mailbox();
        drop(subscriber);
        for id in 0..3 {
            publisher.publish(frame(id)).unwrap();
        }
    }
}
