//! The minimal trait that all network interface card (NIC) drivers implement,
//! along with the transient ring-condition errors its callers branch on.

#![no_std]

use core::fmt;

/// A failed transmit attempt.
///
/// Queue overflow is transient and expected: the caller yields its scheduling
/// turn and retries the same payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmitError {
    /// Every slot of the transmit descriptor ring is still owned by the
    /// device; nothing was queued.
    QueueOverflow,
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransmitError::QueueOverflow => write!(f, "transmit descriptor queue overflow"),
        }
    }
}

/// A failed receive attempt.
///
/// An empty queue is transient and expected: the caller yields its scheduling
/// turn and retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveError {
    /// The device has not completed any receive descriptor; nothing was
    /// consumed and no ring state changed.
    QueueEmpty,
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReceiveError::QueueEmpty => write!(f, "receive descriptor queue empty"),
        }
    }
}

/// A trait that defines the necessary minimum functions that all network
/// interface card (NIC) drivers should implement.
pub trait NetworkInterfaceCard {
    /// Queues the given `frame` for transmission by the device.
    ///
    /// On success the packet is durably queued and the caller retains no
    /// further obligation. Never blocks: a full ring is reported as
    /// [`TransmitError::QueueOverflow`] for the caller to retry after
    /// yielding.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError>;

    /// Copies the oldest completed receive slot into `out` and returns the
    /// received frame's length.
    ///
    /// Never blocks: an empty ring is reported as
    /// [`ReceiveError::QueueEmpty`] with no side effects at all.
    fn try_receive(&mut self, out: &mut [u8]) -> Result<usize, ReceiveError>;

    /// Returns the MAC address that this NIC is configured with.
    /// If spoofed, it will return the spoofed MAC address,
    /// otherwise it will return the regular MAC address defined by the NIC hardware.
    fn mac_address(&self) -> [u8; 6];
}
