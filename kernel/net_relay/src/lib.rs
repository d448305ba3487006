//! The two relay loops that bridge a NIC driver and the network-stack
//! component: the input relay forwards received frames to the stack, and the
//! output relay forwards the stack's outbound frames to the driver.
//!
//! Both loops are cooperative: the only suspension point is the caller-
//! provided `yield_now` function, invoked on the transient ring conditions
//! (empty receive ring, full transmit ring). The NIC lock is never held
//! across a yield. A loop terminates only on a fatal error talking to the
//! network stack, and one relay's failure leaves the other relay untouched.

#![cfg_attr(not(test), no_std)]

use core::fmt;

use log::error;
use network_interface_card::{NetworkInterfaceCard, ReceiveError, TransmitError};
use spin::Mutex;

/// The number of payload bytes one mailbox page can carry: a page minus the
/// length field.
pub const PACKET_MAILBOX_CAPACITY: usize = 4096 - 4;

/// The single shared page through which one relay exchanges one packet at a
/// time with the network-stack component.
///
/// The page has exactly one writer and one reader per direction of use; the
/// writer must not reuse it until the reader is done, which
/// [`NetworkStackEndpoint`] enforces by blocking until the peer acknowledges.
#[repr(C)]
pub struct PacketMailbox {
    length: u32,
    payload: [u8; PACKET_MAILBOX_CAPACITY],
}

const _: () = assert!(core::mem::size_of::<PacketMailbox>() == 4096);

impl PacketMailbox {
    pub fn new() -> PacketMailbox {
        PacketMailbox { length: 0, payload: [0; PACKET_MAILBOX_CAPACITY] }
    }

    /// The frame currently held in the mailbox.
    pub fn frame(&self) -> &[u8] {
        &self.payload[..self.length as usize]
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The whole payload area, for a producer to fill before calling
    /// [`set_length`](Self::set_length).
    pub fn payload_mut(&mut self) -> &mut [u8; PACKET_MAILBOX_CAPACITY] {
        &mut self.payload
    }

    /// Records how many payload bytes are occupied, clamped to the page
    /// capacity.
    pub fn set_length(&mut self, length: usize) {
        self.length = core::cmp::min(length, PACKET_MAILBOX_CAPACITY) as u32;
    }

    /// Copies `frame` into the mailbox, truncating it to the page capacity.
    pub fn set_frame(&mut self, frame: &[u8]) {
        let length = core::cmp::min(frame.len(), PACKET_MAILBOX_CAPACITY);
        self.payload[..length].copy_from_slice(&frame[..length]);
        self.length = length as u32;
    }
}

impl Default for PacketMailbox {
    fn default() -> PacketMailbox {
        PacketMailbox::new()
    }
}

/// A fatal relay failure. Transient ring conditions never surface here; they
/// are absorbed by the yield-and-retry loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayError {
    /// The exchange with the network-stack component failed; the owning
    /// relay halts.
    PeerCommunication(&'static str),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RelayError::PeerCommunication(cause) => {
                write!(f, "communication with the network stack failed: {}", cause)
            }
        }
    }
}

/// One side of the packet exchange with the network-stack component.
///
/// Both operations are blocking rendezvous: they return only once the peer
/// has finished its half of the exchange. In particular, when
/// `deliver_inbound` returns, the peer no longer reads the mailbox and the
/// caller may overwrite it. (The e1000's original environment approximated
/// this with a fixed number of scheduler yields after the send; an explicit
/// acknowledgment makes the page-reuse discipline a guarantee instead of a
/// heuristic.)
pub trait NetworkStackEndpoint {
    /// Hands a received frame to the network stack, blocking until the stack
    /// has finished reading the mailbox page.
    fn deliver_inbound(&mut self, mailbox: &PacketMailbox) -> Result<(), &'static str>;

    /// Blocks until the network stack places its next outbound frame into
    /// the mailbox page.
    fn next_outbound(&mut self, mailbox: &mut PacketMailbox) -> Result<(), &'static str>;
}

/// Runs the input relay: drains the NIC's receive path into the network
/// stack, forever.
///
/// An empty receive ring is absorbed by yielding and retrying; the function
/// returns only on a fatal endpoint failure.
pub fn run_input_relay<N, S, Y>(
    nic: &Mutex<N>,
    stack: &mut S,
    mut yield_now: Y,
) -> RelayError
where
    N: NetworkInterfaceCard,
    S: NetworkStackEndpoint,
    Y: FnMut(),
{
    let mut mailbox = PacketMailbox::new();
    loop {
        let length = loop {
            // the lock guard must not live past the match arm, so the NIC is
            // free while we yield
            let outcome = nic.lock().try_receive(mailbox.payload_mut());
            match outcome {
                Ok(length) => break length,
                Err(ReceiveError::QueueEmpty) => yield_now(),
            }
        };
        mailbox.set_length(length);

        if let Err(cause) = stack.deliver_inbound(&mailbox) {
            error!("input relay: failed to hand an inbound frame to the network stack: {}", cause);
            return RelayError::PeerCommunication(cause);
        }
    }
}

/// Runs the output relay: drains the network stack's outbound frames into
/// the NIC's transmit path, forever.
///
/// A full transmit ring is absorbed by yielding and retrying the same
/// payload; a frame accepted from the stack is never dropped. The function
/// returns only on a fatal endpoint failure.
pub fn run_output_relay<N, S, Y>(
    nic: &Mutex<N>,
    stack: &mut S,
    mut yield_now: Y,
) -> RelayError
where
    N: NetworkInterfaceCard,
    S: NetworkStackEndpoint,
    Y: FnMut(),
{
    let mut mailbox = PacketMailbox::new();
    loop {
        if let Err(cause) = stack.next_outbound(&mut mailbox) {
            error!("output relay: failed to collect an outbound frame from the network stack: {}", cause);
            return RelayError::PeerCommunication(cause);
        }

        loop {
            let outcome = nic.lock().transmit(mailbox.frame());
            match outcome {
                Ok(()) => break,
                Err(TransmitError::QueueOverflow) => yield_now(),
            }
        }
    }
}
