//! Defines the receive and transmit queues that store a ring of descriptors
//! and the state needed to drive them.
//!
//! Each ring has exactly one software producer (the code holding the queue)
//! and the device's DMA engine as its only other actor, so no lock guards the
//! slots: the descriptor ownership bits are the synchronization. The
//! software-side index must never desynchronize from the device's tail
//! register, so every index advance is mirrored into the register in the same
//! step.

#![cfg_attr(not(test), no_std)]

use core::cmp;

use intel_ethernet::descriptors::{RxDescriptor, TxDescriptor};
use log::trace;
use network_interface_card::{ReceiveError, TransmitError};
use nic_dma::{BufferArena, DmaSlice};

/// The set of registers needed to initialize and drive one transmit queue.
/// Implemented by the concrete driver over its memory-mapped register block.
pub trait TxQueueRegisters {
    fn set_tdbal(&mut self, value: u32);
    fn set_tdbah(&mut self, value: u32);
    fn set_tdlen(&mut self, value: u32);
    fn set_tdh(&mut self, value: u32);
    fn set_tdt(&mut self, value: u32);
}

/// The set of registers needed to initialize and drive one receive queue.
/// Implemented by the concrete driver over its memory-mapped register block.
pub trait RxQueueRegisters {
    fn set_rdbal(&mut self, value: u32);
    fn set_rdbah(&mut self, value: u32);
    fn set_rdlen(&mut self, value: u32);
    fn set_rdh(&mut self, value: u32);
    fn set_rdt(&mut self, value: u32);
}

/// A struct that holds all information for a transmit queue.
/// There should be one such object per queue.
pub struct TxQueue<S: TxQueueRegisters, T: TxDescriptor> {
    /// The number of the queue, stored here for our convenience.
    pub id: u8,
    /// Registers for this transmit queue
    pub regs: S,
    /// Transmit descriptors
    pub tx_descs: DmaSlice<T>,
    /// The number of transmit descriptors in the descriptor ring
    pub num_tx_descs: u16,
    /// Current transmit descriptor index, i.e. the next slot software will
    /// produce into. Always mirrored into the device's tail register.
    pub tx_cur: u16,
    /// The transmit buffers; buffer `i` is permanently bound to slot `i`.
    pub tx_bufs: BufferArena,
}

impl<S: TxQueueRegisters, T: TxDescriptor> TxQueue<S, T> {
    /// Creates a transmit ring of `num_descs` slots, each bound to its own
    /// `buffer_size`-byte buffer, and programs the queue's base, length,
    /// head, and tail registers.
    ///
    /// Every descriptor starts in the already-completed sentinel state, so
    /// the first transmit attempt finds a free slot.
    pub fn new(
        id: u8,
        mut regs: S,
        num_descs: u16,
        buffer_size: usize,
    ) -> Result<TxQueue<S, T>, &'static str> {
        if num_descs == 0 {
            return Err("nic_queues: transmit ring must have at least one descriptor");
        }
        let mut tx_descs = DmaSlice::<T>::new(num_descs as usize)?;
        let tx_bufs = BufferArena::new(num_descs as usize, buffer_size)?;
        for (slot, desc) in tx_descs.iter_mut().enumerate() {
            desc.init(tx_bufs.buffer_address(slot));
        }

        let desc_base = tx_descs.start_address().value();
        regs.set_tdbal(desc_base as u32);
        regs.set_tdbah((desc_base as u64 >> 32) as u32);
        regs.set_tdlen(tx_descs.size_in_bytes() as u32);
        regs.set_tdh(0);
        regs.set_tdt(0);

        Ok(TxQueue { id, regs, tx_descs, num_tx_descs: num_descs, tx_cur: 0, tx_bufs })
    }

    /// Queues `frame` in the slot at the current tail index.
    ///
    /// Fails with [`TransmitError::QueueOverflow`] if the device still owns
    /// that slot; the caller retries after yielding. Payloads longer than the
    /// slot's fixed buffer are silently truncated to the buffer capacity.
    pub fn enqueue(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        let cur = usize::from(self.tx_cur);
        if !self.tx_descs[cur].is_software_owned() {
            return Err(TransmitError::QueueOverflow);
        }

        let length = cmp::min(frame.len(), self.tx_bufs.buffer_size());
        self.tx_bufs.buffer_mut(cur)[..length].copy_from_slice(&frame[..length]);
        self.tx_descs[cur].prepare_for_transmit(length as u16);
        trace!("nic_queues: queued {} bytes in tx slot {} of queue {}", length, cur, self.id);

        // Advance the software index and mirror it into the tail register in
        // the same step; this write authorizes the device to begin
        // transmitting the slot just filled.
        self.tx_cur = (self.tx_cur + 1) % self.num_tx_descs;
        self.regs.set_tdt(self.tx_cur.into());
        Ok(())
    }
}

/// A struct that holds all information for one receive queue.
/// There should be one such object per queue.
pub struct RxQueue<S: RxQueueRegisters, T: RxDescriptor> {
    /// The number of the queue, stored here for our convenience.
    pub id: u8,
    /// Registers for this receive queue
    pub regs: S,
    /// Receive descriptors
    pub rx_descs: DmaSlice<T>,
    /// The number of receive descriptors in the descriptor ring
    pub num_rx_descs: u16,
    /// Current receive descriptor index, i.e. the oldest slot the device may
    /// have completed but software has not yet consumed.
    pub rx_cur: u16,
    /// The receive buffers; buffer `i` is permanently bound to slot `i`.
    pub rx_bufs: BufferArena,
}

impl<S: RxQueueRegisters, T: RxDescriptor> RxQueue<S, T> {
    /// Creates a receive ring of `num_descs` slots, each bound to its own
    /// `buffer_size`-byte buffer, and programs the queue's base, length,
    /// head, and tail registers.
    ///
    /// All slots start hardware-owned with a cleared status. Note that the
    /// tail register is left at zero here; the driver writes the final tail
    /// value right before it enables the receiver.
    pub fn new(
        id: u8,
        mut regs: S,
        num_descs: u16,
        buffer_size: usize,
    ) -> Result<RxQueue<S, T>, &'static str> {
        if num_descs == 0 {
            return Err("nic_queues: receive ring must have at least one descriptor");
        }
        let mut rx_descs = DmaSlice::<T>::new(num_descs as usize)?;
        let rx_bufs = BufferArena::new(num_descs as usize, buffer_size)?;
        for (slot, desc) in rx_descs.iter_mut().enumerate() {
            desc.init(rx_bufs.buffer_address(slot));
        }

        let desc_base = rx_descs.start_address().value();
        regs.set_rdbal(desc_base as u32);
        regs.set_rdbah((desc_base as u64 >> 32) as u32);
        regs.set_rdlen(rx_descs.size_in_bytes() as u32);
        regs.set_rdh(0);
        regs.set_rdt(0);

        Ok(RxQueue { id, regs, rx_descs, num_rx_descs: num_descs, rx_cur: 0, rx_bufs })
    }

    /// Copies the oldest completed receive slot into `out` and returns the
    /// number of bytes copied.
    ///
    /// Fails with [`ReceiveError::QueueEmpty`], touching neither `out` nor
    /// any ring state, if the device has not completed the slot at the
    /// current index. On success the slot is handed back to the device
    /// (status cleared, tail register updated) before the index advances, so
    /// the same buffer can take a future incoming frame.
    pub fn try_receive(&mut self, out: &mut [u8]) -> Result<usize, ReceiveError> {
        let cur = usize::from(self.rx_cur);
        if !self.rx_descs[cur].is_filled() {
            return Err(ReceiveError::QueueEmpty);
        }

        let frame_length = usize::from(self.rx_descs[cur].frame_length());
        let length = cmp::min(frame_length, out.len());
        out[..length].copy_from_slice(&self.rx_bufs.buffer(cur)[..length]);
        trace!("nic_queues: consumed {} bytes from rx slot {} of queue {}", length, cur, self.id);

        // Return the slot to the device before advancing: clear its status
        // and move the tail register onto the slot just consumed.
        self.rx_descs[cur].return_to_hardware();
        self.regs.set_rdt(self.rx_cur.into());
        self.rx_cur = (self.rx_cur + 1) % self.num_rx_descs;
        Ok(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intel_ethernet::descriptors::{
        LegacyRxDescriptor, LegacyTxDescriptor, RX_STATUS_DD, RX_STATUS_EOP, TX_STATUS_DD,
    };

    #[derive(Default)]
    struct FakeTxRegs {
        tdbal: u32,
        tdbah: u32,
        tdlen: u32,
        tdh: u32,
        tdt: u32,
        tdt_writes: Vec<u32>,
    }

    impl TxQueueRegisters for FakeTxRegs {
        fn set_tdbal(&mut self, value: u32) {
            self.tdbal = value;
        }
        fn set_tdbah(&mut self, value: u32) {
            self.tdbah = value;
        }
        fn set_tdlen(&mut self, value: u32) {
            self.tdlen = value;
        }
        fn set_tdh(&mut self, value: u32) {
            self.tdh = value;
        }
        fn set_tdt(&mut self, value: u32) {
            self.tdt = value;
            self.tdt_writes.push(value);
        }
    }

    #[derive(Default)]
    struct FakeRxRegs {
        rdbal: u32,
        rdbah: u32,
        rdlen: u32,
        rdh: u32,
        rdt: u32,
        rdt_writes: Vec<u32>,
    }

    impl RxQueueRegisters for FakeRxRegs {
        fn set_rdbal(&mut self, value: u32) {
            self.rdbal = value;
        }
        fn set_rdbah(&mut self, value: u32) {
            self.rdbah = value;
        }
        fn set_rdlen(&mut self, value: u32) {
            self.rdlen = value;
        }
        fn set_rdh(&mut self, value: u32) {
            self.rdh = value;
        }
        fn set_rdt(&mut self, value: u32) {
            self.rdt = value;
            self.rdt_writes.push(value);
        }
    }

    const TX_BUF_SIZE: usize = 1518;
    const RX_BUF_SIZE: usize = 2048;

    fn tx_queue(num_descs: u16) -> TxQueue<FakeTxRegs, LegacyTxDescriptor> {
        TxQueue::new(0, FakeTxRegs::default(), num_descs, TX_BUF_SIZE).unwrap()
    }

    fn rx_queue(num_descs: u16) -> RxQueue<FakeRxRegs, LegacyRxDescriptor> {
        RxQueue::new(0, FakeRxRegs::default(), num_descs, RX_BUF_SIZE).unwrap()
    }

    /// Simulates the device completing the transmission held in `slot`.
    fn complete_tx(queue: &mut TxQueue<FakeTxRegs, LegacyTxDescriptor>, slot: usize) {
        queue.tx_descs[slot].status.write(TX_STATUS_DD);
    }

    /// Simulates the device delivering `frame` into `slot`'s bound buffer.
    fn deliver_rx(queue: &mut RxQueue<FakeRxRegs, LegacyRxDescriptor>, slot: usize, frame: &[u8]) {
        queue.rx_bufs.buffer_mut(slot)[..frame.len()].copy_from_slice(frame);
        queue.rx_descs[slot].length.write(frame.len() as u16);
        queue.rx_descs[slot].status.write(RX_STATUS_DD | RX_STATUS_EOP);
    }

    #[test]
    fn tx_init_programs_ring_registers_and_binds_buffers() {
        let queue = tx_queue(8);
        let base = queue.tx_descs.start_address().value();
        assert_eq!(queue.regs.tdbal, base as u32);
        assert_eq!(queue.regs.tdbah, (base as u64 >> 32) as u32);
        assert_eq!(queue.regs.tdlen, 8 * 16);
        assert_eq!(queue.regs.tdh, 0);
        assert_eq!(queue.regs.tdt, 0);
        for slot in 0..8 {
            assert_eq!(
                queue.tx_descs[slot].phys_addr.read(),
                queue.tx_bufs.buffer_address(slot).value() as u64
            );
            assert!(queue.tx_descs[slot].is_software_owned());
        }
    }

    #[test]
    fn enqueue_fills_sequential_slots_then_overflows() {
        let mut queue = tx_queue(4);
        for (i, len) in [64usize, 128, 1518, 46].iter().enumerate() {
            let frame = vec![i as u8 + 1; *len];
            assert_eq!(queue.enqueue(&frame), Ok(()));
            assert_eq!(queue.tx_descs[i].length.read(), *len as u16);
            assert!(queue.tx_bufs.buffer(i)[..*len].iter().all(|&b| b == i as u8 + 1));
        }
        // tail mirrored after every advance, wrapping back to 0 when full
        assert_eq!(queue.regs.tdt_writes, vec![0, 1, 2, 3, 0]);

        assert_eq!(queue.enqueue(&[0xEE; 60]), Err(TransmitError::QueueOverflow));
        // overflow must not disturb the ring
        assert_eq!(queue.tx_cur, 0);
        assert_eq!(queue.regs.tdt, 0);
    }

    #[test]
    fn completed_slot_is_reused_in_exact_ring_order() {
        let mut queue = tx_queue(4);
        for _ in 0..4 {
            queue.enqueue(&[0xAA; 60]).unwrap();
        }
        assert_eq!(queue.enqueue(&[0xBB; 60]), Err(TransmitError::QueueOverflow));

        // completing a slot other than the one at the tail frees nothing
        complete_tx(&mut queue, 2);
        assert_eq!(queue.enqueue(&[0xBB; 60]), Err(TransmitError::QueueOverflow));

        complete_tx(&mut queue, 0);
        assert_eq!(queue.enqueue(&[0xBB; 60]), Ok(()));
        assert!(queue.tx_bufs.buffer(0)[..60].iter().all(|&b| b == 0xBB));
        assert_eq!(queue.regs.tdt, 1);
    }

    #[test]
    fn oversized_payload_is_truncated_to_the_buffer_capacity() {
        let mut queue = tx_queue(4);
        let frame: Vec<u8> = (0..4096u32).map(|b| b as u8).collect();
        queue.enqueue(&frame).unwrap();
        assert_eq!(queue.tx_descs[0].length.read(), TX_BUF_SIZE as u16);
        assert_eq!(queue.tx_bufs.buffer(0), &frame[..TX_BUF_SIZE]);
        // the neighboring slot's buffer is never overrun
        assert!(queue.tx_bufs.buffer(1).iter().all(|&b| b == 0));
    }

    #[test]
    fn queued_payload_survives_until_completion_without_corruption() {
        let mut queue = tx_queue(4);
        let frame: Vec<u8> = (0..777u32).map(|b| (b * 7) as u8).collect();
        queue.enqueue(&frame).unwrap();
        complete_tx(&mut queue, 0);
        assert_eq!(&queue.tx_bufs.buffer(0)[..frame.len()], &frame[..]);
        assert!(queue.tx_bufs.buffer(1).iter().all(|&b| b == 0));
    }

    #[test]
    fn rx_init_programs_ring_registers_and_binds_buffers() {
        let queue = rx_queue(8);
        let base = queue.rx_descs.start_address().value();
        assert_eq!(queue.regs.rdbal, base as u32);
        assert_eq!(queue.regs.rdbah, (base as u64 >> 32) as u32);
        assert_eq!(queue.regs.rdlen, 8 * 16);
        assert_eq!(queue.regs.rdh, 0);
        assert_eq!(queue.regs.rdt, 0);
        for slot in 0..8 {
            assert_eq!(
                queue.rx_descs[slot].phys_addr.read(),
                queue.rx_bufs.buffer_address(slot).value() as u64
            );
            assert!(!queue.rx_descs[slot].is_filled());
        }
    }

    #[test]
    fn try_receive_on_an_empty_ring_has_no_side_effects() {
        let mut queue = rx_queue(4);
        let rdt_writes_after_init = queue.regs.rdt_writes.len();
        let mut out = [0x55u8; RX_BUF_SIZE];
        for _ in 0..100 {
            assert_eq!(queue.try_receive(&mut out), Err(ReceiveError::QueueEmpty));
        }
        assert_eq!(queue.rx_cur, 0);
        assert_eq!(queue.regs.rdt_writes.len(), rdt_writes_after_init);
        assert!(out.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn try_receive_consumes_filled_slots_in_ring_order() {
        let mut queue = rx_queue(4);
        deliver_rx(&mut queue, 0, &[0x11; 64]);
        deliver_rx(&mut queue, 1, &[0x22; 128]);

        let mut out = [0u8; RX_BUF_SIZE];
        assert_eq!(queue.try_receive(&mut out), Ok(64));
        assert!(out[..64].iter().all(|&b| b == 0x11));
        // the consumed slot went back to the device: status cleared, tail on it
        assert!(!queue.rx_descs[0].is_filled());
        assert_eq!(queue.regs.rdt, 0);
        assert_eq!(queue.rx_cur, 1);

        assert_eq!(queue.try_receive(&mut out), Ok(128));
        assert!(out[..128].iter().all(|&b| b == 0x22));
        assert_eq!(queue.regs.rdt, 1);

        assert_eq!(queue.try_receive(&mut out), Err(ReceiveError::QueueEmpty));
    }

    #[test]
    fn rx_ring_wraps_around_and_reuses_slot_buffers() {
        let mut queue = rx_queue(4);
        let mut out = [0u8; RX_BUF_SIZE];
        for round in 0u8..2 {
            for slot in 0..4 {
                deliver_rx(&mut queue, slot, &[round * 16 + slot as u8; 60]);
            }
            for slot in 0..4 {
                assert_eq!(queue.try_receive(&mut out), Ok(60));
                assert!(out[..60].iter().all(|&b| b == round * 16 + slot as u8));
            }
        }
        assert_eq!(queue.rx_cur, 0);
    }

    #[test]
    fn try_receive_clamps_to_the_callers_buffer() {
        let mut queue = rx_queue(4);
        deliver_rx(&mut queue, 0, &[0x77; 512]);
        let mut out = [0u8; 100];
        assert_eq!(queue.try_receive(&mut out), Ok(100));
        assert!(out.iter().all(|&b| b == 0x77));
    }
}
