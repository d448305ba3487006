//! Driver for the e1000 family of network interface cards.
//!
//! The bus layer hands this driver an already-enabled device and an
//! already-mapped register window (see [`attach`]); everything after that is
//! expressed as reads and writes of the register structs in [`regs`] and of
//! the two descriptor rings. The driver is polled: the interrupt cause and
//! mask registers stay in the layout, but the embedding environment is
//! expected to drive [`NetworkInterfaceCard::try_receive`] from its own
//! scheduling loop (see the `net_relay` crate).

#![cfg_attr(not(test), no_std)]

pub mod regs;
use regs::*;

use intel_ethernet::descriptors::{LegacyRxDescriptor, LegacyTxDescriptor};
use log::{debug, error};
use network_interface_card::{NetworkInterfaceCard, ReceiveError, TransmitError};
use nic_dma::{MappedRegisters, MappedWindow};
use nic_queues::{RxQueue, RxQueueRegisters, TxQueue, TxQueueRegisters};
use spin::{Mutex, Once};

/// Vendor ID for Intel
pub const INTEL_VEND: u16 = 0x8086;
/// Device ID for the e1000 QEMU, Bochs, and VirtualBox emulated NICs
pub const E1000_DEV: u16 = 0x100E;

const E1000_NUM_RX_DESC: u16 = 64;
const E1000_NUM_TX_DESC: u16 = 64;

/// A transmit buffer holds at most one maximum-size Ethernet frame.
const E1000_TX_BUFFER_SIZE_IN_BYTES: usize = 1518;
/// Receive buffer size; must match the `RCTL_BSIZE_2048` size class written
/// into the receive control register.
const E1000_RX_BUFFER_SIZE_IN_BYTES: usize = 2048;

/// The size of the e1000's memory-mapped register region: 128 KiB.
pub const E1000_MAPPED_REGISTERS_SIZE_IN_BYTES: usize = 0x20000;

const GENERAL_REGISTERS_SIZE_IN_BYTES: usize = 8192;
const RX_REGISTERS_SIZE_IN_BYTES: usize = 4096;
const TX_REGISTERS_SIZE_IN_BYTES: usize = 4096;

/// The single instance of the e1000 NIC.
static E1000_NIC: Once<Mutex<E1000Nic>> = Once::new();

/// Returns a reference to the E1000Nic wrapped in a Mutex,
/// if it exists and has been initialized.
pub fn get_e1000_nic() -> Option<&'static Mutex<E1000Nic>> {
    E1000_NIC.get()
}

/// Initializes the e1000 found behind the given register `window` and stores
/// it as the driver singleton.
///
/// The window comes from the bus layer, which has already enabled the device
/// (bus mastering set) and mapped its BAR0 region. A window smaller than the
/// device's register region is a fatal configuration error.
pub fn attach(window: MappedWindow) -> Result<&'static Mutex<E1000Nic>, &'static str> {
    let nic = E1000Nic::init(window)?;
    Ok(E1000_NIC.call_once(|| Mutex::new(nic)))
}

/// A struct which contains the receive queue registers and implements the
/// `RxQueueRegisters` trait, which is required to store the registers in an
/// `RxQueue` object.
struct E1000RxQueueRegisters(MappedRegisters<E1000RxRegisters>);

impl RxQueueRegisters for E1000RxQueueRegisters {
    fn set_rdbal(&mut self, value: u32) {
        self.0.rx_regs.rdbal.write(value);
    }
    fn set_rdbah(&mut self, value: u32) {
        self.0.rx_regs.rdbah.write(value);
    }
    fn set_rdlen(&mut self, value: u32) {
        self.0.rx_regs.rdlen.write(value);
    }
    fn set_rdh(&mut self, value: u32) {
        self.0.rx_regs.rdh.write(value);
    }
    fn set_rdt(&mut self, value: u32) {
        self.0.rx_regs.rdt.write(value);
    }
}

/// A struct which contains the transmit queue registers and implements the
/// `TxQueueRegisters` trait, which is required to store the registers in a
/// `TxQueue` object.
struct E1000TxQueueRegisters(MappedRegisters<E1000TxRegisters>);

impl TxQueueRegisters for E1000TxQueueRegisters {
    fn set_tdbal(&mut self, value: u32) {
        self.0.tx_regs.tdbal.write(value);
    }
    fn set_tdbah(&mut self, value: u32) {
        self.0.tx_regs.tdbah.write(value);
    }
    fn set_tdlen(&mut self, value: u32) {
        self.0.tx_regs.tdlen.write(value);
    }
    fn set_tdh(&mut self, value: u32) {
        self.0.tx_regs.tdh.write(value);
    }
    fn set_tdt(&mut self, value: u32) {
        self.0.tx_regs.tdt.write(value);
    }
}

/// Struct representing an e1000 network interface card.
pub struct E1000Nic {
    /// The register window handed over by the bus layer; held here so the
    /// mapping-lifetime contract of the register views below stays visible.
    _window: MappedWindow,
    /// The actual MAC address burnt into the hardware of this E1000 NIC.
    mac_hardware: [u8; 6],
    /// The optional spoofed MAC address to use in place of `mac_hardware` when transmitting.
    mac_spoofed: Option<[u8; 6]>,
    /// Receive queue with descriptors
    rx_queue: RxQueue<E1000RxQueueRegisters, LegacyRxDescriptor>,
    /// Transmit queue with descriptors
    tx_queue: TxQueue<E1000TxQueueRegisters, LegacyTxDescriptor>,
    /// memory-mapped control registers
    regs: MappedRegisters<E1000Registers>,
    /// memory-mapped registers holding the MAC address
    mac_regs: MappedRegisters<E1000MacRegisters>,
}

impl E1000Nic {
    /// Reads the current value of the device status register.
    pub fn device_status(&self) -> u32 {
        self.regs.status.read()
    }

    /// Re-reads the MAC address burned into the hardware, discarding any
    /// spoofed override.
    pub fn reset_mac(&mut self) {
        self.mac_spoofed = None;
        self.mac_hardware = Self::read_mac_address_from_nic(&self.mac_regs);
    }
}

impl NetworkInterfaceCard for E1000Nic {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        self.tx_queue.enqueue(frame)
    }

    fn try_receive(&mut self, out: &mut [u8]) -> Result<usize, ReceiveError> {
        self.rx_queue.try_receive(out)
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac_spoofed.unwrap_or(self.mac_hardware)
    }
}

/// Functions that set up the NIC struct and its rings.
impl E1000Nic {
    /// Initializes a new e1000 network interface card behind the given
    /// register `window`, without touching the driver singleton.
    pub fn init(window: MappedWindow) -> Result<E1000Nic, &'static str> {
        if window.size_in_bytes() < E1000_MAPPED_REGISTERS_SIZE_IN_BYTES {
            error!(
                "e1000::init(): register window of {} bytes is smaller than the device's {} byte region",
                window.size_in_bytes(),
                E1000_MAPPED_REGISTERS_SIZE_IN_BYTES,
            );
            return Err("e1000: mapped register window is too small");
        }

        let (mut mapped_registers, rx_registers, tx_registers, mac_registers) =
            Self::map_e1000_regs(&window)?;
        debug!("e1000::init(): device status register: {:#X}", mapped_registers.status.read());

        Self::start_link(&mut mapped_registers);

        let mac_hardware = Self::read_mac_address_from_nic(&mac_registers);

        let rx_queue = Self::rx_init(&mut mapped_registers, E1000RxQueueRegisters(rx_registers))?;
        let tx_queue = Self::tx_init(&mut mapped_registers, E1000TxQueueRegisters(tx_registers))?;

        Ok(E1000Nic {
            _window: window,
            mac_hardware,
            mac_spoofed: None,
            rx_queue,
            tx_queue,
            regs: mapped_registers,
            mac_regs: mac_registers,
        })
    }

    /// Carves the 4 register block views out of the mapped window.
    fn map_e1000_regs(
        window: &MappedWindow,
    ) -> Result<(
        MappedRegisters<E1000Registers>,
        MappedRegisters<E1000RxRegisters>,
        MappedRegisters<E1000TxRegisters>,
        MappedRegisters<E1000MacRegisters>,
    ), &'static str> {
        // The 4 blocks tile the 128 KiB register region without overlapping,
        // which is what makes handing out the views sound.
        unsafe {
            let regs = window.as_type_mut::<E1000Registers>(0)?;
            let rx_regs = window.as_type_mut::<E1000RxRegisters>(GENERAL_REGISTERS_SIZE_IN_BYTES)?;
            let tx_regs = window.as_type_mut::<E1000TxRegisters>(
                GENERAL_REGISTERS_SIZE_IN_BYTES + RX_REGISTERS_SIZE_IN_BYTES,
            )?;
            let mac_regs = window.as_type_mut::<E1000MacRegisters>(
                GENERAL_REGISTERS_SIZE_IN_BYTES + RX_REGISTERS_SIZE_IN_BYTES + TX_REGISTERS_SIZE_IN_BYTES,
            )?;
            Ok((regs, rx_regs, tx_regs, mac_regs))
        }
    }

    /// Reads the actual MAC address burned into the NIC hardware.
    fn read_mac_address_from_nic(regs: &E1000MacRegisters) -> [u8; 6] {
        let mac_32_low = regs.ral.read();
        let mac_32_high = regs.rah.read();

        let mut mac_addr = [0; 6];
        mac_addr[0] = mac_32_low as u8;
        mac_addr[1] = (mac_32_low >> 8) as u8;
        mac_addr[2] = (mac_32_low >> 16) as u8;
        mac_addr[3] = (mac_32_low >> 24) as u8;
        mac_addr[4] = mac_32_high as u8;
        mac_addr[5] = (mac_32_high >> 8) as u8;

        debug!("e1000: read hardware MAC address: {:02x?}", mac_addr);
        mac_addr
    }

    /// Sets the given spoofed MAC address, to be used in place of the
    /// hardware one from now on.
    pub fn spoof_mac(&mut self, spoofed_mac_addr: [u8; 6]) {
        self.mac_spoofed = Some(spoofed_mac_addr);
    }

    /// Start up the network link.
    fn start_link(regs: &mut E1000Registers) {
        let val = regs.ctrl.read();
        regs.ctrl.write(val | CTRL_SLU | CTRL_ASDE);

        let val = regs.ctrl.read();
        regs.ctrl.write(val & !CTRL_LRST & !CTRL_ILOS & !CTRL_VME & !CTRL_PHY_RST);

        debug!("e1000::start_link(): REG_CTRL: {:#X}", regs.ctrl.read());
    }

    /// Initializes the receive ring and programs the receive control register.
    fn rx_init(
        regs: &mut E1000Registers,
        rx_regs: E1000RxQueueRegisters,
    ) -> Result<RxQueue<E1000RxQueueRegisters, LegacyRxDescriptor>, &'static str> {
        let mut rx_queue = RxQueue::new(0, rx_regs, E1000_NUM_RX_DESC, E1000_RX_BUFFER_SIZE_IN_BYTES)?;

        // Write the tail index.
        // Note that the e1000 SDM states that we should set the RDT (tail index) to the index *beyond* the last receive descriptor,
        // so if you have 64 rx descs, you will set it to 64.
        // However, this causes problems during the first burst of ethernet packets,
        // because the `rx_cur` counter won't be able to catch up with the head index properly.
        // Thus, we set it to one less than that in order to prevent such bugs.
        // This doesn't prevent all of the rx buffers from being used, they will still all be used fully.
        rx_queue.regs.set_rdt((E1000_NUM_RX_DESC - 1) as u32);

        // enable the receiver: accept broadcast frames, use the fixed 2048
        // byte buffer class, and strip the trailing frame checksum
        regs.rctl.write(RCTL_EN | RCTL_BAM | RCTL_LBM_NONE | RTCL_RDMTS_HALF | RCTL_BSIZE_2048 | RCTL_SECRC);

        Ok(rx_queue)
    }

    /// Initializes the transmit ring and programs the transmit control and
    /// inter-packet gap registers.
    fn tx_init(
        regs: &mut E1000Registers,
        tx_regs: E1000TxQueueRegisters,
    ) -> Result<TxQueue<E1000TxQueueRegisters, LegacyTxDescriptor>, &'static str> {
        let tx_queue = TxQueue::new(0, tx_regs, E1000_NUM_TX_DESC, E1000_TX_BUFFER_SIZE_IN_BYTES)?;
        regs.tctl.write(TCTL_EN | TCTL_PSP);
        regs.tipg.write(TIPG_IPGT | TIPG_IPGR1 | TIPG_IPGR2);
        Ok(tx_queue)
    }
}
