use core::fmt;
use nic_dma::{FromDmaBytes, PhysicalAddress};
use volatile::Volatile;

/* Legacy transmit descriptor command bits */
/// Tx Command: End of Packet
pub const TX_CMD_EOP: u8 = 1 << 0;
/// Tx Command: Insert FCS
pub const TX_CMD_IFCS: u8 = 1 << 1;
/// Tx Command: Insert Checksum
pub const TX_CMD_IC: u8 = 1 << 2;
/// Tx Command: Report Status
pub const TX_CMD_RS: u8 = 1 << 3;
/// Tx Status: Descriptor Done
pub const TX_STATUS_DD: u8 = 1 << 0;

/* Legacy receive descriptor status bits */
/// Rx Status: Descriptor Done
pub const RX_STATUS_DD: u8 = 1 << 0;
/// Rx Status: End of Packet
pub const RX_STATUS_EOP: u8 = 1 << 1;

/// The command pattern every transmit descriptor carries: end-of-packet,
/// insert the frame checksum, and report status on completion. The EOP bit
/// doubling as part of the free-slot check relies on this pattern being
/// present from ring init onward.
const TX_CMD_PATTERN: u8 = TX_CMD_EOP | TX_CMD_IFCS | TX_CMD_RS;

/// A descriptor that hands one transmit buffer back and forth between the
/// driver and the device.
///
/// A slot is software-owned (free to overwrite) iff its command field shows
/// end-of-packet reporting was requested *and* its status field shows the
/// device marked it done. Ring init establishes that state as a sentinel so
/// the first transmission finds every slot free.
pub trait TxDescriptor: FromDmaBytes {
    /// Binds this descriptor to its permanent buffer and pre-marks it as
    /// already completed.
    fn init(&mut self, buffer_addr: PhysicalAddress);

    /// Whether the buffer behind this descriptor may be overwritten.
    fn is_software_owned(&self) -> bool;

    /// Marks `length` bytes of the bound buffer ready to send and hands the
    /// slot to the device.
    fn prepare_for_transmit(&mut self, length: u16);
}

/// A descriptor that hands one receive buffer back and forth between the
/// device and the driver. The device owns the slot until it sets the
/// descriptor-done status bit; the driver returns the slot by clearing it.
pub trait RxDescriptor: FromDmaBytes {
    /// Binds this descriptor to its permanent buffer and clears its status,
    /// leaving the slot hardware-owned.
    fn init(&mut self, buffer_addr: PhysicalAddress);

    /// Whether the device has filled the buffer behind this descriptor.
    fn is_filled(&self) -> bool;

    /// The byte count the device recorded when it filled the buffer.
    fn frame_length(&self) -> u16;

    /// Returns the slot to the device so the bound buffer can take a future
    /// incoming frame.
    fn return_to_hardware(&mut self);
}

/// A legacy transmit descriptor, exactly 16 bytes, in the device's expected
/// byte layout. There is one instance per ring slot.
#[repr(C)]
pub struct LegacyTxDescriptor {
    /// The physical address of the transmit buffer bound to this slot;
    /// written once at ring init and never reassigned.
    pub phys_addr: Volatile<u64>,
    /// Length in bytes of the payload currently occupying the buffer.
    pub length: Volatile<u16>,
    pub cso: Volatile<u8>,
    pub cmd: Volatile<u8>,
    pub status: Volatile<u8>,
    pub css: Volatile<u8>,
    pub special: Volatile<u16>,
}

const _: () = assert!(core::mem::size_of::<LegacyTxDescriptor>() == 16);

unsafe impl FromDmaBytes for LegacyTxDescriptor {}

impl TxDescriptor for LegacyTxDescriptor {
    fn init(&mut self, buffer_addr: PhysicalAddress) {
        self.phys_addr.write(buffer_addr.value() as u64);
        self.length.write(0);
        self.cso.write(0);
        self.css.write(0);
        self.special.write(0);
        // sentinel: command pattern present and done bit set, so the slot
        // starts software-owned
        self.cmd.write(TX_CMD_PATTERN);
        self.status.write(TX_STATUS_DD);
    }

    fn is_software_owned(&self) -> bool {
        (self.cmd.read() & TX_CMD_EOP) != 0 && (self.status.read() & TX_STATUS_DD) != 0
    }

    fn prepare_for_transmit(&mut self, length: u16) {
        self.length.write(length);
        self.cmd.write(TX_CMD_PATTERN);
        // clearing the done bit hands the slot to the device
        self.status.write(0);
    }
}

impl fmt::Debug for LegacyTxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{addr: {:#X}, length: {}, cso: {}, cmd: {:#X}, status: {:#X}, css: {}, special: {}}}",
            self.phys_addr.read(), self.length.read(), self.cso.read(),
            self.cmd.read(), self.status.read(), self.css.read(), self.special.read())
    }
}

/// A legacy receive descriptor, exactly 16 bytes, in the device's expected
/// byte layout. There is one instance per ring slot.
#[repr(C)]
pub struct LegacyRxDescriptor {
    /// The physical address of the receive buffer bound to this slot;
    /// written once at ring init and never reassigned.
    pub phys_addr: Volatile<u64>,
    /// Length in bytes of the received frame, recorded by the device.
    pub length: Volatile<u16>,
    pub checksum: Volatile<u16>,
    pub status: Volatile<u8>,
    pub errors: Volatile<u8>,
    pub special: Volatile<u16>,
}

const _: () = assert!(core::mem::size_of::<LegacyRxDescriptor>() == 16);

unsafe impl FromDmaBytes for LegacyRxDescriptor {}

impl RxDescriptor for LegacyRxDescriptor {
    fn init(&mut self, buffer_addr: PhysicalAddress) {
        self.phys_addr.write(buffer_addr.value() as u64);
        self.status.write(0);
    }

    fn is_filled(&self) -> bool {
        (self.status.read() & RX_STATUS_DD) != 0
    }

    fn frame_length(&self) -> u16 {
        self.length.read()
    }

    fn return_to_hardware(&mut self) {
        self.status.write(0);
    }
}

impl fmt::Debug for LegacyRxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{addr: {:#X}, length: {}, checksum: {}, status: {:#X}, errors: {}, special: {}}}",
            self.phys_addr.read(), self.length.read(), self.checksum.read(),
            self.status.read(), self.errors.read(), self.special.read())
    }
}
