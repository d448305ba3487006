//! The structs used to access the e1000's memory-mapped registers, and the
//! configuration values written to them.
//!
//! The registers are divided into multiple structs because the receive and
//! transmit queue registers are stored separately in the per-queue objects.
//! Though the e1000 device only has 1 pair of receive and transmit queues, we
//! still structure the design this way to be able to use code shared by all
//! network drivers.
//!
//! The 4 structs which cover the registers of the entire memory-mapped region are:
//! * `E1000Registers`
//! * `E1000RxRegisters`
//! * `E1000TxRegisters`
//! * `E1000MacRegisters`

use nic_dma::FromDmaBytes;
use volatile::{ReadOnly, Volatile};

/// The layout in memory of the first set of e1000 registers.
#[repr(C)]
pub struct E1000Registers {
    /// Device control register
    pub ctrl:                       Volatile<u32>,          // 0x0
    _padding0:                      [u8; 4],                // 0x4 - 0x7
    /// Device status register
    pub status:                     ReadOnly<u32>,          // 0x8
    _padding1:                      [u8; 180],              // 0xC - 0xBF,  180 bytes

    /// Interrupt cause read register; reading it clears pending interrupts
    pub icr:                        ReadOnly<u32>,          // 0xC0
    _padding2:                      [u8; 12],               // 0xC4 - 0xCF
    /// Interrupt mask set register
    pub ims:                        Volatile<u32>,          // 0xD0
    _padding3:                      [u8; 44],               // 0xD4 - 0xFF

    /// Receive control register
    pub rctl:                       Volatile<u32>,          // 0x100
    _padding4:                      [u8; 764],              // 0x104 - 0x3FF,  764 bytes

    /// Transmit control register
    pub tctl:                       Volatile<u32>,          // 0x400
    _padding5:                      [u8; 12],               // 0x404 - 0x40F
    /// Transmit inter-packet gap register
    pub tipg:                       Volatile<u32>,          // 0x410
    _padding6:                      [u8; 7148],             // 0x414 - 0x1FFF
} // 2 4KiB pages

const _: () = assert!(core::mem::size_of::<E1000Registers>() == 2 * 4096);

unsafe impl FromDmaBytes for E1000Registers {}

/// The layout in memory of the e1000 receive queue registers.
#[repr(C)]
pub struct E1000RxRegisters {
    _padding7:                      [u8; 2048],             // 0x2000 - 0x27FF

    /// Registers of the single receive queue
    pub rx_regs:                    RegistersRx,            // 0x2800
    _padding8:                      [u8; 2020],             // 0x281C - 0x2FFF
} // 1 4KiB page

const _: () = assert!(core::mem::size_of::<E1000RxRegisters>() == 4096);

unsafe impl FromDmaBytes for E1000RxRegisters {}

/// The layout in memory of the e1000 transmit queue registers.
#[repr(C)]
pub struct E1000TxRegisters {
    _padding9:                      [u8; 2048],             // 0x3000 - 0x37FF

    /// Registers of the single transmit queue
    pub tx_regs:                    RegistersTx,            // 0x3800
    _padding10:                     [u8; 2020],             // 0x381C - 0x3FFF
} // 1 4KiB page

const _: () = assert!(core::mem::size_of::<E1000TxRegisters>() == 4096);

unsafe impl FromDmaBytes for E1000TxRegisters {}

/// The layout in memory of the e1000 MAC address registers.
#[repr(C)]
pub struct E1000MacRegisters {
    _padding11:                     [u8; 5120],             // 0x4000 - 0x53FF

    /// The lower (least significant) 32 bits of the NIC's MAC hardware address.
    pub ral:                        Volatile<u32>,          // 0x5400
    /// The higher (most significant) 32 bits of the NIC's MAC hardware address.
    pub rah:                        Volatile<u32>,          // 0x5404
    _padding12:                     [u8; 109560],           // 0x5408 - 0x1FFFF,  109560 bytes
    // End of all register structs should be at offset 0x20000 (128 KiB in total size).
} // 28 4KiB pages

const _: () = assert!(core::mem::size_of::<E1000MacRegisters>() == 28 * 4096);

unsafe impl FromDmaBytes for E1000MacRegisters {}

// check that the sum of all the register structs is equal to the memory of the e1000 device (128 KiB).
const _: () = assert!(
    core::mem::size_of::<E1000Registers>()
    + core::mem::size_of::<E1000RxRegisters>()
    + core::mem::size_of::<E1000TxRegisters>()
    + core::mem::size_of::<E1000MacRegisters>()
    == 0x20000
);

/// Struct that holds registers related to one receive queue.
#[repr(C)]
pub struct RegistersRx {
    /// The lower (least significant) 32 bits of the physical address of the array of receive descriptors.
    pub rdbal:                      Volatile<u32>,          // 0x2800
    /// The higher (most significant) 32 bits of the physical address of the array of receive descriptors.
    pub rdbah:                      Volatile<u32>,          // 0x2804
    /// The length in bytes of the array of receive descriptors.
    pub rdlen:                      Volatile<u32>,          // 0x2808
    _padding0:                      [u8; 4],                // 0x280C - 0x280F
    /// The receive descriptor head index, maintained by the device.
    pub rdh:                        Volatile<u32>,          // 0x2810
    _padding1:                      [u8; 4],                // 0x2814 - 0x2817
    /// The receive descriptor tail index, maintained by software.
    pub rdt:                        Volatile<u32>,          // 0x2818
}

unsafe impl FromDmaBytes for RegistersRx {}

/// Struct that holds registers related to one transmit queue.
#[repr(C)]
pub struct RegistersTx {
    /// The lower (least significant) 32 bits of the physical address of the array of transmit descriptors.
    pub tdbal:                      Volatile<u32>,          // 0x3800
    /// The higher (most significant) 32 bits of the physical address of the array of transmit descriptors.
    pub tdbah:                      Volatile<u32>,          // 0x3804
    /// The length in bytes of the array of transmit descriptors.
    pub tdlen:                      Volatile<u32>,          // 0x3808
    _padding0:                      [u8; 4],                // 0x380C - 0x380F
    /// The transmit descriptor head index, maintained by the device.
    pub tdh:                        Volatile<u32>,          // 0x3810
    _padding1:                      [u8; 4],                // 0x3814 - 0x3817
    /// The transmit descriptor tail index, maintained by software.
    pub tdt:                        Volatile<u32>,          // 0x3818
}

unsafe impl FromDmaBytes for RegistersTx {}

/* Register offsets relative to the mapped base, for reference and tests. */
pub const REG_CTRL:                 u32 = 0x0000;
pub const REG_STATUS:               u32 = 0x0008;
pub const REG_ICR:                  u32 = 0x00C0;
pub const REG_IMASK:                u32 = 0x00D0;
pub const REG_RCTRL:                u32 = 0x0100;
pub const REG_RXDESCLO:             u32 = 0x2800;
pub const REG_RXDESCHI:             u32 = 0x2804;
pub const REG_RXDESCLEN:            u32 = 0x2808;
pub const REG_RXDESCHEAD:           u32 = 0x2810;
pub const REG_RXDESCTAIL:           u32 = 0x2818;

pub const REG_TCTRL:                u32 = 0x0400;
pub const REG_TIPG:                 u32 = 0x0410;
pub const REG_TXDESCLO:             u32 = 0x3800;
pub const REG_TXDESCHI:             u32 = 0x3804;
pub const REG_TXDESCLEN:            u32 = 0x3808;
pub const REG_TXDESCHEAD:           u32 = 0x3810;
pub const REG_TXDESCTAIL:           u32 = 0x3818;

pub const REG_RAL:                  u32 = 0x5400;
pub const REG_RAH:                  u32 = 0x5404;

// CTRL commands
/// Auto-Speed Detection Enable
pub const CTRL_ASDE:                u32 = 1 << 5;
/// Set Link Up
pub const CTRL_SLU:                 u32 = 1 << 6;
pub const CTRL_LRST:                u32 = 1 << 3;
pub const CTRL_ILOS:                u32 = 1 << 7;
pub const CTRL_VME:                 u32 = 1 << 30;
pub const CTRL_PHY_RST:             u32 = 1 << 31;

// RCTL commands
/// Receiver Enable
pub const RCTL_EN:                  u32 = 1 << 1;
/// Store Bad Packets
pub const RCTL_SBP:                 u32 = 1 << 2;
/// Unicast Promiscuous Enabled
pub const RCTL_UPE:                 u32 = 1 << 3;
/// Multicast Promiscuous Enabled
pub const RCTL_MPE:                 u32 = 1 << 4;
/// Long Packet Reception Enable
pub const RCTL_LPE:                 u32 = 1 << 5;
/// No Loopback
pub const RCTL_LBM_NONE:            u32 = 0 << 6;
/// Free Buffer Threshold is 1/2 of RDLEN
pub const RTCL_RDMTS_HALF:          u32 = 0 << 8;
/// Broadcast Accept Mode
pub const RCTL_BAM:                 u32 = 1 << 15;
/// Strip Ethernet CRC from incoming packets
pub const RCTL_SECRC:               u32 = 1 << 26;

// Buffer size classes
pub const RCTL_BSIZE_256:           u32 = 3 << 16;
pub const RCTL_BSIZE_512:           u32 = 2 << 16;
pub const RCTL_BSIZE_1024:          u32 = 1 << 16;
pub const RCTL_BSIZE_2048:          u32 = 0 << 16;
pub const RCTL_BSIZE_4096:          u32 = (3 << 16) | (1 << 25);
pub const RCTL_BSIZE_8192:          u32 = (2 << 16) | (1 << 25);
pub const RCTL_BSIZE_16384:         u32 = (1 << 16) | (1 << 25);

// TCTL commands
/// Transmit Enable
pub const TCTL_EN:                  u32 = 1 << 1;
/// Pad Short Packets
pub const TCTL_PSP:                 u32 = 1 << 3;

// TIPG timing fields, standard values for IEEE 802.3
/// IPG Transmit Time
pub const TIPG_IPGT:                u32 = 10;
/// IPG Receive Time 1
pub const TIPG_IPGR1:               u32 = 8 << 10;
/// IPG Receive Time 2
pub const TIPG_IPGR2:               u32 = 6 << 20;
