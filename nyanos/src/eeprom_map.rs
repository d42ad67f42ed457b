//! Persistent record layout of the configuration EEPROM.
//!
//! The low bank holds small metadata records in 16-byte-aligned slots; the
//! high bank is a flat 8 KiB region reserved for the compressed FPGA
//! bitstream. Addresses are byte offsets within the selected bank.

// Low bank: board properties
pub const ADDR_BOARD_SERIAL_NUMBER: u16 = 0x0000;
pub const ADDR_BOARD_OWNER: u16 = 0x0020;
pub const ADDR_BOARD_BUILD_BLOCK: u16 = 0x0060;
pub const ADDR_BOARD_VERSION: u16 = 0x0070;
pub const ADDR_TOTAL_KEYSTROKES: u16 = 0x0080;
pub const ADDR_TOTAL_USB_CONNECTIONS: u16 = 0x0090;
pub const ADDR_TOTAL_TIMES_POWERED_ON: u16 = 0x00A0;
pub const ADDR_FPGA_BITSTREAM_LEN: u16 = 0x00B0;

/// Reserved slot reused to persist the super-key disablement state.
pub const ADDR_SUPER_KEY_DISABLE: u16 = 0x00C0;

// High bank: compressed FPGA bitstream
pub const ADDR_FPGA_BITSTREAM: u16 = 0x0000;

pub const SIZE_BOARD_SERIAL_NUMBER: usize = 32;
pub const SIZE_BOARD_OWNER: usize = 64;
pub const SIZE_BOARD_BUILD_BLOCK: usize = 16;
pub const SIZE_BOARD_VERSION: usize = 16;
pub const SIZE_TOTAL_KEYSTROKES: usize = 16;
pub const SIZE_TOTAL_USB_CONNECTIONS: usize = 16;
pub const SIZE_TOTAL_TIMES_POWERED_ON: usize = 16;
pub const SIZE_FPGA_BITSTREAM_LEN: usize = 16;
pub const SIZE_SUPER_KEY_DISABLE: usize = 1;
pub const SIZE_FPGA_BITSTREAM: usize = 8192;

/// Byte offset of the little-endian `u16` bitstream length within its
/// 16-byte slot.
pub const BITSTREAM_LEN_SLOT_OFFSET: usize = 12;
