//! NyanOS: the Nyan Keys keyboard firmware core.
//!
//! This crate holds every piece of the board that carries real protocol or
//! state-machine behavior, kept free of register access so it runs on the
//! STM32 target and under the host test harness alike:
//!
//! - [`eeprom`]: chunked, bank-addressed driver for the 24xx configuration
//!   EEPROM with single-outstanding-transfer tracking and per-page retry
//! - [`ice`]: streaming bit-level decompressor for the compressed iCE40
//!   bitstream container
//! - [`fpga`]: the fetch/reset/decompress/confirm load sequence for the
//!   Lattice iCE40HX
//! - [`keys`] + [`hid`] + [`keymap`]: key-scan register protocol, warm-up
//!   filtering, and bitmap-to-HID-report rendering
//! - [`shell`]: the line-oriented NyanOS command console with its raw
//!   binary capture sub-mode
//! - [`bitcoin`]: the opt-in background block-header hasher
//!
//! Hardware shows up only as the narrow traits each module defines
//! ([`eeprom::EepromBus`], [`keys::KeysBus`], [`fpga::FpgaPort`],
//! [`shell::CdcPort`], [`shell::ShellPorts`]); the `firmware` crate
//! implements them over the real peripherals and the tests implement them
//! over recording mocks.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bitcoin;
pub mod eeprom;
pub mod eeprom_map;
pub mod fpga;
pub mod hid;
pub mod ice;
pub mod keymap;
pub mod keys;
pub mod shell;
pub mod strings;
