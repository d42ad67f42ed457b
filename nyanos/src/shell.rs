//! NyanOS, the console shell on the CDC serial interface.
//!
//! Input bytes arrive from the transport in arbitrary-sized bursts. In the
//! ready state they are line-edited into a command buffer and decoded on
//! enter; a decoded command executes later, from the scheduler tick, and
//! only while no transmit is in flight. Commands that take a raw payload
//! (bitstream upload, miner field values) switch the shell into a capture
//! state: every subsequent input byte lands in a preallocated buffer, and
//! when the buffer fills the captured payload is handed to the command's
//! continuation. There is no capture timeout or abort; the only way out is
//! filling the buffer.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write as _;
use core::mem;

use sha2::{Digest, Sha256};

use crate::bitcoin::{
    NyanBitcoin, FIELD_MERKLE_ROOT_LEN, FIELD_NBITS_LEN, FIELD_NONCE_LEN, FIELD_PRV_HASH_LEN,
    FIELD_TIMESTAMP_LEN, FIELD_VERSION_LEN,
};
use crate::eeprom::{Eeprom, EepromBus};
use crate::eeprom_map::{
    ADDR_BOARD_OWNER, ADDR_FPGA_BITSTREAM, ADDR_FPGA_BITSTREAM_LEN, BITSTREAM_LEN_SLOT_OFFSET,
    SIZE_BOARD_OWNER, SIZE_FPGA_BITSTREAM_LEN,
};
use crate::fpga::LatticeIceHx;
use crate::keys::NyanKeys;
use crate::strings;

/// Command line buffer length; further printables are dropped once full.
pub const CMD_BUF_LEN: usize = 128;
/// Maximum tokens kept from one command line, command word included.
pub const CMD_MAX_ARGS: usize = 10;
/// Largest single CDC transmit.
pub const CDC_TX_MAX_LEN: usize = 128;
/// Output buffer cap; prints past this are dropped.
pub const TX_BUFFER_CAP: usize = 2048;
/// Welcome guard window, in guard ticks.
pub const WELCOME_GUARD_TICKS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellError {
    /// A capture is already collecting a payload.
    CaptureBusy,
    /// The capture buffer could not be allocated.
    Alloc,
}

/// Continuation run when a capture buffer fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureSink {
    Bitstream,
    MinerField(MinerField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MinerField {
    Version,
    PrvBlockHeaderHash,
    MerkleRootHash,
    Timestamp,
    Nbits,
    Nonce,
}

impl MinerField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "version" => Some(Self::Version),
            "prv-block-header-hash" => Some(Self::PrvBlockHeaderHash),
            "merkle-root-hash" => Some(Self::MerkleRootHash),
            "timestamp" => Some(Self::Timestamp),
            "nbits" => Some(Self::Nbits),
            "nonce" => Some(Self::Nonce),
            _ => None,
        }
    }

    fn len(self) -> usize {
        match self {
            Self::Version => FIELD_VERSION_LEN,
            Self::PrvBlockHeaderHash => FIELD_PRV_HASH_LEN,
            Self::MerkleRootHash => FIELD_MERKLE_ROOT_LEN,
            Self::Timestamp => FIELD_TIMESTAMP_LEN,
            Self::Nbits => FIELD_NBITS_LEN,
            Self::Nonce => FIELD_NONCE_LEN,
        }
    }
}

enum ShellState {
    Ready,
    Capture {
        buf: Vec<u8>,
        target: usize,
        sink: CaptureSink,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exe {
    Idle,
    Help,
    GetInfo,
    GetPerf,
    SetOwner,
    WriteBitstream,
    BitcoinMinerSet,
    Dfu,
    CommandNotSupported,
}

/// Command table; decode takes the first prefix match in this order.
const COMMANDS: [(&str, Exe); 7] = [
    ("help", Exe::Help),
    ("getinfo", Exe::GetInfo),
    ("getperf", Exe::GetPerf),
    ("set-owner", Exe::SetOwner),
    ("write-bitstream", Exe::WriteBitstream),
    ("bitcoin-miner-set", Exe::BitcoinMinerSet),
    ("dfumode", Exe::Dfu),
];

/// Transport seam for console output. One transmit may be outstanding;
/// completion comes back through [`NyanOs::on_tx_complete`].
pub trait CdcPort {
    fn transmit(&mut self, data: &[u8]);
}

/// Board-level collaborator seam.
pub trait ShellPorts {
    /// Reboot into the ROM DFU loader.
    fn enter_dfu(&mut self);
}

pub struct NyanOs {
    state: ShellState,
    exe: Exe,
    command_buffer: [u8; CMD_BUF_LEN],
    command_buffer_pos: usize,
    args: Vec<String>,
    tx_buffer: Vec<u8>,
    tx_chunks_solid: usize,
    tx_chunks_partial_bytes: usize,
    tx_chunk: usize,
    tx_inflight: bool,
    send_welcome_screen: bool,
    welcome_guard: u32,
    dfu_pending: bool,
}

impl NyanOs {
    pub fn new() -> Self {
        Self {
            state: ShellState::Ready,
            exe: Exe::Idle,
            command_buffer: [0; CMD_BUF_LEN],
            command_buffer_pos: 0,
            args: Vec::new(),
            tx_buffer: Vec::new(),
            tx_chunks_solid: 0,
            tx_chunks_partial_bytes: 0,
            tx_chunk: 0,
            tx_inflight: false,
            send_welcome_screen: false,
            welcome_guard: 0,
            dfu_pending: false,
        }
    }

    // ---- transport input ----

    /// Feed received console bytes in. In the ready state this is line
    /// editing with echo; in a capture it fills the payload buffer and
    /// nothing else.
    pub fn add_input_buffer(&mut self, data: &[u8]) {
        if let ShellState::Capture { buf, target, .. } = &mut self.state {
            for &byte in data {
                if buf.len() < *target {
                    buf.push(byte);
                }
            }
            return;
        }

        for &byte in data {
            match byte {
                0x08 | 0x7F if self.command_buffer_pos > 0 => {
                    self.print(b"\x08 \x08");
                    self.command_buffer_pos -= 1;
                    self.command_buffer[self.command_buffer_pos] = 0;
                }
                b'\r' | b'\n' => {
                    self.decode();
                    self.clear_command_buffer();
                    self.print(strings::NEWLINE.as_bytes());
                    break;
                }
                _ if self.command_buffer_pos >= CMD_BUF_LEN - 1 => {
                    // Line full: drop further printables silently.
                }
                0x20..=0x7E => {
                    self.command_buffer[self.command_buffer_pos] = byte;
                    self.command_buffer_pos += 1;
                    self.print(&[byte]);
                }
                _ => {}
            }
        }
    }

    fn clear_command_buffer(&mut self) {
        self.command_buffer = [0; CMD_BUF_LEN];
        self.command_buffer_pos = 0;
    }

    /// Match the line against the command table and tokenize the args.
    fn decode(&mut self) {
        let len = self.command_buffer_pos;
        let mut matched = Exe::CommandNotSupported;
        for (name, exe) in &COMMANDS {
            if self.command_buffer[..len].starts_with(name.as_bytes()) {
                matched = *exe;
                break;
            }
        }
        if matched != Exe::CommandNotSupported {
            self.args.clear();
            for token in self.command_buffer[..len]
                .split(|&b| b == b' ')
                .filter(|t| !t.is_empty())
                .take(CMD_MAX_ARGS)
            {
                self.args.push(String::from_utf8_lossy(token).into_owned());
            }
        }
        self.exe = matched;
    }

    // ---- transport output ----

    /// Append to the output buffer and recompute the chunk bookkeeping.
    /// Prints that would exceed the buffer cap are dropped whole.
    pub fn print(&mut self, data: &[u8]) {
        if self.tx_buffer.len() + data.len() > TX_BUFFER_CAP {
            return;
        }
        self.tx_buffer.extend_from_slice(data);
        self.tx_chunks_solid = self.tx_buffer.len() / CDC_TX_MAX_LEN;
        self.tx_chunks_partial_bytes = self.tx_buffer.len() % CDC_TX_MAX_LEN;
    }

    /// Send at most one chunk of pending output, oldest first. The final
    /// chunk is the partial remainder, or a whole chunk when the buffer
    /// size divides evenly.
    pub fn cdc_tx<P: CdcPort>(&mut self, port: &mut P) {
        let mut total_chunks = self.tx_chunks_solid;
        if self.tx_chunks_partial_bytes != 0 {
            total_chunks += 1;
        }
        if total_chunks == 0 || self.tx_inflight {
            return;
        }

        let offset = self.tx_chunk * CDC_TX_MAX_LEN;
        let length = if self.tx_chunk == total_chunks - 1 {
            if self.tx_chunks_partial_bytes != 0 {
                self.tx_chunks_partial_bytes
            } else {
                CDC_TX_MAX_LEN
            }
        } else {
            CDC_TX_MAX_LEN
        };

        port.transmit(&self.tx_buffer[offset..offset + length]);
        self.tx_inflight = true;
        self.tx_chunk += 1;

        if self.tx_chunk >= total_chunks {
            self.tx_buffer.clear();
            self.tx_chunks_solid = 0;
            self.tx_chunks_partial_bytes = 0;
            self.tx_chunk = 0;
        }
    }

    /// Transmit-complete callback from the transport.
    pub fn on_tx_complete(&mut self) {
        self.tx_inflight = false;
    }

    // ---- welcome screen ----

    /// Transport connect callback.
    pub fn on_connect(&mut self) {
        self.send_welcome_screen = true;
    }

    /// Print the welcome screen if one is due. The guard counter permits
    /// two prints per guard window; hosts open the port twice on connect.
    pub fn welcome_display(&mut self) {
        if !self.send_welcome_screen {
            return;
        }
        self.send_welcome_screen = false;
        let guard = self.welcome_guard;
        self.welcome_guard += 1;
        if guard <= 1 {
            self.print(strings::WELCOME_TEXT.as_bytes());
            self.prompt();
        }
    }

    /// Periodic guard tick; closes the welcome guard window after
    /// [`WELCOME_GUARD_TICKS`].
    pub fn welcome_guard_tick(&mut self) {
        if self.welcome_guard > 0 {
            self.welcome_guard += 1;
            if self.welcome_guard > WELCOME_GUARD_TICKS {
                self.welcome_guard = 0;
            }
        }
    }

    // ---- execution ----

    /// Scheduler entry: finish a filled capture, or run the pending
    /// command. Never runs while output is draining.
    pub fn execute<B: EepromBus, P: ShellPorts>(
        &mut self,
        eeprom: &mut Eeprom,
        bus: &mut B,
        fpga: &mut LatticeIceHx,
        miner: &mut NyanBitcoin,
        keys: &NyanKeys,
        ports: &mut P,
    ) {
        if self.tx_inflight {
            return;
        }

        // The reboot warning must reach the host before the reset fires;
        // hold the reset until the output buffer has fully drained.
        if self.dfu_pending {
            if self.tx_buffer.is_empty() {
                ports.enter_dfu();
            }
            return;
        }

        if let ShellState::Capture { buf, target, .. } = &self.state {
            if buf.len() == *target {
                self.finish_capture(eeprom, bus, fpga, miner);
            }
            return;
        }

        let exe = mem::replace(&mut self.exe, Exe::Idle);
        match exe {
            Exe::Idle => {}
            Exe::Help => {
                self.print(strings::HELP.as_bytes());
                self.print(strings::NEWLINE.as_bytes());
                self.prompt();
            }
            Exe::GetInfo => {
                self.exe_getinfo(eeprom, bus);
                self.print(strings::NEWLINE.as_bytes());
                self.prompt();
            }
            Exe::GetPerf => {
                self.exe_getperf(keys);
                self.print(strings::NEWLINE.as_bytes());
                self.prompt();
            }
            Exe::SetOwner => {
                self.exe_set_owner(eeprom, bus);
                self.prompt();
            }
            Exe::WriteBitstream => {
                self.exe_write_bitstream(eeprom, bus);
                self.prompt();
            }
            Exe::BitcoinMinerSet => {
                self.exe_bitcoin_miner_set(miner);
                self.prompt();
            }
            Exe::Dfu => {
                self.print(strings::ENTER_DFU_MODE_REBOOT_WARNING.as_bytes());
                self.dfu_pending = true;
            }
            Exe::CommandNotSupported => {
                self.print(strings::UNKNOWN_COMMAND.as_bytes());
                self.print(strings::NEWLINE.as_bytes());
                self.prompt();
            }
        }
    }

    fn prompt(&mut self) {
        self.print(strings::PATH_TEXT.as_bytes());
    }

    fn exe_getinfo<B: EepromBus>(&mut self, eeprom: &mut Eeprom, bus: &mut B) {
        self.print(strings::GETINFO.as_bytes());
        self.print(strings::GETINFO_OWNER.as_bytes());
        if let Ok(record) = eeprom.read_blocking(bus, false, ADDR_BOARD_OWNER, SIZE_BOARD_OWNER) {
            let end = record.iter().position(|&b| b == 0).unwrap_or(record.len());
            let owner: Vec<u8> = record[..end].to_vec();
            self.print(&owner);
        }
        self.print(strings::NEWLINE.as_bytes());
    }

    fn exe_getperf(&mut self, keys: &NyanKeys) {
        self.print(strings::GETPERF_LINE1.as_bytes());
        self.print(strings::GETPERF_LINE2.as_bytes());
        self.print(strings::GETPERF_TIMES_SCANNED.as_bytes());
        let count = keys.scans_last_second.to_string();
        self.print(count.as_bytes());
        self.print(strings::NEWLINE.as_bytes());
    }

    /// Join the args back into the owner name and write the record, all or
    /// nothing: a name that does not fit leaves the record untouched.
    fn exe_set_owner<B: EepromBus>(&mut self, eeprom: &mut Eeprom, bus: &mut B) {
        if self.args.len() < 2 {
            self.print(strings::SET_OWNER_ERROR_LENGTH.as_bytes());
            return;
        }
        let name = self.args[1..].join(" ");
        // One byte stays reserved as the record terminator.
        if name.is_empty() || name.len() > SIZE_BOARD_OWNER - 1 {
            self.print(strings::SET_OWNER_ERROR_LENGTH.as_bytes());
            return;
        }

        let mut record = [0u8; SIZE_BOARD_OWNER];
        record[..name.len()].copy_from_slice(name.as_bytes());
        if eeprom.write_paged(bus, false, ADDR_BOARD_OWNER, &record).is_ok() {
            self.print(strings::SET_OWNER_SUCCESS.as_bytes());
        } else {
            self.print(strings::SET_OWNER_ERROR_LENGTH.as_bytes());
        }
    }

    /// Validate the announced size, persist the length record, then open a
    /// capture for the payload. Size 0 and anything past the 16-bit range
    /// are rejected before any allocation or state change.
    fn exe_write_bitstream<B: EepromBus>(&mut self, eeprom: &mut Eeprom, bus: &mut B) {
        let size = self
            .args
            .get(1)
            .and_then(|arg| arg.parse::<u32>().ok())
            .unwrap_or(0);
        if size == 0 || size > u16::MAX as u32 {
            self.print(strings::WRITE_BITSTREAM_ERROR_SIZE.as_bytes());
            return;
        }

        let mut record = [0u8; SIZE_FPGA_BITSTREAM_LEN];
        record[BITSTREAM_LEN_SLOT_OFFSET..BITSTREAM_LEN_SLOT_OFFSET + 4]
            .copy_from_slice(&size.to_le_bytes());
        if eeprom
            .write_paged(bus, false, ADDR_FPGA_BITSTREAM_LEN, &record)
            .is_err()
        {
            self.print(strings::WRITE_BITSTREAM_ERROR_STORAGE.as_bytes());
            return;
        }

        match self.enter_capture(size as usize, CaptureSink::Bitstream) {
            Ok(()) => self.print(strings::WRITE_BITSTREAM_START.as_bytes()),
            Err(_) => self.print(strings::WRITE_BITSTREAM_ERROR_ALLOC.as_bytes()),
        }
    }

    fn exe_bitcoin_miner_set(&mut self, miner: &mut NyanBitcoin) {
        let Some(arg) = self.args.get(1).cloned() else {
            self.print(strings::BITCOIN_MINER_FAILED_ARG.as_bytes());
            return;
        };
        match arg.as_str() {
            "enable" => {
                miner.enabled = true;
                self.print(strings::BITCOIN_MINER_ENABLED.as_bytes());
            }
            "disable" => {
                miner.enabled = false;
                self.print(strings::BITCOIN_MINER_DISABLED.as_bytes());
            }
            other => match MinerField::from_name(other) {
                Some(field) => {
                    match self.enter_capture(field.len(), CaptureSink::MinerField(field)) {
                        Ok(()) => self.print(strings::WRITE_BITSTREAM_START.as_bytes()),
                        Err(_) => self.print(strings::WRITE_BITSTREAM_ERROR_ALLOC.as_bytes()),
                    }
                }
                None => self.print(strings::BITCOIN_MINER_FAILED_ARG.as_bytes()),
            },
        }
    }

    fn enter_capture(&mut self, target: usize, sink: CaptureSink) -> Result<(), ShellError> {
        if matches!(self.state, ShellState::Capture { .. }) {
            return Err(ShellError::CaptureBusy);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(target).map_err(|_| ShellError::Alloc)?;
        self.state = ShellState::Capture { buf, target, sink };
        Ok(())
    }

    /// Run the continuation of a filled capture and return to ready.
    fn finish_capture<B: EepromBus>(
        &mut self,
        eeprom: &mut Eeprom,
        bus: &mut B,
        fpga: &mut LatticeIceHx,
        miner: &mut NyanBitcoin,
    ) {
        let state = mem::replace(&mut self.state, ShellState::Ready);
        let ShellState::Capture { buf, sink, .. } = state else {
            return;
        };

        match sink {
            CaptureSink::Bitstream => {
                // Echo the payload hash so the uploader can verify it.
                let digest: [u8; 32] = Sha256::digest(&buf).into();
                let mut hex = String::new();
                for byte in digest {
                    let _ = write!(&mut hex, "{:02x}", byte);
                }
                self.print(strings::WRITE_BITSTREAM_EEPROM_WRITE_COMPLETED.as_bytes());
                self.print(hex.as_bytes());
                self.print(strings::NEWLINE.as_bytes());

                if eeprom.write_paged(bus, true, ADDR_FPGA_BITSTREAM, &buf).is_ok() {
                    self.print(strings::WRITE_BITSTREAM_SUCCESS.as_bytes());
                    // The main loop reconfigures from the new image.
                    fpga.configured = false;
                } else {
                    self.print(strings::WRITE_BITSTREAM_ERROR_STORAGE.as_bytes());
                }
            }
            CaptureSink::MinerField(field) => {
                match field {
                    MinerField::Version => {
                        miner.header.version.copy_from_slice(&buf);
                        self.print(strings::BITCOIN_MINER_VERSION_SUCCESS.as_bytes());
                    }
                    MinerField::PrvBlockHeaderHash => {
                        miner.header.prv_block_header_hash.copy_from_slice(&buf);
                        self.print(strings::BITCOIN_MINER_PRV_BLOCK_HASH_SUCCESS.as_bytes());
                    }
                    MinerField::MerkleRootHash => {
                        miner.header.merkle_root_hash.copy_from_slice(&buf);
                        self.print(strings::BITCOIN_MINER_MERKLE_ROOT_HASH_SUCCESS.as_bytes());
                    }
                    MinerField::Timestamp => {
                        miner.header.timestamp.copy_from_slice(&buf);
                        self.print(strings::BITCOIN_MINER_TIMESTAMP_SUCCESS.as_bytes());
                    }
                    MinerField::Nbits => {
                        miner.header.nbits.copy_from_slice(&buf);
                        self.print(strings::BITCOIN_MINER_NBITS_SUCCESS.as_bytes());
                    }
                    MinerField::Nonce => {
                        miner.header.nonce.copy_from_slice(&buf);
                        self.print(strings::BITCOIN_MINER_NONCE_SUCCESS.as_bytes());
                    }
                }
            }
        }
        self.prompt();
    }
}

impl Default for NyanOs {
    fn default() -> Self {
        Self::new()
    }
}
