//! Driver for the 24xx-series configuration EEPROM.
//!
//! The device is page-oriented: a single write may touch at most one
//! 128-byte page, and at most one transmit and one receive can be
//! outstanding at any time. Completion arrives asynchronously from the bus
//! (I2C DMA on hardware), so the driver tracks in-flight and failure flags
//! that only [`Eeprom::service`] may clear. Multi-page transfers are the
//! caller's job; [`Eeprom::write_paged`] implements the mandatory
//! page-by-page loop with bounded per-page retry on a NACK.

/// Page size: the device's atomic write granularity, and the size of the
/// driver-owned transmit buffer.
pub const PAGE_SIZE: usize = 128;
/// Size of the driver-owned receive buffer.
pub const RX_BUF_SIZE: usize = 1024;

// Control byte composition (7-bit device address << 1 lives in the bus
// implementation; these are the address-line and bank-select bits).
pub const CTRL_CODE: u8 = 0xA0;
pub const CTRL_MASK_A0: u8 = 0x02;
pub const CTRL_MASK_A1: u8 = 0x04;
pub const CTRL_MASK_B0: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromError {
    /// A transmit is already in flight.
    TxBusy,
    /// A receive is already in flight.
    RxBusy,
    /// Requested transfer exceeds the page (write) or receive buffer (read).
    LengthOverrun,
    /// The bus rejected the transfer before it started.
    BusFault,
    /// Nothing to transfer.
    Empty,
}

/// Completion events reported by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepromEvent {
    TxComplete,
    /// The device NACKed the transfer; the page must be retried.
    TxFailed,
    RxComplete,
}

/// Hardware seam for the EEPROM transfer engine.
///
/// `start_write`/`start_read` kick off a transfer and return immediately;
/// the outcome is reported through `poll`, which the driver calls from its
/// wait loops. On `RxComplete` the bus must already have copied the
/// received bytes into `rx_buf`.
pub trait EepromBus {
    fn start_write(&mut self, control: u8, address: u16, data: &[u8]) -> Result<(), EepromError>;
    fn start_read(&mut self, control: u8, address: u16, len: usize) -> Result<(), EepromError>;
    fn poll(&mut self, rx_buf: &mut [u8]) -> Option<EepromEvent>;
}

pub struct Eeprom {
    a0: bool,
    a1: bool,
    pub tx_inflight: bool,
    pub rx_inflight: bool,
    pub tx_failed: bool,
    pub tx_buf: [u8; PAGE_SIZE],
    pub rx_buf: [u8; RX_BUF_SIZE],
}

impl Eeprom {
    pub const fn new(a0: bool, a1: bool) -> Self {
        Self {
            a0,
            a1,
            tx_inflight: false,
            rx_inflight: false,
            tx_failed: false,
            tx_buf: [0; PAGE_SIZE],
            rx_buf: [0; RX_BUF_SIZE],
        }
    }

    /// Control byte for this device with the bank-select bit folded in.
    pub fn control_byte(&self, high_bank: bool) -> u8 {
        let mut ctrl = CTRL_CODE;
        if self.a0 {
            ctrl |= CTRL_MASK_A0;
        }
        if self.a1 {
            ctrl |= CTRL_MASK_A1;
        }
        if high_bank {
            ctrl |= CTRL_MASK_B0;
        }
        ctrl
    }

    /// Zero the transmit buffer in preparation for new data.
    pub fn flush_tx_buf(&mut self) {
        self.tx_buf = [0; PAGE_SIZE];
    }

    /// Start writing the first `len` bytes of `tx_buf` to `address`.
    ///
    /// Fails if a transmit is already in flight. The buffer contents are
    /// undefined from the caller's perspective until the in-flight flag
    /// clears again.
    pub fn write<B: EepromBus>(
        &mut self,
        bus: &mut B,
        high_bank: bool,
        address: u16,
        len: usize,
    ) -> Result<(), EepromError> {
        if self.tx_inflight {
            return Err(EepromError::TxBusy);
        }
        if len == 0 {
            return Err(EepromError::Empty);
        }
        if len > PAGE_SIZE {
            return Err(EepromError::LengthOverrun);
        }
        bus.start_write(self.control_byte(high_bank), address, &self.tx_buf[..len])?;
        self.tx_inflight = true;
        Ok(())
    }

    /// Start reading `len` bytes from `address` into `rx_buf`.
    pub fn read<B: EepromBus>(
        &mut self,
        bus: &mut B,
        high_bank: bool,
        address: u16,
        len: usize,
    ) -> Result<(), EepromError> {
        if self.rx_inflight {
            return Err(EepromError::RxBusy);
        }
        if len == 0 {
            return Err(EepromError::Empty);
        }
        if len > RX_BUF_SIZE {
            return Err(EepromError::LengthOverrun);
        }
        bus.start_read(self.control_byte(high_bank), address, len)?;
        self.rx_inflight = true;
        Ok(())
    }

    /// Apply any pending completion event from the bus.
    pub fn service<B: EepromBus>(&mut self, bus: &mut B) {
        match bus.poll(&mut self.rx_buf) {
            Some(EepromEvent::TxComplete) => self.tx_inflight = false,
            Some(EepromEvent::TxFailed) => self.tx_failed = true,
            Some(EepromEvent::RxComplete) => self.rx_inflight = false,
            None => {}
        }
    }

    /// Spin until the in-flight transmit completes. Returns false and
    /// rearms the driver if the device NACKed; the write must go again.
    /// No timeout: the wait is bounded only by the hardware (a documented
    /// hazard of this design).
    pub fn wait_tx<B: EepromBus>(&mut self, bus: &mut B) -> bool {
        while self.tx_inflight {
            self.service(bus);
            if self.tx_failed {
                self.tx_failed = false;
                self.tx_inflight = false;
                return false;
            }
        }
        true
    }

    /// Spin until the in-flight receive completes. No timeout.
    pub fn wait_rx<B: EepromBus>(&mut self, bus: &mut B) {
        while self.rx_inflight {
            self.service(bus);
        }
    }

    /// Read `len` bytes synchronously, returning a view into `rx_buf`.
    pub fn read_blocking<'a, B: EepromBus>(
        &'a mut self,
        bus: &mut B,
        high_bank: bool,
        address: u16,
        len: usize,
    ) -> Result<&'a [u8], EepromError> {
        self.read(bus, high_bank, address, len)?;
        self.wait_rx(bus);
        Ok(&self.rx_buf[..len])
    }

    /// Write `data` page by page, retrying each page on a NACK until it
    /// lands. The buffer for a failed page is re-sent unchanged; pages
    /// already written are never touched again.
    pub fn write_paged<B: EepromBus>(
        &mut self,
        bus: &mut B,
        high_bank: bool,
        address: u16,
        data: &[u8],
    ) -> Result<(), EepromError> {
        if data.is_empty() {
            return Err(EepromError::Empty);
        }
        for (page, chunk) in data.chunks(PAGE_SIZE).enumerate() {
            let page_address = address + (page * PAGE_SIZE) as u16;
            self.flush_tx_buf();
            self.tx_buf[..chunk.len()].copy_from_slice(chunk);
            loop {
                self.write(bus, high_bank, page_address, chunk.len())?;
                if self.wait_tx(bus) {
                    break;
                }
                // NACK: retry this page with the identical buffer.
            }
        }
        Ok(())
    }
}
