//! Composite USB device: CDC ACM console plus the extended-report HID
//! keyboard, on the OTG_HS core running in full-speed mode with the
//! internal PHY.

use synopsys_usb_otg::{UsbBus, UsbPeripheral};
use usb_device::bus::UsbBusAllocator;
use usb_device::device::{StringDescriptors, UsbDevice, UsbDeviceBuilder, UsbVidPid};
use usb_device::LangID;
use usbd_hid::hid_class::HIDClass;
use usbd_serial::SerialPort;

use nyanos::hid::REPORT_LEN;

/// STM32 CDC identity; hosts already carry drivers for it.
const NYAN_VID_PID: UsbVidPid = UsbVidPid(0x0483, 0x5740);

/// 62-byte keyboard report: 8 modifier bits, one reserved byte, then a
/// 60-entry key code array (boot block first).
#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01,       // Usage Page (Generic Desktop)
    0x09, 0x06,       // Usage (Keyboard)
    0xA1, 0x01,       // Collection (Application)
    0x05, 0x07,       //   Usage Page (Key Codes)
    0x19, 0xE0,       //   Usage Minimum (LCtrl)
    0x29, 0xE7,       //   Usage Maximum (RGui)
    0x15, 0x00,       //   Logical Minimum (0)
    0x25, 0x01,       //   Logical Maximum (1)
    0x75, 0x01,       //   Report Size (1)
    0x95, 0x08,       //   Report Count (8)
    0x81, 0x02,       //   Input (Data, Variable, Absolute)
    0x95, 0x01,       //   Report Count (1)
    0x75, 0x08,       //   Report Size (8)
    0x81, 0x01,       //   Input (Constant)
    0x95, 0x3C,       //   Report Count (60)
    0x75, 0x08,       //   Report Size (8)
    0x15, 0x00,       //   Logical Minimum (0)
    0x26, 0xE7, 0x00, //   Logical Maximum (231)
    0x05, 0x07,       //   Usage Page (Key Codes)
    0x19, 0x00,       //   Usage Minimum (0)
    0x29, 0xE7,       //   Usage Maximum (231)
    0x81, 0x00,       //   Input (Data, Array)
    0xC0,             // End Collection
];

const _: () = assert!(REPORT_LEN == 62);

/// OTG_HS core used as a full-speed device on the internal PHY.
pub struct UsbOtg;

unsafe impl Sync for UsbOtg {}

unsafe impl UsbPeripheral for UsbOtg {
    const REGISTERS: *const () = 0x4004_0000 as *const ();
    const HIGH_SPEED: bool = true;
    const FIFO_DEPTH_WORDS: usize = 1024;
    const ENDPOINT_COUNT: usize = 9;

    fn enable() {
        // OTGHSEN in RCC AHB1ENR; the PAC peripherals are owned by main,
        // so this goes through the raw register block.
        let rcc = unsafe { &*stm32f7::stm32f7x7::RCC::ptr() };
        rcc.ahb1enr.modify(|_, w| w.otghsen().set_bit());
        rcc.ahb1rstr.modify(|_, w| w.otghsrst().set_bit());
        rcc.ahb1rstr.modify(|_, w| w.otghsrst().clear_bit());
    }

    fn startup_delay() {
        // Core soft-reset settle time.
        cortex_m::asm::delay(216_000_000 / 1000 * 3);
    }
}

pub type Bus = UsbBus<UsbOtg>;

static mut EP_MEMORY: [u32; 1024] = [0; 1024];

pub struct NyanUsb {
    pub device: UsbDevice<'static, Bus>,
    pub serial: SerialPort<'static, Bus>,
    pub hid: HIDClass<'static, Bus>,
}

/// Build the composite device. Must be called once; the allocator is
/// parked in a static for the class borrows.
pub fn init(usb: UsbOtg) -> NyanUsb {
    static mut USB_BUS: Option<UsbBusAllocator<Bus>> = None;

    let bus = unsafe {
        USB_BUS = Some(UsbBus::new(usb, &mut EP_MEMORY));
        USB_BUS.as_ref().unwrap_or_else(|| unreachable!())
    };

    let serial = SerialPort::new(bus);
    let hid = HIDClass::new(bus, REPORT_DESCRIPTOR, 1);
    let device = UsbDeviceBuilder::new(bus, NYAN_VID_PID)
        .strings(&[StringDescriptors::new(LangID::EN)
            .manufacturer("Portland.HODL")
            .product("Nyan Keys")])
        .unwrap_or_else(|_| unreachable!())
        .device_class(usbd_serial::USB_CLASS_CDC)
        .max_packet_size_0(64)
        .unwrap_or_else(|_| unreachable!())
        .build();

    NyanUsb {
        device,
        serial,
        hid,
    }
}
