// This file wraps the libusb handle into something the rest of the crate can borrow. Memory, FPGA,
// ADC and USART access all go through the CwLiteTransport trait, so they can be driven by the
// real board or by a recorded transcript.
pub mod base;
mod libusb;

pub use libusb::device::{
    CwLiteUsb, PID_CWLITE, SUPPORTED_FIRMWARE, VID_CWLITE, find_devices,
};
