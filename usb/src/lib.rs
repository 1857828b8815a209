pub use rusb;
pub mod adc;
pub mod commands;
pub mod error;
pub mod fpga;
pub mod memory;
#[cfg(any(test, feature = "testing"))]
pub mod transcript;
pub mod usart;

mod device;

pub use device::base::{CwLiteCommands, CwLiteDevice, CwLiteTransport};
pub use device::{CwLiteUsb, PID_CWLITE, SUPPORTED_FIRMWARE, VID_CWLITE, find_devices};
