use crate::commands::Request;
use crate::device::base::{CwLiteCommands, CwLiteDevice, CwLiteTransport};
use crate::error::{CommandError, ConnectError};
use cwlite_types::FirmwareVersion;
use log::{debug, info, trace, warn};
use rusb::{Context, DeviceHandle, Direction, Recipient, RequestType, UsbContext};
use std::time::Duration;

pub const VID_CWLITE: u16 = 0x2b3e;
pub const PID_CWLITE: u16 = 0xace2;

const INTERFACE: u8 = 0;
const ENDPOINT_IN: u8 = 0x81;
const ENDPOINT_OUT: u8 = 0x02;

pub const SUPPORTED_FIRMWARE: (u8, u8) = (0, 11);

// Owns the libusb context and the open handle. Everything else borrows this.
pub struct CwLiteUsb {
    handle: Option<DeviceHandle<Context>>,
    context: Option<Context>,
    device_is_claimed: bool,

    firmware: FirmwareVersion,
    timeout: Duration,
    bulk_timeout: Duration,
}

impl CwLiteUsb {
    /// Opens the first ChipWhisperer-Lite found on the bus.
    pub fn open() -> Result<Self, ConnectError> {
        let context = Context::new()?;
        let handle = context
            .open_device_with_vid_pid(VID_CWLITE, PID_CWLITE)
            .ok_or(ConnectError::DeviceNotFound)?;
        Self::from_handle(context, handle)
    }

    pub fn from_device(device: CwLiteDevice) -> Result<Self, ConnectError> {
        let context = Context::new()?;
        for usb_device in context.devices()?.iter() {
            if usb_device.bus_number() == device.bus_number
                && usb_device.address() == device.address
            {
                let handle = usb_device.open()?;
                return Self::from_handle(context, handle);
            }
        }
        Err(ConnectError::DeviceNotFound)
    }

    fn from_handle(context: Context, handle: DeviceHandle<Context>) -> Result<Self, ConnectError> {
        info!("Connected to possible CW-Lite device at {:?}", handle.device());

        // Not every platform supports detaching, carry on if it doesn't.
        if let Err(error) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Unable to auto-detach kernel driver: {}", error);
        }
        if handle.claim_interface(INTERFACE).is_err() {
            return Err(ConnectError::DeviceNotClaimed);
        }

        let mut device = Self {
            handle: Some(handle),
            context: Some(context),
            device_is_claimed: true,
            firmware: FirmwareVersion {
                major: 0,
                minor: 0,
                debug: 0,
            },
            timeout: Duration::from_secs(1),
            bulk_timeout: Duration::from_secs(5),
        };

        let firmware = device.firmware_version()?;
        if (firmware.major, firmware.minor) != SUPPORTED_FIRMWARE {
            let expected = FirmwareVersion {
                major: SUPPORTED_FIRMWARE.0,
                minor: SUPPORTED_FIRMWARE.1,
                debug: 0,
            };
            device.close();
            return Err(ConnectError::UnsupportedFirmware(firmware, expected));
        }
        device.firmware = firmware;

        info!("CW-Lite firmware {} ready", firmware);
        Ok(device)
    }

    pub fn firmware(&self) -> FirmwareVersion {
        self.firmware
    }

    pub fn usb_bus_number(&self) -> Option<u8> {
        self.handle.as_ref().map(|handle| handle.device().bus_number())
    }

    pub fn usb_address(&self) -> Option<u8> {
        self.handle.as_ref().map(|handle| handle.device().address())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Releases the interface, then the handle, then the context. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Closing USB device");
            if self.device_is_claimed {
                if let Err(error) = handle.release_interface(INTERFACE) {
                    warn!("Unable to release interface: {}", error);
                }
                self.device_is_claimed = false;
            }
            drop(handle);
        }
        if let Some(context) = self.context.take() {
            drop(context);
        }
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>, CommandError> {
        self.handle
            .as_ref()
            .ok_or(CommandError::UsbError(rusb::Error::NoDevice))
    }
}

impl Drop for CwLiteUsb {
    fn drop(&mut self) {
        self.close();
    }
}

impl CwLiteTransport for CwLiteUsb {
    fn control_in(
        &self,
        request: Request,
        value: u16,
        buf: &mut [u8],
    ) -> Result<(), CommandError> {
        let read = self.handle()?.read_control(
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Interface),
            request.request_id(),
            value,
            0,
            buf,
            self.timeout,
        )?;
        if read != buf.len() {
            return Err(CommandError::ShortControlTransfer {
                expected: buf.len(),
                actual: read,
            });
        }
        trace!(
            "[usb-ctrl IN]: request = {:?}, val = {:#x}, data = {:02x?}",
            request, value, buf
        );
        Ok(())
    }

    fn control_out(&self, request: Request, value: u16, data: &[u8]) -> Result<(), CommandError> {
        let written = self.handle()?.write_control(
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Interface),
            request.request_id(),
            value,
            0,
            data,
            self.timeout,
        )?;
        if written != data.len() {
            return Err(CommandError::ShortControlTransfer {
                expected: data.len(),
                actual: written,
            });
        }
        trace!(
            "[usb-ctrl OUT]: request = {:?}, val = {:#x}, data = {:02x?}",
            request, value, data
        );
        Ok(())
    }

    fn read_bulk(&self, buf: &mut [u8]) -> Result<usize, CommandError> {
        let read = self
            .handle()?
            .read_bulk(ENDPOINT_IN, buf, self.bulk_timeout)?;
        trace!(
            "[usb-bulk IN]: read {} bytes. data[..32] = {:02x?}",
            read,
            &buf[..read.min(32)]
        );
        Ok(read)
    }

    fn write_bulk(&self, data: &[u8]) -> Result<usize, CommandError> {
        let written = self
            .handle()?
            .write_bulk(ENDPOINT_OUT, data, self.bulk_timeout)?;
        trace!(
            "[usb-bulk OUT]: wrote {} bytes. data[..32] = {:02x?}",
            written,
            &data[..data.len().min(32)]
        );
        Ok(written)
    }
}

pub fn find_devices() -> Vec<CwLiteDevice> {
    let mut found_devices: Vec<CwLiteDevice> = Vec::new();

    if let Ok(devices) = rusb::devices() {
        for device in devices.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                if descriptor.vendor_id() == VID_CWLITE && descriptor.product_id() == PID_CWLITE {
                    found_devices.push(CwLiteDevice {
                        bus_number: device.bus_number(),
                        address: device.address(),
                    });
                }
            }
        }
    }

    found_devices
}
