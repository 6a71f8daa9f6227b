use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, UsbContext};
use tracing::{debug, info};

use super::buzz_controller::BuzzError;

/// Byte-level access to the Buzz receiver.
///
/// The decoder talks to the hardware only through this trait so the decode
/// and light logic can be exercised without a device on the bus.
pub trait BuzzTransport: Send + Sync {
    /// Issue the light control transfer with the full 7-byte payload.
    fn control_write(&self, payload: &[u8; LIGHT_PAYLOAD_LEN], timeout: Duration)
        -> rusb::Result<()>;

    /// One blocking interrupt read from the report endpoint.
    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;

    /// Max packet size of the report endpoint.
    fn max_packet_size(&self) -> usize;
}

/// `rusb`-backed transport for the wireless Buzz receiver.
pub struct UsbTransport {
    _context: Context,
    handle: DeviceHandle<Context>,
    read_endpoint: u8,
    max_packet_size: usize,
    detached_kernel_driver: bool,
}

impl UsbTransport {
    /// Open the first Buzz receiver on the bus and claim its interface.
    ///
    /// A kernel driver holding the interface is detached first; the detach
    /// is recorded but never undone.
    // TODO: re-attach the kernel driver on drop; attach_kernel_driver has
    // not worked reliably against this receiver.
    pub fn open() -> Result<Self, BuzzError> {
        let context = Context::new()?;
        let mut found = None;

        for device in context.devices()?.iter() {
            let desc = device.device_descriptor()?;
            if desc.vendor_id() == VENDOR_ID && desc.product_id() == PRODUCT_ID {
                found = Some(device);
                break;
            }
        }

        let device = found.ok_or(BuzzError::DeviceNotFound)?;
        let mut handle = device.open()?;

        let detached_kernel_driver = match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                debug!("detaching kernel driver from interface {INTERFACE}");
                handle.detach_kernel_driver(INTERFACE)?;
                true
            }
            Ok(false) => false,
            Err(rusb::Error::NotSupported) => false,
            Err(err) => return Err(err.into()),
        };

        let config = device.config_descriptor(0)?;
        handle.set_active_configuration(config.number())?;
        handle.claim_interface(INTERFACE)?;

        let mut endpoint = None;
        'search: for interface in config.interfaces() {
            for desc in interface.descriptors() {
                for ep in desc.endpoint_descriptors() {
                    if ep.direction() == Direction::In {
                        endpoint = Some((ep.address(), usize::from(ep.max_packet_size())));
                        break 'search;
                    }
                }
            }
        }
        let (read_endpoint, max_packet_size) = endpoint.ok_or(BuzzError::NoReadEndpoint)?;

        info!(
            "opened Buzz receiver {VENDOR_ID:04x}:{PRODUCT_ID:04x}, \
             report endpoint {read_endpoint:#04x} ({max_packet_size} bytes)"
        );

        Ok(Self {
            _context: context,
            handle,
            read_endpoint,
            max_packet_size,
            detached_kernel_driver,
        })
    }

    /// Whether a kernel driver was detached while opening the device.
    #[allow(dead_code)]
    pub fn detached_kernel_driver(&self) -> bool {
        self.detached_kernel_driver
    }
}

impl BuzzTransport for UsbTransport {
    fn control_write(
        &self,
        payload: &[u8; LIGHT_PAYLOAD_LEN],
        timeout: Duration,
    ) -> rusb::Result<()> {
        self.handle
            .write_control(
                LIGHT_REQUEST_TYPE,
                LIGHT_REQUEST,
                LIGHT_VALUE,
                LIGHT_INDEX,
                payload,
                timeout,
            )
            .map(|_| ())
    }

    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.read_interrupt(self.read_endpoint, buf, timeout)
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

// ID 054c:1000 Sony Corp. Wireless Buzz! Receiver
pub const VENDOR_ID: u16 = 0x054c;
pub const PRODUCT_ID: u16 = 0x1000;
pub const LIGHT_PAYLOAD_LEN: usize = 7;
const INTERFACE: u8 = 0;
const LIGHT_REQUEST_TYPE: u8 = 0x21;
const LIGHT_REQUEST: u8 = 0x09;
const LIGHT_VALUE: u16 = 0x0200;
const LIGHT_INDEX: u16 = 0;
