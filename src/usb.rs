//! USB transport for the DXO One
//!
//! Opens the first device with the DXO vendor id, selects configuration 1,
//! claims both interfaces and switches interface 1 to its alternate setting.
//! RPC and image traffic then flow over the bulk endpoint pair of interface 0.

use nusb::transfer::{Direction, EndpointType, RequestBuffer};

use crate::protocol::DXO_VENDOR_ID;
use crate::transport::{Transport, TransportError};

/// Configuration selected after opening
const CONFIGURATION: u8 = 1;

/// Interface carrying the bulk endpoints
const DATA_INTERFACE: u8 = 0;

/// Second interface, which must be claimed and switched before the camera talks
const CONTROL_INTERFACE: u8 = 1;

/// Alternate setting selected on the control interface
const CONTROL_ALT_SETTING: u8 = 1;

/// Pick the first bulk IN and bulk OUT endpoint addresses
fn select_bulk_endpoints<I>(endpoints: I) -> Option<(u8, u8)>
where
    I: IntoIterator<Item = (u8, EndpointType, Direction)>,
{
    let mut bulk_in = None;
    let mut bulk_out = None;

    for (address, kind, direction) in endpoints {
        if kind != EndpointType::Bulk {
            continue;
        }
        match direction {
            Direction::In if bulk_in.is_none() => bulk_in = Some(address),
            Direction::Out if bulk_out.is_none() => bulk_out = Some(address),
            _ => {}
        }
    }

    Some((bulk_in?, bulk_out?))
}

/// Claimed interfaces, released on drop
struct Claimed {
    data: nusb::Interface,
    _control: nusb::Interface,
}

/// Bulk transport over an opened camera
pub struct UsbTransport {
    claimed: Option<Claimed>,
    product_id: u16,
    in_endpoint: u8,
    out_endpoint: u8,
}

impl std::fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsbTransport")
            .field("open", &self.claimed.is_some())
            .field("product_id", &format_args!("{:04x}", self.product_id))
            .field("in_endpoint", &format_args!("0x{:02x}", self.in_endpoint))
            .field("out_endpoint", &format_args!("0x{:02x}", self.out_endpoint))
            .finish()
    }
}

impl UsbTransport {
    /// Open the first attached DXO One
    ///
    /// # Errors
    ///
    /// See [`UsbTransport::open_vendor`].
    pub fn open() -> Result<Self, TransportError> {
        Self::open_vendor(DXO_VENDOR_ID)
    }

    /// Open the first device with `vendor_id` and claim its interfaces
    ///
    /// # Errors
    ///
    /// Returns `TransportError::DeviceNotFound` if no device matches or it lacks
    /// a bulk endpoint pair, and `TransportError::Io` if opening or claiming fails.
    pub fn open_vendor(vendor_id: u16) -> Result<Self, TransportError> {
        let info = nusb::list_devices()?
            .find(|d| d.vendor_id() == vendor_id)
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!("no device with vendor id {:04x}", vendor_id))
            })?;
        let product_id = info.product_id();
        log::info!(
            "Found camera {:04x}:{:04x} on bus {} address {}",
            vendor_id,
            product_id,
            info.bus_number(),
            info.device_address()
        );

        let device = info.open()?;
        if let Err(e) = device.set_configuration(CONFIGURATION) {
            // Already configured by the OS on most hosts
            log::warn!("Could not select configuration {}: {}", CONFIGURATION, e);
        }

        let data = device.claim_interface(DATA_INTERFACE)?;
        let control = device.claim_interface(CONTROL_INTERFACE)?;
        control.set_alt_setting(CONTROL_ALT_SETTING)?;

        let configuration = device
            .active_configuration()
            .map_err(|e| TransportError::Transfer(e.to_string()))?;
        let endpoints = configuration
            .interface_alt_settings()
            .filter(|alt| alt.interface_number() == DATA_INTERFACE)
            .flat_map(|alt| {
                alt.endpoints()
                    .map(|ep| (ep.address(), ep.transfer_type(), ep.direction()))
                    .collect::<Vec<_>>()
            });
        let (in_endpoint, out_endpoint) = select_bulk_endpoints(endpoints).ok_or_else(|| {
            TransportError::DeviceNotFound(format!(
                "interface {} has no bulk endpoint pair",
                DATA_INTERFACE
            ))
        })?;

        log::info!(
            "Claimed interfaces {} and {}, bulk IN 0x{:02x}, OUT 0x{:02x}",
            DATA_INTERFACE,
            CONTROL_INTERFACE,
            in_endpoint,
            out_endpoint
        );

        Ok(Self {
            claimed: Some(Claimed {
                data,
                _control: control,
            }),
            product_id,
            in_endpoint,
            out_endpoint,
        })
    }

    /// Product id of the opened device
    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    /// Bulk IN endpoint address
    pub fn in_endpoint(&self) -> u8 {
        self.in_endpoint
    }

    /// Bulk OUT endpoint address
    pub fn out_endpoint(&self) -> u8 {
        self.out_endpoint
    }

    fn data_interface(&self) -> Result<&nusb::Interface, TransportError> {
        self.claimed
            .as_ref()
            .map(|c| &c.data)
            .ok_or(TransportError::Closed)
    }
}

impl Transport for UsbTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let endpoint = self.out_endpoint;
        self.data_interface()?
            .bulk_out(endpoint, data.to_vec())
            .await
            .into_result()
            .map_err(|e| TransportError::Transfer(e.to_string()))?;
        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let endpoint = self.in_endpoint;
        self.data_interface()?
            .bulk_in(endpoint, RequestBuffer::new(max_len))
            .await
            .into_result()
            .map_err(|e| TransportError::Transfer(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.claimed.take().is_some() {
            log::info!("Released camera interfaces");
        }
        Ok(())
    }
}
