//! USB type abstractions shared by the host backends and the session logic

use protocol::DeviceSummary;
use std::fmt;

/// Identifying metadata of an attached device
///
/// The identity key is `(vendor_id, product_id)`. `system_name` names the
/// device node on the host and distinguishes two units of the same model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub system_name: String,
    pub manufacturer_name: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(vendor_id: u16, product_id: u16, system_name: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            system_name: system_name.into(),
            manufacturer_name: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer_name = Some(manufacturer.into());
        self
    }

    /// `(vendor_id, product_id)` identity key
    pub fn identity(&self) -> (u16, u16) {
        (self.vendor_id, self.product_id)
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.identity() == (vendor_id, product_id)
    }

    /// Same physical device: identity key plus system name
    ///
    /// The manufacturer string is not compared; it is not always readable
    /// once a device has left the bus.
    pub fn is_same_device(&self, other: &DeviceDescriptor) -> bool {
        self.identity() == other.identity() && self.system_name == other.system_name
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} ({})",
            self.vendor_id, self.product_id, self.system_name
        )
    }
}

impl From<DeviceDescriptor> for DeviceSummary {
    fn from(descriptor: DeviceDescriptor) -> Self {
        DeviceSummary {
            vendor_id: descriptor.vendor_id,
            product_id: descriptor.product_id,
            device_name: descriptor.system_name,
            manufacturer_name: descriptor.manufacturer_name,
        }
    }
}

/// Endpoint transfer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint direction, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// One endpoint of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointInfo {
    /// Endpoint address including the direction bit
    pub address: u8,
    pub kind: TransferKind,
    pub direction: Direction,
    pub max_packet_size: u16,
}

impl EndpointInfo {
    pub fn is_bulk_out(&self) -> bool {
        self.kind == TransferKind::Bulk && self.direction == Direction::Out
    }
}

/// One interface of the active configuration, endpoints in descriptor order
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceInfo {
    pub number: u8,
    pub alternate_setting: u8,
    pub class_code: u8,
    pub endpoints: Vec<EndpointInfo>,
}

impl InterfaceInfo {
    /// First bulk OUT endpoint in descriptor order
    pub fn first_bulk_out(&self) -> Option<&EndpointInfo> {
        self.endpoints.iter().find(|ep| ep.is_bulk_out())
    }
}

/// Single-use correlation token for a permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionToken(pub u64);

impl PermissionToken {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
