//! libusb host backend
//!
//! Implements the host traits on top of rusb. Devices are named after their
//! bus position (`/dev/bus/usb/BBB/DDD`), which is stable for as long as the
//! device stays plugged in.

use crate::usb::host::{HostError, PermissionPrompt, UsbConnection, UsbHost};
use common::{
    DeviceDescriptor, Direction, EndpointInfo, HostEvent, HostEventSender, InterfaceInfo,
    PermissionToken, TransferKind,
};
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Linux Foundation root hubs never carry a printer
const ROOT_HUB_VENDOR: u16 = 0x1d6b;
const HUB_CLASS: u8 = 0x09;

/// System name of the device at this bus position
pub fn system_name(bus: u8, address: u8) -> String {
    format!("/dev/bus/usb/{:03}/{:03}", bus, address)
}

/// Host backed by a libusb context
pub struct RusbHost {
    context: Context,
    /// Hot-plug registration, kept alive for the lifetime of the host
    _hotplug_registration: Option<Registration<Context>>,
}

impl RusbHost {
    pub fn new() -> Result<Self, HostError> {
        let context = Context::new()?;
        Ok(Self {
            context,
            _hotplug_registration: None,
        })
    }

    /// Permission prompt that re-probes access on this host
    pub fn permission_prompt(&self, events: HostEventSender) -> ProbePrompt {
        ProbePrompt {
            context: self.context.clone(),
            events,
        }
    }

    fn find(&self, wanted: &DeviceDescriptor) -> Result<Device<Context>, HostError> {
        find_device(&self.context, wanted)
    }
}

fn find_device(context: &Context, wanted: &DeviceDescriptor) -> Result<Device<Context>, HostError> {
    for device in context.devices()?.iter() {
        if system_name(device.bus_number(), device.address()) != wanted.system_name {
            continue;
        }
        let desc = device.device_descriptor()?;
        if desc.vendor_id() == wanted.vendor_id && desc.product_id() == wanted.product_id {
            return Ok(device);
        }
    }
    Err(HostError::NoDevice)
}

fn describe<T: UsbContext>(device: &Device<T>) -> Result<DeviceDescriptor, rusb::Error> {
    let desc = device.device_descriptor()?;
    Ok(DeviceDescriptor::new(
        desc.vendor_id(),
        desc.product_id(),
        system_name(device.bus_number(), device.address()),
    ))
}

fn probe_access(context: &Context, device: &DeviceDescriptor) -> bool {
    match find_device(context, device).and_then(|d| d.open().map_err(HostError::from)) {
        Ok(_handle) => true,
        Err(e) => {
            debug!("No access to {}: {}", device, e);
            false
        }
    }
}

impl UsbHost for RusbHost {
    type Connection = RusbConnection;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        let mut found = Vec::new();

        for device in self.context.devices()?.iter() {
            let desc = match device.device_descriptor() {
                Ok(desc) => desc,
                Err(e) => {
                    debug!(
                        "Skipping device bus={}, addr={}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if desc.vendor_id() == ROOT_HUB_VENDOR && desc.class_code() == HUB_CLASS {
                continue;
            }

            found.push(DeviceDescriptor::new(
                desc.vendor_id(),
                desc.product_id(),
                system_name(device.bus_number(), device.address()),
            ));
        }

        Ok(found)
    }

    fn manufacturer_name(&self, device: &DeviceDescriptor) -> Result<Option<String>, HostError> {
        let usb_device = self.find(device)?;
        let desc = usb_device.device_descriptor()?;

        let Some(index) = desc.manufacturer_string_index() else {
            return Ok(None);
        };

        let handle = usb_device.open()?;
        Ok(Some(handle.read_string_descriptor_ascii(index)?))
    }

    fn interfaces(&self, device: &DeviceDescriptor) -> Result<Vec<InterfaceInfo>, HostError> {
        let config = self.find(device)?.active_config_descriptor()?;

        let mut interfaces = Vec::new();
        for interface in config.interfaces() {
            for setting in interface.descriptors() {
                let endpoints = setting
                    .endpoint_descriptors()
                    .map(|ep| EndpointInfo {
                        address: ep.address(),
                        kind: map_transfer_type(ep.transfer_type()),
                        direction: map_direction(ep.direction()),
                        max_packet_size: ep.max_packet_size(),
                    })
                    .collect();

                interfaces.push(InterfaceInfo {
                    number: setting.interface_number(),
                    alternate_setting: setting.setting_number(),
                    class_code: setting.class_code(),
                    endpoints,
                });
            }
        }

        Ok(interfaces)
    }

    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        probe_access(&self.context, device)
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<RusbConnection, HostError> {
        let handle = self.find(device)?.open().map_err(|e| {
            warn!("Failed to open {}: {}", device, e);
            HostError::from(e)
        })?;

        // Take interfaces from the kernel printer driver and hand them back on release
        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) | Err(rusb::Error::NotSupported) => {}
            Err(e) => debug!("Could not enable kernel driver auto-detach: {}", e),
        }

        debug!("Opened {}", device);
        Ok(RusbConnection { handle })
    }

    fn subscribe(&mut self, events: HostEventSender) -> Result<(), HostError> {
        if !rusb::has_hotplug() {
            return Err(HostError::NotSupported);
        }

        let registration = HotplugBuilder::new()
            .enumerate(false)
            .register(&self.context, Box::new(HotplugCallback { events }))?;

        self._hotplug_registration = Some(registration);
        debug!("Hot-plug callbacks registered");
        Ok(())
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), HostError> {
        match self.context.handle_events(Some(timeout)) {
            Ok(()) | Err(rusb::Error::Interrupted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opened libusb device
pub struct RusbConnection {
    handle: DeviceHandle<Context>,
}

impl UsbConnection for RusbConnection {
    fn claim_interface(&mut self, interface: &InterfaceInfo) -> Result<(), HostError> {
        self.handle.claim_interface(interface.number)?;

        if interface.alternate_setting != 0
            && let Err(e) = self
                .handle
                .set_alternate_setting(interface.number, interface.alternate_setting)
        {
            if let Err(release_err) = self.handle.release_interface(interface.number) {
                debug!(
                    "Failed to release interface {} after alternate setting error: {}",
                    interface.number, release_err
                );
            }
            return Err(e.into());
        }

        debug!("Claimed interface {}", interface.number);
        Ok(())
    }

    fn release_interface(&mut self, interface: &InterfaceInfo) -> Result<(), HostError> {
        self.handle.release_interface(interface.number)?;
        debug!("Released interface {}", interface.number);
        Ok(())
    }

    fn bulk_write(
        &mut self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, HostError> {
        Ok(self.handle.write_bulk(endpoint.address, data, timeout)?)
    }

    fn close(self) -> Result<(), HostError> {
        // libusb_close runs when the handle drops
        drop(self.handle);
        Ok(())
    }
}

/// Hot-plug callback handler
///
/// Runs inside `handle_events` on the USB worker thread and only queues
/// events; the worker processes them on its next iteration.
struct HotplugCallback {
    events: HostEventSender,
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        match describe(&device) {
            Ok(descriptor) => self.events.publish(HostEvent::DeviceAttached { device: descriptor }),
            Err(e) => debug!("Hot-plug arrival without descriptor: {}", e),
        }
    }

    fn device_left(&mut self, device: Device<T>) {
        match describe(&device) {
            Ok(descriptor) => self.events.publish(HostEvent::DeviceDetached { device: descriptor }),
            Err(e) => warn!(
                "Hot-plug removal without descriptor (bus={}, addr={}): {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }
}

/// Permission prompt for desktop hosts
///
/// There is no interactive grant on libusb: access comes from device node
/// ownership (udev rules, group membership). The prompt re-probes access and
/// answers at once.
pub struct ProbePrompt {
    context: Context,
    events: HostEventSender,
}

impl PermissionPrompt for ProbePrompt {
    fn prompt(&self, device: &DeviceDescriptor, token: PermissionToken) -> Result<(), HostError> {
        let granted = probe_access(&self.context, device);
        if !granted {
            info!(
                "No access to {}; grant it with a udev rule for {:04x}:{:04x}",
                device, device.vendor_id, device.product_id
            );
        }
        self.events
            .publish(HostEvent::PermissionResult { token, granted });
        Ok(())
    }
}

impl From<rusb::Error> for HostError {
    fn from(err: rusb::Error) -> Self {
        map_rusb_error(err)
    }
}

/// Map rusb::Error to HostError
pub fn map_rusb_error(err: rusb::Error) -> HostError {
    match err {
        rusb::Error::Timeout => HostError::Timeout,
        rusb::Error::Pipe => HostError::Pipe,
        rusb::Error::NoDevice => HostError::NoDevice,
        rusb::Error::NotFound => HostError::NotFound,
        rusb::Error::Busy => HostError::Busy,
        rusb::Error::Io => HostError::Io,
        rusb::Error::Access => HostError::Access,
        rusb::Error::NotSupported => HostError::NotSupported,
        _ => HostError::Other(err.to_string()),
    }
}

fn map_transfer_type(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}

fn map_direction(direction: rusb::Direction) -> Direction {
    match direction {
        rusb::Direction::In => Direction::In,
        rusb::Direction::Out => Direction::Out,
    }
}
