//! Detachment watcher
//!
//! Tears the session down when its device leaves the bus.

use crate::usb::host::{HostError, UsbConnection, UsbHost};
use crate::usb::manager::ConnectionManager;
use common::{DeviceDescriptor, HostEventSender};
use tracing::{debug, info, warn};

pub struct DetachmentWatcher {
    active: bool,
}

impl DetachmentWatcher {
    /// Subscribe to removal notifications from the host
    ///
    /// A host without hot-plug support yields an inactive watcher; the
    /// session then only ends on an explicit disconnect or a failed write.
    pub fn start<H: UsbHost>(host: &mut H, events: HostEventSender) -> Self {
        let active = match host.subscribe(events) {
            Ok(()) => {
                debug!("Watching for device removal");
                true
            }
            Err(HostError::NotSupported) => {
                warn!("Hot-plug not supported on this platform, removals go unnoticed");
                false
            }
            Err(e) => {
                warn!("Failed to watch for device removal: {}", e);
                false
            }
        };
        Self { active }
    }

    /// Watcher that never subscribed
    pub fn inactive() -> Self {
        Self { active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Handle a removal; returns `true` if the session was torn down
    pub fn handle_detached<C: UsbConnection>(
        &self,
        manager: &mut ConnectionManager<C>,
        removed: &DeviceDescriptor,
    ) -> bool {
        match manager.bound_device() {
            Some(bound) if bound.is_same_device(removed) => {
                info!("Connected device {} was removed", removed);
                manager.disconnect();
                true
            }
            _ => {
                debug!("Ignoring removal of unrelated device {}", removed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{MockConnection, MockDevice, MockHost};
    use common::create_usb_bridge;
    use common::test_utils::create_printer_interface;

    fn connected() -> (MockHost, ConnectionManager<MockConnection>) {
        let host = MockHost::new();
        host.add_device(
            MockDevice::new(1234, 5678, "usb001")
                .with_interfaces(vec![create_printer_interface(0)]),
        );
        let mut manager = ConnectionManager::new();
        manager.connect(&host, 1234, 5678).unwrap();
        (host, manager)
    }

    #[test]
    fn test_matching_removal_disconnects() {
        let (host, mut manager) = connected();
        let watcher = DetachmentWatcher::inactive();

        let removed = DeviceDescriptor::new(1234, 5678, "usb001");
        assert!(watcher.handle_detached(&mut manager, &removed));
        assert!(!manager.is_connected());
        assert_eq!(host.state().closes, 1);
    }

    #[test]
    fn test_unrelated_removal_is_ignored() {
        let (host, mut manager) = connected();
        let watcher = DetachmentWatcher::inactive();

        // same model on another port
        let other_port = DeviceDescriptor::new(1234, 5678, "usb002");
        assert!(!watcher.handle_detached(&mut manager, &other_port));

        let other_model = DeviceDescriptor::new(1111, 2222, "usb001");
        assert!(!watcher.handle_detached(&mut manager, &other_model));

        assert!(manager.is_connected());
        assert_eq!(host.state().closes, 0);
    }

    #[test]
    fn test_removal_while_idle() {
        let mut manager = ConnectionManager::<MockConnection>::new();
        let watcher = DetachmentWatcher::inactive();
        let removed = DeviceDescriptor::new(1234, 5678, "usb001");
        assert!(!watcher.handle_detached(&mut manager, &removed));
    }

    #[test]
    fn test_start_subscribes() {
        let (_bridge, worker) = create_usb_bridge();
        let mut host = MockHost::new();
        assert!(DetachmentWatcher::start(&mut host, worker.event_sender()).is_active());
        assert!(host.state().subscriber.is_some());

        let mut host = MockHost::new();
        host.state().hotplug_supported = false;
        assert!(!DetachmentWatcher::start(&mut host, worker.event_sender()).is_active());
    }
}
