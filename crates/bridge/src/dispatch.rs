//! Request dispatch
//!
//! [`Dispatcher`] owns the host, the permission negotiator, the connection
//! manager and the detachment watcher. It is driven from exactly one thread,
//! which is what serializes every operation on the session.

use crate::error::{BridgeError, Result};
use crate::usb::host::{PermissionPrompt, UsbHost};
use crate::usb::manager::ConnectionManager;
use crate::usb::permission::{PermissionNegotiator, PermissionOutcome};
use crate::usb::watcher::DetachmentWatcher;
use crate::usb::{registry, transfers};
use common::{DeviceDescriptor, HostEvent, HostEventSender, Reply};
use protocol::{DeviceSummary, ErrorCode, MethodError, Request, Response, ResponseValue};
use tracing::{debug, info};

pub struct Dispatcher<H: UsbHost, P: PermissionPrompt> {
    host: H,
    prompt: P,
    negotiator: PermissionNegotiator,
    manager: ConnectionManager<H::Connection>,
    watcher: DetachmentWatcher,
}

impl<H: UsbHost, P: PermissionPrompt> Dispatcher<H, P> {
    /// Create a dispatcher, subscribing to removals when `watch_removals` is set
    pub fn new(mut host: H, prompt: P, events: HostEventSender, watch_removals: bool) -> Self {
        let watcher = if watch_removals {
            DetachmentWatcher::start(&mut host, events)
        } else {
            DetachmentWatcher::inactive()
        };

        Self {
            host,
            prompt,
            negotiator: PermissionNegotiator::new(),
            manager: ConnectionManager::new(),
            watcher,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn negotiator(&self) -> &PermissionNegotiator {
        &self.negotiator
    }

    pub fn watcher(&self) -> &DetachmentWatcher {
        &self.watcher
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn bound_device(&self) -> Option<&DeviceDescriptor> {
        self.manager.bound_device()
    }

    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        registry::list_devices(&self.host).collect()
    }

    pub fn request_permission(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<PermissionOutcome> {
        self.negotiator
            .request(&self.host, &self.prompt, vendor_id, product_id)
    }

    pub fn connect(&mut self, vendor_id: u16, product_id: u16) -> Result<()> {
        self.manager.connect(&self.host, vendor_id, product_id)
    }

    pub fn print_bytes(&mut self, payload: &[u8]) -> Result<usize> {
        transfers::print_bytes(&mut self.manager, payload)
    }

    pub fn disconnect(&mut self) -> bool {
        self.manager.disconnect()
    }

    /// Run one request
    pub fn handle_request(&mut self, request: Request) -> Reply {
        let method = request.method();
        debug!("Handling {}", method);

        let result = match request {
            Request::IsConnected => Ok(ResponseValue::Bool(self.is_connected())),

            Request::ListDevices => Ok(ResponseValue::Devices(
                self.list_devices()
                    .into_iter()
                    .map(DeviceSummary::from)
                    .collect(),
            )),

            Request::RequestPermission(args) => {
                let (vendor_id, product_id) = match args.identity() {
                    Ok(identity) => identity,
                    Err(e) => return Reply::Ready(Response::Error(e)),
                };
                match self.request_permission(vendor_id, product_id) {
                    Ok(PermissionOutcome::Resolved(granted)) => Ok(ResponseValue::Bool(granted)),
                    Ok(PermissionOutcome::Pending(receiver)) => return Reply::Pending(receiver),
                    Err(e) => Err(method_error(ErrorCode::NotFound, e)),
                }
            }

            Request::Connect(args) => args.identity().and_then(|(vendor_id, product_id)| {
                self.connect(vendor_id, product_id)
                    .map(|()| ResponseValue::Bool(true))
                    .map_err(|e| method_error(ErrorCode::ConnectFailed, e))
            }),

            Request::PrintBytes(args) => args.into_payload().and_then(|payload| {
                self.print_bytes(&payload)
                    .map(|_| ResponseValue::Bool(true))
                    .map_err(|e| method_error(ErrorCode::WriteFailed, e))
            }),

            Request::Disconnect => Ok(ResponseValue::Bool(self.disconnect())),
        };

        if let Err(e) = &result {
            info!("{} failed: {}", method, e);
        }
        Reply::Ready(result.into())
    }

    /// Process one host notification
    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::PermissionResult { token, granted } => {
                self.negotiator.resolve(token, granted);
            }
            HostEvent::DeviceAttached { device } => {
                debug!("Device attached: {}", device);
            }
            HostEvent::DeviceDetached { device } => {
                self.watcher.handle_detached(&mut self.manager, &device);
            }
        }
    }

    /// Close the session and abandon outstanding permission requests
    pub fn shutdown(&mut self) {
        self.manager.disconnect();
        self.negotiator.cancel_all();
    }
}

/// Report a session error under the code the calling method exposes
fn method_error(code: ErrorCode, err: BridgeError) -> MethodError {
    MethodError::new(code, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{MockDevice, MockHost, MockPrompt, ScriptedWrite};
    use common::create_usb_bridge;
    use common::test_utils::{create_mock_payload, create_printer_interface};
    use protocol::{DeviceArgs, PrintArgs};

    fn dispatcher(host: &MockHost) -> (Dispatcher<MockHost, MockPrompt>, common::UsbWorker) {
        let (_bridge, worker) = create_usb_bridge();
        let dispatcher = Dispatcher::new(
            host.clone(),
            MockPrompt::new(),
            worker.event_sender(),
            true,
        );
        (dispatcher, worker)
    }

    fn ready(reply: Reply) -> Response {
        match reply {
            Reply::Ready(response) => response,
            Reply::Pending(_) => panic!("unexpected pending reply"),
        }
    }

    fn acme(host: &MockHost) {
        host.add_device(
            MockDevice::new(1234, 5678, "usb001")
                .with_manufacturer("Acme")
                .with_interfaces(vec![create_printer_interface(0)]),
        );
    }

    #[test]
    fn test_connect_unknown_device_is_connect_failed() {
        let host = MockHost::new();
        let (mut dispatcher, _worker) = dispatcher(&host);

        let response = ready(dispatcher.handle_request(Request::Connect(DeviceArgs::new(9999, 9999))));
        assert_eq!(response.error_code(), Some(ErrorCode::ConnectFailed));
        assert!(!dispatcher.is_connected());
    }

    #[test]
    fn test_connect_without_permission_is_connect_failed() {
        let host = MockHost::new();
        host.add_device(
            MockDevice::new(1234, 5678, "usb001")
                .with_interfaces(vec![create_printer_interface(0)])
                .with_permission(false),
        );
        let (mut dispatcher, _worker) = dispatcher(&host);

        let response = ready(dispatcher.handle_request(Request::Connect(DeviceArgs::new(1234, 5678))));
        assert_eq!(response.error_code(), Some(ErrorCode::ConnectFailed));
    }

    #[test]
    fn test_permission_unknown_device_is_not_found() {
        let host = MockHost::new();
        let (mut dispatcher, _worker) = dispatcher(&host);

        let response = ready(
            dispatcher.handle_request(Request::RequestPermission(DeviceArgs::new(1, 2))),
        );
        assert_eq!(response.error_code(), Some(ErrorCode::NotFound));
    }

    #[test]
    fn test_bad_args() {
        let host = MockHost::new();
        acme(&host);
        let (mut dispatcher, _worker) = dispatcher(&host);

        for request in [
            Request::Connect(DeviceArgs::default()),
            Request::RequestPermission(DeviceArgs {
                vendor_id: Some(1234),
                product_id: None,
            }),
            Request::PrintBytes(PrintArgs::default()),
        ] {
            let response = ready(dispatcher.handle_request(request));
            assert_eq!(response.error_code(), Some(ErrorCode::BadArgs));
        }
        assert!(host.state().writes.is_empty());
    }

    #[test]
    fn test_print_while_idle_is_write_failed() {
        let host = MockHost::new();
        let (mut dispatcher, _worker) = dispatcher(&host);

        let response = ready(dispatcher.handle_request(Request::PrintBytes(PrintArgs::new(vec![1]))));
        assert_eq!(response.error_code(), Some(ErrorCode::WriteFailed));
    }

    #[test]
    fn test_zero_write_is_write_failed() {
        let host = MockHost::new();
        acme(&host);
        let (mut dispatcher, _worker) = dispatcher(&host);
        dispatcher.connect(1234, 5678).unwrap();
        host.script_writes([ScriptedWrite::Full, ScriptedWrite::Zero]);

        let response = ready(dispatcher.handle_request(Request::PrintBytes(PrintArgs::new(
            create_mock_payload(10_000),
        ))));
        assert_eq!(response.error_code(), Some(ErrorCode::WriteFailed));
        assert_eq!(host.state().written_bytes().len(), 4096);
    }

    #[test]
    fn test_permission_event_resolves_pending_reply() {
        let host = MockHost::new();
        host.add_device(
            MockDevice::new(1234, 5678, "usb001")
                .with_interfaces(vec![create_printer_interface(0)])
                .with_permission(false),
        );
        let (_bridge, worker) = create_usb_bridge();
        let prompt = MockPrompt::new();
        let mut dispatcher = Dispatcher::new(host.clone(), prompt.clone(), worker.event_sender(), true);

        let Reply::Pending(mut receiver) =
            dispatcher.handle_request(Request::RequestPermission(DeviceArgs::new(1234, 5678)))
        else {
            panic!("expected pending reply");
        };

        let (_, token) = prompt.prompts()[0].clone();
        dispatcher.handle_event(HostEvent::PermissionResult {
            token,
            granted: true,
        });
        assert_eq!(receiver.try_recv(), Ok(true));
        assert_eq!(dispatcher.negotiator().pending_count(), 0);
    }

    #[test]
    fn test_detach_event_disconnects() {
        let host = MockHost::new();
        acme(&host);
        let (mut dispatcher, worker) = dispatcher(&host);
        dispatcher.connect(1234, 5678).unwrap();

        host.remove_device("usb001");
        let event = worker.try_recv_event().unwrap();
        dispatcher.handle_event(event);

        assert!(!dispatcher.is_connected());
    }

    #[test]
    fn test_shutdown_disconnects() {
        let host = MockHost::new();
        acme(&host);
        let (mut dispatcher, _worker) = dispatcher(&host);
        dispatcher.connect(1234, 5678).unwrap();

        dispatcher.shutdown();
        assert!(!dispatcher.is_connected());
        assert_eq!(host.state().closes, 1);
    }
}
