//! USB worker thread
//!
//! Dedicated thread that owns the host and every piece of session state.
//! Each iteration takes at most one command, drains queued host events ahead
//! of it, runs it, then pumps host callbacks. Commands therefore never
//! overlap, and a removal or permission answer published before a command was
//! sent is always applied before that command runs.

use crate::dispatch::Dispatcher;
use crate::usb::device::RusbHost;
use crate::usb::host::{HostError, PermissionPrompt, UsbHost};
use common::{HostEventSender, UsbCommand, UsbWorker};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long to wait for host callbacks when no command is queued
const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off after the host fails to pump events
const EVENT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct UsbWorkerThread<H: UsbHost, P: PermissionPrompt> {
    dispatcher: Dispatcher<H, P>,
    worker: UsbWorker,
}

impl<H: UsbHost, P: PermissionPrompt> UsbWorkerThread<H, P> {
    pub fn new(worker: UsbWorker, host: H, prompt: P, hotplug: bool) -> Self {
        let dispatcher = Dispatcher::new(host, prompt, worker.event_sender(), hotplug);
        Self { dispatcher, worker }
    }

    /// Run until a Shutdown command arrives or every bridge handle is dropped
    pub fn run(mut self) {
        info!("USB worker thread started");

        loop {
            let busy = match self.worker.try_recv_command() {
                Some(UsbCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Some(cmd) => {
                    // events queued before the command was sent apply first
                    self.drain_events();
                    self.handle_command(cmd);
                    true
                }
                None if self.worker.is_closed() => {
                    info!("All bridge handles dropped, stopping USB worker");
                    break;
                }
                None => {
                    self.drain_events();
                    false
                }
            };

            // don't sit in the host while more commands may be queued
            let timeout = if busy { Duration::ZERO } else { EVENT_TIMEOUT };
            if let Err(e) = self.dispatcher.host().handle_events(timeout) {
                warn!("Error handling USB events: {}", e);
                std::thread::sleep(EVENT_ERROR_BACKOFF);
            }
        }

        self.dispatcher.shutdown();
        info!("USB worker thread stopped");
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.worker.try_recv_event() {
            self.dispatcher.handle_event(event);
        }
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: UsbCommand) {
        // a panic drops the reply sender; the caller sees `unavailable`
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: UsbCommand) {
        match cmd {
            UsbCommand::Call { request, response } => {
                let method = request.method();
                let reply = self.dispatcher.handle_request(request);
                if response.send(reply).is_err() {
                    debug!("Caller of {} went away before the reply", method);
                }
            }

            // handled in the main loop
            UsbCommand::Shutdown => {}
        }
    }
}

/// Spawn the worker on a host built inside the new thread
///
/// `factory` receives the worker's event publisher so prompts and backends
/// can report back. A factory failure ends the thread with that error, and
/// callers of the bridge then see `unavailable`.
pub fn spawn_worker_with<H, P, F>(
    worker: UsbWorker,
    hotplug: bool,
    factory: F,
) -> std::io::Result<std::thread::JoinHandle<Result<(), HostError>>>
where
    H: UsbHost,
    P: PermissionPrompt,
    F: FnOnce(&HostEventSender) -> Result<(H, P), HostError> + Send + 'static,
{
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let (host, prompt) = factory(&worker.event_sender()).map_err(|e| {
                error!("Failed to initialize USB host: {}", e);
                e
            })?;
            UsbWorkerThread::new(worker, host, prompt, hotplug).run();
            Ok(())
        })
}

/// Spawn the worker on the libusb host
pub fn spawn_usb_worker(
    worker: UsbWorker,
    hotplug: bool,
) -> std::io::Result<std::thread::JoinHandle<Result<(), HostError>>> {
    spawn_worker_with(worker, hotplug, |events| {
        let host = RusbHost::new()?;
        let prompt = host.permission_prompt(events.clone());
        Ok((host, prompt))
    })
}
