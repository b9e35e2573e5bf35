//! In-memory host
//!
//! [`MockHost`] stands in for the USB stack in tests and dry runs. Its state
//! is shared behind an `Arc`, so a clone kept by a test still observes the
//! host after the original has moved into the USB worker thread.

use crate::usb::host::{HostError, PermissionPrompt, UsbConnection, UsbHost};
use common::{
    DeviceDescriptor, EndpointInfo, HostEvent, HostEventSender, InterfaceInfo, PermissionToken,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One simulated device
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub descriptor: DeviceDescriptor,
    pub manufacturer: Option<String>,
    pub manufacturer_fails: bool,
    pub interfaces: Vec<InterfaceInfo>,
    pub permitted: bool,
    pub open_fails: bool,
    /// Interface numbers whose claim fails
    pub failing_claims: Vec<u8>,
}

impl MockDevice {
    pub fn new(vendor_id: u16, product_id: u16, system_name: impl Into<String>) -> Self {
        Self {
            descriptor: DeviceDescriptor::new(vendor_id, product_id, system_name),
            manufacturer: None,
            manufacturer_fails: false,
            interfaces: Vec::new(),
            permitted: true,
            open_fails: false,
            failing_claims: Vec::new(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_failing_manufacturer(mut self) -> Self {
        self.manufacturer_fails = true;
        self
    }

    pub fn with_interfaces(mut self, interfaces: Vec<InterfaceInfo>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_permission(mut self, permitted: bool) -> Self {
        self.permitted = permitted;
        self
    }

    pub fn with_failing_open(mut self) -> Self {
        self.open_fails = true;
        self
    }

    pub fn with_failing_claim(mut self, interface: u8) -> Self {
        self.failing_claims.push(interface);
        self
    }
}

/// Scripted outcome of one bulk write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedWrite {
    /// Accept the whole chunk
    Full,
    /// Accept at most this many bytes
    Short(usize),
    /// Accept nothing
    Zero,
    /// Fail the transfer
    Fail(HostError),
}

/// One bulk write as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub endpoint: u8,
    pub requested: usize,
    pub timeout: Duration,
    /// Bytes the mock accepted
    pub accepted: Vec<u8>,
}

/// Observable state of a [`MockHost`]
#[derive(Debug)]
pub struct MockState {
    pub devices: Vec<MockDevice>,
    pub enumerate_fails: bool,
    pub hotplug_supported: bool,
    pub subscriber: Option<HostEventSender>,
    pub manufacturer_reads: Vec<String>,
    pub opens: usize,
    pub claims: Vec<u8>,
    pub releases: Vec<u8>,
    pub release_fails: bool,
    pub close_attempts: usize,
    pub closes: usize,
    pub close_fails: bool,
    pub write_script: VecDeque<ScriptedWrite>,
    pub writes: Vec<WriteRecord>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            enumerate_fails: false,
            hotplug_supported: true,
            subscriber: None,
            manufacturer_reads: Vec::new(),
            opens: 0,
            claims: Vec::new(),
            releases: Vec::new(),
            release_fails: false,
            close_attempts: 0,
            closes: 0,
            close_fails: false,
            write_script: VecDeque::new(),
            writes: Vec::new(),
        }
    }
}

impl MockState {
    /// Requested size of every bulk write, in order
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.writes.iter().map(|w| w.requested).collect()
    }

    /// Concatenation of every accepted byte
    pub fn written_bytes(&self) -> Vec<u8> {
        self.writes
            .iter()
            .flat_map(|w| w.accepted.iter().copied())
            .collect()
    }

    fn device(&self, descriptor: &DeviceDescriptor) -> Result<&MockDevice, HostError> {
        self.devices
            .iter()
            .find(|d| d.descriptor.is_same_device(descriptor))
            .ok_or(HostError::NoDevice)
    }
}

/// Simulated USB host
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the shared state for inspection or scripting
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug a device in, publishing `DeviceAttached` when subscribed
    pub fn add_device(&self, device: MockDevice) {
        let mut state = self.state();
        if let Some(subscriber) = &state.subscriber {
            subscriber.publish(HostEvent::DeviceAttached {
                device: device.descriptor.clone(),
            });
        }
        state.devices.push(device);
    }

    /// Unplug a device, publishing `DeviceDetached` when subscribed
    pub fn remove_device(&self, system_name: &str) -> Option<DeviceDescriptor> {
        let mut state = self.state();
        let index = state
            .devices
            .iter()
            .position(|d| d.descriptor.system_name == system_name)?;
        let removed = state.devices.remove(index).descriptor;

        if let Some(subscriber) = &state.subscriber {
            subscriber.publish(HostEvent::DeviceDetached {
                device: removed.clone(),
            });
        }
        Some(removed)
    }

    /// Change whether a device may be opened
    pub fn set_permission(&self, system_name: &str, permitted: bool) {
        let mut state = self.state();
        for device in state
            .devices
            .iter_mut()
            .filter(|d| d.descriptor.system_name == system_name)
        {
            device.permitted = permitted;
        }
    }

    /// Queue outcomes for the next bulk writes; unscripted writes are `Full`
    pub fn script_writes(&self, script: impl IntoIterator<Item = ScriptedWrite>) {
        self.state().write_script.extend(script);
    }
}

impl UsbHost for MockHost {
    type Connection = MockConnection;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, HostError> {
        let state = self.state();
        if state.enumerate_fails {
            return Err(HostError::Io);
        }
        Ok(state.devices.iter().map(|d| d.descriptor.clone()).collect())
    }

    fn manufacturer_name(&self, device: &DeviceDescriptor) -> Result<Option<String>, HostError> {
        let mut state = self.state();
        state.manufacturer_reads.push(device.system_name.clone());
        let mock = state.device(device)?;
        if mock.manufacturer_fails {
            return Err(HostError::Access);
        }
        Ok(mock.manufacturer.clone())
    }

    fn interfaces(&self, device: &DeviceDescriptor) -> Result<Vec<InterfaceInfo>, HostError> {
        Ok(self.state().device(device)?.interfaces.clone())
    }

    fn has_permission(&self, device: &DeviceDescriptor) -> bool {
        self.state()
            .device(device)
            .map(|d| d.permitted)
            .unwrap_or(false)
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<MockConnection, HostError> {
        let mut state = self.state();
        state.opens += 1;

        let mock = state.device(device)?;
        if mock.open_fails {
            return Err(HostError::Io);
        }
        if !mock.permitted {
            return Err(HostError::Access);
        }
        let failing_claims = mock.failing_claims.clone();

        Ok(MockConnection {
            state: Arc::clone(&self.state),
            device: device.clone(),
            failing_claims,
        })
    }

    fn subscribe(&mut self, events: HostEventSender) -> Result<(), HostError> {
        let mut state = self.state();
        if !state.hotplug_supported {
            return Err(HostError::NotSupported);
        }
        state.subscriber = Some(events);
        Ok(())
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), HostError> {
        // keep the worker loop responsive in tests
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(())
    }
}

/// Connection to a [`MockDevice`]
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    device: DeviceDescriptor,
    failing_claims: Vec<u8>,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UsbConnection for MockConnection {
    fn claim_interface(&mut self, interface: &InterfaceInfo) -> Result<(), HostError> {
        if self.failing_claims.contains(&interface.number) {
            return Err(HostError::Busy);
        }
        self.state().claims.push(interface.number);
        Ok(())
    }

    fn release_interface(&mut self, interface: &InterfaceInfo) -> Result<(), HostError> {
        let mut state = self.state();
        if state.release_fails {
            return Err(HostError::NoDevice);
        }
        state.releases.push(interface.number);
        Ok(())
    }

    fn bulk_write(
        &mut self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, HostError> {
        let mut state = self.state();
        if state.device(&self.device).is_err() {
            return Err(HostError::NoDevice);
        }

        let outcome = state.write_script.pop_front().unwrap_or(ScriptedWrite::Full);
        let accepted = match &outcome {
            ScriptedWrite::Full => data.len(),
            ScriptedWrite::Short(n) => (*n).min(data.len()),
            ScriptedWrite::Zero | ScriptedWrite::Fail(_) => 0,
        };

        state.writes.push(WriteRecord {
            endpoint: endpoint.address,
            requested: data.len(),
            timeout,
            accepted: data[..accepted].to_vec(),
        });

        match outcome {
            ScriptedWrite::Fail(e) => Err(e),
            _ => Ok(accepted),
        }
    }

    fn close(self) -> Result<(), HostError> {
        let mut state = self.state();
        state.close_attempts += 1;
        if state.close_fails {
            return Err(HostError::Io);
        }
        state.closes += 1;
        Ok(())
    }
}

/// Permission prompt that records every request
///
/// With an auto answer set and an event sender attached, it publishes the
/// answer immediately, like a user clicking straight through the dialog.
#[derive(Debug, Clone, Default)]
pub struct MockPrompt {
    inner: Arc<Mutex<PromptState>>,
}

#[derive(Debug, Default)]
struct PromptState {
    prompts: Vec<(DeviceDescriptor, PermissionToken)>,
    fails: bool,
    auto_answer: Option<(HostEventSender, bool)>,
}

impl MockPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every prompt with `granted` through `events`
    pub fn answering(events: HostEventSender, granted: bool) -> Self {
        let prompt = Self::default();
        prompt.lock().auto_answer = Some((events, granted));
        prompt
    }

    pub fn fail_prompts(&self, fails: bool) {
        self.lock().fails = fails;
    }

    /// Prompts issued so far
    pub fn prompts(&self) -> Vec<(DeviceDescriptor, PermissionToken)> {
        self.lock().prompts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PromptState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PermissionPrompt for MockPrompt {
    fn prompt(&self, device: &DeviceDescriptor, token: PermissionToken) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.fails {
            return Err(HostError::NotSupported);
        }
        state.prompts.push((device.clone(), token));

        if let Some((events, granted)) = &state.auto_answer {
            events.publish(HostEvent::PermissionResult {
                token,
                granted: *granted,
            });
        }
        Ok(())
    }
}
