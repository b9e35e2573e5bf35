//! USB Bridge Integration Tests
//!
//! Tests for the async channel bridge between Tokio runtime and USB thread.
//!
//! # Test Scenarios
//! - Request/reply flow through a simulated worker
//! - Pending permission replies
//! - Worker lifecycle and channel closure
//! - Host event ordering
//!
//! Run with: `cargo test -p common --test usb_bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, create_mock_device_list, with_timeout};
use common::{HostEvent, PermissionToken, Reply, UsbCommand, UsbWorker, create_usb_bridge};
use protocol::{DeviceArgs, ErrorCode, Request, Response, ResponseValue};
use std::thread;
use std::time::Duration;

/// Answer calls until Shutdown, replying to every request with `isConnected` state
fn echo_worker(worker: UsbWorker) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut handled = 0;
        loop {
            match worker.recv_command() {
                Ok(UsbCommand::Call { request, response }) => {
                    handled += 1;
                    let reply = match request {
                        Request::ListDevices => Response::Ok(ResponseValue::Devices(
                            create_mock_device_list(2)
                                .into_iter()
                                .map(Into::into)
                                .collect(),
                        )),
                        _ => Response::ok_bool(false),
                    };
                    let _ = response.send(Reply::Ready(reply));
                }
                Ok(UsbCommand::Shutdown) | Err(_) => break,
            }
        }
        handled
    })
}

#[tokio::test]
async fn test_request_reply_flow() {
    let (bridge, worker) = create_usb_bridge();
    let handle = echo_worker(worker);

    let response = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.call(Request::ListDevices))
        .await
        .unwrap();
    let Response::Ok(ResponseValue::Devices(devices)) = response else {
        panic!("expected device list, got {:?}", response);
    };
    assert_eq!(devices.len(), 2);

    let response = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.call(Request::IsConnected))
        .await
        .unwrap();
    assert_eq!(response, Response::ok_bool(false));

    bridge.send_command(UsbCommand::Shutdown).await.unwrap();
    assert_eq!(handle.join().unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_callers() {
    let (bridge, worker) = create_usb_bridge();
    let handle = echo_worker(worker);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let bridge = bridge.clone();
        tasks.push(tokio::spawn(async move {
            bridge.call(Request::Disconnect).await
        }));
    }
    for task in tasks {
        let response = with_timeout(DEFAULT_TEST_TIMEOUT, task).await.unwrap().unwrap();
        assert_eq!(response, Response::ok_bool(false));
    }

    drop(bridge);
    // dropping every bridge handle closes the command channel
    assert_eq!(handle.join().unwrap(), 16);
}

#[tokio::test]
async fn test_pending_reply_resolved_from_event() {
    let (bridge, worker) = create_usb_bridge();
    let events = worker.event_sender();

    let handle = thread::spawn(move || {
        let UsbCommand::Call { response, .. } = worker.recv_command().unwrap() else {
            panic!("expected call");
        };
        let (grant_tx, grant_rx) = tokio::sync::oneshot::channel();
        let _ = response.send(Reply::Pending(grant_rx));

        // the answer arrives later as a host event
        let token = loop {
            if let Some(HostEvent::PermissionResult { token, granted }) = worker.try_recv_event() {
                assert!(granted);
                break token;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(token, PermissionToken(7));
        grant_tx.send(true).unwrap();
    });

    events.publish(HostEvent::PermissionResult {
        token: PermissionToken(7),
        granted: true,
    });

    let response = with_timeout(
        DEFAULT_TEST_TIMEOUT,
        bridge.call(Request::RequestPermission(DeviceArgs::new(0x04b8, 0x0202))),
    )
    .await
    .unwrap();
    assert_eq!(response, Response::ok_bool(true));
    handle.join().unwrap();
}

#[tokio::test]
async fn test_abandoned_permission_is_unavailable() {
    let (bridge, worker) = create_usb_bridge();

    let handle = thread::spawn(move || {
        let UsbCommand::Call { response, .. } = worker.recv_command().unwrap() else {
            panic!("expected call");
        };
        let (grant_tx, grant_rx) = tokio::sync::oneshot::channel::<bool>();
        let _ = response.send(Reply::Pending(grant_rx));
        drop(grant_tx);
    });

    let response = with_timeout(
        DEFAULT_TEST_TIMEOUT,
        bridge.call(Request::RequestPermission(DeviceArgs::new(1, 2))),
    )
    .await
    .unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::Unavailable));
    handle.join().unwrap();
}

#[tokio::test]
async fn test_dropped_reply_is_unavailable() {
    let (bridge, worker) = create_usb_bridge();

    let handle = thread::spawn(move || {
        // drop the reply sender without answering
        let _ = worker.recv_command().unwrap();
    });

    let response = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.call(Request::IsConnected))
        .await
        .unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::Unavailable));
    handle.join().unwrap();
}

#[test]
fn test_worker_sees_closed_channel() {
    let (bridge, worker) = create_usb_bridge();
    assert!(!worker.is_closed());
    drop(bridge);
    assert!(worker.is_closed());
    assert!(worker.recv_command().is_err());
}

#[test]
fn test_events_survive_dropped_bridge() {
    let (bridge, worker) = create_usb_bridge();
    drop(bridge);

    let device = create_mock_device_list(1).remove(0);
    worker.event_sender().publish(HostEvent::DeviceDetached {
        device: device.clone(),
    });
    assert_eq!(
        worker.try_recv_event(),
        Some(HostEvent::DeviceDetached { device })
    );
}
