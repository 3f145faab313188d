//! In-memory stand-in for a Pulse Pal on the other end of the serial link

#![allow(dead_code)]

use pulsepal_core::device::PulsePal;
use pulsepal_core::protocol::{ConnectionConfig, Transport};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const HANDSHAKE: [u8; 2] = [213, 72];

#[derive(Default)]
struct DeviceState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    handshake_reply: Option<Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Handle on the simulated device, shared with every transport clone
#[derive(Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    /// A device that acknowledges the handshake with `firmware`
    pub fn new(firmware: u32) -> Self {
        let mut reply = vec![75];
        reply.extend_from_slice(&firmware.to_le_bytes());
        Self::with_reply(reply)
    }

    /// A device that answers the handshake with arbitrary bytes
    pub fn with_reply(reply: Vec<u8>) -> Self {
        let device = Self::default();
        device.lock().handshake_reply = Some(reply);
        device
    }

    /// A device that never answers
    pub fn silent() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(MockTransport {
            state: Arc::clone(&self.state),
        })
    }

    /// Everything the host has written so far
    pub fn sent(&self) -> Vec<u8> {
        self.lock().outbound.clone()
    }

    /// Everything the host has written since the last call
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().outbound)
    }

    pub fn push_inbound(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes);
    }

    /// Transport handles still held by the host
    pub fn live_transports(&self) -> usize {
        Arc::strong_count(&self.state) - 1
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

struct MockTransport {
    state: Arc<Mutex<DeviceState>>,
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_reads {
                return Err(io::Error::other("device unplugged"));
            }
            if !state.inbound.is_empty() {
                let n = buf.len().min(state.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        thread::sleep(Duration::from_millis(5));
        Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.outbound.extend_from_slice(buf);
        if buf == HANDSHAKE {
            if let Some(reply) = state.handshake_reply.clone() {
                state.inbound.extend(reply);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.state.lock().unwrap().inbound.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().inbound.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(MockTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Route driver logs to the test harness; set `RUST_LOG=pulsepal_core=trace`
/// to see the bytes on the wire
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config(handshake_timeout_ms: u64) -> ConnectionConfig {
    ConnectionConfig {
        port_name: "mock".to_string(),
        read_timeout_ms: 10,
        handshake_timeout_ms,
    }
}

/// Open a device against a mock reporting `firmware`, with the handshake
/// bytes already cleared from the outbound log
pub fn open_device(firmware: u32) -> (PulsePal, MockDevice) {
    init_tracing();
    let mock = MockDevice::new(firmware);
    let mut device = PulsePal::with_config(test_config(1000));
    device
        .open_with_transport(mock.transport(), CancellationToken::new())
        .unwrap();
    mock.take_sent();
    (device, mock)
}

/// Poll until `condition` holds or a second passes
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
