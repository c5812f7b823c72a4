//! UDP Receive Loop
//!
//! Lifecycle: `Created -> Running -> Stopping -> Stopped`. The socket is
//! bound in [`TelemetryReceiver::bind`], read by one background thread after
//! [`TelemetryReceiver::start`], and released when that thread exits.

use crate::consumer::SampleConsumer;
use crate::error::ReceiverError;
use crate::shutdown::ShutdownSignal;
use crate::stats::{ReceiverStats, ReceiverStatsSnapshot};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use telemetry_protocol::parse_sample;
use tracing::{debug, error, info, warn};

/// Default UDP port the sensor board sends to
pub const DEFAULT_PORT: u16 = 5005;

const DEFAULT_RECV_TIMEOUT_MS: u64 = 500;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;
const DEFAULT_RECV_BUFFER_SIZE: usize = 2048;

/// A zero read timeout means "block forever" to the OS
const MIN_RECV_TIMEOUT: Duration = Duration::from_millis(1);

/// Receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Local address to bind
    pub host: String,
    /// Local port to bind (0 picks an ephemeral port)
    pub port: u16,
    /// Longest a single receive blocks before the stop flags are re-checked
    pub recv_timeout: Duration,
    /// How long `close()` waits for the receive thread
    pub join_timeout: Duration,
    /// Largest datagram accepted; longer ones are dropped
    pub recv_buffer_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            recv_timeout: Duration::from_millis(DEFAULT_RECV_TIMEOUT_MS),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl ReceiverConfig {
    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Socket bound, not reading yet
    Created,
    /// Receive thread running
    Running,
    /// `close()` called, receive thread not yet joined
    Stopping,
    /// Receive thread finished and socket released
    Stopped,
}

struct Worker {
    handle: JoinHandle<()>,
    /// Disconnects when the receive loop drops its sender on exit
    finished: mpsc::Receiver<()>,
}

/// UDP telemetry receiver.
///
/// Consumers are fixed at construction and invoked in registration order on
/// the receive thread, once per valid sample.
pub struct TelemetryReceiver {
    config: ReceiverConfig,
    local_addr: SocketAddr,
    /// Held until `start()` hands it to the receive thread
    socket: Option<UdpSocket>,
    consumers: Vec<Box<dyn SampleConsumer>>,
    shutdown: ShutdownSignal,
    /// Set by `close()`; the receive loop treats it as the socket being closed
    closing: Arc<AtomicBool>,
    stats: Arc<ReceiverStats>,
    state: ReceiverState,
    worker: Option<Worker>,
}

impl TelemetryReceiver {
    /// Bind the socket and configure the receive timeout.
    ///
    /// A bind failure is the only hard error in the receiver's life; it is
    /// returned before anything is started.
    pub fn bind(
        config: ReceiverConfig,
        shutdown: ShutdownSignal,
        consumers: Vec<Box<dyn SampleConsumer>>,
    ) -> Result<Self, ReceiverError> {
        let socket = UdpSocket::bind((config.host.as_str(), config.port)).map_err(|source| {
            ReceiverError::Bind {
                addr: config.bind_addr(),
                source,
            }
        })?;
        socket.set_read_timeout(Some(config.recv_timeout.max(MIN_RECV_TIMEOUT)))?;
        let local_addr = socket.local_addr()?;

        info!(
            "Telemetry receiver bound to {} ({} consumers)",
            local_addr,
            consumers.len()
        );

        Ok(Self {
            config,
            local_addr,
            socket: Some(socket),
            consumers,
            shutdown,
            closing: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ReceiverStats::new()),
            state: ReceiverState::Created,
            worker: None,
        })
    }

    /// Spawn the receive thread. Calling this while running is a no-op; a
    /// closed receiver can't be restarted.
    pub fn start(&mut self) -> Result<(), ReceiverError> {
        match self.state {
            ReceiverState::Running => {
                debug!("Receiver already running");
                return Ok(());
            }
            ReceiverState::Stopping | ReceiverState::Stopped => return Err(ReceiverError::Closed),
            ReceiverState::Created => {}
        }

        let socket = self.socket.take().ok_or(ReceiverError::Closed)?;
        let (finished_tx, finished_rx) = mpsc::channel();

        let receive_loop = ReceiveLoop {
            socket,
            consumers: std::mem::take(&mut self.consumers),
            shutdown: self.shutdown.clone(),
            closing: Arc::clone(&self.closing),
            stats: Arc::clone(&self.stats),
            buffer_size: self.config.recv_buffer_size.max(1),
            _finished: finished_tx,
        };

        let handle = thread::Builder::new()
            .name("telemetry-rx".to_string())
            .spawn(move || receive_loop.run())
            .map_err(|e| {
                self.state = ReceiverState::Stopped;
                ReceiverError::Spawn(e.to_string())
            })?;

        self.worker = Some(Worker {
            handle,
            finished: finished_rx,
        });
        self.state = ReceiverState::Running;
        info!("Listening for telemetry on UDP {}", self.local_addr);
        Ok(())
    }

    /// Stop the receive loop and wait for it, bounded by the join timeout.
    ///
    /// On [`ReceiverError::JoinTimeout`] the thread is left to finish on its
    /// own (it exits within one receive timeout) and a later `close()` waits
    /// again.
    pub fn close(&mut self) -> Result<(), ReceiverError> {
        match self.state {
            ReceiverState::Stopped => return Ok(()),
            ReceiverState::Created => {
                self.socket = None;
                self.state = ReceiverState::Stopped;
                info!("Telemetry receiver closed before start");
                return Ok(());
            }
            ReceiverState::Running | ReceiverState::Stopping => {}
        }

        self.state = ReceiverState::Stopping;
        self.closing.store(true, Ordering::SeqCst);

        let Some(worker) = self.worker.take() else {
            self.state = ReceiverState::Stopped;
            return Ok(());
        };

        match worker.finished.recv_timeout(self.config.join_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Receive thread still running after {:?}",
                    self.config.join_timeout
                );
                self.worker = Some(worker);
                Err(ReceiverError::JoinTimeout(
                    self.config.join_timeout.as_millis() as u64,
                ))
            }
            _ => {
                self.state = ReceiverState::Stopped;
                worker
                    .handle
                    .join()
                    .map_err(|_| ReceiverError::WorkerPanicked)?;
                info!("Telemetry receiver stopped");
                Ok(())
            }
        }
    }

    /// Current lifecycle state. A receive loop that exited on its own (shared
    /// shutdown signal, fatal socket error) reports `Stopped`.
    pub fn state(&self) -> ReceiverState {
        match (&self.state, &self.worker) {
            (ReceiverState::Running | ReceiverState::Stopping, Some(worker))
                if worker.handle.is_finished() =>
            {
                ReceiverState::Stopped
            }
            (state, _) => *state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReceiverState::Running
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ReceiverStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for TelemetryReceiver {
    fn drop(&mut self) {
        if matches!(
            self.state,
            ReceiverState::Running | ReceiverState::Stopping
        ) {
            if let Err(e) = self.close() {
                warn!("Receiver close on drop failed: {}", e);
            }
        }
    }
}

/// State owned by the receive thread
struct ReceiveLoop {
    socket: UdpSocket,
    consumers: Vec<Box<dyn SampleConsumer>>,
    shutdown: ShutdownSignal,
    closing: Arc<AtomicBool>,
    stats: Arc<ReceiverStats>,
    buffer_size: usize,
    _finished: mpsc::Sender<()>,
}

impl ReceiveLoop {
    fn run(self) {
        // One spare byte tells an exact fit apart from a truncated datagram
        let mut buf = vec![0u8; self.buffer_size + 1];
        debug!("Receive loop started");

        while !self.should_stop() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, source)) if len > self.buffer_size => {
                    self.stats.record_datagram();
                    self.stats.record_rejected();
                    debug!(
                        "Dropping datagram from {}: longer than {} bytes",
                        source, self.buffer_size
                    );
                }
                Ok((len, source)) => self.handle_datagram(&buf[..len], source),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) if self.should_stop() => {
                    debug!("Receive interrupted by shutdown: {}", e);
                    break;
                }
                Err(e) if is_transient(e.kind()) => {
                    self.stats.record_receive_error();
                    warn!("Transient receive error: {}", e);
                }
                Err(e) => {
                    self.stats.record_receive_error();
                    error!("UDP socket failed, stopping receive loop: {}", e);
                    break;
                }
            }
        }

        info!("Receive loop exited");
    }

    fn should_stop(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.shutdown.is_requested()
    }

    /// Parse and dispatch one datagram. Panics in the parser or a consumer
    /// are contained here so the loop survives them.
    fn handle_datagram(&self, bytes: &[u8], source: SocketAddr) {
        self.stats.record_datagram();

        let sample = match panic::catch_unwind(|| parse_sample(bytes, source)) {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                self.stats.record_rejected();
                return;
            }
            Err(_) => {
                self.stats.record_parser_panic();
                error!("Parser panicked on datagram from {}", source);
                return;
            }
        };

        self.stats.record_sample();
        for (index, consumer) in self.consumers.iter().enumerate() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| consumer.on_sample(&sample)));
            if result.is_err() {
                self.stats.record_consumer_panic();
                error!("Consumer #{} panicked on sample from {}", index, source);
            }
        }
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::from_fn;
    use ring_buffer::SampleBuffer;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn test_config() -> ReceiverConfig {
        ReceiverConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            recv_timeout: Duration::from_millis(50),
            join_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn counting_consumer(count: &Arc<AtomicUsize>) -> Box<dyn SampleConsumer> {
        let count = Arc::clone(count);
        Box::new(from_fn(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn sender() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn test_bind_failure_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = ReceiverConfig {
            port: taken.local_addr().unwrap().port(),
            ..test_config()
        };

        let result = TelemetryReceiver::bind(config, ShutdownSignal::new(), Vec::new());
        assert!(matches!(result, Err(ReceiverError::Bind { .. })));
    }

    #[test]
    fn test_valid_datagram_dispatched_once() {
        let buffer = Arc::new(SampleBuffer::new(16));
        let count = Arc::new(AtomicUsize::new(0));
        let mut rx = TelemetryReceiver::bind(
            test_config(),
            ShutdownSignal::new(),
            vec![Box::new(Arc::clone(&buffer)), counting_consumer(&count)],
        )
        .unwrap();
        assert_eq!(rx.state(), ReceiverState::Created);

        rx.start().unwrap();
        rx.start().unwrap();
        assert!(rx.is_running());

        let tx = sender();
        tx.send_to(b"ms=1500,t_x100=2350,p_pa=101325", rx.local_addr())
            .unwrap();
        assert!(wait_for(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.snapshot().latest(), Some((1.5, 23.5, 1013.25)));

        // Malformed packets produce nothing; the following valid one proves
        // the malformed ones were already processed.
        tx.send_to(b"t_x100=2350,p_pa=101325", rx.local_addr()).unwrap();
        tx.send_to(b"ms=abc,t_x100=10,p_pa=1000", rx.local_addr()).unwrap();
        tx.send_to(&[0xFF, 0x00, 0x3D, 0x2C], rx.local_addr()).unwrap();
        tx.send_to(b"ms=1600,t_x100=2360,p_pa=101320", rx.local_addr())
            .unwrap();
        assert!(wait_for(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 2));

        let stats = rx.stats();
        assert_eq!(stats.datagrams, 5);
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.rejected, 3);
        assert_eq!(buffer.len(), 2);

        rx.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_consumers_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let consumers: Vec<Box<dyn SampleConsumer>> = (0..3)
            .map(|id| {
                let order = Arc::clone(&order);
                Box::new(from_fn(move |_| order.lock().unwrap().push(id)))
                    as Box<dyn SampleConsumer>
            })
            .collect();

        let mut rx =
            TelemetryReceiver::bind(test_config(), ShutdownSignal::new(), consumers).unwrap();
        rx.start().unwrap();
        sender()
            .send_to(b"ms=1,t_x100=1,p_pa=1", rx.local_addr())
            .unwrap();

        assert!(wait_for(Duration::from_secs(2), || order.lock().unwrap().len() == 3));
        rx.close().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_consumer_does_not_stop_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut rx = TelemetryReceiver::bind(
            test_config(),
            ShutdownSignal::new(),
            vec![
                Box::new(from_fn(|_| panic!("consumer bug"))),
                counting_consumer(&count),
            ],
        )
        .unwrap();
        rx.start().unwrap();

        let tx = sender();
        for ms in 0..3 {
            let packet = format!("ms={},t_x100=2000,p_pa=100000", ms);
            tx.send_to(packet.as_bytes(), rx.local_addr()).unwrap();
        }

        assert!(wait_for(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 3));
        assert_eq!(rx.stats().consumer_panics, 3);
        assert!(rx.is_running());
        rx.close().unwrap();
    }

    #[test]
    fn test_close_is_bounded_and_single_use() {
        let config = test_config();
        let bound = config.join_timeout + config.recv_timeout;
        let mut rx = TelemetryReceiver::bind(config, ShutdownSignal::new(), Vec::new()).unwrap();
        rx.start().unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        rx.close().unwrap();
        assert!(started.elapsed() <= bound);
        assert_eq!(rx.state(), ReceiverState::Stopped);

        rx.close().unwrap();
        assert!(matches!(rx.start(), Err(ReceiverError::Closed)));
    }

    #[test]
    fn test_close_before_start() {
        let mut rx =
            TelemetryReceiver::bind(test_config(), ShutdownSignal::new(), Vec::new()).unwrap();
        rx.close().unwrap();
        assert_eq!(rx.state(), ReceiverState::Stopped);
        assert!(matches!(rx.start(), Err(ReceiverError::Closed)));
    }

    #[test]
    fn test_shutdown_signal_stops_loop() {
        let shutdown = ShutdownSignal::new();
        let mut rx = TelemetryReceiver::bind(test_config(), shutdown.clone(), Vec::new()).unwrap();
        rx.start().unwrap();

        shutdown.request_shutdown();
        assert!(wait_for(Duration::from_secs(2), || rx.state()
            == ReceiverState::Stopped));
        rx.close().unwrap();
    }

    #[test]
    fn test_oversized_datagram_dropped() {
        let buffer = Arc::new(SampleBuffer::new(16));
        let count = Arc::new(AtomicUsize::new(0));
        let config = test_config();
        let limit = config.recv_buffer_size;
        let mut rx = TelemetryReceiver::bind(
            config,
            ShutdownSignal::new(),
            vec![Box::new(Arc::clone(&buffer)), counting_consumer(&count)],
        )
        .unwrap();
        rx.start().unwrap();

        // Cutting this at the buffer size would leave `p_pa=10`
        let padding = "a".repeat(limit - 27);
        let oversized = format!("x={},ms=1,t_x100=2000,p_pa=101325", padding);
        assert!(oversized.len() > limit);

        let tx = sender();
        tx.send_to(oversized.as_bytes(), rx.local_addr()).unwrap();
        tx.send_to(b"ms=2,t_x100=2100,p_pa=100900", rx.local_addr())
            .unwrap();
        assert!(wait_for(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));

        let stats = rx.stats();
        assert_eq!(stats.datagrams, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.samples, 1);
        assert_eq!(buffer.snapshot().pressure_hpa, vec![1009.0]);
        rx.close().unwrap();
    }

    #[test]
    fn test_datagram_filling_buffer_exactly_is_parsed() {
        let count = Arc::new(AtomicUsize::new(0));
        let config = ReceiverConfig {
            recv_buffer_size: 64,
            ..test_config()
        };
        let mut rx =
            TelemetryReceiver::bind(config, ShutdownSignal::new(), vec![counting_consumer(&count)])
                .unwrap();
        rx.start().unwrap();

        let base = "ms=1,t_x100=2000,p_pa=101325,x=";
        let packet = format!("{}{}", base, "b".repeat(64 - base.len()));
        assert_eq!(packet.len(), 64);
        sender().send_to(packet.as_bytes(), rx.local_addr()).unwrap();

        assert!(wait_for(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
        assert_eq!(rx.stats().rejected, 0);
        rx.close().unwrap();
    }

    #[test]
    fn test_close_times_out_on_stuck_consumer() {
        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let consumer = {
            let entered = Arc::clone(&entered);
            let finished = Arc::clone(&finished);
            from_fn(move |_| {
                entered.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(500));
                finished.store(true, Ordering::SeqCst);
            })
        };
        let config = ReceiverConfig {
            join_timeout: Duration::from_millis(100),
            ..test_config()
        };
        let mut rx =
            TelemetryReceiver::bind(config, ShutdownSignal::new(), vec![Box::new(consumer)])
                .unwrap();
        rx.start().unwrap();

        sender()
            .send_to(b"ms=1,t_x100=2000,p_pa=100000", rx.local_addr())
            .unwrap();
        assert!(wait_for(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));

        let started = Instant::now();
        let result = rx.close();
        let elapsed = started.elapsed();
        assert!(matches!(result, Err(ReceiverError::JoinTimeout(100))));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(400));
        assert_eq!(rx.state(), ReceiverState::Stopping);

        assert!(wait_for(Duration::from_secs(2), || finished.load(Ordering::SeqCst)));
        rx.close().unwrap();
        assert_eq!(rx.state(), ReceiverState::Stopped);
        assert!(matches!(rx.start(), Err(ReceiverError::Closed)));
    }

    #[test]
    fn test_end_to_end_ordering() {
        for capacity in [2000, 40] {
            let buffer = Arc::new(SampleBuffer::new(capacity));
            let mut rx = TelemetryReceiver::bind(
                test_config(),
                ShutdownSignal::new(),
                vec![Box::new(Arc::clone(&buffer))],
            )
            .unwrap();
            rx.start().unwrap();

            let tx = sender();
            for i in 0..100u64 {
                let packet = format!("ms={},t_x100={},p_pa={}", i * 100, 2000 + i, 100_000 + i);
                tx.send_to(packet.as_bytes(), rx.local_addr()).unwrap();
            }

            assert!(wait_for(Duration::from_secs(5), || rx.stats().samples == 100));
            rx.close().unwrap();

            let snap = buffer.snapshot();
            assert_eq!(snap.len(), 100.min(capacity));
            assert!(snap.elapsed_s.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(snap.latest().map(|p| p.0), Some(9.9));
        }
    }
}
