use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{error, info, warn};

use super::buzz_state::{Button, BuzzState};
use super::transport::{BuzzTransport, UsbTransport, LIGHT_PAYLOAD_LEN, PRODUCT_ID, VENDOR_ID};

/// A single button state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub controller: usize,
    pub button: Button,
    pub pressed: bool,
}

pub type EventCallback = Box<dyn FnMut(ButtonEvent) + Send + 'static>;

#[derive(Debug)]
pub enum BuzzError {
    DeviceNotFound,
    NoReadEndpoint,
    Usb(rusb::Error),
}

impl fmt::Display for BuzzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuzzError::DeviceNotFound => {
                write!(f, "no Buzz receiver ({VENDOR_ID:04x}:{PRODUCT_ID:04x}) on the bus")
            }
            BuzzError::NoReadEndpoint => {
                write!(f, "the claimed interface exposes no IN endpoint")
            }
            BuzzError::Usb(err) => write!(f, "usb error: {err}"),
        }
    }
}

impl std::error::Error for BuzzError {}

impl From<rusb::Error> for BuzzError {
    fn from(err: rusb::Error) -> Self {
        BuzzError::Usb(err)
    }
}

/// Clonable handle for the four controller lights.
///
/// The cached intensities sit behind a mutex, and the control transfer is
/// issued under the same lock, so the booth loop and the blink worker can
/// both drive the lights without interleaving commands.
#[derive(Clone)]
pub struct BuzzLights {
    transport: Arc<dyn BuzzTransport>,
    state: Arc<Mutex<[u8; 4]>>,
}

impl BuzzLights {
    fn new(transport: Arc<dyn BuzzTransport>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new([LIGHT_OFF; 4])),
        }
    }

    /// Set all four lights at once; bit *i* of `mask` lights controller *i*.
    pub fn set_all(&self, mask: u8) -> Result<(), BuzzError> {
        let mut state = self.lock();
        for (i, slot) in state.iter_mut().enumerate() {
            *slot = if mask & (1 << i) != 0 { LIGHT_ON } else { LIGHT_OFF };
        }
        self.flush(&state)
    }

    /// Switch a single controller's light without touching the others.
    /// Out-of-range indices are ignored.
    pub fn set_one(&self, controller: usize, on: bool) -> Result<(), BuzzError> {
        let mut state = self.lock();
        if let Some(slot) = state.get_mut(controller) {
            *slot = if on { LIGHT_ON } else { LIGHT_OFF };
        }
        self.flush(&state)
    }

    pub fn is_on(&self, controller: usize) -> bool {
        self.lock()
            .get(controller)
            .map(|&value| value == LIGHT_ON)
            .unwrap_or(false)
    }

    #[allow(dead_code)]
    pub fn snapshot(&self) -> [u8; 4] {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, [u8; 4]> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn flush(&self, state: &[u8; 4]) -> Result<(), BuzzError> {
        let payload: [u8; LIGHT_PAYLOAD_LEN] =
            [0x00, state[0], state[1], state[2], state[3], 0x00, 0x00];
        self.transport.control_write(&payload, LIGHT_TIMEOUT)?;
        Ok(())
    }
}

/// High-level interface to the wireless Buzz receiver.
///
/// Owns the stored button state and polls the report endpoint; the
/// registered callback is invoked synchronously for every button
/// transition observed.
pub struct BuzzController {
    transport: Arc<dyn BuzzTransport>,
    lights: BuzzLights,
    state: BuzzState,
    bits: u32,
    running: Arc<AtomicBool>,
    callback: Option<EventCallback>,
}

impl BuzzController {
    /// Connect to the first Buzz receiver discovered on the USB bus.
    pub fn connect() -> Result<Self, BuzzError> {
        Ok(Self::with_transport(Arc::new(UsbTransport::open()?)))
    }

    /// Build a controller over an already-open transport.
    pub fn with_transport(transport: Arc<dyn BuzzTransport>) -> Self {
        Self {
            lights: BuzzLights::new(Arc::clone(&transport)),
            transport,
            state: BuzzState::default(),
            bits: 0,
            running: Arc::new(AtomicBool::new(false)),
            callback: None,
        }
    }

    /// Install the callback notified about button state transitions.
    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(ButtonEvent) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Light-control handle, clonable across threads.
    pub fn lights(&self) -> BuzzLights {
        self.lights.clone()
    }

    #[allow(dead_code)]
    pub fn set_lights(&self, mask: u8) -> Result<(), BuzzError> {
        self.lights.set_all(mask)
    }

    #[allow(dead_code)]
    pub fn set_light(&self, controller: usize, on: bool) -> Result<(), BuzzError> {
        self.lights.set_one(controller, on)
    }

    #[allow(dead_code)]
    pub fn is_light_on(&self, controller: usize) -> bool {
        self.lights.is_on(controller)
    }

    /// Current button state of all four controllers.
    #[allow(dead_code)]
    pub fn buttons(&self) -> &BuzzState {
        &self.state
    }

    /// One blocking read of the report endpoint.
    ///
    /// A device timeout is a normal empty poll and returns `None`. Any
    /// other USB error is logged and also treated as an empty poll, and
    /// the caller is expected to keep polling.
    pub fn read(&mut self, timeout: Duration) -> Option<u32> {
        let report = self.read_report(timeout)?;
        Some(self.parse(&report))
    }

    /// Same read, but hands back the raw report bytes. The report is
    /// still parsed, so callbacks fire and stored state updates.
    #[allow(dead_code)]
    pub fn read_raw(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        let report = self.read_report(timeout)?;
        self.parse(&report);
        Some(report)
    }

    fn read_report(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; self.transport.max_packet_size()];
        match self.transport.read_report(&mut buf, timeout) {
            Ok(len) => {
                buf.truncate(len);
                Some(buf)
            }
            Err(rusb::Error::Timeout) => None,
            Err(err) => {
                error!("unexpected usb error while polling: {err}");
                None
            }
        }
    }

    /// Decode one report, firing the callback for every changed button.
    ///
    /// Returns the union of the previous and the current report bits, not
    /// a strict diff: a bit set in the previous report is still present in
    /// the return value even when the current report clears it.
    pub fn parse(&mut self, report: &[u8]) -> u32 {
        if report.len() < REPORT_MIN_LEN {
            warn!("short report ({} bytes), ignoring", report.len());
            return self.bits;
        }

        let next = BuzzState::from_report(report);
        for controller in 0..4 {
            let pad = next.pads[controller];
            self.sync_button(controller, Button::Red, pad.red);
            self.sync_button(controller, Button::Yellow, pad.yellow);
            self.sync_button(controller, Button::Green, pad.green);
            self.sync_button(controller, Button::Orange, pad.orange);
            self.sync_button(controller, Button::Blue, pad.blue);
        }

        let previous = self.bits;
        self.bits =
            u32::from(report[4]) << 16 | u32::from(report[3]) << 8 | u32::from(report[2]);
        previous | self.bits
    }

    fn sync_button(&mut self, controller: usize, button: Button, pressed: bool) {
        if self.state.pads[controller].get(button) == pressed {
            return;
        }
        self.state.pads[controller].set(button, pressed);
        if let Some(mut callback) = self.callback.take() {
            callback(ButtonEvent {
                controller,
                button,
                pressed,
            });
            self.callback = Some(callback);
        }
    }

    /// Poll the receiver until the running flag is cleared.
    ///
    /// Meant for a dedicated thread; cancellation is cooperative and takes
    /// at most one read timeout to be observed.
    pub fn run_loop(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        info!("buzz poll loop running");
        while self.running.load(Ordering::SeqCst) {
            self.read(READ_TIMEOUT);
        }
        info!("buzz poll loop stopped");
    }

    /// Flag observed by [`run_loop`](Self::run_loop); clearing it stops
    /// the loop within one read timeout.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const LIGHT_TIMEOUT: Duration = Duration::from_millis(100);
const REPORT_MIN_LEN: usize = 5;
pub const LIGHT_ON: u8 = 0xFF;
pub const LIGHT_OFF: u8 = 0x00;

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::super::transport::mock::MockTransport;
    use super::*;

    fn report(byte2: u8, byte3: u8, byte4: u8) -> [u8; 5] {
        [0, 0, byte2, byte3, byte4]
    }

    fn controller(transport: &Arc<MockTransport>) -> BuzzController {
        BuzzController::with_transport(Arc::clone(transport) as Arc<dyn BuzzTransport>)
    }

    #[test]
    fn every_button_fires_one_event_per_toggle() {
        // (controller, button, report byte 2..4, bit mask)
        let layout: [(usize, Button, usize, u8); 20] = [
            (0, Button::Red, 0, 0x01),
            (0, Button::Yellow, 0, 0x02),
            (0, Button::Green, 0, 0x04),
            (0, Button::Orange, 0, 0x08),
            (0, Button::Blue, 0, 0x10),
            (1, Button::Red, 0, 0x20),
            (1, Button::Yellow, 0, 0x40),
            (1, Button::Green, 0, 0x80),
            (1, Button::Orange, 1, 0x01),
            (1, Button::Blue, 1, 0x02),
            (2, Button::Red, 1, 0x04),
            (2, Button::Yellow, 1, 0x08),
            (2, Button::Green, 1, 0x10),
            (2, Button::Orange, 1, 0x20),
            (2, Button::Blue, 1, 0x40),
            (3, Button::Red, 1, 0x80),
            (3, Button::Yellow, 2, 0x01),
            (3, Button::Green, 2, 0x02),
            (3, Button::Orange, 2, 0x04),
            (3, Button::Blue, 2, 0x08),
        ];

        for &(pad, button, byte, mask) in &layout {
            let transport = Arc::new(MockTransport::new());
            let mut controller = controller(&transport);

            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            controller.set_event_callback(move |event| sink.lock().unwrap().push(event));

            let mut bytes = [0u8; 3];
            bytes[byte] = mask;
            controller.parse(&report(bytes[0], bytes[1], bytes[2]));
            controller.parse(&report(0, 0, 0));

            let events = events.lock().unwrap();
            assert_eq!(
                *events,
                vec![
                    ButtonEvent {
                        controller: pad,
                        button,
                        pressed: true,
                    },
                    ButtonEvent {
                        controller: pad,
                        button,
                        pressed: false,
                    },
                ],
                "byte {byte} mask {mask:#04x}"
            );
        }
    }

    #[test]
    fn unchanged_report_fires_no_events() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        controller.set_event_callback(move |event| sink.lock().unwrap().push(event));

        controller.parse(&report(0x01, 0, 0));
        controller.parse(&report(0x01, 0, 0));

        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn set_lights_mask_drives_first_two_controllers() {
        let transport = Arc::new(MockTransport::new());
        let controller = controller(&transport);

        controller.set_lights(3).unwrap();

        assert!(controller.is_light_on(0));
        assert!(controller.is_light_on(1));
        assert!(!controller.is_light_on(2));
        assert!(!controller.is_light_on(3));
        assert_eq!(
            transport.last_write(),
            Some([0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00])
        );
    }

    #[test]
    fn single_light_update_preserves_the_others() {
        let transport = Arc::new(MockTransport::new());
        let controller = controller(&transport);

        controller.set_lights(3).unwrap();
        controller.set_light(3, true).unwrap();

        assert_eq!(controller.lights().snapshot(), [0xFF, 0xFF, 0x00, 0xFF]);
        assert_eq!(
            transport.last_write(),
            Some([0x00, 0xFF, 0xFF, 0x00, 0xFF, 0x00, 0x00])
        );

        // out-of-range index is ignored but still flushes the cached state
        controller.set_light(7, true).unwrap();
        assert_eq!(controller.lights().snapshot(), [0xFF, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn parse_returns_union_of_last_two_reports() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);

        assert_eq!(controller.parse(&report(0x01, 0, 0)), 0x01);
        // the red bit is gone from the report but survives in the mask
        assert_eq!(controller.parse(&report(0, 0, 0)), 0x01);
        assert_eq!(controller.parse(&report(0, 0, 0)), 0);
    }

    #[test]
    fn parse_concatenates_bytes_big_endian() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);

        assert_eq!(controller.parse(&report(0x01, 0x02, 0x04)), 0x040201);
    }

    #[test]
    fn short_report_leaves_state_untouched() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);

        controller.parse(&report(0x01, 0, 0));
        assert_eq!(controller.parse(&[0x00, 0x00]), 0x01);
        assert!(controller.buttons().pressed(0, Button::Red));
    }

    #[test]
    fn read_treats_timeout_and_errors_as_empty_polls() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);

        transport.queue_error(rusb::Error::Timeout);
        assert_eq!(controller.read(Duration::from_millis(10)), None);

        transport.queue_error(rusb::Error::Pipe);
        assert_eq!(controller.read(Duration::from_millis(10)), None);

        transport.queue_report(&report(0x01, 0, 0));
        assert_eq!(controller.read(Duration::from_millis(10)), Some(0x01));
    }

    #[test]
    fn missing_device_error_names_the_receiver() {
        assert!(BuzzError::DeviceNotFound.to_string().contains("054c:1000"));
    }

    #[test]
    fn clearing_the_flag_stops_the_loop() {
        let transport = Arc::new(MockTransport::new());
        let mut controller = controller(&transport);
        let flag = controller.stop_flag();

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            controller.run_loop();
            let _ = tx.send(());
        });

        let deadline = Instant::now() + Duration::from_secs(1);
        while !flag.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "loop never started");
            thread::sleep(Duration::from_millis(1));
        }

        flag.store(false, Ordering::SeqCst);
        rx.recv_timeout(Duration::from_millis(600))
            .expect("poll loop did not stop within one read timeout");
        worker.join().unwrap();
    }
}
