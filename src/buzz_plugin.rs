use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::booth::{BoothApp, BoothError, BoothPlugin, BoothState};
use crate::buzz_controller::{Button, BuzzController, BuzzLights};
use crate::config::BoothConfig;

/// Bridges Buzz button events into booth state transitions and drives the
/// idle light animations.
///
/// The event callback runs on the poll thread, so it only records the
/// chosen capture mode in an atomic cell; the wait-state tick running on
/// the booth loop picks the request up and performs the transition.
pub struct BuzzPlugin {
    controller: Option<BuzzController>,
    lights: BuzzLights,
    running: Arc<AtomicBool>,
    poll_thread: Option<thread::JoinHandle<()>>,
    capture_mode: Arc<AtomicI8>,
    blinking: Arc<AtomicBool>,
    blink_thread: Option<thread::JoinHandle<()>>,
}

impl BuzzPlugin {
    /// Connect to the receiver. Fails when no Buzz receiver is attached.
    pub fn new() -> Result<Self, BoothError> {
        Ok(Self::from_controller(BuzzController::connect()?))
    }

    pub(crate) fn from_controller(controller: BuzzController) -> Self {
        Self {
            lights: controller.lights(),
            running: controller.stop_flag(),
            controller: Some(controller),
            poll_thread: None,
            capture_mode: Arc::new(AtomicI8::new(NO_CAPTURE_MODE)),
            blinking: Arc::new(AtomicBool::new(false)),
            blink_thread: None,
        }
    }

    fn stop_blink(&mut self) {
        self.blinking.store(false, Ordering::SeqCst);
        if let Some(worker) = self.blink_thread.take() {
            let _ = worker.join();
        }
    }
}

impl BoothPlugin for BuzzPlugin {
    fn name(&self) -> &'static str {
        "buzz"
    }

    fn startup(&mut self, _cfg: &BoothConfig, _app: &mut BoothApp) -> Result<(), BoothError> {
        info!("buzz starting");
        let mut controller = match self.controller.take() {
            Some(controller) => controller,
            None => return Ok(()),
        };

        let capture_mode = Arc::clone(&self.capture_mode);
        controller.set_event_callback(move |event| {
            if event.pressed {
                info!(
                    "contr #{} - {} button pressed",
                    event.controller, event.button
                );
            } else {
                info!(
                    "contr #{} - {} button released",
                    event.controller, event.button
                );
            }

            if event.button == Button::Red && event.pressed {
                match event.controller {
                    0 => capture_mode.store(0, Ordering::SeqCst),
                    1 => capture_mode.store(1, Ordering::SeqCst),
                    _ => {}
                }
            }
        });

        let worker = thread::Builder::new()
            .name(POLL_THREAD.into())
            .spawn(move || controller.run_loop())
            .map_err(|err| BoothError::Thread(err.to_string()))?;
        self.poll_thread = Some(worker);
        Ok(())
    }

    fn cleanup(&mut self, _app: &mut BoothApp) {
        info!("buzz cleaning");
        self.stop_blink();
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.poll_thread.take() {
            let _ = worker.join();
        }
    }

    fn state_enter(
        &mut self,
        state: BoothState,
        _cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        match state {
            BoothState::Wait => {
                self.capture_mode.store(NO_CAPTURE_MODE, Ordering::SeqCst);
                self.lights.set_all(WAIT_LIGHT_MASK)?;
            }
            BoothState::Preview => {
                self.blinking.store(true, Ordering::SeqCst);
                let lights = self.lights.clone();
                let blinking = Arc::clone(&self.blinking);
                let worker = thread::Builder::new()
                    .name(BLINK_THREAD.into())
                    .spawn(move || blink_slow(&lights, &blinking))
                    .map_err(|err| BoothError::Thread(err.to_string()))?;
                self.blink_thread = Some(worker);
            }
            _ => {}
        }
        Ok(())
    }

    fn state_do(
        &mut self,
        state: BoothState,
        _cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        if state != BoothState::Wait {
            return Ok(());
        }

        let mode = self.capture_mode.load(Ordering::SeqCst);
        if mode < 0 {
            return Ok(());
        }
        self.capture_mode.store(NO_CAPTURE_MODE, Ordering::SeqCst);

        match app.capture_choices.get(mode as usize) {
            Some(&count) => {
                app.set_state(BoothState::Choose);
                app.capture_nbr = count;
            }
            None => warn!("capture mode {mode} has no configured capture choice"),
        }
        Ok(())
    }

    fn state_exit(
        &mut self,
        state: BoothState,
        _cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        match state {
            BoothState::Wait => self.lights.set_all(0)?,
            BoothState::Preview => self.stop_blink(),
            _ => {}
        }
        Ok(())
    }
}

/// Toggle all lights between on and off until the flag is cleared. A USB
/// failure ends the worker; the next preview spawns a fresh one.
fn blink_slow(lights: &BuzzLights, blinking: &AtomicBool) {
    let mut on = true;
    while blinking.load(Ordering::SeqCst) {
        let result = if on {
            lights.set_all(WAIT_LIGHT_MASK)
        } else {
            lights.set_all(0)
        };
        if let Err(err) = result {
            error!("blink worker: {err}");
            break;
        }
        on = !on;
        thread::sleep(BLINK_PERIOD);
    }
}

const POLL_THREAD: &str = "buzz-poll";
const BLINK_THREAD: &str = "buzz-blink";
const BLINK_PERIOD: Duration = Duration::from_millis(500);
const NO_CAPTURE_MODE: i8 = -1;
// lights for controllers 0 and 1, the two that select a capture mode
const WAIT_LIGHT_MASK: u8 = 3;
