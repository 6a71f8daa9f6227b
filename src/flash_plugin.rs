use rppal::gpio::{Gpio, OutputPin};
use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::{debug, info, warn};

use crate::booth::{BoothApp, BoothError, BoothPlugin, BoothState};
use crate::config::BoothConfig;

/// Pulses the flash LED while the booth is capturing.
///
/// Hardware errors propagate to the host; a miswired pin is a setup
/// problem, not something to recover from at runtime.
pub struct FlashPlugin {
    _flash_led: Option<OutputPin>,
    pwm: Option<Pwm>,
}

impl FlashPlugin {
    pub fn new() -> Self {
        Self {
            _flash_led: None,
            pwm: None,
        }
    }
}

impl BoothPlugin for FlashPlugin {
    fn name(&self) -> &'static str {
        "flash"
    }

    fn configure(&mut self, cfg: &mut BoothConfig) {
        let snapped = snap_brightness(cfg.flash_brightness);
        if snapped != cfg.flash_brightness {
            warn!(
                "flash_brightness {} out of grid, adjusted to {}",
                cfg.flash_brightness, snapped
            );
            cfg.flash_brightness = snapped;
        }
    }

    fn startup(&mut self, _cfg: &BoothConfig, _app: &mut BoothApp) -> Result<(), BoothError> {
        info!("initializing flash");
        let gpio = Gpio::new()?;
        let mut led = gpio.get(FLASH_LED_PIN)?.into_output();
        led.set_pwm_frequency(FLASH_FREQUENCY_HZ, 0.0)?;
        self._flash_led = Some(led);
        self.pwm = Some(Pwm::with_frequency(
            FLASH_PWM_CHANNEL,
            FLASH_FREQUENCY_HZ,
            0.0,
            Polarity::Normal,
            false,
        )?);
        Ok(())
    }

    fn state_enter(
        &mut self,
        state: BoothState,
        cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        if state != BoothState::Capture {
            return Ok(());
        }
        if let Some(pwm) = &self.pwm {
            info!("starting capture");
            debug!("flashing with {} intensity", cfg.flash_brightness);
            pwm.set_frequency(FLASH_FREQUENCY_HZ, brightness_duty(cfg.flash_brightness))?;
            pwm.enable()?;
        }
        Ok(())
    }

    fn state_exit(
        &mut self,
        state: BoothState,
        _cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        if state != BoothState::Capture {
            return Ok(());
        }
        if let Some(pwm) = &self.pwm {
            pwm.disable()?;
        }
        Ok(())
    }
}

/// Duty cycle for a brightness percentage.
fn brightness_duty(brightness: u8) -> f64 {
    f64::from(brightness.min(100)) / 100.0
}

/// Clamp into 0-100 and snap down onto the 5% grid.
fn snap_brightness(value: u8) -> u8 {
    let clamped = value.min(100);
    clamped - clamped % BRIGHTNESS_STEP
}

const FLASH_LED_PIN: u8 = 12;
// hardware PWM 0 sits on GPIO 18
const FLASH_PWM_CHANNEL: Channel = Channel::Pwm0;
const FLASH_FREQUENCY_HZ: f64 = 200.0;
const BRIGHTNESS_STEP: u8 = 5;

#[cfg(test)]
mod tests {
    use super::{brightness_duty, snap_brightness, FlashPlugin};
    use crate::booth::BoothPlugin;
    use crate::config::BoothConfig;

    #[test]
    fn brightness_maps_to_duty_cycle() {
        assert_eq!(brightness_duty(0), 0.0);
        assert_eq!(brightness_duty(50), 0.5);
        assert_eq!(brightness_duty(100), 1.0);
        assert_eq!(brightness_duty(250), 1.0);
    }

    #[test]
    fn brightness_snaps_onto_the_five_percent_grid() {
        assert_eq!(snap_brightness(100), 100);
        assert_eq!(snap_brightness(95), 95);
        assert_eq!(snap_brightness(97), 95);
        assert_eq!(snap_brightness(3), 0);
        assert_eq!(snap_brightness(130), 100);
    }

    #[test]
    fn configure_rewrites_out_of_grid_values() {
        let mut plugin = FlashPlugin::new();
        let mut cfg = BoothConfig {
            flash_brightness: 42,
            ..BoothConfig::default()
        };

        plugin.configure(&mut cfg);
        assert_eq!(cfg.flash_brightness, 40);

        plugin.configure(&mut cfg);
        assert_eq!(cfg.flash_brightness, 40);
    }
}
