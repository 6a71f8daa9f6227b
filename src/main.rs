mod booth;
mod buzz_controller;
mod buzz_plugin;
mod config;
mod flash_plugin;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use booth::{BoothApp, BoothError, BoothState, PluginManager, StateMachine};
use buzz_plugin::BuzzPlugin;
use config::BoothConfig;
use flash_plugin::FlashPlugin;

const DEFAULT_CONFIG: &str = "booth.yml";
const TICK_SLEEP: Duration = Duration::from_millis(10);
const CHOOSE_DWELL: Duration = Duration::from_secs(1);
const CAPTURE_HOLD: Duration = Duration::from_secs(1);

fn main() -> Result<(), BoothError> {
    tracing_subscriber::fmt().init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut cfg = BoothConfig::load(&config_path)?;

    let mut plugins = PluginManager::new();
    plugins.register(Box::new(BuzzPlugin::new()?));
    plugins.register(Box::new(FlashPlugin::new()));
    plugins.configure(&mut cfg);

    let mut app = BoothApp::new(cfg.capture_choices.clone());
    plugins.startup(&cfg, &mut app)?;

    let mut machine = StateMachine::new();
    machine.start(&mut plugins, &cfg, &mut app)?;

    let result = run_booth(&mut machine, &mut plugins, &cfg, &mut app);
    plugins.cleanup(&mut app);
    result
}

/// Drive the booth until a hook fails.
///
/// The wait state is left through the buzz plugin's choose request; the
/// remaining phases advance on fixed dwells, cycling preview and capture
/// until the session's shots are taken.
fn run_booth(
    machine: &mut StateMachine,
    plugins: &mut PluginManager,
    cfg: &BoothConfig,
    app: &mut BoothApp,
) -> Result<(), BoothError> {
    let mut entered = Instant::now();
    let mut shots_taken: u8 = 0;

    loop {
        let before = machine.state();
        machine.tick(plugins, cfg, app)?;
        if machine.state() != before {
            entered = Instant::now();
            continue;
        }

        match machine.state() {
            BoothState::Wait => {}
            BoothState::Choose => {
                if entered.elapsed() >= CHOOSE_DWELL {
                    shots_taken = 0;
                    machine.set_state(BoothState::Preview, plugins, cfg, app)?;
                    entered = Instant::now();
                }
            }
            BoothState::Preview => {
                if entered.elapsed().as_secs_f32() >= cfg.preview_delay {
                    machine.set_state(BoothState::Capture, plugins, cfg, app)?;
                    entered = Instant::now();
                }
            }
            BoothState::Capture => {
                if entered.elapsed() >= CAPTURE_HOLD {
                    shots_taken += 1;
                    info!("capture {} of {} taken", shots_taken, app.capture_nbr);
                    let next = if shots_taken < app.capture_nbr {
                        BoothState::Preview
                    } else {
                        BoothState::Wait
                    };
                    machine.set_state(next, plugins, cfg, app)?;
                    entered = Instant::now();
                }
            }
        }

        thread::sleep(TICK_SLEEP);
    }
}
