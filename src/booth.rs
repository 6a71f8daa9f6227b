use std::fmt;

use tracing::info;

use crate::buzz_controller::BuzzError;
use crate::config::{BoothConfig, ConfigError};

/// The booth phases the plugins hook into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothState {
    Wait,
    Choose,
    Preview,
    Capture,
}

impl BoothState {
    pub fn name(self) -> &'static str {
        match self {
            BoothState::Wait => "wait",
            BoothState::Choose => "choose",
            BoothState::Preview => "preview",
            BoothState::Capture => "capture",
        }
    }
}

impl fmt::Display for BoothState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared application context handed to every hook.
pub struct BoothApp {
    /// Number of captures the running session will take.
    pub capture_nbr: u8,
    /// Capture counts selectable by capture mode.
    pub capture_choices: Vec<u8>,
    pending_state: Option<BoothState>,
}

impl BoothApp {
    pub fn new(capture_choices: Vec<u8>) -> Self {
        let capture_nbr = capture_choices.first().copied().unwrap_or(1);
        Self {
            capture_nbr,
            capture_choices,
            pending_state: None,
        }
    }

    /// Request a state change; the machine applies it once the current
    /// hook dispatch is over.
    pub fn set_state(&mut self, state: BoothState) {
        self.pending_state = Some(state);
    }

    pub(crate) fn take_pending_state(&mut self) -> Option<BoothState> {
        self.pending_state.take()
    }
}

#[derive(Debug)]
pub enum BoothError {
    Buzz(BuzzError),
    Gpio(rppal::gpio::Error),
    Pwm(rppal::pwm::Error),
    Config(ConfigError),
    Thread(String),
}

impl fmt::Display for BoothError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoothError::Buzz(err) => write!(f, "buzz controller: {err}"),
            BoothError::Gpio(err) => write!(f, "gpio: {err}"),
            BoothError::Pwm(err) => write!(f, "pwm: {err}"),
            BoothError::Config(err) => write!(f, "configuration: {err}"),
            BoothError::Thread(err) => write!(f, "worker thread: {err}"),
        }
    }
}

impl std::error::Error for BoothError {}

impl From<BuzzError> for BoothError {
    fn from(err: BuzzError) -> Self {
        BoothError::Buzz(err)
    }
}

impl From<rppal::gpio::Error> for BoothError {
    fn from(err: rppal::gpio::Error) -> Self {
        BoothError::Gpio(err)
    }
}

impl From<rppal::pwm::Error> for BoothError {
    fn from(err: rppal::pwm::Error) -> Self {
        BoothError::Pwm(err)
    }
}

impl From<ConfigError> for BoothError {
    fn from(err: ConfigError) -> Self {
        BoothError::Config(err)
    }
}

/// Hook surface a booth plugin implements.
///
/// All hooks have no-op defaults; a plugin overrides the phases it cares
/// about. Startup and the per-state hooks can fail, and a failure stops
/// the booth.
pub trait BoothPlugin {
    fn name(&self) -> &'static str;

    /// Validate and adjust the configuration before startup.
    fn configure(&mut self, _cfg: &mut BoothConfig) {}

    fn startup(&mut self, _cfg: &BoothConfig, _app: &mut BoothApp) -> Result<(), BoothError> {
        Ok(())
    }

    fn cleanup(&mut self, _app: &mut BoothApp) {}

    fn state_enter(
        &mut self,
        _state: BoothState,
        _cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        Ok(())
    }

    /// Called on every machine tick while the state is active.
    fn state_do(
        &mut self,
        _state: BoothState,
        _cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        Ok(())
    }

    fn state_exit(
        &mut self,
        _state: BoothState,
        _cfg: &BoothConfig,
        _app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        Ok(())
    }
}

/// Registered plugins, dispatched in registration order.
pub struct PluginManager {
    plugins: Vec<Box<dyn BoothPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn BoothPlugin>) {
        info!("registered plugin {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn configure(&mut self, cfg: &mut BoothConfig) {
        for plugin in &mut self.plugins {
            plugin.configure(cfg);
        }
    }

    pub fn startup(&mut self, cfg: &BoothConfig, app: &mut BoothApp) -> Result<(), BoothError> {
        for plugin in &mut self.plugins {
            plugin.startup(cfg, app)?;
        }
        Ok(())
    }

    pub fn cleanup(&mut self, app: &mut BoothApp) {
        for plugin in &mut self.plugins {
            plugin.cleanup(app);
        }
    }

    pub fn state_enter(
        &mut self,
        state: BoothState,
        cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        for plugin in &mut self.plugins {
            plugin.state_enter(state, cfg, app)?;
        }
        Ok(())
    }

    pub fn state_do(
        &mut self,
        state: BoothState,
        cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        for plugin in &mut self.plugins {
            plugin.state_do(state, cfg, app)?;
        }
        Ok(())
    }

    pub fn state_exit(
        &mut self,
        state: BoothState,
        cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        for plugin in &mut self.plugins {
            plugin.state_exit(state, cfg, app)?;
        }
        Ok(())
    }
}

/// The booth's finite state machine.
///
/// Plugins never switch states directly; they record a request on the app
/// context and the machine applies it between hook dispatches.
pub struct StateMachine {
    state: BoothState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: BoothState::Wait,
        }
    }

    pub fn state(&self) -> BoothState {
        self.state
    }

    /// Run the enter hooks for the initial state.
    pub fn start(
        &mut self,
        plugins: &mut PluginManager,
        cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        info!("booth entering {}", self.state);
        plugins.state_enter(self.state, cfg, app)
    }

    /// Run the current state's do hooks, then apply a pending transition.
    pub fn tick(
        &mut self,
        plugins: &mut PluginManager,
        cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        plugins.state_do(self.state, cfg, app)?;
        if let Some(next) = app.take_pending_state() {
            self.set_state(next, plugins, cfg, app)?;
        }
        Ok(())
    }

    /// Leave the current state and enter `next`: exit hooks first, then
    /// the switch, then enter hooks.
    pub fn set_state(
        &mut self,
        next: BoothState,
        plugins: &mut PluginManager,
        cfg: &BoothConfig,
        app: &mut BoothApp,
    ) -> Result<(), BoothError> {
        plugins.state_exit(self.state, cfg, app)?;
        info!("booth state {} -> {}", self.state, next);
        self.state = next;
        plugins.state_enter(self.state, cfg, app)
    }
}
