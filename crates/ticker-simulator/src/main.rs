//! Desktop simulator for the ticker-rs LED matrix and provisioning flow.
//!
//! Emulates the 128x8 MAX7219 chain in an SDL2 window via
//! `embedded-graphics-simulator` and replaces the radio with a scripted
//! network manager, so the whole provisioning state machine can be driven
//! from the keyboard.
//!
//! # Usage
//!
//! `ticker-simulator [saved|portal]` (default `portal`)
//!
//! - `saved`: the saved network joins after two seconds.
//! - `portal`: no saved network; the configuration portal opens at once.
//!
//! # Key bindings
//!
//! | Key | Action                                   |
//! |-----|------------------------------------------|
//! | S   | Submit sample values through the portal  |
//! | T   | Expire the portal immediately            |
//! | W   | Wipe saved settings (failure loop only)  |
//! | Q   | Quit                                     |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embassy_futures::block_on;
use embedded_graphics::pixelcolor::{BinaryColor, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    BinaryColorTheme, OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window,
    sdl2::Keycode,
};
use log::{info, warn};

use ticker_core::config::{ConfigParameters, FieldId, copy_bounded};
use ticker_core::display::{MatrixPanel, MatrixScroller, MatrixSettings, StatusDisplay};
use ticker_core::network::{ConnectOptions, NetworkInfo, NetworkManager, PollStatus, PortalField};
use ticker_core::provisioning::{FailureLoop, Outcome, ProvisioningCoordinator, ProvisioningSettings};
use ticker_core::signals::ProvisioningSignals;
use ticker_core::storage::{ConfigStore, MemoryKvStore};
use ticker_core::time::{Clock, PortalDeadline};

// ---------------------------------------------------------------------------
// Display constants
// ---------------------------------------------------------------------------

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 6;

/// How long the scripted radio takes to join a network.
const JOIN_DELAY_MS: u64 = 2_000;

/// Idle time per control cycle, standing in for radio latency.
const CYCLE_SLEEP: Duration = Duration::from_millis(1);

const SAMPLE_KEY: &str = "sim-demo-key-0123";
const SAMPLE_SYMBOLS: &str = "AAPL,AMZN,MSFT,NVDA";

// ---------------------------------------------------------------------------
// Keyboard plumbing
// ---------------------------------------------------------------------------

/// Keys seen by the window, waiting to be consumed by the scripted parts.
#[derive(Default)]
struct Controls {
    pending: VecDeque<Keycode>,
}

impl Controls {
    /// Remove the first pending press of `key`, if any.
    fn take(&mut self, key: Keycode) -> bool {
        match self.pending.iter().position(|pending| *pending == key) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }
}

type SharedControls = Rc<RefCell<Controls>>;

// ---------------------------------------------------------------------------
// Simulated LED matrix
// ---------------------------------------------------------------------------

/// A [`MatrixPanel`] drawn into an SDL window; window events are pumped on
/// every flush.
struct SimulatorPanel {
    display: SimulatorDisplay<BinaryColor>,
    window: Window,
    controls: SharedControls,
}

impl SimulatorPanel {
    fn new(matrix: &MatrixSettings, controls: SharedControls) -> Self {
        let display = SimulatorDisplay::new(Size::new(matrix.modules as u32 * 8, 8));
        let output_settings = OutputSettingsBuilder::new()
            .scale(WINDOW_SCALE)
            .pixel_spacing(1)
            .theme(BinaryColorTheme::Custom {
                color_off: Rgb888::new(24, 4, 4),
                color_on: Rgb888::new(255, 48, 24),
            })
            .build();
        let mut window = Window::new("Ticker Simulator", &output_settings);

        // The SDL window is lazily initialized on the first `update()` call.
        // We must call `update()` once before `events()` or it will panic.
        window.update(&display);

        Self {
            display,
            window,
            controls,
        }
    }

    fn pump_events(&mut self) {
        for event in self.window.events() {
            match event {
                SimulatorEvent::Quit => quit(),
                SimulatorEvent::KeyDown { keycode, .. } => {
                    if keycode == Keycode::Q || keycode == Keycode::Escape {
                        quit();
                    }
                    self.controls.borrow_mut().pending.push_back(keycode);
                }
                _ => {}
            }
        }
    }
}

fn quit() -> ! {
    info!("Simulator exiting");
    std::process::exit(0)
}

impl OriginDimensions for SimulatorPanel {
    fn size(&self) -> Size {
        self.display.size()
    }
}

impl DrawTarget for SimulatorPanel {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.display.draw_iter(pixels)
    }
}

impl MatrixPanel for SimulatorPanel {
    fn flush(&mut self) -> Result<(), Self::Error> {
        self.window.update(&self.display);
        self.pump_events();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct StdClock {
    start: Instant,
}

impl StdClock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Scripted network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    /// Saved credentials work.
    Saved,
    /// No saved network; everything goes through the portal.
    Portal,
}

impl Scenario {
    fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some("saved") => Self::Saved,
            Some("portal") | None => Self::Portal,
            Some(other) => {
                warn!("Unknown scenario {:?}; using \"portal\"", other);
                Self::Portal
            }
        }
    }
}

/// Stand-in for the radio: joins on a timer and reads portal actions from
/// the keyboard.
struct ScriptedNetwork {
    scenario: Scenario,
    clock: StdClock,
    controls: SharedControls,
    fields: Vec<PortalField>,
    deadline: PortalDeadline,
    join_at_ms: Option<u64>,
    portal_open: bool,
    connected: bool,
}

impl ScriptedNetwork {
    fn new(scenario: Scenario, clock: StdClock, controls: SharedControls) -> Self {
        Self {
            scenario,
            clock,
            controls,
            fields: Vec::new(),
            deadline: PortalDeadline::from_secs(0),
            join_at_ms: None,
            portal_open: false,
            connected: false,
        }
    }

    fn submit_sample(&mut self, signals: &ProvisioningSignals) {
        info!("Portal: submitting sample settings");
        for field in &mut self.fields {
            let value = match field.id {
                FieldId::CredentialKey => SAMPLE_KEY,
                FieldId::SymbolList => SAMPLE_SYMBOLS,
            };
            copy_bounded(&mut field.value, value);
        }
        signals.config_submitted.raise();
        self.join_at_ms = Some(self.clock.now_ms() + JOIN_DELAY_MS);
    }
}

impl NetworkManager for ScriptedNetwork {
    fn add_field(&mut self, field: PortalField) {
        self.fields.push(field);
    }

    fn begin(&mut self, options: &ConnectOptions<'_>, signals: &ProvisioningSignals) -> PollStatus {
        self.deadline = PortalDeadline::from_secs(options.portal_timeout_secs);
        match self.scenario {
            Scenario::Saved => {
                info!("Joining saved network");
                self.join_at_ms = Some(self.clock.now_ms() + JOIN_DELAY_MS);
            }
            Scenario::Portal => {
                info!(
                    "Portal \"{}\" open at {} (press S to submit, T to time out)",
                    options.portal_ssid, options.portal_address
                );
                self.deadline.arm(self.clock.now_ms());
                self.portal_open = true;
                signals.portal_started.raise();
            }
        }
        PollStatus::Pending
    }

    fn poll(&mut self, signals: &ProvisioningSignals) -> PollStatus {
        std::thread::sleep(CYCLE_SLEEP);
        let now = self.clock.now_ms();

        if self.connected {
            return PollStatus::Connected;
        }
        if let Some(at) = self.join_at_ms
            && now >= at
        {
            self.connected = true;
            self.portal_open = false;
            return PollStatus::Connected;
        }

        if self.portal_open {
            let (submit, expire) = {
                let mut controls = self.controls.borrow_mut();
                (controls.take(Keycode::S), controls.take(Keycode::T))
            };
            if submit && self.join_at_ms.is_none() {
                self.submit_sample(signals);
            }
            if expire || (self.join_at_ms.is_none() && self.deadline.expired(now)) {
                self.portal_open = false;
                signals.portal_timed_out.raise();
            }
        }

        PollStatus::Pending
    }

    fn field_value(&self, id: FieldId) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.id == id)
            .map(|field| field.value.as_str())
    }

    fn network_info(&self) -> Option<NetworkInfo> {
        self.connected.then(|| {
            NetworkInfo::new("simulated-lan")
                .with_rssi(-48)
                .with_address([192, 168, 1, 77])
        })
    }

    fn erase_credentials(&mut self) {
        info!("Scripted network: saved credentials erased");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let arg = std::env::args().nth(1);
    let scenario = Scenario::from_arg(arg.as_deref());
    let settings = ProvisioningSettings::default();
    let matrix = MatrixSettings::default();

    info!("Starting ticker-rs simulator, scenario {:?}", scenario);
    info!(
        "Matrix: {} modules ({}x8, scale {}x)",
        matrix.modules,
        matrix.modules * 8,
        WINDOW_SCALE
    );
    info!("Keys: S=Submit  T=Timeout  W=Wipe  Q=Quit");

    let controls = SharedControls::default();
    let clock = StdClock::new();

    let mut store = ConfigStore::new(MemoryKvStore::new());
    if scenario == Scenario::Saved {
        store.save(&ConfigParameters::new("saved-key-9876", "GOOG,TSLA"));
    }

    let panel = SimulatorPanel::new(&matrix, controls.clone());
    let display = StatusDisplay::new(MatrixScroller::new(panel, clock));
    let network = ScriptedNetwork::new(scenario, clock, controls.clone());

    let mut coordinator =
        ProvisioningCoordinator::new(network, store, display, settings);

    match block_on(coordinator.run()) {
        Outcome::Connected => {
            let message = coordinator.connected_message();
            let (_network, _store, mut display, _config) = coordinator.into_parts();
            info!("Holding: {}", message);
            loop {
                display.cycle(&message);
                std::thread::sleep(CYCLE_SLEEP);
            }
        }
        Outcome::Failed => {
            info!("Provisioning failed; press W to wipe saved settings, Q to quit");
            let (network, store, display, _) = coordinator.into_parts();
            let mut failure = FailureLoop::new(network, store, display, &settings);
            block_on(failure.run(|| {
                std::thread::sleep(CYCLE_SLEEP);
                controls.borrow_mut().take(Keycode::W)
            }))
        }
    }
}
