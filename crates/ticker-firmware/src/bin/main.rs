#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_storage::ReadStorage;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;
use log::info;
use static_cell::StaticCell;

use ticker_core::display::{Max7219Chain, MatrixScroller, StatusDisplay};
use ticker_core::provisioning::{FailureLoop, Outcome, ProvisioningCoordinator};
use ticker_core::storage::{ConfigStore, FlashKvStore};
use ticker_firmware::clock::EmbassyClock;
use ticker_firmware::settings::{self, STORE_SECTOR_SIZE};
use ticker_firmware::wifi;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

type SettingsStore = FlashKvStore<FlashStorage<'static>>;

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Onboard RGB LED data line, held low so it stays dark.
    let _led = Output::new(peripherals.GPIO48, Level::Low, OutputConfig::default());

    // ------------------------------------------------------------------
    // LED matrix: FC16 MAX7219 chain on SPI2 (CLK 11, DIN 13, CS 12)
    // ------------------------------------------------------------------
    let matrix = settings::matrix();
    let spi_bus = Spi::new(
        peripherals.SPI2,
        Config::default()
            .with_frequency(Rate::from_mhz(1))
            .with_mode(Mode::_0),
    )
    .expect("Failed to configure SPI2")
    .with_sck(peripherals.GPIO11)
    .with_mosi(peripherals.GPIO13);
    let cs = Output::new(peripherals.GPIO12, Level::High, OutputConfig::default());
    let spi_device = ExclusiveDevice::new_no_delay(spi_bus, cs).expect("Failed to create SPI device");

    let mut panel = Max7219Chain::new(spi_device, matrix.modules);
    panel
        .init(matrix.intensity)
        .expect("Failed to initialize LED matrix");
    let display = StatusDisplay::new(MatrixScroller::new(panel, EmbassyClock));

    info!("LED matrix initialized: {} modules", matrix.modules);

    // ------------------------------------------------------------------
    // Settings store in the last flash sector
    // ------------------------------------------------------------------
    static STORE: StaticCell<RefCell<SettingsStore>> = StaticCell::new();
    let flash = FlashStorage::new(peripherals.FLASH);
    let offset = flash.capacity() as u32 - STORE_SECTOR_SIZE;
    let store: &'static RefCell<SettingsStore> =
        STORE.init(RefCell::new(FlashKvStore::new(flash, offset)));

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------
    let provisioning = settings::provisioning();
    let network = wifi::setup(
        spawner,
        peripherals.WIFI,
        store,
        settings::portal_ip(&provisioning),
    )
    .expect("Failed to initialize WiFi");

    let mut coordinator =
        ProvisioningCoordinator::new(network, ConfigStore::new(store), display, provisioning);

    match coordinator.run().await {
        Outcome::Connected => {
            let message = coordinator.connected_message();
            let (_network, _store, mut display, config) = coordinator.into_parts();
            info!("Tracking {} symbols", config.symbols().count());
            display.hold(&message).await
        }
        Outcome::Failed => {
            let (network, store, display, _) = coordinator.into_parts();
            let boot = Input::new(
                peripherals.GPIO0,
                InputConfig::default().with_pull(Pull::Up),
            );
            info!("Provisioning failed; hold BOOT to wipe saved settings");
            let mut failure = FailureLoop::new(network, store, display, &provisioning);
            failure.run(|| boot.is_low()).await
        }
    }
}
