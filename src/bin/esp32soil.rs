// bin/esp32soil.rs

#![warn(clippy::large_futures)]

use std::sync::Arc;

use esp32soil::*;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{OutputPin, PinDriver};
use esp_idf_hal::prelude::Peripherals;
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs, wifi::EspWifi};
use esp_idf_sys::esp_app_desc;
use log::*;


esp_app_desc!();

fn main() -> anyhow::Result<()> {
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Hello.");
    info!("Starting up, firmware v{FW_VERSION}");

    let sysloop = EspSystemEventLoop::take()?;
    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

    let ns = env!("CARGO_BIN_NAME");
    let mut nvs = match nvs::EspNvs::new(nvs_default_partition.clone(), ns, true) {
        Ok(nvs) => {
            info!("Got namespace {ns:?} from default partition");
            nvs
        }
        Err(e) => panic!("Could not get namespace {ns}: {e:?}"),
    };

    #[cfg(feature = "reset_settings")]
    let config = {
        let c = MyConfig::default();
        c.to_nvs(&mut nvs)?;
        c
    };

    #[cfg(not(feature = "reset_settings"))]
    let config = match MyConfig::from_nvs(&mut nvs) {
        None => {
            error!("Could not read nvs config, using defaults");
            let c = MyConfig::default();
            c.to_nvs(&mut nvs)?;
            info!("Successfully saved default config to nvs.");
            c
        }

        // using settings saved on nvs if we could find them
        Some(c) => c,
    };
    info!("My config:\n{config:#?}");

    let peripherals = Peripherals::take().unwrap();
    let pins = peripherals.pins;

    // indicator stays high for the whole wake window, low just before sleep
    #[cfg(feature = "esp32c3")]
    let mut indicator = PinDriver::output(pins.gpio3.downgrade_output())?;
    #[cfg(feature = "esp32s")]
    let mut indicator = PinDriver::output(pins.gpio2.downgrade_output())?;
    indicator.set_high()?;

    #[cfg(feature = "esp32c3")]
    let sensor = MoistureSensor::new(peripherals.adc1, pins.gpio0)?;
    #[cfg(feature = "esp32s")]
    let sensor = MoistureSensor::new(peripherals.adc1, pins.gpio34)?;

    let wifi = EspWifi::new(
        peripherals.modem,
        sysloop.clone(),
        Some(nvs_default_partition),
    )?;
    let station = EspStation::new(wifi, &config.wifi_ssid, &config.wifi_pass)?;
    let manager = WifiManager::new(station, MonotonicClock::new(), config.wifi_ssid.clone());

    let state = Arc::new(MyState::new(config));

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async {
            info!("Entering main loop...");
            tokio::select! {
                _ = run_wifi(manager, sysloop, state.clone()) => { error!("run_wifi() ended."); }
                _ = run_cycle(state.clone(), sensor, indicator) => { error!("run_cycle() ended."); }
            };
        });

    // normally never reached: the cycle ends in deep sleep. A task that
    // bails out lands here and we reboot instead of hanging.
    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

// EOF
