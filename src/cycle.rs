// cycle.rs

use esp_idf_hal::{
    adc::ADC1,
    gpio::{ADCPin, AnyOutputPin, Output, PinDriver},
};
use log::*;

use crate::*;

pub const CONNECT_WAIT_SECS: u32 = 30;
pub const SNTP_SYNC_ATTEMPTS: u32 = 3;

pub fn format_report(timestamp: &str, reading: &MoistureReading) -> String {
    format!(
        "Soil moisture report\n{timestamp}\nraw value: {raw}\nestimated: {percent}%",
        raw = reading.raw,
        percent = reading.percent
    )
}

/// One full wake cycle: wait for the link, sync time, sample, report,
/// power down. Runs once per boot and ends in deep sleep; delivery
/// failures only shorten the report to the console.
pub async fn run_cycle<T: ADCPin<Adc = ADC1>>(
    state: Arc<MyState>,
    mut sensor: MoistureSensor<'_, T>,
    mut indicator: PinDriver<'_, AnyOutputPin, Output>,
) -> anyhow::Result<()> {
    let (cal, sleep_secs) = {
        let config = state.config.read().await;
        (
            Calibration {
                dry: config.adc_dry,
                wet: config.adc_wet,
            },
            config.sleep_secs,
        )
    };

    info!("Waiting for WiFi connection...");
    for _ in 0..CONNECT_WAIT_SECS {
        if state.link_up() {
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }

    let _time = if state.link_up() {
        match TimeService::start() {
            Ok(time) => {
                time.wait_for_sync(SNTP_SYNC_ATTEMPTS).await;
                Some(time)
            }
            Err(e) => {
                error!("SNTP startup failed: {e:?}");
                None
            }
        }
    } else {
        warn!("No WiFi connection, sampling anyway");
        None
    };

    let reading = sensor.sample(&cal)?;
    let message = format_report(&formatted_time(), &reading);

    let mut relay = {
        let config = state.config.read().await;
        HttpRelay::new(state.clone(), &config)?
    };
    let delivered = send_with_retry(
        &mut relay,
        &message,
        || state.link_up(),
        || sleep(SEND_RETRY_PAUSE),
    )
    .await;
    if !delivered {
        error!("Report not delivered this cycle");
    }

    info!("Deep sleep for {sleep_secs} s");
    indicator.set_low()?;
    enter_deep_sleep(sleep_secs)
}

/// Powers down until the wakeup timer fires; the device restarts cold.
pub fn enter_deep_sleep(secs: u64) -> ! {
    unsafe { esp_idf_sys::esp_deep_sleep(secs * 1_000_000) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_percentage_and_raw_value() {
        let reading = MoistureReading {
            raw: 423,
            percent: 100,
        };
        let report = format_report("07/03/2024 06:05:04", &reading);
        assert!(report.contains("100%"));
        assert!(report.contains("423"));
        assert!(report.contains("07/03/2024 06:05:04"));
    }

    #[test]
    fn report_for_dry_probe() {
        let reading = MoistureReading {
            raw: 1024,
            percent: 0,
        };
        let report = format_report("01/01/1970 00:00:00", &reading);
        assert!(report.contains("estimated: 0%"));
    }
}

// EOF
