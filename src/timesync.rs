// timesync.rs

use chrono::{DateTime, Utc};
use esp_idf_svc::sntp::{EspSntp, SyncStatus};
use log::*;
use tokio::time::{Duration, sleep};

pub struct TimeService {
    sntp: EspSntp<'static>,
}

impl TimeService {
    pub fn start() -> anyhow::Result<Self> {
        let sntp = EspSntp::new_default()?;
        info!("SNTP started.");
        Ok(TimeService { sntp })
    }

    /// Best-effort: the cycle proceeds with a stale clock when the pool
    /// cannot be reached in time.
    pub async fn wait_for_sync(&self, attempts: u32) -> bool {
        for attempt in 1..=attempts {
            if matches!(self.sntp.get_sync_status(), SyncStatus::Completed) {
                info!("Time synchronized.");
                return true;
            }
            debug!("Time sync pending (attempt {attempt}/{attempts})");
            sleep(Duration::from_secs(1)).await;
        }
        warn!("Time sync incomplete, timestamps may be off");
        false
    }
}

pub fn format_utc(t: DateTime<Utc>) -> String {
    t.format("%d/%m/%Y %H:%M:%S").to_string()
}

/// Current UTC wall clock, no timezone offset applied.
pub fn formatted_time() -> String {
    format_utc(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_day_month_year_clock() {
        let t = Utc.with_ymd_and_hms(2024, 3, 7, 6, 5, 4).unwrap();
        assert_eq!(format_utc(t), "07/03/2024 06:05:04");
    }
}

// EOF
