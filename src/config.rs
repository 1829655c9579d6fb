// config.rs

use anyhow::bail;
use crc::{Crc, CRC_32_ISCSI};
use esp_idf_svc::nvs;
use log::*;
use serde::{Deserialize, Serialize};


pub const NVS_BUF_SIZE: usize = 256;

const DEFAULT_RELAY_URL: &str = "http://api.callmebot.com/whatsapp.php";

// YL-69 probe endpoints: raw ADC reading in air (dry) and in water (wet)
const DEFAULT_ADC_DRY: u16 = 1024;
const DEFAULT_ADC_WET: u16 = 423;

const DEFAULT_SLEEP_SECS: u64 = 3600;

const CONFIG_NAME: &str = "cfg";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MyConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,

    pub phone: String,
    pub apikey: String,
    pub relay_url: String,

    pub adc_dry: u16,
    pub adc_wet: u16,

    pub sleep_secs: u64,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: option_env!("WIFI_SSID").unwrap_or("internet").into(),
            wifi_pass: option_env!("WIFI_PASS").unwrap_or("password").into(),

            phone: option_env!("RELAY_PHONE").unwrap_or("+000000000").into(),
            apikey: option_env!("RELAY_APIKEY").unwrap_or("changeme").into(),
            relay_url: DEFAULT_RELAY_URL.into(),

            adc_dry: DEFAULT_ADC_DRY,
            adc_wet: DEFAULT_ADC_WET,

            sleep_secs: DEFAULT_SLEEP_SECS,
        }
    }
}

impl MyConfig {
    pub fn from_nvs(nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> Option<Self> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
            Err(e) => {
                error!("Nvs read error {e:?}");
                return None;
            }
            Ok(Some(b)) => b,
            _ => {
                error!("Nvs key not found");
                return None;
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());

        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::from_bytes_crc32::<MyConfig>(b, digest) {
            Ok(c) => {
                info!("Successfully parsed config from nvs.");
                Some(c)
            }
            Err(e) => {
                error!("Cannot parse config from nvs: {e:?}");
                None
            }
        }
    }

    pub fn to_nvs(&self, nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> anyhow::Result<()> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        let nvsdata = match postcard::to_slice_crc32(self, &mut nvsbuf, digest) {
            Ok(d) => d,
            Err(e) => {
                let estr = format!("Cannot encode config to buffer {e:?}");
                bail!("{estr}");
            }
        };
        info!(
            "Encoded config to {sz} bytes. Saving to nvs...",
            sz = nvsdata.len()
        );

        match nvs.set_raw(CONFIG_NAME, nvsdata) {
            Ok(_) => {
                info!("Config saved.");
                Ok(())
            }
            Err(e) => {
                let estr = format!("Cannot save to nvs: {e:?}");
                bail!("{estr}");
            }
        }
    }
}

// EOF
