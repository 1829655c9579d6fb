// measure.rs

use esp_idf_hal::{
    adc::{
        ADC1,
        attenuation::DB_11,
        oneshot::{AdcChannelDriver, AdcDriver, config::AdcChannelConfig},
    },
    gpio::ADCPin,
    peripheral::Peripheral,
};
use log::*;

/// Two-point probe calibration. `dry` is the raw reading in air, `wet`
/// the raw reading in water; for a resistive probe dry > wet.
#[derive(Clone, Copy, Debug)]
pub struct Calibration {
    pub dry: u16,
    pub wet: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoistureReading {
    pub raw: u16,
    pub percent: u8,
}

/// Linear interpolation between the calibration endpoints, clamped to
/// [0, 100] so noise or a detached probe cannot produce nonsense.
pub fn percent_from_raw(raw: u16, cal: &Calibration) -> u8 {
    let dry = cal.dry as i32;
    let wet = cal.wet as i32;
    let span = dry - wet;
    if span <= 0 {
        return 0;
    }
    let percent = (dry - raw as i32) * 100 / span;
    percent.clamp(0, 100) as u8
}

pub struct MoistureSensor<'d, T: ADCPin<Adc = ADC1>> {
    channel: AdcChannelDriver<'d, T, AdcDriver<'d, ADC1>>,
}

impl<'d, T: ADCPin<Adc = ADC1>> MoistureSensor<'d, T> {
    pub fn new(
        adc1: impl Peripheral<P = ADC1> + 'd,
        pin: impl Peripheral<P = T> + 'd,
    ) -> anyhow::Result<Self> {
        let adc = AdcDriver::new(adc1)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(adc, pin, &config)?;
        Ok(MoistureSensor { channel })
    }

    /// One instantaneous read per cycle; no averaging, the short power-on
    /// window matters more than the noise.
    pub fn sample(&mut self, cal: &Calibration) -> anyhow::Result<MoistureReading> {
        let raw = self.channel.read()?;
        let percent = percent_from_raw(raw, cal);
        info!("Soil moisture raw {raw}, estimated {percent}%");
        Ok(MoistureReading { raw, percent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal() -> Calibration {
        Calibration {
            dry: 1024,
            wet: 423,
        }
    }

    #[test]
    fn endpoints_map_to_extremes() {
        assert_eq!(percent_from_raw(423, &cal()), 100);
        assert_eq!(percent_from_raw(1024, &cal()), 0);
    }

    #[test]
    fn midpoint_is_half() {
        assert_eq!(percent_from_raw(723, &cal()), 50);
    }

    #[test]
    fn clamps_outside_calibrated_band() {
        assert_eq!(percent_from_raw(0, &cal()), 100);
        assert_eq!(percent_from_raw(100, &cal()), 100);
        assert_eq!(percent_from_raw(2000, &cal()), 0);
        assert_eq!(percent_from_raw(u16::MAX, &cal()), 0);
    }

    #[test]
    fn monotone_and_bounded_within_band() {
        let cal = cal();
        let mut last = 100u8;
        for raw in cal.wet..=cal.dry {
            let percent = percent_from_raw(raw, &cal);
            assert!(percent <= 100);
            assert!(
                percent <= last,
                "percent rose from {last} to {percent} at raw {raw}"
            );
            last = percent;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn degenerate_calibration_reads_dry() {
        let flat = Calibration { dry: 500, wet: 500 };
        assert_eq!(percent_from_raw(500, &flat), 0);
    }
}

// EOF
