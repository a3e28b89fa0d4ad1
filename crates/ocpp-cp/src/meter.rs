//! # Meter Simulation
//!
//! Energy register and power readings reported in MeterValues while a
//! transaction runs.

use chrono::{DateTime, Utc};
use ocpp_types::common::{Measurand, MeterValue, SampledValue, UnitOfMeasure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// One reading taken at the end of a sampling period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    pub timestamp: DateTime<Utc>,
    /// Cumulative energy register in Wh
    pub energy_wh: f64,
    /// Average power over the period in W
    pub power_w: f64,
}

impl MeterReading {
    /// Energy register and active power as periodic samples
    pub fn to_meter_value(&self) -> MeterValue {
        MeterValue {
            timestamp: self.timestamp,
            sampled_values: vec![
                SampledValue::periodic(
                    self.energy_wh.round() as i64,
                    Measurand::EnergyActiveImportRegister,
                    UnitOfMeasure::Wh,
                ),
                SampledValue::periodic(
                    self.power_w.round() as i64,
                    Measurand::PowerActiveImport,
                    UnitOfMeasure::W,
                ),
            ],
        }
    }
}

/// Simulated meter drawing a jittered nominal power, capped by the
/// smart-charging limit in force
#[derive(Debug)]
pub struct MeterSimulator {
    energy_wh: f64,
    nominal_power_w: f64,
    /// Relative jitter, 0.05 means +/- 5 %
    jitter: f64,
    floor_w: f64,
    rng: StdRng,
}

impl MeterSimulator {
    pub fn new(nominal_power_w: f64) -> Self {
        Self::with_rng(nominal_power_w, StdRng::from_entropy())
    }

    /// Deterministic meter for tests and reproducible runs
    pub fn seeded(nominal_power_w: f64, seed: u64) -> Self {
        Self::with_rng(nominal_power_w, StdRng::seed_from_u64(seed))
    }

    fn with_rng(nominal_power_w: f64, rng: StdRng) -> Self {
        Self {
            energy_wh: 0.0,
            nominal_power_w,
            jitter: 0.05,
            floor_w: 1000.0,
            rng,
        }
    }

    /// Current register value in Wh
    pub fn energy_wh(&self) -> f64 {
        self.energy_wh
    }

    /// Register value as reported in Start/StopTransaction
    pub fn register_wh(&self) -> i64 {
        self.energy_wh.round() as i64
    }

    /// Advance the meter by one sampling period of `period_secs` seconds.
    ///
    /// Power is the nominal value with jitter, never below the floor, then
    /// capped by `limit_w`.
    pub fn sample(&mut self, period_secs: f64, limit_w: f64) -> MeterReading {
        let factor = 1.0 + self.rng.gen_range(-self.jitter..=self.jitter);
        let drawn = (self.nominal_power_w * factor).round().max(self.floor_w);
        let power_w = drawn.min(limit_w.max(0.0));

        self.energy_wh += power_w * period_secs / 3600.0;
        trace!(
            "Meter sample: {:.0} W over {:.0}s, register {:.0} Wh",
            power_w,
            period_secs,
            self.energy_wh
        );

        MeterReading {
            timestamp: Utc::now(),
            energy_wh: self.energy_wh,
            power_w,
        }
    }

    pub fn reset(&mut self) {
        self.energy_wh = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_stays_within_jitter_band() {
        let mut meter = MeterSimulator::seeded(11_000.0, 7);
        for _ in 0..200 {
            let reading = meter.sample(10.0, f64::MAX);
            assert!(reading.power_w >= 10_450.0 && reading.power_w <= 11_550.0);
        }
    }

    #[test]
    fn test_power_is_capped_by_limit() {
        let mut meter = MeterSimulator::seeded(11_000.0, 1);
        let reading = meter.sample(3600.0, 3_000.0);
        assert_eq!(reading.power_w, 3_000.0);
        assert_eq!(reading.energy_wh, 3_000.0);
        assert_eq!(meter.register_wh(), 3_000);
    }

    #[test]
    fn test_floor_applies_before_limit() {
        let mut meter = MeterSimulator::seeded(200.0, 3);
        let reading = meter.sample(1.0, f64::MAX);
        assert_eq!(reading.power_w, 1_000.0);
    }

    #[test]
    fn test_meter_value_shape() {
        let reading = MeterReading {
            timestamp: Utc::now(),
            energy_wh: 1234.4,
            power_w: 10999.6,
        };
        let value = serde_json::to_value(reading.to_meter_value()).unwrap();
        let samples = value["sampledValue"].as_array().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0]["measurand"], "Energy.Active.Import.Register");
        assert_eq!(samples[0]["value"], "1234");
        assert_eq!(samples[0]["unit"], "Wh");
        assert_eq!(samples[0]["context"], "Sample.Periodic");
        assert_eq!(samples[1]["measurand"], "Power.Active.Import");
        assert_eq!(samples[1]["value"], "11000");
    }
}
