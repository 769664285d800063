//! Sensor reading simulator for the nutrient reservoir.
//!
//! Each sample draws pH, nutrient concentration (EC proxy, dS/m) and
//! temperature (°C) independently from fixed uniform ranges.  The random
//! source is owned by the simulator and can be seeded so a whole monitoring
//! run is reproducible.

use serde::Serialize;
use std::ops::Range;

// ---------------------------------------------------------------------------
// Sampling ranges
// ---------------------------------------------------------------------------

pub const PH_RANGE: Range<f64> = 5.0..7.0;
pub const NUTRIENT_RANGE: Range<f64> = 1.0..2.0;
pub const TEMP_RANGE: Range<f64> = 20.0..25.0;

/// Number of model inputs derived from one reading.
pub const FEATURE_COUNT: usize = 3;

/// Model input vector in `(ph, nutrient_conc, temp)` order.
pub type Features = [f64; FEATURE_COUNT];

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// One tick's worth of reservoir sensor values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub ph: f64,
    /// Electrical conductivity, dS/m.
    pub nutrient_conc: f64,
    /// Solution temperature, °C.
    pub temp: f64,
}

impl SensorReading {
    pub fn features(&self) -> Features {
        [self.ph, self.nutrient_conc, self.temp]
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

pub struct ReadingSim {
    rng: fastrand::Rng,
}

impl ReadingSim {
    /// Create a simulator.  `Some(seed)` gives a deterministic sequence;
    /// `None` seeds from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => fastrand::Rng::with_seed(s),
            None => fastrand::Rng::new(),
        };
        Self { rng }
    }

    /// Produce the next reading.
    pub fn sample(&mut self) -> SensorReading {
        SensorReading {
            ph: self.uniform(PH_RANGE),
            nutrient_conc: self.uniform(NUTRIENT_RANGE),
            temp: self.uniform(TEMP_RANGE),
        }
    }

    fn uniform(&mut self, range: Range<f64>) -> f64 {
        range.start + (range.end - range.start) * self.rng.f64()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
