//! pH controller: ideal-command oracle, model training and regulation.
//!
//! The oracle maps pH deviation from the setpoint to a pump speed and is used
//! only to label training data.  Regulation goes through the fitted model,
//! which sees all three sensor features even though the oracle depends on pH
//! alone.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ControllerConfig;
use crate::model::{FitError, LinearRegression, Predictor};
use crate::sim::{Features, SensorReading};

pub const PUMP_SPEED_MIN: f64 = 0.0;
pub const PUMP_SPEED_MAX: f64 = 100.0;

/// Pump speed (%) per pH unit of deviation outside the tolerance band.
const PUMP_GAIN: f64 = 50.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// `regulate_ph` was called before a successful `train_model`.
    #[error("model not trained")]
    ModelNotTrained,
    /// The predictor rejected the training history.
    #[error("model training failed: {0}")]
    Fit(#[from] FitError),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller<P = LinearRegression> {
    optimal_ph: f64,
    ph_tolerance: f64,
    model: P,
    is_trained: bool,
    pump_speed: f64,
}

impl Controller<LinearRegression> {
    pub fn new(cfg: &ControllerConfig) -> Self {
        Self::with_model(cfg, LinearRegression::new())
    }
}

impl<P: Predictor> Controller<P> {
    pub fn with_model(cfg: &ControllerConfig, model: P) -> Self {
        Self {
            optimal_ph: cfg.optimal_ph,
            ph_tolerance: cfg.ph_tolerance,
            model,
            is_trained: false,
            pump_speed: PUMP_SPEED_MIN,
        }
    }

    pub fn optimal_ph(&self) -> f64 {
        self.optimal_ph
    }

    pub fn ph_tolerance(&self) -> f64 {
        self.ph_tolerance
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    /// Last commanded pump speed, always within `[0, 100]`.
    pub fn pump_speed(&self) -> f64 {
        self.pump_speed
    }

    pub fn model(&self) -> &P {
        &self.model
    }

    /// Ground-truth pump speed for a pH value: zero inside the tolerance
    /// band, otherwise `50 * deviation` saturating at 100.
    pub fn ideal_pump_speed(&self, ph: f64) -> f64 {
        let deviation = (ph - self.optimal_ph).abs();
        if deviation <= self.ph_tolerance {
            return PUMP_SPEED_MIN;
        }
        (PUMP_GAIN * deviation).min(PUMP_SPEED_MAX)
    }

    /// Fit the model on `history`, labelling each reading with the oracle.
    pub fn train_model(&mut self, history: &[SensorReading]) -> Result<(), ControlError> {
        let features: Vec<Features> = history.iter().map(SensorReading::features).collect();
        let targets: Vec<f64> = history
            .iter()
            .map(|r| self.ideal_pump_speed(r.ph))
            .collect();

        self.model.fit(&features, &targets)?;
        self.is_trained = true;

        info!(samples = history.len(), "Edge ML model trained for pH regulation.");
        Ok(())
    }

    /// Predict and apply a pump speed for `reading`.
    ///
    /// Only a structured `info!` event is emitted here.  The operator-facing
    /// `Current pH: ..` line is written by [`crate::monitor::Monitor::step`].
    pub fn regulate_ph(&mut self, reading: &SensorReading) -> Result<f64, ControlError> {
        if !self.is_trained {
            return Err(ControlError::ModelNotTrained);
        }
        let raw = self
            .model
            .predict(&reading.features())
            .ok_or(ControlError::ModelNotTrained)?;

        self.pump_speed = clamp_pump_speed(raw);

        info!(
            ph = format!("{:.2}", reading.ph),
            raw_prediction = raw,
            pump_speed = format!("{:.2}", self.pump_speed),
            "pump speed updated"
        );
        Ok(self.pump_speed)
    }
}

fn clamp_pump_speed(raw: f64) -> f64 {
    if raw.is_nan() {
        warn!("model produced NaN pump speed; holding pump at minimum");
        return PUMP_SPEED_MIN;
    }
    raw.clamp(PUMP_SPEED_MIN, PUMP_SPEED_MAX)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ReadingSim;

    fn default_controller() -> Controller {
        Controller::new(&ControllerConfig::default())
    }

    fn reading(ph: f64) -> SensorReading {
        SensorReading {
            ph,
            nutrient_conc: 1.5,
            temp: 22.0,
        }
    }

    /// Predictor that always returns a fixed value once "fitted".
    struct FixedPredictor {
        value: f64,
        fitted: bool,
    }

    impl Predictor for FixedPredictor {
        fn fit(&mut self, _: &[Features], _: &[f64]) -> Result<(), FitError> {
            self.fitted = true;
            Ok(())
        }

        fn predict(&self, _: &Features) -> Option<f64> {
            self.fitted.then_some(self.value)
        }
    }

    fn fixed_controller(value: f64) -> Controller<FixedPredictor> {
        let mut c = Controller::with_model(
            &ControllerConfig::default(),
            FixedPredictor {
                value,
                fitted: false,
            },
        );
        c.train_model(&[reading(6.0)]).unwrap();
        c
    }

    // -- Oracle -----------------------------------------------------------

    #[test]
    fn ideal_speed_reference_points() {
        let c = default_controller();
        assert_eq!(c.ideal_pump_speed(6.0), 0.0);
        assert_eq!(c.ideal_pump_speed(5.0), 50.0);
        assert_eq!(c.ideal_pump_speed(4.0), 100.0);
        assert!((c.ideal_pump_speed(6.9) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn ideal_speed_zero_inside_band() {
        let c = default_controller();
        for i in 0..=100 {
            let ph = 5.5 + i as f64 * 0.01;
            assert_eq!(c.ideal_pump_speed(ph), 0.0, "ph {ph} is inside the band");
        }
    }

    #[test]
    fn ideal_speed_band_edges_inclusive() {
        let c = default_controller();
        assert_eq!(c.ideal_pump_speed(5.5), 0.0);
        assert_eq!(c.ideal_pump_speed(6.5), 0.0);
    }

    #[test]
    fn ideal_speed_outside_band_is_linear_then_saturates() {
        let c = default_controller();
        for i in 1..=400 {
            let deviation = 0.5 + i as f64 * 0.01;
            let expected = (50.0 * deviation).min(100.0);
            for ph in [6.0 + deviation, 6.0 - deviation] {
                let got = c.ideal_pump_speed(ph);
                assert!(
                    (got - expected).abs() < 1e-9,
                    "ph {ph}: expected {expected}, got {got}"
                );
            }
        }
    }

    #[test]
    fn ideal_speed_monotone_in_deviation() {
        let c = default_controller();
        let mut prev = 0.0;
        for i in 0..=600 {
            let speed = c.ideal_pump_speed(6.0 + i as f64 * 0.01);
            assert!(speed >= prev, "speed decreased at step {i}: {prev} -> {speed}");
            prev = speed;
        }
    }

    #[test]
    fn zero_tolerance_band() {
        let c = Controller::new(&ControllerConfig {
            optimal_ph: 6.0,
            ph_tolerance: 0.0,
        });
        assert_eq!(c.ideal_pump_speed(6.0), 0.0);
        assert!((c.ideal_pump_speed(6.1) - 5.0).abs() < 1e-9);
    }

    // -- Regulation -------------------------------------------------------

    #[test]
    fn regulate_before_training_fails() {
        let mut c = default_controller();
        assert_eq!(c.regulate_ph(&reading(5.0)), Err(ControlError::ModelNotTrained));
        assert!(!c.is_trained());
        assert_eq!(c.pump_speed(), 0.0);
    }

    #[test]
    fn regulate_after_training_returns_prediction() {
        let mut c = fixed_controller(42.0);
        assert_eq!(c.regulate_ph(&reading(5.0)).unwrap(), 42.0);
        assert_eq!(c.pump_speed(), 42.0);
    }

    #[test]
    fn regulate_clamps_high_prediction() {
        let mut c = fixed_controller(250.0);
        assert_eq!(c.regulate_ph(&reading(5.0)).unwrap(), 100.0);
        assert_eq!(c.pump_speed(), 100.0);
    }

    #[test]
    fn regulate_clamps_negative_prediction() {
        let mut c = fixed_controller(-30.0);
        assert_eq!(c.regulate_ph(&reading(6.0)).unwrap(), 0.0);
    }

    #[test]
    fn regulate_handles_non_finite_prediction() {
        assert_eq!(fixed_controller(f64::NAN).regulate_ph(&reading(6.0)).unwrap(), 0.0);
        assert_eq!(
            fixed_controller(f64::INFINITY).regulate_ph(&reading(6.0)).unwrap(),
            100.0
        );
        assert_eq!(
            fixed_controller(f64::NEG_INFINITY).regulate_ph(&reading(6.0)).unwrap(),
            0.0
        );
    }

    #[test]
    fn regulate_output_always_in_range_with_trained_regression() {
        let mut sim = ReadingSim::new(Some(11));
        let history: Vec<SensorReading> = (0..10).map(|_| sim.sample()).collect();

        let mut c = default_controller();
        c.train_model(&history).unwrap();
        assert!(c.is_trained());

        // Extreme inputs drive the raw linear prediction far outside [0, 100].
        for ph in [-50.0, 0.0, 3.0, 6.0, 9.0, 80.0] {
            let r = SensorReading {
                ph,
                nutrient_conc: 1.5,
                temp: 22.0,
            };
            let speed = c.regulate_ph(&r).unwrap();
            assert!((0.0..=100.0).contains(&speed), "ph {ph} -> {speed}");
        }
    }

    // -- Training ---------------------------------------------------------

    #[test]
    fn train_on_empty_history_fails() {
        let mut c = default_controller();
        assert_eq!(c.train_model(&[]), Err(ControlError::Fit(FitError::Empty)));
        assert!(!c.is_trained());
    }

    #[test]
    fn training_is_deterministic() {
        let mut sim = ReadingSim::new(Some(5));
        let history: Vec<SensorReading> = (0..12).map(|_| sim.sample()).collect();

        let mut c = default_controller();
        c.train_model(&history).unwrap();
        let first = (c.model().intercept(), c.model().weights());
        c.train_model(&history).unwrap();
        let second = (c.model().intercept(), c.model().weights());

        assert_eq!(first, second);

        let mut other = default_controller();
        other.train_model(&history).unwrap();
        assert_eq!(first, (other.model().intercept(), other.model().weights()));
    }

    #[test]
    fn trained_model_tracks_oracle_direction() {
        // Readings all below the setpoint: lower pH means larger deviation,
        // so the fitted pH weight must be negative.
        let history: Vec<SensorReading> = (0..10)
            .map(|i| SensorReading {
                ph: 4.0 + 0.15 * i as f64,
                nutrient_conc: 1.0 + 0.05 * ((i * 3) % 7) as f64,
                temp: 20.0 + 0.4 * ((i * 5) % 9) as f64,
            })
            .collect();

        let mut c = default_controller();
        c.train_model(&history).unwrap();

        let w = c.model().weights().unwrap();
        assert!(w[0] < 0.0, "ph weight should be negative, got {}", w[0]);
    }

    #[test]
    fn fit_error_is_the_source() {
        use std::error::Error as _;

        let err = ControlError::from(FitError::NonFinite);
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("training data contains NaN or infinite values"));
        assert!(ControlError::ModelNotTrained.source().is_none());
    }

    #[test]
    fn control_error_display() {
        assert_eq!(ControlError::ModelNotTrained.to_string(), "model not trained");
        assert_eq!(
            ControlError::Fit(FitError::Empty).to_string(),
            "model training failed: no training rows"
        );
    }
}
