//! Monitoring loop: samples a reading every tick, trains the controller once
//! enough history has accumulated, then regulates pH on every later tick.
//!
//! ## State machine
//!
//! ```text
//! Collecting ──[history.len() >= training_threshold]──▶ Trained
//!     │                                                   │
//!     └── sample, append                                  └── sample, append, regulate
//! ```
//!
//! The loop ends once the configured duration has elapsed and returns the
//! full reading history.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::controller::Controller;
use crate::model::Predictor;
use crate::sim::{ReadingSim, SensorReading};
use crate::table::ReadingTable;

// ---------------------------------------------------------------------------
// Loop state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Accumulating readings; the model has not been trained yet.
    Collecting,
    /// Model trained; every tick regulates pH.
    Trained,
}

impl MonitorState {
    /// Whether a state with `history_len` readings should train now.
    pub fn should_train(self, history_len: usize, threshold: usize) -> bool {
        self == MonitorState::Collecting && history_len >= threshold
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    duration: Duration,
    interval: Duration,
    training_threshold: usize,
    state: MonitorState,
    history: Vec<SensorReading>,
}

impl Monitor {
    pub fn new(cfg: &MonitorConfig) -> Result<Self> {
        Ok(Self {
            duration: cfg.duration()?,
            interval: cfg.interval()?,
            training_threshold: cfg.training_threshold,
            state: MonitorState::Collecting,
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Run until `duration` has elapsed, writing status lines to `out`.
    /// Any controller error ends the run.
    pub async fn run<P, W>(
        mut self,
        controller: &mut Controller<P>,
        sim: &mut ReadingSim,
        out: &mut W,
    ) -> Result<ReadingTable>
    where
        P: Predictor,
        W: Write,
    {
        info!(
            duration_sec = self.duration.as_secs_f64(),
            interval_sec = self.interval.as_secs_f64(),
            training_threshold = self.training_threshold,
            optimal_ph = controller.optimal_ph(),
            ph_tolerance = controller.ph_tolerance(),
            "monitor started"
        );

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if start.elapsed() >= self.duration {
                break;
            }
            let reading = sim.sample();
            self.step(reading, controller, out)?;
        }

        info!(
            readings = self.history.len(),
            state = ?self.state(),
            trained = controller.is_trained(),
            pump_speed = controller.pump_speed(),
            "monitor finished"
        );
        Ok(ReadingTable::from(self.history))
    }

    /// Handle one tick's reading.
    pub fn step<P, W>(
        &mut self,
        reading: SensorReading,
        controller: &mut Controller<P>,
        out: &mut W,
    ) -> Result<()>
    where
        P: Predictor,
        W: Write,
    {
        self.history.push(reading);
        debug!(
            tick = self.history.len(),
            ph = reading.ph,
            nutrient_conc = reading.nutrient_conc,
            temp = reading.temp,
            "reading sampled"
        );

        if self
            .state
            .should_train(self.history.len(), self.training_threshold)
        {
            controller
                .train_model(&self.history)
                .context("initial model training failed")?;
            self.state = MonitorState::Trained;
            writeln!(out, "Edge ML model trained for pH regulation.")?;
        }

        if self.state == MonitorState::Trained {
            let speed = controller
                .regulate_ph(&reading)
                .context("pH regulation failed")?;
            writeln!(
                out,
                "Current pH: {:.2}, Predicted pump speed: {:.2}%",
                reading.ph, speed
            )?;
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
