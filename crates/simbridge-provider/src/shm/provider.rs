use serde::Serialize;
use tracing::{debug, error, trace, Span};

use super::blackboard::{Blackboard, BlackboardState};
use crate::error::Result;
use crate::latest::LatestValueProvider;

/// Blackboard name used when none is configured.
pub const DEFAULT_BLACKBOARD_NAME: &str = "Blackboard";

/// Read side of the blackboard.
///
/// Never writes the state. Only if this handle creates the segment does it
/// initialise the mutex, leaving an all-zero state.
#[derive(Debug)]
pub struct ShmProvider {
    board: Blackboard,
    span: Span,
}

impl ShmProvider {
    /// Map the blackboard called `name`, creating it when absent.
    pub fn open(name: &str) -> Result<Self> {
        let board = Blackboard::open(name).map_err(|err| {
            error!(name, error = %err, "failed to open blackboard");
            err
        })?;
        let span = tracing::info_span!("shm_provider", name = board.name());
        debug!(name = board.name(), created = board.created(), "opened blackboard for reading");
        Ok(Self { board, span })
    }

    /// Replace the span every event of this provider is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn name(&self) -> &str {
        self.board.name()
    }

    /// Consistent copy of the whole blackboard.
    pub fn snapshot(&self) -> Result<BlackboardState> {
        let _entered = self.span.enter();
        let state = self.board.read().map_err(|err| {
            error!(error = %err, "failed to lock blackboard");
            err
        })?;
        trace!(gps_sec = state.gps_sec, "blackboard snapshot");
        Ok(state)
    }

    /// Snapshot reduced to the fields hardware models consume.
    pub fn data_point(&self) -> Result<ShmDataPoint> {
        self.snapshot().map(|state| ShmDataPoint::from(&state))
    }
}

impl LatestValueProvider for ShmProvider {
    type Value = BlackboardState;

    fn snapshot(&self) -> Result<BlackboardState> {
        ShmProvider::snapshot(self)
    }
}

/// Write side of the blackboard.
#[derive(Debug)]
pub struct BlackboardWriter {
    board: Blackboard,
}

impl BlackboardWriter {
    /// Map the blackboard called `name`, creating it when absent.
    pub fn open(name: &str) -> Result<Self> {
        let board = Blackboard::open(name)?;
        debug!(name = board.name(), created = board.created(), "opened blackboard for writing");
        Ok(Self { board })
    }

    pub fn name(&self) -> &str {
        self.board.name()
    }

    /// Apply `f` to the state while holding the mutex. Readers see either
    /// none or all of the changes `f` makes.
    pub fn update(&self, f: impl FnOnce(&mut BlackboardState)) -> Result<()> {
        Ok(self.board.with_locked(f)?)
    }

    /// Overwrite the whole state.
    pub fn publish(&self, state: &BlackboardState) -> Result<()> {
        self.update(|current| *current = *state)
    }
}

/// Blackboard fields read by the hardware models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ShmDataPoint {
    pub svb: [f64; 3],
    pub bvb: [f64; 3],
    pub hvb: [f64; 3],
    pub gyro_rate: [f64; 3],
    pub css_valid: [i32; 6],
    pub css_illum: [f64; 6],
    pub fss_valid: i32,
    pub fss_sun_ang: [f64; 2],
    pub st_valid: i32,
    pub st_qn: [f64; 4],
    pub gps_pos_n: [f64; 3],
    pub gps_vel_n: [f64; 3],
    pub accel_acc: [f64; 3],
    pub whl_h: [f64; 3],
}

impl From<&BlackboardState> for ShmDataPoint {
    fn from(state: &BlackboardState) -> Self {
        Self {
            svb: state.svb,
            bvb: state.bvb,
            hvb: state.hvb,
            gyro_rate: state.gyro_rate,
            css_valid: state.css_valid,
            css_illum: state.css_illum,
            fss_valid: state.fss_valid,
            fss_sun_ang: state.fss_sun_ang,
            st_valid: state.st_valid,
            st_qn: state.st_qn,
            gps_pos_n: state.gps_pos_n,
            gps_vel_n: state.gps_vel_n,
            accel_acc: state.accel_acc,
            whl_h: state.whl_h,
        }
    }
}
