//! Dead reckoning for components mirrored from the server

use crate::component::SyncComponent;
use crate::error::SyncResult;
use crate::state::{calculate_state_gradient, integrate_state, ComponentState, Value};

/// Shortest tick interval used for a gradient (seconds)
const MIN_INTERVAL: f64 = 1e-3;

/// Per-component interpolation state of a passive mirror.
///
/// Each snapshot yields a gradient from the held state to the snapshot over
/// one estimated server tick interval. Every local frame integrates the held
/// state along that gradient. Integration stops once `limit` intervals worth
/// of time have been consumed, so a late snapshot freezes the component at
/// the last known position instead of overshooting it.
#[derive(Debug, Clone)]
pub struct Interpolator {
    gradient: Option<ComponentState>,
    remaining: f64,
    limit: f64,
    has_state: bool,
}

impl Interpolator {
    /// `limit` is measured in tick intervals; `f64::INFINITY` never freezes
    pub fn new(limit: f64) -> Self {
        Self {
            gradient: None,
            remaining: 0.0,
            limit: limit.max(0.0),
            has_state: false,
        }
    }

    pub fn gradient(&self) -> Option<&ComponentState> {
        self.gradient.as_ref()
    }

    pub fn has_state(&self) -> bool {
        self.has_state
    }

    /// Seconds of integration left before the held state freezes
    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Takes in an authoritative snapshot.
    ///
    /// The first snapshot is adopted as-is. Later ones only set a new
    /// gradient; the held state moves towards them in [`Interpolator::advance`].
    pub fn on_snapshot(
        &mut self,
        component: &mut dyn SyncComponent,
        snapshot: &[Value],
        tick_interval: f64,
    ) -> SyncResult<()> {
        if !self.has_state {
            component.set_state(snapshot)?;
            self.has_state = true;
            self.gradient = None;
            self.remaining = 0.0;
            return Ok(());
        }

        let interval = tick_interval.max(MIN_INTERVAL);
        let held = component.get_state()?;
        let gradient = calculate_state_gradient(&held, snapshot, interval)?;

        self.gradient = Some(gradient);
        self.remaining = interval * self.limit;
        Ok(())
    }

    /// Integrates the held state for `dt` seconds of local time
    pub fn advance(&mut self, component: &mut dyn SyncComponent, dt: f64) -> SyncResult<()> {
        let Some(gradient) = &self.gradient else {
            return Ok(());
        };

        let step = dt.min(self.remaining);
        if step <= 0.0 {
            return Ok(());
        }

        let held = component.get_state()?;
        let next = integrate_state(&held, gradient, step)?;
        component.set_state(&next)?;
        self.remaining -= step;
        Ok(())
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(1.0)
    }
}
