//! Damped spring used to settle a panel on its target offset.

use std::time::Duration;

/// Largest integration step; longer ticks are split.
const MAX_STEP_SECS: f64 = 1.0 / 120.0;

/// Distance (px) and speed (px/s) below which the spring counts as settled.
pub const REST_DISTANCE_PX: f64 = 0.5;
pub const REST_SPEED_PX: f64 = 0.5;

/// Spring constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringParams {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            stiffness: 170.0,
            damping: 26.0,
            mass: 1.0,
        }
    }
}

/// A spring moving a value toward `target`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spring {
    position: f64,
    velocity: f64,
    target: f64,
    params: SpringParams,
}

impl Spring {
    pub(crate) fn new(from: f64, target: f64, params: SpringParams) -> Self {
        Self {
            position: from,
            velocity: 0.0,
            target,
            params,
        }
    }

    pub(crate) fn position(&self) -> f64 {
        self.position
    }

    fn is_at_rest(&self) -> bool {
        (self.position - self.target).abs() < REST_DISTANCE_PX
            && self.velocity.abs() < REST_SPEED_PX
    }

    /// Advance by `dt` (semi-implicit Euler). Returns `true` once settled, at
    /// which point the position is exactly the target.
    pub(crate) fn step(&mut self, dt: Duration) -> bool {
        let mut remaining = dt.as_secs_f64();
        while remaining > 0.0 && !self.is_at_rest() {
            let h = remaining.min(MAX_STEP_SECS);
            let force = -self.params.stiffness * (self.position - self.target)
                - self.params.damping * self.velocity;
            self.velocity += force / self.params.mass * h;
            self.position += self.velocity * h;
            remaining -= h;
        }

        if self.is_at_rest() {
            self.position = self.target;
            self.velocity = 0.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spring_settles_exactly_on_target() {
        let mut spring = Spring::new(0.0, 300.0, SpringParams::default());
        let mut settled = false;
        for _ in 0..600 {
            if spring.step(Duration::from_millis(16)) {
                settled = true;
                break;
            }
        }
        assert!(settled);
        assert_eq!(spring.position(), 300.0);
    }

    #[test]
    fn test_spring_moves_toward_target() {
        let mut spring = Spring::new(500.0, 100.0, SpringParams::default());
        spring.step(Duration::from_millis(50));
        assert!(spring.position() < 500.0);
        assert!(spring.position() > 0.0);
    }

    #[test]
    fn test_large_tick_is_stable() {
        let mut spring = Spring::new(0.0, 400.0, SpringParams::default());
        assert!(spring.step(Duration::from_secs(10)));
        assert_eq!(spring.position(), 400.0);
    }

    #[test]
    fn test_zero_distance_is_already_settled() {
        let mut spring = Spring::new(42.0, 42.0, SpringParams::default());
        assert!(spring.step(Duration::ZERO));
    }
}
