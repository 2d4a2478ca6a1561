//! Online theta update applied after every answer.
//!
//! A bounded heuristic, not a likelihood fit: each answer moves the
//! estimate by a clamped step whose size depends on how surprising the
//! outcome was given the item's difficulty.

use serde::{Deserialize, Serialize};

use crate::model::{THETA_MAX, THETA_MIN};

pub const LEARNING_RATE: f64 = 0.1;
pub const MIN_STEP: f64 = 0.01;
pub const MAX_STEP: f64 = 0.3;

/// Outcome of a single theta update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThetaUpdate {
    pub new_theta: f64,
    pub change: f64,
}

/// Compute the new theta after one answer.
///
/// A missing difficulty is treated as 0. The step is clamped to
/// `[0.01, 0.3]` in magnitude with the sign of the outcome, and the result
/// is clamped to `[-3, 3]`.
pub fn update_theta(current: f64, is_correct: bool, difficulty: Option<f64>) -> ThetaUpdate {
    let difficulty = difficulty.unwrap_or(0.0);

    let change = if is_correct {
        (LEARNING_RATE * (1.0 + difficulty - current) * 0.5).clamp(MIN_STEP, MAX_STEP)
    } else {
        (-LEARNING_RATE * (1.0 + current - difficulty) * 0.5).clamp(-MAX_STEP, -MIN_STEP)
    };

    ThetaUpdate {
        new_theta: (current + change).clamp(THETA_MIN, THETA_MAX),
        change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn correct_answer_on_neutral_item() {
        let update = update_theta(0.0, true, Some(0.0));
        assert!((update.change - 0.05).abs() < EPS);
        assert!((update.new_theta - 0.05).abs() < EPS);
    }

    #[test]
    fn incorrect_answer_on_neutral_item() {
        let update = update_theta(0.0, false, Some(0.0));
        assert!((update.change + 0.05).abs() < EPS);
        assert!((update.new_theta + 0.05).abs() < EPS);
    }

    #[test]
    fn missing_difficulty_is_zero() {
        assert_eq!(update_theta(0.4, true, None), update_theta(0.4, true, Some(0.0)));
        assert_eq!(update_theta(-1.2, false, None), update_theta(-1.2, false, Some(0.0)));
    }

    #[test]
    fn floor_keeps_progress_visible() {
        // High ability on an easy item: raw step is negative, floored to +0.01.
        let update = update_theta(3.0, true, Some(-3.0));
        assert!((update.change - MIN_STEP).abs() < EPS);
        assert_eq!(update.new_theta, THETA_MAX);
    }

    #[test]
    fn ceiling_limits_swings() {
        let update = update_theta(-3.0, true, Some(3.0));
        assert!((update.change - MAX_STEP).abs() < EPS);

        let update = update_theta(3.0, false, Some(-3.0));
        assert!((update.change + MAX_STEP).abs() < EPS);
    }

    #[test]
    fn bounds_hold_across_the_grid() {
        let grid: Vec<f64> = (0..=60).map(|i| -3.0 + i as f64 * 0.1).collect();
        for &theta in &grid {
            for &difficulty in &grid {
                for is_correct in [true, false] {
                    let update = update_theta(theta, is_correct, Some(difficulty));
                    let magnitude = update.change.abs();
                    assert!(
                        (MIN_STEP - EPS..=MAX_STEP + EPS).contains(&magnitude),
                        "step {magnitude} out of range at theta={theta} b={difficulty}"
                    );
                    assert_eq!(update.change > 0.0, is_correct);
                    assert!((THETA_MIN..=THETA_MAX).contains(&update.new_theta));
                }
            }
        }
    }

    #[test]
    fn repeated_updates_stay_bounded() {
        let mut theta = 2.95;
        for _ in 0..50 {
            theta = update_theta(theta, true, Some(3.0)).new_theta;
            assert!(theta <= THETA_MAX);
        }
        assert_eq!(theta, THETA_MAX);

        for _ in 0..200 {
            theta = update_theta(theta, false, Some(-3.0)).new_theta;
            assert!(theta >= THETA_MIN);
        }
        assert_eq!(theta, THETA_MIN);
    }
}
