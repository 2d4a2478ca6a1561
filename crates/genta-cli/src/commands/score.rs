//! The `genta score` command.

use anyhow::Result;

use genta_core::model::{THETA_MAX, THETA_MIN};
use genta_core::scoring::update_theta;

pub fn execute(theta: f64, difficulty: Option<f64>, correct: bool) -> Result<()> {
    anyhow::ensure!(
        (THETA_MIN..=THETA_MAX).contains(&theta),
        "theta must be between {THETA_MIN} and {THETA_MAX}"
    );

    let update = update_theta(theta, correct, difficulty);
    let outcome = if correct { "correct" } else { "incorrect" };

    println!("Answer:    {outcome}");
    println!("Theta:     {theta:.4} -> {:.4}", update.new_theta);
    println!("Change:    {:+.4}", update.change);

    Ok(())
}
