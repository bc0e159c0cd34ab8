//! Learn/predict dispatch

use serde::{Deserialize, Serialize};

use crate::core::LearningCore;
use crate::error::CoreFailure;
use crate::example::Example;
use crate::label::RawPrediction;

/// What a call does with its example
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Predict, then update the model
    Learn,
    /// Predict only
    Predict,
}

impl Mode {
    pub fn from_learn_flag(learn: bool) -> Self {
        if learn { Mode::Learn } else { Mode::Predict }
    }
}

/// Run the core's update-or-infer operation on one example
pub fn run<C: LearningCore>(
    example: &mut Example<'_, C>,
    mode: Mode,
) -> Result<RawPrediction, CoreFailure> {
    let (core, parsed) = example.parts();
    match mode {
        Mode::Learn => core.learn(parsed),
        Mode::Predict => core.predict(parsed),
    }
}
