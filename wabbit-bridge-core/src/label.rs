//! Label kinds and prediction extraction

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BridgeResult, CoreFailure, ErrorEnvelope};

/// Label representation a session is configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    /// Real-valued label, scalar prediction
    Scalar,
    /// Class index in `1..=k`, class prediction
    Multiclass,
}

impl LabelKind {
    /// Code used by native cores
    pub fn code(self) -> u32 {
        match self {
            LabelKind::Scalar => 0,
            LabelKind::Multiclass => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LabelKind::Scalar => "scalar",
            LabelKind::Multiclass => "multiclass",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for LabelKind {
    type Error = CoreFailure;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(LabelKind::Scalar),
            1 => Ok(LabelKind::Multiclass),
            other => Err(CoreFailure::runtime(format!("unsupported label kind code {other}"))),
        }
    }
}

/// Prediction computed by a core for one example
#[derive(Debug, Clone, PartialEq)]
pub enum RawPrediction {
    Scalar(f32),
    Multiclass {
        /// Winning class, 1-based
        class: u32,
        /// Per-class scores, may be empty
        scores: Vec<f32>,
    },
}

impl RawPrediction {
    /// Label kind this prediction was computed for
    pub fn kind(&self) -> LabelKind {
        match self {
            RawPrediction::Scalar(_) => LabelKind::Scalar,
            RawPrediction::Multiclass { .. } => LabelKind::Multiclass,
        }
    }
}

/// Read the field of `raw` that is valid for `kind`
///
/// A prediction of the wrong shape is a contract violation between core and
/// session and is reported, never defaulted.
pub fn extract(raw: &RawPrediction, kind: LabelKind) -> BridgeResult<f32> {
    match (kind, raw) {
        (LabelKind::Scalar, RawPrediction::Scalar(value)) => Ok(*value),
        (LabelKind::Multiclass, RawPrediction::Multiclass { class, .. }) => Ok(*class as f32),
        (LabelKind::Scalar, RawPrediction::Multiclass { .. })
        | (LabelKind::Multiclass, RawPrediction::Scalar(_)) => Err(ErrorEnvelope::runtime(format!(
            "core returned a {} prediction for a {} session",
            raw.kind(),
            kind
        ))),
    }
}
