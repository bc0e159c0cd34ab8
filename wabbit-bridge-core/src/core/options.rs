//! Option grammar of the built-in core

use clap::Parser;

use crate::error::CoreFailure;
use crate::label::LabelKind;

/// Options accepted in a session configuration string
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "linear",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct CoreOptions {
    /// Label representation
    #[arg(long, value_enum)]
    pub label: Option<LabelKind>,

    /// One-against-all multiclass over N classes
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(2..))]
    pub oaa: Option<u32>,

    /// Number of bits in the feature table
    #[arg(short = 'b', long = "bit_precision", default_value_t = 18,
          value_parser = clap::value_parser!(u8).range(1..=32))]
    pub bits: u8,

    /// Step size of each update
    #[arg(short = 'l', long = "learning_rate", default_value_t = 0.5)]
    pub learning_rate: f32,

    /// Value every weight starts from
    #[arg(long = "initial_weight", default_value_t = 0.0, allow_negative_numbers = true)]
    pub initial_weight: f32,

    /// Suppress progress logging
    #[arg(long)]
    pub quiet: bool,
}

impl CoreOptions {
    /// Parse a whitespace-separated configuration string
    pub fn parse_str(config: &str) -> Result<Self, CoreFailure> {
        let options = Self::try_parse_from(config.split_whitespace())?;
        options.validate()?;
        Ok(options)
    }

    /// Label kind these options select
    pub fn label_kind(&self) -> LabelKind {
        match (self.label, self.oaa) {
            (Some(kind), _) => kind,
            (None, Some(_)) => LabelKind::Multiclass,
            (None, None) => LabelKind::Scalar,
        }
    }

    /// Number of scorers the model keeps
    pub fn classes(&self) -> u32 {
        self.oaa.unwrap_or(1)
    }

    fn validate(&self) -> Result<(), CoreFailure> {
        match (self.label, self.oaa) {
            (Some(LabelKind::Multiclass), None) => {
                Err(CoreFailure::options("--label multiclass requires --oaa <N>"))
            }
            (Some(LabelKind::Scalar), Some(_)) => {
                Err(CoreFailure::options("--oaa cannot be combined with --label scalar"))
            }
            _ if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 => {
                Err(CoreFailure::options("--learning_rate must be a positive number"))
            }
            _ if !self.initial_weight.is_finite() => {
                Err(CoreFailure::options("--initial_weight must be finite"))
            }
            _ => Ok(()),
        }
    }
}
