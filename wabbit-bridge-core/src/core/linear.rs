// Built-in Linear Core
//
// Hashed linear model trained online with normalized squared-loss updates.
// Multiclass sessions keep one weight block per class and train each block
// one-against-all.

use tracing::{debug, info};

use crate::core::LearningCore;
use crate::core::options::CoreOptions;
use crate::core::text::{Label, TextExample, TextParser};
use crate::error::CoreFailure;
use crate::label::{LabelKind, RawPrediction};
use crate::session::{CoreFactory, ManagedSession, Session};

/// Hashed linear learner
#[derive(Debug)]
pub struct LinearCore {
    options: CoreOptions,
    parser: TextParser,
    weights: Vec<f32>,
    block: usize,
    examples: u64,
    updates: u64,
}

impl LinearCore {
    /// Build a core from a configuration string
    pub fn construct(config: &str) -> Result<Self, CoreFailure> {
        let options = CoreOptions::parse_str(config)?;
        let kind = options.label_kind();
        let classes = options.classes();

        let block = 1usize
            .checked_shl(options.bits as u32)
            .ok_or_else(|| CoreFailure::allocation("feature table size overflows usize"))?;
        let size = block
            .checked_mul(classes as usize)
            .ok_or_else(|| CoreFailure::allocation("weight table size overflows usize"))?;

        let mut weights = Vec::new();
        weights.try_reserve_exact(size)?;
        weights.resize(size, options.initial_weight);

        if !options.quiet {
            info!(label_kind = %kind, bits = options.bits, classes, "constructed linear core");
        }

        Ok(Self {
            parser: TextParser::new(kind, classes, options.bits),
            options,
            weights,
            block,
            examples: 0,
            updates: 0,
        })
    }

    /// Number of updates applied so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    fn score(&self, example: &TextExample, class: usize) -> f32 {
        let offset = class * self.block;
        example.features.iter().map(|f| self.weights[offset + f.index as usize] * f.value).sum()
    }

    fn update(&mut self, example: &TextExample, class: usize, error: f32) {
        let norm = example.squared_norm();
        if norm == 0.0 {
            return;
        }

        let step = self.options.learning_rate * example.importance * error / norm;
        let offset = class * self.block;
        for feature in &example.features {
            self.weights[offset + feature.index as usize] += step * feature.value;
        }
    }

    fn infer(&self, example: &TextExample) -> RawPrediction {
        match self.parser.kind {
            LabelKind::Scalar => {
                let base = match example.label {
                    Label::Scalar { base, .. } => base,
                    _ => 0.0,
                };
                RawPrediction::Scalar(base + self.score(example, 0))
            }
            LabelKind::Multiclass => {
                let scores: Vec<f32> =
                    (0..self.parser.classes as usize).map(|c| self.score(example, c)).collect();
                let best = scores
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (c, &s)| if s > best.1 { (c, s) } else { best })
                    .0;
                RawPrediction::Multiclass { class: best as u32 + 1, scores }
            }
        }
    }
}

impl LearningCore for LinearCore {
    type Example = TextExample;

    fn label_kind(&self) -> LabelKind {
        self.parser.kind
    }

    fn read_example(&mut self, text: &str) -> Result<TextExample, CoreFailure> {
        self.parser.parse(text)
    }

    fn learn(&mut self, example: &mut TextExample) -> Result<RawPrediction, CoreFailure> {
        let prediction = self.infer(example);

        match (&example.label, &prediction) {
            (Label::Unlabeled, _) => {}
            (Label::Scalar { value, .. }, RawPrediction::Scalar(predicted)) => {
                self.update(example, 0, value - predicted);
                self.updates += 1;
            }
            (Label::Class(label), RawPrediction::Multiclass { scores, .. }) => {
                for (class, score) in scores.iter().enumerate() {
                    let target = if class as u32 + 1 == *label { 1.0 } else { -1.0 };
                    self.update(example, class, target - score);
                }
                self.updates += 1;
            }
            (label, prediction) => {
                return Err(CoreFailure::runtime(format!(
                    "label {label:?} does not fit a {} prediction",
                    prediction.kind()
                )));
            }
        }

        Ok(prediction)
    }

    fn predict(&mut self, example: &mut TextExample) -> Result<RawPrediction, CoreFailure> {
        Ok(self.infer(example))
    }

    fn finish_example(&mut self, example: &mut TextExample) {
        example.features.clear();
        self.examples += 1;
    }

    fn finish(&mut self) -> Result<(), CoreFailure> {
        if self.options.quiet {
            debug!(examples = self.examples, updates = self.updates, "finished linear core");
        } else {
            info!(examples = self.examples, updates = self.updates, "finished linear core");
        }
        Ok(())
    }
}

/// Factory for sessions backed by [`LinearCore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFactory;

impl CoreFactory for LinearFactory {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn construct(&self, config: &str) -> Result<Box<dyn ManagedSession>, CoreFailure> {
        Ok(Box::new(Session::new(LinearCore::construct(config)?)))
    }
}
