// Learning Core Contract
//
// The bridge never learns anything itself. It drives a core through this
// trait: construct it from a configuration string, read examples with the
// core's label parser, learn or predict, hand every example back, finish.

use crate::error::CoreFailure;
use crate::label::{LabelKind, RawPrediction};

pub mod linear;
pub mod native;
pub mod options;
pub mod text;

pub use linear::{LinearCore, LinearFactory};
pub use native::{NativeCore, NativeLibrary};
pub use options::CoreOptions;

/// One configured learner instance
///
/// Implementations are not reentrant: every mutating call takes `&mut self`
/// and the session holding the core is responsible for exclusivity.
/// Resources are released when the core is dropped.
pub trait LearningCore: Send + Sync {
    /// Parsed example as the core represents it
    type Example: Send;

    /// Label kind chosen at construction, fixed for the core's lifetime
    fn label_kind(&self) -> LabelKind;

    /// Parse one text record with the label parser for [`Self::label_kind`]
    fn read_example(&mut self, text: &str) -> Result<Self::Example, CoreFailure>;

    /// Predict, then update the model from the example's label
    fn learn(&mut self, example: &mut Self::Example) -> Result<RawPrediction, CoreFailure>;

    /// Predict without touching model state
    fn predict(&mut self, example: &mut Self::Example) -> Result<RawPrediction, CoreFailure>;

    /// Return an example to the core once the call is done with it
    fn finish_example(&mut self, example: &mut Self::Example);

    /// Flush pending state before the core is dropped
    fn finish(&mut self) -> Result<(), CoreFailure> {
        Ok(())
    }
}
