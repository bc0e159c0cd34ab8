// Session Lifecycle
//
// A session owns one configured learning core. The registry hands out opaque
// handles for sessions and is the only owner; boundary calls borrow a session
// for their own duration and never keep it.

use tracing::trace;

use crate::core::LearningCore;
use crate::dispatch::{self, Mode};
use crate::error::{BridgeResult, CoreFailure};
use crate::example::Example;
use crate::label::{LabelKind, extract};

pub mod registry;

#[cfg(test)]
mod tests;

pub use registry::{SessionHandle, SessionInfo, SessionRegistry};

/// Object-safe view of a session stored behind a handle
pub trait ManagedSession: Send + Sync {
    /// Label kind fixed at construction
    fn label_kind(&self) -> LabelKind;

    /// Decode `text`, learn or predict, extract the prediction
    fn predict_or_learn(&mut self, text: &str, mode: Mode) -> BridgeResult<f32>;

    /// Flush and release the core
    fn close(self: Box<Self>) -> BridgeResult<()>;
}

/// Builds sessions from configuration strings
pub trait CoreFactory: Send + Sync {
    /// Name reported in session info
    fn name(&self) -> &'static str;

    /// Construct a core and wrap it in a session
    fn construct(&self, config: &str) -> Result<Box<dyn ManagedSession>, CoreFailure>;
}

/// One configured core and its label kind
pub struct Session<C: LearningCore> {
    core: C,
    kind: LabelKind,
}

impl<C: LearningCore> Session<C> {
    pub fn new(core: C) -> Self {
        let kind = core.label_kind();
        Self { core, kind }
    }

    /// Run one example through the core
    ///
    /// The example is released before this returns, on every path.
    pub fn run(&mut self, text: &str, mode: Mode) -> BridgeResult<f32> {
        let mut example = Example::decode(&mut self.core, text)?;
        let raw = dispatch::run(&mut example, mode)?;
        let prediction = extract(&raw, self.kind)?;
        example.release();

        trace!(?mode, prediction, "example processed");
        Ok(prediction)
    }
}

impl<C: LearningCore + 'static> ManagedSession for Session<C> {
    fn label_kind(&self) -> LabelKind {
        self.kind
    }

    fn predict_or_learn(&mut self, text: &str, mode: Mode) -> BridgeResult<f32> {
        self.run(text, mode)
    }

    fn close(mut self: Box<Self>) -> BridgeResult<()> {
        self.core.finish()?;
        Ok(())
    }
}
