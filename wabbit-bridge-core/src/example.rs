//! Per-call example ownership
//!
//! An [`Example`] borrows the core that parsed it and hands the parsed record
//! back through [`LearningCore::finish_example`] when dropped. Early returns,
//! `?` and unwinding all release it exactly once.

use tracing::trace;

use crate::core::LearningCore;
use crate::error::CoreFailure;

/// Parsed example scoped to one boundary call
pub struct Example<'c, C: LearningCore> {
    core: &'c mut C,
    parsed: C::Example,
}

impl<'c, C: LearningCore> Example<'c, C> {
    /// Parse `text` with the core's label parser
    ///
    /// On failure the core produced nothing, so there is nothing to release.
    pub fn decode(core: &'c mut C, text: &str) -> Result<Self, CoreFailure> {
        let parsed = core.read_example(text)?;
        Ok(Self { core, parsed })
    }

    /// Core and parsed record, for dispatch
    pub(crate) fn parts(&mut self) -> (&mut C, &mut C::Example) {
        (&mut *self.core, &mut self.parsed)
    }

    /// Hand the example back to its core
    pub fn release(self) {
        drop(self);
    }
}

impl<C: LearningCore> Drop for Example<'_, C> {
    fn drop(&mut self) {
        self.core.finish_example(&mut self.parsed);
        trace!("example released");
    }
}
