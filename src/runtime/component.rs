//! Component contract for the cooperative scheduler

use crate::error::UplinkResult;

/// Lifecycle position of a component inside an [`super::Application`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    NotInitialized,
    Initialized,
    Active,
    ToRemove,
}

/// Unit of work ticked once per scheduler pass
///
/// `init` runs once, then `post_init` once every component of the same batch is
/// initialized, then `tick` on every pass. An `Err` from any step aborts the
/// owning application.
pub trait Component {
    fn name(&self) -> &str;

    fn init(&mut self) -> UplinkResult<()> {
        Ok(())
    }

    /// Wire up to other components; all of them have run `init` by now.
    fn post_init(&mut self) -> UplinkResult<()> {
        Ok(())
    }

    fn tick(&mut self) -> UplinkResult<()>;

    /// Checked after every tick; true removes the component.
    fn wants_removal(&self) -> bool {
        false
    }
}
