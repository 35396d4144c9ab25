use std::future::Future;

/// Exclusivity policy for all actions of one concrete type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Unlimited concurrent instances.
    #[default]
    Parallel,
    /// One instance at a time; later submissions wait in a FIFO lane.
    Sequential,
    /// One instance at a time; submissions made while one runs are dropped.
    Solo,
}

pub type ActionResult = anyhow::Result<()>;

/// One unit of work.
///
/// The concrete type is the exclusivity key: every value of the same type
/// shares one solo slot and one sequential lane.
///
/// ```rust
/// use ripple_exec::{Action, ActionResult, RunMode};
///
/// struct SaveDraft {
///     text: String,
/// }
///
/// impl Action for SaveDraft {
///     fn mode(&self) -> RunMode {
///         RunMode::Sequential
///     }
///
///     async fn run(self) -> ActionResult {
///         anyhow::ensure!(!self.text.is_empty(), "empty draft");
///         Ok(())
///     }
/// }
/// ```
pub trait Action: 'static {
    fn mode(&self) -> RunMode {
        RunMode::Parallel
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn run(self) -> impl Future<Output = ActionResult> + 'static;
}
