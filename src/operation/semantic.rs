use super::progress::{ExaminationEntry, Progress};

/// How far a semantic may go beyond examining an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SemanticKind {
    /// Only examines. Never takes the processing right of the entry.
    Read,
    /// Skips the examination and always runs the update step.
    Update,
    /// Examines, then updates. The update step may decide to do nothing when
    /// its precondition no longer holds once the entry is locked.
    UpdateExisting,
    /// Examines, and asks for the update step only when it is needed.
    MightUpdateExisting,
}

/// The decision logic of one cache operation.
///
/// The engine runs `examine` without locking the entry. If it asks for a
/// mutation, the engine takes the processing right of the entry, runs
/// `examine` again on the now stable entry and, if a mutation is still
/// wanted, runs `update`. When `update` requested a load, `loaded` runs after
/// the value was stored.
///
/// Every path must end with [`Progress::result`] or [`Progress::failure`].
pub trait Semantic<K, V> {
    type Output;

    fn kind(&self) -> SemanticKind;

    fn examine(
        &mut self,
        c: &mut Progress<'_, K, V, Self::Output>,
        _e: &ExaminationEntry<'_, K, V>,
    ) {
        c.want_mutation();
    }

    fn update(
        &mut self,
        _c: &mut Progress<'_, K, V, Self::Output>,
        _e: &ExaminationEntry<'_, K, V>,
    ) {
    }

    fn loaded(
        &mut self,
        _c: &mut Progress<'_, K, V, Self::Output>,
        _e: &ExaminationEntry<'_, K, V>,
    ) {
    }
}
