//! Entry processors: user functions that read and mutate a single entry while
//! holding its processing right.

use std::{
    error::Error,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use super::{
    progress::{ExaminationEntry, Progress},
    semantic::{Semantic, SemanticKind},
};
use crate::{
    common::{
        error::{CacheError, ErrorObject, PanicError},
        time::Instant,
    },
    entry::{Entry, ValueOrError},
    expiry::ExpiryTime,
};

/// The error type of entry processors.
///
/// Any `std::error::Error` converts into it, so a processor can use `?`.
/// Errors end up in [`CacheError::Processing`], except for loader failures
/// returned by [`MutableEntry::value`], which stay [`CacheError::Loader`].
pub struct ProcessorError {
    kind: ProcessorErrorKind,
}

enum ProcessorErrorKind {
    // Not an error: asks the engine to load the value and run the processor
    // again.
    Restart,
    Load(ErrorObject),
    Failed(ErrorObject),
}

impl ProcessorError {
    pub fn new(error: ErrorObject) -> Self {
        Self {
            kind: ProcessorErrorKind::Failed(error),
        }
    }

    fn restart() -> Self {
        Self {
            kind: ProcessorErrorKind::Restart,
        }
    }

    fn load(error: ErrorObject) -> Self {
        Self {
            kind: ProcessorErrorKind::Load(error),
        }
    }
}

impl<E> From<E> for ProcessorError
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(Arc::new(error) as ErrorObject)
    }
}

impl fmt::Debug for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProcessorErrorKind::Restart => f.write_str("ProcessorError::Restart"),
            ProcessorErrorKind::Load(e) => f.debug_tuple("ProcessorError::Load").field(e).finish(),
            ProcessorErrorKind::Failed(e) => {
                f.debug_tuple("ProcessorError::Failed").field(e).finish()
            }
        }
    }
}

enum EntryMutation<V> {
    Set(V),
    Remove,
    Expire(ExpiryTime),
}

/// The entry handed to an entry processor.
///
/// Mutations are recorded and applied after the processor returns `Ok`. A
/// processor that fails or panics leaves the entry unchanged.
pub struct MutableEntry<'a, K, V> {
    entry: &'a Entry<K, V>,
    now: Instant,
    read_through: bool,
    was_loaded: bool,
    value_read: bool,
    mutation: Option<EntryMutation<V>>,
}

impl<'a, K, V> MutableEntry<'a, K, V> {
    fn new(entry: &'a Entry<K, V>, now: Instant, read_through: bool, was_loaded: bool) -> Self {
        Self {
            entry,
            now,
            read_through,
            was_loaded,
            value_read: false,
            mutation: None,
        }
    }

    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Returns `true` if the entry holds a value, taking the mutations done by
    /// this processor into account.
    pub fn exists(&self) -> bool {
        match &self.mutation {
            Some(EntryMutation::Set(_)) => true,
            Some(EntryMutation::Remove) => false,
            _ => self.entry.is_present(self.now),
        }
    }

    /// Returns `true` if the value was loaded for this processor run.
    pub fn was_loaded(&self) -> bool {
        self.was_loaded
    }

    /// Returns the value, counting the access as a hit or a miss.
    ///
    /// With read-through enabled, a missing value is loaded first; the
    /// processor is then run again from the start. Return the error with `?`
    /// so the engine can do that.
    pub fn value(&mut self) -> Result<Option<V>, ProcessorError>
    where
        V: Clone,
    {
        if self.mutation.is_none()
            && !self.entry.is_present(self.now)
            && self.read_through
            && !self.was_loaded
        {
            return Err(ProcessorError::restart());
        }
        self.value_read = true;
        self.peek_value()
    }

    /// Returns the value without loading it and without counting the access.
    pub fn peek_value(&self) -> Result<Option<V>, ProcessorError>
    where
        V: Clone,
    {
        match &self.mutation {
            Some(EntryMutation::Set(v)) => return Ok(Some(v.clone())),
            Some(EntryMutation::Remove) => return Ok(None),
            _ => {}
        }
        if !self.entry.is_present(self.now) {
            return Ok(None);
        }
        match self.entry.value_or_error() {
            Some(ValueOrError::Value(v)) => Ok(Some(v)),
            Some(ValueOrError::Failure(e)) => Err(ProcessorError::load(e)),
            None => Ok(None),
        }
    }

    pub fn set_value(&mut self, value: V) {
        self.mutation = Some(EntryMutation::Set(value));
    }

    pub fn remove(&mut self) {
        self.mutation = Some(EntryMutation::Remove);
    }

    /// Changes the expiry of the entry. Replaces a pending `set_value` or
    /// `remove`.
    pub fn set_expiry(&mut self, expiry: ExpiryTime) {
        self.mutation = Some(EntryMutation::Expire(expiry));
    }
}

/// Runs an entry processor.
pub(crate) struct Invoke<F> {
    processor: F,
    read_through: bool,
}

impl<F> Invoke<F> {
    pub(crate) fn new(processor: F, read_through: bool) -> Self {
        Self {
            processor,
            read_through,
        }
    }
}

impl<K, V, R, F> Semantic<K, V> for Invoke<F>
where
    V: Clone,
    F: FnMut(&mut MutableEntry<'_, K, V>) -> Result<R, ProcessorError>,
{
    type Output = R;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, R>, e: &ExaminationEntry<'_, K, V>) {
        let entry = e
            .entry()
            .expect("Bug: entry processors always run on an entry");
        let mut me = MutableEntry::new(entry, e.now(), self.read_through, c.was_loaded());

        let processor = &mut self.processor;
        let result = catch_unwind(AssertUnwindSafe(|| processor(&mut me)));
        match result {
            Err(payload) => {
                let error = PanicError::from_payload(payload);
                c.failure(CacheError::Processing(Arc::new(error)));
            }
            Ok(Err(ProcessorError { kind })) => match kind {
                ProcessorErrorKind::Restart => {
                    // The read that asked for the load is the miss.
                    c.is_present_or_miss();
                    c.load_and_restart();
                }
                ProcessorErrorKind::Load(error) => c.failure(CacheError::Loader(error)),
                ProcessorErrorKind::Failed(error) => c.failure(CacheError::Processing(error)),
            },
            Ok(Ok(result)) => {
                if me.value_read && !c.was_loaded() {
                    c.is_present_or_miss();
                }
                match me.mutation.take() {
                    Some(EntryMutation::Set(v)) => c.put(v),
                    Some(EntryMutation::Remove) => c.remove(),
                    Some(EntryMutation::Expire(t)) => c.expire(t),
                    None => {}
                }
                c.result(result);
            }
        }
    }
}
