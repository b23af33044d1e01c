//! The built-in semantics behind the methods of `Cache`.

use std::{
    marker::PhantomData,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use super::{
    progress::{ExaminationEntry, Progress},
    semantic::{Semantic, SemanticKind},
};
use crate::{
    common::{
        entry::CacheEntry,
        error::{CacheError, PanicError},
    },
    expiry::ExpiryTime,
};

/// Ends the operation with the value of a present entry.
fn return_value<K, V: Clone, R>(
    c: &mut Progress<'_, K, V, R>,
    e: &ExaminationEntry<'_, K, V>,
    f: impl FnOnce(V) -> R,
) where
    R: Default,
{
    match e.value() {
        Some(Ok(v)) => c.result(f(v)),
        Some(Err(err)) => c.failure(err),
        None => c.result(R::default()),
    }
}

fn return_entry<K, V: Clone>(
    c: &mut Progress<'_, K, V, Option<CacheEntry<K, V>>>,
    e: &ExaminationEntry<'_, K, V>,
    is_fresh: bool,
) {
    let Some(key) = e.key_arc() else {
        c.result(None);
        return;
    };
    let key = Arc::clone(key);
    let expires_in = e.expires_in();
    return_value(c, e, |v| Some(CacheEntry::new(key, v, expires_in, is_fresh)));
}

fn same_value<K, V>(e: &ExaminationEntry<'_, K, V>, expected: &V) -> bool
where
    V: Clone + PartialEq,
{
    matches!(e.value(), Some(Ok(ref v)) if v == expected)
}

/// Returns the value if present. Never loads.
pub(crate) struct Peek;

impl<K, V: Clone> Semantic<K, V> for Peek {
    type Output = Option<V>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Read
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, Option<V>>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() {
            return_value(c, e, Some);
        } else {
            c.result(None);
        }
    }
}

/// Returns the value, loading it when missing and refreshing it when it is in
/// refresh probation.
pub(crate) struct Get;

impl<K, V: Clone> Semantic<K, V> for Get {
    type Output = Option<V>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, Option<V>>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() {
            return_value(c, e, Some);
        } else {
            c.want_mutation();
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, Option<V>>, _e: &ExaminationEntry<'_, K, V>) {
        if c.is_in_refresh_probation() {
            c.refresh();
        } else {
            c.load();
        }
    }

    fn loaded(&mut self, c: &mut Progress<'_, K, V, Option<V>>, e: &ExaminationEntry<'_, K, V>) {
        return_value(c, e, Some);
    }
}

/// `Get` returning a snapshot of the entry.
pub(crate) struct GetEntry;

impl<K, V: Clone> Semantic<K, V> for GetEntry {
    type Output = Option<CacheEntry<K, V>>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(
        &mut self,
        c: &mut Progress<'_, K, V, Self::Output>,
        e: &ExaminationEntry<'_, K, V>,
    ) {
        if c.is_present_or_miss() {
            return_entry(c, e, false);
        } else {
            c.want_mutation();
        }
    }

    fn update(
        &mut self,
        c: &mut Progress<'_, K, V, Self::Output>,
        _e: &ExaminationEntry<'_, K, V>,
    ) {
        if c.is_in_refresh_probation() {
            c.refresh();
        } else {
            c.load();
        }
    }

    fn loaded(&mut self, c: &mut Progress<'_, K, V, Self::Output>, e: &ExaminationEntry<'_, K, V>) {
        return_entry(c, e, true);
    }
}

/// `Peek` returning a snapshot of the entry.
pub(crate) struct PeekEntry;

impl<K, V: Clone> Semantic<K, V> for PeekEntry {
    type Output = Option<CacheEntry<K, V>>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Read
    }

    fn examine(
        &mut self,
        c: &mut Progress<'_, K, V, Self::Output>,
        e: &ExaminationEntry<'_, K, V>,
    ) {
        if c.is_present_or_miss() {
            return_entry(c, e, false);
        } else {
            c.result(None);
        }
    }
}

pub(crate) struct Put<V> {
    value: Option<V>,
}

impl<V> Put<V> {
    pub(crate) fn new(value: V) -> Self {
        Self { value: Some(value) }
    }
}

impl<K, V> Semantic<K, V> for Put<V> {
    type Output = ();

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, ()>, _e: &ExaminationEntry<'_, K, V>) {
        if let Some(value) = self.value.take() {
            c.put(value);
        }
        c.result(());
    }
}

pub(crate) struct Remove;

impl<K, V> Semantic<K, V> for Remove {
    type Output = ();

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, ()>, e: &ExaminationEntry<'_, K, V>) {
        if e.exists() {
            c.remove();
        }
        c.result(());
    }
}

pub(crate) struct Contains;

impl<K, V> Semantic<K, V> for Contains {
    type Output = bool;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Read
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, bool>, _e: &ExaminationEntry<'_, K, V>) {
        let present = c.is_present();
        c.result(present);
    }
}

/// Removes the entry. Returns whether a value was present.
pub(crate) struct ContainsAndRemove;

impl<K, V> Semantic<K, V> for ContainsAndRemove {
    type Output = bool;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, bool>, e: &ExaminationEntry<'_, K, V>) {
        let present = c.is_present();
        if e.exists() {
            c.remove();
        }
        c.result(present);
    }
}

/// Removes the entry. Returns the value that was present.
pub(crate) struct PeekAndRemove;

impl<K, V: Clone> Semantic<K, V> for PeekAndRemove {
    type Output = Option<V>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, Option<V>>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() {
            return_value(c, e, Some);
        } else {
            c.result(None);
        }
        if e.exists() {
            c.remove();
        }
    }
}

/// Replaces a present value. Returns the previous one.
pub(crate) struct PeekAndReplace<V> {
    value: Option<V>,
}

impl<V> PeekAndReplace<V> {
    pub(crate) fn new(value: V) -> Self {
        Self { value: Some(value) }
    }
}

impl<K, V: Clone> Semantic<K, V> for PeekAndReplace<V> {
    type Output = Option<V>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, Option<V>>, _e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() {
            c.want_mutation();
        } else {
            c.result(None);
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, Option<V>>, e: &ExaminationEntry<'_, K, V>) {
        return_value(c, e, Some);
        if let Some(value) = self.value.take() {
            c.put(value);
        }
    }
}

/// Stores the value. Returns the previous one.
pub(crate) struct PeekAndPut<V> {
    value: Option<V>,
}

impl<V> PeekAndPut<V> {
    pub(crate) fn new(value: V) -> Self {
        Self { value: Some(value) }
    }
}

impl<K, V: Clone> Semantic<K, V> for PeekAndPut<V> {
    type Output = Option<V>;

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, Option<V>>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() {
            return_value(c, e, Some);
        } else {
            c.result(None);
        }
        if let Some(value) = self.value.take() {
            c.put(value);
        }
    }
}

/// Returns the present value, or stores and returns the one computed by the
/// function.
pub(crate) struct ComputeIfAbsent<F, V> {
    compute: Option<F>,
    _marker: PhantomData<fn() -> V>,
}

impl<F, V> ComputeIfAbsent<F, V> {
    pub(crate) fn new(compute: F) -> Self {
        Self {
            compute: Some(compute),
            _marker: PhantomData,
        }
    }
}

impl<K, V, F> Semantic<K, V> for ComputeIfAbsent<F, V>
where
    V: Clone,
    F: FnOnce() -> V,
{
    type Output = V;

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, V>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() {
            match e.value() {
                Some(Ok(v)) => c.result(v),
                Some(Err(err)) => c.failure(err),
                None => c.want_mutation(),
            }
        } else {
            c.want_mutation();
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, V>, _e: &ExaminationEntry<'_, K, V>) {
        let Some(compute) = self.compute.take() else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(compute)) {
            Ok(value) => {
                c.result(value.clone());
                c.put(value);
            }
            Err(payload) => {
                let error = PanicError::from_payload(payload);
                c.failure(CacheError::Processing(Arc::new(error)));
            }
        }
    }
}

/// Stores the value unless one is present. Returns whether it was stored.
pub(crate) struct PutIfAbsent<V> {
    value: Option<V>,
}

impl<V> PutIfAbsent<V> {
    pub(crate) fn new(value: V) -> Self {
        Self { value: Some(value) }
    }
}

impl<K, V> Semantic<K, V> for PutIfAbsent<V> {
    type Output = bool;

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, bool>, _e: &ExaminationEntry<'_, K, V>) {
        if c.is_present() {
            c.result(false);
        } else {
            c.want_mutation();
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, bool>, _e: &ExaminationEntry<'_, K, V>) {
        match self.value.take() {
            Some(value) => {
                c.put(value);
                c.result(true);
            }
            None => c.result(false),
        }
    }
}

/// Replaces a present value. Returns whether it was replaced.
pub(crate) struct Replace<V> {
    value: Option<V>,
}

impl<V> Replace<V> {
    pub(crate) fn new(value: V) -> Self {
        Self { value: Some(value) }
    }
}

impl<K, V> Semantic<K, V> for Replace<V> {
    type Output = bool;

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, bool>, _e: &ExaminationEntry<'_, K, V>) {
        // Counts as a hit or a miss, like a read.
        if c.is_present_or_miss() {
            c.want_mutation();
        } else {
            c.result(false);
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, bool>, _e: &ExaminationEntry<'_, K, V>) {
        match self.value.take() {
            Some(value) => {
                c.put(value);
                c.result(true);
            }
            None => c.result(false),
        }
    }
}

/// Replaces the value only if it equals `expected` once the entry is locked.
pub(crate) struct ReplaceIfEquals<V> {
    expected: V,
    value: Option<V>,
}

impl<V> ReplaceIfEquals<V> {
    pub(crate) fn new(expected: V, value: V) -> Self {
        Self {
            expected,
            value: Some(value),
        }
    }
}

impl<K, V> Semantic<K, V> for ReplaceIfEquals<V>
where
    V: Clone + PartialEq,
{
    type Output = bool;

    fn kind(&self) -> SemanticKind {
        SemanticKind::UpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, bool>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() && same_value(e, &self.expected) {
            c.want_mutation();
        } else {
            c.result(false);
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, bool>, e: &ExaminationEntry<'_, K, V>) {
        // The examination above may have been stale; compare again now that
        // no other operation can change the entry.
        if c.is_present() && same_value(e, &self.expected) {
            if let Some(value) = self.value.take() {
                c.put(value);
                c.result(true);
                return;
            }
        }
        c.result(false);
    }
}

/// Removes the entry only if its value equals `expected` once the entry is
/// locked.
pub(crate) struct RemoveIfEquals<'v, V> {
    expected: &'v V,
}

impl<'v, V> RemoveIfEquals<'v, V> {
    pub(crate) fn new(expected: &'v V) -> Self {
        Self { expected }
    }
}

impl<K, V> Semantic<K, V> for RemoveIfEquals<'_, V>
where
    V: Clone + PartialEq,
{
    type Output = bool;

    fn kind(&self) -> SemanticKind {
        SemanticKind::UpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, bool>, e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_miss() && same_value(e, self.expected) {
            c.want_mutation();
        } else {
            c.result(false);
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, bool>, e: &ExaminationEntry<'_, K, V>) {
        let matched = c.is_present() && same_value(e, self.expected);
        if matched {
            c.remove();
        }
        c.result(matched);
    }
}

/// Changes the expiry of an entry that holds data.
pub(crate) struct Expire {
    expiry: ExpiryTime,
}

impl Expire {
    pub(crate) fn new(expiry: ExpiryTime) -> Self {
        Self { expiry }
    }
}

impl<K, V> Semantic<K, V> for Expire {
    type Output = ();

    fn kind(&self) -> SemanticKind {
        SemanticKind::MightUpdateExisting
    }

    fn examine(&mut self, c: &mut Progress<'_, K, V, ()>, _e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_in_refresh_probation() {
            c.want_mutation();
        } else {
            c.result(());
        }
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, ()>, _e: &ExaminationEntry<'_, K, V>) {
        c.expire(self.expiry);
        c.result(());
    }
}

/// Loads the value again, whether or not one is present.
pub(crate) struct Refresh;

impl<K, V> Semantic<K, V> for Refresh {
    type Output = ();

    fn kind(&self) -> SemanticKind {
        SemanticKind::Update
    }

    fn update(&mut self, c: &mut Progress<'_, K, V, ()>, _e: &ExaminationEntry<'_, K, V>) {
        if c.is_present_or_in_refresh_probation() {
            c.refresh();
        } else {
            c.load();
        }
    }

    fn loaded(&mut self, c: &mut Progress<'_, K, V, ()>, _e: &ExaminationEntry<'_, K, V>) {
        c.result(());
    }
}
