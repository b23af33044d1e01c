use std::{error::Error, fmt, marker::PhantomData, sync::Arc};

use crate::common::error::ErrorObject;

/// The data source a cache falls back to when a value is missing.
///
/// The loader is called by at most one thread per key at a time, without any
/// engine lock held. A returned error is stored in the entry and handed out to
/// every reader until the entry is written or expires.
pub trait Loader<K, V>: Send + Sync + 'static {
    fn load(&self, key: &K) -> Result<V, ErrorObject>;
}

/// Adapts a closure returning any error type to a [`Loader`].
pub(crate) struct FnLoader<F, E> {
    f: F,
    _marker: PhantomData<fn() -> E>,
}

impl<F, E> FnLoader<F, E> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<K, V, F, E> Loader<K, V> for FnLoader<F, E>
where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: Error + Send + Sync + 'static,
{
    fn load(&self, key: &K) -> Result<V, ErrorObject> {
        (self.f)(key).map_err(|e| Arc::new(e) as ErrorObject)
    }
}

impl<F, E> fmt::Debug for FnLoader<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{FnLoader, Loader};

    #[derive(thiserror::Error, Debug)]
    #[error("odd key {0}")]
    struct OddKey(u32);

    #[test]
    fn closure_errors_are_erased() {
        let loader = FnLoader::<_, OddKey>::new(|k: &u32| {
            if k % 2 == 0 {
                Ok(k * 2)
            } else {
                Err(OddKey(*k))
            }
        });
        assert_eq!(Loader::<u32, u32>::load(&loader, &2).unwrap(), 4);
        let err = Loader::<u32, u32>::load(&loader, &3).unwrap_err();
        assert_eq!(err.to_string(), "odd key 3");
    }
}
