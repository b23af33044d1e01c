use std::{error::Error, sync::Arc};

/// A shared, type-erased error. Loader failures are stored in the entry as an
/// `ErrorObject` so every subsequent read of that entry observes the same
/// failure without calling the loader again.
pub type ErrorObject = Arc<dyn Error + Send + Sync + 'static>;

/// The error type returned by the cache operations.
#[derive(thiserror::Error, Debug, Clone)]
pub enum CacheError {
    /// The cache has been closed by [`Cache::close`][close]. Every operation
    /// issued afterwards fails with this error.
    ///
    /// [close]: ./struct.Cache.html#method.close
    #[error("the cache is closed")]
    Closed,

    /// The loader failed to produce a value for the key. The failure is kept
    /// in the entry until a later mutation replaces it.
    #[error("the loader failed: {0}")]
    Loader(ErrorObject),

    /// An entry processor or a `compute_if_absent` function failed or
    /// panicked.
    #[error("the entry processing failed: {0}")]
    Processing(ErrorObject),

    /// The operation needs to load a value but the cache was built without a
    /// loader.
    #[error(
        "no loader is configured for this cache. \
    Please set one by calling the loader method of the builder"
    )]
    LoaderNotConfigured,
}

impl CacheError {
    /// Returns the failure of the loader or of the entry processor, if any.
    pub fn inner(&self) -> Option<&ErrorObject> {
        match self {
            CacheError::Loader(e) | CacheError::Processing(e) => Some(e),
            _ => None,
        }
    }
}

/// A broken internal invariant found by [`Cache::check_integrity`][check].
///
/// [check]: ./struct.Cache.html#method.check_integrity
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("the cache is closed")]
    Closed,

    /// The number of entries found by walking the hash chains, the number
    /// tracked by the table and the number tracked by the replacement
    /// strategy disagree.
    #[error(
        "entry counts disagree: {scanned} in the hash chains, \
    {tracked} tracked by the table, {replacement} in the replacement strategy"
    )]
    SizeMismatch {
        scanned: usize,
        tracked: usize,
        replacement: usize,
    },

    /// Some keys are held by more than one live entry.
    #[error("{0} entries share their key with another entry")]
    DuplicateKeys(usize),
}

impl From<CacheError> for IntegrityError {
    fn from(_: CacheError) -> Self {
        // Table scans only fail once the table is closed.
        Self::Closed
    }
}

/// The payload of a panic raised by a user supplied function, turned into an
/// error so that it can be reported through `CacheError::Processing`.
#[derive(thiserror::Error, Debug)]
#[error("panicked: {0}")]
pub(crate) struct PanicError(pub(crate) String);

impl PanicError {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(thiserror::Error, Debug)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn inner_error_is_shared() {
        let err = CacheError::Loader(Arc::new(Boom));
        let cloned = err.clone();
        match (err.inner(), cloned.inner()) {
            (Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected inner errors"),
        }
        assert_eq!(err.to_string(), "the loader failed: boom");
        assert!(CacheError::Closed.inner().is_none());
    }

    #[test]
    fn panic_payloads() {
        let e = PanicError::from_payload(Box::new("static"));
        assert_eq!(e.0, "static");
        let e = PanicError::from_payload(Box::new(String::from("owned")));
        assert_eq!(e.0, "owned");
        let e = PanicError::from_payload(Box::new(42));
        assert_eq!(e.0, "unknown panic payload");
    }
}
