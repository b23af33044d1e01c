use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    entry::{Entry, ValueOrError},
    notification::{RemovalCause, RemovalListener},
};

pub(crate) struct RemovalNotifier<K, V> {
    listener: RemovalListener<K, V>,
    is_enabled: AtomicBool,
    #[cfg(feature = "logging")]
    cache_name: Option<String>,
}

impl<K, V> RemovalNotifier<K, V> {
    pub(crate) fn new(listener: RemovalListener<K, V>, _cache_name: Option<String>) -> Self {
        Self {
            listener,
            is_enabled: AtomicBool::new(true),
            #[cfg(feature = "logging")]
            cache_name: _cache_name,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.is_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn notify(&self, key: Arc<K>, value: V, cause: RemovalCause) {
        use std::panic::{catch_unwind, AssertUnwindSafe};

        if !self.is_enabled() {
            return;
        }

        let listener_clo = || (self.listener)(key, value, cause);

        // Safety: It is safe to assert unwind safety here because we will not
        // call the listener again if it has been panicked.
        let result = catch_unwind(AssertUnwindSafe(listener_clo));
        if let Err(_payload) = result {
            self.is_enabled.store(false, Ordering::Release);
            #[cfg(feature = "logging")]
            log_panic(&*_payload, self.cache_name.as_deref());
        }
    }
}

/// Notifications collected while locks are held, sent after they are released.
pub(crate) struct PendingNotifications<K, V>(Vec<(Arc<K>, V, RemovalCause)>);

impl<K, V> Default for PendingNotifications<K, V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K, V> PendingNotifications<K, V> {
    pub(crate) fn push(&mut self, key: Arc<K>, value: V, cause: RemovalCause) {
        self.0.push((key, value, cause));
    }

    pub(crate) fn push_entry(&mut self, entry: &Entry<K, V>, cause: RemovalCause)
    where
        V: Clone,
    {
        if let Some(ValueOrError::Value(v)) = entry.value_or_error() {
            self.push(Arc::clone(entry.key_arc()), v, cause);
        }
    }

    pub(crate) fn send(self, notifier: Option<&RemovalNotifier<K, V>>) {
        if let Some(notifier) = notifier {
            for (key, value, cause) in self.0 {
                notifier.notify(key, value, cause);
            }
        }
    }
}

#[cfg(feature = "logging")]
fn log_panic(payload: &(dyn std::any::Any + Send + 'static), cache_name: Option<&str>) {
    // Try to downcast the payload into &str or String.
    let message: Option<std::borrow::Cow<'_, str>> =
        (payload.downcast_ref::<&str>().map(|s| (*s).into()))
            .or_else(|| payload.downcast_ref::<String>().map(Into::into));

    let cn = crate::common::log_prefix(cache_name);

    if let Some(m) = message {
        log::error!("{cn}Disabled the removal listener because it panicked at '{m}'");
    } else {
        log::error!("{cn}Disabled the removal listener because it panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::{PendingNotifications, RemovalNotifier};
    use crate::{
        entry::{Entry, ValueOrError},
        notification::RemovalCause,
    };

    #[test]
    fn panicking_listener_is_disabled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls1 = Arc::clone(&calls);
        let notifier = RemovalNotifier::new(
            Arc::new(move |_k: Arc<u32>, v: u32, _c| {
                calls1.fetch_add(1, Ordering::Relaxed);
                if v == 13 {
                    panic!("unlucky");
                }
            }),
            Some("test".into()),
        );

        notifier.notify(Arc::new(1), 1, RemovalCause::Explicit);
        notifier.notify(Arc::new(2), 13, RemovalCause::Explicit);
        assert!(!notifier.is_enabled());
        notifier.notify(Arc::new(3), 3, RemovalCause::Explicit);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn only_values_are_reported() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen1 = Arc::clone(&seen);
        let notifier = RemovalNotifier::new(
            Arc::new(move |k: Arc<u32>, v: u32, c| seen1.lock().push((*k, v, c))),
            None,
        );

        let virgin = Entry::<u32, u32>::new(Arc::new(1), 1);
        let valued = Entry::<u32, u32>::new(Arc::new(2), 2);
        valued.set_value_or_error(ValueOrError::Value(20));

        let mut pending = PendingNotifications::default();
        pending.push_entry(&virgin, RemovalCause::Size);
        pending.push_entry(&valued, RemovalCause::Size);
        pending.send(Some(&notifier));

        assert_eq!(*seen.lock(), vec![(2, 20, RemovalCause::Size)]);
    }
}
