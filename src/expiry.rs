use std::time::Duration;

/// The expiry to apply to an entry with [`Cache::expire_at`][expire-at] or from
/// an entry processor.
///
/// [expire-at]: ./struct.Cache.html#method.expire_at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpiryTime {
    /// Expire the entry now. Applies to present entries and to entries in
    /// refresh probation.
    NoCache,
    /// Keep the value but reload it on the next `get`. Applies to present
    /// entries and to entries in refresh probation. Without a loader this is
    /// the same as `NoCache`.
    Refresh,
    /// Never expire. Applies to present entries only.
    Eternal,
    /// Expire after the given duration from now. Applies to present entries
    /// only. A zero duration is the same as `NoCache`.
    After(Duration),
}

impl ExpiryTime {
    /// Returns `true` if the expiry removes the entry right away.
    pub(crate) fn is_no_cache(&self) -> bool {
        match self {
            Self::NoCache => true,
            Self::After(d) => d.is_zero(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ExpiryTime;

    #[test]
    fn zero_duration_is_no_cache() {
        assert!(ExpiryTime::NoCache.is_no_cache());
        assert!(ExpiryTime::After(Duration::ZERO).is_no_cache());
        assert!(!ExpiryTime::After(Duration::from_secs(1)).is_no_cache());
        assert!(!ExpiryTime::Refresh.is_no_cache());
        assert!(!ExpiryTime::Eternal.is_no_cache());
    }
}
