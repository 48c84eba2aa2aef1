use chrono::{DateTime, Utc};

/// Lifecycle state of one cached resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
    /// The current data came from the cache rather than a fetch.
    pub is_from_cache: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            is_from_cache: false,
            last_updated: None,
        }
    }
}

/// Coarse view of a `ResourceState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Idle,
    Loading,
    Ready,
    Errored,
}

impl<T> ResourceState<T> {
    pub fn status(&self) -> ResourceStatus {
        if self.loading {
            ResourceStatus::Loading
        } else if self.error.is_some() {
            ResourceStatus::Errored
        } else if self.data.is_some() {
            ResourceStatus::Ready
        } else {
            ResourceStatus::Idle
        }
    }

    /// Data is present but came from the fallback or an earlier load.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some() && self.data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let mut state: ResourceState<u8> = ResourceState::default();
        assert_eq!(state.status(), ResourceStatus::Idle);

        state.loading = true;
        assert_eq!(state.status(), ResourceStatus::Loading);

        state.loading = false;
        state.data = Some(1);
        assert_eq!(state.status(), ResourceStatus::Ready);
        assert!(!state.is_degraded());

        state.error = Some("offline".to_string());
        assert_eq!(state.status(), ResourceStatus::Errored);
        assert!(state.is_degraded());
    }
}
