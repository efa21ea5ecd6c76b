use tracing::info;

/// A location change observed between two checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationChange {
    pub from: String,
    pub to: String,
}

/// Detects client-side navigation by comparing the current path against the
/// last one seen. The first observation only records the path.
#[derive(Debug, Default)]
pub struct NavigationWatcher {
    last: Option<String>,
}

impl NavigationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn observe(&mut self, path: &str) -> Option<LocationChange> {
        if self.last.as_deref() == Some(path) {
            return None;
        }
        let from = self.last.replace(path.to_string())?;
        info!(from = %from, to = path, "navigation detected");
        Some(LocationChange {
            from,
            to: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_not_a_change() {
        let mut watcher = NavigationWatcher::new();
        assert_eq!(watcher.observe("/home"), None);
        assert_eq!(watcher.observe("/home"), None);
        assert_eq!(watcher.current(), Some("/home"));
    }

    #[test]
    fn path_change_is_reported_once() {
        let mut watcher = NavigationWatcher::new();
        watcher.observe("/home");
        let change = watcher.observe("/jack/status/1").unwrap();
        assert_eq!(change.from, "/home");
        assert_eq!(change.to, "/jack/status/1");
        assert_eq!(watcher.observe("/jack/status/1"), None);
    }
}
