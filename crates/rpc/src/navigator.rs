//! In-memory [`Navigator`] that records every redirect.

use parking_lot::Mutex;

use crate::traits::Navigator;

#[derive(Debug)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(initial_route: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(initial_route.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Routes navigated to, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> String {
        self.current.lock().clone()
    }

    fn navigate(&self, route: &str) {
        *self.current.lock() = route.to_owned();
        self.history.lock().push(route.to_owned());
    }
}
