use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative shutdown signal.
///
/// Cloning a `Shutdown` yields another handle to the same flag, so one handle can be given to an interrupt handler
/// while the publisher holds another. The flag is only ever observed between ticks.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    /// Creates a new `Shutdown` that has not been requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Returns `true` if shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_flag() {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        assert!(!shutdown.is_requested());

        handle.request();
        assert!(shutdown.is_requested());
        assert!(handle.is_requested());
    }

    #[test]
    fn request_from_another_thread() {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        std::thread::spawn(move || handle.request()).join().unwrap();
        assert!(shutdown.is_requested());
    }
}
