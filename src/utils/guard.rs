//! Scope guard running a closure on drop.

/// Runs its closure when dropped, on normal exit and during unwinding alike.
///
/// The stream reader holds one so a session is always marked stopped when its
/// reader thread ends, however the loop was left.
///
/// ```
/// use agterm::utils::guard::OnExit;
///
/// let mut fired = false;
/// {
///     let _guard = OnExit::new(|| fired = true);
/// }
/// assert!(fired);
/// ```
pub struct OnExit<F: FnOnce()> {
    on_exit: Option<F>,
}

impl<F: FnOnce()> OnExit<F> {
    pub fn new(f: F) -> Self {
        Self { on_exit: Some(f) }
    }

    /// Drop the guard without running the closure.
    pub fn disarm(mut self) {
        self.on_exit = None;
    }
}

impl<F: FnOnce()> Drop for OnExit<F> {
    fn drop(&mut self) {
        if let Some(f) = self.on_exit.take() {
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_runs_on_unwind() {
        let fired = Cell::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = OnExit::new(|| fired.set(true));
            panic!("reader blew up");
        }));
        assert!(result.is_err());
        assert!(fired.get());
    }

    #[test]
    fn test_disarm_skips_closure() {
        let fired = Cell::new(false);
        OnExit::new(|| fired.set(true)).disarm();
        assert!(!fired.get());
    }
}
