//! Running blocking stage work off the async executor.

use crate::error::{Error, Result};

/// Owns state that is moved onto Tokio's blocking pool for each call.
///
/// The state is absent while a call is in flight. If the caller drops the
/// future (or the task panics) it never comes back, and every later call
/// fails with [`Error::SequenceViolation`].
pub struct Offload<S> {
    inner: Option<S>,
    label: &'static str,
}

impl<S: Send + 'static> Offload<S> {
    pub fn new(label: &'static str, state: S) -> Self {
        Self {
            inner: Some(state),
            label,
        }
    }

    /// Run `f` on the blocking pool with exclusive access to the state.
    pub async fn run<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let mut state = self.take()?;
        let (state, out) = tokio::task::spawn_blocking(move || {
            let out = f(&mut state);
            (state, out)
        })
        .await
        .map_err(|e| Error::TaskFailed(format!("{} task join error: {}", self.label, e)))?;
        self.inner = Some(state);
        out
    }

    /// Borrow the state synchronously between calls.
    pub fn get_mut(&mut self) -> Result<&mut S> {
        let label = self.label;
        self.inner.as_mut().ok_or_else(|| poisoned(label))
    }

    pub fn get(&self) -> Result<&S> {
        self.inner.as_ref().ok_or_else(|| poisoned(self.label))
    }

    /// True if an interrupted call lost the state.
    pub fn is_poisoned(&self) -> bool {
        self.inner.is_none()
    }

    fn take(&mut self) -> Result<S> {
        self.inner.take().ok_or_else(|| poisoned(self.label))
    }
}

fn poisoned(label: &str) -> Error {
    Error::sequence(format!("{} is unusable after an interrupted call", label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offload_returns_state() {
        let mut cell = Offload::new("counter", 0u32);
        let v = cell
            .run(|n| {
                *n += 1;
                Ok(*n)
            })
            .await
            .unwrap();
        assert_eq!(v, 1);
        assert_eq!(*cell.get().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offload_keeps_state_on_error() {
        let mut cell = Offload::new("counter", 0u32);
        let res: Result<()> = cell.run(|_| Err(Error::invalid_argument("nope"))).await;
        assert!(res.is_err());
        assert!(!cell.is_poisoned());
    }

    #[tokio::test]
    async fn test_offload_panic_poisons() {
        let mut cell = Offload::new("counter", 0u32);
        let res: Result<()> = cell.run(|_| panic!("boom")).await;
        assert!(matches!(res, Err(Error::TaskFailed(_))));
        assert!(cell.is_poisoned());
        let again: Result<()> = cell.run(|_| Ok(())).await;
        assert!(matches!(again, Err(Error::SequenceViolation(_))));
    }
}
