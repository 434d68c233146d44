use std::future::Future;

use tracing::warn;

/// A locally held value that is updated before the remote write lands.
///
/// `mutate` snapshots the current value, applies the speculative change,
/// awaits the write and restores the snapshot if it fails.
#[derive(Debug, Clone)]
pub struct Optimistic<T> {
    value: T,
}

impl<T: Clone> Optimistic<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub async fn mutate<A, C, Fut, R, E>(&mut self, apply: A, commit: C) -> Result<R, E>
    where
        A: FnOnce(&mut T),
        C: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: std::fmt::Display,
    {
        let snapshot = self.value.clone();
        apply(&mut self.value);

        match commit(self.value.clone()).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!("remote write failed, rolling back: {err}");
                self.value = snapshot;
                Err(err)
            }
        }
    }

    /// Same as [`mutate`](Self::mutate), then replaces the local value with
    /// a fresh read from the source of truth once the write succeeds.
    pub async fn mutate_and_refresh<A, C, CFut, F, FFut, R, E>(
        &mut self,
        apply: A,
        commit: C,
        refresh: F,
    ) -> Result<R, E>
    where
        A: FnOnce(&mut T),
        C: FnOnce(T) -> CFut,
        CFut: Future<Output = Result<R, E>>,
        F: FnOnce() -> FFut,
        FFut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let result = self.mutate(apply, commit).await?;
        match refresh().await {
            Ok(fresh) => self.value = fresh,
            // The write went through; keep the speculative value.
            Err(err) => warn!("refresh after write failed: {err}"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_write_keeps_speculative_value() {
        let mut roster = Optimistic::new(vec!["a".to_string()]);
        let written = roster
            .mutate(
                |names| names.push("b".to_string()),
                |names| async move { Ok::<_, String>(names.len()) },
            )
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(roster.get(), &vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn failed_write_restores_snapshot() {
        let mut count = Optimistic::new(3);
        let result = count
            .mutate(|n| *n += 1, |_| async { Err::<(), _>("offline".to_string()) })
            .await;
        assert_eq!(result, Err("offline".to_string()));
        assert_eq!(*count.get(), 3);
    }

    #[tokio::test]
    async fn refresh_replaces_value_after_success() {
        let mut count = Optimistic::new(3);
        count
            .mutate_and_refresh(
                |n| *n += 1,
                |_| async { Ok::<_, String>(()) },
                || async { Ok(10) },
            )
            .await
            .unwrap();
        assert_eq!(count.into_inner(), 10);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_written_value() {
        let mut count = Optimistic::new(3);
        count
            .mutate_and_refresh(
                |n| *n += 1,
                |_| async { Ok::<_, String>(()) },
                || async { Err("timeout".to_string()) },
            )
            .await
            .unwrap();
        assert_eq!(*count.get(), 4);
    }
}
