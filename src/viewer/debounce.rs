use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Trailing debounce with a single pending-task slot: scheduling aborts and
/// replaces whatever was pending, so a burst of triggers runs the work once,
/// after the burst settles.
pub(crate) struct Debounce {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debounce {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub(crate) fn schedule<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        }));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::Debounce;

    #[tokio::test(start_paused = true)]
    async fn burst_of_schedules_runs_the_work_once() {
        let mut debounce = Debounce::new(Duration::from_millis(150));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let runs = Arc::clone(&runs);
            debounce.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_each_run() {
        let mut debounce = Debounce::new(Duration::from_millis(150));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let runs = Arc::clone(&runs);
            debounce.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(400)).await;
        }

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_pending_work() {
        let mut debounce = Debounce::new(Duration::from_millis(150));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        debounce.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debounce.cancel();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
