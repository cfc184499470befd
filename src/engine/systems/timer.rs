use std::ops::ControlFlow;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{ interval_at, Instant, MissedTickBehavior };

/// Fixed-period repeating task with explicit start/stop.
///
/// At most one schedule is armed at a time: `start` stops the previous one
/// first, and dropping the timer stops it.
#[derive(Debug)]
pub struct RepeatingTimer {
    runtime: Handle,
    task: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime, task: None }
    }

    /// Calls `on_tick` every `period`, first after one full period, until it
    /// returns `ControlFlow::Break` or the timer is stopped.
    pub fn start<F>(&mut self, period: Duration, mut on_tick: F)
        where F: FnMut() -> ControlFlow<()> + Send + 'static
    {
        self.stop();
        let task = self.runtime.spawn(async move {
            // Ticks stay on the original schedule; late ticks are skipped, not bunched
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        });
        self.task = Some(task);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_on_a_fixed_period_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timer = RepeatingTimer::new(Handle::current());
        let counter = Arc::clone(&count);
        timer.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        timer.stop();
        assert!(!timer.is_armed());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_schedule() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut timer = RepeatingTimer::new(Handle::current());

        let counter = Arc::clone(&first);
        timer.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        let counter = Arc::clone(&second);
        timer.start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn break_ends_the_schedule() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timer = RepeatingTimer::new(Handle::current());
        let counter = Arc::clone(&count);
        timer.start(Duration::from_millis(10), move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_timer_stops_it() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        {
            let mut timer = RepeatingTimer::new(Handle::current());
            timer.start(Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
