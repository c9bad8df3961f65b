//! Snapshot publish/subscribe used for every piece of mutable state the crate
//! exposes (label set, resident mail set, per-mail view flags).
//!
//! Publishing replaces the whole snapshot at once, so readers never see a
//! half-applied update. Subscribers are notified on any thread and drop their
//! [`Subscription`] (or call [`Subscription::unsubscribe`]) to stop listening.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Observable { tx }
    }

    /// Clone of the current snapshot.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Read the current snapshot without cloning it. `f` must not block.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the snapshot and wake every subscriber.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Edit the snapshot in place; subscribers are only woken when `f` returns true.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[derive(Debug)]
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Latest snapshot; marks it as seen.
    pub fn current(&mut self) -> T {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next publish. Returns `false` once the observable is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_published_snapshots() {
        let obs = Observable::new(vec![1]);
        let mut sub = obs.subscribe();
        assert_eq!(sub.current(), vec![1]);

        obs.publish(vec![1, 2]);
        assert!(sub.changed().await);
        assert_eq!(sub.current(), vec![1, 2]);
    }

    #[tokio::test]
    async fn update_without_change_does_not_wake() {
        let obs = Observable::new(0u32);
        let mut sub = obs.subscribe();
        sub.current();

        assert!(!obs.update(|_| false));
        assert!(obs.update(|v| {
            *v = 5;
            true
        }));
        assert!(sub.changed().await);
        assert_eq!(sub.current(), 5);
    }

    #[test]
    fn unsubscribe_releases_the_receiver() {
        let obs = Observable::new("a".to_string());
        let sub = obs.subscribe();
        let other = obs.subscribe();
        assert_eq!(obs.subscriber_count(), 2);
        sub.unsubscribe();
        assert_eq!(obs.subscriber_count(), 1);
        drop(other);
        assert_eq!(obs.subscriber_count(), 0);
        obs.publish("b".into());
        assert_eq!(obs.get(), "b");
    }

    #[tokio::test]
    async fn changed_reports_closed_observable() {
        let obs = Observable::new(1);
        let mut sub = obs.subscribe();
        drop(obs);
        assert!(!sub.changed().await);
    }
}
