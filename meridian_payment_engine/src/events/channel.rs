//! Simple stateless pub-sub event plumbing.
//!
//! Components subscribe to engine events (fund flows, settled transactions, posted cycles) and react to them,
//! typically to feed merchant webhooks. Handlers are stateless: they receive the event value and nothing else,
//! but they may be async. Each handler runs on its own channel so a slow subscriber never blocks the engine.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs the dispatch loop until every producer has been dropped, then drains in-flight handler jobs.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop the internal sender so the loop ends when the last external subscriber is dropped.
        drop(self.sender);
        let jobs = Arc::new(AtomicI64::new(0));
        while let Some(event) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.fetch_add(1, Ordering::SeqCst);
            let job = Arc::clone(&jobs);
            tokio::spawn(async move {
                (handler)(event).await;
                job.fetch_sub(1, Ordering::Relaxed);
                trace!("📬️ Event handled");
            });
        }
        while jobs.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for in-flight event jobs to complete");
            tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn events_reach_the_handler_from_all_producers() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let total = Arc::clone(&count);
        let handler = Arc::new(move |v: u64| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(4, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        let publishers = tokio::spawn(async move {
            for i in 1..=5u64 {
                producer_1.publish_event(i).await;
                producer_2.publish_event(i * 10).await;
            }
        });
        let handle = tokio::spawn(event_handler.start_handler());
        publishers.await.unwrap();
        handle.await.unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 15 + 150);
    }
}
