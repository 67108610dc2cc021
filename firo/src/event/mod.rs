//! Database events.
//!
//! `POST_EVENT` in a committed transaction notifies every client waiting for
//! that name. Notifications carry how many times each event was posted since
//! the previous one, several posts before the client rearms arrive as a
//! single notification.
//!
//! # Example
//!
//! ```no_run
//! # async fn test(config: firo::Config) -> firo::Result<()> {
//! use firo::event::EventManager;
//!
//! let manager = EventManager::connect(config).await?;
//! let (sub, mut events) = manager.subscribe_queue(["order_created"]).await?;
//!
//! manager.post_event("order_created").await?;
//! while let Some(event) = events.recv().await {
//!     println!("{} posted {} times", event.name, event.count);
//! }
//!
//! sub.close().await?;
//! manager.close().await?;
//! # Ok(())
//! # }
//! ```
use std::{
    fmt,
    sync::{
        Arc, Mutex as StdMutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};

use crate::{Config, Connection, Result, error::Closed, query::execute, sql::SqlExt};

mod counts;
mod subscription;

use counts::EventCounts;
use subscription::Registry;

pub use subscription::Subscription;

/// Queue capacity of [`EventManager::subscribe_queue`].
const QUEUE_CAPACITY: usize = 1;

/// Notification of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    /// Times posted since the previous notification.
    pub count: u32,
    /// Registration the notification answered.
    pub id: u32,
    pub remote_id: u32,
}

/// How a subscription hands notifications over.
pub enum Delivery {
    /// Called on the blocking thread pool for every notification.
    Callback(Arc<dyn Fn(Event) + Send + Sync>),
    /// Sent to a bounded queue, the subscription waits while it is full.
    Queue(mpsc::Sender<Event>),
}

impl Delivery {
    pub fn callback<F>(f: F) -> Delivery
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        Delivery::Callback(Arc::new(f))
    }

    async fn deliver(&self, event: Event) {
        match self {
            Delivery::Callback(f) => {
                let f = f.clone();
                let _handle = tokio::task::spawn_blocking(move || f(event));
                #[cfg(feature = "log")]
                tokio::spawn(async move {
                    if let Err(err) = _handle.await {
                        log::error!("event callback failed: {err}");
                    }
                });
            },
            Delivery::Queue(tx) => {
                // receiver gone, notifications are dropped until closed
                let _ = tx.send(event).await;
            },
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Callback(_) => f.write_str("Callback"),
            Delivery::Queue(tx) => f.debug_tuple("Queue").field(tx).finish(),
        }
    }
}

/// Creates subscriptions and keeps track of the live ones.
#[derive(Debug)]
pub struct EventManager {
    config: Config,
    conn: Mutex<Connection>,
    registry: Arc<Registry>,
    next_key: AtomicU64,
    closed: AtomicBool,
}

impl EventManager {
    /// Connect the manager, subscriptions open connections of their own with
    /// the same `config`.
    pub async fn connect(config: Config) -> Result<EventManager> {
        let conn = Connection::connect_with(config.clone()).await?;
        Ok(EventManager::from_parts(config, conn))
    }

    fn from_parts(config: Config, conn: Connection) -> EventManager {
        EventManager {
            config,
            conn: Mutex::new(conn),
            registry: Arc::default(),
            next_key: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Post event `name` in a transaction of its own.
    pub async fn post_event(&self, name: &str) -> Result<()> {
        let sql = format!("EXECUTE BLOCK AS BEGIN POST_EVENT '{}'; END", name.replace('\'', "''"));
        let mut conn = self.conn.lock().await;
        execute(sql.as_str().once(), &mut *conn).execute().await?;
        Ok(())
    }

    /// Subscribe to `names`, calling `callback` for every notification.
    pub async fn subscribe<I, S, F>(&self, names: I, callback: F) -> Result<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.subscribe_with(names, Delivery::callback(callback)).await
    }

    /// Subscribe to `names`, receiving notifications from a queue.
    ///
    /// The queue yields [`None`] once the subscription is closed.
    pub async fn subscribe_queue<I, S>(&self, names: I) -> Result<(Subscription, mpsc::Receiver<Event>)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let sub = self.subscribe_with(names, Delivery::Queue(tx)).await?;
        Ok((sub, rx))
    }

    /// Subscribe to `names` with the given delivery.
    ///
    /// Event names are checked before anything is sent: at least one name,
    /// none longer than 255 bytes.
    pub async fn subscribe_with<I, S>(&self, names: I, delivery: Delivery) -> Result<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_closed() {
            return Err(Closed.into());
        }
        let counts = EventCounts::new(names)?;
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.registry);
        let sub = Subscription::connect(&self.config, counts, delivery, registry, key).await?;
        self.register(key, sub).await
    }

    async fn register(&self, key: u64, sub: Subscription) -> Result<Subscription> {
        lock(&self.registry).insert(key, sub.inner().clone());
        // closed while connecting
        if self.is_closed() {
            sub.close().await?;
            return Err(Closed.into());
        }
        Ok(sub)
    }

    /// Number of live subscriptions.
    pub fn subscriptions(&self) -> usize {
        lock(&self.registry).len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every live subscription, then the manager connection.
    ///
    /// Closing a closed manager does nothing.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let live: Vec<_> = lock(&self.registry).drain().map(|(_, sub)| sub).collect();
        let mut tasks = JoinSet::new();
        for sub in live {
            tasks.spawn(async move { sub.shutdown(None).await });
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Err(err)) = joined {
                result = Err(err);
            }
        }

        let closed = self.conn.lock().await.close().await;
        result.and(closed)
    }
}

/// Lock a mutex whose data stays consistent even if a holder panicked.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
