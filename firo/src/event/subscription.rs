//! A single event subscription.
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        Arc, Mutex as StdMutex, Weak,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};
use tokio::{
    sync::{Mutex, oneshot},
    task::JoinHandle,
};

use super::{Delivery, Event, counts::EventCounts, lock};
use crate::{
    Config, Connection, Result,
    channel::Channel,
    common::verbose,
    error::Error,
    firebird::{
        ProtocolError,
        backend::{self, BackendProtocol},
        frontend, op,
    },
};

/// Live subscriptions of a manager by key.
pub(crate) type Registry = StdMutex<HashMap<u64, Arc<Inner>>>;

const AF_INET: u16 = 2;

/// Subscription to one or more named events.
///
/// Each subscription keeps its own connection, and an auxiliary connection
/// the server pushes notifications on. Both are released by
/// [`Subscription::close`], or by closing the
/// [`EventManager`][super::EventManager] that created it.
#[derive(Debug)]
pub struct Subscription {
    inner: Arc<Inner>,
}

#[derive(Debug)]
pub(crate) struct Inner {
    key: u64,
    names: Vec<String>,
    conn: Mutex<Connection>,
    aux_handle: u32,
    counts: StdMutex<EventCounts>,
    id: AtomicU32,
    remote_id: AtomicU32,
    task: StdMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    close_state: StdMutex<CloseState>,
    registry: Weak<Registry>,
}

#[derive(Debug, Default)]
struct CloseState {
    listeners: Vec<oneshot::Sender<Option<Arc<Error>>>>,
    /// Set once closed, with the error that ended the subscription.
    outcome: Option<Option<Arc<Error>>>,
}

impl Subscription {
    /// Attach a dedicated connection, open the auxiliary connection and queue
    /// the events.
    pub(crate) async fn connect(
        config: &Config,
        counts: EventCounts,
        delivery: Delivery,
        registry: Weak<Registry>,
        key: u64,
    ) -> Result<Subscription> {
        verbose!(events = ?counts.names(), "subscribe");

        let mut conn = Connection::connect_with(config.clone()).await?;
        let (aux_handle, addr) = match aux_request(&mut conn).await {
            Ok(ok) => ok,
            Err(err) => {
                close_quietly(&mut conn).await;
                return Err(err);
            },
        };

        // servers behind a wildcard bind report the unspecified address
        let host = match addr.ip().is_unspecified() {
            true => config.host.clone(),
            false => addr.ip().to_string(),
        };
        let aux = match Channel::connect(&host, addr.port()).await {
            Ok(aux) => aux,
            Err(err) => {
                close_quietly(&mut conn).await;
                return Err(err);
            },
        };
        verbose!(aux_handle, %host, port = addr.port(), "auxiliary connection");

        Self::start(conn, aux, aux_handle, counts, delivery, registry, key).await
    }

    /// Queue the events and spawn the notification loop.
    pub(crate) async fn start(
        conn: Connection,
        aux: Channel,
        aux_handle: u32,
        counts: EventCounts,
        delivery: Delivery,
        registry: Weak<Registry>,
        key: u64,
    ) -> Result<Subscription> {
        let inner = Arc::new(Inner {
            key,
            names: counts.names().to_vec(),
            conn: Mutex::new(conn),
            aux_handle,
            counts: StdMutex::new(counts),
            id: AtomicU32::new(0),
            remote_id: AtomicU32::new(0),
            task: StdMutex::new(None),
            closed: AtomicBool::new(false),
            close_state: StdMutex::new(CloseState::default()),
            registry,
        });

        if let Err(err) = inner.queue(1).await {
            close_quietly(&mut *inner.conn.lock().await).await;
            return Err(err);
        }

        let task = tokio::spawn(run(inner.clone(), aux, delivery));
        *lock(&inner.task) = Some(task);
        Ok(Subscription { inner })
    }

    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }

    /// Names of the subscribed events.
    pub fn names(&self) -> &[String] {
        &self.inner.names
    }

    /// Id of the current registration.
    pub fn id(&self) -> u32 {
        self.inner.id.load(Ordering::Acquire)
    }

    /// Id the server assigned to the current registration.
    pub fn remote_id(&self) -> u32 {
        self.inner.remote_id.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves once the subscription is closed, with the error that ended
    /// it if it did not close by request.
    pub fn on_close(&self) -> oneshot::Receiver<Option<Arc<Error>>> {
        let (tx, rx) = oneshot::channel();
        let mut state = lock(&self.inner.close_state);
        match &state.outcome {
            Some(outcome) => {
                let _ = tx.send(outcome.clone());
            },
            None => state.listeners.push(tx),
        }
        rx
    }

    /// Cancel the registration and close both connections.
    ///
    /// Pending queue receivers are woken with [`None`]. Closing a closed
    /// subscription does nothing, a close in progress is waited for.
    pub async fn close(&self) -> Result<()> {
        self.inner.shutdown(None).await
    }
}

impl Inner {
    /// Queue the events with registration `id`.
    async fn queue(&self, id: u32) -> Result<()> {
        let epb = lock(&self.counts).epb();
        let mut conn = self.conn.lock().await;
        conn.send(frontend::QueEvents { db: self.aux_handle, epb: &epb, event_id: id });
        let remote_id = conn.recv_response().await?.handle;
        self.id.store(id, Ordering::Release);
        self.remote_id.store(remote_id, Ordering::Release);
        verbose!(id, remote_id, "events queued");
        Ok(())
    }

    pub(crate) async fn shutdown(&self, error: Option<Error>) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            self.closed_elsewhere().await;
            return Ok(());
        }
        verbose!(id = self.id.load(Ordering::Acquire), "unsubscribe");

        // an in flight rearm holds the connection until its response is read,
        // the loop cannot rearm again while the lock is held
        let mut conn = self.conn.lock().await;
        let db = conn.db_handle();
        conn.send(frontend::CancelEvents { db, event_id: self.id.load(Ordering::Acquire) });
        let cancel = conn.recv_response().await.map(|_| ());

        let task = lock(&self.task).take();
        if let Some(task) = task {
            task.abort();
        }
        let close = conn.close().await;
        drop(conn);

        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.key);
        }

        let outcome = error.map(Arc::new);
        let mut state = lock(&self.close_state);
        for listener in state.listeners.drain(..) {
            let _ = listener.send(outcome.clone());
        }
        state.outcome = Some(outcome);

        cancel.and(close)
    }

    /// Wait for the shutdown another caller started.
    async fn closed_elsewhere(&self) {
        let rx = {
            let mut state = lock(&self.close_state);
            if state.outcome.is_some() {
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.listeners.push(tx);
            rx
        };
        let _ = rx.await;
    }
}

/// Read notifications until the auxiliary connection fails.
async fn run(inner: Arc<Inner>, mut aux: Channel, delivery: Delivery) {
    let error = loop {
        let msg = match next_event(&mut aux).await {
            Ok(msg) => msg,
            Err(err) => break err,
        };
        let deltas = match lock(&inner.counts).update(&msg.epb) {
            Ok(deltas) => deltas,
            Err(err) => break err.into(),
        };

        let id = inner.id.load(Ordering::Acquire);
        let remote_id = inner.remote_id.load(Ordering::Acquire);
        for (name, count) in deltas {
            verbose!(%name, count, "event");
            delivery.deliver(Event { name, count, id, remote_id }).await;
        }

        if let Err(err) = inner.queue(id.wrapping_add(1)).await {
            break err;
        }
    };

    #[cfg(feature = "log")]
    log::warn!("event subscription ended: {error}");

    // shutdown aborts this task, it has to run on its own
    tokio::spawn(async move {
        if let Err(_err) = inner.shutdown(Some(error)).await {
            #[cfg(feature = "log")]
            log::warn!("failed to close event subscription: {_err}");
        }
    });
}

/// Next `op_event`, other packets are skipped.
async fn next_event(aux: &mut Channel) -> Result<backend::Event> {
    loop {
        match aux.read_opcode().await? {
            op::EVENT => return backend::Event::decode(aux).await,
            _other => {
                #[cfg(feature = "log")]
                log::warn!("unexpected {} on the event channel", op::name(_other));
            },
        }
    }
}

/// Ask the server for the auxiliary connection address.
async fn aux_request(conn: &mut Connection) -> Result<(u32, SocketAddrV4)> {
    conn.send(frontend::ConnectRequest { db: conn.db_handle() });
    let res = conn.recv_response().await?;
    Ok((res.handle, parse_aux_address(&res.buffer)?))
}

/// `sockaddr_in` of the auxiliary port: family, port and address.
fn parse_aux_address(buf: &[u8]) -> Result<SocketAddrV4, ProtocolError> {
    let Some(raw) = buf.get(..8) else {
        return Err(ProtocolError::malformed("auxiliary address too short"));
    };
    let family = u16::from_le_bytes([raw[0], raw[1]]);
    if family != AF_INET {
        return Err(ProtocolError::malformed(format!("unsupported address family {family}")));
    }
    let port = u16::from_be_bytes([raw[2], raw[3]]);
    Ok(SocketAddrV4::new(Ipv4Addr::new(raw[4], raw[5], raw[6], raw[7]), port))
}

async fn close_quietly(conn: &mut Connection) {
    if let Err(_err) = conn.close().await {
        #[cfg(feature = "log")]
        log::warn!("failed to close event connection: {_err}");
    }
}

#[cfg(test)]
pub(crate) mod test {
    use bytes::{BufMut, BytesMut};
    use std::time::Duration;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
        sync::mpsc,
    };

    use super::*;
    use crate::{
        channel::test::pair,
        connection::test::{mock, ok_response, sent},
        event::counts::test::server_epb,
        ext::BufMutExt,
        firebird::{consts::PROTOCOL_VERSION16, op},
    };

    pub(crate) fn event_message(db: u32, events: &[(&str, u32)], id: u32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32(op::EVENT);
        buf.put_u32(db);
        buf.put_xdr_bytes(&server_epb(events));
        buf.put_u64(0);
        buf.put_u32(id);
        buf.to_vec()
    }

    /// Responses for queue, cancel and detach.
    pub(crate) fn lifecycle(rearms: usize) -> BytesMut {
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 40, b"");
        for i in 0..rearms {
            ok_response(&mut buf, 41 + i as u32, b"");
        }
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, b"");
        buf
    }

    fn opcode_count(bytes: &[u8], opcode: u32) -> usize {
        bytes
            .chunks(4)
            .filter(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]) == opcode)
            .count()
    }

    pub(crate) async fn subscribe(delivery: Delivery, rearms: usize) -> (Subscription, DuplexStream, DuplexStream) {
        let (conn, mut db) = mock(PROTOCOL_VERSION16, false);
        let (aux, server) = pair();
        db.write_all(&lifecycle(rearms)).await.unwrap();

        let counts = EventCounts::new(["order_created", "order_deleted"]).unwrap();
        let sub = Subscription::start(conn, aux, 7, counts, delivery, Weak::new(), 0)
            .await
            .unwrap();
        (sub, db, server)
    }

    #[tokio::test]
    async fn queue_receives_deltas_and_rearms() {
        let (tx, mut rx) = mpsc::channel(1);
        let (sub, mut db, mut server) = subscribe(Delivery::Queue(tx), 1).await;
        assert_eq!((sub.id(), sub.remote_id()), (1, 40));

        // posted three times before the notification
        server
            .write_all(&event_message(7, &[("order_created", 4), ("order_deleted", 1)], 1))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, Event { name: "order_created".into(), count: 3, id: 1, remote_id: 40 });

        let mut out = Vec::new();
        while opcode_count(&out, op::QUE_EVENTS) < 2 {
            out.extend(sent(&mut db).await);
        }

        sub.close().await.unwrap();
        assert!(sub.is_closed());
        assert_eq!(sub.id(), 2);
        assert!(rx.recv().await.is_none());
        sub.close().await.unwrap();

        out.extend(sent(&mut db).await);
        assert_eq!(opcode_count(&out, op::CANCEL_EVENTS), 1);
        assert_eq!(opcode_count(&out, op::DETACH), 1);
    }

    #[tokio::test]
    async fn callback_runs_off_the_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let callback = Delivery::callback(move |event| {
            let _ = tx.send(event);
        });
        let (sub, _db, mut server) = subscribe(callback, 1).await;

        server
            .write_all(&event_message(7, &[("order_created", 1), ("order_deleted", 3)], 1))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!((event.name.as_str(), event.count), ("order_deleted", 2));

        sub.close().await.unwrap();
    }

    #[tokio::test]
    async fn lost_auxiliary_connection_closes() {
        let (tx, mut rx) = mpsc::channel(1);
        let (sub, _db, server) = subscribe(Delivery::Queue(tx), 0).await;
        let closed = sub.on_close();

        drop(server);
        let error = closed.await.unwrap();
        assert!(error.is_some());
        assert!(sub.is_closed());
        assert!(rx.recv().await.is_none());

        // listeners registered late see the same outcome
        assert!(sub.on_close().await.unwrap().is_some());
    }

    /// Subscription whose cancel and detach wait for the test to answer.
    async fn held_open() -> (Arc<Subscription>, DuplexStream, DuplexStream) {
        let (conn, mut db) = mock(PROTOCOL_VERSION16, false);
        let (aux, server) = pair();
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 40, b"");
        db.write_all(&buf).await.unwrap();

        let counts = EventCounts::new(["order_created"]).unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let sub = Subscription::start(conn, aux, 7, counts, Delivery::Queue(tx), Weak::new(), 0)
            .await
            .unwrap();
        (Arc::new(sub), db, server)
    }

    async fn until_cancelled(db: &mut DuplexStream) {
        let mut out = Vec::new();
        while opcode_count(&out, op::CANCEL_EVENTS) == 0 {
            out.extend(sent(db).await);
        }
    }

    fn answer_close() -> BytesMut {
        let mut buf = BytesMut::new();
        ok_response(&mut buf, 0, b"");
        ok_response(&mut buf, 0, b"");
        buf
    }

    #[tokio::test]
    async fn cancel_is_sent_before_the_loop_stops() {
        let (sub, mut db, mut server) = held_open().await;
        let closing = tokio::spawn({
            let sub = sub.clone();
            async move { sub.close().await }
        });

        until_cancelled(&mut db).await;
        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(50), server.read(&mut byte)).await;
        assert!(read.is_err(), "auxiliary connection dropped before the cancel");

        db.write_all(&answer_close()).await.unwrap();
        closing.await.unwrap().unwrap();
        assert_eq!(server.read(&mut byte).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_close_waits_for_the_first() {
        let (sub, mut db, _server) = held_open().await;
        let first = tokio::spawn({
            let sub = sub.clone();
            async move { sub.close().await }
        });
        until_cancelled(&mut db).await;

        let second = tokio::spawn({
            let sub = sub.clone();
            async move { sub.close().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sub.is_closed());
        assert!(!second.is_finished());

        db.write_all(&answer_close()).await.unwrap();
        second.await.unwrap().unwrap();
        // detach went out before the late caller returned
        assert_eq!(opcode_count(&sent(&mut db).await, op::DETACH), 1);
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stray_packets_are_skipped() {
        let (tx, mut rx) = mpsc::channel(1);
        let (sub, _db, mut server) = subscribe(Delivery::Queue(tx), 1).await;

        let mut buf = op::PING.to_be_bytes().to_vec();
        buf.extend(event_message(7, &[("order_created", 2), ("order_deleted", 1)], 1));
        server.write_all(&buf).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!((event.name.as_str(), event.count), ("order_created", 1));
        assert!(!sub.is_closed());
        sub.close().await.unwrap();
    }

    #[test]
    fn aux_address() {
        let buf = [2, 0, 0x0b, 0xb8, 10, 0, 0, 5, 0, 0, 0, 0];
        let addr = parse_aux_address(&buf).unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 3000));
        assert!(parse_aux_address(&[10, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(parse_aux_address(&[2, 0]).is_err());
    }
}
