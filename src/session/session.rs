use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, ConnectionId, UserId};
use super::heartbeat::{self, HeartbeatAction};
use crate::config::SessionConfig;
use crate::crypto::{CryptoError, Encryptor};
use crate::events::{Envelope, ServerEvent};
use crate::profile::ProfileStore;

/// A session went online or offline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTransition {
    pub identity: UserId,
    pub online: bool,
}

pub type PresenceSender = mpsc::UnboundedSender<PresenceTransition>;
pub type PresenceReceiver = mpsc::UnboundedReceiver<PresenceTransition>;

/// Collaborators and limits shared by every session
pub struct SessionContext {
    pub profiles: Arc<dyn ProfileStore>,
    pub encryptor: Arc<dyn Encryptor>,
    pub config: SessionConfig,
    pub transitions: PresenceSender,
}

/// Outcome of a successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to this many live connections
    Written(usize),
    /// Retained in the backlog until the next flush
    Queued,
    /// Transient event dropped because the session is offline
    Dropped,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("No public key registered for {0}")]
    MissingPublicKey(UserId),

    #[error("Public key lookup failed: {0}")]
    KeyLookup(String),

    #[error("Encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Connection authenticated as {connection} cannot attach to session {session}")]
    IdentityMismatch { session: UserId, connection: UserId },
}

struct SessionState {
    connections: Vec<Arc<dyn Connection>>,
    backlog: VecDeque<Envelope>,
    /// Last presence status reported to the tracker
    online: bool,
    heartbeat: Option<JoinHandle<()>>,
    ping_counter: u64,
    missed_pings: u32,
}

impl SessionState {
    fn any_open(&self) -> bool {
        self.connections.iter().any(|connection| connection.is_open())
    }

    fn open_connections(&self) -> impl Iterator<Item = &Arc<dyn Connection>> {
        self.connections
            .iter()
            .filter(|connection| connection.is_open())
    }
}

/// Server-side state for one identity: its live connections, the backlog of
/// envelopes that could not be delivered, and the heartbeat task.
pub struct Session {
    identity: UserId,
    context: Arc<SessionContext>,
    state: Mutex<SessionState>,
    /// Serializes send and flush so a recipient sees envelopes in send order
    outbound: Mutex<()>,
}

impl Session {
    pub fn new(identity: impl Into<UserId>, context: Arc<SessionContext>) -> Self {
        Self {
            identity: identity.into(),
            context,
            state: Mutex::new(SessionState {
                connections: Vec::new(),
                backlog: VecDeque::new(),
                online: false,
                heartbeat: None,
                ping_counter: 0,
                missed_pings: 0,
            }),
            outbound: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Takes ownership of an authenticated connection
    #[instrument(skip(self, connection), fields(identity = %self.identity))]
    pub async fn attach(
        self: &Arc<Self>,
        connection: Arc<dyn Connection>,
    ) -> Result<(), SessionError> {
        if connection.identity() != self.identity {
            warn!(
                connection_identity = %connection.identity(),
                "Refusing to attach connection authenticated for another identity"
            );
            return Err(SessionError::IdentityMismatch {
                session: self.identity.clone(),
                connection: connection.identity().to_string(),
            });
        }

        let mut state = self.state.lock().await;
        state.connections.retain(|existing| existing.is_open());
        state.connections.push(Arc::clone(&connection));
        state.missed_pings = 0;

        info!(
            connection_id = %connection.id(),
            transport = ?connection.transport(),
            connections = state.connections.len(),
            "Connection attached"
        );

        if !state.online && state.any_open() {
            state.online = true;
            self.report_transition(true);
        }

        let heartbeat_running = state
            .heartbeat
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if state.online && !heartbeat_running {
            state.heartbeat = Some(heartbeat::spawn(
                Arc::downgrade(self),
                self.context.config.heartbeat.interval,
            ));
        }

        Ok(())
    }

    /// Drops a connection handle once its transport has closed
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn detach(&self, connection_id: &ConnectionId) {
        let mut state = self.state.lock().await;
        state
            .connections
            .retain(|connection| connection.id() != connection_id);

        debug!(
            connection_id = %connection_id,
            remaining = state.connections.len(),
            "Connection detached"
        );

        self.reconcile(&mut state);
    }

    /// True iff at least one owned connection is open
    pub async fn is_alive(&self) -> bool {
        self.state.lock().await.any_open()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    pub async fn backlog_len(&self) -> usize {
        self.state.lock().await.backlog.len()
    }

    /// Encrypts the event for this identity and writes it to every live
    /// connection, or retains it in the backlog when none is live.
    #[instrument(skip(self, event), fields(identity = %self.identity, event = %event.event_name()))]
    pub async fn send(&self, event: &ServerEvent) -> Result<Delivery, SendError> {
        let _outbound = self.outbound.lock().await;
        let envelope = self.seal(event).await?;

        let mut state = self.state.lock().await;
        Ok(self.deliver(&mut state, envelope, true))
    }

    /// Like [`send`](Self::send) but never retained in the backlog
    async fn send_transient(&self, event: &ServerEvent) -> Result<Delivery, SendError> {
        let _outbound = self.outbound.lock().await;
        let envelope = self.seal(event).await?;

        let mut state = self.state.lock().await;
        Ok(self.deliver(&mut state, envelope, false))
    }

    /// Writes the backlog, in order, to every live connection and clears it.
    /// Returns false without touching the backlog when the session is not alive.
    ///
    /// Replay waits for each connection's driver to make room, so a backlog
    /// larger than the write queue is delivered in full. The state lock is
    /// released between writes; the outbound lock keeps new sends behind the
    /// replayed envelopes.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn flush(&self) -> bool {
        let _outbound = self.outbound.lock().await;

        let (mut pending, connections) = {
            let mut state = self.state.lock().await;
            if !state.any_open() {
                debug!("Flush skipped, session is not alive");
                return false;
            }
            let connections: Vec<Arc<dyn Connection>> =
                state.open_connections().cloned().collect();
            (std::mem::take(&mut state.backlog), connections)
        };
        let total = pending.len();
        let timeout = self.context.config.flush_write_timeout;

        while let Some(envelope) = pending.pop_front() {
            let written = Self::replay(&connections, &self.identity, &envelope, timeout).await;
            if written == 0 {
                // Every connection dropped mid-flush; keep the rest for later
                pending.push_front(envelope);
                warn!(remaining = pending.len(), "Flush interrupted, re-queueing backlog");

                let mut state = self.state.lock().await;
                pending.append(&mut state.backlog);
                state.backlog = pending;
                self.reconcile(&mut state);
                return true;
            }
        }

        info!(flushed = total, "Backlog flushed");
        true
    }

    /// Records a pong. Only an answer to the most recent ping resets the
    /// missed-ping counter.
    pub async fn pong(&self, ping: u64) -> bool {
        let mut state = self.state.lock().await;
        if ping != 0 && ping == state.ping_counter {
            state.missed_pings = 0;
            true
        } else {
            debug!(
                identity = %self.identity,
                ping = ping,
                expected = state.ping_counter,
                "Ignoring stale pong"
            );
            false
        }
    }

    /// One heartbeat interval elapsed
    pub(super) async fn heartbeat_tick(&self) -> HeartbeatAction {
        let ping = {
            let mut state = self.state.lock().await;
            state.connections.retain(|connection| connection.is_open());

            if !state.any_open() {
                // The task is finishing on its own; don't abort it from inside
                state.heartbeat.take();
                self.reconcile(&mut state);
                return HeartbeatAction::Stop;
            }

            if state.missed_pings > self.context.config.heartbeat.max_missed {
                warn!(
                    identity = %self.identity,
                    missed_pings = state.missed_pings,
                    "Liveness timeout, closing all connections"
                );
                for connection in &state.connections {
                    connection.close();
                }
                state.heartbeat.take();
                self.reconcile(&mut state);
                return HeartbeatAction::Stop;
            }

            state.ping_counter += 1;
            state.missed_pings += 1;
            state.ping_counter
        };

        if let Err(e) = self.send_transient(&ServerEvent::ping(ping)).await {
            warn!(identity = %self.identity, error = %e, "Failed to send ping");
        }
        HeartbeatAction::Continue
    }

    async fn seal(&self, event: &ServerEvent) -> Result<Envelope, SendError> {
        let public_key = self
            .context
            .profiles
            .get_public_key(&self.identity)
            .await
            .map_err(|e| SendError::KeyLookup(e.to_string()))?
            .ok_or_else(|| SendError::MissingPublicKey(self.identity.clone()))?;

        let plaintext = serde_json::to_vec(event)?;
        let ciphertext = self
            .context
            .encryptor
            .encrypt(&plaintext, &public_key)
            .await?;

        Ok(Envelope::sealed(event.event_name(), &ciphertext)?)
    }

    fn deliver(&self, state: &mut SessionState, envelope: Envelope, retain: bool) -> Delivery {
        if state.any_open() {
            let written = Self::write_all(state, &self.identity, &envelope);
            if written > 0 {
                return Delivery::Written(written);
            }
            self.reconcile(state);
        }

        if !retain {
            return Delivery::Dropped;
        }

        if state.backlog.len() >= self.context.config.backlog_capacity {
            state.backlog.pop_front();
            warn!(
                identity = %self.identity,
                capacity = self.context.config.backlog_capacity,
                "Backlog full, evicted oldest envelope"
            );
        }
        state.backlog.push_back(envelope);
        debug!(
            identity = %self.identity,
            backlog = state.backlog.len(),
            "Session offline, envelope queued"
        );
        Delivery::Queued
    }

    fn write_all(state: &SessionState, identity: &str, envelope: &Envelope) -> usize {
        let mut written = 0;
        for connection in state.open_connections() {
            match connection.write(envelope) {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    identity = %identity,
                    connection_id = %connection.id(),
                    error = %e,
                    "Failed to write envelope"
                ),
            }
        }
        written
    }

    async fn replay(
        connections: &[Arc<dyn Connection>],
        identity: &str,
        envelope: &Envelope,
        timeout: Duration,
    ) -> usize {
        let mut written = 0;
        for connection in connections.iter().filter(|connection| connection.is_open()) {
            match connection.write_waiting(envelope, timeout).await {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    identity = %identity,
                    connection_id = %connection.id(),
                    error = %e,
                    "Failed to replay envelope"
                ),
            }
        }
        written
    }

    /// Moves the session offline if it was online and nothing is open anymore
    fn reconcile(&self, state: &mut SessionState) {
        if state.online && !state.any_open() {
            state.online = false;
            if let Some(handle) = state.heartbeat.take() {
                handle.abort();
            }
            self.report_transition(false);
        }
    }

    fn report_transition(&self, online: bool) {
        info!(identity = %self.identity, online = online, "Session presence changed");
        let transition = PresenceTransition {
            identity: self.identity.clone(),
            online,
        };
        if self.context.transitions.send(transition).is_err() {
            debug!(identity = %self.identity, "Presence tracker is not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeartbeatConfig;
    use crate::events::MemberState;
    use crate::profile::{InMemoryProfileStore, Profile};
    use crate::session::{ChannelConnection, Transport};
    use crate::shared::test_utils::{open_envelope, session_context, TestUser};
    use tokio::sync::mpsc::error::TryRecvError;

    struct Fixture {
        user: TestUser,
        session: Arc<Session>,
        transitions: PresenceReceiver,
    }

    fn fixture_with(config: SessionConfig) -> Fixture {
        let user = TestUser::new("u-a", "alice");
        let profiles = Arc::new(InMemoryProfileStore::with_profiles(vec![user.profile.clone()]));
        let (context, transitions) = session_context(profiles, config);
        let session = Arc::new(Session::new(user.id.clone(), context));
        Fixture {
            user,
            session,
            transitions,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SessionConfig::default())
    }

    fn connect(
        fixture: &Fixture,
        capacity: usize,
    ) -> (Arc<ChannelConnection>, mpsc::Receiver<Envelope>) {
        ChannelConnection::new(fixture.user.id.clone(), Transport::Socket, capacity)
    }

    fn join(room: &str) -> ServerEvent {
        ServerEvent::update_member(room, "bob", MemberState::Join)
    }

    #[tokio::test]
    async fn test_attach_and_detach_report_transitions() {
        let mut f = fixture();
        let (connection, _rx) = connect(&f, 8);

        assert!(!f.session.is_alive().await);
        f.session.attach(connection.clone()).await.unwrap();
        assert!(f.session.is_alive().await);
        assert_eq!(
            f.transitions.try_recv().unwrap(),
            PresenceTransition {
                identity: "u-a".into(),
                online: true
            }
        );

        connection.close();
        assert!(!f.session.is_alive().await);
        f.session.detach(connection.id()).await;
        assert!(!f.transitions.try_recv().unwrap().online);
        assert_eq!(f.session.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_attach_rejects_foreign_identity() {
        let f = fixture();
        let (stranger, _rx) = ChannelConnection::new("u-z", Transport::Socket, 8);

        let result = f.session.attach(stranger).await;
        assert_eq!(
            result,
            Err(SessionError::IdentityMismatch {
                session: "u-a".into(),
                connection: "u-z".into()
            })
        );
        assert!(!f.session.is_alive().await);
    }

    #[tokio::test]
    async fn test_send_encrypts_for_recipient() {
        let f = fixture();
        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection).await.unwrap();

        let delivery = f.session.send(&join("wonk")).await.unwrap();
        assert_eq!(delivery, Delivery::Written(1));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_name(), "updateMember");
        assert!(!envelope.data().contains("wonk"));
        match open_envelope(&envelope, &f.user.secret) {
            ServerEvent::UpdateMember(payload) => {
                assert_eq!(payload.room, "wonk");
                assert_eq!(payload.username, "bob");
                assert_eq!(payload.state, MemberState::Join);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_sends_queue_and_flush_in_order() {
        let f = fixture();

        assert_eq!(f.session.send(&join("one")).await.unwrap(), Delivery::Queued);
        assert_eq!(f.session.send(&join("two")).await.unwrap(), Delivery::Queued);
        assert_eq!(f.session.backlog_len().await, 2);
        assert!(!f.session.flush().await);
        assert_eq!(f.session.backlog_len().await, 2);

        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection).await.unwrap();
        assert!(f.session.flush().await);
        assert_eq!(f.session.backlog_len().await, 0);

        let rooms: Vec<String> = [rx.recv().await.unwrap(), rx.recv().await.unwrap()]
            .iter()
            .map(|envelope| match open_envelope(envelope, &f.user.secret) {
                ServerEvent::UpdateMember(payload) => payload.room,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(rooms, vec!["one", "two"]);

        // Second flush is a no-op
        assert!(f.session.flush().await);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_missing_public_key_fails_explicitly() {
        let user = TestUser::new("u-a", "alice");
        let keyless = Profile::new("u-a", "alice", "#000");
        let profiles = Arc::new(InMemoryProfileStore::with_profiles(vec![keyless]));
        let (context, _transitions) = session_context(profiles, SessionConfig::default());
        let session = Arc::new(Session::new(user.id.clone(), context));

        let result = session.send(&join("wonk")).await;
        assert!(matches!(result, Err(SendError::MissingPublicKey(id)) if id == "u-a"));
        assert_eq!(session.backlog_len().await, 0);
    }

    #[tokio::test]
    async fn test_second_device_receives_same_envelope() {
        let mut f = fixture();
        let (phone, mut phone_rx) = connect(&f, 8);
        let (laptop, mut laptop_rx) = connect(&f, 8);
        f.session.attach(phone.clone()).await.unwrap();
        f.session.attach(laptop).await.unwrap();
        assert!(f.transitions.try_recv().unwrap().online);

        assert_eq!(f.session.send(&join("wonk")).await.unwrap(), Delivery::Written(2));
        assert_eq!(phone_rx.recv().await, laptop_rx.recv().await);

        phone.close();
        f.session.detach(phone.id()).await;
        assert!(f.session.is_alive().await);
        assert!(matches!(f.transitions.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_backlog_evicts_oldest_when_full() {
        let f = fixture_with(SessionConfig {
            backlog_capacity: 2,
            ..SessionConfig::default()
        });

        for room in ["one", "two", "three"] {
            f.session.send(&join(room)).await.unwrap();
        }
        assert_eq!(f.session.backlog_len().await, 2);

        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection).await.unwrap();
        f.session.flush().await;

        let first = open_envelope(&rx.recv().await.unwrap(), &f.user.secret);
        assert!(matches!(first, ServerEvent::UpdateMember(p) if p.room == "two"));
    }

    #[tokio::test]
    async fn test_stalled_connection_falls_back_to_backlog() {
        let mut f = fixture();
        let (connection, _rx) = connect(&f, 1);
        f.session.attach(connection.clone()).await.unwrap();
        assert!(f.transitions.try_recv().unwrap().online);

        assert_eq!(f.session.send(&join("one")).await.unwrap(), Delivery::Written(1));
        assert_eq!(f.session.send(&join("two")).await.unwrap(), Delivery::Queued);

        assert!(!connection.is_open());
        assert_eq!(f.session.backlog_len().await, 1);
        assert!(!f.transitions.try_recv().unwrap().online);
    }

    fn join_numbered(count: usize) -> Vec<ServerEvent> {
        (0..count).map(|i| join(&format!("room-{i}"))).collect()
    }

    #[tokio::test]
    async fn test_flush_replays_backlog_larger_than_write_queue() {
        let f = fixture();
        let config = SessionConfig::default();
        let total = config.connection_queue_capacity + 44;

        for event in join_numbered(total) {
            assert_eq!(f.session.send(&event).await.unwrap(), Delivery::Queued);
        }

        let (connection, mut rx) = connect(&f, config.connection_queue_capacity);
        f.session.attach(connection.clone()).await.unwrap();

        let reader = tokio::spawn(async move {
            let mut received = Vec::with_capacity(total);
            while received.len() < total {
                match rx.recv().await {
                    Some(envelope) => received.push(envelope),
                    None => break,
                }
            }
            (received, rx)
        });

        assert!(f.session.flush().await);
        let (received, _rx) = reader.await.unwrap();

        assert_eq!(received.len(), total);
        let rooms: Vec<String> = received
            .iter()
            .map(|envelope| match open_envelope(envelope, &f.user.secret) {
                ServerEvent::UpdateMember(payload) => payload.room,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        let expected: Vec<String> = (0..total).map(|i| format!("room-{i}")).collect();
        assert_eq!(rooms, expected);

        assert_eq!(f.session.backlog_len().await, 0);
        assert!(connection.is_open());
        assert!(f.session.is_alive().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_to_stalled_driver_requeues_remainder() {
        let mut f = fixture();
        for event in join_numbered(3) {
            f.session.send(&event).await.unwrap();
        }

        let (connection, _rx) = connect(&f, 1);
        f.session.attach(connection.clone()).await.unwrap();
        assert!(f.transitions.try_recv().unwrap().online);

        assert!(f.session.flush().await);

        assert!(!connection.is_open());
        assert_eq!(f.session.backlog_len().await, 2);
        assert!(!f.transitions.try_recv().unwrap().online);
    }

    fn heartbeat_config(interval_secs: u64, max_missed: u32) -> SessionConfig {
        SessionConfig {
            heartbeat: HeartbeatConfig {
                interval: Duration::from_secs(interval_secs),
                max_missed,
            },
            ..SessionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_with_increasing_counter() {
        let f = fixture_with(heartbeat_config(10, 5));
        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection).await.unwrap();

        tokio::time::sleep(Duration::from_secs(21)).await;

        let first = open_envelope(&rx.recv().await.unwrap(), &f.user.secret);
        let second = open_envelope(&rx.recv().await.unwrap(), &f.user.secret);
        assert_eq!(first, ServerEvent::ping(1));
        assert_eq!(second, ServerEvent::ping(2));

        assert!(f.session.pong(2).await);
        assert!(!f.session.pong(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_pongs_close_connections() {
        let mut f = fixture_with(heartbeat_config(10, 1));
        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection.clone()).await.unwrap();
        assert!(f.transitions.try_recv().unwrap().online);

        // Two unanswered pings, then the third tick times out
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(!connection.is_open());
        assert!(!f.session.is_alive().await);
        assert!(!f.transitions.try_recv().unwrap().online);

        let mut pings = 0;
        while let Some(envelope) = rx.recv().await {
            assert_eq!(envelope.event_name(), "ping");
            pings += 1;
        }
        assert_eq!(pings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_pings_keep_session_alive() {
        let f = fixture_with(heartbeat_config(10, 1));
        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection.clone()).await.unwrap();

        for expected in 1..=4u64 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let ping = open_envelope(&rx.recv().await.unwrap(), &f.user.secret);
            assert_eq!(ping, ServerEvent::ping(expected));
            assert!(f.session.pong(expected).await);
        }
        assert!(connection.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ping_after_session_goes_offline() {
        let f = fixture_with(heartbeat_config(10, 5));
        let (connection, mut rx) = connect(&f, 8);
        f.session.attach(connection.clone()).await.unwrap();

        connection.close();
        f.session.detach(connection.id()).await;
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(rx.recv().await, None);
        assert_eq!(f.session.send(&join("x")).await.unwrap(), Delivery::Queued);
        assert_eq!(f.session.backlog_len().await, 1);
    }
}
