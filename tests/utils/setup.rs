#![allow(dead_code)] // Test utilities may not all be used in every test

use aes_gcm::aead::OsRng;
use k256::SecretKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use roomcast::{
    auth::{JwtAuthenticator, TokenConfig},
    crypto::{decrypt, encode_public_key, Ciphertext},
    profile::{InMemoryProfileStore, Profile, ProfileStore},
    room::{InMemoryRoomDirectory, RoomDirectory, RoomModel},
    session::{ChannelConnection, Connection, PresenceReceiver, Session, Transport},
    AppState, Envelope, PresenceTracker, ServerEvent, SessionConfig,
};

use super::mocks::{FlakyProfileStore, FlakyRoomDirectory};

pub const TEST_SECRET: &str = "integration-secret";

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

#[derive(Clone)]
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub secret: SecretKey,
}

impl TestUser {
    pub fn new(id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> String {
        encode_public_key(&self.secret.public_key())
    }

    pub fn token(&self) -> String {
        TokenConfig::with_secret(TEST_SECRET)
            .create_token(&self.id)
            .unwrap()
    }

    pub fn open(&self, envelope: &Envelope) -> ServerEvent {
        let ciphertext: Ciphertext = serde_json::from_str(envelope.data()).unwrap();
        let plaintext = decrypt(&ciphertext, &self.secret).unwrap();
        serde_json::from_slice(&plaintext).unwrap()
    }
}

/// One physical connection as seen from the client side
pub struct TestClient {
    pub user: TestUser,
    pub session: Arc<Session>,
    pub connection: Arc<ChannelConnection>,
    outbound: mpsc::Receiver<Envelope>,
}

impl TestClient {
    /// Next event written to this connection, decrypted
    pub async fn next_event(&mut self) -> ServerEvent {
        let envelope = tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .unwrap_or_else(|_| panic!("{} received nothing", self.user.id))
            .unwrap_or_else(|| panic!("{} connection closed", self.user.id));
        self.user.open(&envelope)
    }

    pub fn try_next_event(&mut self) -> Option<ServerEvent> {
        self.outbound
            .try_recv()
            .ok()
            .map(|envelope| self.user.open(&envelope))
    }

    pub async fn expect_connect(&mut self) {
        assert_eq!(self.next_event().await, ServerEvent::connect());
    }

    /// Closes the transport and lets the session observe it
    pub async fn disconnect(self) {
        self.connection.close();
        self.session.detach(self.connection.id()).await;
    }
}

pub struct TestSetup {
    pub state: AppState,
    pub tracker: PresenceTracker,
    pub users: HashMap<String, TestUser>,
    transitions: PresenceReceiver,
}

impl TestSetup {
    pub fn user(&self, id: &str) -> &TestUser {
        self.users
            .get(id)
            .unwrap_or_else(|| panic!("unknown test user {}", id))
    }

    /// Opens a connection through the gateway, as a transport handler would
    pub async fn connect(&self, id: &str) -> TestClient {
        let user = self.user(id).clone();
        let opened = self
            .state
            .gateway
            .open(&user.id, Transport::Socket)
            .await
            .unwrap();
        TestClient {
            user,
            session: opened.session,
            connection: opened.connection,
            outbound: opened.outbound,
        }
    }

    /// Runs the presence tracker over every transition reported so far.
    /// Returns the number of sessions notified.
    pub async fn process_presence(&mut self) -> usize {
        let mut notified = 0;
        while let Ok(transition) = self.transitions.try_recv() {
            notified += self.tracker.handle_transition(&transition).await.unwrap();
        }
        notified
    }
}

pub struct TestSetupBuilder {
    users: Vec<TestUser>,
    keyless: Vec<(String, String)>,
    rooms: Vec<(String, Vec<String>)>,
    broken_rooms: HashSet<String>,
    broken_keys: HashSet<String>,
    config: SessionConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            keyless: vec![],
            rooms: vec![],
            broken_rooms: HashSet::new(),
            broken_keys: HashSet::new(),
            config: SessionConfig::default(),
        }
    }

    pub fn with_users(mut self, users: Vec<(&str, &str)>) -> Self {
        self.users
            .extend(users.into_iter().map(|(id, name)| TestUser::new(id, name)));
        self
    }

    /// A user with a profile but no registered public key
    pub fn with_keyless_user(mut self, id: &str, username: &str) -> Self {
        self.keyless.push((id.to_string(), username.to_string()));
        self
    }

    pub fn with_room(mut self, id: &str, members: Vec<&str>) -> Self {
        self.rooms.push((
            id.to_string(),
            members.into_iter().map(|m| m.to_string()).collect(),
        ));
        self
    }

    pub fn with_broken_room(mut self, id: &str) -> Self {
        self.broken_rooms.insert(id.to_string());
        self
    }

    pub fn with_broken_key(mut self, user_id: &str) -> Self {
        self.broken_keys.insert(user_id.to_string());
        self
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TestSetup {
        let mut profiles: Vec<Profile> = self
            .users
            .iter()
            .map(|user| {
                Profile::new(user.id.as_str(), user.username.as_str(), "#336699")
                    .with_public_key(user.public_key())
            })
            .collect();
        profiles.extend(self.keyless.iter().map(|(id, username)| {
            Profile::new(id.as_str(), username.as_str(), "#999999")
        }));

        let rooms = InMemoryRoomDirectory::with_rooms(
            self.rooms
                .iter()
                .map(|(id, members)| RoomModel {
                    id: id.clone(),
                    members: members.clone(),
                })
                .collect(),
        );

        let profiles: Arc<dyn ProfileStore> = Arc::new(FlakyProfileStore::new(
            InMemoryProfileStore::with_profiles(profiles),
            self.broken_keys.clone(),
        ));
        let rooms: Arc<dyn RoomDirectory> =
            Arc::new(FlakyRoomDirectory::new(rooms, self.broken_rooms.clone()));

        let (state, transitions) = AppState::new(
            profiles,
            rooms,
            Arc::new(JwtAuthenticator::new(TokenConfig::with_secret(TEST_SECRET))),
            self.config.clone(),
        );
        let tracker = state.presence_tracker();

        TestSetup {
            state,
            tracker,
            users: self
                .users
                .iter()
                .map(|user| (user.id.clone(), user.clone()))
                .collect(),
            transitions,
        }
    }
}
