//! Server lifecycle forwards.
//!
//! Plain notify-all listener sets for client, level, frame and entity
//! lifecycle. Only client connect returns a value: any listener answering
//! `false` refuses the connection, but every listener still runs.

use crate::listener::{Listener, ListenerRegistry};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// `(slot, name, network_id)`; `false` refuses the client.
pub type ConnectCallback = dyn Fn(i32, &str, &str) -> bool + Send + Sync;
/// `(slot)`.
pub type ClientCallback = dyn Fn(i32) + Send + Sync;
/// `(slot, reason)`.
pub type DisconnectCallback = dyn Fn(i32, i32) + Send + Sync;
/// `(map_name, map_entities)`.
pub type LevelInitCallback = dyn Fn(&str, &str) + Send + Sync;
pub type NotifyCallback = dyn Fn() + Send + Sync;
/// `(simulating, first_tick, last_tick)`.
pub type GameFrameCallback = dyn Fn(bool, bool, bool) + Send + Sync;
/// `(entity_index)`.
pub type EntityCallback = dyn Fn(i32) + Send + Sync;

macro_rules! listener_constructor {
    ($callback:ty, ($($arg:ty),*) $(-> $ret:ty)?) => {
        impl Listener<$callback> {
            pub fn new<F>(callback: F) -> Self
            where
                F: Fn($($arg),*) $(-> $ret)? + Send + Sync + 'static,
            {
                Self::from_arc(Arc::new(callback))
            }
        }
    };
}

listener_constructor!(ConnectCallback, (i32, &str, &str) -> bool);
listener_constructor!(ClientCallback, (i32));
listener_constructor!(DisconnectCallback, (i32, i32));
listener_constructor!(LevelInitCallback, (&str, &str));
listener_constructor!(NotifyCallback, ());
listener_constructor!(GameFrameCallback, (bool, bool, bool));

/// All lifecycle listener sets.
#[derive(Default)]
pub struct Forwards {
    pub client_connect: ListenerRegistry<ConnectCallback>,
    pub client_connect_post: ListenerRegistry<ClientCallback>,
    pub client_connected: ListenerRegistry<ClientCallback>,
    pub client_put_in_server: ListenerRegistry<ClientCallback>,
    pub client_disconnect: ListenerRegistry<DisconnectCallback>,
    pub client_disconnect_post: ListenerRegistry<DisconnectCallback>,
    pub level_init: ListenerRegistry<LevelInitCallback>,
    pub level_shutdown: ListenerRegistry<NotifyCallback>,
    pub server_activate: ListenerRegistry<NotifyCallback>,
    pub game_frame: ListenerRegistry<GameFrameCallback>,
    pub entity_created: ListenerRegistry<EntityCallback>,
    pub entity_spawned: ListenerRegistry<EntityCallback>,
    pub entity_deleted: ListenerRegistry<EntityCallback>,
}

impl Forwards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if any listener refused the client.
    pub fn on_client_connect(&self, slot: i32, name: &str, network_id: &str) -> bool {
        debug!("🔌 Client connect {} ({}, {})", slot, name, network_id);
        let mut refused = false;
        self.client_connect.notify_all(|callback| {
            refused |= !callback(slot, name, network_id);
        });
        !refused
    }

    pub fn on_client_connect_post(&self, slot: i32) {
        self.client_connect_post.notify_all(|callback| callback(slot));
    }

    pub fn on_client_connected(&self, slot: i32) {
        self.client_connected.notify_all(|callback| callback(slot));
    }

    pub fn on_client_put_in_server(&self, slot: i32) {
        self.client_put_in_server.notify_all(|callback| callback(slot));
    }

    pub fn on_client_disconnect(&self, slot: i32, reason: i32) {
        debug!("🔌 Client disconnect {} (reason {})", slot, reason);
        self.client_disconnect.notify_all(|callback| callback(slot, reason));
    }

    pub fn on_client_disconnect_post(&self, slot: i32, reason: i32) {
        self.client_disconnect_post.notify_all(|callback| callback(slot, reason));
    }

    pub fn on_level_init(&self, map_name: &str, map_entities: &str) {
        debug!("🗺️ Level init {}", map_name);
        self.level_init.notify_all(|callback| callback(map_name, map_entities));
    }

    pub fn on_level_shutdown(&self) {
        self.level_shutdown.notify_all(|callback| callback());
    }

    pub fn on_server_activate(&self) {
        self.server_activate.notify_all(|callback| callback());
    }

    pub fn on_game_frame(&self, simulating: bool, first_tick: bool, last_tick: bool) {
        self.game_frame
            .notify_all(|callback| callback(simulating, first_tick, last_tick));
    }

    pub fn on_entity_created(&self, entity: i32) {
        self.entity_created.notify_all(|callback| callback(entity));
    }

    pub fn on_entity_spawned(&self, entity: i32) {
        self.entity_spawned.notify_all(|callback| callback(entity));
    }

    pub fn on_entity_deleted(&self, entity: i32) {
        self.entity_deleted.notify_all(|callback| callback(entity));
    }
}

impl fmt::Debug for Forwards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwards")
            .field("client_connect", &self.client_connect.len())
            .field("level_init", &self.level_init.len())
            .field("game_frame", &self.game_frame.len())
            .finish_non_exhaustive()
    }
}
