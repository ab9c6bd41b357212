//! Gateway event names and the handler registry events are dispatched through.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

macro_rules! gateway_events {
    ($($variant:ident => $name:literal,)+) => {
        /// Dispatch event types known to the client.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Event {
            $($variant,)+
        }

        impl Event {
            /// All known events, in declaration order.
            pub const ALL: &'static [Event] = &[$(Event::$variant,)+];

            /// Wire name of the event (the `t` field of a dispatch).
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Event::$variant => $name,)+
                }
            }

            /// Translate a wire name. Unknown names yield `None`.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Event::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

gateway_events! {
    Ready => "READY",
    Resumed => "RESUMED",
    ChannelCreate => "CHANNEL_CREATE",
    ChannelUpdate => "CHANNEL_UPDATE",
    ChannelDelete => "CHANNEL_DELETE",
    ChannelPinsUpdate => "CHANNEL_PINS_UPDATE",
    GuildCreate => "GUILD_CREATE",
    GuildUpdate => "GUILD_UPDATE",
    GuildDelete => "GUILD_DELETE",
    GuildBanAdd => "GUILD_BAN_ADD",
    GuildBanRemove => "GUILD_BAN_REMOVE",
    GuildEmojisUpdate => "GUILD_EMOJIS_UPDATE",
    GuildIntegrationsUpdate => "GUILD_INTEGRATIONS_UPDATE",
    GuildMemberAdd => "GUILD_MEMBER_ADD",
    GuildMemberRemove => "GUILD_MEMBER_REMOVE",
    GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
    GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
    GuildRoleCreate => "GUILD_ROLE_CREATE",
    GuildRoleUpdate => "GUILD_ROLE_UPDATE",
    GuildRoleDelete => "GUILD_ROLE_DELETE",
    MessageCreate => "MESSAGE_CREATE",
    MessageUpdate => "MESSAGE_UPDATE",
    MessageDelete => "MESSAGE_DELETE",
    MessageDeleteBulk => "MESSAGE_DELETE_BULK",
    MessageReactionAdd => "MESSAGE_REACTION_ADD",
    MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
    MessageReactionRemoveAll => "MESSAGE_REACTION_REMOVE_ALL",
    PresenceUpdate => "PRESENCE_UPDATE",
    TypingStart => "TYPING_START",
    UserUpdate => "USER_UPDATE",
    VoiceStateUpdate => "VOICE_STATE_UPDATE",
    VoiceServerUpdate => "VOICE_SERVER_UPDATE",
    WebhooksUpdate => "WEBHOOKS_UPDATE",
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier returned on registration, used to remove a handler.
pub type HandlerId = u64;

type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;
type UnknownEventHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: HashMap<Event, Vec<(HandlerId, EventHandler)>>,
    unknown: Vec<(HandlerId, UnknownEventHandler)>,
    next_id: HandlerId,
}

impl Registry {
    fn allocate_id(&mut self) -> HandlerId {
        self.next_id += 1;
        self.next_id
    }
}

/// Registry of event handlers.
///
/// Handlers are called synchronously, in registration order, on the task that
/// dispatches the event. The registry lock is not held while they run, so a
/// handler may register or remove handlers.
#[derive(Default)]
pub struct EventDispatcher {
    registry: RwLock<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event type.
    pub fn add_handler<F>(&self, event: Event, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self.write();
        let id = registry.allocate_id();
        registry
            .handlers
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Register a handler for events whose name is not in the [`Event`] table.
    pub fn add_unknown_event_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let mut registry = self.write();
        let id = registry.allocate_id();
        registry.unknown.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler by ID. Returns true if found.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut registry = self.write();
        for handlers in registry.handlers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            if handlers.len() < before {
                return true;
            }
        }
        let before = registry.unknown.len();
        registry.unknown.retain(|(hid, _)| *hid != id);
        registry.unknown.len() < before
    }

    /// Number of handlers registered for an event.
    pub fn handler_count(&self, event: Event) -> usize {
        self.read().handlers.get(&event).map(|h| h.len()).unwrap_or(0)
    }

    /// Dispatch an event by wire name. Returns the translated event, if known.
    pub fn dispatch(&self, name: &str, payload: &Value) -> Option<Event> {
        match Event::from_name(name) {
            Some(event) => {
                let handlers: Vec<EventHandler> = self
                    .read()
                    .handlers
                    .get(&event)
                    .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
                    .unwrap_or_default();
                for handler in handlers {
                    handler(payload);
                }
                Some(event)
            }
            None => {
                let handlers: Vec<UnknownEventHandler> =
                    self.read().unknown.iter().map(|(_, h)| h.clone()).collect();
                for handler in handlers {
                    handler(name, payload);
                }
                None
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.read();
        f.debug_struct("EventDispatcher")
            .field("events", &registry.handlers.len())
            .field("unknown_handlers", &registry.unknown.len())
            .finish()
    }
}
