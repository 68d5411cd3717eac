//! Moderation events and the bus that carries them

mod action;
mod bus;

pub use action::{Action, ActionExtra, ActionKind, ActionOutcome, MOD_ACTION_TOPIC, Moderator};
pub use bus::{EventBus, FnSubscriber, Subscriber};

use std::sync::Arc;

/// Topic of the signal asking caches to reload guild configuration
pub const GUILD_CONFIG_REFRESH: &str = "guildConfigRefresh";

/// An item on the bus: a structured action, or a bare topic signal
#[derive(Debug, Clone)]
pub enum BusEvent {
    Action(Arc<Action>),
    Signal(Arc<str>),
}

impl BusEvent {
    /// Topic this event is routed by
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Action(action) => &action.topic,
            Self::Signal(topic) => topic,
        }
    }

    /// The carried action, if this is not a signal
    #[must_use]
    pub fn action(&self) -> Option<&Action> {
        match self {
            Self::Action(action) => Some(action),
            Self::Signal(_) => None,
        }
    }
}

impl From<Action> for BusEvent {
    fn from(action: Action) -> Self {
        Self::Action(Arc::new(action))
    }
}

impl From<Arc<Action>> for BusEvent {
    fn from(action: Arc<Action>) -> Self {
        Self::Action(action)
    }
}

impl From<&str> for BusEvent {
    fn from(topic: &str) -> Self {
        Self::Signal(Arc::from(topic))
    }
}

impl From<String> for BusEvent {
    fn from(topic: String) -> Self {
        Self::Signal(Arc::from(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_resolution() {
        let action = Action::new(ActionKind::Ban, Moderator::System, 1).with_topic("custom");
        assert_eq!(BusEvent::from(action).topic(), "custom");
        assert_eq!(BusEvent::from(GUILD_CONFIG_REFRESH).topic(), GUILD_CONFIG_REFRESH);
        assert!(BusEvent::from("x").action().is_none());
    }
}
