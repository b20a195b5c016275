use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Change signals a Neos instance can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NodeUpdated,
    NodeAdded,
    NodeRemoved,
    NodePropertyChanged,
    NodePublished,
    NodeDiscarded,
    AfterNodePublishing,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::NodeUpdated,
        EventKind::NodeAdded,
        EventKind::NodeRemoved,
        EventKind::NodePropertyChanged,
        EventKind::NodePublished,
        EventKind::NodeDiscarded,
        EventKind::AfterNodePublishing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NodeUpdated => "nodeUpdated",
            EventKind::NodeAdded => "nodeAdded",
            EventKind::NodeRemoved => "nodeRemoved",
            EventKind::NodePropertyChanged => "nodePropertyChanged",
            EventKind::NodePublished => "nodePublished",
            EventKind::NodeDiscarded => "nodeDiscarded",
            EventKind::AfterNodePublishing => "afterNodePublishing",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// What this trigger instance asked the CMS for. Fixed for one activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubscription {
    pub target_url: String,
    /// Empty means every event kind.
    pub selected_events: BTreeSet<EventKind>,
}

impl EventSubscription {
    pub fn new(target_url: impl Into<String>, events: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            target_url: target_url.into(),
            selected_events: events.into_iter().collect(),
        }
    }

    pub fn covers_all(&self) -> bool {
        self.selected_events.is_empty()
    }

    pub fn accepts(&self, kind: EventKind) -> bool {
        self.covers_all() || self.selected_events.contains(&kind)
    }

    /// Filter on the raw `event` string. Names outside [`EventKind`] are
    /// never selected.
    pub fn accepts_name(&self, name: &str) -> bool {
        name.parse::<EventKind>().is_ok_and(|kind| self.accepts(kind))
    }

    /// Event list for the registration body; `None` lets the CMS default to all.
    pub fn requested_events(&self) -> Option<Vec<EventKind>> {
        if self.covers_all() {
            None
        } else {
            Some(self.selected_events.iter().copied().collect())
        }
    }

    /// Whether a remote registration was made for exactly this subscription.
    /// Event order and duplicates in the remote list are ignored.
    pub fn matches(&self, remote: &RemoteWebhook) -> bool {
        if remote.target_url != self.target_url {
            return false;
        }
        let remote_events: BTreeSet<&str> = remote.events.iter().map(String::as_str).collect();
        let local_events: BTreeSet<&str> = self.selected_events.iter().map(EventKind::as_str).collect();
        remote_events == local_events
    }
}

/// One entry of `GET /webhooks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWebhook {
    pub id: String,
    pub target_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /webhooks`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhook {
    pub target_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventKind>>,
}

/// Response of `POST /webhooks`. Fields are optional so that an incomplete
/// response can be reported instead of failing to decode.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedWebhook {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Event payload as delivered by the CMS and as handed to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub event: EventKind,
    pub node_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_workspace: Option<String>,
    pub timestamp: String,
    /// Any other payload fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A normalized event accepted by the gateway, queued for the consumer.
#[derive(Debug, Clone, Serialize)]
pub struct ForwardedEvent {
    pub delivery_id: String,
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: NormalizedEvent,
}
