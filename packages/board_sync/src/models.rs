//! Shared board objects and the identities that edit them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable numeric user identifier issued by the identity provider.
pub type UserId = i64;

/// An authenticated user, as resolved from a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}

/// Advisory edit claim on a single object.
///
/// Serialized flat into the owning object as `focused_by`, `focused_at`
/// and `owner_name`, which is the shape board clients already render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusLock {
    pub focused_by: UserId,
    pub focused_at: DateTime<Utc>,
    #[serde(default)]
    pub owner_name: String,
}

impl FocusLock {
    pub fn held_by(identity: &Identity) -> Self {
        Self {
            focused_by: identity.user_id,
            focused_at: Utc::now(),
            owner_name: identity.display_name.clone(),
        }
    }
}

/// A shape, text block or image placed on a board.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SharedObject {
    pub id: String,
    /// Free-form type tag (`text`, `image`, `rectangle`, `circle`, `line`, ...)
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    /// Text body or image URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(flatten)]
    pub focus: Option<FocusLock>,
}

impl SharedObject {
    /// An object with nothing but an id, used when focus lands on an
    /// object the board has never seen.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn focused_by(&self) -> Option<UserId> {
        self.focus.as_ref().map(|lock| lock.focused_by)
    }

    /// True if another user currently holds the focus lock.
    pub fn is_locked_against(&self, user_id: UserId) -> bool {
        matches!(self.focused_by(), Some(holder) if holder != user_id)
    }

    /// Copy every client-editable field from `incoming`, leaving the id and
    /// the lock untouched.
    pub fn replace_contents(&mut self, incoming: SharedObject) {
        let SharedObject {
            id: _,
            kind,
            x,
            y,
            width,
            height,
            rotation,
            content,
            color,
            focus: _,
        } = incoming;
        self.kind = kind;
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self.rotation = rotation;
        self.content = content;
        self.color = color;
    }
}
