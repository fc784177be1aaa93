//! Session context and mode resolution.
//!
//! The admin UI names the iframe `hydra-edit:<origin>` or `hydra-view:<origin>`.
//! The frame name survives client-side navigation inside the iframe, so it is
//! the source of truth for the mode and for the origin messages go to. Any
//! other name means the page is not hosted by an admin UI.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

use crate::error::SessionError;

/// Frame name prefix shared by both modes.
pub const FRAME_NAME_PREFIX: &str = "hydra-";

/// Query parameter carrying the editor's access token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Storage key for the persisted access token.
pub const ACCESS_TOKEN_KEY: &str = "hydra_access_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Edit,
    View,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Edit => f.write_str("edit"),
            Mode::View => f.write_str("view"),
        }
    }
}

/// Tag stamped on every envelope of one iframe session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTag(pub SmolStr);

impl SessionTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mode and admin origin for this iframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub mode: Mode,
    /// Serialized origin of the admin window (`https://admin.example`).
    pub admin_origin: String,
    pub tag: SessionTag,
}

impl SessionContext {
    pub fn new(mode: Mode, admin_origin: &str) -> Result<Self, SessionError> {
        let origin = normalize_origin(admin_origin)?;
        let tag = SessionTag(format_smolstr!("{mode}:{origin}"));
        Ok(Self {
            mode,
            admin_origin: origin,
            tag,
        })
    }

    /// Parse a frame name. `Ok(None)` for names that are not ours.
    pub fn from_frame_name(name: &str) -> Result<Option<Self>, SessionError> {
        let Some(rest) = name.strip_prefix(FRAME_NAME_PREFIX) else {
            return Ok(None);
        };
        let (mode, origin) = if let Some(origin) = rest.strip_prefix("edit:") {
            (Mode::Edit, origin)
        } else if let Some(origin) = rest.strip_prefix("view:") {
            (Mode::View, origin)
        } else {
            return Ok(None);
        };
        if origin.is_empty() {
            return Err(SessionError::MalformedFrameName(name.to_string()));
        }
        Self::new(mode, origin).map(Some)
    }

    /// Frame name that encodes this context.
    pub fn frame_name(&self) -> String {
        format!("{FRAME_NAME_PREFIX}{}:{}", self.mode, self.admin_origin)
    }

    pub fn is_editing(&self) -> bool {
        self.mode == Mode::Edit
    }
}

fn normalize_origin(raw: &str) -> Result<String, SessionError> {
    let invalid = |reason: &str| SessionError::InvalidOrigin {
        origin: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(invalid("opaque origin"));
    }
    Ok(origin.ascii_serialization())
}

/// Session-scoped storage for the access token.
pub trait TokenStore {
    fn get(&self) -> Option<String>;
    fn set(&mut self, token: &str);
}

/// Token store kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    token: Option<String>,
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token.clone()
    }

    fn set(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }
}

/// Token from the page URL, persisted; otherwise the stored one.
pub fn resolve_access_token(page_url: &str, store: &mut dyn TokenStore) -> Option<String> {
    let from_url = url::Url::parse(page_url).ok().and_then(|url| {
        url.query_pairs()
            .find(|(k, _)| k == ACCESS_TOKEN_PARAM)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    });
    match from_url {
        Some(token) => {
            store.set(&token);
            Some(token)
        }
        None => store.get(),
    }
}

/// Tracks the session across same-document navigations.
#[derive(Debug, Clone, Default)]
pub struct ModeController {
    context: Option<SessionContext>,
    access_token: Option<String>,
}

impl ModeController {
    /// Resolve the session from the frame name and the access token from the
    /// page URL (or the store).
    pub fn new(
        frame_name: &str,
        page_url: &str,
        store: &mut dyn TokenStore,
    ) -> Result<Self, SessionError> {
        let context = SessionContext::from_frame_name(frame_name)?;
        let access_token = if context.is_some() {
            resolve_access_token(page_url, store)
        } else {
            None
        };
        tracing::debug!(
            mode = ?context.as_ref().map(|c| c.mode),
            has_token = access_token.is_some(),
            "mode resolved"
        );
        Ok(Self {
            context,
            access_token,
        })
    }

    /// Re-read the frame name after navigation. Returns whether the context
    /// changed.
    pub fn refresh(&mut self, frame_name: &str) -> Result<bool, SessionError> {
        let context = SessionContext::from_frame_name(frame_name)?;
        if context == self.context {
            return Ok(false);
        }
        tracing::info!(
            from = ?self.context.as_ref().map(|c| &c.tag),
            to = ?context.as_ref().map(|c| &c.tag),
            "session context changed"
        );
        self.context = context;
        Ok(true)
    }

    pub fn context(&self) -> Option<&SessionContext> {
        self.context.as_ref()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.context.as_ref().map(|c| c.mode)
    }

    pub fn is_editing(&self) -> bool {
        self.context.as_ref().is_some_and(SessionContext::is_editing)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}
