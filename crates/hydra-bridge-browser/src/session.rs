//! Browser sources for the mode controller: window name, page URL and
//! sessionStorage.

use hydra_bridge_core::TokenStore;
use hydra_bridge_core::session::ACCESS_TOKEN_KEY;
use web_sys::Storage;

use crate::{PlatformError, window};

/// The iframe's `window.name`, empty when unset.
pub fn frame_name() -> Result<String, PlatformError> {
    Ok(window()?.name()?)
}

pub fn page_url() -> Result<String, PlatformError> {
    Ok(window()?.location().href()?)
}

/// Current pathname, the value sent with `INIT` and `PATH_CHANGE`.
pub fn page_path() -> Result<String, PlatformError> {
    Ok(window()?.location().pathname()?)
}

/// Access token persisted in `sessionStorage`.
///
/// Storage can be unavailable (sandboxed frames, privacy modes); the store
/// then degrades to remembering nothing.
#[derive(Debug, Clone)]
pub struct SessionStorageTokenStore {
    storage: Option<Storage>,
}

impl SessionStorageTokenStore {
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|w| match w.session_storage() {
            Ok(storage) => storage,
            Err(e) => {
                tracing::warn!(error = ?e, "sessionStorage unavailable");
                None
            }
        });
        Self { storage }
    }
}

impl Default for SessionStorageTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for SessionStorageTokenStore {
    fn get(&self) -> Option<String> {
        self.storage
            .as_ref()?
            .get_item(ACCESS_TOKEN_KEY)
            .ok()
            .flatten()
    }

    fn set(&mut self, token: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.set_item(ACCESS_TOKEN_KEY, token) {
            tracing::warn!(error = ?e, "failed to persist access token");
        }
    }
}
