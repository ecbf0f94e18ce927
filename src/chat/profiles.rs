use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;

use crate::backend::Backend;
use crate::common::Profile;
use crate::error::ChatError;

pub const DEFAULT_PLACEHOLDER_NAME: &str = "Unknown User";

/// Display-name lookup shared by the session and its load tasks.
///
/// Resolved names are cached for the lifetime of the directory, so each
/// partner's profile is fetched at most once. Misses are not cached.
#[derive(Debug, Clone)]
pub struct ProfileDirectory {
    names: Arc<Mutex<HashMap<String, String>>>,
    placeholder: String,
}

impl ProfileDirectory {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            names: Arc::new(Mutex::new(HashMap::new())),
            placeholder: placeholder.into(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn cached(&self, user_id: &str) -> Option<String> {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    fn remember(&self, user_id: &str, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), name.to_string());
    }

    /// Name for `user_id`, falling back to the placeholder.
    pub async fn display_name<B: Backend>(&self, backend: &B, user_id: &str) -> String {
        if let Some(name) = self.cached(user_id) {
            return name;
        }

        match fetch_display_name(backend, user_id).await {
            Ok(name) => {
                self.remember(user_id, &name);
                name
            }
            Err(ChatError::NotFound(id)) => {
                log::debug!("No profile name for {id}");
                self.placeholder.clone()
            }
            Err(err) => {
                log::warn!("Profile lookup for {user_id} failed: {err}");
                self.placeholder.clone()
            }
        }
    }

    /// Resolves every id concurrently; duplicates are looked up once.
    pub async fn resolve_all<B: Backend>(
        &self,
        backend: &B,
        user_ids: &[String],
    ) -> HashMap<String, String> {
        let mut unique: Vec<&String> = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let names = join_all(unique.iter().map(|id| self.display_name(backend, id))).await;
        unique.into_iter().cloned().zip(names).collect()
    }
}

async fn fetch_display_name<B: Backend>(backend: &B, user_id: &str) -> Result<String, ChatError> {
    let profile = backend.get_profile(user_id).await?;
    profile
        .as_ref()
        .and_then(Profile::name)
        .map(str::to_string)
        .ok_or_else(|| ChatError::NotFound(user_id.to_string()))
}
