use std::fs;
use std::path::PathBuf;

use adw::Application;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::sync::local::LocalClient;
use crate::sync::models::{self, Conversation, Message, User};
use crate::sync::query::SyncStatus;

/// Persisted profile. This is the session identity the windows and the
/// membership dialog receive explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppState {
    pub user_id: String,
    pub display_name: String,
}

impl AppState {
    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("ripple.toml"))
    }

    pub fn load() -> Self {
        if let Some(path) = Self::toml_path() {
            if let Ok(text) = fs::read_to_string(&path) {
                if let Ok(state) = toml::from_str::<AppState>(&text) {
                    return state;
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) -> std::io::Result<()> {
        if let Some(path) = Self::toml_path() {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let toml = toml::to_string_pretty(self)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            fs::write(path, toml)
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir"))
        }
    }

    pub fn current_user(&self) -> Option<User> {
        if self.user_id.is_empty() {
            return None;
        }
        Some(User {
            id: self.user_id.clone(),
            name: if self.display_name.is_empty() {
                self.user_id.clone()
            } else {
                self.display_name.clone()
            },
        })
    }
}

pub fn build_ui(app: &Application, client: &LocalClient) {
    let state = AppState::load();
    match state.current_user() {
        Some(me) => {
            // Keep the user record in step with the saved profile.
            client.upsert_user(&me);
            ensure_sample_data(client, &me);
            crate::ui::main_window::show_main_window(app, client, Some(me));
        }
        None => crate::ui::profile::show_profile_window(app, client),
    }
}

/// First-run sample data so the store (and every query above it) has
/// something to show.
pub fn ensure_sample_data(client: &LocalClient, me: &User) {
    if !client.is_empty(models::CONVERSATIONS) {
        return;
    }
    let ada = User { id: "ada".into(), name: "Ada".into() };
    let grace = User { id: "grace".into(), name: "Grace".into() };
    let linus = User { id: "linus".into(), name: "Linus".into() };
    for user in [&ada, &grace, &linus] {
        client.upsert_user(user);
    }

    client.upsert_conversation(&Conversation {
        id: "general".into(),
        name: "General".into(),
        members: [me.id.clone(), ada.id.clone(), grace.id.clone()].into_iter().collect(),
        members_info: None,
    });
    client.upsert_conversation(&Conversation {
        id: "random".into(),
        name: "Random".into(),
        members: [me.id.clone(), linus.id.clone()].into_iter().collect(),
        members_info: None,
    });

    let start = crate::utils::now_millis() - 60_000;
    let opening = [
        (&ada, "Welcome to Ripple!"),
        (&grace, "Everything you see here is served from local queries."),
        (&ada, "Try the Members button to invite someone."),
    ];
    for (i, (sender, text)) in opening.into_iter().enumerate() {
        client.insert_message(
            &Message {
                id: format!("seed-{i}"),
                conversation_id: "general".into(),
                sender_id: sender.id.clone(),
                text: text.into(),
                created_at: start + (i as i64) * 1_000,
                sender: None,
            },
            SyncStatus::Confirmed,
        );
    }
}
