pub mod chat_view;
pub mod main_window;
pub mod profile;
pub mod search_users;
pub mod sidebar;
