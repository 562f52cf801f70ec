mod app;
mod hooks;
mod storage;
mod sync;
mod ui;
mod utils;

use adw::prelude::*;
use adw::Application;

use crate::sync::local::LocalClient;

fn main() {
    let app = Application::builder()
        .application_id("com.example.RippleGtk")
        .build();
    app.connect_activate(|app| {
        if let Err(e) = crate::storage::init() {
            log::warn!("cache init failed: {e}");
        }
        let client = LocalClient::with_cache();
        crate::app::build_ui(app, &client);
    });
    app.run();
}
