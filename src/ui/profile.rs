use adw::prelude::*;
use adw::Application;
use gtk4 as gtk;

use crate::app::AppState;
use crate::sync::local::LocalClient;
use crate::sync::models::User;

/// First-run window: captures the session identity the rest of the UI is
/// handed explicitly. Shown whenever no profile has been saved yet.
pub fn show_profile_window(app: &Application, client: &LocalClient) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Ripple — Profile")
        .default_width(420)
        .default_height(260)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some("Who are you?"));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let name_entry = gtk::Entry::new();
    name_entry.set_placeholder_text(Some("Display name"));
    name_entry.set_hexpand(true);

    let id_entry = gtk::Entry::new();
    id_entry.set_placeholder_text(Some("User id (optional, derived from the name)"));
    id_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&name_entry);
    form.append(&id_entry);
    root.append(&form);

    let save_btn = gtk::Button::with_label("Start chatting");
    save_btn.add_css_class("suggested-action");
    save_btn.set_halign(gtk::Align::End);
    root.append(&save_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    header.set_title_widget(Some(&gtk::Label::new(Some("Ripple"))));
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    let on_save = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let client = client.clone();
        let name_entry = name_entry.clone();
        let id_entry = id_entry.clone();
        move || {
            let name = name_entry.text().trim().to_string();
            if name.is_empty() {
                overlay.add_toast(adw::Toast::new("Please enter a display name."));
                return;
            }
            let id = {
                let entered = id_entry.text().trim().to_string();
                if entered.is_empty() { slugify(&name) } else { entered }
            };

            let state = AppState {
                user_id: id.clone(),
                display_name: name.clone(),
            };
            if let Err(e) = state.save() {
                overlay.add_toast(adw::Toast::new(&format!("Failed to save profile: {}", e)));
                return;
            }

            let me = User { id, name };
            client.upsert_user(&me);
            crate::app::ensure_sample_data(&client, &me);
            crate::ui::main_window::show_main_window(&app, &client, Some(me));
            window.close();
        }
    };

    use std::rc::Rc;
    let on_save: Rc<dyn Fn()> = Rc::new(on_save);
    {
        let on_save = on_save.clone();
        save_btn.connect_clicked(move |_| (on_save)());
    }
    {
        let on_save = on_save.clone();
        name_entry.connect_activate(move |_| (on_save)());
    }
    {
        let on_save = on_save.clone();
        id_entry.connect_activate(move |_| (on_save)());
    }

    window.present();
}

fn slugify(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_flattens_names() {
        assert_eq!(slugify("Uma Thurman"), "uma-thurman");
        assert_eq!(slugify("  Vic  "), "vic");
    }
}
