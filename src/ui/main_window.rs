use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use adw::prelude::*;
use adw::Application;

use crate::hooks::{self, ConversationList, SnippetView};
use crate::sync::local::LocalClient;
use crate::sync::models::User;
use crate::ui::search_users::SearchUsers;
use crate::ui::sidebar::{Sidebar, SidebarItem};

pub fn show_main_window(app: &Application, client: &LocalClient, me: Option<User>) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Ripple")
        .default_width(960)
        .default_height(640)
        .build();

    let overlay = adw::ToastOverlay::new();

    let split = adw::Flap::builder()
        .reveal_flap(true)
        .locked(true)
        .modal(false)
        .build();

    let sidebar = Rc::new(Sidebar::new());
    split.set_flap(Some(&sidebar.widget()));

    let me_id = me.as_ref().map(|u| u.id.clone());
    let chat = crate::ui::chat_view::ChatView::new(client, me_id.clone());
    split.set_content(Some(&chat.widget()));

    overlay.set_child(Some(&split));

    let container = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    let title = gtk4::Label::new(Some("Ripple"));
    header.set_title_widget(Some(&title));

    let members_btn = gtk4::Button::with_label("Members");
    members_btn.set_sensitive(false);
    header.pack_end(&members_btn);
    container.append(&header);
    container.append(&overlay);
    window.set_content(Some(&container));
    window.present();

    // One channel carries every sidebar-related snapshot change; the handler
    // re-reads the handles on the main context.
    let (tx, rx) = crate::utils::glib_channel::<()>();
    let notify = hooks::glib_notify(&tx);

    let conversations: Rc<RefCell<ConversationList>> = Rc::new(RefCell::new(
        hooks::watch_filtered_conversations(client, "", notify.clone()),
    ));
    let snippets: Rc<RefCell<BTreeMap<String, SnippetView>>> =
        Rc::new(RefCell::new(BTreeMap::new()));
    let selected: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    let refresh: Rc<dyn Fn()> = {
        let conversations = conversations.clone();
        let snippets = snippets.clone();
        let sidebar = sidebar.clone();
        let client = client.clone();
        let notify = notify.clone();
        Rc::new(move || {
            let snap = conversations.borrow().snapshot();
            if let Some(err) = &snap.error {
                log::warn!("conversation list query failed: {err}");
            }
            {
                // Keep one snippet binding per listed conversation; stale
                // handles drop here and unsubscribe.
                let mut snippets = snippets.borrow_mut();
                snippets.retain(|id, _| snap.conversations.contains_key(id));
                for id in snap.conversations.keys() {
                    if !snippets.contains_key(id) {
                        snippets.insert(
                            id.clone(),
                            hooks::conversation_snippet(&client, id, notify.clone()),
                        );
                    }
                }
            }
            let snippets = snippets.borrow();
            let items = snap
                .conversations
                .values()
                .map(|convo| SidebarItem {
                    id: convo.id.clone(),
                    name: convo.name.clone(),
                    snippet: snippets.get(&convo.id).and_then(|s| s.text()),
                })
                .collect();
            sidebar.set_items(items);
        })
    };

    {
        let refresh = refresh.clone();
        rx.attach(None, move |_| {
            (refresh)();
            glib::ControlFlow::Continue
        });
    }

    {
        let conversations = conversations.clone();
        let client = client.clone();
        sidebar.connect_search_changed(move |text| {
            // Re-binding emits a fresh snapshot, which lands on the channel.
            *conversations.borrow_mut() =
                hooks::watch_filtered_conversations(&client, &text, notify.clone());
        });
    }

    {
        let selected = selected.clone();
        let chat = chat.clone();
        let members_btn = members_btn.clone();
        sidebar.connect_selected(move |id| {
            *selected.borrow_mut() = Some(id.clone());
            chat.show_conversation(&id);
            members_btn.set_sensitive(true);
        });
    }

    {
        let client = client.clone();
        let dialogs: Rc<RefCell<HashMap<String, Rc<SearchUsers>>>> =
            Rc::new(RefCell::new(HashMap::new()));
        let overlay = overlay.clone();
        members_btn.connect_clicked(move |_| {
            let Some(id) = selected.borrow().clone() else {
                overlay.add_toast(adw::Toast::new("Select a conversation first."));
                return;
            };
            let mut dialogs = dialogs.borrow_mut();
            let dialog = dialogs.entry(id.clone()).or_insert_with(|| {
                SearchUsers::new(&window, &client, me_id.clone(), &id)
            });
            dialog.set_open(true);
        });
    }

    refresh();
}
