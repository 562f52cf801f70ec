use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use adw::prelude::*;
use gtk4 as gtk;

use crate::hooks;
use crate::sync::client::SyncClient;
use crate::sync::local::LocalClient;
use crate::sync::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAction {
    Leave,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    pub user_id: String,
    pub label: String,
    pub action: MemberAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRow {
    pub user_id: String,
    pub label: String,
}

/// Rows for the Members group: the current user (when they are a member)
/// comes first, tagged "(me)" with a Leave action; everyone else gets a
/// Remove action. Without a resolvable session identity there is no
/// "(me)"/Leave row, which is not an error.
pub fn member_rows(
    members_info: &BTreeMap<String, User>,
    current_user: Option<&str>,
) -> Vec<MemberRow> {
    let mut rows = Vec::new();
    if let Some(uid) = current_user {
        if let Some(me) = members_info.get(uid) {
            rows.push(MemberRow {
                user_id: me.id.clone(),
                label: format!("{} (me)", me.name),
                action: MemberAction::Leave,
            });
        }
    }
    for (id, user) in members_info {
        if Some(id.as_str()) == current_user {
            continue;
        }
        rows.push(MemberRow {
            user_id: id.clone(),
            label: user.name.clone(),
            action: MemberAction::Remove,
        });
    }
    rows
}

pub fn invite_rows(non_members: &BTreeMap<String, User>) -> Vec<InviteRow> {
    non_members
        .values()
        .map(|user| InviteRow {
            user_id: user.id.clone(),
            label: user.name.clone(),
        })
        .collect()
}

fn matches_search(label: &str, search: &str) -> bool {
    search.is_empty() || label.to_lowercase().contains(&search.to_lowercase())
}

/// The member-search/invite dialog. Visibility is controlled by the parent
/// through `set_open`; the dialog owns no open/closed state of its own.
pub struct SearchUsers {
    window: adw::Window,
}

impl SearchUsers {
    pub fn new(
        parent: &adw::ApplicationWindow,
        client: &LocalClient,
        current_user: Option<String>,
        conversation_id: &str,
    ) -> Rc<Self> {
        let window = adw::Window::builder()
            .transient_for(parent)
            .modal(true)
            .title("Members")
            .default_width(420)
            .default_height(480)
            .hide_on_close(true)
            .build();

        let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
        let header = adw::HeaderBar::new();
        header.set_title_widget(Some(&gtk::Label::new(Some("Members"))));
        container.append(&header);

        let root = gtk::Box::new(gtk::Orientation::Vertical, 8);
        root.set_margin_top(12);
        root.set_margin_bottom(12);
        root.set_margin_start(12);
        root.set_margin_end(12);

        let entry = gtk::Entry::new();
        entry.set_placeholder_text(Some("Search for a user"));
        root.append(&entry);

        let list = gtk::Box::new(gtk::Orientation::Vertical, 6);
        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .child(&list)
            .build();
        root.append(&scroller);

        container.append(&root);
        window.set_content(Some(&container));

        let (tx, rx) = crate::utils::glib_channel::<()>();
        let notify = hooks::glib_notify(&tx);

        let convo_hook = Rc::new(hooks::watch_conversation(client, conversation_id, notify.clone()));
        let initial = convo_hook.snapshot().conversation;
        let last_members: Rc<RefCell<BTreeSet<String>>> = Rc::new(RefCell::new(
            initial.as_ref().map(|c| c.members.clone()).unwrap_or_default(),
        ));
        let non_members_hook = Rc::new(RefCell::new(hooks::watch_non_members(
            client,
            initial.as_ref(),
            notify.clone(),
        )));

        let rebuild: Rc<dyn Fn()> = {
            let convo_hook = convo_hook.clone();
            let non_members_hook = non_members_hook.clone();
            let list = list.clone();
            let entry = entry.clone();
            let client = client.clone();
            let conversation_id = conversation_id.to_string();
            let current_user = current_user.clone();
            Rc::new(move || {
                while let Some(child) = list.first_child() {
                    list.remove(&child);
                }
                let snap = convo_hook.snapshot();
                if let Some(err) = &snap.error {
                    log::warn!("conversation query failed: {err}");
                }
                let search = entry.text().to_string();
                let Some(conv) = snap.conversation else {
                    // Loading, failed and plain missing all land here.
                    list.append(&empty_label());
                    return;
                };
                let members_info = conv.members_info.clone().unwrap_or_default();
                let members: Vec<MemberRow> = member_rows(&members_info, current_user.as_deref())
                    .into_iter()
                    .filter(|row| matches_search(&row.label, &search))
                    .collect();
                let invites: Vec<InviteRow> = invite_rows(&non_members_hook.borrow().snapshot().users)
                    .into_iter()
                    .filter(|row| matches_search(&row.label, &search))
                    .collect();

                if members.is_empty() && invites.is_empty() {
                    list.append(&empty_label());
                    return;
                }
                list.append(&group_heading("Members"));
                for row in &members {
                    list.append(&member_widget(row, &client, &conversation_id));
                }
                if !invites.is_empty() {
                    list.append(&group_heading("Invite"));
                    for row in &invites {
                        list.append(&invite_widget(row, &client, &conversation_id));
                    }
                }
            })
        };

        {
            let rebuild = rebuild.clone();
            entry.connect_changed(move |_| (rebuild)());
        }
        {
            let rebuild = rebuild.clone();
            let client = client.clone();
            rx.attach(None, move |_| {
                // The exclusion list is fixed per binding; re-derive it when
                // the member set changes so Add/Remove round-trip the lists.
                let conv = convo_hook.snapshot().conversation;
                let members = conv.as_ref().map(|c| c.members.clone()).unwrap_or_default();
                if members != *last_members.borrow() {
                    *last_members.borrow_mut() = members;
                    *non_members_hook.borrow_mut() =
                        hooks::watch_non_members(&client, conv.as_ref(), notify.clone());
                }
                (rebuild)();
                glib::ControlFlow::Continue
            });
        }
        rebuild();

        Rc::new(SearchUsers { window })
    }

    pub fn set_open(&self, open: bool) {
        if open {
            self.window.present();
        } else {
            self.window.set_visible(false);
        }
    }
}

fn empty_label() -> gtk::Label {
    let label = gtk::Label::new(Some("No results found."));
    label.add_css_class("dim-label");
    label.set_margin_top(16);
    label
}

fn group_heading(text: &str) -> gtk::Label {
    let label = gtk::Label::new(Some(text));
    label.add_css_class("heading");
    label.set_halign(gtk::Align::Start);
    label
}

fn row_box(label_text: &str) -> (gtk::Box, gtk::Button) {
    let row = gtk::Box::new(gtk::Orientation::Horizontal, 8);
    let label = gtk::Label::new(Some(label_text));
    label.set_halign(gtk::Align::Start);
    label.set_hexpand(true);
    label.set_margin_start(8);
    row.append(&label);
    let button = gtk::Button::new();
    row.append(&button);
    (row, button)
}

fn member_widget(row: &MemberRow, client: &LocalClient, conversation_id: &str) -> gtk::Box {
    let (widget, button) = row_box(&row.label);
    button.set_label(match row.action {
        MemberAction::Leave => "Leave",
        MemberAction::Remove => "Remove",
    });
    button.add_css_class("destructive-action");
    let client = client.clone();
    let user_id = row.user_id.clone();
    let conversation_id = conversation_id.to_string();
    button.connect_clicked(move |_| {
        client.remove_member(&user_id, &conversation_id);
    });
    widget
}

fn invite_widget(row: &InviteRow, client: &LocalClient, conversation_id: &str) -> gtk::Box {
    let (widget, button) = row_box(&row.label);
    button.set_label("Add");
    button.add_css_class("suggested-action");
    let client = client.clone();
    let user_id = row.user_id.clone();
    let conversation_id = conversation_id.to_string();
    button.connect_clicked(move |_| {
        client.add_member(&user_id, &conversation_id);
    });
    widget
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(entries: &[(&str, &str)]) -> BTreeMap<String, User> {
        entries
            .iter()
            .map(|(id, name)| {
                (
                    id.to_string(),
                    User {
                        id: id.to_string(),
                        name: name.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn current_user_is_first_tagged_me_with_leave() {
        let members = users(&[("u2", "Vic"), ("u1", "Uma")]);
        let rows = member_rows(&members, Some("u1"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user_id, "u1");
        assert_eq!(rows[0].label, "Uma (me)");
        assert_eq!(rows[0].action, MemberAction::Leave);
        assert_eq!(rows[1].user_id, "u2");
        assert_eq!(rows[1].action, MemberAction::Remove);
    }

    #[test]
    fn every_other_member_appears_exactly_once() {
        let members = users(&[("u1", "Uma"), ("u2", "Vic"), ("u3", "Wes")]);
        let rows = member_rows(&members, Some("u1"));
        let u2_rows = rows.iter().filter(|r| r.user_id == "u2").count();
        assert_eq!(u2_rows, 1);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn no_session_identity_means_no_me_row() {
        let members = users(&[("u1", "Uma"), ("u2", "Vic")]);
        let rows = member_rows(&members, None);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.action == MemberAction::Remove));
        assert!(rows.iter().all(|r| !r.label.contains("(me)")));
    }

    #[test]
    fn current_user_outside_the_member_set_gets_no_row() {
        let members = users(&[("u2", "Vic")]);
        let rows = member_rows(&members, Some("u1"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, MemberAction::Remove);
    }

    #[test]
    fn invite_rows_list_non_members() {
        let rows = invite_rows(&users(&[("u3", "Wes")]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, "u3");
        assert_eq!(rows[0].label, "Wes");
    }

    #[test]
    fn dialog_scenario_members_and_invite_groups() {
        // c1 has members u1 (current) and u2; u3 is not a member.
        let members = users(&[("u1", "Uma"), ("u2", "Vic")]);
        let non_members = users(&[("u3", "Wes")]);

        let member_rows = member_rows(&members, Some("u1"));
        assert_eq!(
            member_rows
                .iter()
                .map(|r| (r.label.as_str(), r.action))
                .collect::<Vec<_>>(),
            vec![
                ("Uma (me)", MemberAction::Leave),
                ("Vic", MemberAction::Remove),
            ]
        );

        let invite_rows = invite_rows(&non_members);
        assert_eq!(invite_rows.len(), 1);
        assert_eq!(invite_rows[0].label, "Wes");
    }

    #[test]
    fn search_filter_is_case_insensitive() {
        assert!(matches_search("Uma (me)", "uma"));
        assert!(matches_search("Vic", ""));
        assert!(!matches_search("Vic", "wes"));
    }
}
