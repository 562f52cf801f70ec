use std::cell::RefCell;
use std::rc::Rc;

use gtk4 as gtk;
use gtk4::prelude::*;

use crate::hooks::{self, MessageList};
use crate::sync::client::SyncClient;
use crate::sync::local::LocalClient;
use crate::sync::models::Message;

/// Message pane for the selected conversation. Delivered and pending
/// messages come from two independent subscriptions; this view interleaves
/// them by creation time for display and dims the unacknowledged ones.
pub struct ChatView {
    root: gtk::Box,
    messages_box: gtk::Box,
    scroller: gtk::ScrolledWindow,
    placeholder: gtk::Label,
    client: LocalClient,
    me: Option<String>,
    tx: glib::Sender<()>,
    hook: RefCell<Option<MessageList>>,
    convo: RefCell<Option<String>>,
}

impl ChatView {
    pub fn new(client: &LocalClient, me: Option<String>) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .build();
        let messages_box = gtk::Box::new(gtk::Orientation::Vertical, 6);
        let placeholder = gtk::Label::new(Some("Select a conversation"));
        placeholder.add_css_class("dim-label");
        messages_box.append(&placeholder);
        scroller.set_child(Some(&messages_box));
        root.append(&scroller);

        let input_row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let entry = gtk::Entry::new();
        entry.set_hexpand(true);
        entry.set_placeholder_text(Some("Type a message…"));
        let send_btn = gtk::Button::with_label("Send");
        send_btn.add_css_class("suggested-action");
        input_row.append(&entry);
        input_row.append(&send_btn);
        root.append(&input_row);

        let (tx, rx) = crate::utils::glib_channel::<()>();
        let view = Rc::new(ChatView {
            root,
            messages_box,
            scroller,
            placeholder,
            client: client.clone(),
            me,
            tx,
            hook: RefCell::new(None),
            convo: RefCell::new(None),
        });

        {
            let view = view.clone();
            rx.attach(None, move |_| {
                view.render();
                glib::ControlFlow::Continue
            });
        }

        let send: Rc<dyn Fn()> = {
            let view = view.clone();
            let entry = entry.clone();
            Rc::new(move || {
                let text = entry.text().to_string();
                if text.trim().is_empty() {
                    return;
                }
                let convo = view.convo.borrow().clone();
                let (Some(convo), Some(me)) = (convo, view.me.as_ref()) else {
                    return;
                };
                view.client.send_message(&convo, me, &text);
                entry.set_text("");
            })
        };
        {
            let send = send.clone();
            send_btn.connect_clicked(move |_| (send)());
        }
        {
            let send = send.clone();
            entry.connect_activate(move |_| (send)());
        }

        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    /// Re-bind the message subscriptions to another conversation. The old
    /// handle drops here, which tears its subscriptions down.
    pub fn show_conversation(&self, convo_id: &str) {
        *self.convo.borrow_mut() = Some(convo_id.to_string());
        let notify = hooks::glib_notify(&self.tx);
        *self.hook.borrow_mut() = Some(hooks::watch_messages(&self.client, convo_id, notify));
        self.render();
    }

    fn render(&self) {
        let hook = self.hook.borrow();
        let Some(hook) = hook.as_ref() else {
            return;
        };
        let snap = hook.snapshot();
        if let Some(err) = &snap.error {
            log::warn!("message query failed: {err}");
        }

        while let Some(child) = self.messages_box.first_child() {
            self.messages_box.remove(&child);
        }

        if snap.messages.is_empty() && snap.pending.is_empty() {
            self.placeholder.set_label("No messages yet");
            self.messages_box.append(&self.placeholder);
            return;
        }

        let mut rows: Vec<(&Message, bool)> =
            snap.messages.values().map(|m| (m, false)).collect();
        rows.extend(snap.pending.values().map(|m| (m, true)));
        rows.sort_by_key(|(m, _)| m.created_at);

        for (message, pending) in rows {
            self.messages_box.append(&message_widget(message, pending, self.me.as_deref()));
        }

        let adj = self.scroller.vadjustment();
        adj.set_value(adj.upper());
    }
}

fn message_widget(message: &Message, pending: bool, me: Option<&str>) -> gtk::Box {
    let row = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let own = Some(message.sender_id.as_str()) == me;
    let align = if own { gtk::Align::End } else { gtk::Align::Start };

    let sender = message
        .sender
        .as_ref()
        .map(|u| u.name.clone())
        .unwrap_or_else(|| message.sender_id.clone());
    let byline = gtk::Label::new(Some(&sender));
    byline.add_css_class("caption");
    byline.add_css_class("dim-label");
    byline.set_halign(align);
    row.append(&byline);

    let text = if pending {
        format!("{} (sending…)", message.text)
    } else {
        message.text.clone()
    };
    let body = gtk::Label::new(Some(&text));
    body.set_halign(align);
    body.set_wrap(true);
    if pending {
        body.add_css_class("dim-label");
    }
    row.append(&body);
    row
}
