use std::cell::RefCell;
use std::rc::Rc;

use gtk4 as gtk;
use gtk4::prelude::*;

/// One rendered conversation card: name plus the last-message snippet.
pub struct SidebarItem {
    pub id: String,
    pub name: String,
    pub snippet: Option<String>,
}

pub struct Sidebar {
    root: gtk::Box,
    search: gtk::Entry,
    list: gtk::ListBox,
    ids: Rc<RefCell<Vec<String>>>,
}

impl Sidebar {
    pub fn new() -> Self {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let title = gtk::Label::new(Some("Conversations"));
        title.add_css_class("heading");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let search = gtk::Entry::new();
        search.set_placeholder_text(Some("Search conversations"));
        root.append(&search);

        let list = gtk::ListBox::new();
        root.append(&list);

        Self {
            root,
            search,
            list,
            ids: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn connect_search_changed(&self, cb: impl Fn(String) + 'static) {
        self.search.connect_changed(move |entry| {
            cb(entry.text().to_string());
        });
    }

    pub fn connect_selected(&self, cb: impl Fn(String) + 'static) {
        let ids = self.ids.clone();
        self.list.connect_row_selected(move |_, row| {
            if let Some(row) = row {
                let index = row.index();
                if index >= 0 {
                    if let Some(id) = ids.borrow().get(index as usize) {
                        cb(id.clone());
                    }
                }
            }
        });
    }

    pub fn set_items(&self, items: Vec<SidebarItem>) {
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }
        let mut ids = self.ids.borrow_mut();
        ids.clear();
        for item in items {
            let row = gtk::ListBoxRow::new();
            let card = gtk::Box::new(gtk::Orientation::Vertical, 2);
            card.set_margin_top(8);
            card.set_margin_bottom(8);
            card.set_margin_start(8);
            card.set_margin_end(8);

            let name = gtk::Label::new(Some(&item.name));
            name.set_halign(gtk::Align::Start);
            card.append(&name);

            if let Some(snippet) = &item.snippet {
                let preview = gtk::Label::new(Some(snippet));
                preview.add_css_class("dim-label");
                preview.set_halign(gtk::Align::Start);
                preview.set_ellipsize(gtk4::pango::EllipsizeMode::End);
                card.append(&preview);
            }

            row.set_child(Some(&card));
            self.list.append(&row);
            ids.push(item.id);
        }
    }
}
