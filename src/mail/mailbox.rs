use crate::address::Address;
use crate::error::{GtError, Result};
use crate::store::{ListFilter, RecordStore};

use super::MailItem;
use super::router::MESSAGE_TYPE;

/// Read side of one address's mail. Never writes to the store.
pub struct Mailbox<S> {
    store: S,
    address: Address,
}

impl<S: RecordStore> Mailbox<S> {
    pub const fn new(store: S, address: Address) -> Self {
        Self { store, address }
    }

    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Messages assigned to this address, newest first.
    pub fn list(&self) -> Result<Vec<MailItem>> {
        let filter = ListFilter {
            record_type: Some(MESSAGE_TYPE.into()),
            assignee: Some(self.address.identity()),
            ..Default::default()
        };
        let mut items: Vec<MailItem> = self
            .store
            .list(&filter)?
            .into_iter()
            .map(MailItem::from)
            .collect();
        // Pinned mail stays on top.
        items.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(items)
    }

    /// One message by id; fails with `NotFound` unless it is mail for this
    /// address.
    pub fn read(&self, id: &str) -> Result<MailItem> {
        let identity = self.address.identity();
        match self.store.get(id)? {
            Some(record)
                if record.record_type == MESSAGE_TYPE
                    && record.assignee.as_deref() == Some(identity.as_str()) =>
            {
                Ok(record.into())
            }
            _ => Err(GtError::NotFound(format!("message {id} for {identity}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CreateRequest, MemoryStore};

    fn seed(store: &MemoryStore, to: &str, title: &str) -> String {
        store
            .create(&CreateRequest {
                record_type: MESSAGE_TYPE.into(),
                title: title.into(),
                assignee: Some(to.into()),
                labels: vec!["from:mayor".into()],
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn list_only_returns_own_mail() {
        let store = MemoryStore::new();
        seed(&store, "wyvern/Toast", "mine");
        seed(&store, "mayor", "not mine");
        store
            .create(&CreateRequest {
                record_type: "task".into(),
                assignee: Some("wyvern/Toast".into()),
                ..Default::default()
            })
            .unwrap();

        let mailbox = Mailbox::new(&store, Address::parse("wyvern/Toast").unwrap());
        let items = mailbox.list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].subject, "mine");
        assert_eq!(items[0].from, "mayor");
    }

    #[test]
    fn pinned_mail_sorts_first() {
        let store = MemoryStore::new();
        seed(&store, "mayor", "plain");
        let pinned = seed(&store, "mayor", "pinned");
        store.pin(&pinned).unwrap();

        let items = Mailbox::new(&store, Address::Mayor).list().unwrap();
        assert_eq!(items[0].subject, "pinned");
    }

    #[test]
    fn read_rejects_foreign_mail() {
        let store = MemoryStore::new();
        let id = seed(&store, "mayor", "hello");
        let mine = Mailbox::new(&store, Address::Mayor);
        assert_eq!(mine.read(&id).unwrap().subject, "hello");

        let other = Mailbox::new(&store, Address::Deacon);
        assert!(matches!(other.read(&id), Err(GtError::NotFound(_))));
        assert!(matches!(mine.read("gt-404"), Err(GtError::NotFound(_))));
    }

    #[test]
    fn mailbox_never_writes() {
        let store = MemoryStore::new();
        let id = seed(&store, "mayor", "x");
        let mailbox = Mailbox::new(&store, Address::Mayor);
        mailbox.list().unwrap();
        mailbox.read(&id).unwrap();
        let writes: Vec<String> = store
            .calls()
            .into_iter()
            .filter(|c| !c.starts_with("list") && !c.starts_with("get"))
            .collect();
        assert_eq!(writes, vec!["create message"]);
    }
}
