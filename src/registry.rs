use crate::filter::Session;
use crate::message::Side;
use std::collections::HashMap;
use std::time::SystemTime;
use time::OffsetDateTime;

/// Registry slot for one transaction: lazily created per-direction
/// sessions plus activity timestamps for host staleness policies.
struct Entry {
    request: Option<Session>,
    response: Option<Session>,
    created: OffsetDateTime,
    last_activity: OffsetDateTime,
}

/// Maps transaction ids to live parser sessions. Entries are created on
/// first use and removed only by an explicit release; there is no internal
/// eviction, so bounding growth through timely releases is the host's job.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<String, Entry>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Fetches the session for (id, side), creating the entry and the
    /// session on first use.
    pub(crate) fn get_or_create<F>(&mut self, id: &str, side: Side, create: F) -> &mut Session
    where
        F: FnOnce() -> Session,
    {
        let now = OffsetDateTime::from(SystemTime::now());
        let entry = self.entries.entry(id.to_string()).or_insert_with(|| Entry {
            request: None,
            response: None,
            created: now,
            last_activity: now,
        });
        entry.last_activity = now;
        let slot = match side {
            Side::Request => &mut entry.request,
            Side::Response => &mut entry.response,
        };
        slot.get_or_insert_with(create)
    }

    /// Fetches an existing session without creating one.
    pub(crate) fn get_mut(&mut self, id: &str, side: Side) -> Option<&mut Session> {
        let entry = self.entries.get_mut(id)?;
        entry.last_activity = OffsetDateTime::from(SystemTime::now());
        match side {
            Side::Request => entry.request.as_mut(),
            Side::Response => entry.response.as_mut(),
        }
    }

    /// Removes every session for the id. Unknown ids are a no-op.
    pub(crate) fn release(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn activity(&self, id: &str) -> Option<(OffsetDateTime, OffsetDateTime)> {
        self.entries
            .get(id)
            .map(|entry| (entry.created, entry.last_activity))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::log::Logger;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    fn make_session(side: Side) -> Session {
        let channel = Rc::new(RefCell::new(VecDeque::new()));
        Session::new(side, &Config::default(), Logger::new(&channel))
    }

    #[test]
    fn slots_are_lazy_and_per_direction() {
        let mut registry = Registry::new();
        registry.get_or_create("tx-1", Side::Request, || make_session(Side::Request));
        assert_eq!(1, registry.len());
        assert!(registry.get_mut("tx-1", Side::Response).is_none());
        registry.get_or_create("tx-1", Side::Response, || make_session(Side::Response));
        assert_eq!(1, registry.len());
        assert!(registry.get_mut("tx-1", Side::Response).is_some());
    }

    #[test]
    fn release_is_idempotent() {
        let mut registry = Registry::new();
        registry.get_or_create("tx-1", Side::Request, || make_session(Side::Request));
        registry.release("tx-1");
        assert_eq!(0, registry.len());
        registry.release("tx-1");
        registry.release("never-seen");
        assert_eq!(0, registry.len());
    }

    #[test]
    fn activity_is_recorded() {
        let mut registry = Registry::new();
        assert!(registry.activity("tx-1").is_none());
        registry.get_or_create("tx-1", Side::Request, || make_session(Side::Request));
        let (created, last) = registry.activity("tx-1").unwrap();
        assert!(last >= created);
    }
}
