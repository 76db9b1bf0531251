use crate::runtime::{data_structures::quotations::QuoteId, event_loop::WriteRequest};
use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
    net::SocketAddrV4,
};
use tokio::{net::tcp::OwnedReadHalf, sync::mpsc::UnboundedSender, task::JoinHandle};

/// The stable identifier of a live I/O resource.  Stack values carry these;
/// the registry owns the resources themselves.
pub type HandleId = i64;

/// What kind of resource a handle wraps.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HandleKind {
    Timer,
    Tcp,
}

impl Display for HandleKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            HandleKind::Timer => write!(f, "timer"),
            HandleKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// The lifecycle of a handle.  Arming attaches work to the event loop;
/// closing is requested explicitly and the registry slot is only released
/// when the loop confirms the teardown.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HandleState {
    /// Freshly constructed, nothing scheduled.
    New,

    /// A timer was started, a listen/connect was issued, or a read is in
    /// progress.
    Armed,

    /// Close was requested.  The handle must not be observed again.
    Closing,
}

/// A live I/O resource: its kind tag, lifecycle state, the primary callback
/// quotation, and whatever event-loop parts the resource currently owns.
#[derive(Debug)]
pub struct HandleEntry {
    /// The kind tag.  Fixed at construction.
    pub kind: HandleKind,

    /// Where in its lifecycle the handle is.
    pub state: HandleState,

    /// The primary callback quotation.  Replaced on re-arm; released when the
    /// handle finishes closing.
    pub callback: Option<QuoteId>,

    /// The IPv4 address bound with `uv:tcp-bind`, if any.  After a
    /// successful listen this records the actual listening address.
    pub local_addr: Option<SocketAddrV4>,

    /// The read half of an established connection, waiting for
    /// `uv:read-start` to claim it.
    pub reader: Option<OwnedReadHalf>,

    /// Submission side of the connection's writer task.
    pub writer: Option<UnboundedSender<WriteRequest>>,

    /// The event-loop task serving this handle: a timer, an acceptor, an
    /// in-flight connect, or an active reader.
    pub task: Option<JoinHandle<()>>,
}

impl HandleEntry {
    fn new(kind: HandleKind) -> HandleEntry {
        HandleEntry {
            kind,
            state: HandleState::New,
            callback: None,
            local_addr: None,
            reader: None,
            writer: None,
            task: None,
        }
    }

    /// Stop the entry's event-loop task, if one is running.
    pub fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The registry of live handles, keyed by identifier.  Identifiers come from
/// a monotonic counter and are never reused, so a stale identifier held by a
/// duplicated stack value can only miss.
#[derive(Debug)]
pub struct HandleRegistry {
    /// The counter for generating new identifiers.
    next_id: HandleId,

    /// The live handles.
    table: HashMap<HandleId, HandleEntry>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Create a new empty registry.
    pub fn new() -> HandleRegistry {
        HandleRegistry {
            next_id: 1,
            table: HashMap::new(),
        }
    }

    /// Register a fresh handle of the given kind and return its identifier.
    pub fn insert(&mut self, kind: HandleKind) -> HandleId {
        let id = self.next_id;

        self.next_id += 1;
        self.table.insert(id, HandleEntry::new(kind));

        id
    }

    /// Look up a handle.
    pub fn get(&self, id: HandleId) -> Option<&HandleEntry> {
        self.table.get(&id)
    }

    /// Look up a handle for mutation.
    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut HandleEntry> {
        self.table.get_mut(&id)
    }

    /// Remove a handle's entry, returning it so the caller can release
    /// whatever it still owns.
    pub fn remove(&mut self, id: HandleId) -> Option<HandleEntry> {
        self.table.remove(&id)
    }

    /// How many handles are currently registered?
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_unique_and_never_reused() {
        let mut registry = HandleRegistry::new();

        let timer = registry.insert(HandleKind::Timer);
        let tcp = registry.insert(HandleKind::Tcp);
        assert_ne!(timer, tcp);

        assert!(registry.remove(timer).is_some());
        let another = registry.insert(HandleKind::Timer);

        assert_ne!(another, timer);
        assert!(registry.get(timer).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn new_entries_start_unarmed() {
        let mut registry = HandleRegistry::new();
        let id = registry.insert(HandleKind::Tcp);
        let entry = registry.get(id).unwrap();

        assert!(entry.kind == HandleKind::Tcp);
        assert!(entry.state == HandleState::New);
        assert!(entry.callback.is_none());
        assert!(entry.task.is_none());
    }
}
