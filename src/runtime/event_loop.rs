use crate::runtime::data_structures::handles::HandleId;
use std::{cell::Cell, io, net::SocketAddrV4, rc::Rc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::{Builder, Runtime},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError},
    task::{JoinHandle, LocalSet},
    time::sleep,
};
use tracing::debug;

/// How much to ask the kernel for per read.
const READ_CHUNK: usize = 64 * 1024;

/// An I/O completion, queued by an event-loop task and delivered to the
/// interpreter while it sits in `uv:run`.
pub enum LoopEvent {
    /// A timer came due.
    TimerFired { handle: HandleId },

    /// An outbound connect finished successfully.
    Connected { handle: HandleId, stream: TcpStream },

    /// A listener accepted a connection.
    Accepted { server: HandleId, stream: TcpStream },

    /// Bytes arrived on a reading connection.  Empty bytes mean a clean end
    /// of stream, after which the reader has stopped.
    Data { handle: HandleId, bytes: Vec<u8> },

    /// A requested close completed; the registry slot can be released.
    Closed { handle: HandleId },

    /// An event source went away without anything to deliver.  Exists so the
    /// loop re-checks its liveness instead of blocking forever.
    Retired { handle: HandleId },
}

/// Counts an event source as alive for as long as its task runs.  Dropping
/// the guard (normal exit or abort) decrements the count and wakes the loop
/// so it can notice the change.
struct ActiveGuard {
    handle: HandleId,
    active: Rc<Cell<usize>>,
    sender: UnboundedSender<LoopEvent>,
}

impl ActiveGuard {
    fn new(
        handle: HandleId,
        active: Rc<Cell<usize>>,
        sender: UnboundedSender<LoopEvent>,
    ) -> ActiveGuard {
        active.set(active.get() + 1);

        ActiveGuard {
            handle,
            active,
            sender,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.set(self.active.get() - 1);
        let _ = self.sender.send(LoopEvent::Retired {
            handle: self.handle,
        });
    }
}

/// A write submission: the payload plus the guard that keeps the loop alive
/// until the write has actually gone out.  Mirrors how pending write
/// requests hold a libuv loop open.
pub struct WriteRequest {
    bytes: Vec<u8>,
    _guard: ActiveGuard,
}

/// The event loop: a current-thread tokio runtime, a LocalSet of I/O tasks,
/// and a queue of their completions.
///
/// Tasks only make progress while `poll_next` blocks, which is reached solely
/// through the `uv:run` word.  That makes callback execution safe: by the
/// time an event is handed to the interpreter the loop has stopped running
/// tasks, so the callback has the context all to itself.
#[derive(Debug)]
pub struct EventLoop {
    // Declared before the runtime so tasks and the sockets they own unwind
    // while the I/O driver is still up.
    local: LocalSet,
    runtime: Runtime,
    sender: UnboundedSender<LoopEvent>,
    events: UnboundedReceiver<LoopEvent>,

    /// How many event sources (armed timers, acceptors, in-flight connects,
    /// active readers) could still produce an event.
    active: Rc<Cell<usize>>,
}

impl EventLoop {
    /// Build the reactor.  Fails only if the OS refuses the runtime its I/O
    /// driver.
    pub fn new() -> io::Result<EventLoop> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (sender, events) = mpsc::unbounded_channel();

        Ok(EventLoop {
            runtime,
            local: LocalSet::new(),
            sender,
            events,
            active: Rc::new(Cell::new(0)),
        })
    }

    /// How many event sources are currently alive.
    pub fn active_sources(&self) -> usize {
        self.active.get()
    }

    /// Pull the next completion.  Already-queued events are drained first;
    /// after that the loop blocks, driving the I/O tasks, until something is
    /// delivered.  Returns None once nothing is queued and no source could
    /// produce another event.
    pub fn poll_next(&mut self) -> Option<LoopEvent> {
        match self.events.try_recv() {
            Ok(event) => return Some(event),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return None,
        }

        if self.active.get() == 0 {
            return None;
        }

        self.runtime
            .block_on(self.local.run_until(self.events.recv()))
    }

    fn guard(&self, handle: HandleId) -> ActiveGuard {
        ActiveGuard::new(handle, self.active.clone(), self.sender.clone())
    }

    /// Arm a timer: first fire after `timeout_ms`, then every `repeat_ms`
    /// while it is non-zero.
    pub fn start_timer(&self, handle: HandleId, timeout_ms: u64, repeat_ms: u64) -> JoinHandle<()> {
        let sender = self.sender.clone();
        let guard = self.guard(handle);

        self.local.spawn_local(async move {
            let _guard = guard;

            sleep(Duration::from_millis(timeout_ms)).await;

            if sender.send(LoopEvent::TimerFired { handle }).is_err() || repeat_ms == 0 {
                return;
            }

            loop {
                sleep(Duration::from_millis(repeat_ms)).await;

                if sender.send(LoopEvent::TimerFired { handle }).is_err() {
                    return;
                }
            }
        })
    }

    /// Adopt an already-bound std listener and start accepting on it.
    /// Returns the actual listening address alongside the acceptor task.
    pub fn start_listener(
        &self,
        server: HandleId,
        listener: std::net::TcpListener,
    ) -> io::Result<(std::net::SocketAddr, JoinHandle<()>)> {
        let listener = {
            let _context = self.runtime.enter();

            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)?
        };

        let address = listener.local_addr()?;
        let sender = self.sender.clone();
        let guard = self.guard(server);

        let task = self.local.spawn_local(async move {
            let _guard = guard;

            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");

                        if sender.send(LoopEvent::Accepted { server, stream }).is_err() {
                            return;
                        }
                    }

                    // Accept failures leave no half-made client behind; keep
                    // listening.
                    Err(err) => debug!(%err, "accept failed"),
                }
            }
        });

        Ok((address, task))
    }

    /// Start an outbound connect.  Failures are dropped silently, success is
    /// delivered as a Connected event.
    pub fn start_connect(&self, handle: HandleId, address: SocketAddrV4) -> JoinHandle<()> {
        let sender = self.sender.clone();
        let guard = self.guard(handle);

        self.local.spawn_local(async move {
            let _guard = guard;

            match TcpStream::connect(address).await {
                Ok(stream) => {
                    let _ = sender.send(LoopEvent::Connected { handle, stream });
                }

                Err(err) => debug!(%err, "connect failed"),
            }
        })
    }

    /// Start reading a connection.  Every chunk becomes a Data event; a clean
    /// end of stream delivers one empty Data event and stops the reader; an
    /// error stops the reader silently.
    pub fn start_reader(&self, handle: HandleId, mut reader: OwnedReadHalf) -> JoinHandle<()> {
        let sender = self.sender.clone();
        let guard = self.guard(handle);

        self.local.spawn_local(async move {
            let _guard = guard;
            let mut chunk = vec![0_u8; READ_CHUNK];

            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => {
                        let _ = sender.send(LoopEvent::Data {
                            handle,
                            bytes: Vec::new(),
                        });

                        return;
                    }

                    Ok(count) => {
                        let delivered = sender.send(LoopEvent::Data {
                            handle,
                            bytes: chunk[..count].to_vec(),
                        });

                        if delivered.is_err() {
                            return;
                        }
                    }

                    Err(err) => {
                        debug!(%err, "read failed");
                        return;
                    }
                }
            }
        })
    }

    /// Package a payload for submission to a connection's writer task.  The
    /// request counts as an event source until the write completes.
    pub fn write_request(&self, handle: HandleId, bytes: Vec<u8>) -> WriteRequest {
        WriteRequest {
            bytes,
            _guard: self.guard(handle),
        }
    }

    /// Spawn the writer task for an established connection.  Payloads are
    /// written in submission order; a failed write is reported to stderr and
    /// ends the task, dropping whatever was still queued.  The idle task is
    /// not an event source, only its pending requests are.
    pub fn start_writer(&self, write_half: OwnedWriteHalf) -> UnboundedSender<WriteRequest> {
        let (submit, mut pending) = mpsc::unbounded_channel::<WriteRequest>();

        self.local.spawn_local(async move {
            let mut write_half = write_half;

            while let Some(request) = pending.recv().await {
                if let Err(err) = write_half.write_all(&request.bytes).await {
                    eprintln!("uv:write: {}", err);
                    return;
                }
            }
        });

        submit
    }

    /// Queue the close completion for a handle.  The registry slot is
    /// released when the event is dispatched, never synchronously.
    pub fn request_close(&self, handle: HandleId) {
        let _ = self.sender.send(LoopEvent::Closed { handle });
    }
}
