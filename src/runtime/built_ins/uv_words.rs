use crate::{
    add_native_word,
    runtime::{
        data_structures::{
            handles::{HandleId, HandleKind, HandleState},
            quotations::QuoteId,
            value::Value,
        },
        error,
        interpreter::Interpreter,
    },
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Install a new primary callback on a handle, releasing the quotation it
/// replaces.  Re-arming with the same quotation keeps it alive.
fn replace_callback(interpreter: &mut dyn Interpreter, handle: HandleId, quote: QuoteId) {
    let previous = match interpreter.handles_mut().get_mut(handle) {
        Some(entry) => entry.callback.replace(quote),
        None => None,
    };

    if let Some(previous) = previous
        && previous != quote
    {
        interpreter.free_quote(previous);
    }
}

/// Turn a string value and a port number into an IPv4 socket address, or a
/// message suitable for a stderr report.
fn parse_ipv4(ip: &[u8], port: i64) -> Result<SocketAddrV4, String> {
    let text = std::str::from_utf8(ip).map_err(|_| "invalid address".to_string())?;

    let address: Ipv4Addr = text
        .parse()
        .map_err(|_| format!("invalid address {}", text))?;

    if !(0..=65535).contains(&port) {
        return Err(format!("invalid port {}", port));
    }

    Ok(SocketAddrV4::new(address, port as u16))
}

/// Run the event loop until no event source remains or the run flag is
/// cleared.  The single suspension point of the interpreter.
///
/// Signature: ` -- `
fn word_uv_run(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    interpreter.run_loop()
}

/// Construct a timer handle and push it.
///
/// Signature: ` -- handle`
fn word_uv_timer(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let handle = interpreter.new_handle(HandleKind::Timer);

    interpreter.push(Value::Handle(handle));

    Ok(())
}

/// Arm a timer.  The quotation replaces any previous callback; on each fire
/// the timer handle is pushed and the quotation executed.
///
/// Signature: `handle timeout repeat quotation -- `
fn word_uv_timer_start(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let quote = interpreter.pop_as_quote()?;
    let repeat = interpreter.pop_as_int()?;
    let timeout = interpreter.pop_as_int()?;
    let handle = interpreter.pop_as_handle(Some(HandleKind::Timer))?;

    replace_callback(interpreter, handle, quote);

    // Negative intervals wrap to enormous ones, exactly as the underlying
    // unsigned milliseconds always have.
    let task = interpreter
        .io()
        .start_timer(handle, timeout as u64, repeat as u64);

    if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
        entry.abort_task();
        entry.task = Some(task);
        entry.state = HandleState::Armed;
    }

    Ok(())
}

/// Disarm a timer.  The stored callback stays attached for a later re-arm.
///
/// Signature: `handle -- `
fn word_uv_timer_stop(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let handle = interpreter.pop_as_handle(Some(HandleKind::Timer))?;

    if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
        entry.abort_task();
        entry.state = HandleState::New;
    }

    Ok(())
}

/// Construct a TCP handle and push it.
///
/// Signature: ` -- handle`
fn word_uv_tcp(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let handle = interpreter.new_handle(HandleKind::Tcp);

    interpreter.push(Value::Handle(handle));

    Ok(())
}

/// Record the IPv4 address a handle should listen on.  Problems are reported
/// to stderr and execution continues.
///
/// Signature: `handle ip port -- `
fn word_uv_tcp_bind(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let port = interpreter.pop_as_int()?;
    let ip = interpreter.pop_as_string()?;
    let handle = interpreter.pop_as_handle(Some(HandleKind::Tcp))?;

    let address = match parse_ipv4(&ip, port) {
        Ok(address) => address,
        Err(message) => {
            eprintln!("uv:tcp-bind: {}", message);
            return Ok(());
        }
    };

    if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
        entry.local_addr = Some(address);
    }

    Ok(())
}

/// Start listening on a handle's bound address, or an ephemeral port on all
/// interfaces when it was never bound.  The quotation is stored first; each
/// accepted client is registered as a fresh TCP handle, pushed, and the
/// quotation executed.  Failures are reported to stderr and execution
/// continues.
///
/// Signature: `handle backlog quotation -- `
fn word_uv_listen(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let quote = interpreter.pop_as_quote()?;
    let backlog = interpreter.pop_as_int()?;
    let handle = interpreter.pop_as_handle(Some(HandleKind::Tcp))?;

    replace_callback(interpreter, handle, quote);

    // The OS listen queue is not adjustable through the std listener; the
    // value is still range checked the way listen(2) would.
    if !(0..=i32::MAX as i64).contains(&backlog) {
        eprintln!("uv:listen: invalid backlog {}", backlog);
        return Ok(());
    }

    let address = match interpreter.handles().get(handle) {
        Some(entry) => entry
            .local_addr
            .unwrap_or_else(|| SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
        None => return Ok(()),
    };

    let listener = match std::net::TcpListener::bind(address) {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("uv:listen: {}", err);
            return Ok(());
        }
    };

    let (bound, task) = match interpreter.io().start_listener(handle, listener) {
        Ok(started) => started,
        Err(err) => {
            eprintln!("uv:listen: {}", err);
            return Ok(());
        }
    };

    if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
        entry.abort_task();
        entry.task = Some(task);
        entry.state = HandleState::Armed;

        if let SocketAddr::V4(bound) = bound {
            entry.local_addr = Some(bound);
        }
    }

    Ok(())
}

/// Start reading an established connection.  The quotation replaces any
/// previous callback; each chunk of received bytes pushes the handle and a
/// fresh string, then runs the quotation.  A clean end of stream delivers
/// one empty string and stops the reads.
///
/// Signature: `handle quotation -- `
fn word_uv_read_start(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let quote = interpreter.pop_as_quote()?;
    let handle = interpreter.pop_as_handle(Some(HandleKind::Tcp))?;

    replace_callback(interpreter, handle, quote);

    let reader = match interpreter.handles_mut().get_mut(handle) {
        Some(entry) => {
            if entry.reader.is_none() && entry.writer.is_none() {
                eprintln!("uv:read-start: socket is not connected");
                return Ok(());
            }

            entry.state = HandleState::Armed;
            entry.reader.take()
        }

        None => None,
    };

    // Absent read half with a live writer: reads are already running and
    // only the callback needed replacing.
    if let Some(reader) = reader {
        let task = interpreter.io().start_reader(handle, reader);

        if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
            entry.task = Some(task);
        }
    }

    Ok(())
}

/// Start an outbound IPv4 connect.  On success the handle is pushed and the
/// stored quotation executed; on failure the attempt is dropped silently.
///
/// Signature: `handle ip port quotation -- `
fn word_uv_tcp_connect(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let quote = interpreter.pop_as_quote()?;
    let port = interpreter.pop_as_int()?;
    let ip = interpreter.pop_as_string()?;
    let handle = interpreter.pop_as_handle(Some(HandleKind::Tcp))?;

    replace_callback(interpreter, handle, quote);

    let address = match parse_ipv4(&ip, port) {
        Ok(address) => address,
        Err(message) => {
            eprintln!("uv:tcp-connect: {}", message);
            return Ok(());
        }
    };

    let task = interpreter.io().start_connect(handle, address);

    if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
        entry.abort_task();
        entry.task = Some(task);
        entry.state = HandleState::Armed;
    }

    Ok(())
}

/// Submit a string's bytes as a write on an established connection.  The
/// bytes travel with the request and are released once it completes.
/// Problems are reported to stderr and execution continues.
///
/// Signature: `handle string -- `
fn word_uv_write(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let bytes = interpreter.pop_as_string()?;
    let handle = interpreter.pop_as_handle(Some(HandleKind::Tcp))?;

    let request = interpreter.io().write_request(handle, bytes);

    let submitted = match interpreter.handles().get(handle) {
        Some(entry) => match &entry.writer {
            Some(writer) => writer.send(request).is_ok(),
            None => false,
        },

        None => false,
    };

    if !submitted {
        eprintln!("uv:write: socket is not connected");
    }

    Ok(())
}

/// Request an asynchronous close of any handle.  The registry slot and the
/// stored callback are released when the loop confirms the teardown; until
/// then the handle must not be observed again.
///
/// Signature: `handle -- `
fn word_uv_close(interpreter: &mut dyn Interpreter) -> error::Result<()> {
    let handle = interpreter.pop_as_handle(None)?;

    if let Some(entry) = interpreter.handles_mut().get_mut(handle) {
        entry.state = HandleState::Closing;
        entry.abort_task();
        entry.reader = None;
        entry.writer = None;
    }

    interpreter.io().request_close(handle);

    Ok(())
}

/// Register the I/O words.
pub fn register_uv_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "uv:run",
        word_uv_run,
        "Run the event loop until nothing remains or the run flag clears.",
        " -- "
    );

    add_native_word!(
        interpreter,
        "uv:timer",
        word_uv_timer,
        "Construct a timer handle.",
        " -- handle"
    );

    add_native_word!(
        interpreter,
        "uv:timer-start",
        word_uv_timer_start,
        "Arm a timer with a callback quotation.",
        "handle timeout repeat quotation -- "
    );

    add_native_word!(
        interpreter,
        "uv:timer-stop",
        word_uv_timer_stop,
        "Disarm a timer.",
        "handle -- "
    );

    add_native_word!(
        interpreter,
        "uv:close",
        word_uv_close,
        "Request an asynchronous close of a handle.",
        "handle -- "
    );

    add_native_word!(
        interpreter,
        "uv:tcp",
        word_uv_tcp,
        "Construct a TCP handle.",
        " -- handle"
    );

    add_native_word!(
        interpreter,
        "uv:tcp-bind",
        word_uv_tcp_bind,
        "Bind a TCP handle to an IPv4 address.",
        "handle ip port -- "
    );

    add_native_word!(
        interpreter,
        "uv:listen",
        word_uv_listen,
        "Listen for connections, running a quotation per accepted client.",
        "handle backlog quotation -- "
    );

    add_native_word!(
        interpreter,
        "uv:read-start",
        word_uv_read_start,
        "Read a connection, running a quotation per received chunk.",
        "handle quotation -- "
    );

    add_native_word!(
        interpreter,
        "uv:tcp-connect",
        word_uv_tcp_connect,
        "Connect out, running a quotation once established.",
        "handle ip port quotation -- "
    );

    add_native_word!(
        interpreter,
        "uv:write",
        word_uv_write,
        "Submit a string's bytes as a write on a connection.",
        "handle string -- "
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        built_ins::base_words::register_base_words,
        interpreter::{
            CodeManagement, EventManagement, HandleManagement, InterpreterStack, WordManagement,
            forth_interpreter::ForthInterpreter,
        },
    };
    use std::{
        io::{Read, Write},
        net::TcpStream,
        thread,
    };

    fn interpreter() -> ForthInterpreter {
        let mut interpreter = ForthInterpreter::new().unwrap();

        register_base_words(&mut interpreter);
        register_uv_words(&mut interpreter);
        interpreter
    }

    #[test]
    fn the_uv_vocabulary_is_present() {
        let interp = interpreter();

        for name in [
            "uv:run",
            "uv:timer",
            "uv:timer-start",
            "uv:timer-stop",
            "uv:close",
            "uv:tcp",
            "uv:tcp-bind",
            "uv:listen",
            "uv:read-start",
            "uv:tcp-connect",
            "uv:write",
        ] {
            assert!(interp.find_word(name).is_some(), "missing word {}", name);
        }
    }

    #[test]
    fn a_one_shot_timer_fires_once_and_the_loop_drains() {
        let mut interp = interpreter();

        interp
            .process_source("<test>", "uv:timer 10 0 [ drop 7 ] uv:timer-start uv:run")
            .unwrap();

        assert_eq!(interp.stack().as_slice(), &[Value::Int(7)]);
        assert!(interp.is_running());
    }

    #[test]
    fn bye_inside_a_callback_stops_the_loop() {
        let mut interp = interpreter();

        interp
            .process_source(
                "<test>",
                "uv:timer 10 1000 [ drop 42 bye ] uv:timer-start uv:run",
            )
            .unwrap();

        // The repeat interval would keep the source alive forever; only the
        // cleared run flag lets uv:run return.
        assert_eq!(interp.stack().as_slice(), &[Value::Int(42)]);
        assert!(!interp.is_running());
    }

    #[test]
    fn a_stopped_timer_never_fires() {
        let mut interp = interpreter();

        interp
            .process_source(
                "<test>",
                "uv:timer dup 5 1000 [ drop bye ] uv:timer-start uv:timer-stop uv:run",
            )
            .unwrap();

        assert!(interp.stack().is_empty());
        assert!(interp.is_running());
    }

    #[test]
    fn timer_words_reject_tcp_handles() {
        let mut interp = interpreter();

        let error = interp
            .process_source("<test>", "uv:tcp 100 0 [ drop ] uv:timer-start")
            .unwrap_err();

        assert!(error.error().contains("Expected a timer handle"));
    }

    #[test]
    fn close_releases_the_handle_asynchronously() {
        let mut interp = interpreter();

        interp.process_source("<test>", "uv:timer uv:close").unwrap();

        // Close only schedules the release; the slot survives until the loop
        // confirms it.
        assert_eq!(interp.handles().len(), 1);

        interp.process_source("<test>", "uv:run").unwrap();
        assert_eq!(interp.handles().len(), 0);
    }

    #[test]
    fn observing_a_closing_handle_is_fatal() {
        let mut interp = interpreter();

        let error = interp
            .process_source("<test>", "uv:timer dup uv:close uv:close")
            .unwrap_err();

        assert!(error.error().contains("Handle is already closing"));
    }

    #[test]
    fn an_unconnected_write_is_reported_not_fatal() {
        let mut interp = interpreter();

        interp
            .process_source("<test>", "uv:tcp \"data\" uv:write 1")
            .unwrap();

        assert_eq!(interp.stack().as_slice(), &[Value::Int(1)]);
    }

    #[test]
    fn a_bad_bind_address_is_reported_not_fatal() {
        let mut interp = interpreter();

        interp
            .process_source("<test>", "uv:tcp dup \"not-an-ip\" 80 uv:tcp-bind drop 1")
            .unwrap();

        assert_eq!(interp.stack().as_slice(), &[Value::Int(1)]);
    }

    fn listening_port(interp: &ForthInterpreter) -> u16 {
        let server = match interp.stack()[0] {
            Value::Handle(handle) => handle,
            _ => panic!("expected the server handle on the stack"),
        };

        interp
            .handles()
            .get(server)
            .and_then(|entry| entry.local_addr)
            .expect("server has no listening address")
            .port()
    }

    #[test]
    fn an_echo_server_accepts_reads_and_writes_back() {
        let mut interp = interpreter();

        // Keep a copy of the server handle on the stack so the test can find
        // the listening port; a half-second timer bounds the whole exchange.
        interp
            .process_source(
                "<test>",
                "uv:tcp dup dup \"127.0.0.1\" 0 uv:tcp-bind \
                 16 [ [ uv:write ] uv:read-start ] uv:listen \
                 uv:timer 500 0 [ drop bye ] uv:timer-start",
            )
            .unwrap();

        let port = listening_port(&interp);

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();

            stream.write_all(b"ping").unwrap();

            let mut echoed = [0_u8; 4];
            stream.read_exact(&mut echoed).unwrap();
            echoed
        });

        interp.process_source("<test>", "uv:run").unwrap();

        assert_eq!(&client.join().unwrap(), b"ping");
        assert!(!interp.is_running());
    }

    #[test]
    fn an_outbound_connect_runs_its_quotation() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut greeting = [0_u8; 2];

            stream.read_exact(&mut greeting).unwrap();
            greeting
        });

        let mut interp = interpreter();
        let source = format!(
            "uv:tcp \"127.0.0.1\" {} [ \"hi\" uv:write ] uv:tcp-connect uv:run",
            port
        );

        interp.process_source("<test>", &source).unwrap();

        // The pending write held the loop open until it flushed.
        assert_eq!(&server.join().unwrap(), b"hi");
    }

    #[test]
    fn a_failed_connect_is_silent() {
        let mut interp = interpreter();

        // Port 1 on localhost is almost certainly refusing connections; the
        // attempt should vanish without tripping the interpreter.
        interp
            .process_source(
                "<test>",
                "uv:tcp \"127.0.0.1\" 1 [ 99 ] uv:tcp-connect uv:run 1",
            )
            .unwrap();

        assert_eq!(interp.stack().as_slice(), &[Value::Int(1)]);
    }

    #[test]
    fn eof_delivers_one_empty_string() {
        let mut interp = interpreter();

        interp
            .process_source(
                "<test>",
                "uv:tcp dup dup \"127.0.0.1\" 0 uv:tcp-bind \
                 16 [ [ bye ] uv:read-start ] uv:listen \
                 uv:timer 500 0 [ drop bye ] uv:timer-start",
            )
            .unwrap();

        let port = listening_port(&interp);

        let client = thread::spawn(move || {
            // Connect and immediately hang up: the server side sees a clean
            // end of stream and nothing else.
            let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            drop(stream);
        });

        interp.process_source("<test>", "uv:run").unwrap();
        client.join().unwrap();

        // The read callback ran once, leaving the client handle and the
        // empty string it was handed.
        let eof_bytes = interp.pop_as_string().unwrap();
        assert_eq!(eof_bytes, b"");
        assert!(matches!(interp.pop().unwrap(), Value::Handle(_)));
    }
}
