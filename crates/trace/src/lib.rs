//! Three-channel trace facility for the CLIKE pipeline.
//!
//! The analyzer reports on the `scope` channel, the interpreter on `debug`
//! (one record per visited node) and `stack` (frame snapshots on push/pop).
//! Channels toggle independently; records are free-form text and no consumer
//! parses them. The host picks the sink: the CLI routes to stderr, tests
//! capture into a buffer.

/// Destination for trace records.
pub trait TraceSink {
    fn emit(&mut self, record: &str);
}

/// Default sink: one record per stderr write.
pub struct StderrSink;

impl TraceSink for StderrSink {
    fn emit(&mut self, record: &str) {
        eprintln!("{record}");
    }
}

/// Trace channels plus the sink records are routed to.
pub struct Trace {
    debug_on: bool,
    scope_on: bool,
    stack_on: bool,
    sink: Box<dyn TraceSink>,
}

impl Trace {
    pub fn new(debug: bool, scope: bool, stack: bool) -> Self {
        Self::with_sink(debug, scope, stack, Box::new(StderrSink))
    }

    /// All channels disabled; the common case for tests.
    pub fn off() -> Self {
        Self::new(false, false, false)
    }

    pub fn with_sink(debug: bool, scope: bool, stack: bool, sink: Box<dyn TraceSink>) -> Self {
        Self {
            debug_on: debug,
            scope_on: scope,
            stack_on: stack,
            sink,
        }
    }

    // Callers check *_enabled before formatting records so a disabled
    // channel costs nothing.
    pub fn debug_enabled(&self) -> bool {
        self.debug_on
    }
    pub fn scope_enabled(&self) -> bool {
        self.scope_on
    }
    pub fn stack_enabled(&self) -> bool {
        self.stack_on
    }

    pub fn debug(&mut self, record: &str) {
        if self.debug_on {
            self.sink.emit(record);
        }
    }

    pub fn scope(&mut self, record: &str) {
        if self.scope_on {
            self.sink.emit(record);
        }
    }

    pub fn stack(&mut self, record: &str) {
        if self.stack_on {
            self.sink.emit(record);
        }
    }
}
