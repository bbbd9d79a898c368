use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use parse::{parse_program, LoadError, SourceLoader};
use sema::analyze;
use trace::{Trace, TraceSink};

struct NoIncludes;

impl SourceLoader for NoIncludes {
    fn read(&self, path: &str, _base_dir: &Path) -> Result<(PathBuf, String), LoadError> {
        Err(LoadError::NotFound {
            path: path.to_string(),
        })
    }
}

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<String>>>);

impl TraceSink for SharedSink {
    fn emit(&mut self, record: &str) {
        self.0.borrow_mut().push(record.to_string());
    }
}

const SRC: &str = "int add(int a, int b) { return a + b; }\n\
                   int main() { int x = add(1, 2); }";

#[test]
fn scope_channel_reports_each_scope_on_exit() {
    let sink = SharedSink::default();
    let mut tr = Trace::with_sink(false, true, false, Box::new(sink.clone()));
    let prog = parse_program(SRC, Path::new("t.clike"), &NoIncludes).unwrap();
    analyze(&prog, &mut tr).unwrap();

    let records = sink.0.borrow();
    // Function scopes first (exited first), global last.
    assert_eq!(records.len(), 3);
    assert!(records[0].starts_with("SCOPE add (level 2)"));
    assert!(records[0].contains("a: int"));
    assert!(records[0].contains("b: int"));
    assert!(records[0].contains("enclosing: global"));
    assert!(records[1].starts_with("SCOPE main (level 2)"));
    assert!(records[1].contains("x: int"));
    assert!(records[2].starts_with("SCOPE global (level 1)"));
    assert!(records[2].contains("add: fn(int, int) -> int"));
    assert!(records[2].contains("main: fn() -> int"));
    assert!(records[2].contains("enclosing: none"));
}

#[test]
fn disabled_scope_channel_stays_silent() {
    let sink = SharedSink::default();
    let mut tr = Trace::with_sink(true, false, true, Box::new(sink.clone()));
    let prog = parse_program(SRC, Path::new("t.clike"), &NoIncludes).unwrap();
    analyze(&prog, &mut tr).unwrap();
    assert!(sink.0.borrow().is_empty());
}
