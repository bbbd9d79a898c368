use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parse::{parse_program, LoadError, ParseError, Program, SourceLoader};

/// In-memory loader with a flat namespace: the canonical path of a file is
/// its name, regardless of base directory.
struct MapLoader {
    files: HashMap<String, String>,
}

impl MapLoader {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl SourceLoader for MapLoader {
    fn read(&self, path: &str, _base_dir: &Path) -> Result<(PathBuf, String), LoadError> {
        match self.files.get(path) {
            Some(text) => Ok((PathBuf::from(path), text.clone())),
            None => Err(LoadError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

fn parse_with(src: &str, loader: &MapLoader) -> Result<Program, ParseError> {
    parse_program(src, Path::new("main.clike"), loader)
}

#[test]
fn included_functions_come_first_in_declaration_order() {
    let loader = MapLoader::new(&[(
        "utils.clike",
        "int add(int a, int b) { return a + b; }\nint sub(int a, int b) { return a - b; }",
    )]);
    let src = "#include \"utils.clike\"\nint twice(int x) { return add(x, x); }\nint main() { return 0; }";
    let prog = parse_with(src, &loader).unwrap();
    let names: Vec<_> = prog.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["add", "sub", "twice"]);
}

#[test]
fn optional_semicolon_after_include() {
    let loader = MapLoader::new(&[("u.clike", "int one() { return 1; }")]);
    let src = "#include \"u.clike\";\nint main() { return one(); }";
    let prog = parse_with(src, &loader).unwrap();
    assert_eq!(prog.functions[0].name, "one");
}

#[test]
fn repeated_include_is_ignored() {
    let loader = MapLoader::new(&[("u.clike", "int one() { return 1; }")]);
    let src = "#include \"u.clike\"\n#include \"u.clike\"\nint main() { return 0; }";
    let prog = parse_with(src, &loader).unwrap();
    assert_eq!(prog.functions.len(), 1);
}

#[test]
fn mutual_includes_terminate_with_all_functions_available() {
    // main.clike includes a.clike; a and b include each other.
    let loader = MapLoader::new(&[
        (
            "a.clike",
            "#include \"b.clike\"\nint fa() { return 1; }",
        ),
        (
            "b.clike",
            "#include \"a.clike\"\nint fb() { return 2; }",
        ),
    ]);
    let src = "#include \"a.clike\"\nint main() { return fa() + fb(); }";
    let prog = parse_with(src, &loader).unwrap();
    let names: Vec<_> = prog.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["fb", "fa"]);
}

#[test]
fn file_including_itself_is_a_no_op() {
    // The origin path is pre-seeded in the dedup set.
    let loader = MapLoader::new(&[("main.clike", "int ghost() { return 0; }")]);
    let src = "#include \"main.clike\"\nint main() { return 0; }";
    let prog = parse_with(src, &loader).unwrap();
    assert!(prog.functions.is_empty());
}

#[test]
fn nested_main_is_dropped() {
    let loader = MapLoader::new(&[(
        "u.clike",
        "int helper() { return 7; }\nint main() { return 99; }",
    )]);
    let src = "#include \"u.clike\"\nint main() { return helper(); }";
    let prog = parse_with(src, &loader).unwrap();
    let names: Vec<_> = prog.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["helper"]);
    assert!(matches!(
        prog.main.body.stmts[0].kind,
        parse::StmtKind::Return(Some(_))
    ));
}

#[test]
fn trailing_junk_in_included_file_is_tolerated() {
    let loader = MapLoader::new(&[("u.clike", "int one() { return 1; }\nthis is not clike")]);
    let src = "#include \"u.clike\"\nint main() { return one(); }";
    let prog = parse_with(src, &loader).unwrap();
    assert_eq!(prog.functions.len(), 1);
}

#[test]
fn missing_include_file_is_an_io_error() {
    let loader = MapLoader::new(&[]);
    let src = "#include \"nope.clike\"\nint main() { return 0; }";
    let err = parse_with(src, &loader).unwrap_err();
    match err {
        ParseError::IncludeIo { path, pos, .. } => {
            assert_eq!(path, "nope.clike");
            assert_eq!(pos.line, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn include_after_first_declaration_is_rejected() {
    let loader = MapLoader::new(&[("u.clike", "int one() { return 1; }")]);
    let src = "int main() { return 0; }\n#include \"u.clike\"";
    let err = parse_with(src, &loader).unwrap_err();
    assert!(matches!(err, ParseError::BadIncludePosition { pos } if pos.line == 2));
}

#[test]
fn include_chain_deeper_than_the_cap_is_rejected() {
    // c0 -> c1 -> ... -> c69, all distinct files.
    let mut loader = MapLoader::new(&[]);
    for i in 0..70 {
        let text = if i < 69 {
            format!("#include \"c{}.clike\"\nint f{i}() {{ return 0; }}", i + 1)
        } else {
            "int last() { return 0; }".to_string()
        };
        loader.files.insert(format!("c{i}.clike"), text);
    }
    let src = "#include \"c0.clike\"\nint main() { return 0; }";
    let err = parse_with(src, &loader).unwrap_err();
    assert!(matches!(err, ParseError::IncludeDepth { .. }));
}
