use assert_cmd::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn run_file(dir: &Path, name: &str, src: &str) -> assert_cmd::assert::Assert {
    let path = dir.join(name);
    fs::write(&path, src).unwrap();
    let mut cmd = Command::cargo_bin("clike").unwrap();
    cmd.arg(&path);
    cmd.assert()
}

#[test]
fn factorial() {
    let dir = tempdir().unwrap();
    run_file(
        dir.path(),
        "fact.clike",
        "int factorial(int n) {\n\
           if (n <= 1) { return 1; } else { return n * factorial(n - 1); }\n\
         }\n\
         int main() { print(factorial(5)); }\n",
    )
    .success()
    .stdout("120\n");
}

#[test]
fn array_sum_with_for_loop() {
    let dir = tempdir().unwrap();
    run_file(
        dir.path(),
        "sum.clike",
        "int main() {\n\
           int a[3];\n\
           a[0] = 10; a[1] = 20; a[2] = 30;\n\
           int s = 0;\n\
           for (int i = 0; i < 3; i = i + 1) { s = s + a[i]; }\n\
           print(s);\n\
         }\n",
    )
    .success()
    .stdout("60\n");
}

#[test]
fn division_is_float_division() {
    let dir = tempdir().unwrap();
    run_file(dir.path(), "div.clike", "int main() { print(5 / 2); }")
        .success()
        .stdout("2.5\n");
}

#[test]
fn comments_and_blank_lines_are_ignored() {
    let dir = tempdir().unwrap();
    run_file(
        dir.path(),
        "comments.clike",
        "// leading comment\n\
         \n\
         int main() {\n\
           // prints once\n\
           print(1); // trailing\n\
         }\n",
    )
    .success()
    .stdout("1\n");
}

#[test]
fn output_order_matches_statement_order() {
    let dir = tempdir().unwrap();
    run_file(
        dir.path(),
        "order.clike",
        "void shout(int n) { print(n); }\n\
         int main() { shout(1); print(2); shout(3); }\n",
    )
    .success()
    .stdout("1\n2\n3\n");
}

#[test]
fn rerunning_the_same_program_is_deterministic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("det.clike");
    fs::write(
        &path,
        "int main() { for (int i = 0; i < 5; i = i + 1) { print(i * i); } }",
    )
    .unwrap();
    let expected = "0\n1\n4\n9\n16\n";
    for _ in 0..2 {
        let mut cmd = Command::cargo_bin("clike").unwrap();
        cmd.arg(&path);
        cmd.assert().success().stdout(expected);
    }
}
