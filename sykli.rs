//! Sykli CI pipeline for statusd
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    // === RESOURCES ===
    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    // === TEMPLATE ===
    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    // === TASKS ===

    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets -- -D warnings -W clippy::unwrap_used -W clippy::expect_used")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin statusd")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/statusd")
        .after(&["test", "lint", "fmt"]);

    // Smoke test the release binary: serve, probe, SIGTERM, clean exit
    let _ = p
        .task("smoke-test")
        .from(&rust)
        .run(
            r#"#!/bin/bash
set -e

STATUSD_BIND_ADDR=127.0.0.1:18080 RUST_LOG=info NO_COLOR=1 ./target/release/statusd > /tmp/statusd-log.txt 2>&1 &
STATUSD_PID=$!
sleep 1

BODY=$(curl -sf http://127.0.0.1:18080/v1/status)
if [ "$BODY" != '{"status":"ok"}' ]; then
  echo "ERROR: unexpected status body: $BODY"
  exit 1
fi

kill -TERM $STATUSD_PID
wait $STATUSD_PID || { echo "ERROR: non-zero exit"; cat /tmp/statusd-log.txt; exit 1; }

grep -q "\[+\] Start shutdown" /tmp/statusd-log.txt
grep -q "\[-\] End shutdown" /tmp/statusd-log.txt

echo "Smoke test passed"
"#,
        )
        .input_from("build", "binary", "/src/target/release/statusd")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(120);

    p.emit();
}
