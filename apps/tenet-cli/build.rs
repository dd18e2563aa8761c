// build.rs — Stamp `tenet --version` with the commit and day it was built.
//
// The long version reads "<crate version> (<commit> <date>)", for example
// "0.3.0 (abc1234-dirty 2026-10-16)". Outside a git checkout the commit is
// "unknown".

use std::process::Command;

fn main() {
    let mut commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
    if git(&["status", "--porcelain"]).is_some_and(|changes| !changes.is_empty()) {
        commit.push_str("-dirty");
    }
    let built_on = chrono::Utc::now().format("%Y-%m-%d");

    println!("cargo:rustc-env=TENET_GIT_HASH={commit}");
    println!("cargo:rustc-env=TENET_BUILD_DATE={built_on}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/index");
}

fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
}
