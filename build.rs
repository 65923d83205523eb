//! Build script: embed the version shown by `--version`, with the git short
//! hash appended when building from a checkout.

use std::process::Command;

fn main() {
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let hash = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|hash| !hash.is_empty());

    let full = match hash {
        Some(hash) => format!("{}+{}", version, hash),
        None => version,
    };
    println!("cargo:rustc-env=PROMTUNE_VERSION={}", full);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
