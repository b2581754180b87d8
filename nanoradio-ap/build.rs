//! Build script for nanoradio-ap
//!
//! Stamps the binary with the git revision, build time and cargo profile,
//! exposed as `NANORADIO_*` compile-time environment variables and logged at
//! startup.

use std::process::Command;

/// Short commit hash of the checkout, or "unknown" outside a git tree
fn git_revision() -> String {
    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|rev| rev.trim().to_string())
        .filter(|rev| !rev.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let stamp = [
        ("NANORADIO_GIT_HASH", git_revision()),
        (
            "NANORADIO_BUILD_TIMESTAMP",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        ),
        (
            "NANORADIO_BUILD_PROFILE",
            std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string()),
        ),
    ];

    // No rerun-if-changed: the stamp is refreshed on every build
    for (key, value) in stamp {
        println!("cargo:rustc-env={}={}", key, value);
    }
}
