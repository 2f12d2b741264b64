// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

/// Environment variable packagers set to pin the version
const VERSION_OVERRIDE: &str = "CAMERA_SESSION_VERSION";

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed={}", VERSION_OVERRIDE);

    let version = std::env::var(VERSION_OVERRIDE).unwrap_or_else(|_| git_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version from `git describe`, falling back to the crate version
fn git_version() -> String {
    let hash = git(&["rev-parse", "--short", "HEAD"]);
    match git(&["describe", "--tags", "--always", "--match", "v*"]) {
        Some(describe) => stamp(&describe, hash.as_deref()),
        None => match hash {
            Some(hash) => format!("{}-{}", env!("CARGO_PKG_VERSION"), hash),
            None => env!("CARGO_PKG_VERSION").to_string(),
        },
    }
}

/// Turn `describe` output into the stamped version
///
/// `v0.3.0` at HEAD becomes `0.3.0-<hash>`; `v0.3.0-5-gabc1234` becomes
/// `0.3.0-dirty-abc1234`. A bare hash (no tags yet) is kept as is.
fn stamp(describe: &str, hash: Option<&str>) -> String {
    let describe = describe.strip_prefix('v').unwrap_or(describe);

    let mut parts = describe.rsplitn(3, '-');
    if let (Some(ghash), Some(_ahead), Some(base)) = (parts.next(), parts.next(), parts.next()) {
        let ghash = ghash.strip_prefix('g').unwrap_or(ghash);
        return format!("{}-dirty-{}", base, ghash);
    }

    match hash {
        Some(hash) if hash != describe => format!("{}-{}", describe, hash),
        _ => describe.to_string(),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
