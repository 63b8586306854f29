use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short=12", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());
    println!(
        "cargo:rustc-env=LEDGER_BUILD_GIT_HASH={}",
        git_hash.unwrap_or_else(|| "unknown".to_string())
    );

    // SOURCE_DATE_EPOCH wins for reproducible builds
    let built_at = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=LEDGER_BUILD_TIME_UNIX={}", built_at);
}
