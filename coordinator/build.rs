use std::process::Command;

use anyhow::Result as AnyResult;
use chrono::Utc;

fn main() -> AnyResult<()> {
    let commit_sha = git(&["rev-parse", "--short=8", "HEAD"]);
    let commit_date = git(&["log", "-1", "--format=%cs"]);
    println!(
        "cargo:rustc-env=COMMIT_SHA={}",
        commit_sha.as_deref().unwrap_or("unknown")
    );
    println!(
        "cargo:rustc-env=COMMIT_DATE={}",
        commit_date.as_deref().unwrap_or("unknown")
    );
    println!("cargo:rustc-env=BUILD_DATE={}", Utc::now().format("%Y-%m-%d"));
    println!(
        "cargo:rustc-env=TARGET={}",
        std::env::var("TARGET").unwrap_or_default()
    );
    Ok(())
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
