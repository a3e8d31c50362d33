use std::process::Command;

/// Embed the commit the gateway was built from as `GIT_COMMIT_HASH`.
fn main() {
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");
    println!("cargo:rerun-if-env-changed=GIT_COMMIT_HASH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let from_env = ["GIT_COMMIT_HASH", "GITHUB_SHA"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|sha| sha.trim().to_string())
        .find(|sha| !sha.is_empty());

    if let Some(sha) = from_env.or_else(local_head) {
        println!("cargo:rustc-env=GIT_COMMIT_HASH={sha}");
    }
}

fn local_head() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
