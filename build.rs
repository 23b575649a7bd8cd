fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");

    if let Some(rev) = git_revision() {
        println!("cargo:rustc-env=REACTOR_SPEED_BUILD_GIT_HASH={}", rev);
    }
}

/// Short hash of `HEAD`, when building from a git checkout.
fn git_revision() -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let rev = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!rev.is_empty()).then_some(rev)
}
