use std::process::Command;

fn main() {
    let git_hash = tool_output("git", &["rev-parse", "--short", "HEAD"]);
    println!("cargo:rustc-env=REELGRAB_GIT_HASH={git_hash}");

    // Reproducible builds pin the date through SOURCE_DATE_EPOCH.
    let build_date = match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) => tool_output("date", &["-u", "-d", &format!("@{epoch}"), "+%Y-%m-%d"]),
        Err(_) => tool_output("date", &["-u", "+%Y-%m-%d"]),
    };
    println!("cargo:rustc-env=REELGRAB_BUILD_DATE={build_date}");

    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

/// Trimmed stdout of a build-host tool, or `unknown` when it is missing or fails.
fn tool_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
