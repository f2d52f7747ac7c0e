//! Access-policy subcommands: static lint (C2).

use sentinel_core::policy::{self, Policy, Severity};

/// `sentinel policy lint --file <path>`
pub async fn lint(path: std::path::PathBuf) -> i32 {
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("ERROR: failed to read policy file {}: {err}", path.display());
            return 1;
        }
    };

    let policy = match Policy::from_json(&bytes) {
        Ok(policy) => policy,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    let file = path.to_string_lossy();
    let findings = policy::lint(&policy);
    let mut worst_is_error = false;
    for finding in &findings {
        println!("{}", finding.format(&file));
        if finding.severity == Severity::Error {
            worst_is_error = true;
        }
    }

    if findings.is_empty() {
        println!("{file}: no findings");
    }

    if worst_is_error {
        1
    } else {
        0
    }
}
