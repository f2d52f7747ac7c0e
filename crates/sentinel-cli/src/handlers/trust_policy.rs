//! Trust-policy analyzer subcommands (C15): lint a role's trust policy
//! document and generate remediation templates.

use sentinel_analysis::trust::{self, TemplateKind};

/// `sentinel trust-policy analyze --file <path>`
///
/// Prints the overall enforcement classification and every `TRUST-0x`
/// finding, then exits `0`/`1`/`2` per `spec.md` §4.13 (no findings / any
/// HIGH / worst is MEDIUM).
pub fn analyze(path: std::path::PathBuf) -> i32 {
    let document = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("ERROR: failed to read trust policy {}: {err}", path.display());
            return 1;
        }
    };

    let report = match trust::analyze(&document) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return 1;
        }
    };

    println!("enforcement={:?}", report.enforcement);
    for finding in &report.findings {
        println!(
            "{}: {:?}: statement {}: {} ({})",
            finding.rule_id, finding.risk, finding.affected_statement, finding.message, finding.recommendation
        );
    }
    if report.findings.is_empty() {
        println!("no findings");
    }

    report.exit_code()
}

fn parse_template_kind(kind: &str, users: &[String]) -> Option<TemplateKind> {
    match kind {
        "any-sentinel" => Some(TemplateKind::AnySentinel),
        "specific-users" => Some(TemplateKind::SpecificUsers(users.to_vec())),
        "migration" => Some(TemplateKind::Migration),
        _ => None,
    }
}

/// `sentinel trust-policy template --kind any-sentinel|specific-users|migration --account-id <id> [--user <u>]...`
pub fn template(kind: String, account_id: String, users: Vec<String>) -> i32 {
    let Some(kind) = parse_template_kind(&kind, &users) else {
        eprintln!("ERROR: unknown template kind '{kind}' (expected any-sentinel|specific-users|migration)");
        return 1;
    };

    if matches!(kind, TemplateKind::SpecificUsers(ref u) if u.is_empty()) {
        eprintln!("ERROR: specific-users template requires at least one --user");
        return 1;
    }

    let document = trust::generate_template(&kind, &account_id);
    match serde_json::to_string_pretty(&document) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(err) => {
            eprintln!("ERROR: failed to serialize template: {err}");
            1
        }
    }
}
