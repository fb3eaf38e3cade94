use std::path::Path;
use std::process::Command;

/// Seed data the embedded `promo.yaml` points at.
const SEED_CUSTOMERS: &str = "data/customers.json";
const SEED_EXAMPLES: &str = "data/examples.jsonl";

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=promo.yaml");
    println!("cargo:rerun-if-changed={}", SEED_CUSTOMERS);
    println!("cargo:rerun-if-changed={}", SEED_EXAMPLES);

    println!("cargo:rustc-env=PROMO_GIT_SHA={}", git_sha());

    check_seed_customers(Path::new(SEED_CUSTOMERS));
    check_seed_examples(Path::new(SEED_EXAMPLES));
}

fn git_sha() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The customer table must be a JSON array with a `customer_id` per record.
fn check_seed_customers(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        println!(
            "cargo:warning={} is missing; the default config cannot load customers",
            path.display()
        );
        return;
    };
    let trimmed = content.trim();
    if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        panic!("{} must hold a JSON array of customer records", path.display());
    }
    if !trimmed.contains("\"customer_id\"") {
        panic!("{} has no customer records", path.display());
    }
}

/// Every grounding example line needs an `id` and a `text`.
fn check_seed_examples(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        println!(
            "cargo:warning={} is missing; the default config cannot load examples",
            path.display()
        );
        return;
    };

    let mut bad_lines = Vec::new();
    let mut examples = 0usize;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        examples += 1;
        let looks_valid = line.starts_with('{')
            && line.ends_with('}')
            && line.contains("\"id\"")
            && line.contains("\"text\"");
        if !looks_valid {
            bad_lines.push(index + 1);
        }
    }

    if !bad_lines.is_empty() {
        panic!(
            "{}: lines {:?} are not grounding examples with `id` and `text`",
            path.display(),
            bad_lines
        );
    }
    if examples == 0 {
        println!("cargo:warning={} holds no grounding examples", path.display());
    }
}
