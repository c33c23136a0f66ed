use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Source roots that belong to the crate. Nothing else in the checkout is scanned.
const SOURCE_ROOTS: [&str; 4] = ["attack", "cli", "tests", "benches"];

#[derive(Clone, Copy)]
enum Check {
    UnderscoreBinding,
    AllowDeadCode,
}

impl Check {
    fn pattern(self) -> &'static str {
        match self {
            Check::UnderscoreBinding => r"\b(_[a-zA-Z0-9_]+)\b",
            Check::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Check::UnderscoreBinding => "underscore-prefixed identifiers",
            Check::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn advice(self) -> &'static str {
        match self {
            Check::UnderscoreBinding => {
                "Either use the binding (removing the underscore) or remove it completely."
            }
            Check::AllowDeadCode => {
                "Either use the code (removing the attribute) or remove it completely."
            }
        }
    }
}

// Collects every offending line of one file so the build error lists them all.
struct ViolationCollector {
    check: Check,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(check: Check, file_path: &Path) -> Self {
        Self {
            check,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.check.describe(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!(
            "\n⚠️ {} are not allowed in this project.\n   {}\n",
            self.check.describe(),
            self.check.advice()
        ));
        Some(error_msg)
    }
}

fn inside_string_literal(line_text: &str) -> bool {
    line_text
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if let Check::UnderscoreBinding = self.check {
            let is_comment = line_text.trim_start().starts_with("//");
            if is_comment || inside_string_literal(line_text) {
                return Ok(true);
            }
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

fn crate_sources() -> impl Iterator<Item = PathBuf> {
    SOURCE_ROOTS.into_iter().flat_map(|root| {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
            .map(|e| e.into_path())
    })
}

fn scan(check: Check) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(check.pattern())?;
    let mut searcher = Searcher::new();

    for path in crate_sources() {
        let mut collector = ViolationCollector::new(check, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    for check in [Check::UnderscoreBinding, Check::AllowDeadCode] {
        if let Err(e) = scan(check) {
            // eprintln! keeps the message visible in cargo's output.
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=LIRA_BUILD_TIMESTAMP={timestamp}");
}
