// ─── Version Ordering ───
// Comparable keys for runtime version strings such as "GE-Proton9-7",
// "proton-9.0-4" or "experimental-9.0-20240601".

use std::cmp::Ordering;

/// Channel prefixes removed before splitting a tag into runs.
const KNOWN_PREFIXES: &[&str] = &["GE-Proton", "Proton-"];

/// One run of a version string.
///
/// Variant order matters: numeric runs sort before text runs when the
/// two kinds meet at the same position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionRun {
    /// Digits, possibly dot-separated ("9", "9.0", "10.1.3").
    Number(Vec<u64>),
    /// Anything else, compared lexicographically.
    Text(String),
}

/// Parsed form of a version string. Comparing keys compares runs pairwise;
/// when one key runs out first it is the older one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionKey(Vec<VersionRun>);

impl VersionKey {
    pub fn parse(version: &str) -> Self {
        let stripped = strip_known_prefix(version.trim());
        let mut runs = Vec::new();
        let mut current = String::new();
        let mut current_is_numeric = false;

        for ch in stripped.chars() {
            let numeric = ch.is_ascii_digit() || ch == '.';
            if !current.is_empty() && numeric != current_is_numeric {
                runs.push(convert_run(&current, current_is_numeric));
                current.clear();
            }
            current_is_numeric = numeric;
            current.push(ch);
        }

        if !current.is_empty() {
            runs.push(convert_run(&current, current_is_numeric));
        }

        VersionKey(runs)
    }

    pub fn runs(&self) -> &[VersionRun] {
        &self.0
    }
}

fn strip_known_prefix(version: &str) -> &str {
    KNOWN_PREFIXES
        .iter()
        .find_map(|prefix| version.strip_prefix(prefix))
        .unwrap_or(version)
}

/// Numeric runs compare component-wise ("9.10" is newer than "9.6"). Anything
/// that does not parse cleanly degrades to a text run instead of failing.
fn convert_run(run: &str, numeric: bool) -> VersionRun {
    if !numeric {
        return VersionRun::Text(run.to_string());
    }

    let parts: Vec<&str> = run.split('.').filter(|part| !part.is_empty()).collect();
    if parts.is_empty() {
        return VersionRun::Text(run.to_string());
    }

    let parsed: Option<Vec<u64>> = parts.iter().map(|part| part.parse::<u64>().ok()).collect();
    match parsed {
        Some(numbers) => VersionRun::Number(numbers),
        None => VersionRun::Text(run.to_string()),
    }
}

/// Compare two version strings; `Greater` means `a` is newer.
///
/// Strings with identical keys fall back to a plain string comparison so the
/// order is total and sorting is deterministic.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    VersionKey::parse(a)
        .cmp(&VersionKey::parse(b))
        .then_with(|| a.cmp(b))
}

/// Sort tags newest first.
pub fn sort_newest_first<T, F>(items: &mut [T], tag: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|left, right| compare_versions(tag(right), tag(left)));
}
