use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse a comma-separated server list. Entries are trimmed and blanks are
/// dropped. Duplicates are preserved on purpose: the sweep reports every
/// occurrence the operator asked for.
pub fn parse_target_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the content of a targets file: one server per line, blank lines
/// dropped.
pub fn parse_targets_file(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the `-s/--servers` argument into a target list.
///
/// If `spec` names an existing file it is read as newline-delimited targets;
/// otherwise it is treated as a literal comma-separated list. A file that
/// exists but cannot be read is an error, not a fallback.
pub fn load_targets(spec: &str) -> Result<Vec<String>> {
    let path = Path::new(spec);
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read targets file: {}", path.display()))?;
        Ok(parse_targets_file(&content))
    } else {
        Ok(parse_target_list(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_list_trims_and_drops_blanks() {
        let targets = parse_target_list("a.example.com, b.example.com,,  ,c");
        assert_eq!(targets, vec!["a.example.com", "b.example.com", "c"]);
    }

    #[test]
    fn comma_list_preserves_duplicates() {
        let targets = parse_target_list("dup.example.com,dup.example.com");
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn file_content_drops_blank_lines() {
        let input = "ldap1.example.com\n\n  \nldap2.example.com\n";
        let targets = parse_targets_file(input);
        assert_eq!(targets, vec!["ldap1.example.com", "ldap2.example.com"]);
    }

    #[test]
    fn nonexistent_path_falls_back_to_comma_list() {
        let targets = load_targets("x.example.com,y.example.com").unwrap();
        assert_eq!(targets, vec!["x.example.com", "y.example.com"]);
    }
}
