//! Keyfile configuration, for the local repository and the remote's
//! published `config` resource.
//!
//! The format is the familiar INI dialect: `[section]` or
//! `[section "subsection"]` headers, `key=value` entries, `#`/`;` comments.
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error on line {line}: {reason}")]
    Syntax { line: usize, reason: &'static str },
}

/// One `[section]` or `[section "subsection"]` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub subsection: Option<String>,
    entries: Vec<(String, String)>,
}

impl Section {
    fn matches(&self, name: &str, subsection: Option<&str>) -> bool {
        self.name == name && self.subsection.as_deref() == subsection
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A parsed keyfile. Section and entry order is preserved, so a file
/// written back out stays diffable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyFile {
    sections: Vec<Section>,
}

impl KeyFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut sections: Vec<Section> = Vec::new();

        for (ix, line) in text.lines().enumerate() {
            let line = line.trim();
            let lineno = ix + 1;

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let header = header.strip_suffix(']').ok_or(Error::Syntax {
                    line: lineno,
                    reason: "unterminated section header",
                })?;
                let (name, subsection) = match header.split_once(' ') {
                    None => (header, None),
                    Some((name, sub)) => {
                        let sub = sub
                            .trim()
                            .strip_prefix('"')
                            .and_then(|s| s.strip_suffix('"'))
                            .ok_or(Error::Syntax {
                                line: lineno,
                                reason: "subsection must be quoted",
                            })?;
                        (name, Some(sub.to_owned()))
                    }
                };
                if name.is_empty() {
                    return Err(Error::Syntax {
                        line: lineno,
                        reason: "empty section name",
                    });
                }
                sections.push(Section {
                    name: name.to_owned(),
                    subsection,
                    entries: Vec::new(),
                });
            } else {
                let (key, value) = line.split_once('=').ok_or(Error::Syntax {
                    line: lineno,
                    reason: "expected `key=value`",
                })?;
                let section = sections.last_mut().ok_or(Error::Syntax {
                    line: lineno,
                    reason: "entry before any section header",
                })?;
                section
                    .entries
                    .push((key.trim().to_owned(), value.trim().to_owned()));
            }
        }
        Ok(Self { sections })
    }

    pub fn section(&self, name: &str, subsection: Option<&str>) -> Option<&Section> {
        self.sections.iter().find(|s| s.matches(name, subsection))
    }

    /// Look a key up in `[name]` or `[name "subsection"]`.
    pub fn get(&self, name: &str, subsection: Option<&str>, key: &str) -> Option<&str> {
        self.section(name, subsection).and_then(|s| s.get(key))
    }

    /// Set a key, creating the section if needed. An existing key in the
    /// section is overwritten.
    pub fn set(
        &mut self,
        name: &str,
        subsection: Option<&str>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        let key = key.into();
        let value = value.into();
        let ix = match self.sections.iter().position(|s| s.matches(name, subsection)) {
            Some(ix) => ix,
            None => {
                self.sections.push(Section {
                    name: name.to_owned(),
                    subsection: subsection.map(|s| s.to_owned()),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        let section = &mut self.sections[ix];
        match section.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => section.entries.push((key, value)),
        }
    }

    /// The space-separated list form used by the `branches` key.
    pub fn get_list(&self, name: &str, subsection: Option<&str>, key: &str) -> Option<Vec<String>> {
        self.get(name, subsection, key)
            .map(|v| v.split_whitespace().map(|s| s.to_owned()).collect())
    }
}

impl fmt::Display for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, section) in self.sections.iter().enumerate() {
            if ix > 0 {
                writeln!(f)?;
            }
            match &section.subsection {
                None => writeln!(f, "[{}]", section.name)?,
                Some(sub) => writeln!(f, "[{} \"{}\"]", section.name, sub)?,
            }
            for (key, value) in &section.entries {
                writeln!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# repository configuration
[core]
repo_version=1
mode=archive-z2

[remote "origin"]
url=http://127.0.0.1:8080/repo
branches=main next
"#;

    #[test]
    fn test_parse_sections_and_keys() {
        let config = KeyFile::parse(SAMPLE).unwrap();

        assert_eq!(config.get("core", None, "mode"), Some("archive-z2"));
        assert_eq!(config.get("core", None, "repo_version"), Some("1"));
        assert_eq!(
            config.get("remote", Some("origin"), "url"),
            Some("http://127.0.0.1:8080/repo")
        );
        assert_eq!(
            config.get_list("remote", Some("origin"), "branches"),
            Some(vec!["main".to_owned(), "next".to_owned()])
        );
    }

    #[test]
    fn test_missing_lookups() {
        let config = KeyFile::parse(SAMPLE).unwrap();

        assert_eq!(config.get("core", None, "nope"), None);
        assert_eq!(config.get("remote", Some("upstream"), "url"), None);
        assert_eq!(config.get_list("remote", Some("upstream"), "branches"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(KeyFile::parse("[core\nmode=bare").is_err());
        assert!(KeyFile::parse("mode=bare").is_err());
        assert!(KeyFile::parse("[core]\njust a line").is_err());
        assert!(KeyFile::parse("[remote origin]\n").is_err());
    }

    #[test]
    fn test_set_and_render() {
        let mut config = KeyFile::new();
        config.set("core", None, "mode", "archive-z2");
        config.set("remote", Some("origin"), "url", "http://example.com/r");
        config.set("remote", Some("origin"), "url", "http://example.com/r2");

        let rendered = config.to_string();
        let reparsed = KeyFile::parse(&rendered).unwrap();

        assert_eq!(
            reparsed.get("remote", Some("origin"), "url"),
            Some("http://example.com/r2")
        );
        assert_eq!(reparsed, config);
    }
}
