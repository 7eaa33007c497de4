use crate::error::{Error, Result};

/// One `[section]` or `[section arg]` block and the key/value pairs under it.
#[derive(Debug, Clone)]
pub(crate) struct RawSection {
    pub(crate) keyword: String,
    pub(crate) arg: Option<String>,
    options: Vec<(String, String)>,
}

impl RawSection {
    /// Looks up an option, treating `_` and `-` as equivalent in the key.
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn set(&mut self, key: &str, value: String) {
        let key = normalize_key(key);
        if let Some(entry) = self.options.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.options.push((key, value));
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed, not-yet-typed configuration file.
///
/// Section names are normalized (collapsed whitespace, lowercase
/// keyword), and option keys treat `_`/`-` interchangeably. This is a
/// line-oriented reader, not a full INI parser (no `%`-interpolation,
/// no multi-line values), since the core only needs a handful of
/// section shapes: `[server]`, `[logging]`, `[handler]`, and
/// `[interface NAME]`.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawConfig {
    pub(crate) sections: Vec<RawSection>,
}

impl RawConfig {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        let mut config = RawConfig::default();
        let mut current: Option<usize> = None;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            let line_no = lineno + 1;

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let header = header.strip_suffix(']').ok_or_else(|| Error::ConfigSyntax {
                    line: line_no,
                    message: "unterminated section header".into(),
                })?;
                let section = parse_section_header(header, line_no)?;
                config.sections.push(section);
                current = Some(config.sections.len() - 1);
                continue;
            }

            let (key, value) = split_key_value(line).ok_or_else(|| Error::ConfigSyntax {
                line: line_no,
                message: format!("expected 'key = value', got '{line}'"),
            })?;

            let idx = current.ok_or_else(|| Error::ConfigSyntax {
                line: line_no,
                message: "option given before any section header".into(),
            })?;
            config.sections[idx].set(key, value.to_string());
        }

        Ok(config)
    }

    pub(crate) fn section(&self, keyword: &str) -> Option<&RawSection> {
        self.sections.iter().find(|s| s.keyword == keyword && s.arg.is_none())
    }

    pub(crate) fn interface_sections(&self) -> impl Iterator<Item = &RawSection> {
        self.sections.iter().filter(|s| s.keyword == "interface")
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

/// Collapses interior whitespace, lowercases the keyword, and splits a
/// section header into `keyword` and an optional single argument.
fn parse_section_header(header: &str, line: usize) -> Result<RawSection> {
    let collapsed: String = header.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut parts = collapsed.splitn(2, ' ');
    let keyword = parts
        .next()
        .ok_or_else(|| Error::ConfigSyntax {
            line,
            message: "empty section header".into(),
        })?
        .to_lowercase();
    let rest = parts.next();

    match keyword.as_str() {
        "interface" | "option" => {
            let arg = rest.ok_or_else(|| Error::ConfigSyntax {
                line,
                message: format!("'{keyword}' sections must be named [{keyword} NAME]"),
            })?;
            if arg.split_whitespace().count() != 1 {
                return Err(Error::ConfigSyntax {
                    line,
                    message: format!("'{keyword}' sections take exactly one argument"),
                });
            }
            Ok(RawSection {
                keyword,
                arg: Some(arg.to_string()),
                options: Vec::new(),
            })
        }
        _ => Ok(RawSection {
            keyword,
            arg: rest.map(str::to_string),
            options: Vec::new(),
        }),
    }
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let idx = line.find(['=', ':'])?;
    let (key, value) = line.split_at(idx);
    Some((key.trim(), value[1..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_case() {
        let cfg = RawConfig::parse("[Interface   eth0]\nMulticast_Mode = yes\n").unwrap();
        let section = cfg.interface_sections().next().unwrap();
        assert_eq!(section.keyword, "interface");
        assert_eq!(section.arg.as_deref(), Some("eth0"));
        assert_eq!(section.get("multicast-mode"), Some("yes"));
        assert_eq!(section.get("multicast_mode"), Some("yes"));
    }

    #[test]
    fn rejects_interface_section_without_argument() {
        let err = RawConfig::parse("[interface]\n").unwrap_err();
        assert!(matches!(err, Error::ConfigSyntax { .. }));
    }

    #[test]
    fn rejects_option_before_section() {
        let err = RawConfig::parse("user = nobody\n").unwrap_err();
        assert!(matches!(err, Error::ConfigSyntax { .. }));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let cfg = RawConfig::parse("# comment\n\n[server]\n; another comment\nuser = nobody\n").unwrap();
        let section = cfg.section("server").unwrap();
        assert_eq!(section.get("user"), Some("nobody"));
    }
}
