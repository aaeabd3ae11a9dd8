//! Minimal INI reader for device configuration files
//!
//! Accepts `[section]` headers, `key = value` pairs and `#`/`;` comment
//! lines, everything whitespace-trimmed. Keys outside any section land in
//! the unnamed section "".

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

pub type Section = BTreeMap<String, String>;

#[derive(Debug, Default)]
pub struct IniFile {
    sections: BTreeMap<String, Section>,
}

impl IniFile {
    pub fn load(path: &Path) -> Result<IniFile> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> IniFile {
        let mut ini = IniFile::default();
        let mut current = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = name.trim().to_string();
                ini.sections.entry(current.clone()).or_default();
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                ini.sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        ini
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }
}
