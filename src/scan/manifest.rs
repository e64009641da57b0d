//! `META-INF/MANIFEST.MF` parsing, version resolution and canonical text.
//!
//! The manifest format is a main section followed by named sections, each a
//! list of `Key: Value` headers separated by blank lines. Lines longer than
//! 72 bytes continue on the next line, which then starts with one space.

use thiserror::Error;
use tracing::warn;

pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const SIGNATURE_VERSION: &str = "Signature-Version";
const NAME: &str = "Name";
const MAX_LINE_BYTES: usize = 72;

/// Version headers in priority order.
const VERSION_KEYS: [&str; 3] = ["Specification-Version", "Implementation-Version", "Version"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("invalid manifest header on line {line}: {reason}")]
    Malformed { line: usize, reason: &'static str },
}

/// Ordered headers of one section. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets `name`, keeping the original position when it already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn version(&self) -> Option<&str> {
        VERSION_KEYS.iter().find_map(|key| self.get(key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Attributes,
    sections: Vec<(String, Attributes)>,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes)?;

        // Group headers into sections. The first group is always the main
        // section, even when empty; later blank-line runs are collapsed.
        let mut groups: Vec<Vec<(usize, String, String)>> = Vec::new();
        let mut current: Vec<(usize, String, String)> = Vec::new();
        let mut main_closed = false;

        for (index, line) in physical_lines(text).into_iter().enumerate() {
            let number = index + 1;
            if line.is_empty() {
                if !main_closed || !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                    main_closed = true;
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                match current.last_mut() {
                    Some((_, _, value)) => value.push_str(rest),
                    None => {
                        return Err(ManifestError::Malformed {
                            line: number,
                            reason: "continuation line without a header",
                        })
                    }
                }
                continue;
            }

            let (key, value) = line.split_once(':').ok_or(ManifestError::Malformed {
                line: number,
                reason: "missing ':' separator",
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ManifestError::Malformed {
                    line: number,
                    reason: "empty header name",
                });
            }
            let value = value.strip_prefix(' ').unwrap_or(value);
            current.push((number, key.to_string(), value.to_string()));
        }
        if !main_closed || !current.is_empty() {
            groups.push(current);
        }

        let mut groups = groups.into_iter();
        let mut manifest = Manifest::default();
        for (_, key, value) in groups.next().unwrap_or_default() {
            manifest.main.insert(key, value);
        }

        for group in groups {
            let mut headers = group.into_iter();
            let name = match headers.next() {
                Some((_, key, value)) if key.eq_ignore_ascii_case(NAME) => value,
                Some((line, _, _)) => {
                    return Err(ManifestError::Malformed {
                        line,
                        reason: "section does not start with a Name header",
                    })
                }
                None => continue,
            };

            let attributes = manifest.section_mut(&name);
            for (_, key, value) in headers {
                attributes.insert(key, value);
            }
        }

        Ok(manifest)
    }

    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    pub fn main_attributes_mut(&mut self) -> &mut Attributes {
        &mut self.main
    }

    /// Named sections in the order they appear in the file.
    pub fn sections(&self) -> &[(String, Attributes)] {
        &self.sections
    }

    /// Adds or extends the named section.
    pub fn section_mut(&mut self, name: &str) -> &mut Attributes {
        let position = match self.sections.iter().position(|(n, _)| n == name) {
            Some(position) => position,
            None => {
                self.sections.push((name.to_string(), Attributes::default()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[position].1
    }

    /// First version header found, main section before named sections.
    pub fn resolve_version(&self) -> Option<&str> {
        self.main
            .version()
            .or_else(|| self.sections.iter().find_map(|(_, a)| a.version()))
    }

    /// Canonical text form with `\r\n` terminators and 72-byte wrapping.
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        let version_key = [MANIFEST_VERSION, SIGNATURE_VERSION]
            .into_iter()
            .find(|key| self.main.get(key).is_some());
        if let Some(key) = version_key {
            if let Some(value) = self.main.get(key) {
                write_header(&mut out, key, value);
            }
        }
        for (key, value) in self.main.iter() {
            if version_key.is_some_and(|written| written.eq_ignore_ascii_case(key)) {
                continue;
            }
            write_header(&mut out, key, value);
        }
        out.push_str("\r\n");

        for (name, attributes) in &self.sections {
            write_header(&mut out, NAME, name);
            for (key, value) in attributes.iter() {
                write_header(&mut out, key, value);
            }
            out.push_str("\r\n");
        }

        out
    }

    /// Non-empty lines of [`Manifest::to_text`].
    pub fn to_lines(&self) -> Vec<String> {
        split_lines(&self.to_text())
    }
}

/// Splits on `\n` and `\r`, dropping empty segments and keeping order.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split(['\n', '\r'])
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Physical lines terminated by `\r\n`, `\n` or `\r`.
fn physical_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\r' => {
                lines.push(&text[start..pos]);
                if bytes.get(pos + 1) == Some(&b'\n') {
                    pos += 1;
                }
                start = pos + 1;
            }
            b'\n' => {
                lines.push(&text[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
        pos += 1;
    }
    if start < bytes.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn write_header(out: &mut String, key: &str, value: &str) {
    let line = format!("{key}: {value}");
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        // Continuation lines spend one byte on the leading space.
        limit = MAX_LINE_BYTES - 1;
    }
}

/// Version and text lines derived from an archive's manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    pub version: Option<String>,
    pub lines: Vec<String>,
}

/// Absent and malformed manifests both give an empty summary.
pub fn summarize(bytes: Option<&[u8]>) -> ManifestSummary {
    let Some(bytes) = bytes else {
        return ManifestSummary::default();
    };

    match Manifest::parse(bytes) {
        Ok(manifest) => ManifestSummary {
            version: manifest.resolve_version().map(str::to_string),
            lines: manifest.to_lines(),
        },
        Err(error) => {
            warn!(error = %error, "Ignoring unreadable manifest");
            ManifestSummary::default()
        }
    }
}
