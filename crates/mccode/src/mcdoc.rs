//! McDoc header comment parsing.
//!
//! Components document themselves in a leading `/* … */` comment tagged with
//! `%I` (info), `%D` (description), `%P` (parameters), `%L` (links), and
//! `%E` (end). The `%P` section is the ground truth source of parameter
//! units and descriptions. Parsing never fails: malformed headers yield an
//! empty [`McDocData`], to be regenerated from the parameter list.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

/// A parameter entry line, `name : [unit]? description`.
static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?P<name>[a-zA-Z_][a-zA-Z0-9_]*)   # parameter name
        \s*:\s*
        (?:\[(?P<unit>[^\]]*)\])?\s*        # optional [unit]
        (?P<desc>.*?)\s*$                   # description
        ",
    )
    .expect("parameter pattern is valid")
});

/// ALL-CAPS subsection headings inside `%P`, e.g. `INPUT PARAMETERS:`.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9 _]*:?\s*$").expect("heading pattern is valid"));

/// `Key: value` lines inside `%I`.
static INFO_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[A-Za-z][A-Za-z0-9 _]*):\s*(?P<value>.*)$")
        .expect("info-field pattern is valid")
});

/// Parameter metadata: name → (unit, description).
pub type ParameterDocs = IndexMap<String, (Option<String>, Option<String>)>;

/// Everything a McDoc header holds, section by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McDocData {
    /// `Key: value` pairs from `%I` (e.g. `Written by`, `Date`, `Origin`).
    pub info_fields: IndexMap<String, String>,
    /// Non-field `%I` lines: the one-line component description.
    pub short_desc: Vec<String>,
    /// `%D` lines.
    pub desc_lines: Vec<String>,
    /// `%P` entries.
    pub parameters: ParameterDocs,
    /// `%L` lines.
    pub link_lines: Vec<String>,
}

/// Extract the first `/* … */` comment and strip the comment decoration:
/// delimiters plus each line's leading `*` (and one following space).
fn preprocess(source: &str) -> Option<String> {
    let open = source.find("/*")?;
    let close = source[open + 2..].find("*/")? + open + 2;
    let raw = &source[open + 2..close];
    let mut lines = Vec::new();
    for line in raw.split('\n') {
        let mut stripped = line.trim();
        if let Some(rest) = stripped.strip_prefix('*') {
            stripped = rest.strip_prefix(' ').unwrap_or(rest);
        }
        lines.push(stripped.to_string());
    }
    Some(lines.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Info,
    Description,
    Parameters,
    Links,
    Done,
    Other,
}

fn section_tag(line: &str) -> Option<Section> {
    let trimmed = line.trim();
    if !trimmed.starts_with('%') {
        return None;
    }
    Some(match trimmed.as_bytes().get(1) {
        Some(b'I') => Section::Info,
        Some(b'D') => Section::Description,
        Some(b'P') => Section::Parameters,
        Some(b'L') => Section::Links,
        Some(b'E') => Section::Done,
        _ => Section::Other,
    })
}

/// Parse the full McDoc data from a raw comment token or whole file.
/// Silent on malformed input: whatever could not be classified is dropped.
pub fn parse_mcdoc_full(source: &str) -> McDocData {
    let Some(cleaned) = preprocess(source) else {
        return McDocData::default();
    };
    let mut data = McDocData::default();
    let mut section = Section::None;
    for line in cleaned.split('\n') {
        if let Some(tag) = section_tag(line) {
            section = tag;
            // content may follow the tag on the same line
            let trimmed = line.trim();
            if trimmed.len() > 2 {
                let rest = trimmed[2..].trim().to_string();
                if !rest.is_empty() {
                    classify_line(&mut data, section, &rest);
                }
            }
            continue;
        }
        classify_line(&mut data, section, line);
    }
    data
}

fn classify_line(data: &mut McDocData, section: Section, line: &str) {
    match section {
        Section::Info => {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return;
            }
            if let Some(captures) = INFO_FIELD_RE.captures(trimmed) {
                data.info_fields.insert(
                    captures["key"].to_string(),
                    captures["value"].trim().to_string(),
                );
            } else {
                data.short_desc.push(trimmed.to_string());
            }
        }
        Section::Description => data.desc_lines.push(line.to_string()),
        Section::Parameters => {
            let trimmed = line.trim();
            if trimmed.is_empty() || HEADING_RE.is_match(trimmed) {
                return;
            }
            if let Some(captures) = PARAM_RE.captures(trimmed) {
                let unit = captures
                    .name("unit")
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|u| !u.is_empty());
                let desc = captures
                    .name("desc")
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|d| !d.is_empty());
                data.parameters
                    .insert(captures["name"].to_string(), (unit, desc));
            }
        }
        Section::Links => {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                data.link_lines.push(trimmed.to_string());
            }
        }
        Section::None | Section::Done | Section::Other => {}
    }
}

/// Parameter metadata from the first comment of a source file.
pub fn parse_mcdoc(source: &str) -> ParameterDocs {
    parse_mcdoc_full(source).parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r"/*******************************************************************************
*
* Component: Slit
*
* %I
* Written by: Kim Lefmann
* Date: October 4, 1997
* Origin: Risoe
*
* Rectangular/circular slit with optional insignificance cut
*
* %D
* A simple rectangular or circular slit.
* No transmission around the slit is allowed.
*
* %P
* INPUT PARAMETERS:
*
* radius: [m]   Radius of slit in the z=0 plane, centered at Origin
* xmin: [m]     Lower x bound
* xmax: [m]     Upper x bound
* unitless:     A parameter without a unit
*
* %E
*******************************************************************************/
DEFINE COMPONENT Slit
";

    #[test]
    fn parameters_extracted() {
        let docs = parse_mcdoc(HEADER);
        assert_eq!(
            docs.get("radius"),
            Some(&(
                Some("m".to_string()),
                Some("Radius of slit in the z=0 plane, centered at Origin".to_string())
            ))
        );
        assert_eq!(
            docs.get("unitless"),
            Some(&(None, Some("A parameter without a unit".to_string())))
        );
        assert!(!docs.contains_key("INPUT"));
    }

    #[test]
    fn info_fields_and_short_description() {
        let data = parse_mcdoc_full(HEADER);
        assert_eq!(data.info_fields.get("Written by").map(String::as_str), Some("Kim Lefmann"));
        assert_eq!(data.info_fields.get("Date").map(String::as_str), Some("October 4, 1997"));
        assert_eq!(data.info_fields.get("Origin").map(String::as_str), Some("Risoe"));
        assert_eq!(
            data.short_desc,
            vec!["Rectangular/circular slit with optional insignificance cut"]
        );
        assert_eq!(data.desc_lines.iter().filter(|l| !l.trim().is_empty()).count(), 2);
    }

    #[test]
    fn malformed_header_is_silently_empty() {
        assert_eq!(parse_mcdoc_full("no comment here"), McDocData::default());
        assert_eq!(parse_mcdoc_full("/* plain comment */"), McDocData::default());
    }
}
