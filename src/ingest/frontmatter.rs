//! Document edge producer: reads relation declarations from YAML front-matter
//! and from inline `key:: [[link]]` fields.
//!
//! A key names a relation by uid or (case-insensitive) display name. Suffix
//! `.label` attaches a label, prefix `~` declares the edge as incoming:
//!
//! ```text
//! ---
//! up: "[[Parent]]"
//! up.series: ["[[Saga]]"]
//! ~next: "[[Previous Chapter]]"
//! ---
//! same:: [[Sibling A]], [[Sibling B]]
//! ```

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use pulldown_cmark::{Event, Parser as CmarkParser, Tag};
use regex::Regex;
use serde_yaml_ng::Value as YamlValue;

use crate::error::{RelgraphError, Result};
use crate::graph::{RelationEdge, RelationType};
use crate::ingest::links::LinkIndex;

/// A parsed declaration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey {
    pub relation_uid: String,
    pub label: Option<String>,
    pub incoming: bool,
}

/// One relation declaration before link resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub key: FieldKey,
    pub link: String,
}

/// Split a leading `---` YAML block from the body.
/// Returns `(None, content)` when there is no complete front-matter block.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let rest = match content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, content),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

/// Turns document text into explicit edges for one relation set.
pub struct EdgeParser {
    keys: HashMap<String, String>,
    inline_field: Regex,
    wiki_link: Regex,
    markdown_link: Regex,
}

impl EdgeParser {
    pub fn new(relations: &[RelationType]) -> Result<Self> {
        let mut keys = HashMap::new();
        for relation in relations.iter().filter(|r| !r.uid.is_empty()) {
            keys.insert(relation.uid.to_lowercase(), relation.uid.clone());
            if !relation.name.is_empty() {
                keys.entry(relation.name.to_lowercase())
                    .or_insert_with(|| relation.uid.clone());
            }
        }

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| RelgraphError::Parse(format!("regex {}: {}", pattern, e)))
        };

        Ok(Self {
            keys,
            inline_field: compile(r"(?m)^[ \t]*(~?[\w][\w .\-]*?)[ \t]*::[ \t]*(.+?)[ \t]*\r?$")?,
            wiki_link: compile(r"\[\[[^\[\]]+\]\]")?,
            markdown_link: compile(r"\[[^\[\]]*\]\([^()\s]+\)")?,
        })
    }

    /// Interpret a declaration key; `None` for keys that name no relation.
    pub fn parse_key(&self, raw: &str) -> Option<FieldKey> {
        let raw = raw.trim();
        let (incoming, key) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest.trim()),
            None => (false, raw),
        };

        if let Some(uid) = self.keys.get(&key.to_lowercase()) {
            return Some(FieldKey {
                relation_uid: uid.clone(),
                label: None,
                incoming,
            });
        }

        let (name, label) = key.split_once('.')?;
        let uid = self.keys.get(&name.trim().to_lowercase())?;
        let label = label.trim();
        Some(FieldKey {
            relation_uid: uid.clone(),
            label: (!label.is_empty()).then(|| label.to_string()),
            incoming,
        })
    }

    /// Every relation declaration in `content`, in document order:
    /// front-matter first, then inline fields.
    pub fn declarations(&self, path: &str, content: &str) -> Vec<Declaration> {
        let (frontmatter, body) = split_frontmatter(content);
        let mut out = Vec::new();

        if let Some(yaml) = frontmatter {
            match serde_yaml_ng::from_str::<YamlValue>(yaml) {
                Ok(YamlValue::Mapping(map)) => {
                    for (key, value) in map {
                        let Some(key) = key.as_str().and_then(|k| self.parse_key(k)) else {
                            continue;
                        };
                        let mut links = Vec::new();
                        collect_yaml_links(&value, &mut links);
                        out.extend(links.into_iter().map(|link| Declaration {
                            key: key.clone(),
                            link,
                        }));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Ignoring front-matter of {}: {}", path, e);
                }
            }
        }

        let code = code_ranges(body);
        for cap in self.inline_field.captures_iter(body) {
            let (Some(whole), Some(key), Some(value)) = (cap.get(0), cap.get(1), cap.get(2)) else {
                continue;
            };
            if code.iter().any(|r| r.contains(&whole.start())) {
                continue;
            }
            let Some(key) = self.parse_key(key.as_str()) else {
                continue;
            };
            for link in self.inline_links(value.as_str()) {
                out.push(Declaration {
                    key: key.clone(),
                    link,
                });
            }
        }

        out
    }

    fn inline_links(&self, value: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = self
            .wiki_link
            .find_iter(value)
            .chain(self.markdown_link.find_iter(value))
            .map(|m| (m.start(), m.as_str().to_string()))
            .collect();
        found.sort_by_key(|(start, _)| *start);
        found.into_iter().map(|(_, link)| link).collect()
    }

    /// Explicit edges declared by document `path`.
    ///
    /// Links that do not resolve to a document, and links back to `path`
    /// itself, are dropped.
    pub fn extract_document_edges(
        &self,
        path: &str,
        content: &str,
        index: &LinkIndex,
    ) -> Vec<RelationEdge> {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();

        for declaration in self.declarations(path, content) {
            let Some(target) = index.resolve(&declaration.link, path) else {
                log::debug!("{}: dangling link {}", path, declaration.link);
                continue;
            };
            if target == path {
                continue;
            }
            let (from, to) = if declaration.key.incoming {
                (target, path.to_string())
            } else {
                (path.to_string(), target)
            };
            let mut edge = RelationEdge::new(from, to, declaration.key.relation_uid);
            edge.label = declaration.key.label;
            if seen.insert((
                edge.from_path.clone(),
                edge.to_path.clone(),
                edge.relation_uid.clone(),
                edge.label.clone(),
            )) {
                edges.push(edge);
            }
        }

        edges
    }
}

/// Link strings inside a YAML value. Unquoted `[[Note]]` parses as a nested
/// sequence, so sequences are flattened.
fn collect_yaml_links(value: &YamlValue, out: &mut Vec<String>) {
    match value {
        YamlValue::String(s) => out.push(s.clone()),
        YamlValue::Sequence(seq) => seq.iter().for_each(|v| collect_yaml_links(v, out)),
        YamlValue::Tagged(tagged) => collect_yaml_links(&tagged.value, out),
        _ => {}
    }
}

/// Byte ranges of code blocks and inline code spans in `body`.
fn code_ranges(body: &str) -> Vec<Range<usize>> {
    CmarkParser::new(body)
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => Some(range),
            _ => None,
        })
        .collect()
}
