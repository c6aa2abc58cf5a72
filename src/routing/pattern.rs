//! Route pattern compilation and matching.
//!
//! # Grammar
//! ```text
//! /users            literal segments, matched verbatim
//! /users/:id        `:name` captures exactly one non-empty segment
//! /docs/*path       `*name` captures every remaining segment (zero or more)
//! /files/*          bare `*` captures under the key "*"
//! ```
//!
//! # Design Decisions
//! - Segment comparison only, no regex on the hot path
//! - Trailing slashes are ignored on both sides; `/` only matches the root
//! - Wildcards are greedy: a second wildcard usually captures nothing
//! - Patterns with several wildcards remember failed (segment, offset) states,
//!   so a miss costs O(segments × path) instead of O(path^wildcards)
//! - Priority: 0 for static, +10 per parameter, +20 per wildcard (lower wins)
//! - Captured values are percent-decoded; expanded values are percent-encoded,
//!   `/` included for `:name` and kept literal for `*name`

use std::collections::HashMap;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;

/// Priority added for every `:name` segment.
pub const PARAM_WEIGHT: u32 = 10;

/// Priority added for every `*name` segment.
pub const WILDCARD_WEIGHT: u32 = 20;

/// Reasons a template cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("empty parameter name in pattern `{0}`")]
    EmptyParameter(String),

    #[error("parameter `{name}` appears more than once in pattern `{pattern}`")]
    DuplicateParameter { pattern: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// Bytes escaped in a `:name` value.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Bytes escaped in a `*name` value; separators stay literal.
const WILDCARD_SEGMENTS: &AsciiSet = &SEGMENT.remove(b'/');

/// Why a placeholder could not be filled during expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExpandError {
    Missing(String),
    Empty(String),
}

/// Segment span captured for one placeholder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Capture {
    start: usize,
    end: usize,
}

/// A compiled URL template.
#[derive(Debug, Clone)]
pub struct Pattern {
    template: String,
    segments: Vec<Segment>,
    params: Vec<String>,
    priority: u32,
    wildcards: usize,
}

impl Pattern {
    /// Compile a template such as `/users/:id/posts/:post_id`.
    pub fn parse(template: &str) -> Result<Self, PatternError> {
        let normalized = if template.starts_with('/') {
            normalize_path(template).to_string()
        } else {
            normalize_path(&format!("/{}", template)).to_string()
        };

        let mut segments = Vec::new();
        let mut params: Vec<String> = Vec::new();
        let mut priority = 0;
        let mut wildcards = 0;

        for raw in split_path(&normalized) {
            let segment = if let Some(name) = raw.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParameter(normalized.clone()));
                }
                priority += PARAM_WEIGHT;
                Segment::Param(name.to_string())
            } else if let Some(name) = raw.strip_prefix('*') {
                let name = if name.is_empty() { "*" } else { name };
                priority += WILDCARD_WEIGHT;
                wildcards += 1;
                Segment::Wildcard(name.to_string())
            } else {
                Segment::Literal(raw.to_string())
            };

            if let Segment::Param(name) | Segment::Wildcard(name) = &segment {
                if params.iter().any(|p| p == name) {
                    return Err(PatternError::DuplicateParameter {
                        pattern: normalized.clone(),
                        name: name.clone(),
                    });
                }
                params.push(name.clone());
            }
            segments.push(segment);
        }

        Ok(Self {
            template: normalized,
            segments,
            params,
            priority,
            wildcards,
        })
    }

    /// The normalized template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn is_static(&self) -> bool {
        self.params.is_empty()
    }

    /// Match an inbound path, returning every captured parameter.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let segments: Vec<&str> = split_path(path).collect();
        let mut captures = Vec::new();
        self.match_segments(&segments, &mut captures)
            .then(|| self.extract(&segments, &captures))
    }

    /// Match over a pre-split path, allocation-free unless the pattern has
    /// several wildcards. `captures` is reused by the caller across
    /// candidate routes.
    pub(crate) fn match_segments(&self, path: &[&str], captures: &mut Vec<Capture>) -> bool {
        captures.clear();
        if self.wildcards == 0 && path.len() != self.segments.len() {
            return false;
        }
        let mut dead = DeadEnds::new(self.segments.len(), path.len(), self.wildcards > 1);
        self.match_from(0, 0, path, captures, &mut dead)
    }

    fn match_from(
        &self,
        si: usize,
        pi: usize,
        path: &[&str],
        captures: &mut Vec<Capture>,
        dead: &mut DeadEnds,
    ) -> bool {
        let Some(segment) = self.segments.get(si) else {
            return pi == path.len();
        };

        match segment {
            Segment::Literal(literal) => {
                path.get(pi).is_some_and(|s| *s == literal.as_str())
                    && self.match_from(si + 1, pi + 1, path, captures, dead)
            }
            Segment::Param(_) => match path.get(pi) {
                Some(s) if !s.is_empty() => {
                    captures.push(Capture { start: pi, end: pi + 1 });
                    if self.match_from(si + 1, pi + 1, path, captures, dead) {
                        return true;
                    }
                    captures.pop();
                    false
                }
                _ => false,
            },
            Segment::Wildcard(_) => {
                if dead.contains(si, pi) {
                    return false;
                }
                // Longest span first.
                for end in (pi..=path.len()).rev() {
                    captures.push(Capture { start: pi, end });
                    if self.match_from(si + 1, end, path, captures, dead) {
                        return true;
                    }
                    captures.pop();
                }
                dead.insert(si, pi);
                false
            }
        }
    }

    pub(crate) fn extract(&self, path: &[&str], captures: &[Capture]) -> Params {
        self.params
            .iter()
            .zip(captures)
            .map(|(name, c)| (name.clone(), decode(&path[c.start..c.end].join("/"))))
            .collect()
    }

    /// Rebuild a concrete path. `lookup` receives the placeholder index and
    /// name; the first placeholder it cannot fill is returned as the error.
    /// A `:name` placeholder also refuses an empty value.
    pub(crate) fn expand<F>(&self, mut lookup: F) -> Result<String, ExpandError>
    where
        F: FnMut(usize, &str) -> Option<String>,
    {
        if self.segments.is_empty() {
            return Ok("/".to_string());
        }

        let mut url = String::with_capacity(self.template.len() + 16);
        let mut index = 0;
        for segment in &self.segments {
            url.push('/');
            match segment {
                Segment::Literal(literal) => url.push_str(literal),
                Segment::Param(name) => {
                    let value =
                        lookup(index, name).ok_or_else(|| ExpandError::Missing(name.clone()))?;
                    if value.is_empty() {
                        return Err(ExpandError::Empty(name.clone()));
                    }
                    url.extend(utf8_percent_encode(&value, SEGMENT));
                    index += 1;
                }
                Segment::Wildcard(name) => {
                    let value =
                        lookup(index, name).ok_or_else(|| ExpandError::Missing(name.clone()))?;
                    url.extend(utf8_percent_encode(&value, WILDCARD_SEGMENTS));
                    index += 1;
                }
            }
        }

        if url.len() > 1 && url.ends_with('/') {
            url.pop();
        }
        Ok(url)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Failed wildcard states of one match attempt. Only tracked for patterns
/// with more than one wildcard; otherwise nothing is allocated.
struct DeadEnds {
    width: usize,
    seen: Vec<bool>,
}

impl DeadEnds {
    fn new(segments: usize, path: usize, track: bool) -> Self {
        let width = path + 1;
        let seen = if track {
            vec![false; (segments + 1) * width]
        } else {
            Vec::new()
        };
        Self { width, seen }
    }

    fn contains(&self, si: usize, pi: usize) -> bool {
        self.seen.get(si * self.width + pi).copied().unwrap_or(false)
    }

    fn insert(&mut self, si: usize, pi: usize) {
        if let Some(slot) = self.seen.get_mut(si * self.width + pi) {
            *slot = true;
        }
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Strip trailing slashes, keeping the root intact.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Split a path into its segments after normalization. The root yields none.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let normalized = normalize_path(path);
    let body = normalized.strip_prefix('/').unwrap_or(normalized);
    body.split('/').filter(move |_| !body.is_empty())
}

/// Path parameters extracted by a match, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.0.iter().cloned().collect()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
