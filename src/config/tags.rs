//! YAML Tag Extensions
//!
//! Two extensions are applied to every parsed document:
//!
//! - `${NAME}` at the start of a plain (unquoted, untagged) scalar is replaced
//!   by the value of the environment variable `NAME`, followed by whatever text
//!   came after the token (`${HOME}/data` becomes `/home/me/data`). An unset
//!   variable yields an empty string and a warning. Quoted scalars such as
//!   `'${HOME}'` are kept literally.
//! - `!join [a, b, ...]` concatenates the string form of each element with no
//!   separator. Combined with anchors this builds paths from shared prefixes:
//!   `data_dir: !join [*project_dir, /data]`.
//!
//! The extensions live in a [`TagResolver`] built for each parse rather than in
//! any process-wide parser registry.
//!
//! `serde_yaml` does not report scalar styles, so plain env references are
//! found with a `yaml-rust2` event pass over the source first and tagged
//! `!env_var` in place before the document is deserialized.

use regex::Regex;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, warn};
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

/// Matches `${NAME}` at the start of a scalar
pub const ENV_PATTERN: &str = r"^\$\{([^}^{]+)\}";

/// Tag name of the string-join extension
pub const JOIN_TAG: &str = "join";

/// Tag given to plain scalars that start with an env reference
pub const ENV_TAG: &str = "env_var";

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Failures raised while resolving tags and keys
#[derive(Debug, Error, PartialEq)]
pub enum TagError {
    #[error("unsupported tag {0}")]
    UnsupportedTag(String),

    #[error("!join expects a sequence, found {0}")]
    JoinTarget(&'static str),

    #[error("!join elements must be scalars, found {0}")]
    JoinElement(&'static str),

    #[error("mapping keys must be scalars, found {0}")]
    KeyType(&'static str),

    #[error("{0}")]
    Scan(String),
}

/// Resolves the custom tags of a freshly parsed YAML tree
pub struct TagResolver {
    env_pattern: Regex,
    lookup: EnvLookup,
}

impl TagResolver {
    /// Resolver reading the process environment
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_env(|name| std::env::var(name).ok())
    }

    /// Resolver with a caller supplied environment lookup
    pub fn with_env<F>(lookup: F) -> Result<Self, regex::Error>
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        Ok(Self {
            env_pattern: Regex::new(ENV_PATTERN)?,
            lookup: Box::new(lookup),
        })
    }

    /// Resolve every tag, interpolate env references and stringify mapping keys
    pub fn resolve(&self, value: Value) -> Result<Value, TagError> {
        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Sequence),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (key, item) in map {
                    let key = key_to_string(self.resolve(key)?)?;
                    resolved.insert(Value::String(key), self.resolve(item)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Tagged(tagged) => self.resolve_tagged(*tagged),
            scalar => Ok(scalar),
        }
    }

    /// Tag every plain, untagged scalar of `content` that starts with `${`.
    ///
    /// Quoted scalars and scalars with an explicit tag are left alone, so
    /// they come out of [`resolve`](Self::resolve) literally.
    pub fn mark_env_scalars<'a>(&self, content: &'a str) -> Result<Cow<'a, str>, TagError> {
        let mut scan = PlainEnvScalars {
            pattern: &self.env_pattern,
            starts: Vec::new(),
        };
        Parser::new(content.chars())
            .load(&mut scan, true)
            .map_err(|e| TagError::Scan(e.to_string()))?;

        if scan.starts.is_empty() {
            return Ok(Cow::Borrowed(content));
        }
        debug!("Tagging {} env references", scan.starts.len());

        // Parser marks count chars; splice from the back so offsets stay valid
        let offsets: Vec<usize> = content.char_indices().map(|(at, _)| at).collect();
        let mut marked = content.to_string();
        for start in scan.starts.into_iter().rev() {
            let at = offsets.get(start).copied().unwrap_or(content.len());
            marked.insert_str(at, &format!("!{} ", ENV_TAG));
        }
        Ok(Cow::Owned(marked))
    }

    /// Apply the `${NAME}` substitution to a single scalar
    pub fn interpolate(&self, raw: String) -> String {
        let token = self
            .env_pattern
            .captures(&raw)
            .map(|caps| (caps[1].to_string(), caps.get(0).map_or(0, |m| m.end())));
        let Some((name, token_end)) = token else {
            return raw;
        };

        match (self.lookup)(&name) {
            Some(value) => format!("{}{}", value, &raw[token_end..]),
            None => {
                warn!("No value for environment variable [{}], using an empty string", name);
                String::new()
            }
        }
    }

    fn resolve_tagged(&self, tagged: TaggedValue) -> Result<Value, TagError> {
        if tagged.tag == ENV_TAG {
            return match tagged.value {
                Value::String(raw) => Ok(Value::String(self.interpolate(raw))),
                other => self.resolve(other),
            };
        }
        if tagged.tag != JOIN_TAG {
            return Err(TagError::UnsupportedTag(tagged.tag.to_string()));
        }

        let items = match tagged.value {
            Value::Sequence(items) => items,
            other => return Err(TagError::JoinTarget(kind_of(&other))),
        };

        let mut joined = String::new();
        for item in items {
            match self.resolve(item)? {
                Value::String(s) => joined.push_str(&s),
                Value::Number(n) => joined.push_str(&n.to_string()),
                Value::Bool(b) => joined.push_str(if b { "true" } else { "false" }),
                Value::Null => {}
                other => return Err(TagError::JoinElement(kind_of(&other))),
            }
        }
        Ok(Value::String(joined))
    }
}

/// Collects the char offsets of plain env scalars
struct PlainEnvScalars<'r> {
    pattern: &'r Regex,
    starts: Vec<usize>,
}

impl MarkedEventReceiver for PlainEnvScalars<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if let Event::Scalar(value, TScalarStyle::Plain, _, None) = event {
            if self.pattern.is_match(&value) {
                self.starts.push(mark.index());
            }
        }
    }
}

/// Render a mapping key as a string
fn key_to_string(key: Value) -> Result<String, TagError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(TagError::KeyType(kind_of(&other))),
    }
}

/// Short human name of a YAML node kind
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
