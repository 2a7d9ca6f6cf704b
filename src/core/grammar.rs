//! Textual machine descriptions.
//!
//! The grammar is `[ initial "|" ] ( name ":" "{" elem ("," elem)* "}" ["|"] )*`
//! with the literal token `null` denoting the null state:
//!
//! ```text
//! Ready | Ready : {Running, Finished} | Running : {Paused} | Paused : {}
//! ```
//!
//! Serializing a machine and parsing the result reproduces an equal machine
//! (same states, same edges; handlers are not part of a description).

use crate::core::state::StateName;
use thiserror::Error;

/// Errors raised while parsing a machine description.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The description text violates the grammar.
    #[error("malformed machine description: {0}")]
    Malformed(String),

    /// A state name in the description could not be resolved to a value.
    #[error("unknown state name '{0}'")]
    UnknownState(String),
}

/// A parsed description: the optional initial state plus one block of
/// outgoing targets per listed state.
pub(crate) struct Description {
    pub(crate) initial: Option<StateName>,
    pub(crate) blocks: Vec<(StateName, Vec<StateName>)>,
}

impl Description {
    /// Every distinct non-null name mentioned anywhere in the description.
    pub(crate) fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let mentioned = self.initial.iter().chain(
            self.blocks
                .iter()
                .flat_map(|(state, targets)| std::iter::once(state).chain(targets.iter())),
        );

        for state in mentioned {
            if let Some(name) = state.as_str() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        names
    }
}

fn token(state: &StateName) -> String {
    state.to_string()
}

/// Render a description in the grammar above.
pub(crate) fn serialize(initial: &StateName, blocks: &[(StateName, Vec<StateName>)]) -> String {
    let mut segments = Vec::with_capacity(blocks.len() + 1);
    segments.push(token(initial));

    for (state, targets) in blocks {
        let elems: Vec<String> = targets.iter().map(token).collect();
        segments.push(format!("{} : {{{}}}", token(state), elems.join(", ")));
    }

    segments.join(" | ")
}

fn parse_name(text: &str) -> Result<StateName, ParseError> {
    let text = text.trim();
    if text == "null" {
        return Ok(StateName::null());
    }
    if text.is_empty() {
        return Err(ParseError::Malformed("empty state name".to_string()));
    }
    if text.contains(['{', '}', ':', ',', '|']) {
        return Err(ParseError::Malformed(format!(
            "state name '{text}' contains a reserved character"
        )));
    }
    Ok(StateName::new(text))
}

/// Parse a description. A leading segment without `:` is the initial state;
/// every other segment must be a `name : {elem, ...}` block.
pub(crate) fn parse(text: &str) -> Result<Description, ParseError> {
    let mut initial = None;
    let mut blocks = Vec::new();

    if text.trim().is_empty() {
        return Ok(Description { initial, blocks });
    }

    let segments: Vec<&str> = text.split('|').collect();

    for (position, segment) in segments.iter().enumerate() {
        let segment = segment.trim();

        if segment.is_empty() {
            // A trailing divider is allowed; anything else is not.
            if position + 1 == segments.len() && position > 0 {
                continue;
            }
            return Err(ParseError::Malformed("empty segment".to_string()));
        }

        let Some((name_part, set_part)) = segment.split_once(':') else {
            if position == 0 {
                initial = Some(parse_name(segment)?);
                continue;
            }
            return Err(ParseError::Malformed(format!(
                "expected 'name : {{...}}' but found '{segment}'"
            )));
        };

        let state = parse_name(name_part)?;

        let set_part = set_part.trim();
        let inner = set_part
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or_else(|| {
                ParseError::Malformed(format!("expected a brace-delimited set after '{state}'"))
            })?;

        let targets = if inner.trim().is_empty() {
            Vec::new()
        } else {
            inner
                .split(',')
                .map(parse_name)
                .collect::<Result<Vec<_>, _>>()?
        };

        blocks.push((state, targets));
    }

    Ok(Description { initial, blocks })
}
