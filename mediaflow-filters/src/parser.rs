//! Filter graph description syntax.
//!
//! A description is a list of chains separated by `;`. A chain is a list of
//! filters separated by `,`; consecutive filters in a chain are linked
//! implicitly. Each filter is `name` or `name=args`, with arguments separated
//! by `:` and given either positionally (`scale=320:240`) or by key
//! (`scale=w=320:h=240`). Bracketed labels before a filter name its inputs,
//! labels after it name its outputs:
//!
//! ```text
//! [in]split[a][b];[a]vflip[top];[b]hflip[bottom]
//! ```
//!
//! `\` escapes the next character and quotes protect separators inside a
//! value.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use mediaflow_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Arguments of one filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterArgs {
    /// Arguments given without a key, in order.
    pub positional: Vec<String>,
    /// Arguments given as `key=value`.
    pub named: BTreeMap<String, String>,
}

impl FilterArgs {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Look an argument up by key, falling back to its position.
    pub fn get(&self, key: &str, position: usize) -> Option<&str> {
        self.named
            .get(key)
            .or_else(|| self.positional.get(position))
            .map(String::as_str)
    }

    /// Parse an argument, or return `default` when it is absent.
    pub fn parse_or<T: FromStr>(
        &self,
        filter: &str,
        key: &str,
        position: usize,
        default: T,
    ) -> Result<T> {
        match self.get(key, position) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::invalid_argument(format!(
                    "{}: invalid value '{}' for '{}'",
                    filter, raw, key
                ))
            }),
        }
    }

    /// Reject keys outside `keys` and more positional values than keys.
    ///
    /// `keys` lists the accepted argument names in positional order.
    pub fn check_known(&self, filter: &str, keys: &[&str]) -> Result<()> {
        if self.positional.len() > keys.len() {
            return Err(Error::invalid_argument(format!(
                "{}: takes at most {} arguments, got {}",
                filter,
                keys.len(),
                self.positional.len()
            )));
        }
        if let Some(key) = self.named.keys().find(|k| !keys.contains(&k.as_str())) {
            return Err(Error::invalid_argument(format!(
                "{}: unknown option '{}'",
                filter, key
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FilterArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let positional = self.positional.iter().map(|v| v.to_string());
        let named = self.named.iter().map(|(k, v)| format!("{}={}", k, v));
        let parts: Vec<String> = positional.chain(named).collect();
        f.write_str(&parts.join(":"))
    }
}

/// One filter instance with its link labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDesc {
    pub name: String,
    pub args: FilterArgs,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl FilterDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: FilterArgs::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Parse `name` or `name=args`, labels already stripped.
    fn parse_body(s: &str) -> Result<Self> {
        let (name, args) = match s.split_once('=') {
            Some((name, args)) => (name.trim(), Some(args)),
            None => (s.trim(), None),
        };
        if name.is_empty() {
            return Err(Error::invalid_argument(format!(
                "missing filter name in '{}'",
                s
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::invalid_argument(format!(
                "invalid filter name '{}'",
                name
            )));
        }
        let mut desc = Self::new(name);
        if let Some(args) = args {
            desc.args = parse_args(args)?;
        }
        Ok(desc)
    }
}

impl fmt::Display for FilterDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{}]", input)?;
        }
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            write!(f, "={}", self.args)?;
        }
        for output in &self.outputs {
            write!(f, "[{}]", output)?;
        }
        Ok(())
    }
}

/// Filters linked one after another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDesc {
    pub filters: Vec<FilterDesc>,
}

impl ChainDesc {
    pub fn parse(s: &str) -> Result<Self> {
        let mut filters = Vec::new();
        for part in split_top_level(s, ',')? {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "empty filter in chain '{}'",
                    s.trim()
                )));
            }
            let (body, inputs, outputs) = extract_links(part)?;
            let mut desc = FilterDesc::parse_body(&body)?;
            desc.inputs = inputs;
            desc.outputs = outputs;
            filters.push(desc);
        }
        Ok(Self { filters })
    }
}

impl fmt::Display for ChainDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        Ok(())
    }
}

/// A whole graph description: one or more chains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDesc {
    pub chains: Vec<ChainDesc>,
}

impl GraphDesc {
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::invalid_argument("empty filter graph description"));
        }
        let chains = split_top_level(s, ';')?
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| ChainDesc::parse(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { chains })
    }

    /// Every filter in description order.
    pub fn filters(&self) -> impl Iterator<Item = &FilterDesc> {
        self.chains.iter().flat_map(|c| c.filters.iter())
    }
}

impl FromStr for GraphDesc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for GraphDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", chain)?;
        }
        Ok(())
    }
}

fn parse_args(s: &str) -> Result<FilterArgs> {
    let mut args = FilterArgs::default();
    for part in split_top_level(s, ':')? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if key.is_empty() {
                    return Err(Error::invalid_argument(format!(
                        "missing option name in '{}'",
                        part
                    )));
                }
                if args
                    .named
                    .insert(key.to_string(), unquote(value.trim()))
                    .is_some()
                {
                    return Err(Error::invalid_argument(format!(
                        "option '{}' given twice",
                        key
                    )));
                }
            }
            None => args.positional.push(unquote(part)),
        }
    }
    Ok(args)
}

/// Remove escapes and one level of surrounding quotes.
fn unquote(s: &str) -> String {
    let inner = match s.as_bytes() {
        [b'"', .., b'"'] | [b'\'', .., b'\''] if s.len() >= 2 => &s[1..s.len() - 1],
        _ => s,
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split on `sep` outside quotes, brackets and escapes.
///
/// Escapes and quotes are kept in the parts so a later split can honour
/// them again.
fn split_top_level(s: &str, sep: char) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' | '\'' if quote.is_none() => {
                quote = Some(c);
                current.push(c);
            }
            c if Some(c) == quote => {
                quote = None;
                current.push(c);
            }
            '[' if quote.is_none() => {
                depth += 1;
                current.push(c);
            }
            ']' if quote.is_none() => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::invalid_argument(format!("unbalanced ']' in '{}'", s))
                })?;
                current.push(c);
            }
            c if c == sep && quote.is_none() && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    if let Some(q) = quote {
        return Err(Error::invalid_argument(format!(
            "unterminated {} quote in '{}'",
            q, s
        )));
    }
    if depth != 0 {
        return Err(Error::invalid_argument(format!("unclosed '[' in '{}'", s)));
    }
    parts.push(current);
    Ok(parts)
}

/// Strip leading input labels and trailing output labels from a filter.
fn extract_links(s: &str) -> Result<(String, Vec<String>, Vec<String>)> {
    let mut inputs = Vec::new();
    let mut rest = s.trim();

    while let Some(after) = rest.strip_prefix('[') {
        let end = after
            .find(']')
            .ok_or_else(|| Error::invalid_argument(format!("unclosed '[' in '{}'", s)))?;
        inputs.push(check_label(&after[..end], s)?);
        rest = after[end + 1..].trim_start();
    }

    let mut outputs = Vec::new();
    while let Some(before) = rest.strip_suffix(']') {
        let start = before
            .rfind('[')
            .ok_or_else(|| Error::invalid_argument(format!("unbalanced ']' in '{}'", s)))?;
        outputs.push(check_label(&before[start + 1..], s)?);
        rest = before[..start].trim_end();
    }
    outputs.reverse();

    Ok((rest.to_string(), inputs, outputs))
}

fn check_label(label: &str, context: &str) -> Result<String> {
    let label = label.trim();
    if label.is_empty() || label.contains(['[', ']', ',', ';']) {
        return Err(Error::invalid_argument(format!(
            "invalid link label '[{}]' in '{}'",
            label, context
        )));
    }
    Ok(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_chain() {
        let graph = GraphDesc::parse("[in]scale=320:240,vflip[out]").unwrap();
        assert_eq!(graph.chains.len(), 1);
        let filters = &graph.chains[0].filters;
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].name, "scale");
        assert_eq!(filters[0].inputs, vec!["in"]);
        assert_eq!(filters[0].args.positional, vec!["320", "240"]);
        assert!(filters[0].outputs.is_empty());
        assert_eq!(filters[1].name, "vflip");
        assert_eq!(filters[1].outputs, vec!["out"]);
    }

    #[test]
    fn test_named_and_positional_args() {
        let graph = GraphDesc::parse("scale=w=640:h=360").unwrap();
        let args = &graph.chains[0].filters[0].args;
        assert_eq!(args.get("w", 0), Some("640"));
        assert_eq!(args.get("h", 1), Some("360"));

        let graph = GraphDesc::parse("scale=640:h=360").unwrap();
        let args = &graph.chains[0].filters[0].args;
        assert_eq!(args.get("w", 0), Some("640"));
        assert_eq!(args.get("h", 1), Some("360"));
        assert_eq!(args.parse_or("scale", "w", 0, 0u32).unwrap(), 640);
        assert!(args.parse_or::<u32>("scale", "x", 5, 7).is_ok());
    }

    #[test]
    fn test_multiple_chains_and_labels() {
        let graph =
            GraphDesc::parse("[in]split[a][b];[a]vflip[top];[b]hflip[bottom]").unwrap();
        assert_eq!(graph.chains.len(), 3);
        assert_eq!(graph.chains[0].filters[0].outputs, vec!["a", "b"]);
        assert_eq!(graph.chains[2].filters[0].inputs, vec!["b"]);
        assert_eq!(graph.filters().count(), 3);
    }

    #[test]
    fn test_quotes_and_escapes() {
        let graph = GraphDesc::parse("volume='0.5:x',null").unwrap();
        let filters = &graph.chains[0].filters;
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].args.positional, vec!["0.5:x"]);

        let graph = GraphDesc::parse(r"volume=a\:b").unwrap();
        assert_eq!(graph.chains[0].filters[0].args.positional, vec!["a:b"]);
    }

    #[test]
    fn test_malformed_descriptions() {
        for bad in [
            "",
            "scale=1:2,,vflip",
            "[in scale",
            "scale]",
            "volume='0.5",
            "[]null",
            "=320",
            "sc ale",
            "scale=w=1:w=2",
        ] {
            let err = GraphDesc::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::InvalidArgument(_)),
                "{:?} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_display_round_trips() {
        let text = "[in]scale=320:240,vflip[mid];[mid]fps=fps=30[out]";
        let graph = GraphDesc::parse(text).unwrap();
        assert_eq!(graph.to_string(), text);
        assert_eq!(GraphDesc::parse(&graph.to_string()).unwrap(), graph);
    }

    #[test]
    fn test_check_known() {
        let graph = GraphDesc::parse("scale=1:2:3").unwrap();
        let args = &graph.chains[0].filters[0].args;
        assert!(args.check_known("scale", &["w", "h"]).is_err());
        let graph = GraphDesc::parse("scale=q=1").unwrap();
        let args = &graph.chains[0].filters[0].args;
        assert!(args.check_known("scale", &["w", "h"]).is_err());
    }
}
