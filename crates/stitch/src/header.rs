//! Module header extraction
//!
//! A header is a call of the configured declaration API found in code (not in
//! comments or strings):
//!
//! - `angular.module('App', ['Util'], configFn)` declares `App`, requiring `Util`
//! - `angular.module('App')` appends to `App`
//!
//! Extraction is pattern based. Argument lists are split with the scanner so
//! nested brackets and string contents are handled, but nothing is parsed
//! beyond that.

use std::ops::Range;

use indexmap::IndexSet;
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    error::{BuildError, Result},
    scanner::{RegionKind, ScannedSource, is_ident_byte, scan, strip_comments},
};

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[\]}])").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleHeader {
    Declare {
        name: String,
        dependencies: Vec<String>,
        /// Third and later arguments, verbatim
        config_trailer: Option<String>,
    },
    Append {
        name: String,
    },
}

impl ModuleHeader {
    pub fn name(&self) -> &str {
        match self {
            Self::Declare { name, .. } | Self::Append { name } => name,
        }
    }

    pub fn is_append(&self) -> bool {
        matches!(self, Self::Append { .. })
    }
}

/// A declaration API call located in source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationCall {
    /// From the namespace identifier to the closing parenthesis
    pub span: Range<usize>,
    pub name: String,
    /// Trimmed argument texts, the name literal included
    pub arguments: Vec<String>,
}

/// A header-like call that could not be turned into a header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProblem {
    pub module: Option<String>,
    pub reason: String,
}

/// Headers of one file in source order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractedHeaders {
    pub headers: Vec<ModuleHeader>,
    pub problems: Vec<HeaderProblem>,
}

impl ExtractedHeaders {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Distinct declared and appended module names when the file declares
    /// several modules and also appends to another one
    pub fn ambiguity(&self) -> Option<(Vec<String>, Vec<String>)> {
        let declared: IndexSet<&str> = self
            .headers
            .iter()
            .filter(|h| !h.is_append())
            .map(ModuleHeader::name)
            .collect();
        let appended: IndexSet<&str> = self
            .headers
            .iter()
            .filter(|h| h.is_append() && !declared.contains(h.name()))
            .map(ModuleHeader::name)
            .collect();
        (declared.len() > 1 && !appended.is_empty()).then(|| {
            (
                declared.into_iter().map(str::to_owned).collect(),
                appended.into_iter().map(str::to_owned).collect(),
            )
        })
    }
}

/// Finds `<namespace>.<method>(...)` calls
#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    call_start: Regex,
    namespace: String,
    method: String,
}

impl HeaderExtractor {
    pub fn new(namespace: &str, method: &str) -> Result<Self> {
        let pattern = format!(
            r"{}\s*\.\s*{}\s*\(",
            regex::escape(namespace),
            regex::escape(method)
        );
        let call_start = Regex::new(&pattern)
            .map_err(|source| BuildError::InvalidPattern { pattern, source })?;
        Ok(Self {
            call_start,
            namespace: namespace.to_owned(),
            method: method.to_owned(),
        })
    }

    /// Extract the headers of one file
    pub fn extract(&self, text: &str) -> ExtractedHeaders {
        let mut extracted = ExtractedHeaders::default();
        for call in self.find_calls(text) {
            trace!("header call '{}' with {} argument(s)", call.name, call.arguments.len());
            match header_from_call(&call) {
                Ok((header, problem)) => {
                    extracted.problems.extend(problem);
                    extracted.headers.push(header);
                }
                Err(problem) => extracted.problems.push(problem),
            }
        }
        extracted
    }

    /// Every declaration API call in code whose first argument is a string literal
    pub fn find_calls(&self, text: &str) -> Vec<DeclarationCall> {
        let scanned = ScannedSource::new(text);
        let bytes = text.as_bytes();
        let mut calls = Vec::new();

        for found in self.call_start.find_iter(text) {
            let start = found.start();
            if !scanned.is_code(start)
                || (start > 0 && (is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'.'))
            {
                continue;
            }
            let open = found.end() - 1;
            let Some(close) = scanned.find_matching(open) else {
                continue;
            };
            let mut arguments: Vec<String> = scanned
                .split_top_level(open + 1..close, b',')
                .into_iter()
                .map(|range| text[range].trim().to_owned())
                .collect();
            if arguments.last().is_some_and(String::is_empty) {
                arguments.pop();
            }
            let Some(name) = arguments.first().and_then(|arg| string_literal(arg)) else {
                continue;
            };
            calls.push(DeclarationCall {
                span: start..close + 1,
                name,
                arguments,
            });
        }
        calls
    }

    /// Parse `text` as exactly one declaration API call
    pub fn parse_call(&self, text: &str) -> Option<DeclarationCall> {
        let text = text.trim();
        self.find_calls(text)
            .into_iter()
            .next()
            .filter(|call| call.span == (0..text.len()))
    }

    /// Render a declaring call: `angular.module('App', ['Util'], trailer)`
    pub fn render_declaration(
        &self,
        name: &str,
        dependencies: &[String],
        config_trailer: Option<&str>,
    ) -> String {
        let deps = dependencies
            .iter()
            .map(|dep| quote(dep))
            .collect::<Vec<_>>()
            .join(", ");
        let mut call = format!(
            "{}.{}({}, [{deps}]",
            self.namespace,
            self.method,
            quote(name)
        );
        if let Some(trailer) = config_trailer {
            call.push_str(", ");
            call.push_str(trailer);
        }
        call.push(')');
        call
    }

    /// Append form of the call, retrieving an already declared module
    pub fn render_reference(&self, name: &str) -> String {
        format!("{}.{}({})", self.namespace, self.method, quote(name))
    }
}

/// Turn a call into a header. A declaration whose dependency list cannot be
/// parsed still yields a header (without dependencies) plus a problem.
fn header_from_call(
    call: &DeclarationCall,
) -> std::result::Result<(ModuleHeader, Option<HeaderProblem>), HeaderProblem> {
    if call.arguments.len() == 1 {
        return Ok((
            ModuleHeader::Append {
                name: call.name.clone(),
            },
            None,
        ));
    }

    let deps_text = &call.arguments[1];
    if !deps_text.starts_with('[') {
        return Err(HeaderProblem {
            module: Some(call.name.clone()),
            reason: format!("dependency list '{deps_text}' is not an array literal"),
        });
    }
    let (dependencies, problem) = match parse_dependency_list(deps_text) {
        Ok(deps) => (deps, None),
        Err(reason) => (
            Vec::new(),
            Some(HeaderProblem {
                module: Some(call.name.clone()),
                reason: format!("unreadable dependency list: {reason}"),
            }),
        ),
    };
    let config_trailer = (call.arguments.len() > 2).then(|| call.arguments[2..].join(", "));

    Ok((
        ModuleHeader::Declare {
            name: call.name.clone(),
            dependencies,
            config_trailer,
        },
        problem,
    ))
}

/// Parse an array literal of module names, tolerating comments, trailing
/// commas and single quotes. Duplicates keep their first position.
pub fn parse_dependency_list(text: &str) -> std::result::Result<Vec<String>, String> {
    let stripped = strip_comments(text);
    let json = double_quoted(&stripped);
    let json = TRAILING_COMMA.replace_all(&json, "$1");
    let names: Vec<String> = serde_json::from_str(&json).map_err(|err| err.to_string())?;
    Ok(names
        .into_iter()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect())
}

/// Rewrite single-quoted string literals as JSON strings
fn double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for region in scan(text) {
        let slice = &text[region.range];
        match string_literal(slice) {
            Some(value) if region.kind == RegionKind::String && slice.starts_with('\'') => {
                out.push_str(&serde_json::to_string(&value).unwrap_or_default());
            }
            _ => out.push_str(slice),
        }
    }
    out
}

/// Value of a text that is exactly one quoted string literal
fn string_literal(text: &str) -> Option<String> {
    let regions = scan(text);
    let [region] = regions.as_slice() else {
        return None;
    };
    if region.kind != RegionKind::String || text.len() < 2 {
        return None;
    }
    let quote = text.chars().next()?;
    if !text.ends_with(quote) {
        return None;
    }
    let mut value = String::with_capacity(text.len() - 2);
    let mut chars = text[1..text.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            value.extend(chars.next());
        } else {
            value.push(c);
        }
    }
    Some(value)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
