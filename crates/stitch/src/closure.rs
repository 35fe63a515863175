//! Detection of files that consist of one self-invoking closure
//!
//! Recognised forms (trailing semicolon optional, comments allowed anywhere
//! between tokens):
//!
//! ```js
//! (function (module) { ... })(angular.module('App'));
//! (function (module) { ... }(angular.module('App')));
//! !function (module) { ... }(angular.module('App'));
//! ```
//!
//! The function may be named and may take zero or one parameters.

use crate::{
    header::{DeclarationCall, HeaderExtractor},
    scanner::{ScannedSource, is_ident_byte, is_identifier, strip_comments, trim_code},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureInfo {
    /// Name of the single parameter, if any
    pub param: Option<String>,
    /// Everything between the function's braces, verbatim
    pub body: String,
    /// Everything between the invocation's parentheses, trimmed
    pub invocation_args: String,
    /// The invocation argument when it is a declaration API call
    pub declaration: Option<DeclarationCall>,
}

impl ClosureInfo {
    pub fn declared_name(&self) -> Option<&str> {
        self.declaration.as_ref().map(|call| call.name.as_str())
    }

    /// Declared module name when it disagrees with `module`
    pub fn mismatch(&self, module: &str) -> Option<&str> {
        self.declared_name().filter(|name| *name != module)
    }
}

/// Analyze `text`; `None` unless the whole text is one self-invoking closure
pub fn analyze(text: &str, extractor: &HeaderExtractor) -> Option<ClosureInfo> {
    let text = trim_code(text);
    let scanned = ScannedSource::new(text);
    let bytes = text.as_bytes();

    let outer_close = match *bytes.first()? {
        b'(' => Some(scanned.find_matching(0)?),
        b'!' => None,
        _ => return None,
    };
    let mut pos = scanned.skip_trivia(1);

    pos = expect_keyword(text, pos, "function")?;
    pos = scanned.skip_trivia(pos);
    let name_len = bytes[pos..].iter().take_while(|b| is_ident_byte(**b)).count();
    pos = scanned.skip_trivia(pos + name_len);

    if bytes.get(pos) != Some(&b'(') {
        return None;
    }
    let params_close = scanned.find_matching(pos)?;
    let params = strip_comments(&text[pos + 1..params_close]);
    let param = match params.trim() {
        "" => None,
        name if is_identifier(name) => Some(name.to_owned()),
        _ => return None,
    };

    pos = scanned.skip_trivia(params_close + 1);
    if bytes.get(pos) != Some(&b'{') {
        return None;
    }
    let body_close = scanned.find_matching(pos)?;
    let body = text[pos + 1..body_close].to_owned();
    let after_body = scanned.skip_trivia(body_close + 1);

    let (args_open, end) = match outer_close {
        // (function () {...})(args)
        Some(close) if after_body == close => {
            let open = scanned.skip_trivia(close + 1);
            let args_close = invocation_close(&scanned, open)?;
            (open, args_close + 1)
        }
        // (function () {...}(args))
        Some(close) => {
            let args_close = invocation_close(&scanned, after_body)?;
            if scanned.skip_trivia(args_close + 1) != close {
                return None;
            }
            (after_body, close + 1)
        }
        // !function () {...}(args)
        None => {
            let args_close = invocation_close(&scanned, after_body)?;
            (after_body, args_close + 1)
        }
    };

    let mut rest = scanned.skip_trivia(end);
    if bytes.get(rest) == Some(&b';') {
        rest = scanned.skip_trivia(rest + 1);
    }
    if rest != bytes.len() {
        return None;
    }

    let args_close = scanned.find_matching(args_open)?;
    let invocation_args = text[args_open + 1..args_close].trim().to_owned();
    let declaration = extractor.parse_call(&invocation_args);

    Some(ClosureInfo {
        param,
        body,
        invocation_args,
        declaration,
    })
}

fn invocation_close(scanned: &ScannedSource<'_>, open: usize) -> Option<usize> {
    if scanned.text().as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    scanned.find_matching(open)
}

fn expect_keyword(text: &str, pos: usize, keyword: &str) -> Option<usize> {
    let end = pos + keyword.len();
    let matches = text.get(pos..end) == Some(keyword)
        && !text.as_bytes().get(end).is_some_and(|b| is_ident_byte(*b));
    matches.then_some(end)
}
