//! Lexical scanner for JavaScript-like source text
//!
//! Stitch never builds an AST. Every text-level decision (finding module
//! headers, unwrapping closures, renaming the module variable, re-indenting
//! bodies) is made on top of this scanner, which only knows where code ends
//! and comments, strings, template literals and regular expressions begin.

use std::ops::Range;

/// Keywords after which a `/` starts a regular expression literal
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "case",
    "do",
    "else",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "yield",
    "await",
];

/// Kind of a contiguous region of source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Plain code, including whitespace
    Code,
    /// `// ...` up to (not including) the newline
    LineComment,
    /// `/* ... */`, or everything after an unterminated `/*`
    BlockComment,
    /// Single or double quoted string literal
    String,
    /// Backtick template literal
    Template,
    /// Regular expression literal
    Regex,
}

impl RegionKind {
    pub fn is_comment(self) -> bool {
        matches!(self, Self::LineComment | Self::BlockComment)
    }

    /// Literals are opaque to every rewrite
    pub fn is_literal(self) -> bool {
        matches!(self, Self::String | Self::Template | Self::Regex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub range: Range<usize>,
}

/// Source text together with its region partition
#[derive(Debug)]
pub struct ScannedSource<'a> {
    text: &'a str,
    regions: Vec<Region>,
}

impl<'a> ScannedSource<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            regions: scan(text),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Code regions in source order
    pub fn code_regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| r.kind == RegionKind::Code)
    }

    /// Region containing `offset`. Offsets at or past the end map to the last region.
    pub fn region_at(&self, offset: usize) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.range.end <= offset);
        self.regions.get(idx).or_else(|| self.regions.last())
    }

    pub fn is_code(&self, offset: usize) -> bool {
        offset < self.text.len()
            && self
                .region_at(offset)
                .is_some_and(|r| r.kind == RegionKind::Code)
    }

    /// Advance past whitespace and comments
    pub fn skip_trivia(&self, mut pos: usize) -> usize {
        let bytes = self.text.as_bytes();
        while pos < bytes.len() {
            match self.region_at(pos) {
                Some(region) if region.kind.is_comment() => pos = region.range.end,
                _ if bytes[pos].is_ascii_whitespace() => pos += 1,
                _ => break,
            }
        }
        pos
    }

    /// Find the bracket closing the one at `open`, looking at code only
    pub fn find_matching(&self, open: usize) -> Option<usize> {
        let bytes = self.text.as_bytes();
        if !matches!(bytes.get(open), Some(b'(' | b'[' | b'{')) || !self.is_code(open) {
            return None;
        }
        let mut expected = Vec::new();
        for region in self.code_regions() {
            if region.range.end <= open {
                continue;
            }
            let start = region.range.start.max(open);
            for idx in start..region.range.end {
                match bytes[idx] {
                    b'(' => expected.push(b')'),
                    b'[' => expected.push(b']'),
                    b'{' => expected.push(b'}'),
                    closer @ (b')' | b']' | b'}') => {
                        if expected.pop() != Some(closer) {
                            return None;
                        }
                        if expected.is_empty() {
                            return Some(idx);
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }

    /// Split `range` on `separator` occurring in code at bracket depth zero
    pub fn split_top_level(&self, range: Range<usize>, separator: u8) -> Vec<Range<usize>> {
        let bytes = self.text.as_bytes();
        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut part_start = range.start;
        for region in self.code_regions() {
            if region.range.end <= range.start || region.range.start >= range.end {
                continue;
            }
            let start = region.range.start.max(range.start);
            let end = region.range.end.min(range.end);
            for idx in start..end {
                match bytes[idx] {
                    b'(' | b'[' | b'{' => depth += 1,
                    b')' | b']' | b'}' => depth = depth.saturating_sub(1),
                    b if b == separator && depth == 0 => {
                        parts.push(part_start..idx);
                        part_start = idx + 1;
                    }
                    _ => {}
                }
            }
        }
        parts.push(part_start..range.end);
        parts
    }

    /// Byte range from the first to the last non-trivia byte
    pub fn code_bounds(&self) -> Option<Range<usize>> {
        let bytes = self.text.as_bytes();
        let mut bounds: Option<Range<usize>> = None;
        for region in &self.regions {
            let span = match region.kind {
                RegionKind::LineComment | RegionKind::BlockComment => continue,
                RegionKind::Code => {
                    let Some(first) =
                        (region.range.clone()).find(|&i| !bytes[i].is_ascii_whitespace())
                    else {
                        continue;
                    };
                    let last = (region.range.clone())
                        .rev()
                        .find(|&i| !bytes[i].is_ascii_whitespace())
                        .unwrap_or(first);
                    first..last + 1
                }
                _ => region.range.clone(),
            };
            bounds = Some(match bounds {
                Some(existing) => existing.start..span.end,
                None => span,
            });
        }
        bounds
    }
}

/// Partition `text` into contiguous regions
pub fn scan(text: &str) -> Vec<Region> {
    let bytes = text.as_bytes();
    let mut regions = Vec::new();
    let mut code_start = 0;
    let mut last_significant: Option<usize> = None;
    let mut after_literal = false;
    let mut i = 0;

    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        let literal = match bytes[i] {
            b'/' if next == Some(b'/') => Some((RegionKind::LineComment, line_comment_end(bytes, i))),
            b'/' if next == Some(b'*') => {
                Some((RegionKind::BlockComment, block_comment_end(bytes, i)))
            }
            b'/' if !after_literal && regex_allowed(bytes, last_significant) => {
                regex_end(bytes, i).map(|end| (RegionKind::Regex, end))
            }
            quote @ (b'\'' | b'"') => Some((RegionKind::String, quoted_end(bytes, i, quote))),
            b'`' => Some((RegionKind::Template, template_end(bytes, i))),
            _ => None,
        };

        match literal {
            Some((kind, end)) => {
                push_code(&mut regions, code_start..i);
                regions.push(Region {
                    kind,
                    range: i..end,
                });
                if kind.is_literal() {
                    after_literal = true;
                    last_significant = Some(end - 1);
                }
                i = end;
                code_start = end;
            }
            None => {
                if !bytes[i].is_ascii_whitespace() {
                    after_literal = false;
                    last_significant = Some(i);
                }
                i += 1;
            }
        }
    }
    push_code(&mut regions, code_start..bytes.len());
    regions
}

fn push_code(regions: &mut Vec<Region>, range: Range<usize>) {
    if !range.is_empty() {
        regions.push(Region {
            kind: RegionKind::Code,
            range,
        });
    }
}

fn line_comment_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset)
}

fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |offset| start + 2 + offset + 2)
}

fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' => return j,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

fn template_end(bytes: &[u8], start: usize) -> usize {
    let mut j = start + 1;
    let mut depth = 0usize;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => {
                j += 2;
                continue;
            }
            b'$' if depth == 0 && bytes.get(j + 1) == Some(&b'{') => {
                depth = 1;
                j += 1;
            }
            b'{' if depth > 0 => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b'`' if depth == 0 => return j + 1,
            _ => {}
        }
        j += 1;
    }
    bytes.len()
}

fn regex_allowed(bytes: &[u8], last_significant: Option<usize>) -> bool {
    let Some(last) = last_significant else {
        return true;
    };
    match bytes[last] {
        b'(' | b',' | b'=' | b':' | b'[' | b'!' | b'&' | b'|' | b'?' | b'{' | b'}' | b';'
        | b'+' | b'-' | b'*' | b'%' | b'<' | b'>' | b'~' | b'^' => true,
        b if is_ident_byte(b) => {
            let word_start = bytes[..=last]
                .iter()
                .rposition(|&b| !is_ident_byte(b))
                .map_or(0, |p| p + 1);
            let word = &bytes[word_start..=last];
            REGEX_PRECEDING_KEYWORDS
                .iter()
                .any(|kw| kw.as_bytes() == word)
        }
        _ => false,
    }
}

/// End of a regex literal starting at `start`, or `None` when the `/` turns
/// out not to start one (no closing slash on the same line)
fn regex_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut j = start + 1;
    let mut in_class = false;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 1,
            b'\n' => return None,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                let flags = bytes[j + 1..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphabetic())
                    .count();
                return Some(j + 1 + flags);
            }
            _ => {}
        }
        j += 1;
    }
    None
}

pub fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

pub fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty() && !bytes[0].is_ascii_digit() && bytes.iter().all(|&b| is_ident_byte(b))
}

/// Remove every comment, replacing block comments with a single space
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for region in scan(text) {
        match region.kind {
            RegionKind::LineComment => {}
            RegionKind::BlockComment => out.push(' '),
            _ => out.push_str(&text[region.range]),
        }
    }
    out
}

/// Trim leading and trailing whitespace and comments
pub fn trim_code(text: &str) -> &str {
    ScannedSource::new(text)
        .code_bounds()
        .map_or("", |bounds| &text[bounds])
}

/// True when the text holds nothing but whitespace and comments
pub fn is_blank(text: &str) -> bool {
    ScannedSource::new(text).code_bounds().is_none()
}

/// Rename whole-word occurrences of identifier `from` to `to` in code regions
/// and template literal interpolations. Property accesses (`obj.from`) and
/// object literal keys (`{from: 1}`) are left alone.
pub fn rename_identifier(text: &str, from: &str, to: &str) -> String {
    let scanned = ScannedSource::new(text);
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;

    for region in scanned.regions() {
        match region.kind {
            RegionKind::Code => {
                let slice = &text[region.range.clone()];
                for (idx, _) in slice.match_indices(from) {
                    let start = region.range.start + idx;
                    let end = start + from.len();
                    let bounded_before = start == 0 || !is_ident_byte(bytes[start - 1]);
                    let bounded_after = end >= bytes.len() || !is_ident_byte(bytes[end]);
                    if !bounded_before
                        || !bounded_after
                        || is_property_access(bytes, start)
                        || is_object_key(bytes, start, end)
                    {
                        continue;
                    }
                    out.push_str(&text[copied..start]);
                    out.push_str(to);
                    copied = end;
                }
            }
            RegionKind::Template => {
                for inner in template_interpolations(bytes, region.range.clone()) {
                    out.push_str(&text[copied..inner.start]);
                    out.push_str(&rename_identifier(&text[inner.clone()], from, to));
                    copied = inner.end;
                }
            }
            _ => {}
        }
    }
    out.push_str(&text[copied..]);
    out
}

/// Inner ranges of the `${...}` segments of the template literal at `range`
fn template_interpolations(bytes: &[u8], range: Range<usize>) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut inner_start = 0;
    let mut j = range.start + 1;
    while j < range.end {
        match bytes[j] {
            b'\\' if depth == 0 => {
                j += 2;
                continue;
            }
            b'$' if depth == 0 && bytes.get(j + 1) == Some(&b'{') => {
                depth = 1;
                j += 1;
                inner_start = j + 1;
            }
            b'{' if depth > 0 => depth += 1,
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    found.push(inner_start..j);
                }
            }
            _ => {}
        }
        j += 1;
    }
    found
}

/// `from` in `{from: ...}` or `, from: ...`
fn is_object_key(bytes: &[u8], start: usize, end: usize) -> bool {
    let before = bytes[..start]
        .iter()
        .rfind(|b| !b.is_ascii_whitespace())
        .copied();
    let after = bytes[end..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|offset| end + offset);
    matches!(before, Some(b'{' | b','))
        && after.is_some_and(|colon| bytes[colon] == b':' && bytes.get(colon + 1) != Some(&b':'))
}

fn is_property_access(bytes: &[u8], start: usize) -> bool {
    let Some(dot) = bytes[..start]
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
    else {
        return false;
    };
    bytes[dot] == b'.' && (dot == 0 || bytes[dot - 1] != b'.')
}

/// Remove the common leading indentation and prefix each line with `indent`.
///
/// Blank lines become empty, and lines that begin inside a multi-line string
/// or template literal are copied verbatim.
pub fn reindent(text: &str, indent: &str) -> String {
    let scanned = ScannedSource::new(text);
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        let inside_literal = offset > 0
            && scanned.region_at(offset).is_some_and(|r| {
                matches!(r.kind, RegionKind::String | RegionKind::Template)
                    && r.range.start < offset
            });
        lines.push((line, inside_literal));
        offset += line.len() + 1;
    }

    let common = lines
        .iter()
        .filter(|(line, literal)| !literal && !line.trim().is_empty())
        .map(|(line, _)| leading_whitespace(line))
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(text.len() + lines.len() * indent.len());
    for (idx, (line, literal)) in lines.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if *literal {
            out.push_str(line);
        } else if !line.trim().is_empty() {
            out.push_str(indent);
            out.push_str(line[common.min(leading_whitespace(line))..].trim_end());
        }
    }
    out
}

fn leading_whitespace(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ' || *b == b'\t').count()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(text: &str) -> Vec<(RegionKind, &str)> {
        scan(text)
            .into_iter()
            .map(|r| (r.kind, &text[r.range]))
            .collect()
    }

    #[test]
    fn test_scan_comments_and_strings() {
        let text = "a = 'x//y'; // tail\n/* block */ b";
        assert_eq!(
            kinds(text),
            vec![
                (RegionKind::Code, "a = "),
                (RegionKind::String, "'x//y'"),
                (RegionKind::Code, "; "),
                (RegionKind::LineComment, "// tail"),
                (RegionKind::Code, "\n"),
                (RegionKind::BlockComment, "/* block */"),
                (RegionKind::Code, " b"),
            ]
        );
    }

    #[test]
    fn test_unterminated_block_comment_runs_to_end() {
        let text = "x; /* open angular.module('A', [])";
        let regions = scan(text);
        let last = regions.last().unwrap();
        assert_eq!(last.kind, RegionKind::BlockComment);
        assert_eq!(last.range.end, text.len());
    }

    #[test]
    fn test_regex_versus_division() {
        let text = "var r = /\"[a-z]\"/g; var d = a / b / c;";
        let found: Vec<_> = kinds(text)
            .into_iter()
            .filter(|(k, _)| *k != RegionKind::Code)
            .collect();
        assert_eq!(found, vec![(RegionKind::Regex, "/\"[a-z]\"/g")]);
    }

    #[test]
    fn test_template_with_interpolation() {
        let text = "x = `a ${ {b: 1}.b } c`; y";
        let found: Vec<_> = kinds(text)
            .into_iter()
            .filter(|(k, _)| *k == RegionKind::Template)
            .collect();
        assert_eq!(found, vec![(RegionKind::Template, "`a ${ {b: 1}.b } c`")]);
    }

    #[test]
    fn test_find_matching_ignores_literals() {
        let text = "f(')', [1, 2], {a: '}'})";
        let scanned = ScannedSource::new(text);
        assert_eq!(scanned.find_matching(1), Some(text.len() - 1));
        assert_eq!(scanned.find_matching(0), None);
    }

    #[test]
    fn test_split_top_level() {
        let text = "'a', [1, 2], function (x, y) {}";
        let scanned = ScannedSource::new(text);
        let parts: Vec<_> = scanned
            .split_top_level(0..text.len(), b',')
            .into_iter()
            .map(|r| text[r].trim())
            .collect();
        assert_eq!(parts, vec!["'a'", "[1, 2]", "function (x, y) {}"]);
    }

    #[test]
    fn test_trim_code_and_blank() {
        assert_eq!(trim_code("  /* c */\n foo(); // x\n"), "foo();");
        assert!(is_blank("// only\n/* comments */\n\n"));
        assert!(!is_blank("// c\n'use strict';"));
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("['a', // one\n'b' /* two */]"), "['a', \n'b'  ]");
    }

    #[test]
    fn test_rename_identifier() {
        let text = "app.value('app', 1); foo.app = app; var happy = app;\n// app";
        assert_eq!(
            rename_identifier(text, "app", "module"),
            "module.value('app', 1); foo.app = module; var happy = module;\n// app"
        );
    }

    #[test]
    fn test_rename_keeps_spread() {
        assert_eq!(rename_identifier("f(...app)", "app", "m"), "f(...m)");
    }

    #[test]
    fn test_rename_skips_object_keys() {
        assert_eq!(
            rename_identifier(
                "app.value('cfg', {app: 1, name: app.name, other : app});",
                "app",
                "module"
            ),
            "module.value('cfg', {app: 1, name: module.name, other : module});"
        );
        assert_eq!(
            rename_identifier("f(x, app);\ng({ id: 1,\n  app : 2 });", "app", "m"),
            "f(x, m);\ng({ id: 1,\n  app : 2 });"
        );
    }

    #[test]
    fn test_rename_inside_template_interpolation() {
        let text = "var t = `${app.name} and app ${fn({ a: app })}`;";
        assert_eq!(
            rename_identifier(text, "app", "module"),
            "var t = `${module.name} and app ${fn({ a: module })}`;"
        );
    }

    #[test]
    fn test_reindent() {
        let text = "    a();\n\n      b();\n    c();";
        assert_eq!(reindent(text, "  "), "  a();\n\n    b();\n  c();");
    }

    #[test]
    fn test_reindent_keeps_template_lines() {
        let text = "x = `line one\n  line two`;\ny();";
        assert_eq!(reindent(text, "\t"), "\tx = `line one\n  line two`;\n\ty();");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("module"));
        assert!(is_identifier("$scope"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
    }
}
