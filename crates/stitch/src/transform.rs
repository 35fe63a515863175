//! Per-file source transformation for bundled output
//!
//! Each file of a module becomes one block of the module's closure:
//!
//! - a file that already is a closure around the module is unwrapped, its
//!   parameter renamed to the canonical module variable when configured;
//! - any other code is validated in the sandbox first, because it will run
//!   inside a closure in the bundle but at the top level in a debug build;
//! - declaration calls for the current module are replaced by the module
//!   variable, or dropped when they form a statement of their own.

use log::debug;

use crate::{
    closure,
    diagnostics::{Diagnostics, Warning},
    error::Result,
    header::HeaderExtractor,
    module_registry::SourceFile,
    sandbox::{SandboxVerdict, ScriptSandbox},
    scanner::{ScannedSource, is_ident_byte, reindent, rename_identifier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStatus {
    /// Closure body taken over as is
    Wrapped,
    /// Unwrapped code that went through validation
    Validated,
    /// Closure body with its parameter renamed to the module variable
    Renamed,
    /// Kept as it was after a warning
    Verbatim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub status: TransformStatus,
    pub text: String,
}

#[derive(Debug)]
pub struct BlockTransformer<'a> {
    extractor: &'a HeaderExtractor,
    module_var: &'a str,
    rename_module_variable: bool,
    sandbox: Option<&'a mut dyn ScriptSandbox>,
}

impl<'a> BlockTransformer<'a> {
    pub fn new(
        extractor: &'a HeaderExtractor,
        module_var: &'a str,
        rename_module_variable: bool,
        sandbox: Option<&'a mut dyn ScriptSandbox>,
    ) -> Self {
        Self {
            extractor,
            module_var,
            rename_module_variable,
            sandbox,
        }
    }

    /// Transform one file registered under `module`
    pub fn transform(
        &mut self,
        module: &str,
        file: &SourceFile,
        diagnostics: &mut Diagnostics,
    ) -> Result<TransformResult> {
        let text: &str = &file.content;
        let Some(bounds) = ScannedSource::new(text).code_bounds() else {
            return Ok(TransformResult {
                status: TransformStatus::Wrapped,
                text: text.trim().to_owned(),
            });
        };
        let leading = text[..bounds.start].trim();
        let trailing = text[bounds.end..].trim();
        let code = &text[bounds];

        let result = match closure::analyze(code, self.extractor) {
            Some(info) if info.declaration.is_some() || info.param.is_none() => {
                if let Some(found) = info.mismatch(module) {
                    diagnostics.report(Warning::ClosureModuleMismatch {
                        path: file.path.clone(),
                        expected: module.to_owned(),
                        found: found.to_owned(),
                    })?;
                    self.verbatim(module, code)
                } else {
                    match info.param.as_deref() {
                        Some(param) if param != self.module_var => {
                            if self.rename_module_variable {
                                debug!(
                                    "Renaming module parameter '{param}' to '{}' in '{}'",
                                    self.module_var, file.path
                                );
                                let body = rename_identifier(&info.body, param, self.module_var);
                                TransformResult {
                                    status: TransformStatus::Renamed,
                                    text: reindent(&self.rewrite_declarations(&body, module), ""),
                                }
                            } else {
                                diagnostics.report(Warning::ParameterMismatch {
                                    path: file.path.clone(),
                                    module: module.to_owned(),
                                    found: param.to_owned(),
                                    expected: self.module_var.to_owned(),
                                })?;
                                self.verbatim(module, code)
                            }
                        }
                        _ => TransformResult {
                            status: TransformStatus::Wrapped,
                            text: reindent(&self.rewrite_declarations(&info.body, module), ""),
                        },
                    }
                }
            }
            _ => {
                self.validate(module, &file.path, code, diagnostics)?;
                TransformResult {
                    status: TransformStatus::Validated,
                    text: self.rewrite_declarations(code, module),
                }
            }
        };

        let TransformResult { status, mut text } = result;
        if !leading.is_empty() {
            text = format!("{leading}\n{text}");
        }
        if !trailing.is_empty() {
            text = format!("{}\n{trailing}", text.trim_end());
        }
        Ok(TransformResult { status, text })
    }

    fn verbatim(&self, module: &str, code: &str) -> TransformResult {
        TransformResult {
            status: TransformStatus::Verbatim,
            text: self.rewrite_declarations(code, module),
        }
    }

    fn validate(
        &mut self,
        module: &str,
        path: &str,
        code: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let Some(sandbox) = self.sandbox.as_deref_mut() else {
            return Ok(());
        };
        let warning = match sandbox.run(code) {
            SandboxVerdict::Clean => return Ok(()),
            SandboxVerdict::Leaked(symbols) => Warning::GlobalLeak {
                path: path.to_owned(),
                module: module.to_owned(),
                symbols,
            },
            SandboxVerdict::TimedOut => Warning::SandboxTimeout {
                path: path.to_owned(),
                module: module.to_owned(),
            },
            SandboxVerdict::Failed(message) => Warning::SandboxError {
                path: path.to_owned(),
                module: module.to_owned(),
                message,
            },
        };
        diagnostics.report(warning)
    }

    /// Replace declaration calls for `module` with the module variable. A call
    /// that is a statement by itself is removed along with its semicolon.
    pub fn rewrite_declarations(&self, text: &str, module: &str) -> String {
        let scanned = ScannedSource::new(text);
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;

        for call in self.extractor.find_calls(text) {
            if call.name != module || call.span.start < copied {
                continue;
            }
            out.push_str(&text[copied..call.span.start]);

            let starts_statement = matches!(
                previous_significant(&scanned, call.span.start),
                None | Some(b';' | b'{' | b'}')
            );
            let next = scanned.skip_trivia(call.span.end);
            let crossed_newline = text[call.span.end..next].contains('\n');
            let ends_statement = match bytes.get(next) {
                None | Some(b';' | b'}') => true,
                Some(&b) => crossed_newline && (is_ident_byte(b) || b == b'\'' || b == b'"'),
            };

            if starts_statement && ends_statement {
                copied = if bytes.get(next) == Some(&b';') {
                    next + 1
                } else {
                    call.span.end
                };
                while out.ends_with([' ', '\t']) {
                    out.pop();
                }
            } else {
                out.push_str(self.module_var);
                copied = call.span.end;
            }
        }
        out.push_str(&text[copied..]);
        out
    }
}

/// Last byte before `pos` that is neither whitespace nor part of a comment
fn previous_significant(scanned: &ScannedSource<'_>, mut pos: usize) -> Option<u8> {
    let bytes = scanned.text().as_bytes();
    while pos > 0 {
        match scanned.region_at(pos - 1) {
            Some(region) if region.kind.is_comment() => pos = region.range.start,
            _ if bytes[pos - 1].is_ascii_whitespace() => pos -= 1,
            _ => return Some(bytes[pos - 1]),
        }
    }
    None
}
