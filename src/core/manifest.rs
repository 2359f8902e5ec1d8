//! Module manifest (`go.mod`) handling.
//!
//! Only what the mirror needs is modelled: the `module` directive and the
//! `replace` directives, single-line or in a block. Every other line is kept
//! verbatim so a rewrite touches nothing but the directives it changes.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// File name of a module manifest.
pub const MANIFEST_NAME: &str = "go.mod";

/// Error parsing a manifest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },
}

/// A module reference, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub path: String,
    pub version: Option<String>,
}

impl ModuleRef {
    fn write_tokens(&self, out: &mut String) {
        out.push_str(&quote(&self.path));
        if let Some(version) = &self.version {
            out.push(' ');
            out.push_str(&quote(version));
        }
    }
}

/// `replace old [version] => new [version]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old: ModuleRef,
    pub new: ModuleRef,
}

impl Replace {
    /// A redirect to the local filesystem carries no version.
    pub fn is_local(&self) -> bool {
        self.new.version.is_none()
    }
}

impl fmt::Display for Replace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.old.write_tokens(&mut out);
        out.push_str(" => ");
        self.new.write_tokens(&mut out);
        f.write_str(&out)
    }
}

#[derive(Debug, Clone)]
enum Line {
    Verbatim(String),
    Replace {
        original: String,
        in_block: bool,
        directive: Replace,
        comment: Option<String>,
        dirty: bool,
    },
}

/// A parsed manifest that can be edited and written back.
#[derive(Debug, Clone)]
pub struct ModFile {
    lines: Vec<Line>,
    module: Option<String>,
}

impl ModFile {
    /// Parse manifest text. `file` is only used in error messages.
    pub fn parse(file: &str, text: &str) -> Result<Self, ManifestError> {
        let mut lines = Vec::new();
        let mut module = None;
        let mut in_block = false;

        for (idx, raw) in text.lines().enumerate() {
            let err = |message: String| ManifestError::Parse {
                file: file.to_string(),
                line: idx + 1,
                message,
            };
            let (code, comment) = split_comment(raw);
            let tokens = tokenize(code).map_err(err)?;

            if in_block {
                if tokens.first().map(String::as_str) == Some(")") {
                    in_block = false;
                    lines.push(Line::Verbatim(raw.to_string()));
                } else if tokens.is_empty() {
                    lines.push(Line::Verbatim(raw.to_string()));
                } else {
                    lines.push(Line::Replace {
                        original: raw.to_string(),
                        in_block: true,
                        directive: parse_replace(&tokens).map_err(err)?,
                        comment,
                        dirty: false,
                    });
                }
                continue;
            }

            match tokens.first().map(String::as_str) {
                Some("module") => {
                    let path = tokens
                        .get(1)
                        .ok_or_else(|| err("usage: module module/path".to_string()))?;
                    module = Some(path.clone());
                    lines.push(Line::Verbatim(raw.to_string()));
                }
                Some("replace") if tokens.get(1).map(String::as_str) == Some("(") => {
                    in_block = tokens.get(2).map(String::as_str) != Some(")");
                    lines.push(Line::Verbatim(raw.to_string()));
                }
                Some("replace") => lines.push(Line::Replace {
                    original: raw.to_string(),
                    in_block: false,
                    directive: parse_replace(&tokens[1..]).map_err(err)?,
                    comment,
                    dirty: false,
                }),
                _ => lines.push(Line::Verbatim(raw.to_string())),
            }
        }

        if in_block {
            return Err(ManifestError::Parse {
                file: file.to_string(),
                line: text.lines().count(),
                message: "unterminated replace block".to_string(),
            });
        }

        Ok(ModFile { lines, module })
    }

    /// The declared module path.
    pub fn module_path(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// All replace directives, in file order.
    pub fn replaces(&self) -> impl Iterator<Item = &Replace> {
        self.lines.iter().filter_map(|line| match line {
            Line::Replace { directive, .. } => Some(directive),
            Line::Verbatim(_) => None,
        })
    }

    /// Rewrite local redirects with a relative target into absolute paths
    /// resolved against `module_root`. Returns how many directives changed.
    pub fn absolutize_local_replaces(&mut self, module_root: &Path) -> usize {
        let mut changed = 0;
        for line in &mut self.lines {
            let Line::Replace {
                directive, dirty, ..
            } = line
            else {
                continue;
            };
            if !directive.is_local() || Path::new(&directive.new.path).is_absolute() {
                continue;
            }
            let absolute = normalize_lexically(&module_root.join(&directive.new.path));
            tracing::debug!(
                "replace {} => {} becomes {}",
                directive.old.path,
                directive.new.path,
                absolute.display()
            );
            directive.new.path = absolute.to_string_lossy().into_owned();
            *dirty = true;
            changed += 1;
        }
        changed
    }

    /// Render the manifest. Unchanged lines are emitted verbatim; changed
    /// directives are emitted in canonical form.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Replace {
                    original,
                    dirty: false,
                    ..
                } => out.push_str(original),
                Line::Replace {
                    in_block,
                    directive,
                    comment,
                    ..
                } => {
                    out.push_str(if *in_block { "\t" } else { "replace " });
                    out.push_str(&directive.to_string());
                    if let Some(comment) = comment {
                        out.push(' ');
                        out.push_str(comment);
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

fn parse_replace(tokens: &[String]) -> Result<Replace, String> {
    let arrow = tokens
        .iter()
        .position(|t| t == "=>")
        .ok_or_else(|| "usage: replace module/path [v1.2.3] => other/module v1.4".to_string())?;
    let (left, right) = (&tokens[..arrow], &tokens[arrow + 1..]);
    let module_ref = |side: &[String]| match side {
        [path] => Ok(ModuleRef {
            path: path.clone(),
            version: None,
        }),
        [path, version] => Ok(ModuleRef {
            path: path.clone(),
            version: Some(version.clone()),
        }),
        _ => Err(format!("invalid replace operand: `{}`", side.join(" "))),
    };
    Ok(Replace {
        old: module_ref(left)?,
        new: module_ref(right)?,
    })
}

/// Split a line into code and a trailing `//` comment, ignoring `//` inside quotes.
fn split_comment(line: &str) -> (&str, Option<String>) {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == b'\\' && q == b'"' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'/' && bytes.get(i + 1) == Some(&b'/') => {
                return (&line[..i], Some(line[i..].trim_end().to_string()));
            }
            None => {}
        }
        i += 1;
    }
    (line, None)
}

fn tokenize(code: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => return Err("unterminated quoted string".to_string()),
                    },
                    Some('"') => break,
                    Some(other) => token.push(other),
                    None => return Err("unterminated quoted string".to_string()),
                }
            }
            tokens.push(token);
        } else if c == '`' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('`') => break,
                    Some(other) => token.push(other),
                    None => return Err("unterminated raw string".to_string()),
                }
            }
            tokens.push(token);
        } else if c == '(' || c == ')' {
            tokens.push(c.to_string());
            chars.next();
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || matches!(c, '"' | '`' | '(' | ')') {
                    break;
                }
                token.push(c);
                chars.next();
            }
            split_arrow(&token, &mut tokens);
        }
    }
    Ok(tokens)
}

fn split_arrow(token: &str, tokens: &mut Vec<String>) {
    if token == "=>" || !token.contains("=>") {
        tokens.push(token.to_string());
        return;
    }
    let mut parts = token.split("=>").peekable();
    while let Some(part) = parts.next() {
        if !part.is_empty() {
            tokens.push(part.to_string());
        }
        if parts.peek().is_some() {
            tokens.push("=>".to_string());
        }
    }
}

fn quote(token: &str) -> String {
    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '`' | '\'' | '(' | ')' | ','))
        || token.contains("//")
        || token.contains("=>");
    if !needs_quotes {
        return token.to_string();
    }
    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "module example.com/app

go 1.21

require (
\texample.com/lib v1.0.0
\tgithub.com/pkg/errors v0.9.1
)

replace example.com/lib v1.0.0 => ../local/pkg // keep local copy

replace (
\tgithub.com/pkg/errors => github.com/pkg/errors v0.9.2
\texample.com/tools => ./tools
\texample.com/abs => /opt/abs
)
";

    #[test]
    fn test_parse_module_and_replaces() {
        let file = ModFile::parse("go.mod", MANIFEST).unwrap();
        assert_eq!(file.module_path(), Some("example.com/app"));

        let replaces: Vec<_> = file.replaces().cloned().collect();
        assert_eq!(replaces.len(), 4);
        assert_eq!(replaces[0].old.version.as_deref(), Some("v1.0.0"));
        assert_eq!(replaces[0].new.path, "../local/pkg");
        assert!(replaces[0].is_local());
        assert!(!replaces[1].is_local());
        assert_eq!(replaces[2].new.path, "./tools");
    }

    #[test]
    fn test_replace_block_without_space() {
        let text = "module m\n\nreplace(\n\ta => ../a\n)\nreplace()\nrequire(\n\tb v1.0.0\n)\n";
        let mut file = ModFile::parse("go.mod", text).unwrap();
        assert_eq!(file.replaces().count(), 1);

        let changed = file.absolutize_local_replaces(Path::new("/proj/m"));
        assert_eq!(changed, 1);
        let out = file.format();
        assert!(out.contains("replace(\n\ta => /proj/a\n)\n"));
        assert!(out.ends_with("replace()\nrequire(\n\tb v1.0.0\n)\n"));
    }

    #[test]
    fn test_absolutize_local_replaces() {
        let mut file = ModFile::parse("go.mod", MANIFEST).unwrap();
        let changed = file.absolutize_local_replaces(Path::new("/proj/app"));
        assert_eq!(changed, 2);

        let text = file.format();
        assert!(text.contains(
            "replace example.com/lib v1.0.0 => /proj/local/pkg // keep local copy\n"
        ));
        assert!(text.contains("\texample.com/tools => /proj/app/tools\n"));
        assert!(text.contains("\tgithub.com/pkg/errors => github.com/pkg/errors v0.9.2\n"));
        assert!(text.contains("\texample.com/abs => /opt/abs\n"));
        assert!(text.starts_with("module example.com/app\n\ngo 1.21\n"));
    }

    #[test]
    fn test_absolute_redirects_untouched() {
        let text = "module m\n\nreplace a v1 => /abs/a\nreplace b => b2 v2\n";
        let mut file = ModFile::parse("go.mod", text).unwrap();
        assert_eq!(file.absolutize_local_replaces(Path::new("/proj")), 0);
        assert_eq!(file.format(), text);
    }

    #[test]
    fn test_quoted_paths() {
        let text = "module m\nreplace a => \"../dir with space\"\n";
        let mut file = ModFile::parse("go.mod", text).unwrap();
        assert_eq!(file.replaces().next().unwrap().new.path, "../dir with space");
        file.absolutize_local_replaces(Path::new("/p/m"));
        assert!(file.format().contains("replace a => \"/p/dir with space\"\n"));
    }

    #[test]
    fn test_parse_errors() {
        let err = ModFile::parse("go.mod", "module m\nreplace a b c\n").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { line: 2, .. }));

        let err = ModFile::parse("go.mod", "module m\nreplace (\n\ta => ./a\n").unwrap_err();
        assert!(err.to_string().contains("unterminated replace block"));
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/proj/app/../local/./pkg")),
            PathBuf::from("/proj/local/pkg")
        );
        assert_eq!(normalize_lexically(Path::new("/../x")), PathBuf::from("/x"));
    }
}
