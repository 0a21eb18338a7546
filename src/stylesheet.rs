//! Theme stylesheet compilation.
//!
//! A theme may ship a `sass/` directory. Every non-partial `*.scss` in it is
//! compiled to `assets/css/<name>.css`, unless the theme already ships that
//! CSS file in its own `assets/css/`.
//!
//! Variables declared in the theme's `_variables.scss` (`$name: value;`
//! lines) can be overridden per site. The resulting declarations form a
//! prelude that replaces the `variables` import when compiling.
//!
//! The actual compiler sits behind [`StylesheetCompiler`]; the shipped
//! [`PreludeCompiler`] only resolves imports and variables, with no
//! nesting or mixin support.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SASS_DIR: &str = "sass";
pub const VARIABLES_FILE: &str = "_variables.scss";

#[derive(Error, Debug)]
pub enum StylesheetError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

pub trait StylesheetCompiler: Send + Sync {
    /// Compile `main`, with `prelude` standing in for the `variables` import.
    fn compile(&self, main: &Path, prelude: &str) -> Result<String, StylesheetError>;
}

/// One stylesheet to compile: `sass/<name>.scss` → `css/<name>.css`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetJob {
    pub source: PathBuf,
    /// Output path relative to the assets directory.
    pub output: PathBuf,
}

/// Stylesheets the theme needs compiled, in file name order.
///
/// Returns an empty list when the theme has no `sass/` directory.
pub fn plan_stylesheets(theme_dir: &Path) -> Result<Vec<StylesheetJob>, StylesheetError> {
    let sass_dir = theme_dir.join(SASS_DIR);
    let entries = match fs::read_dir(&sass_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StylesheetError::Io { path: sass_dir, source }),
    };

    let mut jobs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StylesheetError::Io {
            path: sass_dir.clone(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() || path.extension().is_none_or(|e| e != "scss") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('_') {
            continue;
        }
        let output = Path::new("css").join(format!("{stem}.css"));
        if theme_dir.join("assets").join(&output).exists() {
            tracing::debug!(
                source = %path.display(),
                "theme ships its own {}, skipping",
                output.display()
            );
            continue;
        }
        jobs.push(StylesheetJob { source: path, output });
    }
    jobs.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(jobs)
}

/// Parse `$name: value;` declarations, one per line.
///
/// Lines that do not start with `$` or lack the closing `;` are ignored.
pub fn parse_theme_variables(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let Some(rest) = line.strip_prefix('$') else {
            continue;
        };
        let Some((name, value)) = rest.split_once(':') else {
            continue;
        };
        let Some(value) = value.trim().strip_suffix(';') else {
            continue;
        };
        vars.insert(name.trim().to_string(), value.trim().to_string());
    }
    vars
}

/// Build the variables prelude for a theme.
///
/// Only variables the theme declares can be overridden; unknown site
/// overrides are ignored.
pub fn variables_prelude(
    theme_dir: &Path,
    overrides: &BTreeMap<String, String>,
) -> Result<String, StylesheetError> {
    let path = theme_dir.join(SASS_DIR).join(VARIABLES_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(source) => return Err(StylesheetError::Io { path, source }),
    };

    let mut prelude = String::new();
    for (name, value) in parse_theme_variables(&text) {
        let value = overrides
            .get(&name)
            .filter(|v| !v.is_empty())
            .unwrap_or(&value);
        prelude.push_str(&format!("${name}: {value};\n"));
    }
    Ok(prelude)
}

/// Compile every planned stylesheet into `assets_dir`.
///
/// Returns the written paths and the per-file failures.
pub fn compile_theme(
    theme_dir: &Path,
    assets_dir: &Path,
    overrides: &BTreeMap<String, String>,
    compiler: &dyn StylesheetCompiler,
) -> (Vec<PathBuf>, Vec<StylesheetError>) {
    let mut written = Vec::new();
    let mut errors = Vec::new();

    let jobs = match plan_stylesheets(theme_dir) {
        Ok(jobs) => jobs,
        Err(e) => return (written, vec![e]),
    };
    if jobs.is_empty() {
        return (written, errors);
    }
    let prelude = match variables_prelude(theme_dir, overrides) {
        Ok(prelude) => prelude,
        Err(e) => return (written, vec![e]),
    };

    tracing::info!(count = jobs.len(), "compiling stylesheets");
    for job in jobs {
        let out = assets_dir.join(&job.output);
        let result = compiler
            .compile(&job.source, &prelude)
            .and_then(|css| write_if_changed(&out, &css));
        match result {
            Ok(()) => written.push(out),
            Err(e) => errors.push(e),
        }
    }
    (written, errors)
}

fn write_if_changed(path: &Path, content: &str) -> Result<(), StylesheetError> {
    let io_err = |source| StylesheetError::Io {
        path: path.to_path_buf(),
        source,
    };
    if fs::read_to_string(path).is_ok_and(|old| old == content) {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)
}

// ============================================================================
// PreludeCompiler
// ============================================================================

/// Minimal SCSS subset: `@import` of sibling partials, `$variables` and
/// `//` comments. Everything else passes through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreludeCompiler;

/// Partials nest at most this deep.
const MAX_IMPORT_DEPTH: usize = 16;

impl StylesheetCompiler for PreludeCompiler {
    fn compile(&self, main: &Path, prelude: &str) -> Result<String, StylesheetError> {
        let mut vars = BTreeMap::new();
        let mut out = String::new();
        self.expand(main, prelude, &mut vars, &mut out, 0)?;
        Ok(out)
    }
}

impl PreludeCompiler {
    fn expand(
        &self,
        path: &Path,
        prelude: &str,
        vars: &mut BTreeMap<String, String>,
        out: &mut String,
        depth: usize,
    ) -> Result<(), StylesheetError> {
        let text = fs::read_to_string(path).map_err(|source| StylesheetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dir = path.parent().unwrap_or(Path::new("."));

        for (idx, raw) in text.lines().enumerate() {
            let syntax = |message: String| StylesheetError::Syntax {
                path: path.to_path_buf(),
                line: idx + 1,
                message,
            };
            let line = strip_line_comment(raw);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(target) = trimmed.strip_prefix("@import") {
                let name = target.trim().trim_end_matches(';').trim().trim_matches(['"', '\'']);
                if name == "variables" {
                    declare_all(prelude, vars);
                    continue;
                }
                if name.ends_with(".css") || name.starts_with("http") || name.starts_with("url(") {
                    out.push_str(trimmed);
                    out.push('\n');
                    continue;
                }
                if depth >= MAX_IMPORT_DEPTH {
                    return Err(syntax(format!("imports nested deeper than {MAX_IMPORT_DEPTH}")));
                }
                let partial = resolve_partial(dir, name)
                    .ok_or_else(|| syntax(format!("cannot find import \"{name}\"")))?;
                self.expand(&partial, prelude, vars, out, depth + 1)?;
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('$') {
                let Some((name, value)) = rest.split_once(':') else {
                    return Err(syntax("expected `:` in variable declaration".into()));
                };
                let name = name.trim().to_string();
                let value = value.trim().trim_end_matches(';').trim();
                match value.strip_suffix("!default") {
                    // `!default` only applies when nothing set it first
                    Some(value) => {
                        let value = substitute(value.trim(), vars);
                        vars.entry(name).or_insert(value);
                    }
                    None => {
                        let value = substitute(value, vars);
                        vars.insert(name, value);
                    }
                }
                continue;
            }

            out.push_str(&substitute(line.trim_end(), vars));
            out.push('\n');
        }
        Ok(())
    }
}

fn declare_all(prelude: &str, vars: &mut BTreeMap<String, String>) {
    for (name, value) in parse_theme_variables(prelude) {
        let value = substitute(&value, vars);
        vars.insert(name, value);
    }
}

/// `foo` → `_foo.scss`, `foo.scss`, in that order.
fn resolve_partial(dir: &Path, name: &str) -> Option<PathBuf> {
    let rel = Path::new(name);
    let file = rel.file_name()?.to_str()?;
    let parent = rel.parent().unwrap_or(Path::new(""));
    let stem = file.strip_suffix(".scss").unwrap_or(file);
    [format!("_{stem}.scss"), format!("{stem}.scss")]
        .into_iter()
        .map(|candidate| dir.join(parent).join(candidate))
        .find(|p| p.is_file())
}

/// Drop a `//` comment, leaving `url(http://...)` alone.
fn strip_line_comment(line: &str) -> &str {
    let mut search = 0;
    while let Some(pos) = line[search..].find("//") {
        let at = search + pos;
        if at > 0 && line.as_bytes()[at - 1] == b':' {
            search = at + 2;
            continue;
        }
        return &line[..at];
    }
    line
}

/// Replace `$name` references, longest names first.
fn substitute(text: &str, vars: &BTreeMap<String, String>) -> String {
    if !text.contains('$') {
        return text.to_string();
    }
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));
    let mut result = text.to_string();
    for name in names {
        result = result.replace(&format!("${name}"), &vars[name]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn parses_variable_lines() {
        let vars = parse_theme_variables(
            "// colors\n$primary: #333;\n$font : Georgia, serif ;\n$broken: 1px\n  $indented: 2;\n",
        );
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["primary"], "#333");
        assert_eq!(vars["font"], "Georgia, serif");
    }

    #[test]
    fn no_sass_dir_means_nothing_to_compile() {
        let tmp = TempDir::new().unwrap();
        assert!(plan_stylesheets(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn plan_skips_partials_and_shipped_css() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "sass/style.scss", "");
        write(tmp.path(), "sass/print.scss", "");
        write(tmp.path(), "sass/_variables.scss", "");
        write(tmp.path(), "sass/notes.txt", "");
        write(tmp.path(), "assets/css/print.css", "");

        let jobs = plan_stylesheets(tmp.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output, PathBuf::from("css/style.css"));
    }

    #[test]
    fn prelude_applies_known_overrides_only() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "sass/_variables.scss", "$primary: #333;\n$bg: white;\n");
        let overrides = BTreeMap::from([
            ("primary".to_string(), "#c00".to_string()),
            ("unknown".to_string(), "1".to_string()),
        ]);
        let prelude = variables_prelude(tmp.path(), &overrides).unwrap();
        assert_eq!(prelude, "$bg: white;\n$primary: #c00;\n");
    }

    #[test]
    fn prelude_compiler_resolves_imports_and_variables() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "sass/_variables.scss", "$primary: #333;\n");
        write(tmp.path(), "sass/_base.scss", "body { color: $primary; }\n");
        write(
            tmp.path(),
            "sass/style.scss",
            concat!(
                "@import \"variables\";\n@import \"base\";\n// note\n$gap: 4px;\n",
                "a { margin: $gap; background: url(http://x/y.png); }\n",
            ),
        );

        let css = PreludeCompiler
            .compile(&tmp.path().join("sass/style.scss"), "$primary: #c00;\n")
            .unwrap();
        assert_eq!(
            css,
            "body { color: #c00; }\na { margin: 4px; background: url(http://x/y.png); }\n"
        );
    }

    #[test]
    fn missing_import_is_a_syntax_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "style.scss", "\n@import \"nope\";\n");
        let err = PreludeCompiler
            .compile(&tmp.path().join("style.scss"), "")
            .unwrap_err();
        assert!(matches!(err, StylesheetError::Syntax { line: 2, .. }));
    }

    #[test]
    fn compile_theme_writes_into_assets() {
        let tmp = TempDir::new().unwrap();
        let theme = tmp.path().join("theme");
        write(&theme, "sass/_variables.scss", "$primary: #333;\n");
        write(&theme, "sass/style.scss", "@import 'variables';\nh1 { color: $primary; }\n");
        let assets = tmp.path().join("out/assets");

        let overrides = BTreeMap::from([("primary".to_string(), "red".to_string())]);
        let (written, errors) = compile_theme(&theme, &assets, &overrides, &PreludeCompiler);

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(written, [assets.join("css/style.css")]);
        assert_eq!(
            fs::read_to_string(assets.join("css/style.css")).unwrap(),
            "h1 { color: red; }\n"
        );
    }
}
