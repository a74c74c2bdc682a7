//! Syntactic import extraction.
//!
//! A tree-sitter visitor walks each source file and classifies imported
//! top-level module names as runtime, typing-only, or dynamic, plus DSN
//! driver hints found in string literals. Classification state (enclosing
//! `TYPE_CHECKING` conditional, enclosing import-fallback handler) is
//! passed down the recursion as a copied context value.

use crate::error::{InferError, Result};
use crate::notebook;
use crate::options::Options;
use crate::parse_cache::{FileFingerprint, ParseCache};
use crate::tables::dsn_default_driver;
use crate::types::{is_valid_module_name, top_level};
use crate::warning::{Warning, WarningKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tree_sitter::{Node, Parser};

static DSN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(postgresql|postgres|mysql|sqlite|mongodb|redis|oracle|mssql)(\+([a-z_]+))?://")
        .expect("dsn regex")
});

/// Classified import names extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Unconditional imports.
    pub runtime: BTreeSet<String>,
    /// Imports inside `TYPE_CHECKING` conditionals; never become deps.
    pub typing: BTreeSet<String>,
    /// String-literal arguments to reflective import calls.
    pub dynamic: BTreeSet<String>,
    /// Driver modules implied by database connection strings.
    pub dsn: BTreeSet<String>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.runtime.is_empty()
            && self.typing.is_empty()
            && self.dynamic.is_empty()
            && self.dsn.is_empty()
    }

    /// Names that participate in resolution: runtime and dynamic imports
    /// plus DSN hints. Typing-only names are excluded.
    pub fn candidates(&self) -> BTreeSet<String> {
        let mut out = self.runtime.clone();
        out.extend(self.dynamic.iter().cloned());
        out.extend(self.dsn.iter().cloned());
        out
    }
}

/// Result of syntactic extraction on one source text.
pub struct Extraction {
    pub result: ParseResult,
    pub syntax_error: bool,
}

/// Aggregate output of [`parse_many`].
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub results: HashMap<PathBuf, ParseResult>,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Copy, Default)]
struct Ctx {
    /// Lexically inside an `if TYPE_CHECKING:` consequence.
    typing_only: bool,
    /// Inside an excluded fallback handler; imports are not recorded.
    skip_imports: bool,
}

fn node_text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Run the visitor over one decoded source text.
pub fn extract_imports(source: &str, options: &Options) -> Result<Extraction> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| InferError::Other(format!("failed to load python grammar: {e}")))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| InferError::Other("parser returned no tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        return Ok(Extraction {
            result: ParseResult::default(),
            syntax_error: true,
        });
    }

    let mut result = ParseResult::default();
    visit(root, source.as_bytes(), Ctx::default(), options, &mut result);
    Ok(Extraction {
        result,
        syntax_error: false,
    })
}

fn visit(node: Node, src: &[u8], ctx: Ctx, options: &Options, out: &mut ParseResult) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => record_import(node_text(child, src), ctx, out),
                    "aliased_import" => {
                        if let Some(name) = child.child_by_field_name("name") {
                            record_import(node_text(name, src), ctx, out);
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                // Leading-dot relative imports never name a distribution.
                if module.kind() == "dotted_name" {
                    record_import(node_text(module, src), ctx, out);
                }
            }
        }
        "if_statement" => {
            let condition = node.child_by_field_name("condition");
            if condition.is_some_and(|cond| is_type_checking_expr(cond, src)) {
                if let Some(consequence) = node.child_by_field_name("consequence") {
                    let typing_ctx = Ctx {
                        typing_only: true,
                        ..ctx
                    };
                    visit(consequence, src, typing_ctx, options, out);
                }
                // elif/else alternatives run outside the guarded block.
                let mut cursor = node.walk();
                for alternative in node.children_by_field_name("alternative", &mut cursor) {
                    visit(alternative, src, ctx, options, out);
                }
            } else {
                visit_children(node, src, ctx, options, out);
            }
        }
        "try_statement" => {
            visit_try(node, src, ctx, options, out);
        }
        "call" => {
            if !ctx.skip_imports {
                if let Some(literal) = dynamic_import_literal(node, src) {
                    record_dynamic(&literal, ctx, out);
                }
            }
            visit_children(node, src, ctx, options, out);
        }
        "string" => {
            let value = string_value(node, src);
            record_dsn_hint(&value, out);
        }
        _ => visit_children(node, src, ctx, options, out),
    }
}

fn visit_children(node: Node, src: &[u8], ctx: Ctx, options: &Options, out: &mut ParseResult) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit(child, src, ctx, options, out);
    }
}

/// Both arms of an import fallback count by default: the `except` arm is
/// a dependency the project still ships. `exclude_fallback_imports`
/// drops the handler arm instead.
fn visit_try(node: Node, src: &[u8], ctx: Ctx, options: &Options, out: &mut ParseResult) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let suppress = options.exclude_fallback_imports
            && child.kind() == "except_clause"
            && catches_import_error(child, src);
        let child_ctx = Ctx {
            skip_imports: ctx.skip_imports || suppress,
            ..ctx
        };
        visit(child, src, child_ctx, options, out);
    }
}

/// `TYPE_CHECKING` or any attribute access ending in `.TYPE_CHECKING`.
fn is_type_checking_expr(node: Node, src: &[u8]) -> bool {
    match node.kind() {
        "identifier" => node_text(node, src) == "TYPE_CHECKING",
        "attribute" => node
            .child_by_field_name("attribute")
            .is_some_and(|attr| node_text(attr, src) == "TYPE_CHECKING"),
        "parenthesized_expression" => node
            .named_child(0)
            .is_some_and(|inner| is_type_checking_expr(inner, src)),
        _ => false,
    }
}

/// Does this handler catch a module-not-found error?
fn catches_import_error(except_clause: Node, src: &[u8]) -> bool {
    let mut cursor = except_clause.walk();
    for child in except_clause.named_children(&mut cursor) {
        if child.kind() == "block" {
            continue;
        }
        if subtree_mentions(child, src, &["ImportError", "ModuleNotFoundError"]) {
            return true;
        }
    }
    false
}

fn subtree_mentions(node: Node, src: &[u8], names: &[&str]) -> bool {
    if node.kind() == "identifier" && names.contains(&node_text(node, src)) {
        return true;
    }
    let mut cursor = node.walk();
    let result = node
        .named_children(&mut cursor)
        .any(|child| subtree_mentions(child, src, names));
    result
}

/// `import_module("m")`, `importlib.import_module("m")`, `__import__("m")`
/// with a string-literal first positional argument.
fn dynamic_import_literal(call: Node, src: &[u8]) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    let is_import_call = match function.kind() {
        "identifier" => {
            let name = node_text(function, src);
            name == "import_module" || name == "__import__"
        }
        "attribute" => function
            .child_by_field_name("attribute")
            .is_some_and(|attr| node_text(attr, src) == "import_module"),
        _ => false,
    };
    if !is_import_call {
        return None;
    }

    let arguments = call.child_by_field_name("arguments")?;
    let mut arguments_cursor = arguments.walk();
    let first = arguments.named_children(&mut arguments_cursor).next()?;
    if first.kind() != "string" {
        return None;
    }
    Some(string_value(first, src))
}

/// Literal text of a string node, prefixes and quotes stripped.
fn string_value(node: Node, src: &[u8]) -> String {
    let mut out = String::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "string_content" {
            out.push_str(node_text(child, src));
        }
    }
    out
}

fn record_import(module: &str, ctx: Ctx, out: &mut ParseResult) {
    if ctx.skip_imports || module.is_empty() {
        return;
    }
    let name = top_level(module).to_string();
    if ctx.typing_only {
        out.typing.insert(name);
    } else {
        out.runtime.insert(name);
    }
}

/// A dynamic import with a garbage literal is kept verbatim so the
/// resolver's validators can reject it and report why.
fn record_dynamic(literal: &str, ctx: Ctx, out: &mut ParseResult) {
    if literal.is_empty() {
        return;
    }
    let name = if is_valid_module_name(literal) {
        top_level(literal).to_string()
    } else {
        literal.to_string()
    };
    if ctx.typing_only {
        out.typing.insert(name);
    } else {
        out.dynamic.insert(name);
    }
}

fn record_dsn_hint(value: &str, out: &mut ParseResult) {
    let Some(caps) = DSN_RE.captures(value) else {
        return;
    };
    let driver = match caps.get(3) {
        Some(explicit) => Some(explicit.as_str()),
        None => dsn_default_driver(&caps[1]),
    };
    if let Some(driver) = driver {
        out.dsn.insert(driver.to_string());
    }
}

/// Substring pre-filter: a file with no `import` anywhere cannot
/// contribute imports, so the syntax parser never runs on it.
fn mentions_import(bytes: &[u8]) -> bool {
    bytes.windows(6).any(|window| window == b"import")
}

/// UTF-8 with a Latin-1 retry, matching how the target-language
/// ecosystem tolerates legacy encodings.
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err
            .as_bytes()
            .iter()
            .map(|&b| char::from(b))
            .collect(),
    }
}

/// Parse one file, consulting the parse cache first.
fn parse_file(
    path: &Path,
    cache: &ParseCache,
    options: &Options,
    warnings: &mut Vec<Warning>,
) -> ParseResult {
    let fingerprint = match FileFingerprint::of(path) {
        Ok(fp) => fp,
        Err(err) => {
            warnings.push(Warning::new(
                WarningKind::Permission,
                path.display().to_string(),
                format!("cannot stat: {err}"),
            ));
            return ParseResult::default();
        }
    };

    if let Some(hit) = cache.get(&fingerprint) {
        return hit;
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warnings.push(Warning::new(
                WarningKind::Permission,
                path.display().to_string(),
                format!("cannot read: {err}"),
            ));
            return ParseResult::default();
        }
    };

    if !mentions_import(&bytes) {
        let empty = ParseResult::default();
        cache.put(fingerprint, &empty);
        return empty;
    }

    let text = decode(bytes);
    let source = if path.extension().and_then(|e| e.to_str()) == Some("ipynb") {
        match notebook::extract_code_cells(&text) {
            Some(code) => code,
            None => {
                warnings.push(Warning::new(
                    WarningKind::MalformedInput,
                    path.display().to_string(),
                    "not a valid notebook document".to_string(),
                ));
                let empty = ParseResult::default();
                cache.put(fingerprint, &empty);
                return empty;
            }
        }
    } else {
        text
    };

    let result = match extract_imports(&source, options) {
        Ok(extraction) => {
            if extraction.syntax_error {
                warnings.push(Warning::new(
                    WarningKind::MalformedInput,
                    path.display().to_string(),
                    "syntax error, file skipped".to_string(),
                ));
            }
            extraction.result
        }
        Err(err) => {
            warnings.push(Warning::new(
                WarningKind::MalformedInput,
                path.display().to_string(),
                err.to_string(),
            ));
            ParseResult::default()
        }
    };

    cache.put(fingerprint, &result);
    result
}

/// Parse a batch of files on the CPU-bound pool, sized `min(cpu, 32)`.
pub async fn parse_many(paths: &[PathBuf], options: &Options) -> Result<ParseOutput> {
    let cache = Arc::new(ParseCache::load(
        options.effective_cache_dir().join("parse.json"),
    ));
    let mut output = parse_many_with_cache(paths, cache.clone(), options).await?;
    if let Some(warning) = cache.load_warning() {
        output.warnings.push(warning);
    }
    if !options.cancelled() {
        if let Err(err) = cache.save() {
            log::warn!("Failed to persist parse cache: {err}");
        }
    }
    Ok(output)
}

pub(crate) async fn parse_many_with_cache(
    paths: &[PathBuf],
    cache: Arc<ParseCache>,
    options: &Options,
) -> Result<ParseOutput> {
    let semaphore = Arc::new(Semaphore::new(options.effective_parse_workers()));
    let mut tasks: JoinSet<(PathBuf, ParseResult, Vec<Warning>)> = JoinSet::new();

    for path in paths {
        if options.cancelled() {
            break;
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InferError::Other("parse semaphore closed".to_string()))?;
        let path = path.clone();
        let cache = cache.clone();
        let options = options.clone();
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let mut warnings = Vec::new();
            let result = parse_file(&path, &cache, &options, &mut warnings);
            (path, result, warnings)
        });
    }

    let mut output = ParseOutput::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((path, result, warnings)) => {
                output.results.insert(path, result);
                output.warnings.extend(warnings);
            }
            Err(err) => {
                log::error!("Parse task panicked: {err}");
            }
        }
    }

    if options.cancelled() {
        return Err(InferError::Cancelled);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        extract_imports(source, &Options::default())
            .expect("parser")
            .result
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn direct_and_from_imports() {
        let result = parse("import requests\nimport os.path\nfrom flask.views import View\n");
        assert_eq!(result.runtime, set(&["requests", "os", "flask"]));
        assert!(result.typing.is_empty());
    }

    #[test]
    fn aliased_and_multiple_imports() {
        let result = parse("import numpy as np, pandas as pd\n");
        assert_eq!(result.runtime, set(&["numpy", "pandas"]));
    }

    #[test]
    fn relative_imports_are_ignored() {
        let result = parse("from .local import x\nfrom ..pkg import y\nfrom . import z\n");
        assert!(result.is_empty());
    }

    #[test]
    fn type_checking_imports_are_classified_typing() {
        let source = "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import numpy\n";
        let result = parse(source);
        assert_eq!(result.typing, set(&["numpy"]));
        assert_eq!(result.runtime, set(&["typing"]));
    }

    #[test]
    fn attribute_type_checking_guard() {
        let source = "import typing\nif typing.TYPE_CHECKING:\n    import pandas\n";
        let result = parse(source);
        assert_eq!(result.typing, set(&["pandas"]));
    }

    #[test]
    fn else_arm_of_type_checking_is_runtime() {
        let source = "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import numpy\nelse:\n    import requests\n";
        let result = parse(source);
        assert_eq!(result.typing, set(&["numpy"]));
        assert!(result.runtime.contains("requests"));
    }

    #[test]
    fn import_fallback_counts_both_arms() {
        let source = "try:\n    import ujson\nexcept ImportError:\n    import json\n";
        let result = parse(source);
        assert_eq!(result.runtime, set(&["ujson", "json"]));
    }

    #[test]
    fn import_fallback_handler_can_be_excluded() {
        let source = "try:\n    import ujson\nexcept ImportError:\n    import json\n";
        let options = Options {
            exclude_fallback_imports: true,
            ..Options::default()
        };
        let result = extract_imports(source, &options).expect("parser").result;
        assert_eq!(result.runtime, set(&["ujson"]));
    }

    #[test]
    fn unrelated_handlers_are_not_excluded() {
        let source = "try:\n    import ujson\nexcept ValueError:\n    import json\n";
        let options = Options {
            exclude_fallback_imports: true,
            ..Options::default()
        };
        let result = extract_imports(source, &options).expect("parser").result;
        assert_eq!(result.runtime, set(&["ujson", "json"]));
    }

    #[test]
    fn dynamic_imports_from_string_literals() {
        let source = concat!(
            "import importlib\n",
            "importlib.import_module(\"redis\")\n",
            "import_module(\"celery.backends\")\n",
            "__import__(\"kombu\")\n",
        );
        let result = parse(source);
        assert_eq!(result.dynamic, set(&["redis", "celery", "kombu"]));
    }

    #[test]
    fn dynamic_import_with_variable_is_ignored() {
        let result = parse("import importlib\nimportlib.import_module(name)\n");
        assert!(result.dynamic.is_empty());
    }

    #[test]
    fn garbage_dynamic_literal_is_kept_for_validation() {
        let result = parse("import importlib\nimport_module(\"../../etc/passwd\")\n");
        assert_eq!(result.dynamic, set(&["../../etc/passwd"]));
    }

    #[test]
    fn dsn_literals_yield_driver_hints() {
        let source = concat!(
            "import os\n",
            "URL = \"postgresql+asyncpg://u:p@h/db\"\n",
            "OTHER = \"mysql://u:p@h/db\"\n",
            "LOCAL = \"sqlite:///db.sqlite3\"\n",
        );
        let result = parse(source);
        assert_eq!(result.dsn, set(&["asyncpg", "pymysql"]));
    }

    #[test]
    fn syntax_error_yields_empty_result() {
        let extraction =
            extract_imports("import requests\ndef broken(:\n", &Options::default()).unwrap();
        assert!(extraction.syntax_error);
        assert!(extraction.result.is_empty());
    }

    #[test]
    fn prefilter_detects_import_substring() {
        assert!(mentions_import(b"import os"));
        assert!(mentions_import(b"from importlib import x"));
        assert!(!mentions_import(b"print('hello world')"));
    }

    #[test]
    fn latin1_fallback_decodes_every_byte_sequence() {
        let bytes = vec![b'#', 0xE9, b'\n', b'i', b'm', b'p', b'o', b'r', b't', b' ', b'x'];
        let text = decode(bytes);
        assert!(text.contains("import x"));
        assert!(text.contains('\u{e9}'));
    }

    #[test]
    fn candidates_exclude_typing() {
        let source = concat!(
            "from typing import TYPE_CHECKING\n",
            "import requests\n",
            "if TYPE_CHECKING:\n",
            "    import numpy\n",
        );
        let result = parse(source);
        let candidates = result.candidates();
        assert!(candidates.contains("requests"));
        assert!(!candidates.contains("numpy"));
    }
}
