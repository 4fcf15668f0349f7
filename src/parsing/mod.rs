//! Test case extraction from Python sources.
//!
//! Turns the bytes of one test file into the [`TestCase`] records it
//! currently defines:
//!
//! ```text
//! bytes ──decode──▶ text ──tree-sitter──▶ tree ──walk──▶ class ──▶ test_* methods
//!   │  (UTF-8, BOM stripped,             (any syntax error        │
//!   │   else fallback encoding)           = no cases)             ▼
//!   └─────────────────────────────────────────────────────── Vec<TestCase>
//! ```
//!
//! Every class at any depth is inspected. Only its direct body members count
//! as candidate methods: plain `def` statements, decorated or not. `async def`
//! methods are skipped.
//!
//! # Example
//!
//! ```
//! use case_indexer::parsing::{CaseParser, MatchRules};
//!
//! let parser = CaseParser::new(MatchRules::default(), "gbk").unwrap();
//! let src = "class T:\n    def test_a(self):\n        pass\n";
//! let cases = parser.parse_source("suite/proj/test_t.py", src).unwrap();
//! assert_eq!(cases[0].case_name, "test_a");
//! assert_eq!(cases[0].project_name, "suite");
//! ```

pub mod docstring;

use std::path::{Component, Path};

use encoding_rs::Encoding;
use tree_sitter::{Node, Parser};

use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::schema::TestCase;

// ============================================================================
// Matching rules
// ============================================================================

/// Naming conventions that decide which files and methods are test cases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRules {
    /// File name prefix, e.g. `test_`
    pub file_prefix: String,
    /// Extension without the dot, e.g. `py`
    pub extension: String,
    /// Method name prefix, e.g. `test_`
    pub method_prefix: String,
    /// Directory level above the file that names the project
    pub project_level: usize,
    /// Directory names never descended into
    pub ignore_dirs: Vec<String>,
}

impl Default for MatchRules {
    fn default() -> Self {
        IndexerConfig::default().match_rules()
    }
}

impl MatchRules {
    /// Whether a bare file name follows the test file convention
    pub fn is_case_file_name(&self, name: &str) -> bool {
        name.starts_with(&self.file_prefix)
            && Path::new(name)
                .extension()
                .is_some_and(|ext| ext.to_string_lossy() == self.extension)
    }

    /// Whether `path` names a test file outside every ignored directory
    pub fn is_case_file(&self, path: &Path) -> bool {
        let named = path
            .file_name()
            .is_some_and(|n| self.is_case_file_name(&n.to_string_lossy()));
        named && !self.is_ignored(path)
    }

    /// Whether any component of `path` is an ignored directory name
    pub fn is_ignored(&self, path: &Path) -> bool {
        path.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.ignore_dirs.iter().any(|d| *d == name)
            }
            _ => false,
        })
    }

    pub fn is_case_method(&self, name: &str) -> bool {
        name.starts_with(&self.method_prefix)
    }

    /// Name of the directory `project_level` levels above the file.
    ///
    /// Empty when the path is too shallow.
    pub fn project_name(&self, file_path: &str) -> String {
        Path::new(file_path)
            .ancestors()
            .nth(self.project_level)
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Extracts test cases from Python test files
#[derive(Debug, Clone)]
pub struct CaseParser {
    rules: MatchRules,
    fallback: &'static Encoding,
}

impl CaseParser {
    /// Build a parser; `fallback_label` is any WHATWG encoding label
    pub fn new(rules: MatchRules, fallback_label: &str) -> Result<Self> {
        let fallback = Encoding::for_label(fallback_label.as_bytes()).ok_or_else(|| {
            IndexerError::ConfigError {
                message: format!("Unknown fallback encoding: {}", fallback_label),
            }
        })?;
        Ok(Self { rules, fallback })
    }

    pub fn from_config(config: &IndexerConfig) -> Result<Self> {
        Self::new(config.match_rules(), &config.parser.fallback_encoding)
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    /// Decode file bytes: UTF-8 (BOM stripped) first, then the fallback
    /// encoding. Line endings are normalized to `\n`.
    pub fn decode(&self, file_path: &str, bytes: &[u8]) -> Result<String> {
        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
            Err(_) => {
                let (decoded, had_errors) = self.fallback.decode_without_bom_handling(bytes);
                if had_errors {
                    return Err(IndexerError::Decode {
                        path: file_path.to_string(),
                        encoding: format!("utf-8, {}", self.fallback.name()),
                    });
                }
                tracing::debug!(
                    "[PARSER] {} decoded as {}",
                    file_path,
                    self.fallback.name()
                );
                decoded.into_owned()
            }
        };

        if text.contains('\r') {
            Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
        } else {
            Ok(text)
        }
    }

    /// Parse decoded source and return its test cases.
    ///
    /// Any syntax error fails the whole file.
    pub fn parse_source(&self, file_path: &str, source: &str) -> Result<Vec<TestCase>> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| IndexerError::ParseFailure {
                message: format!("Failed to set Python grammar: {:?}", e),
            })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| IndexerError::ParseFailure {
                message: format!("Failed to parse file: {}", file_path),
            })?;
        let root = tree.root_node();

        if root.has_error() {
            let line = first_error_line(&root).unwrap_or(1);
            return Err(IndexerError::ParseFailure {
                message: format!("Syntax error in {} near line {}", file_path, line),
            });
        }

        let mut classes = Vec::new();
        visit_all(&root, |node| {
            if node.kind() == "class_definition" {
                classes.push(node);
            }
        });

        let project_name = self.rules.project_name(file_path);
        let mut cases = Vec::new();
        for class in classes {
            self.collect_class_cases(&class, source, file_path, &project_name, &mut cases);
        }
        Ok(cases)
    }

    /// Decode and parse; failures are logged and yield no cases
    pub fn extract(&self, file_path: &str, bytes: &[u8]) -> Vec<TestCase> {
        let parsed = self
            .decode(file_path, bytes)
            .and_then(|source| self.parse_source(file_path, &source));
        match parsed {
            Ok(cases) => {
                tracing::debug!("[PARSER] {}: {} cases", file_path, cases.len());
                cases
            }
            Err(e) => {
                tracing::error!("[PARSER] Failed to parse {}: {}", file_path, e);
                Vec::new()
            }
        }
    }

    /// Read, decode and parse a file, surfacing every failure
    pub fn parse_file(&self, path: &Path) -> Result<Vec<TestCase>> {
        let bytes = std::fs::read(path)?;
        let file_path = crate::fs_utils::to_forward_slashes(path);
        let source = self.decode(&file_path, &bytes)?;
        self.parse_source(&file_path, &source)
    }

    fn collect_class_cases(
        &self,
        class: &Node,
        source: &str,
        file_path: &str,
        project_name: &str,
        out: &mut Vec<TestCase>,
    ) {
        let Some(body) = class.child_by_field_name("body") else {
            return;
        };
        let project_description = docstring::of_block(&body, source);

        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            let def = match member.kind() {
                "function_definition" => member,
                "decorated_definition" => match member.child_by_field_name("definition") {
                    Some(d) if d.kind() == "function_definition" => d,
                    _ => continue,
                },
                _ => continue,
            };
            if is_async(&def) {
                continue;
            }
            let Some(name) = def.child_by_field_name("name") else {
                continue;
            };
            let case_name = node_text(&name, source);
            if !self.rules.is_case_method(case_name) {
                continue;
            }

            let case_description = def
                .child_by_field_name("body")
                .and_then(|b| docstring::of_block(&b, source));

            out.push(TestCase {
                project_name: project_name.to_string(),
                project_description: project_description.clone(),
                case_name: case_name.to_string(),
                case_description,
                file_path: file_path.to_string(),
                case_code: node_text(&def, source).to_string(),
            });
        }
    }
}

// ============================================================================
// Tree helpers
// ============================================================================

/// Source text of a node
pub(crate) fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn is_async(def: &Node) -> bool {
    def.child(0).is_some_and(|c| c.kind() == "async")
}

/// 1-based line of the first error or missing node
fn first_error_line(root: &Node) -> Option<usize> {
    let mut line = None;
    visit_all(root, |node| {
        if line.is_none() && (node.is_error() || node.is_missing()) {
            line = Some(node.start_position().row + 1);
        }
    });
    line
}

/// Visit every node in document order (iterative to avoid stack overflow)
fn visit_all<'tree, F>(node: &Node<'tree>, mut visitor: F)
where
    F: FnMut(Node<'tree>),
{
    let mut cursor = node.walk();
    let mut did_visit_children = false;

    loop {
        if !did_visit_children {
            visitor(cursor.node());
            if cursor.goto_first_child() {
                continue;
            }
        }
        if cursor.goto_next_sibling() {
            did_visit_children = false;
            continue;
        }
        if !cursor.goto_parent() {
            break;
        }
        did_visit_children = true;
    }
}
