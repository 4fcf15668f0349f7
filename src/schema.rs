//! Test case records shared by the parser, the relational store and the index
//!
//! A [`TestCase`] is always derived from the current content of its source
//! file; it is never patched in place. The search index holds a
//! [`CaseDocument`] per case, keyed by [`document_id`].

use serde::{Deserialize, Serialize};
use md5::{Digest, Md5};

/// One test method inside a test class of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Directory name `project_level` levels above the file
    pub project_name: String,
    /// Docstring of the enclosing class
    pub project_description: Option<String>,
    /// Method name (matches the test naming convention)
    pub case_name: String,
    /// Docstring of the method
    pub case_description: Option<String>,
    /// Path of the source file, `/`-separated
    pub file_path: String,
    /// Exact source text of the method definition
    pub case_code: String,
}

impl TestCase {
    /// Stable index id for this case
    pub fn document_id(&self) -> String {
        document_id(&self.file_path, &self.case_name)
    }

    /// Build the search index document for this case
    pub fn to_document(&self) -> CaseDocument {
        CaseDocument {
            id: self.document_id(),
            project_name: self.project_name.clone(),
            project_description: self.project_description.clone(),
            case_name: self.case_name.clone(),
            case_description: self.case_description.clone(),
            file_path: self.file_path.clone(),
            case_code: self.case_code.clone(),
        }
    }
}

/// Search index document shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDocument {
    pub id: String,
    pub project_name: String,
    pub project_description: Option<String>,
    pub case_name: String,
    pub case_description: Option<String>,
    pub file_path: String,
    pub case_code: String,
}

/// Hash of `file_path + "_" + case_name`, lowercase hex MD5.
///
/// Re-indexing an unchanged file yields the same ids; renaming the method or
/// moving the file yields new ones.
pub fn document_id(file_path: &str, case_name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(file_path.as_bytes());
    hasher.update(b"_");
    hasher.update(case_name.as_bytes());
    hex::encode(hasher.finalize())
}
