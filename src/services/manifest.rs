//! Build manifests for the uploader tool.
//!
//! The uploader consumes a brace-delimited, tab-indented tree of double-quoted
//! keys and values:
//!
//! ```text
//! "AppBuild"
//! {
//!     "AppID"    "480"
//!     "Depots"
//!     {
//!         "481"
//!         {
//!             "FileMapping"
//!             {
//!                 "LocalPath"    "*"
//!                 ...
//! ```
//!
//! Documents are built as an ordered [`VdfNode`] tree so output is byte-stable for
//! a given input, then rendered with [`render_document`]. [`parse_manifest`] reads
//! the same format back.

use crate::models::{BuildSpec, DepotSpec};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use thiserror::Error;

/// File extension of generated manifests.
pub const MANIFEST_EXTENSION: &str = "vdf";

/// Errors from generating or reading a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Invalid build description: {0}")]
    Validation(String),

    #[error("Failed to write manifest {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] ManifestParseError),
}

/// Errors from [`parse_manifest`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected '{found}' at byte {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },

    #[error("trailing content at byte {offset}")]
    TrailingContent { offset: usize },
}

/// A node in a manifest tree: either a string value or a nested block.
///
/// Blocks keep insertion order. A repeated key inside one block keeps its first
/// position and its last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfNode {
    Value(String),
    Block(IndexMap<String, VdfNode>),
}

impl VdfNode {
    pub fn block() -> Self {
        VdfNode::Block(IndexMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfNode::Value(v) => Some(v),
            VdfNode::Block(_) => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&VdfNode> {
        match self {
            VdfNode::Block(children) => children.get(key),
            VdfNode::Value(_) => None,
        }
    }

    /// Follow `path` through nested blocks.
    pub fn lookup(&self, path: &[&str]) -> Option<&VdfNode> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    fn insert(&mut self, key: impl Into<String>, node: VdfNode) {
        if let VdfNode::Block(children) = self {
            children.insert(key.into(), node);
        }
    }

    fn insert_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, VdfNode::Value(value.into()));
    }
}

/// A whole manifest: a named root block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdfDocument {
    pub name: String,
    pub root: VdfNode,
}

impl VdfDocument {
    pub fn lookup(&self, path: &[&str]) -> Option<&VdfNode> {
        self.root.lookup(path)
    }

    /// String value at `path`, if present.
    pub fn value(&self, path: &[&str]) -> Option<&str> {
        self.lookup(path).and_then(VdfNode::as_str)
    }
}

/// Escape a key or value for a quoted token.
///
/// Backslashes are doubled before quotes are escaped, so the backslash added in
/// front of a quote is never doubled again.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a document in the tab-indented layout the uploader expects.
pub fn render_document(document: &VdfDocument) -> String {
    let mut out = String::new();
    match &document.root {
        VdfNode::Block(children) => write_block(&mut out, &document.name, children, 0),
        VdfNode::Value(value) => out.push_str(&format!(
            "\"{}\"\t\"{}\"\n",
            escape_value(&document.name),
            escape_value(value)
        )),
    }
    out
}

fn write_block(out: &mut String, key: &str, children: &IndexMap<String, VdfNode>, depth: usize) {
    let indent = "\t".repeat(depth);
    out.push_str(&format!("{indent}\"{}\"\n", escape_value(key)));
    out.push_str(&format!("{indent}{{\n"));

    for (child_key, child) in children {
        match child {
            VdfNode::Value(value) => out.push_str(&format!(
                "{indent}\t\"{}\"\t\"{}\"\n",
                escape_value(child_key),
                escape_value(value)
            )),
            VdfNode::Block(grandchildren) => write_block(out, child_key, grandchildren, depth + 1),
        }
    }

    out.push_str(&format!("{indent}}}\n"));
}

/// Build the app build tree for `spec` (no validation, no I/O).
fn app_build_document(spec: &BuildSpec) -> VdfDocument {
    let mut root = VdfNode::block();
    root.insert_value("AppID", spec.app_id.trim());
    root.insert_value("Desc", spec.description.as_str());

    if !spec.content_root.is_empty() {
        root.insert_value("ContentRoot", spec.content_root.as_str());
    }
    if !spec.branch.is_empty() {
        root.insert_value("SetLive", spec.branch.as_str());
    }
    if spec.preview {
        root.insert_value("Preview", "1");
    }

    let mut depots = VdfNode::block();
    for depot in &spec.depots {
        let mut entry = VdfNode::block();
        entry.insert(
            "FileMapping",
            file_mapping(local_path(depot, &spec.content_root), depot),
        );
        if let Some(exclusion) = file_exclusion(depot) {
            entry.insert("FileExclusion", exclusion);
        }
        depots.insert(depot.id.trim(), entry);
    }
    root.insert("Depots", depots);

    VdfDocument {
        name: "AppBuild".to_string(),
        root,
    }
}

fn depot_build_document(depot: &DepotSpec) -> VdfDocument {
    let mut root = VdfNode::block();
    root.insert_value("DepotID", depot.id.trim());

    if !depot.source_content_path.is_empty() {
        root.insert_value("ContentRoot", depot.source_content_path.as_str());
    }
    root.insert("FileMapping", file_mapping(include_pattern(depot), depot));
    if let Some(exclusion) = file_exclusion(depot) {
        root.insert("FileExclusion", exclusion);
    }

    VdfDocument {
        name: "DepotBuildConfig".to_string(),
        root,
    }
}

fn file_mapping(local_path: String, depot: &DepotSpec) -> VdfNode {
    let mut mapping = VdfNode::block();
    mapping.insert_value("LocalPath", local_path);
    mapping.insert_value("DepotPath", depot.destination_path.as_str());
    mapping.insert_value("recursive", if depot.recursive { "1" } else { "0" });
    mapping
}

fn file_exclusion(depot: &DepotSpec) -> Option<VdfNode> {
    if depot.exclude_pattern.is_empty() {
        return None;
    }
    let mut exclusion = VdfNode::block();
    exclusion.insert_value("Pattern", depot.exclude_pattern.as_str());
    Some(exclusion)
}

fn include_pattern(depot: &DepotSpec) -> String {
    if depot.include_pattern.is_empty() {
        "*".to_string()
    } else {
        depot.include_pattern.clone()
    }
}

/// `LocalPath` is relative to `ContentRoot`; a depot pulling from a different
/// directory gets its pattern anchored under that directory instead.
fn local_path(depot: &DepotSpec, content_root: &str) -> String {
    let pattern = include_pattern(depot);
    let source = depot.source_content_path.trim();

    if source.is_empty() || source.trim_end_matches('/') == content_root.trim_end_matches('/') {
        pattern
    } else {
        Utf8Path::new(source).join(pattern).into_string()
    }
}

/// Render the app build manifest for `spec`.
pub fn render_app_build(spec: &BuildSpec) -> Result<String, ManifestError> {
    spec.validate()?;
    Ok(render_document(&app_build_document(spec)))
}

/// Render the single-depot manifest for `depot`.
pub fn render_depot_build(depot: &DepotSpec) -> Result<String, ManifestError> {
    validate_depot(depot)?;
    Ok(render_document(&depot_build_document(depot)))
}

fn validate_depot(depot: &DepotSpec) -> Result<(), ManifestError> {
    if depot.id.trim().is_empty() {
        return Err(ManifestError::Validation("Depot ID is required".to_string()));
    }
    Ok(())
}

/// Reduce an id to characters that are safe in a file name.
fn sanitize_component(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes manifests into one directory, one file per app or depot id.
///
/// Repeated builds for the same id overwrite the previous file.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    output_dir: Utf8PathBuf,
}

impl ManifestBuilder {
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Directory shared by every builder in this process: `<tmp>/steampipe-<pid>`.
    pub fn process_scoped_dir() -> Utf8PathBuf {
        let temp = std::env::temp_dir();
        let temp = Utf8PathBuf::from_path_buf(temp)
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()));
        temp.join(format!("steampipe-{}", std::process::id()))
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Path the app build manifest for `app_id` is written to.
    pub fn app_manifest_path(&self, app_id: &str) -> Utf8PathBuf {
        self.output_dir.join(format!(
            "app_{}_build.{}",
            sanitize_component(app_id),
            MANIFEST_EXTENSION
        ))
    }

    /// Path the depot manifest for `depot_id` is written to.
    pub fn depot_manifest_path(&self, depot_id: &str) -> Utf8PathBuf {
        self.output_dir.join(format!(
            "depot_{}.{}",
            sanitize_component(depot_id),
            MANIFEST_EXTENSION
        ))
    }

    /// Validate `spec`, render it and write `app_<appId>_build.vdf`.
    ///
    /// Nothing touches the filesystem when validation fails.
    pub fn build_upload_manifest(&self, spec: &BuildSpec) -> Result<Utf8PathBuf, ManifestError> {
        let contents = render_app_build(spec)?;
        let path = self.app_manifest_path(&spec.app_id);
        self.write(&path, &contents)?;

        tracing::info!(
            "App build manifest created: {} ({} depots)",
            path,
            spec.depots.len()
        );
        Ok(path)
    }

    /// Render and write `depot_<depotId>.vdf` for a single depot.
    pub fn build_depot_manifest(&self, depot: &DepotSpec) -> Result<Utf8PathBuf, ManifestError> {
        let contents = render_depot_build(depot)?;
        let path = self.depot_manifest_path(&depot.id);
        self.write(&path, &contents)?;

        tracing::info!("Depot manifest created: {}", path);
        Ok(path)
    }

    fn write(&self, path: &Utf8Path, contents: &str) -> Result<(), ManifestError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ManifestError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        fs::write(path, contents).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new(Self::process_scoped_dir())
    }
}

/// Read and parse a manifest from disk.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_manifest(path: &Utf8Path) -> Result<Option<VdfDocument>, ManifestError> {
    if !path.exists() {
        tracing::warn!("Manifest not found: {}", path);
        return Ok(None);
    }

    let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(parse_manifest(&text)?))
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Str(String),
    Open,
    Close,
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") {
                let line_len = trimmed.find('\n').unwrap_or(trimmed.len());
                self.pos += line_len;
            } else {
                break;
            }
        }
    }

    /// Next token with its starting offset, `None` at end of input.
    fn next_token(&mut self) -> Result<Option<(Token, usize)>, ManifestParseError> {
        self.skip_trivia();
        let start = self.pos;
        let mut chars = self.rest().chars();

        let Some(first) = chars.next() else {
            return Ok(None);
        };

        match first {
            '{' => {
                self.pos += 1;
                Ok(Some((Token::Open, start)))
            }
            '}' => {
                self.pos += 1;
                Ok(Some((Token::Close, start)))
            }
            '"' => self.quoted(start).map(|s| Some((Token::Str(s), start))),
            _ => {
                let rest = self.rest();
                let len = rest
                    .find(|c: char| c.is_whitespace() || c == '{' || c == '}' || c == '"')
                    .unwrap_or(rest.len());
                self.pos += len;
                Ok(Some((Token::Str(rest[..len].to_string()), start)))
            }
        }
    }

    fn quoted(&mut self, start: usize) -> Result<String, ManifestParseError> {
        let mut value = String::new();
        let mut chars = self.rest().char_indices().skip(1);

        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(value);
                }
                '\\' => match chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                _ => value.push(c),
            }
        }

        Err(ManifestParseError::UnterminatedString { offset: start })
    }
}

/// Parse a manifest document.
///
/// Accepts quoted and bare tokens, `//` line comments and the `\"`, `\\`, `\n`
/// and `\t` escapes. Exactly one root key is allowed.
pub fn parse_manifest(text: &str) -> Result<VdfDocument, ManifestParseError> {
    let mut lexer = Lexer::new(text);

    let name = match lexer.next_token()? {
        Some((Token::Str(name), _)) => name,
        Some((token, offset)) => return Err(unexpected(&token, offset)),
        None => return Err(ManifestParseError::UnexpectedEof),
    };

    let root = parse_node(&mut lexer)?;

    if let Some((_, offset)) = lexer.next_token()? {
        return Err(ManifestParseError::TrailingContent { offset });
    }

    Ok(VdfDocument { name, root })
}

/// Parse what follows a key: a value or a `{ ... }` block.
fn parse_node(lexer: &mut Lexer<'_>) -> Result<VdfNode, ManifestParseError> {
    match lexer.next_token()? {
        Some((Token::Str(value), _)) => Ok(VdfNode::Value(value)),
        Some((Token::Open, _)) => {
            let mut children = IndexMap::new();
            loop {
                match lexer.next_token()? {
                    Some((Token::Close, _)) => return Ok(VdfNode::Block(children)),
                    Some((Token::Str(key), _)) => {
                        let child = parse_node(lexer)?;
                        children.insert(key, child);
                    }
                    Some((token, offset)) => return Err(unexpected(&token, offset)),
                    None => return Err(ManifestParseError::UnexpectedEof),
                }
            }
        }
        Some((token, offset)) => Err(unexpected(&token, offset)),
        None => Err(ManifestParseError::UnexpectedEof),
    }
}

fn unexpected(token: &Token, offset: usize) -> ManifestParseError {
    let found = match token {
        Token::Str(s) => s.clone(),
        Token::Open => "{".to_string(),
        Token::Close => "}".to_string(),
    };
    ManifestParseError::UnexpectedToken { found, offset }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn builder_in(dir: &TempDir) -> ManifestBuilder {
        ManifestBuilder::new(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap())
    }

    fn two_depot_spec() -> BuildSpec {
        BuildSpec {
            app_id: "480".to_string(),
            description: "Nightly build".to_string(),
            content_root: "/builds/spacewar".to_string(),
            branch: "beta".to_string(),
            preview: true,
            depots: vec![
                DepotSpec::new("481", "/builds/spacewar"),
                DepotSpec::new("482", "/builds/spacewar-linux").with_exclusion("*.pdb"),
            ],
        }
    }

    #[test]
    fn test_escape_value() {
        assert_eq!(escape_value(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_value(r"C:\builds"), r"C:\\builds");
        assert_eq!(escape_value(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_render_app_build_layout() {
        let rendered = render_app_build(&BuildSpec::simple("480", "/content", "Test", "")).unwrap();

        let expected = "\"AppBuild\"\n{\n\
            \t\"AppID\"\t\"480\"\n\
            \t\"Desc\"\t\"Test\"\n\
            \t\"ContentRoot\"\t\"/content\"\n\
            \t\"Depots\"\n\t{\n\
            \t\t\"481\"\n\t\t{\n\
            \t\t\t\"FileMapping\"\n\t\t\t{\n\
            \t\t\t\t\"LocalPath\"\t\"*\"\n\
            \t\t\t\t\"DepotPath\"\t\".\"\n\
            \t\t\t\t\"recursive\"\t\"1\"\n\
            \t\t\t}\n\
            \t\t}\n\
            \t}\n\
            }\n";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_optional_keys() {
        let spec = two_depot_spec();
        let doc = parse_manifest(&render_app_build(&spec).unwrap()).unwrap();

        assert_eq!(doc.name, "AppBuild");
        assert_eq!(doc.value(&["SetLive"]), Some("beta"));
        assert_eq!(doc.value(&["Preview"]), Some("1"));
        assert_eq!(
            doc.value(&["Depots", "482", "FileExclusion", "Pattern"]),
            Some("*.pdb")
        );
        assert_eq!(
            doc.value(&["Depots", "482", "FileMapping", "LocalPath"]),
            Some("/builds/spacewar-linux/*")
        );
        assert_eq!(doc.lookup(&["Depots", "481", "FileExclusion"]), None);

        let mut plain = spec.clone();
        plain.branch.clear();
        plain.preview = false;
        plain.content_root.clear();
        let doc = parse_manifest(&render_app_build(&plain).unwrap()).unwrap();
        assert_eq!(doc.lookup(&["SetLive"]), None);
        assert_eq!(doc.lookup(&["Preview"]), None);
        assert_eq!(doc.lookup(&["ContentRoot"]), None);
    }

    #[test]
    fn test_non_recursive_mapping() {
        let mut spec = BuildSpec::simple("480", "/content", "", "");
        spec.depots[0].recursive = false;
        let doc = parse_manifest(&render_app_build(&spec).unwrap()).unwrap();
        assert_eq!(
            doc.value(&["Depots", "481", "FileMapping", "recursive"]),
            Some("0")
        );
    }

    #[test]
    fn test_validation_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let builder = builder_in(&dir);

        let mut spec = BuildSpec::simple("480", "/content", "", "");
        spec.depots.clear();
        assert!(matches!(
            builder.build_upload_manifest(&spec),
            Err(ManifestError::Validation(_))
        ));

        let spec = BuildSpec {
            app_id: String::new(),
            depots: vec![DepotSpec::new("1", "/content")],
            ..BuildSpec::default()
        };
        assert!(matches!(
            builder.build_upload_manifest(&spec),
            Err(ManifestError::Validation(_))
        ));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_repeated_builds_overwrite() {
        let dir = TempDir::new().unwrap();
        let builder = builder_in(&dir);
        let spec = two_depot_spec();

        let first_path = builder.build_upload_manifest(&spec).unwrap();
        let first = std::fs::read(&first_path).unwrap();
        let second_path = builder.build_upload_manifest(&spec).unwrap();
        let second = std::fs::read(&second_path).unwrap();

        assert_eq!(first_path, second_path);
        assert_eq!(first, second);
        assert_eq!(first_path.file_name(), Some("app_480_build.vdf"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_depot_manifest() {
        let dir = TempDir::new().unwrap();
        let builder = builder_in(&dir);
        let depot = DepotSpec::new("481", "/content").with_exclusion("*.pdb");

        let path = builder.build_depot_manifest(&depot).unwrap();
        assert_eq!(path.file_name(), Some("depot_481.vdf"));

        let doc = read_manifest(&path).unwrap().unwrap();
        assert_eq!(doc.name, "DepotBuildConfig");
        assert_eq!(doc.value(&["DepotID"]), Some("481"));
        assert_eq!(doc.value(&["FileMapping", "LocalPath"]), Some("*"));
        assert_eq!(doc.value(&["FileMapping", "DepotPath"]), Some("."));
        assert_eq!(doc.value(&["FileExclusion", "Pattern"]), Some("*.pdb"));

        assert!(matches!(
            builder.build_depot_manifest(&DepotSpec::default()),
            Err(ManifestError::Validation(_))
        ));
    }

    #[test]
    fn test_file_names_are_sanitized() {
        let builder = ManifestBuilder::new("/tmp/out");
        assert_eq!(
            builder.app_manifest_path("../480"),
            Utf8PathBuf::from("/tmp/out/app____480_build.vdf")
        );
    }

    #[test]
    fn test_read_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("missing.vdf")).unwrap();
        assert!(read_manifest(&path).unwrap().is_none());
    }

    #[test]
    fn test_parse_comments_and_bare_tokens() {
        let text = "// generated\n\"AppBuild\"\n{\n\tAppID 480 // inline\n\t\"Depots\" { }\n}\n";
        let doc = parse_manifest(text).unwrap();
        assert_eq!(doc.value(&["AppID"]), Some("480"));
        assert_eq!(doc.lookup(&["Depots"]), Some(&VdfNode::block()));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_manifest(""), Err(ManifestParseError::UnexpectedEof));
        assert_eq!(
            parse_manifest("\"AppBuild\" {"),
            Err(ManifestParseError::UnexpectedEof)
        );
        assert!(matches!(
            parse_manifest("\"AppBuild\" { \"Desc\" \"open"),
            Err(ManifestParseError::UnterminatedString { .. })
        ));
        assert!(matches!(
            parse_manifest("{ }"),
            Err(ManifestParseError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_manifest("\"A\" { } \"B\""),
            Err(ManifestParseError::TrailingContent { .. })
        ));
    }
}
