//! Rust source front end
//!
//! Walks a source tree and turns every directory of `.rs` files into one
//! [`PackageFacts`]. Parsing uses `syn`; each directory is parsed on its own
//! rayon task into plain owned records (syntax trees are not `Send`), and
//! import resolution runs once every directory is in.
//!
//! A directory with a file that fails to read or parse is skipped as a
//! whole and listed in [`ProjectFacts::skipped_dirs`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use proc_macro2::TokenTree;
use rayon::prelude::*;
use serde::Deserialize;
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{
    Arm, Attribute, BinOp, Block, Expr, ExprAssign, ExprBinary, ExprCall, ExprField,
    ExprForLoop, ExprIf, ExprLoop, ExprMatch, ExprMethodCall, ExprWhile, Fields,
    GenericArgument, ImplItem, Item, ItemFn, ItemImpl, ItemMod, ItemStruct, ItemTrait, ItemUse,
    Macro, Member, Meta, Pat, PathArguments, TraitItem, Type, UnOp, UseTree,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::CompiledConfig;
use crate::facts::{
    DecisionPoints, FieldUsage, FileFacts, FunctionFacts, MethodFacts, PackageFacts, ProjectFacts,
    SkippedDir, StructFacts, package_import_path,
};

/// Errors that can occur while extracting facts
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Crates every Rust file can name without a manifest entry
const BUILTIN_CRATES: [&str; 3] = ["std", "core", "alloc"];

/// Extract the fact model of the project rooted at `root`
pub fn extract_project(root: &Path, config: &CompiledConfig) -> Result<ProjectFacts, ExtractError> {
    if !root.is_dir() {
        return Err(ExtractError::InvalidPath(root.display().to_string()));
    }
    let root = root.canonicalize()?;

    let manifest = CrateManifest::discover(&root);
    let crate_root = crate_root_dir(&root);
    let ctx = ExtractContext {
        crate_ident: manifest.name.replace('-', "_"),
        extern_crates: manifest.extern_crates,
        crate_root: crate_root.clone(),
        config,
    };
    let crate_root_rel = relative_slash_path(&root, &crate_root);

    let jobs = source_dirs(&root, config);
    debug!(directories = jobs.len(), module = %manifest.name, "discovered source directories");

    let results: Vec<(DirJob, Result<ParsedDir, ExtractError>)> = jobs
        .into_par_iter()
        .map(|job| {
            let parsed = parse_dir(&job, &ctx);
            (job, parsed)
        })
        .collect();

    let mut parsed_dirs = Vec::new();
    let mut skipped_dirs = Vec::new();
    for (job, result) in results {
        match result {
            Ok(parsed) => parsed_dirs.push(parsed),
            Err(e) => {
                warn!(directory = %display_rel(&job.rel_path), error = %e, "skipping directory");
                skipped_dirs.push(SkippedDir {
                    path: display_rel(&job.rel_path),
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut facts = assemble(&manifest.name, &crate_root_rel, &ctx.crate_ident, parsed_dirs);
    facts.skipped_dirs = skipped_dirs;
    info!(
        packages = facts.packages.len(),
        skipped = facts.skipped_dirs.len(),
        "extracted project facts"
    );
    Ok(facts)
}

/// Extract a single source string as the root package of `module_path`
pub fn extract_source(
    source: &str,
    file_path: &str,
    module_path: &str,
    config: &CompiledConfig,
) -> Result<PackageFacts, ExtractError> {
    let crate_ident = module_path.replace('-', "_");
    let ctx = ExtractContext {
        crate_ident: crate_ident.clone(),
        extern_crates: BTreeSet::new(),
        crate_root: PathBuf::new(),
        config,
    };

    let mut parsed = ParsedDir::new(String::new(), Some(Vec::new()));
    parse_source(source, file_path, Some(Vec::new()), &ctx, &mut parsed)?;

    let facts = assemble(module_path, "", &crate_ident, vec![parsed]);
    facts
        .packages
        .into_iter()
        .next()
        .ok_or_else(|| ExtractError::InvalidPath(file_path.to_string()))
}

// ---------------------------------------------------------------------------
// Project layout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct Manifest {
    package: Option<ManifestPackage>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, toml::Value>,
    #[serde(default, rename = "build-dependencies")]
    build_dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: String,
}

/// Crate name and the external crates it may reference
struct CrateManifest {
    name: String,
    extern_crates: BTreeSet<String>,
}

impl CrateManifest {
    /// Nearest `Cargo.toml` with a `[package]` at or above `root`;
    /// falls back to the directory name.
    fn discover(root: &Path) -> Self {
        let mut extern_crates: BTreeSet<String> =
            BUILTIN_CRATES.iter().map(|s| s.to_string()).collect();

        for dir in root.ancestors() {
            let path = dir.join("Cargo.toml");
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let manifest: Manifest = match toml::from_str(&content) {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "ignoring unreadable manifest");
                    continue;
                }
            };
            let Some(package) = manifest.package else {
                continue;
            };

            extern_crates.extend(
                manifest
                    .dependencies
                    .keys()
                    .chain(manifest.dev_dependencies.keys())
                    .chain(manifest.build_dependencies.keys())
                    .map(|name| name.replace('-', "_")),
            );
            return Self {
                name: package.name,
                extern_crates,
            };
        }

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());
        Self {
            name,
            extern_crates,
        }
    }
}

/// `root/src` for a Cargo package layout, `root` otherwise
fn crate_root_dir(root: &Path) -> PathBuf {
    let src = root.join("src");
    if root.join("Cargo.toml").is_file() && src.is_dir() {
        src
    } else {
        root.to_path_buf()
    }
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn display_rel(rel_path: &str) -> String {
    if rel_path.is_empty() {
        ".".to_string()
    } else {
        rel_path.to_string()
    }
}

/// A directory holding `.rs` files, with its files sorted by name
#[derive(Debug)]
struct DirJob {
    dir: PathBuf,
    rel_path: String,
    files: Vec<PathBuf>,
}

/// Source directories under `root`, pruning hidden and excluded ones
fn source_dirs(root: &Path, config: &CompiledConfig) -> Vec<DirJob> {
    let mut dirs: BTreeMap<String, DirJob> = BTreeMap::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let base = entry.file_name().to_string_lossy();
            let rel = relative_slash_path(root, entry.path());
            !(base.starts_with('.')
                || config.should_exclude_dir(&base, &rel)
                || (config.analysis.exclude_tests && base == "tests"))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("rs")) {
            continue;
        }
        if config.should_exclude(&relative_slash_path(root, path)) {
            continue;
        }
        let Some(dir) = path.parent() else {
            continue;
        };

        let rel_path = relative_slash_path(root, dir);
        dirs.entry(rel_path.clone())
            .or_insert_with(|| DirJob {
                dir: dir.to_path_buf(),
                rel_path,
                files: Vec::new(),
            })
            .files
            .push(path.to_path_buf());
    }

    dirs.into_values().collect()
}

struct ExtractContext<'a> {
    /// Crate name as written in paths (`my_crate`)
    crate_ident: String,
    extern_crates: BTreeSet<String>,
    crate_root: PathBuf,
    config: &'a CompiledConfig,
}

impl ExtractContext<'_> {
    /// Module path of a directory, `None` outside the crate's module tree
    fn module_key(&self, dir: &Path) -> Option<Vec<String>> {
        let rel = dir.strip_prefix(&self.crate_root).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect(),
        )
    }
}

/// Module segments of a file inside a directory module
fn file_module(dir_key: &[String], file: &Path) -> Vec<String> {
    let mut module = dir_key.to_vec();
    if let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().to_string())
        && !matches!(stem.as_str(), "mod" | "lib" | "main")
    {
        module.push(stem);
    }
    module
}

// ---------------------------------------------------------------------------
// Per-directory parsing (runs on rayon workers, owned data only)
// ---------------------------------------------------------------------------

/// Where a path points, before package resolution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum RawImport {
    /// Absolute module path from the crate root
    Module(Vec<String>),
    /// Somewhere in the file's own package
    Local,
    /// Another crate
    External(String),
}

#[derive(Debug)]
struct RawStruct {
    name: String,
    file_path: String,
    fields: Vec<String>,
}

#[derive(Debug)]
struct RawMethod {
    type_name: String,
    facts: MethodFacts,
}

#[derive(Debug)]
struct RawFunction {
    facts: FunctionFacts,
    imports: BTreeSet<RawImport>,
}

#[derive(Debug)]
struct ParsedDir {
    rel_path: String,
    module_key: Option<Vec<String>>,
    files: Vec<FileFacts>,
    structs: Vec<RawStruct>,
    methods: Vec<RawMethod>,
    functions: Vec<RawFunction>,
    imports: BTreeSet<RawImport>,
}

impl ParsedDir {
    fn new(rel_path: String, module_key: Option<Vec<String>>) -> Self {
        Self {
            rel_path,
            module_key,
            files: Vec::new(),
            structs: Vec::new(),
            methods: Vec::new(),
            functions: Vec::new(),
            imports: BTreeSet::new(),
        }
    }
}

fn parse_dir(job: &DirJob, ctx: &ExtractContext<'_>) -> Result<ParsedDir, ExtractError> {
    let module_key = ctx.module_key(&job.dir);
    let mut parsed = ParsedDir::new(job.rel_path.clone(), module_key.clone());

    for file in &job.files {
        let content = fs::read_to_string(file)?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let rel_file = if job.rel_path.is_empty() {
            file_name
        } else {
            format!("{}/{}", job.rel_path, file_name)
        };
        let module = module_key.as_deref().map(|key| file_module(key, file));
        parse_source(&content, &rel_file, module, ctx, &mut parsed)?;
    }

    debug!(
        directory = %display_rel(&job.rel_path),
        files = parsed.files.len(),
        structs = parsed.structs.len(),
        functions = parsed.functions.len(),
        "parsed directory"
    );
    Ok(parsed)
}

fn parse_source(
    content: &str,
    rel_file: &str,
    module: Option<Vec<String>>,
    ctx: &ExtractContext<'_>,
    parsed: &mut ParsedDir,
) -> Result<(), ExtractError> {
    let syntax = syn::parse_file(content).map_err(|e| ExtractError::ParseError {
        path: rel_file.to_string(),
        message: e.to_string(),
    })?;
    let exclude_tests = ctx.config.analysis.exclude_tests;

    // First pass: `use` declarations and module names, needed to read paths
    let mut uses = UseCollector {
        module: module.clone(),
        exclude_tests,
        leaves: Vec::new(),
        child_modules: HashSet::new(),
    };
    uses.visit_file(&syntax);

    let mut resolver = Resolver {
        crate_ident: &ctx.crate_ident,
        extern_crates: &ctx.extern_crates,
        child_modules: uses.child_modules,
        aliases: HashMap::new(),
    };
    for leaf in &uses.leaves {
        let import = if leaf.leading_colon {
            leaf.path.first().map(|c| RawImport::External(c.clone()))
        } else {
            resolver.resolve(&leaf.path, leaf.module.as_deref(), true)
        };
        if let Some(import) = import {
            if let Some(binding) = &leaf.binding {
                resolver.aliases.insert(binding.clone(), import.clone());
            }
            parsed.imports.insert(import);
        }
    }

    // Second pass: items
    let mut items = ItemCollector {
        resolver: &resolver,
        config: ctx.config,
        file_path: rel_file,
        module,
        exclude_tests,
        out: parsed,
    };
    items.visit_file(&syntax);

    parsed.files.push(FileFacts {
        path: rel_file.to_string(),
        line_count: content.lines().count(),
    });
    Ok(())
}

/// `#[test]`, `#[tokio::test]`, `#[cfg(test)]` and friends
fn is_test_code(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        let path = attr.path();
        if path.segments.last().is_some_and(|s| s.ident == "test") {
            return true;
        }
        if path.is_ident("cfg")
            && let Meta::List(list) = &attr.meta
        {
            return list
                .tokens
                .clone()
                .into_iter()
                .any(|tt| matches!(&tt, TokenTree::Ident(ident) if ident == "test"));
        }
        false
    })
}

fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

/// Type name an `impl` block attaches to
fn impl_type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string()),
        Type::Reference(r) => impl_type_name(&r.elem),
        Type::Paren(p) => impl_type_name(&p.elem),
        Type::Group(g) => impl_type_name(&g.elem),
        _ => None,
    }
}

/// Last path segment with its generic arguments, e.g. `From<u32>`
fn path_label(path: &syn::Path) -> String {
    let Some(last) = path.segments.last() else {
        return String::new();
    };
    let mut label = last.ident.to_string();
    if let PathArguments::AngleBracketed(generics) = &last.arguments {
        let args: Vec<String> = generics
            .args
            .iter()
            .map(|arg| match arg {
                GenericArgument::Type(ty) => type_label(ty),
                _ => "_".to_string(),
            })
            .collect();
        label.push('<');
        label.push_str(&args.join(", "));
        label.push('>');
    }
    label
}

fn type_label(ty: &Type) -> String {
    match ty {
        Type::Path(type_path) => path_label(&type_path.path),
        Type::Reference(r) => format!("&{}", type_label(&r.elem)),
        Type::Slice(s) => format!("[{}]", type_label(&s.elem)),
        Type::Array(a) => format!("[{}; _]", type_label(&a.elem)),
        Type::Paren(p) => type_label(&p.elem),
        Type::Group(g) => type_label(&g.elem),
        Type::Tuple(t) => {
            let elems: Vec<String> = t.elems.iter().map(type_label).collect();
            format!("({})", elems.join(", "))
        }
        _ => "_".to_string(),
    }
}

struct UseLeaf {
    path: Vec<String>,
    /// Name the `use` brings into scope
    binding: Option<String>,
    module: Option<Vec<String>>,
    leading_colon: bool,
}

struct UseCollector {
    module: Option<Vec<String>>,
    exclude_tests: bool,
    leaves: Vec<UseLeaf>,
    child_modules: HashSet<String>,
}

impl UseCollector {
    fn flatten(&mut self, tree: &UseTree, prefix: &mut Vec<String>, leading_colon: bool) {
        match tree {
            UseTree::Path(path) => {
                prefix.push(path.ident.to_string());
                self.flatten(&path.tree, prefix, leading_colon);
                prefix.pop();
            }
            UseTree::Name(name) => {
                let (path, binding) = if name.ident == "self" {
                    (prefix.clone(), prefix.last().cloned())
                } else {
                    let mut path = prefix.clone();
                    path.push(name.ident.to_string());
                    (path, Some(name.ident.to_string()))
                };
                self.push_leaf(path, binding, leading_colon);
            }
            UseTree::Rename(rename) => {
                let mut path = prefix.clone();
                if rename.ident != "self" {
                    path.push(rename.ident.to_string());
                }
                let binding = (rename.rename != "_").then(|| rename.rename.to_string());
                self.push_leaf(path, binding, leading_colon);
            }
            UseTree::Glob(_) => self.push_leaf(prefix.clone(), None, leading_colon),
            UseTree::Group(group) => {
                for item in &group.items {
                    self.flatten(item, prefix, leading_colon);
                }
            }
        }
    }

    fn push_leaf(&mut self, path: Vec<String>, binding: Option<String>, leading_colon: bool) {
        if path.is_empty() {
            return;
        }
        self.leaves.push(UseLeaf {
            path,
            binding,
            module: self.module.clone(),
            leading_colon,
        });
    }
}

impl<'ast> Visit<'ast> for UseCollector {
    fn visit_item_use(&mut self, node: &'ast ItemUse) {
        let mut prefix = Vec::new();
        self.flatten(&node.tree, &mut prefix, node.leading_colon.is_some());
    }

    fn visit_item_mod(&mut self, node: &'ast ItemMod) {
        if self.exclude_tests && is_test_code(&node.attrs) {
            return;
        }
        self.child_modules.insert(node.ident.to_string());
        if let Some(module) = self.module.as_mut() {
            module.push(node.ident.to_string());
        }
        visit::visit_item_mod(self, node);
        if let Some(module) = self.module.as_mut() {
            module.pop();
        }
    }

    fn visit_item_fn(&mut self, node: &'ast ItemFn) {
        if self.exclude_tests && is_test_code(&node.attrs) {
            return;
        }
        visit::visit_item_fn(self, node);
    }
}

/// Reads the head of a path: `crate::`, `self::`, `super::`, an alias
/// brought in by `use`, a child module or a known crate.
struct Resolver<'a> {
    crate_ident: &'a str,
    extern_crates: &'a BTreeSet<String>,
    child_modules: HashSet<String>,
    aliases: HashMap<String, RawImport>,
}

impl Resolver<'_> {
    /// `in_use` paths always resolve (unknown heads are crates); expression
    /// and type paths resolve only when their head is recognized.
    fn resolve(&self, segments: &[String], module: Option<&[String]>, in_use: bool) -> Option<RawImport> {
        let (first, rest) = segments.split_first()?;
        let within = |base: &[String], tail: &[String]| {
            let mut path = base.to_vec();
            path.extend_from_slice(tail);
            RawImport::Module(path)
        };

        match first.as_str() {
            "crate" => return Some(RawImport::Module(rest.to_vec())),
            "self" => return Some(module.map_or(RawImport::Local, |m| within(m, rest))),
            "super" => {
                let ups = segments.iter().take_while(|s| *s == "super").count();
                let tail = &segments[ups..];
                return Some(module.map_or(RawImport::Local, |m| {
                    within(&m[..m.len().saturating_sub(ups)], tail)
                }));
            }
            "Self" => return None,
            _ => {}
        }

        if first == self.crate_ident {
            return Some(RawImport::Module(rest.to_vec()));
        }
        if !in_use && let Some(import) = self.aliases.get(first) {
            return Some(import.clone());
        }
        if self.child_modules.contains(first) {
            return Some(module.map_or(RawImport::Local, |m| within(m, segments)));
        }
        if in_use || self.extern_crates.contains(first) {
            return Some(RawImport::External(first.clone()));
        }
        None
    }

    /// Multi-segment expression or type path
    fn resolve_path(&self, path: &syn::Path, module: Option<&[String]>) -> Option<RawImport> {
        if path.segments.len() < 2 {
            return None;
        }
        let segments = path_segments(path);
        if path.leading_colon.is_some() {
            return segments.first().map(|c| RawImport::External(c.clone()));
        }
        self.resolve(&segments, module, false)
    }
}

struct ItemCollector<'a, 'r> {
    resolver: &'r Resolver<'r>,
    config: &'a CompiledConfig,
    file_path: &'a str,
    module: Option<Vec<String>>,
    exclude_tests: bool,
    out: &'a mut ParsedDir,
}

impl ItemCollector<'_, '_> {
    fn skip(&self, attrs: &[Attribute]) -> bool {
        self.exclude_tests && is_test_code(attrs)
    }

    fn analyze_body(&mut self, block: &Block, self_type: Option<&str>) -> BodyFacts {
        let mut body = BodyVisitor {
            resolver: self.resolver,
            module: self.module.as_deref(),
            self_type,
            decisions: DecisionPoints::default(),
            field_usage: BTreeMap::new(),
            calls: BTreeMap::new(),
            callees: BTreeSet::new(),
            imports: BTreeSet::new(),
        };
        body.visit_block(block);

        let open = block.brace_token.span.open().start().line;
        let close = block.brace_token.span.close().end().line;

        let facts = BodyFacts {
            loc: close.saturating_sub(open),
            decisions: body.decisions,
            field_usage: body.field_usage,
            calls: body.calls,
            callees: body.callees,
            imports: body.imports,
        };
        self.out.imports.extend(facts.imports.iter().cloned());
        facts
    }

    fn push_function(&mut self, qualified_name: String, body: Option<&BodyFacts>) {
        let mut facts = FunctionFacts::new(qualified_name, self.file_path);
        let imports = match body {
            Some(body) => {
                facts.body_line_count = body.loc;
                facts.decision_points = body.decisions;
                facts.callees = body.callees.clone();
                body.imports.clone()
            }
            None => {
                facts.has_body = false;
                BTreeSet::new()
            }
        };
        self.out.functions.push(RawFunction { facts, imports });
    }
}

impl<'ast> Visit<'ast> for ItemCollector<'_, '_> {
    fn visit_item_mod(&mut self, node: &'ast ItemMod) {
        // Out-of-line modules are walked as files of their own
        if self.skip(&node.attrs) || node.content.is_none() {
            return;
        }
        if let Some(module) = self.module.as_mut() {
            module.push(node.ident.to_string());
        }
        visit::visit_item_mod(self, node);
        if let Some(module) = self.module.as_mut() {
            module.pop();
        }
    }

    fn visit_item_struct(&mut self, node: &'ast ItemStruct) {
        if self.skip(&node.attrs) {
            return;
        }
        if let Fields::Named(named) = &node.fields {
            self.out.structs.push(RawStruct {
                name: node.ident.to_string(),
                file_path: self.file_path.to_string(),
                fields: named
                    .named
                    .iter()
                    .filter_map(|f| f.ident.as_ref().map(|i| i.to_string()))
                    .collect(),
            });
        }
        visit::visit_item_struct(self, node);
    }

    fn visit_item_fn(&mut self, node: &'ast ItemFn) {
        if self.skip(&node.attrs) {
            return;
        }
        self.visit_signature(&node.sig);
        let body = self.analyze_body(&node.block, None);
        self.push_function(node.sig.ident.to_string(), Some(&body));
    }

    fn visit_item_impl(&mut self, node: &'ast ItemImpl) {
        if self.skip(&node.attrs) {
            return;
        }
        let Some(type_name) = impl_type_name(&node.self_ty) else {
            return;
        };
        self.visit_type(&node.self_ty);
        if let Some((_, trait_path, _)) = &node.trait_ {
            self.visit_path(trait_path);
        }
        let is_trait_impl = node.trait_.is_some();
        // Display::fmt and Debug::fmt on one type must stay distinct methods
        let trait_suffix = node
            .trait_
            .as_ref()
            .map(|(_, path, _)| format!("#{}", path_label(path)))
            .unwrap_or_default();

        for item in &node.items {
            let ImplItem::Fn(method) = item else {
                continue;
            };
            if self.skip(&method.attrs) {
                continue;
            }
            self.visit_signature(&method.sig);
            let body = self.analyze_body(&method.block, Some(type_name.as_str()));
            let bare = method.sig.ident.to_string();
            let qualified = format!("{}.{}{}", type_name, bare, trait_suffix);
            self.push_function(qualified.clone(), Some(&body));

            if method.sig.receiver().is_some() {
                let is_private =
                    !is_trait_impl && matches!(method.vis, syn::Visibility::Inherited);
                let mut facts = MethodFacts::new(qualified, is_private)
                    .with_utility(self.config.is_utility_method(&bare));
                facts.receiver_binding = "self".to_string();
                facts.field_usage = body.field_usage;
                facts.calls = body.calls;
                self.out.methods.push(RawMethod {
                    type_name: type_name.clone(),
                    facts,
                });
            }
        }
    }

    fn visit_item_trait(&mut self, node: &'ast ItemTrait) {
        if self.skip(&node.attrs) {
            return;
        }
        let trait_name = node.ident.to_string();
        for item in &node.items {
            let TraitItem::Fn(method) = item else {
                continue;
            };
            if self.skip(&method.attrs) {
                continue;
            }
            self.visit_signature(&method.sig);
            let qualified = format!("{}.{}", trait_name, method.sig.ident);
            match &method.default {
                Some(block) => {
                    let body = self.analyze_body(block, Some(trait_name.as_str()));
                    self.push_function(qualified, Some(&body));
                }
                None => self.push_function(qualified, None),
            }
        }
    }

    fn visit_path(&mut self, path: &'ast syn::Path) {
        if let Some(import) = self.resolver.resolve_path(path, self.module.as_deref()) {
            self.out.imports.insert(import);
        }
        visit::visit_path(self, path);
    }
}

struct BodyFacts {
    loc: usize,
    decisions: DecisionPoints,
    field_usage: BTreeMap<String, FieldUsage>,
    calls: BTreeMap<String, usize>,
    callees: BTreeSet<String>,
    imports: BTreeSet<RawImport>,
}

/// Walks one function body
struct BodyVisitor<'a> {
    resolver: &'a Resolver<'a>,
    module: Option<&'a [String]>,
    self_type: Option<&'a str>,
    decisions: DecisionPoints,
    field_usage: BTreeMap<String, FieldUsage>,
    calls: BTreeMap<String, usize>,
    callees: BTreeSet<String>,
    imports: BTreeSet<RawImport>,
}

fn is_self(expr: &Expr) -> bool {
    matches!(expr, Expr::Path(p) if p.qself.is_none() && p.path.is_ident("self"))
}

fn self_field(field: &ExprField) -> Option<String> {
    match &field.member {
        Member::Named(ident) if is_self(&field.base) => Some(ident.to_string()),
        _ => None,
    }
}

/// `self.f` at the root of an assignment place (`self.f.x`, `self.f[i]`, `*self.f`)
fn place_root_field(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Field(field) => self_field(field).or_else(|| place_root_field(&field.base)),
        Expr::Index(index) => place_root_field(&index.expr),
        Expr::Paren(paren) => place_root_field(&paren.expr),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Deref(_)) => place_root_field(&unary.expr),
        _ => None,
    }
}

fn is_compound_assign(op: &BinOp) -> bool {
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}

/// `_ =>` or an unguarded catch-all binding such as `n =>`
fn is_default_arm(arm: &Arm) -> bool {
    match &arm.pat {
        Pat::Wild(_) => true,
        // Uppercase idents are unit variants or constants, e.g. `None`
        Pat::Ident(binding) => {
            arm.guard.is_none()
                && binding.subpat.is_none()
                && binding
                    .ident
                    .to_string()
                    .starts_with(|c: char| c.is_lowercase() || c == '_')
        }
        _ => false,
    }
}

impl BodyVisitor<'_> {
    fn mark(&mut self, field: String, usage: FieldUsage) {
        let entry = self.field_usage.entry(field).or_default();
        *entry = entry.merge(usage);
    }

    fn record_self_call(&mut self, method: &str) {
        if let Some(ty) = self.self_type {
            let qualified = format!("{}.{}", ty, method);
            *self.calls.entry(qualified.clone()).or_default() += 1;
            self.callees.insert(qualified);
        }
    }

    /// Visit the parts of an assignment place other than its root field
    fn visit_place(&mut self, expr: &Expr) {
        match expr {
            Expr::Field(field) if self_field(field).is_some() => {}
            Expr::Field(field) => self.visit_place(&field.base),
            Expr::Index(index) => {
                self.visit_place(&index.expr);
                self.visit_expr(&index.index);
            }
            Expr::Paren(paren) => self.visit_place(&paren.expr),
            Expr::Unary(unary) if matches!(unary.op, UnOp::Deref(_)) => self.visit_place(&unary.expr),
            other => self.visit_expr(other),
        }
    }
}

impl<'ast> Visit<'ast> for BodyVisitor<'_> {
    // Nested items are not part of this body
    fn visit_item(&mut self, _node: &'ast Item) {}

    fn visit_expr_if(&mut self, node: &'ast ExprIf) {
        self.decisions.if_statements += 1;
        visit::visit_expr_if(self, node);
    }

    fn visit_expr_for_loop(&mut self, node: &'ast ExprForLoop) {
        self.decisions.loops += 1;
        visit::visit_expr_for_loop(self, node);
    }

    fn visit_expr_while(&mut self, node: &'ast ExprWhile) {
        self.decisions.loops += 1;
        visit::visit_expr_while(self, node);
    }

    fn visit_expr_loop(&mut self, node: &'ast ExprLoop) {
        self.decisions.loops += 1;
        visit::visit_expr_loop(self, node);
    }

    fn visit_expr_match(&mut self, node: &'ast ExprMatch) {
        self.decisions.switches += 1;
        self.decisions.case_clauses += node
            .arms
            .iter()
            .filter(|arm| !is_default_arm(arm))
            .count();
        visit::visit_expr_match(self, node);
    }

    fn visit_expr_binary(&mut self, node: &'ast ExprBinary) {
        if matches!(node.op, BinOp::And(_) | BinOp::Or(_)) {
            self.decisions.logical_operators += 1;
        } else if is_compound_assign(&node.op)
            && let Some(field) = place_root_field(&node.left)
        {
            self.mark(field, FieldUsage::ReadWrite);
            self.visit_place(&node.left);
            self.visit_expr(&node.right);
            return;
        }
        visit::visit_expr_binary(self, node);
    }

    fn visit_expr_assign(&mut self, node: &'ast ExprAssign) {
        if let Some(field) = place_root_field(&node.left) {
            self.mark(field, FieldUsage::Write);
            self.visit_place(&node.left);
            self.visit_expr(&node.right);
            return;
        }
        visit::visit_expr_assign(self, node);
    }

    fn visit_expr_field(&mut self, node: &'ast ExprField) {
        if let Some(field) = self_field(node) {
            self.mark(field, FieldUsage::Read);
        }
        visit::visit_expr_field(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        if is_self(&node.receiver) {
            self.record_self_call(&node.method.to_string());
        }
        visit::visit_expr_method_call(self, node);
    }

    fn visit_expr_call(&mut self, node: &'ast ExprCall) {
        if let Expr::Path(func) = &*node.func
            && func.qself.is_none()
        {
            let segments = path_segments(&func.path);
            match segments.as_slice() {
                [name] => {
                    self.callees.insert(name.clone());
                }
                [.., owner, name] if owner == "Self" => self.record_self_call(name),
                [.., owner, name] if owner.starts_with(|c: char| c.is_uppercase()) => {
                    self.callees.insert(format!("{}.{}", owner, name));
                }
                [.., name] => {
                    self.callees.insert(name.clone());
                }
                [] => {}
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_path(&mut self, path: &'ast syn::Path) {
        if let Some(import) = self.resolver.resolve_path(path, self.module) {
            self.imports.insert(import);
        }
        visit::visit_path(self, path);
    }

    // Macro arguments that parse as expressions (`format!`, `vec!`, `assert!`)
    fn visit_macro(&mut self, node: &'ast Macro) {
        if let Ok(args) = node.parse_body_with(Punctuated::<Expr, syn::Token![,]>::parse_terminated) {
            for arg in &args {
                self.visit_expr(arg);
            }
        }
        visit::visit_macro(self, node);
    }
}

// ---------------------------------------------------------------------------
// Assembly: resolve imports and attach methods
// ---------------------------------------------------------------------------

fn assemble(
    module_path: &str,
    crate_root_rel: &str,
    crate_ident: &str,
    parsed_dirs: Vec<ParsedDir>,
) -> ProjectFacts {
    let module_index: BTreeMap<Vec<String>, String> = parsed_dirs
        .iter()
        .filter_map(|dir| {
            dir.module_key
                .clone()
                .map(|key| (key, package_import_path(module_path, &dir.rel_path)))
        })
        .collect();
    let crate_root_import = package_import_path(module_path, crate_root_rel);

    let mut facts = ProjectFacts::new(module_path);
    for dir in parsed_dirs {
        let own_import = package_import_path(module_path, &dir.rel_path);
        let resolve = |import: &RawImport| -> Option<String> {
            let path = match import {
                RawImport::Module(segments) => {
                    longest_module_prefix(segments, &module_index).unwrap_or(&crate_root_import).clone()
                }
                RawImport::Local => own_import.clone(),
                RawImport::External(name) => name.clone(),
            };
            (path != own_import).then_some(path)
        };

        let name = if dir.rel_path.is_empty() || dir.module_key.as_ref().is_some_and(|k| k.is_empty()) {
            crate_ident.to_string()
        } else {
            dir.rel_path
                .rsplit('/')
                .next()
                .unwrap_or(&dir.rel_path)
                .to_string()
        };
        let mut package = PackageFacts::new(name, dir.rel_path.clone());
        package.imports = dir.imports.iter().filter_map(&resolve).collect();
        package.files = dir.files;

        let aliases = trait_method_aliases(dir.functions.iter().map(|f| &f.facts.qualified_name));
        let retarget = |name: String| aliases.get(&name).cloned().unwrap_or(name);
        package.functions = dir
            .functions
            .into_iter()
            .map(|raw| {
                let mut function = raw.facts;
                function.imported_packages_used = raw.imports.iter().filter_map(&resolve).collect();
                function.callees = std::mem::take(&mut function.callees)
                    .into_iter()
                    .map(&retarget)
                    .collect();
                function
            })
            .collect();

        let mut seen = HashSet::new();
        package.structs = dir
            .structs
            .into_iter()
            .filter(|s| seen.insert(s.name.clone()))
            .map(|s| StructFacts::new(s.name, s.file_path).with_fields(s.fields))
            .collect();
        // cfg-gated twins share a name; the first one wins
        let mut seen_methods = HashSet::new();
        for raw in dir.methods {
            if !seen_methods.insert(raw.facts.qualified_name.clone()) {
                continue;
            }
            if let Some(target) = package.structs.iter_mut().find(|s| s.name == raw.type_name) {
                let mut method = raw.facts;
                let mut calls = BTreeMap::new();
                for (callee, count) in std::mem::take(&mut method.calls) {
                    *calls.entry(retarget(callee)).or_default() += count;
                }
                method.calls = calls;
                method
                    .field_usage
                    .retain(|field, _| target.fields.iter().any(|f| f == field));
                target.methods.push(method);
            }
        }

        facts.packages.push(package);
    }

    facts.packages.sort_by(|a, b| a.path.cmp(&b.path));
    facts
}

/// Map `Type.method` to its sole trait-qualified name (`Type.method#Trait`)
/// when the type has no inherent method of that name
fn trait_method_aliases<'a>(names: impl Iterator<Item = &'a String>) -> HashMap<String, String> {
    let names: HashSet<&String> = names.collect();
    let mut candidates: HashMap<String, Vec<&String>> = HashMap::new();
    for name in &names {
        if let Some((plain, _)) = name.split_once('#') {
            candidates.entry(plain.to_string()).or_default().push(*name);
        }
    }
    candidates
        .into_iter()
        .filter(|(plain, _)| !names.contains(plain))
        .filter_map(|(plain, traits)| match traits.as_slice() {
            [only] => Some((plain, (*only).clone())),
            _ => None,
        })
        .collect()
}

fn longest_module_prefix<'a>(
    segments: &[String],
    index: &'a BTreeMap<Vec<String>, String>,
) -> Option<&'a String> {
    (0..=segments.len())
        .rev()
        .find_map(|len| index.get(&segments[..len]))
}
