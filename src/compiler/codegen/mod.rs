//! C source emission from the AST.
//!
//! Single-pass recursive emission dispatching on node kind. Output is
//! collected into a [`CodeCollection`], an ordered map from file name to
//! indented code fragments, and written to disk together with a
//! `recipe.json` build recipe.
//!
//! Files emitted by convention: `header.h`, `main.c`, `quantize.c` (iff
//! quantization is active) and `tu{unit_id}.c` (iff translation-unit
//! splitting is active).

mod condition;
mod format;
mod function;
mod main_node;
mod output;
mod postprocessor;
mod quantizer;

pub use format::{indent_multi_line, ArrayFormatter, CLiteral};

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::compiler::ast::{AstBuilder, AstNodeId, NodePayload};
use crate::error::{Error, Result};

// =============================================================================
// CodeCollection
// =============================================================================

/// A block of emitted text with the indent level (in spaces) applied to
/// every one of its lines when written out.
#[derive(Debug, Clone)]
pub struct CodeFragment {
    pub content: String,
    pub indent: usize,
}

/// One emitted source file: an ordered sequence of fragments plus the
/// indent level applied to fragments pushed next.
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    fragments: Vec<CodeFragment>,
    current_indent: usize,
}

impl SourceFile {
    fn change_indent(&mut self, delta: i32) {
        let next = self.current_indent as i32 + delta * 2;
        debug_assert!(next >= 0, "indent underflow");
        self.current_indent = next.max(0) as usize;
    }

    fn push_fragment(&mut self, content: String) {
        self.fragments.push(CodeFragment {
            content,
            indent: self.current_indent,
        });
    }

    /// Fragments in emission order.
    pub fn fragments(&self) -> &[CodeFragment] {
        &self.fragments
    }

    /// Number of newline characters across all fragments; recorded as the
    /// file's `length` in the build recipe.
    pub fn line_count(&self) -> usize {
        self.fragments.iter().map(|f| f.content.matches('\n').count()).sum()
    }
}

/// Mapping from source-file name to its fragments, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct CodeCollection {
    sources: BTreeMap<String, SourceFile>,
    current_file: String,
}

impl CodeCollection {
    /// Direct subsequent fragments to `name`.
    pub fn switch_to_file(&mut self, name: &str) {
        self.current_file = name.to_string();
        self.sources.entry(name.to_string()).or_default();
    }

    /// File fragments are currently directed to.
    pub fn current_file(&self) -> String {
        self.current_file.clone()
    }

    /// Adjust the current file's indent by `delta` tabs (1 tab = 2 spaces).
    pub fn change_indent(&mut self, delta: i32) {
        self.sources.get_mut(&self.current_file).expect("no current file").change_indent(delta);
    }

    /// Append a fragment to the current file at its current indent.
    pub fn push_fragment(&mut self, content: impl Into<String>) {
        self.sources
            .get_mut(&self.current_file)
            .expect("no current file")
            .push_fragment(content.into());
    }

    /// Iterate files in name order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &SourceFile)> {
        self.sources.iter().map(|(name, file)| (name.as_str(), file))
    }
}

impl std::fmt::Display for CodeCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, source) in &self.sources {
            writeln!(f, "======== {name} ========")?;
            for fragment in &source.fragments {
                writeln!(f, "{}", indent_multi_line(&fragment.content, fragment.indent))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Emission state: the AST being walked and the accumulated sources.
pub(crate) struct CodeGenerator<'a> {
    pub(crate) ast: &'a AstBuilder,
    pub(crate) code: CodeCollection,
}

/// Emit C source for the whole AST.
pub fn generate(ast: &AstBuilder) -> Result<CodeCollection> {
    let mut generator = CodeGenerator {
        ast,
        code: CodeCollection::default(),
    };
    generator.emit(ast.root())?;
    Ok(generator.code)
}

impl CodeGenerator<'_> {
    /// Dispatch on the node kind.
    pub(crate) fn emit(&mut self, id: AstNodeId) -> Result<()> {
        match &self.ast.node(id).payload {
            NodePayload::Main { .. } => self.emit_main(id),
            NodePayload::Function => self.emit_function(id),
            NodePayload::NumericalCondition { .. } | NodePayload::CategoricalCondition { .. } => {
                self.emit_condition(id)
            }
            NodePayload::Output { .. } => self.emit_output(id),
            NodePayload::TranslationUnit { .. } => self.emit_translation_unit(id),
            NodePayload::Quantizer { .. } => self.emit_quantizer(id),
        }
    }

    /// C type of thresholds (and leaf outputs; the widths are tied).
    pub(crate) fn threshold_ctype(&self) -> &'static str {
        self.ast.meta().data_type.c_type()
    }

    /// C type of leaf outputs.
    pub(crate) fn leaf_output_ctype(&self) -> &'static str {
        self.ast.meta().data_type.c_type()
    }
}

// =============================================================================
// Disk writers
// =============================================================================

/// Write every source file of `collection` into `dirpath`.
pub fn write_code_to_disk(dirpath: &Path, collection: &CodeCollection) -> Result<()> {
    for (name, source) in collection.files() {
        let path = dirpath.join(name);
        let mut file = std::fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        for fragment in source.fragments() {
            writeln!(file, "{}", indent_multi_line(&fragment.content, fragment.indent))
                .map_err(|e| Error::io(&path, e))?;
        }
        writeln!(file).map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}

/// One `.c` source in the build recipe.
#[derive(Debug, serde::Serialize)]
struct RecipeSource {
    name: String,
    length: usize,
}

/// Write `recipe.json` describing the build: the target library name and
/// each `.c` source with its line count. The sources array is kept on a
/// single line.
pub fn write_build_recipe(
    dirpath: &Path,
    native_lib_name: &str,
    collection: &CodeCollection,
) -> Result<()> {
    let mut entries = Vec::new();
    for (name, source) in collection.files() {
        if let Some(stem) = name.strip_suffix(".c") {
            entries.push(serde_json::to_string(&RecipeSource {
                name: stem.to_string(),
                length: source.line_count(),
            })?);
        }
    }
    let recipe = format!(
        "{{\n    \"target\": {},\n    \"sources\": [{}]\n}}\n",
        serde_json::to_string(native_lib_name)?,
        entries.join(", ")
    );
    let path = dirpath.join("recipe.json");
    std::fs::write(&path, recipe).map_err(|e| Error::io(&path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_keep_indent_levels() {
        let mut code = CodeCollection::default();
        code.switch_to_file("main.c");
        code.push_fragment("void f(void) {");
        code.change_indent(1);
        code.push_fragment("return;");
        code.change_indent(-1);
        code.push_fragment("}");

        let main = code.files().next().unwrap().1;
        assert_eq!(main.fragments()[0].indent, 0);
        assert_eq!(main.fragments()[1].indent, 2);
        assert_eq!(main.fragments()[2].indent, 0);
    }

    #[test]
    fn files_are_ordered_by_name() {
        let mut code = CodeCollection::default();
        code.switch_to_file("tu1.c");
        code.push_fragment("b");
        code.switch_to_file("header.h");
        code.push_fragment("a");
        let names: Vec<&str> = code.files().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["header.h", "tu1.c"]);
    }

    #[test]
    fn line_count_counts_embedded_newlines() {
        let mut code = CodeCollection::default();
        code.switch_to_file("main.c");
        code.push_fragment("a\nb\nc");
        code.push_fragment("d");
        let main = code.files().next().unwrap().1;
        assert_eq!(main.line_count(), 2);
    }

    #[test]
    fn display_renders_section_banners() {
        let mut code = CodeCollection::default();
        code.switch_to_file("main.c");
        code.push_fragment("int x;");
        let rendered = format!("{code}");
        assert!(rendered.contains("======== main.c ========"));
        assert!(rendered.contains("int x;"));
    }
}
