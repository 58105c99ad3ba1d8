//! The compiler pipeline: model → AST → optimization passes → C source.
//!
//! [`compile_model`] runs the fixed pass sequence and materializes the
//! generated sources plus `recipe.json` in an output directory;
//! [`dump_ast`] runs the same passes and renders the AST as text instead.

pub mod ast;
pub mod codegen;
mod param;

pub use param::CompilerParam;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::annotator::BranchAnnotator;
use crate::error::{Error, Result};
use crate::model::Model;

use ast::AstBuilder;

/// Run the optimization passes in their enforced order:
/// `build → load_data_counts? → split_into_tus? →
/// generate_is_categorical_array? → quantize_thresholds?`.
///
/// Splitting must precede quantizing (the quantize pass requires a
/// Function directly under Main), and the categorical array must exist
/// before codegen whenever quantization is on (the emitted quantize loop
/// skips categorical features).
fn run_passes(model: &Model, param: &CompilerParam) -> Result<AstBuilder> {
    model.validate()?;
    if param.verbose > 0 {
        log::info!(
            "Compiling {} trees ({} features, {} targets)",
            model.num_trees(),
            model.num_feature,
            model.num_target
        );
    }
    let mut builder = AstBuilder::build(model);

    if param.has_annotation() {
        let file = File::open(&param.annotate_in)
            .map_err(|e| Error::io(&param.annotate_in, e))?;
        let annotator = BranchAnnotator::load(BufReader::new(file))?;
        builder.load_data_counts(annotator.counts())?;
        log::info!("Loading node frequencies from '{}'", param.annotate_in);
    }

    builder.split_into_tus(param.parallel_comp)?;

    if param.quantize > 0 {
        builder.generate_is_categorical_array();
        builder.quantize_thresholds()?;
    }
    Ok(builder)
}

/// Compile `model` into C sources under `dirpath`, with a `recipe.json`
/// build recipe. The directory is created if needed.
pub fn compile_model(model: &Model, param: &CompilerParam, dirpath: &Path) -> Result<()> {
    let builder = run_passes(model, param)?;
    let collection = codegen::generate(&builder)?;
    std::fs::create_dir_all(dirpath).map_err(|e| Error::io(dirpath, e))?;
    codegen::write_code_to_disk(dirpath, &collection)?;
    codegen::write_build_recipe(dirpath, &param.native_lib_name, &collection)?;
    if param.verbose > 0 {
        log::info!("Wrote generated C code to '{}'", dirpath.display());
    }
    Ok(())
}

/// Render the AST for `model` after running the same passes
/// [`compile_model`] would, so the dump reflects splitting and
/// quantization.
pub fn dump_ast(model: &Model, param: &CompilerParam) -> Result<String> {
    let builder = run_passes(model, param)?;
    Ok(builder.dump())
}
