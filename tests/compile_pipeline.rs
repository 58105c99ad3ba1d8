//! End-to-end compiler pipeline tests: model in, C sources out.

mod common;

use common::{generated_files, read_generated, scalar_model, stump};
use tempfile::TempDir;
use treec::model::{Model, Operator, Tree, TreesVariant};
use treec::{compile_model, dump_ast, CompilerParam, Error};

fn compile(model: &Model, params_json: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    let param = CompilerParam::parse_json(params_json).unwrap();
    compile_model(model, &param, dir.path()).unwrap();
    dir
}

// =============================================================================
// Basic emission
// =============================================================================

#[test]
fn stump_produces_header_main_and_recipe() {
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0)], 1, "identity");
    let dir = compile(&model, "{}");

    assert_eq!(generated_files(dir.path()), vec!["header.h", "main.c", "recipe.json"]);

    let header = read_generated(dir.path(), "header.h");
    assert!(header.contains("#define N_TARGET 1"));
    assert!(header.contains("#define MAX_N_CLASS 1"));
    assert!(header.contains("union Entry {"));
    assert!(header.contains("float fvalue;"));
    assert!(header.contains("int32_t get_num_target(void);"));
    assert!(header.contains("void get_num_class(int32_t* out);"));
    assert!(header.contains("int32_t get_num_feature(void);"));
    assert!(header.contains("const char* get_threshold_type(void);"));
    assert!(header.contains("const char* get_leaf_output_type(void);"));
    assert!(header.contains("void predict(union Entry* data, int pred_margin, float* result);"));
    assert!(header.contains("void postprocess(float* result);"));

    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("return \"float32\";"));
    assert!(main_c.contains("unsigned int tmp;"));
    // default_left stump: missing or below-threshold rows go left
    assert!(main_c.contains("if (!(data[0].missing != -1) || (data[0].fvalue < (float)0.5)) {"));
    assert!(main_c.contains("result[0] += -1;"));
    assert!(main_c.contains("result[0] += 1;"));
    assert!(main_c.contains("// Apply base_scores"));
    assert!(main_c.contains("result[0] += 0;"));
    assert!(main_c.contains("if (!pred_margin) { postprocess(result); }"));
    assert!(main_c.contains("// Do nothing"));
    // no quantization requested
    assert!(!main_c.contains("quantize("));
}

#[test]
fn float64_model_uses_double_everywhere() {
    let mut tree: Tree<f64> = Tree::with_num_nodes(3);
    tree.set_numerical_split(0, 0, Operator::Le, 0.25f64, false, 1, 2);
    tree.set_leaf(1, 0.5);
    tree.set_leaf(2, -0.5);
    let model = Model {
        num_target: 1,
        num_class: vec![1],
        leaf_vector_shape: [1, 1],
        num_feature: 1,
        base_scores: vec![0.5],
        postprocessor: "identity".to_string(),
        sigmoid_alpha: 1.0,
        ratio_c: 1.0,
        average_tree_output: false,
        target_id: vec![0],
        class_id: vec![0],
        trees: TreesVariant::F64(vec![tree]),
    };
    let dir = compile(&model, "{}");

    let header = read_generated(dir.path(), "header.h");
    assert!(header.contains("double fvalue;"));
    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("return \"float64\";"));
    assert!(main_c.contains(" (data[0].missing != -1) && (data[0].fvalue <= (double)0.25)"));
    assert!(main_c.contains("result[0] += 0.5;"));
}

#[test]
fn compile_output_is_byte_identical_across_runs() {
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0), stump(1.5, 0.25, -0.25)], 2, "sigmoid");
    let first = compile(&model, r#"{"quantize": 1, "parallel_comp": 2}"#);
    let second = compile(&model, r#"{"quantize": 1, "parallel_comp": 2}"#);

    let names = generated_files(first.path());
    assert_eq!(names, generated_files(second.path()));
    for name in names {
        assert_eq!(
            read_generated(first.path(), &name),
            read_generated(second.path(), &name),
            "file {name} differs between runs"
        );
    }
}

// =============================================================================
// Postprocessors
// =============================================================================

#[test]
fn sigmoid_postprocessor_is_emitted_with_alpha() {
    let model = scalar_model(vec![stump(0.5, -2.0, 2.0), stump(0.7, 1.0, -1.0)], 1, "sigmoid");
    let dir = compile(&model, "{}");
    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("// sigmoid"));
    assert!(main_c.contains("const float alpha = (float)1;"));
    assert!(main_c.contains("expf(-alpha * result[i])"));
}

#[test]
fn softmax_grove_per_class_emits_per_slice_calls() {
    // Three stumps, one per class of a single 3-class target.
    let trees = vec![stump(0.5, 0.1, 0.9), stump(0.5, 0.2, 0.8), stump(0.5, 0.3, 0.7)];
    let model = Model {
        num_target: 1,
        num_class: vec![3],
        leaf_vector_shape: [1, 1],
        num_feature: 1,
        base_scores: vec![0.0; 3],
        postprocessor: "softmax".to_string(),
        sigmoid_alpha: 1.0,
        ratio_c: 1.0,
        average_tree_output: false,
        target_id: vec![0, 0, 0],
        class_id: vec![0, 1, 2],
        trees: TreesVariant::F32(trees),
    };
    let dir = compile(&model, "{}");
    let header = read_generated(dir.path(), "header.h");
    assert!(header.contains("#define MAX_N_CLASS 3"));

    let main_c = read_generated(dir.path(), "main.c");
    // each tree adds to its own class slot
    assert!(main_c.contains("result[0] += 0.1;"));
    assert!(main_c.contains("result[1] += 0.2;"));
    assert!(main_c.contains("result[2] += 0.3;"));
    assert!(main_c.contains("// softmax"));
    assert!(main_c.contains("postprocess_impl(&result[0], 3);"));
}

#[rstest::rstest]
#[case("identity")]
#[case("signed_square")]
#[case("hinge")]
#[case("sigmoid")]
#[case("exponential")]
#[case("exponential_standard_ratio")]
#[case("logarithm_one_plus_exp")]
#[case("identity_multiclass")]
#[case("softmax")]
#[case("multiclass_ova")]
fn every_recognized_postprocessor_compiles(#[case] name: &str) {
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0)], 1, name);
    let dir = compile(&model, "{}");
    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("void postprocess(float* result) {"));
}

#[test]
fn unknown_postprocessor_is_rejected() {
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0)], 1, "logistic");
    let dir = TempDir::new().unwrap();
    let param = CompilerParam::default();
    let err = compile_model(&model, &param, dir.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidModel(_)));
    assert!(err.to_string().contains("logistic"));
}

#[test]
fn leaf_shape_inconsistent_with_fanout_is_rejected() {
    let mut model = scalar_model(vec![stump(0.5, -1.0, 1.0)], 1, "identity");
    // scalar (target, class) assignment but a two-target leaf shape
    model.leaf_vector_shape = [2, 1];
    model.num_target = 2;
    model.num_class = vec![1, 1];
    model.base_scores = vec![0.0, 0.0];
    let err = compile_model(&model, &CompilerParam::default(), TempDir::new().unwrap().path())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidModel(_)));
}

// =============================================================================
// Quantization
// =============================================================================

#[test]
fn quantize_emits_lookup_arrays_and_loop() {
    let mut second = Tree::with_num_nodes(3);
    second.set_numerical_split(0, 1, Operator::Lt, 2.5f32, true, 1, 2);
    second.set_leaf(1, 0.0);
    second.set_leaf(2, 1.0);
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0), second], 2, "identity");
    let dir = compile(&model, r#"{"quantize": 1}"#);

    assert_eq!(
        generated_files(dir.path()),
        vec!["header.h", "main.c", "quantize.c", "recipe.json"]
    );

    let header = read_generated(dir.path(), "header.h");
    assert!(header.contains("int quantize(float val, unsigned fid);"));

    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("// Quantize data"));
    assert!(main_c.contains("for (int i = 0; i < 2; ++i) {"));
    assert!(main_c.contains("data[i].qvalue = quantize(data[i].fvalue, i);"));
    // conditions now compare bin indices
    assert!(main_c.contains("data[0].qvalue < 0"));
    assert!(main_c.contains("data[1].qvalue < 0"));
    assert!(!main_c.contains("fvalue < (float)"));

    let quantize_c = read_generated(dir.path(), "quantize.c");
    assert!(quantize_c.contains("static const float threshold[] = {"));
    assert!(quantize_c.contains("0.5, 2.5,"));
    assert!(quantize_c.contains("static const int th_begin[] = {"));
    assert!(quantize_c.contains("0, 1,"));
    assert!(quantize_c.contains("static const int th_len[] = {"));
    assert!(quantize_c.contains("1, 1,"));
    assert!(quantize_c.contains("int quantize(float val, unsigned fid) {"));
    assert!(quantize_c.contains("return -10;"));
    assert!(quantize_c.contains("if (offset == 2 || val < array[0]) {"));
}

#[test]
fn quantize_skips_categorical_features() {
    let mut cat = Tree::with_num_nodes(3);
    cat.set_categorical_split(0, 1, vec![2, 4], false, false, 1, 2);
    cat.set_leaf(1, 1.0);
    cat.set_leaf(2, -1.0);
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0), cat], 2, "identity");
    let dir = compile(&model, r#"{"quantize": 1}"#);

    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("const unsigned char is_categorical[] = {"));
    assert!(main_c.contains("0, 1,"));
    assert!(main_c.contains("if (data[i].missing != -1 && !is_categorical[i]) {"));
    // categorical condition still reads fvalue, not qvalue
    assert!(main_c.contains("(unsigned int)(data[1].fvalue)"));
}

#[test]
fn all_infinite_thresholds_produce_no_quantize_file() {
    let model = scalar_model(vec![stump(f32::INFINITY, -1.0, 1.0)], 1, "identity");
    let dir = compile(&model, r#"{"quantize": 1}"#);
    assert_eq!(generated_files(dir.path()), vec!["header.h", "main.c", "recipe.json"]);

    let main_c = read_generated(dir.path(), "main.c");
    // 0 < +inf holds for every finite value: the comparison folds to 1
    assert!(main_c.contains("if (!(data[0].missing != -1) || (1)) {"));
}

#[test]
fn negative_infinity_folds_to_zero() {
    let model = scalar_model(vec![stump(f32::NEG_INFINITY, -1.0, 1.0)], 1, "identity");
    let dir = compile(&model, "{}");
    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("if (!(data[0].missing != -1) || (0)) {"));
}

// =============================================================================
// Translation units
// =============================================================================

#[test]
fn parallel_comp_splits_trees_across_units() {
    let trees: Vec<Tree<f32>> = (0..7).map(|i| stump(i as f32, -1.0, 1.0)).collect();
    let model = scalar_model(trees, 1, "identity");
    let dir = compile(&model, r#"{"parallel_comp": 3}"#);

    assert_eq!(
        generated_files(dir.path()),
        vec!["header.h", "main.c", "recipe.json", "tu0.c", "tu1.c", "tu2.c"]
    );

    let main_c = read_generated(dir.path(), "main.c");
    for unit in 0..3 {
        assert!(main_c.contains(&format!("predict_unit{unit}(data, result);")));
    }
    // trees moved out of main.c
    assert!(!main_c.contains("fvalue <"));

    let header = read_generated(dir.path(), "header.h");
    for unit in 0..3 {
        assert!(header.contains(&format!(
            "void predict_unit{unit}(union Entry* data, float* result);"
        )));
    }

    // ceil(7 / 3) = 3 trees in tu0/tu1, one in tu2
    let tu0 = read_generated(dir.path(), "tu0.c");
    assert!(tu0.contains("#include \"header.h\""));
    assert!(tu0.contains("void predict_unit0(union Entry* data, float* result) {"));
    assert!(tu0.contains("unsigned int tmp;"));
    assert_eq!(tu0.matches("fvalue <").count(), 3);
    let tu2 = read_generated(dir.path(), "tu2.c");
    assert_eq!(tu2.matches("fvalue <").count(), 1);
}

#[test]
fn more_units_than_trees_yields_one_unit_per_tree() {
    let trees: Vec<Tree<f32>> = (0..3).map(|i| stump(i as f32, -1.0, 1.0)).collect();
    let model = scalar_model(trees, 1, "identity");
    let dir = compile(&model, r#"{"parallel_comp": 10}"#);
    assert_eq!(
        generated_files(dir.path()),
        vec!["header.h", "main.c", "recipe.json", "tu0.c", "tu1.c", "tu2.c"]
    );
}

// =============================================================================
// Categorical splits
// =============================================================================

#[test]
fn categorical_split_builds_single_word_bitmap() {
    let mut tree = Tree::with_num_nodes(3);
    tree.set_categorical_split(0, 2, vec![1, 3, 5], false, false, 1, 2);
    tree.set_leaf(1, 1.0);
    tree.set_leaf(2, -1.0);
    let model = scalar_model(vec![tree], 3, "identity");
    let dir = compile(&model, "{}");

    let main_c = read_generated(dir.path(), "main.c");
    // bits 1, 3, 5 -> 0b101010 = 42
    assert!(main_c.contains("data[2].missing != -1 && ("));
    assert!(main_c.contains("(tmp = (unsigned int)(data[2].fvalue) )"));
    assert!(main_c.contains("(data[2].fvalue >= 0)"));
    assert!(main_c.contains("(fabsf(data[2].fvalue) <= (float)(1U << FLT_MANT_DIG))"));
    assert!(main_c.contains("(tmp >= 0 && tmp < 64 && (( (uint64_t)42U >> tmp) & 1) )"));
}

#[test]
fn category_above_63_extends_bitmap_to_second_word() {
    let mut tree = Tree::with_num_nodes(3);
    tree.set_categorical_split(0, 0, vec![1, 65], false, true, 1, 2);
    tree.set_leaf(1, 1.0);
    tree.set_leaf(2, -1.0);
    let model = scalar_model(vec![tree], 1, "identity");
    let dir = compile(&model, "{}");

    let main_c = read_generated(dir.path(), "main.c");
    // default_left flips the guard to `missing == -1 ||`
    assert!(main_c.contains("data[0].missing == -1 || ("));
    assert!(main_c.contains("(tmp >= 0 && tmp < 64 && (( (uint64_t)2U >> tmp) & 1) )"));
    assert!(main_c
        .contains("|| (tmp >= 64 && tmp < 128 && (( (uint64_t)2U >> (tmp - 64) ) & 1) )"));
}

#[test]
fn category_list_right_child_negates_the_clause() {
    let mut tree = Tree::with_num_nodes(3);
    tree.set_categorical_split(0, 0, vec![2], true, false, 1, 2);
    tree.set_leaf(1, 1.0);
    tree.set_leaf(2, -1.0);
    let model = scalar_model(vec![tree], 1, "identity");
    let dir = compile(&model, "{}");
    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("data[0].missing != -1 && !("));
}

#[test]
fn empty_category_list_folds_to_false() {
    let mut tree = Tree::with_num_nodes(3);
    tree.set_categorical_split(0, 0, vec![], false, false, 1, 2);
    tree.set_leaf(1, 1.0);
    tree.set_leaf(2, -1.0);
    let model = scalar_model(vec![tree], 1, "identity");
    let dir = compile(&model, "{}");
    let main_c = read_generated(dir.path(), "main.c");
    assert!(main_c.contains("if (0) {"));
}

// =============================================================================
// Recipe
// =============================================================================

#[test]
fn recipe_lists_c_sources_with_line_counts() {
    let trees: Vec<Tree<f32>> = (0..4).map(|i| stump(i as f32, -1.0, 1.0)).collect();
    let model = scalar_model(trees, 1, "identity");
    let dir = compile(&model, r#"{"parallel_comp": 2, "native_lib_name": "mymodel"}"#);

    let recipe_text = read_generated(dir.path(), "recipe.json");
    let recipe: serde_json::Value = serde_json::from_str(&recipe_text).unwrap();
    assert_eq!(recipe["target"], "mymodel");
    let sources = recipe["sources"].as_array().unwrap();
    let names: Vec<&str> = sources.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["main", "tu0", "tu1"]);
    for source in sources {
        assert!(source["length"].as_u64().unwrap() > 0);
    }
    // sources array stays on a single line
    let sources_line = recipe_text.lines().find(|l| l.contains("\"sources\"")).unwrap();
    assert!(sources_line.contains("tu1"));
}

// =============================================================================
// AST dump
// =============================================================================

#[test]
fn dump_ast_reflects_passes() {
    let model = scalar_model(vec![stump(0.5, -1.0, 1.0), stump(1.5, -1.0, 1.0)], 1, "identity");
    let param = CompilerParam::parse_json(r#"{"quantize": 1, "parallel_comp": 2}"#).unwrap();
    let dump = dump_ast(&model, &param).unwrap();
    assert!(dump.contains("MainNode {"));
    assert!(dump.contains("QuantizerNode {"));
    assert!(dump.contains("TranslationUnitNode { unit_id: 0 }"));
    assert!(dump.contains("TranslationUnitNode { unit_id: 1 }"));
    assert!(dump.contains("quantized_threshold: int(0)"));
    assert!(dump.contains("Metadata: "));

    assert_eq!(dump, dump_ast(&model, &param).unwrap());
}
