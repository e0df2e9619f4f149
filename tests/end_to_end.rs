use cloth_ir_opt::ir::{
    lower::PackingLowering,
    opt::{OptimizerOptions, PassManager},
    print::print_instructions,
    reader::read_instructions,
    validate::validate,
    IrArenas, IrContext,
};
use indoc::indoc;

fn optimize(src: &str, pm: &PassManager) -> String {
    let arenas = IrArenas::new();
    let ctx = IrContext::new(&arenas);
    let mut list = read_instructions(&ctx, src).unwrap();
    validate(&mut list).unwrap();
    let summary = pm.run(&ctx, &mut list);
    assert!(summary.converged);
    validate(&mut list).unwrap();
    print_instructions(&list)
}

fn standard(src: &str) -> String {
    optimize(src, &PassManager::common_optimization(OptimizerOptions::default()))
}

#[test]
fn identity_arithmetic_collapses_to_a_copy() {
    let out = standard(indoc! {"
        (declare (shader_in) vec4 b)
        (declare (shader_out) vec4 c)
        (function main
          (signature void
            (parameters)
            ((declare () vec4 a)
             (assign (xyzw) (var_ref a) (expression vec4 + (var_ref b) (constant float (0.0))))
             (assign (xyzw) (var_ref c) (expression vec4 * (var_ref a) (constant float (1.0)))))))
    "});
    assert!(out.contains("(assign (xyzw) (var_ref c) (var_ref b))"), "{out}");
    assert!(!out.contains("var_ref a"), "{out}");
    assert!(!out.contains("vec4 a)"), "{out}");
}

#[test]
fn scalar_log2_writes_become_one_vector_write() {
    let options = OptimizerOptions {
        optimize_for_aos: true,
        ..Default::default()
    };
    let out = optimize(
        indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec4 r)
            (assign (x) (var_ref r) (expression float log2 (swiz x (var_ref v))))
            (assign (y) (var_ref r) (expression float log2 (swiz y (var_ref v))))
            (assign (z) (var_ref r) (expression float log2 (swiz z (var_ref v))))
            (assign (w) (var_ref r) (expression float log2 (swiz w (var_ref v))))
        "},
        &PassManager::common_optimization(options),
    );
    assert_eq!(
        out,
        indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec4 r)
            (assign (xyzw) (var_ref r) (expression vec4 log2 (var_ref v)))
        "}
    );
}

const SINGLE_USE_TEMPORARY: &str = indoc! {"
    (declare (shader_in) float x)
    (declare (shader_in) float y)
    (declare (shader_out) float z)
    (function main
      (signature void
        (parameters)
        ((declare () float t)
         (assign (x) (var_ref t) (expression float * (var_ref x) (var_ref y)))
         (assign (x) (var_ref z) (var_ref t)))))
"};

#[test]
fn single_use_temporary_is_grafted() {
    let pm = PassManager::from_names(["tree_grafting"], OptimizerOptions::default()).unwrap();
    let out = optimize(SINGLE_USE_TEMPORARY, &pm);
    assert!(
        out.contains("(assign (x) (var_ref z) (expression float * (var_ref x) (var_ref y)))"),
        "{out}"
    );
    assert!(!out.contains("var_ref t"), "{out}");
    assert!(!out.contains("float t)"), "{out}");
}

#[test]
fn grafting_stops_at_a_write_to_an_operand() {
    let src = indoc! {"
        (declare (shader_in) float y)
        (declare (shader_out) float z)
        (function main
          (signature void
            (parameters)
            ((declare () float x)
             (declare () float t)
             (assign (x) (var_ref x) (var_ref y))
             (assign (x) (var_ref t) (expression float * (var_ref x) (var_ref y)))
             (assign (x) (var_ref x) (constant float (2.0)))
             (assign (x) (var_ref z) (expression float + (var_ref t) (var_ref x))))))
    "};
    let pm = PassManager::from_names(["tree_grafting"], OptimizerOptions::default()).unwrap();
    let out = optimize(src, &pm);
    assert!(out.contains("(assign (x) (var_ref z) (expression float + (var_ref t) (var_ref x)))"), "{out}");
}

#[test]
fn clamp_to_unit_range_becomes_saturate() {
    let out = standard(indoc! {"
        (declare (shader_in) float x)
        (declare (shader_out) float o)
        (assign (x) (var_ref o) (expression float min (expression float max (var_ref x) (constant float (0.0))) (constant float (1.0))))
    "});
    assert!(
        out.contains("(assign (x) (var_ref o) (expression float saturate (var_ref x)))"),
        "{out}"
    );
}

#[test]
fn disagreeing_branches_are_not_propagated() {
    let out = standard(indoc! {"
        (declare (uniform) bool cond)
        (declare (shader_out) int b)
        (function main
          (signature void
            (parameters)
            ((declare () int a)
             (if (var_ref cond)
               ((assign (x) (var_ref a) (constant int (1))))
               ((assign (x) (var_ref a) (constant int (2)))))
             (assign (x) (var_ref b) (var_ref a)))))
    "});
    assert!(out.contains("(assign (x) (var_ref b) (var_ref a))"), "{out}");
    assert!(out.contains("(assign (x) (var_ref a) (constant int (1)))"), "{out}");
    assert!(out.contains("(assign (x) (var_ref a) (constant int (2)))"), "{out}");
}

#[test]
fn dynamic_array_reads_are_left_alone() {
    let out = standard(indoc! {"
        (declare (uniform) (array float 4) a)
        (declare (uniform) int i)
        (declare (shader_out) float o)
        (assign (x) (var_ref o) (expression float + (array_ref (var_ref a) (var_ref i)) (constant float (0.0))))
    "});
    assert!(
        out.contains("(assign (x) (var_ref o) (array_ref (var_ref a) (var_ref i)))"),
        "{out}"
    );
}

#[test]
fn lowering_and_optimization_compose() {
    let options = OptimizerOptions {
        lower_indirect_uniforms: true,
        ..Default::default()
    };
    let out = optimize(
        indoc! {"
            (declare (uniform) (array vec2 2) a)
            (declare (uniform) int i)
            (declare (shader_out) vec2 o)
            (assign (xy) (var_ref o) (array_ref (var_ref a) (var_ref i)))
        "},
        &PassManager::common_optimization(options),
    );
    assert!(!out.contains("(array_ref (var_ref a) (var_ref i))"), "{out}");
    for k in 0..2 {
        let element = format!("(array_ref (var_ref a) (constant int ({k})))");
        assert_eq!(out.matches(&element).count(), 1, "{out}");
        let guard = format!(" (constant int ({k}))) (xy) ");
        assert_eq!(out.matches(&guard).count(), 1, "{out}");
    }
}

#[test]
fn double_varyings_are_split_through_the_pipeline() {
    let options = OptimizerOptions {
        lower_double_varyings: true,
        ..Default::default()
    };
    let out = optimize(
        indoc! {"
            (declare (shader_in) dvec3 pos)
            (declare (shader_out) dvec3 o)
            (function main
              (signature void
                (parameters)
                ((assign (xyz) (var_ref o) (var_ref pos)))))
        "},
        &PassManager::common_optimization(options),
    );
    assert!(out.contains("(declare (shader_in) dvec2 pos.0)"), "{out}");
    assert!(out.contains("(declare (shader_in) double pos.1)"), "{out}");
    assert!(out.contains("(declare (shader_out) dvec2 o.0)"), "{out}");
    assert!(out.contains("(declare (shader_out) double o.1)"), "{out}");
    assert!(out.contains("(assign (xy) (var_ref o.0) "), "{out}");
    assert!(out.contains("(assign (x) (var_ref o.1) "), "{out}");
    assert!(out.contains("(var_ref pos.0)"), "{out}");
    assert!(out.contains("(var_ref pos.1)"), "{out}");
}

#[test]
fn int64_lowering_survives_the_pipeline() {
    let options = OptimizerOptions {
        native_int64: false,
        ..Default::default()
    };
    let out = optimize(
        indoc! {"
            (declare (uniform) uint64_t a)
            (declare (uniform) uint64_t b)
            (declare (shader_out) uint64_t o)
            (assign (x) (var_ref o) (expression uint64_t * (var_ref a) (var_ref b)))
        "},
        &PassManager::common_optimization(options),
    );
    assert!(out.contains("(function __builtin_umul64"), "{out}");
    assert!(out.contains("(call __builtin_umul64 "), "{out}");
    assert!(out.contains("packUint2x32"), "{out}");
    assert!(!out.contains("(expression uint64_t * "), "{out}");
}

#[test]
fn packing_builtins_are_expanded_through_the_pipeline() {
    let options = OptimizerOptions {
        lower_packing: PackingLowering::PACK_SNORM_2X16,
        ..Default::default()
    };
    let out = optimize(
        indoc! {"
            (declare (uniform) vec2 v)
            (declare (shader_out) uint o)
            (assign (x) (var_ref o) (expression uint packSnorm2x16 (var_ref v)))
        "},
        &PassManager::common_optimization(options),
    );
    assert!(!out.contains("packSnorm2x16"), "{out}");
    assert!(out.contains("(expression uint << "), "{out}");
    assert!(out.contains("(expression uint | "), "{out}");
    assert!(out.contains("(var_ref v)"), "{out}");
}
