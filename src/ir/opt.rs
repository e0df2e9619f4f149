//! Optimization passes and the fixed-point driver.

use std::fmt::Debug;

use super::{
    lower::{Int64Lowering, PackingLowering},
    validate::debug_validate,
    Instruction, IrContext,
};

pub mod algebraic;
pub mod constant_folding;
pub mod constant_propagation;
pub mod constant_variable;
pub mod copy_propagation;
pub mod copy_propagation_elements;
pub mod dead_code;
pub mod dead_code_local;
pub mod dead_functions;
pub mod if_simplification;
mod propagation;
pub mod rebalance_tree;
pub mod swizzle;
pub mod tree_grafting;
pub mod vectorize;

/// Target capabilities and lowering requests. Passes only read these.
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    pub native_integers: bool,
    pub native_pow: bool,
    pub native_saturate: bool,
    pub native_lrp: bool,
    pub native_int64: bool,
    /// Prefer recognizing dot products and vectorizing scalar code.
    pub optimize_for_aos: bool,
    /// Once set, unreferenced uniforms keep their declarations.
    pub uniform_locations_assigned: bool,
    pub lower_packing: PackingLowering,
    pub lower_int64: Int64Lowering,
    pub lower_indirect_inputs: bool,
    pub lower_indirect_outputs: bool,
    pub lower_indirect_temps: bool,
    pub lower_indirect_uniforms: bool,
    pub lower_double_varyings: bool,
    pub max_iterations: usize,
}
impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            native_integers: true,
            native_pow: true,
            native_saturate: true,
            native_lrp: true,
            native_int64: true,
            optimize_for_aos: false,
            uniform_locations_assigned: false,
            lower_packing: PackingLowering::empty(),
            lower_int64: Int64Lowering::all(),
            lower_indirect_inputs: false,
            lower_indirect_outputs: false,
            lower_indirect_temps: false,
            lower_indirect_uniforms: false,
            lower_double_varyings: false,
            max_iterations: 20,
        }
    }
}

/// A transformation over one translation unit.
pub trait Pass: Debug {
    fn name(&self) -> &str;

    /// Returns whether anything changed.
    fn run<'a>(
        &self,
        ctx: &IrContext<'a>,
        options: &OptimizerOptions,
        instructions: &mut Vec<Instruction<'a>>,
    ) -> bool;
}

/// Declares a unit struct implementing [`Pass`] by forwarding to a function.
macro_rules! declare_pass {
    ($(#[$m:meta])* $ty:ident, $name:literal, |$ctx:ident, $options:ident, $ir:ident| $body:expr) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;
        impl $crate::ir::opt::Pass for $ty {
            fn name(&self) -> &str {
                $name
            }

            #[allow(unused_variables)]
            fn run<'a>(
                &self,
                $ctx: &$crate::ir::IrContext<'a>,
                $options: &$crate::ir::opt::OptimizerOptions,
                $ir: &mut Vec<$crate::ir::Instruction<'a>>,
            ) -> bool {
                $body
            }
        }
    };
}
pub(crate) use declare_pass;

declare_pass!(
    ConstantFolding,
    "constant_folding",
    |ctx, options, ir| constant_folding::do_constant_folding(ir)
);

/// Every pass the driver knows by name, optimizations first.
pub fn pass_by_name(name: &str) -> Option<Box<dyn Pass>> {
    use super::lower;

    Some(match name {
        "algebraic" => Box::new(algebraic::Algebraic),
        "constant_folding" => Box::new(ConstantFolding),
        "constant_propagation" => Box::new(constant_propagation::ConstantPropagation),
        "constant_variable" => Box::new(constant_variable::ConstantVariable),
        "copy_propagation" => Box::new(copy_propagation::CopyPropagation),
        "copy_propagation_elements" => {
            Box::new(copy_propagation_elements::CopyPropagationElements)
        }
        "dead_code" => Box::new(dead_code::DeadCode),
        "dead_code_local" => Box::new(dead_code_local::DeadCodeLocal),
        "dead_functions" => Box::new(dead_functions::DeadFunctions),
        "if_simplification" => Box::new(if_simplification::IfSimplification),
        "rebalance_tree" => Box::new(rebalance_tree::RebalanceTree),
        "swizzle" => Box::new(swizzle::OptimizeSwizzles),
        "tree_grafting" => Box::new(tree_grafting::TreeGrafting),
        "vectorize" => Box::new(vectorize::Vectorize),
        "vec_index_to_cond_assign" => Box::new(lower::vec_index_to_cond_assign::VecIndexToCondAssign),
        "variable_index_to_cond_assign" => {
            Box::new(lower::variable_index_to_cond_assign::VariableIndexToCondAssign)
        }
        "int64" => Box::new(lower::int64::LowerInt64),
        "packing_builtins" => Box::new(lower::packing_builtins::LowerPackingBuiltins),
        "named_interface_blocks" => {
            Box::new(lower::named_interface_blocks::LowerNamedInterfaceBlocks)
        }
        "packed_varyings" => Box::new(lower::packed_varyings::LowerPackedVaryings),
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Fixed-point rounds executed, the final quiet one included.
    pub rounds: usize,
    /// False when the iteration cap stopped the loop.
    pub converged: bool,
}

/// Runs lowering passes once, then optimization passes until none of them
/// reports progress.
#[derive(Debug, Default)]
pub struct PassManager {
    lowering: Vec<Box<dyn Pass>>,
    passes: Vec<Box<dyn Pass>>,
    options: OptimizerOptions,
}
impl PassManager {
    pub fn new(options: OptimizerOptions) -> Self {
        Self {
            lowering: Vec::new(),
            passes: Vec::new(),
            options,
        }
    }

    /// The standard pipeline: lowering requested by `options`, then the
    /// common optimization loop.
    pub fn common_optimization(options: OptimizerOptions) -> Self {
        use super::lower::*;

        let mut pm = Self::new(options);
        pm.add_lowering(Box::new(named_interface_blocks::LowerNamedInterfaceBlocks));
        if pm.options.lower_double_varyings {
            pm.add_lowering(Box::new(packed_varyings::LowerPackedVaryings));
        }
        if !pm.options.lower_packing.is_empty() {
            pm.add_lowering(Box::new(packing_builtins::LowerPackingBuiltins));
        }
        if !pm.options.native_int64 {
            pm.add_lowering(Box::new(int64::LowerInt64));
        }
        pm.add_lowering(Box::new(vec_index_to_cond_assign::VecIndexToCondAssign));
        pm.add_lowering(Box::new(variable_index_to_cond_assign::VariableIndexToCondAssign));

        pm.add_pass(Box::new(dead_functions::DeadFunctions));
        pm.add_pass(Box::new(if_simplification::IfSimplification));
        pm.add_pass(Box::new(copy_propagation::CopyPropagation));
        pm.add_pass(Box::new(copy_propagation_elements::CopyPropagationElements));
        if pm.options.optimize_for_aos {
            pm.add_pass(Box::new(vectorize::Vectorize));
        }
        pm.add_pass(Box::new(dead_code::DeadCode));
        pm.add_pass(Box::new(dead_code_local::DeadCodeLocal));
        pm.add_pass(Box::new(tree_grafting::TreeGrafting));
        pm.add_pass(Box::new(constant_propagation::ConstantPropagation));
        pm.add_pass(Box::new(constant_variable::ConstantVariable));
        pm.add_pass(Box::new(ConstantFolding));
        pm.add_pass(Box::new(rebalance_tree::RebalanceTree));
        pm.add_pass(Box::new(algebraic::Algebraic));
        pm.add_pass(Box::new(swizzle::OptimizeSwizzles));
        pm
    }

    /// A pipeline of explicitly named passes, all run in the fixed-point
    /// loop. Returns the first unknown name on failure.
    pub fn from_names<'n>(
        names: impl IntoIterator<Item = &'n str>,
        options: OptimizerOptions,
    ) -> Result<Self, String> {
        let mut pm = Self::new(options);
        for name in names {
            let pass = pass_by_name(name).ok_or_else(|| name.to_owned())?;
            pm.add_pass(pass);
        }
        Ok(pm)
    }

    pub fn add_lowering(&mut self, pass: Box<dyn Pass>) {
        self.lowering.push(pass);
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn run<'a>(&self, ctx: &IrContext<'a>, instructions: &mut Vec<Instruction<'a>>) -> RunSummary {
        for pass in &self.lowering {
            if pass.run(ctx, &self.options, instructions) {
                tracing::debug!("[PassManager] lowered by {}", pass.name());
            }
            debug_validate(instructions);
        }

        for round in 1..=self.options.max_iterations {
            let mut progress = false;
            for pass in &self.passes {
                if pass.run(ctx, &self.options, instructions) {
                    tracing::debug!("[PassManager] round {round}: {} made progress", pass.name());
                    progress = true;
                }
                debug_validate(instructions);
            }
            tracing::info!("[PassManager] round {round} done (progress: {progress})");
            if !progress {
                return RunSummary {
                    rounds: round,
                    converged: true,
                };
            }
        }
        RunSummary {
            rounds: self.options.max_iterations,
            converged: self.passes.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, reader::read_instructions, IrArenas};

    #[test]
    fn every_pass_is_reachable_by_name() {
        for name in [
            "algebraic",
            "constant_folding",
            "constant_propagation",
            "constant_variable",
            "copy_propagation",
            "copy_propagation_elements",
            "dead_code",
            "dead_code_local",
            "dead_functions",
            "if_simplification",
            "rebalance_tree",
            "swizzle",
            "tree_grafting",
            "vectorize",
            "vec_index_to_cond_assign",
            "variable_index_to_cond_assign",
            "int64",
            "packing_builtins",
            "named_interface_blocks",
            "packed_varyings",
        ] {
            let pass = pass_by_name(name).unwrap();
            assert_eq!(pass.name(), name);
        }
        assert!(pass_by_name("inline").is_none());
        assert_eq!(
            PassManager::from_names(["algebraic", "nope"], OptimizerOptions::default()).unwrap_err(),
            "nope"
        );
    }

    #[test]
    fn empty_pipeline_converges_immediately() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = Vec::new();
        let summary = PassManager::new(OptimizerOptions::default()).run(&ctx, &mut list);
        assert_eq!(
            summary,
            RunSummary {
                rounds: 1,
                converged: true
            }
        );
    }

    #[test]
    fn iteration_cap_is_respected() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let src = indoc! {"
            (declare (shader_in) float a)
            (declare (shader_out) float o)
            (assign (x) (var_ref o) (expression float + (expression float + (var_ref a) (constant float (1.0))) (constant float (2.0))))
        "};
        let mut list = read_instructions(&ctx, src).unwrap();
        let options = OptimizerOptions {
            max_iterations: 1,
            ..Default::default()
        };
        let summary = PassManager::common_optimization(options).run(&ctx, &mut list);
        assert_eq!(summary.rounds, 1);
        assert!(!summary.converged);

        let summary =
            PassManager::common_optimization(OptimizerOptions::default()).run(&ctx, &mut list);
        assert!(summary.converged);
        assert_eq!(
            print_instructions(&list),
            indoc! {"
                (declare (shader_in) float a)
                (declare (shader_out) float o)
                (assign (x) (var_ref o) (expression float + (constant float (3.0)) (var_ref a)))
            "}
        );
    }
}
