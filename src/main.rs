use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use cloth_ir_opt::ir::{
    lower::{Int64Lowering, PackingLowering},
    opt::{OptimizerOptions, PassManager},
    print::print_instructions,
    reader::read_instructions,
    validate::validate,
    IrArenas, IrContext,
};
use miette::{Context, IntoDiagnostic};
use tracing_subscriber::{fmt, EnvFilter};

/// Optimizes a textual shader IR file and prints the result.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input IR file (s-expression form)
    input: PathBuf,

    /// Comma-separated pass names run to a fixed point instead of the
    /// standard pipeline
    #[arg(long, value_delimiter = ',')]
    passes: Option<Vec<String>>,

    /// Print a unified diff of the input against the result
    #[arg(long)]
    diff: bool,

    /// Log every rewrite
    #[arg(short, long)]
    verbose: bool,

    /// Target has no integer instructions
    #[arg(long)]
    no_native_integers: bool,
    /// Target has no pow instruction
    #[arg(long)]
    no_native_pow: bool,
    /// Target has no saturate modifier
    #[arg(long)]
    no_native_saturate: bool,
    /// Target has no lrp instruction
    #[arg(long)]
    no_native_lrp: bool,
    /// Lower 64-bit integer operations to built-in calls
    #[arg(long)]
    no_native_int64: bool,

    /// Prefer dot products and vector code
    #[arg(long)]
    aos: bool,

    /// Keep unreferenced uniforms
    #[arg(long)]
    uniform_locations_assigned: bool,

    /// Packing built-ins to expand (`all` or names like `pack_half_2x16`)
    #[arg(long, value_delimiter = ',', value_parser = parse_flag::<PackingLowering>)]
    lower_packing: Vec<PackingLowering>,

    /// 64-bit operations to lower when int64 is not native (`all`, `mul`,
    /// `div`, `mod`, `sign`)
    #[arg(long, value_delimiter = ',', value_parser = parse_flag::<Int64Lowering>)]
    lower_int64: Vec<Int64Lowering>,

    /// Lower dynamic indexing of shader inputs to conditional moves
    #[arg(long)]
    lower_indirect_inputs: bool,
    /// Lower dynamic indexing of shader outputs to conditional moves
    #[arg(long)]
    lower_indirect_outputs: bool,
    /// Lower dynamic indexing of temporaries to conditional moves
    #[arg(long)]
    lower_indirect_temps: bool,
    /// Lower dynamic indexing of uniforms to conditional moves
    #[arg(long)]
    lower_indirect_uniforms: bool,

    /// Split dvec3/dvec4 varyings into two slots
    #[arg(long)]
    lower_double_varyings: bool,

    /// Upper bound on optimization rounds
    #[arg(long, default_value_t = 20)]
    max_iterations: usize,
}

fn parse_flag<F: bitflags::Flags>(s: &str) -> Result<F, String> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(F::all());
    }
    F::from_name(&s.to_ascii_uppercase()).ok_or_else(|| {
        let known = F::FLAGS
            .iter()
            .map(|f| f.name().to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown flag '{s}' (expected all, {known})")
    })
}

impl Cli {
    fn options(&self) -> OptimizerOptions {
        let defaults = OptimizerOptions::default();
        OptimizerOptions {
            native_integers: !self.no_native_integers,
            native_pow: !self.no_native_pow,
            native_saturate: !self.no_native_saturate,
            native_lrp: !self.no_native_lrp,
            native_int64: !self.no_native_int64,
            optimize_for_aos: self.aos,
            uniform_locations_assigned: self.uniform_locations_assigned,
            lower_packing: self.lower_packing.iter().copied().collect(),
            lower_int64: if self.lower_int64.is_empty() {
                defaults.lower_int64
            } else {
                self.lower_int64.iter().copied().collect()
            },
            lower_indirect_inputs: self.lower_indirect_inputs,
            lower_indirect_outputs: self.lower_indirect_outputs,
            lower_indirect_temps: self.lower_indirect_temps,
            lower_indirect_uniforms: self.lower_indirect_uniforms,
            lower_double_varyings: self.lower_double_varyings,
            max_iterations: self.max_iterations,
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = std::fs::read_to_string(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    let arenas = IrArenas::new();
    let ctx = IrContext::new(&arenas);
    let mut instructions = read_instructions(&ctx, &source)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to parse {}", cli.input.display()))?;
    validate(&mut instructions)
        .into_diagnostic()
        .wrap_err("input IR is malformed")?;
    let before = print_instructions(&instructions);

    let options = cli.options();
    let pm = match &cli.passes {
        Some(names) => PassManager::from_names(names.iter().map(String::as_str), options)
            .map_err(|name| miette::miette!("unknown pass '{name}'"))?,
        None => PassManager::common_optimization(options),
    };
    let summary = pm.run(&ctx, &mut instructions);
    if !summary.converged {
        tracing::warn!(
            "stopped after {} rounds without reaching a fixed point",
            summary.rounds
        );
    }
    validate(&mut instructions)
        .into_diagnostic()
        .wrap_err("optimized IR failed validation")?;
    let after = print_instructions(&instructions);

    if cli.diff {
        let diff = similar::TextDiff::from_lines(&before, &after);
        print!(
            "{}",
            diff.unified_diff()
                .context_radius(3)
                .header(&cli.input.display().to_string(), "optimized")
        );
    } else {
        print!("{after}");
    }
    Ok(())
}
