use itertools::Itertools;
use tracing::{
    debug,
    error,
    warn,
};

pub use crate::optimization::function_pass::{
    dead_code_elimination::{
        DeadCodeEliminationPass,
        WorklistOrder,
    },
    FunctionPass,
};
use crate::{
    error::GraphError,
    module::Module,
    verifier::{
        Verifier,
        VerifyError,
    },
    Function,
    FunctionRef,
};

pub mod function_pass;

/// Common interface of all optimization passes.
pub trait Pass {
    fn name(&self) -> &'static str;
}

/// Read-only options handed to every pass invocation.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PassOptions {
    pub opt_level: u8,
}

/// Sink for per-invocation results, owned by whoever drives the passes.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PassResults {
    pub invocations: Vec<PassInvocation>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PassInvocation {
    pub pass: &'static str,
    pub function: String,
    pub changed: bool,
}

impl PassResults {
    pub fn record(&mut self, pass: &'static str, function: &str, changed: bool) {
        self.invocations.push(PassInvocation {
            pass,
            function: function.to_string(),
            changed,
        });
    }

    /// Whether any recorded invocation changed the IR.
    pub fn changed(&self) -> bool {
        self.invocations.iter().any(|invocation| invocation.changed)
    }

    pub fn invocations_of<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a PassInvocation> + 'a {
        self.invocations
            .iter()
            .filter(move |invocation| invocation.pass == pass)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Pass `{pass}` left function `{function}` in an inconsistent state: {errors:?}")]
    Verify {
        pass: &'static str,
        function: String,
        errors: Vec<VerifyError>,
    },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PipelineConfig {
    pub opt_level: u8,
    pub dead_code_elimination: bool,
    pub worklist_order: WorklistOrder,
    /// Run the [`Verifier`] after every pass invocation.
    pub verify: bool,
    /// Upper bound on rounds over all passes per function.
    pub max_iterations: usize,
}

impl PipelineConfig {
    pub const fn all_disabled() -> Self {
        Self {
            opt_level: 0,
            dead_code_elimination: false,
            worklist_order: WorklistOrder::Fifo,
            verify: false,
            max_iterations: 16,
        }
    }

    pub const fn o0() -> Self {
        Self::all_disabled()
    }

    pub const fn o1() -> Self {
        Self {
            opt_level: 1,
            dead_code_elimination: true,
            ..Self::all_disabled()
        }
    }
}

#[cfg(test)]
impl PipelineConfig {
    pub const fn dead_code_elimination_only() -> Self {
        Self {
            dead_code_elimination: true,
            verify: true,
            ..Self::all_disabled()
        }
    }
}

pub struct Pipeline<'m> {
    module: &'m mut Module,
    config: PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(module: &'a mut Module, config: PipelineConfig) -> Self {
        Self { module, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<PassResults, PipelineError> {
        let options = PassOptions {
            opt_level: self.config.opt_level,
        };
        let mut results = PassResults::default();
        let functions = self.module.functions.keys().collect_vec();
        for function in functions {
            self.run_on_function(function, &options, &mut results)?;
        }
        Ok(results)
    }

    fn run_on_function(
        &mut self,
        function: FunctionRef,
        options: &PassOptions,
        results: &mut PassResults,
    ) -> Result<(), PipelineError> {
        let mut passes = self.get_passes();
        if passes.is_empty() {
            return Ok(());
        }
        let Some(function) = self.module.functions.get_mut(function) else {
            return Ok(());
        };
        for iteration in 0..self.config.max_iterations {
            let mut changed = false;
            for pass in &mut passes {
                let pass_changed = pass.run_on_function(function, options, results)?;
                results.record(pass.name(), &function.name, pass_changed);
                if self.config.verify {
                    verify(pass.name(), function)?;
                }
                changed |= pass_changed;
            }
            if !changed {
                debug!("Reached fixed point for {} after {} round(s)", function.name, iteration + 1);
                return Ok(());
            }
        }
        warn!(
            "No fixed point for {} after {} rounds",
            function.name, self.config.max_iterations
        );
        Ok(())
    }

    fn get_passes(&self) -> Vec<Box<dyn FunctionPass>> {
        let mut passes: Vec<Box<dyn FunctionPass>> = Vec::new();
        if self.config.dead_code_elimination {
            passes.push(Box::new(DeadCodeEliminationPass::new(
                self.config.worklist_order,
            )));
        }
        passes
    }
}

fn verify(pass: &'static str, function: &Function) -> Result<(), PipelineError> {
    let errors = Verifier::new(function).verify();
    if errors.is_empty() {
        return Ok(());
    }
    for error in &errors {
        error!("{pass} broke {}: {error}", function.name);
    }
    Err(PipelineError::Verify {
        pass,
        function: function.name.clone(),
        errors,
    })
}
