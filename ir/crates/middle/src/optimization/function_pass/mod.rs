pub mod dead_code_elimination;

use crate::{
    error::GraphError,
    optimization::{
        Pass,
        PassOptions,
        PassResults,
    },
    Function,
};

pub trait FunctionPass: Pass {
    /// Runs the pass on `function`, returning whether it changed anything.
    fn run_on_function(
        &mut self,
        function: &mut Function,
        options: &PassOptions,
        results: &mut PassResults,
    ) -> Result<bool, GraphError>;
}
