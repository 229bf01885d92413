//! A World owns everything a sequence of programs shares: the interner, the store and the
//! environments, so definitions made by one program are visible to the next.

use lasso::Rodeo;

use crate::{
    compiler::{
        ast::{Exp, Name},
        lower::{lower_module, LowerError},
    },
    general_parser::{general_parse, ParseError},
    runtime::{
        environment::{EnvId, Environments},
        interpreter::Interpreter,
        store::Store,
        EvalError,
    },
    value::{Value, ValueDisplay},
};

pub mod fuel;
pub mod value;

use fuel::Fuel;

#[derive(Debug, Clone)]
pub struct Config {
    /// Evaluation steps each program may take, unbounded if `None`
    pub fuel: Option<i32>,
    /// How deeply evaluation may nest before failing with [`EvalError::RecursionLimit`],
    /// unbounded if `None`
    pub max_depth: Option<usize>,
    /// Whether identifiers are case-folded when no directive says otherwise
    pub fold_case: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fuel: None,
            max_depth: None,
            fold_case: false,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum WorldError {
    #[error("{}", display_parse_errors(.0))]
    Parse(Vec<ParseError>),
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

fn display_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Default)]
pub struct World {
    /// interner
    rodeo: Rodeo,
    store: Store,
    environments: Environments,
    config: Config,
    fuel: Option<Fuel>,
}

impl World {
    pub fn new(config: Config) -> Self {
        Self {
            fuel: config.fuel.map(Fuel::with),
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parses and lowers `source` without running it.
    pub fn parse(&mut self, source: &str) -> Result<Vec<Exp>, WorldError> {
        let gast = general_parse(source);
        if !gast.errors().is_empty() {
            return Err(WorldError::Parse(gast.errors().to_vec()));
        }
        Ok(lower_module(
            &gast.module(),
            &mut self.rodeo,
            self.config.fold_case,
        )?)
    }

    /// Runs `program` against the global environment and store of this world.
    pub fn evaluate_program(&mut self, program: &[Exp]) -> Result<Value, EvalError> {
        let _span = tracing::debug_span!("program", forms = program.len()).entered();
        let mut interpreter =
            Interpreter::new(&mut self.store, &mut self.environments, &self.rodeo);
        if let Some(max_depth) = self.config.max_depth {
            interpreter = interpreter.with_max_depth(max_depth);
        }
        if let (Some(fuel), Some(max)) = (self.fuel.as_mut(), self.config.fuel) {
            // every program starts with a full tank, whatever the last one overspent
            fuel.set_remaining(max);
            interpreter = interpreter.with_fuel(fuel);
        }

        let result = interpreter.run(program);
        match &result {
            Ok(_) => tracing::debug!(cells = self.store.len(), "program finished"),
            Err(err) => tracing::debug!(%err, "program failed"),
        }
        result
    }

    pub fn eval_source(&mut self, source: &str) -> Result<Value, WorldError> {
        let program = self.parse(source)?;
        Ok(self.evaluate_program(&program)?)
    }

    pub fn intern(&mut self, name: &str) -> Name {
        Name::from(self.rodeo.get_or_intern(name))
    }

    pub fn resolve_name(&self, name: Name) -> &str {
        self.rodeo.resolve(&name.spur())
    }

    pub fn display<'a>(&'a self, value: &'a Value) -> ValueDisplay<'a> {
        value.display(&self.rodeo)
    }

    /// The current value of a global variable
    pub fn global(&self, name: &str) -> Option<&Value> {
        let name = Name::from(self.rodeo.get(name)?);
        let address = self.environments.resolve_address(EnvId::Global, name).ok()?;
        self.store.read(address).ok()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn environments(&self) -> &Environments {
        &self.environments
    }

    /// Fuel left over from the last program, if fuel is limited
    pub fn remaining_fuel(&self) -> Option<i32> {
        self.fuel.as_ref().map(Fuel::remaining)
    }
}
