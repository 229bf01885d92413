//! A direct tree-walking interpreter over [`Exp`]
//!
//! Every binding the interpreter introduces (parameters, `let`, `define`) gets a fresh cell in
//! the [`Store`], and environments only ever map names to the addresses of those cells. This is
//! what makes `set!` visible to every closure sharing a binding.
use std::rc::Rc;

use lasso::Rodeo;

use crate::{
    compiler::ast::{App, Define, Exp, If, Let, Set},
    runtime::{
        environment::{EnvId, Environments, UnboundVariable},
        stack::ensure_sufficient_stack,
        store::{Address, Store},
        Arity, Closure, EvalError, Procedure,
    },
    value::Value,
    world::fuel::{count_fuel, Fuel},
};

pub struct Interpreter<'w> {
    store: &'w mut Store,
    environments: &'w mut Environments,
    rodeo: &'w Rodeo,
    fuel: Option<&'w mut Fuel>,
    depth: usize,
    max_depth: Option<usize>,
}

impl<'w> Interpreter<'w> {
    pub fn new(
        store: &'w mut Store,
        environments: &'w mut Environments,
        rodeo: &'w Rodeo,
    ) -> Self {
        Self {
            store,
            environments,
            rodeo,
            fuel: None,
            depth: 0,
            max_depth: None,
        }
    }

    /// Fails with [`EvalError::RecursionLimit`] once `eval` calls nest deeper than `max_depth`.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Bounds the number of evaluation steps by `fuel`.
    pub fn with_fuel(mut self, fuel: &'w mut Fuel) -> Self {
        self.fuel = Some(fuel);
        self
    }

    /// Evaluates `program` in the global environment.
    pub fn run(&mut self, program: &[Exp]) -> Result<Value, EvalError> {
        self.eval_sequence(program, EnvId::Global)
    }

    pub fn eval(&mut self, exp: &Exp, env: EnvId) -> Result<Value, EvalError> {
        if let Some(fuel) = self.fuel.as_deref_mut() {
            if !fuel.should_continue() {
                return Err(EvalError::OutOfFuel);
            }
            fuel.consume(1);
        }
        if let Some(max_depth) = self.max_depth {
            if self.depth >= max_depth {
                return Err(EvalError::RecursionLimit(max_depth));
            }
        }

        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.eval_exp(exp, env));
        self.depth -= 1;
        result
    }

    fn eval_exp(&mut self, exp: &Exp, env: EnvId) -> Result<Value, EvalError> {
        match exp {
            Exp::Number(n) => Ok(Value::Number(*n)),
            Exp::Bool(b) => Ok(Value::Bool(*b)),
            Exp::String(s) => Ok(Value::String(Rc::clone(s))),
            Exp::Char(c) => Ok(Value::Char(*c)),
            Exp::Quote(value) => Ok(value.clone()),
            Exp::PrimOp(op) => Ok(Value::Procedure(Procedure::Primitive(*op))),
            Exp::Var(name) => {
                let address = self
                    .environments
                    .resolve_address(env, *name)
                    .map_err(|err| self.unbound(err))?;
                Ok(self.store.read(address)?.clone())
            }
            Exp::If(if_exp) => self.eval_if(if_exp, env),
            Exp::Lambda(lambda) => Ok(Value::Procedure(Procedure::Closure(Rc::new(Closure {
                lambda: Rc::clone(lambda),
                env,
            })))),
            Exp::App(app) => self.eval_app(app, env),
            Exp::Let(let_exp) => self.eval_let(let_exp, env),
            Exp::Set(set) => self.eval_set(set, env),
            // outside of a sequence there is nowhere to continue with the new binding,
            // so only a global definition is observable
            Exp::Define(define) => {
                self.define(define, env)?;
                Ok(Value::Void)
            }
        }
    }

    /// Evaluates `body` left to right, threading the environment through definitions.
    ///
    /// The value of the last form is the value of the sequence (`void` if it is a definition).
    pub fn eval_sequence(&mut self, body: &[Exp], env: EnvId) -> Result<Value, EvalError> {
        let Some((last, init)) = body.split_last() else {
            return Err(EvalError::EmptyProgram);
        };

        let mut env = env;
        for exp in init {
            match exp {
                Exp::Define(define) => env = self.define(define, env)?,
                exp => {
                    self.eval(exp, env)?;
                }
            }
        }

        match last {
            Exp::Define(define) => {
                self.define(define, env)?;
                Ok(Value::Void)
            }
            exp => self.eval(exp, env),
        }
    }

    /// Binds the value of `define` in `env`, returning the environment following forms see.
    fn define(&mut self, define: &Define, env: EnvId) -> Result<EnvId, EvalError> {
        let value = self.eval(&define.value, env)?;
        let address = self.store.allocate(value);
        if env.is_global() {
            self.environments.extend_global(define.name, address);
            Ok(env)
        } else {
            Ok(self.environments.extend(&[define.name], &[address], env))
        }
    }

    fn eval_if(&mut self, if_exp: &If, env: EnvId) -> Result<Value, EvalError> {
        if self.eval(&if_exp.test, env)?.is_true() {
            self.eval(&if_exp.then, env)
        } else {
            match &if_exp.alt {
                Some(alt) => self.eval(alt, env),
                None => Ok(Value::Void),
            }
        }
    }

    fn eval_app(&mut self, app: &App, env: EnvId) -> Result<Value, EvalError> {
        let operator = self.eval(&app.operator, env)?;
        let mut args = Vec::with_capacity(app.operands.len());
        for operand in app.operands.iter() {
            args.push(self.eval(operand, env)?);
        }
        self.apply(operator, args)
    }

    pub fn apply(&mut self, operator: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match operator {
            Value::Procedure(Procedure::Primitive(op)) => {
                if let Some(fuel) = self.fuel.as_deref_mut() {
                    fuel.consume(count_fuel(1, args.len()));
                }
                Ok(op.apply(&args)?)
            }
            Value::Procedure(Procedure::Closure(closure)) => self.apply_closure(&closure, args),
            other => Err(EvalError::BadProcedure(Box::from(
                other.display(self.rodeo).to_string(),
            ))),
        }
    }

    fn apply_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, EvalError> {
        let params = &closure.lambda.params;
        if params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                expected: Arity::Exact(params.len()),
                got: args.len(),
            });
        }

        let addresses = self.allocate_all(args);
        let env = self.environments.extend(params, &addresses, closure.env);
        self.eval_sequence(&closure.lambda.body, env)
    }

    fn eval_let(&mut self, let_exp: &Let, env: EnvId) -> Result<Value, EvalError> {
        // every initialiser runs in the outer environment, before anything is allocated
        let mut values = Vec::with_capacity(let_exp.bindings.len());
        for binding in let_exp.bindings.iter() {
            values.push(self.eval(&binding.init, env)?);
        }

        let names: Vec<_> = let_exp.bindings.iter().map(|b| b.name).collect();
        let addresses = self.allocate_all(values);
        let env = self.environments.extend(&names, &addresses, env);
        self.eval_sequence(&let_exp.body, env)
    }

    fn eval_set(&mut self, set: &Set, env: EnvId) -> Result<Value, EvalError> {
        let address = self.environments.resolve_address(env, set.name);
        // the right hand side runs even when the variable is unbound
        let value = self.eval(&set.value, env);
        let address = address.map_err(|err| self.unbound(err))?;
        self.store.write(address, value?);
        Ok(Value::Void)
    }

    fn allocate_all(&mut self, values: Vec<Value>) -> Vec<Address> {
        values
            .into_iter()
            .map(|value| self.store.allocate(value))
            .collect()
    }

    fn unbound(&self, UnboundVariable(name): UnboundVariable) -> EvalError {
        EvalError::UnboundVariable(Box::from(self.rodeo.resolve(&name.spur())))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use assert2::{check, let_assert};
    use lasso::Rodeo;

    use super::Interpreter;
    use crate::{
        compiler::ast::{App, Binding, Define, Exp, If, Lambda, Let, Name, Set},
        runtime::{
            environment::{EnvId, Environments},
            primitives::PrimOp,
            store::{Address, Store},
            Arity, EvalError,
        },
        value::Value,
        world::fuel::Fuel,
    };

    struct Harness {
        store: Store,
        environments: Environments,
        rodeo: Rodeo,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Store::new(),
                environments: Environments::new(),
                rodeo: Rodeo::default(),
            }
        }

        fn name(&mut self, name: &str) -> Name {
            Name::from(self.rodeo.get_or_intern(name))
        }

        fn run(&mut self, program: &[Exp]) -> Result<Value, EvalError> {
            Interpreter::new(&mut self.store, &mut self.environments, &self.rodeo).run(program)
        }
    }

    fn app(operator: Exp, operands: impl IntoIterator<Item = Exp>) -> Exp {
        Exp::App(Box::new(App {
            operator,
            operands: operands.into_iter().collect(),
        }))
    }

    fn lambda(params: &[Name], body: impl IntoIterator<Item = Exp>) -> Exp {
        Exp::Lambda(Rc::new(Lambda {
            params: params.into(),
            body: body.into_iter().collect(),
            name: None,
        }))
    }

    fn define(name: Name, value: Exp) -> Exp {
        Exp::Define(Box::new(Define { name, value }))
    }

    fn set(name: Name, value: Exp) -> Exp {
        Exp::Set(Box::new(Set { name, value }))
    }

    #[test]
    fn empty_program() {
        let mut h = Harness::new();
        check!(h.run(&[]) == Err(EvalError::EmptyProgram));
    }

    #[test]
    fn literals() {
        let mut h = Harness::new();
        check!(h.run(&[Exp::Number(3)]) == Ok(Value::Number(3)));
        check!(h.run(&[Exp::Bool(false)]) == Ok(Value::Bool(false)));
        check!(h.run(&[Exp::Char('x')]) == Ok(Value::Char('x')));
        check!(h.run(&[Exp::String(Rc::from("hi"))]) == Ok(Value::String(Rc::from("hi"))));
        check!(h.run(&[Exp::Quote(Value::Null)]) == Ok(Value::Null));
    }

    #[test]
    fn define_then_reference() {
        let mut h = Harness::new();
        let x = h.name("x");
        check!(h.run(&[define(x, Exp::Number(5)), Exp::Var(x)]) == Ok(Value::Number(5)));
        // the definition stays in the global frame for later programs
        check!(h.run(&[Exp::Var(x)]) == Ok(Value::Number(5)));
        check!(h.store.len() == 1);
    }

    #[test]
    fn trailing_define_is_void() {
        let mut h = Harness::new();
        let x = h.name("x");
        check!(h.run(&[define(x, Exp::Number(5))]) == Ok(Value::Void));
    }

    #[test]
    fn set_replaces_the_cell() {
        let mut h = Harness::new();
        let x = h.name("x");
        let program = [define(x, Exp::Number(5)), set(x, Exp::Number(6)), Exp::Var(x)];
        check!(h.run(&program) == Ok(Value::Number(6)));
        check!(h.store.len() == 1);
    }

    #[test]
    fn set_parameter() {
        let mut h = Harness::new();
        let a = h.name("a");
        let body = [
            set(a, app(Exp::PrimOp(PrimOp::Add), [Exp::Var(a), Exp::Number(1)])),
            Exp::Var(a),
        ];
        let program = [app(lambda(&[a], body), [Exp::Number(10)])];
        check!(h.run(&program) == Ok(Value::Number(11)));
    }

    #[test]
    fn set_unbound_still_evaluates_value() {
        let mut h = Harness::new();
        let [x, y, nope] = [h.name("x"), h.name("y"), h.name("nope")];
        // (set! nope (set! x 1)) assigns x before reporting nope
        let program = [
            define(x, Exp::Number(0)),
            set(nope, set(x, Exp::Number(1))),
        ];
        check!(h.run(&program) == Err(EvalError::UnboundVariable(Box::from("nope"))));
        check!(h.run(&[Exp::Var(x)]) == Ok(Value::Number(1)));

        // when both sides fail the unbound target wins
        let program = [set(nope, Exp::Var(y))];
        check!(h.run(&program) == Err(EvalError::UnboundVariable(Box::from("nope"))));
    }

    #[test]
    fn set_reports_value_errors() {
        let mut h = Harness::new();
        let [x, y] = [h.name("x"), h.name("y")];
        let program = [define(x, Exp::Number(1)), set(x, Exp::Var(y))];
        check!(h.run(&program) == Err(EvalError::UnboundVariable(Box::from("y"))));
    }

    #[test]
    fn set_is_seen_by_closures() {
        let mut h = Harness::new();
        let [counter, get] = [h.name("counter"), h.name("get")];
        let program = [
            define(counter, Exp::Number(0)),
            define(get, lambda(&[], [Exp::Var(counter)])),
            set(counter, Exp::Number(41)),
            app(Exp::Var(get), []),
        ];
        check!(h.run(&program) == Ok(Value::Number(41)));
    }

    #[test]
    fn nested_let_shadows() {
        let mut h = Harness::new();
        let x = h.name("x");
        let inner = Exp::Let(Box::new(Let {
            bindings: Box::new([Binding {
                name: x,
                init: Exp::Number(2),
            }]),
            body: Box::new([Exp::Var(x)]),
        }));
        let outer = Exp::Let(Box::new(Let {
            bindings: Box::new([Binding {
                name: x,
                init: Exp::Number(1),
            }]),
            body: Box::new([
                app(Exp::PrimOp(PrimOp::List), [inner, Exp::Var(x)]),
            ]),
        }));
        check!(h.run(&[outer]) == Ok(Value::list([Value::Number(2), Value::Number(1)])));
    }

    #[test]
    fn let_initialisers_see_the_outer_environment() {
        let mut h = Harness::new();
        let [x, y] = [h.name("x"), h.name("y")];
        let program = [
            define(x, Exp::Number(1)),
            Exp::Let(Box::new(Let {
                bindings: Box::new([
                    Binding {
                        name: x,
                        init: Exp::Number(10),
                    },
                    Binding {
                        name: y,
                        init: Exp::Var(x),
                    },
                ]),
                body: Box::new([Exp::Var(y)]),
            })),
        ];
        check!(h.run(&program) == Ok(Value::Number(1)));
    }

    #[test]
    fn failing_let_allocates_nothing() {
        let mut h = Harness::new();
        let [x, missing] = [h.name("x"), h.name("missing")];
        let program = [Exp::Let(Box::new(Let {
            bindings: Box::new([
                Binding {
                    name: x,
                    init: Exp::Number(1),
                },
                Binding {
                    name: x,
                    init: Exp::Var(missing),
                },
            ]),
            body: Box::new([Exp::Var(x)]),
        }))];
        check!(h.run(&program).is_err());
        check!(h.store.is_empty());
        check!(h.environments.frame_count() == 0);
    }

    #[test]
    fn unbound_variable() {
        let mut h = Harness::new();
        let nope = h.name("nope");
        check!(h.run(&[Exp::Var(nope)]) == Err(EvalError::UnboundVariable(Box::from("nope"))));
    }

    #[test]
    fn if_evaluates_one_branch() {
        let mut h = Harness::new();
        let missing = h.name("missing");
        let if_exp = |test| {
            Exp::If(Box::new(If {
                test,
                then: Exp::Number(1),
                alt: Some(Exp::Var(missing)),
            }))
        };
        check!(h.run(&[if_exp(Exp::Number(0))]) == Ok(Value::Number(1)));
        check!(h.run(&[if_exp(Exp::Quote(Value::Null))]) == Ok(Value::Number(1)));
        check!(h.run(&[if_exp(Exp::Bool(false))]).is_err());

        let no_alt = Exp::If(Box::new(If {
            test: Exp::Bool(false),
            then: Exp::Number(1),
            alt: None,
        }));
        check!(h.run(&[no_alt]) == Ok(Value::Void));
    }

    #[test]
    fn bad_procedure() {
        let mut h = Harness::new();
        let program = [app(Exp::Number(1), [Exp::Number(2)])];
        check!(h.run(&program) == Err(EvalError::BadProcedure(Box::from("1"))));
    }

    #[test]
    fn operands_are_not_evaluated_after_a_failure() {
        let mut h = Harness::new();
        let [x, missing] = [h.name("x"), h.name("missing")];
        let program = [
            define(x, Exp::Number(0)),
            app(
                Exp::PrimOp(PrimOp::Add),
                [Exp::Var(missing), set(x, Exp::Number(1))],
            ),
        ];
        check!(h.run(&program).is_err());
        check!(h.run(&[Exp::Var(x)]) == Ok(Value::Number(0)));
    }

    #[test]
    fn closure_arity_is_checked_before_allocation() {
        let mut h = Harness::new();
        let a = h.name("a");
        let program = [app(lambda(&[a], [Exp::Var(a)]), [])];
        check!(
            h.run(&program)
                == Err(EvalError::ArityMismatch {
                    expected: Arity::Exact(1),
                    got: 0
                })
        );
        check!(h.store.is_empty());
    }

    #[test]
    fn parameters_get_contiguous_cells() {
        let mut h = Harness::new();
        let [a, b, c] = [h.name("a"), h.name("b"), h.name("c")];
        let body = [app(Exp::PrimOp(PrimOp::List), [Exp::Var(c), Exp::Var(b), Exp::Var(a)])];
        let program = [app(
            lambda(&[a, b, c], body),
            [Exp::Number(1), Exp::Number(2), Exp::Number(3)],
        )];
        check!(h.run(&program) == Ok(Value::list([3, 2, 1].map(Value::Number))));
        let_assert!(
            Ok(cells) = (0..3usize)
                .map(|i| h.store.read(Address::from(i)).cloned())
                .collect::<Result<Vec<_>, _>>()
        );
        check!(cells == [1, 2, 3].map(Value::Number));
    }

    #[test]
    fn nested_define_extends_locally() {
        let mut h = Harness::new();
        let [f, x, y] = [h.name("f"), h.name("x"), h.name("y")];
        let body = [
            define(y, app(Exp::PrimOp(PrimOp::Mul), [Exp::Var(x), Exp::Number(2)])),
            app(Exp::PrimOp(PrimOp::Add), [Exp::Var(y), Exp::Number(1)]),
        ];
        let program = [
            define(f, lambda(&[x], body)),
            app(Exp::Var(f), [Exp::Number(20)]),
        ];
        check!(h.run(&program) == Ok(Value::Number(41)));
        // `y` never reached the global frame
        check!(h.run(&[Exp::Var(y)]) == Err(EvalError::UnboundVariable(Box::from("y"))));
    }

    #[test]
    fn global_recursion() {
        let mut h = Harness::new();
        let [fact, n] = [h.name("fact"), h.name("n")];
        let body = [Exp::If(Box::new(If {
            test: app(Exp::PrimOp(PrimOp::NumEq), [Exp::Var(n), Exp::Number(0)]),
            then: Exp::Number(1),
            alt: Some(app(
                Exp::PrimOp(PrimOp::Mul),
                [
                    Exp::Var(n),
                    app(
                        Exp::Var(fact),
                        [app(Exp::PrimOp(PrimOp::Sub), [Exp::Var(n), Exp::Number(1)])],
                    ),
                ],
            )),
        }))];
        let program = [
            define(fact, lambda(&[n], body)),
            app(Exp::Var(fact), [Exp::Number(10)]),
        ];
        check!(h.run(&program) == Ok(Value::Number(3_628_800)));
    }

    #[test]
    fn recursion_limit() {
        let mut h = Harness::new();
        let f = h.name("f");
        let program = [
            define(f, lambda(&[], [app(Exp::Var(f), [])])),
            app(Exp::Var(f), []),
        ];
        let result = Interpreter::new(&mut h.store, &mut h.environments, &h.rodeo)
            .with_max_depth(256)
            .run(&program);
        check!(result == Err(EvalError::RecursionLimit(256)));
        // the depth counter unwinds with the error
        check!(h.run(&[Exp::Number(1)]) == Ok(Value::Number(1)));
    }

    #[test]
    fn deep_recursion_without_a_limit() {
        let mut h = Harness::new();
        let [down, n] = [h.name("down"), h.name("n")];
        // (define (down n) (if (= n 0) 0 (+ 1 (down (- n 1)))))
        let body = [Exp::If(Box::new(If {
            test: app(Exp::PrimOp(PrimOp::NumEq), [Exp::Var(n), Exp::Number(0)]),
            then: Exp::Number(0),
            alt: Some(app(
                Exp::PrimOp(PrimOp::Add),
                [
                    Exp::Number(1),
                    app(
                        Exp::Var(down),
                        [app(Exp::PrimOp(PrimOp::Sub), [Exp::Var(n), Exp::Number(1)])],
                    ),
                ],
            )),
        }))];
        let program = [
            define(down, lambda(&[n], body)),
            app(Exp::Var(down), [Exp::Number(20_000)]),
        ];
        check!(h.run(&program) == Ok(Value::Number(20_000)));
    }

    #[test]
    fn out_of_fuel() {
        let mut h = Harness::new();
        let mut fuel = Fuel::with(3);
        let program = [app(
            Exp::PrimOp(PrimOp::Add),
            [Exp::Number(1), Exp::Number(2), Exp::Number(3)],
        )];
        let_assert!(
            Err(EvalError::OutOfFuel) =
                Interpreter::new(&mut h.store, &mut h.environments, &h.rodeo)
                    .with_fuel(&mut fuel)
                    .run(&program)
        );

        let mut fuel = Fuel::with(100);
        let result = Interpreter::new(&mut h.store, &mut h.environments, &h.rodeo)
            .with_fuel(&mut fuel)
            .run(&program);
        check!(result == Ok(Value::Number(6)));
        // five evaluation steps, then one unit per primitive argument
        check!(fuel.remaining() == 100 - 5 - 3);
    }
}
