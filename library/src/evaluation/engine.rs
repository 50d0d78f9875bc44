use log::{debug, warn};

use super::context::{EvaluationContext, LambdaFrame};
use super::scope::EvalScope;
use super::strategy::{EvalOutcome, EvalRequest, Strategy};
use crate::config::EvalOptions;
use crate::error::DataflowError;
use crate::graph::{Dataflow, VertexId};
use crate::util::timing::ScopedTimer;

/// Evaluates dataflows with one strategy.
///
/// The evaluator owns its [`EvaluationContext`]; it is reset at the start of
/// every top-level call except for what the strategy keeps on purpose
/// (vertices pending lambda resolution, the discrete-time clock in step mode).
pub struct Evaluator {
    strategy: Strategy,
    options: EvalOptions,
    ctx: EvaluationContext,
}

impl Evaluator {
    pub fn new(strategy: Strategy) -> Self {
        Self::with_options(strategy, EvalOptions::default())
    }

    pub fn with_options(strategy: Strategy, options: EvalOptions) -> Self {
        Self {
            strategy,
            options,
            ctx: EvaluationContext::new(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.ctx
    }

    pub fn evaluate(
        &mut self,
        graph: &mut Dataflow,
        request: EvalRequest,
    ) -> Result<EvalOutcome, DataflowError> {
        let _timer = self
            .options
            .log_timing
            .then(|| ScopedTimer::info(format!("{} evaluation of graph {}", self.strategy, graph.id())));
        debug!(
            "Evaluating graph {} ({} strategy, target {:?})",
            graph.id(),
            self.strategy,
            request.target
        );

        self.ctx.begin_run();
        let strategy = self.strategy;
        let mut scope = EvalScope::new(graph, &mut self.ctx, strategy, self.options);
        let mut outcome = EvalOutcome::default();
        match strategy {
            Strategy::Brute => run_brute(&mut scope, request.target)?,
            Strategy::Priority => run_priority(&mut scope, request.target, request.subdataflow)?,
            Strategy::Generator => run_generator(&mut scope, request.target)?,
            Strategy::DiscreteTime => {
                let (cycles, stopped) = run_discrete(&mut scope, request.target, request.step)?;
                outcome.cycles = cycles;
                outcome.stopped = stopped;
            }
            Strategy::Lambda => run_lambda(&mut scope, request)?,
            Strategy::Script => outcome.script = Some(run_script(&mut scope, request.target)?),
        }
        drop(scope);

        outcome.visited = std::mem::take(&mut self.ctx.visited);
        outcome.passes = self.ctx.passes;
        debug!(
            "Graph {} evaluated: {} vertices, {} pass(es)",
            graph.id(),
            outcome.visited.len(),
            outcome.passes
        );
        Ok(outcome)
    }
}

fn run_brute(scope: &mut EvalScope<'_>, target: Option<VertexId>) -> Result<(), DataflowError> {
    scope.ctx().clear();
    scope.ctx().passes += 1;
    for vid in scope.roots(target, false)? {
        scope.eval_vertex(vid, false)?;
    }
    Ok(())
}

fn run_priority(
    scope: &mut EvalScope<'_>,
    target: Option<VertexId>,
    subdataflow: bool,
) -> Result<(), DataflowError> {
    if subdataflow {
        scope.ctx().forget_resolution_nodes();
    } else {
        scope.ctx().clear();
    }
    scope.ctx().passes += 1;
    for vid in scope.roots(target, true)? {
        scope.eval_vertex(vid, true)?;
    }
    Ok(())
}

fn run_generator(scope: &mut EvalScope<'_>, target: Option<VertexId>) -> Result<(), DataflowError> {
    scope.ctx().clear();
    for vid in scope.roots(target, true)? {
        if scope.is_stopped(vid)? {
            continue;
        }
        scope.ctx().reeval = true;
        while scope.ctx().reeval {
            scope.ctx().clear();
            scope.ctx().passes += 1;
            scope.eval_vertex(vid, false)?;
        }
    }
    Ok(())
}

fn run_lambda(scope: &mut EvalScope<'_>, request: EvalRequest) -> Result<(), DataflowError> {
    scope.ctx().lambda = LambdaFrame::begin(request.context);
    let result = run_priority(scope, request.target, request.subdataflow);
    scope.ctx().lambda = LambdaFrame::default();
    if !request.subdataflow {
        scope.ctx().resolution_nodes.clear();
    }
    result
}

/// Returns the number of cycles run and whether the scheduler stopped.
fn run_discrete(
    scope: &mut EvalScope<'_>,
    target: Option<VertexId>,
    step: bool,
) -> Result<(u64, bool), DataflowError> {
    let result = discrete_passes(scope, target, step);
    if result.is_err() || !step {
        scope.ctx().clear_clock();
    }
    result
}

fn discrete_passes(
    scope: &mut EvalScope<'_>,
    target: Option<VertexId>,
    step: bool,
) -> Result<(u64, bool), DataflowError> {
    let max_cycles = u64::from(scope.options().max_cycles);
    scope.ctx().clear_cycle();

    for vid in scope.roots(target, true)? {
        if scope.is_stopped(vid)? {
            continue;
        }
        scope.ctx().reeval = true;
        while scope.ctx().reeval && !scope.ctx().clock.stop {
            scope.ctx().clear_cycle();
            scope.ctx().passes += 1;
            scope.eval_vertex(vid, false)?;
            scope.ctx().clock.next_step();

            if scope.ctx().clock.cycle >= max_cycles && !scope.ctx().clock.stop {
                warn!("Discrete-time evaluation stopped after {} cycles", max_cycles);
                scope.ctx().clock.stop = true;
            }
            if step {
                break;
            }
        }
    }

    let cycles = scope.ctx().clock.cycle;
    let stopped = scope.ctx().clock.stop;
    if stopped {
        scope.reset_pending();
    }
    Ok((cycles, stopped))
}

fn run_script(scope: &mut EvalScope<'_>, target: Option<VertexId>) -> Result<String, DataflowError> {
    scope.ctx().clear();
    scope.ctx().passes += 1;
    let mut script = String::new();
    for vid in scope.roots(target, false)? {
        script.push_str(&scope.script_vertex(vid)?);
    }
    Ok(script)
}
