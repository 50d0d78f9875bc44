//! Backward, memoized descent shared by every strategy.

use log::{debug, error, trace, warn};

use super::context::{EvaluationContext, LambdaFrame};
use super::strategy::Strategy;
use crate::actor::{BlockPolicy, EvalSignal, NodeEvent};
use crate::config::EvalOptions;
use crate::error::{DataflowError, EvaluationFailure};
use crate::graph::{Dataflow, GraphId, VertexId};
use crate::model::{SubDataflow, Value};

/// Handle on an in-flight evaluation.
///
/// The engine walks the graph through it, and actors receive it in `eval()`
/// to query where they run or to call lambda tokens.
pub struct EvalScope<'a> {
    graph: &'a mut Dataflow,
    ctx: &'a mut EvaluationContext,
    strategy: Strategy,
    options: EvalOptions,
    current: Option<VertexId>,
}

impl<'a> EvalScope<'a> {
    pub(crate) fn new(
        graph: &'a mut Dataflow,
        ctx: &'a mut EvaluationContext,
        strategy: Strategy,
        options: EvalOptions,
    ) -> Self {
        Self {
            graph,
            ctx,
            strategy,
            options,
            current: None,
        }
    }

    /// Vertex whose `eval()` is running.
    pub fn vertex(&self) -> Option<VertexId> {
        self.current
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph.id()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    /// Call a lambda token with `args`.
    ///
    /// A free variable returns its first argument. A token produced by a
    /// vertex re-runs that vertex in sub-dataflow mode with `args` as context
    /// and returns the value of the token's output.
    pub fn call(&mut self, token: &SubDataflow, args: Vec<Value>) -> Result<Value, DataflowError> {
        let Some(origin) = token.origin() else {
            return args
                .into_iter()
                .next()
                .ok_or(DataflowError::InsufficientContext);
        };
        if self.strategy != Strategy::Lambda {
            return Err(DataflowError::invalid(format!(
                "lambda calls are not supported by the {} strategy",
                self.strategy
            )));
        }
        if origin.graph != self.graph.id() {
            return Err(DataflowError::invalid(format!(
                "lambda of vertex {} belongs to another graph",
                origin.vertex
            )));
        }

        trace!("Calling lambda {}.{} with {} argument(s)", origin.vertex, origin.output, args.len());
        let caller = std::mem::replace(&mut self.ctx.lambda, LambdaFrame::begin(args));
        self.ctx.forget_resolution_nodes();
        let result = self.eval_vertex(origin.vertex, true);
        self.ctx.lambda = caller;
        result?;
        self.graph.actor(origin.vertex)?.get_output(origin.output)
    }

    /// Call `function` if it holds a lambda token.
    pub fn call_value(&mut self, function: &Value, args: Vec<Value>) -> Result<Value, DataflowError> {
        match function {
            Value::Deferred(token) => self.call(token, args),
            other => Err(DataflowError::invalid(format!(
                "a {} value is not callable",
                other.type_name()
            ))),
        }
    }

    /// Sinks ordered for this strategy, or just the requested target.
    pub(crate) fn roots(
        &self,
        target: Option<VertexId>,
        prioritized: bool,
    ) -> Result<Vec<VertexId>, DataflowError> {
        if let Some(vid) = target {
            if !self.graph.has_vertex(vid) {
                return Err(DataflowError::UnknownVertex(vid));
            }
            return Ok(vec![vid]);
        }
        let mut roots = self.graph.roots()?;
        if prioritized {
            self.graph.sort_by_priority(&mut roots);
        }
        Ok(roots)
    }

    /// Already evaluated in this pass, or frozen by its block policy.
    pub(crate) fn is_stopped(&self, vid: VertexId) -> Result<bool, DataflowError> {
        if self.ctx.evaluated.contains(&vid) {
            return Ok(true);
        }
        let actor = self.graph.actor(vid)?;
        Ok(match actor.block_policy() {
            None => false,
            Some(BlockPolicy::Always) => true,
            Some(BlockPolicy::WhenComputed) => actor.has_output(),
        })
    }

    /// Evaluate `vid` after every producer it depends on.
    ///
    /// `transmit` tells whether the current lambda bindings are visible: they
    /// are not propagated through function-typed ports.
    pub(crate) fn eval_vertex(&mut self, vid: VertexId, transmit: bool) -> Result<(), DataflowError> {
        if self.is_stopped(vid)? {
            return Ok(());
        }
        // Marked before descending so a cycle ends here instead of recursing.
        self.ctx.evaluated.insert(vid);
        self.ctx.active.push(vid);
        let result = self.gather_and_eval(vid, transmit);
        self.ctx.active.pop();
        result?;
        self.ctx.visited.push(vid);
        Ok(())
    }

    fn gather_and_eval(&mut self, vid: VertexId, transmit: bool) -> Result<(), DataflowError> {
        let mut use_lambda = false;
        let in_ports = self.graph.store().in_ports(vid)?.to_vec();

        for pid in in_ports {
            let index = self.graph.store().local_id(pid)?;
            let interface = self.graph.actor(vid)?.input_interface(index);
            let transmit_port = transmit && !interface.is_function();
            let parents = self.graph.parent_ports(pid)?;
            let mut inputs = Vec::with_capacity(parents.len());

            for (npid, nvid) in parents {
                if self.ctx.active.contains(&nvid) {
                    if self.options.strict_cycles {
                        return Err(DataflowError::CycleDetected(nvid));
                    }
                    debug!("Vertex {} reads the previous output of {} (cycle)", vid, nvid);
                }
                if !self.is_stopped(nvid)? {
                    self.eval_vertex(nvid, transmit_port)?;
                }

                let mut value = self
                    .graph
                    .actor(nvid)?
                    .get_output(self.graph.store().local_id(npid)?)?;
                if self.strategy == Strategy::Lambda && !interface.is_function() {
                    if let Value::Deferred(token) = &value {
                        if transmit && self.ctx.lambda.is_resolving() {
                            value = self.ctx.lambda.resolve(token)?;
                        } else {
                            use_lambda = true;
                            self.ctx.resolution_nodes.insert(vid);
                        }
                    }
                }
                inputs.push(value);
            }

            let value = match inputs.len() {
                0 => continue,
                1 => inputs.remove(0),
                _ => Value::List(inputs),
            };
            self.graph.actor_mut(vid)?.set_input(index, value)?;
        }

        if use_lambda {
            trace!("Vertex {} is a lambda producer", vid);
            let graph_id = self.graph.id();
            let actor = self.graph.actor_mut(vid)?;
            for i in 0..actor.nb_outputs() {
                actor.set_output(i, Value::Deferred(SubDataflow::new(graph_id, vid, i)))?;
            }
            return Ok(());
        }

        match self.strategy {
            Strategy::DiscreteTime => self.eval_timed(vid),
            _ => {
                let signal = self.eval_vertex_code(vid)?;
                if signal.is_truthy() {
                    self.ctx.reeval = true;
                }
                Ok(())
            }
        }
    }

    /// Discrete-time evaluation of one vertex: a vertex still waiting on the
    /// clock is skipped; a vertex whose delay elapsed and that does not ask
    /// for another one stops the run.
    fn eval_timed(&mut self, vid: VertexId) -> Result<(), DataflowError> {
        let mut delay = 0;
        let mut finished = false;
        if let Some(&remaining) = self.ctx.clock.timed.get(&vid) {
            if remaining <= 0 {
                self.ctx.clock.timed.remove(&vid);
                finished = true;
            } else {
                delay = remaining;
            }
        }
        if delay == 0 {
            delay = i64::from(self.eval_vertex_code(vid)?.delay());
        }

        if delay > 0 {
            self.ctx.clock.timed.insert(vid, delay);
            self.ctx.reeval = true;
        } else if finished {
            self.ctx.clock.stop = true;
            self.ctx.clock.to_reset.push(vid);
        }
        Ok(())
    }

    /// Run the actor of `vid` and record the outcome on it.
    pub(crate) fn eval_vertex_code(&mut self, vid: VertexId) -> Result<EvalSignal, DataflowError> {
        trace!("Evaluating vertex {}", vid);
        let mut actor = self.graph.take_actor(vid)?;
        let previous = self.current.replace(vid);
        let result = actor.eval(self);
        self.current = previous;

        let state = actor.state_mut();
        state.raise_exception = result.is_err();
        if result.is_ok() {
            state.modified = false;
        }
        actor.notify_listeners(&NodeEvent::DataModified);
        self.graph.restore_actor(vid, actor);

        result.map_err(|err| {
            let failure = match err.downcast::<DataflowError>() {
                Ok(DataflowError::Evaluation(inner)) => inner.retag(vid),
                Ok(other) => EvaluationFailure::new(vid, anyhow::Error::new(other)),
                Err(err) => EvaluationFailure::new(vid, err),
            };
            error!("{}", failure);
            DataflowError::Evaluation(Box::new(failure))
        })
    }

    /// Script of the dependency closure of `vid`, producers first.
    pub(crate) fn script_vertex(&mut self, vid: VertexId) -> Result<String, DataflowError> {
        if self.is_stopped(vid)? {
            return Ok(String::new());
        }
        self.ctx.evaluated.insert(vid);

        let mut script = String::new();
        let in_ports = self.graph.store().in_ports(vid)?.to_vec();
        for pid in in_ports {
            for (_, nvid) in self.graph.parent_ports(pid)? {
                if !self.is_stopped(nvid)? {
                    script.push_str(&self.script_vertex(nvid)?);
                }
            }
        }
        script.push_str(&self.graph.actor(vid)?.to_script());
        self.ctx.visited.push(vid);
        Ok(script)
    }

    /// Reset the vertices the discrete-time scheduler left pending.
    pub(crate) fn reset_pending(&mut self) {
        let mut pending = std::mem::take(&mut self.ctx.clock.to_reset);
        pending.extend(std::mem::take(&mut self.ctx.clock.timed).into_keys());
        for vid in pending {
            match self.graph.actor_mut(vid) {
                Ok(actor) => actor.reset(),
                Err(e) => warn!("Cannot reset vertex {}: {}", vid, e),
            }
        }
    }

    pub(crate) fn ctx(&mut self) -> &mut EvaluationContext {
        self.ctx
    }
}
