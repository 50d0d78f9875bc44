//! Command line runner: instantiates a composite factory read from a JSON
//! file and evaluates it.
//!
//! ```text
//! dataflow-cli <factory.json> [--strategy NAME] [--target ID]
//!              [--context JSON_ARRAY] [--config FILE] [--save-config]
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::actor::Actor;
use crate::composite::CompositeNodeFactory;
use crate::config::{load_settings, save_settings, EngineSettings};
use crate::error::DataflowError;
use crate::evaluation::{EvalRequest, Evaluator, Strategy};
use crate::graph::VertexId;
use crate::model::Value;
use crate::nodes::builtin_registry;
use crate::util::timing::measure_debug;

#[derive(Debug, Default, PartialEq)]
pub struct CliOptions {
    pub graph: PathBuf,
    pub strategy: Option<Strategy>,
    pub target: Option<VertexId>,
    pub context: Vec<Value>,
    pub config: Option<PathBuf>,
    pub save_config: bool,
}

impl CliOptions {
    /// Parse `args`, program name included.
    pub fn parse(args: &[String]) -> Result<Self, DataflowError> {
        let mut options = CliOptions::default();
        let mut graph = None;
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| DataflowError::invalid(format!("{} expects a value", flag)))
            };
            let flag = arg.as_str();
            match flag {
                "--strategy" => options.strategy = Some(value(flag)?.parse()?),
                "--target" => {
                    let raw = value(flag)?;
                    let id = raw
                        .parse()
                        .map_err(|_| DataflowError::invalid(format!("bad vertex id '{}'", raw)))?;
                    options.target = Some(VertexId(id));
                }
                "--context" => options.context = serde_json::from_str(&value(flag)?)?,
                "--config" => options.config = Some(PathBuf::from(value(flag)?)),
                "--save-config" => options.save_config = true,
                _ if flag.starts_with("--") => {
                    return Err(DataflowError::invalid(format!("unknown option {}", flag)));
                }
                path => graph = Some(PathBuf::from(path)),
            }
        }
        options.graph =
            graph.ok_or_else(|| DataflowError::invalid("please provide the path to a JSON factory"))?;
        Ok(options)
    }
}

#[derive(Serialize)]
struct Report {
    strategy: Strategy,
    visited: Vec<VertexId>,
    passes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cycles: Option<u64>,
    outputs: Vec<Value>,
}

/// Printable copy of a value; lambda tokens become their text form.
fn printable(value: Value) -> Value {
    match value {
        Value::Deferred(_) => Value::Text(value.to_string()),
        Value::List(items) => Value::List(items.into_iter().map(printable).collect()),
        other => other,
    }
}

pub fn run(args: Vec<String>) -> Result<(), DataflowError> {
    let options = CliOptions::parse(&args)?;
    let mut settings = match &options.config {
        Some(path) => EngineSettings::from_file(path)?,
        None => load_settings(),
    };
    if let Some(strategy) = options.strategy {
        settings.strategy = strategy;
    }

    let text = fs::read_to_string(&options.graph)?;
    let factory = CompositeNodeFactory::from_json(&text)?;
    let registry = builtin_registry();
    registry.register(Arc::new(factory.clone()));

    let mut node = measure_debug("instantiate", || {
        factory.instantiate_composite(&registry, &mut Vec::new())
    })?;
    node.apply_settings(&settings);
    info!(
        "Loaded {} with {} element(s), {} failed",
        factory.name,
        factory.elements.len(),
        node.error_nodes().len()
    );

    let target = options
        .target
        .or_else(|| (node.nb_outputs() > 0).then_some(node.id_out()));
    let request = EvalRequest {
        target,
        context: options.context.clone(),
        ..EvalRequest::default()
    };
    let mut evaluator = Evaluator::with_options(settings.strategy, settings.evaluation);
    let outcome = measure_debug("evaluate", || node.evaluate_with(&mut evaluator, request))?;

    if let Some(script) = &outcome.script {
        print!("{}", script);
    } else {
        let outputs = match options.target {
            Some(vid) => {
                let actor = node.node(vid)?;
                (0..actor.nb_outputs())
                    .map(|i| actor.get_output(i))
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => (0..node.nb_outputs())
                .map(|i| node.get_output(i))
                .collect::<Result<Vec<_>, _>>()?,
        };
        let report = Report {
            strategy: settings.strategy,
            visited: outcome.visited,
            passes: outcome.passes,
            cycles: (settings.strategy == Strategy::DiscreteTime).then_some(outcome.cycles),
            outputs: outputs.into_iter().map(printable).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if options.save_config {
        save_settings(&settings);
    }
    Ok(())
}
