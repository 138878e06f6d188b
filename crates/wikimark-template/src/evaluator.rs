/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template evaluation engine.
//!
//! This module implements the evaluation of parsed templates against a
//! context. Evaluation writes straight into an output buffer; the current
//! "dot" value starts as the context map and is rebound by `with`, `range`
//! and `template`.

use std::cell::Cell;

use tracing::trace;

use crate::ast::{
    Command, Conditional, Invoke, Literal, Operand, Output, Pipeline, Range, TemplateNode, With,
};
use crate::context::{TemplateContext, TemplateValue};
use crate::error::{TemplateError, TemplateResult};
use crate::funcs::call_builtin;
use crate::parser::Template;
use crate::registry::TemplateRegistry;

/// Maximum nesting of `{{ template }}` invocations before evaluation fails.
pub const MAX_TEMPLATE_DEPTH: usize = 50;

/// Maximum nesting of blocks and parenthesized pipelines in one template body.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Maximum nesting while rendering, counting bodies and parenthesized
/// pipelines across `{{ template }}` invocations.
pub const MAX_RENDER_NESTING: usize = 256;

impl Template {
    /// Render this template with the given context.
    ///
    /// Only built-in functions are available; use
    /// [`TemplateRegistry::render`] for helpers and sub-templates.
    pub fn render(&self, context: &TemplateContext) -> TemplateResult<String> {
        self.render_value(&context.to_value(), None, 0, 0)
    }

    /// Render with an explicit dot value, resolving helpers and sub-templates
    /// through `registry` when given.
    pub(crate) fn render_value(
        &self,
        dot: &TemplateValue,
        registry: Option<&TemplateRegistry>,
        depth: usize,
        nesting: usize,
    ) -> TemplateResult<String> {
        let evaluator = Evaluator {
            registry,
            template: &self.name,
            depth,
            nesting: Cell::new(nesting),
        };
        let mut out = String::new();
        evaluator.eval_nodes(&self.nodes, dot, &mut out)?;
        Ok(out)
    }
}

struct Evaluator<'a> {
    registry: Option<&'a TemplateRegistry>,
    template: &'a str,
    depth: usize,
    nesting: Cell<usize>,
}

impl Evaluator<'_> {
    /// Run `f` one nesting level deeper.
    fn nested<T>(&self, f: impl FnOnce() -> TemplateResult<T>) -> TemplateResult<T> {
        let level = self.nesting.get() + 1;
        if level > MAX_RENDER_NESTING {
            return Err(self.evaluation_error(format!(
                "nesting exceeds {} levels",
                MAX_RENDER_NESTING
            )));
        }
        self.nesting.set(level);
        let result = f();
        self.nesting.set(level - 1);
        result
    }

    fn eval_nodes(
        &self,
        nodes: &[TemplateNode],
        dot: &TemplateValue,
        out: &mut String,
    ) -> TemplateResult<()> {
        self.nested(|| {
            for node in nodes {
                self.eval_node(node, dot, out)?;
            }
            Ok(())
        })
    }

    fn eval_node(&self, node: &TemplateNode, dot: &TemplateValue, out: &mut String) -> TemplateResult<()> {
        match node {
            TemplateNode::Literal(Literal { text, .. }) => out.push_str(text),

            TemplateNode::Output(Output { pipeline, .. }) => {
                let value = self.eval_pipeline(pipeline, dot)?;
                out.push_str(&value.render());
            }

            TemplateNode::Conditional(Conditional {
                branches,
                else_branch,
                ..
            }) => {
                for (condition, body) in branches {
                    if self.eval_pipeline(condition, dot)?.is_truthy() {
                        return self.eval_nodes(body, dot, out);
                    }
                }
                if let Some(else_body) = else_branch {
                    self.eval_nodes(else_body, dot, out)?;
                }
            }

            TemplateNode::With(With {
                pipeline,
                body,
                else_branch,
                ..
            }) => {
                let value = self.eval_pipeline(pipeline, dot)?;
                if value.is_truthy() {
                    self.eval_nodes(body, &value, out)?;
                } else if let Some(else_body) = else_branch {
                    self.eval_nodes(else_body, dot, out)?;
                }
            }

            TemplateNode::Range(Range {
                pipeline,
                body,
                else_branch,
                ..
            }) => {
                let value = self.eval_pipeline(pipeline, dot)?;
                let items: Vec<&TemplateValue> = match &value {
                    TemplateValue::List(items) => items.iter().collect(),
                    TemplateValue::Map(map) => map.values().collect(),
                    TemplateValue::Null => Vec::new(),
                    other => {
                        return Err(self.evaluation_error(format!(
                            "range can't iterate over {}",
                            other.kind()
                        )));
                    }
                };
                if items.is_empty() {
                    if let Some(else_body) = else_branch {
                        self.eval_nodes(else_body, dot, out)?;
                    }
                } else {
                    for item in items {
                        self.eval_nodes(body, item, out)?;
                    }
                }
            }

            TemplateNode::Invoke(invoke) => self.eval_invoke(invoke, dot, out)?,

            // Comments produce no output
            TemplateNode::Comment(_) => {}
        }
        Ok(())
    }

    fn eval_invoke(&self, invoke: &Invoke, dot: &TemplateValue, out: &mut String) -> TemplateResult<()> {
        let Some(template) = self.registry.and_then(|r| r.get(&invoke.name)) else {
            return Err(TemplateError::UnknownTemplate {
                name: invoke.name.clone(),
            });
        };
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(TemplateError::RecursiveTemplate {
                name: invoke.name.clone(),
                max_depth: MAX_TEMPLATE_DEPTH,
            });
        }

        trace!(template = %invoke.name, depth = self.depth + 1, "invoking sub-template");
        let rendered = match &invoke.pipeline {
            Some(pipeline) => {
                let value = self.eval_pipeline(pipeline, dot)?;
                template.render_value(&value, self.registry, self.depth + 1, self.nesting.get())?
            }
            None => {
                template.render_value(dot, self.registry, self.depth + 1, self.nesting.get())?
            }
        };
        out.push_str(&rendered);
        Ok(())
    }

    fn eval_pipeline(&self, pipeline: &Pipeline, dot: &TemplateValue) -> TemplateResult<TemplateValue> {
        let mut value = None;
        for command in &pipeline.commands {
            value = Some(self.eval_command(command, dot, value.take())?);
        }
        Ok(value.unwrap_or_default())
    }

    fn eval_command(
        &self,
        command: &Command,
        dot: &TemplateValue,
        piped: Option<TemplateValue>,
    ) -> TemplateResult<TemplateValue> {
        let (function, args) = match command {
            Command::Operand(operand) => return self.eval_operand(operand, dot, false),
            Command::Call { function, args } => (function.as_str(), args),
        };

        if function == "or" {
            return self.eval_or(args, dot, piped);
        }

        let mut values = args
            .iter()
            .map(|arg| self.eval_operand(arg, dot, false))
            .collect::<TemplateResult<Vec<_>>>()?;
        values.extend(piped);

        if let Some(result) = call_builtin(function, &values) {
            return result.map_err(|message| {
                self.evaluation_error(format!("{}: {}", function, message))
            });
        }

        match self.registry.and_then(|r| r.helper(function)) {
            Some(helper) => Ok(helper(&values)),
            None => Err(TemplateError::UnknownFunction {
                template: self.template.to_string(),
                function: function.to_string(),
            }),
        }
    }

    /// `or a b c`: the first truthy argument, otherwise the last one.
    ///
    /// Field arguments are resolved leniently here: an absent field is the
    /// no-value sentinel instead of an error.
    fn eval_or(
        &self,
        args: &[Operand],
        dot: &TemplateValue,
        piped: Option<TemplateValue>,
    ) -> TemplateResult<TemplateValue> {
        if args.is_empty() && piped.is_none() {
            return Err(self.evaluation_error("or: expects at least 1 argument"));
        }

        let mut last = TemplateValue::Null;
        for arg in args {
            last = self.eval_operand(arg, dot, true)?;
            if last.is_truthy() {
                return Ok(last);
            }
        }
        Ok(piped.unwrap_or(last))
    }

    fn eval_operand(
        &self,
        operand: &Operand,
        dot: &TemplateValue,
        lenient: bool,
    ) -> TemplateResult<TemplateValue> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => match dot.get_path(path) {
                Some(value) => Ok(value.clone()),
                None if lenient => Ok(TemplateValue::Null),
                None => Err(TemplateError::MissingField {
                    template: self.template.to_string(),
                    field: Operand::field_label(path),
                }),
            },
            Operand::String(s) => Ok(TemplateValue::String(s.clone())),
            Operand::Integer(i) => Ok(TemplateValue::Integer(*i)),
            Operand::Bool(b) => Ok(TemplateValue::Bool(*b)),
            Operand::Nil => Ok(TemplateValue::Null),
            Operand::Pipeline(inner) => self.nested(|| self.eval_pipeline(inner, dot)),
        }
    }

    fn evaluation_error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Evaluation {
            template: self.template.to_string(),
            message: message.into(),
        }
    }
}
