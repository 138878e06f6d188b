/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! This module defines the abstract syntax tree for parsed templates.

use std::collections::BTreeSet;

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// Literal text to be output as-is.
    Literal(Literal),

    /// Output action: `{{ pipeline }}`
    Output(Output),

    /// Conditional block: `{{ if p }}...{{ else if q }}...{{ else }}...{{ end }}`
    Conditional(Conditional),

    /// Rebinding block: `{{ with p }}...{{ else }}...{{ end }}`
    With(With),

    /// Iteration block: `{{ range p }}...{{ else }}...{{ end }}`
    Range(Range),

    /// Sub-template invocation: `{{ template "name" p }}`
    Invoke(Invoke),

    /// Comment (not rendered): `{{/* comment */}}`
    Comment(Comment),
}

/// Literal text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub text: String,
}

/// Output action node.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub pipeline: Pipeline,
}

/// Conditional block.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// List of (condition, body) pairs for if/else-if branches.
    pub branches: Vec<(Pipeline, Vec<TemplateNode>)>,
    /// Optional else branch.
    pub else_branch: Option<Vec<TemplateNode>>,
}

/// `with` block. The body sees the pipeline value as its dot.
#[derive(Debug, Clone, PartialEq)]
pub struct With {
    pub pipeline: Pipeline,
    pub body: Vec<TemplateNode>,
    pub else_branch: Option<Vec<TemplateNode>>,
}

/// `range` block. The body runs once per item with the item as its dot.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub pipeline: Pipeline,
    pub body: Vec<TemplateNode>,
    pub else_branch: Option<Vec<TemplateNode>>,
}

/// Sub-template invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    /// Registered template name.
    pub name: String,
    /// Value passed as the invoked template's dot; the current dot when absent.
    pub pipeline: Option<Pipeline>,
}

/// Comment node.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
}

/// A chain of commands joined by `|`.
///
/// The value of each command is passed as the last argument of the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

/// A single pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A bare operand such as `.Name` or `"text"`.
    Operand(Operand),
    /// A function call such as `or .Color "Grey"`.
    Call { function: String, args: Vec<Operand> },
}

/// A value-producing term.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// The current dot: `.`
    Dot,
    /// Field chain relative to the dot: `.User.AccountID`
    Field(Vec<String>),
    /// String literal.
    String(String),
    /// Integer literal.
    Integer(i64),
    /// `true` / `false`.
    Bool(bool),
    /// `nil`
    Nil,
    /// Parenthesized pipeline.
    Pipeline(Box<Pipeline>),
}

impl Operand {
    /// Render a field chain the way it is written in a template (`.A.B`).
    pub fn field_label(path: &[String]) -> String {
        path.iter().map(|p| format!(".{}", p)).collect()
    }
}

/// Collect every function name referenced by `nodes`.
pub fn referenced_functions(nodes: &[TemplateNode]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_nodes(nodes, &mut names);
    names
}

fn collect_nodes(nodes: &[TemplateNode], names: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            TemplateNode::Output(Output { pipeline, .. }) => collect_pipeline(pipeline, names),
            TemplateNode::Conditional(cond) => {
                for (condition, body) in &cond.branches {
                    collect_pipeline(condition, names);
                    collect_nodes(body, names);
                }
                if let Some(else_branch) = &cond.else_branch {
                    collect_nodes(else_branch, names);
                }
            }
            TemplateNode::With(With {
                pipeline,
                body,
                else_branch,
                ..
            })
            | TemplateNode::Range(Range {
                pipeline,
                body,
                else_branch,
                ..
            }) => {
                collect_pipeline(pipeline, names);
                collect_nodes(body, names);
                if let Some(else_branch) = else_branch {
                    collect_nodes(else_branch, names);
                }
            }
            TemplateNode::Invoke(Invoke {
                pipeline: Some(pipeline),
                ..
            }) => collect_pipeline(pipeline, names),
            TemplateNode::Invoke(_) | TemplateNode::Literal(_) | TemplateNode::Comment(_) => {}
        }
    }
}

fn collect_pipeline(pipeline: &Pipeline, names: &mut BTreeSet<String>) {
    for command in &pipeline.commands {
        match command {
            Command::Operand(operand) => collect_operand(operand, names),
            Command::Call { function, args } => {
                names.insert(function.clone());
                for arg in args {
                    collect_operand(arg, names);
                }
            }
        }
    }
}

fn collect_operand(operand: &Operand, names: &mut BTreeSet<String>) {
    if let Operand::Pipeline(inner) = operand {
        collect_pipeline(inner, names);
    }
}
