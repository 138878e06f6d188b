/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! Converts template source text into the template AST. Literal text is
//! copied through; every `{{ ... }}` action is tokenized and then parsed as
//! either a control keyword (`if`, `else`, `end`, `with`, `range`,
//! `template`) or an output pipeline.

use std::collections::BTreeSet;

use crate::ast::{
    Command, Comment, Conditional, Invoke, Literal, Operand, Output, Pipeline, Range,
    TemplateNode, With, referenced_functions,
};
use crate::error::{TemplateError, TemplateResult};
use crate::evaluator::MAX_NESTING_DEPTH;

/// A compiled template ready for evaluation.
#[derive(Debug, Clone)]
pub struct Template {
    /// Name used in error messages and by the registry.
    pub(crate) name: String,

    /// The parsed template AST.
    pub(crate) nodes: Vec<TemplateNode>,
}

impl Template {
    /// Compile a template from source text.
    pub fn compile(source: &str) -> TemplateResult<Self> {
        Self::compile_with_name(source, "<template>")
    }

    /// Compile a template from source text with a name for error reporting.
    pub fn compile_with_name(source: &str, name: &str) -> TemplateResult<Self> {
        let nodes = Parser::new(source, name).parse()?;
        Ok(Template {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the AST nodes of this template.
    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// Every function name the body calls.
    pub fn functions(&self) -> BTreeSet<String> {
        referenced_functions(&self.nodes)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Dot,
    Field(Vec<String>),
    Ident(String),
    Str(String),
    Int(i64),
    Pipe,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

/// The lexed contents of one `{{ ... }}`.
struct Action {
    body: ActionBody,
    start: usize,
    end: usize,
    trim_left: bool,
    trim_right: bool,
}

enum ActionBody {
    Comment(String),
    Tokens(Vec<Token>),
}

/// How a node list ended.
enum Terminator {
    Eof,
    End,
    Else,
    ElseIf(Pipeline),
}

/// What a single action parsed to.
enum Parsed {
    Node(TemplateNode),
    Block(BlockKind, Pipeline),
    End,
    Else,
    ElseIf(Pipeline),
}

#[derive(Clone, Copy)]
enum BlockKind {
    If,
    With,
    Range,
}

impl BlockKind {
    fn keyword(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::With => "with",
            BlockKind::Range => "range",
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    name: &'a str,
    pos: usize,
    /// The previous action ended with `-}}`.
    trim_next: bool,
    /// Open blocks and parenthesized pipelines.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, name: &'a str) -> Self {
        Self {
            source,
            name,
            pos: 0,
            trim_next: false,
            depth: 0,
        }
    }

    fn enter(&mut self, offset: usize) -> TemplateResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error(
                offset,
                format!("nesting exceeds {} levels", MAX_NESTING_DEPTH),
            ));
        }
        Ok(())
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Parse {
            template: self.name.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn parse(mut self) -> TemplateResult<Vec<TemplateNode>> {
        let (nodes, terminator, offset) = self.parse_list()?;
        match terminator {
            Terminator::Eof => Ok(nodes),
            Terminator::End => Err(self.error(offset, "unexpected {{ end }}")),
            Terminator::Else | Terminator::ElseIf(_) => {
                Err(self.error(offset, "unexpected {{ else }}"))
            }
        }
    }

    /// Parse nodes until end of input or a terminating action.
    ///
    /// Returns the nodes, the terminator and the byte offset of the terminator.
    fn parse_list(&mut self) -> TemplateResult<(Vec<TemplateNode>, Terminator, usize)> {
        let source = self.source;
        let mut nodes = Vec::new();

        loop {
            let text_start = self.pos;
            let Some(relative) = source[text_start..].find("{{") else {
                let text = self.take_trim_next(&source[text_start..]);
                push_literal(&mut nodes, text);
                self.pos = source.len();
                return Ok((nodes, Terminator::Eof, source.len()));
            };

            let action_start = text_start + relative;
            let mut text = self.take_trim_next(&source[text_start..action_start]);
            let action = self.lex_action(action_start)?;
            if action.trim_left {
                text = text.trim_end();
            }
            push_literal(&mut nodes, text);
            self.trim_next = action.trim_right;

            let tokens = match action.body {
                ActionBody::Comment(text) => {
                    nodes.push(TemplateNode::Comment(Comment { text }));
                    continue;
                }
                ActionBody::Tokens(tokens) => tokens,
            };

            match self.parse_action(tokens, action.start, action.end)? {
                Parsed::Node(node) => nodes.push(node),
                Parsed::Block(kind, pipeline) => {
                    self.enter(action.start)?;
                    nodes.push(self.parse_block(kind, pipeline, action.start)?);
                    self.depth -= 1;
                }
                Parsed::End => return Ok((nodes, Terminator::End, action_start)),
                Parsed::Else => return Ok((nodes, Terminator::Else, action_start)),
                Parsed::ElseIf(pipeline) => {
                    return Ok((nodes, Terminator::ElseIf(pipeline), action_start));
                }
            }
        }
    }

    fn take_trim_next<'s>(&mut self, text: &'s str) -> &'s str {
        if std::mem::take(&mut self.trim_next) {
            text.trim_start()
        } else {
            text
        }
    }

    fn parse_block(
        &mut self,
        kind: BlockKind,
        pipeline: Pipeline,
        open: usize,
    ) -> TemplateResult<TemplateNode> {
        let unclosed = |parser: &Self| {
            parser.error(
                open,
                format!("unclosed {{{{ {} }}}}, expected {{{{ end }}}}", kind.keyword()),
            )
        };

        if let BlockKind::If = kind {
            let mut branches = Vec::new();
            let mut condition = pipeline;
            let mut else_branch = None;
            loop {
                let (body, terminator, _) = self.parse_list()?;
                branches.push((condition, body));
                match terminator {
                    Terminator::End => break,
                    Terminator::ElseIf(next) => condition = next,
                    Terminator::Else => {
                        else_branch = Some(self.parse_else_body(kind, open)?);
                        break;
                    }
                    Terminator::Eof => return Err(unclosed(self)),
                }
            }
            return Ok(TemplateNode::Conditional(Conditional {
                branches,
                else_branch,
            }));
        }

        let (body, terminator, offset) = self.parse_list()?;
        let else_branch = match terminator {
            Terminator::End => None,
            Terminator::Else => Some(self.parse_else_body(kind, open)?),
            Terminator::ElseIf(_) => {
                return Err(self.error(
                    offset,
                    format!("{{{{ else if }}}} is not allowed inside {{{{ {} }}}}", kind.keyword()),
                ));
            }
            Terminator::Eof => return Err(unclosed(self)),
        };

        Ok(match kind {
            BlockKind::With => TemplateNode::With(With {
                pipeline,
                body,
                else_branch,
            }),
            _ => TemplateNode::Range(Range {
                pipeline,
                body,
                else_branch,
            }),
        })
    }

    /// Parse the body after `{{ else }}`, which must be closed by `{{ end }}`.
    fn parse_else_body(&mut self, kind: BlockKind, open: usize) -> TemplateResult<Vec<TemplateNode>> {
        let (body, terminator, offset) = self.parse_list()?;
        match terminator {
            Terminator::End => Ok(body),
            Terminator::Else | Terminator::ElseIf(_) => Err(self.error(
                offset,
                format!("{{{{ else }}}} after {{{{ else }}}} in {{{{ {} }}}}", kind.keyword()),
            )),
            Terminator::Eof => Err(self.error(
                open,
                format!("unclosed {{{{ {} }}}}, expected {{{{ end }}}}", kind.keyword()),
            )),
        }
    }

    fn parse_action(&mut self, tokens: Vec<Token>, start: usize, end: usize) -> TemplateResult<Parsed> {
        let mut cursor = TokenCursor {
            tokens: &tokens,
            pos: 0,
            end,
        };

        let keyword = match tokens.first() {
            Some(Token {
                kind: TokenKind::Ident(word),
                ..
            }) => word.as_str(),
            Some(_) => "",
            None => return Err(self.error(start, "empty action")),
        };

        match keyword {
            "if" | "with" | "range" => {
                cursor.pos = 1;
                let kind = match keyword {
                    "if" => BlockKind::If,
                    "with" => BlockKind::With,
                    _ => BlockKind::Range,
                };
                let pipeline = self.parse_full_pipeline(&mut cursor)?;
                Ok(Parsed::Block(kind, pipeline))
            }
            "end" => {
                if tokens.len() > 1 {
                    return Err(self.error(tokens[1].offset, "unexpected token after end"));
                }
                Ok(Parsed::End)
            }
            "else" => match tokens.get(1) {
                None => Ok(Parsed::Else),
                Some(Token {
                    kind: TokenKind::Ident(word),
                    ..
                }) if word == "if" => {
                    cursor.pos = 2;
                    Ok(Parsed::ElseIf(self.parse_full_pipeline(&mut cursor)?))
                }
                Some(token) => Err(self.error(token.offset, "expected `if` or `}}` after else")),
            },
            "template" => {
                let name = match tokens.get(1) {
                    Some(Token {
                        kind: TokenKind::Str(name),
                        ..
                    }) => name.clone(),
                    Some(token) => {
                        return Err(self.error(token.offset, "template name must be a string"));
                    }
                    None => return Err(self.error(start, "template name is missing")),
                };
                cursor.pos = 2;
                let pipeline = if tokens.len() > 2 {
                    Some(self.parse_full_pipeline(&mut cursor)?)
                } else {
                    None
                };
                Ok(Parsed::Node(TemplateNode::Invoke(Invoke { name, pipeline })))
            }
            _ => {
                let pipeline = self.parse_full_pipeline(&mut cursor)?;
                Ok(Parsed::Node(TemplateNode::Output(Output { pipeline })))
            }
        }
    }

    /// Parse a pipeline that must consume every remaining token.
    fn parse_full_pipeline(&mut self, cursor: &mut TokenCursor) -> TemplateResult<Pipeline> {
        let pipeline = self.parse_pipeline(cursor)?;
        if let Some(token) = cursor.peek() {
            return Err(self.error(token.offset, format!("unexpected {}", describe(&token.kind))));
        }
        Ok(pipeline)
    }

    fn parse_pipeline(&mut self, cursor: &mut TokenCursor) -> TemplateResult<Pipeline> {
        let mut commands = vec![self.parse_command(cursor)?];
        while cursor.eat(&TokenKind::Pipe) {
            let offset = cursor.offset();
            let command = self.parse_command(cursor)?;
            if let Command::Operand(_) = command {
                return Err(self.error(offset, "only functions can receive a piped value"));
            }
            commands.push(command);
        }
        Ok(Pipeline { commands })
    }

    fn parse_command(&mut self, cursor: &mut TokenCursor) -> TemplateResult<Command> {
        if let Some(Token {
            kind: TokenKind::Ident(name),
            ..
        }) = cursor.peek()
        {
            if !is_literal_word(name) {
                let function = name.clone();
                cursor.pos += 1;
                let mut args = Vec::new();
                while cursor.peek().is_some_and(|t| starts_operand(&t.kind)) {
                    args.push(self.parse_operand(cursor)?);
                }
                return Ok(Command::Call { function, args });
            }
        }

        let operand = self.parse_operand(cursor)?;
        if let Some(token) = cursor.peek() {
            if starts_operand(&token.kind) {
                return Err(self.error(
                    token.offset,
                    "unexpected argument; only functions take arguments",
                ));
            }
        }
        Ok(Command::Operand(operand))
    }

    fn parse_operand(&mut self, cursor: &mut TokenCursor) -> TemplateResult<Operand> {
        let Some(token) = cursor.advance() else {
            return Err(self.error(cursor.end, "missing operand"));
        };
        match &token.kind {
            TokenKind::Dot => Ok(Operand::Dot),
            TokenKind::Field(path) => Ok(Operand::Field(path.clone())),
            TokenKind::Str(s) => Ok(Operand::String(s.clone())),
            TokenKind::Int(i) => Ok(Operand::Integer(*i)),
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Operand::Bool(true)),
                "false" => Ok(Operand::Bool(false)),
                "nil" => Ok(Operand::Nil),
                other => Err(self.error(
                    token.offset,
                    format!("function '{}' must be parenthesized to be used as an argument", other),
                )),
            },
            TokenKind::LParen => {
                self.enter(token.offset)?;
                let inner = self.parse_pipeline(cursor)?;
                if !cursor.eat(&TokenKind::RParen) {
                    return Err(self.error(cursor.offset(), "missing `)`"));
                }
                self.depth -= 1;
                Ok(Operand::Pipeline(Box::new(inner)))
            }
            other => Err(self.error(token.offset, format!("unexpected {}", describe(other)))),
        }
    }

    /// Tokenize the action starting at `start` (which points at `{{`) and
    /// advance past its closing `}}`.
    fn lex_action(&mut self, start: usize) -> TemplateResult<Action> {
        let source = self.source;
        let bytes = source.as_bytes();
        let mut i = start + 2;

        let trim_left =
            bytes.get(i) == Some(&b'-') && bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace);
        if trim_left {
            i += 1;
        }
        i = skip_whitespace(bytes, i);

        if source[i..].starts_with("/*") {
            let Some(close) = source[i + 2..].find("*/") else {
                return Err(self.error(i, "unclosed comment"));
            };
            let text = source[i + 2..i + 2 + close].to_string();
            i = skip_whitespace(bytes, i + 2 + close + 2);
            let trim_right = is_trim_close(bytes, i);
            if trim_right {
                i += 1;
            }
            if !source[i..].starts_with("}}") {
                return Err(self.error(i, "comment must be closed by `*/}}`"));
            }
            self.pos = i + 2;
            return Ok(Action {
                body: ActionBody::Comment(text),
                start,
                end: self.pos,
                trim_left,
                trim_right,
            });
        }

        let mut tokens = Vec::new();
        loop {
            i = skip_whitespace(bytes, i);
            let rest = &source[i..];
            if rest.is_empty() {
                return Err(self.error(start, "unclosed action, expected `}}`"));
            }
            if rest.starts_with("}}") {
                self.pos = i + 2;
                return Ok(Action {
                    body: ActionBody::Tokens(tokens),
                    start,
                    end: self.pos,
                    trim_left,
                    trim_right: false,
                });
            }
            if rest.starts_with("-}}") {
                if !is_trim_close(bytes, i) {
                    return Err(self.error(i, "`-}}` must be preceded by a space"));
                }
                self.pos = i + 3;
                return Ok(Action {
                    body: ActionBody::Tokens(tokens),
                    start,
                    end: self.pos,
                    trim_left,
                    trim_right: true,
                });
            }

            let offset = i;
            let c = bytes[i];
            let kind = match c {
                b'|' => {
                    i += 1;
                    TokenKind::Pipe
                }
                b'(' => {
                    i += 1;
                    TokenKind::LParen
                }
                b')' => {
                    i += 1;
                    TokenKind::RParen
                }
                b'"' => {
                    let (value, next) = self.lex_quoted(i)?;
                    i = next;
                    TokenKind::Str(value)
                }
                b'`' => {
                    let Some(close) = rest[1..].find('`') else {
                        return Err(self.error(i, "unterminated raw string"));
                    };
                    let value = rest[1..1 + close].to_string();
                    i += close + 2;
                    TokenKind::Str(value)
                }
                b'.' => {
                    if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) {
                        let mut path = Vec::new();
                        while bytes.get(i) == Some(&b'.')
                            && bytes.get(i + 1).is_some_and(|b| is_ident_start(*b))
                        {
                            let end = ident_end(bytes, i + 1);
                            path.push(source[i + 1..end].to_string());
                            i = end;
                        }
                        TokenKind::Field(path)
                    } else {
                        i += 1;
                        TokenKind::Dot
                    }
                }
                b'-' | b'0'..=b'9' => {
                    let digits_start = if c == b'-' { i + 1 } else { i };
                    let mut end = digits_start;
                    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                        end += 1;
                    }
                    if end == digits_start {
                        return Err(self.error(i, "unexpected `-`"));
                    }
                    let value = source[i..end]
                        .parse::<i64>()
                        .map_err(|e| self.error(i, format!("invalid integer: {}", e)))?;
                    i = end;
                    TokenKind::Int(value)
                }
                b'$' => {
                    return Err(self.error(i, "template variables (`$x`) are not supported"));
                }
                c if is_ident_start(c) => {
                    let end = ident_end(bytes, i);
                    let word = source[i..end].to_string();
                    i = end;
                    TokenKind::Ident(word)
                }
                _ => {
                    let ch = rest.chars().next().unwrap_or('?');
                    return Err(self.error(i, format!("unexpected character '{}'", ch)));
                }
            };
            tokens.push(Token { kind, offset });
        }
    }

    /// Lex a double-quoted string starting at `start`; returns the value and
    /// the offset just past the closing quote.
    fn lex_quoted(&self, start: usize) -> TemplateResult<(String, usize)> {
        let mut value = String::new();
        let mut chars = self.source[start + 1..].char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '"' => return Ok((value, start + 1 + idx + 1)),
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        other => {
                            return Err(self.error(
                                start + 1 + idx,
                                format!("unknown escape sequence '\\{}'", other),
                            ));
                        }
                    }
                }
                '\n' => break,
                other => value.push(other),
            }
        }
        Err(self.error(start, "unterminated string literal"))
    }
}

struct TokenCursor<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Offset reported when the tokens run out.
    end: usize,
}

impl<'t> TokenCursor<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }
}

fn push_literal(nodes: &mut Vec<TemplateNode>, text: &str) {
    if !text.is_empty() {
        nodes.push(TemplateNode::Literal(Literal {
            text: text.to_string(),
        }));
    }
}

/// A `-}}` at `i` that is separated from the action body by whitespace.
fn is_trim_close(bytes: &[u8], i: usize) -> bool {
    bytes[i..].starts_with(b"-}}") && i > 0 && bytes[i - 1].is_ascii_whitespace()
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn ident_end(bytes: &[u8], mut i: usize) -> usize {
    while bytes
        .get(i)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
    {
        i += 1;
    }
    i
}

fn is_literal_word(word: &str) -> bool {
    matches!(word, "true" | "false" | "nil")
}

fn starts_operand(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Pipe | TokenKind::RParen => false,
        _ => true,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Dot => "`.`".to_string(),
        TokenKind::Field(path) => format!("field `{}`", Operand::field_label(path)),
        TokenKind::Ident(word) => format!("identifier `{}`", word),
        TokenKind::Str(s) => format!("string {:?}", s),
        TokenKind::Int(i) => format!("number {}", i),
        TokenKind::Pipe => "`|`".to_string(),
        TokenKind::LParen => "`(`".to_string(),
        TokenKind::RParen => "`)`".to_string(),
    }
}
