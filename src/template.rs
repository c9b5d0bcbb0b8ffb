//! Minimal markup evaluator.
//!
//! Compiled component markup still contains `{{ ... }}` actions. This module
//! parses them once and executes them against a data value, resolving
//! function calls through a [`FuncHost`]. Supported actions:
//!
//! - `{{ pipeline }}`: output, HTML-escaped unless the value is [`Value::Html`]
//! - `{{ if p }} ... {{ else if p }} ... {{ else }} ... {{ end }}`
//! - `{{ range p }} ... {{ else }} ... {{ end }}` and `{{ with p }} ... {{ end }}`, both rebinding `.`
//! - `{{/* comment */}}`, and `{{-` / `-}}` to trim surrounding whitespace
//!
//! A pipeline is `command | command ...`; the value on the left of `|` is
//! passed as the last argument of the command on the right.

use crate::error::{Error, Result};
use crate::value::Value;

/// Resolves function names used inside markup.
pub trait FuncHost {
    /// `None` when the host does not know `name`.
    fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value>>;
}

/// Host with no functions beyond the evaluator's builtins.
pub struct NoFuncs;

impl FuncHost for NoFuncs {
    fn call(&self, _name: &str, _args: &[Value]) -> Option<Result<Value>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
struct Pipeline {
    commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct Command {
    operands: Vec<Operand>,
}

#[derive(Debug, Clone)]
enum Operand {
    Dot(Vec<String>),
    Root(Vec<String>),
    Ident(String),
    Literal(Value),
    Sub(Pipeline),
}

impl Template {
    pub fn parse(name: &str, source: &str) -> Result<Self> {
        let segments = split_segments(source).map_err(|message| Error::TemplateParse {
            name: name.to_string(),
            message,
        })?;
        let mut parser = Parser {
            segments,
            pos: 0,
        };
        let nodes = parser.parse_top().map_err(|message| Error::TemplateParse {
            name: name.to_string(),
            message,
        })?;
        Ok(Self {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execute(&self, data: &Value, host: &dyn FuncHost) -> Result<String> {
        let exec = Exec {
            name: &self.name,
            root: data,
            host,
        };
        let mut out = String::new();
        exec.nodes(&self.nodes, data, &mut out)?;
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Action(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Int(i64),
    Float(f64),
    Word(String),
    Field(Vec<String>),
    Var(Vec<String>),
    LParen,
    RParen,
    Pipe,
}

fn split_segments(source: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let mut text = &rest[..open];
        if trim_next {
            text = text.trim_start();
        }
        let after = &rest[open + 2..];
        let close = find_action_end(after).ok_or_else(|| "unclosed action".to_string())?;
        let mut inner = &after[..close];

        if inner.starts_with("- ") || inner.starts_with("-\n") || inner == "-" {
            text = text.trim_end();
            inner = &inner[1..];
        }
        trim_next = false;
        if inner.ends_with(" -") || inner.ends_with("\n-") {
            trim_next = true;
            inner = &inner[..inner.len() - 1];
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text.to_string()));
        }
        let inner = inner.trim();
        if !(inner.starts_with("/*") && inner.ends_with("*/")) {
            segments.push(Segment::Action(tokenize(inner)?));
        }
        rest = &after[close + 2..];
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        segments.push(Segment::Text(tail.to_string()));
    }
    Ok(segments)
}

/// Offset of the `}}` that ends the action, skipping string literals.
fn find_action_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if b == b'}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(action: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = action.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(format!("unterminated string in {{{{{}}}}}", action)),
                        Some('"') => break,
                        Some('\\') => {
                            i += 1;
                            match chars.get(i) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(other) => s.push(*other),
                                None => return Err("unterminated escape".to_string()),
                            }
                        }
                        Some(other) => s.push(*other),
                    }
                    i += 1;
                }
                tokens.push(Token::Str(s));
                i += 1;
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&c| c == '`')
                    .ok_or_else(|| format!("unterminated raw string in {{{{{}}}}}", action))?;
                tokens.push(Token::Str(chars[start..start + end].iter().collect()));
                i = start + end + 1;
            }
            '.' | '$' => {
                let is_var = c == '$';
                i += 1;
                let mut path = Vec::new();
                if !is_var && chars.get(i).copied().is_some_and(is_ident_char) {
                    i = read_path_segment(&chars, i, &mut path);
                }
                while chars.get(i) == Some(&'.') && chars.get(i + 1).copied().is_some_and(is_ident_char) {
                    i = read_path_segment(&chars, i + 1, &mut path);
                }
                tokens.push(if is_var { Token::Var(path) } else { Token::Field(path) });
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars.get(i).is_some_and(|d| d.is_ascii_digit() || *d == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let token = if text.contains('.') {
                    text.parse().map(Token::Float)
                        .map_err(|_| format!("bad number syntax: {}", text))?
                } else {
                    text.parse().map(Token::Int)
                        .map_err(|_| format!("bad number syntax: {}", text))?
                };
                tokens.push(token);
            }
            c if is_ident_char(c) => {
                let start = i;
                while chars.get(i).copied().is_some_and(is_ident_char) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected {:?} in {{{{{}}}}}", other, action)),
        }
    }

    Ok(tokens)
}

fn read_path_segment(chars: &[char], mut i: usize, path: &mut Vec<String>) -> usize {
    let start = i;
    while chars.get(i).copied().is_some_and(is_ident_char) {
        i += 1;
    }
    path.push(chars[start..i].iter().collect());
    i
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSING
// ═══════════════════════════════════════════════════════════════════════════════

enum Terminator {
    Eof,
    End,
    Else(Option<Pipeline>),
}

struct Parser {
    segments: Vec<Segment>,
    pos: usize,
}

type ParseResult<T> = std::result::Result<T, String>;

impl Parser {
    fn parse_top(&mut self) -> ParseResult<Vec<Node>> {
        let (nodes, term) = self.parse_list()?;
        match term {
            Terminator::Eof => Ok(nodes),
            Terminator::End => Err("unexpected {{end}}".to_string()),
            Terminator::Else(_) => Err("unexpected {{else}}".to_string()),
        }
    }

    fn parse_list(&mut self) -> ParseResult<(Vec<Node>, Terminator)> {
        let mut nodes = Vec::new();

        while self.pos < self.segments.len() {
            let segment = self.segments[self.pos].clone();
            self.pos += 1;

            let tokens = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Segment::Action(tokens) => tokens,
            };

            match tokens.first() {
                Some(Token::Word(w)) if w == "end" => return Ok((nodes, Terminator::End)),
                Some(Token::Word(w)) if w == "else" => {
                    let rest = &tokens[1..];
                    let term = match rest.first() {
                        None => Terminator::Else(None),
                        Some(Token::Word(w)) if w == "if" => {
                            Terminator::Else(Some(parse_pipeline(&rest[1..])?))
                        }
                        Some(_) => return Err("unexpected tokens after {{else}}".to_string()),
                    };
                    return Ok((nodes, term));
                }
                Some(Token::Word(w)) if w == "if" => {
                    nodes.push(self.parse_if(parse_pipeline(&tokens[1..])?)?);
                }
                Some(Token::Word(w)) if w == "range" || w == "with" => {
                    let is_range = w == "range";
                    let pipe = parse_pipeline(&tokens[1..])?;
                    let (body, term) = self.parse_list()?;
                    let otherwise = match term {
                        Terminator::End => Vec::new(),
                        Terminator::Else(None) => self.parse_until_end()?,
                        Terminator::Else(Some(_)) => {
                            return Err("{{else if}} is only allowed inside {{if}}".to_string())
                        }
                        Terminator::Eof => return Err("unexpected EOF, missing {{end}}".to_string()),
                    };
                    nodes.push(if is_range {
                        Node::Range { pipe, body, otherwise }
                    } else {
                        Node::With { pipe, body, otherwise }
                    });
                }
                _ => nodes.push(Node::Action(parse_pipeline(&tokens)?)),
            }
        }

        Ok((nodes, Terminator::Eof))
    }

    fn parse_if(&mut self, first: Pipeline) -> ParseResult<Node> {
        let mut branches = Vec::new();
        let mut cond = first;
        loop {
            let (body, term) = self.parse_list()?;
            branches.push((cond, body));
            match term {
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Terminator::Else(Some(next)) => cond = next,
                Terminator::Else(None) => {
                    let otherwise = self.parse_until_end()?;
                    return Ok(Node::If { branches, otherwise });
                }
                Terminator::Eof => return Err("unexpected EOF, missing {{end}}".to_string()),
            }
        }
    }

    fn parse_until_end(&mut self) -> ParseResult<Vec<Node>> {
        match self.parse_list()? {
            (nodes, Terminator::End) => Ok(nodes),
            (_, Terminator::Else(_)) => Err("unexpected {{else}}".to_string()),
            (_, Terminator::Eof) => Err("unexpected EOF, missing {{end}}".to_string()),
        }
    }
}

fn parse_pipeline(tokens: &[Token]) -> ParseResult<Pipeline> {
    let mut commands = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Pipe => {
                if current.is_empty() {
                    return Err("missing command before '|'".to_string());
                }
                commands.push(Command {
                    operands: std::mem::take(&mut current),
                });
                i += 1;
            }
            Token::LParen => {
                let close = matching_paren(tokens, i)?;
                current.push(Operand::Sub(parse_pipeline(&tokens[i + 1..close])?));
                i = close + 1;
            }
            Token::RParen => return Err("unexpected ')'".to_string()),
            Token::Str(s) => {
                current.push(Operand::Literal(Value::Str(s.clone())));
                i += 1;
            }
            Token::Int(n) => {
                current.push(Operand::Literal(Value::Int(*n)));
                i += 1;
            }
            Token::Float(f) => {
                current.push(Operand::Literal(Value::Float(*f)));
                i += 1;
            }
            Token::Field(path) => {
                current.push(Operand::Dot(path.clone()));
                i += 1;
            }
            Token::Var(path) => {
                current.push(Operand::Root(path.clone()));
                i += 1;
            }
            Token::Word(w) => {
                current.push(match w.as_str() {
                    "true" => Operand::Literal(Value::Bool(true)),
                    "false" => Operand::Literal(Value::Bool(false)),
                    "nil" => Operand::Literal(Value::Null),
                    _ => Operand::Ident(w.clone()),
                });
                i += 1;
            }
        }
    }

    if current.is_empty() {
        return Err("missing value for command".to_string());
    }
    commands.push(Command { operands: current });
    Ok(Pipeline { commands })
}

fn matching_paren(tokens: &[Token], open: usize) -> ParseResult<usize> {
    let mut depth = 0;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unclosed '('".to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXECUTION
// ═══════════════════════════════════════════════════════════════════════════════

struct Exec<'a> {
    name: &'a str,
    root: &'a Value,
    host: &'a dyn FuncHost,
}

impl Exec<'_> {
    fn nodes(&self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipe) => match self.pipeline(pipe, dot)? {
                    Value::Html(html) => out.push_str(&html),
                    other => out.push_str(&escape_html(&other.to_text())),
                },
                Node::If { branches, otherwise } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if self.pipeline(cond, dot)?.is_truthy() {
                            self.nodes(body, dot, out)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        self.nodes(otherwise, dot, out)?;
                    }
                }
                Node::With {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let value = self.pipeline(pipe, dot)?;
                    if value.is_truthy() {
                        self.nodes(body, &value, out)?;
                    } else {
                        self.nodes(otherwise, dot, out)?;
                    }
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let items = match self.pipeline(pipe, dot)? {
                        Value::List(items) => items,
                        Value::Map(map) => map.into_values().collect(),
                        Value::Int(n) => (0..n.max(0)).map(Value::Int).collect(),
                        Value::Null => Vec::new(),
                        other => {
                            return Err(Error::evaluation(
                                self.name,
                                format!("range can't iterate over {}", other.to_text()),
                            ))
                        }
                    };
                    if items.is_empty() {
                        self.nodes(otherwise, dot, out)?;
                    }
                    for item in &items {
                        self.nodes(body, item, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn pipeline(&self, pipe: &Pipeline, dot: &Value) -> Result<Value> {
        let mut piped: Option<Value> = None;
        for command in &pipe.commands {
            piped = Some(self.command(command, dot, piped)?);
        }
        Ok(piped.unwrap_or_default())
    }

    fn command(&self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
        let (first, rest) = command
            .operands
            .split_first()
            .ok_or_else(|| Error::evaluation(self.name, "empty command"))?;

        if let Operand::Ident(name) = first {
            let mut args = rest
                .iter()
                .map(|op| self.operand(op, dot))
                .collect::<Result<Vec<_>>>()?;
            args.extend(piped);
            return self.call(name, &args);
        }

        if !rest.is_empty() || piped.is_some() {
            return Err(Error::evaluation(
                self.name,
                "can't give argument to non-function",
            ));
        }
        self.operand(first, dot)
    }

    fn operand(&self, operand: &Operand, dot: &Value) -> Result<Value> {
        Ok(match operand {
            Operand::Dot(path) => lookup_path(dot, path),
            Operand::Root(path) => lookup_path(self.root, path),
            Operand::Literal(value) => value.clone(),
            Operand::Sub(pipe) => self.pipeline(pipe, dot)?,
            Operand::Ident(name) => self.call(name, &[])?,
        })
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(result) = self.host.call(name, args) {
            return result;
        }
        builtin(name, args)
            .unwrap_or_else(|| Err(Error::evaluation(self.name, format!("function \"{}\" not defined", name))))
    }
}

fn lookup_path(start: &Value, path: &[String]) -> Value {
    let mut current = start;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn builtin(name: &str, args: &[Value]) -> Option<Result<Value>> {
    let arity = |n: usize| -> Result<()> {
        if args.len() < n {
            Err(Error::function(name, format!("wrong number of args: want {}, got {}", n, args.len())))
        } else {
            Ok(())
        }
    };
    let ordered = |accept: fn(std::cmp::Ordering) -> bool| -> Result<Value> {
        arity(2)?;
        args[0]
            .compare(&args[1])
            .map(|o| Value::Bool(accept(o)))
            .ok_or_else(|| Error::function(name, "incompatible types for comparison"))
    };

    let result = match name {
        "eq" => arity(2).map(|_| Value::Bool(args[1..].iter().any(|v| args[0].loose_eq(v)))),
        "ne" => arity(2).map(|_| Value::Bool(!args[0].loose_eq(&args[1]))),
        "lt" => ordered(|o| o.is_lt()),
        "le" => ordered(|o| o.is_le()),
        "gt" => ordered(|o| o.is_gt()),
        "ge" => ordered(|o| o.is_ge()),
        "not" => arity(1).map(|_| Value::Bool(!args[0].is_truthy())),
        "and" => Ok(args
            .iter()
            .find(|v| !v.is_truthy())
            .or(args.last())
            .cloned()
            .unwrap_or_default()),
        "or" => Ok(args
            .iter()
            .find(|v| v.is_truthy())
            .or(args.last())
            .cloned()
            .unwrap_or_default()),
        "len" => arity(1).and_then(|_| {
            args[0]
                .len()
                .map(|n| Value::Int(n as i64))
                .ok_or_else(|| Error::function(name, "len of unsupported type"))
        }),
        "index" => arity(1).map(|_| {
            args[1..].iter().fold(args[0].clone(), |acc, key| {
                acc.get(&key.to_text()).cloned().unwrap_or_default()
            })
        }),
        "print" => Ok(Value::Str(args.iter().map(Value::to_text).collect())),
        _ => return None,
    };
    Some(result)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
