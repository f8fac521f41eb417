//! Parsing and name resolution for the test engine's script language.
//!
//! Names are case-insensitive. Every call site is resolved at compile time to
//! a script function or a native function, with its argument count checked;
//! types are checked when the call happens.

use hashbrown::HashMap;
use lazy_static::lazy_static;
use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::values::{DataType, Value};

lazy_static! {
    // Lowest precedence first.
    static ref PRATT_PARSER: PrattParser<Rule> = PrattParser::new()
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left))
        .op(Op::prefix(Rule::neg));
}

#[derive(Parser)]
#[grammar = "testing/script.pest"]
struct ScriptParser;

#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub(crate) functions: Vec<ScriptFunction>,
    pub(crate) main: Vec<Statement>,
}

impl Script {
    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        let key = name.to_ascii_lowercase();
        self.functions.iter().position(|f| f.key == key)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ScriptFunction {
    /// As declared.
    pub(crate) name: String,
    key: String,
    /// Lowercased names, in declaration order.
    pub(crate) params: Vec<(String, DataType)>,
    pub(crate) return_type: DataType,
    pub(crate) body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub(crate) enum Statement {
    Assign { target: String, value: Expr },
    Eval(Expr),
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Local(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Callee {
    Native(usize),
    Script(usize),
}

/// Parse `source` against the given native functions (name, arity).
///
/// Errors are engine-style messages ending in `[line: N, column: M]`.
pub(crate) fn parse(source: &str, natives: &[(String, usize)]) -> Result<Script, String> {
    let mut pairs = ScriptParser::parse(Rule::program, source).map_err(syntax_error)?;
    let program = next(&mut pairs, "program")?;
    let items: Vec<Pair<'_, Rule>> = program.into_inner().collect();

    let mut resolver = Resolver {
        callables: natives
            .iter()
            .enumerate()
            .map(|(i, (name, arity))| (name.to_ascii_lowercase(), (Callee::Native(i), *arity)))
            .collect(),
    };

    // Headers first, so bodies can call functions declared further down.
    let mut functions = Vec::new();
    let mut bodies = Vec::new();
    for item in items.iter().filter(|p| p.as_rule() == Rule::function) {
        let (function, body) = header(item.clone())?;
        if resolver.callables.contains_key(&function.key) {
            return Err(format!(
                "Name \"{}\" already declared {}",
                function.name,
                position(item)
            ));
        }
        resolver.callables.insert(
            function.key.clone(),
            (Callee::Script(functions.len()), function.params.len()),
        );
        functions.push(function);
        bodies.push(body);
    }

    for (function, body) in functions.iter_mut().zip(bodies) {
        let mut scope: Vec<String> = function.params.iter().map(|(n, _)| n.clone()).collect();
        scope.push(String::from("result"));
        function.body = resolver.block(body, &mut scope)?;
    }

    let main = match items.into_iter().find(|p| p.as_rule() == Rule::block) {
        Some(block) => resolver.block(block, &mut Vec::new())?,
        None => return Err(String::from("Syntax Error: missing main block")),
    };

    Ok(Script { functions, main })
}

fn header(pair: Pair<'_, Rule>) -> Result<(ScriptFunction, Pair<'_, Rule>), String> {
    let mut name = None;
    let mut params = Vec::new();
    let mut return_type = DataType::NotSet;
    let mut body = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::ident => name = Some(part.as_str().to_string()),
            Rule::params => {
                for param in part.into_inner() {
                    let mut inner = param.into_inner();
                    let param_name = next(&mut inner, "parameter name")?;
                    let datatype = type_name(next(&mut inner, "parameter type")?.as_str());
                    params.push((param_name.as_str().to_ascii_lowercase(), datatype));
                }
            }
            Rule::return_type => {
                let mut inner = part.into_inner();
                return_type = type_name(next(&mut inner, "return type")?.as_str());
            }
            Rule::block => body = Some(part),
            _ => {}
        }
    }

    match (name, body) {
        (Some(name), Some(body)) => Ok((
            ScriptFunction {
                key: name.to_ascii_lowercase(),
                name,
                params,
                return_type,
                body: Vec::new(),
            },
            body,
        )),
        _ => Err(String::from("Syntax Error: malformed function declaration")),
    }
}

fn type_name(text: &str) -> DataType {
    match text.to_ascii_lowercase().as_str() {
        "integer" => DataType::Integer,
        "float" => DataType::Float,
        "string" => DataType::String,
        "boolean" => DataType::Boolean,
        _ => DataType::NotSet,
    }
}

struct Resolver {
    /// Every callable name, native or script, lowercased.
    callables: HashMap<String, (Callee, usize)>,
}

impl Resolver {
    fn block(&self, block: Pair<'_, Rule>, scope: &mut Vec<String>) -> Result<Vec<Statement>, String> {
        let mut statements = Vec::new();
        let inner = block
            .into_inner()
            .filter(|p| p.as_rule() == Rule::statements)
            .flat_map(|p| p.into_inner());

        for pair in inner {
            match pair.as_rule() {
                Rule::assignment => {
                    let at = position(&pair);
                    let mut parts = pair.into_inner();
                    let target = next(&mut parts, "assignment target")?;
                    let value = self.expression(next(&mut parts, "assigned value")?, scope)?;

                    let key = target.as_str().to_ascii_lowercase();
                    if self.callables.contains_key(&key) && !scope.contains(&key) {
                        return Err(format!(
                            "Cannot assign to function \"{}\" {}",
                            target.as_str(),
                            at
                        ));
                    }
                    if !scope.contains(&key) {
                        scope.push(key.clone());
                    }
                    statements.push(Statement::Assign { target: key, value });
                }
                Rule::call => statements.push(Statement::Eval(self.call(pair, scope)?)),
                rule => return Err(format!("Syntax Error: unexpected {:?}", rule)),
            }
        }
        Ok(statements)
    }

    fn expression(&self, pair: Pair<'_, Rule>, scope: &[String]) -> Result<Expr, String> {
        PRATT_PARSER
            .map_primary(|primary| self.primary(primary, scope))
            .map_prefix(|op, rhs| match op.as_rule() {
                Rule::neg => Ok(Expr::Neg(Box::new(rhs?))),
                rule => Err(format!("Syntax Error: unexpected {:?}", rule)),
            })
            .map_infix(|lhs, op, rhs| {
                let op = match op.as_rule() {
                    Rule::add => BinaryOp::Add,
                    Rule::sub => BinaryOp::Sub,
                    Rule::mul => BinaryOp::Mul,
                    rule => return Err(format!("Syntax Error: unexpected {:?}", rule)),
                };
                Ok(Expr::Binary {
                    op,
                    left: Box::new(lhs?),
                    right: Box::new(rhs?),
                })
            })
            .parse(pair.into_inner())
    }

    fn primary(&self, pair: Pair<'_, Rule>, scope: &[String]) -> Result<Expr, String> {
        let at = position(&pair);
        match pair.as_rule() {
            Rule::integer => pair
                .as_str()
                .parse()
                .map(|i| Expr::Literal(Value::Integer(i)))
                .map_err(|_| format!("Integer literal out of range {}", at)),
            Rule::float => pair
                .as_str()
                .parse()
                .map(|f| Expr::Literal(Value::Float(f)))
                .map_err(|_| format!("Invalid float literal {}", at)),
            Rule::boolean => Ok(Expr::Literal(Value::Boolean(
                pair.as_str().eq_ignore_ascii_case("true"),
            ))),
            Rule::string => {
                let body = next(&mut pair.into_inner(), "string body")?;
                let text = match body.as_rule() {
                    Rule::single_quoted => body.as_str().replace("''", "'"),
                    _ => body.as_str().replace("\"\"", "\""),
                };
                Ok(Expr::Literal(Value::String(text)))
            }
            Rule::call => self.call(pair, scope),
            Rule::expression => self.expression(pair, scope),
            rule => Err(format!("Syntax Error: unexpected {:?} {}", rule, at)),
        }
    }

    fn call(&self, pair: Pair<'_, Rule>, scope: &[String]) -> Result<Expr, String> {
        let at = position(&pair);
        let mut parts = pair.into_inner();
        let name = next(&mut parts, "name")?;
        let key = name.as_str().to_ascii_lowercase();
        let arguments = parts.next();

        if arguments.is_none() && scope.contains(&key) {
            return Ok(Expr::Local(key));
        }

        let Some(&(callee, arity)) = self.callables.get(&key) else {
            return Err(format!("Unknown name \"{}\" {}", name.as_str(), at));
        };

        let args = match arguments {
            Some(arguments) => arguments
                .into_inner()
                .map(|arg| self.expression(arg, scope))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        if args.len() != arity {
            return Err(format!(
                "Parameter count mismatch: \"{}\" expects {}, got {} {}",
                name.as_str(),
                arity,
                args.len(),
                at
            ));
        }
        Ok(Expr::Call { callee, args })
    }
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, String> {
    pairs
        .next()
        .ok_or_else(|| format!("Syntax Error: missing {}", what))
}

fn position(pair: &Pair<'_, Rule>) -> String {
    let (line, column) = pair.as_span().start_pos().line_col();
    format!("[line: {}, column: {}]", line, column)
}

fn syntax_error(err: pest::error::Error<Rule>) -> String {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    format!(
        "Syntax Error: {} [line: {}, column: {}]",
        err.variant.message(),
        line,
        column
    )
}
