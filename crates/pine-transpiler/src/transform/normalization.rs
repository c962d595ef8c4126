//! Structural rewrites that run before the context transformer
//!
//! - arrow functions bound by a declaration become function declarations
//! - destructuring declarations are split into one declaration per name,
//!   reading through a compiler temporary
//! - every control-flow body and concise arrow body becomes a block
//!
//! After this pass each declarator binds exactly one identifier, except for
//! destructuring straight off the context, which stays as written.

use crate::analysis::is_context_rooted;
use crate::error::TransformError;
use crate::scope::ScopeManager;
use pine_estree::ast::{
    BinaryOp, Declarator, Expr, Function, FunctionBody, MemberProp, Pattern, PropKey, Stmt,
    VarKind,
};

const PASS: &str = "normalization";

struct Normalizer<'a> {
    root_name: &'a str,
    scopes: &'a mut ScopeManager,
}

pub fn normalize_body(
    body: Vec<Stmt>,
    root_name: &str,
    scopes: &mut ScopeManager,
) -> Result<Vec<Stmt>, TransformError> {
    Normalizer { root_name, scopes }.body(body)
}

impl Normalizer<'_> {
    fn body(&mut self, body: Vec<Stmt>) -> Result<Vec<Stmt>, TransformError> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    /// A statement position that must hold a block.
    fn block(&mut self, stmt: Stmt) -> Result<Stmt, TransformError> {
        Ok(Stmt::Block(self.body(stmt.into_block())?))
    }

    fn stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> Result<(), TransformError> {
        match stmt {
            Stmt::Var { kind, decls } => {
                for decl in decls {
                    self.declarator(kind, decl, out)?;
                }
            }
            Stmt::Function(func) => out.push(Stmt::Function(self.function(func)?)),
            Stmt::Return(value) => {
                let value = value.map(|v| self.expr(v)).transpose()?;
                out.push(Stmt::Return(value));
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let test = self.expr(test)?;
                let consequent = Box::new(self.block(*consequent)?);
                let alternate = match alternate.map(|alt| *alt) {
                    None => None,
                    // Keep `else if` chains flat
                    Some(nested @ Stmt::If { .. }) => {
                        let mut chain = Vec::with_capacity(1);
                        self.stmt(nested, &mut chain)?;
                        Some(Box::new(if chain.len() == 1 {
                            chain.remove(0)
                        } else {
                            Stmt::Block(chain)
                        }))
                    }
                    Some(other) => Some(Box::new(self.block(other)?)),
                };
                out.push(Stmt::If {
                    test,
                    consequent,
                    alternate,
                });
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let init = match init.map(|init| *init) {
                    Some(Stmt::Var { kind, decls }) => {
                        let mut normalized = Vec::with_capacity(decls.len());
                        for decl in decls {
                            normalized.push(Declarator {
                                id: decl.id,
                                init: decl.init.map(|e| self.expr(e)).transpose()?,
                            });
                        }
                        Some(Box::new(Stmt::Var {
                            kind,
                            decls: normalized,
                        }))
                    }
                    Some(Stmt::Expr(expr)) => Some(Box::new(Stmt::Expr(self.expr(expr)?))),
                    Some(other) => Some(Box::new(other)),
                    None => None,
                };
                out.push(Stmt::For {
                    init,
                    test: test.map(|e| self.expr(e)).transpose()?,
                    update: update.map(|e| self.expr(e)).transpose()?,
                    body: Box::new(self.block(*body)?),
                });
            }
            Stmt::ForEach {
                each,
                left,
                right,
                body,
            } => out.push(Stmt::ForEach {
                each,
                left,
                right: self.expr(right)?,
                body: Box::new(self.block(*body)?),
            }),
            Stmt::While { test, body } => out.push(Stmt::While {
                test: self.expr(test)?,
                body: Box::new(self.block(*body)?),
            }),
            Stmt::Block(body) => out.push(Stmt::Block(self.body(body)?)),
            Stmt::Expr(expr) => out.push(Stmt::Expr(self.expr(expr)?)),
            Stmt::Empty => {}
            other @ (Stmt::Break | Stmt::Continue) => out.push(other),
        }
        Ok(())
    }

    fn declarator(
        &mut self,
        kind: VarKind,
        decl: Declarator,
        out: &mut Vec<Stmt>,
    ) -> Result<(), TransformError> {
        match (decl.id, decl.init) {
            // const f = (x) => ... is a function declaration
            (Pattern::Ident(name), Some(Expr::Function(func))) => {
                let func = Function {
                    name: Some(name),
                    arrow: false,
                    ..*func
                };
                out.push(Stmt::Function(self.function(func)?));
            }
            (id @ Pattern::Ident(_), init) => {
                let init = init.map(|e| self.expr(e)).transpose()?;
                out.push(single(kind, id, init));
            }
            (pattern, Some(init)) if is_context_rooted(&init, self.root_name) => {
                out.push(single(kind, pattern, Some(init)));
            }
            (pattern, Some(init)) => {
                let temp = self.scopes.generate_temp();
                self.scopes.add_temp(&temp);
                let init = self.expr(init)?;
                out.push(single(VarKind::Const, Pattern::Ident(temp.clone()), Some(init)));
                self.expand_pattern(kind, pattern, Expr::ident(temp), out)?;
            }
            (_, None) => {
                return Err(TransformError::new(
                    PASS,
                    "VariableDeclarator",
                    "destructuring declaration without an initializer",
                ));
            }
        }
        Ok(())
    }

    /// One declaration per bound name, each reading `source` through the
    /// pattern's path.
    fn expand_pattern(
        &mut self,
        kind: VarKind,
        pattern: Pattern,
        source: Expr,
        out: &mut Vec<Stmt>,
    ) -> Result<(), TransformError> {
        match pattern {
            Pattern::Ident(name) => out.push(single(kind, Pattern::Ident(name), Some(source))),
            Pattern::Default { target, value } => {
                let value = self.expr(value)?;
                let source = Expr::binary(BinaryOp::Nullish, source, value);
                self.expand_pattern(kind, *target, source, out)?;
            }
            Pattern::Array(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    match item {
                        None => {}
                        Some(Pattern::Rest(inner)) => {
                            let rest = Expr::call(
                                Expr::member(source.clone(), "slice"),
                                vec![Expr::num(index as f64)],
                            );
                            self.expand_pattern(kind, *inner, rest, out)?;
                        }
                        Some(item) => {
                            let element = Expr::index(source.clone(), Expr::num(index as f64));
                            self.expand_pattern(kind, item, element, out)?;
                        }
                    }
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    let field = Expr::member(source.clone(), prop.key);
                    self.expand_pattern(kind, prop.value, field, out)?;
                }
            }
            Pattern::Rest(_) => {
                return Err(TransformError::new(
                    PASS,
                    "RestElement",
                    "rest element outside an array pattern",
                ));
            }
        }
        Ok(())
    }

    fn function(&mut self, func: Function) -> Result<Function, TransformError> {
        let body = match func.body {
            FunctionBody::Block(body) => self.body(body)?,
            FunctionBody::Expr(expr) => vec![Stmt::Return(Some(self.expr(*expr)?))],
        };
        Ok(Function {
            body: FunctionBody::Block(body),
            ..func
        })
    }

    /// Expressions only change where they contain functions.
    fn expr(&mut self, expr: Expr) -> Result<Expr, TransformError> {
        Ok(match expr {
            Expr::Function(func) => Expr::Function(Box::new(self.function(*func)?)),
            Expr::Ident(_) | Expr::Lit(_) => expr,
            Expr::Array(items) => Expr::Array(self.exprs(items)?),
            Expr::Sequence(items) => Expr::Sequence(self.exprs(items)?),
            Expr::Object(props) => {
                let mut normalized = Vec::with_capacity(props.len());
                for mut prop in props {
                    if let PropKey::Computed(key) = prop.key {
                        prop.key = PropKey::Computed(Box::new(self.expr(*key)?));
                    }
                    prop.value = self.expr(prop.value)?;
                    normalized.push(prop);
                }
                Expr::Object(normalized)
            }
            Expr::Unary { op, arg } => Expr::Unary {
                op,
                arg: Box::new(self.expr(*arg)?),
            },
            Expr::Update { op, prefix, arg } => Expr::Update {
                op,
                prefix,
                arg: Box::new(self.expr(*arg)?),
            },
            Expr::Spread(arg) => Expr::Spread(Box::new(self.expr(*arg)?)),
            Expr::Binary { op, left, right } => {
                Expr::binary(op, self.expr(*left)?, self.expr(*right)?)
            }
            Expr::Assign { op, target, value } => Expr::Assign {
                op,
                target: Box::new(self.expr(*target)?),
                value: Box::new(self.expr(*value)?),
            },
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => Expr::Conditional {
                test: Box::new(self.expr(*test)?),
                consequent: Box::new(self.expr(*consequent)?),
                alternate: Box::new(self.expr(*alternate)?),
            },
            Expr::Call { callee, args } => Expr::call(self.expr(*callee)?, self.exprs(args)?),
            Expr::New { callee, args } => Expr::New {
                callee: Box::new(self.expr(*callee)?),
                args: self.exprs(args)?,
            },
            Expr::Member { object, property } => Expr::Member {
                object: Box::new(self.expr(*object)?),
                property: match property {
                    MemberProp::Computed(index) => {
                        MemberProp::Computed(Box::new(self.expr(*index)?))
                    }
                    name @ MemberProp::Name(_) => name,
                },
            },
        })
    }

    fn exprs(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>, TransformError> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }
}

fn single(kind: VarKind, id: Pattern, init: Option<Expr>) -> Stmt {
    Stmt::Var {
        kind,
        decls: vec![Declarator { id, init }],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pine_estree::{parse_script, print_program};
    use pine_estree::ast::Program;

    fn normalize(source: &str) -> String {
        let program = parse_script(source).unwrap();
        let mut scopes = ScopeManager::new("$");
        let body = normalize_body(program.body, "$", &mut scopes).unwrap();
        print_program(&Program { body })
    }

    #[test]
    fn test_arrow_declarations_become_functions() {
        assert_eq!(
            normalize("const f = (x) => x * 2;"),
            "function f(x) {\n    return x * 2;\n}\n"
        );
    }

    #[test]
    fn test_array_destructuring_reads_through_temp() {
        assert_eq!(
            normalize("const [a, , b] = ta.macd(close);"),
            "const _tmp0 = ta.macd(close);\nconst a = _tmp0[0];\nconst b = _tmp0[2];\n"
        );
    }

    #[test]
    fn test_object_and_nested_destructuring() {
        assert_eq!(
            normalize("let { x, y: [p, q = 1] } = pt;"),
            "const _tmp0 = pt;\nlet x = _tmp0.x;\nlet p = _tmp0.y[0];\nlet q = _tmp0.y[1] ?? 1;\n"
        );
    }

    #[test]
    fn test_context_destructuring_is_kept() {
        assert_eq!(
            normalize("const { close } = $.data;"),
            "const { close } = $.data;\n"
        );
    }

    #[test]
    fn test_bodies_become_blocks() {
        assert_eq!(
            normalize("if (a) b(); else if (c) d(); else e();"),
            "if (a) {\n    b();\n} else if (c) {\n    d();\n} else {\n    e();\n}\n"
        );
        assert_eq!(
            normalize("while (a) a--;"),
            "while (a) {\n    a--;\n}\n"
        );
    }

    #[test]
    fn test_missing_initializer_is_an_error() {
        let program = parse_script("let [a, b];").unwrap();
        let mut scopes = ScopeManager::new("$");
        let err = normalize_body(program.body, "$", &mut scopes).unwrap_err();
        assert_eq!(err.pass, "normalization");
    }
}
