use super::{Parents, Transformer, context_call, slot_ref};
use crate::analysis::is_context_rooted;
use crate::error::TransformError;
use crate::scope::{FunctionFrame, Resolution, ScopeKind};
use pine_estree::ast::{AssignOp, Declarator, Expr, Function, FunctionBody, Pattern, Stmt, VarKind};

const PASS: &str = "statement";

impl Transformer {
    pub(crate) fn stmt(
        &mut self,
        stmt: Stmt,
        parents: &Parents,
    ) -> Result<Vec<Stmt>, TransformError> {
        let out = match stmt {
            Stmt::Var { kind, decls } => {
                let here = parents.push("VariableDeclaration");
                let mut out = Vec::with_capacity(decls.len());
                for decl in decls {
                    out.push(self.declaration(kind, decl, &here)?);
                }
                return Ok(out);
            }
            Stmt::Function(func) => {
                let here = parents.push("FunctionDeclaration");
                Stmt::Function(self.function(func, FunctionFrame::User, &here)?)
            }
            Stmt::Return(value) => {
                let here = parents.push("Return");
                match value {
                    Some(value) if self.scopes.in_user_function_body() => {
                        Stmt::Return(Some(self.user_return(value, &here)?))
                    }
                    Some(value) => Stmt::Return(Some(self.value(value, &here)?)),
                    None => Stmt::Return(None),
                }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                let here = parents.push("If");
                let test = self.value(test, &here)?;
                let consequent = self.scoped_block(ScopeKind::If, *consequent, &here)?;
                let alternate = match alternate {
                    None => None,
                    Some(alternate) => {
                        let mut body = self.scoped_block(ScopeKind::Else, *alternate, &here)?;
                        let chained = body.len() == 1 && matches!(body[0], Stmt::If { .. });
                        Some(Box::new(if chained {
                            body.remove(0)
                        } else {
                            Stmt::Block(body)
                        }))
                    }
                };
                Stmt::If {
                    test,
                    consequent: Box::new(Stmt::Block(consequent)),
                    alternate,
                }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let here = parents.push("For");
                self.scopes.push_scope(ScopeKind::For);
                let init = match init.map(|init| *init) {
                    Some(Stmt::Var { kind, decls }) => {
                        let mut loop_decls = Vec::with_capacity(decls.len());
                        for decl in decls {
                            let init = decl.init.map(|e| self.value(e, &here)).transpose()?;
                            for name in decl.id.bound_names() {
                                self.scopes.add_loop_variable(&name);
                            }
                            loop_decls.push(Declarator { id: decl.id, init });
                        }
                        Some(Box::new(Stmt::Var {
                            kind,
                            decls: loop_decls,
                        }))
                    }
                    Some(Stmt::Expr(expr)) => Some(Box::new(Stmt::Expr(self.value(expr, &here)?))),
                    Some(other) => {
                        return Err(TransformError::new(
                            PASS,
                            here.path(),
                            format!("unexpected loop initializer {:?}", other),
                        ));
                    }
                    None => None,
                };
                let test = test.map(|e| self.value(e, &here)).transpose()?;
                let update = update.map(|e| self.value(e, &here)).transpose()?;
                let body = self.sequence(body.into_block(), &here)?;
                self.scopes.pop_scope();
                Stmt::For {
                    init,
                    test,
                    update,
                    body: Box::new(Stmt::Block(body)),
                }
            }
            Stmt::ForEach {
                each,
                left,
                right,
                body,
            } => {
                let here = parents.push("ForEach");
                let right = self.value(right, &here)?;
                self.scopes.push_scope(ScopeKind::For);
                for name in left.pattern.bound_names() {
                    self.scopes.add_loop_variable(&name);
                }
                let body = self.sequence(body.into_block(), &here)?;
                self.scopes.pop_scope();
                Stmt::ForEach {
                    each,
                    left,
                    right,
                    body: Box::new(Stmt::Block(body)),
                }
            }
            Stmt::While { test, body } => {
                let here = parents.push("While");
                let test = self.value(test, &here)?;
                let body = self.scoped_block(ScopeKind::While, *body, &here)?;
                Stmt::While {
                    test,
                    body: Box::new(Stmt::Block(body)),
                }
            }
            Stmt::Block(body) => {
                let here = parents.push("Block");
                Stmt::Block(self.scoped_block(ScopeKind::Block, Stmt::Block(body), &here)?)
            }
            Stmt::Expr(expr) => {
                let here = parents.push("ExpressionStatement");
                Stmt::Expr(self.value(expr, &here)?)
            }
            Stmt::Empty => return Ok(Vec::new()),
            other @ (Stmt::Break | Stmt::Continue) => other,
        };
        Ok(vec![out])
    }

    /// `let x = v` becomes `$.let.glb1_x = $.init($.let.glb1_x, v)`.
    fn declaration(
        &mut self,
        kind: VarKind,
        decl: Declarator,
        parents: &Parents,
    ) -> Result<Stmt, TransformError> {
        let raw = |id: Pattern, init: Option<Expr>| Stmt::Var {
            kind,
            decls: vec![Declarator { id, init }],
        };

        let name = match decl.id {
            Pattern::Ident(name) => name,
            pattern => {
                // Only destructuring off the context survives normalization
                let rooted = decl
                    .init
                    .as_ref()
                    .is_some_and(|init| is_context_rooted(init, self.scopes.root_name()));
                if !rooted {
                    return Err(TransformError::new(
                        PASS,
                        parents.path(),
                        "destructuring declaration reached the transformer",
                    ));
                }
                for name in pattern.bound_names() {
                    self.scopes.add_context_bound(&name);
                }
                let init = decl.init.map(|e| self.value(e, parents)).transpose()?;
                return Ok(raw(pattern, init));
            }
        };

        if decl
            .init
            .as_ref()
            .is_some_and(|init| is_context_rooted(init, self.scopes.root_name()))
        {
            self.scopes.add_context_bound(&name);
            let init = decl.init.map(|e| self.value(e, parents)).transpose()?;
            return Ok(raw(Pattern::Ident(name), init));
        }

        let init = decl.init.map(|e| self.value(e, parents)).transpose()?;

        if self.scopes.resolve(&name) == Resolution::LocalTemp {
            return Ok(raw(Pattern::Ident(name), init));
        }

        let renamed = self.scopes.add_variable(&name, kind);
        if renamed == name {
            // Redeclared parameter: stays a plain binding
            return Ok(raw(Pattern::Ident(name), init));
        }

        let slot = slot_ref(kind, &renamed);
        let initializer = if kind == VarKind::Var {
            "initVar"
        } else {
            "init"
        };
        let value = context_call(
            initializer,
            vec![slot.clone(), init.unwrap_or_else(Expr::undefined)],
        );
        Ok(Stmt::Expr(Expr::Assign {
            op: AssignOp::Assign,
            target: Box::new(slot),
            value: Box::new(value),
        }))
    }

    /// Declared functions and inline function expressions share the walk;
    /// the frame decides how `return` and call ids are rewritten inside.
    pub(crate) fn function(
        &mut self,
        func: Function,
        frame: FunctionFrame,
        parents: &Parents,
    ) -> Result<Function, TransformError> {
        self.scopes.enter_function(frame);

        let mut params = Vec::with_capacity(func.params.len());
        for param in func.params {
            let param = match param {
                Pattern::Default { target, value } => Pattern::Default {
                    value: self.value(value, parents)?,
                    target,
                },
                other => other,
            };
            for name in param.bound_names() {
                self.scopes.add_context_bound(&name);
            }
            params.push(param);
        }

        let body = match func.body {
            FunctionBody::Block(body) => body,
            FunctionBody::Expr(expr) => vec![Stmt::Return(Some(*expr))],
        };
        let body = self.sequence(body, parents)?;
        self.scopes.exit_function();

        Ok(Function {
            params,
            body: FunctionBody::Block(body),
            ..func
        })
    }

    /// Scalars are rounded through `$.precision`; tuple elements are each
    /// read as current values.
    fn user_return(&mut self, value: Expr, parents: &Parents) -> Result<Expr, TransformError> {
        match value {
            Expr::Array(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    elements.push(self.value(item, parents)?);
                }
                Ok(Expr::Array(elements))
            }
            other => Ok(context_call("precision", vec![self.value(other, parents)?])),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use crate::analysis::analyze;
    use crate::transform::transform;
    use pine_estree::{parse_script, print_expr};

    fn rewrite(body: &str) -> String {
        let program = parse_script(&format!("(context) => {{\n{}\n}}", body)).unwrap();
        let analysis = analyze(program).unwrap();
        print_expr(&transform(analysis.body, analysis.scopes).unwrap())
    }

    fn lines(body: &str) -> Vec<String> {
        rewrite(body)
            .lines()
            .map(|line| line.trim().to_string())
            .collect()
    }

    #[test]
    fn test_declaration_kinds() {
        let out = lines("var a = 0; let b = 1; const c = 2; let d;");
        assert!(out.contains(&"$.var.glb1_a = $.initVar($.var.glb1_a, 0);".to_string()));
        assert!(out.contains(&"$.let.glb1_b = $.init($.let.glb1_b, 1);".to_string()));
        assert!(out.contains(&"$.const.glb1_c = $.init($.const.glb1_c, 2);".to_string()));
        assert!(out.contains(&"$.let.glb1_d = $.init($.let.glb1_d, undefined);".to_string()));
    }

    #[test]
    fn test_context_destructuring_stays_raw() {
        let out = rewrite("const { close } = context.data;\nconst src = context.data.open;");
        assert!(out.starts_with("($) => {\n    const { close } = $.data;\n"));
        assert!(out.contains("    const src = $.data.open;\n"));
    }

    #[test]
    fn test_sibling_branches_get_distinct_names() {
        let out = lines("if (a) { let t = 1; } else if (b) { let t = 2; } else { let t = 3; }");
        assert!(out.contains(&"$.let.if1_t = $.init($.let.if1_t, 1);".to_string()));
        assert!(out.contains(&"$.let.if2_t = $.init($.let.if2_t, 2);".to_string()));
        assert!(out.contains(&"$.let.els2_t = $.init($.let.els2_t, 3);".to_string()));
        assert!(out.contains(&"} else if (b) {".to_string()));
    }

    #[test]
    fn test_loop_variables_stay_raw() {
        let out = lines("let s = 0; for (let i = 0; i <= 9; i++) { s += i; }");
        assert!(out.contains(&"for (let i = 0; i <= 9; i++) {".to_string()));
        assert!(
            out.contains(&"$.set($.let.glb1_s, $.get($.let.glb1_s, 0) + i);".to_string()),
            "{:?}",
            out
        );
    }

    #[test]
    fn test_loop_bodies_get_their_own_scope() {
        let out = lines("while (x) { let y = 1; } for (const v of xs) { let y = v; }");
        assert!(out.contains(&"$.let.whl1_y = $.init($.let.whl1_y, 1);".to_string()));
        assert!(out.contains(&"$.let.for1_y = $.init($.let.for1_y, v);".to_string()));
    }

    #[test]
    fn test_user_function_returns() {
        let out = lines(
            "function f(x) { let y = x * 2; return y; }
             function g(a, b) { return [a, b]; }",
        );
        assert!(out.contains(&"function f(x) {".to_string()));
        assert!(out.contains(&"$.let.fn1_y = $.init($.let.fn1_y, $.get(x, 0) * 2);".to_string()));
        assert!(out.contains(&"return $.precision($.get($.let.fn1_y, 0));".to_string()));
        assert!(out.contains(&"return [$.get(a, 0), $.get(b, 0)];".to_string()));
    }

    #[test]
    fn test_inline_function_returns_are_not_rounded() {
        let out = lines("let v = (() => { return 1; })();");
        assert!(out.contains(&"return 1;".to_string()), "{:?}", out);
    }

    #[test]
    fn test_nested_blocks() {
        let out = lines("{ let z = 1; }");
        assert!(out.contains(&"$.let.blk1_z = $.init($.let.blk1_z, 1);".to_string()));
    }
}
