use super::{Parents, Position, Transformer, context_call, read, slot_ref};
use crate::analysis::is_context_rooted;
use crate::error::TransformError;
use crate::scope::{CONTEXT, FunctionFrame, Resolution};
use pine_estree::ast::{
    AssignOp, BinaryOp, Expr, Literal, MemberProp, Pattern, PropKey, UpdateOp,
};
use pine_estree::parser::expr_to_pattern;

const PASS: &str = "expression";

impl Transformer {
    /// Visit an expression whose current value is used.
    pub(crate) fn value(&mut self, expr: Expr, parents: &Parents) -> Result<Expr, TransformError> {
        self.expr(expr, Position::Value, parents)
    }

    pub(crate) fn values(
        &mut self,
        exprs: Vec<Expr>,
        parents: &Parents,
    ) -> Result<Vec<Expr>, TransformError> {
        exprs.into_iter().map(|e| self.value(e, parents)).collect()
    }

    pub(crate) fn expr(
        &mut self,
        expr: Expr,
        position: Position,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        Ok(match expr {
            Expr::Ident(name) => self.ident(name, position),
            Expr::Lit(_) => expr,
            Expr::Member { object, property } => {
                let here = parents.push("Member");
                self.member(*object, property, position, &here)?
            }
            Expr::Call { callee, args } => {
                let here = parents.push("Call");
                self.call(*callee, args, &here)?
            }
            Expr::New { callee, args } => {
                let here = parents.push("New");
                Expr::New {
                    callee: Box::new(self.expr(*callee, Position::Callee, &here)?),
                    args: self.values(args, &here)?,
                }
            }
            Expr::Assign { op, target, value } => {
                let here = parents.push("Assign");
                self.assign(op, *target, *value, &here)?
            }
            Expr::Update { op, prefix, arg } => {
                let here = parents.push("Update");
                self.update(op, prefix, *arg, &here)?
            }
            Expr::Binary { op, left, right } => {
                let here = parents.push("Binary");
                let left = self.value(*left, &here)?;
                let right = self.value(*right, &here)?;
                equality(op, left, right)
            }
            Expr::Unary { op, arg } => {
                let here = parents.push("Unary");
                Expr::Unary {
                    op,
                    arg: Box::new(self.value(*arg, &here)?),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let here = parents.push("Conditional");
                Expr::Conditional {
                    test: Box::new(self.value(*test, &here)?),
                    consequent: Box::new(self.value(*consequent, &here)?),
                    alternate: Box::new(self.value(*alternate, &here)?),
                }
            }
            Expr::Array(items) => {
                let here = parents.push("Array");
                Expr::Array(self.values(items, &here)?)
            }
            Expr::Sequence(items) => {
                let here = parents.push("Sequence");
                Expr::Sequence(self.values(items, &here)?)
            }
            Expr::Spread(arg) => {
                let here = parents.push("Spread");
                Expr::Spread(Box::new(self.value(*arg, &here)?))
            }
            Expr::Object(props) => {
                let here = parents.push("Object");
                let mut rewritten = Vec::with_capacity(props.len());
                for mut prop in props {
                    if let PropKey::Computed(key) = prop.key {
                        prop.key = PropKey::Computed(Box::new(self.value(*key, &here)?));
                    }
                    prop.value = self.value(prop.value, &here)?;
                    // `{ x }` only survives if `x` was left untouched
                    prop.shorthand = prop.shorthand
                        && matches!((&prop.key, &prop.value),
                            (PropKey::Name(key), Expr::Ident(value)) if key == value);
                    rewritten.push(prop);
                }
                Expr::Object(rewritten)
            }
            Expr::Function(func) => {
                let here = parents.push("FunctionExpression");
                Expr::Function(Box::new(self.function(*func, FunctionFrame::Inline, &here)?))
            }
        })
    }

    /// Persisted variables are read through `$.get`; context-bound handles
    /// are read the same way unless the parent only needs the handle.
    fn ident(&self, name: String, position: Position) -> Expr {
        match (self.scopes.resolve(&name), position) {
            (Resolution::RootParam, _) => Expr::ident(CONTEXT),
            (Resolution::Foreign | Resolution::Loop | Resolution::LocalTemp, _) => {
                Expr::Ident(name)
            }
            (Resolution::ContextBound, Position::Value) => read(Expr::Ident(name), Expr::num(0.0)),
            (Resolution::ContextBound, _) => Expr::Ident(name),
            (Resolution::Slot { renamed, kind }, Position::Handle | Position::Target) => {
                slot_ref(kind, &renamed)
            }
            (Resolution::Slot { renamed, kind }, _) => {
                read(slot_ref(kind, &renamed), Expr::num(0.0))
            }
        }
    }

    fn member(
        &mut self,
        object: Expr,
        property: MemberProp,
        position: Position,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        let index = match property {
            MemberProp::Name(name) => {
                let object = self.expr(object, Position::MemberObject, parents)?;
                return Ok(Expr::member(object, name));
            }
            // A string key is a plain property, not history
            MemberProp::Computed(index) if matches!(*index, Expr::Lit(Literal::Str(_))) => {
                let object = self.expr(object, Position::MemberObject, parents)?;
                return Ok(Expr::index(object, *index));
            }
            MemberProp::Computed(index) => *index,
        };

        let offset = self.value(index, parents)?;
        if position == Position::Target {
            let object = self.expr(object, Position::MemberObject, parents)?;
            return Ok(Expr::index(object, offset));
        }

        // x[n] is the value of x n bars ago
        if let Expr::Ident(name) = &object {
            match self.scopes.resolve(name) {
                Resolution::Slot { renamed, kind } => {
                    return Ok(read(slot_ref(kind, &renamed), offset));
                }
                Resolution::ContextBound => return Ok(read(object, offset)),
                _ => {}
            }
        } else if is_context_rooted(&object, self.scopes.root_name()) {
            let handle = self.expr(object, Position::MemberObject, parents)?;
            return Ok(read(handle, offset));
        } else {
            // An expression has no history of its own until it is persisted
            let value = self.value(object, parents)?;
            let slot = self.series_temp(value, parents)?;
            return Ok(read(slot, offset));
        }
        let object = self.expr(object, Position::MemberObject, parents)?;
        Ok(Expr::index(object, offset))
    }

    /// `x = v` becomes `$.set(ref, v)`; compound operators read the old value.
    fn assign(
        &mut self,
        op: AssignOp,
        target: Expr,
        value: Expr,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        match target {
            Expr::Ident(name) => match self.scopes.resolve(&name) {
                Resolution::Slot { renamed, kind } => {
                    let slot = slot_ref(kind, &renamed);
                    let value = self.value(value, parents)?;
                    let value = match BinaryOp::from_compound(op) {
                        Some(bin) => Expr::binary(bin, read(slot.clone(), Expr::num(0.0)), value),
                        None => value,
                    };
                    Ok(context_call("set", vec![slot, value]))
                }
                Resolution::RootParam => Err(TransformError::new(
                    PASS,
                    parents.path(),
                    "assignment to the context parameter",
                )),
                _ => Ok(Expr::Assign {
                    op,
                    target: Box::new(Expr::Ident(name)),
                    value: Box::new(self.value(value, parents)?),
                }),
            },
            target @ Expr::Member { .. } => Ok(Expr::Assign {
                op,
                target: Box::new(self.expr(target, Position::Target, parents)?),
                value: Box::new(self.value(value, parents)?),
            }),
            target @ (Expr::Array(_) | Expr::Object(_)) if op == AssignOp::Assign => {
                let pattern = expr_to_pattern(target).ok_or_else(|| {
                    TransformError::new(PASS, parents.path(), "invalid destructuring target")
                })?;
                self.destructure(pattern, value, parents)
            }
            _ => Err(TransformError::new(
                PASS,
                parents.path(),
                "invalid assignment target",
            )),
        }
    }

    /// `[a, b] = v` evaluates `v` once into a hoisted temporary, then assigns
    /// each name from it.
    fn destructure(
        &mut self,
        pattern: Pattern,
        value: Expr,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        let value = self.value(value, parents)?;
        let temp = self.scopes.generate_temp();
        self.scopes.add_temp(&temp);
        self.hoist(&temp, value, parents)?;

        let mut leaves = Vec::new();
        pattern_leaves(pattern, Expr::ident(temp), &mut leaves, parents)?;

        let mut writes = Vec::with_capacity(leaves.len());
        for (name, source) in leaves {
            writes.push(self.assign(AssignOp::Assign, Expr::Ident(name), source, parents)?);
        }
        Ok(match writes.len() {
            1 => writes.remove(0),
            _ => Expr::Sequence(writes),
        })
    }

    /// `x++` on a persisted variable becomes `$.set(ref, $.get(ref, 0) + 1)`.
    fn update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        arg: Expr,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        if let Expr::Ident(name) = &arg
            && let Resolution::Slot { renamed, kind } = self.scopes.resolve(name)
        {
            let slot = slot_ref(kind, &renamed);
            let bin = match op {
                UpdateOp::Increment => BinaryOp::Add,
                UpdateOp::Decrement => BinaryOp::Sub,
            };
            let value = Expr::binary(bin, read(slot.clone(), Expr::num(0.0)), Expr::num(1.0));
            return Ok(context_call("set", vec![slot, value]));
        }
        Ok(Expr::Update {
            op,
            prefix,
            arg: Box::new(self.expr(arg, Position::Target, parents)?),
        })
    }
}

/// `a == b` compares through the runtime so `na` and series compare the
/// way the indicator language defines.
fn equality(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let eq = |left, right| Expr::call(Expr::path("$.math.__eq"), vec![left, right]);
    match op {
        BinaryOp::Eq | BinaryOp::StrictEq => eq(left, right),
        BinaryOp::NotEq | BinaryOp::StrictNotEq => Expr::not(eq(left, right)),
        _ => Expr::binary(op, left, right),
    }
}

/// Flatten a destructuring pattern into `(name, source)` pairs.
fn pattern_leaves(
    pattern: Pattern,
    source: Expr,
    leaves: &mut Vec<(String, Expr)>,
    parents: &Parents,
) -> Result<(), TransformError> {
    match pattern {
        Pattern::Ident(name) => leaves.push((name, source)),
        Pattern::Default { target, value } => {
            let source = Expr::binary(BinaryOp::Nullish, source, value);
            pattern_leaves(*target, source, leaves, parents)?;
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
                        pattern_leaves(*inner, rest, leaves, parents)?;
                    }
                    Some(item) => {
                        let element = Expr::index(source.clone(), Expr::num(index as f64));
                        pattern_leaves(item, element, leaves, parents)?;
                    }
                }
            }
        }
        Pattern::Object(props) => {
            for prop in props {
                let field = Expr::member(source.clone(), prop.key);
                pattern_leaves(prop.value, field, leaves, parents)?;
            }
        }
        Pattern::Rest(_) => {
            return Err(TransformError::new(
                PASS,
                parents.path(),
                "rest element outside an array pattern",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use crate::analysis::analyze;
    use crate::transform::transform;
    use pine_estree::{parse_script, print_expr};

    fn rewrite(body: &str) -> Vec<String> {
        let source = format!(
            "(context) => {{\nconst {{ close, bar_index }} = context.data;\nconst {{ plot, na }} = context.pine;\n{}\n}}",
            body
        );
        let analysis = analyze(parse_script(&source).unwrap()).unwrap();
        print_expr(&transform(analysis.body, analysis.scopes).unwrap())
            .lines()
            .map(|line| line.trim().to_string())
            .collect()
    }

    fn has(out: &[String], line: &str) -> bool {
        out.iter().any(|l| l == line)
    }

    #[test]
    fn test_reads_and_writes() {
        let out = rewrite("let x = 10; let y = x + 5; x = y; x += 2;");
        assert!(has(&out, "$.let.glb1_y = $.init($.let.glb1_y, $.get($.let.glb1_x, 0) + 5);"));
        assert!(has(&out, "$.set($.let.glb1_x, $.get($.let.glb1_y, 0));"));
        assert!(
            has(&out, "$.set($.let.glb1_x, $.get($.let.glb1_x, 0) + 2);"),
            "{:?}",
            out
        );
    }

    #[test]
    fn test_history_access() {
        let out = rewrite("let x = close[1]; let y = x[2] + close;");
        assert!(has(&out, "$.let.glb1_x = $.init($.let.glb1_x, $.get(close, 1));"));
        assert!(has(
            &out,
            "$.let.glb1_y = $.init($.let.glb1_y, $.get($.let.glb1_x, 2) + $.get(close, 0));"
        ));
    }

    #[test]
    fn test_history_of_an_expression_reads_a_series_temp() {
        let out = rewrite("let a = (close + bar_index)[1]; let b = a + 1;");
        let temp = out
            .iter()
            .position(|l| {
                l == "$.let.glb1__tmp0 = $.init($.let.glb1__tmp0, $.get(close, 0) + $.get(bar_index, 0));"
            })
            .unwrap_or_else(|| panic!("no series temp in {:#?}", out));
        let decl = out
            .iter()
            .position(|l| l == "$.let.glb1_a = $.init($.let.glb1_a, $.get($.let.glb1__tmp0, 1));")
            .unwrap_or_else(|| panic!("no history read in {:#?}", out));
        assert_eq!(temp + 1, decl);
        assert!(!out.iter().any(|l| l.contains(")[1]")), "{:#?}", out);
    }

    #[test]
    fn test_history_through_the_context_reads_the_handle() {
        let out = rewrite("let o = 1 + context.data.open[2];");
        assert!(
            has(&out, "$.let.glb1_o = $.init($.let.glb1_o, 1 + $.get($.data.open, 2));"),
            "{:?}",
            out
        );
    }

    #[test]
    fn test_string_keys_are_plain_members() {
        let out = rewrite("let o = { a: 1 }; let v = o[\"a\"];");
        assert!(has(&out, "$.let.glb1_v = $.init($.let.glb1_v, $.get($.let.glb1_o, 0)[\"a\"]);"));
    }

    #[test]
    fn test_equality_goes_through_runtime() {
        let out = rewrite("let a = close == 1; let b = close !== bar_index;");
        assert!(has(&out, "$.let.glb1_a = $.init($.let.glb1_a, $.math.__eq($.get(close, 0), 1));"));
        assert!(has(
            &out,
            "$.let.glb1_b = $.init($.let.glb1_b, !$.math.__eq($.get(close, 0), $.get(bar_index, 0)));"
        ));
    }

    #[test]
    fn test_context_handles_stay_raw_where_only_the_handle_is_needed() {
        let out = rewrite("plot(close); let n = na(close);");
        assert!(has(&out, "plot($.get(close, 0));"));
        assert!(has(&out, "$.let.glb1_n = $.init($.let.glb1_n, na($.get(close, 0)));"));
    }

    #[test]
    fn test_update_on_persisted_variable() {
        let out = rewrite("var c = 0; c++; --c;");
        assert!(has(&out, "$.set($.var.glb1_c, $.get($.var.glb1_c, 0) + 1);"));
        assert!(has(&out, "$.set($.var.glb1_c, $.get($.var.glb1_c, 0) - 1);"));
    }

    #[test]
    fn test_destructuring_assignment() {
        let out = rewrite("let a = 0; let b = 0; [a, b] = pair();");
        assert!(has(&out, "const _tmp0 = pair();"));
        assert!(has(&out, "$.set($.let.glb1_a, _tmp0[0]), $.set($.let.glb1_b, _tmp0[1]);"));
    }

    #[test]
    fn test_member_writes_read_the_object() {
        let out = rewrite("let p = make(); p.x = 3;");
        assert!(has(&out, "$.get($.let.glb1_p, 0).x = 3;"));
    }

    #[test]
    fn test_assigning_the_context_is_an_error() {
        let source = "(context) => { context = 1; }";
        let analysis = analyze(parse_script(source).unwrap()).unwrap();
        let err = transform(analysis.body, analysis.scopes).unwrap_err();
        assert_eq!(err.pass, "expression");
        assert!(err.node.ends_with("Assign"), "{}", err.node);
    }
}
