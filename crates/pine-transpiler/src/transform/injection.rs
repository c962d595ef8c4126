//! Call-site identity and argument capture
//!
//! Stateful library calls keep per-call-site state across bars, so every
//! call gets a stable id. Arguments are captured into hoisted constants
//! through `ns.param(source, lookback, id)` so the runtime sees each input
//! as a series. Inside user functions ids are prefixed with the caller's id
//! at runtime (`$.peekCallId()`), which makes each invocation path unique.

use super::{Parents, Position, Transformer, context_call};
use crate::error::TransformError;
use crate::scope::Resolution;
use pine_estree::ast::{BinaryOp, Expr, Literal, MemberProp};
use tracing::trace;

/// Namespaces whose calls carry state between bars
pub const STATEFUL_NAMESPACES: &[&str] = &[
    "ta",
    "math",
    "request",
    "array",
    "matrix",
    "map",
    "input",
    "str",
    "strategy",
    "color",
    "timeframe",
];

/// Helpers called directly even when a user function shadows the name
pub const EXEMPT_CALLS: &[&str] = &["na", "nz", "fixnan", "isNaN", "isFinite"];

/// Call-id prefix for user function calls
const USER_CALL_PREFIX: &str = "fn";

impl Transformer {
    pub(crate) fn call(
        &mut self,
        callee: Expr,
        args: Vec<Expr>,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        if let Some(name) = callee.as_ident()
            && self.is_user_call(name)
        {
            let name = name.to_string();
            return self.user_call(name, args, parents);
        }
        if let Some(namespace) = self.stateful_namespace(&callee) {
            return self.namespace_call(namespace, callee, args, parents);
        }

        let callee = self.expr(callee, Position::Callee, parents)?;
        let args = self.values(args, parents)?;
        Ok(Expr::call(callee, args))
    }

    fn is_user_call(&self, name: &str) -> bool {
        self.scopes.is_user_function(name)
            && !EXEMPT_CALLS.contains(&name)
            && self.scopes.resolve(name) == Resolution::Foreign
    }

    /// `ns` for `ns.fn(...)` when `ns` is a library namespace and not a
    /// user variable of the same name.
    fn stateful_namespace(&self, callee: &Expr) -> Option<String> {
        let Expr::Member {
            property: MemberProp::Name(_),
            ..
        } = callee
        else {
            return None;
        };
        let root = callee.root_ident()?;
        let stateful = STATEFUL_NAMESPACES.contains(&root)
            && matches!(
                self.scopes.resolve(root),
                Resolution::ContextBound | Resolution::Foreign
            );
        stateful.then(|| root.to_string())
    }

    /// `f(a, b)` becomes `$.call(f, id, a, b)`; bare names are passed as
    /// handles so the callee can index their history.
    fn user_call(
        &mut self,
        name: String,
        args: Vec<Expr>,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        let mut call_args = Vec::with_capacity(args.len() + 2);
        for arg in args {
            let arg = match arg {
                ident @ Expr::Ident(_) => self.expr(ident, Position::Handle, parents)?,
                other => self.value(other, parents)?,
            };
            call_args.push(arg);
        }

        let id = self.scopes.generate_call_id(USER_CALL_PREFIX);
        trace!(function = %name, id = %id, "user call");
        let mut full = vec![Expr::Ident(name), self.scoped_id(&id)];
        full.append(&mut call_args);
        Ok(context_call("call", full))
    }

    /// `ta.ema(close, 9)` becomes `ta.ema(p0, p1, "_ta0")` after hoisting
    /// `const p0 = ta.param(close, undefined, "p0")` and friends.
    fn namespace_call(
        &mut self,
        namespace: String,
        callee: Expr,
        args: Vec<Expr>,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        let callee = self.expr(callee, Position::Callee, parents)?;

        let mut call_args = Vec::with_capacity(args.len() + 1);
        for arg in args {
            let arg = match arg {
                // Option bags, spreads and callbacks are not series inputs
                arg @ (Expr::Object(_) | Expr::Spread(_) | Expr::Function(_)) => {
                    self.value(arg, parents)?
                }
                arg => self.capture(&namespace, arg, parents)?,
            };
            call_args.push(arg);
        }

        let id = self.scopes.generate_call_id(&namespace);
        trace!(namespace = %namespace, id = %id, "stateful call");
        call_args.push(self.scoped_id(&id));
        Ok(Expr::call(callee, call_args))
    }

    /// Hoist one argument into a parameter capture and return its name.
    fn capture(
        &mut self,
        namespace: &str,
        arg: Expr,
        parents: &Parents,
    ) -> Result<Expr, TransformError> {
        let (source, lookback) = match arg {
            ident @ Expr::Ident(_) => (self.expr(ident, Position::Handle, parents)?, None),
            Expr::Member {
                object,
                property: MemberProp::Computed(index),
            } if is_history_of_handle(&object, &index, self) => {
                let lookback = self.value(*index, parents)?;
                (self.expr(*object, Position::Handle, parents)?, Some(lookback))
            }
            other => (self.value(other, parents)?, None),
        };

        let id = self.scopes.generate_param_id();
        self.scopes.add_temp(&id);
        let capture = Expr::call(
            Expr::member(Expr::ident(namespace), "param"),
            vec![
                source,
                lookback.unwrap_or_else(Expr::undefined),
                self.scoped_id(&id),
            ],
        );
        self.hoist(&id, capture, parents)?;
        Ok(Expr::ident(id))
    }

    /// A string id, or `$.peekCallId() + id` below a user function.
    fn scoped_id(&self, id: &str) -> Expr {
        if self.scopes.inside_user_function() {
            Expr::binary(
                BinaryOp::Add,
                context_call("peekCallId", Vec::new()),
                Expr::str(id),
            )
        } else {
            Expr::str(id)
        }
    }
}

/// `x[n]` where `x` names a persisted variable or a context handle
fn is_history_of_handle(object: &Expr, index: &Expr, transformer: &Transformer) -> bool {
    if matches!(index, Expr::Lit(Literal::Str(_))) {
        return false;
    }
    match object {
        Expr::Ident(name) => matches!(
            transformer.scopes.resolve(name),
            Resolution::Slot { .. } | Resolution::ContextBound
        ),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use crate::analysis::analyze;
    use crate::transform::transform;
    use pine_estree::{parse_script, print_expr};

    fn rewrite(body: &str) -> Vec<String> {
        let source = format!(
            "(context) => {{\nconst {{ close, high, low }} = context.data;\nconst {{ plot, na, nz, ta, math, strategy }} = context.pine;\n{}\n}}",
            body
        );
        let analysis = analyze(parse_script(&source).unwrap()).unwrap();
        print_expr(&transform(analysis.body, analysis.scopes).unwrap())
            .lines()
            .map(|line| line.trim().to_string())
            .collect()
    }

    fn position(out: &[String], line: &str) -> usize {
        out.iter()
            .position(|l| l == line)
            .unwrap_or_else(|| panic!("missing {:?} in {:#?}", line, out))
    }

    #[test]
    fn test_namespace_arguments_are_captured() {
        let out = rewrite("let fast = ta.ema(close, 9);");
        let p0 = position(&out, "const p0 = ta.param(close, undefined, \"p0\");");
        let p1 = position(&out, "const p1 = ta.param(9, undefined, \"p1\");");
        let call = position(
            &out,
            "$.let.glb1_fast = $.init($.let.glb1_fast, ta.ema(p0, p1, \"_ta0\"));",
        );
        assert!(p0 < p1 && p1 < call);
    }

    #[test]
    fn test_history_and_variable_captures() {
        let out = rewrite("let len = 14; let v = ta.sma(close[1], len); let w = math.max(high - low, 1);");
        position(&out, "const p0 = ta.param(close, 1, \"p0\");");
        position(&out, "const p1 = ta.param($.let.glb1_len, undefined, \"p1\");");
        position(&out, "const p2 = math.param($.get(high, 0) - $.get(low, 0), undefined, \"p2\");");
        position(&out, "$.let.glb1_w = $.init($.let.glb1_w, math.max(p2, p3, \"_math1\"));");
    }

    #[test]
    fn test_nested_calls_hoist_inner_first() {
        let out = rewrite("let x = ta.ema(ta.sma(close, 5), 9);");
        let inner = position(&out, "const p2 = ta.param(ta.sma(p0, p1, \"_ta0\"), undefined, \"p2\");");
        let outer = position(&out, "$.let.glb1_x = $.init($.let.glb1_x, ta.ema(p2, p3, \"_ta1\"));");
        assert!(inner < outer);
    }

    #[test]
    fn test_else_if_captures_stay_inside_the_else_block() {
        let out = rewrite("if (close > 0) { plot(1); } else if (ta.change(close) > 0) { plot(2); }");
        let open_else = position(&out, "} else {");
        let capture = position(&out, "const p0 = ta.param(close, undefined, \"p0\");");
        let inner_if = position(&out, "if (ta.change(p0, \"_ta0\") > 0) {");
        assert_eq!((open_else + 1, capture + 1), (capture, inner_if));
        assert!(!out.iter().any(|l| l.starts_with("} else if")), "{:#?}", out);
    }

    #[test]
    fn test_option_bags_are_not_captured() {
        let out = rewrite("strategy.entry(\"Long\", strategy.long, { qty: 2 });");
        position(&out, "const p1 = strategy.param(strategy.long, undefined, \"p1\");");
        position(&out, "strategy.entry(p0, p1, { qty: 2 }, \"_strategy0\");");
    }

    #[test]
    fn test_user_calls_pass_handles() {
        let out = rewrite(
            "function f(src, n) { return src + n; }
             let k = 3;
             let r = f(close, k);
             let s = f(close[1], k + 1);",
        );
        position(&out, "$.let.glb1_r = $.init($.let.glb1_r, $.call(f, \"_fn0\", close, $.let.glb1_k));");
        position(
            &out,
            "$.let.glb1_s = $.init($.let.glb1_s, $.call(f, \"_fn1\", $.get(close, 1), $.get($.let.glb1_k, 0) + 1));",
        );
    }

    #[test]
    fn test_ids_inside_user_functions_are_prefixed_at_runtime() {
        let out = rewrite(
            "function smooth(src) { return ta.ema(src, 3); }
             function twice(src) { return smooth(src); }",
        );
        position(&out, "const p0 = ta.param(src, undefined, $.peekCallId() + \"p0\");");
        position(&out, "return $.precision(ta.ema(p0, p1, $.peekCallId() + \"_ta0\"));");
        position(&out, "return $.precision($.call(smooth, $.peekCallId() + \"_fn1\", src));");
    }

    #[test]
    fn test_exempt_helpers_are_called_directly() {
        let out = rewrite("function nz(x) { return x; } let y = nz(close);");
        position(&out, "$.let.glb1_y = $.init($.let.glb1_y, nz($.get(close, 0)));");
    }
}
