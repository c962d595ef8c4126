//! Scope tracking and identifier allocation for the context transformer
//!
//! Every persisted variable is renamed to `{prefix}{instance}_{name}`, where
//! the instance number counts how many scopes of that kind were entered
//! before it. Two sibling `if` blocks declaring the same name therefore land
//! on `if1_x` and `if2_x`. Counters only ever grow, so a name allocated once
//! is never handed out again within a compilation.

use pine_estree::ast::VarKind;
use std::collections::{HashMap, HashSet};

/// Name the root parameter is rewritten to
pub const CONTEXT: &str = "$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Function,
    If,
    Else,
    For,
    While,
    Block,
}

impl ScopeKind {
    const COUNT: usize = 7;

    pub fn prefix(&self) -> &'static str {
        match self {
            ScopeKind::Global => "glb",
            ScopeKind::Function => "fn",
            ScopeKind::If => "if",
            ScopeKind::Else => "els",
            ScopeKind::For => "for",
            ScopeKind::While => "whl",
            ScopeKind::Block => "blk",
        }
    }

    fn slot(&self) -> usize {
        match self {
            ScopeKind::Global => 0,
            ScopeKind::Function => 1,
            ScopeKind::If => 2,
            ScopeKind::Else => 3,
            ScopeKind::For => 4,
            ScopeKind::While => 5,
            ScopeKind::Block => 6,
        }
    }
}

/// What an identifier refers to at a given point of the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The root parameter (under its original name or `$`)
    RootParam,
    /// Function parameter or a name destructured from the context: a
    /// runtime handle passed around as is
    ContextBound,
    /// Compiler temporary; always a plain JS binding
    LocalTemp,
    /// Loop counter or iteration variable; plain JS binding
    Loop,
    /// Persisted variable living at `$.{kind}.{renamed}`
    Slot { renamed: String, kind: VarKind },
    /// Host global or anything else never declared in the unit
    Foreign,
}

#[derive(Debug, Clone)]
enum Binding {
    Context,
    Loop,
    Temp,
    Slot { renamed: String, kind: VarKind },
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    instance: usize,
    bindings: HashMap<String, Binding>,
}

/// Kind of function body the walk is inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionFrame {
    /// Declared function called through `$.call`
    User,
    /// Any other function expression, e.g. a lifted conditional
    Inline,
}

#[derive(Debug)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
    counters: [usize; ScopeKind::COUNT],
    /// Original spelling of the root parameter
    root_name: String,
    /// Names destructured from the context at the top of the unit
    context_bound: HashSet<String>,
    /// Every loop variable seen so far
    loop_vars: HashSet<String>,
    temps: HashSet<String>,
    /// Identifiers declared anywhere in the unit; generated names avoid them
    reserved: HashSet<String>,
    user_functions: HashSet<String>,
    functions: Vec<FunctionFrame>,
    param_counter: usize,
    call_counter: usize,
    temp_counter: usize,
}

impl ScopeManager {
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut manager = ScopeManager {
            scopes: Vec::new(),
            counters: [0; ScopeKind::COUNT],
            root_name: root_name.into(),
            context_bound: HashSet::new(),
            loop_vars: HashSet::new(),
            temps: HashSet::new(),
            reserved: HashSet::new(),
            user_functions: HashSet::new(),
            functions: Vec::new(),
            param_counter: 0,
            call_counter: 0,
            temp_counter: 0,
        };
        manager.push_scope(ScopeKind::Global);
        manager
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scope stack
    // ─────────────────────────────────────────────────────────────────────

    pub fn push_scope(&mut self, kind: ScopeKind) {
        let counter = &mut self.counters[kind.slot()];
        *counter += 1;
        self.scopes.push(Scope {
            kind,
            instance: *counter,
            bindings: HashMap::new(),
        });
    }

    /// Leave the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    #[cfg(test)]
    fn current_kind(&self) -> ScopeKind {
        self.scopes
            .last()
            .map(|scope| scope.kind)
            .unwrap_or(ScopeKind::Global)
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn bind(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), binding);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Declarations
    // ─────────────────────────────────────────────────────────────────────

    /// Declare a persisted variable in the innermost scope and return its
    /// renamed identifier. Context-bound names keep their spelling.
    pub fn add_variable(&mut self, name: &str, kind: VarKind) -> String {
        if self.resolve(name) == Resolution::ContextBound {
            return name.to_string();
        }
        let (prefix, instance) = match self.scopes.last() {
            Some(scope) => (scope.kind.prefix(), scope.instance),
            None => (ScopeKind::Global.prefix(), 1),
        };
        let renamed = format!("{}{}_{}", prefix, instance, name);
        self.bind(
            name,
            Binding::Slot {
                renamed: renamed.clone(),
                kind,
            },
        );
        renamed
    }

    /// Parameters and context destructuring targets.
    pub fn add_context_bound(&mut self, name: &str) {
        self.bind(name, Binding::Context);
    }

    /// Mark a name as bound to the context for the whole unit.
    pub fn mark_context_bound(&mut self, name: &str) {
        self.context_bound.insert(name.to_string());
    }

    pub fn add_loop_variable(&mut self, name: &str) {
        self.loop_vars.insert(name.to_string());
        self.bind(name, Binding::Loop);
    }

    #[cfg(test)]
    fn is_loop_variable(&self, name: &str) -> bool {
        self.loop_vars.contains(name)
    }

    /// Compiler temporary whose value must keep its history: stored in a
    /// `let` slot of the innermost scope like a declared variable.
    pub fn add_series_temp(&mut self, name: &str) -> String {
        self.add_variable(name, VarKind::Let)
    }

    pub fn add_temp(&mut self, name: &str) {
        self.temps.insert(name.to_string());
        self.bind(name, Binding::Temp);
    }

    pub fn reserve(&mut self, name: &str) {
        self.reserved.insert(name.to_string());
    }

    pub fn add_user_function(&mut self, name: &str) {
        self.user_functions.insert(name.to_string());
    }

    pub fn is_user_function(&self, name: &str) -> bool {
        self.user_functions.contains(name)
    }

    /// Resolve an identifier against the scope chain, innermost first.
    pub fn resolve(&self, name: &str) -> Resolution {
        if name == CONTEXT || name == self.root_name {
            return Resolution::RootParam;
        }
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.bindings.get(name) {
                return match binding {
                    Binding::Context => Resolution::ContextBound,
                    Binding::Loop => Resolution::Loop,
                    Binding::Temp => Resolution::LocalTemp,
                    Binding::Slot { renamed, kind } => Resolution::Slot {
                        renamed: renamed.clone(),
                        kind: *kind,
                    },
                };
            }
        }
        if self.temps.contains(name) {
            Resolution::LocalTemp
        } else if self.context_bound.contains(name) {
            Resolution::ContextBound
        } else if self.loop_vars.contains(name) {
            Resolution::Loop
        } else {
            Resolution::Foreign
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Function frames
    // ─────────────────────────────────────────────────────────────────────

    pub fn enter_function(&mut self, frame: FunctionFrame) {
        self.functions.push(frame);
        self.push_scope(ScopeKind::Function);
    }

    pub fn exit_function(&mut self) {
        self.functions.pop();
        self.pop_scope();
    }

    /// Directly inside a declared function body
    pub fn in_user_function_body(&self) -> bool {
        self.functions.last() == Some(&FunctionFrame::User)
    }

    /// Anywhere below a declared function, so call ids must be dynamic
    pub fn inside_user_function(&self) -> bool {
        self.functions.contains(&FunctionFrame::User)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Generated identifiers
    // ─────────────────────────────────────────────────────────────────────

    /// Name for a hoisted parameter capture: `p0`, `p1`, ...
    pub fn generate_param_id(&mut self) -> String {
        loop {
            let id = format!("p{}", self.param_counter);
            self.param_counter += 1;
            if !self.reserved.contains(&id) {
                return id;
            }
        }
    }

    /// Static call-site id: `_ta0`, `_fn1`, ... One counter is shared by all
    /// namespaces, so ids are unique across the unit.
    pub fn generate_call_id(&mut self, namespace: &str) -> String {
        loop {
            let id = format!("_{}{}", namespace, self.call_counter);
            self.call_counter += 1;
            if !self.reserved.contains(&id) {
                return id;
            }
        }
    }

    pub fn generate_temp(&mut self) -> String {
        loop {
            let id = format!("_tmp{}", self.temp_counter);
            self.temp_counter += 1;
            if !self.reserved.contains(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_renaming_uses_kind_and_instance() {
        let mut scopes = ScopeManager::new("context");
        assert_eq!(scopes.add_variable("x", VarKind::Let), "glb1_x");

        scopes.push_scope(ScopeKind::If);
        assert_eq!(scopes.add_variable("x", VarKind::Let), "if1_x");
        scopes.pop_scope();

        scopes.push_scope(ScopeKind::If);
        assert_eq!(scopes.add_variable("x", VarKind::Let), "if2_x");
        scopes.pop_scope();

        scopes.push_scope(ScopeKind::Else);
        assert_eq!(scopes.add_variable("x", VarKind::Let), "els1_x");
        scopes.pop_scope();

        assert_eq!(
            scopes.resolve("x"),
            Resolution::Slot {
                renamed: "glb1_x".into(),
                kind: VarKind::Let
            }
        );
    }

    #[test]
    fn test_inner_bindings_shadow_outer() {
        let mut scopes = ScopeManager::new("$");
        scopes.add_variable("len", VarKind::Var);
        scopes.enter_function(FunctionFrame::User);
        scopes.add_context_bound("len");
        assert_eq!(scopes.resolve("len"), Resolution::ContextBound);
        // Redeclaring a parameter keeps its spelling
        assert_eq!(scopes.add_variable("len", VarKind::Let), "len");
        scopes.exit_function();
        assert!(matches!(scopes.resolve("len"), Resolution::Slot { .. }));
    }

    #[test]
    fn test_resolution_categories() {
        let mut scopes = ScopeManager::new("context");
        scopes.mark_context_bound("close");
        scopes.add_loop_variable("i");
        scopes.add_temp("_tmp0");

        assert_eq!(scopes.resolve("context"), Resolution::RootParam);
        assert_eq!(scopes.resolve("$"), Resolution::RootParam);
        assert_eq!(scopes.resolve("close"), Resolution::ContextBound);
        assert_eq!(scopes.resolve("i"), Resolution::Loop);
        assert_eq!(scopes.resolve("_tmp0"), Resolution::LocalTemp);
        assert_eq!(scopes.resolve("Math"), Resolution::Foreign);
        assert!(scopes.is_loop_variable("i"));
    }

    #[test]
    fn test_series_temps_are_slots_of_the_current_scope() {
        let mut scopes = ScopeManager::new("$");
        scopes.push_scope(ScopeKind::If);
        let temp = scopes.generate_temp();
        assert_eq!(scopes.add_series_temp(&temp), "if1__tmp0");
        assert_eq!(
            scopes.resolve("_tmp0"),
            Resolution::Slot {
                renamed: "if1__tmp0".into(),
                kind: VarKind::Let
            }
        );
        scopes.pop_scope();
        assert_eq!(scopes.resolve("_tmp0"), Resolution::Foreign);
    }

    #[test]
    fn test_global_scope_is_never_popped() {
        let mut scopes = ScopeManager::new("$");
        scopes.pop_scope();
        scopes.pop_scope();
        assert_eq!(scopes.depth(), 1);
        assert_eq!(scopes.current_kind(), ScopeKind::Global);
    }

    #[test]
    fn test_generated_ids_skip_reserved_names() {
        let mut scopes = ScopeManager::new("$");
        scopes.reserve("p0");
        scopes.reserve("_ta1");
        scopes.reserve("_tmp0");

        assert_eq!(scopes.generate_param_id(), "p1");
        assert_eq!(scopes.generate_param_id(), "p2");
        assert_eq!(scopes.generate_call_id("ta"), "_ta0");
        assert_eq!(scopes.generate_call_id("ta"), "_ta2");
        assert_eq!(scopes.generate_call_id("fn"), "_fn3");
        assert_eq!(scopes.generate_temp(), "_tmp1");
    }

    #[test]
    fn test_function_frames() {
        let mut scopes = ScopeManager::new("$");
        assert!(!scopes.inside_user_function());

        scopes.enter_function(FunctionFrame::User);
        scopes.enter_function(FunctionFrame::Inline);
        assert!(scopes.inside_user_function());
        assert!(!scopes.in_user_function_body());
        scopes.exit_function();
        assert!(scopes.in_user_function_body());
        scopes.exit_function();
        assert!(!scopes.inside_user_function());
    }
}
