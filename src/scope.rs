use lazy_static::lazy_static;
use oxc_ast::ast::{
    BindingPattern, CatchClause, Class, DoWhileStatement, ForInStatement, ForOfStatement,
    ForStatement, Function, FunctionType, IdentifierReference, SwitchStatement,
    VariableDeclaration, VariableDeclarationKind, WhileStatement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::Span;
use oxc_syntax::scope::ScopeFlags;
use std::collections::{HashMap, HashSet};

lazy_static! {
    /// Names the identifier allocator must never issue bare: either reserved
    /// words or names with an ambient binding in every function.
    static ref RESERVED_NAMES: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "this", "arguments", "break", "case", "catch", "class", "const", "continue",
            "debugger", "default", "delete", "do", "else", "export", "extends", "finally",
            "for", "function", "if", "import", "in", "instanceof", "let", "new", "return",
            "super", "switch", "throw", "try", "typeof", "var", "void", "while", "with",
            "yield", "null", "true", "false", "undefined",
        ] {
            s.insert(word);
        }
        s
    };
}

pub type ScopeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
    Param,
}

impl DeclarationKind {
    pub fn is_block_scoped(self) -> bool {
        matches!(self, DeclarationKind::Let | DeclarationKind::Const)
    }

    pub fn of(kind: VariableDeclarationKind) -> Self {
        match kind {
            VariableDeclarationKind::Var => DeclarationKind::Var,
            VariableDeclarationKind::Let => DeclarationKind::Let,
            _ => DeclarationKind::Const,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE TREE
// Arena-owned tree mirroring block/function nesting. Built once, pre-order,
// then only queried: later passes never mutate another pass's scope data.
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Scope {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub is_function: bool,
    pub span: Span,
    pub declarations: HashMap<String, DeclarationKind>,
    declaration_order: Vec<String>,
    used_names: HashSet<String>,
}

pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    fn new(program_span: Span) -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                children: Vec::new(),
                is_function: true,
                span: program_span,
                declarations: HashMap::new(),
                declaration_order: Vec::new(),
                used_names: HashSet::new(),
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        0
    }

    fn add_scope(&mut self, parent: ScopeId, is_function: bool, span: Span) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(parent),
            children: Vec::new(),
            is_function,
            span,
            declarations: HashMap::new(),
            declaration_order: Vec::new(),
            used_names: HashSet::new(),
        });
        self.scopes[parent].children.push(id);
        id
    }

    /// Registers every leaf name of a (flat) binding pattern. `var` names
    /// hoist to the nearest function scope; block-scoped names stay put.
    pub fn add_declaration(&mut self, scope: ScopeId, pattern: &BindingPattern<'_>, kind: DeclarationKind) {
        match pattern {
            BindingPattern::BindingIdentifier(id) => {
                self.declare(scope, id.name.as_str(), kind);
            }
            BindingPattern::ObjectPattern(obj) => {
                for prop in &obj.properties {
                    self.add_declaration(scope, &prop.value, kind);
                }
                if let Some(rest) = &obj.rest {
                    self.add_declaration(scope, &rest.argument, kind);
                }
            }
            BindingPattern::ArrayPattern(arr) => {
                for element in arr.elements.iter().flatten() {
                    self.add_declaration(scope, element, kind);
                }
                if let Some(rest) = &arr.rest {
                    self.add_declaration(scope, &rest.argument, kind);
                }
            }
            BindingPattern::AssignmentPattern(assignment) => {
                self.add_declaration(scope, &assignment.left, kind);
            }
        }
    }

    fn declare(&mut self, scope: ScopeId, name: &str, kind: DeclarationKind) {
        let target = if kind == DeclarationKind::Var {
            self.find_scope(scope, true)
        } else {
            scope
        };
        let s = &mut self.scopes[target];
        if !s.declarations.contains_key(name) {
            s.declaration_order.push(name.to_string());
        }
        s.declarations.insert(name.to_string(), kind);
        s.used_names.insert(name.to_string());
    }

    pub fn record_use(&mut self, scope: ScopeId, name: &str) {
        self.scopes[scope].used_names.insert(name.to_string());
    }

    /// Nearest enclosing scope; with `function_boundary`, skips block scopes
    /// to land on the nearest function-level scope.
    pub fn find_scope(&self, from: ScopeId, function_boundary: bool) -> ScopeId {
        let mut current = from;
        while function_boundary && !self.scopes[current].is_function {
            current = self.scopes[current].parent.expect("root scope is a function scope");
        }
        current
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope].parent
    }

    pub fn is_function(&self, scope: ScopeId) -> bool {
        self.scopes[scope].is_function
    }

    pub fn declaration_kind(&self, scope: ScopeId, name: &str) -> Option<DeclarationKind> {
        self.scopes[scope].declarations.get(name).copied()
    }

    /// Innermost scope whose span contains `offset`.
    pub fn scope_at(&self, offset: u32) -> ScopeId {
        let mut current = self.root();
        'descend: loop {
            for &child in &self.scopes[current].children {
                let span = self.scopes[child].span;
                if span.start <= offset && offset < span.end {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// Declaring scope of the binding a reference at `offset` resolves to.
    pub fn resolve(&self, offset: u32, name: &str) -> Option<ScopeId> {
        let mut current = Some(self.scope_at(offset));
        while let Some(scope) = current {
            if self.scopes[scope].declarations.contains_key(name) {
                return Some(scope);
            }
            current = self.scopes[scope].parent;
        }
        None
    }

    /// True when `inner` is `outer` or nested anywhere below it.
    pub fn is_inside(&self, inner: ScopeId, outer: ScopeId) -> bool {
        let mut current = Some(inner);
        while let Some(scope) = current {
            if scope == outer {
                return true;
            }
            current = self.scopes[scope].parent;
        }
        false
    }

    /// True when walking up from `inner` to `outer` crosses a function scope.
    pub fn crosses_function_boundary(&self, inner: ScopeId, outer: ScopeId) -> bool {
        let mut current = inner;
        while current != outer {
            if self.scopes[current].is_function {
                return true;
            }
            current = self.scopes[current]
                .parent
                .expect("inner scope is not nested inside outer scope");
        }
        false
    }

    /// Collision-free synthetic identifier: `base`, else `base$1`, `base$2`,
    /// probing every scope that could statically observe the name (ancestors
    /// of the creating scope and its whole subtree). The chosen name is
    /// recorded so no two calls ever issue the same one.
    pub fn create_identifier(&mut self, scope: ScopeId, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut counter = 0u32;
        while RESERVED_NAMES.contains(candidate.as_str()) || self.observes(scope, &candidate) {
            counter += 1;
            candidate = format!("{}${}", base, counter);
        }
        self.scopes[scope].used_names.insert(candidate.clone());
        candidate
    }

    fn observes(&self, scope: ScopeId, name: &str) -> bool {
        let mut current = self.scopes[scope].parent;
        while let Some(s) = current {
            let node = &self.scopes[s];
            if node.declarations.contains_key(name) || node.used_names.contains(name) {
                return true;
            }
            current = node.parent;
        }
        let mut stack = vec![scope];
        while let Some(s) = stack.pop() {
            let node = &self.scopes[s];
            if node.declarations.contains_key(name) || node.used_names.contains(name) {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }

    /// Plans renames for block-scoped declarations whose lowered `var` form
    /// would collide inside one function-level namespace. The first binding
    /// of a name keeps it; later block-scoped duplicates get synthetics.
    pub fn plan_renames(&mut self) -> HashMap<(ScopeId, String), String> {
        let mut renames = HashMap::new();
        for function in 0..self.scopes.len() {
            if !self.scopes[function].is_function {
                continue;
            }
            let mut seen: HashSet<String> =
                self.scopes[function].declarations.keys().cloned().collect();
            let mut blocks = Vec::new();
            self.collect_blocks(function, &mut blocks);
            for block in blocks {
                let names = self.scopes[block].declaration_order.clone();
                for name in names {
                    let kind = self.scopes[block].declarations[&name];
                    if !kind.is_block_scoped() {
                        continue;
                    }
                    if seen.contains(&name) {
                        let fresh = self.create_identifier(function, &name);
                        self.declare(block, &fresh, kind);
                        seen.insert(fresh.clone());
                        renames.insert((block, name), fresh);
                    } else {
                        seen.insert(name);
                    }
                }
            }
        }
        renames
    }

    fn collect_blocks(&self, function: ScopeId, out: &mut Vec<ScopeId>) {
        for &child in &self.scopes[function].children {
            if self.scopes[child].is_function {
                continue;
            }
            out.push(child);
            self.collect_blocks(child, out);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE BUILDER
// Pre-order traversal: parents exist before their children, declarations are
// registered site by site, and every referenced name is recorded so the
// identifier allocator never captures one.
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ScopeBuilder {
    pub tree: ScopeTree,
    stack: Vec<ScopeId>,
}

impl ScopeBuilder {
    pub fn new(program_span: Span) -> Self {
        let tree = ScopeTree::new(program_span);
        let root = tree.root();
        Self {
            tree,
            stack: vec![root],
        }
    }

    pub fn into_tree(self) -> ScopeTree {
        self.tree
    }

    fn current(&self) -> ScopeId {
        *self.stack.last().expect("scope stack is never empty")
    }

    fn push(&mut self, is_function: bool, span: Span) {
        let scope = self.tree.add_scope(self.current(), is_function, span);
        self.stack.push(scope);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }
}

impl<'a> Visit<'a> for ScopeBuilder {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if let Some(id) = &func.id {
            if func.r#type == FunctionType::FunctionDeclaration {
                // Hoisted into the enclosing scope like a var.
                self.tree
                    .declare(self.current(), id.name.as_str(), DeclarationKind::Var);
            }
        }
        self.push(true, func.span);
        if let Some(id) = &func.id {
            if func.r#type != FunctionType::FunctionDeclaration {
                self.tree
                    .declare(self.current(), id.name.as_str(), DeclarationKind::Var);
            }
        }
        for param in &func.params.items {
            self.tree
                .add_declaration(self.current(), &param.pattern, DeclarationKind::Param);
        }
        walk::walk_function(self, func, flags);
        self.pop();
    }

    fn visit_arrow_function_expression(
        &mut self,
        func: &oxc_ast::ast::ArrowFunctionExpression<'a>,
    ) {
        self.push(true, func.span);
        for param in &func.params.items {
            self.tree
                .add_declaration(self.current(), &param.pattern, DeclarationKind::Param);
        }
        walk::walk_arrow_function_expression(self, func);
        self.pop();
    }

    fn visit_class(&mut self, class: &Class<'a>) {
        if let Some(id) = &class.id {
            self.tree
                .declare(self.current(), id.name.as_str(), DeclarationKind::Let);
        }
        walk::walk_class(self, class);
    }

    fn visit_block_statement(&mut self, block: &oxc_ast::ast::BlockStatement<'a>) {
        self.push(false, block.span);
        walk::walk_block_statement(self, block);
        self.pop();
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.push(false, stmt.span);
        walk::walk_for_statement(self, stmt);
        self.pop();
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        self.push(false, stmt.span);
        walk::walk_for_in_statement(self, stmt);
        self.pop();
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        self.push(false, stmt.span);
        walk::walk_for_of_statement(self, stmt);
        self.pop();
    }

    fn visit_while_statement(&mut self, stmt: &WhileStatement<'a>) {
        self.push(false, stmt.span);
        walk::walk_while_statement(self, stmt);
        self.pop();
    }

    fn visit_do_while_statement(&mut self, stmt: &DoWhileStatement<'a>) {
        self.push(false, stmt.span);
        walk::walk_do_while_statement(self, stmt);
        self.pop();
    }

    fn visit_switch_statement(&mut self, stmt: &SwitchStatement<'a>) {
        self.push(false, stmt.span);
        walk::walk_switch_statement(self, stmt);
        self.pop();
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause<'a>) {
        self.push(false, clause.span);
        if let Some(param) = &clause.param {
            self.tree
                .add_declaration(self.current(), &param.pattern, DeclarationKind::Param);
        }
        walk::walk_catch_clause(self, clause);
        self.pop();
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        let kind = DeclarationKind::of(decl.kind);
        for declarator in &decl.declarations {
            self.tree.add_declaration(self.current(), &declarator.id, kind);
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.tree.record_use(self.current(), ident.name.as_str());
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.tree.record_use(self.current(), ident.name.as_str());
    }
}
