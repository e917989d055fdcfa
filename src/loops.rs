use oxc_ast::ast::{
    ArrowFunctionExpression, BindingPattern, BreakStatement, ContinueStatement, DoWhileStatement,
    ForInStatement, ForOfStatement, ForStatement, ForStatementInit, ForStatementLeft, Function,
    IdentifierReference, LabeledStatement, ReturnStatement, SimpleAssignmentTarget, Statement,
    SwitchStatement, ThisExpression, VariableDeclaration, VariableDeclarationKind, WhileStatement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use oxc_syntax::scope::ScopeFlags;
use std::collections::HashSet;

use crate::scope::{ScopeId, ScopeTree};
use crate::transform::{line_indent, Frame, Lowerer, ParamOverride};
use crate::validate::{CompileError, ERR_LABELLED_JUMP};

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP TRANSFORM
// A loop whose body creates closures over its block-scoped bindings cannot
// be lowered by keyword rewriting alone: every iteration must get its own
// binding. The body is lifted into `var loop = function (...) { ... }` ahead
// of the loop and the body position becomes a call. Control flow that used
// to cross the body boundary is carried through sentinel return values.
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) enum LoopKind {
    For,
    ForIn,
    ForOf,
    While,
    DoWhile,
}

#[derive(Default)]
struct CaptureAnalysis {
    needs_wrapper: bool,
    can_break: bool,
    can_return: bool,
    escaping_label: bool,
    this_refs: Vec<Span>,
    arguments_refs: Vec<Span>,
    /// Loop-head bindings written anywhere in the body.
    mutated: HashSet<String>,
}

struct CaptureAnalyzer<'t> {
    scopes: &'t ScopeTree,
    loop_scope: ScopeId,
    /// Functions and arrows between the walk position and the loop body.
    function_depth: usize,
    /// Functions only: arrows do not rebind `this`/`arguments`.
    this_depth: usize,
    loop_depth: usize,
    switch_depth: usize,
    labels: Vec<String>,
    analysis: CaptureAnalysis,
}

impl<'t> CaptureAnalyzer<'t> {
    fn label_is_local(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label == name)
    }
}

impl<'a, 't> Visit<'a> for CaptureAnalyzer<'t> {
    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        self.function_depth += 1;
        self.this_depth += 1;
        walk::walk_function(self, func, flags);
        self.this_depth -= 1;
        self.function_depth -= 1;
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        self.function_depth += 1;
        walk::walk_arrow_function_expression(self, func);
        self.function_depth -= 1;
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        self.loop_depth += 1;
        walk::walk_for_statement(self, stmt);
        self.loop_depth -= 1;
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        self.loop_depth += 1;
        walk::walk_for_in_statement(self, stmt);
        self.loop_depth -= 1;
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        self.loop_depth += 1;
        walk::walk_for_of_statement(self, stmt);
        self.loop_depth -= 1;
    }

    fn visit_while_statement(&mut self, stmt: &WhileStatement<'a>) {
        self.loop_depth += 1;
        walk::walk_while_statement(self, stmt);
        self.loop_depth -= 1;
    }

    fn visit_do_while_statement(&mut self, stmt: &DoWhileStatement<'a>) {
        self.loop_depth += 1;
        walk::walk_do_while_statement(self, stmt);
        self.loop_depth -= 1;
    }

    fn visit_switch_statement(&mut self, stmt: &SwitchStatement<'a>) {
        self.switch_depth += 1;
        walk::walk_switch_statement(self, stmt);
        self.switch_depth -= 1;
    }

    fn visit_labeled_statement(&mut self, stmt: &LabeledStatement<'a>) {
        self.labels.push(stmt.label.name.to_string());
        walk::walk_labeled_statement(self, stmt);
        self.labels.pop();
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let name = ident.name.as_str();
        let resolved = self.scopes.resolve(ident.span.start, name);
        if name == "arguments" && self.this_depth == 0 && resolved.is_none() {
            self.analysis.arguments_refs.push(ident.span);
        }
        if let Some(declaring) = resolved {
            if self.scopes.is_inside(declaring, self.loop_scope)
                && self
                    .scopes
                    .declaration_kind(declaring, name)
                    .map(|kind| kind.is_block_scoped())
                    .unwrap_or(false)
                && self
                    .scopes
                    .crosses_function_boundary(self.scopes.scope_at(ident.span.start), declaring)
            {
                self.analysis.needs_wrapper = true;
            }
        }
    }

    fn visit_this_expression(&mut self, expr: &ThisExpression) {
        if self.this_depth == 0 {
            self.analysis.this_refs.push(expr.span);
        }
    }

    fn visit_simple_assignment_target(&mut self, target: &SimpleAssignmentTarget<'a>) {
        if let SimpleAssignmentTarget::AssignmentTargetIdentifier(id) = target {
            if self.scopes.resolve(id.span.start, &id.name) == Some(self.loop_scope) {
                self.analysis.mutated.insert(id.name.to_string());
            }
        }
        walk::walk_simple_assignment_target(self, target);
    }

    fn visit_break_statement(&mut self, stmt: &BreakStatement<'a>) {
        if self.function_depth > 0 {
            return;
        }
        match &stmt.label {
            Some(label) => {
                if !self.label_is_local(&label.name) {
                    self.analysis.escaping_label = true;
                }
            }
            None => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.analysis.can_break = true;
                }
            }
        }
    }

    fn visit_continue_statement(&mut self, stmt: &ContinueStatement<'a>) {
        if self.function_depth > 0 {
            return;
        }
        if let Some(label) = &stmt.label {
            if !self.label_is_local(&label.name) {
                self.analysis.escaping_label = true;
            }
        }
    }

    fn visit_return_statement(&mut self, stmt: &ReturnStatement<'a>) {
        if self.function_depth == 0 {
            self.analysis.can_return = true;
        }
        walk::walk_return_statement(self, stmt);
    }
}

fn analyze(body: &Statement<'_>, scopes: &ScopeTree, loop_scope: ScopeId) -> CaptureAnalysis {
    let mut analyzer = CaptureAnalyzer {
        scopes,
        loop_scope,
        function_depth: 0,
        this_depth: 0,
        loop_depth: 0,
        switch_depth: 0,
        labels: Vec::new(),
        analysis: CaptureAnalysis::default(),
    };
    analyzer.visit_statement(body);
    analyzer.analysis
}

fn collect_pattern_names(pattern: &BindingPattern<'_>, out: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => out.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_pattern_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                collect_pattern_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                collect_pattern_names(element, out);
            }
            if let Some(rest) = &arr.rest {
                collect_pattern_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assignment) => {
            collect_pattern_names(&assignment.left, out);
        }
    }
}

impl<'s> Lowerer<'s> {
    pub(crate) fn lower_for(&mut self, stmt: &ForStatement<'_>) -> bool {
        let head = match &stmt.init {
            Some(ForStatementInit::VariableDeclaration(decl)) => Some(&**decl),
            _ => None,
        };
        self.lower_loop(stmt.span, &stmt.body, head, LoopKind::For)
    }

    pub(crate) fn lower_for_in(&mut self, stmt: &ForInStatement<'_>) -> bool {
        let head = match &stmt.left {
            ForStatementLeft::VariableDeclaration(decl) => Some(&**decl),
            _ => None,
        };
        self.lower_loop(stmt.span, &stmt.body, head, LoopKind::ForIn)
    }

    pub(crate) fn lower_for_of(&mut self, stmt: &ForOfStatement<'_>) -> bool {
        let head = match &stmt.left {
            ForStatementLeft::VariableDeclaration(decl) => Some(&**decl),
            _ => None,
        };
        self.lower_loop(stmt.span, &stmt.body, head, LoopKind::ForOf)
    }

    pub(crate) fn lower_while(&mut self, stmt: &WhileStatement<'_>) -> bool {
        self.lower_loop(stmt.span, &stmt.body, None, LoopKind::While)
    }

    pub(crate) fn lower_do_while(&mut self, stmt: &DoWhileStatement<'_>) -> bool {
        self.lower_loop(stmt.span, &stmt.body, None, LoopKind::DoWhile)
    }

    fn lower_loop(
        &mut self,
        loop_span: Span,
        body: &Statement<'_>,
        head: Option<&VariableDeclaration<'_>>,
        kind: LoopKind,
    ) -> bool {
        if !self.options.let_const {
            return false;
        }
        let loop_scope = self.scopes.scope_at(loop_span.start);
        let analysis = analyze(body, &self.scopes, loop_scope);
        if !analysis.needs_wrapper {
            return false;
        }
        if analysis.escaping_label {
            self.errors.push(CompileError::at(
                ERR_LABELLED_JUMP,
                "Labelled break and continue cannot target a position outside a loop body that is rewritten as a function",
                self.file,
                self.source,
                loop_span.start,
            ));
            return false;
        }

        let body_span = body.span();
        let is_block = matches!(body, Statement::BlockStatement(_));
        // A statement body keeps its terminating semicolon out of its span.
        let body_end = {
            let bytes = self.source.as_bytes();
            let end = body_span.end as usize;
            if !is_block && end < bytes.len() && bytes[end] == b';' {
                body_span.end + 1
            } else {
                body_span.end
            }
        };
        let function_scope = self.scopes.find_scope(loop_scope, true);
        let i0 = line_indent(self.source, loop_span.start);
        let i1 = format!("{}{}", i0, self.indent);

        // Head bindings become wrapper parameters; a binding the body writes
        // to gets a distinct parameter name plus a write-back, so the update
        // expression in the head still observes the change.
        let mut params = Vec::new();
        let mut args = Vec::new();
        let mut syncs = Vec::new();
        if let Some(decl) = head {
            if matches!(
                decl.kind,
                VariableDeclarationKind::Let | VariableDeclarationKind::Const
            ) {
                let mut names = Vec::new();
                for declarator in &decl.declarations {
                    collect_pattern_names(&declarator.id, &mut names);
                }
                for name in names {
                    let outer = self
                        .renames
                        .get(&(loop_scope, name.clone()))
                        .cloned()
                        .unwrap_or_else(|| name.clone());
                    let param = if analysis.mutated.contains(&name) {
                        let fresh = self.scopes.create_identifier(function_scope, &name);
                        syncs.push(format!("{} = {};", outer, fresh));
                        fresh
                    } else {
                        name.clone()
                    };
                    self.overrides.push(ParamOverride {
                        start: body_span.start,
                        end: body_span.end,
                        scope: loop_scope,
                        name,
                        replacement: param.clone(),
                    });
                    params.push(param);
                    args.push(outer);
                }
            }
        }

        let loop_name = self.scopes.create_identifier(function_scope, "loop");

        // `this` and `arguments` are captured once ahead of the loop; only
        // references outside nested functions retarget to the aliases.
        let mut alias_lines = Vec::new();
        if !analysis.arguments_refs.is_empty() {
            let alias = self.scopes.create_identifier(function_scope, "arguments");
            for span in &analysis.arguments_refs {
                self.buffer.overwrite(span.start, span.end, &alias);
            }
            alias_lines.push(format!("var {} = arguments;", alias));
        }
        if !analysis.this_refs.is_empty() {
            let alias = self.scopes.create_identifier(function_scope, "this");
            for span in &analysis.this_refs {
                self.buffer.overwrite(span.start, span.end, &alias);
            }
            alias_lines.push(format!("var {} = this;", alias));
        }
        if !alias_lines.is_empty() {
            let text = format!(
                "{}\n\n{}",
                alias_lines.join(&format!("\n{}", i0)),
                i0
            );
            self.buffer.insert_left(loop_span.start, &text);
        }

        // Wrapper declaration: the body range is relocated in front of the
        // loop and framed as a function expression. The closing frame attaches
        // to the loop head after the move rather than to the body end, so a
        // nested wrapper whose body ends on the same boundary cannot carry it
        // away.
        let param_text = if params.is_empty() {
            String::new()
        } else {
            format!(" {} ", params.join(", "))
        };
        let mut before = format!("var {} = function ({}) ", loop_name, param_text);
        if !is_block {
            before.push_str(&format!("{{\n{}", i1));
        }
        self.buffer.insert_right(body_span.start, &before);

        let sync_text: String = syncs
            .iter()
            .map(|sync| format!("\n{}{}", i1, sync))
            .collect();
        if is_block && !sync_text.is_empty() {
            self.buffer
                .insert_left(body_span.end - 1, &format!("{}\n{}", sync_text, i0));
        }
        self.buffer.move_range(body_span.start, body_end, loop_span.start);

        let mut after = String::new();
        if !is_block {
            after.push_str(&sync_text);
            after.push_str(&format!("\n{}}}", i0));
        }
        after.push_str(&format!(";\n\n{}", i0));
        self.buffer.insert_right(loop_span.start, &after);

        // Call site in the vacated body position.
        let arg_text = if args.is_empty() {
            String::new()
        } else {
            format!(" {} ", args.join(", "))
        };
        let call = format!("{}({});", loop_name, arg_text);
        if analysis.can_break || analysis.can_return {
            let returned = self.scopes.create_identifier(function_scope, "returned");
            let mut text = format!("{{\n{}var {} = {}\n", i1, returned, call);
            if analysis.can_break {
                text.push_str(&format!("\n{}if ( {} === 'break' ) break;", i1, returned));
            }
            if analysis.can_return {
                // When this loop itself sits inside another wrapper, the
                // forwarded value has to stay in sentinel form.
                let forward = if self.inside_wrapped_loop() {
                    format!("return {{ v: {}.v }};", returned)
                } else {
                    format!("return {}.v;", returned)
                };
                text.push_str(&format!("\n{}if ( {} ) {}", i1, returned, forward));
            }
            text.push_str(&format!("\n{}}}", i0));
            self.buffer.insert_left(body_span.start, &text);
        } else if matches!(kind, LoopKind::DoWhile) {
            self.buffer
                .insert_left(body_span.start, &format!("{{\n{}{}\n{}}}", i1, call, i0));
        } else {
            self.buffer.insert_left(body_span.start, &call);
        }
        true
    }

    fn inside_wrapped_loop(&self) -> bool {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Function => return false,
                Frame::Loop { wrapped: true } => return true,
                _ => {}
            }
        }
        false
    }

    fn break_targets_wrapper(&self) -> bool {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Function | Frame::Switch => return false,
                Frame::Loop { wrapped } => return *wrapped,
            }
        }
        false
    }

    fn continue_targets_wrapper(&self) -> bool {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Function => return false,
                Frame::Loop { wrapped } => return *wrapped,
                Frame::Switch => {}
            }
        }
        false
    }

    /// `return x` inside a wrapper becomes `return { v: x }` so the call
    /// site can tell a real return from the loop simply finishing; a bare
    /// `return` becomes `return {}` for the same reason.
    pub(crate) fn rewrite_return(&mut self, stmt: &ReturnStatement<'_>) {
        if !self.inside_wrapped_loop() {
            return;
        }
        match &stmt.argument {
            Some(argument) => {
                let argument_span = argument.span();
                self.buffer
                    .overwrite(stmt.span.start, argument_span.start, "return { v: ");
                self.buffer.insert_left(argument_span.end, " }");
            }
            None => {
                self.buffer
                    .overwrite(stmt.span.start, stmt.span.start + 6, "return {}");
            }
        }
    }

    pub(crate) fn rewrite_break(&mut self, stmt: &BreakStatement<'_>) {
        if stmt.label.is_some() || !self.break_targets_wrapper() {
            return;
        }
        self.buffer
            .overwrite(stmt.span.start, stmt.span.start + 5, "return 'break'");
    }

    pub(crate) fn rewrite_continue(&mut self, stmt: &ContinueStatement<'_>) {
        if stmt.label.is_some() || !self.continue_targets_wrapper() {
            return;
        }
        self.buffer
            .overwrite(stmt.span.start, stmt.span.start + 8, "return");
    }
}
