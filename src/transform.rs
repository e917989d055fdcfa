use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, BindingPattern, BreakStatement, ContinueStatement,
    DoWhileStatement, ForInStatement, ForOfStatement, ForStatement, Function, IdentifierReference,
    ReturnStatement, SwitchStatement, VariableDeclaration, VariableDeclarationKind, WhileStatement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::scope::ScopeFlags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::edit::EditBuffer;
use crate::scope::{ScopeBuilder, ScopeId, ScopeTree};
use crate::validate::{CompileError, Validator, ERR_SYNTAX};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Which lowerings run. Every flag defaults to on; a disabled flag leaves the
/// corresponding syntax byte-identical in the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformOptions {
    pub destructuring: bool,
    pub parameter_destructuring: bool,
    pub let_const: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            destructuring: true,
            parameter_destructuring: true,
            let_const: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOWERER
// Single pre-order pass that emits every edit: let/const keyword rewrites,
// shadow renames, pattern desugaring and the loop wrapper transform. Loop
// wrapping decisions happen before the body is walked, so statement-level
// rewrites (return/break/continue) can consult the enclosing frames.
// ═══════════════════════════════════════════════════════════════════════════════

/// Syntactic context the traversal is currently inside of.
pub(crate) enum Frame {
    Function,
    Switch,
    Loop { wrapped: bool },
}

/// A loop-head binding that became a wrapper parameter: inside the wrapper
/// body the parameter name supersedes any planned shadow rename.
pub(crate) struct ParamOverride {
    pub start: u32,
    pub end: u32,
    pub scope: ScopeId,
    pub name: String,
    pub replacement: String,
}

pub struct Lowerer<'s> {
    pub(crate) source: &'s str,
    pub(crate) file: &'s str,
    pub(crate) options: &'s TransformOptions,
    pub(crate) buffer: EditBuffer<'s>,
    pub(crate) scopes: ScopeTree,
    pub(crate) renames: HashMap<(ScopeId, String), String>,
    pub(crate) overrides: Vec<ParamOverride>,
    pub(crate) frames: Vec<Frame>,
    /// Ranges whose text was wholly replaced by a desugaring; the rename pass
    /// must not emit a second edit inside them.
    pub(crate) consumed: Vec<(u32, u32)>,
    pub(crate) errors: Vec<CompileError>,
    pub(crate) indent: String,
    in_loop_head: bool,
}

impl<'s> Lowerer<'s> {
    pub fn new(
        source: &'s str,
        file: &'s str,
        options: &'s TransformOptions,
        scopes: ScopeTree,
        renames: HashMap<(ScopeId, String), String>,
    ) -> Self {
        Self {
            source,
            file,
            options,
            buffer: EditBuffer::new(source),
            scopes,
            renames,
            overrides: Vec::new(),
            frames: Vec::new(),
            consumed: Vec::new(),
            errors: Vec::new(),
            indent: guess_indent(source),
            in_loop_head: false,
        }
    }

    pub(crate) fn slice(&self, start: u32, end: u32) -> &'s str {
        &self.source[start as usize..end as usize]
    }

    pub(crate) fn is_consumed(&self, offset: u32) -> bool {
        self.consumed
            .iter()
            .any(|(start, end)| *start <= offset && offset < *end)
    }

    /// The name a reference at `offset` must carry in the output, or None
    /// when the original name survives. Wrapper parameters win over planned
    /// shadow renames inside their body range.
    pub(crate) fn effective_name(&self, offset: u32, name: &str) -> Option<String> {
        let scope = self.scopes.resolve(offset, name)?;
        for o in &self.overrides {
            if o.scope == scope && o.name == name && o.start <= offset && offset < o.end {
                if o.replacement == name {
                    return None;
                }
                return Some(o.replacement.clone());
            }
        }
        if let Some(renamed) = self.renames.get(&(scope, name.to_string())) {
            return Some(renamed.clone());
        }
        None
    }

    fn rename_at(&mut self, start: u32, end: u32, name: &str) {
        if self.is_consumed(start) {
            return;
        }
        if let Some(new_name) = self.effective_name(start, name) {
            self.buffer.overwrite(start, end, &new_name);
        }
    }

    /// True inside the body of a loop that was left in place, with no
    /// wrapper or function boundary in between. Uninitialized block-scoped
    /// declarations there need an explicit per-iteration reset.
    fn needs_reinit(&self) -> bool {
        for frame in self.frames.iter().rev() {
            match frame {
                Frame::Function => return false,
                Frame::Loop { wrapped } => return !wrapped,
                Frame::Switch => {}
            }
        }
        false
    }
}

impl<'a, 's> Visit<'a> for Lowerer<'s> {
    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        if self.options.let_const
            && matches!(
                decl.kind,
                VariableDeclarationKind::Let | VariableDeclarationKind::Const
            )
        {
            let keyword_len = match decl.kind {
                VariableDeclarationKind::Let => 3,
                _ => 5,
            };
            self.buffer
                .overwrite(decl.span.start, decl.span.start + keyword_len, "var");
            // A loop-head declarator must stay a valid head; only body-level
            // declarations get the explicit reset.
            if self.needs_reinit() && !self.in_loop_head {
                for declarator in &decl.declarations {
                    if declarator.init.is_none() {
                        if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                            self.buffer.insert_left(id.span.end, " = void 0");
                        }
                    }
                }
            }
        }
        if self.options.destructuring {
            for declarator in &decl.declarations {
                self.lower_declarator(declarator);
            }
        }
        walk::walk_variable_declaration(self, decl);
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        if self.options.parameter_destructuring {
            if let Some(body) = &func.body {
                self.lower_params(&func.params, body.span.start, func.span.start);
            }
        }
        self.frames.push(Frame::Function);
        walk::walk_function(self, func, flags);
        self.frames.pop();
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        // An expression body has no statement position to hoist into.
        if self.options.parameter_destructuring && !func.expression {
            self.lower_params(&func.params, func.body.span.start, func.span.start);
        }
        self.frames.push(Frame::Function);
        walk::walk_arrow_function_expression(self, func);
        self.frames.pop();
    }

    fn visit_for_statement(&mut self, stmt: &ForStatement<'a>) {
        let wrapped = self.lower_for(stmt);
        if let Some(init) = &stmt.init {
            self.in_loop_head = true;
            self.visit_for_statement_init(init);
            self.in_loop_head = false;
        }
        if let Some(test) = &stmt.test {
            self.visit_expression(test);
        }
        if let Some(update) = &stmt.update {
            self.visit_expression(update);
        }
        self.frames.push(Frame::Loop { wrapped });
        self.visit_statement(&stmt.body);
        self.frames.pop();
    }

    fn visit_for_in_statement(&mut self, stmt: &ForInStatement<'a>) {
        let wrapped = self.lower_for_in(stmt);
        self.in_loop_head = true;
        self.visit_for_statement_left(&stmt.left);
        self.in_loop_head = false;
        self.visit_expression(&stmt.right);
        self.frames.push(Frame::Loop { wrapped });
        self.visit_statement(&stmt.body);
        self.frames.pop();
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        let wrapped = self.lower_for_of(stmt);
        self.in_loop_head = true;
        self.visit_for_statement_left(&stmt.left);
        self.in_loop_head = false;
        self.visit_expression(&stmt.right);
        self.frames.push(Frame::Loop { wrapped });
        self.visit_statement(&stmt.body);
        self.frames.pop();
    }

    fn visit_while_statement(&mut self, stmt: &WhileStatement<'a>) {
        let wrapped = self.lower_while(stmt);
        self.visit_expression(&stmt.test);
        self.frames.push(Frame::Loop { wrapped });
        self.visit_statement(&stmt.body);
        self.frames.pop();
    }

    fn visit_do_while_statement(&mut self, stmt: &DoWhileStatement<'a>) {
        let wrapped = self.lower_do_while(stmt);
        self.frames.push(Frame::Loop { wrapped });
        self.visit_statement(&stmt.body);
        self.frames.pop();
        self.visit_expression(&stmt.test);
    }

    fn visit_switch_statement(&mut self, stmt: &SwitchStatement<'a>) {
        self.frames.push(Frame::Switch);
        walk::walk_switch_statement(self, stmt);
        self.frames.pop();
    }

    fn visit_return_statement(&mut self, stmt: &ReturnStatement<'a>) {
        self.rewrite_return(stmt);
        walk::walk_return_statement(self, stmt);
    }

    fn visit_break_statement(&mut self, stmt: &BreakStatement<'a>) {
        self.rewrite_break(stmt);
    }

    fn visit_continue_statement(&mut self, stmt: &ContinueStatement<'a>) {
        self.rewrite_continue(stmt);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let name = ident.name.to_string();
        self.rename_at(ident.span.start, ident.span.end, &name);
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        let name = ident.name.to_string();
        self.rename_at(ident.span.start, ident.span.end, &name);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse `source`, lower it per `options` and render the rewritten text.
/// The first error raised at any stage aborts the run; no partial output
/// is ever produced.
pub fn lower_source(
    source: &str,
    file: &str,
    options: &TransformOptions,
) -> Result<String, CompileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::default()).parse();
    if let Some(error) = ret.errors.first() {
        let message = format!("Invalid syntax: {:?}", error);
        return Err(CompileError::new(ERR_SYNTAX, &message, file, 1, 1));
    }
    let program = ret.program;

    let mut validator = Validator::new(source, file);
    validator.visit_program(&program);
    if let Some(error) = validator.errors.into_iter().next() {
        return Err(error);
    }

    let mut builder = ScopeBuilder::new(program.span);
    builder.visit_program(&program);
    let mut scopes = builder.into_tree();
    let renames = if options.let_const {
        scopes.plan_renames()
    } else {
        HashMap::new()
    };

    let mut lowerer = Lowerer::new(source, file, options, scopes, renames);
    lowerer.visit_program(&program);
    if let Some(error) = lowerer.errors.into_iter().next() {
        return Err(error);
    }
    Ok(lowerer.buffer.render())
}

// ═══════════════════════════════════════════════════════════════════════════════
// INDENTATION
// Synthesized lines copy the indentation style of the input rather than
// imposing one.
// ═══════════════════════════════════════════════════════════════════════════════

fn guess_indent(source: &str) -> String {
    for line in source.lines() {
        if line.starts_with('\t') {
            return "\t".to_string();
        }
        if line.starts_with("  ") {
            let width = line.len() - line.trim_start_matches(' ').len();
            return " ".repeat(width.min(4));
        }
    }
    "\t".to_string()
}

/// Leading whitespace of the line containing `offset`.
pub(crate) fn line_indent(source: &str, offset: u32) -> String {
    let upto = &source[..offset as usize];
    let line_start = upto.rfind('\n').map(|i| i + 1).unwrap_or(0);
    source[line_start..]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default_and_json() {
        let options = TransformOptions::default();
        assert!(options.destructuring && options.parameter_destructuring && options.let_const);
        let parsed: TransformOptions = serde_json::from_str(r#"{ "letConst": false }"#).unwrap();
        assert!(!parsed.let_const);
        assert!(parsed.destructuring);
        assert!(parsed.parameter_destructuring);
    }

    #[test]
    fn test_guess_indent() {
        assert_eq!(guess_indent("a\n\tb"), "\t");
        assert_eq!(guess_indent("a\n  b"), "  ");
        assert_eq!(guess_indent("a\nb"), "\t");
    }

    #[test]
    fn test_line_indent() {
        let source = "for (;;) {\n\t\tx();\n}";
        assert_eq!(line_indent(source, 0), "");
        assert_eq!(line_indent(source, 13), "\t\t");
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let error =
            lower_source("let x = ;", "bad.js", &TransformOptions::default()).unwrap_err();
        assert_eq!(error.code, ERR_SYNTAX);
    }
}
