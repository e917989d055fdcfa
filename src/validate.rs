use oxc_ast::ast::{
    AssignmentExpression, AssignmentTarget, BindingPattern, FormalParameters,
    TaggedTemplateExpression, VariableDeclarator,
};
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_SYNTAX: &str = "DL-ERR-SYNTAX-001";
pub const ERR_COMPOUND_PATTERN: &str = "DL-ERR-PATTERN-001";
pub const ERR_ARRAY_ASSIGNMENT: &str = "DL-ERR-PATTERN-002";
pub const ERR_PATTERN_MEMBER: &str = "DL-ERR-PATTERN-003";
pub const ERR_PATTERN_NO_INIT: &str = "DL-ERR-PATTERN-004";
pub const ERR_TAGGED_TEMPLATE: &str = "DL-ERR-TEMPLATE-001";
pub const ERR_LABELLED_JUMP: &str = "DL-ERR-LOOP-001";

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_SYNTAX => "Input is parsed before any rewrite is attempted.",
        ERR_COMPOUND_PATTERN => "Binding patterns are desugared only when they are flat.",
        ERR_ARRAY_ASSIGNMENT => {
            "Array patterns are rewritten in declarations and parameters only."
        }
        ERR_PATTERN_MEMBER => "Pattern members are plain keys and plain targets.",
        ERR_PATTERN_NO_INIT => "Every desugared pattern has a source expression to read from.",
        ERR_TAGGED_TEMPLATE => "Tagged template expressions are never partially lowered.",
        ERR_LABELLED_JUMP => {
            "Control flow inside a synthesized loop body never changes its target."
        }
        _ => "Unknown error code.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// A fatal, structured compile error. The first one raised aborts the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileError {
    pub code: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl CompileError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
        }
    }

    /// Build an error located at a byte offset into the original source.
    pub fn at(code: &str, message: &str, file: &str, source: &str, offset: u32) -> Self {
        let (line, column) = line_column(source, offset);
        Self::new(code, message, file, line, column)
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} ({}:{}:{})",
            self.code, self.message, self.file, self.line, self.column
        )
    }
}

impl std::error::Error for CompileError {}

/// 1-based line/column for a byte offset. Columns count characters, not
/// bytes, so non-ASCII source reports the position a reader sees.
pub fn line_column(source: &str, offset: u32) -> (u32, u32) {
    let offset = (offset as usize).min(source.len());
    let mut line = 1u32;
    let mut line_start = 0usize;
    for (i, b) in source.as_bytes().iter().enumerate() {
        if i >= offset {
            break;
        }
        if *b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    let column = source[line_start..offset].chars().count() as u32 + 1;
    (line, column)
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNSUPPORTED-CONSTRUCT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// First-pass rejection of syntax this engine deliberately never lowers.
/// Runs before any edit is emitted, so a rejected input produces no output.
pub struct Validator<'s> {
    pub source: &'s str,
    pub file: &'s str,
    pub errors: Vec<CompileError>,
}

impl<'s> Validator<'s> {
    pub fn new(source: &'s str, file: &'s str) -> Self {
        Self {
            source,
            file,
            errors: Vec::new(),
        }
    }

    fn reject(&mut self, code: &str, message: &str, offset: u32) {
        self.errors
            .push(CompileError::at(code, message, self.file, self.source, offset));
    }

    /// Enforces the flat-pattern invariant: no target of a pattern may itself
    /// be a pattern, no rest members, no computed keys.
    fn check_pattern(&mut self, pattern: &BindingPattern<'_>, offset: u32) {
        match pattern {
            BindingPattern::ObjectPattern(obj) => {
                for prop in &obj.properties {
                    if prop.computed {
                        self.reject(
                            ERR_PATTERN_MEMBER,
                            "Computed keys in binding patterns are not supported",
                            offset,
                        );
                    }
                    self.check_target(&prop.value, offset);
                }
                if obj.rest.is_some() {
                    self.reject(
                        ERR_PATTERN_MEMBER,
                        "Rest elements in binding patterns are not supported",
                        offset,
                    );
                }
            }
            BindingPattern::ArrayPattern(arr) => {
                for element in arr.elements.iter().flatten() {
                    self.check_target(element, offset);
                }
                if arr.rest.is_some() {
                    self.reject(
                        ERR_PATTERN_MEMBER,
                        "Rest elements in binding patterns are not supported",
                        offset,
                    );
                }
            }
            _ => {}
        }
    }

    fn check_target(&mut self, target: &BindingPattern<'_>, offset: u32) {
        let inner = match target {
            BindingPattern::AssignmentPattern(assignment) => &assignment.left,
            other => other,
        };
        if matches!(
            inner,
            BindingPattern::ObjectPattern(_) | BindingPattern::ArrayPattern(_)
        ) {
            self.reject(
                ERR_COMPOUND_PATTERN,
                "Compound destructuring is not supported",
                offset,
            );
        }
    }
}

impl<'a, 's> Visit<'a> for Validator<'s> {
    fn visit_tagged_template_expression(&mut self, expr: &TaggedTemplateExpression<'a>) {
        self.reject(
            ERR_TAGGED_TEMPLATE,
            "Tagged template expressions are not supported",
            expr.tag.span().start,
        );
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if matches!(
            decl.id,
            BindingPattern::ObjectPattern(_) | BindingPattern::ArrayPattern(_)
        ) {
            self.check_pattern(&decl.id, decl.span.start);
            if decl.init.is_none() {
                // Patterns in for-in/for-of heads have no initializer to read from.
                self.reject(
                    ERR_PATTERN_NO_INIT,
                    "Destructuring a binding with no initializer is not supported",
                    decl.span.start,
                );
            }
        }
        walk::walk_variable_declarator(self, decl);
    }

    fn visit_formal_parameters(&mut self, params: &FormalParameters<'a>) {
        for param in &params.items {
            if matches!(
                param.pattern,
                BindingPattern::ObjectPattern(_) | BindingPattern::ArrayPattern(_)
            ) {
                self.check_pattern(&param.pattern, param.span.start);
            }
        }
        walk::walk_formal_parameters(self, params);
    }

    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'a>) {
        if matches!(expr.left, AssignmentTarget::ArrayAssignmentTarget(_)) {
            self.reject(
                ERR_ARRAY_ASSIGNMENT,
                "Assigning to an array pattern is not currently supported",
                expr.span.start,
            );
        }
        walk::walk_assignment_expression(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("abc", 0), (1, 1));
        assert_eq!(line_column("abc", 2), (1, 3));
        assert_eq!(line_column("a\nbc", 2), (2, 1));
        assert_eq!(line_column("a\nbc\nd", 5), (3, 1));
    }

    #[test]
    fn test_line_column_counts_chars_not_bytes() {
        // "é" is two bytes, one column. `let` starts at byte 14, column 14.
        let source = "var s = 'é'; let x = 1;";
        assert_eq!(line_column(source, 14), (1, 14));
        assert_eq!(line_column("// héllo\nlet x;", 10), (2, 1));
    }

    #[test]
    fn test_guarantee_lookup() {
        assert!(get_guarantee(ERR_COMPOUND_PATTERN).contains("flat"));
        assert_eq!(get_guarantee("bogus"), "Unknown error code.");
    }
}
