use oxc_ast::ast::{
    BindingPattern, Expression, FormalParameters, PropertyKey, VariableDeclarator,
};
use oxc_span::{GetSpan, Span};

use crate::transform::{line_indent, Lowerer};

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERN DESUGARING
// Flat object/array patterns become plain member reads. A declarator keeps
// its statement position, so its pattern desugars to comma-joined sibling
// declarators (legal even in a for-loop head). A parameter has no such
// position and desugars to a synthetic name plus var statements hoisted to
// the top of the function body.
// ═══════════════════════════════════════════════════════════════════════════════

/// One leaf of a flat pattern: where to read from and what to bind.
struct Member {
    target: String,
    access: String,
    default: Option<Span>,
    temp_base: String,
}

impl<'s> Lowerer<'s> {
    /// `var { x, y } = point;` becomes `var x = point.x, y = point.y;`.
    /// A non-identifier initializer is evaluated once into a `ref` temporary
    /// so member reads cannot repeat its side effects.
    pub(crate) fn lower_declarator(&mut self, declarator: &VariableDeclarator<'_>) {
        if !matches!(
            declarator.id,
            BindingPattern::ObjectPattern(_) | BindingPattern::ArrayPattern(_)
        ) {
            return;
        }
        let init = match &declarator.init {
            Some(init) => init,
            None => return,
        };
        let members = match self.pattern_members(&declarator.id) {
            Some(members) => members,
            None => return,
        };
        let id_span = declarator.id.span();
        let init_span = init.span();

        // A pattern with nothing to bind still evaluates its initializer
        // once; the pattern itself becomes a plain temporary.
        if members.is_empty() {
            let function = self
                .scopes
                .find_scope(self.scopes.scope_at(declarator.span.start), true);
            let ref_name = self.scopes.create_identifier(function, "ref");
            self.buffer.overwrite(id_span.start, id_span.end, &ref_name);
            self.consumed.push((id_span.start, id_span.end));
            return;
        }

        let (source_name, simple) = match init {
            Expression::Identifier(ident) => (
                self.effective_name(ident.span.start, &ident.name)
                    .unwrap_or_else(|| ident.name.to_string()),
                true,
            ),
            _ => {
                let function = self
                    .scopes
                    .find_scope(self.scopes.scope_at(declarator.span.start), true);
                (self.scopes.create_identifier(function, "ref"), false)
            }
        };

        let assignments: Vec<String> = members
            .iter()
            .map(|member| {
                let read = format!("{}{}", source_name, member.access);
                match member.default {
                    Some(default) => format!(
                        "{} = {} === undefined ? {} : {}",
                        member.target,
                        read,
                        self.slice(default.start, default.end),
                        read
                    ),
                    None => format!("{} = {}", member.target, read),
                }
            })
            .collect();
        let joined = assignments.join(", ");

        if simple {
            self.buffer.overwrite(id_span.start, init_span.end, &joined);
            self.consumed.push((id_span.start, init_span.end));
        } else {
            self.buffer.overwrite(id_span.start, id_span.end, &source_name);
            self.buffer
                .insert_left(init_span.end, &format!(", {}", joined));
            self.consumed.push((id_span.start, id_span.end));
        }
    }

    /// Each pattern parameter is replaced by a `ref` name; the reads hoist
    /// into the body. A defaulted member reads through a temporary with a
    /// `void 0` guard, because the member access must not run twice.
    pub(crate) fn lower_params(
        &mut self,
        params: &FormalParameters<'_>,
        body_start: u32,
        func_start: u32,
    ) {
        let mut hoisted: Vec<String> = Vec::new();
        for param in &params.items {
            if !matches!(
                param.pattern,
                BindingPattern::ObjectPattern(_) | BindingPattern::ArrayPattern(_)
            ) {
                continue;
            }
            let members = match self.pattern_members(&param.pattern) {
                Some(members) => members,
                None => continue,
            };
            let pattern_span = param.pattern.span();
            let function = self.scopes.scope_at(pattern_span.start);
            let ref_name = self.scopes.create_identifier(function, "ref");
            self.buffer
                .overwrite(pattern_span.start, pattern_span.end, &ref_name);
            self.consumed.push((pattern_span.start, pattern_span.end));

            for member in &members {
                let read = format!("{}{}", ref_name, member.access);
                match member.default {
                    Some(default) => {
                        let temp = self
                            .scopes
                            .create_identifier(function, &format!("{}_{}", ref_name, member.temp_base));
                        let default_text = self.slice(default.start, default.end).to_string();
                        hoisted.push(format!(
                            "var {} = {}, {} = {} === void 0 ? {} : {};",
                            temp, read, member.target, temp, default_text, temp
                        ));
                    }
                    None => hoisted.push(format!("var {} = {};", member.target, read)),
                }
            }
        }
        if hoisted.is_empty() {
            return;
        }

        let indent = format!("{}{}", line_indent(self.source, func_start), self.indent);
        let mut text = String::new();
        for stmt in &hoisted {
            text.push('\n');
            text.push_str(&indent);
            text.push_str(stmt);
        }
        text.push('\n');
        self.buffer.insert_right(body_start + 1, &text);
    }

    fn pattern_members(&self, pattern: &BindingPattern<'_>) -> Option<Vec<Member>> {
        let mut members = Vec::new();
        match pattern {
            BindingPattern::ObjectPattern(obj) => {
                for prop in &obj.properties {
                    let (access, temp_base) = match &prop.key {
                        PropertyKey::StaticIdentifier(key) => {
                            (format!(".{}", key.name), key.name.to_string())
                        }
                        other => {
                            let span = other.span();
                            (
                                format!("[{}]", self.slice(span.start, span.end)),
                                format!("key{}", members.len()),
                            )
                        }
                    };
                    let (name, offset, default) = target_of(&prop.value)?;
                    let target = self.effective_name(offset, &name).unwrap_or(name);
                    members.push(Member {
                        target,
                        access,
                        default,
                        temp_base,
                    });
                }
            }
            BindingPattern::ArrayPattern(arr) => {
                for (index, element) in arr.elements.iter().enumerate() {
                    let element = match element {
                        Some(element) => element,
                        None => continue,
                    };
                    let (name, offset, default) = target_of(element)?;
                    let target = self.effective_name(offset, &name).unwrap_or(name);
                    members.push(Member {
                        target,
                        access: format!("[{}]", index),
                        default,
                        temp_base: index.to_string(),
                    });
                }
            }
            _ => return None,
        }
        Some(members)
    }
}

/// Leaf target of a flat pattern member. Compound targets were already
/// rejected by validation, so None never reaches the edit stage.
fn target_of(pattern: &BindingPattern<'_>) -> Option<(String, u32, Option<Span>)> {
    match pattern {
        BindingPattern::BindingIdentifier(id) => Some((id.name.to_string(), id.span.start, None)),
        BindingPattern::AssignmentPattern(assignment) => match &assignment.left {
            BindingPattern::BindingIdentifier(id) => Some((
                id.name.to_string(),
                id.span.start,
                Some(assignment.right.span()),
            )),
            _ => None,
        },
        _ => None,
    }
}
