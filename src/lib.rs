//! # Downlevel
//!
//! Lowers ES2015 block scoping, destructuring and loop closures to
//! function-scoped ES5. Output is produced by editing the original text,
//! never by re-printing the AST, so untouched code survives byte-for-byte.
//!
//! ## Rewriting Invariants
//!
//! 1. **Text Edits Only**: every transform is a span-indexed edit against
//!    the immutable input. Unaffected whitespace, comments and formatting
//!    are preserved exactly.
//!
//! 2. **One Namespace Per Function**: lowering `let`/`const` to `var`
//!    flattens block scopes into their function scope. The first binding of
//!    a name keeps it; later block-scoped duplicates are renamed (`i` →
//!    `i$1`) before they can collide.
//!
//! 3. **Closure Capture**: a loop body that closes over its own block-scoped
//!    bindings is lifted into a `var loop = function (...)` wrapper so each
//!    iteration keeps its own binding. `break`/`continue`/`return` crossing
//!    the new function boundary travel through sentinel return values.
//!
//! 4. **Single Evaluation**: desugared destructuring never re-evaluates its
//!    source expression; a non-trivial initializer is read through a `ref`
//!    temporary, and defaulted members are guarded through temporaries.
//!
//! 5. **Fail Closed**: syntax this engine does not lower (tagged templates,
//!    compound patterns, array-pattern assignment) is rejected with a
//!    structured `DL-ERR-*` error before any edit is emitted.

mod destructuring;
mod edit;
mod loops;
mod scope;
mod transform;
mod validate;

pub use edit::EditBuffer;
pub use scope::{DeclarationKind, ScopeBuilder, ScopeId, ScopeTree};
pub use transform::{lower_source, TransformOptions};
pub use validate::*;

#[cfg(test)]
mod lowering_tests;
