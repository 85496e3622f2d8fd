//! Synthesis of globally callable `test_<name>` wrappers.

use super::{ParsedSignature, VOID_RETURN};

/// Prefix given to every synthesized wrapper.
pub const WRAPPER_PREFIX: &str = "test_";

/// A generated wrapper, split so callers can inspect the declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperText {
    /// e.g. `int test_gz_skip(gz_statep state, z_off64_t len)`
    pub declaration: String,
    /// Statement lines between the braces, newline terminated.
    pub body: String,
}

impl WrapperText {
    /// Source fragment appended after the wrapped function's closing brace.
    pub fn render(&self) -> String {
        format!(
            "\n/* Auto-generated test wrapper */\n{} {{\n{}}}\n\n",
            self.declaration, self.body
        )
    }
}

/// Build the wrapper for a locally scoped function.
///
/// Returns `None` for functions that are already externally linkable.
pub fn synthesize(signature: &ParsedSignature) -> Option<WrapperText> {
    if !signature.is_locally_scoped {
        return None;
    }

    let params = if signature.parameters.is_empty() {
        VOID_RETURN.to_string()
    } else {
        signature
            .parameters
            .iter()
            .map(|p| p.type_text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let call = format!("{}({})", signature.name, signature.forwarded_args().join(", "));
    let body = if signature.returns_void() {
        format!("    {};\n", call)
    } else {
        format!("    return {};\n", call)
    };

    Some(WrapperText {
        declaration: format!(
            "{} {}{}({})",
            signature.return_type, WRAPPER_PREFIX, signature.name, params
        ),
        body,
    })
}
