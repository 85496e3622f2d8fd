//! Function signature analysis.
//!
//! Splits a C function signature (as delivered by the function extractor) into
//! its linkage, return type, name and parameters. Parsing is a pragmatic regex
//! plus parenthesis scan rather than a C grammar: anything it cannot make sense
//! of is reported as a [`SignatureError`] so the caller can skip the function.

pub mod wrapper;

pub use wrapper::{synthesize, WrapperText};

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Keyword marking a function as file-local (zlib's `#define local static`).
pub const DEFAULT_SCOPE_KEYWORD: &str = "local";

/// Return type that makes the wrapper call the function as a bare statement.
pub const VOID_RETURN: &str = "void";

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Full parameter text as written, e.g. `const Bytef *buf`.
    pub type_text: String,
    /// Identifier the wrapper forwards, if one could be recognised.
    pub name: Option<String>,
}

/// A signature broken into the pieces the wrapper synthesizer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub is_locally_scoped: bool,
    pub return_type: String,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl ParsedSignature {
    /// Argument names forwarded by the wrapper call, in declaration order.
    pub fn forwarded_args(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter_map(|p| p.name.as_deref())
            .collect()
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == VOID_RETURN
    }
}

/// What the analyzer concluded about a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAnalysis {
    /// Externally linkable already; the source is used unchanged.
    NoWrapperNeeded,
    /// File-local function that needs a `test_` wrapper.
    Local(ParsedSignature),
}

/// Reasons a locally scoped signature cannot be wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("cannot determine function name from signature `{0}`")]
    NoName(String),
    #[error("cannot determine return type from signature `{0}`")]
    NoReturnType(String),
    #[error("unterminated parameter list in signature `{0}`")]
    UnterminatedParameters(String),
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid name regex"))
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"))
}

/// Whether `text` is a syntactically valid C identifier.
pub fn is_identifier(text: &str) -> bool {
    identifier_regex().is_match(text)
}

/// Whether the signature carries the scope-restricting keyword as a token.
pub fn is_locally_scoped(signature: &str, scope_keyword: &str) -> bool {
    signature.split_whitespace().any(|tok| tok == scope_keyword)
}

/// Analyze a signature.
///
/// Signatures without `scope_keyword` return [`SignatureAnalysis::NoWrapperNeeded`]
/// without any further parsing.
pub fn analyze(signature: &str, scope_keyword: &str) -> Result<SignatureAnalysis, SignatureError> {
    if !is_locally_scoped(signature, scope_keyword) {
        return Ok(SignatureAnalysis::NoWrapperNeeded);
    }
    parse(signature, scope_keyword).map(SignatureAnalysis::Local)
}

/// Parse a signature into its components regardless of linkage.
pub fn parse(signature: &str, scope_keyword: &str) -> Result<ParsedSignature, SignatureError> {
    let cleaned = unwrap_prototype_macro(signature.trim());

    let caps = name_regex()
        .captures(&cleaned)
        .ok_or_else(|| SignatureError::NoName(signature.to_string()))?;
    let (Some(whole), Some(name_match)) = (caps.get(0), caps.get(1)) else {
        return Err(SignatureError::NoName(signature.to_string()));
    };

    let return_type = cleaned[..name_match.start()]
        .split_whitespace()
        .filter(|tok| *tok != scope_keyword)
        .collect::<Vec<_>>()
        .join(" ");
    if return_type.is_empty() {
        return Err(SignatureError::NoReturnType(signature.to_string()));
    }

    // `whole` ends just past the opening parenthesis.
    let params_text = balanced_parameters(&cleaned[whole.end()..])
        .ok_or_else(|| SignatureError::UnterminatedParameters(signature.to_string()))?;

    Ok(ParsedSignature {
        is_locally_scoped: is_locally_scoped(signature, scope_keyword),
        return_type,
        name: name_match.as_str().to_string(),
        parameters: split_parameters(params_text),
    })
}

/// Rewrite K&R-compatible `OF((a, b))` prototypes into a plain `(a, b)` list.
fn unwrap_prototype_macro(signature: &str) -> String {
    match signature.find("OF((") {
        Some(pos) => {
            let mut out = String::with_capacity(signature.len());
            out.push_str(&signature[..pos]);
            out.push_str(&signature[pos + 3..].replacen("))", ")", 1));
            out
        }
        None => signature.to_string(),
    }
}

/// Text between an already consumed `(` and its matching `)`.
fn balanced_parameters(rest: &str) -> Option<&str> {
    let mut depth = 1usize;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split a parameter list on top-level commas.
fn split_parameters(params: &str) -> Vec<Parameter> {
    let trimmed = params.trim();
    if trimmed.is_empty() || trimmed == VOID_RETURN {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in trimmed.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&trimmed[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    pieces.push(&trimmed[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Parameter {
            type_text: p.to_string(),
            name: argument_name(p),
        })
        .collect()
}

/// The forwardable name of a parameter: its last token without pointer stars
/// or a trailing semicolon, if that is an identifier.
fn argument_name(param: &str) -> Option<String> {
    let last = param.split_whitespace().last()?;
    let candidate = last.trim_start_matches('*').trim_end_matches(';');
    is_identifier(candidate).then(|| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(signature: &str) -> ParsedSignature {
        match analyze(signature, DEFAULT_SCOPE_KEYWORD).unwrap() {
            SignatureAnalysis::Local(parsed) => parsed,
            SignatureAnalysis::NoWrapperNeeded => panic!("expected local signature"),
        }
    }

    // =========================================================================
    // linkage
    // =========================================================================

    #[test]
    fn test_external_function_needs_no_wrapper() {
        let result = analyze("int ZEXPORT gzungetc(int c, gzFile file)", "local").unwrap();
        assert_eq!(result, SignatureAnalysis::NoWrapperNeeded);
    }

    #[test]
    fn test_keyword_must_be_a_whole_token() {
        assert!(!is_locally_scoped("int localize(int x)", "local"));
        assert!(is_locally_scoped("local int f(int x)", "local"));
    }

    #[test]
    fn test_custom_scope_keyword() {
        assert!(is_locally_scoped("static void helper(void)", "static"));
        assert_eq!(
            analyze("static void helper(void)", "local").unwrap(),
            SignatureAnalysis::NoWrapperNeeded
        );
    }

    // =========================================================================
    // components
    // =========================================================================

    #[test]
    fn test_parse_simple_local() {
        let parsed = local("local int gz_skip(gz_statep state, z_off64_t len)");
        assert!(parsed.is_locally_scoped);
        assert_eq!(parsed.return_type, "int");
        assert_eq!(parsed.name, "gz_skip");
        assert_eq!(parsed.forwarded_args(), vec!["state", "len"]);
        assert_eq!(parsed.parameters[0].type_text, "gz_statep state");
    }

    #[test]
    fn test_return_type_whitespace_collapsed() {
        let parsed = local("local   unsigned   long  crc32_little(unsigned long crc)");
        assert_eq!(parsed.return_type, "unsigned long");
    }

    #[test]
    fn test_pointer_parameters_forward_bare_names() {
        let parsed = local("local void copy_block(deflate_state *s, charf *buf, unsigned len)");
        assert_eq!(parsed.forwarded_args(), vec!["s", "buf", "len"]);
        assert!(parsed.returns_void());
    }

    #[test]
    fn test_pointer_return_type() {
        let parsed = local("local char *gz_strwinerror(DWORD error)");
        assert_eq!(parsed.return_type, "char *");
        assert_eq!(parsed.name, "gz_strwinerror");
    }

    #[test]
    fn test_zero_parameters() {
        assert!(local("local void tr_static_init()").parameters.is_empty());
        assert!(local("local void tr_static_init(void)").parameters.is_empty());
    }

    #[test]
    fn test_unnamed_parameter_is_kept_but_not_forwarded() {
        let parsed = local("local int check(int, char *name)");
        assert_eq!(parsed.parameters.len(), 2);
        // `int` is itself an identifier token, so it is forwarded verbatim
        assert_eq!(parsed.forwarded_args(), vec!["int", "name"]);

        let parsed = local("local int check(char *, int n)");
        assert_eq!(parsed.parameters[0].type_text, "char *");
        assert_eq!(parsed.forwarded_args(), vec!["n"]);
    }

    #[test]
    fn test_function_pointer_parameter_not_forwarded() {
        let parsed = local("local int apply(int (*cb)(int, int), int seed)");
        assert_eq!(parsed.parameters.len(), 2);
        assert_eq!(parsed.parameters[0].type_text, "int (*cb)(int, int)");
        assert_eq!(parsed.forwarded_args(), vec!["seed"]);
    }

    #[test]
    fn test_prototype_macro_unwrapped() {
        let parsed = local("local int gz_load OF((gz_statep state, unsigned char *buf))");
        assert_eq!(parsed.name, "gz_load");
        assert_eq!(parsed.forwarded_args(), vec!["state", "buf"]);
    }

    #[test]
    fn test_forwarded_count_equals_parameter_count() {
        for n in 1..6 {
            let params: Vec<String> = (0..n).map(|i| format!("int *a{}", i)).collect();
            let parsed = local(&format!("local int f({})", params.join(", ")));
            assert_eq!(parsed.forwarded_args().len(), n);
        }
    }

    // =========================================================================
    // failures
    // =========================================================================

    #[test]
    fn test_no_name_is_an_error() {
        let err = analyze("local int", "local").unwrap_err();
        assert!(matches!(err, SignatureError::NoName(_)));
    }

    #[test]
    fn test_missing_return_type_is_an_error() {
        let err = analyze("local f(int x)", "local").unwrap_err();
        assert!(matches!(err, SignatureError::NoReturnType(_)));
    }

    #[test]
    fn test_unterminated_parameters_is_an_error() {
        let err = analyze("local int f(int x", "local").unwrap_err();
        assert!(matches!(err, SignatureError::UnterminatedParameters(_)));
    }
}
