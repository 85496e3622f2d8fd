//! Function body location by brace counting.
//!
//! The scan is purely lexical: braces inside string literals, character
//! literals or comments are counted like any other brace. That keeps the
//! locator trivial for well-formed, comment-light C, and means a stray `}` in a
//! comment inside the target function will end the body early (or a stray `{`
//! will make it unbalanced). Callers treat both outcomes as "skip this function".

use crate::signature::WrapperText;
use thiserror::Error;

/// Byte offsets of a located function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodySpan {
    /// Start of the matched signature text.
    pub signature_start: usize,
    /// Offset of the opening `{`.
    pub open_brace: usize,
    /// Offset just past the closing `}`.
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("function definition not found in source")]
    NotFound,
    #[error("unbalanced braces after function signature")]
    Unbalanced,
}

/// Find the body of the first definition whose signature text is followed by `{`.
pub fn locate_body(source: &str, signature: &str) -> Result<BodySpan, LocateError> {
    let needle = signature.trim();
    if needle.is_empty() {
        return Err(LocateError::NotFound);
    }

    let (signature_start, open_brace) = source
        .match_indices(needle)
        .find_map(|(idx, _)| {
            let after = idx + needle.len();
            let rest = &source[after..];
            let skipped = rest.len() - rest.trim_start().len();
            rest[skipped..]
                .starts_with('{')
                .then_some((idx, after + skipped))
        })
        .ok_or(LocateError::NotFound)?;

    let end =
        matching_brace_end(source.as_bytes(), open_brace).ok_or(LocateError::Unbalanced)?;

    Ok(BodySpan {
        signature_start,
        open_brace,
        end,
    })
}

/// Offset just past the `}` that closes the `{` at `open`.
fn matching_brace_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in bytes[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splice `wrapper` in right after the body of the function named by `signature`.
pub fn inject_wrapper(
    source: &str,
    signature: &str,
    wrapper: &WrapperText,
) -> Result<String, LocateError> {
    let span = locate_body(source, signature)?;
    tracing::debug!(
        "Definition at byte {} has its body at {}..{}",
        span.signature_start,
        span.open_brace,
        span.end
    );
    let rendered = wrapper.render();

    let mut out = String::with_capacity(source.len() + rendered.len());
    out.push_str(&source[..span.end]);
    out.push_str(&rendered);
    out.push_str(&source[span.end..]);
    Ok(out)
}
