//! Static checks that a regex can be executed by the automaton engine.
//!
//! The engine advances one token at a time from a single deterministic start
//! state and never looks back at text it has already consumed. A pattern is
//! accepted only if it uses no construct the engine lacks (backreferences,
//! look-around, word boundaries) and needs no context before the first
//! character it consumes (no anchor or assertion ahead of every consumer).

use bridle_core::{CertificationError, UnsupportedFeature};
use regex_syntax::ast::parse::Parser;
use regex_syntax::ast::{self, AssertionKind, Ast, RepetitionKind, RepetitionRange, Span};

/// Certify `pattern` for the automaton engine.
pub fn certify(pattern: &str) -> Result<(), CertificationError> {
    let ast = parse(pattern)?;
    check_supported(&ast, pattern)?;
    if let Some(span) = anchor_before_consumer(&ast) {
        return Err(CertificationError::AnchoredPattern {
            construct: snippet(pattern, &span),
        });
    }
    Ok(())
}

fn parse(pattern: &str) -> Result<Ast, CertificationError> {
    Parser::new().parse(pattern).map_err(|e| {
        let construct = snippet(pattern, e.span());
        match e.kind() {
            ast::ErrorKind::UnsupportedBackreference => CertificationError::UnsupportedFeature {
                feature: UnsupportedFeature::Backreference,
                construct,
            },
            ast::ErrorKind::UnsupportedLookAround => CertificationError::UnsupportedFeature {
                feature: UnsupportedFeature::LookAround,
                construct,
            },
            _ => CertificationError::InvalidSyntax(e.to_string()),
        }
    })
}

fn check_supported(ast: &Ast, pattern: &str) -> Result<(), CertificationError> {
    match ast {
        Ast::Assertion(assertion) if !is_anchor(&assertion.kind) => {
            Err(CertificationError::UnsupportedFeature {
                feature: UnsupportedFeature::WordBoundary,
                construct: snippet(pattern, &assertion.span),
            })
        }
        Ast::Repetition(rep) => check_supported(&rep.ast, pattern),
        Ast::Group(group) => check_supported(&group.ast, pattern),
        Ast::Alternation(alt) => alt.asts.iter().try_for_each(|a| check_supported(a, pattern)),
        Ast::Concat(concat) => concat
            .asts
            .iter()
            .try_for_each(|a| check_supported(a, pattern)),
        _ => Ok(()),
    }
}

fn is_anchor(kind: &AssertionKind) -> bool {
    matches!(
        kind,
        AssertionKind::StartLine
            | AssertionKind::EndLine
            | AssertionKind::StartText
            | AssertionKind::EndText
    )
}

/// Span of the first assertion that sits before any character-consuming
/// construct, or `None` if the pattern has a universal start state.
fn anchor_before_consumer(ast: &Ast) -> Option<Span> {
    let items = match ast {
        Ast::Concat(concat) => concat.asts.as_slice(),
        other => std::slice::from_ref(other),
    };

    for item in items {
        match item {
            Ast::Assertion(assertion) => return Some(assertion.span),
            Ast::Literal(_)
            | Ast::Dot(_)
            | Ast::ClassUnicode(_)
            | Ast::ClassPerl(_)
            | Ast::ClassBracketed(_) => return None,
            Ast::Group(group) => {
                if let Some(span) = anchor_before_consumer(&group.ast) {
                    return Some(span);
                }
                if can_consume(&group.ast) {
                    return None;
                }
            }
            Ast::Alternation(alt) => {
                // One anchored branch is enough to lose the universal start
                // state; otherwise a consuming branch ends the prefix.
                let mut saw_consumer = false;
                for branch in &alt.asts {
                    if let Some(span) = anchor_before_consumer(branch) {
                        return Some(span);
                    }
                    saw_consumer |= can_consume(branch);
                }
                if saw_consumer {
                    return None;
                }
            }
            Ast::Repetition(rep) => {
                if let Some(span) = anchor_before_consumer(&rep.ast) {
                    return Some(span);
                }
                if can_consume(item) {
                    return None;
                }
            }
            Ast::Concat(_) => {
                if let Some(span) = anchor_before_consumer(item) {
                    return Some(span);
                }
                if can_consume(item) {
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether `ast` can consume at least one character.
fn can_consume(ast: &Ast) -> bool {
    match ast {
        Ast::Literal(_)
        | Ast::Dot(_)
        | Ast::ClassUnicode(_)
        | Ast::ClassPerl(_)
        | Ast::ClassBracketed(_) => true,
        Ast::Repetition(rep) => !repeats_zero_times(&rep.op.kind) && can_consume(&rep.ast),
        Ast::Group(group) => can_consume(&group.ast),
        Ast::Alternation(alt) => alt.asts.iter().any(can_consume),
        Ast::Concat(concat) => concat.asts.iter().any(can_consume),
        _ => false,
    }
}

fn repeats_zero_times(kind: &RepetitionKind) -> bool {
    matches!(
        kind,
        RepetitionKind::Range(RepetitionRange::Exactly(0))
            | RepetitionKind::Range(RepetitionRange::Bounded(_, 0))
    )
}

fn snippet(pattern: &str, span: &Span) -> String {
    pattern
        .get(span.start.offset..span.end.offset)
        .filter(|s| !s.is_empty())
        .unwrap_or(pattern)
        .to_string()
}
