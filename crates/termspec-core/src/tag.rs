//! Terminology tag parsing (spec.md section 4.5).
//!
//! Parses a single `[[...]]` lexeme -- opener, type token, optional `:` plus a
//! comma-separated argument list, closer -- into a [`TerminologyTag`]. Callers
//! (the Markdown Engine Facade's inline rule, see `markdown.rs`) are
//! responsible for locating the `[[...]]` span in source text; this module
//! only parses the inside of one such span.

use crate::error::Error;

/// A parsed terminology tag, tagged by kind per spec.md section 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminologyTag {
    /// `[[def: term[, alias...]]]` -- a local term definition.
    Def {
        /// The defined term.
        term: String,
        /// Zero or more aliases, in source order.
        aliases: Vec<String>,
    },
    /// `[[ref: term]]` -- an intra-document reference.
    Ref {
        /// The referenced term.
        term: String,
    },
    /// `[[iref: term]]` -- an intra-document reference with client-side inline copy.
    Iref {
        /// The referenced term.
        term: String,
    },
    /// `[[xref: externalSpec, term[, alias]]]` -- a link to a remote term.
    Xref {
        /// The external spec key.
        external_spec: String,
        /// The referenced term.
        term: String,
        /// At most one display alias.
        alias: Option<String>,
    },
    /// `[[tref: externalSpec, term[, alias...]]]` -- a transcluded remote term.
    Tref {
        /// The external spec key.
        external_spec: String,
        /// The referenced term.
        term: String,
        /// Zero or more aliases, in source order.
        aliases: Vec<String>,
    },
}

impl TerminologyTag {
    /// The canonical `externalSpec` this tag targets, if any.
    #[must_use]
    pub fn external_spec(&self) -> Option<&str> {
        match self {
            Self::Xref { external_spec, .. } | Self::Tref { external_spec, .. } => {
                Some(external_spec)
            }
            Self::Def { .. } | Self::Ref { .. } | Self::Iref { .. } => None,
        }
    }

    /// The term this tag targets.
    #[must_use]
    pub fn term(&self) -> &str {
        match self {
            Self::Def { term, .. }
            | Self::Ref { term }
            | Self::Iref { term }
            | Self::Xref { term, .. }
            | Self::Tref { term, .. } => term,
        }
    }
}

/// Parses the inner content of a `[[...]]` lexeme (without the surrounding brackets).
///
/// # Errors
///
/// Returns [`Error::TagMalformed`] when the type token is unrecognized or the
/// argument counts don't match spec.md section 4.5's contract. An `xref` with
/// more than one alias is tolerated here (the extra aliases are simply
/// discarded, first wins); the caller is expected to additionally record a
/// [`crate::findings::FindingKind::XrefWithMultipleAliases`] finding when this
/// happens. See [`parse_tag_body_with_alias_overflow`] for a version that
/// reports it directly.
pub fn parse_tag_body(body: &str) -> Result<TerminologyTag, Error> {
    parse_tag_body_with_alias_overflow(body).map(|(tag, _)| tag)
}

/// Same as [`parse_tag_body`] but also reports whether an `xref` tag supplied
/// more aliases than allowed (spec.md section 4.5: "extra aliases -> error,
/// first is used").
pub fn parse_tag_body_with_alias_overflow(body: &str) -> Result<(TerminologyTag, bool), Error> {
    let (type_token, rest) = split_type_and_args(body)?;
    let args = parse_args(rest);

    let tag = match type_token {
        "def" => {
            let (term, aliases) = require_term_and_aliases(&args, "def")?;
            return Ok((TerminologyTag::Def { term, aliases }, false));
        }
        "ref" => TerminologyTag::Ref {
            term: require_single_arg(&args, "ref")?,
        },
        "iref" => TerminologyTag::Iref {
            term: require_single_arg(&args, "iref")?,
        },
        "xref" => {
            if args.len() < 2 {
                return Err(Error::TagMalformed(
                    "xref requires an external spec and a term".to_string(),
                ));
            }
            let external_spec = args[0].clone();
            let term = args[1].clone();
            let overflow = args.len() > 3;
            let alias = args.get(2).cloned();
            return Ok((
                TerminologyTag::Xref {
                    external_spec,
                    term,
                    alias,
                },
                overflow,
            ));
        }
        "tref" => {
            if args.len() < 2 {
                return Err(Error::TagMalformed(
                    "tref requires an external spec and a term".to_string(),
                ));
            }
            let external_spec = args[0].clone();
            let term = args[1].clone();
            let aliases = args[2..].to_vec();
            return Ok((
                TerminologyTag::Tref {
                    external_spec,
                    term,
                    aliases,
                },
                false,
            ));
        }
        other => {
            return Err(Error::TagMalformed(format!(
                "unrecognized tag type {other:?}"
            )));
        }
    };

    Ok((tag, false))
}

fn split_type_and_args(body: &str) -> Result<(&str, &str), Error> {
    let body = body.trim();
    match body.split_once(':') {
        Some((ty, rest)) => Ok((ty.trim(), rest)),
        None => {
            // Tags with zero arguments (not used by any current tag type, but
            // tolerated so `[[ref]]`-style typos fail with a clear message
            // rather than panicking on `split_once`).
            Ok((body, ""))
        }
    }
}

fn parse_args(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn require_single_arg(args: &[String], type_name: &str) -> Result<String, Error> {
    match args {
        [only] => Ok(only.clone()),
        [] => Err(Error::TagMalformed(format!(
            "{type_name} requires exactly one term"
        ))),
        _ => Err(Error::TagMalformed(format!(
            "{type_name} accepts exactly one term, got {}",
            args.len()
        ))),
    }
}

fn require_term_and_aliases(
    args: &[String],
    type_name: &str,
) -> Result<(String, Vec<String>), Error> {
    match args.split_first() {
        Some((term, aliases)) => Ok((term.clone(), aliases.to_vec())),
        None => Err(Error::TagMalformed(format!("{type_name} requires a term"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_def_with_aliases() {
        let tag = parse_tag_body("def: alpha, alp").unwrap();
        assert_eq!(
            tag,
            TerminologyTag::Def {
                term: "alpha".to_string(),
                aliases: vec!["alp".to_string()],
            }
        );
    }

    #[test]
    fn parses_ref() {
        let tag = parse_tag_body("ref: alpha").unwrap();
        assert_eq!(
            tag,
            TerminologyTag::Ref {
                term: "alpha".to_string()
            }
        );
    }

    #[test]
    fn xref_trims_whitespace_around_arguments() {
        let tag = parse_tag_body("xref:  keri ,  delegator , del ").unwrap();
        assert_eq!(
            tag,
            TerminologyTag::Xref {
                external_spec: "keri".to_string(),
                term: "delegator".to_string(),
                alias: Some("del".to_string()),
            }
        );
    }

    #[test]
    fn xref_with_multiple_aliases_uses_first_and_flags_overflow() {
        let (tag, overflow) =
            parse_tag_body_with_alias_overflow("xref: keri, delegator, del, del2").unwrap();
        assert!(overflow);
        assert_eq!(
            tag,
            TerminologyTag::Xref {
                external_spec: "keri".to_string(),
                term: "delegator".to_string(),
                alias: Some("del".to_string()),
            }
        );
    }

    #[test]
    fn tref_collects_all_aliases() {
        let tag = parse_tag_body("tref: spec-a, composability, KPB, alt").unwrap();
        assert_eq!(
            tag,
            TerminologyTag::Tref {
                external_spec: "spec-a".to_string(),
                term: "composability".to_string(),
                aliases: vec!["KPB".to_string(), "alt".to_string()],
            }
        );
    }

    #[test]
    fn unrecognized_type_is_malformed() {
        assert!(parse_tag_body("bogus: x").is_err());
    }

    #[test]
    fn xref_missing_term_is_malformed() {
        assert!(parse_tag_body("xref: keri").is_err());
    }

    #[test]
    fn trailing_empty_arguments_are_discarded() {
        let tag = parse_tag_body("def: alpha, alp,").unwrap();
        assert_eq!(
            tag,
            TerminologyTag::Def {
                term: "alpha".to_string(),
                aliases: vec!["alp".to_string()],
            }
        );
    }
}
