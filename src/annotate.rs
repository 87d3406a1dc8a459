//! Dependency list extraction for injectable callables.

use crate::{InjectError, InjectResult, Svc, Target};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static ARROW_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^(]+?)=>").expect("Invalid arrow argument pattern")
});
static FN_ARGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[^(]*\(\s*([^)]*)\)")
        .expect("Invalid function argument pattern")
});
static STRIP_COMMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(//.*$)|(/\*[\s\S]*?\*/)")
        .expect("Invalid comment pattern")
});
static CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:class\b|constructor\()").expect("Invalid class pattern")
});
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace pattern"));

/// Whether declaration text describes a class.
pub(crate) fn is_class(declaration: &str) -> bool {
    CLASS.is_match(declaration)
}

/// The raw parameter list of a declaration, with comments removed.
fn extract_args(declaration: &str) -> Option<String> {
    let stripped = STRIP_COMMENTS.replace_all(declaration, "");
    ARROW_ARG
        .captures(&stripped)
        .or_else(|| FN_ARGS.captures(&stripped))
        .and_then(|captures| captures.get(1))
        .map(|args| args.as_str().to_owned())
}

/// Parses one entry of a parameter list. Entries containing whitespace are
/// not plain identifiers and produce no name. A name wrapped in single
/// underscores on both sides is unwrapped.
fn parse_param(param: &str) -> Option<&str> {
    let param = param.trim();
    if param.is_empty() || param.contains(char::is_whitespace) {
        return None;
    }

    match param
        .strip_prefix('_')
        .and_then(|rest| rest.strip_suffix('_'))
    {
        Some(inner) if !inner.is_empty() => Some(inner),
        _ => Some(param),
    }
}

fn parse_params(declaration: &str) -> Vec<String> {
    extract_args(declaration)
        .map(|args| {
            args.split(',')
                .filter_map(parse_param)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// The number of formal parameters of a declaration.
pub(crate) fn count_params(declaration: &str) -> usize {
    extract_args(declaration).map_or(0, |args| {
        args.split(',').filter(|arg| !arg.trim().is_empty()).count()
    })
}

/// The parameter list of a declaration as it should appear in diagnostics.
pub(crate) fn params_text(declaration: &str) -> String {
    extract_args(declaration)
        .map(|args| WHITESPACE.replace(&args, " ").into_owned())
        .unwrap_or_default()
}

fn anon_fn(declaration: Option<&str>) -> String {
    declaration
        .and_then(extract_args)
        .map(|args| format!("function({})", WHITESPACE.replace(&args, " ")))
        .unwrap_or_else(|| "fn".to_owned())
}

/// Computes the dependency list of a target.
///
/// Annotated targets use their inline list. Callables use their explicit
/// list if one was set, and otherwise infer one from their declaration text
/// and remember it. In strict mode a callable with parameters but no
/// explicit list is rejected, and `name` is used to identify it in the
/// error.
///
/// ```
/// use named_injector::{annotate, Func};
///
/// let func = Func::new(|_| Ok(None)).declared("function (a, _b_, c) {}");
/// let names = annotate(&func.into(), false, None).unwrap();
/// assert_eq!(["a", "b", "c"].map(String::from), *names);
/// ```
pub fn annotate(
    target: &Target,
    strict: bool,
    name: Option<&str>,
) -> InjectResult<Svc<[String]>> {
    let func = match target {
        Target::Annotated(annotated) => return Ok(annotated.inject().clone()),
        Target::Func(func) => func,
    };

    func.inject_cell()
        .get_or_try_init(|| {
            if func.arity() == 0 {
                return Ok(Svc::from(Vec::new()));
            }

            if strict {
                let name = name
                    .filter(|name| !name.is_empty())
                    .or_else(|| func.name())
                    .map_or_else(|| anon_fn(func.declaration()), str::to_owned);
                return Err(InjectError::StrictModeViolation { name });
            }

            let names = func.declaration().map(parse_params).unwrap_or_default();
            trace!(?names, "inferred dependency list");
            Ok(Svc::from(names))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Annotated, Func};

    fn declared(text: &str) -> Target {
        Func::new(|_| Ok(None)).declared(text).into()
    }

    fn names(target: &Target) -> Vec<String> {
        annotate(target, false, None).unwrap().to_vec()
    }

    #[test]
    fn infers_function_parameters() {
        assert_eq!(
            vec!["a", "b"],
            names(&declared("function test(a, b) { return a + b; }"))
        );
        assert!(names(&declared("function () {}")).is_empty());
    }

    #[test]
    fn strips_comments() {
        let target = declared(
            "function(a, /* b */ c, // d\n e /* f,\n g */) {}",
        );
        assert_eq!(vec!["a", "c", "e"], names(&target));
    }

    #[test]
    fn unwraps_underscored_names() {
        let target = declared("function(_a_, b_, _c, _, __, ___) {}");
        assert_eq!(vec!["a", "b_", "_c", "_", "__", "_"], names(&target));
    }

    #[test]
    fn infers_arrow_parameters() {
        assert_eq!(vec!["x"], names(&declared("x => x")));
        assert_eq!(vec!["a", "b"], names(&declared("(a, b) => a + b")));
        assert!(names(&declared("() => 1")).is_empty());
    }

    #[test]
    fn explicit_list_wins() {
        let target: Target = Func::new(|_| Ok(None))
            .declared("function (a, b) {}")
            .inject(["c"])
            .into();
        assert_eq!(vec!["c"], names(&target));

        let target: Target = Annotated::new(["d"], Func::new(|_| Ok(None))).into();
        assert_eq!(vec!["d"], names(&target));
    }

    #[test]
    fn inferred_list_is_cached() {
        let target = declared("function (a) {}");
        let first = annotate(&target, false, None).unwrap();
        let second = annotate(&target, true, None).unwrap();
        assert!(Svc::ptr_eq(&first, &second));
    }

    #[test]
    fn strict_mode_rejects_inference() {
        let target = declared("function(a,\n  b) {}");
        let error = annotate(&target, true, None).unwrap_err();
        assert_eq!(
            "'function(a, b)' is not using explicit annotation and cannot be invoked in strict mode",
            error.to_string()
        );

        let error = annotate(&target, true, Some("myService")).unwrap_err();
        assert!(error.to_string().starts_with("'myService'"));

        let named: Target = Func::new(|_| Ok(None))
            .named("namedFn")
            .declared("function namedFn(a) {}")
            .into();
        let error = annotate(&named, true, Some("")).unwrap_err();
        assert!(error.to_string().starts_with("'namedFn'"));
    }

    #[test]
    fn strict_mode_allows_parameterless_callables() {
        assert!(annotate(&declared("function () {}"), true, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn detects_classes() {
        assert!(is_class("class Foo {}"));
        assert!(is_class("constructor(a) {}"));
        assert!(!is_class("function classy() {}"));
    }
}
