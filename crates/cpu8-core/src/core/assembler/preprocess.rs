//! Source preprocessing.
//!
//! Strips comments and blank lines, collects CONST/VAR symbol definitions,
//! and expands MACRO/ENDMACRO textual macros, so that the two passes only
//! ever see labels and plain instructions. Expanded lines keep the line
//! number of the macro call site for error reporting.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::errors::{AssembleError, AssembleErrorKind};
use super::expr;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const MAX_MACRO_DEPTH: usize = 16;

/// A source line surviving preprocessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based source line number.
    pub number: usize,
    /// Comment-free, trimmed text.
    pub text: String,
}

/// Preprocessed compilation unit.
#[derive(Debug, Default)]
pub struct Unit {
    /// Label and instruction lines, in order.
    pub lines: Vec<Line>,
    /// CONST/VAR symbol table.
    pub symbols: HashMap<String, i64>,
}

#[derive(Debug)]
struct Macro {
    params: Vec<String>,
    body: Vec<String>,
}

/// Run the preprocessor over a source text.
pub fn preprocess(source: &str) -> Result<Unit, AssembleError> {
    let mut unit = Unit::default();
    let mut macros: HashMap<String, Macro> = HashMap::new();

    let raw: Vec<&str> = source.lines().collect();
    let mut idx = 0;

    while idx < raw.len() {
        let number = idx + 1;
        let text = strip_comment(raw[idx]);
        idx += 1;
        if text.is_empty() {
            continue;
        }

        let (first, rest) = split_first(&text);
        match first.to_ascii_uppercase().as_str() {
            "CONST" | "CONSTANT" | "VAR" | "VARIABLE" => {
                let (name, value_text) = split_first(rest);
                if !is_identifier(name) {
                    return Err(AssembleError::at_line(
                        AssembleErrorKind::BadDirective(format!(
                            "invalid symbol name `{}`",
                            name
                        )),
                        number,
                    ));
                }
                if value_text.is_empty() {
                    return Err(AssembleError::at_line(
                        AssembleErrorKind::BadDirective(format!(
                            "symbol `{}` is missing a value",
                            name
                        )),
                        number,
                    ));
                }

                let value = expr::evaluate(value_text, &unit.symbols)
                    .map_err(|kind| AssembleError::at_line(kind, number))?;
                unit.symbols.insert(name.to_owned(), value);
            }
            "MACRO" => {
                let (name, params_text) = split_first(rest);
                if !is_identifier(name) {
                    return Err(AssembleError::at_line(
                        AssembleErrorKind::BadDirective(format!(
                            "invalid macro name `{}`",
                            name
                        )),
                        number,
                    ));
                }

                let params: Vec<String> =
                    params_text.split_whitespace().map(str::to_owned).collect();
                for param in &params {
                    if !is_identifier(param) {
                        return Err(AssembleError::at_line(
                            AssembleErrorKind::BadDirective(format!(
                                "invalid macro parameter `{}`",
                                param
                            )),
                            number,
                        ));
                    }
                }

                let mut body = Vec::new();
                let mut closed = false;
                while idx < raw.len() {
                    let body_text = strip_comment(raw[idx]);
                    idx += 1;
                    if body_text.is_empty() {
                        continue;
                    }

                    let (body_first, _) = split_first(&body_text);
                    if body_first.eq_ignore_ascii_case("ENDMACRO") {
                        closed = true;
                        break;
                    }
                    if body_first.eq_ignore_ascii_case("MACRO") {
                        return Err(AssembleError::at_line(
                            AssembleErrorKind::BadDirective(
                                "nested macro definition".to_owned(),
                            ),
                            number,
                        ));
                    }

                    body.push(body_text);
                }

                if !closed {
                    return Err(AssembleError::at_line(
                        AssembleErrorKind::BadDirective(format!(
                            "macro `{}` is missing ENDMACRO",
                            name
                        )),
                        number,
                    ));
                }

                macros.insert(name.to_owned(), Macro { params, body });
            }
            "ENDMACRO" => {
                return Err(AssembleError::at_line(
                    AssembleErrorKind::BadDirective(
                        "ENDMACRO outside a macro definition".to_owned(),
                    ),
                    number,
                ));
            }
            _ => {
                if macros.contains_key(first) {
                    expand_macro(first, rest, number, &macros, &mut unit.lines, 0)?;
                } else {
                    unit.lines.push(Line { number, text });
                }
            }
        }
    }

    Ok(unit)
}

fn expand_macro(
    name: &str,
    args_text: &str,
    number: usize,
    macros: &HashMap<String, Macro>,
    out: &mut Vec<Line>,
    depth: usize,
) -> Result<(), AssembleError> {
    if depth >= MAX_MACRO_DEPTH {
        return Err(AssembleError::at_line(
            AssembleErrorKind::BadDirective(format!("macro `{}` expands too deeply", name)),
            number,
        ));
    }

    let mac = &macros[name];
    let args: Vec<String> = args_text.split_whitespace().map(str::to_owned).collect();
    if args.len() != mac.params.len() {
        return Err(AssembleError::at_line(
            AssembleErrorKind::BadDirective(format!(
                "macro `{}` expects {} arguments, found {}",
                name,
                mac.params.len(),
                args.len()
            )),
            number,
        ));
    }

    // Substitute longer parameter names first so P1 cannot clobber P10.
    let mut order: Vec<usize> = (0..mac.params.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(mac.params[i].len()));

    for body_line in &mac.body {
        let mut expanded = body_line.clone();
        for &i in &order {
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&mac.params[i])))
                .map_err(|_| {
                    AssembleError::at_line(
                        AssembleErrorKind::BadDirective(format!(
                            "invalid macro parameter `{}`",
                            mac.params[i]
                        )),
                        number,
                    )
                })?;
            expanded = pattern.replace_all(&expanded, args[i].as_str()).into_owned();
        }

        let (expanded_first, expanded_rest) = split_first(&expanded);
        if macros.contains_key(expanded_first) {
            expand_macro(expanded_first, expanded_rest, number, macros, out, depth + 1)?;
        } else {
            out.push(Line {
                number,
                text: expanded,
            });
        }
    }

    Ok(())
}

/// Strip an end-of-line comment, honoring `;` inside character literals.
fn strip_comment(line: &str) -> String {
    let mut in_char = false;
    let mut escaped = false;
    let mut end = line.len();

    for (idx, ch) in line.char_indices() {
        if in_char {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '\'' {
                in_char = false;
            }
        } else if ch == '\'' {
            in_char = true;
        } else if ch == ';' {
            end = idx;
            break;
        }
    }

    line[..end].trim().to_owned()
}

/// Split a line into its first whitespace-delimited token and the rest.
pub fn split_first(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim_start()),
        None => (text, ""),
    }
}

/// True when `text` is a valid identifier.
pub fn is_identifier(text: &str) -> bool {
    IDENT_RE.is_match(text)
}
