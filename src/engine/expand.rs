//! Macro expansion: the `$(...)` interpreter.
//!
//! Expansion is a recursive descent over an immutable string with a shared
//! byte cursor. Each sub-parse receives the set of terminator bytes that
//! end it; nested `$(...)` calls consume their own parentheses. The head of
//! a call is itself expanded before it is interpreted, so computed variable
//! names work.
//!
//! `$(name)` expands to the keys of `name`, resolved with inheritance from
//! the current scope and joined with spaces; an unbound name expands to
//! nothing. `$(func arg,...)` invokes a builtin. A missing `)` is
//! tolerated: the call simply consumes the rest of the input.

use crate::util::words;

use super::scope::Engine;

/// Expand all macro calls in `text` against the engine's current scope.
pub fn evaluate(engine: &mut Engine, text: &str) -> String {
    let mut out = String::new();
    let mut pos = 0;
    expand(engine, text, &mut pos, b"", &mut out);
    out
}

fn expand(engine: &mut Engine, text: &str, pos: &mut usize, stops: &[u8], out: &mut String) {
    let bytes = text.as_bytes();
    while *pos < bytes.len() && !stops.contains(&bytes[*pos]) {
        if bytes[*pos] == b'$' && bytes.get(*pos + 1) == Some(&b'(') {
            *pos += 2;
            expand_call(engine, text, pos, out);
        } else {
            // literal run up to the next macro start or terminator
            let start = *pos;
            *pos += 1;
            while *pos < bytes.len() && bytes[*pos] != b'$' && !stops.contains(&bytes[*pos]) {
                *pos += 1;
            }
            out.push_str(&text[start..*pos]);
        }
    }
}

fn expand_call(engine: &mut Engine, text: &str, pos: &mut usize, out: &mut String) {
    let bytes = text.as_bytes();

    let mut head = String::new();
    expand(engine, text, pos, b" )", &mut head);

    if bytes.get(*pos) == Some(&b' ') {
        *pos += 1;
        apply_builtin(engine, &head, text, pos, out);
        // discard surplus arguments the builtin did not consume
        while *pos < bytes.len() && bytes[*pos] != b')' {
            let mut surplus = String::new();
            expand(engine, text, pos, b",)", &mut surplus);
            if bytes.get(*pos) == Some(&b',') {
                *pos += 1;
            }
        }
    } else {
        let keys = engine.get_keys_of(&head, true);
        out.push_str(&words::join_words(&keys));
    }

    if bytes.get(*pos) == Some(&b')') {
        *pos += 1;
    }
}

/// Expand one comma-terminated argument and consume the trailing comma.
fn argument(engine: &mut Engine, text: &str, pos: &mut usize) -> String {
    let mut arg = String::new();
    expand(engine, text, pos, b",)", &mut arg);
    if text.as_bytes().get(*pos) == Some(&b',') {
        *pos += 1;
    }
    arg
}

fn apply_builtin(engine: &mut Engine, name: &str, text: &str, pos: &mut usize, out: &mut String) {
    match name {
        "patsubst" => {
            let pattern = argument(engine, text, pos);
            let replacement = argument(engine, text, pos);
            let source = argument(engine, text, pos);
            let mapped: Vec<String> = words::split_words(&source)
                .iter()
                .map(|word| words::patsubst(&pattern, &replacement, word))
                .collect();
            out.push_str(&words::join_words(&mapped));
        }
        "subst" => {
            let from = argument(engine, text, pos);
            let to = argument(engine, text, pos);
            let source = argument(engine, text, pos);
            let mapped: Vec<String> = words::split_words(&source)
                .iter()
                .map(|word| words::subst(&from, &to, word))
                .collect();
            out.push_str(&words::join_words(&mapped));
        }
        "firstword" => {
            let source = argument(engine, text, pos);
            if let Some(first) = words::split_words(&source).into_iter().next() {
                out.push_str(&first);
            }
        }
        "foreach" => {
            let variable = argument(engine, text, pos);
            let list = argument(engine, text, pos);
            let items = words::split_words(&list);

            // The body is re-expanded from the same cursor position for
            // each list element, inside one fresh scope that holds the
            // loop variable.
            let body_start = *pos;
            let mut results = Vec::with_capacity(items.len());
            engine.enter_unnamed_key();
            for item in &items {
                engine.bind_word(&variable, item);
                *pos = body_start;
                let mut expanded = String::new();
                expand(engine, text, pos, b",)", &mut expanded);
                results.push(expanded);
            }
            engine.leave_key();
            out.push_str(&words::join_words(&results));
            if text.as_bytes().get(*pos) == Some(&b',') {
                *pos += 1;
            }
        }
        // unknown functions expand to nothing; arguments are discarded
        // by the caller
        other => tracing::debug!("unknown function `{}`", other),
    }
}
