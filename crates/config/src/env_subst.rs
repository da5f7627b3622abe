/// Expand `${NAME}` from the process environment. Unset names keep their
/// placeholder text.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] with an explicit variable lookup.
///
/// An empty `${}` or an unterminated `${` is copied through unchanged.
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let placeholder = &rest[open..];
        let Some(close) = placeholder.find('}') else {
            out.push_str(placeholder);
            return out;
        };
        let name = &placeholder[2..close];
        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => out.push_str(&value),
            None => out.push_str(&placeholder[..=close]),
        }
        rest = &placeholder[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "CANISTER_ID_BACKEND").then(|| "ryjl3-tyaaa-aaaaa-aaaba-cai".to_string())
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("backend = \"${CANISTER_ID_BACKEND}\"", lookup),
            "backend = \"ryjl3-tyaaa-aaaaa-aaaba-cai\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("${CANISPECT_NONEXISTENT_XYZ}", lookup),
            "${CANISPECT_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_with("x ${OPEN", lookup), "x ${OPEN");
    }

    #[test]
    fn adjacent_and_empty_placeholders() {
        assert_eq!(
            substitute_with("${CANISTER_ID_BACKEND}${}$x", lookup),
            "ryjl3-tyaaa-aaaaa-aaaba-cai${}$x"
        );
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
