//! Identifier case conversions used for context derivation and template filters

/// Split an identifier into lowercase words on `_`, `-`, `/`, spaces, and case changes
fn words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in input.chars() {
        if ch == '_' || ch == '-' || ch == '/' || ch == '.' || ch.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

pub fn snake(input: &str) -> String {
    words(input).join("_")
}

pub fn kebab(input: &str) -> String {
    words(input).join("-")
}

pub fn pascal(input: &str) -> String {
    words(input)
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(snake("AuthCore"), "auth_core");
        assert_eq!(snake("auth-core"), "auth_core");
        assert_eq!(kebab("auth_core"), "auth-core");
        assert_eq!(pascal("auth_core"), "AuthCore");
        assert_eq!(pascal("logging"), "Logging");
        assert_eq!(snake("OAuth2Client"), "oauth2_client");
    }
}
