use crate::errors::FormError;
use crate::types::{RefrainId, RhymeGroupId};

/// One line's worth of a rhyme string: a letter with optional digits ("a", "A", "A2"), or a
/// single space for an intentionally empty line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RhymeToken(String);

impl RhymeToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0 == " "
    }

    /// The lowercased letter shared by every line in this token's rhyme group.
    #[must_use]
    pub fn rhyme_group(&self) -> Option<RhymeGroupId> {
        let first = self.0.chars().next()?;
        if first == ' ' {
            return None;
        }
        first.to_lowercase().next()
    }

    /// Uppercase tokens are refrains, and the whole token (letter plus digits) names which one.
    #[must_use]
    pub fn refrain_id(&self) -> Option<RefrainId> {
        self.0
            .chars()
            .next()
            .filter(|c| c.is_uppercase())
            .map(|_| self.0.clone())
    }

    fn is_valid(&self) -> bool {
        let mut chars = self.0.chars();
        let Some(first) = chars.next() else {
            return false;
        };
        let digits = chars.as_str();
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        if first.is_uppercase() {
            true
        } else if first.is_alphabetic() || first == ' ' {
            digits.is_empty()
        } else {
            false
        }
    }
}

/// Split a rhyme string into one token per line. A new token starts at every character that
/// isn't a digit, so "A1bA2" is `["A1", "b", "A2"]`. An empty string yields a single blank token.
pub fn tokenize_rhyme(rhyme: &str) -> Result<Vec<RhymeToken>, FormError> {
    let mut tokens: Vec<RhymeToken> = vec![];
    let mut buffer = String::new();

    for c in rhyme.chars() {
        if !c.is_ascii_digit() && !buffer.is_empty() {
            tokens.push(RhymeToken(std::mem::take(&mut buffer)));
        }
        buffer.push(c);
    }
    if !buffer.is_empty() {
        tokens.push(RhymeToken(buffer));
    }

    if tokens.is_empty() {
        return Ok(vec![RhymeToken(" ".into())]);
    }

    if let Some(bad) = tokens.iter().find(|token| !token.is_valid()) {
        return Err(FormError::RhymeFormat(format!(
            "{rhyme:?} (bad token {:?})",
            bad.as_str()
        )));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use crate::errors::FormError;
    use crate::rhyme_pattern::tokenize_rhyme;

    fn token_strings(rhyme: &str) -> Vec<String> {
        tokenize_rhyme(rhyme)
            .unwrap()
            .iter()
            .map(|token| token.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_tokenize_rhyme() {
        assert_eq!(token_strings("aabba"), vec!["a", "a", "b", "b", "a"]);
        assert_eq!(
            token_strings("A1bA2 abA1"),
            vec!["A1", "b", "A2", " ", "a", "b", "A1"]
        );
        assert_eq!(token_strings("aabR"), vec!["a", "a", "b", "R"]);
        assert_eq!(token_strings(""), vec![" "]);
        assert_eq!(token_strings("A12"), vec!["A12"]);
    }

    #[test]
    fn test_token_properties() {
        let tokens = tokenize_rhyme("A1b A2").unwrap();

        assert_eq!(tokens[0].rhyme_group(), Some('a'));
        assert_eq!(tokens[0].refrain_id(), Some("A1".to_string()));
        assert_eq!(tokens[1].rhyme_group(), Some('b'));
        assert_eq!(tokens[1].refrain_id(), None);
        assert!(tokens[2].is_blank());
        assert_eq!(tokens[2].rhyme_group(), None);
        assert_ne!(tokens[0].refrain_id(), tokens[3].refrain_id());
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        for rhyme in ["a1", "1", "11221", " 1", " 11", ":1", "ab:", "a-b"] {
            assert!(
                matches!(tokenize_rhyme(rhyme), Err(FormError::RhymeFormat(_))),
                "expected {rhyme:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_tokenizing_is_idempotent() {
        let rhyme = "A1bA2 abA1 abA2 abA1 abA2 abA1A2";
        assert_eq!(tokenize_rhyme(rhyme).unwrap(), tokenize_rhyme(rhyme).unwrap());
    }
}
