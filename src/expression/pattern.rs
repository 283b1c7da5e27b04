use crate::core::{Result, StoreError};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const REGEX_CACHE_CAPACITY: usize = 200;

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Mutex<LruCache<String, Arc<Regex>>> = Mutex::new(LruCache::new(
        NonZeroUsize::new(REGEX_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN)
    ));
}

/// Translates a LIKE pattern (`%` any run, `_` one char, `\` escape) to an
/// anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Simple shapes (`abc`, `abc%`, `%abc`, `%abc%`) without a regex.
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains('_') || pattern.contains('\\') {
        return None;
    }

    let (text, pattern) = if case_sensitive {
        (text.to_string(), pattern.to_string())
    } else {
        (text.to_lowercase(), pattern.to_lowercase())
    };

    let inner_wildcards = |s: &str| s.contains('%');

    if !pattern.contains('%') {
        return Some(text == pattern);
    }

    if let Some(prefix) = pattern.strip_suffix('%')
        && !inner_wildcards(prefix)
    {
        return Some(text.starts_with(prefix));
    }

    if let Some(suffix) = pattern.strip_prefix('%')
        && !inner_wildcards(suffix)
    {
        return Some(text.ends_with(suffix));
    }

    if let Some(middle) = pattern.strip_prefix('%').and_then(|p| p.strip_suffix('%'))
        && !inner_wildcards(middle)
    {
        return Some(text.contains(middle));
    }

    None
}

fn get_or_compile_regex(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = if case_sensitive {
        format!("s:{}", pattern)
    } else {
        format!("i:{}", pattern)
    };

    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(&cache_key) {
            return Ok(Arc::clone(regex));
        }
    }

    let compiled = regex::RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| StoreError::InvalidPredicate(format!("Invalid LIKE pattern: {}", e)))?;
    let compiled = Arc::new(compiled);

    REGEX_LRU_CACHE.lock()?.put(cache_key, Arc::clone(&compiled));
    Ok(compiled)
}

/// Evaluates `text LIKE pattern`.
pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }

    let regex = get_or_compile_regex(pattern, case_sensitive)?;
    Ok(regex.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_paths() {
        assert!(eval_like("Alice", "Alice", true).unwrap());
        assert!(eval_like("Alice", "Al%", true).unwrap());
        assert!(eval_like("Alice", "%ice", true).unwrap());
        assert!(eval_like("Alice", "%lic%", true).unwrap());
        assert!(!eval_like("Alice", "al%", true).unwrap());
        assert!(eval_like("Alice", "al%", false).unwrap());
    }

    #[test]
    fn test_regex_paths() {
        assert!(eval_like("Alice", "A_i%", true).unwrap());
        assert!(eval_like("a.b", "a.b", true).unwrap());
        assert!(!eval_like("axb", "a.b", true).unwrap());
        assert!(eval_like("50%", "50\\%", true).unwrap());
        assert!(!eval_like("500", "50\\%", true).unwrap());
        assert!(eval_like("Math 101", "m%1_1", false).unwrap());
    }
}
