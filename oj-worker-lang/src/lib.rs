//! Per-language compile/run command registry.
//!
//! The [`Language`] trait exposes the interface for defining new programming languages; the
//! concrete languages live under [`languages`]. The entry point is [`LanguageRegistry`], which
//! detects a language from a source file's extension or looks one up by name.
//!
//! ```
//! use oj_worker_lang::LanguageRegistry;
//!
//! let lang = LanguageRegistry::detect_language("test.cpp").expect("unknown lang");
//! assert!(lang.name().contains("C++"));
//! ```

#![deny(missing_docs)]

#[macro_use]
extern crate lazy_static;

mod language;
mod languages;

pub use language::{CompileSpec, Language, RunSpec};

use std::path::Path;

/// Registry of all the known languages, used to detect a language from a source file's extension
/// or to look one up by name (as stored in a `CompileTask`).
pub struct LanguageRegistry {
    known_languages: Vec<&'static dyn Language>,
}

impl LanguageRegistry {
    fn new() -> LanguageRegistry {
        LanguageRegistry {
            // ordered by most important first
            known_languages: vec![
                &languages::cpp::LanguageCpp,
                &languages::c::LanguageC,
                &languages::python::LanguagePython,
            ],
        }
    }

    /// Given a path to a file guess the language that the source file probably is, based on its
    /// extension.
    ///
    /// ```
    /// use oj_worker_lang::LanguageRegistry;
    ///
    /// let cpp = LanguageRegistry::detect_language("test.cpp").unwrap();
    /// assert!(cpp.name().contains("C++"));
    /// let py = LanguageRegistry::detect_language("test.py").unwrap();
    /// assert!(py.name().contains("Python"));
    /// let unknown = LanguageRegistry::detect_language("test.foobar");
    /// assert!(unknown.is_none());
    /// ```
    pub fn detect_language<P: AsRef<Path>>(path: P) -> Option<&'static dyn Language> {
        let registry = &LANGUAGE_REGISTRY_SINGL;
        let ext = path
            .as_ref()
            .extension()
            .map(|s| s.to_string_lossy())
            .unwrap_or_else(|| "".into())
            .to_lowercase();
        for lang in registry.known_languages.iter() {
            if lang.extensions().iter().any(|lang_ext| ext == *lang_ext) {
                return Some(*lang);
            }
        }
        None
    }

    /// Search between the known languages the one with the specified name (as stored in a
    /// `CompileTask`'s `language` field) and return it if found.
    pub fn from_name<S: AsRef<str>>(name: S) -> Option<&'static dyn Language> {
        let registry = &LANGUAGE_REGISTRY_SINGL;
        registry
            .known_languages
            .iter()
            .find(|lang| lang.name() == name.as_ref())
            .copied()
    }
}

lazy_static! {
    /// The singleton instance of the `LanguageRegistry`.
    static ref LANGUAGE_REGISTRY_SINGL: LanguageRegistry = LanguageRegistry::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        let lang = LanguageRegistry::detect_language("foo.cpp").unwrap();
        assert_eq!(lang.name(), languages::cpp::LanguageCpp.name());
    }

    #[test]
    fn test_detect_language_uppercase() {
        let lang = LanguageRegistry::detect_language("foo.CPP").unwrap();
        assert_eq!(lang.name(), languages::cpp::LanguageCpp.name());
    }

    #[test]
    fn test_detect_language_unknown() {
        let lang = LanguageRegistry::detect_language("foo.blah");
        assert!(lang.is_none());
    }

    #[test]
    fn test_from_name() {
        let name = languages::cpp::LanguageCpp.name();
        let lang = LanguageRegistry::from_name(name).unwrap();
        assert_eq!(lang.name(), name);
    }

    #[test]
    fn test_from_name_unknown() {
        let lang = LanguageRegistry::from_name("Nope, this is not a language");
        assert!(lang.is_none());
    }
}
