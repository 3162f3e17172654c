//! The loaded set of [`EnvironmentSpec`]s the compiler resolves requests
//! against. Loaded once at startup from a declarative configuration file
//! (an external collaborator, out of scope here); a hard-coded fallback
//! is used when loading fails, matching the `ContainerImages` defaults in
//! the reference judge platform's sisyphus config.

use std::collections::HashMap;

use olympus_common::types::{EnvironmentSpec, EnvironmentSummary, Language};

#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    specs: HashMap<String, EnvironmentSpec>,
}

impl EnvironmentRegistry {
    /// Attempts to load the environment set from `path`; falls back to
    /// [`Self::hardcoded`] if the file is absent or malformed.
    pub fn load_or_default(path: Option<&str>) -> Self {
        if let Some(path) = path {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if let Ok(specs) = serde_json::from_str::<Vec<EnvironmentSpec>>(&contents) {
                    let mut map = HashMap::new();
                    for spec in specs {
                        map.insert(EnvironmentSpec::key(spec.language, &spec.compiler), spec);
                    }
                    if !map.is_empty() {
                        return Self { specs: map };
                    }
                }
            }
        }
        Self::hardcoded()
    }

    pub fn hardcoded() -> Self {
        let raw = vec![
            EnvironmentSpec {
                language: Language::C,
                compiler: "gcc-13".to_string(),
                version: "13".to_string(),
                default_standard: Some("c17".to_string()),
                architecture: "x86_64".to_string(),
                os: "linux".to_string(),
                image: "sisyphus/gcc:13".to_string(),
            },
            EnvironmentSpec {
                language: Language::Cpp,
                compiler: "gcc-13".to_string(),
                version: "13".to_string(),
                default_standard: Some("c++20".to_string()),
                architecture: "x86_64".to_string(),
                os: "linux".to_string(),
                image: "sisyphus/gcc:13".to_string(),
            },
            EnvironmentSpec {
                language: Language::Go,
                compiler: "go-1.23".to_string(),
                version: "1.23".to_string(),
                default_standard: None,
                architecture: "x86_64".to_string(),
                os: "linux".to_string(),
                image: "sisyphus/golang:1.23".to_string(),
            },
            EnvironmentSpec {
                language: Language::Rust,
                compiler: "rustc-1.80".to_string(),
                version: "1.80".to_string(),
                default_standard: None,
                architecture: "x86_64".to_string(),
                os: "linux".to_string(),
                image: "sisyphus/rust:1.80".to_string(),
            },
        ];
        let mut specs = HashMap::new();
        for spec in raw {
            specs.insert(EnvironmentSpec::key(spec.language, &spec.compiler), spec);
        }
        Self { specs }
    }

    /// Resolves `{language}-{compiler}`, defaulting to the language's
    /// first registered compiler when `compiler` is absent.
    pub fn resolve(&self, language: Language, compiler: Option<&str>) -> Option<&EnvironmentSpec> {
        match compiler {
            Some(compiler) => self.specs.get(&EnvironmentSpec::key(language, compiler)),
            None => self
                .specs
                .values()
                .find(|spec| spec.language == language),
        }
    }

    pub fn all_images(&self) -> impl Iterator<Item = &str> {
        self.specs.values().map(|spec| spec.image.as_str())
    }

    /// Aggregates the loaded set per language for the environments query.
    pub fn summaries(&self) -> Vec<EnvironmentSummary> {
        let mut by_language: HashMap<Language, EnvironmentSummary> = HashMap::new();
        for spec in self.specs.values() {
            let entry = by_language.entry(spec.language).or_insert_with(|| EnvironmentSummary {
                language: spec.language,
                compilers: Vec::new(),
                standards: Vec::new(),
                oses: Vec::new(),
                architectures: Vec::new(),
            });
            push_unique(&mut entry.compilers, spec.compiler.clone());
            if let Some(standard) = &spec.default_standard {
                push_unique(&mut entry.standards, standard.clone());
            }
            push_unique(&mut entry.oses, spec.os.clone());
            push_unique(&mut entry.architectures, spec.architecture.clone());
        }
        let mut out: Vec<_> = by_language.into_values().collect();
        out.sort_by_key(|s| s.language.as_str());
        out
    }
}

fn push_unique(vec: &mut Vec<String>, value: String) {
    if !vec.contains(&value) {
        vec.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardcoded_covers_all_languages() {
        let registry = EnvironmentRegistry::hardcoded();
        for lang in [Language::C, Language::Cpp, Language::Go, Language::Rust] {
            assert!(registry.resolve(lang, None).is_some());
        }
    }

    #[test]
    fn resolve_missing_compiler_is_none() {
        let registry = EnvironmentRegistry::hardcoded();
        assert!(registry.resolve(Language::Cpp, Some("gcc-99")).is_none());
    }
}
