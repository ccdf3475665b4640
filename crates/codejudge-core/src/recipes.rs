//! Language recipe table
//
// Maps each supported language to the file its source is written to, the
// image it runs in, and the command that builds and/or runs it. Commands are
// relative to the working directory, which both backends point at the
// submission workspace.

use crate::errors::SandboxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Java,
    Cpp,
    C,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::Javascript,
        Language::Java,
        Language::Cpp,
        Language::C,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
        }
    }

    pub fn recipe(&self) -> &'static Recipe {
        match self {
            Language::Python => &PYTHON,
            Language::Javascript => &JAVASCRIPT,
            Language::Java => &JAVA,
            Language::Cpp => &CPP,
            Language::C => &C,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|language| language.id() == s)
            .ok_or_else(|| SandboxError::UnsupportedLanguage(s.to_string()))
    }
}

/// How to materialize and run one language.
#[derive(Debug, Serialize)]
pub struct Recipe {
    pub language: Language,
    pub source_filename: &'static str,
    pub runtime_image: &'static str,
    pub command: &'static [&'static str],
}

impl Recipe {
    pub fn command_vec(&self) -> Vec<String> {
        self.command.iter().map(|part| part.to_string()).collect()
    }
}

static PYTHON: Recipe = Recipe {
    language: Language::Python,
    source_filename: "code.py",
    runtime_image: "python:3.9-slim",
    command: &["python", "code.py"],
};

static JAVASCRIPT: Recipe = Recipe {
    language: Language::Javascript,
    source_filename: "code.js",
    runtime_image: "node:16-alpine",
    command: &["node", "code.js"],
};

static JAVA: Recipe = Recipe {
    language: Language::Java,
    source_filename: "Main.java",
    runtime_image: "openjdk:11-slim",
    command: &["sh", "-c", "javac Main.java && java Main"],
};

static CPP: Recipe = Recipe {
    language: Language::Cpp,
    source_filename: "code.cpp",
    runtime_image: "gcc:latest",
    command: &["sh", "-c", "g++ -o program code.cpp && ./program"],
};

static C: Recipe = Recipe {
    language: Language::C,
    source_filename: "code.c",
    runtime_image: "gcc:latest",
    command: &["sh", "-c", "gcc -o program code.c && ./program"],
};

/// Look up the recipe for a language identifier. Has no side effects.
pub fn resolve(language_id: &str) -> Result<&'static Recipe, SandboxError> {
    language_id.parse::<Language>().map(|language| language.recipe())
}

pub fn supported_languages() -> impl Iterator<Item = &'static Recipe> {
    Language::ALL.into_iter().map(|language| language.recipe())
}
