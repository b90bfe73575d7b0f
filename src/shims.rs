//! Registry of worker implementations ("shims") under test.
//!
//! Each shim names a sender and a receiver command. The file format is a JSON
//! array:
//!
//! ```json
//! [
//!   {
//!     "name": "ProtonCpp",
//!     "sender": { "program": "/opt/shims/cpp/Sender" },
//!     "receiver": { "program": "/opt/shims/cpp/Receiver" }
//!   },
//!   {
//!     "name": "ProtonPython3",
//!     "sender": { "program": "python3", "args": ["shims/python/Sender.py"] },
//!     "receiver": { "program": "python3", "args": ["shims/python/Receiver.py"] }
//!   }
//! ]
//! ```
//!
//! Relative program paths that contain a separator are resolved against the
//! directory holding the file. Bare names are looked up on `PATH` at spawn time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Program plus leading arguments. Case parameters are appended after `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.program.is_relative() && self.program.components().count() > 1 {
            self.program = base.join(&self.program);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimSpec {
    pub name: String,
    pub sender: WorkerCommand,
    pub receiver: WorkerCommand,
}

impl ShimSpec {
    pub fn new(name: impl Into<String>, sender: WorkerCommand, receiver: WorkerCommand) -> Self {
        Self {
            name: name.into(),
            sender,
            receiver,
        }
    }
}

/// Which registered shims take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ShimSelection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl ShimSelection {
    pub fn from_lists(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        match (include.is_empty(), exclude.is_empty()) {
            (false, false) => Err(ConfigError::ConflictingShimFilters),
            (false, true) => Ok(ShimSelection::Include(include.to_vec())),
            (true, false) => Ok(ShimSelection::Exclude(exclude.to_vec())),
            (true, true) => Ok(ShimSelection::All),
        }
    }
}

/// Ordered, duplicate-free set of shims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimRegistry {
    shims: Vec<ShimSpec>,
}

impl ShimRegistry {
    pub fn new(shims: Vec<ShimSpec>) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        for shim in &shims {
            if !seen.insert(shim.name.as_str()) {
                return Err(ConfigError::DuplicateShim(shim.name.clone()));
            }
        }
        Ok(Self { shims })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut shims: Vec<ShimSpec> =
            serde_json::from_str(&text).map_err(|source| ConfigError::ParseFile {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for shim in &mut shims {
            shim.sender.resolve_relative_to(base);
            shim.receiver.resolve_relative_to(base);
        }
        Self::new(shims)
    }

    pub fn get(&self, name: &str) -> Option<&ShimSpec> {
        self.shims.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shims.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.shims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shims.is_empty()
    }

    /// Narrow the registry. Unknown names and an empty result are errors.
    pub fn select(&self, selection: &ShimSelection) -> Result<ShimRegistry, ConfigError> {
        let check_known = |names: &[String]| {
            names
                .iter()
                .find(|n| self.get(n).is_none())
                .map_or(Ok(()), |n| Err(ConfigError::UnknownShim(n.clone())))
        };

        let shims: Vec<ShimSpec> = match selection {
            ShimSelection::All => self.shims.clone(),
            ShimSelection::Include(names) => {
                check_known(names)?;
                self.shims
                    .iter()
                    .filter(|s| names.contains(&s.name))
                    .cloned()
                    .collect()
            }
            ShimSelection::Exclude(names) => {
                check_known(names)?;
                self.shims
                    .iter()
                    .filter(|s| !names.contains(&s.name))
                    .cloned()
                    .collect()
            }
        };

        if shims.is_empty() {
            return Err(ConfigError::NoShims);
        }
        Ok(ShimRegistry { shims })
    }
}
