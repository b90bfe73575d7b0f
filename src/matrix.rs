//! Expansion of types x sender x receiver into an ordered test plan.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use amqp_interop_types::{AmqpType, TestValue};

use crate::catalog::TypeCatalog;
use crate::error::{CatalogError, ConfigError, HarnessError};
use crate::report::TestResult;
use crate::shims::ShimRegistry;
use crate::skip::{SkipReason, SkipRuleResolver};

pub const TEST_NAME: &str = "amqp_types_test";
pub const DEFAULT_QUEUE_PREFIX: &str = "jms.queue.qpid-interop";

/// Identity of a case: `(type, sender, receiver)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId {
    #[serde(rename = "type")]
    pub ty: AmqpType,
    pub sender: String,
    pub receiver: String,
}

impl CaseId {
    pub fn new(ty: AmqpType, sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            ty,
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.ty, self.sender, self.receiver)
    }
}

/// One executable case. Cases of the same type share their value sequence.
#[derive(Debug, Clone)]
pub struct TestCase {
    id: CaseId,
    values: Arc<Vec<TestValue>>,
}

impl TestCase {
    pub fn new(id: CaseId, values: Arc<Vec<TestValue>>) -> Self {
        Self { id, values }
    }

    pub fn id(&self) -> &CaseId {
        &self.id
    }

    pub fn ty(&self) -> AmqpType {
        self.id.ty
    }

    pub fn sender(&self) -> &str {
        &self.id.sender
    }

    pub fn receiver(&self) -> &str {
        &self.id.receiver
    }

    pub fn values(&self) -> &[TestValue] {
        &self.values
    }

    /// `amqp_types_test.<type>.<sender>.<receiver>`
    pub fn name(&self) -> String {
        format!("{TEST_NAME}.{}", self.id)
    }

    /// Destination endpoint, unique per case.
    pub fn queue_name(&self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.name()
        } else {
            format!("{prefix}.{}", self.name())
        }
    }
}

/// Which catalog types take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TypeSelection {
    #[default]
    All,
    Include(Vec<AmqpType>),
    Exclude(Vec<AmqpType>),
}

impl TypeSelection {
    /// Both lists given is a configuration error, as is any unknown name.
    pub fn from_lists(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        let parse = |names: &[String]| -> Result<Vec<AmqpType>, ConfigError> {
            names
                .iter()
                .map(|n| {
                    n.parse::<AmqpType>()
                        .map_err(|_| ConfigError::UnknownType(n.clone()))
                })
                .collect()
        };

        match (include.is_empty(), exclude.is_empty()) {
            (false, false) => Err(ConfigError::ConflictingTypeFilters),
            (false, true) => Ok(TypeSelection::Include(parse(include)?)),
            (true, false) => Ok(TypeSelection::Exclude(parse(exclude)?)),
            (true, true) => Ok(TypeSelection::All),
        }
    }

    /// Selected types in ascending lexical order, without duplicates.
    pub fn resolve(&self, catalog: &TypeCatalog) -> Result<Vec<AmqpType>, ConfigError> {
        let known = catalog.type_names();
        let mut types: Vec<AmqpType> = match self {
            TypeSelection::All => known,
            TypeSelection::Include(types) => {
                if let Some(missing) = types.iter().find(|t| !catalog.contains(**t)) {
                    return Err(ConfigError::UnknownType(missing.to_string()));
                }
                types.clone()
            }
            TypeSelection::Exclude(types) => {
                known.into_iter().filter(|t| !types.contains(t)).collect()
            }
        };
        types.sort_by_key(|t| t.as_str());
        types.dedup();
        Ok(types)
    }
}

/// Ordered cases to execute plus the pre-resolved skips.
#[derive(Debug, Clone)]
pub struct MatrixPlan {
    pub cases: Vec<TestCase>,
    pub skipped: Vec<TestResult>,
    digest: String,
    outline: Vec<String>,
}

impl MatrixPlan {
    /// Hex SHA-256 over every case identity, executed and skipped, in plan order.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.cases.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per planned case in plan order, skips annotated with their
    /// reason.
    pub fn describe(&self) -> &[String] {
        &self.outline
    }
}

enum Planned {
    Run {
        values: Arc<Vec<TestValue>>,
        omitted: Vec<SkipReason>,
    },
    Skip(SkipReason),
}

/// Array cases built so far, keyed by the element types they carry.
type ArrayCache = BTreeMap<Vec<AmqpType>, Arc<Vec<TestValue>>>;

pub struct MatrixGenerator<'a> {
    catalog: &'a TypeCatalog,
    skips: &'a SkipRuleResolver,
}

impl<'a> MatrixGenerator<'a> {
    pub fn new(catalog: &'a TypeCatalog, skips: &'a SkipRuleResolver) -> Self {
        Self { catalog, skips }
    }

    /// Enumerate every `(type, sender, receiver)` in deterministic order.
    ///
    /// Self-pairs are included. Skip rules are resolved here, so a skipped case
    /// never reaches an executor. An `array` case leaves out the element types
    /// its broker and shims are known not to support, and is skipped when that
    /// leaves nothing.
    pub fn generate(
        &self,
        selection: &TypeSelection,
        broker: &str,
        shims: &ShimRegistry,
    ) -> Result<MatrixPlan, HarnessError> {
        let types = selection.resolve(self.catalog)?;
        let mut hasher = Sha256::new();
        let mut cases = Vec::new();
        let mut skipped = Vec::new();
        let mut outline = Vec::new();

        for ty in types {
            let values = match ty {
                AmqpType::Array => Arc::default(),
                other => Arc::new(self.catalog.values(other)?),
            };
            let mut arrays = ArrayCache::new();
            for sender in shims.names() {
                for receiver in shims.names() {
                    let id = CaseId::new(ty, sender, receiver);
                    hasher.update(id.to_string().as_bytes());
                    hasher.update(b"\n");

                    let planned = match self.skips.resolve(ty, broker, sender, receiver) {
                        Some(reason) => Planned::Skip(reason),
                        None if ty == AmqpType::Array => {
                            self.plan_array(broker, sender, receiver, &mut arrays)?
                        }
                        None => Planned::Run {
                            values: Arc::clone(&values),
                            omitted: Vec::new(),
                        },
                    };

                    match planned {
                        Planned::Skip(reason) => {
                            tracing::debug!(case = %id, %reason, "skipping case");
                            outline.push(format!("SKIP  {id} ({reason})"));
                            skipped.push(TestResult::skipped(id, &reason));
                        }
                        Planned::Run { values, omitted } if omitted.is_empty() => {
                            outline.push(format!("RUN   {id}"));
                            cases.push(TestCase::new(id, values));
                        }
                        Planned::Run { values, omitted } => {
                            for reason in &omitted {
                                tracing::debug!(case = %id, %reason, "array element omitted");
                            }
                            let elements: Vec<&str> =
                                omitted.iter().map(|r| r.ty.as_str()).collect();
                            outline.push(format!(
                                "RUN   {id} (without {} arrays)",
                                elements.join(", ")
                            ));
                            cases.push(TestCase::new(id, values));
                        }
                    }
                }
            }
        }

        Ok(MatrixPlan {
            cases,
            skipped,
            digest: hex::encode(hasher.finalize()),
            outline,
        })
    }

    fn plan_array(
        &self,
        broker: &str,
        sender: &str,
        receiver: &str,
        arrays: &mut ArrayCache,
    ) -> Result<Planned, CatalogError> {
        let mut kept = Vec::new();
        let mut omitted = Vec::new();
        for &element in self.catalog.array_element_types() {
            match self.skips.resolve(element, broker, sender, receiver) {
                Some(reason) => omitted.push(reason),
                None => kept.push(element),
            }
        }

        if kept.is_empty() {
            if let Some(first) = omitted.drain(..).next() {
                return Ok(Planned::Skip(first));
            }
        }

        let values = match arrays.get(&kept) {
            Some(values) => Arc::clone(values),
            None => {
                let values = Arc::new(self.catalog.array_values(&kept)?);
                arrays.insert(kept, Arc::clone(&values));
                values
            }
        };
        Ok(Planned::Run { values, omitted })
    }
}
